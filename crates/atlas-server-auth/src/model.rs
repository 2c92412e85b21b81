// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Static match-model configuration.
//!
//! Describes how rules match requests: the address version prefix, the
//! placeholder tokens for unset segments, and how many levels of role
//! indirection the enforcer resolves. Built once at process start; there is
//! no environment-variable-driven behavior.

use crate::address::{
	RESOURCE_ID_TOKEN, RESOURCE_TOKEN, TEAM_TOKEN, USER_TOKEN, VERSION_PREFIX,
};

/// Configuration of the rule-matching policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchModel {
	/// Version prefix on canonical address strings.
	pub version_prefix: &'static str,

	/// Placeholder tokens for the four address segments, in order.
	pub segment_tokens: [&'static str; 4],

	/// Levels of group membership resolved when computing the effective
	/// subject set. The catalog has no role-to-role nesting, so the default
	/// is a single level.
	pub role_depth: usize,
}

impl Default for MatchModel {
	fn default() -> Self {
		Self {
			version_prefix: VERSION_PREFIX,
			segment_tokens: [RESOURCE_TOKEN, TEAM_TOKEN, RESOURCE_ID_TOKEN, USER_TOKEN],
			role_depth: 1,
		}
	}
}
