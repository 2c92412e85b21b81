// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Hierarchical resource addresses.
//!
//! Every protected object in the catalog is named by a four-segment address:
//! resource type, owning team, instance id, and acting user. An unset segment
//! is a wildcard: in a rule it matches any value at that position, in a list
//! filter it means "all". The canonical string form is
//! `v1/<resource>/<team>/<resource_id>/<user>`, with unset segments rendered
//! as their placeholder token (for example `{team}`).
//!
//! Addresses are immutable value objects; [`ResourceAddress::parse`] and
//! [`ResourceAddress::format`] round-trip exactly.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{AuthError, Result};

/// Version prefix on canonical address strings.
pub const VERSION_PREFIX: &str = "v1";

/// Placeholder rendered for an unset resource-type segment.
pub const RESOURCE_TOKEN: &str = "{resource}";
/// Placeholder rendered for an unset team segment.
pub const TEAM_TOKEN: &str = "{team}";
/// Placeholder rendered for an unset instance-id segment.
pub const RESOURCE_ID_TOKEN: &str = "{resource_id}";
/// Placeholder rendered for an unset user segment.
pub const USER_TOKEN: &str = "{user}";

/// A four-segment hierarchical resource identifier.
///
/// `None` in any field means the segment is unset (wildcard).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceAddress {
	pub resource_type: Option<String>,
	pub team: Option<String>,
	pub resource_id: Option<String>,
	pub user: Option<String>,
}

impl ResourceAddress {
	/// Creates an address with every segment unset.
	pub fn wildcard() -> Self {
		Self::default()
	}

	/// Builder: set the resource-type segment.
	pub fn with_resource_type(mut self, resource_type: impl Into<String>) -> Self {
		self.resource_type = Some(resource_type.into());
		self
	}

	/// Builder: set the team segment.
	pub fn with_team(mut self, team: impl Into<String>) -> Self {
		self.team = Some(team.into());
		self
	}

	/// Builder: set the instance-id segment.
	pub fn with_resource_id(mut self, resource_id: impl Into<String>) -> Self {
		self.resource_id = Some(resource_id.into());
		self
	}

	/// Builder: set the user segment.
	pub fn with_user(mut self, user: impl Into<String>) -> Self {
		self.user = Some(user.into());
		self
	}

	/// Renders the canonical string form. Never fails.
	pub fn format(&self) -> String {
		format!(
			"{}/{}/{}/{}/{}",
			VERSION_PREFIX,
			self.resource_type.as_deref().unwrap_or(RESOURCE_TOKEN),
			self.team.as_deref().unwrap_or(TEAM_TOKEN),
			self.resource_id.as_deref().unwrap_or(RESOURCE_ID_TOKEN),
			self.user.as_deref().unwrap_or(USER_TOKEN),
		)
	}

	/// Parses a canonical address string.
	///
	/// Strips one leading `v1/`, then splits on `/`. Anything other than
	/// exactly four segments is rejected. A segment equal to its placeholder
	/// token, or empty, parses as unset.
	///
	/// # Errors
	/// Returns [`AuthError::InvalidResource`] if the segment count is wrong.
	pub fn parse(raw: &str) -> Result<Self> {
		let trimmed = raw
			.strip_prefix(&format!("{VERSION_PREFIX}/"))
			.unwrap_or(raw);
		let segments: Vec<&str> = trimmed.split('/').collect();
		if segments.len() != 4 {
			return Err(AuthError::InvalidResource(format!(
				"expected 4 segments, got {} in {raw:?}",
				segments.len()
			)));
		}

		Ok(Self {
			resource_type: parse_segment(segments[0], RESOURCE_TOKEN),
			team: parse_segment(segments[1], TEAM_TOKEN),
			resource_id: parse_segment(segments[2], RESOURCE_ID_TOKEN),
			user: parse_segment(segments[3], USER_TOKEN),
		})
	}

	/// Returns true if every segment is set.
	pub fn is_concrete(&self) -> bool {
		self.resource_type.is_some()
			&& self.team.is_some()
			&& self.resource_id.is_some()
			&& self.user.is_some()
	}

	/// Positional wildcard match of this address (a rule) against a request.
	///
	/// An unset segment on this side matches any value in the request; a set
	/// segment must be equal, case-sensitively, to the request's segment.
	pub fn covers(&self, request: &ResourceAddress) -> bool {
		segment_covers(&self.resource_type, &request.resource_type)
			&& segment_covers(&self.team, &request.team)
			&& segment_covers(&self.resource_id, &request.resource_id)
			&& segment_covers(&self.user, &request.user)
	}
}

impl fmt::Display for ResourceAddress {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.format())
	}
}

fn parse_segment(raw: &str, token: &str) -> Option<String> {
	if raw.is_empty() || raw == token {
		None
	} else {
		Some(raw.to_string())
	}
}

fn segment_covers(rule: &Option<String>, request: &Option<String>) -> bool {
	match rule {
		None => true,
		Some(value) => request.as_deref() == Some(value.as_str()),
	}
}
