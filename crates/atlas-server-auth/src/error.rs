// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
	#[error("Database error: {0}")]
	Sqlx(#[from] sqlx::Error),

	#[error("Invalid resource address: {0}")]
	InvalidResource(String),

	#[error("Rule already exists")]
	RuleExists,

	#[error("Rule not found")]
	RuleNotFound,

	#[error("Group already exists")]
	GroupExists,

	#[error("Group not found")]
	GroupNotFound,
}

pub type Result<T> = std::result::Result<T, AuthError>;
