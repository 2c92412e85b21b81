// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use crate::require::RequireKind;

#[derive(Debug, thiserror::Error)]
pub enum DbError {
	#[error("Database error: {0}")]
	Sqlx(#[from] sqlx::Error),

	#[error("Not found: {0}")]
	NotFound(String),

	#[error("Conflict: {0}")]
	Conflict(String),

	/// A count or match was asked about an empty id set. Always a caller
	/// bug, never retryable.
	#[error("empty id set: {0}")]
	EmptyIdSet(&'static str),

	/// A delete was refused because rows elsewhere still point at the
	/// entity.
	#[error("{kind} still referenced by {count} row(s)")]
	StillReferenced { kind: RequireKind, count: i64 },

	/// A create or update named a foreign id that does not exist.
	#[error("{kind} id {id} does not exist")]
	DanglingReference { kind: RequireKind, id: u32 },

	#[error("Internal: {0}")]
	Internal(String),
}

pub type Result<T> = std::result::Result<T, DbError>;
