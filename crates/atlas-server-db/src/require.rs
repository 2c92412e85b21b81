// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Referential-integrity checks for loosely-typed cross-entity references.
//!
//! The catalog has no database-level foreign keys between entities, so
//! integrity is enforced in two patterns:
//!
//! - **Safe delete**: before deleting an entity, fan
//!   [`RequireCounter::count_references`] out across every repository that
//!   might hold a reference to it; a nonzero total refuses the delete with
//!   [`DbError::StillReferenced`].
//! - **Safe create/update**: before persisting a row carrying foreign ids,
//!   [`ensure_exists`] checks each referenced primary key and fails with
//!   [`DbError::DanglingReference`].
//!
//! Both checks are only race-free when they run on the same
//! `&mut SqliteConnection` (and therefore the same transaction) as the
//! mutation they guard. Every API here takes the caller's connection for
//! exactly that reason; running the check on a different connection reopens
//! the check-then-act race.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;
use sqlx::SqliteConnection;

use crate::error::{DbError, Result};

/// The closed set of relation kinds the registry understands.
///
/// Adding a new relation kind means adding a case here and teaching the
/// owning repositories about it, not a new type hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequireKind {
	Team,
	Tag,
	Product,
	Hostgroup,
	Feature,
	Env,
	Datacenter,
	Cluster,
	App,
	User,
}

impl RequireKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			RequireKind::Team => "team",
			RequireKind::Tag => "tag",
			RequireKind::Product => "product",
			RequireKind::Hostgroup => "hostgroup",
			RequireKind::Feature => "feature",
			RequireKind::Env => "env",
			RequireKind::Datacenter => "datacenter",
			RequireKind::Cluster => "cluster",
			RequireKind::App => "app",
			RequireKind::User => "user",
		}
	}

	/// The entity table holding primary keys of this kind.
	pub fn table(&self) -> &'static str {
		match self {
			RequireKind::Team => "teams",
			RequireKind::Tag => "tags",
			RequireKind::Product => "products",
			RequireKind::Hostgroup => "hostgroups",
			RequireKind::Feature => "features",
			RequireKind::Env => "envs",
			RequireKind::Datacenter => "datacenters",
			RequireKind::Cluster => "clusters",
			RequireKind::App => "apps",
			RequireKind::User => "users",
		}
	}
}

impl fmt::Display for RequireKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Capability of a repository that owns foreign keys: count how many of its
/// rows reference the given ids of the given kind.
///
/// A repository that holds no references of `kind` returns `Ok(0)` — "no
/// opinion", not an error — so the registry can fan a query out across every
/// registered repository and sum the results.
#[async_trait]
pub trait RequireCounter: Send + Sync {
	async fn count_references(
		&self,
		conn: &mut SqliteConnection,
		kind: RequireKind,
		ids: &[u32],
	) -> Result<i64>;
}

/// Fan-out coordinator over every repository that can hold references.
#[derive(Clone, Default)]
pub struct RequirementRegistry {
	counters: Vec<Arc<dyn RequireCounter>>,
}

impl RequirementRegistry {
	pub fn new() -> Self {
		Self {
			counters: Vec::new(),
		}
	}

	/// Registry wired with every reference-owning repository in this crate.
	pub fn standard(pool: &SqlitePool) -> Self {
		let mut registry = Self::new();
		registry.register(Arc::new(crate::app::ApplicationRepository::new(
			pool.clone(),
		)));
		registry.register(Arc::new(crate::hostgroup::HostgroupRepository::new(
			pool.clone(),
		)));
		for table in crate::relation::ALL_RELATIONS {
			registry.register(Arc::new(crate::relation::RelationRepository::new(
				pool.clone(),
				table,
			)));
		}
		registry
	}

	pub fn register(&mut self, counter: Arc<dyn RequireCounter>) {
		self.counters.push(counter);
	}

	/// Total number of rows, across all registered repositories, that
	/// reference any of `ids`.
	///
	/// Runs on the caller's connection so the count shares the caller's
	/// transaction.
	///
	/// # Errors
	/// Returns [`DbError::EmptyIdSet`] when `ids` is empty.
	#[tracing::instrument(skip(self, conn, ids), fields(kind = %kind, ids = ids.len()))]
	pub async fn count_references(
		&self,
		conn: &mut SqliteConnection,
		kind: RequireKind,
		ids: &[u32],
	) -> Result<i64> {
		if ids.is_empty() {
			return Err(DbError::EmptyIdSet("ids"));
		}

		let mut total = 0i64;
		for counter in &self.counters {
			total += counter.count_references(&mut *conn, kind, ids).await?;
		}
		Ok(total)
	}

	/// Refuse to proceed while any registered repository still references
	/// the ids. Used to gate deletes; must run in the deleting transaction.
	pub async fn ensure_unreferenced(
		&self,
		conn: &mut SqliteConnection,
		kind: RequireKind,
		ids: &[u32],
	) -> Result<()> {
		let count = self.count_references(conn, kind, ids).await?;
		if count > 0 {
			return Err(DbError::StillReferenced { kind, count });
		}
		Ok(())
	}
}

/// Primary-key presence check for a single foreign id.
///
/// # Errors
/// Returns [`DbError::DanglingReference`] if no row of `kind` has this id.
pub async fn ensure_exists(
	conn: &mut SqliteConnection,
	kind: RequireKind,
	id: u32,
) -> Result<()> {
	let sql = format!("SELECT EXISTS(SELECT 1 FROM {} WHERE id = ?)", kind.table());
	let present: i64 = sqlx::query_scalar(&sql)
		.bind(id as i64)
		.fetch_one(&mut *conn)
		.await?;

	if present == 0 {
		return Err(DbError::DanglingReference { kind, id });
	}
	Ok(())
}

/// `?, ?, ...` for an IN clause of `n` bindings.
pub(crate) fn placeholders(n: usize) -> String {
	vec!["?"; n].join(", ")
}
