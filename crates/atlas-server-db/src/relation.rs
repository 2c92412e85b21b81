// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Generic many-to-many relation repository.
//!
//! Every link table in the catalog (app↔feature, app↔tag, hostgroup↔feature,
//! hostgroup↔team, hostgroup↔product, hostgroup↔tag) has the same shape:
//! `(id, left_id, right_id)` with UNIQUE(left, right). One parametrized
//! repository serves all of them, driven by a static [`RelationTable`]
//! descriptor, so the query logic exists exactly once and cannot drift
//! between tables. Linking presence-checks both sides via the descriptor's
//! kinds, so no link row ever points at a nonexistent target.

use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;
use sqlx::SqliteConnection;

use crate::error::{DbError, Result};
use crate::require::{ensure_exists, placeholders, RequireCounter, RequireKind};

/// Static descriptor of one link table.
#[derive(Debug)]
pub struct RelationTable {
	pub table: &'static str,
	pub left_column: &'static str,
	pub right_column: &'static str,
	pub left_kind: RequireKind,
	pub right_kind: RequireKind,
}

pub static APP_FEATURES: RelationTable = RelationTable {
	table: "app_features",
	left_column: "app_id",
	right_column: "feature_id",
	left_kind: RequireKind::App,
	right_kind: RequireKind::Feature,
};

pub static APP_TAGS: RelationTable = RelationTable {
	table: "app_tags",
	left_column: "app_id",
	right_column: "tag_id",
	left_kind: RequireKind::App,
	right_kind: RequireKind::Tag,
};

pub static HOSTGROUP_FEATURES: RelationTable = RelationTable {
	table: "hostgroup_features",
	left_column: "hostgroup_id",
	right_column: "feature_id",
	left_kind: RequireKind::Hostgroup,
	right_kind: RequireKind::Feature,
};

pub static HOSTGROUP_TEAMS: RelationTable = RelationTable {
	table: "hostgroup_teams",
	left_column: "hostgroup_id",
	right_column: "team_id",
	left_kind: RequireKind::Hostgroup,
	right_kind: RequireKind::Team,
};

pub static HOSTGROUP_PRODUCTS: RelationTable = RelationTable {
	table: "hostgroup_products",
	left_column: "hostgroup_id",
	right_column: "product_id",
	left_kind: RequireKind::Hostgroup,
	right_kind: RequireKind::Product,
};

pub static HOSTGROUP_TAGS: RelationTable = RelationTable {
	table: "hostgroup_tags",
	left_column: "hostgroup_id",
	right_column: "tag_id",
	left_kind: RequireKind::Hostgroup,
	right_kind: RequireKind::Tag,
};

/// Every link table in the catalog, for registry wiring.
pub static ALL_RELATIONS: [&RelationTable; 6] = [
	&APP_FEATURES,
	&APP_TAGS,
	&HOSTGROUP_FEATURES,
	&HOSTGROUP_TEAMS,
	&HOSTGROUP_PRODUCTS,
	&HOSTGROUP_TAGS,
];

/// Repository over one link table.
#[derive(Clone)]
pub struct RelationRepository {
	pool: SqlitePool,
	table: &'static RelationTable,
}

impl RelationRepository {
	pub fn new(pool: SqlitePool, table: &'static RelationTable) -> Self {
		Self { pool, table }
	}

	pub fn table(&self) -> &'static RelationTable {
		self.table
	}

	/// Link a pair on the default connection.
	pub async fn link(&self, left_id: u32, right_id: u32) -> Result<()> {
		let mut conn = self.pool.acquire().await?;
		self.link_in(&mut conn, left_id, right_id).await
	}

	/// Link a pair inside a caller-owned transaction.
	///
	/// Both ids are presence-checked against their entity tables on the
	/// same connection first, so a link row never points at a nonexistent
	/// target.
	///
	/// # Errors
	/// Returns [`DbError::DanglingReference`] if either side does not
	/// exist, `DbError::Conflict` if the pair is already linked.
	#[tracing::instrument(skip(self, conn), fields(table = self.table.table))]
	pub async fn link_in(
		&self,
		conn: &mut SqliteConnection,
		left_id: u32,
		right_id: u32,
	) -> Result<()> {
		ensure_exists(&mut *conn, self.table.left_kind, left_id).await?;
		ensure_exists(&mut *conn, self.table.right_kind, right_id).await?;

		let sql = format!(
			"INSERT INTO {} ({}, {}) VALUES (?, ?)",
			self.table.table, self.table.left_column, self.table.right_column
		);
		let result = sqlx::query(&sql)
			.bind(left_id as i64)
			.bind(right_id as i64)
			.execute(&mut *conn)
			.await;

		match result {
			Ok(_) => {
				tracing::debug!(left_id, right_id, "relation linked");
				Ok(())
			}
			Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(DbError::Conflict(
				format!("{} already links {left_id} to {right_id}", self.table.table),
			)),
			Err(e) => Err(e.into()),
		}
	}

	/// Unlink one pair on the default connection.
	pub async fn unlink(&self, left_id: u32, right_id: u32) -> Result<()> {
		let mut conn = self.pool.acquire().await?;
		self.unlink_in(&mut conn, left_id, right_id).await
	}

	/// Unlink one pair inside a caller-owned transaction.
	///
	/// # Errors
	/// Returns `DbError::NotFound` if the pair is not linked.
	#[tracing::instrument(skip(self, conn), fields(table = self.table.table))]
	pub async fn unlink_in(
		&self,
		conn: &mut SqliteConnection,
		left_id: u32,
		right_id: u32,
	) -> Result<()> {
		let sql = format!(
			"DELETE FROM {} WHERE {} = ? AND {} = ?",
			self.table.table, self.table.left_column, self.table.right_column
		);
		let result = sqlx::query(&sql)
			.bind(left_id as i64)
			.bind(right_id as i64)
			.execute(&mut *conn)
			.await?;

		if result.rows_affected() == 0 {
			return Err(DbError::NotFound(format!(
				"{} does not link {left_id} to {right_id}",
				self.table.table
			)));
		}
		Ok(())
	}

	/// Right-side ids linked to one left id.
	pub async fn rights_of(&self, left_id: u32) -> Result<Vec<u32>> {
		let mut conn = self.pool.acquire().await?;
		self.rights_of_in(&mut conn, left_id).await
	}

	pub async fn rights_of_in(
		&self,
		conn: &mut SqliteConnection,
		left_id: u32,
	) -> Result<Vec<u32>> {
		let sql = format!(
			"SELECT {} FROM {} WHERE {} = ? ORDER BY id",
			self.table.right_column, self.table.table, self.table.left_column
		);
		let ids: Vec<i64> = sqlx::query_scalar(&sql)
			.bind(left_id as i64)
			.fetch_all(&mut *conn)
			.await?;
		Ok(ids.into_iter().map(|id| id as u32).collect())
	}

	/// Left-side ids linked to one right id.
	pub async fn lefts_of(&self, right_id: u32) -> Result<Vec<u32>> {
		let mut conn = self.pool.acquire().await?;
		self.lefts_of_in(&mut conn, right_id).await
	}

	pub async fn lefts_of_in(
		&self,
		conn: &mut SqliteConnection,
		right_id: u32,
	) -> Result<Vec<u32>> {
		let sql = format!(
			"SELECT {} FROM {} WHERE {} = ? ORDER BY id",
			self.table.left_column, self.table.table, self.table.right_column
		);
		let ids: Vec<i64> = sqlx::query_scalar(&sql)
			.bind(right_id as i64)
			.fetch_all(&mut *conn)
			.await?;
		Ok(ids.into_iter().map(|id| id as u32).collect())
	}

	/// Drop every link for one left id. Caller-driven cascade before the
	/// left entity is deleted; run it in the deleting transaction.
	pub async fn unlink_all_left_in(
		&self,
		conn: &mut SqliteConnection,
		left_id: u32,
	) -> Result<u64> {
		let sql = format!(
			"DELETE FROM {} WHERE {} = ?",
			self.table.table, self.table.left_column
		);
		let result = sqlx::query(&sql)
			.bind(left_id as i64)
			.execute(&mut *conn)
			.await?;
		Ok(result.rows_affected())
	}

	/// Drop every link for one right id.
	pub async fn unlink_all_right_in(
		&self,
		conn: &mut SqliteConnection,
		right_id: u32,
	) -> Result<u64> {
		let sql = format!(
			"DELETE FROM {} WHERE {} = ?",
			self.table.table, self.table.right_column
		);
		let result = sqlx::query(&sql)
			.bind(right_id as i64)
			.execute(&mut *conn)
			.await?;
		Ok(result.rows_affected())
	}
}

#[async_trait]
impl RequireCounter for RelationRepository {
	async fn count_references(
		&self,
		conn: &mut SqliteConnection,
		kind: RequireKind,
		ids: &[u32],
	) -> Result<i64> {
		let column = if kind == self.table.left_kind {
			self.table.left_column
		} else if kind == self.table.right_kind {
			self.table.right_column
		} else {
			return Ok(0);
		};
		if ids.is_empty() {
			return Err(DbError::EmptyIdSet("ids"));
		}

		let sql = format!(
			"SELECT COUNT(*) FROM {} WHERE {} IN ({})",
			self.table.table,
			column,
			placeholders(ids.len())
		);
		let mut query = sqlx::query_scalar::<_, i64>(&sql);
		for id in ids {
			query = query.bind(*id as i64);
		}
		Ok(query.fetch_one(&mut *conn).await?)
	}
}
