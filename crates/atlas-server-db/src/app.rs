// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Application repository.
//!
//! Applications carry two foreign ids (owning product and team) with no
//! database-level foreign keys, so creation validates both ids in the same
//! transaction ([`ensure_exists`]) and deletion is gated on the
//! [`RequirementRegistry`] so no relation row is left dangling.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::{Row, SqliteConnection};

use crate::error::{DbError, Result};
use crate::require::{
	ensure_exists, placeholders, RequireCounter, RequireKind, RequirementRegistry,
};

/// A deployable application owned by a product and a team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
	pub id: u32,
	pub name: String,
	pub product_id: u32,
	pub team_id: u32,
}

/// Fields for creating an application.
#[derive(Debug, Clone)]
pub struct NewApplication {
	pub name: String,
	pub product_id: u32,
	pub team_id: u32,
}

/// Repository for application rows.
#[derive(Clone)]
pub struct ApplicationRepository {
	pool: SqlitePool,
}

impl ApplicationRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	/// Create an application on the default connection.
	pub async fn create_app(&self, app: &NewApplication) -> Result<u32> {
		let mut conn = self.pool.acquire().await?;
		self.create_app_in(&mut conn, app).await
	}

	/// Create an application inside a caller-owned transaction.
	///
	/// Both foreign ids are presence-checked on the same connection before
	/// the insert, so a concurrent delete of the product or team either
	/// happens-before this transaction (and the check fails) or is blocked
	/// by it.
	///
	/// # Errors
	/// Returns [`DbError::DanglingReference`] if the product or team does
	/// not exist, `DbError::Conflict` on a duplicate name.
	#[tracing::instrument(skip(self, conn, app), fields(name = %app.name))]
	pub async fn create_app_in(
		&self,
		conn: &mut SqliteConnection,
		app: &NewApplication,
	) -> Result<u32> {
		ensure_exists(&mut *conn, RequireKind::Product, app.product_id).await?;
		ensure_exists(&mut *conn, RequireKind::Team, app.team_id).await?;

		let result = sqlx::query(
			r#"
			INSERT INTO apps (name, product_id, team_id)
			VALUES (?, ?, ?)
			"#,
		)
		.bind(&app.name)
		.bind(app.product_id as i64)
		.bind(app.team_id as i64)
		.execute(&mut *conn)
		.await;

		match result {
			Ok(done) => {
				let id = done.last_insert_rowid() as u32;
				tracing::debug!(app_id = id, "application created");
				Ok(id)
			}
			Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(DbError::Conflict(
				format!("application {:?} already exists", app.name),
			)),
			Err(e) => Err(e.into()),
		}
	}

	/// Get an application by id.
	pub async fn get_app(&self, id: u32) -> Result<Option<Application>> {
		let mut conn = self.pool.acquire().await?;
		self.get_app_in(&mut conn, id).await
	}

	pub async fn get_app_in(
		&self,
		conn: &mut SqliteConnection,
		id: u32,
	) -> Result<Option<Application>> {
		let row = sqlx::query(
			r#"
			SELECT id, name, product_id, team_id
			FROM apps
			WHERE id = ?
			"#,
		)
		.bind(id as i64)
		.fetch_optional(&mut *conn)
		.await?;

		Ok(row.map(|r| row_to_app(&r)))
	}

	/// Delete an application on the default connection.
	pub async fn delete_app(&self, registry: &RequirementRegistry, id: u32) -> Result<()> {
		let mut conn = self.pool.acquire().await?;
		self.delete_app_in(&mut conn, registry, id).await
	}

	/// Delete an application inside a caller-owned transaction.
	///
	/// Refused while any relation row (features, tags) still points at the
	/// application. The count and the delete run on the same connection; the
	/// check-then-act pair is race-free only inside one transaction.
	///
	/// # Errors
	/// Returns [`DbError::StillReferenced`] while references remain,
	/// `DbError::NotFound` if the id does not exist.
	#[tracing::instrument(skip(self, conn, registry), fields(app_id = id))]
	pub async fn delete_app_in(
		&self,
		conn: &mut SqliteConnection,
		registry: &RequirementRegistry,
		id: u32,
	) -> Result<()> {
		registry
			.ensure_unreferenced(&mut *conn, RequireKind::App, &[id])
			.await?;

		let result = sqlx::query("DELETE FROM apps WHERE id = ?")
			.bind(id as i64)
			.execute(&mut *conn)
			.await?;

		if result.rows_affected() == 0 {
			return Err(DbError::NotFound(format!("application {id}")));
		}
		tracing::debug!("application deleted");
		Ok(())
	}
}

#[async_trait]
impl RequireCounter for ApplicationRepository {
	async fn count_references(
		&self,
		conn: &mut SqliteConnection,
		kind: RequireKind,
		ids: &[u32],
	) -> Result<i64> {
		let column = match kind {
			RequireKind::Product => "product_id",
			RequireKind::Team => "team_id",
			_ => return Ok(0),
		};
		if ids.is_empty() {
			return Err(DbError::EmptyIdSet("ids"));
		}

		let sql = format!(
			"SELECT COUNT(*) FROM apps WHERE {} IN ({})",
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

fn row_to_app(row: &SqliteRow) -> Application {
	Application {
		id: row.get::<i64, _>("id") as u32,
		name: row.get("name"),
		product_id: row.get::<i64, _>("product_id") as u32,
		team_id: row.get::<i64, _>("team_id") as u32,
	}
}
