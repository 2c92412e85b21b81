// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqliteSynchronous};
use std::str::FromStr;
use std::time::Duration;

use crate::error::DbError;

/// Create a SqlitePool for the catalog with WAL mode and common settings.
///
/// SQLite foreign-key enforcement stays off: the catalog's references are
/// loosely typed across tables and integrity is enforced by the
/// [`RequirementRegistry`](crate::require::RequirementRegistry) inside the
/// mutating transaction, not by the storage engine.
///
/// # Arguments
/// * `database_url` - SQLite connection string (e.g., "sqlite:./atlas.db")
///
/// # Errors
/// Returns `DbError::Internal` if the URL is invalid or connection fails.
#[tracing::instrument(skip(database_url))]
pub async fn create_pool(database_url: &str) -> Result<SqlitePool, DbError> {
	let options = SqliteConnectOptions::from_str(database_url)
		.map_err(|e| DbError::Internal(format!("Invalid database URL: {e}")))?
		.journal_mode(SqliteJournalMode::Wal)
		.synchronous(SqliteSynchronous::Normal)
		.busy_timeout(Duration::from_secs(5))
		.foreign_keys(false)
		.create_if_missing(true);

	let pool = SqlitePool::connect_with(options).await?;

	tracing::debug!("database pool created");
	Ok(pool)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_create_pool_opens_wal_mode_database() {
		let dir = tempfile::tempdir().unwrap();
		let url = format!("sqlite:{}", dir.path().join("atlas.db").display());

		let pool = create_pool(&url).await.unwrap();

		let mode: String = sqlx::query_scalar("PRAGMA journal_mode")
			.fetch_one(&pool)
			.await
			.unwrap();
		assert_eq!(mode, "wal");
	}

	#[tokio::test]
	async fn test_create_pool_serves_catalog_statements() {
		let dir = tempfile::tempdir().unwrap();
		let url = format!("sqlite:{}", dir.path().join("atlas.db").display());
		let pool = create_pool(&url).await.unwrap();

		crate::testing::create_entity_tables(&pool).await;
		let team_id = crate::testing::insert_named(&pool, "teams", "core").await;

		let mut conn = pool.acquire().await.unwrap();
		crate::require::ensure_exists(&mut conn, crate::require::RequireKind::Team, team_id)
			.await
			.unwrap();
	}
}
