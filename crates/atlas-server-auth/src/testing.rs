// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use sqlx::sqlite::SqlitePool;

pub async fn create_test_pool() -> SqlitePool {
	SqlitePool::connect(":memory:").await.unwrap()
}

pub async fn create_policy_tables(pool: &SqlitePool) {
	sqlx::query(
		r#"
		CREATE TABLE IF NOT EXISTS policy_rules (
			id INTEGER PRIMARY KEY AUTOINCREMENT,
			subject TEXT NOT NULL,
			resource TEXT NOT NULL,
			action TEXT NOT NULL,
			UNIQUE(subject, resource, action)
		)
		"#,
	)
	.execute(pool)
	.await
	.unwrap();

	sqlx::query(
		r#"
		CREATE TABLE IF NOT EXISTS policy_groups (
			id INTEGER PRIMARY KEY AUTOINCREMENT,
			user TEXT NOT NULL,
			role TEXT NOT NULL,
			UNIQUE(user, role)
		)
		"#,
	)
	.execute(pool)
	.await
	.unwrap();
}

pub async fn create_policy_test_pool() -> SqlitePool {
	let pool = create_test_pool().await;
	create_policy_tables(&pool).await;
	pool
}
