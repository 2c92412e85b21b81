// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use sqlx::sqlite::SqlitePool;

use crate::hostgroup::NewHostgroup;

pub async fn create_test_pool() -> SqlitePool {
	SqlitePool::connect(":memory:").await.unwrap()
}

/// Simple named entities: teams, tags, products, features, envs,
/// datacenters, clusters, users.
pub async fn create_entity_tables(pool: &SqlitePool) {
	for table in [
		"teams",
		"tags",
		"products",
		"features",
		"envs",
		"datacenters",
		"clusters",
		"users",
	] {
		sqlx::query(&format!(
			r#"
			CREATE TABLE IF NOT EXISTS {table} (
				id INTEGER PRIMARY KEY AUTOINCREMENT,
				name TEXT NOT NULL UNIQUE
			)
			"#,
		))
		.execute(pool)
		.await
		.unwrap();
	}
}

pub async fn create_apps_table(pool: &SqlitePool) {
	sqlx::query(
		r#"
		CREATE TABLE IF NOT EXISTS apps (
			id INTEGER PRIMARY KEY AUTOINCREMENT,
			name TEXT NOT NULL UNIQUE,
			product_id INTEGER NOT NULL,
			team_id INTEGER NOT NULL
		)
		"#,
	)
	.execute(pool)
	.await
	.unwrap();
}

pub async fn create_hostgroups_table(pool: &SqlitePool) {
	sqlx::query(
		r#"
		CREATE TABLE IF NOT EXISTS hostgroups (
			id INTEGER PRIMARY KEY AUTOINCREMENT,
			name TEXT NOT NULL UNIQUE,
			cluster_id INTEGER NOT NULL,
			datacenter_id INTEGER NOT NULL,
			env_id INTEGER NOT NULL,
			product_id INTEGER NOT NULL,
			team_id INTEGER NOT NULL
		)
		"#,
	)
	.execute(pool)
	.await
	.unwrap();
}

pub async fn create_relation_tables(pool: &SqlitePool) {
	for table in crate::relation::ALL_RELATIONS {
		sqlx::query(&format!(
			r#"
			CREATE TABLE IF NOT EXISTS {} (
				id INTEGER PRIMARY KEY AUTOINCREMENT,
				{} INTEGER NOT NULL,
				{} INTEGER NOT NULL,
				UNIQUE({}, {})
			)
			"#,
			table.table,
			table.left_column,
			table.right_column,
			table.left_column,
			table.right_column,
		))
		.execute(pool)
		.await
		.unwrap();
	}
}

/// Pool with every catalog table.
pub async fn create_catalog_test_pool() -> SqlitePool {
	let pool = create_test_pool().await;
	create_entity_tables(&pool).await;
	create_apps_table(&pool).await;
	create_hostgroups_table(&pool).await;
	create_relation_tables(&pool).await;
	pool
}

/// Insert a named row and return its id.
pub async fn insert_named(pool: &SqlitePool, table: &str, name: &str) -> u32 {
	let result = sqlx::query(&format!("INSERT INTO {table} (name) VALUES (?)"))
		.bind(name)
		.execute(pool)
		.await
		.unwrap();
	result.last_insert_rowid() as u32
}

/// Insert an application row directly, seeding a product and team for it.
pub async fn insert_app(pool: &SqlitePool, name: &str) -> u32 {
	let product_id = insert_named(pool, "products", &format!("{name}-product")).await;
	let team_id = insert_named(pool, "teams", &format!("{name}-team")).await;
	let result = sqlx::query("INSERT INTO apps (name, product_id, team_id) VALUES (?, ?, ?)")
		.bind(name)
		.bind(product_id as i64)
		.bind(team_id as i64)
		.execute(pool)
		.await
		.unwrap();
	result.last_insert_rowid() as u32
}

/// Insert a hostgroup row directly, seeding everything it points at.
pub async fn insert_hostgroup(pool: &SqlitePool, name: &str) -> u32 {
	let cluster_id = insert_named(pool, "clusters", &format!("{name}-cluster")).await;
	let datacenter_id = insert_named(pool, "datacenters", &format!("{name}-dc")).await;
	let env_id = insert_named(pool, "envs", &format!("{name}-env")).await;
	let product_id = insert_named(pool, "products", &format!("{name}-product")).await;
	let team_id = insert_named(pool, "teams", &format!("{name}-team")).await;
	let result = sqlx::query(
		r#"
		INSERT INTO hostgroups (name, cluster_id, datacenter_id, env_id, product_id, team_id)
		VALUES (?, ?, ?, ?, ?, ?)
		"#,
	)
	.bind(name)
	.bind(cluster_id as i64)
	.bind(datacenter_id as i64)
	.bind(env_id as i64)
	.bind(product_id as i64)
	.bind(team_id as i64)
	.execute(pool)
	.await
	.unwrap();
	result.last_insert_rowid() as u32
}

/// One of everything a hostgroup needs to point at.
#[derive(Debug, Clone, Copy)]
pub struct Placement {
	pub cluster_id: u32,
	pub datacenter_id: u32,
	pub env_id: u32,
	pub product_id: u32,
	pub team_id: u32,
}

impl Placement {
	pub fn new_hostgroup(&self, name: &str) -> NewHostgroup {
		NewHostgroup {
			name: name.to_string(),
			cluster_id: self.cluster_id,
			datacenter_id: self.datacenter_id,
			env_id: self.env_id,
			product_id: self.product_id,
			team_id: self.team_id,
		}
	}
}

pub async fn seed_placement(pool: &SqlitePool) -> Placement {
	Placement {
		cluster_id: insert_named(pool, "clusters", "c1").await,
		datacenter_id: insert_named(pool, "datacenters", "dc1").await,
		env_id: insert_named(pool, "envs", "prod").await,
		product_id: insert_named(pool, "products", "billing").await,
		team_id: insert_named(pool, "teams", "core").await,
	}
}
