// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Hostgroup repository.
//!
//! Hostgroups carry the widest fan of foreign ids in the catalog: cluster,
//! datacenter, environment, owning product, and owning team. The same two
//! integrity patterns as applications apply: presence checks on create,
//! registry-gated delete.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::{Row, SqliteConnection};

use crate::error::{DbError, Result};
use crate::require::{
	ensure_exists, placeholders, RequireCounter, RequireKind, RequirementRegistry,
};

/// A group of hosts placed in one cluster/datacenter/environment, owned by a
/// product and a team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hostgroup {
	pub id: u32,
	pub name: String,
	pub cluster_id: u32,
	pub datacenter_id: u32,
	pub env_id: u32,
	pub product_id: u32,
	pub team_id: u32,
}

/// Fields for creating a hostgroup.
#[derive(Debug, Clone)]
pub struct NewHostgroup {
	pub name: String,
	pub cluster_id: u32,
	pub datacenter_id: u32,
	pub env_id: u32,
	pub product_id: u32,
	pub team_id: u32,
}

/// Repository for hostgroup rows.
#[derive(Clone)]
pub struct HostgroupRepository {
	pool: SqlitePool,
}

impl HostgroupRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	/// Create a hostgroup on the default connection.
	pub async fn create_hostgroup(&self, hostgroup: &NewHostgroup) -> Result<u32> {
		let mut conn = self.pool.acquire().await?;
		self.create_hostgroup_in(&mut conn, hostgroup).await
	}

	/// Create a hostgroup inside a caller-owned transaction.
	///
	/// # Errors
	/// Returns [`DbError::DanglingReference`] naming the first missing
	/// foreign id, `DbError::Conflict` on a duplicate name.
	#[tracing::instrument(skip(self, conn, hostgroup), fields(name = %hostgroup.name))]
	pub async fn create_hostgroup_in(
		&self,
		conn: &mut SqliteConnection,
		hostgroup: &NewHostgroup,
	) -> Result<u32> {
		ensure_exists(&mut *conn, RequireKind::Cluster, hostgroup.cluster_id).await?;
		ensure_exists(&mut *conn, RequireKind::Datacenter, hostgroup.datacenter_id).await?;
		ensure_exists(&mut *conn, RequireKind::Env, hostgroup.env_id).await?;
		ensure_exists(&mut *conn, RequireKind::Product, hostgroup.product_id).await?;
		ensure_exists(&mut *conn, RequireKind::Team, hostgroup.team_id).await?;

		let result = sqlx::query(
			r#"
			INSERT INTO hostgroups (name, cluster_id, datacenter_id, env_id, product_id, team_id)
			VALUES (?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(&hostgroup.name)
		.bind(hostgroup.cluster_id as i64)
		.bind(hostgroup.datacenter_id as i64)
		.bind(hostgroup.env_id as i64)
		.bind(hostgroup.product_id as i64)
		.bind(hostgroup.team_id as i64)
		.execute(&mut *conn)
		.await;

		match result {
			Ok(done) => {
				let id = done.last_insert_rowid() as u32;
				tracing::debug!(hostgroup_id = id, "hostgroup created");
				Ok(id)
			}
			Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(DbError::Conflict(
				format!("hostgroup {:?} already exists", hostgroup.name),
			)),
			Err(e) => Err(e.into()),
		}
	}

	/// Get a hostgroup by id.
	pub async fn get_hostgroup(&self, id: u32) -> Result<Option<Hostgroup>> {
		let mut conn = self.pool.acquire().await?;
		self.get_hostgroup_in(&mut conn, id).await
	}

	pub async fn get_hostgroup_in(
		&self,
		conn: &mut SqliteConnection,
		id: u32,
	) -> Result<Option<Hostgroup>> {
		let row = sqlx::query(
			r#"
			SELECT id, name, cluster_id, datacenter_id, env_id, product_id, team_id
			FROM hostgroups
			WHERE id = ?
			"#,
		)
		.bind(id as i64)
		.fetch_optional(&mut *conn)
		.await?;

		Ok(row.map(|r| row_to_hostgroup(&r)))
	}

	/// Delete a hostgroup on the default connection.
	pub async fn delete_hostgroup(&self, registry: &RequirementRegistry, id: u32) -> Result<()> {
		let mut conn = self.pool.acquire().await?;
		self.delete_hostgroup_in(&mut conn, registry, id).await
	}

	/// Delete a hostgroup inside a caller-owned transaction, refused while
	/// relation rows still reference it.
	#[tracing::instrument(skip(self, conn, registry), fields(hostgroup_id = id))]
	pub async fn delete_hostgroup_in(
		&self,
		conn: &mut SqliteConnection,
		registry: &RequirementRegistry,
		id: u32,
	) -> Result<()> {
		registry
			.ensure_unreferenced(&mut *conn, RequireKind::Hostgroup, &[id])
			.await?;

		let result = sqlx::query("DELETE FROM hostgroups WHERE id = ?")
			.bind(id as i64)
			.execute(&mut *conn)
			.await?;

		if result.rows_affected() == 0 {
			return Err(DbError::NotFound(format!("hostgroup {id}")));
		}
		tracing::debug!("hostgroup deleted");
		Ok(())
	}
}

#[async_trait]
impl RequireCounter for HostgroupRepository {
	async fn count_references(
		&self,
		conn: &mut SqliteConnection,
		kind: RequireKind,
		ids: &[u32],
	) -> Result<i64> {
		let column = match kind {
			RequireKind::Cluster => "cluster_id",
			RequireKind::Datacenter => "datacenter_id",
			RequireKind::Env => "env_id",
			RequireKind::Product => "product_id",
			RequireKind::Team => "team_id",
			_ => return Ok(0),
		};
		if ids.is_empty() {
			return Err(DbError::EmptyIdSet("ids"));
		}

		let sql = format!(
			"SELECT COUNT(*) FROM hostgroups WHERE {} IN ({})",
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

fn row_to_hostgroup(row: &SqliteRow) -> Hostgroup {
	Hostgroup {
		id: row.get::<i64, _>("id") as u32,
		name: row.get("name"),
		cluster_id: row.get::<i64, _>("cluster_id") as u32,
		datacenter_id: row.get::<i64, _>("datacenter_id") as u32,
		env_id: row.get::<i64, _>("env_id") as u32,
		product_id: row.get::<i64, _>("product_id") as u32,
		team_id: row.get::<i64, _>("team_id") as u32,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::relation::{RelationRepository, HOSTGROUP_FEATURES};
	use crate::testing::{create_catalog_test_pool, insert_named, seed_placement};

	#[tokio::test]
	async fn test_create_and_get_hostgroup() {
		let pool = create_catalog_test_pool().await;
		let repo = HostgroupRepository::new(pool.clone());
		let placement = seed_placement(&pool).await;

		let id = repo
			.create_hostgroup(&placement.new_hostgroup("hg-web"))
			.await
			.unwrap();
		let hostgroup = repo.get_hostgroup(id).await.unwrap().unwrap();
		assert_eq!(hostgroup.name, "hg-web");
		assert_eq!(hostgroup.cluster_id, placement.cluster_id);
		assert_eq!(hostgroup.team_id, placement.team_id);
	}

	#[tokio::test]
	async fn test_create_hostgroup_rejects_dangling_cluster() {
		let pool = create_catalog_test_pool().await;
		let repo = HostgroupRepository::new(pool.clone());
		let mut placement = seed_placement(&pool).await;
		placement.cluster_id = 777;

		let err = repo
			.create_hostgroup(&placement.new_hostgroup("hg-web"))
			.await
			.unwrap_err();
		assert!(matches!(
			err,
			DbError::DanglingReference {
				kind: RequireKind::Cluster,
				id: 777
			}
		));
	}

	#[tokio::test]
	async fn test_hostgroup_blocks_cluster_delete() {
		let pool = create_catalog_test_pool().await;
		let registry = RequirementRegistry::standard(&pool);
		let repo = HostgroupRepository::new(pool.clone());
		let placement = seed_placement(&pool).await;

		repo.create_hostgroup(&placement.new_hostgroup("hg-web"))
			.await
			.unwrap();

		let mut conn = pool.acquire().await.unwrap();
		let err = registry
			.ensure_unreferenced(&mut conn, RequireKind::Cluster, &[placement.cluster_id])
			.await
			.unwrap_err();
		assert!(matches!(
			err,
			DbError::StillReferenced {
				kind: RequireKind::Cluster,
				count: 1
			}
		));
	}

	#[tokio::test]
	async fn test_delete_hostgroup_refused_while_shared() {
		let pool = create_catalog_test_pool().await;
		let registry = RequirementRegistry::standard(&pool);
		let repo = HostgroupRepository::new(pool.clone());
		let placement = seed_placement(&pool).await;

		let id = repo
			.create_hostgroup(&placement.new_hostgroup("hg-web"))
			.await
			.unwrap();
		let feature_id = insert_named(&pool, "features", "cpu-amd").await;
		let features = RelationRepository::new(pool.clone(), &HOSTGROUP_FEATURES);
		features.link(id, feature_id).await.unwrap();

		let err = repo.delete_hostgroup(&registry, id).await.unwrap_err();
		assert!(matches!(
			err,
			DbError::StillReferenced {
				kind: RequireKind::Hostgroup,
				..
			}
		));

		let mut conn = pool.acquire().await.unwrap();
		features.unlink_all_left_in(&mut conn, id).await.unwrap();
		repo.delete_hostgroup_in(&mut conn, &registry, id).await.unwrap();
		assert!(repo.get_hostgroup(id).await.unwrap().is_none());
	}

	#[tokio::test]
	async fn test_product_references_sum_across_apps_and_hostgroups() {
		let pool = create_catalog_test_pool().await;
		let registry = RequirementRegistry::standard(&pool);
		let repo = HostgroupRepository::new(pool.clone());
		let placement = seed_placement(&pool).await;

		repo.create_hostgroup(&placement.new_hostgroup("hg-web"))
			.await
			.unwrap();
		let apps = crate::app::ApplicationRepository::new(pool.clone());
		apps.create_app(&crate::app::NewApplication {
			name: "web".to_string(),
			product_id: placement.product_id,
			team_id: placement.team_id,
		})
		.await
		.unwrap();

		let mut conn = pool.acquire().await.unwrap();
		let count = registry
			.count_references(&mut conn, RequireKind::Product, &[placement.product_id])
			.await
			.unwrap();
		assert_eq!(count, 2);
	}
}
