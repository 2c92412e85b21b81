// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Capability matching: which hostgroups can run an application?
//!
//! A hostgroup is eligible when its attached feature set is a **superset**
//! of the requested features (it may carry more, never fewer of the
//! requested ones), and its product/team scoping admits the requesting
//! product/team — direct ownership or an explicit share row.
//!
//! Superset containment is proven without fetching each hostgroup's full
//! feature list: restrict the hostgroup↔feature rows to the requested ids,
//! group by hostgroup, and keep groups whose distinct matched-feature count
//! equals the request size.
//!
//! This is an advisory placement query: it reads a committed snapshot and
//! may be stale the moment it returns, which is acceptable here and would
//! not be for a security decision.

use std::collections::BTreeSet;

use sqlx::sqlite::SqlitePool;
use sqlx::SqliteConnection;

use crate::error::{DbError, Result};
use crate::require::placeholders;

/// Selects hostgroups by feature superset and ownership scoping.
#[derive(Clone)]
pub struct CapabilityMatcher {
	pool: SqlitePool,
}

impl CapabilityMatcher {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	/// Match on the default connection.
	pub async fn match_hostgroups(
		&self,
		feature_ids: &[u32],
		product_id: u32,
		team_id: u32,
	) -> Result<BTreeSet<u32>> {
		let mut conn = self.pool.acquire().await?;
		self.match_hostgroups_in(&mut conn, feature_ids, product_id, team_id)
			.await
	}

	/// Match on a caller-owned connection.
	///
	/// Returns the empty set when nothing matches. Matching against "no
	/// requirement" is the caller's special case, not this function's:
	///
	/// # Errors
	/// Returns [`DbError::EmptyIdSet`] when `feature_ids` is empty.
	#[tracing::instrument(skip(self, conn, feature_ids), fields(features = feature_ids.len(), product_id, team_id))]
	pub async fn match_hostgroups_in(
		&self,
		conn: &mut SqliteConnection,
		feature_ids: &[u32],
		product_id: u32,
		team_id: u32,
	) -> Result<BTreeSet<u32>> {
		if feature_ids.is_empty() {
			return Err(DbError::EmptyIdSet("feature_ids"));
		}
		let requested: BTreeSet<u32> = feature_ids.iter().copied().collect();

		let candidates = self.feature_superset_candidates(&mut *conn, &requested).await?;
		if candidates.is_empty() {
			return Ok(BTreeSet::new());
		}

		self.scope_to_owner(&mut *conn, &candidates, product_id, team_id)
			.await
	}

	/// Hostgroups whose distinct matched-feature count equals the request
	/// size, which proves their feature set contains every requested id.
	async fn feature_superset_candidates(
		&self,
		conn: &mut SqliteConnection,
		requested: &BTreeSet<u32>,
	) -> Result<Vec<u32>> {
		let sql = format!(
			r#"
			SELECT hostgroup_id
			FROM hostgroup_features
			WHERE feature_id IN ({})
			GROUP BY hostgroup_id
			HAVING COUNT(DISTINCT feature_id) = ?
			"#,
			placeholders(requested.len())
		);
		let mut query = sqlx::query_scalar::<_, i64>(&sql);
		for id in requested {
			query = query.bind(*id as i64);
		}
		query = query.bind(requested.len() as i64);

		let ids = query.fetch_all(&mut *conn).await?;
		Ok(ids.into_iter().map(|id| id as u32).collect())
	}

	/// Independent scoping predicate: direct ownership by the requesting
	/// product or team, or an explicit share row for either.
	async fn scope_to_owner(
		&self,
		conn: &mut SqliteConnection,
		candidates: &[u32],
		product_id: u32,
		team_id: u32,
	) -> Result<BTreeSet<u32>> {
		let sql = format!(
			r#"
			SELECT id
			FROM hostgroups
			WHERE id IN ({})
			AND (
				product_id = ?
				OR team_id = ?
				OR id IN (SELECT hostgroup_id FROM hostgroup_products WHERE product_id = ?)
				OR id IN (SELECT hostgroup_id FROM hostgroup_teams WHERE team_id = ?)
			)
			"#,
			placeholders(candidates.len())
		);
		let mut query = sqlx::query_scalar::<_, i64>(&sql);
		for id in candidates {
			query = query.bind(*id as i64);
		}
		query = query
			.bind(product_id as i64)
			.bind(team_id as i64)
			.bind(product_id as i64)
			.bind(team_id as i64);

		let ids = query.fetch_all(&mut *conn).await?;
		Ok(ids.into_iter().map(|id| id as u32).collect())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::hostgroup::HostgroupRepository;
	use crate::relation::{
		RelationRepository, HOSTGROUP_FEATURES, HOSTGROUP_PRODUCTS, HOSTGROUP_TEAMS,
	};
	use crate::testing::{create_catalog_test_pool, insert_named, seed_placement, Placement};

	struct Fixture {
		pool: SqlitePool,
		matcher: CapabilityMatcher,
		placement: Placement,
		cpu_amd: u32,
		net_public: u32,
		gpu_v100: u32,
	}

	impl Fixture {
		async fn new() -> Self {
			let pool = create_catalog_test_pool().await;
			let placement = seed_placement(&pool).await;
			let cpu_amd = insert_named(&pool, "features", "cpu:amd").await;
			let net_public = insert_named(&pool, "features", "net:public").await;
			let gpu_v100 = insert_named(&pool, "features", "gpu:v100").await;
			Self {
				matcher: CapabilityMatcher::new(pool.clone()),
				pool,
				placement,
				cpu_amd,
				net_public,
				gpu_v100,
			}
		}

		/// A hostgroup owned by the fixture's product/team, carrying the
		/// given features.
		async fn owned_hostgroup(&self, name: &str, features: &[u32]) -> u32 {
			let repo = HostgroupRepository::new(self.pool.clone());
			let id = repo
				.create_hostgroup(&self.placement.new_hostgroup(name))
				.await
				.unwrap();
			let links = RelationRepository::new(self.pool.clone(), &HOSTGROUP_FEATURES);
			for feature in features {
				links.link(id, *feature).await.unwrap();
			}
			id
		}

		async fn matched(&self, features: &[u32]) -> BTreeSet<u32> {
			self.matcher
				.match_hostgroups(features, self.placement.product_id, self.placement.team_id)
				.await
				.unwrap()
		}
	}

	#[tokio::test]
	async fn test_superset_hostgroup_matches_subset_request() {
		let fx = Fixture::new().await;
		let features = [fx.cpu_amd, fx.net_public];
		let hg = fx.owned_hostgroup("hg-web", &features).await;

		assert_eq!(fx.matched(&[fx.cpu_amd]).await, BTreeSet::from([hg]));
	}

	#[tokio::test]
	async fn test_exact_feature_set_matches() {
		let fx = Fixture::new().await;
		let features = [fx.cpu_amd, fx.net_public];
		let hg = fx.owned_hostgroup("hg-web", &features).await;

		assert_eq!(fx.matched(&features).await, BTreeSet::from([hg]));
	}

	#[tokio::test]
	async fn test_missing_feature_disqualifies() {
		let fx = Fixture::new().await;
		fx.owned_hostgroup("hg-web", &[fx.cpu_amd, fx.net_public])
			.await;

		// gpu:v100 is not attached; the request must not match.
		assert!(fx.matched(&[fx.cpu_amd, fx.gpu_v100]).await.is_empty());
	}

	#[tokio::test]
	async fn test_extra_unrelated_features_are_ignored() {
		let fx = Fixture::new().await;
		let hg = fx
			.owned_hostgroup("hg-gpu", &[fx.cpu_amd, fx.net_public, fx.gpu_v100])
			.await;

		assert_eq!(fx.matched(&[fx.gpu_v100]).await, BTreeSet::from([hg]));
	}

	#[tokio::test]
	async fn test_duplicate_requested_ids_collapse() {
		let fx = Fixture::new().await;
		let hg = fx.owned_hostgroup("hg-web", &[fx.cpu_amd]).await;

		let matched = fx.matched(&[fx.cpu_amd, fx.cpu_amd]).await;
		assert_eq!(matched, BTreeSet::from([hg]));
	}

	#[tokio::test]
	async fn test_empty_feature_set_is_an_error() {
		let fx = Fixture::new().await;

		let err = fx
			.matcher
			.match_hostgroups(&[], fx.placement.product_id, fx.placement.team_id)
			.await
			.unwrap_err();
		assert!(matches!(err, DbError::EmptyIdSet("feature_ids")));
	}

	#[tokio::test]
	async fn test_no_match_is_empty_set_not_error() {
		let fx = Fixture::new().await;

		assert!(fx.matched(&[fx.cpu_amd]).await.is_empty());
	}

	#[tokio::test]
	async fn test_unowned_hostgroup_is_filtered_out() {
		let fx = Fixture::new().await;
		let hg = fx.owned_hostgroup("hg-web", &[fx.cpu_amd]).await;

		// Another product/team requesting the same features sees nothing.
		let other = fx
			.matcher
			.match_hostgroups(&[fx.cpu_amd], 9999, 9999)
			.await
			.unwrap();
		assert!(other.is_empty());
		assert_eq!(fx.matched(&[fx.cpu_amd]).await, BTreeSet::from([hg]));
	}

	#[tokio::test]
	async fn test_shared_hostgroup_matches_for_shared_product() {
		let fx = Fixture::new().await;
		let hg = fx.owned_hostgroup("hg-web", &[fx.cpu_amd]).await;
		let other_product = insert_named(&fx.pool, "products", "analytics").await;

		let shares = RelationRepository::new(fx.pool.clone(), &HOSTGROUP_PRODUCTS);
		shares.link(hg, other_product).await.unwrap();

		let matched = fx
			.matcher
			.match_hostgroups(&[fx.cpu_amd], other_product, 9999)
			.await
			.unwrap();
		assert_eq!(matched, BTreeSet::from([hg]));
	}

	#[tokio::test]
	async fn test_shared_hostgroup_matches_for_shared_team() {
		let fx = Fixture::new().await;
		let hg = fx.owned_hostgroup("hg-web", &[fx.cpu_amd]).await;
		let other_team = insert_named(&fx.pool, "teams", "sre").await;

		let shares = RelationRepository::new(fx.pool.clone(), &HOSTGROUP_TEAMS);
		shares.link(hg, other_team).await.unwrap();

		let matched = fx
			.matcher
			.match_hostgroups(&[fx.cpu_amd], 9999, other_team)
			.await
			.unwrap();
		assert_eq!(matched, BTreeSet::from([hg]));
	}

	#[tokio::test]
	async fn test_only_qualifying_hostgroups_are_returned() {
		let fx = Fixture::new().await;
		let full = fx
			.owned_hostgroup("hg-full", &[fx.cpu_amd, fx.net_public])
			.await;
		fx.owned_hostgroup("hg-partial", &[fx.cpu_amd]).await;

		let matched = fx.matched(&[fx.cpu_amd, fx.net_public]).await;
		assert_eq!(matched, BTreeSet::from([full]));
	}
}
