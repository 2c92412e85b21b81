// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Durable storage for authorization rules and role-group memberships.
//!
//! Rules are `(subject, resource, action)` allow statements; groups are
//! `(user, role)` memberships. Both live in SQLite behind
//! [`PolicyRepository`]. Every operation has an `*_in` variant taking a
//! `&mut SqliteConnection` so policy mutations can share a transaction with
//! the entity mutation they guard; the plain variants run against the pool
//! (auto-commit).
//!
//! Uniqueness is enforced by UNIQUE constraints at the storage layer, so two
//! concurrent identical inserts resolve to one success and one
//! [`AuthError::RuleExists`] / [`AuthError::GroupExists`] without any
//! in-process locking.

use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::{Row, SqliteConnection};

use crate::address::ResourceAddress;
use crate::error::{AuthError, Result};

/// An explicit allow statement: subject may perform action on anything the
/// resource address covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
	pub subject: String,
	pub resource: ResourceAddress,
	pub action: String,
}

impl Rule {
	pub fn new(
		subject: impl Into<String>,
		resource: ResourceAddress,
		action: impl Into<String>,
	) -> Self {
		Self {
			subject: subject.into(),
			resource,
			action: action.into(),
		}
	}
}

/// A role-group membership: user holds role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
	pub user: String,
	pub role: String,
}

impl Group {
	pub fn new(user: impl Into<String>, role: impl Into<String>) -> Self {
		Self {
			user: user.into(),
			role: role.into(),
		}
	}
}

/// Filter for [`PolicyRepository::list_rules`]. Fields are matched by exact
/// string equality (the resource by its rendered canonical form); an empty
/// filter lists everything.
#[derive(Debug, Clone, Default)]
pub struct RuleFilter {
	pub subject: Option<String>,
	pub resource: Option<ResourceAddress>,
}

/// Filter for [`PolicyRepository::list_groups`]. Exact equality per field;
/// empty filter lists everything.
#[derive(Debug, Clone, Default)]
pub struct GroupFilter {
	pub user: Option<String>,
	pub role: Option<String>,
}

/// Repository for authorization rules and group memberships.
#[derive(Clone)]
pub struct PolicyRepository {
	pool: SqlitePool,
}

impl PolicyRepository {
	/// Create a new repository with the given pool.
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	pub(crate) fn pool(&self) -> &SqlitePool {
		&self.pool
	}

	// =========================================================================
	// Rules
	// =========================================================================

	/// Add a rule on the default connection.
	pub async fn add_rule(&self, rule: &Rule) -> Result<()> {
		let mut conn = self.pool.acquire().await?;
		self.add_rule_in(&mut conn, rule).await
	}

	/// Add a rule inside a caller-owned transaction.
	///
	/// # Errors
	/// Returns [`AuthError::RuleExists`] if the exact triple is already
	/// present.
	#[tracing::instrument(skip(self, conn, rule), fields(subject = %rule.subject, action = %rule.action))]
	pub async fn add_rule_in(&self, conn: &mut SqliteConnection, rule: &Rule) -> Result<()> {
		let result = sqlx::query(
			r#"
			INSERT INTO policy_rules (subject, resource, action)
			VALUES (?, ?, ?)
			"#,
		)
		.bind(&rule.subject)
		.bind(rule.resource.format())
		.bind(&rule.action)
		.execute(&mut *conn)
		.await;

		match result {
			Ok(_) => {
				tracing::debug!(resource = %rule.resource, "rule added");
				Ok(())
			}
			Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(AuthError::RuleExists),
			Err(e) => Err(e.into()),
		}
	}

	/// Remove a rule on the default connection.
	pub async fn remove_rule(&self, rule: &Rule) -> Result<()> {
		let mut conn = self.pool.acquire().await?;
		self.remove_rule_in(&mut conn, rule).await
	}

	/// Remove a rule inside a caller-owned transaction.
	///
	/// # Errors
	/// Returns [`AuthError::RuleNotFound`] if the triple is absent.
	#[tracing::instrument(skip(self, conn, rule), fields(subject = %rule.subject, action = %rule.action))]
	pub async fn remove_rule_in(&self, conn: &mut SqliteConnection, rule: &Rule) -> Result<()> {
		let result = sqlx::query(
			r#"
			DELETE FROM policy_rules
			WHERE subject = ? AND resource = ? AND action = ?
			"#,
		)
		.bind(&rule.subject)
		.bind(rule.resource.format())
		.bind(&rule.action)
		.execute(&mut *conn)
		.await?;

		if result.rows_affected() == 0 {
			return Err(AuthError::RuleNotFound);
		}
		tracing::debug!(resource = %rule.resource, "rule removed");
		Ok(())
	}

	/// List rules matching the filter on the default connection.
	pub async fn list_rules(&self, filter: &RuleFilter) -> Result<Vec<Rule>> {
		let mut conn = self.pool.acquire().await?;
		self.list_rules_in(&mut conn, filter).await
	}

	/// List rules matching the filter inside a caller-owned transaction.
	pub async fn list_rules_in(
		&self,
		conn: &mut SqliteConnection,
		filter: &RuleFilter,
	) -> Result<Vec<Rule>> {
		let rows = match (&filter.subject, &filter.resource) {
			(Some(subject), Some(resource)) => {
				sqlx::query(
					"SELECT subject, resource, action FROM policy_rules WHERE subject = ? AND resource = ? ORDER BY id",
				)
				.bind(subject)
				.bind(resource.format())
				.fetch_all(&mut *conn)
				.await?
			}
			(Some(subject), None) => {
				sqlx::query(
					"SELECT subject, resource, action FROM policy_rules WHERE subject = ? ORDER BY id",
				)
				.bind(subject)
				.fetch_all(&mut *conn)
				.await?
			}
			(None, Some(resource)) => {
				sqlx::query(
					"SELECT subject, resource, action FROM policy_rules WHERE resource = ? ORDER BY id",
				)
				.bind(resource.format())
				.fetch_all(&mut *conn)
				.await?
			}
			(None, None) => {
				sqlx::query("SELECT subject, resource, action FROM policy_rules ORDER BY id")
					.fetch_all(&mut *conn)
					.await?
			}
		};

		rows.iter().map(row_to_rule).collect()
	}

	/// List rules for one action, used by the enforcer to narrow the
	/// candidate set before wildcard matching.
	pub(crate) async fn rules_for_action_in(
		&self,
		conn: &mut SqliteConnection,
		action: &str,
	) -> Result<Vec<Rule>> {
		let rows = sqlx::query(
			"SELECT subject, resource, action FROM policy_rules WHERE action = ? ORDER BY id",
		)
		.bind(action)
		.fetch_all(&mut *conn)
		.await?;

		rows.iter().map(row_to_rule).collect()
	}

	// =========================================================================
	// Groups
	// =========================================================================

	/// Add a group membership on the default connection.
	pub async fn add_group(&self, group: &Group) -> Result<()> {
		let mut conn = self.pool.acquire().await?;
		self.add_group_in(&mut conn, group).await
	}

	/// Add a group membership inside a caller-owned transaction.
	///
	/// # Errors
	/// Returns [`AuthError::GroupExists`] if the pair is already present.
	#[tracing::instrument(skip(self, conn, group), fields(user = %group.user, role = %group.role))]
	pub async fn add_group_in(&self, conn: &mut SqliteConnection, group: &Group) -> Result<()> {
		let result = sqlx::query(
			r#"
			INSERT INTO policy_groups (user, role)
			VALUES (?, ?)
			"#,
		)
		.bind(&group.user)
		.bind(&group.role)
		.execute(&mut *conn)
		.await;

		match result {
			Ok(_) => {
				tracing::debug!("group membership added");
				Ok(())
			}
			Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(AuthError::GroupExists),
			Err(e) => Err(e.into()),
		}
	}

	/// Remove a group membership on the default connection.
	pub async fn remove_group(&self, group: &Group) -> Result<()> {
		let mut conn = self.pool.acquire().await?;
		self.remove_group_in(&mut conn, group).await
	}

	/// Remove a group membership inside a caller-owned transaction.
	///
	/// # Errors
	/// Returns [`AuthError::GroupNotFound`] if the pair is absent.
	#[tracing::instrument(skip(self, conn, group), fields(user = %group.user, role = %group.role))]
	pub async fn remove_group_in(&self, conn: &mut SqliteConnection, group: &Group) -> Result<()> {
		let result = sqlx::query(
			r#"
			DELETE FROM policy_groups
			WHERE user = ? AND role = ?
			"#,
		)
		.bind(&group.user)
		.bind(&group.role)
		.execute(&mut *conn)
		.await?;

		if result.rows_affected() == 0 {
			return Err(AuthError::GroupNotFound);
		}
		tracing::debug!("group membership removed");
		Ok(())
	}

	/// List group memberships matching the filter on the default connection.
	pub async fn list_groups(&self, filter: &GroupFilter) -> Result<Vec<Group>> {
		let mut conn = self.pool.acquire().await?;
		self.list_groups_in(&mut conn, filter).await
	}

	/// List group memberships matching the filter inside a caller-owned
	/// transaction.
	pub async fn list_groups_in(
		&self,
		conn: &mut SqliteConnection,
		filter: &GroupFilter,
	) -> Result<Vec<Group>> {
		let rows = match (&filter.user, &filter.role) {
			(Some(user), Some(role)) => {
				sqlx::query(
					"SELECT user, role FROM policy_groups WHERE user = ? AND role = ? ORDER BY id",
				)
				.bind(user)
				.bind(role)
				.fetch_all(&mut *conn)
				.await?
			}
			(Some(user), None) => {
				sqlx::query("SELECT user, role FROM policy_groups WHERE user = ? ORDER BY id")
					.bind(user)
					.fetch_all(&mut *conn)
					.await?
			}
			(None, Some(role)) => {
				sqlx::query("SELECT user, role FROM policy_groups WHERE role = ? ORDER BY id")
					.bind(role)
					.fetch_all(&mut *conn)
					.await?
			}
			(None, None) => {
				sqlx::query("SELECT user, role FROM policy_groups ORDER BY id")
					.fetch_all(&mut *conn)
					.await?
			}
		};

		Ok(rows.iter().map(row_to_group).collect())
	}
}

fn row_to_rule(row: &SqliteRow) -> Result<Rule> {
	Ok(Rule {
		subject: row.get("subject"),
		resource: ResourceAddress::parse(&row.get::<String, _>("resource"))?,
		action: row.get("action"),
	})
}

fn row_to_group(row: &SqliteRow) -> Group {
	Group {
		user: row.get("user"),
		role: row.get("role"),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::create_policy_test_pool;

	fn data_rule(subject: &str, user_segment: &str) -> Rule {
		Rule::new(
			subject,
			ResourceAddress::wildcard()
				.with_resource_type("data")
				.with_user(user_segment),
			"read",
		)
	}

	#[tokio::test]
	async fn test_add_and_list_rules() {
		let pool = create_policy_test_pool().await;
		let repo = PolicyRepository::new(pool);

		repo.add_rule(&data_rule("alice", "alice")).await.unwrap();
		repo.add_rule(&data_rule("bob", "bob")).await.unwrap();

		let all = repo.list_rules(&RuleFilter::default()).await.unwrap();
		assert_eq!(all.len(), 2);
		assert_eq!(all[0].subject, "alice");
		assert_eq!(all[0].resource.resource_type.as_deref(), Some("data"));
		assert_eq!(all[0].resource.team, None);
	}

	#[tokio::test]
	async fn test_duplicate_rule_is_rejected() {
		let pool = create_policy_test_pool().await;
		let repo = PolicyRepository::new(pool);
		let rule = data_rule("alice", "alice");

		repo.add_rule(&rule).await.unwrap();
		let err = repo.add_rule(&rule).await.unwrap_err();
		assert!(matches!(err, AuthError::RuleExists));

		// Exactly one row survives both calls.
		let all = repo.list_rules(&RuleFilter::default()).await.unwrap();
		assert_eq!(all.len(), 1);
	}

	#[tokio::test]
	async fn test_remove_rule() {
		let pool = create_policy_test_pool().await;
		let repo = PolicyRepository::new(pool);
		let rule = data_rule("alice", "alice");

		repo.add_rule(&rule).await.unwrap();
		repo.remove_rule(&rule).await.unwrap();

		let all = repo.list_rules(&RuleFilter::default()).await.unwrap();
		assert!(all.is_empty());
	}

	#[tokio::test]
	async fn test_remove_missing_rule_is_not_found() {
		let pool = create_policy_test_pool().await;
		let repo = PolicyRepository::new(pool);

		let err = repo.remove_rule(&data_rule("alice", "alice")).await.unwrap_err();
		assert!(matches!(err, AuthError::RuleNotFound));
	}

	#[tokio::test]
	async fn test_list_rules_filters_by_subject() {
		let pool = create_policy_test_pool().await;
		let repo = PolicyRepository::new(pool);

		repo.add_rule(&data_rule("alice", "alice")).await.unwrap();
		repo.add_rule(&data_rule("bob", "bob")).await.unwrap();

		let filter = RuleFilter {
			subject: Some("alice".to_string()),
			resource: None,
		};
		let rules = repo.list_rules(&filter).await.unwrap();
		assert_eq!(rules.len(), 1);
		assert_eq!(rules[0].subject, "alice");
	}

	#[tokio::test]
	async fn test_list_rules_filters_by_rendered_resource() {
		let pool = create_policy_test_pool().await;
		let repo = PolicyRepository::new(pool);

		repo.add_rule(&data_rule("alice", "alice")).await.unwrap();
		repo.add_rule(&data_rule("bob", "bob")).await.unwrap();

		// Exact string equality on the rendered form, not wildcard-aware.
		let filter = RuleFilter {
			subject: None,
			resource: Some(
				ResourceAddress::wildcard()
					.with_resource_type("data")
					.with_user("bob"),
			),
		};
		let rules = repo.list_rules(&filter).await.unwrap();
		assert_eq!(rules.len(), 1);
		assert_eq!(rules[0].subject, "bob");
	}

	#[tokio::test]
	async fn test_add_and_list_groups() {
		let pool = create_policy_test_pool().await;
		let repo = PolicyRepository::new(pool);

		repo.add_group(&Group::new("alice", "admin")).await.unwrap();
		repo.add_group(&Group::new("alice", "reader")).await.unwrap();
		repo.add_group(&Group::new("bob", "admin")).await.unwrap();

		let alice = repo
			.list_groups(&GroupFilter {
				user: Some("alice".to_string()),
				role: None,
			})
			.await
			.unwrap();
		assert_eq!(alice.len(), 2);

		let admins = repo
			.list_groups(&GroupFilter {
				user: None,
				role: Some("admin".to_string()),
			})
			.await
			.unwrap();
		assert_eq!(admins.len(), 2);

		let all = repo.list_groups(&GroupFilter::default()).await.unwrap();
		assert_eq!(all.len(), 3);
	}

	#[tokio::test]
	async fn test_duplicate_group_is_rejected() {
		let pool = create_policy_test_pool().await;
		let repo = PolicyRepository::new(pool);
		let group = Group::new("alice", "admin");

		repo.add_group(&group).await.unwrap();
		let err = repo.add_group(&group).await.unwrap_err();
		assert!(matches!(err, AuthError::GroupExists));
	}

	#[tokio::test]
	async fn test_remove_missing_group_is_not_found() {
		let pool = create_policy_test_pool().await;
		let repo = PolicyRepository::new(pool);

		let err = repo
			.remove_group(&Group::new("alice", "admin"))
			.await
			.unwrap_err();
		assert!(matches!(err, AuthError::GroupNotFound));
	}

	#[tokio::test]
	async fn test_policy_mutations_compose_in_a_transaction() {
		let pool = create_policy_test_pool().await;
		let repo = PolicyRepository::new(pool.clone());

		let mut tx = pool.begin().await.unwrap();
		repo.add_rule_in(&mut tx, &data_rule("admin", "alice"))
			.await
			.unwrap();
		repo.add_group_in(&mut tx, &Group::new("alice", "admin"))
			.await
			.unwrap();
		tx.rollback().await.unwrap();

		// Rolled back together: neither row is visible.
		assert!(repo.list_rules(&RuleFilter::default()).await.unwrap().is_empty());
		assert!(repo
			.list_groups(&GroupFilter::default())
			.await
			.unwrap()
			.is_empty());
	}

	#[test]
	fn rule_serializes_for_audit_logging() {
		let rule = data_rule("alice", "alice");
		let json = serde_json::to_value(&rule).unwrap();
		assert_eq!(json["subject"], "alice");
		assert_eq!(json["action"], "read");
		assert_eq!(json["resource"]["resource_type"], "data");
	}
}
