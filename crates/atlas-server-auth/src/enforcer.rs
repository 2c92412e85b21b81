// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Authorization decision engine.
//!
//! [`Enforcer::enforce`] answers "may subject S perform action A on resource
//! R?" against the rule and group tables. The algorithm:
//!
//! 1. Resolve the effective subject set: the subject itself plus the roles it
//!    holds via group memberships (one level by default, per
//!    [`MatchModel::role_depth`]).
//! 2. A rule is a candidate when its subject is in the effective set, its
//!    action equals the requested action, and its resource address covers the
//!    request segment by segment (unset rule segments match anything).
//! 3. Allow iff at least one candidate exists. Default deny; there are no
//!    explicit deny rules in this model.
//!
//! Denial is the normal `Ok(false)` outcome, never an error. Evaluation is a
//! pure read of the policy snapshot on the supplied connection; nothing is
//! cached across calls. When a decision gates a mutation, call
//! [`Enforcer::enforce_in`] on the transaction that performs the mutation so
//! the decision and the mutation see the same committed policy state.

use sqlx::SqliteConnection;

use crate::address::ResourceAddress;
use crate::error::{AuthError, Result};
use crate::model::MatchModel;
use crate::store::{GroupFilter, PolicyRepository};

/// Evaluates authorization requests against the policy store.
#[derive(Clone)]
pub struct Enforcer {
	store: PolicyRepository,
	model: MatchModel,
}

impl Enforcer {
	/// Create an enforcer over the given store with the default match model.
	pub fn new(store: PolicyRepository) -> Self {
		Self::with_model(store, MatchModel::default())
	}

	/// Create an enforcer with an explicit match model.
	pub fn with_model(store: PolicyRepository, model: MatchModel) -> Self {
		Self { store, model }
	}

	/// Evaluate a request on the default connection.
	pub async fn enforce(
		&self,
		subject: &str,
		resource: &ResourceAddress,
		action: &str,
	) -> Result<bool> {
		let mut conn = self.store.pool().acquire().await?;
		self.enforce_in(&mut conn, subject, resource, action).await
	}

	/// Evaluate a request on a caller-owned connection, typically the
	/// transaction that performs the guarded mutation.
	///
	/// # Errors
	/// Returns [`AuthError::InvalidResource`] if the request address is not
	/// fully concrete; wildcards are only meaningful in rules and list
	/// filters, not in a request being enforced.
	#[tracing::instrument(skip(self, conn, resource), fields(subject = %subject, action = %action))]
	pub async fn enforce_in(
		&self,
		conn: &mut SqliteConnection,
		subject: &str,
		resource: &ResourceAddress,
		action: &str,
	) -> Result<bool> {
		if !resource.is_concrete() {
			return Err(AuthError::InvalidResource(format!(
				"enforcement requires a fully concrete resource address, got {resource}"
			)));
		}

		let effective = self.effective_subjects(conn, subject).await?;
		let candidates = self.store.rules_for_action_in(conn, action).await?;

		let allowed = candidates.iter().any(|rule| {
			effective.iter().any(|s| *s == rule.subject) && rule.resource.covers(resource)
		});

		tracing::debug!(resource = %resource, allowed, "authorization decision");
		Ok(allowed)
	}

	/// The subject plus every role reachable through group memberships,
	/// resolved to `model.role_depth` levels.
	async fn effective_subjects(
		&self,
		conn: &mut SqliteConnection,
		subject: &str,
	) -> Result<Vec<String>> {
		let mut effective = vec![subject.to_string()];
		let mut frontier = vec![subject.to_string()];

		for _ in 0..self.model.role_depth {
			let mut next = Vec::new();
			for member in &frontier {
				let memberships = self
					.store
					.list_groups_in(
						conn,
						&GroupFilter {
							user: Some(member.clone()),
							role: None,
						},
					)
					.await?;
				for membership in memberships {
					if !effective.contains(&membership.role) {
						effective.push(membership.role.clone());
						next.push(membership.role);
					}
				}
			}
			if next.is_empty() {
				break;
			}
			frontier = next;
		}

		Ok(effective)
	}
}
