// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Relationship integrity and capability matching for the Atlas catalog.
//!
//! The catalog links its entities (teams, products, datacenters,
//! environments, clusters, hostgroups, applications, features, tags) through
//! loosely-typed id references with no database-level foreign keys. This
//! crate keeps that graph consistent and answers placement queries over it:
//!
//! - [`RequirementRegistry`]: counts references to an id set across every
//!   repository that can hold one, gating deletes
//!   ([`DbError::StillReferenced`]) and creates/updates
//!   ([`DbError::DanglingReference`])
//! - [`RelationRepository`]: one parametrized repository for every
//!   many-to-many link table, driven by static [`RelationTable`] descriptors
//! - [`ApplicationRepository`] / [`HostgroupRepository`]: the foreign-key
//!   bearing entities, with presence-checked creation and registry-gated
//!   deletion
//! - [`CapabilityMatcher`]: selects hostgroups whose feature set is a
//!   superset of a request, narrowed by ownership and sharing
//!
//! Every operation has an `*_in` variant taking `&mut SqliteConnection` so
//! check-then-act pairs run inside one transaction; the pool-backed variants
//! are for single-statement auto-commit use only.

pub mod app;
pub mod error;
pub mod hostgroup;
pub mod matcher;
pub mod pool;
pub mod relation;
pub mod require;
pub mod testing;

pub use app::{Application, ApplicationRepository, NewApplication};
pub use error::{DbError, Result};
pub use hostgroup::{Hostgroup, HostgroupRepository, NewHostgroup};
pub use matcher::CapabilityMatcher;
pub use pool::create_pool;
pub use relation::{RelationRepository, RelationTable, ALL_RELATIONS};
pub use require::{ensure_exists, RequireCounter, RequireKind, RequirementRegistry};
