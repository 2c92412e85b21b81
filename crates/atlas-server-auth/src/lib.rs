// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Rule-based authorization for the Atlas catalog.
//!
//! This crate decides whether a principal may perform an action on a
//! hierarchically-addressed resource. It has three parts:
//!
//! - [`ResourceAddress`]: a four-segment resource identifier with wildcard
//!   segments and a canonical string form
//! - [`PolicyRepository`]: SQLite-backed storage of allow rules and
//!   role-group memberships, usable inside caller-owned transactions
//! - [`Enforcer`]: the default-deny evaluator combining direct rules,
//!   group-derived roles, and wildcard matching
//!
//! # Example
//!
//! ```
//! use atlas_server_auth::ResourceAddress;
//!
//! // A rule address with wildcard team and instance segments.
//! let rule = ResourceAddress::parse("v1/data/{team}/{resource_id}/alice").unwrap();
//!
//! // A concrete request address.
//! let request = ResourceAddress::wildcard()
//!     .with_resource_type("data")
//!     .with_team("team1")
//!     .with_resource_id("data1")
//!     .with_user("alice");
//!
//! assert!(rule.covers(&request));
//! assert_eq!(request.format(), "v1/data/team1/data1/alice");
//! ```

pub mod address;
pub mod enforcer;
pub mod error;
pub mod model;
pub mod store;
pub mod testing;

pub use address::ResourceAddress;
pub use enforcer::Enforcer;
pub use error::{AuthError, Result};
pub use model::MatchModel;
pub use store::{Group, GroupFilter, PolicyRepository, Rule, RuleFilter};
