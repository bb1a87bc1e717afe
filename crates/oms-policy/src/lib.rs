//! Deny-by-default policy gate (C7): route resolution, RBAC matrix,
//! issue-tracking enforcement, and the emergency-override workflow.

pub mod error;
pub mod gate;
pub mod issue;
pub mod override_request;
pub mod rbac;
pub mod route;

pub use error::{PolicyError, Result};
pub use gate::{Decision, EmergencyOverrideAttempt, PolicyGate, PolicyRequest};
pub use issue::{IssueTracker, StaticIssueTracker};
pub use override_request::{InMemoryOverrideStore, OverrideRequest, OverrideStatus, OverrideStore};
pub use rbac::Role;
pub use route::{Action, ResourceCategory, RouteEntry, RouteTable};
