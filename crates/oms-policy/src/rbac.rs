//! RBAC matrix (§4.7, canonical, deny-by-default).
//!
//! `check(roles, resource, action) = ∃ role ∈ roles : (resource, action) ∈ matrix[role]`.
//! An unrecognized role name grants nothing — the matrix never has a
//! wildcard entry.

use crate::route::{Action, ResourceCategory};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Developer,
    Reviewer,
    Viewer,
    ServiceAccount,
}

impl FromStr for Role {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "developer" => Ok(Role::Developer),
            "reviewer" => Ok(Role::Reviewer),
            "viewer" => Ok(Role::Viewer),
            "service_account" => Ok(Role::ServiceAccount),
            _ => Err(()),
        }
    }
}

/// One role's permission for one `(resource, action)` pair. Unknown
/// role strings never reach this function — they're filtered out by
/// the caller and so contribute no permissions.
fn role_allows(role: Role, resource: ResourceCategory, action: Action) -> bool {
    use Action::*;
    use ResourceCategory::*;

    match role {
        Role::Admin => match action {
            Create => true,
            Read => true,
            Update => true,
            Delete => !matches!(resource, Schema | ObjectType | Audit),
            Approve => true,
            Merge => true,
            Execute => false,
        },
        Role::Developer => match action {
            Create => resource != Schema,
            Read => true,
            Update => resource != Schema,
            Delete => resource == Branch,
            Approve => false,
            Merge => false,
            Execute => false,
        },
        Role::Reviewer => match action {
            Read => true,
            Approve => resource == Proposal,
            _ => false,
        },
        Role::Viewer => matches!(action, Read),
        Role::ServiceAccount => match action {
            Read => true,
            Execute => resource == Webhook,
            Create => resource == Audit,
            _ => false,
        },
    }
}

/// `true` if any of `roles` grants `(resource, action)`. Role strings
/// that don't parse to a known [`Role`] are simply ignored — deny is
/// the only thing an unrecognized role can produce.
pub fn check(roles: &[String], resource: ResourceCategory, action: Action) -> bool {
    roles
        .iter()
        .filter_map(|r| Role::from_str(r).ok())
        .any(|role| role_allows(role, resource, action))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_cannot_delete_object_type() {
        assert!(!check(&["admin".to_string()], ResourceCategory::ObjectType, Action::Delete));
        assert!(check(&["admin".to_string()], ResourceCategory::Branch, Action::Delete));
    }

    #[test]
    fn developer_cannot_touch_schema_but_can_delete_branch() {
        let roles = vec!["developer".to_string()];
        assert!(!check(&roles, ResourceCategory::Schema, Action::Create));
        assert!(check(&roles, ResourceCategory::Branch, Action::Delete));
        assert!(!check(&roles, ResourceCategory::ObjectType, Action::Delete));
    }

    #[test]
    fn reviewer_only_approves_proposals() {
        let roles = vec!["reviewer".to_string()];
        assert!(check(&roles, ResourceCategory::Proposal, Action::Approve));
        assert!(!check(&roles, ResourceCategory::ObjectType, Action::Approve));
        assert!(!check(&roles, ResourceCategory::ObjectType, Action::Update));
    }

    #[test]
    fn viewer_is_read_only() {
        let roles = vec!["viewer".to_string()];
        assert!(check(&roles, ResourceCategory::ObjectType, Action::Read));
        assert!(!check(&roles, ResourceCategory::ObjectType, Action::Update));
    }

    #[test]
    fn service_account_has_narrow_extras() {
        let roles = vec!["service_account".to_string()];
        assert!(check(&roles, ResourceCategory::Webhook, Action::Execute));
        assert!(check(&roles, ResourceCategory::Audit, Action::Create));
        assert!(!check(&roles, ResourceCategory::ObjectType, Action::Create));
    }

    #[test]
    fn unrecognized_role_grants_nothing() {
        let roles = vec!["superuser".to_string()];
        assert!(!check(&roles, ResourceCategory::ObjectType, Action::Read));
    }
}
