//! §4.7 Policy Gate contract: `authorize(request) -> Decision`.

use crate::error::{PolicyError, Result};
use crate::issue::IssueTracker;
use crate::override_request::{self, OverrideStore};
use crate::rbac;
use crate::route::{Action, ResourceCategory, RouteTable};
use oms_auth::UserContext;
use oms_types::OverrideId;
use std::sync::Arc;

/// Emergency-override headers, when the caller presents them.
#[derive(Debug, Clone)]
pub struct EmergencyOverrideAttempt {
    pub justification: String,
    pub override_token: String,
}

/// Everything the gate needs to reach a decision. Transport-agnostic —
/// an HTTP layer populates this from headers/body before calling
/// [`PolicyGate::authorize`].
#[derive(Debug, Clone)]
pub struct PolicyRequest {
    pub method: String,
    pub path: String,
    pub user: Option<UserContext>,
    pub branch: Option<String>,
    pub issue_id: Option<String>,
    pub emergency_override: Option<EmergencyOverrideAttempt>,
}

/// §4.7: "successful evaluation attaches `{resource_type, action,
/// issue_refs, override?}` to the request context for downstream
/// audit."
#[derive(Debug, Clone)]
pub struct Decision {
    pub allow: bool,
    pub resource_type: ResourceCategory,
    pub action: Action,
    pub required_issue: bool,
    pub issue_refs: Vec<String>,
    pub override_used: Option<OverrideId>,
}

pub struct PolicyGate {
    routes: RouteTable,
    issues: Arc<dyn IssueTracker>,
    overrides: Arc<dyn OverrideStore>,
}

impl PolicyGate {
    pub fn new(routes: RouteTable, issues: Arc<dyn IssueTracker>, overrides: Arc<dyn OverrideStore>) -> Self {
        Self { routes, issues, overrides }
    }

    pub async fn authorize(&self, request: &PolicyRequest) -> Result<Decision> {
        if self.routes.is_public(&request.path) {
            return Ok(Decision {
                allow: true,
                resource_type: ResourceCategory::Schema,
                action: Action::Read,
                required_issue: false,
                issue_refs: Vec::new(),
                override_used: None,
            });
        }

        let entry = self.routes.resolve(&request.method, &request.path).ok_or_else(|| PolicyError::RouteNotRegistered {
            method: request.method.clone(),
            path: request.path.clone(),
        })?;

        let user = request.user.as_ref().ok_or(PolicyError::Unauthenticated)?;

        let destructive = matches!(entry.action, Action::Delete | Action::Merge);
        let requires_issue = entry.requires_issue || destructive;
        let mut issue_refs = Vec::new();
        let mut override_used = None;

        if requires_issue {
            match &request.issue_id {
                Some(issue_id) => {
                    if !self.issues.is_valid(issue_id).await {
                        return Err(PolicyError::InvalidIssue(issue_id.clone()));
                    }
                    issue_refs.push(issue_id.clone());
                }
                None => match &request.emergency_override {
                    Some(attempt) => {
                        let branch = request.branch.as_deref().unwrap_or_default();
                        let approved = override_request::evaluate(&self.overrides, entry.resource, entry.action, branch, &attempt.justification, &attempt.override_token).await?;
                        override_used = Some(approved.id);
                    }
                    None => return Err(PolicyError::IssueRequired),
                },
            }
        }

        if !rbac::check(&user.roles, entry.resource, entry.action) {
            return Err(PolicyError::Forbidden {
                roles: user.roles.clone(),
                resource: entry.resource.to_string(),
                action: entry.action.to_string(),
            });
        }

        Ok(Decision {
            allow: true,
            resource_type: entry.resource,
            action: entry.action,
            required_issue: requires_issue,
            issue_refs,
            override_used,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issue::StaticIssueTracker;
    use crate::override_request::InMemoryOverrideStore;
    use oms_auth::AuthMethod;

    fn gate() -> PolicyGate {
        PolicyGate::new(RouteTable::with_defaults(), Arc::new(StaticIssueTracker::new()), Arc::new(InMemoryOverrideStore::new()))
    }

    fn developer() -> UserContext {
        UserContext {
            user_id: "u1".into(),
            username: "dev".into(),
            email: None,
            roles: vec!["developer".into()],
            tenant: None,
            scopes: Vec::new(),
            auth_method: AuthMethod::Jwt,
            session: None,
            ip: None,
            ua: None,
            is_service_account: false,
        }
    }

    /// §8 S4 — delete without an issue is denied; with one, it's allowed.
    #[tokio::test]
    async fn s4_policy_denial_then_permit_with_issue() {
        let gate = gate();
        let mut request = PolicyRequest {
            method: "DELETE".into(),
            path: "/api/v1/schemas/main/object-types/Person".into(),
            user: Some(developer()),
            branch: Some("main".into()),
            issue_id: None,
            emergency_override: None,
        };
        let denied = gate.authorize(&request).await;
        assert!(matches!(denied, Err(PolicyError::IssueRequired)));

        request.issue_id = Some("OMS-123".into());
        let allowed = gate.authorize(&request).await.unwrap();
        assert!(allowed.allow);
        assert_eq!(allowed.issue_refs, vec!["OMS-123".to_string()]);
    }

    #[tokio::test]
    async fn unregistered_route_denies_every_caller() {
        let gate = gate();
        let request = PolicyRequest {
            method: "PATCH".into(),
            path: "/api/v1/unknown".into(),
            user: Some(developer()),
            branch: None,
            issue_id: None,
            emergency_override: None,
        };
        assert!(matches!(gate.authorize(&request).await, Err(PolicyError::RouteNotRegistered { .. })));
    }

    #[tokio::test]
    async fn missing_identity_on_protected_route_is_unauthenticated() {
        let gate = gate();
        let request = PolicyRequest {
            method: "GET".into(),
            path: "/api/v1/schemas/main/object-types/Person".into(),
            user: None,
            branch: None,
            issue_id: None,
            emergency_override: None,
        };
        assert!(matches!(gate.authorize(&request).await, Err(PolicyError::Unauthenticated)));
    }

    /// §8 S5 — unapproved override is rejected; approved + valid token
    /// + long-enough justification is allowed.
    #[tokio::test]
    async fn s5_emergency_override_requires_approval() {
        let overrides: Arc<dyn OverrideStore> = Arc::new(InMemoryOverrideStore::new());
        let gate = PolicyGate::new(RouteTable::with_defaults(), Arc::new(StaticIssueTracker::new()), overrides.clone());

        let request = PolicyRequest {
            method: "DELETE".into(),
            path: "/api/v1/branches/main".into(),
            user: Some(developer()),
            branch: Some("main".into()),
            issue_id: None,
            emergency_override: Some(EmergencyOverrideAttempt {
                justification: "short".into(),
                override_token: "tok".into(),
            }),
        };
        assert!(matches!(gate.authorize(&request).await, Err(PolicyError::JustificationTooShort)));

        let pending = crate::override_request::OverrideRequest::new("u1", vec!["developer".into()], "BRANCH", "DELETE", "emergency", "main", "a".repeat(60));
        overrides.put(pending.clone()).await;
        let approved = crate::override_request::approve(&overrides, pending.id, "admin1", &["admin".to_string()]).await.unwrap();

        let request = PolicyRequest {
            emergency_override: Some(EmergencyOverrideAttempt {
                justification: "a".repeat(60),
                override_token: approved.override_token.clone().unwrap(),
            }),
            ..request
        };
        let decision = gate.authorize(&request).await.unwrap();
        assert!(decision.override_used.is_some());
    }
}
