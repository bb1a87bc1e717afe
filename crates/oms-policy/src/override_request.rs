//! Emergency override workflow (§4.7, §9 open question: "enforce
//! `reviewer`-or-`admin`-only approvals unless explicitly relaxed").

use crate::error::{PolicyError, Result};
use crate::rbac::Role;
use crate::route::{Action, ResourceCategory};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use oms_types::OverrideId;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

pub const DEFAULT_OVERRIDE_TTL_S: i64 = 3600;
pub const MIN_JUSTIFICATION_LEN: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OverrideStatus {
    Pending,
    Approved,
    Denied,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverrideRequest {
    pub id: OverrideId,
    pub requester_id: String,
    pub requester_roles: Vec<String>,
    pub resource: String,
    pub action: String,
    pub change_type: String,
    pub branch: String,
    pub justification: String,
    pub status: OverrideStatus,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub override_token: Option<String>,
}

impl OverrideRequest {
    pub fn new(requester_id: impl Into<String>, requester_roles: Vec<String>, resource: impl Into<String>, action: impl Into<String>, change_type: impl Into<String>, branch: impl Into<String>, justification: impl Into<String>) -> Self {
        Self {
            id: OverrideId::new(),
            requester_id: requester_id.into(),
            requester_roles,
            resource: resource.into(),
            action: action.into(),
            change_type: change_type.into(),
            branch: branch.into(),
            justification: justification.into(),
            status: OverrideStatus::Pending,
            approved_by: None,
            approved_at: None,
            expires_at: Utc::now() + Duration::seconds(DEFAULT_OVERRIDE_TTL_S),
            override_token: None,
        }
    }

    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.status == OverrideStatus::Approved && now <= self.expires_at
    }
}

#[async_trait]
pub trait OverrideStore: Send + Sync {
    async fn get(&self, id: OverrideId) -> Option<OverrideRequest>;
    async fn put(&self, request: OverrideRequest);
    async fn find_active_for(&self, resource: &str, action: &str, branch: &str, token: &str) -> Option<OverrideRequest>;
}

#[derive(Default)]
pub struct InMemoryOverrideStore {
    requests: DashMap<OverrideId, OverrideRequest>,
}

impl InMemoryOverrideStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OverrideStore for InMemoryOverrideStore {
    async fn get(&self, id: OverrideId) -> Option<OverrideRequest> {
        self.requests.get(&id).map(|r| r.clone())
    }

    async fn put(&self, request: OverrideRequest) {
        self.requests.insert(request.id, request);
    }

    async fn find_active_for(&self, resource: &str, action: &str, branch: &str, token: &str) -> Option<OverrideRequest> {
        let now = Utc::now();
        self.requests
            .iter()
            .find(|entry| {
                let r = entry.value();
                r.resource == resource && r.action == action && r.branch == branch && r.override_token.as_deref() == Some(token) && r.is_live(now)
            })
            .map(|entry| entry.value().clone())
    }
}

/// Transition a pending request to APPROVED, issuing its token. Only
/// `reviewer`/`admin` roles may approve (§9 open question, resolved).
pub async fn approve(store: &Arc<dyn OverrideStore>, id: OverrideId, approver_id: &str, approver_roles: &[String]) -> Result<OverrideRequest> {
    let may_approve = approver_roles.iter().any(|r| matches!(Role::from_str(r), Ok(Role::Reviewer) | Ok(Role::Admin)));
    if !may_approve {
        return Err(PolicyError::OverrideApprovalForbidden(approver_roles.to_vec()));
    }
    let mut request = store.get(id).await.ok_or_else(|| PolicyError::OverrideNotFound(id.to_string()))?;
    request.status = OverrideStatus::Approved;
    request.approved_by = Some(approver_id.to_string());
    request.approved_at = Some(Utc::now());
    request.expires_at = Utc::now() + Duration::seconds(DEFAULT_OVERRIDE_TTL_S);
    request.override_token = Some(uuid::Uuid::new_v4().to_string());
    store.put(request.clone()).await;
    Ok(request)
}

pub async fn deny(store: &Arc<dyn OverrideStore>, id: OverrideId, approver_roles: &[String]) -> Result<OverrideRequest> {
    let may_approve = approver_roles.iter().any(|r| matches!(Role::from_str(r), Ok(Role::Reviewer) | Ok(Role::Admin)));
    if !may_approve {
        return Err(PolicyError::OverrideApprovalForbidden(approver_roles.to_vec()));
    }
    let mut request = store.get(id).await.ok_or_else(|| PolicyError::OverrideNotFound(id.to_string()))?;
    request.status = OverrideStatus::Denied;
    store.put(request.clone()).await;
    Ok(request)
}

/// Evaluate an in-flight emergency override attempt against a live
/// request, per §4.7's header contract.
pub async fn evaluate(store: &Arc<dyn OverrideStore>, resource: ResourceCategory, action: Action, branch: &str, justification: &str, token: &str) -> Result<OverrideRequest> {
    if justification.len() < MIN_JUSTIFICATION_LEN {
        return Err(PolicyError::JustificationTooShort);
    }
    let request = store
        .find_active_for(&resource.to_string(), &action.to_string(), branch, token)
        .await
        .ok_or(PolicyError::OverrideNotApproved)?;
    let now = Utc::now();
    if request.status != OverrideStatus::Approved {
        return Err(PolicyError::OverrideNotApproved);
    }
    if now > request.expires_at {
        return Err(PolicyError::OverrideExpired);
    }
    if request.override_token.as_deref() != Some(token) {
        return Err(PolicyError::OverrideTokenMismatch);
    }
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> Arc<dyn OverrideStore> {
        Arc::new(InMemoryOverrideStore::new())
    }

    #[tokio::test]
    async fn only_reviewer_or_admin_may_approve() {
        let store = store();
        let request = OverrideRequest::new("u1", vec!["developer".into()], "BRANCH", "DELETE", "schema_change", "main", "a".repeat(60));
        store.put(request.clone()).await;

        let denied = approve(&store, request.id, "u2", &["developer".to_string()]).await;
        assert!(matches!(denied, Err(PolicyError::OverrideApprovalForbidden(_))));

        let approved = approve(&store, request.id, "u2", &["admin".to_string()]).await.unwrap();
        assert_eq!(approved.status, OverrideStatus::Approved);
        assert!(approved.override_token.is_some());
    }

    #[tokio::test]
    async fn evaluate_rejects_short_justification() {
        let store = store();
        let result = evaluate(&store, ResourceCategory::Branch, Action::Delete, "main", "too short", "tok").await;
        assert!(matches!(result, Err(PolicyError::JustificationTooShort)));
    }

    #[tokio::test]
    async fn evaluate_accepts_approved_matching_token() {
        let store = store();
        let request = OverrideRequest::new("u1", vec!["developer".into()], "BRANCH", "DELETE", "schema_change", "main", "a".repeat(60));
        store.put(request.clone()).await;
        let approved = approve(&store, request.id, "u2", &["admin".to_string()]).await.unwrap();
        let token = approved.override_token.clone().unwrap();

        let result = evaluate(&store, ResourceCategory::Branch, Action::Delete, "main", &"a".repeat(60), &token).await;
        assert!(result.is_ok());
    }
}
