//! §3 `AuditEvent (v1)`: a CloudEvents envelope with
//! `type="audit.activity.v1"`.

use chrono::{DateTime, Utc};
use oms_auth::{AuthMethod, UserContext};
use oms_core::canonical::sha256_hex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const AUDIT_EVENT_TYPE: &str = "audit.activity.v1";
pub const AUDIT_SOURCE: &str = "/oms";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub username: String,
    pub roles: Vec<String>,
    pub tenant: Option<String>,
    pub auth_method: AuthMethod,
    pub ip: Option<String>,
    pub ua: Option<String>,
}

impl From<&UserContext> for Actor {
    fn from(user: &UserContext) -> Self {
        Self {
            id: user.user_id.clone(),
            username: user.username.clone(),
            roles: user.roles.clone(),
            tenant: user.tenant.clone(),
            auth_method: user.auth_method,
            ip: user.ip.clone(),
            ua: user.ua.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    pub resource_type: String,
    pub resource_id: String,
    pub branch: Option<String>,
    pub parent: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Changes {
    pub commit_before: Option<String>,
    pub commit_after: Option<String>,
    pub fields_changed: Vec<String>,
    pub old: Value,
    pub new: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Compliance {
    pub pii_fields: Vec<String>,
    pub gdpr_relevant: bool,
    pub retention_days: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Deterministic commit-linked id, per §3:
    /// `sha256(action|resource_type|resource_id|ts|commit_after)[0:16]`.
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub source: String,
    pub action: String,
    pub actor: Actor,
    pub target: Target,
    pub success: bool,
    pub error_code: Option<String>,
    pub duration_ms: Option<u64>,
    pub changes: Changes,
    pub compliance: Compliance,
    pub request_id: String,
    pub correlation_id: String,
    pub time: DateTime<Utc>,
}

impl AuditEvent {
    /// Computes the deterministic audit id described in §3. `ts` is
    /// the RFC3339 string of `event.time`, `commit_after` falls back to
    /// the empty string when the operation never produced a commit
    /// (e.g. a denied or failed write).
    pub fn compute_id(action: &str, resource_type: &str, resource_id: &str, ts: &DateTime<Utc>, commit_after: Option<&str>) -> String {
        let input = format!("{action}|{resource_type}|{resource_id}|{}|{}", ts.to_rfc3339(), commit_after.unwrap_or(""));
        sha256_hex(input.as_bytes())[..16].to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audit_id_is_deterministic_over_its_inputs() {
        let ts = Utc::now();
        let a = AuditEvent::compute_id("update", "object_type", "Product", &ts, Some("abc123"));
        let b = AuditEvent::compute_id("update", "object_type", "Product", &ts, Some("abc123"));
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn audit_id_changes_with_commit_after() {
        let ts = Utc::now();
        let a = AuditEvent::compute_id("update", "object_type", "Product", &ts, Some("abc123"));
        let b = AuditEvent::compute_id("update", "object_type", "Product", &ts, Some("def456"));
        assert_ne!(a, b);
    }
}
