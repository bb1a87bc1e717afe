//! The workspace-wide error taxonomy, as one umbrella enum. Crate-local
//! error enums (`LockError`, `OccError`, ...) convert into this one at
//! the `oms-app` composition boundary via `#[from]`.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, OmsError>;

#[derive(Debug, Clone, Error)]
pub enum OmsError {
    /// OCC parent-commit mismatch. Caller should retry against `actual`.
    #[error("commit conflict on {resource_type}/{resource_id}: expected parent {expected}, actual {actual}")]
    Conflict {
        resource_type: String,
        resource_id: String,
        expected: String,
        actual: String,
    },

    /// Lock acquisition blocked by one or more active, non-expired locks.
    #[error("lock conflict on branch {branch}: held by {holders:?}")]
    LockConflict { branch: String, holders: Vec<String> },

    /// Branch state transition disallowed by the fixed transition table.
    #[error("invalid branch transition {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// Release/heartbeat attempted by someone other than the lock owner.
    #[error("caller is not the owner of lock {lock_id}")]
    NotOwner { lock_id: String },

    /// Lock no longer exists due to TTL or heartbeat expiry.
    #[error("lock {lock_id} has expired")]
    Expired { lock_id: String },

    /// Merge could not auto-resolve every conflict.
    #[error("merge produced {0} unresolved conflict(s)")]
    MergeConflicts(usize),

    /// A registered semantic validator rejected the merged document.
    #[error("semantic validation failed: {0} error(s)")]
    SemanticViolation(usize),

    /// RBAC, issue-tracking, or override rule rejected the request.
    #[error("policy denied: {0}")]
    PolicyDenied(String),

    /// The operation's deadline elapsed before it could complete.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// A backing store (ledger, branch state, event bus) is unavailable.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// Author hash invalid, envelope malformed, or similar tamper signal.
    #[error("integrity error: {0}")]
    IntegrityError(String),

    /// Requested entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Caller-supplied argument was structurally invalid.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl OmsError {
    /// A stable numeric code for mapping onto whatever outer transport a
    /// caller wires up (§7: "public API maps these to stable numeric codes").
    pub fn code(&self) -> &'static str {
        match self {
            OmsError::Conflict { .. } => "OMS_CONFLICT",
            OmsError::LockConflict { .. } => "OMS_LOCK_CONFLICT",
            OmsError::InvalidTransition { .. } => "OMS_INVALID_TRANSITION",
            OmsError::NotOwner { .. } => "OMS_NOT_OWNER",
            OmsError::Expired { .. } => "OMS_EXPIRED",
            OmsError::MergeConflicts(_) => "OMS_MERGE_CONFLICTS",
            OmsError::SemanticViolation(_) => "OMS_SEMANTIC_VIOLATION",
            OmsError::PolicyDenied(_) => "OMS_POLICY_DENIED",
            OmsError::DeadlineExceeded => "OMS_DEADLINE_EXCEEDED",
            OmsError::StoreUnavailable(_) => "OMS_STORE_UNAVAILABLE",
            OmsError::IntegrityError(_) => "OMS_INTEGRITY_ERROR",
            OmsError::NotFound(_) => "OMS_NOT_FOUND",
            OmsError::InvalidArgument(_) => "OMS_INVALID_ARGUMENT",
        }
    }
}
