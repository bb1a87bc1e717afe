//! §7 error taxonomy entries owned by the lock manager / branch state
//! store: `LockConflict`, `InvalidTransition`, `NotOwner`, `Expired`,
//! plus the store-availability and scope-validation failures the
//! contract in §4.4 calls out explicitly.

use oms_types::BranchState;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LockError>;

#[derive(Debug, Error, Clone)]
pub enum LockError {
    #[error("lock conflict on branch {branch}: held by {holders:?}")]
    LockConflict { branch: String, holders: Vec<String> },

    #[error("scope {scope:?} requires resource_type and resource_id")]
    InvalidScope { scope: oms_types::LockScope },

    #[error("invalid branch transition {from} -> {to}")]
    InvalidTransition { from: BranchState, to: BranchState },

    #[error("branch {branch} state row changed concurrently (expected version {expected})")]
    VersionConflict { branch: String, expected: i64 },

    #[error("caller {caller} is not the owner of lock {lock_id}")]
    NotOwner { lock_id: String, caller: String },

    #[error("lock {lock_id} not found")]
    NotFound { lock_id: String },

    #[error("lock {lock_id} has expired")]
    Expired { lock_id: String },

    #[error("heartbeat source {source} does not match lock's heartbeat_source")]
    WrongHeartbeatSource { source: String },

    #[error("lock store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("acquire timed out after {0:?}")]
    AcquireTimeout(std::time::Duration),
}

impl From<LockError> for oms_types::OmsError {
    fn from(e: LockError) -> Self {
        match e {
            LockError::LockConflict { branch, holders } => oms_types::OmsError::LockConflict { branch, holders },
            LockError::InvalidScope { scope } => oms_types::OmsError::InvalidArgument(format!("invalid lock scope {scope:?}")),
            LockError::InvalidTransition { from, to } => oms_types::OmsError::InvalidTransition {
                from: from.to_string(),
                to: to.to_string(),
            },
            LockError::VersionConflict { branch, expected } => oms_types::OmsError::Conflict {
                resource_type: "branch_state".to_string(),
                resource_id: branch,
                expected: expected.to_string(),
                actual: "unknown".to_string(),
            },
            LockError::NotOwner { lock_id, .. } => oms_types::OmsError::NotOwner { lock_id },
            LockError::NotFound { lock_id } => oms_types::OmsError::NotFound(format!("lock {lock_id}")),
            LockError::Expired { lock_id } => oms_types::OmsError::Expired { lock_id },
            LockError::WrongHeartbeatSource { source } => oms_types::OmsError::InvalidArgument(format!("wrong heartbeat source {source}")),
            LockError::StoreUnavailable(msg) => oms_types::OmsError::StoreUnavailable(msg),
            LockError::AcquireTimeout(_) => oms_types::OmsError::DeadlineExceeded,
        }
    }
}
