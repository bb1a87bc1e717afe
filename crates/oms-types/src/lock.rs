//! Lock taxonomy, grounded on `models/branch_state.py`'s `LockType`/`LockScope`.

use serde::{Deserialize, Serialize};

/// What a lock is protecting against — drives the default release target
/// once the last branch-scope lock of that type is released (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LockType {
    Indexing,
    Migration,
    Backup,
    Maintenance,
    Manual,
}

/// Granularity of a lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LockScope {
    Branch,
    ResourceType,
    Resource,
}
