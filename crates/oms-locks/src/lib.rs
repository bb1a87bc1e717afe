//! Branch State Store (C3) and Lock Manager (C4) — §4.3/§4.4.
//!
//! Grounded on `ontology-management-service/core/concurrency/`'s
//! `distributed_lock_manager.py` for the acquire/release/heartbeat
//! contract and `models/branch_state.py` for the persisted shapes.

pub mod branch_state;
pub mod deadlock;
pub mod error;
pub mod lock;
pub mod manager;
pub mod sweeper;

pub use branch_state::{BranchStateInfo, BranchStateStore, BranchTransition, InMemoryBranchStateStore};
pub use deadlock::WaitForGraph;
pub use error::{LockError, Result};
pub use lock::{AcquireRequest, BranchLock, InMemoryLockStore, LockStore, Progress};
pub use manager::{LockManager, DEFAULT_TTL};
