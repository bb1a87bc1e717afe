//! OCC Engine (C5) — §4.5.
//!
//! Grounded on
//! `ontology-management-service/core/concurrency/optimistic_lock.py`:
//! commit-hash-chained parent validation against a version ledger,
//! retry-on-conflict, and a separate advisory-lock scope reserved for
//! structural operations.

pub mod advisory;
pub mod engine;
pub mod error;
pub mod version;

pub use advisory::AdvisoryLocks;
pub use engine::{OccEngine, UpdateOutcome};
pub use error::{OccError, Result};
pub use version::{InMemoryVersionStore, ResourceVersion, VersionStore};
