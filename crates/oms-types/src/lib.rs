//! OMS canonical domain types — the branch/lock/commit vocabulary shared by
//! every other `oms-*` crate, with zero dependency on them.
//!
//! Anchors the rest of the workspace the way a types crate typically
//! does: identity newtypes, a handful of closed enums, and one umbrella
//! error type.

pub mod error;
pub mod ids;
pub mod lock;
pub mod severity;
pub mod state;

pub use error::{OmsError, Result};
pub use ids::*;
pub use lock::{LockScope, LockType};
pub use severity::Severity;
pub use state::{is_valid_transition, BranchState, VALID_TRANSITIONS};

/// Schema version of the OMS type vocabulary, bumped on breaking wire changes.
pub const TYPES_VERSION: &str = "1.0.0";
