//! Branch state machine.
//!
//! Grounded on `ontology-management-service/models/branch_state.py`'s
//! `BranchState` enum and `VALID_STATE_TRANSITIONS` table. This spec
//! standardizes the post-indexing transition on `READY` (see
//! `DESIGN.md` for the open question this resolves).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BranchState {
    /// Normal operation, read/write allowed.
    Active,
    /// Indexing or another branch-scope lock is in progress; read-only.
    LockedForWrite,
    /// Indexing complete, ready for merge.
    Ready,
    /// Branch has been successfully merged.
    Merged,
    /// An operation on the branch failed.
    Failed,
    /// Branch deleted; historical record only. Terminal.
    Archived,
    /// Error state requiring manual intervention.
    Error,
}

impl fmt::Display for BranchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BranchState::Active => "ACTIVE",
            BranchState::LockedForWrite => "LOCKED_FOR_WRITE",
            BranchState::Ready => "READY",
            BranchState::Merged => "MERGED",
            BranchState::Failed => "FAILED",
            BranchState::Archived => "ARCHIVED",
            BranchState::Error => "ERROR",
        };
        write!(f, "{s}")
    }
}

/// Fixed state transition table (§3). Anything not listed here is invalid.
pub const VALID_TRANSITIONS: &[(BranchState, &[BranchState])] = &[
    (
        BranchState::Active,
        &[BranchState::LockedForWrite, BranchState::Archived, BranchState::Error],
    ),
    (
        BranchState::LockedForWrite,
        &[BranchState::Ready, BranchState::Active, BranchState::Error],
    ),
    (BranchState::Ready, &[BranchState::Active, BranchState::Archived]),
    (BranchState::Archived, &[]),
    (BranchState::Error, &[BranchState::Active, BranchState::LockedForWrite]),
];

/// Check whether `from -> to` is an allowed transition.
pub fn is_valid_transition(from: BranchState, to: BranchState) -> bool {
    VALID_TRANSITIONS
        .iter()
        .find(|(state, _)| *state == from)
        .map(|(_, allowed)| allowed.contains(&to))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_can_lock_but_not_merge() {
        assert!(is_valid_transition(BranchState::Active, BranchState::LockedForWrite));
        assert!(!is_valid_transition(BranchState::Active, BranchState::Merged));
    }

    #[test]
    fn archived_is_terminal() {
        for state in [
            BranchState::Active,
            BranchState::LockedForWrite,
            BranchState::Ready,
            BranchState::Merged,
            BranchState::Failed,
            BranchState::Archived,
            BranchState::Error,
        ] {
            assert!(!is_valid_transition(BranchState::Archived, state));
        }
    }

    #[test]
    fn error_allows_manual_recovery_only() {
        assert!(is_valid_transition(BranchState::Error, BranchState::Active));
        assert!(is_valid_transition(BranchState::Error, BranchState::LockedForWrite));
        assert!(!is_valid_transition(BranchState::Error, BranchState::Ready));
    }
}
