//! Branch State Store (C3): one [`BranchStateInfo`] row per branch,
//! mutated only through [`BranchStateStore::cas_update`] so every
//! transition goes through the fixed state table and the optimistic
//! `version` column — the same `RETURNING *` off a `WHERE version = $n`
//! predicate used for every other optimistic row in this workspace.

use crate::error::{LockError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use oms_types::{is_valid_transition, BranchState, LockId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchStateInfo {
    pub branch: String,
    pub state: BranchState,
    pub prev_state: Option<BranchState>,
    pub changed_at: DateTime<Utc>,
    pub changed_by: Option<String>,
    pub reason: Option<String>,
    pub active_locks: Vec<LockId>,
    pub indexing_started_at: Option<DateTime<Utc>>,
    pub indexing_completed_at: Option<DateTime<Utc>>,
    pub auto_merge_enabled: bool,
    pub version: i64,
}

impl BranchStateInfo {
    fn new(branch: &str) -> Self {
        Self {
            branch: branch.to_string(),
            state: BranchState::Active,
            prev_state: None,
            changed_at: Utc::now(),
            changed_by: None,
            reason: None,
            active_locks: Vec::new(),
            indexing_started_at: None,
            indexing_completed_at: None,
            auto_merge_enabled: false,
            version: 1,
        }
    }
}

/// One row per transition, independent of the mutable `branch_states`
/// row — append-only so a branch's history survives the current row
/// being overwritten by a later CAS.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchTransition {
    pub branch: String,
    pub from: BranchState,
    pub to: BranchState,
    pub changed_at: DateTime<Utc>,
    pub changed_by: Option<String>,
    pub reason: Option<String>,
    pub triggering_lock: Option<LockId>,
}

/// Persistence port for §3 `BranchStateInfo` + its transition log.
/// `get` lazily creates an ACTIVE row at `version=1` if the branch has
/// never been seen (§4.3).
#[async_trait]
pub trait BranchStateStore: Send + Sync + 'static {
    async fn get(&self, branch: &str) -> Result<BranchStateInfo>;

    /// The only mutator. `mutator` receives the current row and
    /// returns `(new_state, changed_by, reason, triggering_lock)`;
    /// the store validates the transition against the fixed table
    /// before committing, and fails with [`LockError::VersionConflict`]
    /// if the row's `version` no longer matches `expected_version`.
    async fn cas_update(
        &self,
        branch: &str,
        expected_version: i64,
        new_state: BranchState,
        changed_by: Option<String>,
        reason: Option<String>,
        triggering_lock: Option<LockId>,
    ) -> Result<BranchStateInfo>;

    async fn set_active_locks(&self, branch: &str, locks: Vec<LockId>) -> Result<()>;

    async fn transitions(&self, branch: &str) -> Result<Vec<BranchTransition>>;
}

/// In-process reference implementation, sharded per branch so that
/// unrelated branches never contend on the same lock.
#[derive(Clone, Default)]
pub struct InMemoryBranchStateStore {
    rows: Arc<DashMap<String, BranchStateInfo>>,
    transitions: Arc<DashMap<String, Vec<BranchTransition>>>,
}

impl InMemoryBranchStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BranchStateStore for InMemoryBranchStateStore {
    async fn get(&self, branch: &str) -> Result<BranchStateInfo> {
        Ok(self
            .rows
            .entry(branch.to_string())
            .or_insert_with(|| BranchStateInfo::new(branch))
            .clone())
    }

    async fn cas_update(
        &self,
        branch: &str,
        expected_version: i64,
        new_state: BranchState,
        changed_by: Option<String>,
        reason: Option<String>,
        triggering_lock: Option<LockId>,
    ) -> Result<BranchStateInfo> {
        let mut entry = self
            .rows
            .entry(branch.to_string())
            .or_insert_with(|| BranchStateInfo::new(branch));

        if entry.version != expected_version {
            return Err(LockError::VersionConflict {
                branch: branch.to_string(),
                expected: expected_version,
            });
        }

        if !is_valid_transition(entry.state, new_state) {
            return Err(LockError::InvalidTransition {
                from: entry.state,
                to: new_state,
            });
        }

        let from = entry.state;
        entry.prev_state = Some(from);
        entry.state = new_state;
        entry.changed_at = Utc::now();
        entry.changed_by = changed_by.clone();
        entry.reason = reason.clone();
        entry.version += 1;

        self.transitions
            .entry(branch.to_string())
            .or_default()
            .push(BranchTransition {
                branch: branch.to_string(),
                from,
                to: new_state,
                changed_at: entry.changed_at,
                changed_by,
                reason,
                triggering_lock,
            });

        Ok(entry.clone())
    }

    async fn set_active_locks(&self, branch: &str, locks: Vec<LockId>) -> Result<()> {
        let mut entry = self
            .rows
            .entry(branch.to_string())
            .or_insert_with(|| BranchStateInfo::new(branch));
        entry.active_locks = locks;
        Ok(())
    }

    async fn transitions(&self, branch: &str) -> Result<Vec<BranchTransition>> {
        Ok(self
            .transitions
            .get(branch)
            .map(|v| v.clone())
            .unwrap_or_default())
    }
}
