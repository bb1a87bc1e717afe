//! §3 `BranchLock` model, its conflict predicate, and the storage port
//! the manager (C4) acquires/releases/heartbeats against. Grounded on
//! `models/branch_state.py`'s `BranchLock` plus
//! `core/concurrency/distributed_lock_manager.py`'s conflict check.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use oms_types::{LockId, LockScope, LockType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Free-form progress payload attached to a heartbeat (supplemented
/// feature, `lock_monitor.py`'s `HeartbeatRecord.progress_info`).
pub type Progress = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchLock {
    pub id: LockId,
    pub branch: String,
    pub lock_type: LockType,
    pub scope: LockScope,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub locked_by: String,
    pub locked_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub reason: String,
    pub heartbeat_interval_s: u64,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub heartbeat_source: Option<String>,
    pub heartbeat_status: Option<String>,
    pub heartbeat_progress: Option<Progress>,
    pub auto_release: bool,
    pub active: bool,
}

impl BranchLock {
    pub fn expired_by_ttl(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| now > exp)
    }

    /// §3: `last_heartbeat + 3*interval < now`. A lock that never
    /// received a heartbeat and carries no TTL is judged against
    /// `locked_at` so it isn't immortal.
    pub fn expired_by_heartbeat(&self, now: DateTime<Utc>, grace_multiplier: i64) -> bool {
        if self.heartbeat_interval_s == 0 {
            return false;
        }
        let anchor = self.last_heartbeat.unwrap_or(self.locked_at);
        let grace = chrono::Duration::seconds(self.heartbeat_interval_s as i64 * grace_multiplier);
        anchor + grace < now
    }

    pub fn is_live(&self, now: DateTime<Utc>, grace_multiplier: i64) -> bool {
        self.active && !self.expired_by_ttl(now) && !self.expired_by_heartbeat(now, grace_multiplier)
    }

    /// Symmetric conflict predicate over two *live* locks on the same
    /// branch (§3). Locks on different branches never conflict; callers
    /// filter to the same branch before calling this.
    pub fn conflicts_with(&self, other: &BranchLock) -> bool {
        use LockScope::*;
        if self.branch != other.branch {
            return false;
        }
        match (self.scope, other.scope) {
            (Branch, _) | (_, Branch) => true,
            (ResourceType, ResourceType) => self.resource_type == other.resource_type,
            (ResourceType, Resource) => self.resource_type == other.resource_type,
            (Resource, ResourceType) => other.resource_type == self.resource_type,
            (Resource, Resource) => {
                self.resource_type == other.resource_type && self.resource_id == other.resource_id
            }
        }
    }
}

/// Request shape for [`LockStore::insert`]/[`crate::manager::LockManager::acquire`].
#[derive(Debug, Clone)]
pub struct AcquireRequest {
    pub branch: String,
    pub lock_type: LockType,
    pub scope: LockScope,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub locked_by: String,
    pub reason: String,
    pub ttl: Option<chrono::Duration>,
    pub heartbeat_interval_s: Option<u64>,
    pub auto_release: bool,
}

/// Persistence port for §3 `BranchLock` rows.
#[async_trait]
pub trait LockStore: Send + Sync + 'static {
    /// All locks on `branch`, live or not — callers filter by
    /// liveness themselves so the sweeper can also see dead ones.
    async fn by_branch(&self, branch: &str) -> Vec<BranchLock>;

    async fn all_active(&self) -> Vec<BranchLock>;

    async fn get(&self, lock_id: LockId) -> Option<BranchLock>;

    async fn insert(&self, lock: BranchLock);

    async fn deactivate(&self, lock_id: LockId);

    async fn update_heartbeat(
        &self,
        lock_id: LockId,
        at: DateTime<Utc>,
        status: Option<String>,
        progress: Option<Progress>,
    ) -> bool;
}

/// In-process reference implementation.
#[derive(Clone, Default)]
pub struct InMemoryLockStore {
    locks: Arc<DashMap<LockId, BranchLock>>,
}

impl InMemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LockStore for InMemoryLockStore {
    async fn by_branch(&self, branch: &str) -> Vec<BranchLock> {
        self.locks
            .iter()
            .filter(|entry| entry.branch == branch)
            .map(|entry| entry.clone())
            .collect()
    }

    async fn all_active(&self) -> Vec<BranchLock> {
        self.locks
            .iter()
            .filter(|entry| entry.active)
            .map(|entry| entry.clone())
            .collect()
    }

    async fn get(&self, lock_id: LockId) -> Option<BranchLock> {
        self.locks.get(&lock_id).map(|entry| entry.clone())
    }

    async fn insert(&self, lock: BranchLock) {
        self.locks.insert(lock.id, lock);
    }

    async fn deactivate(&self, lock_id: LockId) {
        if let Some(mut entry) = self.locks.get_mut(&lock_id) {
            entry.active = false;
        }
    }

    async fn update_heartbeat(
        &self,
        lock_id: LockId,
        at: DateTime<Utc>,
        status: Option<String>,
        progress: Option<Progress>,
    ) -> bool {
        match self.locks.get_mut(&lock_id) {
            Some(mut entry) => {
                entry.last_heartbeat = Some(at);
                if status.is_some() {
                    entry.heartbeat_status = status;
                }
                if progress.is_some() {
                    entry.heartbeat_progress = progress;
                }
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lock(branch: &str, scope: LockScope, rt: Option<&str>, rid: Option<&str>) -> BranchLock {
        BranchLock {
            id: LockId::new(),
            branch: branch.to_string(),
            lock_type: LockType::Manual,
            scope,
            resource_type: rt.map(str::to_string),
            resource_id: rid.map(str::to_string),
            locked_by: "alice".into(),
            locked_at: Utc::now(),
            expires_at: Some(Utc::now() + chrono::Duration::hours(1)),
            reason: "test".into(),
            heartbeat_interval_s: 30,
            last_heartbeat: Some(Utc::now()),
            heartbeat_source: Some("alice".into()),
            heartbeat_status: None,
            heartbeat_progress: None,
            auto_release: true,
            active: true,
        }
    }

    #[test]
    fn branch_scope_conflicts_with_anything_on_same_branch() {
        let a = lock("main", LockScope::Branch, None, None);
        let b = lock("main", LockScope::ResourceType, Some("object_type"), None);
        assert!(a.conflicts_with(&b));
        assert!(b.conflicts_with(&a));
    }

    #[test]
    fn different_branches_never_conflict() {
        let a = lock("main", LockScope::Branch, None, None);
        let b = lock("feature-x", LockScope::Branch, None, None);
        assert!(!a.conflicts_with(&b));
    }

    #[test]
    fn resource_type_conflicts_only_on_matching_type() {
        let a = lock("main", LockScope::ResourceType, Some("object_type"), None);
        let b = lock("main", LockScope::ResourceType, Some("link_type"), None);
        assert!(!a.conflicts_with(&b));
        let c = lock("main", LockScope::Resource, Some("object_type"), Some("Product"));
        assert!(a.conflicts_with(&c));
    }

    #[test]
    fn resource_scope_conflicts_only_on_matching_id() {
        let a = lock("main", LockScope::Resource, Some("object_type"), Some("Product"));
        let b = lock("main", LockScope::Resource, Some("object_type"), Some("Customer"));
        assert!(!a.conflicts_with(&b));
        let c = lock("main", LockScope::Resource, Some("object_type"), Some("Product"));
        assert!(a.conflicts_with(&c));
    }

    #[test]
    fn ttl_expiry_makes_a_lock_dead() {
        let mut l = lock("main", LockScope::Branch, None, None);
        l.expires_at = Some(Utc::now() - chrono::Duration::seconds(1));
        assert!(l.expired_by_ttl(Utc::now()));
        assert!(!l.is_live(Utc::now(), 3));
    }

    #[test]
    fn missed_heartbeats_make_a_lock_dead() {
        let mut l = lock("main", LockScope::Branch, None, None);
        l.expires_at = None;
        l.last_heartbeat = Some(Utc::now() - chrono::Duration::seconds(1000));
        l.heartbeat_interval_s = 10;
        assert!(l.expired_by_heartbeat(Utc::now(), 3));
    }
}
