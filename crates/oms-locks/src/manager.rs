//! Lock Manager (C4): the contract and algorithms of §4.4. Acquire is
//! serialized per branch by an in-process `tokio::sync::Mutex` (never
//! held across suspension points that reach the store — only around
//! the read-conflict-check-write sequence, matching §5's "short
//! critical sections only, no I/O under the mutex" for the wait-for
//! bookkeeping; the branch mutex here *does* span the store call
//! because the store itself is the in-process reference impl and the
//! real deployment's cross-process serialization is the branch row's
//! `cas_update`, per §4.4 "Acquire is serialized per branch by a mutex
//! (in-process) AND by cas_update on the branch row (cross-process)").

use crate::branch_state::BranchStateStore;
use crate::deadlock::{pick_victim, WaitForGraph};
use crate::error::{LockError, Result};
use crate::lock::{AcquireRequest, BranchLock, LockStore};
use chrono::Utc;
use dashmap::DashMap;
use oms_types::{BranchState, LockId, LockScope, LockType};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

/// Default lock TTL when a request doesn't specify one (§4.4 failure
/// semantics: "`expires_at` MUST always be set, default 1 h").
pub const DEFAULT_TTL: chrono::Duration = chrono::Duration::hours(1);

pub struct LockManager<S: BranchStateStore, L: LockStore> {
    state_store: Arc<S>,
    lock_store: Arc<L>,
    branch_mutexes: DashMap<String, Arc<AsyncMutex<()>>>,
    pub wait_for: WaitForGraph,
    pub heartbeat_grace_multiplier: i64,
}

impl<S: BranchStateStore, L: LockStore> LockManager<S, L> {
    pub fn new(state_store: Arc<S>, lock_store: Arc<L>, heartbeat_grace_multiplier: i64) -> Self {
        Self {
            state_store,
            lock_store,
            branch_mutexes: DashMap::new(),
            wait_for: WaitForGraph::new(),
            heartbeat_grace_multiplier,
        }
    }

    fn branch_mutex(&self, branch: &str) -> Arc<AsyncMutex<()>> {
        self.branch_mutexes
            .entry(branch.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    async fn live_locks(&self, branch: &str) -> Vec<BranchLock> {
        let now = Utc::now();
        self.lock_store
            .by_branch(branch)
            .await
            .into_iter()
            .filter(|l| l.is_live(now, self.heartbeat_grace_multiplier))
            .collect()
    }

    /// One-shot attempt: §4.4's `acquire` contract exactly. Never
    /// waits — callers that want to wait out a conflict use
    /// [`Self::acquire_blocking`].
    pub async fn acquire(&self, req: AcquireRequest) -> Result<LockId> {
        if req.scope == LockScope::Resource
            && (req.resource_type.is_none() || req.resource_id.is_none())
        {
            return Err(LockError::InvalidScope { scope: req.scope });
        }
        if req.scope == LockScope::ResourceType && req.resource_type.is_none() {
            return Err(LockError::InvalidScope { scope: req.scope });
        }

        let _guard = self.branch_mutex(&req.branch).lock().await;

        let candidate = BranchLock {
            id: LockId::new(),
            branch: req.branch.clone(),
            lock_type: req.lock_type,
            scope: req.scope,
            resource_type: req.resource_type.clone(),
            resource_id: req.resource_id.clone(),
            locked_by: req.locked_by.clone(),
            locked_at: Utc::now(),
            expires_at: Some(Utc::now() + req.ttl.unwrap_or(DEFAULT_TTL)),
            reason: req.reason.clone(),
            heartbeat_interval_s: req.heartbeat_interval_s.unwrap_or(30),
            last_heartbeat: Some(Utc::now()),
            heartbeat_source: Some(req.locked_by.clone()),
            heartbeat_status: None,
            heartbeat_progress: None,
            auto_release: req.auto_release,
            active: true,
        };

        let live = self.live_locks(&req.branch).await;
        let conflicts: Vec<BranchLock> = live
            .into_iter()
            .filter(|existing| existing.conflicts_with(&candidate))
            .collect();

        if !conflicts.is_empty() {
            let holders: Vec<String> = conflicts.iter().map(|c| c.locked_by.clone()).collect();
            warn!(branch = %req.branch, ?holders, "lock conflict");
            return Err(LockError::LockConflict {
                branch: req.branch,
                holders,
            });
        }

        self.lock_store.insert(candidate.clone()).await;

        if candidate.scope == LockScope::Branch {
            self.transition_on_acquire(&req.branch).await;
        }

        debug!(lock_id = %candidate.id, branch = %candidate.branch, "lock acquired");
        Ok(candidate.id)
    }

    /// Polls [`Self::acquire`] until it succeeds, `timeout` elapses, or
    /// a deadlock victim release frees the contested lock (§5: a
    /// separate `acquire_timeout`, default 30s).
    pub async fn acquire_blocking(
        &self,
        req: AcquireRequest,
        caller: &str,
        timeout: StdDuration,
    ) -> Result<LockId> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match self.acquire(req.clone()).await {
                Ok(id) => {
                    self.wait_for.remove_waiter(caller);
                    return Ok(id);
                }
                Err(LockError::LockConflict { holders, .. }) => {
                    self.wait_for.add_wait(caller, &holders);
                    if tokio::time::Instant::now() >= deadline {
                        self.wait_for.remove_waiter(caller);
                        return Err(LockError::AcquireTimeout(timeout));
                    }
                    tokio::time::sleep(StdDuration::from_millis(50)).await;
                }
                Err(other) => {
                    self.wait_for.remove_waiter(caller);
                    return Err(other);
                }
            }
        }
    }

    /// §4.4: "if the new lock is BRANCH-scope and branch is
    /// ACTIVE/READY, transition branch to LOCKED_FOR_WRITE". Retries
    /// the CAS a bounded number of times against concurrent writers.
    async fn transition_on_acquire(&self, branch: &str) {
        for _ in 0..5 {
            let Ok(info) = self.state_store.get(branch).await else {
                return;
            };
            if !matches!(info.state, BranchState::Active | BranchState::Ready) {
                return;
            }
            match self
                .state_store
                .cas_update(
                    branch,
                    info.version,
                    BranchState::LockedForWrite,
                    None,
                    Some("branch lock acquired".into()),
                    None,
                )
                .await
            {
                Ok(_) => return,
                Err(LockError::VersionConflict { .. }) => continue,
                Err(_) => return,
            }
        }
    }

    pub async fn release(&self, lock_id: LockId, released_by: &str) -> Result<()> {
        let lock = self
            .lock_store
            .get(lock_id)
            .await
            .ok_or(LockError::NotFound {
                lock_id: lock_id.to_string(),
            })?;

        if lock.locked_by != released_by {
            return Err(LockError::NotOwner {
                lock_id: lock_id.to_string(),
                caller: released_by.to_string(),
            });
        }

        self.release_inner(&lock, "released").await
    }

    /// Shared by [`Self::release`] and the TTL/heartbeat sweeper, which
    /// releases on behalf of the system rather than the owner.
    pub(crate) async fn release_inner(&self, lock: &BranchLock, reason: &str) -> Result<()> {
        self.lock_store.deactivate(lock.id).await;
        debug!(lock_id = %lock.id, %reason, "lock released");

        if lock.scope != LockScope::Branch {
            return Ok(());
        }

        let live = self.live_locks(&lock.branch).await;
        let any_branch_lock_left = live.iter().any(|l| l.scope == LockScope::Branch);
        if any_branch_lock_left {
            return Ok(());
        }

        let target = if lock.lock_type == LockType::Indexing {
            BranchState::Ready
        } else {
            BranchState::Active
        };

        for _ in 0..5 {
            let Ok(info) = self.state_store.get(&lock.branch).await else {
                return Ok(());
            };
            if info.state != BranchState::LockedForWrite {
                return Ok(());
            }
            match self
                .state_store
                .cas_update(
                    &lock.branch,
                    info.version,
                    target,
                    None,
                    Some(format!("last branch lock released ({reason})")),
                    Some(lock.id),
                )
                .await
            {
                Ok(_) => return Ok(()),
                Err(LockError::VersionConflict { .. }) => continue,
                Err(_) => return Ok(()),
            }
        }
        Ok(())
    }

    pub async fn heartbeat(
        &self,
        lock_id: LockId,
        source: &str,
        status: Option<String>,
        progress: Option<crate::lock::Progress>,
    ) -> Result<()> {
        let lock = self
            .lock_store
            .get(lock_id)
            .await
            .ok_or(LockError::NotFound {
                lock_id: lock_id.to_string(),
            })?;

        if !lock.is_live(Utc::now(), self.heartbeat_grace_multiplier) {
            return Err(LockError::Expired {
                lock_id: lock_id.to_string(),
            });
        }

        if let Some(expected) = &lock.heartbeat_source {
            if expected != source {
                return Err(LockError::WrongHeartbeatSource {
                    source: source.to_string(),
                });
            }
        }

        self.lock_store
            .update_heartbeat(lock_id, Utc::now(), status, progress)
            .await;
        Ok(())
    }

    /// §4.4: one BRANCH lock if `force_branch_lock` or `resource_types`
    /// is empty, otherwise one RESOURCE_TYPE lock per type. Rolls back
    /// any locks it already acquired if a later one in the batch
    /// conflicts.
    pub async fn lock_for_indexing(
        &self,
        branch: &str,
        locked_by: &str,
        resource_types: Vec<String>,
        force_branch_lock: bool,
    ) -> Result<Vec<LockId>> {
        let requests: Vec<AcquireRequest> = if force_branch_lock || resource_types.is_empty() {
            vec![AcquireRequest {
                branch: branch.to_string(),
                lock_type: LockType::Indexing,
                scope: LockScope::Branch,
                resource_type: None,
                resource_id: None,
                locked_by: locked_by.to_string(),
                reason: "indexing".to_string(),
                ttl: None,
                heartbeat_interval_s: None,
                auto_release: true,
            }]
        } else {
            resource_types
                .into_iter()
                .map(|rt| AcquireRequest {
                    branch: branch.to_string(),
                    lock_type: LockType::Indexing,
                    scope: LockScope::ResourceType,
                    resource_type: Some(rt),
                    resource_id: None,
                    locked_by: locked_by.to_string(),
                    reason: "indexing".to_string(),
                    ttl: None,
                    heartbeat_interval_s: None,
                    auto_release: true,
                })
                .collect()
        };

        let mut acquired = Vec::new();
        for req in requests {
            match self.acquire(req).await {
                Ok(id) => acquired.push(id),
                Err(e) => {
                    for id in acquired {
                        let _ = self.release(id, locked_by).await;
                    }
                    return Err(e);
                }
            }
        }
        Ok(acquired)
    }

    /// §4.4: releases the matching INDEXING locks and, if none remain
    /// and the branch is LOCKED_FOR_WRITE, lets [`Self::release_inner`]
    /// drive it to READY.
    pub async fn complete_indexing(
        &self,
        branch: &str,
        completed_by: &str,
        resource_types: Option<Vec<String>>,
    ) -> Result<()> {
        let live = self.live_locks(branch).await;
        let matching: Vec<BranchLock> = live
            .into_iter()
            .filter(|l| l.lock_type == LockType::Indexing)
            .filter(|l| match (&resource_types, &l.resource_type) {
                (None, _) => true,
                (Some(types), Some(rt)) => types.contains(rt),
                (Some(_), None) => true,
            })
            .collect();

        for lock in matching {
            self.release_inner(&lock, "indexing complete").await?;
        }
        info!(%branch, %completed_by, "indexing complete");
        Ok(())
    }

    /// Deadlock detector sweep: for every current cycle, release the
    /// youngest lock held by a participant, tagging the reason
    /// `deadlock_victim` (§4.4).
    pub async fn break_deadlocks(&self) -> Vec<LockId> {
        let mut released = Vec::new();
        for cycle in self.wait_for.cycles() {
            let mut candidates = Vec::new();
            let all_active = self.lock_store.all_active().await;
            for lock in &all_active {
                if cycle.contains(&lock.locked_by) {
                    candidates.push((lock.id, lock.locked_at));
                }
            }
            if let Some(victim) = pick_victim(&candidates) {
                if let Some(lock) = self.lock_store.get(victim).await {
                    if self.release_inner(&lock, "deadlock_victim").await.is_ok() {
                        warn!(lock_id = %victim, "released deadlock victim lock");
                        released.push(victim);
                    }
                }
                for holder in &cycle {
                    self.wait_for.remove_waiter(holder);
                }
            }
        }
        released
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::branch_state::InMemoryBranchStateStore;
    use crate::lock::InMemoryLockStore;

    fn manager() -> LockManager<InMemoryBranchStateStore, InMemoryLockStore> {
        LockManager::new(
            Arc::new(InMemoryBranchStateStore::new()),
            Arc::new(InMemoryLockStore::new()),
            3,
        )
    }

    fn req(branch: &str, scope: LockScope, rt: Option<&str>, rid: Option<&str>) -> AcquireRequest {
        AcquireRequest {
            branch: branch.to_string(),
            lock_type: LockType::Manual,
            scope,
            resource_type: rt.map(str::to_string),
            resource_id: rid.map(str::to_string),
            locked_by: "alice".to_string(),
            reason: "test".to_string(),
            ttl: None,
            heartbeat_interval_s: None,
            auto_release: true,
        }
    }

    #[tokio::test]
    async fn branch_lock_transitions_branch_state() {
        let mgr = manager();
        mgr.acquire(req("main", LockScope::Branch, None, None))
            .await
            .unwrap();
        let info = mgr.state_store.get("main").await.unwrap();
        assert_eq!(info.state, BranchState::LockedForWrite);
    }

    #[tokio::test]
    async fn s2_scenario_minimal_locking_leaves_branch_active() {
        // §8 S2: two RESOURCE_TYPE indexing locks plus a developer's
        // MANUAL resource-type lock all succeed; branch state is
        // untouched because none of them is BRANCH-scope.
        let mgr = manager();
        let ids = mgr
            .lock_for_indexing(
                "feature-analytics",
                "indexer",
                vec!["object_type".into(), "link_type".into()],
                false,
            )
            .await
            .unwrap();
        assert_eq!(ids.len(), 2);

        let dev_lock = mgr
            .acquire(req(
                "feature-analytics",
                LockScope::ResourceType,
                Some("action_type"),
                None,
            ))
            .await
            .unwrap();

        let info = mgr.state_store.get("feature-analytics").await.unwrap();
        assert_eq!(info.state, BranchState::Active);

        mgr.complete_indexing("feature-analytics", "indexer", None)
            .await
            .unwrap();

        // developer's lock is untouched
        assert!(mgr.lock_store.get(dev_lock).await.unwrap().active);
    }

    #[tokio::test]
    async fn conflicting_resource_type_locks_are_rejected() {
        let mgr = manager();
        mgr.acquire(req("main", LockScope::ResourceType, Some("object_type"), None))
            .await
            .unwrap();
        let err = mgr
            .acquire(req("main", LockScope::ResourceType, Some("object_type"), None))
            .await
            .unwrap_err();
        assert!(matches!(err, LockError::LockConflict { .. }));
    }

    #[tokio::test]
    async fn release_by_non_owner_is_rejected() {
        let mgr = manager();
        let id = mgr
            .acquire(req("main", LockScope::Branch, None, None))
            .await
            .unwrap();
        let err = mgr.release(id, "mallory").await.unwrap_err();
        assert!(matches!(err, LockError::NotOwner { .. }));
    }

    #[tokio::test]
    async fn releasing_last_branch_lock_restores_active() {
        let mgr = manager();
        let id = mgr
            .acquire(req("main", LockScope::Branch, None, None))
            .await
            .unwrap();
        mgr.release(id, "alice").await.unwrap();
        let info = mgr.state_store.get("main").await.unwrap();
        assert_eq!(info.state, BranchState::Active);
    }

    #[tokio::test]
    async fn heartbeat_from_wrong_source_is_rejected() {
        let mgr = manager();
        let id = mgr
            .acquire(req("main", LockScope::Branch, None, None))
            .await
            .unwrap();
        let err = mgr.heartbeat(id, "someone-else", None, None).await.unwrap_err();
        assert!(matches!(err, LockError::WrongHeartbeatSource { .. }));
    }

    #[tokio::test]
    async fn invalid_resource_scope_without_ids_is_rejected() {
        let mgr = manager();
        let err = mgr
            .acquire(req("main", LockScope::Resource, Some("object_type"), None))
            .await
            .unwrap_err();
        assert!(matches!(err, LockError::InvalidScope { .. }));
    }
}
