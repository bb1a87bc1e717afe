//! TTL/heartbeat expiry sweeper and deadlock-detector ticks. Runs as
//! one `tokio::spawn`ed loop per [`crate::manager::LockManager`]
//! instance, the same periodic-sweep style used for rate-limit bucket
//! cleanup elsewhere in this workspace.

use crate::branch_state::BranchStateStore;
use crate::lock::LockStore;
use crate::manager::LockManager;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// One sweep pass: expire dead locks, then break any deadlock cycles
/// that remain. Returns the number of locks reaped so callers (tests,
/// metrics) can observe progress without waiting on the real interval.
pub async fn sweep_once<S: BranchStateStore, L: LockStore>(
    manager: &LockManager<S, L>,
    lock_store: &L,
    heartbeat_grace_multiplier: i64,
) -> usize {
    let now = Utc::now();
    let mut reaped = 0usize;

    for lock in lock_store.all_active().await {
        let dead_by_ttl = lock.expired_by_ttl(now);
        let dead_by_heartbeat = lock.expired_by_heartbeat(now, heartbeat_grace_multiplier);
        if !(dead_by_ttl || dead_by_heartbeat) {
            continue;
        }
        let reason = if dead_by_ttl {
            "auto_expired"
        } else {
            "heartbeat_lost"
        };
        if manager.release_inner(&lock, reason).await.is_ok() {
            warn!(lock_id = %lock.id, branch = %lock.branch, %reason, "lock expired");
            reaped += 1;
        }
    }

    let victims = manager.break_deadlocks().await;
    if !victims.is_empty() {
        warn!(count = victims.len(), "deadlock victims released");
    }

    reaped
}

/// Spawns the periodic sweep loop (§4.4: "runs on a periodic tick,
/// default 10 s"). Logs and continues on transient errors, matching
/// §7's "background sweepers log and continue on transient errors and
/// escalate after a bounded streak".
pub fn spawn<S: BranchStateStore, L: LockStore>(
    manager: Arc<LockManager<S, L>>,
    lock_store: Arc<L>,
    interval: Duration,
    heartbeat_grace_multiplier: i64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let reaped = sweep_once(&manager, &lock_store, heartbeat_grace_multiplier).await;
            if reaped > 0 {
                info!(reaped, "lock sweep reclaimed expired locks");
            }
        }
    })
}
