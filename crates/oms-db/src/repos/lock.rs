//! Postgres-backed `branch_locks` table (§6), implementing
//! [`oms_locks::LockStore`].

use chrono::{DateTime, Utc};
use oms_locks::lock::{BranchLock, LockStore, Progress};
use oms_types::LockId;
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::warn;

pub enum LockRepo {
    Postgres(PgPool),
    #[cfg(feature = "mock")]
    Mock(std::sync::Arc<oms_locks::lock::InMemoryLockStore>),
}

impl LockRepo {
    pub fn new(pool: PgPool) -> Self {
        Self::Postgres(pool)
    }

    #[cfg(feature = "mock")]
    pub fn new_mock() -> Self {
        Self::Mock(std::sync::Arc::new(oms_locks::lock::InMemoryLockStore::new()))
    }
}

#[async_trait::async_trait]
impl LockStore for LockRepo {
    async fn by_branch(&self, branch: &str) -> Vec<BranchLock> {
        match self {
            Self::Postgres(pool) => {
                let rows: Vec<(Json<BranchLock>,)> = sqlx::query_as("SELECT data FROM branch_locks WHERE branch = $1")
                    .bind(branch)
                    .fetch_all(pool)
                    .await
                    .unwrap_or_else(|e| {
                        warn!(error = %e, "branch_locks by_branch query failed");
                        Vec::new()
                    });
                rows.into_iter().map(|(Json(l),)| l).collect()
            }
            #[cfg(feature = "mock")]
            Self::Mock(inner) => inner.by_branch(branch).await,
        }
    }

    async fn all_active(&self) -> Vec<BranchLock> {
        match self {
            Self::Postgres(pool) => {
                let rows: Vec<(Json<BranchLock>,)> = sqlx::query_as("SELECT data FROM branch_locks WHERE active = true")
                    .fetch_all(pool)
                    .await
                    .unwrap_or_else(|e| {
                        warn!(error = %e, "branch_locks all_active query failed");
                        Vec::new()
                    });
                rows.into_iter().map(|(Json(l),)| l).collect()
            }
            #[cfg(feature = "mock")]
            Self::Mock(inner) => inner.all_active().await,
        }
    }

    async fn get(&self, lock_id: LockId) -> Option<BranchLock> {
        match self {
            Self::Postgres(pool) => {
                let row: Option<(Json<BranchLock>,)> = sqlx::query_as("SELECT data FROM branch_locks WHERE id = $1")
                    .bind(lock_id.to_string())
                    .fetch_optional(pool)
                    .await
                    .ok()
                    .flatten();
                row.map(|(Json(l),)| l)
            }
            #[cfg(feature = "mock")]
            Self::Mock(inner) => inner.get(lock_id).await,
        }
    }

    async fn insert(&self, lock: BranchLock) {
        match self {
            Self::Postgres(pool) => {
                let _ = sqlx::query(
                    "INSERT INTO branch_locks (id, branch, active, data, created_at) VALUES ($1, $2, $3, $4, now())
                     ON CONFLICT (id) DO UPDATE SET active = EXCLUDED.active, data = EXCLUDED.data",
                )
                .bind(lock.id.to_string())
                .bind(&lock.branch)
                .bind(lock.active)
                .bind(Json(&lock))
                .execute(pool)
                .await
                .map_err(|e| warn!(error = %e, "branch_locks insert failed"));
            }
            #[cfg(feature = "mock")]
            Self::Mock(inner) => inner.insert(lock).await,
        }
    }

    async fn deactivate(&self, lock_id: LockId) {
        match self {
            Self::Postgres(pool) => {
                if let Some(mut lock) = self.get(lock_id).await {
                    lock.active = false;
                    let _ = sqlx::query("UPDATE branch_locks SET active = false, data = $1 WHERE id = $2")
                        .bind(Json(&lock))
                        .bind(lock_id.to_string())
                        .execute(pool)
                        .await
                        .map_err(|e| warn!(error = %e, "branch_locks deactivate failed"));
                }
            }
            #[cfg(feature = "mock")]
            Self::Mock(inner) => inner.deactivate(lock_id).await,
        }
    }

    async fn update_heartbeat(&self, lock_id: LockId, at: DateTime<Utc>, status: Option<String>, progress: Option<Progress>) -> bool {
        match self {
            Self::Postgres(pool) => {
                let Some(mut lock) = self.get(lock_id).await else { return false };
                lock.last_heartbeat = Some(at);
                if status.is_some() {
                    lock.heartbeat_status = status;
                }
                if progress.is_some() {
                    lock.heartbeat_progress = progress;
                }
                sqlx::query("UPDATE branch_locks SET data = $1 WHERE id = $2")
                    .bind(Json(&lock))
                    .bind(lock_id.to_string())
                    .execute(pool)
                    .await
                    .is_ok()
            }
            #[cfg(feature = "mock")]
            Self::Mock(inner) => inner.update_heartbeat(lock_id, at, status, progress).await,
        }
    }
}
