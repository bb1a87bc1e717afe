//! Postgres-backed `branch_states` / `branch_transitions` tables,
//! implementing [`oms_locks::BranchStateStore`] so `oms-locks` never
//! has to know whether it's talking to Postgres or the in-memory
//! reference store.
//!
//! The row itself is stored as a `JSONB` column keyed by the branch
//! name's natural key, the same shape the rest of the workspace
//! canonicalizes with `oms_core::canonical` — this repo adds the
//! `version`-gated `UPDATE ... WHERE version = $expected` CAS query on
//! top, the same `RETURNING *` off a `WHERE version = $n` predicate
//! every other repo here uses.

use crate::error::DbError;
use async_trait::async_trait;
use chrono::Utc;
use oms_locks::branch_state::{BranchStateStore, BranchStateInfo, BranchTransition};
use oms_locks::error::{LockError, Result as LockResult};
use oms_types::{BranchState, LockId};
use sqlx::types::Json;
use sqlx::PgPool;

pub enum BranchStateRepo {
    Postgres(PgPool),
    #[cfg(feature = "mock")]
    Mock(std::sync::Arc<oms_locks::branch_state::InMemoryBranchStateStore>),
}

impl BranchStateRepo {
    pub fn new(pool: PgPool) -> Self {
        Self::Postgres(pool)
    }

    #[cfg(feature = "mock")]
    pub fn new_mock() -> Self {
        Self::Mock(std::sync::Arc::new(oms_locks::branch_state::InMemoryBranchStateStore::new()))
    }
}

#[async_trait]
impl BranchStateStore for BranchStateRepo {
    async fn get(&self, branch: &str) -> LockResult<BranchStateInfo> {
        match self {
            Self::Postgres(pool) => {
                let row: Option<(Json<BranchStateInfo>,)> = sqlx::query_as("SELECT data FROM branch_states WHERE branch = $1")
                    .bind(branch)
                    .fetch_optional(pool)
                    .await
                    .map_err(|e| LockError::StoreUnavailable(DbError::from(e).to_string()))?;

                match row {
                    Some((Json(info),)) => Ok(info),
                    None => {
                        let fresh = BranchStateInfo {
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
                        };
                        sqlx::query("INSERT INTO branch_states (branch, data, version, created_at) VALUES ($1, $2, $3, now()) ON CONFLICT (branch) DO NOTHING")
                            .bind(branch)
                            .bind(Json(&fresh))
                            .bind(fresh.version)
                            .execute(pool)
                            .await
                            .map_err(|e| LockError::StoreUnavailable(DbError::from(e).to_string()))?;
                        Ok(fresh)
                    }
                }
            }
            #[cfg(feature = "mock")]
            Self::Mock(inner) => inner.get(branch).await,
        }
    }

    async fn cas_update(
        &self,
        branch: &str,
        expected_version: i64,
        new_state: BranchState,
        changed_by: Option<String>,
        reason: Option<String>,
        triggering_lock: Option<LockId>,
    ) -> LockResult<BranchStateInfo> {
        match self {
            Self::Postgres(pool) => {
                let current = self.get(branch).await?;
                if current.version != expected_version {
                    return Err(LockError::VersionConflict {
                        branch: branch.to_string(),
                        expected: expected_version,
                    });
                }
                if !oms_types::is_valid_transition(current.state, new_state) {
                    return Err(LockError::InvalidTransition {
                        from: current.state,
                        to: new_state,
                    });
                }

                let updated = BranchStateInfo {
                    branch: branch.to_string(),
                    state: new_state,
                    prev_state: Some(current.state),
                    changed_at: Utc::now(),
                    changed_by: changed_by.clone(),
                    reason: reason.clone(),
                    active_locks: current.active_locks.clone(),
                    indexing_started_at: current.indexing_started_at,
                    indexing_completed_at: current.indexing_completed_at,
                    auto_merge_enabled: current.auto_merge_enabled,
                    version: current.version + 1,
                };

                let result = sqlx::query("UPDATE branch_states SET data = $1, version = $2 WHERE branch = $3 AND version = $4")
                    .bind(Json(&updated))
                    .bind(updated.version)
                    .bind(branch)
                    .bind(expected_version)
                    .execute(pool)
                    .await
                    .map_err(|e| LockError::StoreUnavailable(DbError::from(e).to_string()))?;

                if result.rows_affected() == 0 {
                    return Err(LockError::VersionConflict {
                        branch: branch.to_string(),
                        expected: expected_version,
                    });
                }

                let transition = BranchTransition {
                    branch: branch.to_string(),
                    from: current.state,
                    to: new_state,
                    changed_at: updated.changed_at,
                    changed_by,
                    reason,
                    triggering_lock,
                };
                sqlx::query("INSERT INTO branch_transitions (branch, data, changed_at) VALUES ($1, $2, $3)")
                    .bind(branch)
                    .bind(Json(&transition))
                    .bind(transition.changed_at)
                    .execute(pool)
                    .await
                    .map_err(|e| LockError::StoreUnavailable(DbError::from(e).to_string()))?;

                Ok(updated)
            }
            #[cfg(feature = "mock")]
            Self::Mock(inner) => inner.cas_update(branch, expected_version, new_state, changed_by, reason, triggering_lock).await,
        }
    }

    async fn set_active_locks(&self, branch: &str, locks: Vec<LockId>) -> LockResult<()> {
        match self {
            Self::Postgres(pool) => {
                let current = self.get(branch).await?;
                let updated = BranchStateInfo { active_locks: locks, ..current };
                sqlx::query("UPDATE branch_states SET data = $1 WHERE branch = $2")
                    .bind(Json(&updated))
                    .bind(branch)
                    .execute(pool)
                    .await
                    .map_err(|e| LockError::StoreUnavailable(DbError::from(e).to_string()))?;
                Ok(())
            }
            #[cfg(feature = "mock")]
            Self::Mock(inner) => inner.set_active_locks(branch, locks).await,
        }
    }

    async fn transitions(&self, branch: &str) -> LockResult<Vec<BranchTransition>> {
        match self {
            Self::Postgres(pool) => {
                let rows: Vec<(Json<BranchTransition>,)> = sqlx::query_as("SELECT data FROM branch_transitions WHERE branch = $1 ORDER BY id ASC")
                    .bind(branch)
                    .fetch_all(pool)
                    .await
                    .map_err(|e| LockError::StoreUnavailable(DbError::from(e).to_string()))?;
                Ok(rows.into_iter().map(|(Json(t),)| t).collect())
            }
            #[cfg(feature = "mock")]
            Self::Mock(inner) => inner.transitions(branch).await,
        }
    }
}
