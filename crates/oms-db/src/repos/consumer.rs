//! Postgres-backed `consumer_states`, `event_processing_records` and
//! `consumer_checkpoints` tables (§6), implementing the three
//! `oms-consumer` storage traits. Kept in one file since all three
//! back the same consumer lifecycle and share the lease-per-consumer
//! story in `oms_consumer::processor`.

use async_trait::async_trait;
use oms_consumer::checkpoint::{CheckpointStore, ConsumerCheckpoint};
use oms_consumer::record::{EventProcessingRecord, ProcessingLog};
use oms_consumer::state::{ConsumerState, ConsumerStateStore};
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::warn;

pub enum ConsumerStateRepo {
    Postgres(PgPool),
    #[cfg(feature = "mock")]
    Mock(std::sync::Arc<oms_consumer::state::InMemoryConsumerStateStore>),
}

impl ConsumerStateRepo {
    pub fn new(pool: PgPool) -> Self {
        Self::Postgres(pool)
    }

    #[cfg(feature = "mock")]
    pub fn new_mock() -> Self {
        Self::Mock(std::sync::Arc::new(oms_consumer::state::InMemoryConsumerStateStore::new()))
    }
}

#[async_trait]
impl ConsumerStateStore for ConsumerStateRepo {
    async fn get(&self, consumer_id: &str) -> Option<ConsumerState> {
        match self {
            Self::Postgres(pool) => {
                let row: Option<(Json<ConsumerState>,)> = sqlx::query_as("SELECT data FROM consumer_states WHERE consumer_id = $1")
                    .bind(consumer_id)
                    .fetch_optional(pool)
                    .await
                    .unwrap_or_else(|e| {
                        warn!(error = %e, "consumer_states get failed");
                        None
                    });
                row.map(|(Json(s),)| s)
            }
            #[cfg(feature = "mock")]
            Self::Mock(inner) => inner.get(consumer_id).await,
        }
    }

    async fn put(&self, state: ConsumerState) {
        match self {
            Self::Postgres(pool) => {
                let _ = sqlx::query(
                    "INSERT INTO consumer_states (consumer_id, data, state_version, updated_at) VALUES ($1, $2, $3, now())
                     ON CONFLICT (consumer_id) DO UPDATE SET data = EXCLUDED.data, state_version = EXCLUDED.state_version, updated_at = now()",
                )
                .bind(&state.consumer_id)
                .bind(Json(&state))
                .bind(state.state_version)
                .execute(pool)
                .await
                .map_err(|e| warn!(error = %e, "consumer_states put failed"));
            }
            #[cfg(feature = "mock")]
            Self::Mock(inner) => inner.put(state).await,
        }
    }
}

pub enum ProcessingLogRepo {
    Postgres(PgPool),
    #[cfg(feature = "mock")]
    Mock(std::sync::Arc<oms_consumer::record::InMemoryProcessingLog>),
}

impl ProcessingLogRepo {
    pub fn new(pool: PgPool) -> Self {
        Self::Postgres(pool)
    }

    #[cfg(feature = "mock")]
    pub fn new_mock() -> Self {
        Self::Mock(std::sync::Arc::new(oms_consumer::record::InMemoryProcessingLog::new()))
    }
}

#[async_trait]
impl ProcessingLog for ProcessingLogRepo {
    async fn get(&self, consumer_id: &str, event_id: &str) -> Option<EventProcessingRecord> {
        match self {
            Self::Postgres(pool) => {
                let row: Option<(Json<EventProcessingRecord>,)> = sqlx::query_as(
                    "SELECT data FROM event_processing_records WHERE consumer_id = $1 AND event_id = $2",
                )
                .bind(consumer_id)
                .bind(event_id)
                .fetch_optional(pool)
                .await
                .unwrap_or_else(|e| {
                    warn!(error = %e, "event_processing_records get failed");
                    None
                });
                row.map(|(Json(r),)| r)
            }
            #[cfg(feature = "mock")]
            Self::Mock(inner) => inner.get(consumer_id, event_id).await,
        }
    }

    async fn put(&self, record: EventProcessingRecord) {
        match self {
            Self::Postgres(pool) => {
                let _ = sqlx::query(
                    "INSERT INTO event_processing_records (consumer_id, event_id, data, processed_at) VALUES ($1, $2, $3, $4)
                     ON CONFLICT (consumer_id, event_id) DO UPDATE SET data = EXCLUDED.data",
                )
                .bind(&record.consumer_id)
                .bind(&record.event_id)
                .bind(Json(&record))
                .bind(record.processed_at)
                .execute(pool)
                .await
                .map_err(|e| warn!(error = %e, "event_processing_records put failed"));
            }
            #[cfg(feature = "mock")]
            Self::Mock(inner) => inner.put(record).await,
        }
    }

    async fn history(&self, consumer_id: &str) -> Vec<EventProcessingRecord> {
        match self {
            Self::Postgres(pool) => {
                let rows: Vec<(Json<EventProcessingRecord>,)> = sqlx::query_as(
                    "SELECT data FROM event_processing_records WHERE consumer_id = $1 ORDER BY processed_at ASC",
                )
                .bind(consumer_id)
                .fetch_all(pool)
                .await
                .unwrap_or_else(|e| {
                    warn!(error = %e, "event_processing_records history failed");
                    Vec::new()
                });
                rows.into_iter().map(|(Json(r),)| r).collect()
            }
            #[cfg(feature = "mock")]
            Self::Mock(inner) => inner.history(consumer_id).await,
        }
    }
}

pub enum CheckpointRepo {
    Postgres(PgPool),
    #[cfg(feature = "mock")]
    Mock(std::sync::Arc<oms_consumer::checkpoint::InMemoryCheckpointStore>),
}

impl CheckpointRepo {
    pub fn new(pool: PgPool) -> Self {
        Self::Postgres(pool)
    }

    #[cfg(feature = "mock")]
    pub fn new_mock() -> Self {
        Self::Mock(std::sync::Arc::new(oms_consumer::checkpoint::InMemoryCheckpointStore::new()))
    }
}

#[async_trait]
impl CheckpointStore for CheckpointRepo {
    async fn latest(&self, consumer_id: &str) -> Option<ConsumerCheckpoint> {
        match self {
            Self::Postgres(pool) => {
                let row: Option<(Json<ConsumerCheckpoint>,)> = sqlx::query_as(
                    "SELECT data FROM consumer_checkpoints WHERE consumer_id = $1 ORDER BY taken_at DESC LIMIT 1",
                )
                .bind(consumer_id)
                .fetch_optional(pool)
                .await
                .unwrap_or_else(|e| {
                    warn!(error = %e, "consumer_checkpoints latest failed");
                    None
                });
                row.map(|(Json(c),)| c)
            }
            #[cfg(feature = "mock")]
            Self::Mock(inner) => inner.latest(consumer_id).await,
        }
    }

    async fn put(&self, checkpoint: ConsumerCheckpoint) {
        match self {
            Self::Postgres(pool) => {
                let _ = sqlx::query(
                    "INSERT INTO consumer_checkpoints (consumer_id, data, taken_at) VALUES ($1, $2, $3)",
                )
                .bind(&checkpoint.consumer_id)
                .bind(Json(&checkpoint))
                .bind(checkpoint.taken_at)
                .execute(pool)
                .await
                .map_err(|e| warn!(error = %e, "consumer_checkpoints put failed"));
            }
            #[cfg(feature = "mock")]
            Self::Mock(inner) => inner.put(checkpoint).await,
        }
    }
}
