//! Postgres-backed `outbox` table, implementing
//! [`oms_outbox::OutboxStore`]. The outbox row must land in the same
//! write batch as the business commit — real callers wrap the
//! business-table write and this `enqueue` in one `sqlx::Transaction`;
//! this repo only defines the row shape and query surface, not
//! transaction scoping, which belongs to the caller composing C5/C6
//! with C8, the same way every other repo here leaves transaction
//! boundaries to its callers rather than hiding them inside one.

use chrono::{DateTime, Utc};
use oms_outbox::{EventEnvelope, OutboxError, OutboxRecord, OutboxStatus, OutboxStore, Result as OutboxResult};
use sqlx::types::Json;
use sqlx::{PgPool, Row};

pub enum OutboxRepo {
    Postgres(PgPool),
    #[cfg(feature = "mock")]
    Mock(std::sync::Arc<oms_outbox::InMemoryOutboxStore>),
}

impl OutboxRepo {
    pub fn new(pool: PgPool) -> Self {
        Self::Postgres(pool)
    }

    #[cfg(feature = "mock")]
    pub fn new_mock() -> Self {
        Self::Mock(std::sync::Arc::new(oms_outbox::InMemoryOutboxStore::new()))
    }
}

fn status_from_str(s: &str) -> OutboxStatus {
    match s {
        "delivered" => OutboxStatus::Delivered,
        "failed" => OutboxStatus::Failed,
        _ => OutboxStatus::Pending,
    }
}

fn row_to_record(id: i64, aggregate_id: String, stream: String, envelope: Json<EventEnvelope>, created_at: DateTime<Utc>, status: String, retry_count: i32, last_error: Option<String>, next_attempt_at: DateTime<Utc>) -> OutboxRecord {
    OutboxRecord {
        id: id as u64,
        aggregate_id,
        stream,
        envelope: envelope.0,
        created_at,
        status: status_from_str(&status),
        retry_count: retry_count as u32,
        last_error,
        next_attempt_at,
    }
}

#[async_trait::async_trait]
impl OutboxStore for OutboxRepo {
    async fn enqueue(&self, aggregate_id: &str, stream: &str, envelope: EventEnvelope) -> OutboxResult<OutboxRecord> {
        match self {
            Self::Postgres(pool) => {
                let now = Utc::now();
                let row = sqlx::query(
                    "INSERT INTO outbox (aggregate_id, stream, envelope, created_at, status, retry_count, next_attempt_at)
                     VALUES ($1, $2, $3, $4, 'pending', 0, $4) RETURNING id",
                )
                .bind(aggregate_id)
                .bind(stream)
                .bind(Json(&envelope))
                .bind(now)
                .fetch_one(pool)
                .await
                .map_err(|e| OutboxError::StoreUnavailable(e.to_string()))?;
                let id: i64 = row.get("id");
                Ok(OutboxRecord {
                    id: id as u64,
                    aggregate_id: aggregate_id.to_string(),
                    stream: stream.to_string(),
                    envelope,
                    created_at: now,
                    status: OutboxStatus::Pending,
                    retry_count: 0,
                    last_error: None,
                    next_attempt_at: now,
                })
            }
            #[cfg(feature = "mock")]
            Self::Mock(inner) => inner.enqueue(aggregate_id, stream, envelope).await,
        }
    }

    async fn pending(&self, limit: usize) -> OutboxResult<Vec<OutboxRecord>> {
        match self {
            Self::Postgres(pool) => {
                let rows = sqlx::query(
                    "SELECT id, aggregate_id, stream, envelope, created_at, status, retry_count, last_error, next_attempt_at
                     FROM outbox WHERE status = 'pending' AND next_attempt_at <= now() ORDER BY id ASC LIMIT $1",
                )
                .bind(limit as i64)
                .fetch_all(pool)
                .await
                .map_err(|e| OutboxError::StoreUnavailable(e.to_string()))?;

                Ok(rows
                    .into_iter()
                    .map(|r| {
                        row_to_record(
                            r.get("id"),
                            r.get("aggregate_id"),
                            r.get("stream"),
                            r.get::<Json<EventEnvelope>, _>("envelope"),
                            r.get("created_at"),
                            r.get("status"),
                            r.get("retry_count"),
                            r.get("last_error"),
                            r.get("next_attempt_at"),
                        )
                    })
                    .collect())
            }
            #[cfg(feature = "mock")]
            Self::Mock(inner) => inner.pending(limit).await,
        }
    }

    async fn mark_delivered(&self, id: u64) -> OutboxResult<()> {
        match self {
            Self::Postgres(pool) => {
                sqlx::query("UPDATE outbox SET status = 'delivered' WHERE id = $1")
                    .bind(id as i64)
                    .execute(pool)
                    .await
                    .map_err(|e| OutboxError::StoreUnavailable(e.to_string()))?;
                Ok(())
            }
            #[cfg(feature = "mock")]
            Self::Mock(inner) => inner.mark_delivered(id).await,
        }
    }

    async fn mark_retry(&self, id: u64, error: &str, next_attempt_at: DateTime<Utc>) -> OutboxResult<()> {
        match self {
            Self::Postgres(pool) => {
                sqlx::query("UPDATE outbox SET retry_count = retry_count + 1, last_error = $1, next_attempt_at = $2 WHERE id = $3")
                    .bind(error)
                    .bind(next_attempt_at)
                    .bind(id as i64)
                    .execute(pool)
                    .await
                    .map_err(|e| OutboxError::StoreUnavailable(e.to_string()))?;
                Ok(())
            }
            #[cfg(feature = "mock")]
            Self::Mock(inner) => inner.mark_retry(id, error, next_attempt_at).await,
        }
    }

    async fn mark_failed(&self, id: u64, error: &str) -> OutboxResult<()> {
        match self {
            Self::Postgres(pool) => {
                sqlx::query("UPDATE outbox SET status = 'failed', last_error = $1 WHERE id = $2")
                    .bind(error)
                    .bind(id as i64)
                    .execute(pool)
                    .await
                    .map_err(|e| OutboxError::StoreUnavailable(e.to_string()))?;
                Ok(())
            }
            #[cfg(feature = "mock")]
            Self::Mock(inner) => inner.mark_failed(id, error).await,
        }
    }

    async fn get(&self, id: u64) -> OutboxResult<Option<OutboxRecord>> {
        match self {
            Self::Postgres(pool) => {
                let row = sqlx::query(
                    "SELECT id, aggregate_id, stream, envelope, created_at, status, retry_count, last_error, next_attempt_at
                     FROM outbox WHERE id = $1",
                )
                .bind(id as i64)
                .fetch_optional(pool)
                .await
                .map_err(|e| OutboxError::StoreUnavailable(e.to_string()))?;

                Ok(row.map(|r| {
                    row_to_record(
                        r.get("id"),
                        r.get("aggregate_id"),
                        r.get("stream"),
                        r.get::<Json<EventEnvelope>, _>("envelope"),
                        r.get("created_at"),
                        r.get("status"),
                        r.get("retry_count"),
                        r.get("last_error"),
                        r.get("next_attempt_at"),
                    )
                }))
            }
            #[cfg(feature = "mock")]
            Self::Mock(inner) => inner.get(id).await,
        }
    }
}
