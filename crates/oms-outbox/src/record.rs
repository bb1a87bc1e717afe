//! §3 `OutboxRecord`: "stored in the same transactional scope as the
//! business commit."

use crate::envelope::EventEnvelope;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxStatus {
    Pending,
    Delivered,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxRecord {
    pub id: u64,
    pub aggregate_id: String,
    pub stream: String,
    pub envelope: EventEnvelope,
    pub created_at: DateTime<Utc>,
    pub status: OutboxStatus,
    pub retry_count: u32,
    pub last_error: Option<String>,
    pub next_attempt_at: DateTime<Utc>,
}

/// The transactional outbox table. A real deployment writes this row
/// in the same database transaction as the business commit (§4.8);
/// the in-memory reference here just needs to behave as if it were.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    async fn enqueue(&self, aggregate_id: &str, stream: &str, envelope: EventEnvelope) -> Result<OutboxRecord>;
    async fn pending(&self, limit: usize) -> Result<Vec<OutboxRecord>>;
    async fn mark_delivered(&self, id: u64) -> Result<()>;
    async fn mark_retry(&self, id: u64, error: &str, next_attempt_at: DateTime<Utc>) -> Result<()>;
    async fn mark_failed(&self, id: u64, error: &str) -> Result<()>;
    async fn get(&self, id: u64) -> Result<Option<OutboxRecord>>;
}

#[derive(Default)]
pub struct InMemoryOutboxStore {
    records: DashMap<u64, OutboxRecord>,
    next_id: AtomicU64,
}

impl InMemoryOutboxStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OutboxStore for InMemoryOutboxStore {
    async fn enqueue(&self, aggregate_id: &str, stream: &str, envelope: EventEnvelope) -> Result<OutboxRecord> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let record = OutboxRecord {
            id,
            aggregate_id: aggregate_id.to_string(),
            stream: stream.to_string(),
            envelope,
            created_at: Utc::now(),
            status: OutboxStatus::Pending,
            retry_count: 0,
            last_error: None,
            next_attempt_at: Utc::now(),
        };
        self.records.insert(id, record.clone());
        Ok(record)
    }

    async fn pending(&self, limit: usize) -> Result<Vec<OutboxRecord>> {
        let now = Utc::now();
        let mut rows: Vec<OutboxRecord> = self
            .records
            .iter()
            .filter(|r| r.status == OutboxStatus::Pending && r.next_attempt_at <= now)
            .map(|r| r.value().clone())
            .collect();
        rows.sort_by_key(|r| r.id);
        rows.truncate(limit);
        Ok(rows)
    }

    async fn mark_delivered(&self, id: u64) -> Result<()> {
        if let Some(mut r) = self.records.get_mut(&id) {
            r.status = OutboxStatus::Delivered;
        }
        Ok(())
    }

    async fn mark_retry(&self, id: u64, error: &str, next_attempt_at: DateTime<Utc>) -> Result<()> {
        if let Some(mut r) = self.records.get_mut(&id) {
            r.retry_count += 1;
            r.last_error = Some(error.to_string());
            r.next_attempt_at = next_attempt_at;
        }
        Ok(())
    }

    async fn mark_failed(&self, id: u64, error: &str) -> Result<()> {
        if let Some(mut r) = self.records.get_mut(&id) {
            r.status = OutboxStatus::Failed;
            r.last_error = Some(error.to_string());
        }
        Ok(())
    }

    async fn get(&self, id: u64) -> Result<Option<OutboxRecord>> {
        Ok(self.records.get(&id).map(|r| r.clone()))
    }
}
