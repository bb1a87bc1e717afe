//! §3 `EventProcessingRecord`: primary key `(consumer_id, event_id)` —
//! this *is* the dedup record referenced throughout §4.9.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Success,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventProcessingRecord {
    pub event_id: String,
    pub event_type: String,
    pub event_version: u32,
    pub consumer_id: String,
    pub consumer_version: String,
    pub input_commit: String,
    pub output_commit: String,
    pub processed_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub status: ProcessingStatus,
    pub error: Option<String>,
    pub retry_count: u32,
    pub side_effects: Vec<String>,
    pub created_resources: Vec<String>,
    pub updated_resources: Vec<String>,
    pub idempotency_key: String,
    pub is_duplicate: bool,
}

#[async_trait]
pub trait ProcessingLog: Send + Sync {
    async fn get(&self, consumer_id: &str, event_id: &str) -> Option<EventProcessingRecord>;
    async fn put(&self, record: EventProcessingRecord);
    /// All records for a consumer in the order they were written,
    /// used by [`crate::replay::replay`] to rebuild a processing
    /// timeline without a real bus.
    async fn history(&self, consumer_id: &str) -> Vec<EventProcessingRecord>;
}

#[derive(Default)]
pub struct InMemoryProcessingLog {
    records: DashMap<(String, String), EventProcessingRecord>,
    order: dashmap::DashMap<String, Vec<String>>,
}

impl InMemoryProcessingLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProcessingLog for InMemoryProcessingLog {
    async fn get(&self, consumer_id: &str, event_id: &str) -> Option<EventProcessingRecord> {
        self.records.get(&(consumer_id.to_string(), event_id.to_string())).map(|r| r.clone())
    }

    async fn put(&self, record: EventProcessingRecord) {
        let key = (record.consumer_id.clone(), record.event_id.clone());
        if !self.records.contains_key(&key) {
            self.order.entry(record.consumer_id.clone()).or_default().push(record.event_id.clone());
        }
        self.records.insert(key, record);
    }

    async fn history(&self, consumer_id: &str) -> Vec<EventProcessingRecord> {
        let event_ids = self.order.get(consumer_id).map(|v| v.clone()).unwrap_or_default();
        let mut by_id: BTreeMap<String, EventProcessingRecord> = BTreeMap::new();
        for event_id in &event_ids {
            if let Some(r) = self.records.get(&(consumer_id.to_string(), event_id.clone())) {
                by_id.insert(event_id.clone(), r.clone());
            }
        }
        event_ids.into_iter().filter_map(|id| by_id.remove(&id)).collect()
    }
}
