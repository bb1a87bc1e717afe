//! §3 `ConsumerState`: one row per `consumer_id`, hash-chained via
//! `state_commit = sha256(sorted_json(state))` so that every
//! processing step can be verified against exactly what it started
//! from — the same canonicalizer used for commit and author hashes
//! (`oms_core::canonical`, per the REDESIGN note in §9).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use oms_core::canonical::commit_hash;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerState {
    pub consumer_id: String,
    pub consumer_version: String,
    pub last_event_id: Option<String>,
    pub last_ts: Option<DateTime<Utc>>,
    pub last_sequence: Option<u64>,
    /// The consumer's accumulated application state. Opaque to this
    /// crate; handlers read and return it.
    pub state_data: Value,
    pub state_commit: String,
    pub state_version: i64,
    pub events_processed: u64,
    pub events_skipped: u64,
    pub events_failed: u64,
    pub last_heartbeat: DateTime<Utc>,
    pub healthy: bool,
    pub error_count: u32,
}

impl ConsumerState {
    pub fn fresh(consumer_id: impl Into<String>, consumer_version: impl Into<String>) -> Self {
        let state_data = Value::Null;
        let state_commit = commit_hash(&state_data).unwrap_or_default();
        Self {
            consumer_id: consumer_id.into(),
            consumer_version: consumer_version.into(),
            last_event_id: None,
            last_ts: None,
            last_sequence: None,
            state_data,
            state_commit,
            state_version: 0,
            events_processed: 0,
            events_skipped: 0,
            events_failed: 0,
            last_heartbeat: Utc::now(),
            healthy: true,
            error_count: 0,
        }
    }

    /// Recomputes `state_commit` from `state_data` using the shared
    /// canonicalizer. Called after every mutation so the commit never
    /// drifts from the data it describes.
    pub fn rehash(&mut self) {
        self.state_commit = commit_hash(&self.state_data).unwrap_or_else(|_| self.state_commit.clone());
    }
}

/// Single-writer-per-`consumer_id` store (§5: "parallel consumers of
/// the same id are illegal, enforced by lease + heartbeat"). This
/// trait only models the data side; lease enforcement lives in
/// [`crate::processor::IdempotentConsumer`].
#[async_trait]
pub trait ConsumerStateStore: Send + Sync {
    async fn get(&self, consumer_id: &str) -> Option<ConsumerState>;
    async fn put(&self, state: ConsumerState);
}

#[derive(Default)]
pub struct InMemoryConsumerStateStore {
    states: DashMap<String, ConsumerState>,
}

impl InMemoryConsumerStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConsumerStateStore for InMemoryConsumerStateStore {
    async fn get(&self, consumer_id: &str) -> Option<ConsumerState> {
        self.states.get(consumer_id).map(|s| s.clone())
    }

    async fn put(&self, state: ConsumerState) {
        self.states.insert(state.consumer_id.clone(), state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_state_hashes_null_data() {
        let state = ConsumerState::fresh("schema_consumer", "1.0.0");
        assert_eq!(state.state_commit, commit_hash(&Value::Null).unwrap());
        assert_eq!(state.state_version, 0);
        assert!(state.healthy);
    }

    #[test]
    fn rehash_tracks_state_data_mutation() {
        let mut state = ConsumerState::fresh("c1", "1.0.0");
        let before = state.state_commit.clone();
        state.state_data = serde_json::json!({"seen": ["evt_001"]});
        state.rehash();
        assert_ne!(state.state_commit, before);
    }
}
