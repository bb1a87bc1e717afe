//! Relay loop (§4.8): "a single-writer background task per shard that
//! (1) reads pending rows ordered by id, (2) publishes to the event
//! bus with an idempotency key = event_id, (3) on success marks
//! delivered, (4) on transient failure increments retry_count and
//! backs off exponentially, (5) on permanent failure (retry >= N)
//! marks failed and raises an alert."

use crate::bus::EventBus;
use crate::record::{OutboxRecord, OutboxStore};
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

pub const MAX_RETRIES: u32 = 8;
const BASE_BACKOFF_S: i64 = 1;
const MAX_BACKOFF_S: i64 = 300;

fn backoff_seconds(retry_count: u32) -> i64 {
    let exp = BASE_BACKOFF_S.saturating_mul(1i64 << retry_count.min(20));
    exp.min(MAX_BACKOFF_S)
}

/// One relay pass over up to `batch_size` pending records. Returns
/// `(delivered, failed_permanently)` so callers (tests, metrics) can
/// observe progress without waiting on the real interval.
pub async fn relay_once(store: &dyn OutboxStore, bus: &dyn EventBus, batch_size: usize) -> (usize, usize) {
    let mut delivered = 0usize;
    let mut failed = 0usize;

    for record in store.pending(batch_size).await.unwrap_or_default() {
        match bus.publish(&record.stream, &record.envelope).await {
            Ok(()) => {
                if store.mark_delivered(record.id).await.is_ok() {
                    delivered += 1;
                }
            }
            Err(err) => {
                if record.retry_count + 1 >= MAX_RETRIES {
                    error!(outbox_id = record.id, stream = %record.stream, error = %err, "outbox record permanently failed, raising alert");
                    let _ = store.mark_failed(record.id, &err.to_string()).await;
                    failed += 1;
                } else {
                    let next_attempt_at = Utc::now() + ChronoDuration::seconds(backoff_seconds(record.retry_count));
                    warn!(outbox_id = record.id, retry_count = record.retry_count + 1, error = %err, "outbox publish failed, backing off");
                    let _ = store.mark_retry(record.id, &err.to_string(), next_attempt_at).await;
                }
            }
        }
    }

    (delivered, failed)
}

/// Spawns a periodic relay loop for one shard. Production deployments
/// run `OUTBOX_RELAY_SHARDS` of these, each claiming a disjoint
/// partition of rows (left to the real [`OutboxStore`] implementation
/// to define).
pub fn spawn(store: Arc<dyn OutboxStore>, bus: Arc<dyn EventBus>, interval: Duration, batch_size: usize, shard: usize) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let (delivered, failed) = relay_once(store.as_ref(), bus.as_ref(), batch_size).await;
            if delivered > 0 || failed > 0 {
                info!(shard, delivered, failed, "outbox relay pass complete");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InMemoryEventBus;
    use crate::envelope::EventEnvelope;
    use crate::record::InMemoryOutboxStore;
    use serde_json::json;

    #[tokio::test]
    async fn relay_delivers_pending_record() {
        let store = InMemoryOutboxStore::new();
        let bus = InMemoryEventBus::new();
        let envelope = EventEnvelope::new("object_type.created", "oms", "1.0.0", "corr-1", json!({}));
        let record: OutboxRecord = store.enqueue("ot-1", "oms.object_type.created.main", envelope).await.unwrap();

        let (delivered, failed) = relay_once(&store, &bus, 10).await;
        assert_eq!(delivered, 1);
        assert_eq!(failed, 0);
        assert_eq!(bus.published_on("oms.object_type.created.main").len(), 1);
        assert_eq!(store.get(record.id).await.unwrap().unwrap().status, crate::record::OutboxStatus::Delivered);
    }

    #[tokio::test]
    async fn backoff_grows_and_caps() {
        assert_eq!(backoff_seconds(0), 1);
        assert_eq!(backoff_seconds(3), 8);
        assert_eq!(backoff_seconds(20), MAX_BACKOFF_S);
    }

    struct AlwaysFailsBus;

    #[async_trait::async_trait]
    impl EventBus for AlwaysFailsBus {
        async fn publish(&self, _stream: &str, _envelope: &EventEnvelope) -> crate::error::Result<()> {
            Err(crate::error::OutboxError::PublishFailed("bus offline".to_string()))
        }
    }

    #[tokio::test]
    async fn permanent_failure_after_max_retries() {
        let store = InMemoryOutboxStore::new();
        let bus = AlwaysFailsBus;
        let envelope = EventEnvelope::new("object_type.created", "oms", "1.0.0", "corr-1", json!({}));
        let record = store.enqueue("ot-1", "oms.object_type.created.main", envelope).await.unwrap();

        // Drive retry_count to one shy of the limit directly, bypassing
        // the real backoff delay, then let one relay pass tip it over.
        for _ in 0..MAX_RETRIES - 1 {
            store.mark_retry(record.id, "bus offline", Utc::now() - ChronoDuration::seconds(1)).await.unwrap();
        }

        let (_, failed) = relay_once(&store, &bus, 10).await;
        assert_eq!(failed, 1);

        let final_record = store.get(record.id).await.unwrap().unwrap();
        assert_eq!(final_record.status, crate::record::OutboxStatus::Failed);
    }
}
