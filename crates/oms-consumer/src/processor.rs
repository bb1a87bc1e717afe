//! §4.9 `process(event) -> IdempotentResult`: the dedup + state
//! transition + side-effect-enqueue pipeline.

use crate::error::{ConsumerError, Result};
use crate::handler::EventHandler;
use crate::record::{EventProcessingRecord, ProcessingLog, ProcessingStatus};
use crate::state::{ConsumerState, ConsumerStateStore};
use dashmap::DashMap;
use oms_core::canonical::commit_hash;
use oms_outbox::{EventEnvelope, OutboxStore};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, warn};

/// Consecutive processing failures on the *same* consumer before it's
/// marked unhealthy and further events are dead-lettered (§4.9
/// failure semantics).
pub const MAX_CONSECUTIVE_FAILURES: u32 = 5;

#[derive(Debug, Clone)]
pub struct IdempotentResult {
    pub processed: bool,
    pub was_duplicate: bool,
    pub prev_commit: String,
    pub new_commit: String,
    pub side_effects_enqueued: usize,
    pub processing_time_ms: u64,
}

pub struct IdempotentConsumer<S: ConsumerStateStore, L: ProcessingLog> {
    states: Arc<S>,
    log: Arc<L>,
    outbox: Arc<dyn OutboxStore>,
    /// Per-`consumer_id` in-process lease, modeling §5's "parallel
    /// consumers of the same id are illegal" as a local mutex. A real
    /// multi-replica deployment backs this with a DB lease + heartbeat;
    /// here the mutex is the whole mechanism.
    leases: DashMap<String, Arc<Mutex<()>>>,
}

impl<S: ConsumerStateStore, L: ProcessingLog> IdempotentConsumer<S, L> {
    pub fn new(states: Arc<S>, log: Arc<L>, outbox: Arc<dyn OutboxStore>) -> Self {
        Self {
            states,
            log,
            outbox,
            leases: DashMap::new(),
        }
    }

    fn lease_for(&self, consumer_id: &str) -> Arc<Mutex<()>> {
        self.leases.entry(consumer_id.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    pub async fn process(&self, handler: &dyn EventHandler, event: &EventEnvelope) -> Result<IdempotentResult> {
        let consumer_id = handler.consumer_id();
        let lease = self.lease_for(consumer_id);
        let _guard = lease.lock().await;
        let started = std::time::Instant::now();

        if let Some(existing) = self.log.get(consumer_id, &event.event_id).await {
            if existing.status == ProcessingStatus::Success {
                return Ok(IdempotentResult {
                    processed: false,
                    was_duplicate: true,
                    prev_commit: existing.output_commit.clone(),
                    new_commit: existing.output_commit,
                    side_effects_enqueued: 0,
                    processing_time_ms: started.elapsed().as_millis() as u64,
                });
            }
        }

        let mut state = self.states.get(consumer_id).await.unwrap_or_else(|| ConsumerState::fresh(consumer_id, handler.consumer_version()));
        let input_commit = state.state_commit.clone();

        if !state.healthy {
            warn!(consumer_id, event_id = %event.event_id, "consumer unhealthy, dead-lettering event");
            return Err(ConsumerError::DeadLettered(consumer_id.to_string(), state.error_count));
        }

        match handler.handle(&state.state_data, event).await {
            Ok(outcome) => {
                let output_commit = commit_hash(&outcome.new_state).map_err(|e| ConsumerError::HashFailure(e.to_string()))?;

                let mut side_effects_enqueued = 0usize;
                let mut side_effect_ids = Vec::with_capacity(outcome.side_effects.len());
                for effect in &outcome.side_effects {
                    self.outbox
                        .enqueue(&effect.aggregate_id, &effect.stream, effect.envelope.clone())
                        .await
                        .map_err(|e| ConsumerError::StoreUnavailable(e.to_string()))?;
                    side_effects_enqueued += 1;
                    side_effect_ids.push(effect.envelope.event_id.clone());
                }

                state.state_data = outcome.new_state;
                state.state_commit = output_commit.clone();
                state.state_version += 1;
                state.last_event_id = Some(event.event_id.clone());
                state.last_ts = Some(event.created_at);
                state.last_sequence = event.sequence;
                state.events_processed += 1;
                state.last_heartbeat = event.created_at;
                state.healthy = true;
                state.error_count = 0;
                self.states.put(state).await;

                self.log
                    .put(EventProcessingRecord {
                        event_id: event.event_id.clone(),
                        event_type: event.event_type.clone(),
                        event_version: event.version,
                        consumer_id: consumer_id.to_string(),
                        consumer_version: handler.consumer_version().to_string(),
                        input_commit: input_commit.clone(),
                        output_commit: output_commit.clone(),
                        processed_at: chrono::Utc::now(),
                        duration_ms: started.elapsed().as_millis() as u64,
                        status: ProcessingStatus::Success,
                        error: None,
                        retry_count: 0,
                        side_effects: side_effect_ids,
                        created_resources: outcome.created_resources,
                        updated_resources: outcome.updated_resources,
                        idempotency_key: event.event_id.clone(),
                        is_duplicate: false,
                    })
                    .await;

                Ok(IdempotentResult {
                    processed: true,
                    was_duplicate: false,
                    prev_commit: input_commit,
                    new_commit: output_commit,
                    side_effects_enqueued,
                    processing_time_ms: started.elapsed().as_millis() as u64,
                })
            }
            Err(reason) => {
                let mut failing = self.states.get(consumer_id).await.unwrap_or_else(|| ConsumerState::fresh(consumer_id, handler.consumer_version()));
                failing.events_failed += 1;
                failing.error_count += 1;
                if failing.error_count >= MAX_CONSECUTIVE_FAILURES {
                    failing.healthy = false;
                    error!(consumer_id, error_count = failing.error_count, "consumer marked unhealthy after repeated failures");
                }
                self.states.put(failing).await;

                self.log
                    .put(EventProcessingRecord {
                        event_id: event.event_id.clone(),
                        event_type: event.event_type.clone(),
                        event_version: event.version,
                        consumer_id: consumer_id.to_string(),
                        consumer_version: handler.consumer_version().to_string(),
                        input_commit: input_commit.clone(),
                        output_commit: input_commit.clone(),
                        processed_at: chrono::Utc::now(),
                        duration_ms: started.elapsed().as_millis() as u64,
                        status: ProcessingStatus::Failed,
                        error: Some(reason.clone()),
                        retry_count: 0,
                        side_effects: Vec::new(),
                        created_resources: Vec::new(),
                        updated_resources: Vec::new(),
                        idempotency_key: event.event_id.clone(),
                        is_duplicate: false,
                    })
                    .await;

                Err(ConsumerError::HandlerFailed {
                    consumer_id: consumer_id.to_string(),
                    event_id: event.event_id.clone(),
                    reason,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::HandlerOutcome;
    use crate::record::InMemoryProcessingLog;
    use crate::state::InMemoryConsumerStateStore;
    use async_trait::async_trait;
    use oms_outbox::InMemoryOutboxStore;
    use serde_json::{json, Value};

    struct CountingHandler;

    #[async_trait]
    impl EventHandler for CountingHandler {
        fn consumer_id(&self) -> &str {
            "schema_consumer"
        }
        fn consumer_version(&self) -> &str {
            "1.0.0"
        }
        async fn handle(&self, state: &Value, event: &EventEnvelope) -> std::result::Result<HandlerOutcome, String> {
            let mut seen: Vec<String> = state.get("seen").and_then(|v| v.as_array()).map(|a| a.iter().filter_map(|x| x.as_str().map(str::to_string)).collect()).unwrap_or_default();
            seen.push(event.event_id.clone());
            Ok(HandlerOutcome {
                new_state: json!({"seen": seen}),
                side_effects: Vec::new(),
                created_resources: vec![event.payload.get("name").and_then(|v| v.as_str()).unwrap_or("?").to_string()],
                updated_resources: Vec::new(),
            })
        }
    }

    fn consumer() -> IdempotentConsumer<InMemoryConsumerStateStore, InMemoryProcessingLog> {
        IdempotentConsumer::new(Arc::new(InMemoryConsumerStateStore::new()), Arc::new(InMemoryProcessingLog::new()), Arc::new(InMemoryOutboxStore::new()))
    }

    /// §8 S6 — replay of already-processed events is a no-op duplicate,
    /// final `state_commit` unchanged.
    #[tokio::test]
    async fn s6_reprocessing_same_event_is_a_duplicate() {
        let consumer = consumer();
        let handler = CountingHandler;
        let evt1 = EventEnvelope::new("object_type.created", "oms", "1.0.0", "corr-1", json!({"name": "Employee"}));
        let evt2 = EventEnvelope::new("object_type.created", "oms", "1.0.0", "corr-1", json!({"name": "Department"}));

        let r1 = consumer.process(&handler, &evt1).await.unwrap();
        let r2 = consumer.process(&handler, &evt2).await.unwrap();
        assert!(r1.processed && !r1.was_duplicate);
        assert!(r2.processed && !r2.was_duplicate);
        let h1 = r2.new_commit.clone();

        let d1 = consumer.process(&handler, &evt1).await.unwrap();
        let d2 = consumer.process(&handler, &evt2).await.unwrap();
        assert!(d1.was_duplicate && !d1.processed);
        assert!(d2.was_duplicate && !d2.processed);
        assert_eq!(d2.new_commit, h1);
    }

    struct AlwaysFailsHandler;

    #[async_trait]
    impl EventHandler for AlwaysFailsHandler {
        fn consumer_id(&self) -> &str {
            "flaky_consumer"
        }
        fn consumer_version(&self) -> &str {
            "1.0.0"
        }
        async fn handle(&self, _state: &Value, _event: &EventEnvelope) -> std::result::Result<HandlerOutcome, String> {
            Err("handler exploded".to_string())
        }
    }

    #[tokio::test]
    async fn consumer_goes_unhealthy_after_repeated_failures_and_dead_letters() {
        let consumer = consumer();
        let handler = AlwaysFailsHandler;
        for _ in 0..MAX_CONSECUTIVE_FAILURES {
            let event = EventEnvelope::new("whatever", "oms", "1.0.0", "corr", json!({}));
            let err = consumer.process(&handler, &event).await.unwrap_err();
            assert!(matches!(err, ConsumerError::HandlerFailed { .. }));
        }

        let next_event = EventEnvelope::new("whatever", "oms", "1.0.0", "corr", json!({}));
        let err = consumer.process(&handler, &next_event).await.unwrap_err();
        assert!(matches!(err, ConsumerError::DeadLettered(_, _)));
    }
}
