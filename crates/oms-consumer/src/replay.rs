//! §4.9 `replay(consumer_id, from?, to?, skip_side_effects?, dry_run?)`.
//!
//! Takes an explicit ordered event slice rather than reaching into a
//! real bus (out of scope per §1) — callers hand in whatever the bus
//! integration or the processing log's own envelope archive produced.

use crate::error::Result;
use crate::handler::EventHandler;
use crate::record::{EventProcessingRecord, ProcessingLog, ProcessingStatus};
use crate::state::{ConsumerState, ConsumerStateStore};
use chrono::{DateTime, Utc};
use oms_core::canonical::commit_hash;
use oms_outbox::{EventEnvelope, OutboxStore};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct ReplayOptions {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub skip_side_effects: bool,
    pub dry_run: bool,
    /// §9 Open Question, decided: bypasses the `(consumer_id,
    /// event_id)` dedup short-circuit but still writes a fresh
    /// processing record (unless `dry_run`).
    pub force_reprocess: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ReplayReport {
    pub events_considered: usize,
    pub events_processed: usize,
    pub events_skipped: usize,
    pub events_errored: usize,
    pub final_state_commit: Option<String>,
    pub dry_run: bool,
}

#[allow(clippy::too_many_arguments)]
pub async fn replay<S: ConsumerStateStore, L: ProcessingLog>(
    states: &Arc<S>,
    log: &Arc<L>,
    outbox: &Arc<dyn OutboxStore>,
    handler: &dyn EventHandler,
    events: &[EventEnvelope],
    options: &ReplayOptions,
) -> Result<ReplayReport> {
    let consumer_id = handler.consumer_id();
    let mut state = states.get(consumer_id).await.unwrap_or_else(|| ConsumerState::fresh(consumer_id, handler.consumer_version()));
    let mut report = ReplayReport {
        dry_run: options.dry_run,
        ..Default::default()
    };

    let mut ordered: Vec<&EventEnvelope> = events
        .iter()
        .filter(|e| options.from.map(|f| e.created_at >= f).unwrap_or(true))
        .filter(|e| options.to.map(|t| e.created_at <= t).unwrap_or(true))
        .collect();
    ordered.sort_by_key(|e| e.created_at);

    for event in ordered {
        report.events_considered += 1;

        let already = log.get(consumer_id, &event.event_id).await;
        if !options.force_reprocess {
            if let Some(existing) = &already {
                if existing.status == ProcessingStatus::Success {
                    report.events_skipped += 1;
                    continue;
                }
            }
        }

        let input_commit = state.state_commit.clone();
        match handler.handle(&state.state_data, event).await {
            Ok(outcome) => {
                let output_commit = commit_hash(&outcome.new_state).map_err(|e| crate::error::ConsumerError::HashFailure(e.to_string()))?;

                if !options.dry_run {
                    if !options.skip_side_effects {
                        for effect in &outcome.side_effects {
                            outbox
                                .enqueue(&effect.aggregate_id, &effect.stream, effect.envelope.clone())
                                .await
                                .map_err(|e| crate::error::ConsumerError::StoreUnavailable(e.to_string()))?;
                        }
                    }

                    state.state_data = outcome.new_state;
                    state.state_commit = output_commit.clone();
                    state.state_version += 1;
                    state.last_event_id = Some(event.event_id.clone());
                    state.last_ts = Some(event.created_at);
                    state.events_processed += 1;
                    states.put(state.clone()).await;

                    log.put(EventProcessingRecord {
                        event_id: event.event_id.clone(),
                        event_type: event.event_type.clone(),
                        event_version: event.version,
                        consumer_id: consumer_id.to_string(),
                        consumer_version: handler.consumer_version().to_string(),
                        input_commit,
                        output_commit: output_commit.clone(),
                        processed_at: Utc::now(),
                        duration_ms: 0,
                        status: ProcessingStatus::Success,
                        error: None,
                        retry_count: already.map(|r| r.retry_count + 1).unwrap_or(0),
                        side_effects: Vec::new(),
                        created_resources: outcome.created_resources,
                        updated_resources: outcome.updated_resources,
                        idempotency_key: event.event_id.clone(),
                        is_duplicate: false,
                    })
                    .await;
                } else {
                    // dry_run: simulate the transition in-loop so later
                    // events in this replay see a consistent chain, but
                    // never touch the real store/log/outbox.
                    state.state_data = outcome.new_state;
                    state.state_commit = output_commit.clone();
                }

                report.events_processed += 1;
                report.final_state_commit = Some(output_commit);
            }
            Err(_) => {
                report.events_errored += 1;
            }
        }
    }

    info!(consumer_id, considered = report.events_considered, processed = report.events_processed, skipped = report.events_skipped, dry_run = options.dry_run, "replay complete");
    Ok(report)
}
