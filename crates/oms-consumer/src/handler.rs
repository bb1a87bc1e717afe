//! The per-consumer business logic boundary. Handlers are pure
//! state-transition functions: given the consumer's current state and
//! an inbound envelope, they return the next state plus any side
//! effects to *enqueue* (never execute in-handler — §4.9 step 6).

use async_trait::async_trait;
use oms_outbox::EventEnvelope;
use serde_json::Value;

/// A side effect a handler wants carried out, deferred to the outbox
/// (the same mechanism C8 uses for business-commit-derived events).
#[derive(Debug, Clone)]
pub struct SideEffect {
    pub aggregate_id: String,
    pub stream: String,
    pub envelope: EventEnvelope,
}

#[derive(Debug, Clone, Default)]
pub struct HandlerOutcome {
    pub new_state: Value,
    pub side_effects: Vec<SideEffect>,
    pub created_resources: Vec<String>,
    pub updated_resources: Vec<String>,
}

/// Implemented once per consumer (e.g. a schema-projection consumer,
/// an access-control sync consumer). `handle` MUST be a pure function
/// of `(state, event)` — no I/O, no clock reads beyond what the event
/// itself carries — so that replay is exactly reproducible.
#[async_trait]
pub trait EventHandler: Send + Sync {
    fn consumer_id(&self) -> &str;
    fn consumer_version(&self) -> &str;

    async fn handle(&self, state: &Value, event: &EventEnvelope) -> Result<HandlerOutcome, String>;
}
