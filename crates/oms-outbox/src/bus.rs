//! Event bus port. §1 non-goal: the real bus (Kafka/NATS/etc.) is an
//! external collaborator; only its interface is defined here. §4.8:
//! "exactly-once publish is achieved via the bus's own dedup on
//! `event_id`" — the in-memory reference implements that dedup so
//! tests can exercise the guarantee without a real broker.

use crate::envelope::EventEnvelope;
use crate::error::Result;
use async_trait::async_trait;
use dashmap::DashSet;

#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish `envelope` to `stream`. Implementations MUST dedup on
    /// `envelope.event_id`; a duplicate publish is a no-op success,
    /// not an error.
    async fn publish(&self, stream: &str, envelope: &EventEnvelope) -> Result<()>;
}

#[derive(Default)]
pub struct InMemoryEventBus {
    seen: DashSet<String>,
    published: dashmap::DashMap<String, Vec<EventEnvelope>>,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published_on(&self, stream: &str) -> Vec<EventEnvelope> {
        self.published.get(stream).map(|v| v.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, stream: &str, envelope: &EventEnvelope) -> Result<()> {
        if !self.seen.insert(envelope.event_id.clone()) {
            return Ok(());
        }
        self.published.entry(stream.to_string()).or_default().push(envelope.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn duplicate_event_id_is_published_once() {
        let bus = InMemoryEventBus::new();
        let envelope = EventEnvelope::new("object_type.created", "oms", "1.0.0", "corr-1", json!({}));
        bus.publish("oms.object_type.created.main", &envelope).await.unwrap();
        bus.publish("oms.object_type.created.main", &envelope).await.unwrap();
        assert_eq!(bus.published_on("oms.object_type.created.main").len(), 1);
    }
}
