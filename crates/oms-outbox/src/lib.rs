//! Outbox publisher (C8): writes domain events in the same write
//! batch as a business commit, then ships them to the event bus via a
//! backoff relay with at-least-once delivery.

pub mod bus;
pub mod envelope;
pub mod error;
pub mod record;
pub mod relay;

pub use bus::{EventBus, InMemoryEventBus};
pub use envelope::EventEnvelope;
pub use error::{OutboxError, Result};
pub use record::{InMemoryOutboxStore, OutboxRecord, OutboxStatus, OutboxStore};
pub use relay::{relay_once, spawn, MAX_RETRIES};
