//! Idempotent Consumer (C9) — §4.9: dedup on `(consumer_id, event_id)`,
//! commit-hash-chained [`ConsumerState`], replay with dry-run and
//! side-effect suppression, checkpointing for cold-start warm-up.

pub mod checkpoint;
pub mod error;
pub mod handler;
pub mod processor;
pub mod record;
pub mod replay;
pub mod state;

pub use checkpoint::{CheckpointStore, ConsumerCheckpoint, InMemoryCheckpointStore};
pub use error::{ConsumerError, Result};
pub use handler::EventHandler;
pub use processor::{IdempotentConsumer, IdempotentResult};
pub use record::{EventProcessingRecord, InMemoryProcessingLog, ProcessingLog, ProcessingStatus};
pub use replay::{replay, ReplayOptions, ReplayReport};
pub use state::{ConsumerState, InMemoryConsumerStateStore, ConsumerStateStore};
