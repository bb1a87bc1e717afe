//! Composition root: wires every concurrency-spine component (C1-C10)
//! into one [`Context`], the way a single app-state struct wires a
//! database and auth service for the rest of a typical service binary.
//!
//! This crate owns no business logic of its own — every algorithm
//! lives in `oms-locks`/`oms-occ`/`oms-merge`/`oms-policy`/`oms-outbox`/
//! `oms-consumer`/`oms-audit`. What's here is assembly: configuration
//! loading, constructing each component with its dependencies, and
//! spawning the background workers a running process needs (lock
//! sweeper, outbox relay shards, consumer checkpointer).

pub mod config;
pub mod context;

pub use config::{AppConfig, ConfigError};
pub use context::{Context, InMemoryContext};
