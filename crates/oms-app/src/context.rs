//! The composition root: one `Context` wiring every component C1-C10
//! together, the same way a single app-state struct wires a concrete
//! database and auth service one layer up in a typical service binary.
//! Here the ledger and persisted-state backend are left generic,
//! because both are swappable external collaborators rather than one
//! fixed store.
//!
//! `Context` is generic over the storage port each component needs so
//! the same wiring code serves both the in-memory reference stack
//! (tests, `OMS_DEV_MODE`) and a real Postgres-backed deployment
//! (`oms-db`'s repos implement every one of these traits) without
//! duplicating the assembly logic. [`Context::in_memory`] is the
//! concrete, fully-resolved convenience constructor most callers want;
//! `services/oms-server` uses [`Context::new`] directly against
//! `oms-db` repo types for a real deployment.

use std::sync::Arc;
use std::time::Duration;

use oms_auth::JwtValidator;
use oms_consumer::{
    CheckpointStore, ConsumerStateStore, IdempotentConsumer, InMemoryCheckpointStore,
    InMemoryConsumerStateStore, InMemoryProcessingLog, ProcessingLog,
};
use oms_ledger::{CommitLedger, InMemoryCommitLedger};
use oms_locks::{
    BranchStateStore, InMemoryBranchStateStore, InMemoryLockStore, LockManager, LockStore,
};
use oms_merge::MergeEngine;
use oms_occ::{AdvisoryLocks, InMemoryVersionStore, OccEngine, VersionStore};
use oms_outbox::{EventBus, InMemoryEventBus, InMemoryOutboxStore, OutboxStore};
use oms_policy::{InMemoryOverrideStore, IssueTracker, OverrideStore, PolicyGate, RouteTable, StaticIssueTracker};
use oms_audit::AuditEmitter;

use crate::config::AppConfig;

/// Everything C1-C10 need, wired once at process start and handed
/// around as `Arc<Context<...>>` from there, the same way a shared
/// `Arc<AppState>` is passed into a typical service's handlers.
pub struct Context<L, S, Lk, V, Cs, Pl, Ck>
where
    L: CommitLedger,
    S: BranchStateStore,
    Lk: LockStore,
    V: VersionStore,
    Cs: ConsumerStateStore,
    Pl: ProcessingLog,
    Ck: CheckpointStore,
{
    pub config: AppConfig,

    pub ledger: Arc<L>,
    pub branch_states: Arc<S>,
    pub lock_store: Arc<Lk>,
    pub locks: Arc<LockManager<S, Lk>>,

    pub versions: Arc<V>,
    pub occ: Arc<OccEngine<L, V>>,
    pub advisory: Arc<AdvisoryLocks>,

    pub merge: Arc<MergeEngine>,

    pub auth: Arc<JwtValidator>,
    pub policy: Arc<PolicyGate>,
    pub overrides: Arc<dyn OverrideStore>,

    pub outbox: Arc<dyn OutboxStore>,
    pub bus: Arc<dyn EventBus>,
    pub audit: Arc<AuditEmitter>,

    pub consumer_states: Arc<Cs>,
    pub processing_log: Arc<Pl>,
    pub checkpoints: Arc<Ck>,
    pub consumer: Arc<IdempotentConsumer<Cs, Pl>>,
}

impl<L, S, Lk, V, Cs, Pl, Ck> Context<L, S, Lk, V, Cs, Pl, Ck>
where
    L: CommitLedger,
    S: BranchStateStore,
    Lk: LockStore,
    V: VersionStore,
    Cs: ConsumerStateStore,
    Pl: ProcessingLog,
    Ck: CheckpointStore,
{
    /// Assembles a `Context` from already-constructed storage ports.
    /// Production wiring (a real `oms-db::Database`'s repos) and test
    /// wiring (in-memory reference stores) both go through this one
    /// path — only the concrete types passed in differ.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: AppConfig,
        ledger: Arc<L>,
        branch_states: Arc<S>,
        lock_store: Arc<Lk>,
        versions: Arc<V>,
        consumer_states: Arc<Cs>,
        processing_log: Arc<Pl>,
        checkpoints: Arc<Ck>,
        outbox: Arc<dyn OutboxStore>,
        bus: Arc<dyn EventBus>,
        issues: Arc<dyn IssueTracker>,
        overrides: Arc<dyn OverrideStore>,
    ) -> Result<Self, &'static str> {
        let auth = Arc::new(JwtValidator::new(config.jwt.clone())?);
        let locks = Arc::new(LockManager::new(
            branch_states.clone(),
            lock_store.clone(),
            config.heartbeat_grace_multiplier,
        ));
        let occ = Arc::new(OccEngine::new(ledger.clone(), versions.clone()));
        let merge = Arc::new(MergeEngine::with_default_validators());
        let policy = Arc::new(PolicyGate::new(RouteTable::with_defaults(), issues, overrides.clone()));
        let audit = Arc::new(AuditEmitter::new(outbox.clone()));
        let consumer = Arc::new(IdempotentConsumer::new(
            consumer_states.clone(),
            processing_log.clone(),
            outbox.clone(),
        ));

        Ok(Self {
            config,
            ledger,
            branch_states,
            lock_store,
            locks,
            versions,
            occ,
            advisory: Arc::new(AdvisoryLocks::new()),
            merge,
            auth,
            policy,
            overrides,
            outbox,
            bus,
            audit,
            consumer_states,
            processing_log,
            checkpoints,
            consumer,
        })
    }

    /// Spawns every background worker §5 names: the lock TTL/heartbeat
    /// sweeper (which also drives deadlock-victim release), one outbox
    /// relay shard per `config.outbox_relay_shards`, and the consumer
    /// checkpointer for the given set of known `consumer_id`s. Returns
    /// the join handles so the caller's shutdown path can abort them.
    pub fn spawn_background_workers(self: &Arc<Self>, consumer_ids: Vec<String>) -> Vec<tokio::task::JoinHandle<()>>
    where
        L: 'static,
        S: 'static,
        Lk: 'static,
        V: 'static,
        Cs: 'static,
        Pl: 'static,
        Ck: 'static,
    {
        let mut handles = Vec::new();

        handles.push(oms_locks::sweeper::spawn(
            self.locks.clone(),
            self.lock_store.clone(),
            self.config.lock_sweep_interval(),
            self.config.heartbeat_grace_multiplier,
        ));

        for shard in 0..self.config.outbox_relay_shards.max(1) {
            handles.push(oms_outbox::relay::spawn(
                self.outbox.clone(),
                self.bus.clone(),
                self.config.outbox_relay_interval(),
                self.config.outbox_relay_batch_size,
                shard,
            ));
        }

        if !consumer_ids.is_empty() {
            handles.push(oms_consumer::checkpoint::spawn(
                self.consumer_states.clone(),
                self.checkpoints.clone(),
                consumer_ids,
                self.config.checkpoint_interval(),
                self.config.checkpoint_every_n_events,
            ));
        }

        handles
    }
}

/// Fully in-memory instantiation of [`Context`] — every storage port
/// backed by the reference implementations each crate ships, with no
/// external dependency. This is what `OMS_DEV_MODE` and every test in
/// this crate run against; `services/oms-server` uses [`Context::new`]
/// directly with `oms-db` repo types for a real deployment instead of
/// this alias.
pub type InMemoryContext = Context<
    InMemoryCommitLedger,
    InMemoryBranchStateStore,
    InMemoryLockStore,
    InMemoryVersionStore,
    InMemoryConsumerStateStore,
    InMemoryProcessingLog,
    InMemoryCheckpointStore,
>;

impl InMemoryContext {
    /// Convenience constructor: every port is the crate's in-memory
    /// reference implementation, issue tracking accepts any
    /// `PREFIX-number` reference, and overrides/outbox/bus all live
    /// purely in-process. Intended for `OMS_DEV_MODE`, demos, and this
    /// crate's own integration tests (`tests/end_to_end.rs`).
    pub fn in_memory(config: AppConfig) -> Self {
        Self::new(
            config,
            Arc::new(InMemoryCommitLedger::new()),
            Arc::new(InMemoryBranchStateStore::new()),
            Arc::new(InMemoryLockStore::new()),
            Arc::new(InMemoryVersionStore::new()),
            Arc::new(InMemoryConsumerStateStore::new()),
            Arc::new(InMemoryProcessingLog::new()),
            Arc::new(InMemoryCheckpointStore::new()),
            Arc::new(InMemoryOutboxStore::new()),
            Arc::new(InMemoryEventBus::new()),
            Arc::new(StaticIssueTracker::new()),
            Arc::new(InMemoryOverrideStore::new()),
        )
        .expect("in-memory context wiring with a dev-mode or supplied JWT secret never fails")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dev_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.jwt.secret = Some("test-secret-at-least-32-bytes-long!!".to_string());
        config
    }

    #[tokio::test]
    async fn in_memory_context_wires_every_component() {
        let ctx = InMemoryContext::in_memory(dev_config());
        assert!(matches!(ctx.ledger.health().await, oms_ledger::LedgerHealth::Ok));
    }

    #[tokio::test]
    async fn background_workers_spawn_and_can_be_aborted() {
        let ctx = Arc::new(InMemoryContext::in_memory(dev_config()));
        let handles = ctx.spawn_background_workers(vec!["schema_consumer".to_string()]);
        assert!(!handles.is_empty());
        for handle in handles {
            handle.abort();
        }
    }
}
