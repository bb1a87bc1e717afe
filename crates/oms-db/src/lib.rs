//! PostgreSQL-backed persistence for the persisted-state tables this
//! workspace defines.
//!
//! `Database` holds a connection pool behind a `connect`/`migrate`/
//! `health_check` trio and one constructor method per repository. No
//! Redis cache layer here — nothing in this spine is a read-heavy
//! cache candidate the way session/rate-limit lookups are (see
//! DESIGN.md). Every repo is a thin enum over `Postgres(PgPool)` and,
//! under the `mock` feature, an in-memory stand-in, so the crates above
//! (`oms-locks`, `oms-occ`, `oms-outbox`, `oms-consumer`, `oms-policy`)
//! can run against either without caring which.

pub mod config;
pub mod error;
pub mod repos;

pub use config::DatabaseConfig;
pub use error::{DbError, DbResult};
pub use repos::*;

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

pub struct Database {
    pub pg: PgPool,
}

impl Database {
    pub async fn connect(config: &DatabaseConfig) -> DbResult<Self> {
        info!(url = %config.postgres_url_masked(), "connecting to PostgreSQL");

        let pg = PgPoolOptions::new()
            .max_connections(config.pg_max_connections)
            .min_connections(config.pg_min_connections)
            .acquire_timeout(std::time::Duration::from_secs(config.pg_acquire_timeout_secs))
            .connect(&config.postgres_url)
            .await
            .map_err(|e| DbError::Connection(format!("PostgreSQL: {e}")))?;

        info!("connected to PostgreSQL");
        Ok(Self { pg })
    }

    pub async fn migrate(&self) -> DbResult<()> {
        info!("running database migrations");
        sqlx::migrate!("./migrations").run(&self.pg).await.map_err(|e| DbError::Migration(e.to_string()))?;
        info!("migrations complete");
        Ok(())
    }

    pub async fn health_check(&self) -> DbResult<bool> {
        let ok = sqlx::query("SELECT 1").fetch_one(&self.pg).await.is_ok();
        Ok(ok)
    }

    pub fn branch_state_repo(&self) -> branch_state::BranchStateRepo {
        branch_state::BranchStateRepo::new(self.pg.clone())
    }

    pub fn lock_repo(&self) -> lock::LockRepo {
        lock::LockRepo::new(self.pg.clone())
    }

    pub fn version_repo(&self) -> version::VersionRepo {
        version::VersionRepo::new(self.pg.clone())
    }

    pub fn outbox_repo(&self) -> outbox::OutboxRepo {
        outbox::OutboxRepo::new(self.pg.clone())
    }

    pub fn consumer_state_repo(&self) -> consumer::ConsumerStateRepo {
        consumer::ConsumerStateRepo::new(self.pg.clone())
    }

    pub fn processing_log_repo(&self) -> consumer::ProcessingLogRepo {
        consumer::ProcessingLogRepo::new(self.pg.clone())
    }

    pub fn checkpoint_repo(&self) -> consumer::CheckpointRepo {
        consumer::CheckpointRepo::new(self.pg.clone())
    }

    pub fn override_repo(&self) -> override_request::OverrideRepo {
        override_request::OverrideRepo::new(self.pg.clone())
    }
}

/// In-process stand-in for [`Database`] backed entirely by the
/// in-memory reference stores, letting repo consumers be exercised in
/// tests without a live Postgres.
#[cfg(feature = "mock")]
pub struct MockDatabase {
    pub branch_state: std::sync::Arc<branch_state::BranchStateRepo>,
    pub lock: std::sync::Arc<lock::LockRepo>,
    pub version: std::sync::Arc<version::VersionRepo>,
    pub outbox: std::sync::Arc<outbox::OutboxRepo>,
    pub consumer_state: std::sync::Arc<consumer::ConsumerStateRepo>,
    pub processing_log: std::sync::Arc<consumer::ProcessingLogRepo>,
    pub checkpoint: std::sync::Arc<consumer::CheckpointRepo>,
    pub override_store: std::sync::Arc<override_request::OverrideRepo>,
}

#[cfg(feature = "mock")]
impl MockDatabase {
    pub fn new() -> Self {
        Self {
            branch_state: std::sync::Arc::new(branch_state::BranchStateRepo::new_mock()),
            lock: std::sync::Arc::new(lock::LockRepo::new_mock()),
            version: std::sync::Arc::new(version::VersionRepo::new_mock()),
            outbox: std::sync::Arc::new(outbox::OutboxRepo::new_mock()),
            consumer_state: std::sync::Arc::new(consumer::ConsumerStateRepo::new_mock()),
            processing_log: std::sync::Arc::new(consumer::ProcessingLogRepo::new_mock()),
            checkpoint: std::sync::Arc::new(consumer::CheckpointRepo::new_mock()),
            override_store: std::sync::Arc::new(override_request::OverrideRepo::new_mock()),
        }
    }
}

#[cfg(feature = "mock")]
impl Default for MockDatabase {
    fn default() -> Self {
        Self::new()
    }
}
