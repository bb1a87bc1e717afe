//! oms-server — the composition-root binary.
//!
//! Loads config, wires every component C1-C10 into one [`oms_app::Context`],
//! spawns the background workers a running deployment needs (lock sweeper,
//! outbox relay shards, consumer checkpointer), and runs them to a shutdown
//! signal. No HTTP/GraphQL listener: transport is an explicit non-goal, so
//! this binary assembles state and runs workers the way a typical service's
//! `main.rs` does, minus the `axum::serve` call.

use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use oms_app::{AppConfig, ConfigError, Context};
use oms_db::DatabaseConfig;
use oms_ledger::InMemoryCommitLedger;
use oms_outbox::InMemoryEventBus;
use oms_policy::StaticIssueTracker;

/// OMS concurrency/consistency spine — composition-root process.
#[derive(Parser, Debug)]
#[command(name = "oms-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Run entirely against the in-memory reference stores, skipping the
    /// Postgres connection and relaxing the `JWT_SECRET` requirement.
    #[arg(long, env = "OMS_DEV_MODE")]
    dev_mode: bool,

    /// PostgreSQL connection URL (ignored in `--dev-mode`).
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Run pending migrations against `--database-url` before serving.
    #[arg(long, env = "OMS_RUN_MIGRATIONS")]
    migrate: bool,

    /// Known consumer ids the checkpointer should poll. Repeat the flag
    /// or pass a comma-separated `OMS_CONSUMER_IDS`.
    #[arg(long = "consumer-id", env = "OMS_CONSUMER_IDS", value_delimiter = ',')]
    consumer_ids: Vec<String>,

    /// `trace`, `debug`, `info`, `warn`, or `error`.
    #[arg(long, env = "OMS_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// `pretty` or `json`.
    #[arg(long, env = "OMS_LOG_FORMAT", default_value = "pretty")]
    log_format: String,

    /// Seconds to let in-flight worker iterations finish after a shutdown
    /// signal before the process exits.
    #[arg(long, env = "OMS_SHUTDOWN_GRACE_SECS", default_value = "5")]
    shutdown_grace_secs: u64,
}

fn init_logging(level: &str, format: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = tracing_subscriber::registry().with(env_filter);

    match format {
        "json" => subscriber.with(fmt::layer().json().with_target(true)).init(),
        _ => subscriber.with(fmt::layer().pretty().with_target(true)).init(),
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    init_logging(&args.log_level, &args.log_format);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), dev_mode = args.dev_mode, "starting oms-server");

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(ConfigError::Fatal(msg)) => {
            tracing::error!(error = %msg, "fatal configuration error");
            std::process::exit(2);
        }
        Err(ConfigError::MissingSecret) => {
            tracing::error!("JWT_SECRET is required outside OMS_DEV_MODE=1");
            std::process::exit(3);
        }
    };

    let handles = if args.dev_mode {
        let ctx = Arc::new(oms_app::InMemoryContext::in_memory(config));
        tracing::warn!("running with in-memory stores (OMS_DEV_MODE=1): no durability across restarts");
        ctx.spawn_background_workers(args.consumer_ids.clone())
    } else {
        let mut db_config = DatabaseConfig::from_env();
        if let Some(url) = args.database_url.clone() {
            db_config.postgres_url = url;
        }

        let db = match oms_db::Database::connect(&db_config).await {
            Ok(db) => db,
            Err(err) => {
                tracing::error!(error = %err, "failed to connect to PostgreSQL");
                std::process::exit(1);
            }
        };

        if args.migrate {
            if let Err(err) = db.migrate().await {
                tracing::error!(error = %err, "migration failed");
                std::process::exit(1);
            }
        }

        let ctx = match build_context(config, db) {
            Ok(ctx) => Arc::new(ctx),
            Err(msg) => {
                tracing::error!(error = %msg, "failed to assemble Context");
                std::process::exit(2);
            }
        };
        ctx.spawn_background_workers(args.consumer_ids.clone())
    };

    tracing::info!(workers = handles.len(), consumers = args.consumer_ids.len(), "background workers running");

    shutdown_signal().await;

    tracing::info!(grace_secs = args.shutdown_grace_secs, "shutdown signal received, draining in-flight work");
    tokio::time::sleep(std::time::Duration::from_secs(args.shutdown_grace_secs)).await;

    for handle in handles {
        handle.abort();
    }

    tracing::info!("oms-server shutdown complete");
}

#[allow(clippy::type_complexity)]
fn build_context(
    config: AppConfig,
    db: oms_db::Database,
) -> Result<
    Context<
        InMemoryCommitLedger,
        oms_db::BranchStateRepo,
        oms_db::LockRepo,
        oms_db::VersionRepo,
        oms_db::ConsumerStateRepo,
        oms_db::ProcessingLogRepo,
        oms_db::CheckpointRepo,
    >,
    &'static str,
> {
    Context::new(
        config,
        Arc::new(InMemoryCommitLedger::new()),
        Arc::new(db.branch_state_repo()),
        Arc::new(db.lock_repo()),
        Arc::new(db.version_repo()),
        Arc::new(db.consumer_state_repo()),
        Arc::new(db.processing_log_repo()),
        Arc::new(db.checkpoint_repo()),
        Arc::new(db.outbox_repo()),
        Arc::new(InMemoryEventBus::new()),
        Arc::new(StaticIssueTracker::new()),
        Arc::new(db.override_repo()),
    )
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C"),
        _ = terminate => tracing::info!("received SIGTERM"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_consumer_ids_from_flag_list() {
        let args = Args::parse_from(["oms-server", "--consumer-id", "schema_consumer", "--consumer-id", "index_consumer"]);
        assert_eq!(args.consumer_ids, vec!["schema_consumer", "index_consumer"]);
    }

    #[test]
    fn cli_defaults_to_info_pretty_logging() {
        let args = Args::parse_from(["oms-server"]);
        assert_eq!(args.log_level, "info");
        assert_eq!(args.log_format, "pretty");
        assert!(!args.dev_mode);
    }
}
