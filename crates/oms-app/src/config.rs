//! Process-wide configuration: plain structs, `Default` impls with
//! sane defaults, loaded from environment by the binary at startup.
//! Aggregates every crate's own `*Config` into one composition-root
//! struct.

use oms_auth::JwtConfig;
use std::time::Duration;

/// Why [`AppConfig::from_env`] refused to start. The binary
/// (`services/oms-server`) maps these onto the exit codes §6 defines:
/// `Fatal` -> 2 (malformed config), `MissingSecret` -> 3.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("fatal configuration error: {0}")]
    Fatal(String),
    #[error("JWT_SECRET is required outside OMS_DEV_MODE")]
    MissingSecret,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub jwt: JwtConfig,
    /// `OUTBOX_RELAY_SHARDS` — number of independent relay loops, each
    /// claiming a disjoint partition of outbox rows (§4.8).
    pub outbox_relay_shards: usize,
    /// `LOCK_SWEEP_INTERVAL_S` — TTL/heartbeat sweep tick (§4.4, default 10s).
    pub lock_sweep_interval_s: u64,
    /// `HEARTBEAT_GRACE_MULTIPLIER` — default 3, per §6.
    pub heartbeat_grace_multiplier: i64,
    /// `OVERRIDE_TTL_S` — default 3600, per §6.
    pub override_ttl_s: i64,
    /// Outbox relay batch size and tick interval; not named in §6 but
    /// needed to actually schedule the relay loop.
    pub outbox_relay_interval_s: u64,
    pub outbox_relay_batch_size: usize,
    /// How often (and after how many events) the consumer checkpointer
    /// snapshots state (§4.9 "every N events or T seconds").
    pub checkpoint_interval_s: u64,
    pub checkpoint_every_n_events: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            jwt: JwtConfig {
                secret: std::env::var("JWT_SECRET").ok(),
                issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "oms".to_string()),
                audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "oms-api".to_string()),
                dev_mode: std::env::var("OMS_DEV_MODE").map(|v| v == "1").unwrap_or(false),
            },
            outbox_relay_shards: 1,
            lock_sweep_interval_s: 10,
            heartbeat_grace_multiplier: 3,
            override_ttl_s: 3600,
            outbox_relay_interval_s: 2,
            outbox_relay_batch_size: 100,
            checkpoint_interval_s: 30,
            checkpoint_every_n_events: 100,
        }
    }
}

impl AppConfig {
    /// Loads from environment, falling back to defaults for anything
    /// unset. Non-numeric env values are `ConfigError::Fatal` (exit 2);
    /// a missing `JWT_SECRET` outside `OMS_DEV_MODE=1` is
    /// `ConfigError::MissingSecret` (exit 3).
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(raw) = std::env::var("OUTBOX_RELAY_SHARDS") {
            config.outbox_relay_shards = raw.parse().map_err(|_| ConfigError::Fatal(format!("OUTBOX_RELAY_SHARDS must be a positive integer, got {raw:?}")))?;
        }
        if let Ok(raw) = std::env::var("LOCK_SWEEP_INTERVAL_S") {
            config.lock_sweep_interval_s = raw.parse().map_err(|_| ConfigError::Fatal(format!("LOCK_SWEEP_INTERVAL_S must be a positive integer, got {raw:?}")))?;
        }
        if let Ok(raw) = std::env::var("HEARTBEAT_GRACE_MULTIPLIER") {
            config.heartbeat_grace_multiplier = raw.parse().map_err(|_| ConfigError::Fatal(format!("HEARTBEAT_GRACE_MULTIPLIER must be an integer, got {raw:?}")))?;
        }
        if let Ok(raw) = std::env::var("OVERRIDE_TTL_S") {
            config.override_ttl_s = raw.parse().map_err(|_| ConfigError::Fatal(format!("OVERRIDE_TTL_S must be a positive integer, got {raw:?}")))?;
        }

        config.jwt.validate().map_err(|_| ConfigError::MissingSecret)?;
        Ok(config)
    }

    pub fn lock_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.lock_sweep_interval_s)
    }

    pub fn outbox_relay_interval(&self) -> Duration {
        Duration::from_secs(self.outbox_relay_interval_s)
    }

    pub fn checkpoint_interval(&self) -> Duration {
        Duration::from_secs(self.checkpoint_interval_s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // One test function, not three: `std::env` is process-global, and
    // `cargo test` runs tests in parallel by default, so interleaved
    // set_var/remove_var across tests is a real race. Serializing the
    // env-dependent assertions here keeps them deterministic.
    #[test]
    fn config_env_loading() {
        std::env::remove_var("OUTBOX_RELAY_SHARDS");
        std::env::remove_var("LOCK_SWEEP_INTERVAL_S");
        std::env::remove_var("HEARTBEAT_GRACE_MULTIPLIER");
        std::env::remove_var("OVERRIDE_TTL_S");
        std::env::remove_var("JWT_SECRET");
        std::env::remove_var("OMS_DEV_MODE");

        let config = AppConfig::default();
        assert_eq!(config.heartbeat_grace_multiplier, 3);
        assert_eq!(config.override_ttl_s, 3600);
        assert_eq!(config.lock_sweep_interval_s, 10);

        let err = AppConfig::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::MissingSecret));

        std::env::set_var("JWT_SECRET", "test-secret");
        std::env::set_var("OUTBOX_RELAY_SHARDS", "not-a-number");
        let err = AppConfig::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Fatal(_)));

        std::env::remove_var("OUTBOX_RELAY_SHARDS");
        let config = AppConfig::from_env().unwrap();
        assert_eq!(config.outbox_relay_shards, 1);

        std::env::remove_var("JWT_SECRET");
    }
}
