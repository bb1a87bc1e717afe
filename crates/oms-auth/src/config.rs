use serde::{Deserialize, Serialize};

/// JWT validation configuration, loaded once at process startup (see
/// `services/oms-server`) and never touched again.
///
/// `secret` being absent is a fatal startup error *unless* `dev_mode`
/// is set, in which case [`crate::validator::JwtValidator`] mints
/// `[verified]`-tagged contexts without a hash and stamps `roles=dev`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    pub secret: Option<String>,
    pub issuer: String,
    pub audience: String,
    pub dev_mode: bool,
}

impl JwtConfig {
    /// Validates the fatal-startup-error rule from §6: exits the
    /// caller's responsibility to map this to process exit code 3.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.secret.is_none() && !self.dev_mode {
            return Err("JWT_SECRET is required outside OMS_DEV_MODE");
        }
        Ok(())
    }
}
