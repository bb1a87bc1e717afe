use crate::config::JwtConfig;
use crate::context::{AuthMethod, UserContext};
use crate::error::{AuthError, AuthResult};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

/// Wire shape of the JWT this service accepts. The issuing identity
/// provider is out of scope (§0/§9 Non-goals) — this is strictly the
/// claim set OMS expects to already have been verified once and needs
/// to turn into a [`UserContext`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TokenClaims {
    sub: String,
    username: String,
    email: Option<String>,
    #[serde(default)]
    roles: Vec<String>,
    tenant: Option<String>,
    #[serde(default)]
    scopes: Vec<String>,
    sid: Option<String>,
    #[serde(default)]
    is_service_account: bool,
    iss: String,
    aud: String,
    exp: i64,
    iat: i64,
}

/// Validates bearer tokens and produces [`UserContext`]s. Holds no
/// mutable state: there is no token issuance or revocation list here,
/// OMS only ever consumes tokens minted by an external identity
/// provider.
#[derive(Clone)]
pub struct JwtValidator {
    config: JwtConfig,
    decoding_key: Option<DecodingKey>,
}

impl JwtValidator {
    pub fn new(config: JwtConfig) -> Result<Self, &'static str> {
        config.validate()?;
        let decoding_key = config
            .secret
            .as_ref()
            .map(|s| DecodingKey::from_secret(s.as_bytes()));
        Ok(Self {
            config,
            decoding_key,
        })
    }

    /// Validate `token` and return the [`UserContext`] it encodes.
    /// `ip`/`ua` are attached from the transport layer since they
    /// aren't part of the JWT itself.
    pub fn validate(
        &self,
        token: &str,
        ip: Option<String>,
        ua: Option<String>,
    ) -> AuthResult<UserContext> {
        let decoding_key = self.decoding_key.as_ref().ok_or(AuthError::MissingSecret)?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.config.issuer]);
        validation.set_audience(&[&self.config.audience]);
        validation.validate_exp = true;

        let data = decode::<TokenClaims>(token, decoding_key, &validation)?;
        let claims = data.claims;

        Ok(UserContext {
            user_id: claims.sub,
            username: claims.username,
            email: claims.email,
            roles: claims.roles,
            tenant: claims.tenant,
            scopes: claims.scopes,
            auth_method: AuthMethod::Jwt,
            session: claims.sid,
            ip,
            ua,
            is_service_account: claims.is_service_account,
        })
    }

    /// The §4.2/§6 development escape hatch: mints a [`UserContext`]
    /// without validating anything, for use only when
    /// `OMS_DEV_MODE=1` and no `JWT_SECRET` is configured. Always
    /// stamps `roles=dev` so it's detectable downstream (e.g. the
    /// policy gate can choose to refuse `dev`-tagged callers on
    /// mutating routes in non-dev deployments).
    pub fn dev_mode_user(&self, username: &str, user_id: &str) -> AuthResult<UserContext> {
        if !self.config.dev_mode {
            return Err(AuthError::MissingSecret);
        }
        Ok(UserContext {
            user_id: user_id.to_string(),
            username: username.to_string(),
            email: None,
            roles: vec!["dev".to_string()],
            tenant: None,
            scopes: vec![],
            auth_method: AuthMethod::Dev,
            session: None,
            ip: None,
            ua: None,
            is_service_account: false,
        })
    }
}
