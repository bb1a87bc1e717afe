use serde::{Deserialize, Serialize};

/// How the caller's identity was established. `Dev` is only ever
/// produced when the process was started with `OMS_DEV_MODE=1` and no
/// `JWT_SECRET` — it's a visible marker, not a silent fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    Jwt,
    Dev,
}

/// The verified identity of the caller, populated once by JWT
/// validation and threaded unchanged through the policy gate (§4.7),
/// OCC engine (§4.5), and author attribution (§4.2). No downstream
/// component re-verifies the token this was built from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserContext {
    pub user_id: String,
    pub username: String,
    pub email: Option<String>,
    pub roles: Vec<String>,
    pub tenant: Option<String>,
    pub scopes: Vec<String>,
    pub auth_method: AuthMethod,
    pub session: Option<String>,
    pub ip: Option<String>,
    pub ua: Option<String>,
    pub is_service_account: bool,
}

impl UserContext {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// `true` when this context was minted by the development escape
    /// hatch rather than a real verified JWT (§4.2: "a `roles=dev`
    /// claim is added to make this detectable downstream").
    pub fn is_dev_mode(&self) -> bool {
        matches!(self.auth_method, AuthMethod::Dev)
    }
}
