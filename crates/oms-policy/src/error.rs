use thiserror::Error;

pub type Result<T> = std::result::Result<T, PolicyError>;

/// §7 policy failure taxonomy. `code()` is the stable string surfaced
/// to callers in `Decision::reason` — never the `Display` text, which
/// may grow detail over time.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("no route registered for {method} {path}")]
    RouteNotRegistered { method: String, path: String },

    #[error("request carries no verified identity")]
    Unauthenticated,

    #[error("role(s) {roles:?} may not {action} on {resource}")]
    Forbidden { roles: Vec<String>, resource: String, action: String },

    #[error("issue tracking requirement not met")]
    IssueRequired,

    #[error("issue id '{0}' is not a recognized, valid issue reference")]
    InvalidIssue(String),

    #[error("emergency override justification must be at least 50 characters")]
    JustificationTooShort,

    #[error("emergency override is not approved")]
    OverrideNotApproved,

    #[error("emergency override has expired")]
    OverrideExpired,

    #[error("emergency override token does not match")]
    OverrideTokenMismatch,

    #[error("override request {0} not found")]
    OverrideNotFound(String),

    #[error("role(s) {0:?} may not approve override requests")]
    OverrideApprovalForbidden(Vec<String>),
}

impl PolicyError {
    /// Stable machine-readable code, independent of the human message.
    pub fn code(&self) -> &'static str {
        match self {
            PolicyError::RouteNotRegistered { .. } => "route_not_registered",
            PolicyError::Unauthenticated => "unauthenticated",
            PolicyError::Forbidden { .. } => "forbidden",
            PolicyError::IssueRequired => "issue_tracking_requirement_not_met",
            PolicyError::InvalidIssue(_) => "invalid_issue",
            PolicyError::JustificationTooShort => "override_justification_required",
            PolicyError::OverrideNotApproved => "override_not_approved",
            PolicyError::OverrideExpired => "override_expired",
            PolicyError::OverrideTokenMismatch => "override_token_mismatch",
            PolicyError::OverrideNotFound(_) => "override_not_found",
            PolicyError::OverrideApprovalForbidden(_) => "override_approval_forbidden",
        }
    }

    /// Suggested HTTP status for transports that want one; the gate
    /// itself is transport-agnostic.
    pub fn http_status(&self) -> u16 {
        match self {
            PolicyError::RouteNotRegistered { .. } => 403,
            PolicyError::Unauthenticated => 401,
            PolicyError::Forbidden { .. } => 403,
            PolicyError::IssueRequired => 422,
            PolicyError::InvalidIssue(_) => 422,
            PolicyError::JustificationTooShort => 422,
            PolicyError::OverrideNotApproved => 403,
            PolicyError::OverrideExpired => 403,
            PolicyError::OverrideTokenMismatch => 403,
            PolicyError::OverrideNotFound(_) => 403,
            PolicyError::OverrideApprovalForbidden(_) => 403,
        }
    }
}

impl From<PolicyError> for oms_types::OmsError {
    fn from(e: PolicyError) -> Self {
        let code = e.code().to_string();
        match e {
            PolicyError::RouteNotRegistered { .. } | PolicyError::Unauthenticated | PolicyError::Forbidden { .. } | PolicyError::OverrideApprovalForbidden(_) => {
                oms_types::OmsError::PolicyDenied(code)
            }
            PolicyError::IssueRequired | PolicyError::InvalidIssue(_) => oms_types::OmsError::PolicyDenied(code),
            PolicyError::JustificationTooShort | PolicyError::OverrideNotApproved | PolicyError::OverrideExpired | PolicyError::OverrideTokenMismatch => {
                oms_types::OmsError::PolicyDenied(code)
            }
            PolicyError::OverrideNotFound(id) => oms_types::OmsError::NotFound(format!("override request {id}")),
        }
    }
}
