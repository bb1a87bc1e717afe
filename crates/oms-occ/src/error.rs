use thiserror::Error;

pub type Result<T> = std::result::Result<T, OccError>;

#[derive(Debug, Error)]
pub enum OccError {
    /// §7 `Conflict(parent, actual)` — the parent commit the caller
    /// read is no longer HEAD.
    #[error("commit conflict on {resource_type}/{resource_id}: expected parent {expected:?}, actual {actual:?}")]
    Conflict {
        resource_type: String,
        resource_id: String,
        expected: Option<String>,
        actual: Option<String>,
    },

    /// The caller's `mutator` rejected the current document (e.g. a
    /// business-rule violation unrelated to concurrency).
    #[error("mutator rejected document: {0}")]
    MutatorFailed(String),

    /// `max_retries` exhausted without resolving a conflict.
    #[error("exceeded {0} retries against {1}/{2}")]
    RetriesExhausted(u32, String, String),

    /// A caller marked their mutator non-idempotent but passed
    /// `max_retries > 0` (§4.5: "if mutator is marked non-idempotent,
    /// callers MUST pass max_retries=0").
    #[error("non-idempotent mutator requires max_retries=0")]
    UnsafeRetryPolicy,

    #[error(transparent)]
    Ledger(#[from] oms_ledger::LedgerError),

    #[error("failed to hash document: {0}")]
    HashFailure(String),
}

impl From<OccError> for oms_types::OmsError {
    fn from(e: OccError) -> Self {
        match e {
            OccError::Conflict { resource_type, resource_id, expected, actual } => oms_types::OmsError::Conflict {
                resource_type,
                resource_id,
                expected: expected.unwrap_or_default(),
                actual: actual.unwrap_or_default(),
            },
            OccError::MutatorFailed(msg) => oms_types::OmsError::InvalidArgument(msg),
            OccError::RetriesExhausted(n, resource_type, resource_id) => oms_types::OmsError::Conflict {
                resource_type,
                resource_id,
                expected: format!("{n} retries"),
                actual: "exhausted".to_string(),
            },
            OccError::UnsafeRetryPolicy => oms_types::OmsError::InvalidArgument("non-idempotent mutator requires max_retries=0".to_string()),
            OccError::Ledger(e) => e.into(),
            OccError::HashFailure(msg) => oms_types::OmsError::IntegrityError(msg),
        }
    }
}
