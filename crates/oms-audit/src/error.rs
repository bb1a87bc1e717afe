use thiserror::Error;

pub type Result<T> = std::result::Result<T, AuditError>;

#[derive(Debug, Error, Clone)]
pub enum AuditError {
    /// §4.10: "if even the outbox write fails, the business write MUST
    /// be aborted" — callers treat this variant as fatal to the whole
    /// operation, not just to audit delivery.
    #[error("audit outbox write failed, business write must be aborted: {0}")]
    OutboxWriteFailed(String),

    #[error("failed to hash audit event: {0}")]
    HashFailure(String),
}
