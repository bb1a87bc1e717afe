use thiserror::Error;

pub type Result<T> = std::result::Result<T, OutboxError>;

#[derive(Debug, Error, Clone)]
pub enum OutboxError {
    #[error("outbox record {0} not found")]
    NotFound(String),

    #[error("outbox store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("bus publish failed: {0}")]
    PublishFailed(String),
}
