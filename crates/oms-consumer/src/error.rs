use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConsumerError>;

#[derive(Debug, Error, Clone)]
pub enum ConsumerError {
    #[error("consumer {consumer_id} handler failed on event {event_id}: {reason}")]
    HandlerFailed {
        consumer_id: String,
        event_id: String,
        reason: String,
    },

    #[error("consumer {0} is unhealthy after {1} consecutive failures, event routed to dead-letter")]
    DeadLettered(String, u32),

    #[error("consumer state store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("processing log unavailable: {0}")]
    LogUnavailable(String),

    #[error("failed to hash consumer state: {0}")]
    HashFailure(String),

    #[error("parallel processing of consumer {0} is illegal: lease held by {1}")]
    LeaseConflict(String, String),
}
