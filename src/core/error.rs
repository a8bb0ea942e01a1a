//! Error types for scheduler operations.

use thiserror::Error;

/// Failures reported by a [`MailTransport`](crate::core::MailTransport).
///
/// These never reach the caller of `schedule`; the dispatch loop logs them and
/// drops the record.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Template could not be rendered or its resources assembled.
    #[error("template error: {0}")]
    Template(String),
    /// The message could not be handed to the mail server.
    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// Errors produced by scheduler components.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Requested priority is not a valid level (levels start at 1).
    #[error("invalid priority: {0} (levels start at 1)")]
    InvalidPriority(u32),
    /// The message cannot be scheduled as given.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
    /// The scheduler is closing or closed.
    #[error("scheduler is shutting down")]
    ShuttingDown,
    /// Configuration rejected at construction time.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Durable store failure with context.
    #[error("backend error: {0}")]
    Backend(String),
    /// A record could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// File backend I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Transport failure surfaced from dispatch.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
