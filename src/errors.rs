//! Error types for quorum gathering and remote calls

use thiserror::Error;

/// Errors that can occur while calling peers or gathering their replies
///
/// Errors are plain data so a failed remote call can travel through an
/// [`Eventual`](crate::eventual::Eventual) and be judged by a filter like
/// any successful reply.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuorumError {
    /// The request was rejected as malformed (e.g. a non-numeric station id)
    #[error("Validation error: {0}")]
    Validation(String),

    /// The peer broke the wire protocol
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The peer handled the request and reported an application failure
    #[error("Remote error: {0}")]
    Remote(String),

    /// Could not establish or use a connection
    #[error("Connection error: {0}")]
    Connection(String),

    /// The connection closed before a reply arrived
    #[error("Connection closed before a reply arrived")]
    Disconnected,

    /// NATS connection error
    #[error("NATS connection error: {0}")]
    NatsConnection(String),

    /// NATS request error
    #[error("NATS request error: {0}")]
    NatsRequest(String),

    /// NATS subscribe error
    #[error("NATS subscribe error: {0}")]
    NatsSubscribe(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Timeout error
    #[error("Operation timed out: {0}")]
    Timeout(String),
}

/// Result type for quorum operations
pub type QuorumResult<T> = Result<T, QuorumError>;

impl From<serde_json::Error> for QuorumError {
    fn from(err: serde_json::Error) -> Self {
        QuorumError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for QuorumError {
    fn from(err: std::io::Error) -> Self {
        QuorumError::Connection(err.to_string())
    }
}
