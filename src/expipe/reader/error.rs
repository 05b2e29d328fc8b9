//! Reader error types.

use thiserror::Error;

/// Errors a reader can produce, both at construction and per read.
///
/// `BackoffExceeded` is the only variant the engine acts on: it evicts the
/// reader from the active set. Everything else is logged and the tick is
/// discarded.
#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("name cannot be empty")]
    EmptyName,

    #[error("endpoint cannot be empty")]
    EmptyEndpoint,

    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("back off should be at least 5: {0}")]
    LowBackoff(u32),

    #[error("interval cannot be zero")]
    ZeroInterval,

    #[error("timeout cannot be zero")]
    ZeroTimeout,

    #[error("ping should be called before the first read")]
    PingNotCalled,

    #[error("endpoint {endpoint} not available")]
    EndpointUnavailable {
        endpoint: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("response body is not valid JSON")]
    InvalidJson,

    /// The job's scope was cancelled mid-read. Not a failure and never a
    /// strike; the engine treats it as a normal termination signal.
    #[error("read was cancelled")]
    Cancelled,

    #[error("backoff exceeded")]
    BackoffExceeded,
}

impl ReaderError {
    pub fn unavailable(
        endpoint: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        ReaderError::EndpointUnavailable {
            endpoint: endpoint.into(),
            source: source.into(),
        }
    }
}
