//! Recorder error types.

use thiserror::Error;

/// Errors a recorder can produce. `BackoffExceeded` tells the engine the
/// sink is gone and the whole pipeline should shut down.
#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("name cannot be empty")]
    EmptyName,

    #[error("endpoint cannot be empty")]
    EmptyEndpoint,

    #[error("index_name cannot be empty")]
    EmptyIndexName,

    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("back off should be at least 5: {0}")]
    LowBackoff(u32),

    #[error("timeout cannot be zero")]
    ZeroTimeout,

    #[error("endpoint {endpoint} not available")]
    EndpointUnavailable {
        endpoint: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The surrounding scope was cancelled mid-record. Not a strike.
    #[error("record was cancelled")]
    Cancelled,

    #[error("backoff exceeded")]
    BackoffExceeded,
}

impl RecorderError {
    pub fn unavailable(
        endpoint: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        RecorderError::EndpointUnavailable {
            endpoint: endpoint.into(),
            source: source.into(),
        }
    }
}
