//! Sinks that persist typed payloads under an index/type namespace.
//!
//! A recorder receives fully-materialized [`RecordJob`]s from the engine
//! and persists one document per job. Like readers, recorders are
//! polymorphic over the [`DataRecorder`] trait and track consecutive
//! transport failures; once the strike count passes the configured backoff
//! the recorder reports [`RecorderError::BackoffExceeded`], which shuts the
//! whole engine down.

mod error;
pub mod elasticsearch;
pub mod testing;

pub use error::RecorderError;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::expipe::datatype::DataContainer;

/// The bundle sent to a recorder for one read result.
#[derive(Debug, Clone)]
pub struct RecordJob {
    /// Job identifier, carried over from the read result.
    pub id: Uuid,
    /// Typed payload produced by the mapper.
    pub payload: DataContainer,
    /// Recorder-side namespace the document lands in.
    pub index_name: String,
    /// Classifier from the reader.
    pub type_name: String,
    /// Wall clock of the read.
    pub time: DateTime<Utc>,
}

/// A sink for typed metric payloads.
#[async_trait]
pub trait DataRecorder: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn endpoint(&self) -> &str;

    fn index_name(&self) -> &str;

    fn timeout(&self) -> Duration;

    /// Issues a minimal request against the endpoint.
    async fn ping(&self) -> Result<(), RecorderError>;

    /// Persists one document. The scope propagates engine cancellation
    /// into the transport.
    async fn record(&self, scope: &CancellationToken, job: RecordJob) -> Result<(), RecorderError>;
}
