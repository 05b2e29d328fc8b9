//! Polling sources of JSON metric documents.
//!
//! A reader scrapes one endpoint on a fixed interval and hands the raw
//! document to the engine together with the mapper that should transform
//! it. Implementations are polymorphic over this module's [`DataReader`]
//! trait and are chosen by the `type` discriminator in the configuration.
//!
//! Readers must be pinged before the first read; `read` rejects callers
//! that skip the handshake. Consecutive transport failures count strikes,
//! and once the strike count passes the configured backoff the reader
//! reports [`ReaderError::BackoffExceeded`] so the engine can evict it.

mod error;
pub mod expvar;
pub mod self_reader;
pub mod testing;

pub use error::ReaderError;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::expipe::datatype::Mapper;
use crate::expipe::token::Token;

/// Default poll interval when programmatic construction leaves it out.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);
/// Default per-read timeout when programmatic construction leaves it out.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// The outcome of one successful read. Immutable once created; the engine
/// copies what it needs on the recording path.
#[derive(Debug, Clone)]
pub struct ReadResult {
    /// Job identifier, copied from the token that drove the read.
    pub id: Uuid,
    /// Wall clock at the moment the read completed.
    pub time: DateTime<Utc>,
    /// Raw JSON payload.
    pub content: Vec<u8>,
    /// Classifier the recorder stores the document under.
    pub type_name: String,
    /// Name of the reader that produced this result, for route lookup.
    pub reader_name: String,
    /// The mapper that should transform the payload.
    pub mapper: Mapper,
}

/// A polling source of metric documents.
#[async_trait]
pub trait DataReader: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn type_name(&self) -> &str;

    fn endpoint(&self) -> &str;

    fn interval(&self) -> Duration;

    fn timeout(&self) -> Duration;

    fn mapper(&self) -> &Mapper;

    /// Issues a minimal request against the endpoint. Must succeed before
    /// the first `read`.
    async fn ping(&self) -> Result<(), ReaderError>;

    /// Fetches one document. Only valid after a successful `ping`.
    async fn read(&self, token: &Token) -> Result<ReadResult, ReaderError>;
}

/// Shared ping: a HEAD request with the reader's timeout. Transport
/// failures map to `EndpointUnavailable`.
pub(crate) async fn ping_endpoint(
    client: &reqwest::Client,
    endpoint: &str,
    timeout: Duration,
) -> Result<(), ReaderError> {
    client
        .head(endpoint)
        .timeout(timeout)
        .send()
        .await
        .map_err(|err| ReaderError::unavailable(endpoint, err))?;
    Ok(())
}
