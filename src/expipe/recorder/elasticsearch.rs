//! Elasticsearch document sink.
//!
//! Persists one JSON document per record job with a POST to
//! `{endpoint}/{index_name}/{type_name}`. The exact document shape is
//! whatever [`DataContainer::to_document`] produces; this module only owns
//! the transport and the strike counting.
//!
//! [`DataContainer::to_document`]: crate::expipe::datatype::DataContainer::to_document

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::{DataRecorder, RecordJob, RecorderError};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Construction parameters for [`ElasticsearchRecorder`].
#[derive(Debug, Default)]
pub struct ElasticsearchConfig {
    pub name: String,
    pub endpoint: String,
    pub index_name: String,
    pub timeout: Option<Duration>,
    /// Consecutive-failure threshold, at least 5.
    pub backoff: u32,
}

/// HTTP client for an Elasticsearch-compatible document index.
#[derive(Debug)]
pub struct ElasticsearchRecorder {
    name: String,
    endpoint: Url,
    index_name: String,
    timeout: Duration,
    backoff: u32,
    client: reqwest::Client,
    strikes: AtomicU32,
}

impl ElasticsearchRecorder {
    pub fn new(config: ElasticsearchConfig) -> Result<Self, RecorderError> {
        if config.name.is_empty() {
            return Err(RecorderError::EmptyName);
        }
        if config.endpoint.is_empty() {
            return Err(RecorderError::EmptyEndpoint);
        }
        if config.index_name.is_empty() {
            return Err(RecorderError::EmptyIndexName);
        }
        if config.backoff < 5 {
            return Err(RecorderError::LowBackoff(config.backoff));
        }
        let endpoint = Url::parse(&config.endpoint)
            .map_err(|_| RecorderError::InvalidEndpoint(config.endpoint.clone()))?;
        let timeout = config.timeout.unwrap_or(DEFAULT_TIMEOUT);
        if timeout.is_zero() {
            return Err(RecorderError::ZeroTimeout);
        }
        Ok(ElasticsearchRecorder {
            name: config.name,
            endpoint,
            index_name: config.index_name,
            timeout,
            backoff: config.backoff,
            client: reqwest::Client::new(),
            strikes: AtomicU32::new(0),
        })
    }

    fn strike(&self) {
        self.strikes.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl DataRecorder for ElasticsearchRecorder {
    fn name(&self) -> &str {
        &self.name
    }

    fn endpoint(&self) -> &str {
        self.endpoint.as_str()
    }

    fn index_name(&self) -> &str {
        &self.index_name
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn ping(&self) -> Result<(), RecorderError> {
        self.client
            .head(self.endpoint.as_str())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|err| RecorderError::unavailable(self.endpoint.as_str(), err))?;
        Ok(())
    }

    async fn record(&self, scope: &CancellationToken, job: RecordJob) -> Result<(), RecorderError> {
        if self.strikes.load(Ordering::SeqCst) > self.backoff {
            return Err(RecorderError::BackoffExceeded);
        }

        let url = format!(
            "{}/{}/{}",
            self.endpoint.as_str().trim_end_matches('/'),
            job.index_name,
            job.type_name
        );
        let document = job.payload.to_document(job.time);
        let request = self
            .client
            .post(&url)
            .json(&document)
            .timeout(self.timeout)
            .send();
        let response = tokio::select! {
            response = request => response,
            _ = scope.cancelled() => return Err(RecorderError::Cancelled),
        };
        let response = match response {
            Ok(response) => response,
            Err(err) => {
                self.strike();
                return Err(RecorderError::unavailable(&url, err));
            }
        };
        if !response.status().is_success() {
            self.strike();
            return Err(RecorderError::unavailable(
                &url,
                format!("unexpected status: {}", response.status()),
            ));
        }
        self.strikes.store(0, Ordering::SeqCst);
        debug!("{} [{}]: document persisted", self.name, job.id);
        Ok(())
    }
}
