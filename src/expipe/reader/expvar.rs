//! Generic reader for applications exposing expvar-style JSON over HTTP.
//!
//! The reader GETs `endpoint + routepath`, verifies the body is well-formed
//! JSON and hands it to the engine untouched; all schema work happens later
//! in the mapper, on the recording path.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use log::debug;
use url::Url;

use super::{ping_endpoint, DataReader, ReadResult, ReaderError, DEFAULT_INTERVAL, DEFAULT_TIMEOUT};
use crate::expipe::datatype::Mapper;
use crate::expipe::token::Token;

/// Construction parameters for [`ExpvarReader`]. Optional fields fall back
/// to the usual defaults; everything else is validated in
/// [`ExpvarReader::new`].
#[derive(Debug, Default)]
pub struct ExpvarReaderConfig {
    pub name: String,
    /// Classifier for the recorder; defaults to the reader name.
    pub type_name: Option<String>,
    pub endpoint: String,
    /// Path appended to the endpoint for scraping, e.g. `/debug/vars`.
    pub routepath: String,
    pub interval: Option<Duration>,
    pub timeout: Option<Duration>,
    /// Consecutive-failure threshold, at least 5.
    pub backoff: u32,
    pub mapper: Option<Mapper>,
}

/// Reader for any application that exposes expvar information.
#[derive(Debug)]
pub struct ExpvarReader {
    name: String,
    type_name: String,
    endpoint: Url,
    scrape_url: Url,
    interval: Duration,
    timeout: Duration,
    backoff: u32,
    mapper: Mapper,
    client: reqwest::Client,
    pinged: AtomicBool,
    strikes: AtomicU32,
}

impl ExpvarReader {
    pub fn new(config: ExpvarReaderConfig) -> Result<Self, ReaderError> {
        if config.name.is_empty() {
            return Err(ReaderError::EmptyName);
        }
        if config.endpoint.is_empty() {
            return Err(ReaderError::EmptyEndpoint);
        }
        if config.backoff < 5 {
            return Err(ReaderError::LowBackoff(config.backoff));
        }
        let endpoint = Url::parse(&config.endpoint)
            .map_err(|_| ReaderError::InvalidEndpoint(config.endpoint.clone()))?;
        let raw = format!(
            "{}/{}",
            config.endpoint.trim_end_matches('/'),
            config.routepath.trim_start_matches('/')
        );
        let scrape_url =
            Url::parse(&raw).map_err(|_| ReaderError::InvalidEndpoint(raw.clone()))?;
        let interval = config.interval.unwrap_or(DEFAULT_INTERVAL);
        if interval.is_zero() {
            return Err(ReaderError::ZeroInterval);
        }
        let timeout = config.timeout.unwrap_or(DEFAULT_TIMEOUT);
        if timeout.is_zero() {
            return Err(ReaderError::ZeroTimeout);
        }
        let type_name = config
            .type_name
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| config.name.clone());
        Ok(ExpvarReader {
            name: config.name,
            type_name,
            endpoint,
            scrape_url,
            interval,
            timeout,
            backoff: config.backoff,
            mapper: config.mapper.unwrap_or_default(),
            client: reqwest::Client::new(),
            pinged: AtomicBool::new(false),
            strikes: AtomicU32::new(0),
        })
    }

    fn strike(&self) {
        self.strikes.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl DataReader for ExpvarReader {
    fn name(&self) -> &str {
        &self.name
    }

    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn endpoint(&self) -> &str {
        self.endpoint.as_str()
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn mapper(&self) -> &Mapper {
        &self.mapper
    }

    async fn ping(&self) -> Result<(), ReaderError> {
        ping_endpoint(&self.client, self.endpoint.as_str(), self.timeout).await?;
        self.pinged.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn read(&self, token: &Token) -> Result<ReadResult, ReaderError> {
        if !self.pinged.load(Ordering::SeqCst) {
            return Err(ReaderError::PingNotCalled);
        }
        if self.strikes.load(Ordering::SeqCst) > self.backoff {
            return Err(ReaderError::BackoffExceeded);
        }

        let request = self
            .client
            .get(self.scrape_url.clone())
            .timeout(self.timeout)
            .send();
        let response = tokio::select! {
            response = request => response,
            _ = token.cancelled() => return Err(ReaderError::Cancelled),
        };
        let response = match response {
            Ok(response) => response,
            Err(err) => {
                self.strike();
                debug!("{} [{}]: error making request: {}", self.name, token.id(), err);
                return Err(ReaderError::unavailable(self.scrape_url.as_str(), err));
            }
        };
        if !response.status().is_success() {
            self.strike();
            return Err(ReaderError::unavailable(
                self.scrape_url.as_str(),
                format!("unexpected status: {}", response.status()),
            ));
        }
        let content = tokio::select! {
            bytes = response.bytes() => match bytes {
                Ok(bytes) => bytes,
                Err(err) => {
                    self.strike();
                    return Err(ReaderError::unavailable(self.scrape_url.as_str(), err));
                }
            },
            _ = token.cancelled() => return Err(ReaderError::Cancelled),
        };
        self.strikes.store(0, Ordering::SeqCst);

        if serde_json::from_slice::<serde_json::Value>(&content).is_err() {
            return Err(ReaderError::InvalidJson);
        }

        Ok(ReadResult {
            id: token.id(),
            // it is sensible to record the time now
            time: Utc::now(),
            content: content.to_vec(),
            type_name: self.type_name.clone(),
            reader_name: self.name.clone(),
            mapper: self.mapper.clone(),
        })
    }
}
