//! Reader for the pipeline's own metrics.
//!
//! Instead of scraping an external endpoint, this reader snapshots the
//! process counter registry and emits it as a JSON document, so the
//! pipeline's health flows through the same route table as every other
//! metric source. When no endpoint is configured, an ephemeral local
//! listener is bound on the first ping; it answers ping and scrape
//! requests with the same registry snapshot.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use log::debug;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use super::{ping_endpoint, DataReader, ReadResult, ReaderError, DEFAULT_INTERVAL, DEFAULT_TIMEOUT};
use crate::expipe::datatype::Mapper;
use crate::expipe::metrics;
use crate::expipe::token::Token;

/// Construction parameters for [`SelfReader`]. Unlike the expvar reader,
/// the endpoint is optional: without one the reader serves its own pings.
#[derive(Debug, Default)]
pub struct SelfReaderConfig {
    pub name: String,
    pub type_name: Option<String>,
    pub endpoint: Option<String>,
    pub interval: Option<Duration>,
    pub timeout: Option<Duration>,
    pub backoff: u32,
    pub mapper: Option<Mapper>,
}

/// Reader over the pipeline's own counter registry.
#[derive(Debug)]
pub struct SelfReader {
    name: String,
    type_name: String,
    endpoint: OnceLock<String>,
    interval: Duration,
    timeout: Duration,
    mapper: Mapper,
    client: reqwest::Client,
    pinged: AtomicBool,
}

impl SelfReader {
    pub fn new(config: SelfReaderConfig) -> Result<Self, ReaderError> {
        if config.name.is_empty() {
            return Err(ReaderError::EmptyName);
        }
        if config.backoff < 5 {
            return Err(ReaderError::LowBackoff(config.backoff));
        }
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
        let endpoint = OnceLock::new();
        if let Some(configured) = config.endpoint.filter(|e| !e.is_empty()) {
            url::Url::parse(&configured)
                .map_err(|_| ReaderError::InvalidEndpoint(configured.clone()))?;
            let _ = endpoint.set(configured);
        }
        Ok(SelfReader {
            name: config.name,
            type_name,
            endpoint,
            interval,
            timeout,
            mapper: config.mapper.unwrap_or_default(),
            client: reqwest::Client::new(),
            pinged: AtomicBool::new(false),
        })
    }

    /// Binds an ephemeral listener that serves the registry snapshot, and
    /// publishes its address as the reader endpoint. The listener lives for
    /// the rest of the process.
    async fn bind_local_listener(&self) -> Result<(), ReaderError> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|err| ReaderError::unavailable("127.0.0.1:0", err))?;
        let addr = listener
            .local_addr()
            .map_err(|err| ReaderError::unavailable("127.0.0.1:0", err))?;
        if self.endpoint.set(format!("http://{}", addr)).is_err() {
            // lost the race against a concurrent ping; its listener wins
            return Ok(());
        }
        debug!("{}: serving own metrics on {}", self.name, addr);
        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };
                tokio::spawn(async move {
                    let mut buf = [0u8; 1024];
                    let _ = stream.read(&mut buf).await;
                    let body = metrics::registry().snapshot().to_string();
                    let response = format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    let _ = stream.write_all(response.as_bytes()).await;
                    let _ = stream.shutdown().await;
                });
            }
        });
        Ok(())
    }
}

#[async_trait]
impl DataReader for SelfReader {
    fn name(&self) -> &str {
        &self.name
    }

    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn endpoint(&self) -> &str {
        self.endpoint.get().map(String::as_str).unwrap_or("")
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
        if self.endpoint.get().is_none() {
            self.bind_local_listener().await?;
        }
        let endpoint = self
            .endpoint
            .get()
            .cloned()
            .ok_or(ReaderError::EmptyEndpoint)?;
        ping_endpoint(&self.client, &endpoint, self.timeout).await?;
        self.pinged.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn read(&self, token: &Token) -> Result<ReadResult, ReaderError> {
        if !self.pinged.load(Ordering::SeqCst) {
            return Err(ReaderError::PingNotCalled);
        }
        let content =
            serde_json::to_vec(&metrics::registry().snapshot()).map_err(|_| ReaderError::InvalidJson)?;
        Ok(ReadResult {
            id: token.id(),
            time: Utc::now(),
            content,
            type_name: self.type_name.clone(),
            reader_name: self.name.clone(),
            mapper: self.mapper.clone(),
        })
    }
}
