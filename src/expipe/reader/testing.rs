//! Programmable reader for tests.
//!
//! The mock keeps the full [`DataReader`] contract, including the
//! ping-before-read handshake, and exposes counters so tests can assert on
//! the engine's behavior without touching the network.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use super::{DataReader, ReadResult, ReaderError};
use crate::expipe::datatype::Mapper;
use crate::expipe::token::Token;

type ReadFn = dyn Fn(u64) -> Result<Vec<u8>, ReaderError> + Send + Sync;
type PingFn = dyn Fn() -> Result<(), ReaderError> + Send + Sync;

/// A reader whose ping and read behavior is driven by closures. The read
/// closure receives the zero-based call number, so tests can fail the
/// first N calls and succeed afterwards, or vice versa.
pub struct MockReader {
    name: String,
    type_name: String,
    endpoint: String,
    interval: Duration,
    timeout: Duration,
    mapper: Mapper,
    delay: Option<Duration>,
    on_ping: Box<PingFn>,
    on_read: Box<ReadFn>,
    pinged: AtomicBool,
    pings: AtomicU64,
    reads: AtomicU64,
    read_before_ping: AtomicBool,
}

impl MockReader {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        MockReader {
            type_name: name.clone(),
            name,
            endpoint: "mock://localhost".to_string(),
            interval: Duration::from_millis(10),
            timeout: Duration::from_millis(100),
            mapper: Mapper::default(),
            delay: None,
            on_ping: Box::new(|| Ok(())),
            on_read: Box::new(|_| Ok(br#"{"reads":1}"#.to_vec())),
            pinged: AtomicBool::new(false),
            pings: AtomicU64::new(0),
            reads: AtomicU64::new(0),
            read_before_ping: AtomicBool::new(false),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_mapper(mut self, mapper: Mapper) -> Self {
        self.mapper = mapper;
        self
    }

    /// Makes every read take this long; a cancelled token interrupts the
    /// wait, like a real HTTP call would be interrupted.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn on_ping<F>(mut self, f: F) -> Self
    where
        F: Fn() -> Result<(), ReaderError> + Send + Sync + 'static,
    {
        self.on_ping = Box::new(f);
        self
    }

    pub fn on_read<F>(mut self, f: F) -> Self
    where
        F: Fn(u64) -> Result<Vec<u8>, ReaderError> + Send + Sync + 'static,
    {
        self.on_read = Box::new(f);
        self
    }

    /// Number of `ping` calls so far.
    pub fn pings(&self) -> u64 {
        self.pings.load(Ordering::SeqCst)
    }

    /// Number of `read` calls so far.
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    /// True if `read` was ever attempted before a successful `ping`.
    pub fn read_before_ping(&self) -> bool {
        self.read_before_ping.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DataReader for MockReader {
    fn name(&self) -> &str {
        &self.name
    }

    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
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
        self.pings.fetch_add(1, Ordering::SeqCst);
        (self.on_ping)()?;
        self.pinged.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn read(&self, token: &Token) -> Result<ReadResult, ReaderError> {
        let call = self.reads.fetch_add(1, Ordering::SeqCst);
        if !self.pinged.load(Ordering::SeqCst) {
            self.read_before_ping.store(true, Ordering::SeqCst);
            return Err(ReaderError::PingNotCalled);
        }
        if let Some(delay) = self.delay {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = token.cancelled() => return Err(ReaderError::Cancelled),
            }
        }
        let content = (self.on_read)(call)?;
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
