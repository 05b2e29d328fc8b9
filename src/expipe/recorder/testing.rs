//! Programmable recorder for tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{DataRecorder, RecordJob, RecorderError};

type RecordFn = dyn Fn(u64) -> Result<(), RecorderError> + Send + Sync;
type PingFn = dyn Fn() -> Result<(), RecorderError> + Send + Sync;

/// A recorder that captures every job it receives. Behavior is driven by
/// closures, with the zero-based call number passed to `on_record`.
pub struct MockRecorder {
    name: String,
    endpoint: String,
    index_name: String,
    timeout: Duration,
    on_ping: Box<PingFn>,
    on_record: Box<RecordFn>,
    records: AtomicU64,
    jobs: Mutex<Vec<RecordJob>>,
}

impl MockRecorder {
    pub fn new(name: impl Into<String>) -> Self {
        MockRecorder {
            name: name.into(),
            endpoint: "mock://localhost".to_string(),
            index_name: "mock_index".to_string(),
            timeout: Duration::from_millis(100),
            on_ping: Box::new(|| Ok(())),
            on_record: Box::new(|_| Ok(())),
            records: AtomicU64::new(0),
            jobs: Mutex::new(Vec::new()),
        }
    }

    pub fn with_index_name(mut self, index_name: impl Into<String>) -> Self {
        self.index_name = index_name.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn on_ping<F>(mut self, f: F) -> Self
    where
        F: Fn() -> Result<(), RecorderError> + Send + Sync + 'static,
    {
        self.on_ping = Box::new(f);
        self
    }

    pub fn on_record<F>(mut self, f: F) -> Self
    where
        F: Fn(u64) -> Result<(), RecorderError> + Send + Sync + 'static,
    {
        self.on_record = Box::new(f);
        self
    }

    /// Number of `record` calls so far, including failed ones.
    pub fn records(&self) -> u64 {
        self.records.load(Ordering::SeqCst)
    }

    /// The jobs that were recorded successfully, in arrival order.
    pub fn jobs(&self) -> Vec<RecordJob> {
        self.jobs.lock().expect("jobs lock poisoned").clone()
    }
}

#[async_trait]
impl DataRecorder for MockRecorder {
    fn name(&self) -> &str {
        &self.name
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn index_name(&self) -> &str {
        &self.index_name
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn ping(&self) -> Result<(), RecorderError> {
        (self.on_ping)()
    }

    async fn record(&self, _scope: &CancellationToken, job: RecordJob) -> Result<(), RecorderError> {
        let call = self.records.fetch_add(1, Ordering::SeqCst);
        (self.on_record)(call)?;
        self.jobs.lock().expect("jobs lock poisoned").push(job);
        Ok(())
    }
}
