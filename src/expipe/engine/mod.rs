//! The engine event loop.
//!
//! One supervisor task runs per reader: its ticker issues read jobs, and a
//! shared dispatcher fans every result out to the recorders named by the
//! route table. Each read and each record runs in its own short-lived task
//! under a hard deadline of the component's own timeout plus a fixed grace,
//! so a misbehaving endpoint cannot wedge the loop.
//!
//! Failure policy: transient errors are logged and the tick is discarded;
//! a reader reporting `BackoffExceeded` is evicted from the active set; a
//! recorder reporting `BackoffExceeded` takes the whole engine down, since
//! there is nothing left to ship to.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use log::{debug, error, info, warn};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::expipe::datatype::job_result_data_types;
use crate::expipe::metrics::{self, GaugeGuard};
use crate::expipe::reader::{DataReader, ReadResult, ReaderError};
use crate::expipe::recorder::{DataRecorder, RecordJob, RecorderError};
use crate::expipe::routes::RouteTable;
use crate::expipe::token::Token;

/// Grace added on top of a component's own timeout before the engine stops
/// waiting for it.
pub const HARD_DEADLINE_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine needs at least one reader")]
    NoReaders,

    #[error("engine needs at least one recorder")]
    NoRecorders,

    #[error("route references unknown reader: {0}")]
    UnknownReader(String),

    #[error("route references unknown recorder: {0}")]
    UnknownRecorder(String),
}

/// Why [`Engine::start`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The parent scope was cancelled, or [`Engine::stop`] was called.
    Cancelled,
    /// A recorder exceeded its backoff; the pipeline has no viable sink.
    SinkExhausted,
    /// Every reader was evicted; there is nothing left to poll.
    ReadersExhausted,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Cancelled => write!(f, "cancelled"),
            Outcome::SinkExhausted => write!(f, "no recorder left"),
            Outcome::ReadersExhausted => write!(f, "no reader left"),
        }
    }
}

type ReaderMap = HashMap<String, Arc<dyn DataReader>>;
type RecorderMap = HashMap<String, Arc<dyn DataRecorder>>;

/// Coordinates readers, recorders and the route table under one parent
/// cancellation scope.
pub struct Engine {
    parent: CancellationToken,
    shutdown: CancellationToken,
    sink_gone: Arc<AtomicBool>,
    readers: Arc<RwLock<ReaderMap>>,
    recorders: Arc<RecorderMap>,
    routes: Arc<RouteTable>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("parent", &self.parent)
            .field("shutdown", &self.shutdown)
            .field("sink_gone", &self.sink_gone)
            .field("readers", &self.readers.try_read().map(|r| r.len()))
            .field("recorders", &self.recorders.len())
            .field("routes", &self.routes)
            .finish()
    }
}

impl Engine {
    /// Validates the route table against the instantiated components and
    /// builds the engine. Nothing runs until [`Engine::start`].
    pub fn new(
        parent: CancellationToken,
        readers: Vec<Arc<dyn DataReader>>,
        recorders: Vec<Arc<dyn DataRecorder>>,
        routes: RouteTable,
    ) -> Result<Self, EngineError> {
        if readers.is_empty() {
            return Err(EngineError::NoReaders);
        }
        if recorders.is_empty() {
            return Err(EngineError::NoRecorders);
        }
        let reader_map: ReaderMap = readers
            .into_iter()
            .map(|r| (r.name().to_string(), r))
            .collect();
        let recorder_map: RecorderMap = recorders
            .into_iter()
            .map(|r| (r.name().to_string(), r))
            .collect();
        for name in routes.readers() {
            if !reader_map.contains_key(name) {
                return Err(EngineError::UnknownReader(name.to_string()));
            }
        }
        for name in routes.recorders() {
            if !recorder_map.contains_key(name) {
                return Err(EngineError::UnknownRecorder(name.to_string()));
            }
        }
        Ok(Engine {
            parent,
            shutdown: CancellationToken::new(),
            sink_gone: Arc::new(AtomicBool::new(false)),
            readers: Arc::new(RwLock::new(reader_map)),
            recorders: Arc::new(recorder_map),
            routes: Arc::new(routes),
        })
    }

    /// Signals every supervisor to stop. The shutdown broadcast is
    /// one-shot; signalling twice is a programmer error.
    pub fn stop(&self) {
        debug_assert!(
            !self.shutdown.is_cancelled(),
            "engine shutdown signalled twice"
        );
        self.shutdown.cancel();
    }

    /// Runs the pipeline until the parent scope is cancelled, a recorder
    /// backs off, or every reader has been evicted. Returns once all
    /// supervisors have acknowledged termination.
    pub async fn start(&self) -> Outcome {
        let snapshot: Vec<Arc<dyn DataReader>> = {
            let readers = self.readers.read().expect("readers lock poisoned");
            readers.values().cloned().collect()
        };
        info!("starting with {} readers", snapshot.len());

        // ping happens-before the first read on every reader; a reader that
        // cannot be pinged never enters the active set
        let pings = snapshot.iter().map(|reader| {
            let reader = reader.clone();
            async move { (reader.name().to_string(), reader.ping().await) }
        });
        for (name, result) in futures::future::join_all(pings).await {
            if let Err(err) = result {
                error!("excluding reader {}: {}", name, err);
                self.readers
                    .write()
                    .expect("readers lock poisoned")
                    .remove(&name);
            }
        }
        for recorder in self.recorders.values() {
            if let Err(err) = recorder.ping().await {
                error!("recorder {} is not answering pings: {}", recorder.name(), err);
            }
        }

        let active: Vec<Arc<dyn DataReader>> = {
            let readers = self.readers.read().expect("readers lock poisoned");
            readers.values().cloned().collect()
        };
        if active.is_empty() {
            warn!("no reader is available to poll");
            return Outcome::ReadersExhausted;
        }

        let (result_tx, result_rx) = mpsc::channel::<ReadResult>(active.len() * 2);
        tokio::spawn(dispatch(
            result_rx,
            self.recorders.clone(),
            self.routes.clone(),
            self.shutdown.clone(),
            self.parent.clone(),
            self.sink_gone.clone(),
        ));

        let mut supervisors = JoinSet::new();
        for reader in active {
            supervisors.spawn(reader_event_loop(
                reader,
                self.readers.clone(),
                result_tx.clone(),
                self.shutdown.clone(),
                self.parent.clone(),
            ));
        }
        drop(result_tx);
        while supervisors.join_next().await.is_some() {}

        let outcome = if self.sink_gone.load(Ordering::SeqCst) {
            Outcome::SinkExhausted
        } else if self.parent.is_cancelled() || self.shutdown.is_cancelled() {
            Outcome::Cancelled
        } else {
            Outcome::ReadersExhausted
        };
        info!("engine stopped: {}", outcome);
        outcome
    }
}

/// The per-reader supervisor: owns the ticker, spawns read jobs and
/// handles eviction.
async fn reader_event_loop(
    reader: Arc<dyn DataReader>,
    readers: Arc<RwLock<ReaderMap>>,
    result_tx: mpsc::Sender<ReadResult>,
    shutdown: CancellationToken,
    parent: CancellationToken,
) {
    let m = metrics::registry();
    m.exp_readers.inc();
    let _tasks = GaugeGuard::raise(&m.num_goroutines);

    let mut ticker = time::interval_at(Instant::now() + reader.interval(), reader.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let (remove_tx, mut remove_rx) = mpsc::channel::<String>(1);
    debug!("started reader: {}", reader.name());

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                debug!("issuing job to: {}", reader.name());
                m.waiting_read_jobs.inc();
                tokio::spawn(issue_read_job(
                    reader.clone(),
                    remove_tx.clone(),
                    result_tx.clone(),
                    shutdown.clone(),
                    parent.clone(),
                ));
            }
            Some(name) = remove_rx.recv() => {
                warn!("evicting reader: {}", name);
                readers.write().expect("readers lock poisoned").remove(&name);
                break;
            }
            _ = shutdown.cancelled() => {
                debug!("shutting down reader: {}", reader.name());
                break;
            }
            _ = parent.cancelled() => {
                debug!("context cancelled, stopping reader: {}", reader.name());
                break;
            }
        }
    }
}

/// One tick's read: run the reader in a child task under the hard
/// deadline and publish the result on success.
async fn issue_read_job(
    reader: Arc<dyn DataReader>,
    remove_tx: mpsc::Sender<String>,
    result_tx: mpsc::Sender<ReadResult>,
    shutdown: CancellationToken,
    parent: CancellationToken,
) {
    let m = metrics::registry();
    let _waiting = GaugeGuard::adopt(&m.waiting_read_jobs);
    let _tasks = GaugeGuard::raise(&m.num_goroutines);
    m.read_jobs.inc();

    if shutdown.is_cancelled() {
        return;
    }

    let token = Token::new(&parent);
    let id = token.id();
    let name = reader.name().to_string();
    let hard_deadline = reader.timeout() + HARD_DEADLINE_GRACE;

    let mut child = tokio::spawn(async move {
        match reader.read(&token).await {
            Ok(result) => {
                let _ = result_tx.send(result).await;
            }
            Err(ReaderError::BackoffExceeded) => {
                error!("{} [{}]: backoff exceeded", reader.name(), id);
                let _ = remove_tx.send(reader.name().to_string()).await;
            }
            Err(ReaderError::Cancelled) => {
                debug!("{} [{}]: read cancelled", reader.name(), id);
            }
            Err(err) => {
                error!("{} [{}]: {}", reader.name(), id, err);
            }
        }
    });

    tokio::select! {
        _ = &mut child => {}
        _ = time::sleep(hard_deadline) => {
            m.errored_jobs.inc();
            warn!("{} [{}]: timed out before the job was read", name, id);
            child.abort();
        }
        _ = parent.cancelled() => {
            m.errored_jobs.inc();
            warn!("{} [{}]: context closed before the job was read", name, id);
        }
    }
}

/// Drains the shared result channel and spawns one shipping task per
/// result. Ends when every publisher is gone or the engine stops.
async fn dispatch(
    mut result_rx: mpsc::Receiver<ReadResult>,
    recorders: Arc<RecorderMap>,
    routes: Arc<RouteTable>,
    shutdown: CancellationToken,
    parent: CancellationToken,
    sink_gone: Arc<AtomicBool>,
) {
    let m = metrics::registry();
    let _tasks = GaugeGuard::raise(&m.num_goroutines);
    loop {
        tokio::select! {
            received = result_rx.recv() => match received {
                Some(result) => {
                    m.waiting_record_jobs.inc();
                    tokio::spawn(ship_to_recorders(
                        result,
                        recorders.clone(),
                        routes.clone(),
                        shutdown.clone(),
                        parent.clone(),
                        sink_gone.clone(),
                    ));
                }
                None => break,
            },
            _ = shutdown.cancelled() => break,
            _ = parent.cancelled() => break,
        }
    }
}

/// Ships one result to every recorder its route names. The payload is
/// copied and the mapper duplicated per recorder, so concurrent record
/// jobs never share state.
async fn ship_to_recorders(
    result: ReadResult,
    recorders: Arc<RecorderMap>,
    routes: Arc<RouteTable>,
    shutdown: CancellationToken,
    parent: CancellationToken,
    sink_gone: Arc<AtomicBool>,
) {
    let m = metrics::registry();
    let _waiting = GaugeGuard::adopt(&m.waiting_record_jobs);
    let _tasks = GaugeGuard::raise(&m.num_goroutines);

    let names = match routes.recorders_for(&result.reader_name) {
        Ok(names) => names,
        Err(err) => {
            warn!("dropping result [{}]: {}", result.id, err);
            return;
        }
    };

    for name in names {
        let Some(recorder) = recorders.get(name) else {
            warn!("route names unknown recorder: {}", name);
            continue;
        };

        let content = result.content.clone();
        let mapper = result.mapper.copy();
        let payload = job_result_data_types(&content, &mapper);
        if let Some(err) = payload.error() {
            warn!("error in payload [{}]: {}", result.id, err);
            continue;
        }

        m.record_jobs.inc();
        let job = RecordJob {
            id: result.id,
            payload,
            index_name: recorder.index_name().to_string(),
            type_name: result.type_name.clone(),
            time: result.time,
        };
        let hard_deadline = recorder.timeout() + HARD_DEADLINE_GRACE;
        let recorder_name = recorder.name().to_string();
        let recorder = recorder.clone();
        let scope = parent.clone();
        let mut child = tokio::spawn(async move { recorder.record(&scope, job).await });

        tokio::select! {
            joined = &mut child => match joined {
                Ok(Ok(())) => debug!("[{}] payload has been delivered", result.id),
                Ok(Err(RecorderError::BackoffExceeded)) => {
                    error!(
                        "{} [{}]: recorder backoff exceeded, shutting down",
                        recorder_name, result.id
                    );
                    if !sink_gone.swap(true, Ordering::SeqCst) {
                        shutdown.cancel();
                    }
                    return;
                }
                Ok(Err(err)) => error!("{} [{}]: {}", recorder_name, result.id, err),
                Err(err) => error!("{} [{}]: record task failed: {}", recorder_name, result.id, err),
            },
            _ = time::sleep(hard_deadline) => {
                warn!("[{}] timed out before receiving the response", result.id);
                child.abort();
            }
            _ = parent.cancelled() => {
                warn!("[{}] context closed before receiving the response", result.id);
            }
        }
    }
}
