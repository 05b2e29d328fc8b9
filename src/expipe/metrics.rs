//! Process-wide pipeline counters.
//!
//! Every stage of the pipeline bumps one of these counters, and the self
//! reader serializes the whole registry as a JSON object keyed by counter
//! name. That makes the pipeline observable through the same path as any
//! other scrape target.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::OnceLock;

use serde_json::{Map, Value};

/// A single named atomic counter. Updates are relaxed; the registry is a
/// monitoring surface, not a synchronization primitive.
#[derive(Debug, Default)]
pub struct Counter(AtomicI64);

impl Counter {
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec(&self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn add(&self, delta: i64) {
        self.0.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn set(&self, value: i64) {
        self.0.store(value, Ordering::Relaxed);
    }

    pub fn get(&self) -> i64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Registry of every counter the pipeline exposes.
///
/// The JSON key of each counter is fixed (see [`Registry::snapshot`]); the
/// self reader emits exactly these names.
#[derive(Debug, Default)]
pub struct Registry {
    /// Readers whose event loop has started.
    pub exp_readers: Counter,
    /// Read jobs issued since startup.
    pub read_jobs: Counter,
    /// Record jobs issued since startup.
    pub record_jobs: Counter,
    /// Jobs dropped on the hard deadline or parent cancellation.
    pub errored_jobs: Counter,
    /// Read jobs currently in flight.
    pub waiting_read_jobs: Counter,
    /// Record jobs currently in flight.
    pub waiting_record_jobs: Counter,
    /// Live engine tasks.
    pub num_goroutines: Counter,
    /// Typed records produced by the mapper.
    pub datatype_objs: Counter,
    /// Containers that carry an error bit.
    pub datatype_errs: Counter,
    /// Leaves the mapper could not classify.
    pub unidentified_json: Counter,
    pub string_type_count: Counter,
    pub float_type_count: Counter,
    pub gc_list_type_count: Counter,
    pub byte_type_count: Counter,
}

impl Registry {
    fn entries(&self) -> [(&'static str, &Counter); 14] {
        [
            ("expReaders", &self.exp_readers),
            ("readJobs", &self.read_jobs),
            ("recordJobs", &self.record_jobs),
            ("erroredJobs", &self.errored_jobs),
            ("waitingReadJobs", &self.waiting_read_jobs),
            ("waitingRecordJobs", &self.waiting_record_jobs),
            ("numGoroutines", &self.num_goroutines),
            ("datatypeObjs", &self.datatype_objs),
            ("datatypeErrs", &self.datatype_errs),
            ("unidentifiedJSON", &self.unidentified_json),
            ("stringTypeCount", &self.string_type_count),
            ("floatTypeCount", &self.float_type_count),
            ("gcListTypeCount", &self.gc_list_type_count),
            ("byteTypeCount", &self.byte_type_count),
        ]
    }

    /// Snapshot of every counter as a JSON object keyed by counter name.
    /// Key order is the registration order above, so the output is
    /// deterministic.
    pub fn snapshot(&self) -> Value {
        let mut doc = Map::new();
        for (name, counter) in self.entries() {
            doc.insert(name.to_string(), Value::from(counter.get()));
        }
        Value::Object(doc)
    }
}

/// The process-wide registry. All tasks update the same instance.
pub fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(Registry::default)
}

/// RAII handle that decrements a counter when dropped. Used for the
/// waiting-job gauges and the live-task gauge so early returns cannot leak
/// an increment.
pub struct GaugeGuard(&'static Counter);

impl GaugeGuard {
    /// Increments `counter` now and decrements it on drop.
    pub fn raise(counter: &'static Counter) -> Self {
        counter.inc();
        GaugeGuard(counter)
    }

    /// Takes over an increment performed by the caller; only the decrement
    /// happens here.
    pub fn adopt(counter: &'static Counter) -> Self {
        GaugeGuard(counter)
    }
}

impl Drop for GaugeGuard {
    fn drop(&mut self) {
        self.0.dec();
    }
}
