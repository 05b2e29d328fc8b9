//! expipe is a metrics-shipping pipeline. It periodically pulls JSON
//! metric documents from HTTP readers, converts them into typed records
//! with unit normalization, and ships the result to one or more document
//! indices according to a route table. The engine runs every reader
//! concurrently under one parent cancellation scope and shuts down cleanly
//! when that scope ends.

pub mod expipe;

// Re-export the main API
pub use expipe::config::{Bootstrap, ConfigError};
pub use expipe::datatype::{job_result_data_types, DataContainer, DataRecord, Mapper, MetricValue};
pub use expipe::engine::{Engine, EngineError, Outcome};
pub use expipe::reader::{DataReader, ReadResult, ReaderError};
pub use expipe::recorder::{DataRecorder, RecordJob, RecorderError};
pub use expipe::routes::{RouteError, RouteTable};
pub use expipe::token::Token;
