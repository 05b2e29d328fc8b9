//! Typed schema mapping for raw metric documents.

mod mapper;
mod types;

pub use mapper::{job_result_data_types, Mapper, MappingError};
pub use types::{ContainerError, DataContainer, DataRecord, MemoryUnit, MetricValue};
