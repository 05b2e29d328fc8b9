//! Typed records produced by the mapper.
//!
//! A raw metric document is broken into a flat sequence of keyed records.
//! Each record knows how to write itself into the JSON document the
//! recorders persist, so the container can be serialized without any
//! knowledge of the sink.

use std::fmt;

use chrono::{DateTime, Utc};
use serde_json::{Map, Number, Value};
use thiserror::Error;

use crate::expipe::metrics;

/// Target unit for a memory field rewrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryUnit {
    Byte,
    Kilobyte,
    Megabyte,
    Gigabyte,
}

impl MemoryUnit {
    /// Parses the unit names accepted in mapping configuration.
    pub fn parse(name: &str) -> Option<MemoryUnit> {
        match name.to_lowercase().as_str() {
            "b" | "byte" | "bytes" => Some(MemoryUnit::Byte),
            "kb" | "kilobyte" | "kilobytes" => Some(MemoryUnit::Kilobyte),
            "mb" | "megabyte" | "megabytes" => Some(MemoryUnit::Megabyte),
            "gb" | "gigabyte" | "gigabytes" => Some(MemoryUnit::Gigabyte),
            _ => None,
        }
    }

    pub fn divisor(&self) -> u64 {
        match self {
            MemoryUnit::Byte => 1,
            MemoryUnit::Kilobyte => 1 << 10,
            MemoryUnit::Megabyte => 1 << 20,
            MemoryUnit::Gigabyte => 1 << 30,
        }
    }

    /// Converts a byte count into this unit, rounding toward zero.
    pub fn convert(&self, bytes: u64) -> u64 {
        bytes / self.divisor()
    }
}

impl fmt::Display for MemoryUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryUnit::Byte => write!(f, "b"),
            MemoryUnit::Kilobyte => write!(f, "kb"),
            MemoryUnit::Megabyte => write!(f, "mb"),
            MemoryUnit::Gigabyte => write!(f, "gb"),
        }
    }
}

/// The value carried by one typed record.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    /// Any JSON number that is not rewritten by the mapping.
    Float(f64),
    /// A JSON string.
    Text(String),
    /// An integer byte count converted to the configured unit. The value
    /// is already converted.
    ByteSize { value: u64, unit: MemoryUnit },
    /// A uniform numeric array that is not a GC list.
    FloatList(Vec<f64>),
    /// A GC pause list with the zero entries filtered out.
    GcList(Vec<u64>),
}

/// One keyed record inside a [`DataContainer`].
#[derive(Debug, Clone, PartialEq)]
pub struct DataRecord {
    pub key: String,
    pub value: MetricValue,
}

impl DataRecord {
    pub fn new(key: impl Into<String>, value: MetricValue) -> Self {
        DataRecord {
            key: key.into(),
            value,
        }
    }

    /// Writes this record into the flat recorder document.
    fn write_into(&self, doc: &mut Map<String, Value>) {
        let value = match &self.value {
            MetricValue::Float(v) => Number::from_f64(*v)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            MetricValue::Text(v) => Value::String(v.clone()),
            MetricValue::ByteSize { value, .. } => Value::from(*value),
            MetricValue::FloatList(vs) => Value::Array(
                vs.iter()
                    .map(|v| {
                        Number::from_f64(*v)
                            .map(Value::Number)
                            .unwrap_or(Value::Null)
                    })
                    .collect(),
            ),
            MetricValue::GcList(vs) => Value::Array(vs.iter().map(|v| Value::from(*v)).collect()),
        };
        doc.insert(self.key.clone(), value);
    }
}

/// Container-level failure. The mapper never returns `Err`; it reports
/// through this bit and keeps the well-formed records it produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ContainerError {
    #[error("payload is not valid JSON")]
    InvalidJson,
    #[error("payload contains unidentified fields")]
    UnidentifiedField,
}

/// Ordered sequence of typed records produced from one read result.
///
/// Iteration order is the traversal order of the input document: object
/// keys in parse order, array elements in index order.
#[derive(Debug, Clone, Default)]
pub struct DataContainer {
    records: Vec<DataRecord>,
    error: Option<ContainerError>,
}

impl DataContainer {
    pub fn new() -> Self {
        DataContainer::default()
    }

    pub fn push(&mut self, record: DataRecord) {
        let m = metrics::registry();
        m.datatype_objs.inc();
        match record.value {
            MetricValue::Float(_) | MetricValue::FloatList(_) => m.float_type_count.inc(),
            MetricValue::Text(_) => m.string_type_count.inc(),
            MetricValue::ByteSize { .. } => m.byte_type_count.inc(),
            MetricValue::GcList(_) => m.gc_list_type_count.inc(),
        }
        self.records.push(record);
    }

    /// Sets the error bit. The first cause wins; later ones keep the
    /// records but do not overwrite it.
    pub fn set_error(&mut self, error: ContainerError) {
        if self.error.is_none() {
            metrics::registry().datatype_errs.inc();
            self.error = Some(error);
        }
    }

    pub fn error(&self) -> Option<ContainerError> {
        self.error
    }

    pub fn records(&self) -> &[DataRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Builds the flat JSON document a recorder persists, stamped with the
    /// acquisition time.
    pub fn to_document(&self, time: DateTime<Utc>) -> Value {
        let mut doc = Map::new();
        doc.insert(
            "@timestamp".to_string(),
            Value::String(time.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)),
        );
        for record in &self.records {
            record.write_into(&mut doc);
        }
        Value::Object(doc)
    }
}
