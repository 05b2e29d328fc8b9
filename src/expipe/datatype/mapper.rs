//! Schema mapper: raw metric JSON in, typed records out.
//!
//! The mapper walks the parsed document and classifies every leaf. Two
//! rewrites are driven by configuration: GC pause lists are filtered so
//! zero entries disappear, and memory fields are converted from bytes to a
//! target unit. Everything the mapper cannot classify bumps the
//! `unidentifiedJSON` counter and sets the container error bit; the mapper
//! itself never fails.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

use super::types::{ContainerError, DataContainer, DataRecord, MemoryUnit, MetricValue};
use crate::expipe::metrics;

/// Errors loading a mapping configuration. Mapping errors only happen at
/// construction; a built mapper is infallible.
#[derive(Debug, Error)]
pub enum MappingError {
    #[error("reading mapping file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing mapping file: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("unknown memory unit for {key}: {unit}")]
    UnknownUnit { key: String, unit: String },
}

#[derive(Debug, Deserialize)]
struct MappingFile {
    #[serde(default)]
    gc_types: Vec<String>,
    #[serde(default)]
    memory_bytes: HashMap<String, String>,
}

/// Converts raw JSON documents into [`DataContainer`]s.
///
/// Mappers are deliberately cheap to duplicate: the recording path calls
/// [`Mapper::copy`] so concurrent record jobs never share mutable state
/// with the reader that owns the original.
#[derive(Debug, Clone, PartialEq)]
pub struct Mapper {
    gc_types: Vec<String>,
    memory_bytes: HashMap<String, MemoryUnit>,
}

impl Default for Mapper {
    /// The mapping shipped when no mapping file is configured, covering the
    /// usual Go `memstats` block.
    fn default() -> Self {
        let mb = MemoryUnit::Megabyte;
        Mapper {
            gc_types: vec![
                "memstats.PauseNs".to_string(),
                "memstats.PauseEnd".to_string(),
            ],
            memory_bytes: [
                ("memstats.Alloc", mb),
                ("memstats.TotalAlloc", mb),
                ("memstats.Sys", mb),
                ("memstats.HeapAlloc", mb),
                ("memstats.HeapSys", mb),
                ("memstats.HeapInuse", mb),
                ("memstats.StackInuse", MemoryUnit::Kilobyte),
                ("memstats.StackSys", MemoryUnit::Kilobyte),
            ]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect(),
        }
    }
}

impl Mapper {
    pub fn new(gc_types: Vec<String>, memory_bytes: HashMap<String, MemoryUnit>) -> Self {
        Mapper {
            gc_types,
            memory_bytes,
        }
    }

    /// Loads `gc_types` and `memory_bytes` from a YAML mapping document.
    pub fn from_yaml(contents: &str) -> Result<Self, MappingError> {
        let file: MappingFile = serde_yaml::from_str(contents)?;
        let mut memory_bytes = HashMap::with_capacity(file.memory_bytes.len());
        for (key, unit) in file.memory_bytes {
            let parsed = MemoryUnit::parse(&unit).ok_or(MappingError::UnknownUnit {
                key: key.clone(),
                unit,
            })?;
            memory_bytes.insert(key, parsed);
        }
        Ok(Mapper {
            gc_types: file.gc_types,
            memory_bytes,
        })
    }

    pub fn from_file(path: &Path) -> Result<Self, MappingError> {
        let contents = std::fs::read_to_string(path).map_err(|source| MappingError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Mapper::from_yaml(&contents)
    }

    /// Returns a functionally-equivalent mapper that can be used
    /// concurrently with this one.
    pub fn copy(&self) -> Mapper {
        self.clone()
    }

    fn is_gc_type(&self, path: &str) -> bool {
        self.gc_types.iter().any(|p| p == path)
    }

    fn memory_unit(&self, path: &str) -> Option<MemoryUnit> {
        self.memory_bytes.get(path).copied()
    }

    fn walk(&self, prefix: &str, map: &Map<String, Value>, container: &mut DataContainer) {
        for (key, value) in map {
            let path = if prefix.is_empty() {
                key.clone()
            } else {
                format!("{}.{}", prefix, key)
            };
            self.classify(&path, value, container);
        }
    }

    fn classify(&self, path: &str, value: &Value, container: &mut DataContainer) {
        match value {
            Value::Number(n) => match (self.memory_unit(path), n.as_u64()) {
                (Some(unit), Some(bytes)) => container.push(DataRecord::new(
                    path,
                    MetricValue::ByteSize {
                        value: unit.convert(bytes),
                        unit,
                    },
                )),
                _ => {
                    // non-integer values at a memory path fall back to floats
                    let float = n.as_f64().unwrap_or(0.0);
                    container.push(DataRecord::new(path, MetricValue::Float(float)));
                }
            },
            Value::String(s) => {
                container.push(DataRecord::new(path, MetricValue::Text(s.clone())));
            }
            Value::Array(items) => self.classify_list(path, items, container),
            Value::Object(map) if !map.is_empty() => self.walk(path, map, container),
            _ => unidentified(container),
        }
    }

    fn classify_list(&self, path: &str, items: &[Value], container: &mut DataContainer) {
        if self.is_gc_type(path) {
            let mut pauses = Vec::with_capacity(items.len());
            for item in items {
                match item.as_u64() {
                    Some(v) => pauses.push(v),
                    None => {
                        unidentified(container);
                        return;
                    }
                }
            }
            pauses.retain(|v| *v != 0);
            let count = pauses.len();
            container.push(DataRecord::new(path, MetricValue::GcList(pauses)));
            container.push(DataRecord::new(
                format!("{}_count", path),
                MetricValue::Float(count as f64),
            ));
            return;
        }

        let mut floats = Vec::with_capacity(items.len());
        for item in items {
            match item.as_f64() {
                Some(v) => floats.push(v),
                None => {
                    unidentified(container);
                    return;
                }
            }
        }
        container.push(DataRecord::new(path, MetricValue::FloatList(floats)));
    }
}

fn unidentified(container: &mut DataContainer) {
    metrics::registry().unidentified_json.inc();
    container.set_error(ContainerError::UnidentifiedField);
}

/// Builds the typed payload for one read result.
///
/// Malformed JSON yields an empty container with the error bit set;
/// well-formed regions always make it into the output.
pub fn job_result_data_types(content: &[u8], mapper: &Mapper) -> DataContainer {
    let mut container = DataContainer::new();
    let parsed: Value = match serde_json::from_slice(content) {
        Ok(v) => v,
        Err(_) => {
            container.set_error(ContainerError::InvalidJson);
            return container;
        }
    };
    match parsed {
        Value::Object(map) => mapper.walk("", &map, &mut container),
        _ => unidentified(&mut container),
    }
    container
}
