//! YAML bootstrap configuration.
//!
//! The configuration file declares readers, recorders and the routes
//! between them. Loading materializes the instances and the route table;
//! anything a route does not reference is skipped entirely. Structure
//! problems surface before any component is built, so a bad file never
//! half-starts the pipeline.
//!
//! ```yaml
//! settings:
//!   log_level: info
//! readers:
//!   app_0:
//!     type: expvar
//!     endpoint: http://localhost:1234
//!     routepath: /debug/vars
//!     interval: 500ms
//!     timeout: 3s
//!     backoff: 10
//! recorders:
//!   elastic_0:
//!     type: elasticsearch
//!     endpoint: http://localhost:9200
//!     index_name: expipe
//!     timeout: 8s
//!     backoff: 10
//! routes:
//!   route1:
//!     readers: [app_0]
//!     recorders: [elastic_0]
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::expipe::datatype::{Mapper, MappingError};
use crate::expipe::reader::expvar::{ExpvarReader, ExpvarReaderConfig};
use crate::expipe::reader::self_reader::{SelfReader, SelfReaderConfig};
use crate::expipe::reader::{DataReader, ReaderError};
use crate::expipe::recorder::elasticsearch::{ElasticsearchConfig, ElasticsearchRecorder};
use crate::expipe::recorder::{DataRecorder, RecorderError};
use crate::expipe::routes::RouteTable;

const READER_EXPVAR: &str = "expvar";
const READER_SELF: &str = "self";
const RECORDER_ELASTICSEARCH: &str = "elasticsearch";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file is empty")]
    EmptyConfig,

    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("{section}: {message}")]
    Structure { section: String, message: String },

    #[error("routes: {section}: {message}")]
    Routers { section: String, message: String },

    #[error("not supported: {kind}")]
    NotSupported { kind: String },

    #[error("parse timeout ({field}): {value}")]
    ParseTimeout { field: String, value: String },

    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error(transparent)]
    Reader(#[from] ReaderError),

    #[error(transparent)]
    Recorder(#[from] RecorderError),
}

impl ConfigError {
    fn structure(section: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigError::Structure {
            section: section.into(),
            message: message.into(),
        }
    }

    fn routers(section: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigError::Routers {
            section: section.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct FileConfig {
    settings: Option<SettingsSection>,
    readers: Option<BTreeMap<String, ReaderSection>>,
    recorders: Option<BTreeMap<String, RecorderSection>>,
    routes: Option<BTreeMap<String, RouteSection>>,
}

#[derive(Debug, Deserialize)]
struct SettingsSection {
    log_level: Option<String>,
    /// Optional mapping file with `gc_types` / `memory_bytes`, resolved
    /// relative to the configuration file.
    map_file: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReaderSection {
    #[serde(rename = "type")]
    kind: String,
    type_name: Option<String>,
    endpoint: Option<String>,
    routepath: Option<String>,
    interval: Option<String>,
    timeout: Option<String>,
    backoff: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RecorderSection {
    #[serde(rename = "type")]
    kind: String,
    endpoint: Option<String>,
    index_name: Option<String>,
    timeout: Option<String>,
    backoff: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RouteSection {
    readers: Option<serde_yaml::Value>,
    recorders: Option<serde_yaml::Value>,
}

/// Everything the binary needs to run the engine.
pub struct Bootstrap {
    pub readers: Vec<Arc<dyn DataReader>>,
    pub recorders: Vec<Arc<dyn DataRecorder>>,
    pub routes: RouteTable,
    pub log_level: log::LevelFilter,
}

impl std::fmt::Debug for Bootstrap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bootstrap")
            .field("readers", &self.readers.len())
            .field("recorders", &self.recorders.len())
            .field("routes", &self.routes)
            .field("log_level", &self.log_level)
            .finish()
    }
}

/// Loads and materializes a configuration file.
pub fn from_file(path: &Path) -> Result<Bootstrap, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    from_yaml_str(&contents, base_dir)
}

/// Loads a configuration document. `base_dir` anchors relative paths such
/// as `settings.map_file`.
pub fn from_yaml_str(contents: &str, base_dir: &Path) -> Result<Bootstrap, ConfigError> {
    let value: serde_yaml::Value = serde_yaml::from_str(contents)?;
    if value.is_null() {
        return Err(ConfigError::EmptyConfig);
    }
    let config: FileConfig = serde_yaml::from_value(value)?;

    let settings = config.settings.unwrap_or(SettingsSection {
        log_level: None,
        map_file: None,
    });
    let log_level = parse_log_level(settings.log_level.as_deref())?;
    let mapper = match settings.map_file {
        Some(map_file) => Mapper::from_file(&base_dir.join(map_file))?,
        None => Mapper::default(),
    };

    let readers = config
        .readers
        .filter(|readers| !readers.is_empty())
        .ok_or_else(|| ConfigError::structure("readers", "section is missing"))?;
    let recorders = config
        .recorders
        .filter(|recorders| !recorders.is_empty())
        .ok_or_else(|| ConfigError::structure("recorders", "section is missing"))?;
    let route_sections = config
        .routes
        .filter(|routes| !routes.is_empty())
        .ok_or_else(|| ConfigError::structure("routes", "section is missing"))?;

    // validate every declared type up front
    for (name, section) in &readers {
        match section.kind.as_str() {
            READER_EXPVAR | READER_SELF => {}
            "" => return Err(ConfigError::structure(name.clone(), "type is missing")),
            other => {
                return Err(ConfigError::NotSupported {
                    kind: other.to_string(),
                })
            }
        }
    }
    for (name, section) in &recorders {
        match section.kind.as_str() {
            RECORDER_ELASTICSEARCH => {}
            "" => return Err(ConfigError::structure(name.clone(), "type is missing")),
            other => {
                return Err(ConfigError::NotSupported {
                    kind: other.to_string(),
                })
            }
        }
    }

    // resolve the routes and cross-check them against the declarations
    let mut routes = RouteTable::new();
    for (route_name, section) in &route_sections {
        let route_readers = route_list(route_name, "readers", section.readers.as_ref())?;
        let route_recorders = route_list(route_name, "recorders", section.recorders.as_ref())?;
        for reader in &route_readers {
            if !readers.contains_key(reader) {
                return Err(ConfigError::routers(
                    "routers",
                    format!("{} not in readers", reader),
                ));
            }
        }
        for recorder in &route_recorders {
            if !recorders.contains_key(recorder) {
                return Err(ConfigError::routers(
                    "routers",
                    format!("{} not in recorders", recorder),
                ));
            }
        }
        for reader in &route_readers {
            for recorder in &route_recorders {
                routes.add(reader.clone(), recorder.clone());
            }
        }
    }

    // materialize only what the routes reference
    let mut reader_instances: Vec<Arc<dyn DataReader>> = Vec::new();
    for (name, section) in &readers {
        if !routes.contains_reader(name) {
            continue;
        }
        reader_instances.push(build_reader(name, section, &mapper)?);
    }
    let mut recorder_instances: Vec<Arc<dyn DataRecorder>> = Vec::new();
    for (name, section) in &recorders {
        if !routes.contains_recorder(name) {
            continue;
        }
        recorder_instances.push(build_recorder(name, section)?);
    }

    Ok(Bootstrap {
        readers: reader_instances,
        recorders: recorder_instances,
        routes,
        log_level,
    })
}

fn parse_log_level(level: Option<&str>) -> Result<log::LevelFilter, ConfigError> {
    match level {
        None => Ok(log::LevelFilter::Info),
        Some("debug") => Ok(log::LevelFilter::Debug),
        Some("info") => Ok(log::LevelFilter::Info),
        Some("warn") => Ok(log::LevelFilter::Warn),
        Some("error") => Ok(log::LevelFilter::Error),
        Some(other) => Err(ConfigError::structure(
            "settings.log_level",
            format!("unknown level: {}", other),
        )),
    }
}

/// Parses duration strings like `500ms`, `30s`, `5m` or `1h`. A bare
/// number is taken as seconds.
pub fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim().to_lowercase();
    if value.is_empty() {
        return None;
    }
    if value == "0" {
        return Some(Duration::ZERO);
    }
    let (number_part, unit_part) = match value.find(|c: char| c.is_alphabetic()) {
        Some(pos) => (&value[..pos], &value[pos..]),
        None => (value.as_str(), "s"),
    };
    let number: f64 = number_part.parse().ok()?;
    if number < 0.0 {
        return None;
    }
    match unit_part {
        "ms" => Some(Duration::from_millis(number as u64)),
        "s" | "sec" => Some(Duration::from_secs_f64(number)),
        "m" | "min" => Some(Duration::from_secs_f64(number * 60.0)),
        "h" | "hr" => Some(Duration::from_secs_f64(number * 3600.0)),
        _ => None,
    }
}

fn required_duration(
    section: &str,
    field: &str,
    value: Option<&String>,
) -> Result<Duration, ConfigError> {
    let value = value.ok_or_else(|| {
        ConfigError::structure(section.to_string(), format!("{} is required", field))
    })?;
    parse_duration(value).ok_or_else(|| ConfigError::ParseTimeout {
        field: format!("{}.{}", section, field),
        value: value.clone(),
    })
}

fn route_list(
    route_name: &str,
    field: &str,
    value: Option<&serde_yaml::Value>,
) -> Result<Vec<String>, ConfigError> {
    let value =
        value.ok_or_else(|| ConfigError::routers(field, format!("is missing in {}", route_name)))?;
    let items: Vec<String> = match value {
        serde_yaml::Value::Sequence(seq) => {
            let mut items = Vec::with_capacity(seq.len());
            for item in seq {
                match item.as_str() {
                    Some(s) => items.push(s.to_string()),
                    None => {
                        return Err(ConfigError::routers(
                            field,
                            "not an array or single value",
                        ))
                    }
                }
            }
            items
        }
        serde_yaml::Value::String(s) => vec![s.clone()],
        _ => {
            return Err(ConfigError::routers(
                field,
                "not an array or single value",
            ))
        }
    };
    if items.is_empty() {
        return Err(ConfigError::routers(field, "is empty"));
    }
    for item in &items {
        if item.contains(',') {
            return Err(ConfigError::routers(field, "not an array or single value"));
        }
    }
    Ok(items)
}

fn build_reader(
    name: &str,
    section: &ReaderSection,
    mapper: &Mapper,
) -> Result<Arc<dyn DataReader>, ConfigError> {
    let section_path = format!("readers.{}", name);
    let interval = required_duration(&section_path, "interval", section.interval.as_ref())?;
    let timeout = required_duration(&section_path, "timeout", section.timeout.as_ref())?;
    match section.kind.as_str() {
        READER_EXPVAR => {
            let reader = ExpvarReader::new(ExpvarReaderConfig {
                name: name.to_string(),
                type_name: section.type_name.clone(),
                endpoint: section.endpoint.clone().unwrap_or_default(),
                routepath: section.routepath.clone().unwrap_or_default(),
                interval: Some(interval),
                timeout: Some(timeout),
                backoff: section.backoff.unwrap_or(0),
                mapper: Some(mapper.copy()),
            })?;
            Ok(Arc::new(reader))
        }
        READER_SELF => {
            let reader = SelfReader::new(SelfReaderConfig {
                name: name.to_string(),
                type_name: section.type_name.clone(),
                endpoint: section.endpoint.clone(),
                interval: Some(interval),
                timeout: Some(timeout),
                backoff: section.backoff.unwrap_or(0),
                mapper: Some(mapper.copy()),
            })?;
            Ok(Arc::new(reader))
        }
        other => Err(ConfigError::NotSupported {
            kind: other.to_string(),
        }),
    }
}

fn build_recorder(
    name: &str,
    section: &RecorderSection,
) -> Result<Arc<dyn DataRecorder>, ConfigError> {
    let section_path = format!("recorders.{}", name);
    let timeout = required_duration(&section_path, "timeout", section.timeout.as_ref())?;
    match section.kind.as_str() {
        RECORDER_ELASTICSEARCH => {
            let recorder = ElasticsearchRecorder::new(ElasticsearchConfig {
                name: name.to_string(),
                endpoint: section.endpoint.clone().unwrap_or_default(),
                index_name: section.index_name.clone().unwrap_or_default(),
                timeout: Some(timeout),
                backoff: section.backoff.unwrap_or(0),
            })?;
            Ok(Arc::new(recorder))
        }
        other => Err(ConfigError::NotSupported {
            kind: other.to_string(),
        }),
    }
}
