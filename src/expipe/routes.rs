//! The route table: which recorders receive each reader's results.

use std::collections::HashMap;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouteError {
    #[error("unknown reader: {0}")]
    UnknownReader(String),
}

/// Maps each reader name to the recorders that should receive its results.
///
/// Built once at startup. Duplicate recorder names collapse at insertion,
/// keeping the order of first occurrence.
#[derive(Debug, Default, Clone)]
pub struct RouteTable {
    table: HashMap<String, Vec<String>>,
}

impl RouteTable {
    pub fn new() -> Self {
        RouteTable::default()
    }

    /// Adds one reader → recorder association; a repeat is a no-op.
    pub fn add(&mut self, reader: impl Into<String>, recorder: impl Into<String>) {
        let recorders = self.table.entry(reader.into()).or_default();
        let recorder = recorder.into();
        if !recorders.contains(&recorder) {
            recorders.push(recorder);
        }
    }

    /// The recorders routed from `reader`, in first-occurrence order.
    pub fn recorders_for(&self, reader: &str) -> Result<&[String], RouteError> {
        self.table
            .get(reader)
            .map(Vec::as_slice)
            .ok_or_else(|| RouteError::UnknownReader(reader.to_string()))
    }

    pub fn contains_reader(&self, name: &str) -> bool {
        self.table.contains_key(name)
    }

    pub fn contains_recorder(&self, name: &str) -> bool {
        self.table.values().any(|recorders| recorders.iter().any(|r| r == name))
    }

    /// Every reader name that has at least one route.
    pub fn readers(&self) -> impl Iterator<Item = &str> {
        self.table.keys().map(String::as_str)
    }

    /// Every distinct recorder name that appears in a route.
    pub fn recorders(&self) -> impl Iterator<Item = &str> {
        let mut seen: Vec<&str> = Vec::new();
        for recorders in self.table.values() {
            for recorder in recorders {
                if !seen.contains(&recorder.as_str()) {
                    seen.push(recorder);
                }
            }
        }
        seen.into_iter()
    }
}
