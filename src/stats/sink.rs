//! Tabular destinations for collected stat rows.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::info;

use super::StatGroup;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to create stat file {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("failed to write row for {group}: {source}")]
    Write {
        group: String,
        #[source]
        source: csv::Error,
    },

    #[error("failed to flush stat files: {0}")]
    Flush(#[from] std::io::Error),

    #[error("no stat file open for group {0}")]
    UnknownGroup(String),
}

/// Receives one row per stat group per collection cycle.
pub trait StatSink: Send {
    fn append(&mut self, group: &str, row: &[Value]) -> Result<(), SinkError>;
}

/// CSV file naming for [`CsvSink`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvOptions {
    /// Directory the files are created in.
    pub dir: PathBuf,
    /// Prepended to every file name, e.g. `nightly_HTTPClient.csv`.
    pub prefix: Option<String>,
    /// Append `_HHMMSS` so reruns do not overwrite earlier files.
    pub timestamp: bool,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            prefix: None,
            timestamp: false,
        }
    }
}

impl CsvOptions {
    pub fn file_name(&self, group: &str, now: DateTime<Local>) -> String {
        let mut name = match &self.prefix {
            Some(prefix) => format!("{}_{}", prefix, group),
            None => group.to_string(),
        };
        if self.timestamp {
            name.push('_');
            name.push_str(&now.format("%H%M%S").to_string());
        }
        name.push_str(".csv");
        name
    }
}

/// One CSV file per stat group, header row of metric names.
///
/// Rows hold only the metrics found in the bucket, so a row can be shorter
/// than the header when the gateway omits a metric.
pub struct CsvSink {
    writers: HashMap<String, csv::Writer<File>>,
    files: Vec<(String, PathBuf)>,
}

impl CsvSink {
    pub fn create(groups: &[StatGroup], options: &CsvOptions) -> Result<Self, SinkError> {
        let now = Local::now();
        let mut writers = HashMap::new();
        let mut files = Vec::new();

        for group in groups {
            let path = options.dir.join(options.file_name(&group.name, now));
            let mut writer = csv::WriterBuilder::new()
                .flexible(true)
                .from_path(&path)
                .map_err(|source| SinkError::Create {
                    path: path.clone(),
                    source,
                })?;
            writer
                .write_record(&group.metrics)
                .map_err(|source| SinkError::Write {
                    group: group.name.clone(),
                    source,
                })?;
            writer.flush()?;
            info!(group = %group.name, path = %path.display(), "recording stats to csv");
            writers.insert(group.name.clone(), writer);
            files.push((group.name.clone(), path));
        }

        Ok(Self { writers, files })
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.files.iter().map(|(_, p)| p.as_path())
    }

    pub fn path_for(&self, group: &str) -> Option<&Path> {
        self.files
            .iter()
            .find(|(name, _)| name == group)
            .map(|(_, p)| p.as_path())
    }
}

impl StatSink for CsvSink {
    fn append(&mut self, group: &str, row: &[Value]) -> Result<(), SinkError> {
        let writer = self
            .writers
            .get_mut(group)
            .ok_or_else(|| SinkError::UnknownGroup(group.to_string()))?;
        writer
            .write_record(row.iter().map(cell))
            .map_err(|source| SinkError::Write {
                group: group.to_string(),
                source,
            })?;
        // Flush per row so an interrupted run still leaves complete files.
        writer.flush()?;
        Ok(())
    }
}

fn cell(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
