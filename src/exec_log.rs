//! Execution log of a workflow run
//!
//! A single JSON document per workspace (`log.json`): an array with one
//! record per completed stage, in execution order.
//!
//! ```json
//! [{"command": "colmap mapper ...", "elapsed_time": 12.5, "output": "..."}]
//! ```
//!
//! The document is rewritten after every completed stage through a temp file
//! and a rename, so the file on disk always holds the last checkpoint.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{FlowError, Result};

/// Telemetry time series sampled while a stage ran: `column -> timestamp -> value`
pub type Telemetry = BTreeMap<String, BTreeMap<String, Value>>;

/// One completed stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub command: String,
    /// Wall-clock seconds
    pub elapsed_time: f64,
    #[serde(default)]
    pub output: String,
    #[serde(default, alias = "jetson_stats", skip_serializing_if = "Option::is_none")]
    pub telemetry: Option<Telemetry>,
}

impl LogRecord {
    pub fn new(command: impl Into<String>, elapsed_time: f64, output: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            elapsed_time,
            output: output.into(),
            telemetry: None,
        }
    }
}

/// On-disk entry, including the older `{"<command>": <seconds>}` form
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredRecord {
    Full(LogRecord),
    Legacy(BTreeMap<String, f64>),
}

/// Ordered, persisted list of [`LogRecord`]s
#[derive(Debug, Clone)]
pub struct ExecutionLog {
    path: PathBuf,
    records: Vec<LogRecord>,
}

impl ExecutionLog {
    /// Write an empty log at `path`
    pub fn create(path: &Path) -> Result<Self> {
        let log = Self {
            path: path.to_path_buf(),
            records: Vec::new(),
        };
        log.persist()?;
        Ok(log)
    }

    /// Read an existing log
    pub fn open(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(FlowError::LogNotFound {
                path: path.to_path_buf(),
            });
        }
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            return Err(FlowError::LogNotJson {
                path: path.to_path_buf(),
            });
        }

        let content = fs::read_to_string(path)?;
        let records = parse_records(&content)?;
        debug!(path = %path.display(), records = records.len(), "opened execution log");

        Ok(Self {
            path: path.to_path_buf(),
            records,
        })
    }

    /// Append a record and persist the whole document
    pub fn append(&mut self, record: LogRecord) -> Result<()> {
        self.records.push(record);
        if let Err(e) = self.persist() {
            self.records.pop();
            return Err(e);
        }
        Ok(())
    }

    pub fn records(&self) -> &[LogRecord] {
        &self.records
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Sum of recorded stage durations in seconds
    pub fn total_seconds(&self) -> f64 {
        self.records.iter().map(|r| r.elapsed_time).sum()
    }

    fn persist(&self) -> Result<()> {
        let bytes = serde_json::to_vec(&self.records)?;
        let temp_path = self.path.with_extension("json.tmp");

        let mut file = fs::File::create(&temp_path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        drop(file);

        if let Err(e) = fs::rename(&temp_path, &self.path) {
            let _ = fs::remove_file(&temp_path);
            return Err(e.into());
        }
        Ok(())
    }
}

/// Parse a log document, accepting both record shapes
pub fn parse_records(content: &str) -> Result<Vec<LogRecord>> {
    let stored: Vec<StoredRecord> = serde_json::from_str(content)?;
    Ok(stored
        .into_iter()
        .flat_map(|entry| match entry {
            StoredRecord::Full(record) => vec![record],
            StoredRecord::Legacy(map) => map
                .into_iter()
                .map(|(command, seconds)| LogRecord::new(command, seconds, ""))
                .collect(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn create_writes_empty_array() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("log.json");
        let log = ExecutionLog::create(&path).unwrap();
        assert!(log.is_empty());
        assert_eq!(fs::read_to_string(&path).unwrap(), "[]");
    }

    #[test]
    fn append_persists_each_record() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("log.json");
        let mut log = ExecutionLog::create(&path).unwrap();

        log.append(LogRecord::new("colmap feature_extractor", 1.5, "done\n"))
            .unwrap();
        assert_eq!(ExecutionLog::open(&path).unwrap().len(), 1);

        log.append(LogRecord::new("colmap exhaustive_matcher", 2.0, ""))
            .unwrap();
        let reopened = ExecutionLog::open(&path).unwrap();
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.records()[0].command, "colmap feature_extractor");
        assert_eq!(reopened.records()[0].output, "done\n");
        assert_eq!(reopened.total_seconds(), 3.5);
        assert!(!temp.path().join("log.json.tmp").exists());
    }

    #[test]
    fn record_shape_on_disk() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("log.json");
        let mut log = ExecutionLog::create(&path).unwrap();
        log.append(LogRecord::new("colmap mapper", 4.0, "ok")).unwrap();

        let doc: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(
            doc,
            json!([{"command": "colmap mapper", "elapsed_time": 4.0, "output": "ok"}])
        );
    }

    #[test]
    fn reads_legacy_entries() {
        let records = parse_records(r#"[{"colmap mapper --database_path db": 12.5}]"#).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].command, "colmap mapper --database_path db");
        assert_eq!(records[0].elapsed_time, 12.5);
        assert!(records[0].output.is_empty());
    }

    #[test]
    fn reads_jetson_stats_as_telemetry() {
        let records = parse_records(
            r#"[{"command": "c", "elapsed_time": 1.0, "output": "",
                 "jetson_stats": {"GPU": {"1700000000.0": 40, "1700000001.0": 60}}}]"#,
        )
        .unwrap();
        let telemetry = records[0].telemetry.as_ref().unwrap();
        assert_eq!(telemetry["GPU"].len(), 2);
    }

    #[test]
    fn open_rejects_non_json_extension() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("log.txt");
        fs::write(&path, "[]").unwrap();
        assert!(matches!(
            ExecutionLog::open(&path),
            Err(FlowError::LogNotJson { .. })
        ));
    }

    #[test]
    fn open_rejects_missing_file() {
        let temp = tempdir().unwrap();
        assert!(matches!(
            ExecutionLog::open(&temp.path().join("log.json")),
            Err(FlowError::LogNotFound { .. })
        ));
    }

    #[test]
    fn open_rejects_malformed_document() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("log.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            ExecutionLog::open(&path),
            Err(FlowError::LogFormat(_))
        ));
    }
}
