//! Execution log summary
//!
//! Per-stage duration and per-column telemetry means, the telemetry columns
//! seen in the log, and the total run time.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

use crate::error::{FlowError, Result};
use crate::exec_log::LogRecord;

/// Which telemetry columns to report
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ColumnFilter {
    #[default]
    All,
    Only(Vec<String>),
}

impl ColumnFilter {
    /// Parse `all` or a comma-separated column list
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() || raw == "all" {
            return ColumnFilter::All;
        }
        ColumnFilter::Only(
            raw.split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    fn allows(&self, column: &str) -> bool {
        match self {
            ColumnFilter::All => true,
            ColumnFilter::Only(columns) => columns.iter().any(|c| c == column),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StageSummary {
    pub command: String,
    pub elapsed_seconds: f64,
    /// Mean of each reported column; `None` if the stage had no telemetry
    pub means: Option<BTreeMap<String, f64>>,
}

impl StageSummary {
    pub fn minutes(&self) -> f64 {
        self.elapsed_seconds / 60.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub stages: Vec<StageSummary>,
    /// Every telemetry column present in the log
    pub columns: Vec<String>,
    pub total_seconds: f64,
}

impl Summary {
    pub fn from_records(records: &[LogRecord], filter: &ColumnFilter) -> Result<Self> {
        let mut columns: Vec<String> = records
            .iter()
            .filter_map(|r| r.telemetry.as_ref())
            .flat_map(|t| t.keys().cloned())
            .collect();
        columns.sort();
        columns.dedup();

        if let ColumnFilter::Only(requested) = filter {
            if let Some(unknown) = requested.iter().find(|c| !columns.contains(c)) {
                return Err(FlowError::UnknownColumn {
                    column: unknown.clone(),
                });
            }
        }

        let stages = records
            .iter()
            .map(|record| StageSummary {
                command: record.command.clone(),
                elapsed_seconds: record.elapsed_time,
                means: record.telemetry.as_ref().map(|telemetry| {
                    telemetry
                        .iter()
                        .filter(|(column, _)| filter.allows(column))
                        .filter_map(|(column, series)| {
                            mean(series.values()).map(|m| (column.clone(), m))
                        })
                        .collect()
                }),
            })
            .collect();

        Ok(Self {
            stages,
            columns,
            total_seconds: records.iter().map(|r| r.elapsed_time).sum(),
        })
    }

    pub fn total_hours(&self) -> f64 {
        self.total_seconds / 3600.0
    }
}

/// Mean of the numeric samples; non-numeric samples are ignored
fn mean<'a>(values: impl Iterator<Item = &'a Value>) -> Option<f64> {
    let (sum, count) = values
        .filter_map(Value::as_f64)
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(40);
        for stage in &self.stages {
            writeln!(f, "{}", rule)?;
            writeln!(f, "Command: {}", stage.command)?;
            writeln!(f, "Time elapsed: {:.2} minutes", stage.minutes())?;
            writeln!(f, "{}", rule)?;
            match &stage.means {
                Some(means) if !means.is_empty() => {
                    let width = means.keys().map(String::len).max().unwrap_or(0);
                    for (column, value) in means {
                        writeln!(f, "{:<width$}  {:.3}", column, value, width = width)?;
                    }
                }
                Some(_) => writeln!(f, "(no numeric telemetry)")?,
                None => writeln!(f, "(no telemetry recorded)")?,
            }
            writeln!(f, "{}", rule)?;
            writeln!(f)?;
        }

        writeln!(f, "List of all telemetry columns:")?;
        for column in &self.columns {
            writeln!(f, "- {}", column)?;
        }
        writeln!(f)?;
        write!(f, "Total time in hours was: {:.4}", self.total_hours())
    }
}
