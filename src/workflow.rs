//! Workflow parsing structures
//!
//! A workflow file is an ordered YAML list of single-key mappings:
//!
//! ```yaml
//! - feature_extractor:
//!     ImageReader.single_camera: 1
//! - exhaustive_matcher: {}
//! ```
//!
//! The key is the COLMAP stage name, the value holds the explicit
//! parameters for that stage. Order is preserved everywhere.

use std::fmt;
use std::path::Path;

use serde_yaml::Value;

use crate::error::{FlowError, Result};

/// Ordered `name -> value` parameters of a single stage
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageParams {
    entries: Vec<(String, String)>,
}

impl StageParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a parameter. An existing key keeps its position, a new key is appended.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for StageParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = StageParams::new();
        for (k, v) in iter {
            params.set(k, v);
        }
        params
    }
}

/// One stage of the pipeline: a COLMAP subcommand plus its explicit parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSpec {
    pub name: String,
    pub params: StageParams,
}

impl StageSpec {
    pub fn new(name: impl Into<String>, params: StageParams) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }
}

/// Ordered list of stages parsed from a workflow file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Workflow {
    pub stages: Vec<StageSpec>,
}

impl Workflow {
    pub fn new(stages: Vec<StageSpec>) -> Self {
        Self { stages }
    }

    /// Read and parse a workflow file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(FlowError::WorkflowNotFound {
                path: path.to_path_buf(),
            });
        }
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml(&yaml)
    }

    /// Parse workflow YAML, validating the single-key shape of every entry
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let root: Value = serde_yaml::from_str(yaml)?;
        let items = match root {
            Value::Sequence(items) => items,
            Value::Null => Vec::new(),
            other => {
                return Err(FlowError::NotAStageList {
                    found: value_kind(&other).to_string(),
                })
            }
        };

        let stages = items
            .into_iter()
            .enumerate()
            .map(|(index, item)| parse_stage(index, item))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { stages })
    }

    /// Workflow name derived from its file name (`sift_dense.yaml` -> `sift_dense`)
    pub fn name_from_path(path: &Path) -> String {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("workflow");
        file_name
            .strip_suffix(".yaml")
            .or_else(|| file_name.strip_suffix(".yml"))
            .unwrap_or(file_name)
            .to_string()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

fn parse_stage(index: usize, item: Value) -> Result<StageSpec> {
    let invalid = |reason: String| FlowError::InvalidStageEntry { index, reason };

    let mapping = match item {
        Value::Mapping(mapping) => mapping,
        other => {
            return Err(invalid(format!(
                "expected a mapping, got {}",
                value_kind(&other)
            )))
        }
    };

    if mapping.len() != 1 {
        return Err(invalid(format!(
            "expected exactly one stage name, found {} keys",
            mapping.len()
        )));
    }

    let Some((key, value)) = mapping.into_iter().next() else {
        return Err(invalid("empty entry".to_string()));
    };

    let name = match key {
        Value::String(name) if !name.trim().is_empty() => name,
        other => {
            return Err(invalid(format!(
                "stage name must be a non-empty string, got {}",
                value_kind(&other)
            )))
        }
    };

    let params = match value {
        Value::Null => StageParams::new(),
        Value::Mapping(raw) => {
            let mut params = StageParams::new();
            for (k, v) in raw {
                let key = scalar_to_string(&k).ok_or_else(|| {
                    invalid(format!("parameter names of '{}' must be scalars", name))
                })?;
                // A bare `key:` is passed as an empty value
                let value = match &v {
                    Value::Null => Some(String::new()),
                    other => scalar_to_string(other),
                }
                .ok_or_else(|| {
                    invalid(format!(
                        "parameter '{}' of '{}' must be a scalar, got {}",
                        key,
                        name,
                        value_kind(&v)
                    ))
                })?;
                params.set(key, value);
            }
            params
        }
        other => {
            return Err(invalid(format!(
                "parameters of '{}' must be a mapping, got {}",
                name,
                value_kind(&other)
            )))
        }
    };

    Ok(StageSpec { name, params })
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a list",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

impl fmt::Display for StageSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} params)", self.name, self.params.len())
    }
}
