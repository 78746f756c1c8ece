//! Error types with fix suggestions
//!
//! Error code ranges:
//! - FLOW-000-009: Workflow file errors
//! - FLOW-010-019: Workspace errors
//! - FLOW-020-029: Image source / asset errors
//! - FLOW-030-039: Execution errors
//! - FLOW-040-049: Execution log errors
//! - FLOW-050-059: Config errors

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, FlowError>;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

#[derive(Error, Debug)]
pub enum FlowError {
    // ─────────────────────────────────────────────────────────────
    // Workflow file (FLOW-000 to FLOW-009)
    // ─────────────────────────────────────────────────────────────
    #[error("[FLOW-001] YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("[FLOW-002] Workflow must be a list of stages, got {found}")]
    NotAStageList { found: String },

    #[error("[FLOW-003] Invalid stage entry #{index}: {reason}")]
    InvalidStageEntry { index: usize, reason: String },

    #[error("[FLOW-004] Workflow file not found: {path}")]
    WorkflowNotFound { path: PathBuf },

    // ─────────────────────────────────────────────────────────────
    // Workspace (FLOW-010 to FLOW-019)
    // ─────────────────────────────────────────────────────────────
    #[error("[FLOW-010] --overwrite and --resume cannot be used together")]
    ConflictingFlags,

    #[error("[FLOW-011] Output folder already exists and won't be overwritten: {path}")]
    WorkspaceExists { path: PathBuf },

    #[error("[FLOW-012] There's nothing to resume from: {path}")]
    NothingToResume { path: PathBuf },

    #[error("[FLOW-013] Workspace is missing '{missing}': {path}")]
    IncompleteWorkspace { path: PathBuf, missing: String },

    #[error("[FLOW-014] Not a directory: {path}")]
    NotADirectory { path: PathBuf },

    // ─────────────────────────────────────────────────────────────
    // Image source / assets (FLOW-020 to FLOW-029)
    // ─────────────────────────────────────────────────────────────
    #[error("[FLOW-020] Image source not found: {path}")]
    ImageSourceNotFound { path: PathBuf },

    #[error("[FLOW-021] Image source is neither a directory nor an image list: {path}")]
    InvalidImageSource { path: PathBuf },

    #[error("[FLOW-022] Image list line {line}: '{path}' is not an absolute path")]
    RelativeImagePath { line: usize, path: String },

    #[error("[FLOW-023] Image list line {line}: '{path}' does not exist")]
    MissingImage { line: usize, path: String },

    #[error("[FLOW-024] Image list contains '{name}' more than once")]
    DuplicateImageName { name: String },

    #[error("[FLOW-025] Asset '{asset}' not found: {path}")]
    AssetNotFound { asset: &'static str, path: PathBuf },

    // ─────────────────────────────────────────────────────────────
    // Execution (FLOW-030 to FLOW-039)
    // ─────────────────────────────────────────────────────────────
    #[error("[FLOW-030] Command failed with {}: {command}", describe_exit(.exit_code))]
    CommandFailed {
        command: String,
        exit_code: Option<i32>,
    },

    #[error("[FLOW-031] Failed to launch '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("[FLOW-032] Log record #{index} does not match the workflow: logged '{logged}', compiled '{compiled}'")]
    ResumeMismatch {
        index: usize,
        logged: String,
        compiled: String,
    },

    // ─────────────────────────────────────────────────────────────
    // Execution log (FLOW-040 to FLOW-049)
    // ─────────────────────────────────────────────────────────────
    #[error("[FLOW-040] Execution log not found: {path}")]
    LogNotFound { path: PathBuf },

    #[error("[FLOW-041] Execution log must be a .json file: {path}")]
    LogNotJson { path: PathBuf },

    #[error("[FLOW-042] Malformed execution log: {0}")]
    LogFormat(#[from] serde_json::Error),

    #[error("[FLOW-043] Unknown telemetry column '{column}'")]
    UnknownColumn { column: String },

    // ─────────────────────────────────────────────────────────────
    // Config (FLOW-050 to FLOW-059)
    // ─────────────────────────────────────────────────────────────
    #[error("[FLOW-050] Config error: {reason}")]
    ConfigError { reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "termination by signal".to_string(),
    }
}

impl FlowError {
    /// True for errors raised before any external command is dispatched
    pub fn is_precondition(&self) -> bool {
        !matches!(
            self,
            FlowError::CommandFailed { .. } | FlowError::Spawn { .. } | FlowError::Io(_)
        )
    }
}

impl FixSuggestion for FlowError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            FlowError::YamlParse(_) => Some("Check YAML syntax: indentation and quoting"),
            FlowError::NotAStageList { .. } => {
                Some("Write the workflow as a list: `- feature_extractor: {...}`")
            }
            FlowError::InvalidStageEntry { .. } => {
                Some("Each list item needs exactly one stage name mapping to its parameters")
            }
            FlowError::WorkflowNotFound { .. } => Some("Check the workflow file path"),
            FlowError::ConflictingFlags => Some("Pick either --overwrite or --resume"),
            FlowError::WorkspaceExists { .. } => {
                Some("Pass --overwrite to start over or --resume to continue")
            }
            FlowError::NothingToResume { .. } => Some("Drop --resume to start a fresh run"),
            FlowError::IncompleteWorkspace { .. } => {
                Some("The folder was not created by colmap-flow; use --overwrite")
            }
            FlowError::NotADirectory { .. } => Some("Pass a directory path"),
            FlowError::ImageSourceNotFound { .. } => Some("Check --image-path"),
            FlowError::InvalidImageSource { .. } => {
                Some("Use an image folder or a .txt/.list/.lst file of absolute paths")
            }
            FlowError::RelativeImagePath { .. } => {
                Some("List every image with its absolute path")
            }
            FlowError::MissingImage { .. } => Some("Remove the entry or fix the path"),
            FlowError::DuplicateImageName { .. } => {
                Some("Images are linked by file name; rename one of them")
            }
            FlowError::AssetNotFound { .. } => Some("Point the flag at an existing file"),
            FlowError::CommandFailed { .. } => {
                Some("Inspect the stage output above, fix the workflow and rerun with --resume")
            }
            FlowError::Spawn { .. } => Some("Check --colmap-path points at the COLMAP binary"),
            FlowError::ResumeMismatch { .. } => {
                Some("The workflow changed since the last run; use --overwrite")
            }
            FlowError::LogNotFound { .. } => Some("Check the log path"),
            FlowError::LogNotJson { .. } => Some("Pass the workspace's log.json"),
            FlowError::LogFormat(_) => Some("The log file is not valid JSON"),
            FlowError::UnknownColumn { .. } => {
                Some("Run without --columns to list the available columns")
            }
            FlowError::ConfigError { .. } => Some("Check ~/.config/colmap-flow/config.toml"),
            FlowError::Io(_) => Some("Check file path and permissions"),
        }
    }
}
