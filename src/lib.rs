//! colmap-flow - batch orchestration for COLMAP photogrammetry workflows

pub mod assets;
pub mod batch;
pub mod compiler;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod exec_log;
pub mod image_list;
pub mod summary;
pub mod workflow;
pub mod workspace;

pub use assets::{AssetKind, AssetPaths};
pub use batch::{BatchReport, BatchRunner, WorkflowOutcome};
pub use compiler::{compile, CompiledCommand, InjectionRule};
pub use config::Settings;
pub use context::{ExecutionContext, ImageSource};
pub use engine::{Engine, RunReport};
pub use error::{FixSuggestion, FlowError, Result};
pub use exec_log::{ExecutionLog, LogRecord};
pub use summary::{ColumnFilter, Summary};
pub use workflow::{StageParams, StageSpec, Workflow};
pub use workspace::WorkspaceMode;
