//! Batch runner
//!
//! Runs every workflow file of a folder against the same images, each into
//! its own workspace named after the file. A failing workflow is reported and
//! the batch moves on to the next one.

use std::path::{Path, PathBuf};

use colored::Colorize;
use tracing::{error, info, instrument};

use crate::assets::AssetPaths;
use crate::compiler;
use crate::context::{ExecutionContext, ImageSource};
use crate::engine::{Engine, RunReport};
use crate::error::{FlowError, Result};
use crate::exec_log::ExecutionLog;
use crate::workflow::Workflow;
use crate::workspace::{self, WorkspaceMode};

/// Folder inside each workspace that receives staged image-list links
pub const STAGING_DIR: &str = "image_links";

/// Result of one workflow in a batch
#[derive(Debug)]
pub struct WorkflowOutcome {
    pub name: String,
    pub path: PathBuf,
    pub result: Result<RunReport>,
}

impl WorkflowOutcome {
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<WorkflowOutcome>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.succeeded()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }
}

/// Settings shared by every workflow of a batch
#[derive(Debug, Clone)]
pub struct BatchRunner {
    image_source: ImageSource,
    output_root: PathBuf,
    tool_path: String,
    assets: AssetPaths,
    engine: Engine,
}

impl BatchRunner {
    /// Validate the shared inputs of a batch
    pub fn new(image_path: &Path, output_root: &Path, tool_path: impl Into<String>) -> Result<Self> {
        let image_source = ImageSource::detect(image_path)?;
        if !output_root.is_dir() {
            return Err(FlowError::NotADirectory {
                path: output_root.to_path_buf(),
            });
        }
        Ok(Self {
            image_source,
            output_root: output_root.to_path_buf(),
            tool_path: tool_path.into(),
            assets: AssetPaths::default(),
            engine: Engine::new().with_echo(false),
        })
    }

    pub fn with_assets(mut self, assets: AssetPaths) -> Self {
        self.assets = assets;
        self
    }

    pub fn with_echo(mut self, echo: bool) -> Self {
        self.engine = self.engine.with_echo(echo);
        self
    }

    /// Run every workflow in order. Never fails as a whole.
    #[instrument(skip_all, fields(workflows = workflow_paths.len()))]
    pub async fn run_all(&self, workflow_paths: &[PathBuf]) -> BatchReport {
        let mut report = BatchReport::default();

        for path in workflow_paths {
            let name = Workflow::name_from_path(path);
            println!(
                "Running configuration called '{}' found at '{}'",
                name.cyan().bold(),
                path.display()
            );

            let result = self.run_one(&name, path).await;
            match &result {
                Ok(run) => {
                    info!(workflow = %name, stages = run.executed, "workflow completed");
                    println!("{} Completed configuration file {}", "✓".green(), name);
                }
                Err(e) => {
                    error!(workflow = %name, error = %e, "workflow failed");
                    println!(
                        "{} Failed to run the configuration file {} because of {}",
                        "✗".red(),
                        name,
                        e
                    );
                }
            }

            report.outcomes.push(WorkflowOutcome {
                name,
                path: path.clone(),
                result,
            });
        }

        report
    }

    async fn run_one(&self, name: &str, path: &Path) -> Result<RunReport> {
        let workflow = Workflow::load(path)?;
        // The list may have changed since the previous workflow ran
        self.image_source.validate()?;
        let workspace =
            workspace::prepare_with_mode(&self.output_root.join(name), WorkspaceMode::Fresh)?;

        let image_path = self.image_source.resolve(&workspace.join(STAGING_DIR))?;
        let ctx = ExecutionContext::new(image_path, &workspace).with_assets(self.assets.clone());
        let commands = compiler::compile(&workflow, &ctx, &self.tool_path);

        let mut log = ExecutionLog::open(&workspace::log_path(&workspace))?;
        self.engine.run(&commands, &mut log).await
    }
}

/// Workflow files (`*.yaml`, `*.yml`) directly inside `dir`, sorted by path
pub fn discover(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(FlowError::NotADirectory {
            path: dir.to_path_buf(),
        });
    }

    let escaped = glob::Pattern::escape(&dir.to_string_lossy());
    let mut paths = Vec::new();
    for ext in ["yaml", "yml"] {
        let pattern = format!("{}/*.{}", escaped, ext);
        let entries = glob::glob(&pattern).map_err(|e| FlowError::ConfigError {
            reason: format!("invalid workflow pattern '{}': {}", pattern, e),
        })?;
        paths.extend(entries.filter_map(|entry| entry.ok()).filter(|p| p.is_file()));
    }
    paths.sort();
    Ok(paths)
}
