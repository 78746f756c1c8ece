//! colmap-flow CLI - run COLMAP workflows and record everything

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use colored::Colorize;

use colmap_flow::batch::{self, BatchRunner, STAGING_DIR};
use colmap_flow::compiler;
use colmap_flow::workspace::{self, WorkspaceMode};
use colmap_flow::{
    AssetKind, AssetPaths, ColumnFilter, Engine, ExecutionContext, ExecutionLog, FixSuggestion,
    FlowError, ImageSource, Settings, Summary, Workflow,
};

#[derive(Parser)]
#[command(name = "colmap-flow")]
#[command(about = "Run COLMAP workflows and record timing and output of every stage")]
#[command(version)]
struct Cli {
    /// Config file (default: ~/.config/colmap-flow/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging (same as RUST_LOG=debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single workflow file
    Run {
        /// Folder with all the images, or a .txt/.list/.lst file of absolute image paths
        #[arg(long, alias = "image_path")]
        image_path: PathBuf,

        /// Workflow YAML file
        #[arg(long, alias = "config_file")]
        config_file: PathBuf,

        /// Where all output will be stored
        #[arg(long, alias = "output_path")]
        output_path: PathBuf,

        /// Overwrite the output folder if it exists
        #[arg(long)]
        overwrite: bool,

        /// Resume a previous run without overwriting
        #[arg(long)]
        resume: bool,

        /// COLMAP executable
        #[arg(long, alias = "colmap_path")]
        colmap_path: Option<String>,

        /// Vocabulary tree for vocab_tree_matcher
        #[arg(long, alias = "vocab_tree_path")]
        vocab_tree_path: Option<PathBuf>,

        /// Image pair list for matches_importer
        #[arg(long, alias = "match_list_path")]
        match_list_path: Option<PathBuf>,

        /// Don't echo stage output
        #[arg(short, long)]
        quiet: bool,
    },

    /// Run every workflow file in a folder, one workspace each
    RunAll {
        /// Folder with all the images, or an image list file
        #[arg(long, alias = "image_path")]
        image_path: PathBuf,

        /// Folder containing the workflow YAML files
        #[arg(long, alias = "input_path")]
        input_path: PathBuf,

        /// Folder receiving one workspace per workflow
        #[arg(long, alias = "output_path")]
        output_path: PathBuf,

        /// COLMAP executable
        #[arg(long, alias = "colmap_path")]
        colmap_path: Option<String>,

        /// Vocabulary tree for vocab_tree_matcher
        #[arg(long, alias = "vocab_tree_path")]
        vocab_tree_path: Option<PathBuf>,

        /// Echo stage output
        #[arg(long)]
        echo: bool,
    },

    /// Pretty print a workflow log
    Summarize {
        /// Path to a log.json file
        #[arg(long, alias = "json_file")]
        json_file: PathBuf,

        /// Comma separated telemetry columns to report, or "all"
        #[arg(long, alias = "jetson", default_value = "all")]
        columns: String,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(default_level.into())
                .from_env_lossy(),
        )
        .init();

    let result = match Settings::load(cli.config.as_deref()) {
        Ok(settings) => dispatch(cli.command, settings.with_env()).await,
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        if let Some(suggestion) = e.fix_suggestion() {
            eprintln!("  {} {}", "Fix:".yellow(), suggestion);
        }
        std::process::exit(1);
    }
}

async fn dispatch(command: Commands, mut settings: Settings) -> Result<(), FlowError> {
    match command {
        Commands::Run {
            image_path,
            config_file,
            output_path,
            overwrite,
            resume,
            colmap_path,
            vocab_tree_path,
            match_list_path,
            quiet,
        } => {
            if let Some(tool) = colmap_path {
                settings.tool_path = tool;
            }
            if vocab_tree_path.is_some() {
                settings.vocab_tree_path = vocab_tree_path;
            }
            if match_list_path.is_some() {
                settings.match_list_path = match_list_path;
            }
            if quiet {
                settings.echo_output = false;
            }
            let mode = WorkspaceMode::from_flags(overwrite, resume)?;
            run_workflow(&image_path, &config_file, &output_path, mode, &settings).await
        }
        Commands::RunAll {
            image_path,
            input_path,
            output_path,
            colmap_path,
            vocab_tree_path,
            echo,
        } => {
            if let Some(tool) = colmap_path {
                settings.tool_path = tool;
            }
            if vocab_tree_path.is_some() {
                settings.vocab_tree_path = vocab_tree_path;
            }
            run_batch(&image_path, &input_path, &output_path, echo, &settings).await
        }
        Commands::Summarize { json_file, columns } => summarize(&json_file, &columns),
    }
}

/// Link user-supplied assets into their well-known locations
fn install_assets(settings: &Settings) -> Result<AssetPaths, FlowError> {
    let assets = settings.assets();
    if let Some(path) = &settings.vocab_tree_path {
        assets.install(AssetKind::VocabTree, path)?;
    }
    if let Some(path) = &settings.match_list_path {
        assets.install(AssetKind::MatchList, path)?;
    }
    Ok(assets)
}

async fn run_workflow(
    image_path: &Path,
    config_file: &Path,
    output_path: &Path,
    mode: WorkspaceMode,
    settings: &Settings,
) -> Result<(), FlowError> {
    // Everything that can be checked up front is checked before the
    // workspace is touched
    let source = ImageSource::detect(image_path)?;
    source.validate()?;
    let workflow = Workflow::load(config_file)?;
    let assets = install_assets(settings)?;

    let workspace = workspace::prepare_with_mode(output_path, mode)?;
    let images = source.resolve(&workspace.join(STAGING_DIR))?;
    let ctx = ExecutionContext::new(images, &workspace).with_assets(assets);
    let commands = compiler::compile(&workflow, &ctx, &settings.tool_path);

    println!(
        "{} {} stages → {}",
        "→".cyan(),
        commands.len(),
        workspace.display().to_string().cyan().bold()
    );

    let mut log = ExecutionLog::open(&workspace::log_path(&workspace))?;
    let report = Engine::new()
        .with_echo(settings.echo_output)
        .run(&commands, &mut log)
        .await?;

    if report.skipped > 0 {
        println!(
            "{} Skipped {} stages already in the log",
            "→".cyan(),
            report.skipped
        );
    }
    println!("{}", "=".repeat(40));
    println!("{}", "All commands run successfully!".green().bold());
    println!("{}", "=".repeat(40));
    Ok(())
}

async fn run_batch(
    image_path: &Path,
    input_path: &Path,
    output_path: &Path,
    echo: bool,
    settings: &Settings,
) -> Result<(), FlowError> {
    let runner = BatchRunner::new(image_path, output_path, settings.tool_path.clone())?
        .with_assets(install_assets(settings)?)
        .with_echo(echo);
    let workflows = batch::discover(input_path)?;

    let report = runner.run_all(&workflows).await;
    println!(
        "{} {} completed, {} failed",
        "→".cyan(),
        report.succeeded().to_string().green(),
        report.failed().to_string().red()
    );
    Ok(())
}

fn summarize(json_file: &Path, columns: &str) -> Result<(), FlowError> {
    let log = ExecutionLog::open(json_file)?;
    let summary = Summary::from_records(log.records(), &ColumnFilter::parse(columns))?;
    println!("{}", summary);
    Ok(())
}
