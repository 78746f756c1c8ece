//! Sequential execution engine
//!
//! Runs compiled commands one at a time, streaming each child's stdout as it
//! arrives, and checkpoints a [`LogRecord`] after every successful stage.
//! The first non-zero exit stops the run; the log keeps every stage that
//! completed before it.

use std::io::Write;
use std::process::Stdio;
use std::time::{Duration, Instant};

use colored::Colorize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use crate::compiler::CompiledCommand;
use crate::error::{FlowError, Result};
use crate::exec_log::{ExecutionLog, LogRecord};

const BANNER_WIDTH: usize = 40;

/// Outcome of a successful run
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    /// Stages executed by this run
    pub executed: usize,
    /// Leading stages already recorded in the log and therefore skipped
    pub skipped: usize,
    pub elapsed: Duration,
}

/// Runs compiled commands against an execution log
#[derive(Debug, Clone)]
pub struct Engine {
    echo: bool,
}

impl Engine {
    pub fn new() -> Self {
        Self { echo: true }
    }

    /// Print child output and stage banners to the console
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    /// Execute `commands` in order, appending one record per completed stage.
    ///
    /// Stages whose command line already heads the log are skipped, which
    /// makes a run against a resumed workspace continue where it stopped.
    #[instrument(skip_all, fields(log = %log.path().display(), stages = commands.len()))]
    pub async fn run(&self, commands: &[CompiledCommand], log: &mut ExecutionLog) -> Result<RunReport> {
        let started = Instant::now();
        let skipped = completed_prefix(commands, log.records())?;
        if skipped > 0 {
            info!(skipped, "skipping stages already in the log");
        }

        let mut executed = 0;
        for (index, command) in commands.iter().enumerate().skip(skipped) {
            let record = self.execute(index + 1, command).await?;
            log.append(record)?;
            executed += 1;
        }

        Ok(RunReport {
            executed,
            skipped,
            elapsed: started.elapsed(),
        })
    }

    /// Run a single command to completion, capturing its stdout
    #[instrument(skip(self, command), fields(stage = %command.stage))]
    pub async fn execute(&self, number: usize, command: &CompiledCommand) -> Result<LogRecord> {
        let line = command.command_line();

        for dir in &command.ensure_dirs {
            tokio::fs::create_dir_all(dir).await?;
        }

        if self.echo {
            println!("{}", "=".repeat(BANNER_WIDTH));
            println!("{} {}", format!("{}.", number).cyan().bold(), line);
            println!("{}", "=".repeat(BANNER_WIDTH));
        }
        debug!(command = %line, "dispatching");

        let started = Instant::now();
        let mut child = Command::new(&command.program)
            .arg(&command.stage)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| FlowError::Spawn {
                program: command.program.clone(),
                source,
            })?;

        let mut captured = String::new();
        if let Some(stdout) = child.stdout.take() {
            let mut reader = BufReader::new(stdout);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                if reader.read_until(b'\n', &mut buf).await? == 0 {
                    break;
                }
                let chunk = String::from_utf8_lossy(&buf);
                if self.echo {
                    print!("{}", chunk);
                    // Partial lines (progress output) show up as they arrive
                    std::io::stdout().flush()?;
                }
                captured.push_str(&chunk);
            }
        }

        let status = child.wait().await?;
        let elapsed = started.elapsed().as_secs_f64();

        if !status.success() {
            warn!(command = %line, code = ?status.code(), "stage failed");
            return Err(FlowError::CommandFailed {
                command: line,
                exit_code: status.code(),
            });
        }

        if self.echo {
            println!("{}", "=".repeat(BANNER_WIDTH));
            println!("Stage #{} took {:.3} seconds to complete", number, elapsed);
            println!("{}", "=".repeat(BANNER_WIDTH));
        }
        info!(elapsed_secs = elapsed, "stage completed");

        Ok(LogRecord::new(line, elapsed, captured))
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

/// Number of leading `commands` already recorded in `records`.
///
/// A recorded command that differs from the compiled one at the same
/// position means the log belongs to another workflow.
pub fn completed_prefix(commands: &[CompiledCommand], records: &[LogRecord]) -> Result<usize> {
    for (index, (command, record)) in commands.iter().zip(records).enumerate() {
        let compiled = command.command_line();
        if record.command != compiled {
            return Err(FlowError::ResumeMismatch {
                index,
                logged: record.command.clone(),
                compiled,
            });
        }
    }
    Ok(records.len().min(commands.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn echo_cmd(stage: &str, args: &[&str]) -> CompiledCommand {
        CompiledCommand {
            stage: stage.to_string(),
            program: "echo".to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            ensure_dirs: Vec::new(),
        }
    }

    #[tokio::test]
    async fn execute_captures_stdout() {
        let engine = Engine::new().with_echo(false);
        let record = engine
            .execute(1, &echo_cmd("feature_extractor", &["--database_path", "/db"]))
            .await
            .unwrap();

        assert_eq!(record.command, "echo feature_extractor --database_path /db");
        assert_eq!(record.output, "feature_extractor --database_path /db\n");
        assert!(record.elapsed_time >= 0.0);
    }

    #[tokio::test]
    async fn execute_reports_exit_code() {
        let engine = Engine::new().with_echo(false);
        let cmd = CompiledCommand {
            stage: "-c".to_string(),
            program: "sh".to_string(),
            args: vec!["exit 7".to_string()],
            ensure_dirs: Vec::new(),
        };

        let err = engine.execute(1, &cmd).await.unwrap_err();
        assert!(matches!(
            err,
            FlowError::CommandFailed {
                exit_code: Some(7),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn echoed_partial_lines_are_captured() {
        let cmd = CompiledCommand {
            stage: "-c".to_string(),
            program: "sh".to_string(),
            args: vec!["printf '10%%\\r'; sleep 0.1; printf '100%%'".to_string()],
            ensure_dirs: Vec::new(),
        };

        let record = Engine::new().with_echo(true).execute(1, &cmd).await.unwrap();
        assert_eq!(record.output, "10%\r100%");
    }

    #[tokio::test]
    async fn execute_reports_missing_program() {
        let engine = Engine::new().with_echo(false);
        let mut cmd = echo_cmd("mapper", &[]);
        cmd.program = "/definitely/not/colmap".to_string();

        let err = engine.execute(1, &cmd).await.unwrap_err();
        assert!(matches!(err, FlowError::Spawn { .. }));
    }

    #[tokio::test]
    async fn execute_creates_output_folders() {
        let temp = tempdir().unwrap();
        let mesh_dir = temp.path().join("dense").join("poisson");
        let mut cmd = echo_cmd("poisson_mesher", &[]);
        cmd.ensure_dirs.push(mesh_dir.clone());

        Engine::new().with_echo(false).execute(1, &cmd).await.unwrap();
        assert!(mesh_dir.is_dir());
    }

    #[tokio::test]
    async fn run_appends_one_record_per_stage() {
        let temp = tempdir().unwrap();
        let mut log = ExecutionLog::create(&temp.path().join("log.json")).unwrap();
        let commands = vec![echo_cmd("a", &[]), echo_cmd("b", &[]), echo_cmd("c", &[])];

        let report = Engine::new()
            .with_echo(false)
            .run(&commands, &mut log)
            .await
            .unwrap();

        assert_eq!(report.executed, 3);
        assert_eq!(report.skipped, 0);
        let logged: Vec<_> = log.records().iter().map(|r| r.command.as_str()).collect();
        assert_eq!(logged, ["echo a", "echo b", "echo c"]);
    }

    #[test]
    fn completed_prefix_matches_leading_records() {
        let commands = vec![echo_cmd("a", &[]), echo_cmd("b", &[])];
        let records = vec![LogRecord::new("echo a", 1.0, "")];
        assert_eq!(completed_prefix(&commands, &records).unwrap(), 1);
        assert_eq!(completed_prefix(&commands, &[]).unwrap(), 0);
    }

    #[test]
    fn completed_prefix_detects_foreign_log() {
        let commands = vec![echo_cmd("a", &[])];
        let records = vec![LogRecord::new("echo z", 1.0, "")];
        assert!(matches!(
            completed_prefix(&commands, &records),
            Err(FlowError::ResumeMismatch { index: 0, .. })
        ));
    }

    #[test]
    fn completed_prefix_caps_at_command_count() {
        let commands = vec![echo_cmd("a", &[])];
        let records = vec![LogRecord::new("echo a", 1.0, ""), LogRecord::new("echo b", 1.0, "")];
        assert_eq!(completed_prefix(&commands, &records).unwrap(), 1);
    }
}
