//! Workspace preparation
//!
//! Creates, validates or resets the output folder of a run:
//!
//! ```text
//! <output>/
//!   database/
//!   sparse/
//!   dense/
//!   log.json
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{FlowError, Result};
use crate::exec_log::ExecutionLog;

pub const DATABASE_DIR: &str = "database";
pub const SPARSE_DIR: &str = "sparse";
pub const DENSE_DIR: &str = "dense";
pub const DATABASE_FILE: &str = "database.db";
pub const LOG_FILE: &str = "log.json";

/// Fixed subfolders of every workspace
pub const SUBDIRS: [&str; 3] = [DATABASE_DIR, DENSE_DIR, SPARSE_DIR];

/// How an existing output folder is treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkspaceMode {
    /// Create a new workspace; the folder must not exist
    #[default]
    Fresh,
    /// Delete any existing folder, then create a new workspace
    Overwrite,
    /// Reuse an existing workspace as is
    Resume,
}

impl WorkspaceMode {
    /// Map the CLI flags to a mode. Both flags at once is rejected.
    pub fn from_flags(overwrite: bool, resume: bool) -> Result<Self> {
        match (overwrite, resume) {
            (true, true) => Err(FlowError::ConflictingFlags),
            (true, false) => Ok(WorkspaceMode::Overwrite),
            (false, true) => Ok(WorkspaceMode::Resume),
            (false, false) => Ok(WorkspaceMode::Fresh),
        }
    }
}

/// Prepare `path` as a workspace according to the flags
pub fn prepare(path: &Path, overwrite: bool, resume: bool) -> Result<PathBuf> {
    prepare_with_mode(path, WorkspaceMode::from_flags(overwrite, resume)?)
}

pub fn prepare_with_mode(path: &Path, mode: WorkspaceMode) -> Result<PathBuf> {
    match mode {
        WorkspaceMode::Resume => {
            if !path.exists() {
                return Err(FlowError::NothingToResume {
                    path: path.to_path_buf(),
                });
            }
            validate(path)?;
            info!(path = %path.display(), "resuming existing workspace");
            return Ok(path.to_path_buf());
        }
        WorkspaceMode::Overwrite => {
            if path.exists() {
                warn!(path = %path.display(), "deleting existing output folder");
                fs::remove_dir_all(path)?;
            }
        }
        WorkspaceMode::Fresh => {
            if path.exists() {
                return Err(FlowError::WorkspaceExists {
                    path: path.to_path_buf(),
                });
            }
        }
    }

    // Never leave a half-built workspace behind, parents included
    let created_root = topmost_missing(path);
    if let Err(e) = create(path) {
        let _ = fs::remove_dir_all(&created_root);
        return Err(e);
    }
    info!(path = %path.display(), "created workspace");
    Ok(path.to_path_buf())
}

fn create(path: &Path) -> Result<()> {
    fs::create_dir_all(path)?;
    for dir in SUBDIRS {
        fs::create_dir(path.join(dir))?;
    }
    ExecutionLog::create(&path.join(LOG_FILE))?;
    Ok(())
}

/// Outermost ancestor of `path` (or `path` itself) that does not exist yet
fn topmost_missing(path: &Path) -> PathBuf {
    path.ancestors()
        .take_while(|a| !a.as_os_str().is_empty() && !a.exists())
        .last()
        .unwrap_or(path)
        .to_path_buf()
}

/// Check that `path` has the layout of a workspace
pub fn validate(path: &Path) -> Result<()> {
    if !path.is_dir() {
        return Err(FlowError::NotADirectory {
            path: path.to_path_buf(),
        });
    }
    for dir in SUBDIRS {
        if !path.join(dir).is_dir() {
            return Err(FlowError::IncompleteWorkspace {
                path: path.to_path_buf(),
                missing: dir.to_string(),
            });
        }
    }
    if !path.join(LOG_FILE).is_file() {
        return Err(FlowError::IncompleteWorkspace {
            path: path.to_path_buf(),
            missing: LOG_FILE.to_string(),
        });
    }
    Ok(())
}

/// Path of the execution log inside a workspace
pub fn log_path(workspace: &Path) -> PathBuf {
    workspace.join(LOG_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn listing(path: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(path)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn fresh_creates_layout_and_empty_log() {
        let temp = tempdir().unwrap();
        let out = temp.path().join("run");

        let path = prepare(&out, false, false).unwrap();

        assert_eq!(path, out);
        assert_eq!(listing(&out), ["database", "dense", "log.json", "sparse"]);
        assert_eq!(fs::read_to_string(out.join(LOG_FILE)).unwrap().trim(), "[]");
    }

    #[test]
    fn fresh_refuses_existing_folder() {
        let temp = tempdir().unwrap();
        let err = prepare(temp.path(), false, false).unwrap_err();
        assert!(matches!(err, FlowError::WorkspaceExists { .. }));
    }

    #[test]
    fn overwrite_and_resume_conflict_regardless_of_state() {
        let temp = tempdir().unwrap();
        let missing = temp.path().join("missing");
        assert!(matches!(
            prepare(&missing, true, true),
            Err(FlowError::ConflictingFlags)
        ));
        assert!(matches!(
            prepare(temp.path(), true, true),
            Err(FlowError::ConflictingFlags)
        ));
        assert!(!missing.exists());
    }

    #[test]
    fn resume_requires_existing_folder() {
        let temp = tempdir().unwrap();
        let err = prepare(&temp.path().join("missing"), false, true).unwrap_err();
        assert!(matches!(err, FlowError::NothingToResume { .. }));
    }

    #[test]
    fn resume_rejects_foreign_folder() {
        let temp = tempdir().unwrap();
        let err = prepare(temp.path(), false, true).unwrap_err();
        assert!(matches!(err, FlowError::IncompleteWorkspace { .. }));
    }

    #[test]
    fn resume_is_idempotent() {
        let temp = tempdir().unwrap();
        let out = temp.path().join("run");
        prepare(&out, false, false).unwrap();
        fs::write(out.join(LOG_FILE), r#"[{"command":"colmap mapper","elapsed_time":1.0,"output":""}]"#).unwrap();
        fs::write(out.join(SPARSE_DIR).join("keep.txt"), b"model").unwrap();

        prepare(&out, false, true).unwrap();
        prepare(&out, false, true).unwrap();

        assert_eq!(listing(&out), ["database", "dense", "log.json", "sparse"]);
        assert!(out.join(SPARSE_DIR).join("keep.txt").exists());
        assert!(fs::read_to_string(out.join(LOG_FILE))
            .unwrap()
            .contains("colmap mapper"));
    }

    #[test]
    fn overwrite_leaves_no_residue() {
        let temp = tempdir().unwrap();
        let out = temp.path().join("run");
        prepare(&out, false, false).unwrap();
        fs::write(out.join(DENSE_DIR).join("fused.ply"), b"ply").unwrap();
        fs::write(out.join("stray.txt"), b"x").unwrap();
        fs::write(out.join(LOG_FILE), r#"[{"command":"c","elapsed_time":1.0,"output":""}]"#).unwrap();

        prepare(&out, true, false).unwrap();

        assert_eq!(listing(&out), ["database", "dense", "log.json", "sparse"]);
        for dir in SUBDIRS {
            assert!(listing(&out.join(dir)).is_empty());
        }
        assert_eq!(fs::read_to_string(out.join(LOG_FILE)).unwrap().trim(), "[]");
    }

    #[test]
    fn overwrite_creates_missing_folder() {
        let temp = tempdir().unwrap();
        let out = temp.path().join("new");
        prepare(&out, true, false).unwrap();
        assert!(validate(&out).is_ok());
    }

    #[test]
    fn rollback_covers_created_parents() {
        let temp = tempdir().unwrap();
        let nested = temp.path().join("a").join("b").join("run");
        assert_eq!(topmost_missing(&nested), temp.path().join("a"));
        assert_eq!(topmost_missing(temp.path()), temp.path());

        prepare(&nested, false, false).unwrap();
        assert!(validate(&nested).is_ok());
        assert_eq!(topmost_missing(&nested.join("x")), nested.join("x"));
    }

    #[test]
    fn mode_from_flags() {
        assert_eq!(WorkspaceMode::from_flags(false, false).unwrap(), WorkspaceMode::Fresh);
        assert_eq!(WorkspaceMode::from_flags(true, false).unwrap(), WorkspaceMode::Overwrite);
        assert_eq!(WorkspaceMode::from_flags(false, true).unwrap(), WorkspaceMode::Resume);
    }
}
