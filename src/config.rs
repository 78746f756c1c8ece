//! Configuration
//!
//! Settings are layered, highest priority first:
//!
//! 1. CLI flags (applied by the binary)
//! 2. Environment variables (`COLMAP_FLOW_TOOL`, `COLMAP_FLOW_ASSETS_DIR`)
//! 3. Config file (`~/.config/colmap-flow/config.toml` or `--config`)
//! 4. Defaults

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::assets::AssetPaths;
use crate::error::{FlowError, Result};

pub const TOOL_ENV: &str = "COLMAP_FLOW_TOOL";
pub const ASSETS_DIR_ENV: &str = "COLMAP_FLOW_ASSETS_DIR";

/// Persistent settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// COLMAP executable
    pub tool_path: String,
    /// Echo child output while stages run
    pub echo_output: bool,
    /// Folder holding the well-known asset links
    pub assets_dir: Option<PathBuf>,
    /// Vocabulary tree to link into the assets folder
    pub vocab_tree_path: Option<PathBuf>,
    /// Image pair list to link into the assets folder
    pub match_list_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tool_path: "colmap".to_string(),
            echo_output: true,
            assets_dir: None,
            vocab_tree_path: None,
            match_list_path: None,
        }
    }
}

impl Settings {
    /// Returns `~/.config/colmap-flow/` on Unix, `%APPDATA%/colmap-flow/` on Windows
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("colmap-flow")
    }

    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Load the file at `path`, or the default location when `None`.
    ///
    /// A missing default file yields defaults; an explicit path must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                if !path.is_file() {
                    return Err(FlowError::ConfigError {
                        reason: format!("config file not found: {}", path.display()),
                    });
                }
                Self::load_from(path)
            }
            None => {
                let path = Self::default_path();
                if path.exists() {
                    Self::load_from(&path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| FlowError::ConfigError {
            reason: format!("Failed to read config file: {}", e),
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| FlowError::ConfigError {
            reason: format!("Failed to parse config file: {}", e),
        })
    }

    /// Apply environment overrides
    pub fn with_env(self) -> Self {
        self.with_vars(|name| std::env::var(name).ok())
    }

    fn with_vars(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(tool) = var(TOOL_ENV).filter(|v| !v.is_empty()) {
            self.tool_path = tool;
        }
        if let Some(dir) = var(ASSETS_DIR_ENV).filter(|v| !v.is_empty()) {
            self.assets_dir = Some(PathBuf::from(dir));
        }
        self
    }

    /// Asset locations, defaulting to the OS temp folder
    pub fn assets(&self) -> AssetPaths {
        match &self.assets_dir {
            Some(dir) => AssetPaths::new(dir),
            None => AssetPaths::default(),
        }
    }
}
