//! Execution context for one workflow run
//!
//! Computed once per run and consumed by the stage compiler to inject the
//! implicit path parameters.

use std::path::{Path, PathBuf};

use crate::assets::AssetPaths;
use crate::error::{FlowError, Result};
use crate::image_list;
use crate::workspace::{DATABASE_DIR, DATABASE_FILE, DENSE_DIR, SPARSE_DIR};

/// Immutable bundle of paths shared by every stage of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionContext {
    image_path: PathBuf,
    output_root: PathBuf,
    database_path: PathBuf,
    assets: AssetPaths,
}

impl ExecutionContext {
    /// Build a context from an already-resolved image folder
    pub fn new(image_path: impl Into<PathBuf>, output_root: impl Into<PathBuf>) -> Self {
        let output_root = output_root.into();
        let database_path = output_root.join(DATABASE_DIR).join(DATABASE_FILE);
        Self {
            image_path: image_path.into(),
            output_root,
            database_path,
            assets: AssetPaths::default(),
        }
    }

    pub fn with_assets(mut self, assets: AssetPaths) -> Self {
        self.assets = assets;
        self
    }

    pub fn image_path(&self) -> &Path {
        &self.image_path
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn assets(&self) -> &AssetPaths {
        &self.assets
    }

    pub fn sparse_dir(&self) -> PathBuf {
        self.output_root.join(SPARSE_DIR)
    }

    /// First reconstructed model (`sparse/0`)
    pub fn sparse_model(&self) -> PathBuf {
        self.sparse_dir().join("0")
    }

    pub fn dense_dir(&self) -> PathBuf {
        self.output_root.join(DENSE_DIR)
    }

    pub fn fused_ply(&self) -> PathBuf {
        self.dense_dir().join("fused.ply")
    }
}

/// Where the images of a run come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// A folder of images, used as is
    Directory(PathBuf),
    /// A text file of absolute image paths
    List(PathBuf),
}

impl ImageSource {
    /// Classify a user-supplied image path
    pub fn detect(path: &Path) -> Result<Self> {
        if path.is_dir() {
            Ok(ImageSource::Directory(path.to_path_buf()))
        } else if path.is_file() {
            if image_list::is_image_list(path) {
                Ok(ImageSource::List(path.to_path_buf()))
            } else {
                Err(FlowError::InvalidImageSource {
                    path: path.to_path_buf(),
                })
            }
        } else {
            Err(FlowError::ImageSourceNotFound {
                path: path.to_path_buf(),
            })
        }
    }

    /// Check the source's content. For lists, every entry is checked.
    pub fn validate(&self) -> Result<()> {
        match self {
            ImageSource::Directory(_) => Ok(()),
            ImageSource::List(list) => image_list::validate(list).map(|_| ()),
        }
    }

    /// Resolve to an image folder, staging list files into `staging_dir`
    pub fn resolve(&self, staging_dir: &Path) -> Result<PathBuf> {
        match self {
            ImageSource::Directory(dir) => Ok(dir.clone()),
            ImageSource::List(list) => image_list::stage(list, staging_dir),
        }
    }
}
