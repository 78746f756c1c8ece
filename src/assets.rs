//! Auxiliary COLMAP assets
//!
//! Some stages read files that are not part of the workspace: the vocabulary
//! tree for `vocab_tree_matcher` and the pair list for `matches_importer`.
//! Both live at well-known names inside an assets folder, which is passed
//! around explicitly instead of being a hard-coded global path.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{FlowError, Result};
use crate::image_list::symlink;

pub const VOCAB_TREE_FILE: &str = "vocab_tree.bin";
pub const MATCH_LIST_FILE: &str = "match_list.txt";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    VocabTree,
    MatchList,
}

impl AssetKind {
    pub fn file_name(self) -> &'static str {
        match self {
            AssetKind::VocabTree => VOCAB_TREE_FILE,
            AssetKind::MatchList => MATCH_LIST_FILE,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AssetKind::VocabTree => "vocab tree",
            AssetKind::MatchList => "match list",
        }
    }
}

/// Well-known asset locations under one folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetPaths {
    dir: PathBuf,
}

impl AssetPaths {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, kind: AssetKind) -> PathBuf {
        self.dir.join(kind.file_name())
    }

    pub fn vocab_tree(&self) -> PathBuf {
        self.path(AssetKind::VocabTree)
    }

    pub fn match_list(&self) -> PathBuf {
        self.path(AssetKind::MatchList)
    }

    /// Point the well-known location of `kind` at `alternate`.
    ///
    /// Whatever sits at the well-known location is replaced by a symlink.
    /// Linking to the well-known location itself is a no-op.
    pub fn install(&self, kind: AssetKind, alternate: &Path) -> Result<PathBuf> {
        if !alternate.is_file() {
            return Err(FlowError::AssetNotFound {
                asset: kind.label(),
                path: alternate.to_path_buf(),
            });
        }

        let target = self.path(kind);
        if alternate == target {
            return Ok(target);
        }
        if fs::read_link(&target).ok().as_deref() == Some(alternate) {
            return Ok(target);
        }

        fs::create_dir_all(&self.dir)?;
        if fs::symlink_metadata(&target).is_ok() {
            fs::remove_file(&target)?;
        }
        symlink(alternate, &target)?;

        info!(
            asset = kind.label(),
            link = %target.display(),
            source = %alternate.display(),
            "installed asset link"
        );
        Ok(target)
    }
}

impl Default for AssetPaths {
    fn default() -> Self {
        Self::new(std::env::temp_dir())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn well_known_paths() {
        let assets = AssetPaths::new("/scratch");
        assert_eq!(assets.vocab_tree(), PathBuf::from("/scratch/vocab_tree.bin"));
        assert_eq!(assets.match_list(), PathBuf::from("/scratch/match_list.txt"));
    }

    #[test]
    fn install_replaces_existing_file_with_link() {
        let temp = tempdir().unwrap();
        let assets = AssetPaths::new(temp.path().join("assets"));
        fs::create_dir_all(assets.dir()).unwrap();
        fs::write(assets.vocab_tree(), b"stale").unwrap();

        let real = temp.path().join("vocab_tree_flickr100K.bin");
        fs::write(&real, b"tree").unwrap();

        let link = assets.install(AssetKind::VocabTree, &real).unwrap();
        assert_eq!(fs::read_link(&link).unwrap(), real);
        assert_eq!(fs::read(&link).unwrap(), b"tree");
    }

    #[test]
    fn install_twice_is_stable() {
        let temp = tempdir().unwrap();
        let assets = AssetPaths::new(temp.path());
        let real = temp.path().join("pairs.txt");
        fs::write(&real, b"a.jpg b.jpg\n").unwrap();

        assets.install(AssetKind::MatchList, &real).unwrap();
        assets.install(AssetKind::MatchList, &real).unwrap();
        assert_eq!(fs::read_link(assets.match_list()).unwrap(), real);
    }

    #[test]
    fn install_missing_alternate_fails() {
        let temp = tempdir().unwrap();
        let assets = AssetPaths::new(temp.path());
        let err = assets
            .install(AssetKind::VocabTree, &temp.path().join("nope.bin"))
            .unwrap_err();
        assert!(matches!(err, FlowError::AssetNotFound { .. }));
    }
}
