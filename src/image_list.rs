//! Image list staging
//!
//! COLMAP reads images from a folder. When the image source is a text file
//! listing absolute image paths, a staging folder of symlinks (one per line)
//! stands in for it.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{FlowError, Result};

/// File extensions recognized as image lists
pub const LIST_EXTENSIONS: &[&str] = &["txt", "list", "lst"];

/// Whether `path` looks like an image list (by extension)
pub fn is_image_list(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| LIST_EXTENSIONS.iter().any(|l| ext.eq_ignore_ascii_case(l)))
        .unwrap_or(false)
}

/// Parse and validate an image list. Blank lines are skipped.
///
/// Every entry must be absolute and must exist.
pub fn read_entries(list_file: &Path) -> Result<Vec<PathBuf>> {
    let content = fs::read_to_string(list_file)?;
    let mut entries = Vec::new();

    for (idx, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        let path = PathBuf::from(line);
        if !path.is_absolute() {
            return Err(FlowError::RelativeImagePath {
                line: idx + 1,
                path: line.to_string(),
            });
        }
        if !path.exists() {
            return Err(FlowError::MissingImage {
                line: idx + 1,
                path: line.to_string(),
            });
        }
        entries.push(path);
    }

    Ok(entries)
}

/// Check every entry of `list_file` without touching the filesystem.
///
/// Besides [`read_entries`], two entries may not share a file name since
/// links are named after it.
pub fn validate(list_file: &Path) -> Result<Vec<PathBuf>> {
    let entries = read_entries(list_file)?;

    let mut seen = HashSet::new();
    for entry in &entries {
        let name = link_name(entry)?;
        if !seen.insert(name.clone()) {
            return Err(FlowError::DuplicateImageName { name });
        }
    }
    Ok(entries)
}

/// Materialize `list_file` as a folder of symlinks at `staging_dir`.
///
/// The whole list is validated before the staging folder is touched. Any
/// previous content of `staging_dir` is discarded.
pub fn stage(list_file: &Path, staging_dir: &Path) -> Result<PathBuf> {
    let entries = validate(list_file)?;

    if staging_dir.exists() {
        debug!(dir = %staging_dir.display(), "clearing previous image staging folder");
        fs::remove_dir_all(staging_dir)?;
    }
    fs::create_dir_all(staging_dir)?;

    for entry in &entries {
        let link = staging_dir.join(link_name(entry)?);
        symlink(entry, &link)?;
    }

    info!(
        count = entries.len(),
        dir = %staging_dir.display(),
        "staged image list"
    );
    Ok(staging_dir.to_path_buf())
}

fn link_name(entry: &Path) -> Result<String> {
    entry
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| FlowError::InvalidImageSource {
            path: entry.to_path_buf(),
        })
}

#[cfg(unix)]
pub(crate) fn symlink(original: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(original, link)
}

#[cfg(windows)]
pub(crate) fn symlink(original: &Path, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_file(original, link)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, b"jpeg").unwrap();
        path
    }

    #[test]
    fn recognizes_list_extensions() {
        assert!(is_image_list(Path::new("/data/images.txt")));
        assert!(is_image_list(Path::new("/data/images.LIST")));
        assert!(!is_image_list(Path::new("/data/images.jpg")));
        assert!(!is_image_list(Path::new("/data/images")));
    }

    #[test]
    fn stages_one_link_per_line() {
        let temp = tempdir().unwrap();
        let a = touch(temp.path(), "a.jpg");
        let b = touch(temp.path(), "b.jpg");
        let list = temp.path().join("images.txt");
        fs::write(&list, format!("{}\n\n{}\n", a.display(), b.display())).unwrap();

        let staging = temp.path().join("staging");
        let dir = stage(&list, &staging).unwrap();

        assert_eq!(dir, staging);
        let link = fs::read_link(staging.join("a.jpg")).unwrap();
        assert_eq!(link, a);
        assert!(staging.join("b.jpg").exists());
        assert_eq!(fs::read_dir(&staging).unwrap().count(), 2);
    }

    #[test]
    fn restaging_discards_previous_links() {
        let temp = tempdir().unwrap();
        let a = touch(temp.path(), "a.jpg");
        let list = temp.path().join("images.txt");
        fs::write(&list, format!("{}\n", a.display())).unwrap();

        let staging = temp.path().join("staging");
        fs::create_dir_all(&staging).unwrap();
        fs::write(staging.join("stale.jpg"), b"old").unwrap();

        stage(&list, &staging).unwrap();
        assert!(!staging.join("stale.jpg").exists());
        assert!(staging.join("a.jpg").exists());
    }

    #[test]
    fn relative_entry_fails_before_staging() {
        let temp = tempdir().unwrap();
        let a = touch(temp.path(), "a.jpg");
        let list = temp.path().join("images.txt");
        fs::write(&list, format!("{}\nimgs/b.jpg\n", a.display())).unwrap();

        let staging = temp.path().join("staging");
        let err = stage(&list, &staging).unwrap_err();

        assert!(matches!(err, FlowError::RelativeImagePath { line: 2, .. }));
        assert!(!staging.exists());
    }

    #[test]
    fn missing_entry_is_rejected() {
        let temp = tempdir().unwrap();
        let list = temp.path().join("images.txt");
        let ghost = temp.path().join("ghost.jpg");
        fs::write(&list, format!("{}\n", ghost.display())).unwrap();

        let err = read_entries(&list).unwrap_err();
        assert!(matches!(err, FlowError::MissingImage { line: 1, .. }));
    }

    #[test]
    fn duplicate_file_names_are_rejected() {
        let temp = tempdir().unwrap();
        fs::create_dir(temp.path().join("cam0")).unwrap();
        fs::create_dir(temp.path().join("cam1")).unwrap();
        let a = touch(&temp.path().join("cam0"), "frame.jpg");
        let b = touch(&temp.path().join("cam1"), "frame.jpg");
        let list = temp.path().join("images.txt");
        fs::write(&list, format!("{}\n{}\n", a.display(), b.display())).unwrap();

        let err = stage(&list, &temp.path().join("staging")).unwrap_err();
        assert!(matches!(err, FlowError::DuplicateImageName { .. }));
    }
}
