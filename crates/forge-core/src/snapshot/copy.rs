//! Directory tree copy and measurement.

use std::{fs, path::Path};

use walkdir::WalkDir;

use crate::error::{EngineError, IoResultExt, Result};

fn walk_error(root: &Path, err: walkdir::Error) -> EngineError {
    let path = err.path().unwrap_or(root).to_path_buf();
    let source = err
        .into_io_error()
        .unwrap_or_else(|| std::io::Error::new(std::io::ErrorKind::Other, "directory walk failed"));
    EngineError::FileSystem { path, source }
}

/// Copies the contents of `src` into `dst`, creating `dst`. Returns the
/// number of file bytes copied.
pub fn copy_tree(src: &Path, dst: &Path) -> Result<u64> {
    fs::create_dir_all(dst).fs_context(dst)?;
    let mut copied = 0;

    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry.map_err(|e| walk_error(src, e))?;
        let relative = match entry.path().strip_prefix(src) {
            Ok(rel) if rel.as_os_str().is_empty() => continue,
            Ok(rel) => rel,
            Err(_) => continue,
        };
        let target = dst.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target).fs_context(&target)?;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else {
            copied += fs::copy(entry.path(), &target).fs_context(entry.path())?;
        }
    }

    Ok(copied)
}

#[cfg(unix)]
fn copy_symlink(link: &Path, target: &Path) -> Result<()> {
    let points_to = fs::read_link(link).fs_context(link)?;
    std::os::unix::fs::symlink(points_to, target).fs_context(target)
}

#[cfg(not(unix))]
fn copy_symlink(link: &Path, target: &Path) -> Result<()> {
    fs::copy(link, target).fs_context(link)?;
    Ok(())
}

/// Total bytes of regular files under `path`.
pub fn tree_size(path: &Path) -> Result<u64> {
    let mut total = 0;
    for entry in WalkDir::new(path).follow_links(false) {
        let entry = entry.map_err(|e| walk_error(path, e))?;
        if entry.file_type().is_file() {
            total += entry
                .metadata()
                .map_err(|e| walk_error(path, e))?
                .len();
        }
    }
    Ok(total)
}

/// Removes a file or directory tree if it exists.
pub fn remove_tree(path: &Path) -> Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path).fs_context(path),
        Ok(_) => fs::remove_file(path).fs_context(path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(EngineError::FileSystem {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}
