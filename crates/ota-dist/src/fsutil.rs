//! # Filesystem Helpers
//!
//! Tree walking, copying, and atomic file replacement shared by the pipeline.
//!
//! Walks never follow symbolic links, so a link cycle cannot trap them. A
//! symbolic link found inside a tree the pipeline owns is treated as an error
//! rather than silently skipped: the pipeline never creates links, so one
//! showing up means the tree was tampered with.

use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path};

use walkdir::WalkDir;

use crate::error::{DistError, IoResultExt};

/// List every regular file under `root` as a `/`-separated relative path.
///
/// Directories are not listed. The result is sorted.
pub fn walk_files(root: &Path) -> io::Result<Vec<String>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(false).min_depth(1) {
        let entry = entry?;
        let file_type = entry.file_type();
        if file_type.is_symlink() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("symbolic link not supported: {}", entry.path().display()),
            ));
        }
        if file_type.is_file() {
            let rel = entry
                .path()
                .strip_prefix(root)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
            files.push(to_slash_path(rel)?);
        }
    }
    files.sort();
    Ok(files)
}

/// Render a relative path with `/` separators.
fn to_slash_path(rel: &Path) -> io::Result<String> {
    let mut parts = Vec::new();
    for component in rel.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str().ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("non UTF-8 file name: {}", rel.display()),
                )
            })?),
            _ => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("unexpected path component in {}", rel.display()),
                ))
            }
        }
    }
    Ok(parts.join("/"))
}

/// Recursively copy the contents of `src` into `dst`, creating `dst`.
///
/// Returns the number of files copied.
pub fn copy_tree(src: &Path, dst: &Path) -> Result<usize, DistError> {
    fs::create_dir_all(dst).at("creating", dst)?;
    let mut copied = 0;
    for entry in WalkDir::new(src).follow_links(false).min_depth(1) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(src).to_path_buf();
            DistError::io("walking", &path, e.into())
        })?;
        let rel = entry.path().strip_prefix(src).map_err(|e| {
            DistError::io(
                "copying",
                entry.path(),
                io::Error::new(io::ErrorKind::Other, e.to_string()),
            )
        })?;
        let target = dst.join(rel);
        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&target).at("creating", &target)?;
        } else if file_type.is_file() {
            fs::copy(entry.path(), &target).at("copying to", &target)?;
            copied += 1;
        } else {
            return Err(DistError::io(
                "copying",
                entry.path(),
                io::Error::new(io::ErrorKind::InvalidInput, "unsupported file type"),
            ));
        }
    }
    Ok(copied)
}

/// Remove a directory tree, treating "already gone" as success.
pub fn remove_dir_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Replace `path` with `bytes` via a sibling temp file and rename.
///
/// Readers observe either the old content or the new content, never a
/// partially written file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), DistError> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).at("creating", parent)?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent).at("creating temp file in", parent)?;
    tmp.write_all(bytes).at("writing", tmp.path())?;
    tmp.as_file().sync_all().at("syncing", tmp.path())?;
    tmp.persist(path)
        .map_err(|e| DistError::io("replacing", path, e.error))?;
    Ok(())
}
