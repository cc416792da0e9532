//! # Archive Codec
//!
//! Packs directories into `bundle.zip` archives and unpacks uploads.
//!
//! The pipeline only talks to the [`ArchiveCodec`] trait; [`ZipCodec`] is the
//! production implementation. Extraction validates every entry name before
//! writing anything, rejecting absolute paths, `..` traversal (zip-slip), and
//! symbolic link entries.

use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::fsutil::walk_files;

/// Errors arising from packing or unpacking archives.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Local filesystem failure while reading sources or writing output.
    #[error("archive I/O error: {0}")]
    Io(#[from] io::Error),

    /// The archive bytes could not be decoded.
    #[error("corrupt archive: {0}")]
    Corrupt(String),

    /// An entry would escape the destination or is not a regular file.
    #[error("unsafe archive entry: {path}")]
    UnsafeEntry {
        /// The entry name as stored in the archive.
        path: String,
    },

    /// Two entries claim the same path, or an entry's path runs through
    /// another entry's file.
    #[error("archive entry {path} clashes with another entry")]
    ClashingEntry {
        /// The later of the two entries.
        path: String,
    },

    /// The archive holds no files.
    #[error("archive contains no files")]
    Empty,
}

impl From<zip::result::ZipError> for ArchiveError {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(e) => Self::Io(e),
            other => Self::Corrupt(other.to_string()),
        }
    }
}

/// Compress and decompress directory trees.
pub trait ArchiveCodec: Send + Sync + fmt::Debug {
    /// Write an archive at `archive_path` holding `files`, each a
    /// `/`-separated path relative to `source_dir`.
    ///
    /// Returns the number of entries written. An empty `files` list produces
    /// a valid, empty archive.
    fn compress_files(
        &self,
        source_dir: &Path,
        files: &[&str],
        archive_path: &Path,
    ) -> Result<usize, ArchiveError>;

    /// Extract the archive at `archive_path` into `dest_dir`, which should
    /// be empty.
    ///
    /// Returns the number of files written.
    fn decompress(&self, archive_path: &Path, dest_dir: &Path) -> Result<usize, ArchiveError>;

    /// Archive every file under `source_dir`.
    fn compress(&self, source_dir: &Path, archive_path: &Path) -> Result<usize, ArchiveError> {
        let files = walk_files(source_dir)?;
        let refs: Vec<&str> = files.iter().map(String::as_str).collect();
        self.compress_files(source_dir, &refs, archive_path)
    }
}

/// Deflate-compressed zip archives.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipCodec;

/// Unix file type bits marking a symbolic link.
const S_IFMT: u32 = 0o170_000;
const S_IFLNK: u32 = 0o120_000;

fn entry_options() -> SimpleFileOptions {
    SimpleFileOptions::default().compression_method(CompressionMethod::Deflated)
}

impl ArchiveCodec for ZipCodec {
    fn compress_files(
        &self,
        source_dir: &Path,
        files: &[&str],
        archive_path: &Path,
    ) -> Result<usize, ArchiveError> {
        if let Some(parent) = archive_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut writer = ZipWriter::new(BufWriter::new(File::create(archive_path)?));
        for rel in files {
            writer.start_file(*rel, entry_options())?;
            let mut source = File::open(source_dir.join(rel))?;
            io::copy(&mut source, &mut writer)?;
        }
        let mut out = writer.finish()?;
        out.flush()?;
        Ok(files.len())
    }

    fn decompress(&self, archive_path: &Path, dest_dir: &Path) -> Result<usize, ArchiveError> {
        let file = File::open(archive_path)?;
        let mut archive = ZipArchive::new(BufReader::new(file)).map_err(corrupt)?;
        fs::create_dir_all(dest_dir)?;

        let mut written = 0;
        for index in 0..archive.len() {
            let mut entry = archive.by_index(index).map_err(corrupt)?;
            let name = entry.name().to_string();
            if name.contains('\\') {
                return Err(ArchiveError::UnsafeEntry { path: name });
            }
            let rel = entry
                .enclosed_name()
                .ok_or_else(|| ArchiveError::UnsafeEntry { path: name.clone() })?;
            if entry
                .unix_mode()
                .is_some_and(|mode| mode & S_IFMT == S_IFLNK)
            {
                return Err(ArchiveError::UnsafeEntry { path: name });
            }

            if clashes(dest_dir, &rel, entry.is_dir()) {
                return Err(ArchiveError::ClashingEntry { path: name });
            }

            let target = dest_dir.join(&rel);
            if entry.is_dir() {
                fs::create_dir_all(&target)?;
                continue;
            }
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut out = BufWriter::new(File::create(&target)?);
            copy_entry(&mut entry, &mut out, &name)?;
            out.flush()?;
            written += 1;
        }
        Ok(written)
    }
}

/// Whether extracting `rel` would land on something an earlier entry wrote:
/// a file (or, for a file entry, a directory) at the target itself, or a
/// file where one of its parent directories belongs.
fn clashes(dest_dir: &Path, rel: &Path, is_dir: bool) -> bool {
    if let Ok(meta) = fs::symlink_metadata(dest_dir.join(rel)) {
        if !(is_dir && meta.is_dir()) {
            return true;
        }
    }
    rel.ancestors()
        .skip(1)
        .filter(|parent| !parent.as_os_str().is_empty())
        .any(|parent| fs::symlink_metadata(dest_dir.join(parent)).is_ok_and(|m| !m.is_dir()))
}

/// Any failure decoding the upload is the upload's fault.
fn corrupt(err: zip::result::ZipError) -> ArchiveError {
    ArchiveError::Corrupt(err.to_string())
}

/// Stream one entry out, attributing read failures to the archive and write
/// failures to the local filesystem.
fn copy_entry<R: Read, W: Write>(entry: &mut R, out: &mut W, name: &str) -> Result<(), ArchiveError> {
    let mut buffer = [0u8; 16 * 1024];
    loop {
        let n = entry
            .read(&mut buffer)
            .map_err(|e| ArchiveError::Corrupt(format!("reading entry {name}: {e}")))?;
        if n == 0 {
            return Ok(());
        }
        out.write_all(&buffer[..n])?;
    }
}
