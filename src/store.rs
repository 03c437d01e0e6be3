//! Sandboxed file storage with bounded reads and atomic writes
//!
//! All paths pass through [`PathGuard`]. Writes go to a temporary sibling in
//! the destination directory and are renamed over the target, so a reader sees
//! either the old content or the new content, never a mix. A failure at any
//! point before the rename leaves the destination untouched.

use log::{debug, info, warn};
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::Path;
use tempfile::NamedTempFile;

use crate::config::DEFAULT_MAX_READ_BYTES;
use crate::error::FileError;
use crate::path_guard::{PathGuard, ResolvedPath};

/// Options for [`SecureFileStore::write`]
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteOptions {
    /// Copy an existing destination to `<path>.backup` before replacing it
    pub create_backup: bool,
}

/// File reader/writer gated by a [`PathGuard`]
#[derive(Debug, Clone)]
pub struct SecureFileStore {
    guard: PathGuard,
    max_read_bytes: u64,
}

impl SecureFileStore {
    /// Store with the default 10 MiB read cap
    pub fn new(guard: PathGuard) -> Self {
        Self::with_max_read_bytes(guard, DEFAULT_MAX_READ_BYTES)
    }

    pub fn with_max_read_bytes(guard: PathGuard, max_read_bytes: u64) -> Self {
        Self {
            guard,
            max_read_bytes,
        }
    }

    pub fn guard(&self) -> &PathGuard {
        &self.guard
    }

    pub fn max_read_bytes(&self) -> u64 {
        self.max_read_bytes
    }

    /// Resolve a caller path without touching the filesystem content
    pub fn resolve(&self, raw_path: &str) -> Result<ResolvedPath, FileError> {
        self.guard.resolve(raw_path)
    }

    /// Read a UTF-8 text file
    pub fn read(&self, raw_path: &str) -> Result<(ResolvedPath, String), FileError> {
        let (path, bytes) = self.read_bytes(raw_path)?;
        match String::from_utf8(bytes) {
            Ok(content) => Ok((path, content)),
            Err(_) => Err(FileError::Decode {
                path: path.into_path_buf(),
            }),
        }
    }

    /// Read raw bytes, enforcing the size cap before any content is loaded
    pub fn read_bytes(&self, raw_path: &str) -> Result<(ResolvedPath, Vec<u8>), FileError> {
        let path = self.guard.resolve(raw_path)?;

        let metadata = fs::metadata(&path).map_err(|e| not_found_or_io(&path, e))?;
        if !metadata.is_file() {
            return Err(FileError::NotAFile {
                path: path.into_path_buf(),
            });
        }
        if metadata.len() > self.max_read_bytes {
            return Err(FileError::TooLarge {
                path: path.into_path_buf(),
                size: metadata.len(),
                limit: self.max_read_bytes,
            });
        }

        let file = File::open(&path).map_err(|e| not_found_or_io(&path, e))?;
        let mut bytes = Vec::with_capacity(metadata.len() as usize);
        // One byte past the cap detects a file that grew after the stat
        file.take(self.max_read_bytes + 1)
            .read_to_end(&mut bytes)
            .map_err(|e| FileError::io(path.as_path(), e))?;

        if bytes.len() as u64 > self.max_read_bytes {
            return Err(FileError::TooLarge {
                path: path.into_path_buf(),
                size: bytes.len() as u64,
                limit: self.max_read_bytes,
            });
        }

        debug!("Read {} bytes from {}", bytes.len(), path);
        Ok((path, bytes))
    }

    /// Replace (or create) a text file atomically
    pub fn write(
        &self,
        raw_path: &str,
        content: &str,
        options: WriteOptions,
    ) -> Result<ResolvedPath, FileError> {
        self.write_bytes(raw_path, content.as_bytes(), options)
    }

    /// Replace (or create) a file atomically.
    ///
    /// With `create_backup`, an existing destination is copied to
    /// `<path>.backup` first; a failed copy aborts before the destination is
    /// touched.
    pub fn write_bytes(
        &self,
        raw_path: &str,
        content: &[u8],
        options: WriteOptions,
    ) -> Result<ResolvedPath, FileError> {
        let path = self.guard.resolve(raw_path)?;
        let existing = existing_metadata(&path)?;

        if let Some(metadata) = &existing
            && !metadata.is_file()
        {
            return Err(FileError::NotAFile {
                path: path.into_path_buf(),
            });
        }

        ensure_parent_dir(&path)?;

        if options.create_backup && existing.is_some() {
            let backup = path.backup_path();
            fs::copy(&path, &backup).map_err(|e| FileError::io(&backup, e))?;
            info!("Backed up {} to {}", path, backup.display());
        }

        let temp = write_temp_sibling(&path, content, existing.as_ref())?;
        temp.persist(&path)
            .map_err(|e| FileError::io(path.as_path(), e.error))?;
        sync_parent_dir(&path);

        info!("Wrote {} bytes to {}", content.len(), path);
        Ok(path)
    }

    /// Create a new text file; fails if anything already exists at the path
    pub fn create(&self, raw_path: &str, content: &str) -> Result<ResolvedPath, FileError> {
        self.create_bytes(raw_path, content.as_bytes())
    }

    pub fn create_bytes(&self, raw_path: &str, content: &[u8]) -> Result<ResolvedPath, FileError> {
        let path = self.guard.resolve(raw_path)?;

        if existing_metadata(&path)?.is_some() {
            return Err(FileError::AlreadyExists {
                path: path.into_path_buf(),
            });
        }

        ensure_parent_dir(&path)?;

        let temp = write_temp_sibling(&path, content, None)?;
        // No-clobber rename: a file that appeared after the check is kept
        temp.persist_noclobber(&path).map_err(|e| {
            if e.error.kind() == io::ErrorKind::AlreadyExists {
                FileError::AlreadyExists {
                    path: path.as_path().to_path_buf(),
                }
            } else {
                FileError::io(path.as_path(), e.error)
            }
        })?;
        sync_parent_dir(&path);

        info!("Created {} ({} bytes)", path, content.len());
        Ok(path)
    }
}

fn not_found_or_io(path: &ResolvedPath, error: io::Error) -> FileError {
    if error.kind() == io::ErrorKind::NotFound {
        FileError::NotFound {
            path: path.as_path().to_path_buf(),
        }
    } else {
        FileError::io(path.as_path(), error)
    }
}

fn existing_metadata(path: &ResolvedPath) -> Result<Option<fs::Metadata>, FileError> {
    match fs::metadata(path) {
        Ok(metadata) => Ok(Some(metadata)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(FileError::io(path.as_path(), e)),
    }
}

fn ensure_parent_dir(path: &ResolvedPath) -> Result<(), FileError> {
    match path.as_path().parent() {
        Some(parent) => fs::create_dir_all(parent).map_err(|e| FileError::io(parent, e)),
        None => Ok(()),
    }
}

/// Write `content` to a fresh temp file next to `path` and flush it to disk
fn write_temp_sibling(
    path: &ResolvedPath,
    content: &[u8],
    replaced: Option<&fs::Metadata>,
) -> Result<NamedTempFile, FileError> {
    let dir = path.as_path().parent().unwrap_or_else(|| Path::new("."));
    let prefix = format!(".{}.", path.file_name());

    let mut temp = tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(|e| FileError::io(dir, e))?;

    temp.write_all(content)
        .and_then(|_| temp.as_file().sync_all())
        .map_err(|e| FileError::io(temp.path(), e))?;

    if let Some(metadata) = replaced
        && let Err(e) = fs::set_permissions(temp.path(), metadata.permissions())
    {
        warn!("Could not carry permissions over to {}: {}", path, e);
    }

    Ok(temp)
}

/// Best effort: make the rename itself durable
#[cfg(unix)]
fn sync_parent_dir(path: &ResolvedPath) {
    if let Some(parent) = path.as_path().parent()
        && let Err(e) = File::open(parent).and_then(|dir| dir.sync_all())
    {
        debug!("Directory sync failed for {}: {}", parent.display(), e);
    }
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &ResolvedPath) {}
