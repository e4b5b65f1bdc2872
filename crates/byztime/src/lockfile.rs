// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The sidecar `<path>.lock` file that enforces at most one writer context
//! per region.

use crate::error::{Error, Result};
use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

/// Append `.lock` to a region path's canonical form. The region file need
/// not exist yet for this to succeed; only its parent directory must.
pub fn lock_path_for(region_path: &Path) -> Result<PathBuf> {
    let canonical = canonicalize_best_effort(region_path)?;
    let mut lock_path = canonical.into_os_string();
    lock_path.push(".lock");
    Ok(PathBuf::from(lock_path))
}

/// `Path::canonicalize` requires the target to exist; a region file may not
/// yet when a provider is about to create it, so fall back to canonicalizing
/// the parent directory and re-appending the file name.
fn canonicalize_best_effort(path: &Path) -> Result<PathBuf> {
    if let Ok(c) = path.canonicalize() {
        return Ok(c);
    }
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
    let file_name = path.file_name().ok_or_else(|| {
        Error::Protocol(format!("region path {} has no file name", path.display()))
    })?;
    let parent_canonical = match parent {
        Some(parent) => parent.canonicalize()?,
        None => std::env::current_dir()?,
    };
    Ok(parent_canonical.join(file_name))
}

/// Holds the exclusive advisory lock for the lifetime of a writer context.
/// Dropping it releases the lock (the OS releases `flock` locks when the
/// last descriptor referencing the open file description closes).
pub struct LockFile {
    file: File,
}

impl LockFile {
    /// Open/create the lock file mode 0600 and acquire an exclusive
    /// non-blocking advisory lock on it.
    pub fn acquire(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .mode(0o600)
            .open(path)?;
        try_lock(&file)?;
        Ok(Self { file })
    }
}

#[cfg(target_os = "linux")]
fn try_lock(file: &File) -> Result<()> {
    // SAFETY: `file` is a valid, open file descriptor for the duration of
    // this call.
    let res = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if res == 0 {
        return Ok(());
    }
    let err = std::io::Error::last_os_error();
    if err.kind() == std::io::ErrorKind::WouldBlock {
        return Err(Error::Busy);
    }
    Err(Error::Io(err))
}

#[cfg(not(target_os = "linux"))]
fn try_lock(file: &File) -> Result<()> {
    let res = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if res == 0 {
        return Ok(());
    }
    let err = std::io::Error::last_os_error();
    if err.kind() == std::io::ErrorKind::WouldBlock {
        return Err(Error::Busy);
    }
    Err(Error::Io(err))
}
