// src/classify/copy.rs

//! Atomic file copies for classified candidates
//!
//! Content is staged to a temporary file in the destination directory,
//! flushed, then persisted under the final name. A failed or interrupted
//! copy never leaves a partial file visible under its final name, which
//! keeps the destination roots valid at every instant of a run, including
//! across cancellation.

use crate::error::{Error, Result};
use crate::guard;
use std::fs::{self, File};
use std::io;
use std::path::Path;
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Copy `src` to `dst`, atomically
///
/// Parent directories are created as needed. Returns the number of bytes
/// copied. Source permissions are carried over to the destination.
pub fn copy_atomic(src: &Path, dst: &Path) -> Result<u64> {
    let parent = dst
        .parent()
        .ok_or_else(|| Error::InvalidPath(format!("destination has no parent: {}", dst.display())))?;
    fs::create_dir_all(parent)?;

    let mut source = File::open(src).map_err(|e| Error::from_io(src, e))?;
    let metadata = source.metadata().map_err(|e| Error::from_io(src, e))?;

    let mut staging = NamedTempFile::new_in(parent)?;
    let copied = io::copy(&mut source, staging.as_file_mut()).map_err(|e| Error::from_io(src, e))?;
    staging.as_file().sync_all()?;

    // Atomic completion: the file appears under its final name fully written
    staging
        .persist(dst)
        .map_err(|e| Error::Io(e.error))?;

    fs::set_permissions(dst, metadata.permissions())?;

    debug!("Copied {} -> {} ({} bytes)", src.display(), dst.display(), copied);
    Ok(copied)
}

/// Copy with an optional one-shot lock-wait retry
///
/// The lock probe runs only here, after a copy has actually failed with a
/// contention-shaped error, never during discovery. With no `lock_wait`
/// budget configured the first error is final.
pub fn copy_with_retry(src: &Path, dst: &Path, lock_wait: Option<Duration>) -> Result<u64> {
    match copy_atomic(src, dst) {
        Ok(copied) => Ok(copied),
        Err(err) if lock_wait.is_some() && is_contention(&err) => {
            let waited = lock_wait.unwrap_or_default();
            warn!(
                "Copy of {} failed ({}), probing for lock release",
                src.display(),
                err
            );
            if guard::wait_until_unlocked(src, waited) {
                copy_atomic(src, dst)
            } else {
                Err(Error::FileLocked {
                    path: src.to_path_buf(),
                    waited,
                })
            }
        }
        Err(err) => Err(err),
    }
}

/// Errors that plausibly mean another process holds the file
fn is_contention(err: &Error) -> bool {
    match err {
        Error::PermissionDenied(_) => true,
        Error::Io(e) => matches!(
            e.kind(),
            io::ErrorKind::WouldBlock | io::ErrorKind::ResourceBusy
        ),
        _ => false,
    }
}
