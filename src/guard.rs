// src/guard.rs

//! Pre-flight and in-flight resource checks
//!
//! Three independent checks, each callable standalone:
//!
//! - path length: rejects only lengths the platform's path API genuinely
//!   cannot represent, not merely "long" paths
//! - disk space: free space versus an estimate inflated by a safety margin,
//!   consulted before any bulk copy or archive phase
//! - lock probing: a read-only probe (open for read, read one byte) used at
//!   the point of a failed copy, never during discovery - probing every
//!   file during enumeration is a severe performance hazard on network
//!   storage and is deliberately not offered

use crate::error::{Error, Result};
use fs2::available_space;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Legacy MAX_PATH ceiling on Windows path APIs
#[cfg(windows)]
const PATH_CEILING: usize = 260;

/// PATH_MAX on common Unix filesystems
#[cfg(not(windows))]
const PATH_CEILING: usize = 4096;

/// Free-space safety margin applied on top of the caller's estimate
const SPACE_MARGIN_DIVISOR: u64 = 10; // 10%

/// Poll interval while waiting for a lock to clear
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Reject paths the platform's path API cannot represent
pub fn check_path_length(path: &Path) -> Result<()> {
    #[cfg(windows)]
    {
        // Verbatim paths bypass the legacy MAX_PATH API entirely
        if path.to_string_lossy().starts_with(r"\\?\") {
            return Ok(());
        }
    }

    let len = path.as_os_str().len();
    if len > PATH_CEILING {
        return Err(Error::PathTooLong {
            path: path.to_path_buf(),
            limit: PATH_CEILING,
        });
    }
    Ok(())
}

/// Verify `root`'s filesystem has room for `estimated_bytes` plus margin
///
/// `root` may not exist yet; the nearest existing ancestor is probed, which
/// is the filesystem the new directory would land on anyway.
pub fn check_disk_space(root: &Path, estimated_bytes: u64) -> Result<()> {
    let required = estimated_bytes.saturating_add(estimated_bytes / SPACE_MARGIN_DIVISOR);

    let mut probe = root;
    while !probe.exists() {
        probe = match probe.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        if probe == Path::new(".") {
            break;
        }
    }

    let available = available_space(probe)?;
    if available < required {
        return Err(Error::InsufficientSpace {
            root: root.to_path_buf(),
            required,
            available,
        });
    }

    debug!(
        "Disk space ok under {}: {} bytes free, {} required",
        root.display(),
        available,
        required
    );
    Ok(())
}

/// Read-only probe for whether another process holds `path` open
///
/// Opens the file for read and reads a single byte. Never opens read-write:
/// a write probe can itself induce contention or hang on network storage.
/// A vanished file is reported unlocked (there is nothing left to contend
/// with); an unreadable one is reported locked.
pub fn is_locked(path: &Path) -> bool {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return false,
        Err(_) => return true,
    };

    let mut byte = [0u8; 1];
    file.read(&mut byte).is_err()
}

/// Poll until `path` is readable or `timeout` elapses
///
/// Returns true when the file became (or already was) unlocked. Invoked
/// only after a copy failure, with an explicit budget from configuration.
pub fn wait_until_unlocked(path: &Path, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;

    loop {
        if !is_locked(path) {
            return true;
        }
        if Instant::now() >= deadline {
            warn!(
                "File still locked after {:?}: {}",
                timeout,
                path.display()
            );
            return false;
        }
        std::thread::sleep(LOCK_POLL_INTERVAL);
    }
}
