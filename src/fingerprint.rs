// src/fingerprint.rs

//! Streaming content fingerprints
//!
//! Two files are considered identical iff their SHA-256 digests are
//! bit-equal; collision risk is accepted as a property of the digest, not
//! engineered around. Files are read in bounded chunks so multi-gigabyte
//! assets never get materialized in memory.
//!
//! A cheap 128-bit XXH3 prefix hash over the first 4 KiB is also provided.
//! It is a one-way shortcut: differing prefix hashes prove differing
//! content, but equal prefix hashes prove nothing.

use crate::error::{Error, Result};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::warn;
use xxhash_rust::xxh3::xxh3_128;

/// Read buffer for streaming digests
const CHUNK_SIZE: usize = 64 * 1024;

/// Prefix window for the fast negative test
const PREFIX_WINDOW: usize = 4 * 1024;

/// Files above this size trigger a non-fatal advisory (they still hash fine,
/// the operator just gets a heads-up about the time it will take)
pub const LARGE_FILE_ADVISORY: u64 = 2 * 1024 * 1024 * 1024;

/// A SHA-256 content fingerprint, hex-encoded
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    value: String,
}

impl Fingerprint {
    /// Hex digest string (64 lowercase characters)
    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

/// Fingerprint a byte slice (tests and small in-memory content)
pub fn fingerprint_bytes(data: &[u8]) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(data);
    Fingerprint {
        value: format!("{:x}", hasher.finalize()),
    }
}

/// Fingerprint a file by streaming its content in bounded chunks
///
/// Never loads the whole file into memory. Permission and vanished-file
/// conditions surface as their distinct error kinds rather than crashing
/// the caller.
pub fn fingerprint_file(path: &Path) -> Result<Fingerprint> {
    let mut file = File::open(path).map_err(|e| Error::from_io(path, e))?;

    let size = file
        .metadata()
        .map_err(|e| Error::from_io(path, e))?
        .len();
    if size > LARGE_FILE_ADVISORY {
        warn!(
            "Fingerprinting unusually large file ({} bytes): {}",
            size,
            path.display()
        );
    }

    let mut hasher = Sha256::new();
    let mut buffer = [0u8; CHUNK_SIZE];

    loop {
        let n = file.read(&mut buffer).map_err(|e| Error::from_io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(Fingerprint {
        value: format!("{:x}", hasher.finalize()),
    })
}

/// Hash the first 4 KiB of a file with XXH3-128
///
/// Differing results prove the files differ. Equal results prove nothing;
/// callers must fall through to [`fingerprint_file`] for a positive match.
pub fn prefix_hash(path: &Path) -> Result<u128> {
    let mut file = File::open(path).map_err(|e| Error::from_io(path, e))?;
    let mut buffer = [0u8; PREFIX_WINDOW];
    let mut filled = 0;

    // A single read may return short even mid-file, so loop until the
    // window is full or the file ends.
    while filled < PREFIX_WINDOW {
        let n = file
            .read(&mut buffer[filled..])
            .map_err(|e| Error::from_io(path, e))?;
        if n == 0 {
            break;
        }
        filled += n;
    }

    Ok(xxh3_128(&buffer[..filled]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_fingerprint_bytes_known_value() {
        let fp = fingerprint_bytes(b"Hello, World!");
        assert_eq!(
            fp.as_str(),
            "dffd6021bb2bd5b0af676290809ec3a53191dd81c7f70a4b28688a362182986f"
        );
    }

    #[test]
    fn test_fingerprint_file_matches_bytes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.bin");
        let content = b"streamed content";
        fs::write(&path, content).unwrap();

        let from_file = fingerprint_file(&path).unwrap();
        let from_bytes = fingerprint_bytes(content);
        assert_eq!(from_file, from_bytes);
    }

    #[test]
    fn test_fingerprint_streaming_crosses_chunk_boundary() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("big.bin");
        // Larger than one read buffer so the loop runs more than once
        let content = vec![0xabu8; CHUNK_SIZE * 2 + 17];
        fs::write(&path, &content).unwrap();

        let from_file = fingerprint_file(&path).unwrap();
        let from_bytes = fingerprint_bytes(&content);
        assert_eq!(from_file, from_bytes);
    }

    #[test]
    fn test_fingerprint_missing_file_is_vanished() {
        let dir = TempDir::new().unwrap();
        let err = fingerprint_file(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, Error::FileVanished(_)));
    }

    #[test]
    fn test_prefix_hash_detects_early_difference() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.bin");
        let b = dir.path().join("b.bin");
        fs::write(&a, b"same prefix? no - A").unwrap();
        fs::write(&b, b"same prefix? no - B").unwrap();

        assert_ne!(prefix_hash(&a).unwrap(), prefix_hash(&b).unwrap());
    }

    #[test]
    fn test_prefix_hash_equal_for_shared_prefix() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.bin");
        let b = dir.path().join("b.bin");
        // Identical first 4 KiB, divergence after the window
        let mut content_a = vec![0x42u8; PREFIX_WINDOW];
        let mut content_b = content_a.clone();
        content_a.push(1);
        content_b.push(2);
        fs::write(&a, &content_a).unwrap();
        fs::write(&b, &content_b).unwrap();

        assert_eq!(prefix_hash(&a).unwrap(), prefix_hash(&b).unwrap());
        // The full fingerprint still tells them apart
        assert_ne!(
            fingerprint_file(&a).unwrap(),
            fingerprint_file(&b).unwrap()
        );
    }

    #[test]
    fn test_prefix_hash_short_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tiny.bin");
        fs::write(&path, b"x").unwrap();
        assert_eq!(prefix_hash(&path).unwrap(), xxh3_128(b"x"));
    }
}
