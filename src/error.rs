// src/error.rs

//! Unified error type for the classification and packaging pipeline
//!
//! Per-file failures are recovered by the Decision Engine (downgraded to a
//! conservative Loose verdict with the error recorded); phase-level failures
//! (disk space, archive exhaustion) abort only the phase that hit them.

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, Error>;

/// All failure modes of the pipeline
#[derive(Error, Debug)]
pub enum Error {
    #[error("path exceeds the {limit}-byte platform ceiling: {path}")]
    PathTooLong { path: PathBuf, limit: usize },

    #[error(
        "insufficient disk space under {root}: need {required} bytes (with margin), {available} available"
    )]
    InsufficientSpace {
        root: PathBuf,
        required: u64,
        available: u64,
    },

    #[error("file still locked after waiting {waited:?}: {path}")]
    FileLocked { path: PathBuf, waited: Duration },

    #[error("permission denied: {0}")]
    PermissionDenied(PathBuf),

    #[error("file vanished during operation: {0}")]
    FileVanished(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("circular directory reference: {0}")]
    CircularReference(PathBuf),

    #[error("maximum walk depth {depth} exceeded at {path}")]
    MaxDepthExceeded { path: PathBuf, depth: usize },

    #[error("required tool not found: {0}")]
    ToolNotFound(String),

    #[error("archive strategy '{strategy}' failed: {message}")]
    ArchiveStrategy { strategy: String, message: String },

    #[error("all {attempts} archive strategies failed for {output}")]
    ArchiveExhausted { output: PathBuf, attempts: usize },

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid rule pattern: {0}")]
    Pattern(#[from] glob::PatternError),
}

impl Error {
    /// Classify an I/O error against the path it occurred on
    ///
    /// Maps permission and not-found conditions to their distinct kinds so
    /// per-file diagnostics stay actionable; everything else stays generic.
    pub fn from_io(path: &std::path::Path, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            io::ErrorKind::NotFound => Self::FileVanished(path.to_path_buf()),
            _ => Self::Io(err),
        }
    }

    /// Short stable label for reports and logs
    pub fn label(&self) -> &'static str {
        match self {
            Self::PathTooLong { .. } => "path-too-long",
            Self::InsufficientSpace { .. } => "insufficient-space",
            Self::FileLocked { .. } => "file-locked",
            Self::PermissionDenied(_) => "permission-denied",
            Self::FileVanished(_) => "file-vanished",
            Self::Io(_) => "io",
            Self::CircularReference(_) => "circular-reference",
            Self::MaxDepthExceeded { .. } => "max-depth-exceeded",
            Self::ToolNotFound(_) => "tool-not-found",
            Self::ArchiveStrategy { .. } => "archive-strategy",
            Self::ArchiveExhausted { .. } => "archive-exhausted",
            Self::InvalidPath(_) => "invalid-path",
            Self::Config(_) => "config",
            Self::Pattern(_) => "pattern",
        }
    }
}
