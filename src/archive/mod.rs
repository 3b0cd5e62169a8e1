// src/archive/mod.rs

//! Ranked-fallback archive creation
//!
//! The pipeline holds an ordered list of strategies and tries them in rank
//! order. A failing strategy gets its partial output cleaned up, the reason
//! logged, and the next rank tried; a strategy that reports success without
//! leaving a real, non-empty artifact is treated exactly like a failure.
//! Only exhausting every rank is fatal, and only for the archive phase -
//! classification results survive a total archive failure.
//!
//! Per build the state machine is
//! `Pending -> TryingStrategy(i) -> {Succeeded | TryingStrategy(i+1) | AllFailed}`
//! with Succeeded and AllFailed terminal.

mod strategy;

pub use strategy::{ArchiveStrategy, ExternalArchiver, FallbackCompression, TarballFallback};

use crate::config::ArchiverEntry;
use crate::error::{Error, Result};
use crate::guard;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Everything a strategy needs to produce one container
#[derive(Debug, Clone)]
pub struct ArchiveTask {
    /// Target container format identifier (opaque to the pipeline)
    pub format: String,
    /// Root directory holding the input set
    pub root: PathBuf,
    /// Input files, relative to `root`
    pub files: Vec<PathBuf>,
    /// Where the container must appear
    pub output: PathBuf,
    /// Total input bytes, for the staging-space preflight
    pub input_bytes: u64,
    /// Compression level hint
    pub compression_level: i32,
    /// Worker thread hint for encoders that accept one
    pub thread_hint: usize,
}

/// How one archive build ended
#[derive(Debug, Clone, Serialize)]
pub struct ArchiveOutcome {
    /// Name of the strategy that produced the artifact
    pub strategy: String,
    /// Zero-based rank of that strategy
    pub rank: usize,
    /// Path of the produced container
    pub output: PathBuf,
    pub success: bool,
    /// Human-readable diagnostic (artifact size on success)
    pub message: String,
}

/// Ordered list of archive strategies, tried first to last
pub struct ArchivePipeline {
    strategies: Vec<Box<dyn ArchiveStrategy>>,
}

impl ArchivePipeline {
    /// Build an empty pipeline; ranks are tried in push order
    pub fn new() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }

    pub fn push(mut self, strategy: Box<dyn ArchiveStrategy>) -> Self {
        self.strategies.push(strategy);
        self
    }

    /// Assemble the production ranking for a target format
    ///
    /// Configured external archivers that list the format come first, in
    /// configuration order; the built-in tarball fallback is always
    /// appended last so the pipeline can never be empty.
    pub fn ranked(archivers: &[ArchiverEntry], format: &str, timeout: Duration) -> Self {
        let mut pipeline = Self::new();
        for entry in archivers {
            if entry.formats.iter().any(|f| f == format) {
                pipeline = pipeline.push(Box::new(ExternalArchiver::new(
                    &entry.name,
                    &entry.program,
                    &entry.args,
                    timeout,
                )));
            }
        }
        pipeline.push(Box::new(TarballFallback::new(
            FallbackCompression::for_format(format),
        )))
    }

    /// Number of ranked strategies
    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Produce the container, falling through ranks on failure
    ///
    /// Returns the outcome of the first strategy that produced a verified
    /// artifact; `ArchiveExhausted` once every rank has failed.
    pub fn build(&self, task: &ArchiveTask) -> Result<ArchiveOutcome> {
        // Preflight: room for a staging copy of the inputs plus an output
        // of comparable size (the guard adds its own margin on top)
        let staging_root = task
            .output
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        guard::check_disk_space(&staging_root, task.input_bytes.saturating_mul(2))?;

        debug!(
            "Archive build pending: {} files -> {} ({} strategies ranked)",
            task.files.len(),
            task.output.display(),
            self.strategies.len()
        );

        for (rank, strategy) in self.strategies.iter().enumerate() {
            info!(
                "Trying archive strategy '{}' (rank {})",
                strategy.name(),
                rank
            );

            if !strategy.is_available() {
                info!(
                    "Archive strategy '{}' unavailable, falling through",
                    strategy.name()
                );
                continue;
            }

            match strategy.attempt(task) {
                Ok(()) => match verify_artifact(&task.output) {
                    Ok(bytes) => {
                        info!(
                            "Archive strategy '{}' produced {} ({} bytes)",
                            strategy.name(),
                            task.output.display(),
                            bytes
                        );
                        return Ok(ArchiveOutcome {
                            strategy: strategy.name().to_string(),
                            rank,
                            output: task.output.clone(),
                            success: true,
                            message: format!("{} bytes", bytes),
                        });
                    }
                    Err(err) => {
                        // Reported success without a real artifact: a failure
                        warn!(
                            "Archive strategy '{}' claimed success without an artifact: {}",
                            strategy.name(),
                            err
                        );
                        remove_partial(&task.output);
                    }
                },
                Err(err) => {
                    warn!(
                        "Archive strategy '{}' failed, falling through: {}",
                        strategy.name(),
                        err
                    );
                    remove_partial(&task.output);
                }
            }
        }

        Err(Error::ArchiveExhausted {
            output: task.output.clone(),
            attempts: self.strategies.len(),
        })
    }
}

impl Default for ArchivePipeline {
    fn default() -> Self {
        Self::new()
    }
}

/// A strategy's success only counts if a non-empty artifact exists
fn verify_artifact(output: &Path) -> Result<u64> {
    match fs::metadata(output) {
        Ok(meta) if meta.len() > 0 => Ok(meta.len()),
        Ok(_) => Err(Error::ArchiveStrategy {
            strategy: "verify".to_string(),
            message: format!("artifact is empty: {}", output.display()),
        }),
        Err(_) => Err(Error::ArchiveStrategy {
            strategy: "verify".to_string(),
            message: format!("artifact missing: {}", output.display()),
        }),
    }
}

/// Best-effort cleanup of whatever a failed strategy left behind
fn remove_partial(output: &Path) {
    if output.exists() {
        if let Err(e) = fs::remove_file(output) {
            warn!(
                "Could not remove partial archive {}: {}",
                output.display(),
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    /// Strategy that always errors
    struct AlwaysFails;

    impl ArchiveStrategy for AlwaysFails {
        fn name(&self) -> &str {
            "always-fails"
        }
        fn attempt(&self, _task: &ArchiveTask) -> Result<()> {
            Err(Error::ArchiveStrategy {
                strategy: "always-fails".to_string(),
                message: "synthetic failure".to_string(),
            })
        }
    }

    /// Strategy that claims success but writes nothing
    struct Liar;

    impl ArchiveStrategy for Liar {
        fn name(&self) -> &str {
            "liar"
        }
        fn attempt(&self, _task: &ArchiveTask) -> Result<()> {
            Ok(())
        }
    }

    /// Strategy that leaves a half-written file and then errors
    struct LeavesDebris;

    impl ArchiveStrategy for LeavesDebris {
        fn name(&self) -> &str {
            "leaves-debris"
        }
        fn attempt(&self, task: &ArchiveTask) -> Result<()> {
            fs::write(&task.output, b"partial").unwrap();
            Err(Error::ArchiveStrategy {
                strategy: "leaves-debris".to_string(),
                message: "died mid-write".to_string(),
            })
        }
    }

    fn make_task(dir: &TempDir) -> ArchiveTask {
        let root = dir.path().join("pack");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("a.txt"), b"alpha").unwrap();
        ArchiveTask {
            format: "tar.zst".to_string(),
            root,
            files: vec![PathBuf::from("a.txt")],
            output: dir.path().join("out.tar.zst"),
            input_bytes: 5,
            compression_level: 3,
            thread_hint: 1,
        }
    }

    #[test]
    fn test_fallback_rescues_failing_ranks() {
        let dir = TempDir::new().unwrap();
        let task = make_task(&dir);

        let pipeline = ArchivePipeline::new()
            .push(Box::new(AlwaysFails))
            .push(Box::new(Liar))
            .push(Box::new(TarballFallback::new(FallbackCompression::Zstd)));

        let outcome = pipeline.build(&task).unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.rank, 2);
        assert_eq!(outcome.strategy, "builtin-tar-zstd");
        assert!(fs::metadata(&task.output).unwrap().len() > 0);
    }

    #[test]
    fn test_partial_output_cleaned_between_ranks() {
        let dir = TempDir::new().unwrap();
        let task = make_task(&dir);

        let pipeline = ArchivePipeline::new()
            .push(Box::new(LeavesDebris))
            .push(Box::new(TarballFallback::new(FallbackCompression::Zstd)));

        let outcome = pipeline.build(&task).unwrap();
        assert!(outcome.success);
        // The surviving artifact is the fallback's, not the debris
        let bytes = fs::read(&task.output).unwrap();
        assert_ne!(bytes.as_slice(), b"partial");
    }

    #[test]
    fn test_all_ranks_failing_is_exhaustion() {
        let dir = TempDir::new().unwrap();
        let task = make_task(&dir);

        let pipeline = ArchivePipeline::new()
            .push(Box::new(AlwaysFails))
            .push(Box::new(Liar));

        let err = pipeline.build(&task).unwrap_err();
        assert!(matches!(
            err,
            Error::ArchiveExhausted { attempts: 2, .. }
        ));
        assert!(!task.output.exists());
    }

    #[test]
    fn test_first_success_wins() {
        let dir = TempDir::new().unwrap();
        let task = make_task(&dir);

        let pipeline = ArchivePipeline::new()
            .push(Box::new(TarballFallback::new(FallbackCompression::Zstd)))
            .push(Box::new(AlwaysFails));

        let outcome = pipeline.build(&task).unwrap();
        assert_eq!(outcome.rank, 0);
    }

    #[test]
    fn test_ranked_always_ends_with_fallback() {
        let pipeline = ArchivePipeline::ranked(&[], "tar.zst", Duration::from_secs(5));
        assert_eq!(pipeline.len(), 1);

        let entry = ArchiverEntry {
            name: "bsarch".to_string(),
            program: "bsarch".to_string(),
            args: vec!["pack".to_string(), "{root}".to_string(), "{output}".to_string()],
            formats: vec!["bsa".to_string()],
        };
        let pipeline = ArchivePipeline::ranked(&[entry.clone()], "bsa", Duration::from_secs(5));
        assert_eq!(pipeline.len(), 2);

        // Format mismatch filters the external tool out
        let pipeline = ArchivePipeline::ranked(&[entry], "tar.zst", Duration::from_secs(5));
        assert_eq!(pipeline.len(), 1);
    }

    #[test]
    fn test_preflight_rejects_absurd_input() {
        let dir = TempDir::new().unwrap();
        let mut task = make_task(&dir);
        task.input_bytes = u64::MAX / 4;

        let pipeline =
            ArchivePipeline::new().push(Box::new(TarballFallback::new(FallbackCompression::Zstd)));
        let err = pipeline.build(&task).unwrap_err();
        assert!(matches!(err, Error::InsufficientSpace { .. }));
    }
}
