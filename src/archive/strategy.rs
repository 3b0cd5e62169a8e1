// src/archive/strategy.rs

//! Archive creation strategies
//!
//! Every strategy implements the same narrow contract: given a task, either
//! produce the container at the output path or fail with a diagnostic. The
//! pipeline does the ranking, fallback, and artifact verification; a
//! strategy only has to try.
//!
//! External archivers are opaque collaborators: a program name, an argument
//! template, and a timeout. The built-in tarball strategy has no external
//! dependency at all, which is what makes it a safe lowest rank.

use crate::error::{Error, Result};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::process::{Command, Stdio};
use std::time::Duration;
use tracing::{debug, info};
use wait_timeout::ChildExt;

use super::ArchiveTask;

/// Cap on captured stderr in diagnostics
const STDERR_TAIL: usize = 500;

/// One ranked method of producing the output container
pub trait ArchiveStrategy: Send + Sync {
    /// Display name for logs and outcomes
    fn name(&self) -> &str;

    /// Cheap availability probe, consulted before an attempt
    fn is_available(&self) -> bool {
        true
    }

    /// Try to produce the container described by `task`
    fn attempt(&self, task: &ArchiveTask) -> Result<()>;
}

/// An external archiver process
///
/// The argument template may use `{root}`, `{output}`, `{manifest}`,
/// `{format}`, `{threads}` and `{level}` placeholders. The manifest is a
/// temporary file holding one relative input path per line, the common
/// list-file convention of container encoders.
pub struct ExternalArchiver {
    name: String,
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl ExternalArchiver {
    pub fn new(name: &str, program: &str, args: &[String], timeout: Duration) -> Self {
        Self {
            name: name.to_string(),
            program: program.to_string(),
            args: args.to_vec(),
            timeout,
        }
    }

    fn fail(&self, message: String) -> Error {
        Error::ArchiveStrategy {
            strategy: self.name.clone(),
            message,
        }
    }
}

impl ArchiveStrategy for ExternalArchiver {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_available(&self) -> bool {
        which::which(&self.program).is_ok()
    }

    fn attempt(&self, task: &ArchiveTask) -> Result<()> {
        let program = which::which(&self.program)
            .map_err(|_| Error::ToolNotFound(self.program.clone()))?;

        let mut manifest = tempfile::NamedTempFile::new()?;
        for relative in &task.files {
            writeln!(manifest, "{}", relative.display())?;
        }
        manifest.flush()?;

        let args: Vec<String> = self
            .args
            .iter()
            .map(|arg| {
                arg.replace("{root}", &task.root.to_string_lossy())
                    .replace("{output}", &task.output.to_string_lossy())
                    .replace("{manifest}", &manifest.path().to_string_lossy())
                    .replace("{format}", &task.format)
                    .replace("{threads}", &task.thread_hint.to_string())
                    .replace("{level}", &task.compression_level.to_string())
            })
            .collect();

        debug!("Invoking {} {:?}", program.display(), args);

        // stderr goes to a temp file rather than a pipe so a chatty tool
        // cannot deadlock against an unread pipe buffer
        let mut stderr_file = tempfile::tempfile()?;
        let stderr_handle = stderr_file.try_clone()?;

        let mut child = Command::new(&program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(stderr_handle))
            .spawn()
            .map_err(|e| self.fail(format!("failed to spawn {}: {}", program.display(), e)))?;

        match child.wait_timeout(self.timeout)? {
            Some(status) if status.success() => {
                info!("External archiver '{}' reported success", self.name);
                Ok(())
            }
            Some(status) => {
                let mut captured = String::new();
                stderr_file.seek(SeekFrom::Start(0))?;
                stderr_file.read_to_string(&mut captured).ok();
                let tail: String = captured
                    .chars()
                    .rev()
                    .take(STDERR_TAIL)
                    .collect::<Vec<_>>()
                    .into_iter()
                    .rev()
                    .collect();
                Err(self.fail(format!(
                    "exited with {}: {}",
                    status,
                    tail.trim()
                )))
            }
            None => {
                child.kill().ok();
                child.wait().ok();
                Err(self.fail(format!("timed out after {:?}", self.timeout)))
            }
        }
    }
}

/// Compression applied by the built-in tarball fallback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackCompression {
    Zstd,
    Gzip,
}

impl FallbackCompression {
    /// Pick a compression from the target format identifier
    pub fn for_format(format: &str) -> Self {
        if format.contains("gz") {
            Self::Gzip
        } else {
            Self::Zstd
        }
    }
}

/// In-process tar container, the always-available lowest rank
///
/// Has no external dependency, so it can only fail for disk or permission
/// reasons - which the pipeline treats as fatal, as there is no rank left
/// below this one.
pub struct TarballFallback {
    compression: FallbackCompression,
}

impl TarballFallback {
    pub fn new(compression: FallbackCompression) -> Self {
        Self { compression }
    }
}

impl ArchiveStrategy for TarballFallback {
    fn name(&self) -> &str {
        match self.compression {
            FallbackCompression::Zstd => "builtin-tar-zstd",
            FallbackCompression::Gzip => "builtin-tar-gzip",
        }
    }

    fn attempt(&self, task: &ArchiveTask) -> Result<()> {
        if let Some(parent) = task.output.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(&task.output)?;

        match self.compression {
            FallbackCompression::Zstd => {
                let encoder = zstd::Encoder::new(file, task.compression_level)?;
                let mut builder = tar::Builder::new(encoder);
                for relative in &task.files {
                    builder.append_path_with_name(task.root.join(relative), relative)?;
                }
                let encoder = builder.into_inner()?;
                encoder.finish()?.sync_all()?;
            }
            FallbackCompression::Gzip => {
                let level = task.compression_level.clamp(0, 9) as u32;
                let encoder =
                    flate2::write::GzEncoder::new(file, flate2::Compression::new(level));
                let mut builder = tar::Builder::new(encoder);
                for relative in &task.files {
                    builder.append_path_with_name(task.root.join(relative), relative)?;
                }
                let encoder = builder.into_inner()?;
                encoder.finish()?.sync_all()?;
            }
        }
        Ok(())
    }
}
