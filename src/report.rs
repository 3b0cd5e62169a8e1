// src/report.rs

//! Serializable run summary for collaborators
//!
//! The CLI prints a human summary; downstream tooling gets the same facts
//! as JSON. Classification counts are always present even when the archive
//! phase failed, and an archive failure is reported distinctly so already
//! classified pack/loose sets can be recovered manually.

use crate::archive::ArchiveOutcome;
use crate::classify::{ClassificationResult, FileError, Reason, Verdict};
use crate::error::{Error, Result};
use crate::walk::WalkReport;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// One file's verdict, as it appears in the report
#[derive(Debug, Clone, Serialize)]
pub struct VerdictEntry {
    pub path: PathBuf,
    pub verdict: Verdict,
    pub reason: Reason,
}

/// Full account of one run
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub candidate_root: PathBuf,
    pub reference_root: PathBuf,
    pub pack_root: PathBuf,
    pub loose_root: PathBuf,
    pub walk: WalkReport,
    pub packed: usize,
    pub loose: usize,
    pub skipped: usize,
    pub cancelled: usize,
    pub errors: Vec<FileError>,
    pub verdicts: Vec<VerdictEntry>,
    /// Present when the archive phase ran and succeeded
    pub archive: Option<ArchiveOutcome>,
    /// Present when the archive phase ran and failed; classification
    /// counts above are still complete
    pub archive_error: Option<String>,
}

impl RunReport {
    pub fn new(
        candidate_root: &Path,
        reference_root: &Path,
        pack_root: &Path,
        loose_root: &Path,
        walk: WalkReport,
        result: &ClassificationResult,
    ) -> Self {
        Self {
            candidate_root: candidate_root.to_path_buf(),
            reference_root: reference_root.to_path_buf(),
            pack_root: pack_root.to_path_buf(),
            loose_root: loose_root.to_path_buf(),
            walk,
            packed: result.packed,
            loose: result.loose,
            skipped: result.skipped,
            cancelled: result.cancelled,
            errors: result.errors.clone(),
            verdicts: result
                .entries
                .iter()
                .map(|c| VerdictEntry {
                    path: c.record.relative.clone(),
                    verdict: c.verdict,
                    reason: c.reason,
                })
                .collect(),
            archive: None,
            archive_error: None,
        }
    }

    pub fn with_archive(mut self, outcome: ArchiveOutcome) -> Self {
        self.archive = Some(outcome);
        self
    }

    pub fn with_archive_error(mut self, message: String) -> Self {
        self.archive_error = Some(message);
        self
    }

    /// Serialize as pretty JSON to `path`
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("cannot serialize report: {}", e)))?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
