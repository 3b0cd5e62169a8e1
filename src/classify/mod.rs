// src/classify/mod.rs

//! The decision engine: one verdict per candidate file
//!
//! Each candidate is classified exactly once against the reference tree:
//!
//! 1. A matching path rule forces the verdict outright (Loose or Pack).
//! 2. No reference counterpart at the same relative path -> Pack, it is
//!    new content.
//! 3. Identical content to the reference counterpart -> Skip, nothing to
//!    deploy.
//! 4. Differing content -> Loose, the file overrides the reference and
//!    must stay individually addressable, never silently archived.
//! 5. Any per-file error -> Loose, the conservative fallback: mis-packing
//!    an unreadable or ambiguous file is worse than leaving it loose. The
//!    error is recorded, the run continues, and no file is ever dropped.
//!
//! Verdicts are deterministic given (content, path, reference membership);
//! re-running on unchanged inputs reproduces them bit-for-bit.

mod copy;

pub use copy::{copy_atomic, copy_with_retry};

use crate::error::{Error, Result};
use crate::fingerprint::{self, Fingerprint};
use crate::guard;
use crate::rules::{RuleSet, RuleVerdict};
use crate::walk::CandidateFile;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

/// Final placement decision for one file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    /// Safe to place into the archive container
    Pack,
    /// Must remain individually addressable on disk
    Loose,
    /// Identical to the reference; excluded from output entirely
    Skip,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pack => write!(f, "pack"),
            Self::Loose => write!(f, "loose"),
            Self::Skip => write!(f, "skip"),
        }
    }
}

/// Why a verdict was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Reason {
    /// No reference counterpart exists at this relative path
    NewContent,
    /// Content differs from the reference counterpart
    ModifiedOverride,
    /// Content is bit-identical to the reference counterpart
    IdenticalToReference,
    /// A path rule forced the loose verdict
    RuleForcedLoose,
    /// A path rule forced the pack verdict
    RuleForcedPack,
    /// A per-file error downgraded the verdict to the conservative choice
    ErrorFallback,
}

/// One candidate file and everything learned about it
#[derive(Debug, Clone)]
pub struct FileRecord {
    /// Path relative to the candidate root; the record's identity
    pub relative: PathBuf,
    /// Absolute candidate path
    pub candidate: PathBuf,
    /// Reference counterpart, when one exists
    pub reference: Option<PathBuf>,
    /// Size in bytes at enumeration time
    pub size: u64,
    /// Content fingerprint, computed lazily on first comparison
    pub fingerprint: Option<Fingerprint>,
}

impl FileRecord {
    /// Build a record from a traversal hit
    pub fn from_candidate(file: CandidateFile) -> Self {
        Self {
            relative: file.relative,
            candidate: file.path,
            reference: None,
            size: file.size,
            fingerprint: None,
        }
    }
}

/// A record with its (immutable) verdict
#[derive(Debug, Clone)]
pub struct Classified {
    pub record: FileRecord,
    pub verdict: Verdict,
    pub reason: Reason,
}

/// A recorded per-file failure
#[derive(Debug, Clone, Serialize)]
pub struct FileError {
    pub path: PathBuf,
    pub kind: String,
    pub message: String,
}

impl FileError {
    fn new(path: &Path, err: &Error) -> Self {
        Self {
            path: path.to_path_buf(),
            kind: err.label().to_string(),
            message: err.to_string(),
        }
    }
}

/// Aggregate outcome of a classification run
///
/// Owned exclusively by the run that produced it. Counts are
/// order-independent and, together with `cancelled`, always account for
/// every enumerated file.
#[derive(Debug, Default)]
pub struct ClassificationResult {
    pub entries: Vec<Classified>,
    pub packed: usize,
    pub loose: usize,
    pub skipped: usize,
    /// Units abandoned by run-level cancellation, counted rather than dropped
    pub cancelled: usize,
    pub errors: Vec<FileError>,
}

impl ClassificationResult {
    /// Record one classified file, bumping the matching counter
    pub fn record(&mut self, classified: Classified) {
        match classified.verdict {
            Verdict::Pack => self.packed += 1,
            Verdict::Loose => self.loose += 1,
            Verdict::Skip => self.skipped += 1,
        }
        self.entries.push(classified);
    }

    /// Record a per-file failure diagnostic
    pub fn record_error(&mut self, error: FileError) {
        self.errors.push(error);
    }

    /// Record a unit abandoned by cancellation
    pub fn record_cancelled(&mut self) {
        self.cancelled += 1;
    }

    /// Every enumerated file lands in exactly one of these buckets
    pub fn total(&self) -> usize {
        self.packed + self.loose + self.skipped + self.cancelled
    }

    /// Relative paths of the Pack-verdict subset, for the archive phase
    pub fn pack_set(&self) -> Vec<PathBuf> {
        self.entries
            .iter()
            .filter(|c| c.verdict == Verdict::Pack)
            .map(|c| c.record.relative.clone())
            .collect()
    }

    /// Total bytes across the Pack-verdict subset
    pub fn pack_bytes(&self) -> u64 {
        self.entries
            .iter()
            .filter(|c| c.verdict == Verdict::Pack)
            .map(|c| c.record.size)
            .sum()
    }
}

/// Classifies candidates against the reference tree and performs the
/// corresponding copy
///
/// Reference fingerprints are cached behind a lock so each reference file
/// is hashed at most once per run no matter how many workers consult it.
pub struct DecisionEngine {
    reference_root: PathBuf,
    pack_root: PathBuf,
    loose_root: PathBuf,
    rules: RuleSet,
    lock_wait: Option<Duration>,
    reference_cache: Mutex<HashMap<PathBuf, Fingerprint>>,
}

impl DecisionEngine {
    pub fn new(
        reference_root: &Path,
        pack_root: &Path,
        loose_root: &Path,
        rules: RuleSet,
    ) -> Self {
        Self {
            reference_root: reference_root.to_path_buf(),
            pack_root: pack_root.to_path_buf(),
            loose_root: loose_root.to_path_buf(),
            rules,
            lock_wait: None,
            reference_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Budget for the one-shot lock-wait retry on copy failure
    pub fn with_lock_wait(mut self, wait: Duration) -> Self {
        self.lock_wait = Some(wait);
        self
    }

    /// Classify one record (no side effects)
    fn decide(&self, record: &mut FileRecord) -> Result<(Verdict, Reason)> {
        match self.rules.classify(&record.relative) {
            RuleVerdict::ForcedLoose => return Ok((Verdict::Loose, Reason::RuleForcedLoose)),
            RuleVerdict::ForcedPack => return Ok((Verdict::Pack, Reason::RuleForcedPack)),
            RuleVerdict::NoOpinion => {}
        }

        let reference = self.reference_root.join(&record.relative);
        let ref_meta = match fs::metadata(&reference) {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok((Verdict::Pack, Reason::NewContent));
            }
            Err(e) => return Err(Error::from_io(&reference, e)),
        };
        record.reference = Some(reference.clone());

        // Differing sizes prove differing content; no hashing needed
        if ref_meta.len() != record.size {
            return Ok((Verdict::Loose, Reason::ModifiedOverride));
        }

        // Differing 4 KiB prefixes also prove differing content
        if fingerprint::prefix_hash(&record.candidate)? != fingerprint::prefix_hash(&reference)? {
            return Ok((Verdict::Loose, Reason::ModifiedOverride));
        }

        // Equality requires the full digest on both sides
        let candidate_fp = fingerprint::fingerprint_file(&record.candidate)?;
        let reference_fp = self.reference_fingerprint(&reference)?;
        let identical = candidate_fp == reference_fp;
        record.fingerprint = Some(candidate_fp);

        if identical {
            Ok((Verdict::Skip, Reason::IdenticalToReference))
        } else {
            Ok((Verdict::Loose, Reason::ModifiedOverride))
        }
    }

    fn reference_fingerprint(&self, path: &Path) -> Result<Fingerprint> {
        {
            let cache = self
                .reference_cache
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(fp) = cache.get(path) {
                return Ok(fp.clone());
            }
        }

        // Hash outside the lock; a duplicate computation under contention
        // is cheaper than serializing all workers on one file's I/O.
        let fp = fingerprint::fingerprint_file(path)?;
        self.reference_cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(path.to_path_buf(), fp.clone());
        Ok(fp)
    }

    fn copy_to(&self, record: &FileRecord, root: &Path) -> Result<()> {
        let dest = root.join(&record.relative);
        guard::check_path_length(&dest)?;
        copy_with_retry(&record.candidate, &dest, self.lock_wait)?;
        Ok(())
    }

    /// Classify one record and perform its copy; per-file errors downgrade
    /// to Loose/ErrorFallback with a recorded diagnostic
    ///
    /// Returns the classified record plus any diagnostics it produced. A
    /// Skip verdict never copies anything.
    pub fn process(&self, file: CandidateFile) -> (Classified, Vec<FileError>) {
        let mut record = FileRecord::from_candidate(file);
        let mut errors = Vec::new();

        let (mut verdict, mut reason) = match self.decide(&mut record) {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(
                    "Classification of {} failed ({}), keeping it loose",
                    record.candidate.display(),
                    err
                );
                errors.push(FileError::new(&record.candidate, &err));
                (Verdict::Loose, Reason::ErrorFallback)
            }
        };

        if verdict == Verdict::Pack {
            if let Err(err) = self.copy_to(&record, &self.pack_root) {
                // The staged copy never became visible, so the pack root is
                // clean and the file can safely fall back to loose.
                warn!(
                    "Pack copy of {} failed ({}), downgrading to loose",
                    record.relative.display(),
                    err
                );
                errors.push(FileError::new(&record.candidate, &err));
                verdict = Verdict::Loose;
                reason = Reason::ErrorFallback;
            }
        }

        if verdict == Verdict::Loose {
            if let Err(err) = self.copy_to(&record, &self.loose_root) {
                warn!(
                    "Loose copy of {} failed: {}",
                    record.relative.display(),
                    err
                );
                errors.push(FileError::new(&record.candidate, &err));
            }
        } else if verdict == Verdict::Skip {
            debug!("Skipping identical file: {}", record.relative.display());
        }

        (
            Classified {
                record,
                verdict,
                reason,
            },
            errors,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{RuleAction, RuleEntry};
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        reference: PathBuf,
        candidates: PathBuf,
        pack: PathBuf,
        loose: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let fixture = Self {
                reference: dir.path().join("reference"),
                candidates: dir.path().join("candidates"),
                pack: dir.path().join("pack"),
                loose: dir.path().join("loose"),
                _dir: dir,
            };
            fs::create_dir_all(&fixture.reference).unwrap();
            fs::create_dir_all(&fixture.candidates).unwrap();
            fixture
        }

        fn engine(&self) -> DecisionEngine {
            DecisionEngine::new(&self.reference, &self.pack, &self.loose, RuleSet::default())
        }

        fn engine_with_rules(&self, entries: &[RuleEntry]) -> DecisionEngine {
            DecisionEngine::new(
                &self.reference,
                &self.pack,
                &self.loose,
                RuleSet::compile(entries).unwrap(),
            )
        }

        fn candidate(&self, relative: &str, content: &[u8]) -> CandidateFile {
            let path = self.candidates.join(relative);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, content).unwrap();
            CandidateFile {
                relative: PathBuf::from(relative),
                path,
                size: content.len() as u64,
            }
        }

        fn reference_file(&self, relative: &str, content: &[u8]) {
            let path = self.reference.join(relative);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, content).unwrap();
        }
    }

    #[test]
    fn test_new_content_packs() {
        let fx = Fixture::new();
        let engine = fx.engine();
        let (classified, errors) = engine.process(fx.candidate("meshes/new.nif", b"fresh"));

        assert_eq!(classified.verdict, Verdict::Pack);
        assert_eq!(classified.reason, Reason::NewContent);
        assert!(errors.is_empty());
        assert!(fx.pack.join("meshes/new.nif").exists());
        assert!(!fx.loose.join("meshes/new.nif").exists());
    }

    #[test]
    fn test_identical_skips_and_copies_nothing() {
        let fx = Fixture::new();
        fx.reference_file("data/base.txt", b"same bytes");
        let engine = fx.engine();
        let (classified, errors) = engine.process(fx.candidate("data/base.txt", b"same bytes"));

        assert_eq!(classified.verdict, Verdict::Skip);
        assert_eq!(classified.reason, Reason::IdenticalToReference);
        assert!(errors.is_empty());
        assert!(!fx.pack.join("data/base.txt").exists());
        assert!(!fx.loose.join("data/base.txt").exists());
    }

    #[test]
    fn test_modified_override_goes_loose() {
        let fx = Fixture::new();
        fx.reference_file("data/tweak.ini", b"original");
        let engine = fx.engine();
        let (classified, _) = engine.process(fx.candidate("data/tweak.ini", b"modified"));

        assert_eq!(classified.verdict, Verdict::Loose);
        assert_eq!(classified.reason, Reason::ModifiedOverride);
        assert!(fx.loose.join("data/tweak.ini").exists());
        assert!(!fx.pack.join("data/tweak.ini").exists());
    }

    #[test]
    fn test_same_size_different_content_goes_loose() {
        // Sizes match, so the engine must reach for hashes
        let fx = Fixture::new();
        fx.reference_file("data/a.bin", b"AAAA");
        let engine = fx.engine();
        let (classified, _) = engine.process(fx.candidate("data/a.bin", b"BBBB"));

        assert_eq!(classified.verdict, Verdict::Loose);
        assert_eq!(classified.reason, Reason::ModifiedOverride);
    }

    #[test]
    fn test_forced_loose_beats_identical_content() {
        let fx = Fixture::new();
        fx.reference_file("interface/hud.swf", b"bytes");
        let engine = fx.engine_with_rules(&[RuleEntry {
            pattern: "interface/*".to_string(),
            force: RuleAction::Loose,
        }]);
        let (classified, _) = engine.process(fx.candidate("interface/hud.swf", b"bytes"));

        assert_eq!(classified.verdict, Verdict::Loose);
        assert_eq!(classified.reason, Reason::RuleForcedLoose);
        assert!(fx.loose.join("interface/hud.swf").exists());
    }

    #[test]
    fn test_forced_pack_skips_content_comparison() {
        let fx = Fixture::new();
        fx.reference_file("meshes/static.nif", b"bytes");
        let engine = fx.engine_with_rules(&[RuleEntry {
            pattern: "meshes/*".to_string(),
            force: RuleAction::Pack,
        }]);
        let (classified, _) = engine.process(fx.candidate("meshes/static.nif", b"bytes"));

        assert_eq!(classified.verdict, Verdict::Pack);
        assert_eq!(classified.reason, Reason::RuleForcedPack);
        assert!(fx.pack.join("meshes/static.nif").exists());
    }

    #[test]
    fn test_vanished_candidate_falls_back_loose() {
        let fx = Fixture::new();
        fx.reference_file("data/f.txt", b"ref");
        let engine = fx.engine();
        let file = fx.candidate("data/f.txt", b"ref");
        fs::remove_file(&file.path).unwrap();

        let (classified, errors) = engine.process(file);
        assert_eq!(classified.verdict, Verdict::Loose);
        assert_eq!(classified.reason, Reason::ErrorFallback);
        // One error from classification, one from the doomed loose copy
        assert!(!errors.is_empty());
    }

    #[test]
    fn test_determinism_across_runs() {
        let fx = Fixture::new();
        fx.reference_file("a.txt", b"one");
        fx.reference_file("b.txt", b"two");

        for _ in 0..2 {
            let engine = fx.engine();
            let (same, _) = engine.process(fx.candidate("a.txt", b"one"));
            let (diff, _) = engine.process(fx.candidate("b.txt", b"changed"));
            let (fresh, _) = engine.process(fx.candidate("c.txt", b"new"));

            assert_eq!(same.verdict, Verdict::Skip);
            assert_eq!(diff.verdict, Verdict::Loose);
            assert_eq!(fresh.verdict, Verdict::Pack);
        }
    }

    #[test]
    fn test_reference_cache_reused() {
        let fx = Fixture::new();
        fx.reference_file("shared.bin", b"shared");
        let engine = fx.engine();

        engine.process(fx.candidate("shared.bin", b"shared"));
        {
            let cache = engine.reference_cache.lock().unwrap();
            assert_eq!(cache.len(), 1);
        }
        engine.process(fx.candidate("shared.bin", b"shared"));
        let cache = engine.reference_cache.lock().unwrap();
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_result_accounting() {
        let mut result = ClassificationResult::default();
        result.record(Classified {
            record: FileRecord {
                relative: PathBuf::from("a"),
                candidate: PathBuf::from("/c/a"),
                reference: None,
                size: 1,
                fingerprint: None,
            },
            verdict: Verdict::Pack,
            reason: Reason::NewContent,
        });
        result.record_cancelled();

        assert_eq!(result.packed, 1);
        assert_eq!(result.cancelled, 1);
        assert_eq!(result.total(), 2);
        assert_eq!(result.pack_set(), vec![PathBuf::from("a")]);
        assert_eq!(result.pack_bytes(), 1);
    }
}
