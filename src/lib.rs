// src/lib.rs

//! Baler
//!
//! Classifies a large, unordered set of candidate files against a reference
//! file tree, deciding per file whether it is new content (packed into an
//! archive container), an intentional override (kept loose and individually
//! addressable), or a duplicate (discarded). The pack set is then baled
//! into a container through a ranked list of archive strategies with
//! graceful degradation.
//!
//! # Architecture
//!
//! - Content identity: streaming SHA-256 fingerprints, never whole-file
//!   reads
//! - One deterministic verdict per file; per-file errors downgrade to a
//!   conservative loose placement, never abort the run
//! - Atomic copies: staged writes, nothing partial ever visible under a
//!   final name
//! - Bounded worker pool over a single synchronized aggregate
//! - Archive strategies tried in rank order, ending at a built-in fallback
//!   with no external dependency

pub mod archive;
pub mod classify;
pub mod config;
mod error;
pub mod fingerprint;
pub mod guard;
pub mod pool;
pub mod report;
pub mod rules;
pub mod walk;

pub use archive::{ArchiveOutcome, ArchivePipeline, ArchiveStrategy, ArchiveTask};
pub use classify::{
    Classified, ClassificationResult, DecisionEngine, FileRecord, Reason, Verdict,
};
pub use error::{Error, Result};
pub use fingerprint::Fingerprint;
pub use pool::WorkerPool;
pub use rules::{RuleAction, RuleEntry, RuleSet, RuleVerdict};
pub use walk::{CandidateFile, WalkReport, Walker};
