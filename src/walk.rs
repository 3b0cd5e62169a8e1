// src/walk.rs

//! Cycle-safe, depth-bounded directory traversal
//!
//! The walker owns its visited set (canonicalized directory identities) and
//! an explicit depth counter, so cyclic symlinks and over-deep subtrees are
//! refused with a warning instead of hanging or overflowing. Entries that
//! are neither regular files nor directories (device files, broken
//! symlinks) are skipped, and an unreadable directory skips only itself.
//!
//! A walk is finite and not restartable; create a fresh [`Walker`] to walk
//! again.

use crate::error::Result;
use std::collections::{HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Default ceiling on directory nesting below the walk root
pub const DEFAULT_MAX_DEPTH: usize = 20;

/// One regular file found under the candidate root
#[derive(Debug, Clone)]
pub struct CandidateFile {
    /// Path relative to the walk root
    pub relative: PathBuf,
    /// Absolute (well, root-joined) path on disk
    pub path: PathBuf,
    /// Size in bytes at enumeration time
    pub size: u64,
}

/// Counters accumulated over one walk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct WalkReport {
    /// Regular files yielded
    pub files: usize,
    /// Directories refused because their canonical identity was already seen
    pub cycles_detected: usize,
    /// Subtrees skipped for exceeding the depth ceiling
    pub depth_skipped: usize,
    /// Directories skipped because they could not be read
    pub unreadable: usize,
    /// Entries ignored for not being a regular file or directory
    pub ignored: usize,
}

/// Lazy, cycle-safe walker over one directory tree
pub struct Walker {
    root: PathBuf,
    max_depth: usize,
    visited: HashSet<PathBuf>,
    stack: Vec<(PathBuf, usize)>,
    ready: VecDeque<CandidateFile>,
    report: WalkReport,
}

impl Walker {
    /// Start a walk at `root` with the default depth ceiling
    pub fn new(root: &Path) -> Result<Self> {
        Self::with_max_depth(root, DEFAULT_MAX_DEPTH)
    }

    /// Start a walk at `root`, refusing to descend more than `max_depth`
    /// directory levels below it
    pub fn with_max_depth(root: &Path, max_depth: usize) -> Result<Self> {
        let canonical = root
            .canonicalize()
            .map_err(|e| crate::Error::from_io(root, e))?;

        let mut visited = HashSet::new();
        visited.insert(canonical);

        Ok(Self {
            root: root.to_path_buf(),
            max_depth,
            visited,
            stack: vec![(root.to_path_buf(), 0)],
            ready: VecDeque::new(),
            report: WalkReport::default(),
        })
    }

    /// Counters for the walk so far (final once the iterator is exhausted)
    pub fn report(&self) -> WalkReport {
        self.report
    }

    /// Read one directory, queueing its files and pushing its subdirectories
    fn scan_dir(&mut self, dir: &Path, depth: usize) {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Skipping unreadable directory {}: {}", dir.display(), e);
                self.report.unreadable += 1;
                return;
            }
        };

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry in {}: {}", dir.display(), e);
                    self.report.unreadable += 1;
                    continue;
                }
            };
            let path = entry.path();

            // Follows symlinks, so a link to a directory walks like one and
            // a broken link fails here and gets ignored.
            let meta = match path.metadata() {
                Ok(meta) => meta,
                Err(_) => {
                    debug!("Ignoring unreadable entry: {}", path.display());
                    self.report.ignored += 1;
                    continue;
                }
            };

            if meta.is_dir() {
                let identity = match path.canonicalize() {
                    Ok(identity) => identity,
                    Err(e) => {
                        warn!("Skipping unresolvable directory {}: {}", path.display(), e);
                        self.report.unreadable += 1;
                        continue;
                    }
                };

                if !self.visited.insert(identity) {
                    warn!(
                        "Refusing to re-enter directory: {}",
                        crate::Error::CircularReference(path.clone())
                    );
                    self.report.cycles_detected += 1;
                    continue;
                }

                if depth + 1 > self.max_depth {
                    warn!(
                        "Skipping subtree: {}",
                        crate::Error::MaxDepthExceeded {
                            path: path.clone(),
                            depth: self.max_depth,
                        }
                    );
                    self.report.depth_skipped += 1;
                    continue;
                }

                self.stack.push((path, depth + 1));
            } else if meta.is_file() {
                let relative = match path.strip_prefix(&self.root) {
                    Ok(relative) => relative.to_path_buf(),
                    Err(_) => {
                        debug!("Entry escapes walk root, ignoring: {}", path.display());
                        self.report.ignored += 1;
                        continue;
                    }
                };
                self.ready.push_back(CandidateFile {
                    relative,
                    path,
                    size: meta.len(),
                });
            } else {
                debug!("Ignoring non-regular entry: {}", path.display());
                self.report.ignored += 1;
            }
        }
    }
}

impl Iterator for Walker {
    type Item = CandidateFile;

    fn next(&mut self) -> Option<CandidateFile> {
        loop {
            if let Some(file) = self.ready.pop_front() {
                self.report.files += 1;
                return Some(file);
            }
            let (dir, depth) = self.stack.pop()?;
            self.scan_dir(&dir, depth);
        }
    }
}
