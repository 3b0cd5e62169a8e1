// src/pool.rs

//! Bounded worker pool for per-file classification
//!
//! Each file's classification and copy is an independent unit of work;
//! workers share no per-file state. The only synchronized structure is the
//! aggregate result behind a single mutex. One file's failure never aborts
//! the others, completion order is irrelevant, and every input file is
//! accounted for in the aggregate (classified, errored, or cancelled).

use crate::classify::{ClassificationResult, DecisionEngine};
use crate::error::{Error, Result};
use crate::walk::CandidateFile;
use rayon::prelude::*;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

/// Fixed-size pool of classification workers
pub struct WorkerPool {
    threads: usize,
    cancel: Arc<AtomicBool>,
}

impl WorkerPool {
    /// Create a pool; `threads` defaults to available CPU parallelism
    pub fn new(threads: Option<usize>) -> Self {
        let threads = threads.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        });
        Self {
            threads: threads.max(1),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Configured worker count
    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Flag a caller can trip to stop the run between files
    ///
    /// Files whose copy already completed stay valid; a file mid-copy is
    /// discarded by the atomic copy staging, never left half-written under
    /// its final name.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Run the engine over every candidate, in parallel
    pub fn run(
        &self,
        engine: &DecisionEngine,
        files: Vec<CandidateFile>,
    ) -> Result<ClassificationResult> {
        self.run_with_progress(engine, files, || {})
    }

    /// Run with a per-file completion callback (progress bars etc.)
    pub fn run_with_progress<F>(
        &self,
        engine: &DecisionEngine,
        files: Vec<CandidateFile>,
        on_file: F,
    ) -> Result<ClassificationResult>
    where
        F: Fn() + Sync,
    {
        let total = files.len();
        info!(
            "Classifying {} candidates across {} workers",
            total, self.threads
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .build()
            .map_err(|e| Error::Config(format!("failed to build worker pool: {}", e)))?;

        let aggregate = Mutex::new(ClassificationResult::default());

        pool.install(|| {
            files.into_par_iter().for_each(|file| {
                if self.cancel.load(Ordering::Relaxed) {
                    let mut result = aggregate
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner());
                    result.record_cancelled();
                    return;
                }

                let (classified, errors) = engine.process(file);

                // Single writer at a time on the aggregate; everything
                // per-file happened outside the lock.
                let mut result = aggregate
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                for error in errors {
                    result.record_error(error);
                }
                result.record(classified);
                drop(result);

                on_file();
            });
        });

        let result = aggregate.into_inner().unwrap_or_else(|p| p.into_inner());
        debug!(
            "Classification done: {} pack, {} loose, {} skip, {} cancelled, {} errors",
            result.packed,
            result.loose,
            result.skipped,
            result.cancelled,
            result.errors.len()
        );
        debug_assert_eq!(result.total(), total);
        Ok(result)
    }
}
