// src/commands.rs

//! Command handlers for the baler CLI
//!
//! Thin glue over the library: load config, enumerate, classify through
//! the worker pool, then optionally run the archive phase. The archive
//! phase only starts after classification fully drains, and its failure is
//! reported distinctly - the classified pack/loose sets stay on disk
//! either way.

use anyhow::{Context, Result};
use baler::archive::{ArchivePipeline, ArchiveTask};
use baler::classify::{ClassificationResult, DecisionEngine};
use baler::config::PackConfig;
use baler::guard;
use baler::pool::WorkerPool;
use baler::report::RunReport;
use baler::walk::{WalkReport, Walker};
use indicatif::ProgressBar;
use std::path::Path;
use tracing::{info, warn};

use crate::cli::RootArgs;

pub fn classify(roots: &RootArgs) -> Result<()> {
    let config = load_config(roots)?;
    let (result, walk) = run_classification(roots, &config)?;
    print_summary(&result);

    if let Some(report_path) = &roots.report {
        build_report(roots, walk, &result).write_json(report_path)?;
        println!("Report written to {}", report_path.display());
    }
    Ok(())
}

pub fn pack(roots: &RootArgs, output: &Path, format: &str) -> Result<()> {
    let config = load_config(roots)?;
    let (result, walk) = run_classification(roots, &config)?;
    print_summary(&result);

    // Hard barrier: the archive phase consumes the complete pack set
    let attempt = if result.packed == 0 {
        info!("Pack set is empty, skipping the archive phase");
        None
    } else {
        let task = ArchiveTask {
            format: format.to_string(),
            root: roots.pack_dir.clone(),
            files: result.pack_set(),
            output: output.to_path_buf(),
            input_bytes: result.pack_bytes(),
            compression_level: config.compression_level,
            thread_hint: WorkerPool::new(config.threads).threads(),
        };
        let pipeline =
            ArchivePipeline::ranked(&config.archivers, format, config.archiver_timeout());
        Some(pipeline.build(&task))
    };

    let mut report = build_report(roots, walk, &result);
    let archive_error = match attempt {
        None => None,
        Some(Ok(outcome)) => {
            println!(
                "Archive ready: {} (strategy '{}', rank {})",
                outcome.output.display(),
                outcome.strategy,
                outcome.rank
            );
            report = report.with_archive(outcome);
            None
        }
        Some(Err(err)) => {
            report = report.with_archive_error(err.to_string());
            Some(err)
        }
    };

    if let Some(report_path) = &roots.report {
        report.write_json(report_path)?;
        println!("Report written to {}", report_path.display());
    }

    match archive_error {
        None => Ok(()),
        // Classification finished and was reported above; only the archive
        // phase failed
        Some(err) => Err(err)
            .context("archive phase failed; the classified pack and loose sets remain on disk"),
    }
}

fn load_config(roots: &RootArgs) -> Result<PackConfig> {
    let mut config = PackConfig::load_or_default(roots.config.as_deref())?;
    if roots.threads.is_some() {
        config.threads = roots.threads;
    }
    Ok(config)
}

fn run_classification(
    roots: &RootArgs,
    config: &PackConfig,
) -> Result<(ClassificationResult, WalkReport)> {
    let rules = config.rule_set()?;

    let mut walker = Walker::with_max_depth(&roots.candidates, config.max_depth)?;
    let files: Vec<_> = walker.by_ref().collect();
    let walk = walker.report();
    info!("Enumerated {} candidate files", files.len());

    // Worst case every candidate gets copied; check both destinations
    // before the bulk phase starts
    let total_bytes: u64 = files.iter().map(|f| f.size).sum();
    guard::check_disk_space(&roots.pack_dir, total_bytes)?;
    guard::check_disk_space(&roots.loose_dir, total_bytes)?;

    let mut engine =
        DecisionEngine::new(&roots.reference, &roots.pack_dir, &roots.loose_dir, rules);
    if let Some(wait) = config.lock_wait() {
        engine = engine.with_lock_wait(wait);
    }

    let pool = WorkerPool::new(config.threads);
    let bar = ProgressBar::new(files.len() as u64);
    let result = pool.run_with_progress(&engine, files, || bar.inc(1))?;
    bar.finish_and_clear();

    Ok((result, walk))
}

fn build_report(roots: &RootArgs, walk: WalkReport, result: &ClassificationResult) -> RunReport {
    RunReport::new(
        &roots.candidates,
        &roots.reference,
        &roots.pack_dir,
        &roots.loose_dir,
        walk,
        result,
    )
}

fn print_summary(result: &ClassificationResult) {
    println!(
        "Classification: {} pack, {} loose, {} skipped ({} cancelled, {} errors)",
        result.packed,
        result.loose,
        result.skipped,
        result.cancelled,
        result.errors.len()
    );
    for error in &result.errors {
        warn!(
            "{}: [{}] {}",
            error.path.display(),
            error.kind,
            error.message
        );
    }
}
