// src/cli.rs

//! CLI definitions for the baler binary
//!
//! This module contains the command-line interface definitions using clap.
//! The actual command implementations are in the `commands` module.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "baler")]
#[command(
    author,
    version,
    about = "Classifies candidate files against a reference tree and bales new content into archives",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Inputs shared by every run
#[derive(Args)]
pub struct RootArgs {
    /// Reference tree the candidates are compared against
    #[arg(long, value_name = "DIR")]
    pub reference: PathBuf,

    /// Candidate tree to classify
    #[arg(long, value_name = "DIR")]
    pub candidates: PathBuf,

    /// Destination root for pack-verdict files
    #[arg(long, value_name = "DIR")]
    pub pack_dir: PathBuf,

    /// Destination root for loose-verdict files
    #[arg(long, value_name = "DIR")]
    pub loose_dir: PathBuf,

    /// Worker thread count (default: available CPU parallelism)
    #[arg(long)]
    pub threads: Option<usize>,

    /// Configuration file with path rules and the archiver registry
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Write a JSON run report to this path
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Classify candidates and populate the pack/loose destination roots
    Classify {
        #[command(flatten)]
        roots: RootArgs,
    },
    /// Classify, then bale the pack set into an archive container
    Pack {
        #[command(flatten)]
        roots: RootArgs,

        /// Output archive path
        #[arg(long, value_name = "FILE")]
        output: PathBuf,

        /// Target container format identifier
        #[arg(long, default_value = "tar.zst")]
        format: String,
    },
}
