//! CLI argument parsing for cardsync

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "cds")]
#[command(author, version, about = "Sync local card data into a remote store in batches", long_about = None)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run sync jobs
    Run {
        /// Job to run; repeat for several (default: all jobs)
        #[arg(short, long = "job")]
        jobs: Vec<String>,

        /// Partition and map records but write nothing
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Only sync records in this language
        #[arg(long)]
        lang: Option<String>,

        /// Read at most this many source records per job
        #[arg(long)]
        limit: Option<usize>,

        /// Records per batch, overriding the config
        #[arg(short, long)]
        batch_size: Option<usize>,

        /// Write the run summary as JSON to this path
        #[arg(short, long)]
        report: Option<PathBuf>,

        /// Re-run only the failed batches listed in an earlier JSON report
        #[arg(long, value_name = "REPORT")]
        retry_from: Option<PathBuf>,
    },

    /// Validate the configuration and every job without running anything
    Check,

    /// List configured jobs
    Jobs,
}
