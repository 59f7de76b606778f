use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use std::path::PathBuf;
use tracing::{debug, info, warn};

use batchsync::CancellationToken;
use cardsync::cli::{Cli, Command};
use cardsync::config::Config;
use cardsync::render;
use cardsync::runner::{self, RunOptions, RunSummary};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    // stdout carries the summary; logs go to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    debug!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Run {
            jobs,
            dry_run,
            lang,
            limit,
            batch_size,
            report,
            retry_from,
        } => {
            let options = RunOptions {
                jobs,
                dry_run,
                lang,
                limit,
                batch_size,
            };
            cmd_run(&config, options, report, retry_from).await
        }
        Command::Check => cmd_check(&config),
        Command::Jobs => {
            println!("{}", render::render_jobs(&config));
            Ok(())
        }
    }
}

async fn cmd_run(
    config: &Config,
    options: RunOptions,
    report_path: Option<PathBuf>,
    retry_from: Option<PathBuf>,
) -> Result<()> {
    let retry = retry_from.as_deref().map(RunSummary::load).transpose()?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after the current batch");
            on_signal.cancel();
        }
    });

    info!(dry_run = options.dry_run, jobs = ?options.jobs, "Starting run");
    let summary = runner::run(config, &options, retry.as_ref(), &cancel).await?;

    println!("{}", render::render_summary(&summary));
    if let Some(path) = report_path {
        summary.save(&path)?;
        println!("{} Report written to {}", "✓".green(), path.display());
    }

    match summary.aborted {
        Some(reason) => Err(eyre::eyre!(reason)),
        None => Ok(()),
    }
}

fn cmd_check(config: &Config) -> Result<()> {
    config.validate()?;
    let destination = runner::build_destination(&config.destination);
    for job in &config.jobs {
        runner::build_job(config, job, &RunOptions::default(), destination.clone())?;
        if !job.source_path.exists() {
            println!("{} {}: source {} does not exist yet", "!".yellow(), job.name, job.source_path.display());
        } else {
            println!("{} {}", "✓".green(), job.name);
        }
    }
    println!("{} {} jobs valid", "✓".green(), config.jobs.len());
    Ok(())
}
