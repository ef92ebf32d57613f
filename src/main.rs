// Command-line surface for the preserv integrity checker

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use colored::Colorize;
use humansize::{format_size, DECIMAL};
use indicatif::{ProgressBar, ProgressStyle};

use preserv::config::DEFAULT_CONFIG_FILE;
use preserv::{
    ActivityLog, Config, GenerateEngine, ManifestStore, VerificationReport, VerifyEngine,
};

/// Longest list of affected files printed per category
const DETAIL_LIMIT: usize = 10;

#[derive(Parser)]
#[command(name = "preserv", version, about = "Archive integrity checker")]
struct Cli {
    /// Path to the manifest file
    #[arg(long, global = true)]
    manifest: Option<PathBuf>,

    /// Path to the activity log file
    #[arg(long, global = true)]
    log: Option<PathBuf>,

    /// Path to the configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Worker pool size (defaults to available parallelism)
    #[arg(long, global = true)]
    threads: Option<usize>,

    /// Suppress progress output
    #[arg(long, short, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate a fresh manifest for an archive
    Generate {
        /// Archive root to scan (falls back to the configured path)
        archive: Option<PathBuf>,
    },
    /// Verify an archive against its manifest
    Verify {
        /// Archive root to scan (falls back to the configured path)
        archive: Option<PathBuf>,
        /// Add files missing from the manifest to it
        #[arg(long)]
        add_new: bool,
        /// Rehash every file, ignoring the size+mtime shortcut
        #[arg(long)]
        deep: bool,
    },
    /// Show statistics about the current manifest
    Stats,
    /// Show the tail of the activity log
    Log {
        /// Number of lines to show
        #[arg(long, default_value_t = 100)]
        lines: usize,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            ExitCode::from(2)
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    let mut config = Config::load(&config_path)?;
    if cli.threads.is_some() {
        config.threads = cli.threads;
    }
    let manifest_path = cli.manifest.clone().unwrap_or_else(|| config.manifest_file.clone());
    let log_path = cli.log.clone().unwrap_or_else(|| config.log_file.clone());

    match cli.command {
        Command::Generate { archive } => {
            let archive = resolve_archive(archive, &config)?;
            let log = Arc::new(ActivityLog::open(&log_path, config.log_level)?);
            let store = ManifestStore::new(&manifest_path);

            let bar = progress_spinner(cli.quiet);
            let mut engine = GenerateEngine::new(store, log)
                .with_threads(config.worker_threads())
                .with_excluded(&config_path);
            if let Some(bar) = bar.clone() {
                engine = engine.with_progress_callback(move |p| {
                    bar.set_message(format!(
                        "{} OK, {} failed | {}",
                        p.files_processed, p.files_failed, p.current_file
                    ));
                });
            }

            let (manifest, summary) = engine.run(&archive)?;
            if let Some(bar) = bar {
                bar.finish_and_clear();
            }

            println!("Manifest generated: {} records", manifest.len());
            println!("  Files processed: {}", summary.files_processed);
            println!("  Files failed:    {}", summary.files_failed);
            println!(
                "  Total size:      {}",
                format_size(summary.total_bytes, DECIMAL)
            );
            println!("  Duration:        {:.2}s", summary.duration.as_secs_f64());
            if summary.cancelled {
                println!("{}", "Run cancelled; manifest left untouched".yellow());
                return Ok(ExitCode::from(1));
            }

            remember_run(&mut config, &config_path, &archive);
            Ok(ExitCode::SUCCESS)
        }

        Command::Verify { archive, add_new, deep } => {
            let archive = resolve_archive(archive, &config)?;
            let log = Arc::new(ActivityLog::open(&log_path, config.log_level)?);
            let store = ManifestStore::new(&manifest_path);
            let mut manifest = store.load()?;

            let bar = progress_bar(cli.quiet, manifest.len() as u64);
            let mut engine = VerifyEngine::new(store, log)
                .with_add_new(add_new || config.add_new_files)
                .with_deep_verify(deep || config.deep_verify)
                .with_threads(config.worker_threads())
                .with_excluded(&config_path);
            if let Some(bar) = bar.clone() {
                engine = engine.with_progress_callback(move |p| {
                    bar.set_position(p.files_checked as u64);
                    bar.set_message(format!("{}: {}", p.outcome.label(), p.relative_path));
                });
            }

            let report = engine.run(&archive, &mut manifest)?;
            if let Some(bar) = bar {
                bar.finish_and_clear();
            }

            display_report(&report);
            remember_run(&mut config, &config_path, &archive);

            if report.is_clean() {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::from(1))
            }
        }

        Command::Stats => {
            let store = ManifestStore::new(&manifest_path);
            let stats = store.load()?.stats();
            println!("Manifest: {}", manifest_path.display());
            println!("  Tracked files: {}", stats.file_count);
            println!("  Total size:    {}", format_size(stats.total_bytes, DECIMAL));
            match stats.last_generated {
                Some(t) => println!("  Last generated: {}", t.to_rfc3339()),
                None => println!("  Last generated: never"),
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Log { lines } => {
            print!("{}", ActivityLog::tail(&log_path, lines)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn resolve_archive(archive: Option<PathBuf>, config: &Config) -> Result<PathBuf> {
    archive
        .or_else(|| config.archive_path.clone())
        .ok_or_else(|| anyhow!("no archive path specified and none found in config"))
}

/// Persist the archive path and completion time for the next invocation
fn remember_run(config: &mut Config, config_path: &std::path::Path, archive: &std::path::Path) {
    config.archive_path = Some(archive.to_path_buf());
    config.last_run = Some(Utc::now());
    if let Err(e) = config
        .save(config_path)
        .context("saving configuration")
    {
        eprintln!("{} {:#}", "Warning:".yellow(), e);
    }
}

fn progress_spinner(quiet: bool) -> Option<ProgressBar> {
    if quiet {
        return None;
    }
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} [{elapsed_precise}] {msg}")
            .unwrap(),
    );
    bar.enable_steady_tick(Duration::from_millis(100));
    Some(bar)
}

fn progress_bar(quiet: bool, len: u64) -> Option<ProgressBar> {
    if quiet {
        return None;
    }
    let bar = ProgressBar::new(len);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files ({percent}%) | {msg}")
            .unwrap()
            .progress_chars("=>-"),
    );
    Some(bar)
}

fn display_report(report: &VerificationReport) {
    println!();
    if report.is_clean() {
        println!("{}", "ALL GOOD".green().bold());
    } else if report.cancelled {
        println!("{}", "RUN CANCELLED (partial results)".yellow().bold());
    } else {
        println!("{}", "FILE CHANGES DETECTED".red().bold());
    }

    println!("\nVerification Summary:");
    println!("  Unchanged:     {}", report.unchanged);
    println!("  Modified:      {}", report.modified);
    println!("  Missing:       {}", report.missing);
    println!("  New files:     {}", report.new_files);
    if report.files_failed > 0 {
        println!("  Errors:        {}", report.files_failed);
    }
    println!("  Duration:      {:.2}s", report.duration.as_secs_f64());

    let modified: Vec<_> = report
        .outcomes
        .iter()
        .filter(|o| o.kind == preserv::OutcomeKind::Modified)
        .collect();
    if !modified.is_empty() {
        println!("\n{}", "Modified files:".red());
        for outcome in modified.iter().take(DETAIL_LIMIT) {
            println!("  - {}", outcome.relative_path);
            if let Some(detail) = &outcome.detail {
                println!("      expected: {}", detail.old_checksum);
                println!("      actual:   {}", detail.new_checksum);
            }
        }
        if modified.len() > DETAIL_LIMIT {
            println!("  ... and {} more", modified.len() - DETAIL_LIMIT);
        }
    }

    print_path_list(report, preserv::OutcomeKind::Missing, "Missing files:");
    print_path_list(report, preserv::OutcomeKind::New, "New files:");
}

fn print_path_list(report: &VerificationReport, kind: preserv::OutcomeKind, heading: &str) {
    let entries: Vec<_> = report.outcomes.iter().filter(|o| o.kind == kind).collect();
    if entries.is_empty() {
        return;
    }
    println!("\n{}", heading.yellow());
    for outcome in entries.iter().take(DETAIL_LIMIT) {
        println!("  - {}", outcome.relative_path);
    }
    if entries.len() > DETAIL_LIMIT {
        println!("  ... and {} more", entries.len() - DETAIL_LIMIT);
    }
}
