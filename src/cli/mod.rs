//! Command-line interface for Crush
//!
//! Parses arguments with clap, resolves the run configuration, discovers the
//! tasks and drives the scheduler. Every file gets one attempt; the process
//! exits non-zero if any of them failed or the run was interrupted.

use anyhow::{Result, bail};
use clap::Parser;
use indicatif::DecimalBytes;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

mod output;

pub use output::Output;

use crate::config::{CrushConfig, Quality};
use crate::parallel::{CancelSignal, Interrupted, RunReport, Scheduler};
use crate::recompress::{self, RecompressTool, Savings};
use crate::source;

/// Crush - recompress JPEG images in place with jpeg-recompress
#[derive(Parser, Debug)]
#[command(name = "crush", author, version, about, long_about = None)]
pub struct Cli {
    /// JPEG files to recompress (default: every JPEG in the current directory)
    #[arg(value_name = "PATH")]
    pub paths: Vec<PathBuf>,

    /// Maximum number of files recompressed at once (default: number of CPUs)
    #[arg(short, long, value_name = "N")]
    pub jobs: Option<usize>,

    /// Quality preset passed to jpeg-recompress
    #[arg(long, value_enum, default_value_t = Quality::VeryHigh)]
    pub quality: Quality,

    /// Path to the jpeg-recompress binary (default: next to this executable)
    #[arg(long, value_name = "PATH")]
    pub tool: Option<PathBuf>,

    /// Keep starting new files after one fails
    #[arg(long)]
    pub keep_going: bool,

    /// Increase verbosity (can be repeated)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        setup_logging(self.verbose, self.quiet);
        let output = Output::new(self.verbose > 0, self.quiet);

        let config = CrushConfig::resolve(self.tool, self.quality, self.jobs, self.keep_going)?;
        let tasks = source::collect_tasks(&self.paths)?;

        if tasks.is_empty() {
            output.info("No JPEGs to recompress.");
            return Ok(());
        }

        output.verbose(&format!(
            "Recompressing {} file(s) with up to {} worker(s) using {}",
            tasks.len(),
            config.workers,
            config.tool.display()
        ));

        let total = tasks.len();
        let report = recompress_all(&config, tasks, output).await;
        let totals = Totals::from_report(&report);

        if let Some(failure) = report.first_failure() {
            totals.print(&output);
            bail!(
                "{} of {} file(s) failed, first failure: {}",
                report.failed(),
                total,
                failure
            );
        }
        if report.was_cancelled() {
            totals.print(&output);
            bail!("interrupted, {} file(s) were not processed", report.skipped());
        }

        output.success(&format!(
            "All done! {} recompressed, {} unchanged, saved {}",
            totals.replaced,
            totals.unchanged,
            DecimalBytes(totals.saved_bytes)
        ));
        Ok(())
    }
}

/// Recompress every task under the configured bound. Ctrl-C stops admissions
/// and kills running tool processes; their sources are left as they were.
async fn recompress_all(
    config: &CrushConfig,
    tasks: Vec<PathBuf>,
    output: Output,
) -> RunReport<Savings> {
    let scheduler = Scheduler::new(config.workers).with_policy(config.failure_policy);
    let interrupt = CancelSignal::new();

    let watcher = {
        let admission = scheduler.cancel_signal();
        let interrupt = interrupt.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received");
                output.warning("Interrupted, stopping running recompressions...");
                admission.cancel();
                interrupt.cancel();
            }
        })
    };

    let tool = Arc::new(RecompressTool::from_config(config));
    let report = scheduler
        .run(tasks, move |path| {
            let tool = tool.clone();
            let interrupt = interrupt.clone();
            async move {
                match recompress::recompress(&tool, &path, &interrupt).await {
                    Ok(savings) => {
                        output.savings(&path, &savings);
                        Ok(savings)
                    }
                    Err(e) => {
                        if !e.is::<Interrupted>() {
                            output.task_failed(&path, &e);
                        }
                        Err(e)
                    }
                }
            }
        })
        .await;

    watcher.abort();
    info!(
        completed = report.completed().count(),
        failed = report.failed(),
        skipped = report.skipped(),
        peak_workers = report.max_in_flight(),
        "run finished"
    );
    report
}

#[derive(Debug, Default, PartialEq, Eq)]
struct Totals {
    replaced: usize,
    unchanged: usize,
    failed: usize,
    skipped: usize,
    saved_bytes: u64,
}

impl Totals {
    fn from_report(report: &RunReport<Savings>) -> Self {
        let mut totals = Totals {
            failed: report.failed(),
            skipped: report.skipped(),
            ..Default::default()
        };
        for (_, savings) in report.completed() {
            if savings.replaced() {
                totals.replaced += 1;
                totals.saved_bytes += savings.saved_bytes();
            } else {
                totals.unchanged += 1;
            }
        }
        totals
    }

    fn print(&self, output: &Output) {
        output.key_value("Recompressed:", &self.replaced.to_string());
        output.key_value("Unchanged:", &self.unchanged.to_string());
        output.key_value("Failed:", &self.failed.to_string());
        output.key_value("Skipped:", &self.skipped.to_string());
        output.key_value("Saved:", &DecimalBytes(self.saved_bytes).to_string());
    }
}

fn setup_logging(verbose: u8, quiet: bool) {
    if quiet {
        return;
    }

    let filter = match verbose {
        0 => tracing_subscriber::EnvFilter::new("warn"),
        1 => tracing_subscriber::EnvFilter::new("info"),
        2 => tracing_subscriber::EnvFilter::new("debug"),
        _ => tracing_subscriber::EnvFilter::new("trace"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
