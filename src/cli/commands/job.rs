//! One-shot job commands: `run` and `fingerprint`.

use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;

use crate::config::Settings;
use crate::dispatch::JobOutcome;
use crate::fetcher::FetchEvent;
use crate::history::HistoryStore;
use crate::models::{Job, JobType, QueryFingerprint, RunStatus};

use super::helpers::{build_runner, parse_filters};

/// Run a single job with a progress bar.
pub async fn cmd_run(
    settings: &Settings,
    job_type: JobType,
    filters: &str,
    total: u64,
    created_by: Option<String>,
    force: bool,
) -> anyhow::Result<()> {
    let filters = parse_filters(filters)?;
    if total == 0 {
        anyhow::bail!("--total must be greater than zero");
    }

    let mut job = Job::new(job_type, filters, total);
    if let Some(user) = created_by {
        job = job.with_created_by(user);
    }

    if force {
        let fingerprint = job.fingerprint();
        if HistoryStore::new(&settings.history_path).forget(&fingerprint)? {
            println!(
                "{} Forgot previous run of {}",
                style("!").yellow(),
                fingerprint.short()
            );
        }
    }

    let (tx, rx) = mpsc::unbounded_channel();
    let runner = build_runner(settings, Some(tx))?;
    let progress = tokio::spawn(show_progress(ProgressBar::new_spinner(), rx));

    let outcome = runner.run(job).await;
    // The fetcher holds the event sender; dropping it ends the progress task.
    drop(runner);
    let _ = progress.await;

    match outcome {
        JobOutcome::Skipped {
            fingerprint,
            previous,
        } => {
            println!(
                "{} Query {} already ran on {} ({} inserted)",
                style("!").yellow(),
                fingerprint.short(),
                previous.date.format("%Y-%m-%d %H:%M"),
                previous.stats.inserted
            );
            println!("  {} Use --force to run it again", style("→").dim());
        }
        JobOutcome::Refused { reason, .. } => {
            anyhow::bail!("Job not run, history unavailable: {}", reason);
        }
        JobOutcome::Finished(report) => {
            let marker = match report.status {
                RunStatus::Completed => style("✓").green(),
                RunStatus::StoppedRateLimit => style("!").yellow(),
                RunStatus::Failed => style("✗").red(),
            };
            println!(
                "{} Run {}: {} processed, {} inserted over {} page(s)",
                marker,
                report.status,
                report.stats.processed,
                report.stats.inserted,
                report.stats.pages_fetched
            );
            if let Some(ref err) = report.error_log {
                println!("  {} {}", style("→").dim(), err);
            }
        }
    }

    Ok(())
}

async fn show_progress(pb: ProgressBar, mut events: mpsc::UnboundedReceiver<FetchEvent>) {
    pb.enable_steady_tick(Duration::from_millis(120));

    while let Some(event) = events.recv().await {
        match event {
            FetchEvent::Started {
                job_type,
                target_pages,
            } => {
                pb.set_length(target_pages);
                if let Ok(bar) = ProgressStyle::default_bar().template(
                    "{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} pages {wide_msg}",
                ) {
                    pb.set_style(bar.progress_chars("█▓░"));
                }
                pb.set_message(format!("Extracting {}...", job_type));
            }
            FetchEvent::PageFetched { page, inserted, .. } => {
                pb.set_position(page);
                pb.set_message(format!("+{} new", inserted));
            }
            FetchEvent::Finished { .. } => pb.finish_and_clear(),
        }
    }

    // Skipped runs never emit events; clear the idle spinner either way.
    pb.finish_and_clear();
}

/// Print a query's fingerprint and its history entry, if any.
pub fn cmd_fingerprint(
    settings: &Settings,
    job_type: JobType,
    filters: &str,
) -> anyhow::Result<()> {
    let filters = parse_filters(filters)?;
    let fingerprint = QueryFingerprint::compute(job_type, &filters);
    println!("{}", fingerprint);

    match HistoryStore::new(&settings.history_path).get(&fingerprint)? {
        Some(entry) => println!(
            "  {} Already ran on {} ({} inserted of {} expected)",
            style("→").dim(),
            entry.date.format("%Y-%m-%d %H:%M"),
            entry.stats.inserted,
            entry.stats.expected
        ),
        None => println!("  {} Not in history", style("→").dim()),
    }
    Ok(())
}
