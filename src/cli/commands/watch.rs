//! Watch command: observe the CRM in a browser and dispatch its searches.

use std::sync::Arc;

use anyhow::Context;
use console::style;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::Settings;
use crate::dispatch::DispatchLoop;
use crate::trigger::{forward_jobs, BrowserObserver, JobTrigger};

use super::helpers::build_runner;

/// Jobs waiting between the browser task and the dispatcher.
const JOB_CHANNEL_CAPACITY: usize = 64;

pub async fn cmd_watch(settings: &Settings, login_url: Option<String>) -> anyhow::Result<()> {
    let login_url = login_url
        .or_else(|| settings.login_url.clone())
        .context("No login URL. Set LOGIN_URL or pass --login-url")?;

    let runner = Arc::new(build_runner(settings, None)?);
    let trigger = JobTrigger::new(settings.job_segment.clone())
        .with_parse_error_policy(settings.parse_errors);

    let mut observer = BrowserObserver::start(&settings.browser, &login_url).await?;

    let (tx, rx) = mpsc::channel(JOB_CHANNEL_CAPACITY);
    let mut dispatch = tokio::spawn(DispatchLoop::new(runner).run(rx));

    println!(
        "{} Watching {} for searches (Ctrl-C to stop)",
        style("→").cyan(),
        login_url
    );

    tokio::select! {
        forwarded = forward_jobs(&mut observer, &trigger, &tx) => {
            info!(forwarded, "Browser session ended");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, finishing queued jobs");
        }
    }

    // Closing the channel lets the dispatcher drain its queue and stop.
    drop(tx);
    observer.close().await;

    let summary = tokio::select! {
        joined = &mut dispatch => joined.context("Dispatcher task failed")?,
        _ = tokio::signal::ctrl_c() => {
            dispatch.abort();
            warn!("Interrupted again, abandoning queued jobs");
            return Ok(());
        }
    };

    println!(
        "{} Watch finished: {} run, {} skipped as duplicates",
        style("✓").green(),
        summary.executed(),
        summary.skipped()
    );
    if summary.refused() > 0 {
        println!(
            "{} {} job(s) not run because the history file was unreadable",
            style("✗").red(),
            summary.refused()
        );
    }
    if summary.crashed > 0 {
        println!(
            "{} {} job(s) crashed, see log",
            style("✗").red(),
            summary.crashed
        );
    }

    Ok(())
}
