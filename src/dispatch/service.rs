//! Dispatch loop: feeds jobs from a channel through the `Dispatcher`.

use std::sync::Arc;

use futures::future::OptionFuture;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::dispatcher::Dispatcher;
use super::runner::{JobOutcome, JobRunner};
use crate::models::Job;

/// Totals for a dispatch loop's lifetime.
#[derive(Debug, Default)]
pub struct DispatchSummary {
    /// Outcomes in the order jobs finished (which is submission order).
    pub outcomes: Vec<JobOutcome>,
    /// Jobs whose runner task panicked.
    pub crashed: usize,
}

impl DispatchSummary {
    pub fn executed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_finished()).count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_skipped()).count()
    }

    /// Jobs not run because history could not be read.
    pub fn refused(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, JobOutcome::Refused { .. }))
            .count()
    }
}

/// Owns the dispatcher and runs at most one job at a time.
pub struct DispatchLoop {
    runner: Arc<JobRunner>,
    dispatcher: Dispatcher,
}

impl DispatchLoop {
    pub fn new(runner: Arc<JobRunner>) -> Self {
        Self {
            runner,
            dispatcher: Dispatcher::new(),
        }
    }

    fn start(&self, job: Job) -> JoinHandle<JobOutcome> {
        let runner = self.runner.clone();
        tokio::spawn(async move { runner.run(job).await })
    }

    /// Consume jobs until the sender side closes and the backlog is drained.
    pub async fn run(mut self, mut jobs: mpsc::Receiver<Job>) -> DispatchSummary {
        let mut summary = DispatchSummary::default();
        let mut current: Option<JoinHandle<JobOutcome>> = None;
        let mut open = true;

        loop {
            tokio::select! {
                received = jobs.recv(), if open => match received {
                    Some(job) => match self.dispatcher.submit(job) {
                        Some(job) => current = Some(self.start(job)),
                        None => info!(pending = self.dispatcher.pending(), "Job queued"),
                    },
                    None => open = false,
                },
                Some(joined) = OptionFuture::from(current.as_mut()), if current.is_some() => {
                    current = None;
                    match joined {
                        Ok(outcome) => summary.outcomes.push(outcome),
                        Err(e) => {
                            error!("Job task crashed: {}", e);
                            summary.crashed += 1;
                        }
                    }
                    if let Some(next) = self.dispatcher.finish() {
                        info!(pending = self.dispatcher.pending(), "Starting next queued job");
                        current = Some(self.start(next));
                    }
                },
                else => break,
            }
        }

        info!(
            executed = summary.executed(),
            skipped = summary.skipped(),
            refused = summary.refused(),
            crashed = summary.crashed,
            "Dispatcher stopped"
        );
        summary
    }
}
