//! Job runner: dedup by fingerprint, fetch, finalize.

use tracing::{error, info, warn};

use crate::fetcher::{FetchResult, PageFetcher};
use crate::history::{HistoryError, HistoryStore};
use crate::models::{HistoryEntry, Job, QueryFingerprint, RunReport, RunStatus};
use crate::report::ReportSink;

/// What happened to a job once the dispatcher handed it out.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    /// Same query already ran; nothing was fetched.
    Skipped {
        fingerprint: QueryFingerprint,
        previous: HistoryEntry,
    },
    /// History could not be read, so the job was not run.
    Refused {
        fingerprint: QueryFingerprint,
        reason: String,
    },
    /// The page loop ran and the run was finalized.
    Finished(RunReport),
}

impl JobOutcome {
    pub fn fingerprint(&self) -> &QueryFingerprint {
        match self {
            JobOutcome::Skipped { fingerprint, .. } => fingerprint,
            JobOutcome::Refused { fingerprint, .. } => fingerprint,
            JobOutcome::Finished(report) => &report.fingerprint,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, JobOutcome::Skipped { .. })
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, JobOutcome::Finished(_))
    }
}

/// Runs one job end to end.
#[derive(Clone)]
pub struct JobRunner {
    fetcher: PageFetcher,
    history: HistoryStore,
    reports: ReportSink,
}

impl JobRunner {
    pub fn new(fetcher: PageFetcher, history: HistoryStore, reports: ReportSink) -> Self {
        Self {
            fetcher,
            history,
            reports,
        }
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub async fn run(&self, job: Job) -> JobOutcome {
        let fingerprint = job.fingerprint();

        match self.lookup(&fingerprint) {
            Ok(Some(previous)) => {
                warn!(
                    fingerprint = %fingerprint.short(),
                    previous_run = %previous.date.to_rfc3339(),
                    previously_inserted = previous.stats.inserted,
                    "Duplicate query, skipping"
                );
                return JobOutcome::Skipped {
                    fingerprint,
                    previous,
                };
            }
            Ok(None) => {}
            Err(e) => {
                error!(
                    fingerprint = %fingerprint.short(),
                    "History unavailable, not running job: {}",
                    e
                );
                return JobOutcome::Refused {
                    fingerprint,
                    reason: e.to_string(),
                };
            }
        }

        info!(
            fingerprint = %fingerprint.short(),
            job_type = %job.job_type,
            created_by = job.created_by.as_deref().unwrap_or("-"),
            "New job"
        );

        let result = self.fetcher.fetch(&job).await;
        JobOutcome::Finished(self.finalize(&job, result).await)
    }

    /// History lookup. A corrupt file is moved aside once and the lookup
    /// retried against the fresh, empty history.
    fn lookup(
        &self,
        fingerprint: &QueryFingerprint,
    ) -> Result<Option<HistoryEntry>, HistoryError> {
        match self.history.get(fingerprint) {
            Err(HistoryError::Corrupt { .. }) => {
                let moved = self.history.quarantine()?;
                error!("History file was corrupt, moved it to {}", moved.display());
                self.history.get(fingerprint)
            }
            other => other,
        }
    }

    /// The only place history is written: once per executed run.
    async fn finalize(&self, job: &Job, result: FetchResult) -> RunReport {
        let report = RunReport::new(
            job,
            self.fetcher.organization_id(),
            result.stats,
            result.status,
            result.error,
        );

        self.reports.publish(&report).await;

        if let Err(e) = self
            .history
            .record(&report.fingerprint, report.history_entry())
        {
            error!(fingerprint = %report.fingerprint.short(), "Failed to record history: {}", e);
        }

        let stats = &report.stats;
        match report.status {
            RunStatus::Completed => info!(
                expected = stats.expected,
                processed = stats.processed,
                inserted = stats.inserted,
                pages = stats.pages_fetched,
                "Run completed"
            ),
            RunStatus::StoppedRateLimit => warn!(
                processed = stats.processed,
                inserted = stats.inserted,
                pages = stats.pages_fetched,
                "Run stopped by rate limit"
            ),
            RunStatus::Failed => error!(
                processed = stats.processed,
                inserted = stats.inserted,
                pages = stats.pages_fetched,
                error = report.error_log.as_deref().unwrap_or(""),
                "Run failed"
            ),
        }

        report
    }
}
