//! Run report sink: a text file per run plus a row in the report table.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::SecondsFormat;
use thiserror::Error;
use tracing::{info, warn};

use crate::models::RunReport;
use crate::repository::{ProspectRepository, RepositoryError};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to write report {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to store report row: {0}")]
    Remote(#[from] RepositoryError),
}

/// File name for a report: `Run-Report-<jobType>-<timestamp>.txt`, where the
/// timestamp is ISO 8601 with `:` and `.` replaced by `-`.
pub fn report_filename(report: &RunReport) -> String {
    let stamp = report
        .finished_at
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-");
    format!("Run-Report-{}-{}.txt", report.job_type, stamp)
}

/// Human-readable report body.
pub fn render_report(report: &RunReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Run Report");
    let _ = writeln!(out, "==========");
    let _ = writeln!(out, "Job type:      {}", report.job_type);
    let _ = writeln!(
        out,
        "Finished at:   {}",
        report.finished_at.to_rfc3339_opts(SecondsFormat::Secs, true)
    );
    let _ = writeln!(out, "Status:        {}", report.status);
    let _ = writeln!(out, "Fingerprint:   {}", report.fingerprint);
    let _ = writeln!(out);
    let _ = writeln!(out, "Expected:      {}", report.stats.expected);
    let _ = writeln!(out, "Processed:     {}", report.stats.processed);
    let _ = writeln!(out, "Inserted:      {}", report.stats.inserted);
    let _ = writeln!(out, "Pages fetched: {}", report.stats.pages_fetched);
    if let Some(ref err) = report.error_log {
        let _ = writeln!(out);
        let _ = writeln!(out, "Error: {}", err);
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "Filters:");
    let filters = serde_json::to_string_pretty(&report.filters).unwrap_or_else(|_| "{}".into());
    let _ = writeln!(out, "{}", filters);
    out
}

/// Writes finalized run reports locally and remotely.
#[derive(Clone)]
pub struct ReportSink {
    dir: PathBuf,
    repo: Arc<dyn ProspectRepository>,
}

impl ReportSink {
    pub fn new(dir: impl Into<PathBuf>, repo: Arc<dyn ProspectRepository>) -> Self {
        Self {
            dir: dir.into(),
            repo,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write the text report, creating the reports directory on first use.
    pub async fn write_file(&self, report: &RunReport) -> Result<PathBuf, ReportError> {
        let path = self.dir.join(report_filename(report));
        let io_err = |source| ReportError::Io {
            path: path.clone(),
            source,
        };
        tokio::fs::create_dir_all(&self.dir).await.map_err(io_err)?;
        tokio::fs::write(&path, render_report(report))
            .await
            .map_err(io_err)?;
        Ok(path)
    }

    pub async fn store_row(&self, report: &RunReport) -> Result<(), ReportError> {
        self.repo.insert_run_report(report).await?;
        Ok(())
    }

    /// Write both outputs. Failures are logged, never propagated: a report
    /// problem must not keep the dispatcher from moving on.
    pub async fn publish(&self, report: &RunReport) -> Option<PathBuf> {
        let path = match self.write_file(report).await {
            Ok(path) => {
                info!("Report written to {}", path.display());
                Some(path)
            }
            Err(e) => {
                warn!("{}", e);
                None
            }
        };

        if let Err(e) = self.store_row(report).await {
            warn!(fingerprint = %report.fingerprint.short(), "{}", e);
        }

        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Filters, Job, JobType, RunStats, RunStatus};
    use crate::repository::SqliteRepository;
    use chrono::TimeZone;
    use serde_json::json;
    use tempfile::TempDir;

    fn report(status: RunStatus, error: Option<&str>) -> RunReport {
        let mut filters = Filters::new();
        filters.insert("q_keywords".into(), json!("engineer"));
        let job = Job::new(JobType::People, filters, 250);
        let mut report = RunReport::new(
            &job,
            "org-1",
            RunStats {
                expected: 250,
                processed: 200,
                inserted: 180,
                pages_fetched: 2,
            },
            status,
            error.map(str::to_string),
        );
        report.finished_at = chrono::Utc
            .with_ymd_and_hms(2026, 3, 4, 5, 6, 7)
            .unwrap();
        report
    }

    #[test]
    fn test_report_filename() {
        let name = report_filename(&report(RunStatus::Completed, None));
        assert_eq!(name, "Run-Report-people-2026-03-04T05-06-07-000Z.txt");
    }

    #[test]
    fn test_render_report_contents() {
        let text = render_report(&report(RunStatus::Failed, Some("connection reset")));
        assert!(text.contains("Job type:      people"));
        assert!(text.contains("Expected:      250"));
        assert!(text.contains("Processed:     200"));
        assert!(text.contains("Inserted:      180"));
        assert!(text.contains("Status:        failed"));
        assert!(text.contains("Error: connection reset"));
        assert!(text.contains("\"q_keywords\": \"engineer\""));
    }

    #[tokio::test]
    async fn test_publish_writes_file_and_row() {
        let dir = TempDir::new().unwrap();
        let repo = Arc::new(SqliteRepository::in_memory().unwrap());
        let sink = ReportSink::new(dir.path().join("reports"), repo.clone());

        let path = sink
            .publish(&report(RunStatus::StoppedRateLimit, None))
            .await
            .unwrap();

        assert!(path.exists());
        assert!(std::fs::read_to_string(&path)
            .unwrap()
            .contains("stopped_rate_limit"));
        let rows = repo.run_reports().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].1, "stopped_rate_limit");
    }
}
