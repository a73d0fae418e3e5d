//! Run outcome types: counters, terminal status, history and report records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::job::{Filters, Job, JobType, QueryFingerprint};

/// Counters accumulated while a job pages through the search endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub expected: u64,
    pub processed: u64,
    pub inserted: u64,
    pub pages_fetched: u64,
}

impl RunStats {
    pub fn new(expected: u64) -> Self {
        Self {
            expected,
            ..Default::default()
        }
    }

    /// Account for one successfully handled page.
    pub fn record_page(&mut self, records: u64, inserted: u64) {
        self.processed += records;
        self.inserted += inserted;
        self.pages_fetched += 1;
    }
}

/// Terminal status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    StoppedRateLimit,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Completed => "completed",
            RunStatus::StoppedRateLimit => "stopped_rate_limit",
            RunStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "completed" => Some(RunStatus::Completed),
            "stopped_rate_limit" => Some(RunStatus::StoppedRateLimit),
            "failed" => Some(RunStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last recorded outcome for a query fingerprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub date: DateTime<Utc>,
    pub job_type: JobType,
    pub filters: Filters,
    pub stats: RunStats,
}

/// Finalized record of a single run. Never mutated once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub id: String,
    pub organization_id: String,
    pub job_type: JobType,
    pub fingerprint: QueryFingerprint,
    pub filters: Filters,
    pub stats: RunStats,
    pub status: RunStatus,
    pub error_log: Option<String>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    pub fn new(
        job: &Job,
        organization_id: &str,
        stats: RunStats,
        status: RunStatus,
        error_log: Option<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            organization_id: organization_id.to_string(),
            job_type: job.job_type,
            fingerprint: job.fingerprint(),
            filters: job.filters.clone(),
            stats,
            status,
            error_log,
            finished_at: Utc::now(),
        }
    }

    /// The history entry this run leaves behind.
    pub fn history_entry(&self) -> HistoryEntry {
        HistoryEntry {
            date: self.finished_at,
            job_type: self.job_type,
            filters: self.filters.clone(),
            stats: self.stats,
        }
    }
}
