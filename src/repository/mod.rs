//! Persistence for discovered people and run reports.
//!
//! Two backends share the `ProspectRepository` trait:
//! - `PostgrestRepository`: the hosted CRM database (Supabase/PostgREST)
//! - `SqliteRepository`: a local SQLite file, for offline runs and tests

mod people;
mod postgrest;
mod sqlite;

pub use people::{persist_people, PersonRow, INITIAL_ENRICHMENT_STATUS, INITIAL_STAGE};
pub use postgrest::PostgrestRepository;
pub use sqlite::SqliteRepository;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::config::Settings;
use crate::models::{Filters, RunReport};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Remote store returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Repository not configured: {0}")]
    NotConfigured(String),
}

pub type Result<T> = std::result::Result<T, RepositoryError>;

/// Storage for people rows and run report rows.
#[async_trait]
pub trait ProspectRepository: Send + Sync {
    /// Bulk insert, ignoring rows whose (external_person_id, organization_id)
    /// already exists. Returns only the rows actually inserted.
    async fn insert_people(&self, rows: &[PersonRow]) -> Result<Vec<PersonRow>>;

    /// Insert a single row with the same conflict rule. `true` if inserted.
    async fn insert_person(&self, row: &PersonRow) -> Result<bool>;

    /// Append one row to the run report table.
    async fn insert_run_report(&self, report: &RunReport) -> Result<()>;
}

/// Row shape of the remote run report table.
#[derive(Debug, Serialize)]
pub struct RunReportRow<'a> {
    pub organization_id: &'a str,
    pub job_type: &'a str,
    pub fingerprint: &'a str,
    pub filters: &'a Filters,
    pub expected: u64,
    pub processed: u64,
    pub inserted: u64,
    pub pages_fetched: u64,
    pub status: &'a str,
    pub error_log: Option<&'a str>,
}

impl<'a> From<&'a RunReport> for RunReportRow<'a> {
    fn from(report: &'a RunReport) -> Self {
        Self {
            organization_id: &report.organization_id,
            job_type: report.job_type.as_str(),
            fingerprint: report.fingerprint.as_str(),
            filters: &report.filters,
            expected: report.stats.expected,
            processed: report.stats.processed,
            inserted: report.stats.inserted,
            pages_fetched: report.stats.pages_fetched,
            status: report.status.as_str(),
            error_log: report.error_log.as_deref(),
        }
    }
}

/// Pick a backend from settings.
///
/// An explicit `sqlite:` database URL always wins. Otherwise the hosted
/// database is used when its URL and service key are configured, and the
/// local SQLite file in the data directory is the fallback.
pub fn open_repository(settings: &Settings) -> Result<Arc<dyn ProspectRepository>> {
    if let Some(path) = settings.sqlite_path() {
        tracing::debug!("Using local SQLite repository at {}", path.display());
        return Ok(Arc::new(SqliteRepository::open(&path)?));
    }

    match (&settings.supabase_url, &settings.service_key) {
        (Some(url), Some(key)) => {
            tracing::debug!("Using PostgREST repository at {}", url);
            Ok(Arc::new(PostgrestRepository::new(
                url,
                key,
                &settings.people_table,
                &settings.reports_table,
                settings.request_timeout(),
            )?))
        }
        (Some(_), None) => Err(RepositoryError::NotConfigured(
            "SUPABASE_URL is set but SUPABASE_SERVICE_ROLE_KEY is missing".to_string(),
        )),
        _ => {
            let path = settings.default_database_path();
            tracing::debug!("Using local SQLite repository at {}", path.display());
            Ok(Arc::new(SqliteRepository::open(&path)?))
        }
    }
}
