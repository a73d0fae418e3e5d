//! Paginated people/company search endpoints.

mod http;

pub use http::HttpSearchClient;

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::models::{Filters, JobType};

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Rate limited by search endpoint")]
    RateLimited { retry_after: Option<Duration> },
    #[error("Search endpoint returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Invalid search response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Body of one page request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchRequest {
    pub filters: Filters,
    pub page: u32,
    pub per_page: u32,
    /// Company searches persist server-side and need the owning scope.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// Records returned for one page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchPage {
    pub records: Vec<Value>,
    /// Rows the endpoint reports having stored itself (company searches).
    pub saved: Option<u64>,
}

impl SearchPage {
    /// Interpret a response body for the given job type.
    ///
    /// People responses carry `people`; company responses carry
    /// `organizations` or `companies` plus `saved.companies`. Absent or null
    /// arrays are an empty page.
    pub fn parse(job_type: JobType, body: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(body)?;
        Ok(match job_type {
            JobType::People => Self {
                records: array_field(&value, "people"),
                saved: None,
            },
            JobType::Companies => {
                let mut records = array_field(&value, "organizations");
                if records.is_empty() {
                    records = array_field(&value, "companies");
                }
                let saved = value
                    .get("saved")
                    .and_then(|s| s.get("companies"))
                    .and_then(Value::as_u64);
                Self { records, saved }
            }
        })
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn array_field(value: &Value, key: &str) -> Vec<Value> {
    value
        .get(key)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

/// A paginated search backend.
#[async_trait]
pub trait SearchClient: Send + Sync {
    async fn search(
        &self,
        job_type: JobType,
        request: &SearchRequest,
    ) -> Result<SearchPage, SearchError>;
}
