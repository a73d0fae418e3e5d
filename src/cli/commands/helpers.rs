//! Shared helper functions for CLI commands.

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;

use crate::config::Settings;
use crate::dispatch::JobRunner;
use crate::fetcher::{FetchEvent, PageFetcher};
use crate::history::{HistoryMap, HistoryStore};
use crate::models::{Filters, QueryFingerprint};
use crate::report::ReportSink;
use crate::repository::open_repository;
use crate::search::HttpSearchClient;

/// Parse a `--filters` argument. Must be a non-empty JSON object.
pub fn parse_filters(raw: &str) -> anyhow::Result<Filters> {
    let value: serde_json::Value =
        serde_json::from_str(raw).context("Filters must be valid JSON")?;
    match value {
        serde_json::Value::Object(map) if !map.is_empty() => Ok(map),
        serde_json::Value::Object(_) => anyhow::bail!("Filters must not be empty"),
        _ => anyhow::bail!("Filters must be a JSON object"),
    }
}

fn search_client(settings: &Settings) -> anyhow::Result<HttpSearchClient> {
    let people_url = settings
        .people_search_url()
        .context("No search endpoint configured. Set SUPABASE_URL or people_search_url")?;
    let company_url = settings
        .company_search_url()
        .context("No search endpoint configured. Set SUPABASE_URL or company_search_url")?;

    Ok(HttpSearchClient::new(
        &people_url,
        &company_url,
        settings.service_key.as_deref(),
        &settings.user_agent,
        settings.request_timeout(),
    )?)
}

/// Wire a `JobRunner` from settings.
pub fn build_runner(
    settings: &Settings,
    events: Option<mpsc::UnboundedSender<FetchEvent>>,
) -> anyhow::Result<JobRunner> {
    if settings.organization_id.is_empty() {
        anyhow::bail!("ORGANIZATION_ID is not set");
    }
    settings.ensure_directories()?;

    let repo = open_repository(settings).context("Failed to open repository")?;
    let search = Arc::new(search_client(settings)?);

    let mut fetcher = PageFetcher::new(
        search,
        repo.clone(),
        settings.organization_id.clone(),
        settings.page_delay(),
    );
    if let Some(tx) = events {
        fetcher = fetcher.with_events(tx);
    }

    Ok(JobRunner::new(
        fetcher,
        HistoryStore::new(&settings.history_path),
        ReportSink::new(&settings.reports_dir, repo),
    ))
}

/// Find the single history key equal to or starting with `prefix`.
pub fn resolve_fingerprint(history: &HistoryMap, prefix: &str) -> anyhow::Result<QueryFingerprint> {
    let prefix = prefix.trim().to_ascii_lowercase();
    if prefix.is_empty() {
        anyhow::bail!("Fingerprint must not be empty");
    }

    let mut matches = history
        .keys()
        .filter(|fp| fp.as_str().starts_with(&prefix));
    match (matches.next(), matches.next()) {
        (Some(fp), None) => Ok(fp.clone()),
        (Some(_), Some(_)) => anyhow::bail!("Fingerprint prefix '{}' is ambiguous", prefix),
        (None, _) => anyhow::bail!("No history entry matches '{}'", prefix),
    }
}
