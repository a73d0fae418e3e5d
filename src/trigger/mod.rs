//! Event trigger: turns observed search submissions into jobs.
//!
//! The CRM UI inserts a row into its job table when a user starts a
//! discovery search. Any source of network events (the automated browser in
//! production, a channel in tests) is matched against that request shape;
//! matching requests with a usable body become `Job`s.
//!
//! The listener is best-effort and fire-and-forget: a body that cannot be
//! parsed is dropped according to `ParseErrorPolicy`, never retried, never
//! surfaced to the browser session.

mod browser;
mod correlate;

pub use browser::{BrowserObserver, BrowserSettings};
pub use correlate::{correlate, Observed, RequestTracker};

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::models::{Filters, Job, JobType};

/// Default path segment identifying a job submission.
pub const DEFAULT_JOB_SEGMENT: &str = "/rest/v1/scrape_jobs";

/// One response observed in the browser session, with its request's body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkEvent {
    pub method: String,
    pub url: String,
    pub status: u16,
    pub post_data: Option<String>,
}

#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("request has no body")]
    MissingBody,
    #[error("request body is not JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("request body is not an object or a one-element array")]
    NotAnObject,
    #[error("unknown job type {0:?}")]
    UnknownJobType(String),
}

/// What to do with a matching request whose body cannot be understood.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseErrorPolicy {
    /// Drop the event without a trace.
    #[default]
    Ignore,
    /// Drop the event and emit a debug log line.
    Log,
}

/// Recognizes job submissions and extracts jobs from them.
#[derive(Debug, Clone)]
pub struct JobTrigger {
    segment: String,
    on_parse_error: ParseErrorPolicy,
}

impl Default for JobTrigger {
    fn default() -> Self {
        Self::new(DEFAULT_JOB_SEGMENT)
    }
}

impl JobTrigger {
    pub fn new(segment: impl Into<String>) -> Self {
        Self {
            segment: segment.into(),
            on_parse_error: ParseErrorPolicy::default(),
        }
    }

    pub fn with_parse_error_policy(mut self, policy: ParseErrorPolicy) -> Self {
        self.on_parse_error = policy;
        self
    }

    /// POST to the job segment that the server accepted (200/201).
    pub fn matches(&self, event: &NetworkEvent) -> bool {
        event.method.eq_ignore_ascii_case("POST")
            && matches!(event.status, 200 | 201)
            && request_path(&event.url).contains(self.segment.as_str())
    }

    /// Parse the request body. `Ok(None)` means the submission carried no
    /// filters or a zero total and must not produce a job.
    pub fn extract(&self, event: &NetworkEvent) -> Result<Option<Job>, TriggerError> {
        let body = event.post_data.as_deref().ok_or(TriggerError::MissingBody)?;
        let value: Value = serde_json::from_str(body)?;

        let payload = match &value {
            Value::Object(_) => &value,
            Value::Array(items) => items.first().ok_or(TriggerError::NotAnObject)?,
            _ => return Err(TriggerError::NotAnObject),
        };
        let payload = payload.as_object().ok_or(TriggerError::NotAnObject)?;

        let filters: Filters = match payload.get("filters") {
            Some(Value::Object(map)) => map.clone(),
            _ => Filters::new(),
        };
        let total_entries = payload.get("total_entries").map(as_count).unwrap_or(0);

        let job_type = match payload.get("job_type").and_then(Value::as_str) {
            Some(s) => JobType::from_str(s)
                .ok_or_else(|| TriggerError::UnknownJobType(s.to_string()))?,
            None => JobType::People,
        };
        let created_by = payload
            .get("created_by")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        if filters.is_empty() || total_entries == 0 {
            return Ok(None);
        }

        Ok(Some(Job {
            filters,
            total_entries,
            job_type,
            created_by,
        }))
    }

    /// Match and extract, applying the parse error policy.
    pub fn handle(&self, event: &NetworkEvent) -> Option<Job> {
        if !self.matches(event) {
            return None;
        }
        match self.extract(event) {
            Ok(job) => job,
            Err(e) => {
                if self.on_parse_error == ParseErrorPolicy::Log {
                    debug!(url = %event.url, "Ignoring job submission: {}", e);
                }
                None
            }
        }
    }
}

/// Path component of `raw`; the whole string when it does not parse as a URL.
fn request_path(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(url) => url.path().to_string(),
        Err(_) => raw.to_string(),
    }
}

/// Counts arrive as JSON numbers or numeric strings.
fn as_count(value: &Value) -> u64 {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f > 0.0).map(|f| f as u64))
            .unwrap_or(0),
        Value::String(s) => s.trim().parse::<f64>().map(|f| f.max(0.0) as u64).unwrap_or(0),
        _ => 0,
    }
}

/// A subscription to observed network responses.
#[async_trait]
pub trait EventSource: Send {
    /// Next observed response, or `None` once the session has ended.
    async fn next_event(&mut self) -> Option<NetworkEvent>;
}

#[async_trait]
impl EventSource for mpsc::Receiver<NetworkEvent> {
    async fn next_event(&mut self) -> Option<NetworkEvent> {
        self.recv().await
    }
}

/// Pump events from `source` into the job channel until either side ends.
/// Returns how many jobs were forwarded.
pub async fn forward_jobs<S>(
    source: &mut S,
    trigger: &JobTrigger,
    jobs: &mpsc::Sender<Job>,
) -> usize
where
    S: EventSource + ?Sized,
{
    let mut forwarded = 0;
    while let Some(event) = source.next_event().await {
        let Some(job) = trigger.handle(&event) else {
            continue;
        };

        info!(
            job_type = %job.job_type,
            total_entries = job.total_entries,
            fingerprint = %job.fingerprint().short(),
            "Search submission detected"
        );
        if jobs.send(job).await.is_err() {
            break;
        }
        forwarded += 1;
    }
    forwarded
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(status: u16, body: Value) -> NetworkEvent {
        NetworkEvent {
            method: "POST".into(),
            url: "https://project.supabase.co/rest/v1/scrape_jobs?select=*".into(),
            status,
            post_data: Some(body.to_string()),
        }
    }

    #[test]
    fn test_matches_requires_post_segment_and_success() {
        let trigger = JobTrigger::default();
        let ok = event(201, json!({}));
        assert!(trigger.matches(&ok));
        assert!(trigger.matches(&event(200, json!({}))));
        assert!(!trigger.matches(&event(409, json!({}))));

        let mut get = ok.clone();
        get.method = "GET".into();
        assert!(!trigger.matches(&get));

        let mut other = ok.clone();
        other.url = "https://project.supabase.co/rest/v1/contacts".into();
        assert!(!trigger.matches(&other));

        let mut in_query = ok.clone();
        in_query.url =
            "https://project.supabase.co/rest/v1/contacts?next=/rest/v1/scrape_jobs".into();
        assert!(!trigger.matches(&in_query));
    }

    #[test]
    fn test_extract_object_body() {
        let trigger = JobTrigger::default();
        let job = trigger
            .extract(&event(
                201,
                json!({
                    "filters": {"q_keywords": "engineer"},
                    "total_entries": 250,
                    "job_type": "companies",
                    "created_by": "user-1"
                }),
            ))
            .unwrap()
            .unwrap();
        assert_eq!(job.total_entries, 250);
        assert_eq!(job.job_type, JobType::Companies);
        assert_eq!(job.created_by.as_deref(), Some("user-1"));
        assert_eq!(job.filters["q_keywords"], "engineer");
    }

    #[test]
    fn test_extract_array_body_and_defaults() {
        let trigger = JobTrigger::default();
        let job = trigger
            .extract(&event(
                201,
                json!([{"filters": {"q_keywords": "engineer"}, "total_entries": "120"}]),
            ))
            .unwrap()
            .unwrap();
        assert_eq!(job.total_entries, 120);
        assert_eq!(job.job_type, JobType::People);
        assert_eq!(job.created_by, None);
    }

    #[test]
    fn test_guards_reject_empty_searches() {
        let trigger = JobTrigger::default();
        let no_filters = event(201, json!({"filters": {}, "total_entries": 50}));
        let zero_total = event(201, json!({"filters": {"q": "x"}, "total_entries": 0}));
        let no_total = event(201, json!({"filters": {"q": "x"}}));

        assert_eq!(trigger.extract(&no_filters).unwrap(), None);
        assert_eq!(trigger.extract(&zero_total).unwrap(), None);
        assert_eq!(trigger.extract(&no_total).unwrap(), None);
    }

    #[test]
    fn test_malformed_bodies_are_dropped() {
        let trigger = JobTrigger::default().with_parse_error_policy(ParseErrorPolicy::Log);
        let mut garbage = event(201, json!({}));
        garbage.post_data = Some("filters=abc".into());
        assert!(trigger.extract(&garbage).is_err());
        assert_eq!(trigger.handle(&garbage), None);

        let mut empty = event(201, json!({}));
        empty.post_data = None;
        assert!(matches!(trigger.extract(&empty), Err(TriggerError::MissingBody)));

        let unknown = event(
            201,
            json!({"filters": {"q": "x"}, "total_entries": 5, "job_type": "contacts"}),
        );
        assert!(matches!(
            trigger.extract(&unknown),
            Err(TriggerError::UnknownJobType(_))
        ));
        assert_eq!(trigger.handle(&event(201, json!([]))), None);
    }

    #[tokio::test]
    async fn test_forward_jobs_from_channel_source() {
        let (event_tx, mut event_rx) = mpsc::channel(8);
        let (job_tx, mut job_rx) = mpsc::channel(8);

        event_tx
            .send(event(201, json!({"filters": {"q": "a"}, "total_entries": 10})))
            .await
            .unwrap();
        event_tx
            .send(event(500, json!({"filters": {"q": "b"}, "total_entries": 10})))
            .await
            .unwrap();
        event_tx
            .send(event(200, json!({"filters": {"q": "c"}, "total_entries": 10})))
            .await
            .unwrap();
        drop(event_tx);

        let forwarded = forward_jobs(&mut event_rx, &JobTrigger::default(), &job_tx).await;
        assert_eq!(forwarded, 2);
        assert_eq!(job_rx.recv().await.unwrap().filters["q"], "a");
        assert_eq!(job_rx.recv().await.unwrap().filters["q"], "c");
    }
}
