//! Page fetcher: drives one job's paginated search to completion.
//!
//! Pages are requested strictly in order. The loop ends on the page budget,
//! an empty page, a 429, or any other error; every exit path yields a
//! `FetchResult` rather than an error.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::models::{Job, JobType, RunStats, RunStatus};
use crate::repository::{persist_people, PersonRow, ProspectRepository};
use crate::search::{SearchClient, SearchError, SearchRequest};

/// Records requested per page.
pub const PAGE_SIZE: u64 = 100;

/// Hard ceiling on pages per job (50,000 records).
pub const MAX_PAGES: u64 = 500;

/// Pages needed for `total_entries`, capped at `MAX_PAGES`.
pub fn target_pages(total_entries: u64) -> u64 {
    total_entries.div_ceil(PAGE_SIZE).min(MAX_PAGES)
}

/// Outcome of a page loop.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResult {
    pub stats: RunStats,
    pub status: RunStatus,
    pub error: Option<String>,
}

/// Progress events for interactive callers.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchEvent {
    Started {
        job_type: JobType,
        target_pages: u64,
    },
    PageFetched {
        page: u64,
        records: u64,
        inserted: u64,
    },
    Finished {
        status: RunStatus,
        stats: RunStats,
    },
}

/// Sequential page fetcher bound to one organization.
#[derive(Clone)]
pub struct PageFetcher {
    search: Arc<dyn SearchClient>,
    repo: Arc<dyn ProspectRepository>,
    organization_id: String,
    page_delay: Duration,
    events: Option<mpsc::UnboundedSender<FetchEvent>>,
}

impl PageFetcher {
    pub fn new(
        search: Arc<dyn SearchClient>,
        repo: Arc<dyn ProspectRepository>,
        organization_id: impl Into<String>,
        page_delay: Duration,
    ) -> Self {
        Self {
            search,
            repo,
            organization_id: organization_id.into(),
            page_delay,
            events: None,
        }
    }

    /// Emit `FetchEvent`s on this channel while fetching.
    pub fn with_events(mut self, tx: mpsc::UnboundedSender<FetchEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn organization_id(&self) -> &str {
        &self.organization_id
    }

    fn emit(&self, event: FetchEvent) {
        if let Some(ref tx) = self.events {
            // Receiver may be gone; progress is best-effort.
            let _ = tx.send(event);
        }
    }

    fn request_for(&self, job: &Job, page: u64) -> SearchRequest {
        let (organization_id, user_id) = match job.job_type {
            JobType::People => (None, None),
            JobType::Companies => (Some(self.organization_id.clone()), job.created_by.clone()),
        };
        SearchRequest {
            filters: job.filters.clone(),
            page: page as u32,
            per_page: PAGE_SIZE as u32,
            organization_id,
            user_id,
        }
    }

    /// Run the page loop for `job`.
    pub async fn fetch(&self, job: &Job) -> FetchResult {
        let pages = target_pages(job.total_entries);
        let mut stats = RunStats::new(job.total_entries);
        let mut status = RunStatus::Completed;
        let mut error_log = None;

        info!(
            job_type = %job.job_type,
            expected = job.total_entries,
            pages,
            "Starting extraction"
        );
        self.emit(FetchEvent::Started {
            job_type: job.job_type,
            target_pages: pages,
        });

        for page in 1..=pages {
            let request = self.request_for(job, page);
            let result = match self.search.search(job.job_type, &request).await {
                Ok(result) => result,
                Err(SearchError::RateLimited { retry_after }) => {
                    warn!(
                        page,
                        retry_after_secs = retry_after.map(|d| d.as_secs()),
                        "Rate limited by search endpoint, stopping run"
                    );
                    status = RunStatus::StoppedRateLimit;
                    break;
                }
                Err(e) => {
                    error!(page, "Search request failed: {}", e);
                    status = RunStatus::Failed;
                    error_log = Some(e.to_string());
                    break;
                }
            };

            if result.is_empty() {
                info!(page, "No more results, ending run early");
                break;
            }

            let records = result.records.len() as u64;
            let inserted = match job.job_type {
                JobType::People => {
                    let rows = PersonRow::from_page(&result.records, &self.organization_id);
                    persist_people(self.repo.as_ref(), &rows).await
                }
                JobType::Companies => result.saved.unwrap_or(0),
            };

            stats.record_page(records, inserted);
            info!(
                page,
                of = pages,
                records,
                inserted,
                total_inserted = stats.inserted,
                "Page fetched"
            );
            self.emit(FetchEvent::PageFetched {
                page,
                records,
                inserted,
            });

            if page < pages && !self.page_delay.is_zero() {
                tokio::time::sleep(self.page_delay).await;
            }
        }

        self.emit(FetchEvent::Finished { status, stats });

        FetchResult {
            stats,
            status,
            error: error_log,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Filters, RunReport};
    use crate::repository::{Result as RepoResult, SqliteRepository};
    use crate::search::SearchPage;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    enum Reply {
        Records(usize),
        Saved(usize, u64),
        RateLimited,
        Broken,
    }

    struct ScriptedSearch {
        replies: Vec<Reply>,
        requests: Mutex<Vec<SearchRequest>>,
    }

    impl ScriptedSearch {
        fn new(replies: Vec<Reply>) -> Arc<Self> {
            Arc::new(Self {
                replies,
                requests: Mutex::new(Vec::new()),
            })
        }

        fn pages_requested(&self) -> Vec<u32> {
            self.requests.lock().unwrap().iter().map(|r| r.page).collect()
        }
    }

    #[async_trait]
    impl SearchClient for ScriptedSearch {
        async fn search(
            &self,
            _job_type: JobType,
            request: &SearchRequest,
        ) -> Result<SearchPage, SearchError> {
            self.requests.lock().unwrap().push(request.clone());
            let records = |n: usize, page: u32| {
                (0..n)
                    .map(|i| json!({"id": format!("p{}-{}", page, i), "first_name": "Test"}))
                    .collect::<Vec<_>>()
            };
            match self.replies.get(request.page as usize - 1) {
                Some(Reply::Records(n)) => Ok(SearchPage {
                    records: records(*n, request.page),
                    saved: None,
                }),
                Some(Reply::Saved(n, saved)) => Ok(SearchPage {
                    records: records(*n, request.page),
                    saved: Some(*saved),
                }),
                Some(Reply::RateLimited) => Err(SearchError::RateLimited { retry_after: None }),
                Some(Reply::Broken) => {
                    Err(serde_json::from_str::<serde_json::Value>("{").unwrap_err().into())
                }
                None => Ok(SearchPage::default()),
            }
        }
    }

    struct NullRepo;

    #[async_trait]
    impl ProspectRepository for NullRepo {
        async fn insert_people(&self, rows: &[PersonRow]) -> RepoResult<Vec<PersonRow>> {
            Ok(rows.to_vec())
        }
        async fn insert_person(&self, _row: &PersonRow) -> RepoResult<bool> {
            Ok(true)
        }
        async fn insert_run_report(&self, _report: &RunReport) -> RepoResult<()> {
            Ok(())
        }
    }

    fn job(job_type: JobType, total: u64) -> Job {
        let mut filters = Filters::new();
        filters.insert("q_keywords".into(), json!("engineer"));
        Job::new(job_type, filters, total)
    }

    fn fetcher(search: Arc<ScriptedSearch>) -> PageFetcher {
        PageFetcher::new(search, Arc::new(NullRepo), "org-1", Duration::ZERO)
    }

    #[test]
    fn test_target_pages() {
        assert_eq!(target_pages(0), 0);
        assert_eq!(target_pages(1), 1);
        assert_eq!(target_pages(100), 1);
        assert_eq!(target_pages(250), 3);
        assert_eq!(target_pages(50_000), 500);
        assert_eq!(target_pages(1_000_000), 500);
    }

    #[tokio::test]
    async fn test_rate_limit_stops_immediately() {
        let search = ScriptedSearch::new(vec![
            Reply::Records(100),
            Reply::Records(100),
            Reply::RateLimited,
            Reply::Records(100),
        ]);
        let result = fetcher(search.clone()).fetch(&job(JobType::People, 1000)).await;

        assert_eq!(result.status, RunStatus::StoppedRateLimit);
        assert_eq!(result.stats.pages_fetched, 2);
        assert_eq!(result.stats.processed, 200);
        assert_eq!(result.error, None);
        assert_eq!(search.pages_requested(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_empty_page_ends_run_as_completed() {
        let search = ScriptedSearch::new(vec![Reply::Records(100), Reply::Records(0)]);
        let result = fetcher(search.clone()).fetch(&job(JobType::People, 500)).await;

        assert_eq!(result.status, RunStatus::Completed);
        assert_eq!(result.stats.pages_fetched, 1);
        assert_eq!(search.pages_requested(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_decode_error_fails_run() {
        let search = ScriptedSearch::new(vec![Reply::Records(100), Reply::Broken]);
        let result = fetcher(search).fetch(&job(JobType::People, 300)).await;

        assert_eq!(result.status, RunStatus::Failed);
        assert_eq!(result.stats.pages_fetched, 1);
        assert!(result.error.unwrap().contains("Invalid search response"));
    }

    #[tokio::test]
    async fn test_company_pages_use_saved_counts_and_scope() {
        let search = ScriptedSearch::new(vec![Reply::Saved(100, 40), Reply::Saved(20, 20)]);
        let company_job = job(JobType::Companies, 120).with_created_by("user-9");
        let result = fetcher(search.clone()).fetch(&company_job).await;

        assert_eq!(result.status, RunStatus::Completed);
        assert_eq!(result.stats.processed, 120);
        assert_eq!(result.stats.inserted, 60);

        let requests = search.requests.lock().unwrap();
        assert_eq!(requests[0].organization_id.as_deref(), Some("org-1"));
        assert_eq!(requests[0].user_id.as_deref(), Some("user-9"));
        assert_eq!(requests[0].per_page, 100);
    }

    #[tokio::test]
    async fn test_people_inserts_are_deduplicated_by_repository() {
        let search = ScriptedSearch::new(vec![Reply::Records(50)]);
        let repo = Arc::new(SqliteRepository::in_memory().unwrap());
        repo.insert_person(
            &PersonRow::from_api(&json!({"id": "p1-0", "first_name": "Old"}), "org-1").unwrap(),
        )
        .await
        .unwrap();

        let fetcher = PageFetcher::new(search, repo, "org-1", Duration::ZERO);
        let result = fetcher.fetch(&job(JobType::People, 50)).await;

        assert_eq!(result.stats.processed, 50);
        assert_eq!(result.stats.inserted, 49);
    }

    #[tokio::test]
    async fn test_emits_progress_events() {
        let search = ScriptedSearch::new(vec![Reply::Records(10)]);
        let (tx, mut rx) = mpsc::unbounded_channel();
        fetcher(search)
            .with_events(tx)
            .fetch(&job(JobType::People, 10))
            .await;

        assert!(matches!(
            rx.recv().await,
            Some(FetchEvent::Started { target_pages: 1, .. })
        ));
        assert!(matches!(
            rx.recv().await,
            Some(FetchEvent::PageFetched { page: 1, records: 10, .. })
        ));
        assert!(matches!(
            rx.recv().await,
            Some(FetchEvent::Finished {
                status: RunStatus::Completed,
                ..
            })
        ));
    }
}
