//! reqwest-backed search client for the hosted edge functions.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::debug;

use super::{SearchClient, SearchError, SearchPage, SearchRequest};
use crate::models::JobType;
use crate::rate_limit::parse_retry_after;

/// HTTP search client; one endpoint per job type.
#[derive(Clone)]
pub struct HttpSearchClient {
    client: Client,
    people_url: String,
    company_url: String,
    api_key: Option<String>,
}

impl HttpSearchClient {
    pub fn new(
        people_url: &str,
        company_url: &str,
        api_key: Option<&str>,
        user_agent: &str,
        timeout: Duration,
    ) -> Result<Self, SearchError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self {
            client,
            people_url: people_url.to_string(),
            company_url: company_url.to_string(),
            api_key: api_key.map(str::to_string),
        })
    }

    pub fn endpoint(&self, job_type: JobType) -> &str {
        match job_type {
            JobType::People => &self.people_url,
            JobType::Companies => &self.company_url,
        }
    }
}

#[async_trait]
impl SearchClient for HttpSearchClient {
    async fn search(
        &self,
        job_type: JobType,
        request: &SearchRequest,
    ) -> Result<SearchPage, SearchError> {
        let url = self.endpoint(job_type);
        let mut builder = self.client.post(url).json(request);
        if let Some(ref key) = self.api_key {
            builder = builder.bearer_auth(key).header("apikey", key);
        }

        let start = Instant::now();
        let response = builder.send().await?;
        let status = response.status();
        debug!(
            url,
            page = request.page,
            status = status.as_u16(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Search request finished"
        );

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok());
            return Err(SearchError::RateLimited {
                retry_after: parse_retry_after(retry_after),
            });
        }

        let body = response.text().await?;
        if !status.is_success() {
            return Err(SearchError::Status {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        Ok(SearchPage::parse(job_type, &body)?)
    }
}
