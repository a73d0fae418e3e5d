//! Hosted database repository speaking the PostgREST dialect (Supabase).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};

use super::{PersonRow, ProspectRepository, RepositoryError, Result, RunReportRow};
use crate::models::RunReport;

/// Conflict target for people inserts.
const PEOPLE_CONFLICT: &str = "external_person_id,organization_id";

/// PostgREST-backed prospect repository.
#[derive(Clone)]
pub struct PostgrestRepository {
    client: Client,
    rest_url: String,
    api_key: String,
    people_table: String,
    reports_table: String,
}

impl PostgrestRepository {
    pub fn new(
        base_url: &str,
        api_key: &str,
        people_table: &str,
        reports_table: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).gzip(true).build()?;
        Ok(Self {
            client,
            rest_url: format!("{}/rest/v1", base_url.trim_end_matches('/')),
            api_key: api_key.to_string(),
            people_table: people_table.to_string(),
            reports_table: reports_table.to_string(),
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{}", self.rest_url, table)
    }

    fn post(&self, url: &str, prefer: &str) -> reqwest::RequestBuilder {
        self.client
            .post(url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .header("Prefer", prefer)
    }

    async fn insert_ignoring_duplicates(&self, rows: &[PersonRow]) -> Result<Vec<PersonRow>> {
        let response = self
            .post(
                &self.table_url(&self.people_table),
                "resolution=ignore-duplicates,return=representation",
            )
            .query(&[("on_conflict", PEOPLE_CONFLICT)])
            .json(rows)
            .send()
            .await?;

        let response = check_status(response).await?;
        Ok(response.json::<Vec<PersonRow>>().await?)
    }
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(RepositoryError::Status {
        status: status.as_u16(),
        body: body.chars().take(500).collect(),
    })
}

#[async_trait]
impl ProspectRepository for PostgrestRepository {
    async fn insert_people(&self, rows: &[PersonRow]) -> Result<Vec<PersonRow>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        self.insert_ignoring_duplicates(rows).await
    }

    async fn insert_person(&self, row: &PersonRow) -> Result<bool> {
        let inserted = self.insert_ignoring_duplicates(std::slice::from_ref(row)).await?;
        Ok(!inserted.is_empty())
    }

    async fn insert_run_report(&self, report: &RunReport) -> Result<()> {
        let response = self
            .post(&self.table_url(&self.reports_table), "return=minimal")
            .json(&RunReportRow::from(report))
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_url_trims_trailing_slash() {
        let repo = PostgrestRepository::new(
            "https://project.supabase.co/",
            "key",
            "prospects",
            "scrape_runs",
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            repo.table_url("prospects"),
            "https://project.supabase.co/rest/v1/prospects"
        );
    }
}
