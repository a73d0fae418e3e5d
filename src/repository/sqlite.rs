//! Local SQLite repository (rusqlite).

use std::path::Path;

use async_trait::async_trait;
use rusqlite::{params, Connection};
use tokio::sync::Mutex;

use super::{PersonRow, ProspectRepository, Result, RunReportRow};
use crate::models::RunReport;

const INSERT_PERSON: &str = r#"
    INSERT INTO prospects (
        external_person_id, organization_id, name, title, company_name,
        linkedin_url, city, state, country, photo_url, stage, enrichment_status
    )
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
    ON CONFLICT(external_person_id, organization_id) DO NOTHING
"#;

/// SQLite-backed prospect repository.
pub struct SqliteRepository {
    conn: Mutex<Connection>,
}

impl SqliteRepository {
    /// Open (or create) a database file and ensure the schema exists.
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            // Surfaced by Connection::open below if this fails.
            let _ = std::fs::create_dir_all(parent);
        }
        Self::from_connection(Connection::open(db_path)?)
    }

    /// In-memory database, used by tests and dry runs.
    pub fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Number of stored people for an organization.
    pub async fn count_people(&self, organization_id: &str) -> Result<u64> {
        let conn = self.conn.lock().await;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM prospects WHERE organization_id = ?",
            params![organization_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Stored run reports as (fingerprint, status, inserted), oldest first.
    pub async fn run_reports(&self) -> Result<Vec<(String, String, u64)>> {
        let conn = self.conn.lock().await;
        let mut stmt =
            conn.prepare("SELECT fingerprint, status, inserted FROM scrape_runs ORDER BY id")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get::<_, i64>(2)? as u64))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS prospects (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            external_person_id TEXT NOT NULL,
            organization_id TEXT NOT NULL,
            name TEXT NOT NULL,
            title TEXT,
            company_name TEXT,
            linkedin_url TEXT,
            city TEXT,
            state TEXT,
            country TEXT,
            photo_url TEXT,
            stage TEXT NOT NULL,
            enrichment_status TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
            UNIQUE (external_person_id, organization_id)
        );

        CREATE TABLE IF NOT EXISTS scrape_runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            organization_id TEXT NOT NULL,
            job_type TEXT NOT NULL,
            fingerprint TEXT NOT NULL,
            filters TEXT NOT NULL,
            expected INTEGER NOT NULL,
            processed INTEGER NOT NULL,
            inserted INTEGER NOT NULL,
            pages_fetched INTEGER NOT NULL,
            status TEXT NOT NULL,
            error_log TEXT,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        );
        CREATE INDEX IF NOT EXISTS idx_scrape_runs_fingerprint ON scrape_runs(fingerprint);
    "#,
    )
}

fn insert_row(conn: &Connection, row: &PersonRow) -> rusqlite::Result<bool> {
    let changed = conn.execute(
        INSERT_PERSON,
        params![
            row.external_person_id,
            row.organization_id,
            row.name,
            row.title,
            row.company_name,
            row.linkedin_url,
            row.city,
            row.state,
            row.country,
            row.photo_url,
            row.stage,
            row.enrichment_status,
        ],
    )?;
    Ok(changed > 0)
}

#[async_trait]
impl ProspectRepository for SqliteRepository {
    async fn insert_people(&self, rows: &[PersonRow]) -> Result<Vec<PersonRow>> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        let mut inserted = Vec::new();
        for row in rows {
            if insert_row(&tx, row)? {
                inserted.push(row.clone());
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    async fn insert_person(&self, row: &PersonRow) -> Result<bool> {
        let conn = self.conn.lock().await;
        Ok(insert_row(&conn, row)?)
    }

    async fn insert_run_report(&self, report: &RunReport) -> Result<()> {
        let row = RunReportRow::from(report);
        let filters = serde_json::to_string(row.filters)?;
        let conn = self.conn.lock().await;
        conn.execute(
            r#"
            INSERT INTO scrape_runs (
                organization_id, job_type, fingerprint, filters, expected,
                processed, inserted, pages_fetched, status, error_log
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                row.organization_id,
                row.job_type,
                row.fingerprint,
                filters,
                row.expected as i64,
                row.processed as i64,
                row.inserted as i64,
                row.pages_fetched as i64,
                row.status,
                row.error_log,
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Filters, Job, JobType, RunStats, RunStatus};
    use serde_json::json;

    fn person(id: &str) -> PersonRow {
        PersonRow::from_api(&json!({"id": id, "first_name": "Grace"}), "org-1").unwrap()
    }

    #[tokio::test]
    async fn test_insert_people_ignores_duplicates() {
        let repo = SqliteRepository::in_memory().unwrap();

        let first = repo
            .insert_people(&[person("a"), person("b")])
            .await
            .unwrap();
        assert_eq!(first.len(), 2);

        let second = repo
            .insert_people(&[person("b"), person("c"), person("c")])
            .await
            .unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].external_person_id, "c");
        assert_eq!(repo.count_people("org-1").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_conflict_is_scoped_by_organization() {
        let repo = SqliteRepository::in_memory().unwrap();
        assert!(repo.insert_person(&person("a")).await.unwrap());
        assert!(!repo.insert_person(&person("a")).await.unwrap());

        let mut other_org = person("a");
        other_org.organization_id = "org-2".into();
        assert!(repo.insert_person(&other_org).await.unwrap());
    }

    #[tokio::test]
    async fn test_insert_run_report() {
        let repo = SqliteRepository::in_memory().unwrap();
        let mut filters = Filters::new();
        filters.insert("q_keywords".into(), json!("engineer"));
        let job = Job::new(JobType::People, filters, 10);
        let report = RunReport::new(
            &job,
            "org-1",
            RunStats::new(10),
            RunStatus::Failed,
            Some("boom".into()),
        );

        repo.insert_run_report(&report).await.unwrap();

        let reports = repo.run_reports().await.unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].0, job.fingerprint().as_str());
        assert_eq!(reports[0].1, "failed");
    }
}
