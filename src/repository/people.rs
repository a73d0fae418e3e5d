//! People rows: mapping from search results and fault-tolerant insertion.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::ProspectRepository;

/// Pipeline stage assigned to freshly discovered people.
pub const INITIAL_STAGE: &str = "new";

/// Enrichment status assigned to freshly discovered people.
pub const INITIAL_ENRICHMENT_STATUS: &str = "pending";

/// Normalized person row as stored in the people table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonRow {
    pub external_person_id: String,
    pub organization_id: String,
    pub name: String,
    pub title: Option<String>,
    pub company_name: Option<String>,
    pub linkedin_url: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub photo_url: Option<String>,
    pub stage: String,
    pub enrichment_status: String,
}

impl PersonRow {
    /// Map a raw search result. Records without an id are dropped.
    pub fn from_api(record: &Value, organization_id: &str) -> Option<Self> {
        let external_person_id = match record.get("id")? {
            Value::String(s) if !s.trim().is_empty() => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };

        let first = str_field(record, "first_name").unwrap_or_default();
        let last = str_field(record, "last_name_obfuscated")
            .or_else(|| str_field(record, "last_name"));
        let name = match last {
            Some(last) if !first.is_empty() => format!("{} {}", first, last),
            Some(last) => last,
            None => first,
        };

        let company_name = record
            .get("organization")
            .and_then(|org| str_field(org, "name"))
            .or_else(|| str_field(record, "organization_name"));

        Some(Self {
            external_person_id,
            organization_id: organization_id.to_string(),
            name,
            title: str_field(record, "title"),
            company_name,
            linkedin_url: str_field(record, "linkedin_url"),
            city: str_field(record, "city"),
            state: str_field(record, "state"),
            country: str_field(record, "country"),
            photo_url: str_field(record, "photo_url"),
            stage: INITIAL_STAGE.to_string(),
            enrichment_status: INITIAL_ENRICHMENT_STATUS.to_string(),
        })
    }

    /// Map a whole page of raw records.
    pub fn from_page(records: &[Value], organization_id: &str) -> Vec<Self> {
        records
            .iter()
            .filter_map(|r| Self::from_api(r, organization_id))
            .collect()
    }
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Insert a page of rows, falling back to one-by-one inserts when the bulk
/// call fails. Returns the number of newly inserted rows; rows that fail
/// individually are logged and skipped.
pub async fn persist_people(repo: &dyn ProspectRepository, rows: &[PersonRow]) -> u64 {
    if rows.is_empty() {
        return 0;
    }

    match repo.insert_people(rows).await {
        Ok(inserted) => inserted.len() as u64,
        Err(e) => {
            warn!(
                "Bulk insert of {} rows failed ({}), retrying row by row",
                rows.len(),
                e
            );

            let mut inserted = 0u64;
            for row in rows {
                match repo.insert_person(row).await {
                    Ok(true) => inserted += 1,
                    Ok(false) => {}
                    Err(e) => debug!(
                        external_person_id = %row.external_person_id,
                        "Row insert failed: {}", e
                    ),
                }
            }
            inserted
        }
    }
}
