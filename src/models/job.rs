//! Discovery job model and query fingerprinting.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Opaque search criteria as submitted by the CRM UI.
pub type Filters = Map<String, Value>;

/// Kind of records a job extracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    #[default]
    People,
    Companies,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::People => "people",
            JobType::Companies => "companies",
        }
    }

    /// Parse from the wire representation. Unknown values are rejected.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "people" => Some(JobType::People),
            "companies" => Some(JobType::Companies),
            _ => None,
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One discovery/extraction request.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub filters: Filters,
    pub total_entries: u64,
    pub job_type: JobType,
    pub created_by: Option<String>,
}

impl Job {
    pub fn new(job_type: JobType, filters: Filters, total_entries: u64) -> Self {
        Self {
            filters,
            total_entries,
            job_type,
            created_by: None,
        }
    }

    pub fn with_created_by(mut self, created_by: impl Into<String>) -> Self {
        self.created_by = Some(created_by.into());
        self
    }

    /// Dedup key for this job's (type, filters) pair.
    pub fn fingerprint(&self) -> QueryFingerprint {
        QueryFingerprint::compute(self.job_type, &self.filters)
    }
}

/// Deterministic SHA-256 of a job's type and filters, hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryFingerprint(String);

impl QueryFingerprint {
    pub fn compute(job_type: JobType, filters: &Filters) -> Self {
        let mut payload = Map::new();
        payload.insert("filters".to_string(), Value::Object(filters.clone()));
        payload.insert(
            "job_type".to_string(),
            Value::String(job_type.as_str().to_string()),
        );

        let mut canonical = String::new();
        write_canonical(&Value::Object(payload), &mut canonical);

        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Wrap an already computed fingerprint (e.g. read back from history).
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex characters, for log lines.
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl fmt::Display for QueryFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Serialize JSON with object keys sorted, independent of map ordering features.
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn filters(value: Value) -> Filters {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        let f = filters(json!({"q_keywords": "engineer", "person_locations": ["Berlin"]}));
        let a = QueryFingerprint::compute(JobType::People, &f);
        let b = QueryFingerprint::compute(JobType::People, &f);
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn test_fingerprint_ignores_key_order() {
        let mut first = Filters::new();
        first.insert("a".into(), json!(1));
        first.insert("b".into(), json!({"y": 2, "x": 1}));
        let mut second = Filters::new();
        second.insert("b".into(), json!({"x": 1, "y": 2}));
        second.insert("a".into(), json!(1));

        assert_eq!(
            QueryFingerprint::compute(JobType::People, &first),
            QueryFingerprint::compute(JobType::People, &second)
        );
    }

    #[test]
    fn test_fingerprint_changes_with_filters_and_type() {
        let base = filters(json!({"q_keywords": "engineer"}));
        let other_value = filters(json!({"q_keywords": "designer"}));
        let other_key = filters(json!({"q_title": "engineer"}));

        let fp = QueryFingerprint::compute(JobType::People, &base);
        assert_ne!(fp, QueryFingerprint::compute(JobType::People, &other_value));
        assert_ne!(fp, QueryFingerprint::compute(JobType::People, &other_key));
        assert_ne!(fp, QueryFingerprint::compute(JobType::Companies, &base));
    }

    #[test]
    fn test_job_type_parsing() {
        assert_eq!(JobType::from_str("people"), Some(JobType::People));
        assert_eq!(JobType::from_str(" Companies "), Some(JobType::Companies));
        assert_eq!(JobType::from_str("contacts"), None);
        assert_eq!(JobType::Companies.to_string(), "companies");
    }
}
