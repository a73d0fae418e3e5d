//! Flat-file history of completed queries, keyed by fingerprint.
//!
//! The whole file is read on every lookup and rewritten on every update.
//! Writes go through a temp file in the same directory and are renamed into
//! place, so a crash mid-write leaves the previous history intact.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::models::{HistoryEntry, QueryFingerprint};

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("History file I/O error ({path}): {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("History file {path} is not valid JSON: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub type HistoryMap = BTreeMap<QueryFingerprint, HistoryEntry>;

/// JSON file mapping fingerprint -> last run outcome.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the full history. A missing or empty file is an empty history.
    pub fn load(&self) -> Result<HistoryMap, HistoryError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HistoryMap::new()),
            Err(source) => {
                return Err(HistoryError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        if contents.trim().is_empty() {
            return Ok(HistoryMap::new());
        }

        serde_json::from_str(&contents).map_err(|source| HistoryError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    pub fn get(
        &self,
        fingerprint: &QueryFingerprint,
    ) -> Result<Option<HistoryEntry>, HistoryError> {
        Ok(self.load()?.remove(fingerprint))
    }

    /// Insert or overwrite the entry for a fingerprint.
    pub fn record(
        &self,
        fingerprint: &QueryFingerprint,
        entry: HistoryEntry,
    ) -> Result<(), HistoryError> {
        let mut history = self.load()?;
        history.insert(fingerprint.clone(), entry);
        self.write(&history)
    }

    /// Drop a single fingerprint so its query can run again.
    pub fn forget(&self, fingerprint: &QueryFingerprint) -> Result<bool, HistoryError> {
        let mut history = self.load()?;
        let removed = history.remove(fingerprint).is_some();
        if removed {
            self.write(&history)?;
        }
        Ok(removed)
    }

    /// Remove every entry. Returns how many were dropped.
    pub fn clear(&self) -> Result<usize, HistoryError> {
        let history = self.load()?;
        let count = history.len();
        self.write(&HistoryMap::new())?;
        Ok(count)
    }

    /// Move an unreadable history file aside to `<path>.corrupt` so a fresh
    /// history can be written. Returns where the old file went.
    pub fn quarantine(&self) -> Result<PathBuf, HistoryError> {
        let mut moved = self.path.clone().into_os_string();
        moved.push(".corrupt");
        let moved = PathBuf::from(moved);

        fs::rename(&self.path, &moved).map_err(|source| HistoryError::Io {
            path: self.path.clone(),
            source,
        })?;
        Ok(moved)
    }

    fn write(&self, history: &HistoryMap) -> Result<(), HistoryError> {
        let io_err = |source| HistoryError::Io {
            path: self.path.clone(),
            source,
        };

        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        fs::create_dir_all(dir).map_err(io_err)?;

        let json = serde_json::to_string_pretty(history).map_err(|source| {
            HistoryError::Corrupt {
                path: self.path.clone(),
                source,
            }
        })?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
        tmp.write_all(json.as_bytes()).map_err(io_err)?;
        tmp.persist(&self.path).map_err(|e| io_err(e.error))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Filters, JobType, RunStats};
    use chrono::Utc;
    use serde_json::json;
    use tempfile::TempDir;

    fn entry(inserted: u64) -> HistoryEntry {
        let mut filters = Filters::new();
        filters.insert("q_keywords".into(), json!("engineer"));
        HistoryEntry {
            date: Utc::now(),
            job_type: JobType::People,
            filters,
            stats: RunStats {
                expected: 10,
                processed: 10,
                inserted,
                pages_fetched: 1,
            },
        }
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = HistoryStore::new(dir.path().join("history.json"));
        assert!(store.load().unwrap().is_empty());
        assert!(store
            .get(&QueryFingerprint::from_hex("abc"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_record_and_overwrite() {
        let dir = TempDir::new().unwrap();
        let store = HistoryStore::new(dir.path().join("nested").join("history.json"));
        let fp = QueryFingerprint::from_hex("abc");

        store.record(&fp, entry(3)).unwrap();
        assert_eq!(store.get(&fp).unwrap().unwrap().stats.inserted, 3);

        store.record(&fp, entry(7)).unwrap();
        let history = store.load().unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[&fp].stats.inserted, 7);
    }

    #[test]
    fn test_forget_and_clear() {
        let dir = TempDir::new().unwrap();
        let store = HistoryStore::new(dir.path().join("history.json"));
        let a = QueryFingerprint::from_hex("a");
        let b = QueryFingerprint::from_hex("b");
        store.record(&a, entry(1)).unwrap();
        store.record(&b, entry(2)).unwrap();

        assert!(store.forget(&a).unwrap());
        assert!(!store.forget(&a).unwrap());
        assert_eq!(store.clear().unwrap(), 1);
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_file_is_not_overwritten() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");
        fs::write(&path, "{not json").unwrap();
        let store = HistoryStore::new(&path);

        assert!(matches!(store.load(), Err(HistoryError::Corrupt { .. })));
        assert!(store
            .record(&QueryFingerprint::from_hex("a"), entry(1))
            .is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), "{not json");
    }

    #[test]
    fn test_quarantine_moves_corrupt_file_aside() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scrape_history.json");
        fs::write(&path, "{not json").unwrap();
        let store = HistoryStore::new(&path);

        let moved = store.quarantine().unwrap();
        assert_eq!(moved, dir.path().join("scrape_history.json.corrupt"));
        assert_eq!(fs::read_to_string(&moved).unwrap(), "{not json");
        assert!(store.load().unwrap().is_empty());

        store.record(&QueryFingerprint::from_hex("a"), entry(1)).unwrap();
        assert_eq!(store.load().unwrap().len(), 1);
    }
}
