//! Report persistence keyed by date selection.
//!
//! [`DirectoryStore`] keeps one directory per key:
//!
//! ```text
//! <root>/2024-01-08/report.json
//! <root>/2024-01-08/data.csv
//! <root>/2024-01-01_2024-01-07/report.json
//! ```
//!
//! `report.json` is authoritative. `data.csv` is a plain-text copy of the
//! embedded rows for use outside this tool. Saves are last-write-wins.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::OnceLock,
};

use anyhow::{Context, Result};
use encoding_rs::UTF_8;
use log::{debug, info, warn};
use regex::Regex;

use crate::{error::ReportError, io_utils, report::Report};

const REPORT_FILE: &str = "report.json";
const DATA_FILE: &str = "data.csv";

pub trait ReportStore {
    fn save(&self, report: &Report) -> Result<()>;

    /// Loads a report; a missing key is `Ok(None)`, not an error.
    fn load(&self, key: &str) -> Result<Option<Report>>;

    /// Available keys, newest first.
    fn list_keys(&self) -> Result<Vec<String>>;

    /// Removes a report, returning whether one existed.
    fn delete(&self, key: &str) -> Result<bool>;
}

fn key_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\d{4}-\d{2}-\d{2}(_\d{4}-\d{2}-\d{2})?$").expect("valid key pattern")
    })
}

pub fn validate_key(key: &str) -> Result<(), ReportError> {
    if key_pattern().is_match(key) {
        Ok(())
    } else {
        Err(ReportError::InvalidKey(key.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("Creating report store directory {root:?}"))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn report_dir(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }

    pub fn report_path(&self, key: &str) -> Result<PathBuf> {
        Ok(self.report_dir(key)?.join(REPORT_FILE))
    }
}

impl ReportStore for DirectoryStore {
    fn save(&self, report: &Report) -> Result<()> {
        let dir = self.report_dir(&report.key)?;
        fs::create_dir_all(&dir).with_context(|| format!("Creating report directory {dir:?}"))?;

        let json = serde_json::to_vec_pretty(report).context("Serializing report JSON")?;
        io_utils::write_atomically(&dir.join(REPORT_FILE), &json)
            .with_context(|| format!("Saving report '{}'", report.key))?;

        let csv = io_utils::csv_bytes(&report.data.headers, &report.data.display_rows(), UTF_8)?;
        if let Err(err) = io_utils::write_atomically(&dir.join(DATA_FILE), &csv) {
            warn!("Report '{}' saved but data.csv backup failed: {err:#}", report.key);
        }
        info!("Saved report '{}' to {:?}", report.key, dir);
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<Report>> {
        let path = self.report_path(key)?;
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!("No report stored under '{key}'");
                return Ok(None);
            }
            Err(err) => {
                return Err(err).with_context(|| format!("Reading report file {path:?}"));
            }
        };
        let report: Report = serde_json::from_slice(&bytes)
            .with_context(|| format!("Parsing report file {path:?}"))?;
        report.verify_integrity()?;
        Ok(Some(report))
    }

    fn list_keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.root)
            .with_context(|| format!("Listing report store {:?}", self.root))?
        {
            let entry = entry.with_context(|| format!("Listing report store {:?}", self.root))?;
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if validate_key(&name).is_err() {
                continue;
            }
            if entry.path().join(REPORT_FILE).is_file() {
                keys.push(name);
            } else {
                debug!("Skipping {name}: no {REPORT_FILE}");
            }
        }
        keys.sort_unstable_by(|a, b| b.cmp(a));
        Ok(keys)
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let dir = self.report_dir(key)?;
        if !dir.join(REPORT_FILE).is_file() {
            return Ok(false);
        }
        fs::remove_dir_all(&dir).with_context(|| format!("Removing report directory {dir:?}"))?;
        info!("Deleted report '{key}'");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_key_accepts_dates_and_ranges_only() {
        assert!(validate_key("2024-01-08").is_ok());
        assert!(validate_key("2024-01-01_2024-01-07").is_ok());
        assert!(validate_key("../etc").is_err());
        assert!(validate_key("2024-1-8").is_err());
    }

    #[test]
    fn load_of_unknown_key_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::open(dir.path()).unwrap();
        assert!(store.load("2024-01-08").unwrap().is_none());
        assert!(store.list_keys().unwrap().is_empty());
        assert!(!store.delete("2024-01-08").unwrap());
    }

    #[test]
    fn list_keys_ignores_foreign_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::open(dir.path()).unwrap();
        fs::create_dir_all(dir.path().join("raw")).unwrap();
        fs::create_dir_all(dir.path().join("2024-01-09")).unwrap();
        assert!(store.list_keys().unwrap().is_empty());
    }
}
