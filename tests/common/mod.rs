#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use ops_report::dataset::Dataset;
use tempfile::{TempDir, tempdir};

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }

    /// Writes the daily export used across the integration tests.
    pub fn write_daily_export(&self, name: &str) -> PathBuf {
        self.write(name, &daily_export_csv())
    }
}

pub fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, d).expect("valid January date")
}

/// Two weeks of one row per day: `output` is 100 except 40 on 2024-01-08.
pub fn daily_rows() -> Vec<Vec<String>> {
    (1..=14)
        .map(|d| {
            vec![
                format!("2024-01-{d:02}"),
                if d % 2 == 0 { "MSD" } else { "Nazar" }.to_string(),
                if d == 8 { "40" } else { "100" }.to_string(),
                format!("{}.5", d % 3),
            ]
        })
        .collect()
}

pub fn daily_headers() -> Vec<String> {
    ["fecha", "empresa", "output", "scrap"]
        .iter()
        .map(|h| h.to_string())
        .collect()
}

pub fn daily_export_csv() -> String {
    let mut csv = daily_headers().join(",");
    csv.push('\n');
    for row in daily_rows() {
        csv.push_str(&row.join(","));
        csv.push('\n');
    }
    csv
}

pub fn daily_dataset() -> Dataset {
    Dataset::from_text_rows("Base de Datos", daily_headers(), daily_rows())
        .expect("rectangular rows")
}
