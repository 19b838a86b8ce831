//! Column classification for loaded datasets.
//!
//! Every column is sorted into one of four [`ColumnKind`]s by sampling its
//! non-empty cells:
//!
//! - **Date** when at least `date_ratio` of the cells are dates or datetimes
//!   (text that parses as a date counts).
//! - **Numeric** when at least `numeric_ratio` of the cells are numbers.
//! - **Categorical** when the number of distinct values is small, both in
//!   absolute terms and relative to the row count.
//! - **Text** otherwise, including columns without any non-empty cell.
//!
//! Profiles are a pure function of the dataset and must be recomputed whenever
//! a new dataset is loaded.

use std::{collections::BTreeSet, fmt};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{data::Value, dataset::Dataset, error::ReportError};

const DATE_NAME_HINTS: &[&str] = &["date", "fecha", "day", "dia"];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Date,
    Numeric,
    Categorical,
    Text,
}

impl ColumnKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnKind::Date => "date",
            ColumnKind::Numeric => "numeric",
            ColumnKind::Categorical => "categorical",
            ColumnKind::Text => "text",
        }
    }
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tunable thresholds for [`classify_columns`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClassifierOptions {
    pub date_ratio: f64,
    pub numeric_ratio: f64,
    pub max_categorical_distinct: usize,
    pub max_categorical_ratio: f64,
}

impl Default for ClassifierOptions {
    fn default() -> Self {
        Self {
            date_ratio: 0.9,
            numeric_ratio: 0.9,
            max_categorical_distinct: 50,
            max_categorical_ratio: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DateRange {
    pub earliest: NaiveDate,
    pub latest: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnProfile {
    pub name: String,
    pub kind: ColumnKind,
    pub non_empty: usize,
    pub distinct: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_range: Option<DateRange>,
}

/// Profiles for every column of a dataset, in header order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct ColumnProfiles {
    columns: Vec<ColumnProfile>,
}

impl ColumnProfiles {
    pub fn iter(&self) -> impl Iterator<Item = &ColumnProfile> {
        self.columns.iter()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&ColumnProfile> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn names_of_kind(&self, kind: ColumnKind) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| c.kind == kind)
            .map(|c| c.name.clone())
            .collect()
    }

    pub fn date_columns(&self) -> Vec<String> {
        self.names_of_kind(ColumnKind::Date)
    }

    pub fn numeric_columns(&self) -> Vec<String> {
        self.names_of_kind(ColumnKind::Numeric)
    }

    pub fn categorical_columns(&self) -> Vec<String> {
        self.names_of_kind(ColumnKind::Categorical)
    }

    /// Picks the date column a user most likely wants to filter on.
    pub fn default_date_column(&self) -> Option<&ColumnProfile> {
        let mut dates = self.columns.iter().filter(|c| c.kind == ColumnKind::Date);
        let first = dates.clone().next();
        dates
            .find(|c| {
                let lowered = c.name.to_lowercase();
                DATE_NAME_HINTS.iter().any(|hint| lowered.contains(hint))
            })
            .or(first)
    }

    /// Looks up `name` and checks that it was classified as `kind`.
    pub fn require(&self, name: &str, kind: ColumnKind) -> Result<&ColumnProfile, ReportError> {
        let profile = self
            .get(name)
            .ok_or_else(|| ReportError::invalid_column(name, "column not found in dataset"))?;
        if profile.kind != kind {
            return Err(ReportError::invalid_column(
                name,
                format!("expected a {kind} column but it was classified as {}", profile.kind),
            ));
        }
        Ok(profile)
    }
}

#[derive(Default)]
struct KindCandidate {
    non_empty: usize,
    date_matches: usize,
    numeric_matches: usize,
    earliest: Option<NaiveDate>,
    latest: Option<NaiveDate>,
    distinct: BTreeSet<String>,
}

impl KindCandidate {
    fn update(&mut self, value: &Value) {
        self.non_empty += 1;
        if let Some(date) = value.as_date() {
            self.date_matches += 1;
            self.earliest = Some(self.earliest.map_or(date, |d| d.min(date)));
            self.latest = Some(self.latest.map_or(date, |d| d.max(date)));
        } else if value.as_f64().is_some() {
            self.numeric_matches += 1;
        }
        self.distinct.insert(value.as_display());
    }

    fn meets(&self, matches: usize, ratio: f64) -> bool {
        matches > 0 && matches as f64 >= ratio * self.non_empty as f64
    }

    fn decide(&self, options: &ClassifierOptions) -> ColumnKind {
        if self.non_empty == 0 {
            return ColumnKind::Text;
        }
        let distinct = self.distinct.len();
        let ratio_cap = (options.max_categorical_ratio * self.non_empty as f64).max(1.0);
        if self.meets(self.date_matches, options.date_ratio) {
            ColumnKind::Date
        } else if self.meets(self.numeric_matches, options.numeric_ratio) {
            ColumnKind::Numeric
        } else if distinct <= options.max_categorical_distinct && distinct as f64 <= ratio_cap {
            ColumnKind::Categorical
        } else {
            ColumnKind::Text
        }
    }

    fn into_profile(self, name: &str, options: &ClassifierOptions) -> ColumnProfile {
        let kind = self.decide(options);
        let date_range = match (kind, self.earliest, self.latest) {
            (ColumnKind::Date, Some(earliest), Some(latest)) => Some(DateRange { earliest, latest }),
            _ => None,
        };
        ColumnProfile {
            name: name.to_string(),
            kind,
            non_empty: self.non_empty,
            distinct: self.distinct.len(),
            date_range,
        }
    }
}

pub fn classify_columns(dataset: &Dataset, options: &ClassifierOptions) -> ColumnProfiles {
    let mut candidates: Vec<KindCandidate> = dataset
        .headers()
        .iter()
        .map(|_| KindCandidate::default())
        .collect();
    for row in dataset.rows() {
        for (candidate, cell) in candidates.iter_mut().zip(row.iter()) {
            if let Some(value) = cell {
                candidate.update(value);
            }
        }
    }
    let columns = dataset
        .headers()
        .iter()
        .zip(candidates)
        .map(|(name, candidate)| candidate.into_profile(name, options))
        .collect();
    ColumnProfiles { columns }
}

/// Sorted distinct display values of a column, used to populate filter choices.
pub fn distinct_values(dataset: &Dataset, column: &str) -> Result<Vec<String>, ReportError> {
    let index = dataset
        .column_index(column)
        .ok_or_else(|| ReportError::invalid_column(column, "column not found in dataset"))?;
    let values: BTreeSet<String> = dataset
        .column_values(index)
        .flatten()
        .map(Value::as_display)
        .collect();
    Ok(values.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_dataset() -> Dataset {
        let headers = ["Fecha Turno", "created", "empresa", "output", "comentario"]
            .iter()
            .map(|h| h.to_string())
            .collect();
        let rows = (1..=10)
            .map(|day| {
                vec![
                    format!("2024-01-{day:02}"),
                    format!("2024-02-{day:02} 08:00:00"),
                    if day % 2 == 0 { "MSD".into() } else { "Nazar".into() },
                    if day == 3 { "N/A".into() } else { format!("{}", day * 10) },
                    format!("turno sin novedad {day}"),
                ]
            })
            .collect();
        Dataset::from_text_rows("Base de Datos", headers, rows).unwrap()
    }

    #[test]
    fn classify_columns_assigns_each_kind() {
        let profiles = classify_columns(&sample_dataset(), &ClassifierOptions::default());
        let kinds: Vec<_> = profiles.iter().map(|p| p.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ColumnKind::Date,
                ColumnKind::Date,
                ColumnKind::Categorical,
                ColumnKind::Numeric,
                ColumnKind::Text,
            ]
        );
        let output = profiles.get("output").unwrap();
        assert_eq!(output.non_empty, 9);
    }

    #[test]
    fn date_profile_carries_parsed_range() {
        let profiles = classify_columns(&sample_dataset(), &ClassifierOptions::default());
        let range = profiles.get("Fecha Turno").unwrap().date_range.unwrap();
        assert_eq!(range.earliest, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(range.latest, NaiveDate::from_ymd_opt(2024, 1, 10).unwrap());
    }

    #[test]
    fn mostly_numeric_column_tolerates_stray_text_below_ratio() {
        let headers = vec!["value".to_string()];
        let mut rows: Vec<Vec<String>> = (0..19).map(|i| vec![i.to_string()]).collect();
        rows.push(vec!["pending".to_string()]);
        let dataset = Dataset::from_text_rows("s", headers, rows).unwrap();
        let profiles = classify_columns(&dataset, &ClassifierOptions::default());
        assert_eq!(profiles.get("value").unwrap().kind, ColumnKind::Numeric);

        let strict = ClassifierOptions {
            numeric_ratio: 1.0,
            ..ClassifierOptions::default()
        };
        let profiles = classify_columns(&dataset, &strict);
        assert_eq!(profiles.get("value").unwrap().kind, ColumnKind::Text);
    }

    #[test]
    fn empty_column_is_text() {
        let dataset =
            Dataset::from_text_rows("s", vec!["blank".into()], vec![vec!["".into()]]).unwrap();
        let profiles = classify_columns(&dataset, &ClassifierOptions::default());
        assert_eq!(profiles.get("blank").unwrap().kind, ColumnKind::Text);
    }

    #[test]
    fn default_date_column_prefers_named_hint() {
        let profiles = classify_columns(&sample_dataset(), &ClassifierOptions::default());
        assert_eq!(profiles.default_date_column().unwrap().name, "Fecha Turno");
    }

    #[test]
    fn require_reports_missing_and_misclassified_columns() {
        let profiles = classify_columns(&sample_dataset(), &ClassifierOptions::default());
        assert!(profiles.require("output", ColumnKind::Numeric).is_ok());
        assert!(matches!(
            profiles.require("output", ColumnKind::Date),
            Err(ReportError::InvalidColumn { .. })
        ));
        assert!(matches!(
            profiles.require("missing", ColumnKind::Date),
            Err(ReportError::InvalidColumn { .. })
        ));
    }

    #[test]
    fn distinct_values_are_sorted() {
        let values = distinct_values(&sample_dataset(), "empresa").unwrap();
        assert_eq!(values, vec!["MSD".to_string(), "Nazar".to_string()]);
    }
}
