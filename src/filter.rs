use std::{fmt, str::FromStr};

use anyhow::{Result, anyhow};
use chrono::{Days, NaiveDate};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::{
    data::{Value, parse_naive_date},
    dataset::Dataset,
    error::ReportError,
    schema::{ColumnKind, ColumnProfiles},
};

/// A single calendar date or an inclusive date range.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DateSelection {
    Single(NaiveDate),
    Range { start: NaiveDate, end: NaiveDate },
}

impl DateSelection {
    /// Builds a range; a one-day range collapses to [`DateSelection::Single`].
    pub fn range(start: NaiveDate, end: NaiveDate) -> Result<Self, ReportError> {
        if start > end {
            return Err(ReportError::InvalidSelection(format!(
                "start {start} is after end {end}"
            )));
        }
        if start == end {
            Ok(DateSelection::Single(start))
        } else {
            Ok(DateSelection::Range { start, end })
        }
    }

    pub fn start(&self) -> NaiveDate {
        match self {
            DateSelection::Single(date) => *date,
            DateSelection::Range { start, .. } => *start,
        }
    }

    pub fn end(&self) -> NaiveDate {
        match self {
            DateSelection::Single(date) => *date,
            DateSelection::Range { end, .. } => *end,
        }
    }

    pub fn len_days(&self) -> u64 {
        (self.end() - self.start()).num_days() as u64 + 1
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start() <= date && date <= self.end()
    }

    /// The window of equal length ending the day before this one starts.
    pub fn previous(&self) -> Option<DateSelection> {
        self.shifted_back(1)
    }

    /// The window of equal length lying `periods` windows before this one.
    pub fn shifted_back(&self, periods: u64) -> Option<DateSelection> {
        let offset = Days::new(self.len_days().checked_mul(periods)?);
        let start = self.start().checked_sub_days(offset)?;
        let end = self.end().checked_sub_days(offset)?;
        Some(match self {
            DateSelection::Single(_) => DateSelection::Single(start),
            DateSelection::Range { .. } => DateSelection::Range { start, end },
        })
    }

    /// Storage key: `YYYY-MM-DD` or `YYYY-MM-DD_YYYY-MM-DD`.
    pub fn key(&self) -> String {
        match self {
            DateSelection::Single(date) => date.format("%Y-%m-%d").to_string(),
            DateSelection::Range { start, end } => format!(
                "{}_{}",
                start.format("%Y-%m-%d"),
                end.format("%Y-%m-%d")
            ),
        }
    }

    /// Human-readable period name used in insight sentences.
    pub fn label(&self) -> String {
        match self {
            DateSelection::Single(date) => date.format("%Y-%m-%d").to_string(),
            DateSelection::Range { start, end } => format!(
                "{} to {}",
                start.format("%Y-%m-%d"),
                end.format("%Y-%m-%d")
            ),
        }
    }
}

impl fmt::Display for DateSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

impl FromStr for DateSelection {
    type Err = ReportError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let parse = |raw: &str| {
            parse_naive_date(raw.trim())
                .map_err(|_| ReportError::InvalidSelection(format!("'{raw}' is not a date")))
        };
        let split = trimmed
            .split_once("..")
            .or_else(|| trimmed.split_once('_'));
        match split {
            Some((start, end)) => DateSelection::range(parse(start)?, parse(end)?),
            None => Ok(DateSelection::Single(parse(trimmed)?)),
        }
    }
}

/// Rows of a dataset whose date falls inside a selection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PeriodSubset {
    pub selection: DateSelection,
    pub rows: Vec<usize>,
}

impl PeriodSubset {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn materialize(&self, dataset: &Dataset) -> Dataset {
        dataset.select_rows(&self.rows)
    }
}

/// The selected period and, when history allows, the one immediately before it.
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodSelection {
    pub current: PeriodSubset,
    pub previous: Option<PeriodSubset>,
}

fn date_column_index(
    dataset: &Dataset,
    profiles: &ColumnProfiles,
    column: &str,
) -> Result<usize, ReportError> {
    profiles.require(column, ColumnKind::Date)?;
    dataset
        .column_index(column)
        .ok_or_else(|| ReportError::invalid_column(column, "column not found in dataset"))
}

pub fn filter_by_date(
    dataset: &Dataset,
    profiles: &ColumnProfiles,
    column: &str,
    selection: &DateSelection,
) -> Result<PeriodSubset, ReportError> {
    let index = date_column_index(dataset, profiles, column)?;
    let rows = dataset
        .column_values(index)
        .enumerate()
        .filter(|(_, value)| {
            value
                .and_then(Value::as_date)
                .is_some_and(|date| selection.contains(date))
        })
        .map(|(row, _)| row)
        .collect();
    Ok(PeriodSubset {
        selection: *selection,
        rows,
    })
}

/// Earliest calendar date present in a date column.
pub fn earliest_date(dataset: &Dataset, column: &str) -> Option<NaiveDate> {
    let index = dataset.column_index(column)?;
    dataset
        .column_values(index)
        .filter_map(|value| value.and_then(Value::as_date))
        .min()
}

/// Latest calendar date present in a date column.
pub fn latest_date(dataset: &Dataset, column: &str) -> Option<NaiveDate> {
    let index = dataset.column_index(column)?;
    dataset
        .column_values(index)
        .filter_map(|value| value.and_then(Value::as_date))
        .max()
}

/// Filters the current period and derives the comparison period.
///
/// The comparison period is omitted when its window ends before the earliest
/// date in the column.
pub fn select_periods(
    dataset: &Dataset,
    profiles: &ColumnProfiles,
    column: &str,
    selection: &DateSelection,
) -> Result<PeriodSelection, ReportError> {
    let current = filter_by_date(dataset, profiles, column, selection)?;
    let previous = match (selection.previous(), earliest_date(dataset, column)) {
        (Some(window), Some(earliest)) if window.end() >= earliest => {
            Some(filter_by_date(dataset, profiles, column, &window)?)
        }
        (window, _) => {
            warn!(
                "No data before {} in column '{}'; comparison period {} omitted",
                selection.start(),
                column,
                window.map(|w| w.key()).unwrap_or_else(|| "n/a".to_string())
            );
            None
        }
    };
    debug!(
        "Period {} matched {} row(s); comparison matched {:?}",
        selection,
        current.len(),
        previous.as_ref().map(PeriodSubset::len)
    );
    Ok(PeriodSelection { current, previous })
}

/// Restricts rows to (or away from) a set of values in one column.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CategoryFilter {
    pub column: String,
    pub values: Vec<String>,
    #[serde(default)]
    pub negate: bool,
}

impl CategoryFilter {
    fn accepts(&self, value: Option<&Value>) -> bool {
        let hit = value.is_some_and(|v| {
            let display = v.as_display();
            self.values.iter().any(|candidate| candidate == &display)
        });
        hit != self.negate
    }
}

impl fmt::Display for CategoryFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = if self.negate { "!=" } else { "=" };
        write!(f, "{}{}{}", self.column, op, self.values.join("|"))
    }
}

pub fn parse_filters(filters: &[String]) -> Result<Vec<CategoryFilter>> {
    filters.iter().map(|f| parse_filter(f)).collect()
}

fn parse_filter(filter: &str) -> Result<CategoryFilter> {
    let trimmed = filter.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("Empty filter expression"));
    }
    for (needle, negate) in [("!=", true), ("=", false)] {
        if let Some(idx) = trimmed.find(needle) {
            let column = trimmed[..idx].trim();
            if column.is_empty() {
                return Err(anyhow!("Filter '{trimmed}' is missing a column name"));
            }
            let values = trimmed[idx + needle.len()..]
                .split('|')
                .map(|v| unquote(v.trim()).to_string())
                .filter(|v| !v.is_empty())
                .collect::<Vec<_>>();
            if values.is_empty() {
                return Err(anyhow!("Filter '{trimmed}' does not list any values"));
            }
            return Ok(CategoryFilter {
                column: column.to_string(),
                values,
                negate,
            });
        }
    }
    Err(anyhow!(
        "Failed to parse filter expression '{trimmed}' (expected column=value[|value...])"
    ))
}

fn unquote(value: &str) -> &str {
    if value.len() >= 2 {
        let bytes = value.as_bytes();
        if (bytes[0] == b'"' && bytes[value.len() - 1] == b'"')
            || (bytes[0] == b'\'' && bytes[value.len() - 1] == b'\'')
        {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Applies every filter in turn; all must accept a row for it to be kept.
pub fn apply_category_filters(
    dataset: &Dataset,
    filters: &[CategoryFilter],
) -> Result<Dataset, ReportError> {
    let indexed = filters
        .iter()
        .map(|filter| {
            dataset
                .column_index(&filter.column)
                .map(|idx| (idx, filter))
                .ok_or_else(|| {
                    ReportError::invalid_column(&filter.column, "filter column not found in dataset")
                })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(dataset.retain_rows(|row| {
        indexed
            .iter()
            .all(|(idx, filter)| filter.accepts(row.get(*idx).and_then(|c| c.as_ref())))
    }))
}
