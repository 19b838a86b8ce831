use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    dataset::Dataset,
    error::ReportError,
    filter::{PeriodSelection, PeriodSubset},
    schema::{ColumnKind, ColumnProfiles},
};

/// Descriptive statistics over the non-missing values of one column.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SummaryStats {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    /// Absent when the total does not fit in an `f64`.
    pub sum: Option<f64>,
    /// Sample (n-1) standard deviation; absent below two values.
    pub std_dev: Option<f64>,
}

/// Current and comparison aggregates for one numeric column.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricRecord {
    pub column: String,
    pub current: Option<SummaryStats>,
    pub previous: Option<SummaryStats>,
    /// Percent change of the mean, e.g. `-60.0` for a 60 % drop.
    pub delta_pct: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MetricsSummary {
    pub current_rows: usize,
    pub previous_rows: Option<usize>,
    pub records: Vec<MetricRecord>,
}

impl MetricsSummary {
    pub fn record(&self, column: &str) -> Option<&MetricRecord> {
        self.records.iter().find(|r| r.column == column)
    }
}

#[derive(Default)]
struct ColumnStats {
    values: Vec<f64>,
    sum: f64,
    min: Option<f64>,
    max: Option<f64>,
}

impl ColumnStats {
    fn add_value(&mut self, numeric: f64) {
        self.sum += numeric;
        self.min = Some(self.min.map_or(numeric, |current| current.min(numeric)));
        self.max = Some(self.max.map_or(numeric, |current| current.max(numeric)));
        self.values.push(numeric);
    }

    fn count(&self) -> usize {
        self.values.len()
    }

    fn mean(&self) -> Option<f64> {
        let mean = if self.sum.is_finite() {
            self.sum / self.count() as f64
        } else {
            running_mean(&self.values)?
        };
        Some(mean.clamp(self.min?, self.max?))
    }

    fn median(&self) -> Option<f64> {
        if self.values.is_empty() {
            return None;
        }
        let mut sorted = self.values.clone();
        sorted.sort_by(f64::total_cmp);
        let mid = sorted.len() / 2;
        if sorted.len().is_multiple_of(2) {
            Some(sorted[mid - 1] / 2.0 + sorted[mid] / 2.0)
        } else {
            Some(sorted[mid])
        }
    }

    fn std_dev(&self) -> Option<f64> {
        sample_std_dev(&self.values)
    }

    fn finish(&self) -> Option<SummaryStats> {
        Some(SummaryStats {
            count: self.count(),
            mean: self.mean()?,
            median: self.median()?,
            min: self.min?,
            max: self.max?,
            sum: Some(self.sum).filter(|sum| sum.is_finite()),
            std_dev: self.std_dev(),
        })
    }
}

/// Arithmetic mean, absent for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let sum = values.iter().sum::<f64>();
    if sum.is_finite() {
        Some(sum / values.len() as f64)
    } else {
        running_mean(values)
    }
}

/// Mean updated one value at a time so that no intermediate exceeds the inputs' range.
fn running_mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mean = values
        .iter()
        .enumerate()
        .fold(0.0, |mean, (idx, value)| {
            let n = (idx + 1) as f64;
            mean + (value / n - mean / n)
        });
    Some(mean).filter(|m| m.is_finite())
}

/// Sample (n-1) standard deviation, absent below two values.
pub fn sample_std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let mean = mean(values)?;
    let squares = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>();
    Some((squares / (values.len() as f64 - 1.0)).max(0.0).sqrt()).filter(|sd| sd.is_finite())
}

/// Percent change from `previous` to `current`; absent when `previous` is zero
/// or the change is not representable.
pub fn percent_change(current: f64, previous: f64) -> Option<f64> {
    if previous == 0.0 || !previous.is_finite() || !current.is_finite() {
        return None;
    }
    Some((current - previous) / previous.abs() * 100.0).filter(|pct| pct.is_finite())
}

/// Summarizes one column over the rows of a subset.
pub fn summarize_column(dataset: &Dataset, column_index: usize, rows: &[usize]) -> Option<SummaryStats> {
    let mut stats = ColumnStats::default();
    for &row in rows {
        if let Some(numeric) = dataset
            .rows()
            .get(row)
            .and_then(|cells| cells.get(column_index))
            .and_then(|cell| cell.as_ref())
            .and_then(|value| value.as_f64())
        {
            stats.add_value(numeric);
        }
    }
    stats.finish()
}

/// Resolves the columns to summarize; an empty request means every numeric column.
pub fn resolve_numeric_columns(
    profiles: &ColumnProfiles,
    requested: &[String],
) -> Result<Vec<String>, ReportError> {
    if requested.is_empty() {
        return Ok(profiles.numeric_columns());
    }
    requested
        .iter()
        .map(|name| {
            profiles
                .require(name, ColumnKind::Numeric)
                .map(|profile| profile.name.clone())
        })
        .collect()
}

pub fn compute_metrics(
    dataset: &Dataset,
    profiles: &ColumnProfiles,
    periods: &PeriodSelection,
    columns: &[String],
) -> Result<MetricsSummary, ReportError> {
    let columns = resolve_numeric_columns(profiles, columns)?;
    let previous_rows = periods.previous.as_ref().map(PeriodSubset::len);
    if periods.current.is_empty() {
        debug!("Current period {} is empty; no metrics computed", periods.current.selection);
        return Ok(MetricsSummary {
            current_rows: 0,
            previous_rows,
            records: Vec::new(),
        });
    }

    let mut records = Vec::with_capacity(columns.len());
    for column in columns {
        let index = dataset
            .column_index(&column)
            .ok_or_else(|| ReportError::invalid_column(&column, "column not found in dataset"))?;
        let current = summarize_column(dataset, index, &periods.current.rows);
        let previous = periods
            .previous
            .as_ref()
            .and_then(|subset| summarize_column(dataset, index, &subset.rows));
        let delta_pct = match (&current, &previous) {
            (Some(cur), Some(prev)) => percent_change(cur.mean, prev.mean),
            _ => None,
        };
        records.push(MetricRecord {
            column,
            current,
            previous,
            delta_pct,
        });
    }
    debug!("Computed metrics for {} column(s)", records.len());
    Ok(MetricsSummary {
        current_rows: periods.current.len(),
        previous_rows,
        records,
    })
}
