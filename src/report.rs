use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
    data::Value,
    dataset::{Dataset, Row},
    error::ReportError,
    filter::{self, CategoryFilter, DateSelection, PeriodSubset},
    insight::{self, Insight, InsightConfig, SubsetInput},
    schema::{self, ClassifierOptions, ColumnProfiles},
    stats::{self, MetricsSummary},
    summarize::{self, Summarizer},
};

/// Everything the caller chooses for one report run.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRequest {
    pub selection: DateSelection,
    /// Date column to filter on; the classifier's best guess when `None`.
    pub date_column: Option<String>,
    pub filters: Vec<CategoryFilter>,
    /// Numeric columns to summarize; every numeric column when empty.
    pub columns: Vec<String>,
    pub classifier: ClassifierOptions,
    pub insights: InsightConfig,
}

impl ReportRequest {
    pub fn new(selection: DateSelection) -> Self {
        Self {
            selection,
            date_column: None,
            filters: Vec::new(),
            columns: Vec::new(),
            classifier: ClassifierOptions::default(),
            insights: InsightConfig::default(),
        }
    }
}

/// Embedded copy of the rows that made up the selected period.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FilteredData {
    pub headers: Vec<String>,
    pub rows: Vec<Row>,
}

impl FilteredData {
    pub fn from_subset(dataset: &Dataset, subset: &PeriodSubset) -> Self {
        let selected = subset.materialize(dataset);
        Self {
            headers: selected.headers().to_vec(),
            rows: selected.rows().to_vec(),
        }
    }

    /// Rows rendered as display text, missing cells as empty strings.
    pub fn display_rows(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|cell| cell.as_ref().map(Value::as_display).unwrap_or_default())
                    .collect()
            })
            .collect()
    }

    /// Hex SHA-256 over headers and typed cells.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for header in &self.headers {
            hasher.update(header.as_bytes());
            hasher.update([0x1f]);
        }
        hasher.update([0x1e]);
        for row in &self.rows {
            for cell in row {
                let tag: &[u8] = match cell {
                    None => b"-",
                    Some(Value::String(_)) => b"s",
                    Some(Value::Integer(_)) => b"i",
                    Some(Value::Float(_)) => b"f",
                    Some(Value::Boolean(_)) => b"b",
                    Some(Value::Date(_)) => b"d",
                    Some(Value::DateTime(_)) => b"t",
                };
                hasher.update(tag);
                if let Some(Value::Float(f)) = cell {
                    hasher.update(f.to_bits().to_le_bytes());
                } else if let Some(value) = cell {
                    hasher.update(value.as_display().as_bytes());
                }
                hasher.update([0x1f]);
            }
            hasher.update([0x1e]);
        }
        format!("{:x}", hasher.finalize())
    }
}

/// The persisted unit: one selection's data, metrics, insights and narrative.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Report {
    pub key: String,
    pub selection: DateSelection,
    pub source: String,
    pub date_column: String,
    pub created_at: DateTime<Utc>,
    pub filters: Vec<CategoryFilter>,
    pub profiles: ColumnProfiles,
    pub data: FilteredData,
    pub data_digest: String,
    pub metrics: MetricsSummary,
    pub insights: Vec<Insight>,
    pub summary: String,
}

impl Report {
    pub fn verify_integrity(&self) -> Result<(), ReportError> {
        let computed = self.data.digest();
        if computed != self.data_digest {
            return Err(ReportError::IntegrityMismatch {
                key: self.key.clone(),
                stored: self.data_digest.clone(),
                computed,
            });
        }
        Ok(())
    }
}

pub struct ReportParts {
    pub selection: DateSelection,
    pub source: String,
    pub date_column: String,
    pub filters: Vec<CategoryFilter>,
    pub profiles: ColumnProfiles,
    pub data: FilteredData,
    pub metrics: MetricsSummary,
    pub insights: Vec<Insight>,
    pub summary: String,
}

pub fn assemble_report(parts: ReportParts, created_at: DateTime<Utc>) -> Report {
    let data_digest = parts.data.digest();
    Report {
        key: parts.selection.key(),
        selection: parts.selection,
        source: parts.source,
        date_column: parts.date_column,
        created_at,
        filters: parts.filters,
        profiles: parts.profiles,
        data: parts.data,
        data_digest,
        metrics: parts.metrics,
        insights: parts.insights,
        summary: parts.summary,
    }
}

/// Runs classification, filtering, metrics, insights and summarization.
pub fn generate_report(
    dataset: &Dataset,
    request: &ReportRequest,
    summarizer: Option<&dyn Summarizer>,
) -> Result<Report, ReportError> {
    let profiles = schema::classify_columns(dataset, &request.classifier);
    let date_column = match &request.date_column {
        Some(column) => column.clone(),
        None => profiles
            .default_date_column()
            .map(|p| p.name.clone())
            .ok_or_else(|| ReportError::invalid_column("<auto>", "dataset has no date column"))?,
    };

    let filtered = filter::apply_category_filters(dataset, &request.filters)?;
    let periods = filter::select_periods(&filtered, &profiles, &date_column, &request.selection)?;
    let metrics = stats::compute_metrics(&filtered, &profiles, &periods, &request.columns)?;

    let metric_columns: Vec<String> = metrics.records.iter().map(|r| r.column.clone()).collect();
    let histories = insight::build_history(
        &filtered,
        &profiles,
        &date_column,
        &request.selection,
        &metric_columns,
        request.insights.history_periods,
    )?;
    let mut insights =
        insight::generate_insights(&metrics, &request.selection, &histories, &request.insights);
    let categorical_columns = profiles.categorical_columns();
    insights.extend(insight::generate_subset_insights(
        &SubsetInput {
            dataset: &filtered,
            rows: &periods.current.rows,
            metric_columns: &metric_columns,
            categorical_columns: &categorical_columns,
            config: &request.insights,
        },
        &request.selection,
    ));
    let summary = summarize::summarize_or_fallback(summarizer, &metrics, &insights);

    info!(
        "Report {} for '{}': {} row(s), {} metric(s), {} insight(s)",
        request.selection,
        dataset.name(),
        periods.current.len(),
        metrics.records.len(),
        insights.len()
    );

    Ok(assemble_report(
        ReportParts {
            selection: request.selection,
            source: dataset.name().to_string(),
            date_column,
            filters: request.filters.clone(),
            profiles,
            data: FilteredData::from_subset(&filtered, &periods.current),
            metrics,
            insights,
            summary,
        },
        Utc::now(),
    ))
}
