//! Rule-based insight detection.
//!
//! Each numeric column is run through a fixed table of rules (variation, trend,
//! anomaly). A rule that fires produces a [`Finding`], which is rendered into a
//! sentence by looking up the template registered for its kind and direction.
//! Adding a phrasing only touches [`TEMPLATES`]; adding a rule only touches
//! [`RULES`].
//!
//! A second table, [`SUBSET_RULES`], looks at the rows of the selected period
//! as a whole: pairs of columns that move together and categories that hold
//! most of a column's total.
//!
//! Rules stay silent when their inputs are missing. A column without a
//! comparison period or with too little history produces no insight at all,
//! never a "stable" one.

use std::{collections::BTreeMap, fmt};

use heck::ToTitleCase;
use itertools::Itertools;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    dataset::Dataset,
    error::ReportError,
    filter::{DateSelection, earliest_date, filter_by_date},
    schema::ColumnProfiles,
    stats::{self, MetricRecord, MetricsSummary},
};

/// Detection thresholds. Percentages are in percent units (10.0 = 10 %).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct InsightConfig {
    /// Minimum absolute change of the mean that counts as a notable variation.
    pub variation_pct: f64,
    /// Minimum absolute z-score of the current mean against history.
    pub anomaly_z: f64,
    /// Number of trailing points (history plus current) that must move one way.
    pub trend_window: usize,
    /// Minimum overall change across the trend window.
    pub trend_min_change_pct: f64,
    /// Minimum number of historical points before an anomaly can be scored.
    pub min_history: usize,
    /// How many preceding periods to collect as history, at most [`MAX_HISTORY_PERIODS`].
    pub history_periods: usize,
    /// Absolute Pearson correlation two columns must exceed, between 0 and 1.
    pub correlation_threshold: f64,
    /// Share of a column total, in percent, its largest category must exceed.
    pub contribution_min_pct: f64,
}

/// Upper bound on `history_periods`: one year of daily windows.
pub const MAX_HISTORY_PERIODS: usize = 366;

const MIN_CORRELATION_PAIRS: usize = 3;
const CONTRIBUTION_CATEGORICAL_COLUMNS: usize = 2;
const CONTRIBUTION_METRIC_COLUMNS: usize = 3;

impl Default for InsightConfig {
    fn default() -> Self {
        Self {
            variation_pct: 10.0,
            anomaly_z: 2.0,
            trend_window: 3,
            trend_min_change_pct: 5.0,
            min_history: 3,
            history_periods: 7,
            correlation_threshold: 0.7,
            contribution_min_pct: 50.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum InsightKind {
    Trend,
    Anomaly,
    Variation,
    Correlation,
    Contribution,
}

impl InsightKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InsightKind::Trend => "trend",
            InsightKind::Anomaly => "anomaly",
            InsightKind::Variation => "variation",
            InsightKind::Correlation => "correlation",
            InsightKind::Contribution => "contribution",
        }
    }
}

impl fmt::Display for InsightKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Increase,
    Decrease,
}

impl Direction {
    fn of(value: f64) -> Self {
        if value < 0.0 {
            Direction::Decrease
        } else {
            Direction::Increase
        }
    }
}

/// How far past its threshold a finding landed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Notable,
    Significant,
    Critical,
}

impl Severity {
    /// Grades a value that can never exceed `ceiling` by how much of the room
    /// between `threshold` and `ceiling` it covers.
    fn within(value: f64, threshold: f64, ceiling: f64) -> Self {
        let room = ceiling - threshold;
        if room <= 0.0 {
            return Severity::Notable;
        }
        Self::from_ratio(1.0 + 3.0 * (value - threshold) / room)
    }

    fn from_ratio(ratio: f64) -> Self {
        if ratio >= 3.0 {
            Severity::Critical
        } else if ratio >= 2.0 {
            Severity::Significant
        } else {
            Severity::Notable
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Insight {
    pub kind: InsightKind,
    pub direction: Direction,
    pub severity: Severity,
    pub column: String,
    /// Key of the period the finding refers to.
    pub period: String,
    /// Percent change for variations and trends, z-score for anomalies,
    /// Pearson coefficient for correlations, percent share for contributions.
    pub magnitude: f64,
    /// Second column of a correlation, grouping column of a contribution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related: Option<String>,
    pub sentence: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryPoint {
    pub period: DateSelection,
    /// How many periods back from the selection this window lies (1 = adjacent).
    pub lag: u64,
    pub mean: f64,
}

/// Per-period means of one column preceding the selected period, oldest first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnHistory {
    pub column: String,
    pub points: Vec<HistoryPoint>,
}

impl ColumnHistory {
    fn means(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.mean).collect()
    }

    /// Means of the unbroken run of windows directly before the selection, oldest first.
    fn contiguous_means(&self) -> Vec<f64> {
        let mut means = self
            .points
            .iter()
            .rev()
            .zip(1u64..)
            .take_while(|(point, lag)| point.lag == *lag)
            .map(|(point, _)| point.mean)
            .collect::<Vec<_>>();
        means.reverse();
        means
    }
}

/// Collects up to `periods` equal-length windows before `selection`.
///
/// Windows without any value for a column are skipped for that column. The walk
/// back stops at the first window ending before the earliest date in the
/// dataset, so it never runs past the data whatever `periods` is.
pub fn build_history(
    dataset: &Dataset,
    profiles: &ColumnProfiles,
    date_column: &str,
    selection: &DateSelection,
    columns: &[String],
    periods: usize,
) -> Result<Vec<ColumnHistory>, ReportError> {
    let indices = columns
        .iter()
        .map(|column| {
            dataset
                .column_index(column)
                .ok_or_else(|| ReportError::invalid_column(column, "column not found in dataset"))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let mut histories: Vec<ColumnHistory> = columns
        .iter()
        .map(|column| ColumnHistory {
            column: column.clone(),
            points: Vec::new(),
        })
        .collect();
    let Some(earliest) = earliest_date(dataset, date_column) else {
        return Ok(histories);
    };

    for lag in 1..=periods as u64 {
        let Some(window) = selection.shifted_back(lag) else {
            break;
        };
        if window.end() < earliest {
            break;
        }
        let subset = filter_by_date(dataset, profiles, date_column, &window)?;
        for (history, &index) in histories.iter_mut().zip(indices.iter()) {
            if let Some(summary) = stats::summarize_column(dataset, index, &subset.rows) {
                history.points.push(HistoryPoint {
                    period: window,
                    lag,
                    mean: summary.mean,
                });
            }
        }
    }
    for history in &mut histories {
        history.points.reverse();
    }
    Ok(histories)
}

/// Values a rule fills into its sentence template.
#[derive(Debug, Clone, PartialEq)]
pub struct Finding {
    pub direction: Direction,
    pub magnitude: f64,
    pub severity: Severity,
    pub magnitude_text: String,
    pub window: usize,
}

pub struct RuleInput<'a> {
    pub record: &'a MetricRecord,
    pub history: Option<&'a ColumnHistory>,
    pub config: &'a InsightConfig,
}

pub struct Rule {
    pub kind: InsightKind,
    pub detect: fn(&RuleInput<'_>) -> Option<Finding>,
}

pub const RULES: &[Rule] = &[
    Rule {
        kind: InsightKind::Variation,
        detect: detect_variation,
    },
    Rule {
        kind: InsightKind::Trend,
        detect: detect_trend,
    },
    Rule {
        kind: InsightKind::Anomaly,
        detect: detect_anomaly,
    },
];

pub struct Template {
    pub kind: InsightKind,
    pub direction: Direction,
    pub text: &'static str,
}

pub const TEMPLATES: &[Template] = &[
    Template {
        kind: InsightKind::Variation,
        direction: Direction::Increase,
        text: "{column} increased by {magnitude} in {period} compared with {previous}.",
    },
    Template {
        kind: InsightKind::Variation,
        direction: Direction::Decrease,
        text: "{column} decreased by {magnitude} in {period} compared with {previous}.",
    },
    Template {
        kind: InsightKind::Trend,
        direction: Direction::Increase,
        text: "{column} has risen for {window} consecutive periods, up {magnitude} overall through {period}.",
    },
    Template {
        kind: InsightKind::Trend,
        direction: Direction::Decrease,
        text: "{column} has fallen for {window} consecutive periods, down {magnitude} overall through {period}.",
    },
    Template {
        kind: InsightKind::Anomaly,
        direction: Direction::Increase,
        text: "{column} is unusually high in {period}, {magnitude} above its recent average.",
    },
    Template {
        kind: InsightKind::Anomaly,
        direction: Direction::Decrease,
        text: "{column} is unusually low in {period}, {magnitude} below its recent average.",
    },
    Template {
        kind: InsightKind::Correlation,
        direction: Direction::Increase,
        text: "{column} and {related} move together in {period} (correlation {magnitude}).",
    },
    Template {
        kind: InsightKind::Correlation,
        direction: Direction::Decrease,
        text: "{column} and {related} move in opposite directions in {period} (correlation {magnitude}).",
    },
    Template {
        kind: InsightKind::Contribution,
        direction: Direction::Increase,
        text: "{category} accounts for {magnitude} of total {column} in {period}, grouped by {related}.",
    },
];

/// Rows of the selected period, seen across columns.
pub struct SubsetInput<'a> {
    pub dataset: &'a Dataset,
    pub rows: &'a [usize],
    /// Numeric columns that received metrics, in dataset order.
    pub metric_columns: &'a [String],
    pub categorical_columns: &'a [String],
    pub config: &'a InsightConfig,
}

impl SubsetInput<'_> {
    fn numbers(&self, column: &str) -> Option<Vec<Option<f64>>> {
        let index = self.dataset.column_index(column)?;
        Some(
            self.rows
                .iter()
                .map(|&row| {
                    self.dataset
                        .rows()
                        .get(row)
                        .and_then(|cells| cells.get(index))
                        .and_then(|cell| cell.as_ref())
                        .and_then(|value| value.as_f64())
                })
                .collect(),
        )
    }

    fn labels(&self, column: &str) -> Option<Vec<Option<String>>> {
        let index = self.dataset.column_index(column)?;
        Some(
            self.rows
                .iter()
                .map(|&row| {
                    self.dataset
                        .rows()
                        .get(row)
                        .and_then(|cells| cells.get(index))
                        .and_then(|cell| cell.as_ref())
                        .map(|value| value.as_display())
                })
                .collect(),
        )
    }
}

/// A subset rule's result, tied to the columns it was found on.
#[derive(Debug, Clone, PartialEq)]
pub struct SubsetFinding {
    pub column: String,
    pub related: String,
    pub category: Option<String>,
    pub direction: Direction,
    pub magnitude: f64,
    pub severity: Severity,
    pub magnitude_text: String,
}

pub struct SubsetRule {
    pub kind: InsightKind,
    pub detect: fn(&SubsetInput<'_>) -> Vec<SubsetFinding>,
}

pub const SUBSET_RULES: &[SubsetRule] = &[
    SubsetRule {
        kind: InsightKind::Correlation,
        detect: detect_correlations,
    },
    SubsetRule {
        kind: InsightKind::Contribution,
        detect: detect_contributions,
    },
];

/// Pearson coefficient over the pairs where both values are present.
pub fn pearson(pairs: &[(f64, f64)]) -> Option<f64> {
    if pairs.len() < 2 {
        return None;
    }
    let xs = pairs.iter().map(|(x, _)| *x).collect::<Vec<_>>();
    let ys = pairs.iter().map(|(_, y)| *y).collect::<Vec<_>>();
    if xs.iter().all_equal() || ys.iter().all_equal() {
        return None;
    }
    let mean_x = stats::mean(&xs)?;
    let mean_y = stats::mean(&ys)?;
    let (mut covariance, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (x, y) in pairs {
        let dx = x - mean_x;
        let dy = y - mean_y;
        covariance += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    if var_x <= 0.0 || var_y <= 0.0 {
        return None;
    }
    let r = covariance / (var_x.sqrt() * var_y.sqrt());
    r.is_finite().then(|| r.clamp(-1.0, 1.0))
}

fn detect_correlations(input: &SubsetInput<'_>) -> Vec<SubsetFinding> {
    let threshold = input.config.correlation_threshold;
    let series = input
        .metric_columns
        .iter()
        .filter_map(|column| Some((column, input.numbers(column)?)))
        .collect::<Vec<_>>();
    let mut findings = Vec::new();
    for ((left, xs), (right, ys)) in series.iter().tuple_combinations() {
        let pairs = xs
            .iter()
            .zip(ys.iter())
            .filter_map(|(x, y)| Some(((*x)?, (*y)?)))
            .collect::<Vec<_>>();
        if pairs.len() < MIN_CORRELATION_PAIRS {
            continue;
        }
        let Some(r) = pearson(&pairs) else {
            continue;
        };
        if r.abs() <= threshold {
            continue;
        }
        findings.push(SubsetFinding {
            column: (*left).clone(),
            related: (*right).clone(),
            category: None,
            direction: Direction::of(r),
            magnitude: r,
            severity: Severity::within(r.abs(), threshold, 1.0),
            magnitude_text: format!("{r:.2}"),
        });
    }
    findings
}

fn detect_contributions(input: &SubsetInput<'_>) -> Vec<SubsetFinding> {
    let threshold = input.config.contribution_min_pct;
    let mut findings = Vec::new();
    for group_column in input
        .categorical_columns
        .iter()
        .take(CONTRIBUTION_CATEGORICAL_COLUMNS)
    {
        let Some(labels) = input.labels(group_column) else {
            continue;
        };
        for column in input.metric_columns.iter().take(CONTRIBUTION_METRIC_COLUMNS) {
            let Some(values) = input.numbers(column) else {
                continue;
            };
            let mut totals: BTreeMap<&str, f64> = BTreeMap::new();
            for (label, value) in labels.iter().zip(values.iter()) {
                if let (Some(label), Some(value)) = (label, value) {
                    *totals.entry(label.as_str()).or_insert(0.0) += value;
                }
            }
            if totals.len() < 2 || totals.values().any(|total| *total < 0.0) {
                continue;
            }
            let total = totals.values().sum::<f64>();
            if !total.is_finite() || total <= 0.0 {
                continue;
            }
            let Some((top, top_total)) = totals
                .iter()
                .max_by(|a, b| a.1.total_cmp(b.1).then_with(|| b.0.cmp(a.0)))
            else {
                continue;
            };
            let share = top_total / total * 100.0;
            if share <= threshold {
                continue;
            }
            findings.push(SubsetFinding {
                column: column.clone(),
                related: group_column.clone(),
                category: Some((*top).to_string()),
                direction: Direction::Increase,
                magnitude: share,
                severity: Severity::within(share, threshold, 100.0),
                magnitude_text: format_percent(share),
            });
        }
    }
    findings
}

fn detect_variation(input: &RuleInput<'_>) -> Option<Finding> {
    let delta = input.record.delta_pct?;
    let threshold = input.config.variation_pct;
    if delta.abs() < threshold {
        return None;
    }
    Some(Finding {
        direction: Direction::of(delta),
        magnitude: delta,
        severity: severity_for(delta, threshold),
        magnitude_text: format_percent(delta),
        window: 2,
    })
}

fn detect_trend(input: &RuleInput<'_>) -> Option<Finding> {
    let window = input.config.trend_window;
    if window < 2 {
        return None;
    }
    let current = input.record.current.as_ref()?.mean;
    let mut series = input.history?.contiguous_means();
    series.push(current);
    if series.len() < window {
        return None;
    }
    let tail = &series[series.len() - window..];
    let rising = tail.iter().tuple_windows().all(|(a, b)| b > a);
    let falling = tail.iter().tuple_windows().all(|(a, b)| b < a);
    if !rising && !falling {
        return None;
    }
    let change = stats::percent_change(tail[window - 1], tail[0])?;
    let threshold = input.config.trend_min_change_pct;
    if change.abs() < threshold {
        return None;
    }
    Some(Finding {
        direction: Direction::of(change),
        magnitude: change,
        severity: severity_for(change, threshold),
        magnitude_text: format_percent(change),
        window,
    })
}

fn detect_anomaly(input: &RuleInput<'_>) -> Option<Finding> {
    let current = input.record.current.as_ref()?.mean;
    let means = input.history?.means();
    if means.len() < input.config.min_history.max(2) {
        return None;
    }
    let baseline = stats::mean(&means)?;
    let spread = stats::sample_std_dev(&means)?;
    if spread <= f64::EPSILON * baseline.abs().max(1.0) {
        return None;
    }
    let z = Some((current - baseline) / spread).filter(|z| z.is_finite())?;
    let threshold = input.config.anomaly_z;
    if z.abs() < threshold {
        return None;
    }
    Some(Finding {
        direction: Direction::of(z),
        magnitude: z,
        severity: severity_for(z, threshold),
        magnitude_text: format!("{:.1} standard deviations", z.abs()),
        window: means.len(),
    })
}

fn severity_for(magnitude: f64, threshold: f64) -> Severity {
    if threshold <= 0.0 {
        return Severity::Notable;
    }
    Severity::from_ratio(magnitude.abs() / threshold)
}

fn format_percent(value: f64) -> String {
    format!("{:.1}%", value.abs())
}

/// Title-cases snake/kebab/lowercase names; names that already carry capitals are kept.
pub fn display_name(column: &str) -> String {
    if column.chars().any(|c| c.is_uppercase()) {
        column.to_string()
    } else {
        column.to_title_case()
    }
}

pub fn render_template(template: &str, vars: &[(&str, String)]) -> String {
    vars.iter().fold(template.to_string(), |text, (key, value)| {
        text.replace(&format!("{{{key}}}"), value)
    })
}

fn template_for(kind: InsightKind, direction: Direction) -> Option<&'static Template> {
    TEMPLATES
        .iter()
        .find(|t| t.kind == kind && t.direction == direction)
}

/// Runs every rule over every metric record.
pub fn generate_insights(
    metrics: &MetricsSummary,
    selection: &DateSelection,
    histories: &[ColumnHistory],
    config: &InsightConfig,
) -> Vec<Insight> {
    let period_label = selection.label();
    let previous_label = selection
        .previous()
        .map(|p| p.label())
        .unwrap_or_else(|| "the previous period".to_string());
    let mut insights = Vec::new();
    for record in &metrics.records {
        let input = RuleInput {
            record,
            history: histories.iter().find(|h| h.column == record.column),
            config,
        };
        for rule in RULES {
            let Some(finding) = (rule.detect)(&input) else {
                continue;
            };
            let Some(template) = template_for(rule.kind, finding.direction) else {
                debug!(
                    "No template registered for {} {:?}; finding dropped",
                    rule.kind, finding.direction
                );
                continue;
            };
            let vars = [
                ("column", display_name(&record.column)),
                ("magnitude", finding.magnitude_text.clone()),
                ("period", period_label.clone()),
                ("previous", previous_label.clone()),
                ("window", finding.window.to_string()),
            ];
            insights.push(Insight {
                kind: rule.kind,
                direction: finding.direction,
                severity: finding.severity,
                column: record.column.clone(),
                period: selection.key(),
                magnitude: finding.magnitude,
                related: None,
                sentence: render_template(template.text, &vars),
            });
        }
    }
    debug!("Generated {} insight(s) for {}", insights.len(), selection);
    insights
}

/// Runs every subset rule over the rows of the selected period.
pub fn generate_subset_insights(
    input: &SubsetInput<'_>,
    selection: &DateSelection,
) -> Vec<Insight> {
    let period_label = selection.label();
    let mut insights = Vec::new();
    for rule in SUBSET_RULES {
        for finding in (rule.detect)(input) {
            let Some(template) = template_for(rule.kind, finding.direction) else {
                debug!(
                    "No template registered for {} {:?}; finding dropped",
                    rule.kind, finding.direction
                );
                continue;
            };
            let vars = [
                ("column", display_name(&finding.column)),
                ("related", display_name(&finding.related)),
                ("category", finding.category.clone().unwrap_or_default()),
                ("magnitude", finding.magnitude_text.clone()),
                ("period", period_label.clone()),
            ];
            insights.push(Insight {
                kind: rule.kind,
                direction: finding.direction,
                severity: finding.severity,
                column: finding.column,
                period: selection.key(),
                magnitude: finding.magnitude,
                related: Some(finding.related),
                sentence: render_template(template.text, &vars),
            });
        }
    }
    debug!("Generated {} subset insight(s) for {}", insights.len(), selection);
    insights
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::SummaryStats;
    use chrono::NaiveDate;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn stats_with_mean(mean: f64) -> SummaryStats {
        SummaryStats {
            count: 1,
            mean,
            median: mean,
            min: mean,
            max: mean,
            sum: Some(mean),
            std_dev: None,
        }
    }

    fn record(current: Option<f64>, previous: Option<f64>) -> MetricRecord {
        let delta_pct = match (current, previous) {
            (Some(c), Some(p)) => stats::percent_change(c, p),
            _ => None,
        };
        MetricRecord {
            column: "output".to_string(),
            current: current.map(stats_with_mean),
            previous: previous.map(stats_with_mean),
            delta_pct,
        }
    }

    fn history(means: &[f64]) -> ColumnHistory {
        let lags = (1..=means.len() as u64).rev().collect::<Vec<_>>();
        history_at(means, &lags)
    }

    /// Points oldest first, each with its distance from the selection.
    fn history_at(means: &[f64], lags: &[u64]) -> ColumnHistory {
        ColumnHistory {
            column: "output".to_string(),
            points: means
                .iter()
                .zip(lags)
                .enumerate()
                .map(|(i, (mean, lag))| HistoryPoint {
                    period: DateSelection::Single(day(i as u32 + 1)),
                    lag: *lag,
                    mean: *mean,
                })
                .collect(),
        }
    }

    fn subset_dataset(rows: &[(&str, &str, &str, &str)]) -> Dataset {
        let rows = rows
            .iter()
            .map(|(date, company, output, scrap)| {
                vec![date.to_string(), company.to_string(), output.to_string(), scrap.to_string()]
            })
            .collect();
        Dataset::from_text_rows(
            "subset",
            vec!["fecha".into(), "empresa".into(), "output".into(), "scrap".into()],
            rows,
        )
        .unwrap()
    }

    fn subset_insights(dataset: &Dataset, config: &InsightConfig) -> Vec<Insight> {
        let rows = (0..dataset.row_count()).collect::<Vec<_>>();
        let input = SubsetInput {
            dataset,
            rows: &rows,
            metric_columns: &["output".to_string(), "scrap".to_string()],
            categorical_columns: &["empresa".to_string()],
            config,
        };
        generate_subset_insights(&input, &DateSelection::range(day(1), day(4)).unwrap())
    }

    fn summary(records: Vec<MetricRecord>) -> MetricsSummary {
        MetricsSummary {
            current_rows: 1,
            previous_rows: Some(1),
            records,
        }
    }

    #[test]
    fn variation_rule_flags_large_drop() {
        let metrics = summary(vec![record(Some(40.0), Some(100.0))]);
        let insights = generate_insights(
            &metrics,
            &DateSelection::Single(day(8)),
            &[],
            &InsightConfig::default(),
        );
        assert_eq!(insights.len(), 1);
        let insight = &insights[0];
        assert_eq!(insight.kind, InsightKind::Variation);
        assert_eq!(insight.direction, Direction::Decrease);
        assert_eq!(insight.severity, Severity::Critical);
        assert_eq!(insight.period, "2024-01-08");
        assert_eq!(
            insight.sentence,
            "Output decreased by 60.0% in 2024-01-08 compared with 2024-01-07."
        );
    }

    #[test]
    fn small_variation_is_ignored() {
        let metrics = summary(vec![record(Some(105.0), Some(100.0))]);
        let insights = generate_insights(
            &metrics,
            &DateSelection::Single(day(8)),
            &[],
            &InsightConfig::default(),
        );
        assert!(insights.is_empty());
    }

    #[test]
    fn no_comparison_and_no_history_means_no_insights() {
        let metrics = summary(vec![record(Some(40.0), None)]);
        let insights = generate_insights(
            &metrics,
            &DateSelection::Single(day(1)),
            &[history(&[])],
            &InsightConfig::default(),
        );
        assert!(insights.is_empty());
    }

    #[test]
    fn trend_rule_requires_monotonic_window() {
        let config = InsightConfig::default();
        let rec = record(Some(130.0), None);
        let rising = RuleInput {
            record: &rec,
            history: Some(&history(&[90.0, 100.0, 115.0])),
            config: &config,
        };
        let finding = detect_trend(&rising).unwrap();
        assert_eq!(finding.direction, Direction::Increase);
        assert!((finding.magnitude - 30.0).abs() < 1e-9);

        let bumpy_history = history(&[100.0, 120.0, 110.0]);
        let bumpy = RuleInput {
            record: &rec,
            history: Some(&bumpy_history),
            config: &config,
        };
        assert!(detect_trend(&bumpy).is_none());
    }

    #[test]
    fn trend_rule_stops_at_a_missing_period() {
        let config = InsightConfig::default();
        let rec = record(Some(130.0), None);
        let gapped = history_at(&[100.0, 110.0], &[3, 2]);
        let input = RuleInput {
            record: &rec,
            history: Some(&gapped),
            config: &config,
        };
        assert!(detect_trend(&input).is_none());

        let adjacent = history_at(&[90.0, 100.0, 110.0], &[4, 2, 1]);
        let input = RuleInput {
            record: &rec,
            history: Some(&adjacent),
            config: &config,
        };
        let finding = detect_trend(&input).unwrap();
        assert!((finding.magnitude - 30.0).abs() < 1e-9);
    }

    #[test]
    fn trend_rule_needs_enough_points() {
        let config = InsightConfig::default();
        let rec = record(Some(130.0), None);
        let short = history(&[100.0]);
        let input = RuleInput {
            record: &rec,
            history: Some(&short),
            config: &config,
        };
        assert!(detect_trend(&input).is_none());
    }

    #[test]
    fn anomaly_rule_uses_z_score_against_history() {
        let config = InsightConfig::default();
        let rec = record(Some(60.0), None);
        let hist = history(&[98.0, 102.0, 100.0, 99.0, 101.0]);
        let input = RuleInput {
            record: &rec,
            history: Some(&hist),
            config: &config,
        };
        let finding = detect_anomaly(&input).unwrap();
        assert_eq!(finding.direction, Direction::Decrease);
        assert!(finding.magnitude < -2.0);
        assert!(finding.magnitude_text.ends_with("standard deviations"));
    }

    #[test]
    fn anomaly_rule_skips_flat_or_short_history() {
        let config = InsightConfig::default();
        let rec = record(Some(40.0), None);
        let flat = history(&[100.0, 100.0, 100.0, 100.0]);
        let input = RuleInput {
            record: &rec,
            history: Some(&flat),
            config: &config,
        };
        assert!(detect_anomaly(&input).is_none());

        let short = history(&[90.0, 110.0]);
        let input = RuleInput {
            record: &rec,
            history: Some(&short),
            config: &config,
        };
        assert!(detect_anomaly(&input).is_none());
    }

    #[test]
    fn every_rule_kind_has_both_directions_templated() {
        for rule in RULES {
            for direction in [Direction::Increase, Direction::Decrease] {
                assert!(template_for(rule.kind, direction).is_some());
            }
        }
        for rule in SUBSET_RULES {
            assert!(template_for(rule.kind, Direction::Increase).is_some());
        }
        assert!(template_for(InsightKind::Correlation, Direction::Decrease).is_some());
    }

    #[test]
    fn history_walk_stops_at_the_start_of_the_data() {
        let dataset = subset_dataset(&[
            ("2024-01-01", "MSD", "100", "1"),
            ("2024-01-02", "MSD", "110", "1"),
            ("2024-01-04", "MSD", "130", "1"),
        ]);
        let profiles = crate::schema::classify_columns(
            &dataset,
            &crate::schema::ClassifierOptions::default(),
        );
        let histories = build_history(
            &dataset,
            &profiles,
            "fecha",
            &DateSelection::Single(day(4)),
            &["output".to_string()],
            usize::MAX,
        )
        .unwrap();
        let lags = histories[0].points.iter().map(|p| p.lag).collect::<Vec<_>>();
        assert_eq!(lags, vec![3, 2]);
        assert_eq!(histories[0].means(), vec![100.0, 110.0]);
        assert!(histories[0].contiguous_means().is_empty());
    }

    #[test]
    fn pearson_detects_linear_relationships() {
        let rising = [(1.0, 2.0), (2.0, 4.0), (3.0, 6.0)];
        assert!((pearson(&rising).unwrap() - 1.0).abs() < 1e-12);
        let falling = [(1.0, 6.0), (2.0, 4.0), (3.0, 2.0)];
        assert!((pearson(&falling).unwrap() + 1.0).abs() < 1e-12);
        assert_eq!(pearson(&[(1.0, 5.0), (2.0, 5.0), (3.0, 5.0)]), None);
        assert_eq!(pearson(&[(1.0, 0.1), (2.0, 0.1), (3.0, 0.1)]), None);
    }

    #[test]
    fn correlated_columns_are_reported_in_both_directions() {
        let config = InsightConfig {
            contribution_min_pct: 100.0,
            ..InsightConfig::default()
        };
        let together = subset_dataset(&[
            ("2024-01-01", "MSD", "100", "1.0"),
            ("2024-01-02", "Nazar", "120", "1.2"),
            ("2024-01-03", "MSD", "140", "1.5"),
            ("2024-01-04", "Nazar", "160", "1.6"),
        ]);
        let insights = subset_insights(&together, &config);
        assert_eq!(insights.len(), 1);
        let insight = &insights[0];
        assert_eq!(insight.kind, InsightKind::Correlation);
        assert_eq!(insight.direction, Direction::Increase);
        assert_eq!(insight.related.as_deref(), Some("scrap"));
        assert!(insight.magnitude > 0.9);
        assert!(insight.sentence.starts_with("Output and Scrap move together in 2024-01-01 to 2024-01-04"));

        let opposite = subset_dataset(&[
            ("2024-01-01", "MSD", "100", "4"),
            ("2024-01-02", "Nazar", "120", "3"),
            ("2024-01-03", "MSD", "140", "2"),
            ("2024-01-04", "Nazar", "160", "1"),
        ]);
        let insights = subset_insights(&opposite, &config);
        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].direction, Direction::Decrease);
        assert_eq!(insights[0].severity, Severity::Critical);
        assert!(insights[0].sentence.contains("move in opposite directions"));
        assert!(insights[0].sentence.contains("(correlation -1.00)"));
    }

    #[test]
    fn weak_or_short_correlations_are_ignored() {
        let config = InsightConfig {
            contribution_min_pct: 100.0,
            ..InsightConfig::default()
        };
        let weak = subset_dataset(&[
            ("2024-01-01", "MSD", "100", "2"),
            ("2024-01-02", "Nazar", "120", "1"),
            ("2024-01-03", "MSD", "140", "1"),
            ("2024-01-04", "Nazar", "160", "2"),
        ]);
        assert!(subset_insights(&weak, &config).is_empty());

        let short = subset_dataset(&[
            ("2024-01-01", "MSD", "100", "1"),
            ("2024-01-02", "Nazar", "120", "2"),
            ("2024-01-03", "MSD", "140", ""),
        ]);
        assert!(subset_insights(&short, &config).is_empty());
    }

    #[test]
    fn dominant_category_is_reported_as_top_contributor() {
        let config = InsightConfig {
            correlation_threshold: 1.0,
            ..InsightConfig::default()
        };
        let dataset = subset_dataset(&[
            ("2024-01-01", "MSD", "300", "1"),
            ("2024-01-02", "Nazar", "50", "1"),
            ("2024-01-03", "MSD", "100", "1"),
            ("2024-01-04", "Nazar", "50", "1"),
        ]);
        let insights = subset_insights(&dataset, &config);
        assert_eq!(insights.len(), 1);
        let insight = &insights[0];
        assert_eq!(insight.kind, InsightKind::Contribution);
        assert_eq!(insight.column, "output");
        assert_eq!(insight.related.as_deref(), Some("empresa"));
        assert!((insight.magnitude - 80.0).abs() < 1e-9);
        assert_eq!(
            insight.sentence,
            "MSD accounts for 80.0% of total Output in 2024-01-01 to 2024-01-04, grouped by Empresa."
        );
    }

    #[test]
    fn contribution_needs_two_categories_and_a_positive_total() {
        let config = InsightConfig {
            correlation_threshold: 1.0,
            ..InsightConfig::default()
        };
        let single = subset_dataset(&[
            ("2024-01-01", "MSD", "300", "1"),
            ("2024-01-02", "MSD", "50", "2"),
        ]);
        assert!(subset_insights(&single, &config).is_empty());

        let zero = subset_dataset(&[
            ("2024-01-01", "MSD", "0", "0"),
            ("2024-01-02", "Nazar", "0", "0"),
        ]);
        assert!(subset_insights(&zero, &config).is_empty());
    }

    #[test]
    fn display_name_title_cases_plain_names_only() {
        assert_eq!(display_name("total_output"), "Total Output");
        assert_eq!(display_name("MSD Bateas Real"), "MSD Bateas Real");
    }

    #[test]
    fn render_template_fills_all_placeholders() {
        let text = render_template(
            "{column} moved {magnitude}",
            &[("column", "Output".into()), ("magnitude", "5.0%".into())],
        );
        assert_eq!(text, "Output moved 5.0%");
    }
}
