use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use encoding_rs::Encoding;
use log::info;

use crate::{
    io_utils,
    report::Report,
    stats::{MetricRecord, SummaryStats},
};

pub const METRIC_HEADERS: &[&str] = &[
    "column",
    "count",
    "mean",
    "median",
    "min",
    "max",
    "sum",
    "std_dev",
    "previous_count",
    "previous_mean",
    "delta_pct",
];

pub const INSIGHT_HEADERS: &[&str] = &[
    "kind",
    "direction",
    "severity",
    "column",
    "related",
    "period",
    "magnitude",
    "sentence",
];

pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value:.4}")
    }
}

fn optional(value: Option<f64>) -> String {
    value.map(format_number).unwrap_or_default()
}

pub fn metric_row(record: &MetricRecord) -> Vec<String> {
    let current = record.current.as_ref();
    let previous = record.previous.as_ref();
    let field = |stats: Option<&SummaryStats>, pick: fn(&SummaryStats) -> f64| {
        optional(stats.map(pick))
    };
    vec![
        record.column.clone(),
        current.map(|s| s.count.to_string()).unwrap_or_default(),
        field(current, |s| s.mean),
        field(current, |s| s.median),
        field(current, |s| s.min),
        field(current, |s| s.max),
        optional(current.and_then(|s| s.sum)),
        optional(current.and_then(|s| s.std_dev)),
        previous.map(|s| s.count.to_string()).unwrap_or_default(),
        field(previous, |s| s.mean),
        optional(record.delta_pct),
    ]
}

/// Writes `data.csv`, `metrics.csv` and `insights.csv` for a report into `dir`.
pub fn export_report(
    report: &Report,
    dir: &Path,
    encoding: &'static Encoding,
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir).with_context(|| format!("Creating export directory {dir:?}"))?;

    let to_strings = |headers: &[&str]| headers.iter().map(|h| h.to_string()).collect::<Vec<_>>();
    let metrics = report.metrics.records.iter().map(metric_row).collect::<Vec<_>>();
    let insights = report
        .insights
        .iter()
        .map(|i| {
            vec![
                i.kind.to_string(),
                format!("{:?}", i.direction).to_lowercase(),
                format!("{:?}", i.severity).to_lowercase(),
                i.column.clone(),
                i.related.clone().unwrap_or_default(),
                i.period.clone(),
                format_number(i.magnitude),
                i.sentence.clone(),
            ]
        })
        .collect::<Vec<_>>();

    let outputs = [
        ("data.csv", report.data.headers.clone(), report.data.display_rows()),
        ("metrics.csv", to_strings(METRIC_HEADERS), metrics),
        ("insights.csv", to_strings(INSIGHT_HEADERS), insights),
    ];
    let mut written = Vec::with_capacity(outputs.len());
    for (name, headers, rows) in outputs {
        let path = dir.join(name);
        let bytes = io_utils::csv_bytes(&headers, &rows, encoding)
            .with_context(|| format!("Encoding {name}"))?;
        fs::write(&path, bytes).with_context(|| format!("Writing {path:?}"))?;
        written.push(path);
    }
    info!("Exported report '{}' to {:?}", report.key, dir);
    Ok(written)
}
