use std::borrow::Cow;
use std::fmt::Write as _;

use crate::{
    export::{self, format_number},
    insight::Insight,
    schema::{ColumnKind, ColumnProfiles},
    stats::MetricsSummary,
};

/// Renders an aligned plain-text table with a dashed separator under the header.
pub fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let mut widths = headers.iter().map(|h| h.chars().count()).collect::<Vec<_>>();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut output = String::new();
    let _ = writeln!(output, "{}", format_row(headers, &widths));
    let separator = widths
        .iter()
        .map(|w| "-".repeat((*w).max(3)))
        .collect::<Vec<_>>();
    let _ = writeln!(output, "{}", format_row(&separator, &widths));
    for row in rows {
        let _ = writeln!(output, "{}", format_row(row, &widths));
    }
    output
}

fn format_row(values: &[String], widths: &[usize]) -> String {
    let line = values
        .iter()
        .zip(widths)
        .map(|(value, width)| {
            let cell = sanitize_cell(value);
            let padding = width.saturating_sub(cell.chars().count());
            format!("{cell}{}", " ".repeat(padding))
        })
        .collect::<Vec<_>>()
        .join("  ");
    line.trim_end().to_string()
}

fn sanitize_cell(value: &str) -> Cow<'_, str> {
    if value.contains(['\n', '\r', '\t']) {
        Cow::Owned(value.replace(['\n', '\r', '\t'], " "))
    } else {
        Cow::Borrowed(value)
    }
}

fn headers(names: &[&str]) -> Vec<String> {
    names.iter().map(|h| h.to_string()).collect()
}

pub fn render_profiles(profiles: &ColumnProfiles) -> String {
    let rows = profiles
        .iter()
        .map(|p| {
            let range = p
                .date_range
                .map(|r| format!("{} .. {}", r.earliest, r.latest))
                .unwrap_or_default();
            vec![
                p.name.clone(),
                p.kind.to_string(),
                p.non_empty.to_string(),
                if p.kind == ColumnKind::Categorical || p.kind == ColumnKind::Text {
                    p.distinct.to_string()
                } else {
                    String::new()
                },
                range,
            ]
        })
        .collect::<Vec<_>>();
    render_table(
        &headers(&["column", "kind", "non_empty", "distinct", "date_range"]),
        &rows,
    )
}

pub fn render_metrics(metrics: &MetricsSummary) -> String {
    let rows = metrics
        .records
        .iter()
        .map(|record| {
            let mut row = export::metric_row(record);
            if let Some(delta) = record.delta_pct {
                if let Some(last) = row.last_mut() {
                    *last = format!("{}%", format_number((delta * 10.0).round() / 10.0));
                }
            } else if record.previous.is_none() {
                if let Some(last) = row.last_mut() {
                    *last = "n/a".to_string();
                }
            }
            row
        })
        .collect::<Vec<_>>();
    render_table(&headers(export::METRIC_HEADERS), &rows)
}

pub fn render_insights(insights: &[Insight]) -> String {
    let rows = insights
        .iter()
        .map(|i| {
            vec![
                i.kind.to_string(),
                format!("{:?}", i.severity).to_lowercase(),
                i.sentence.clone(),
            ]
        })
        .collect::<Vec<_>>();
    render_table(&headers(&["kind", "severity", "insight"]), &rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_table_aligns_columns_and_trims_trailing_space() {
        let rendered = render_table(
            &headers(&["column", "mean"]),
            &[
                vec!["output".into(), "40".into()],
                vec!["ab".into(), "100".into()],
            ],
        );
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "column  mean");
        assert_eq!(lines[1], "------  ----");
        assert_eq!(lines[2], "output  40");
        assert_eq!(lines[3], "ab      100");
    }

    #[test]
    fn sanitize_cell_flattens_newlines() {
        assert_eq!(sanitize_cell("a\nb"), "a b");
        assert!(matches!(sanitize_cell("plain"), Cow::Borrowed(_)));
    }
}
