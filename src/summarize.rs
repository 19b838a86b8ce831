//! Narrative summaries of a report.
//!
//! [`TemplateSummarizer`] is deterministic and always available. An external
//! service can stand in for it through [`HttpSummarizer`]; whatever goes wrong
//! there, [`summarize_or_fallback`] returns the template summary instead.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use log::warn;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use crate::{
    insight::{Insight, InsightKind},
    stats::MetricsSummary,
};

const MAX_HIGHLIGHTS: usize = 3;

pub trait Summarizer {
    fn name(&self) -> &str;

    fn generate_summary(&self, metrics: &MetricsSummary, insights: &[Insight]) -> Result<String>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateSummarizer;

impl Summarizer for TemplateSummarizer {
    fn name(&self) -> &str {
        "template"
    }

    fn generate_summary(&self, metrics: &MetricsSummary, insights: &[Insight]) -> Result<String> {
        Ok(template_summary(metrics, insights))
    }
}

pub fn template_summary(metrics: &MetricsSummary, insights: &[Insight]) -> String {
    if metrics.current_rows == 0 {
        return "No data available for the selected period.".to_string();
    }
    let mut summary = format!("Analysis based on {} record(s).", metrics.current_rows);
    if metrics.records.is_empty() {
        summary.push_str(" No numeric data available for detailed analysis.");
        return summary;
    }
    let compared = metrics
        .records
        .iter()
        .any(|r| r.current.is_some() && r.previous.is_some());
    let uncompared = metrics
        .records
        .iter()
        .filter(|r| r.current.is_some() && r.previous.is_none())
        .map(|r| r.column.as_str())
        .collect::<Vec<_>>();
    if insights.is_empty() {
        if compared {
            summary.push_str(" No variation, trend or anomaly crossed its threshold.");
        } else {
            summary.push_str(" No earlier period is available for comparison.");
        }
    } else {
        push_findings(&mut summary, insights);
    }
    if compared && !uncompared.is_empty() {
        summary.push_str(&format!(
            " No earlier values to compare for: {}.",
            uncompared.join(", ")
        ));
    }
    if !insights.is_empty() {
        let advice = recommendations(insights).join("; ");
        summary.push_str(&format!(" Recommendations: {advice}."));
    }
    summary
}

fn push_findings(summary: &mut String, insights: &[Insight]) {
    let count = |kind: InsightKind| insights.iter().filter(|i| i.kind == kind).count();
    let parts = [
        (count(InsightKind::Variation), "variation(s)"),
        (count(InsightKind::Trend), "trend(s)"),
        (count(InsightKind::Anomaly), "anomaly(ies)"),
        (count(InsightKind::Correlation), "correlation(s)"),
        (count(InsightKind::Contribution), "top contributor(s)"),
    ]
    .into_iter()
    .filter(|(n, _)| *n > 0)
    .map(|(n, label)| format!("{n} {label}"))
    .collect::<Vec<_>>();
    summary.push_str(&format!(" Key findings: {}.", parts.join(", ")));

    let mut ranked: Vec<&Insight> = insights.iter().collect();
    ranked.sort_by(|a, b| b.severity.cmp(&a.severity));
    for insight in ranked.into_iter().take(MAX_HIGHLIGHTS) {
        summary.push(' ');
        summary.push_str(&insight.sentence);
    }
}

/// One follow-up per group of finding kinds present, in a fixed order.
fn recommendations(insights: &[Insight]) -> Vec<&'static str> {
    let has = |kinds: &[InsightKind]| insights.iter().any(|i| kinds.contains(&i.kind));
    let mut advice = Vec::new();
    if has(&[InsightKind::Variation, InsightKind::Trend]) {
        advice.push("monitor the flagged changes over the coming periods");
    }
    if has(&[InsightKind::Anomaly]) {
        advice.push("investigate the unusual values");
    }
    if has(&[InsightKind::Correlation, InsightKind::Contribution]) {
        advice.push("focus on the key contributors and related columns");
    }
    advice
}

#[derive(Serialize)]
struct SummaryRequest<'a> {
    metrics: &'a MetricsSummary,
    insights: &'a [Insight],
}

#[derive(Deserialize)]
struct SummaryResponse {
    summary: String,
}

/// Posts metrics and insights as JSON and expects `{"summary": "..."}` back.
pub struct HttpSummarizer {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpSummarizer {
    pub fn new(endpoint: impl Into<String>, timeout: Duration, api_key: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Building HTTP client for summary service")?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key,
        })
    }
}

impl Summarizer for HttpSummarizer {
    fn name(&self) -> &str {
        &self.endpoint
    }

    fn generate_summary(&self, metrics: &MetricsSummary, insights: &[Insight]) -> Result<String> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&SummaryRequest { metrics, insights });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request
            .send()
            .with_context(|| format!("Calling summary service {}", self.endpoint))?;
        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("Summary service returned HTTP {status}"));
        }
        let body: SummaryResponse = response
            .json()
            .context("Decoding summary service response")?;
        let text = body.summary.trim();
        if text.is_empty() {
            return Err(anyhow!("Summary service returned an empty summary"));
        }
        Ok(text.to_string())
    }
}

/// Uses `primary` when given and healthy, otherwise the template summary.
pub fn summarize_or_fallback(
    primary: Option<&dyn Summarizer>,
    metrics: &MetricsSummary,
    insights: &[Insight],
) -> String {
    if let Some(summarizer) = primary {
        match summarizer.generate_summary(metrics, insights) {
            Ok(text) => return text,
            Err(err) => warn!(
                "Summarizer '{}' failed, using template summary: {err:#}",
                summarizer.name()
            ),
        }
    }
    template_summary(metrics, insights)
}
