//! Layered report configuration: defaults, then an optional YAML file, then CLI flags.
//!
//! ```yaml
//! classifier:
//!   max_categorical_distinct: 30
//! insights:
//!   variation_pct: 15.0
//!   history_periods: 14
//! summary:
//!   endpoint: http://localhost:8080/summary
//!   timeout_ms: 3000
//! ```

use std::{fs, path::Path, time::Duration};

use anyhow::{Context, Result, bail};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    cli::ThresholdArgs,
    insight::{InsightConfig, MAX_HISTORY_PERIODS},
    schema::ClassifierOptions,
};

pub const DEFAULT_SUMMARY_TIMEOUT_MS: u64 = 5000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SummaryServiceConfig {
    pub endpoint: Option<String>,
    pub timeout_ms: u64,
    pub api_key: Option<String>,
}

impl Default for SummaryServiceConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_ms: DEFAULT_SUMMARY_TIMEOUT_MS,
            api_key: None,
        }
    }
}

impl SummaryServiceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReportConfig {
    pub classifier: ClassifierOptions,
    pub insights: InsightConfig,
    pub summary: SummaryServiceConfig,
}

impl ReportConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Reading configuration file {path:?}"))?;
        Self::from_yaml(&raw).with_context(|| format!("Parsing configuration file {path:?}"))
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: ReportConfig = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults, overlaid by `path` when given, overlaid by any flag that was set.
    pub fn resolve(path: Option<&Path>, overrides: &ThresholdArgs) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply(overrides);
        config.validate()?;
        debug!("Effective configuration: {config:?}");
        Ok(config)
    }

    pub fn apply(&mut self, overrides: &ThresholdArgs) {
        let insights = &mut self.insights;
        if let Some(value) = overrides.variation_pct {
            insights.variation_pct = value;
        }
        if let Some(value) = overrides.anomaly_z {
            insights.anomaly_z = value;
        }
        if let Some(value) = overrides.trend_window {
            insights.trend_window = value;
        }
        if let Some(value) = overrides.trend_min_change_pct {
            insights.trend_min_change_pct = value;
        }
        if let Some(value) = overrides.min_history {
            insights.min_history = value;
        }
        if let Some(value) = overrides.history_periods {
            insights.history_periods = value;
        }
        if let Some(value) = overrides.correlation_threshold {
            insights.correlation_threshold = value;
        }
        if let Some(value) = overrides.contribution_min_pct {
            insights.contribution_min_pct = value;
        }
        if let Some(endpoint) = &overrides.summary_endpoint {
            self.summary.endpoint = Some(endpoint.clone());
        }
        if let Some(timeout) = overrides.summary_timeout_ms {
            self.summary.timeout_ms = timeout;
        }
        if let Some(key) = &overrides.summary_api_key {
            self.summary.api_key = Some(key.clone());
        }
    }

    pub fn validate(&self) -> Result<()> {
        let insights = &self.insights;
        for (name, value) in [
            ("variation_pct", insights.variation_pct),
            ("anomaly_z", insights.anomaly_z),
            ("trend_min_change_pct", insights.trend_min_change_pct),
            ("contribution_min_pct", insights.contribution_min_pct),
        ] {
            if !value.is_finite() || value < 0.0 {
                bail!("insights.{name} must be a non-negative number, got {value}");
            }
        }
        if insights.trend_window < 2 {
            bail!("insights.trend_window must be at least 2");
        }
        if insights.history_periods > MAX_HISTORY_PERIODS {
            bail!(
                "insights.history_periods must be at most {MAX_HISTORY_PERIODS}, got {}",
                insights.history_periods
            );
        }
        if !(0.0..=1.0).contains(&insights.correlation_threshold) {
            bail!(
                "insights.correlation_threshold must lie between 0 and 1, got {}",
                insights.correlation_threshold
            );
        }
        let classifier = &self.classifier;
        for (name, value) in [
            ("date_ratio", classifier.date_ratio),
            ("numeric_ratio", classifier.numeric_ratio),
            ("max_categorical_ratio", classifier.max_categorical_ratio),
        ] {
            if !(0.0..=1.0).contains(&value) {
                bail!("classifier.{name} must lie between 0 and 1, got {value}");
            }
        }
        if self.summary.timeout_ms == 0 {
            bail!("summary.timeout_ms must be greater than zero");
        }
        Ok(())
    }
}
