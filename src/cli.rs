use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

use crate::data::parse_naive_date;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Comparative metrics and insights for daily operational exports",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Classify the columns of an export and print their profiles
    Profile(ProfileArgs),
    /// Filter an export by date, compare against the previous period and derive insights
    Report(ReportArgs),
    /// List stored report keys, newest first
    List(StoreArgs),
    /// Print a stored report
    Show(KeyArgs),
    /// Remove a stored report
    Delete(KeyArgs),
    /// Write a stored report's data, metrics and insights as CSV files
    Export(ExportArgs),
}

#[derive(Debug, Args)]
pub struct InputArgs {
    /// Input CSV/TSV export ('-' reads stdin)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// Dataset name recorded in reports (defaults to the file stem)
    #[arg(long = "sheet")]
    pub sheet: Option<String>,
}

#[derive(Debug, Args)]
pub struct ProfileArgs {
    #[command(flatten)]
    pub input: InputArgs,
    /// Optional YAML configuration file (classifier thresholds)
    #[arg(long = "config")]
    pub config: Option<PathBuf>,
    /// Also list the distinct values of each categorical column
    #[arg(long = "values")]
    pub values: bool,
}

#[derive(Debug, Args)]
pub struct ReportArgs {
    #[command(flatten)]
    pub input: InputArgs,
    /// Date column to filter on (auto-detected when omitted)
    #[arg(long = "date-column")]
    pub date_column: Option<String>,
    /// Single day to report on (defaults to the latest date in the data)
    #[arg(long = "date", value_parser = parse_date, conflicts_with_all = ["from", "to"])]
    pub date: Option<NaiveDate>,
    /// First day of an inclusive range
    #[arg(long = "from", value_parser = parse_date, requires = "to")]
    pub from: Option<NaiveDate>,
    /// Last day of an inclusive range
    #[arg(long = "to", value_parser = parse_date, requires = "from")]
    pub to: Option<NaiveDate>,
    /// Category filters such as `empresa=MSD|Nazar` or `turno!=noche`
    #[arg(long = "filter", action = clap::ArgAction::Append)]
    pub filters: Vec<String>,
    /// Numeric columns to summarize (defaults to every numeric column)
    #[arg(short = 'C', long = "columns", value_delimiter = ',', action = clap::ArgAction::Append)]
    pub columns: Vec<String>,
    /// Optional YAML configuration file
    #[arg(long = "config")]
    pub config: Option<PathBuf>,
    #[command(flatten)]
    pub thresholds: ThresholdArgs,
    /// Report store directory
    #[arg(long = "store")]
    pub store: Option<PathBuf>,
    /// Persist the report into --store under its date key
    #[arg(long = "save", requires = "store")]
    pub save: bool,
}

/// Flags that override values from the configuration file.
#[derive(Debug, Clone, Default, Args)]
pub struct ThresholdArgs {
    /// Minimum absolute percent change reported as a variation
    #[arg(long = "variation-pct")]
    pub variation_pct: Option<f64>,
    /// Minimum absolute z-score reported as an anomaly
    #[arg(long = "anomaly-z")]
    pub anomaly_z: Option<f64>,
    /// Number of consecutive periods that must move in one direction
    #[arg(long = "trend-window")]
    pub trend_window: Option<usize>,
    /// Minimum percent change across the trend window
    #[arg(long = "trend-min-change-pct")]
    pub trend_min_change_pct: Option<f64>,
    /// Minimum history points before anomalies are scored
    #[arg(long = "min-history")]
    pub min_history: Option<usize>,
    /// Number of preceding periods collected as history
    #[arg(long = "history-periods")]
    pub history_periods: Option<usize>,
    /// Absolute correlation two columns must exceed to be reported
    #[arg(long = "correlation-threshold")]
    pub correlation_threshold: Option<f64>,
    /// Percent share of a column total one category must exceed to be reported
    #[arg(long = "contribution-min-pct")]
    pub contribution_min_pct: Option<f64>,
    /// HTTP endpoint of an external summary service
    #[arg(long = "summary-endpoint")]
    pub summary_endpoint: Option<String>,
    /// Timeout for the summary service in milliseconds
    #[arg(long = "summary-timeout-ms")]
    pub summary_timeout_ms: Option<u64>,
    /// Bearer token for the summary service
    #[arg(long = "summary-api-key")]
    pub summary_api_key: Option<String>,
}

#[derive(Debug, Args)]
pub struct StoreArgs {
    /// Report store directory
    #[arg(long = "store")]
    pub store: PathBuf,
}

#[derive(Debug, Args)]
pub struct KeyArgs {
    #[command(flatten)]
    pub store: StoreArgs,
    /// Report key: `YYYY-MM-DD` or `YYYY-MM-DD_YYYY-MM-DD`
    #[arg(long = "key")]
    pub key: String,
}

#[derive(Debug, Args)]
pub struct ExportArgs {
    #[command(flatten)]
    pub key: KeyArgs,
    /// Directory receiving data.csv, metrics.csv and insights.csv
    #[arg(short = 'o', long = "output-dir")]
    pub output_dir: PathBuf,
    /// Character encoding for the exported files (defaults to utf-8)
    #[arg(long = "output-encoding")]
    pub output_encoding: Option<String>,
}

pub fn parse_date(value: &str) -> Result<NaiveDate, String> {
    parse_naive_date(value.trim()).map_err(|err| err.to_string())
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn range_flags_parse_into_dates() {
        let cli = Cli::try_parse_from([
            "ops-report",
            "report",
            "-i",
            "data.csv",
            "--from",
            "2024-01-01",
            "--to",
            "2024-01-07",
            "-C",
            "output,scrap",
        ])
        .unwrap();
        let Commands::Report(args) = cli.command else {
            panic!("expected report command");
        };
        assert_eq!(args.from, NaiveDate::from_ymd_opt(2024, 1, 1));
        assert_eq!(args.to, NaiveDate::from_ymd_opt(2024, 1, 7));
        assert_eq!(args.columns, vec!["output", "scrap"]);
    }

    #[test]
    fn date_conflicts_with_range() {
        let result = Cli::try_parse_from([
            "ops-report",
            "report",
            "-i",
            "data.csv",
            "--date",
            "2024-01-08",
            "--from",
            "2024-01-01",
            "--to",
            "2024-01-07",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn parse_delimiter_accepts_names() {
        assert_eq!(parse_delimiter("tab"), Ok(b'\t'));
        assert_eq!(parse_delimiter(";"), Ok(b';'));
        assert!(parse_delimiter("ab").is_err());
    }
}
