pub mod cli;
pub mod config;
pub mod data;
pub mod dataset;
pub mod error;
pub mod export;
pub mod filter;
pub mod ingest;
pub mod insight;
pub mod io_utils;
pub mod report;
pub mod schema;
pub mod stats;
pub mod store;
pub mod summarize;
pub mod table;

use std::{env, sync::OnceLock};

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use log::{LevelFilter, debug, info};

use crate::{
    cli::{Cli, Commands},
    config::ReportConfig,
    dataset::Dataset,
    filter::DateSelection,
    report::{Report, ReportRequest},
    store::{DirectoryStore, ReportStore},
    summarize::{HttpSummarizer, Summarizer},
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("ops_report", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Profile(args) => handle_profile(&args),
        Commands::Report(args) => handle_report(&args),
        Commands::List(args) => handle_list(&args),
        Commands::Show(args) => handle_show(&args),
        Commands::Delete(args) => handle_delete(&args),
        Commands::Export(args) => handle_export(&args),
    }
}

fn load_input(args: &cli::InputArgs) -> Result<Dataset> {
    let delimiter = io_utils::resolve_input_delimiter(&args.input, args.delimiter);
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    info!(
        "Loading '{}' with delimiter '{}' and encoding {}",
        args.input.display(),
        printable_delimiter(delimiter),
        encoding.name()
    );
    let dataset = ingest::load_dataset(&args.input, delimiter, encoding, args.sheet.as_deref())
        .with_context(|| format!("Loading dataset from {:?}", args.input))?;
    info!(
        "Loaded {} row(s) across {} column(s)",
        dataset.row_count(),
        dataset.headers().len()
    );
    Ok(dataset)
}

fn handle_profile(args: &cli::ProfileArgs) -> Result<()> {
    let config = ReportConfig::resolve(args.config.as_deref(), &cli::ThresholdArgs::default())?;
    let dataset = load_input(&args.input)?;
    let profiles = schema::classify_columns(&dataset, &config.classifier);
    print!("{}", table::render_profiles(&profiles));
    if let Some(date) = profiles.default_date_column() {
        println!("\nDefault date column: {}", date.name);
    }
    if args.values {
        for column in profiles.categorical_columns() {
            let values = schema::distinct_values(&dataset, &column)?;
            println!("\n{column} ({}): {}", values.len(), values.join(", "));
        }
    }
    Ok(())
}

/// Explicit `--date` or `--from/--to`, otherwise the latest date present in the date column.
fn resolve_selection(
    args: &cli::ReportArgs,
    dataset: &Dataset,
    config: &ReportConfig,
) -> Result<DateSelection> {
    if let Some(date) = args.date {
        return Ok(DateSelection::Single(date));
    }
    if let (Some(from), Some(to)) = (args.from, args.to) {
        return Ok(DateSelection::range(from, to)?);
    }
    let profiles = schema::classify_columns(dataset, &config.classifier);
    let column = match &args.date_column {
        Some(column) => column.clone(),
        None => profiles
            .default_date_column()
            .map(|p| p.name.clone())
            .ok_or_else(|| anyhow!("No date column detected; pass --date-column"))?,
    };
    profiles.require(&column, schema::ColumnKind::Date)?;
    let latest = filter::latest_date(dataset, &column)
        .ok_or_else(|| anyhow!("Column '{column}' holds no dates"))?;
    debug!("No date given; using latest date {latest} from '{column}'");
    Ok(DateSelection::Single(latest))
}

fn build_summarizer(config: &ReportConfig) -> Result<Option<Box<dyn Summarizer>>> {
    let Some(endpoint) = &config.summary.endpoint else {
        return Ok(None);
    };
    let summarizer = HttpSummarizer::new(
        endpoint.clone(),
        config.summary.timeout(),
        config.summary.api_key.clone(),
    )?;
    debug!("Using summary service {endpoint}");
    Ok(Some(Box::new(summarizer)))
}

fn handle_report(args: &cli::ReportArgs) -> Result<()> {
    let config = ReportConfig::resolve(args.config.as_deref(), &args.thresholds)?;
    let dataset = load_input(&args.input)?;

    let selection = resolve_selection(args, &dataset, &config)?;
    let mut request = ReportRequest::new(selection);
    request.date_column = args.date_column.clone();
    request.filters = filter::parse_filters(&args.filters)?;
    request.columns = args
        .columns
        .iter()
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect();
    request.classifier = config.classifier.clone();
    request.insights = config.insights.clone();

    let summarizer = build_summarizer(&config)?;
    let report = report::generate_report(&dataset, &request, summarizer.as_deref())
        .with_context(|| format!("Generating report for {}", request.selection.label()))?;
    print_report(&report);

    if args.save {
        let root = args
            .store
            .as_ref()
            .ok_or_else(|| anyhow!("--save requires --store"))?;
        let store = DirectoryStore::open(root)?;
        store.save(&report)?;
        println!("\nSaved report '{}' to {:?}", report.key, store.root());
    }
    Ok(())
}

fn print_report(report: &Report) {
    println!(
        "Report {} ({}) from '{}', date column '{}'",
        report.key,
        report.selection.label(),
        report.source,
        report.date_column
    );
    if !report.filters.is_empty() {
        let filters = report
            .filters
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>();
        println!("Filters: {}", filters.join(", "));
    }
    println!();
    match report.metrics.previous_rows {
        Some(previous) => println!(
            "Rows: {} (previous period: {})",
            report.metrics.current_rows, previous
        ),
        None => println!(
            "Rows: {} (no previous period)",
            report.metrics.current_rows
        ),
    }
    if !report.metrics.records.is_empty() {
        println!();
        print!("{}", table::render_metrics(&report.metrics));
    }
    if !report.insights.is_empty() {
        println!();
        print!("{}", table::render_insights(&report.insights));
    }
    println!("\n{}", report.summary);
}

fn open_store(args: &cli::StoreArgs) -> Result<DirectoryStore> {
    DirectoryStore::open(&args.store)
        .with_context(|| format!("Opening report store {:?}", args.store))
}

fn load_stored(args: &cli::KeyArgs) -> Result<Report> {
    let store = open_store(&args.store)?;
    store
        .load(&args.key)?
        .ok_or_else(|| anyhow!("No report stored under '{}'", args.key))
}

fn handle_list(args: &cli::StoreArgs) -> Result<()> {
    let keys = open_store(args)?.list_keys()?;
    if keys.is_empty() {
        info!("No reports stored in {:?}", args.store);
    }
    for key in keys {
        println!("{key}");
    }
    Ok(())
}

fn handle_show(args: &cli::KeyArgs) -> Result<()> {
    let report = load_stored(args)?;
    print_report(&report);
    Ok(())
}

fn handle_delete(args: &cli::KeyArgs) -> Result<()> {
    let store = open_store(&args.store)?;
    if !store.delete(&args.key)? {
        return Err(anyhow!("No report stored under '{}'", args.key));
    }
    println!("Deleted report '{}'", args.key);
    Ok(())
}

fn handle_export(args: &cli::ExportArgs) -> Result<()> {
    let encoding = io_utils::resolve_encoding(args.output_encoding.as_deref())?;
    let report = load_stored(&args.key)?;
    let written = export::export_report(&report, &args.output_dir, encoding)?;
    for path in written {
        println!("{}", path.display());
    }
    Ok(())
}

pub(crate) fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b',' => ",".to_string(),
        b'\t' => "\\t".to_string(),
        b'\n' => "\\n".to_string(),
        other => (other as char).to_string(),
    }
}
