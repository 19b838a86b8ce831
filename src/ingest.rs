use std::path::Path;

use anyhow::{Context, Result};
use encoding_rs::Encoding;
use log::debug;

use crate::{dataset::Dataset, io_utils};

/// Loads a delimited export into a typed [`Dataset`].
///
/// Rows whose cells are all blank are dropped; spreadsheet exports commonly end with them.
pub fn load_dataset(
    path: &Path,
    delimiter: u8,
    encoding: &'static Encoding,
    name: Option<&str>,
) -> Result<Dataset> {
    let mut reader = io_utils::open_csv_reader_from_path(path, delimiter)?;
    let headers = io_utils::reader_headers(&mut reader, encoding)
        .with_context(|| format!("Reading headers from {path:?}"))?
        .into_iter()
        .map(|h| h.trim().to_string())
        .collect::<Vec<_>>();

    let mut rows = Vec::new();
    let mut skipped = 0usize;
    for (row_idx, record) in reader.byte_records().enumerate() {
        let record = record.with_context(|| format!("Reading row {}", row_idx + 2))?;
        let decoded = io_utils::decode_record(&record, encoding)
            .with_context(|| format!("Decoding row {}", row_idx + 2))?;
        if decoded.iter().all(|cell| cell.trim().is_empty()) {
            skipped += 1;
            continue;
        }
        rows.push(decoded);
    }
    debug!(
        "Read {} row(s) from {:?}, skipped {} blank row(s)",
        rows.len(),
        path,
        skipped
    );

    let name = match name {
        Some(name) => name.to_string(),
        None if io_utils::is_dash(path) => "stdin".to_string(),
        None => path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("dataset")
            .to_string(),
    };
    let dataset = Dataset::from_text_rows(name, headers, rows)
        .with_context(|| format!("Building dataset from {path:?}"))?;
    Ok(dataset)
}
