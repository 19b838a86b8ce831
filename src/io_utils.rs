//! I/O helpers for delimited input, encoded output, and atomic file replacement.
//!
//! - **Delimiter resolution**: extension-based detection (`.tsv` → tab, anything
//!   else → comma) with manual override.
//! - **Encoding**: input decoding and output encoding through `encoding_rs`,
//!   defaulting to UTF-8.
//! - **stdin**: the `-` path convention reads from standard input.
//! - **Atomic writes**: files are written to a uniquely named sibling and renamed
//!   into place so readers never observe a partial file.

use std::{
    fs::{self, File},
    io::{BufReader, Read, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use encoding_rs::{Encoding, UTF_8};
use uuid::Uuid;

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';

pub fn is_dash(path: &Path) -> bool {
    path == Path::new("-")
}

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    if let Some(value) = label {
        Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))
    } else {
        Ok(UTF_8)
    }
}

pub fn resolve_input_delimiter(path: &Path, provided: Option<u8>) -> u8 {
    provided.unwrap_or_else(|| match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => DEFAULT_TSV_DELIMITER,
        _ => DEFAULT_CSV_DELIMITER,
    })
}

pub fn open_csv_reader_from_path(path: &Path, delimiter: u8) -> Result<csv::Reader<Box<dyn Read>>> {
    let reader: Box<dyn Read> = if is_dash(path) {
        Box::new(std::io::stdin().lock())
    } else {
        Box::new(BufReader::new(
            File::open(path).with_context(|| format!("Opening input file {path:?}"))?,
        ))
    };
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(true)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(false);
    Ok(builder.from_reader(reader))
}

pub fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> Result<String> {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        Err(anyhow!(
            "Failed to decode text with encoding {}",
            encoding.name()
        ))
    } else {
        Ok(text.into_owned())
    }
}

pub fn decode_record(record: &csv::ByteRecord, encoding: &'static Encoding) -> Result<Vec<String>> {
    record
        .iter()
        .map(|field| decode_bytes(field, encoding))
        .collect()
}

pub fn reader_headers<R>(
    reader: &mut csv::Reader<R>,
    encoding: &'static Encoding,
) -> Result<Vec<String>>
where
    R: Read,
{
    let headers = reader.byte_headers()?.clone();
    decode_record(&headers, encoding)
}

/// Serializes `rows` as quoted CSV text, encoded with `encoding`.
pub fn csv_bytes(
    headers: &[String],
    rows: &[Vec<String>],
    encoding: &'static Encoding,
) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .double_quote(true)
        .from_writer(Vec::new());
    writer.write_record(headers).context("Writing CSV header")?;
    for (idx, row) in rows.iter().enumerate() {
        writer
            .write_record(row)
            .with_context(|| format!("Writing CSV row {}", idx + 1))?;
    }
    let utf8 = writer
        .into_inner()
        .map_err(|err| anyhow!("Flushing CSV buffer: {}", err.error()))?;
    if encoding == UTF_8 {
        return Ok(utf8);
    }
    let text = String::from_utf8(utf8).context("CSV buffer is not valid UTF-8")?;
    let (encoded, _, had_errors) = encoding.encode(&text);
    if had_errors {
        return Err(anyhow!("Failed to encode text using {}", encoding.name()));
    }
    Ok(encoded.into_owned())
}

/// Replaces `path` with `contents` via a temporary sibling and a rename.
pub fn write_atomically(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow!("Path {path:?} has no parent directory"))?;
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| anyhow!("Path {path:?} has no file name"))?;
    let temp_path: PathBuf = parent.join(format!(".{file_name}.{}.tmp", Uuid::new_v4()));
    {
        let mut file = File::create(&temp_path)
            .with_context(|| format!("Creating temporary file {temp_path:?}"))?;
        file.write_all(contents)
            .with_context(|| format!("Writing temporary file {temp_path:?}"))?;
        file.sync_all()
            .with_context(|| format!("Syncing temporary file {temp_path:?}"))?;
    }
    fs::rename(&temp_path, path).with_context(|| {
        let _ = fs::remove_file(&temp_path);
        format!("Moving {temp_path:?} into place at {path:?}")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_input_delimiter_detects_tsv() {
        assert_eq!(resolve_input_delimiter(Path::new("daily.tsv"), None), b'\t');
        assert_eq!(resolve_input_delimiter(Path::new("daily.csv"), None), b',');
        assert_eq!(resolve_input_delimiter(Path::new("daily.csv"), Some(b';')), b';');
    }

    #[test]
    fn resolve_encoding_rejects_unknown_labels() {
        assert_eq!(resolve_encoding(None).unwrap(), UTF_8);
        assert_eq!(
            resolve_encoding(Some("windows-1252")).unwrap().name(),
            "windows-1252"
        );
        assert!(resolve_encoding(Some("klingon")).is_err());
    }

    #[test]
    fn csv_bytes_transcodes_output() {
        let latin1 = resolve_encoding(Some("windows-1252")).unwrap();
        let bytes = csv_bytes(
            &["empresa".to_string()],
            &[vec!["Coseducam Ñuble".to_string()]],
            latin1,
        )
        .unwrap();
        assert!(bytes.contains(&0xD1));
        assert_eq!(decode_bytes(&bytes, latin1).unwrap(), "\"empresa\"\n\"Coseducam Ñuble\"\n");
    }

    #[test]
    fn write_atomically_replaces_existing_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        write_atomically(&path, b"first").unwrap();
        write_atomically(&path, b"second").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"second");
        let leftovers = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }
}
