//! In-memory tabular dataset handed over by the ingestion collaborator.

use serde::{Deserialize, Serialize};

use crate::{data::Value, error::ReportError};

pub type Row = Vec<Option<Value>>;

/// An ordered set of rows sharing one column set.
///
/// Rows always carry exactly one cell per header; [`Dataset::new`] enforces this.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Dataset {
    name: String,
    headers: Vec<String>,
    rows: Vec<Row>,
}

impl Dataset {
    pub fn new(
        name: impl Into<String>,
        headers: Vec<String>,
        rows: Vec<Row>,
    ) -> Result<Self, ReportError> {
        if let Some((row, cells)) = rows
            .iter()
            .enumerate()
            .find(|(_, cells)| cells.len() != headers.len())
        {
            return Err(ReportError::RaggedRow {
                row,
                expected: headers.len(),
                found: cells.len(),
            });
        }
        Ok(Self {
            name: name.into(),
            headers,
            rows,
        })
    }

    /// Builds a dataset from raw text cells, inferring a typed value per cell.
    pub fn from_text_rows(
        name: impl Into<String>,
        headers: Vec<String>,
        rows: Vec<Vec<String>>,
    ) -> Result<Self, ReportError> {
        let typed = rows
            .into_iter()
            .map(|cells| cells.iter().map(|cell| Value::infer(cell)).collect())
            .collect();
        Self::new(name, headers, typed)
    }

    /// The sheet or source name the data was extracted from.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Iterates the cells of one column in row order.
    pub fn column_values(&self, index: usize) -> impl Iterator<Item = Option<&Value>> + '_ {
        self.rows
            .iter()
            .map(move |row| row.get(index).and_then(|cell| cell.as_ref()))
    }

    /// Returns a new dataset holding only the rows accepted by `keep`.
    pub fn retain_rows<F>(&self, mut keep: F) -> Dataset
    where
        F: FnMut(&Row) -> bool,
    {
        Dataset {
            name: self.name.clone(),
            headers: self.headers.clone(),
            rows: self.rows.iter().filter(|row| keep(row)).cloned().collect(),
        }
    }

    /// Copies the rows at `indices` into a standalone dataset.
    pub fn select_rows(&self, indices: &[usize]) -> Dataset {
        Dataset {
            name: self.name.clone(),
            headers: self.headers.clone(),
            rows: indices
                .iter()
                .filter_map(|&idx| self.rows.get(idx).cloned())
                .collect(),
        }
    }
}
