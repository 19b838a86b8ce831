use thiserror::Error;

/// Recoverable failures raised by the reporting core.
///
/// None of these are fatal: each aborts only the request that triggered it.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ReportError {
    #[error("Column '{column}' cannot be used: {reason}")]
    InvalidColumn { column: String, reason: String },
    #[error("Invalid date selection: {0}")]
    InvalidSelection(String),
    #[error("Row {row} has {found} cell(s) but the dataset declares {expected} column(s)")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("Invalid report key '{0}'")]
    InvalidKey(String),
    #[error("Report '{key}' failed its integrity check (stored digest {stored}, computed {computed})")]
    IntegrityMismatch {
        key: String,
        stored: String,
        computed: String,
    },
}

impl ReportError {
    pub fn invalid_column(column: impl Into<String>, reason: impl Into<String>) -> Self {
        ReportError::InvalidColumn {
            column: column.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_column_message_names_the_column() {
        let err = ReportError::invalid_column("fecha", "not classified as a date column");
        assert_eq!(
            err.to_string(),
            "Column 'fecha' cannot be used: not classified as a date column"
        );
    }
}
