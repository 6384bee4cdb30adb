//! Error types for Reckon

use serde::Serialize;
use thiserror::Error;

/// A single raw record that could not be turned into a candidate
///
/// Carries enough context to locate the row in the uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordError {
    /// Zero-based position of the record within the batch
    pub row: usize,
    /// The record's date as the decoder saw it, if any
    pub raw_date: Option<String>,
    pub message: String,
}

impl std::fmt::Display for RecordError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.raw_date {
            Some(date) => write!(f, "row {} ({}): {}", self.row, date, self.message),
            None => write!(f, "row {}: {}", self.row, self.message),
        }
    }
}

/// One field-level problem found while validating a payee rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// A stored rule whose pattern could not be evaluated
///
/// Reported to the caller; the rule is skipped for the candidate being matched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchEngineError {
    pub rule_id: i64,
    pub pattern: String,
    pub message: String,
}

impl std::fmt::Display for MatchEngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "rule {} ('{}'): {}",
            self.rule_id, self.pattern, self.message
        )
    }
}

fn join_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[source] rusqlite::Error),

    #[error("Database pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Import error: {0}")]
    Import(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid rule: {}", join_field_errors(.0))]
    Rule(Vec<FieldError>),

    #[error("Concurrent modification: {0}")]
    Concurrency(String),

    #[error("Import cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether retrying the same operation later may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Concurrency(_))
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        // Busy/locked means another writer holds the database; callers retry
        match err.sqlite_error_code() {
            Some(rusqlite::ErrorCode::DatabaseBusy) | Some(rusqlite::ErrorCode::DatabaseLocked) => {
                Self::Concurrency(err.to_string())
            }
            _ => Self::Database(err),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_error_display() {
        let err = RecordError {
            row: 4,
            raw_date: Some("01/15/2024".to_string()),
            message: "missing payee".to_string(),
        };
        assert_eq!(err.to_string(), "row 4 (01/15/2024): missing payee");

        let err = RecordError {
            row: 0,
            raw_date: None,
            message: "bad amount".to_string(),
        };
        assert_eq!(err.to_string(), "row 0: bad amount");
    }

    #[test]
    fn test_rule_error_lists_every_field() {
        let err = Error::Rule(vec![
            FieldError::new("pattern", "must not be empty"),
            FieldError::new("category", "must not be empty"),
        ]);
        assert_eq!(
            err.to_string(),
            "Invalid rule: pattern: must not be empty; category: must not be empty"
        );
    }

    #[test]
    fn test_only_concurrency_is_retryable() {
        assert!(Error::Concurrency("busy".into()).is_retryable());
        assert!(!Error::Cancelled.is_retryable());
        assert!(!Error::NotFound("rule 1".into()).is_retryable());
    }
}
