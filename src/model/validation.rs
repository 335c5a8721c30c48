use chrono::NaiveDate;
use std::fmt;

/// Problems with a job's parameters. Reported immediately, never retried.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    MissingParameter(String),
    InvalidParameter { name: String, reason: String },
    InvalidDate(String),
    InvertedWindow { start: NaiveDate, end: NaiveDate },
    EmptyAccountId,
    UnknownWriteMode(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::MissingParameter(name) => {
                write!(f, "missing required parameter '{}'", name)
            }
            ValidationError::InvalidParameter { name, reason } => {
                write!(f, "invalid parameter '{}': {}", name, reason)
            }
            ValidationError::InvalidDate(s) => {
                write!(f, "invalid date '{}': expected YYYY-MM-DD", s)
            }
            ValidationError::InvertedWindow { start, end } => {
                write!(f, "start_date {} is after end_date {}", start, end)
            }
            ValidationError::EmptyAccountId => write!(f, "account id is empty"),
            ValidationError::UnknownWriteMode(m) => {
                write!(f, "unknown if_exists mode '{}': expected append or replace", m)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Parses an ISO-8601 calendar date (`YYYY-MM-DD`).
pub fn parse_date(s: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| ValidationError::InvalidDate(s.to_string()))
}
