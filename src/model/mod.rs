//! Value types shared by every connector: the date window, the account
//! scope, the immutable report request and the rows handed to the loader.

mod validation;

pub use validation::{parse_date, ValidationError};

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// One flattened record ready for load.
pub type Row = serde_json::Map<String, Value>;

/// Closed, inclusive interval of calendar dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchWindow {
    start_date: NaiveDate,
    end_date: NaiveDate,
}

impl FetchWindow {
    pub fn new(start_date: NaiveDate, end_date: NaiveDate) -> Result<Self, ValidationError> {
        if start_date > end_date {
            return Err(ValidationError::InvertedWindow {
                start: start_date,
                end: end_date,
            });
        }
        Ok(Self {
            start_date,
            end_date,
        })
    }

    /// Rolling lookback ending yesterday, or today when `ends_today` is set.
    ///
    /// `start = today - days`. With `days == 0` and an end of yesterday the
    /// window collapses to the single day `today - 1`.
    pub fn trailing(days: u32, today: NaiveDate, ends_today: bool) -> Self {
        let end_date = if ends_today {
            today
        } else {
            today - Duration::days(1)
        };
        let start_date = (today - Duration::days(i64::from(days))).min(end_date);
        Self {
            start_date,
            end_date,
        }
    }

    /// Builds a window from optional caller dates, falling back to the
    /// trailing default for whichever side is missing.
    pub fn resolve(
        start: Option<&str>,
        end: Option<&str>,
        days: u32,
        today: NaiveDate,
        ends_today: bool,
    ) -> Result<Self, ValidationError> {
        let default = Self::trailing(days, today, ends_today);
        let start_date = start.map(parse_date).transpose()?.unwrap_or(default.start_date);
        let end_date = end.map(parse_date).transpose()?.unwrap_or(default.end_date);
        Self::new(start_date, end_date)
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start_date
    }

    pub fn end_date(&self) -> NaiveDate {
        self.end_date
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }

    /// Number of calendar days covered, both ends included.
    pub fn days(&self) -> i64 {
        (self.end_date - self.start_date).num_days() + 1
    }
}

impl fmt::Display for FetchWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start_date, self.end_date)
    }
}

/// A normalized external account/advertiser/customer identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountScope(String);

impl AccountScope {
    /// Strips hyphens and whitespace (`123-456-7890` → `1234567890`).
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let id: String = raw
            .chars()
            .filter(|c| *c != '-' && !c.is_whitespace())
            .collect();
        if id.is_empty() {
            return Err(ValidationError::EmptyAccountId);
        }
        Ok(Self(id))
    }

    /// Accepts a JSON string or number.
    pub fn from_value(value: &Value) -> Result<Self, ValidationError> {
        match value {
            Value::String(s) => Self::parse(s),
            Value::Number(n) => Self::parse(&n.to_string()),
            other => Err(ValidationError::InvalidParameter {
                name: "account id".to_string(),
                reason: format!("expected string or number, got {}", other),
            }),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything one fetch needs. Built once by a connector, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRequest {
    pub scope: AccountScope,
    pub window: FetchWindow,
    pub report_type: String,
    pub fields: Vec<String>,
    /// Query text in the vendor dialect (GAQL for Google Ads).
    pub query: Option<String>,
    /// Vendor-specific report definition (DV360 query spec, Bing report body).
    pub spec: Option<Value>,
}

/// How the loader treats rows already in the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    #[default]
    Append,
    Replace,
}

impl WriteMode {
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "append" => Ok(WriteMode::Append),
            "replace" => Ok(WriteMode::Replace),
            other => Err(ValidationError::UnknownWriteMode(other.to_string())),
        }
    }
}

/// All rows produced for one (account, request) pair.
#[derive(Debug, Clone)]
pub struct LoadBatch {
    pub request: ReportRequest,
    pub rows: Vec<Row>,
}

impl LoadBatch {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn date(s: &str) -> NaiveDate {
        parse_date(s).unwrap()
    }

    #[test]
    fn test_window_rejects_inverted_range() {
        let err = FetchWindow::new(date("2025-01-03"), date("2025-01-01")).unwrap_err();
        assert!(matches!(err, ValidationError::InvertedWindow { .. }));
        assert!(FetchWindow::new(date("2025-01-01"), date("2025-01-01")).is_ok());
    }

    #[test]
    fn test_trailing_window_ends_yesterday() {
        let w = FetchWindow::trailing(3, date("2025-01-10"), false);
        assert_eq!(w.start_date(), date("2025-01-07"));
        assert_eq!(w.end_date(), date("2025-01-09"));
        assert_eq!(w.days(), 3);
    }

    #[test]
    fn test_trailing_window_including_today() {
        let w = FetchWindow::trailing(7, date("2025-01-10"), true);
        assert_eq!(w.start_date(), date("2025-01-03"));
        assert_eq!(w.end_date(), date("2025-01-10"));
        assert_eq!(w.to_string(), "2025-01-03..2025-01-10");
    }

    #[test]
    fn test_trailing_zero_days_is_single_day() {
        let w = FetchWindow::trailing(0, date("2025-01-10"), false);
        assert_eq!(w.start_date(), w.end_date());
    }

    #[test]
    fn test_resolve_mixes_explicit_and_default() {
        let today = date("2025-01-10");
        let w = FetchWindow::resolve(Some("2025-01-01"), None, 3, today, false).unwrap();
        assert_eq!(w.start_date(), date("2025-01-01"));
        assert_eq!(w.end_date(), date("2025-01-09"));

        assert!(FetchWindow::resolve(Some("bad"), None, 3, today, false).is_err());
        assert!(FetchWindow::resolve(Some("2025-02-01"), Some("2025-01-01"), 3, today, false)
            .is_err());
    }

    #[test]
    fn test_window_contains() {
        let w = FetchWindow::new(date("2025-01-01"), date("2025-01-03")).unwrap();
        assert!(w.contains(date("2025-01-01")));
        assert!(w.contains(date("2025-01-03")));
        assert!(!w.contains(date("2025-01-04")));
    }

    #[test]
    fn test_account_scope_normalization() {
        assert_eq!(AccountScope::parse("123-456-7890").unwrap().as_str(), "1234567890");
        assert_eq!(AccountScope::parse(" 12 34 ").unwrap().as_str(), "1234");
        assert_eq!(AccountScope::parse(" - "), Err(ValidationError::EmptyAccountId));
        assert_eq!(AccountScope::from_value(&json!(42)).unwrap().as_str(), "42");
        assert!(AccountScope::from_value(&json!(null)).is_err());
    }

    #[test]
    fn test_write_mode_parse() {
        assert_eq!(WriteMode::parse("append").unwrap(), WriteMode::Append);
        assert_eq!(WriteMode::parse("REPLACE").unwrap(), WriteMode::Replace);
        assert!(WriteMode::parse("merge").is_err());
        assert_eq!(WriteMode::default(), WriteMode::Append);
    }
}
