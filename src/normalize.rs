//! Turns raw vendor records into rows with a stable column contract.
//!
//! Steps, in order: flatten nested objects, snake-case keys, unwrap
//! value-wrapper lists, derive de-suffixed `*_micros` columns, derive the
//! `date` column, then inject `source`, `loaded_at`, `account_id` and
//! `report_type`.

use crate::model::{AccountScope, Row};
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde_json::{Number, Value};
use tracing::warn;

const MICROS_SUFFIX: &str = "_micros";
const MICROS_PER_UNIT: f64 = 1_000_000.0;

/// Per-connector normalization settings.
#[derive(Debug, Clone)]
pub struct Normalizer {
    platform: String,
    date_fields: Vec<String>,
    unwrap_fields: Vec<String>,
    drop_micros: bool,
}

impl Normalizer {
    pub fn new(platform: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            date_fields: vec!["date".to_string()],
            unwrap_fields: Vec::new(),
            drop_micros: false,
        }
    }

    /// Candidate vendor date columns (snake-cased), first present wins.
    pub fn with_date_fields(mut self, fields: &[&str]) -> Self {
        self.date_fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    /// Columns holding `[{"value": ...}]` wrappers.
    pub fn with_unwrap_fields(mut self, fields: &[&str]) -> Self {
        self.unwrap_fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    /// Remove the raw `*_micros` column once the converted one exists.
    pub fn with_drop_micros(mut self, drop: bool) -> Self {
        self.drop_micros = drop;
        self
    }

    pub fn platform(&self) -> &str {
        &self.platform
    }

    pub fn normalize(
        &self,
        records: Vec<Value>,
        scope: &AccountScope,
        report_type: &str,
        loaded_at: DateTime<Utc>,
    ) -> Vec<Row> {
        let loaded_at = loaded_at.to_rfc3339_opts(SecondsFormat::Secs, true);
        records
            .into_iter()
            .filter_map(|record| match record {
                Value::Object(map) => Some(self.normalize_row(map, scope, report_type, &loaded_at)),
                other => {
                    warn!(
                        platform = %self.platform,
                        record_type = json_type(&other),
                        "Skipping non-object record"
                    );
                    None
                }
            })
            .collect()
    }

    fn normalize_row(&self, record: Row, scope: &AccountScope, report_type: &str, loaded_at: &str) -> Row {
        let mut flat = Row::new();
        flatten_into(&mut flat, None, record);

        let mut row: Row = flat
            .into_iter()
            .map(|(key, value)| (snake_case(&key), value))
            .collect();

        for field in &self.unwrap_fields {
            let unwrapped = row.get(field).map(unwrap_value).unwrap_or(Value::Null);
            row.insert(field.clone(), unwrapped);
        }

        let micros_keys: Vec<String> = row
            .keys()
            .filter(|k| k.len() > MICROS_SUFFIX.len() && k.ends_with(MICROS_SUFFIX))
            .cloned()
            .collect();
        for key in micros_keys {
            let base = key[..key.len() - MICROS_SUFFIX.len()].to_string();
            let converted = row.get(&key).and_then(as_f64).map(|v| v / MICROS_PER_UNIT);
            row.insert(base, converted.map(float_value).unwrap_or(Value::Null));
            if self.drop_micros {
                row.remove(&key);
            }
        }

        let date = self
            .date_fields
            .iter()
            .filter_map(|f| row.get(f))
            .find(|v| !v.is_null())
            .map(normalize_date);
        if let Some(date) = date {
            row.insert("date".to_string(), date);
        }

        row.insert("source".to_string(), Value::String(self.platform.clone()));
        row.insert("loaded_at".to_string(), Value::String(loaded_at.to_string()));
        row.insert("account_id".to_string(), Value::String(scope.to_string()));
        row.insert("report_type".to_string(), Value::String(report_type.to_string()));
        row
    }
}

fn flatten_into(out: &mut Row, prefix: Option<&str>, map: Row) {
    for (key, value) in map {
        let key = match prefix {
            Some(p) => format!("{}_{}", p, key),
            None => key,
        };
        match value {
            Value::Object(inner) if !inner.is_empty() => flatten_into(out, Some(&key), inner),
            Value::Object(_) => {
                out.insert(key, Value::Null);
            }
            other => {
                out.insert(key, other);
            }
        }
    }
}

/// `metrics_costMicros` → `metrics_cost_micros`, `Time Period` → `time_period`,
/// `CTR` → `ctr`, `AdGroupId` → `ad_group_id`.
pub fn snake_case(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    let mut out = String::with_capacity(key.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c.is_alphanumeric() {
            if c.is_uppercase() && i > 0 {
                let prev = chars[i - 1];
                let next_is_lower = chars.get(i + 1).map_or(false, |n| n.is_lowercase());
                if prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_is_lower) {
                    out.push('_');
                }
            }
            out.extend(c.to_lowercase());
        } else {
            out.push('_');
        }
    }

    let mut collapsed = String::with_capacity(out.len());
    for c in out.chars() {
        if c == '_' && (collapsed.is_empty() || collapsed.ends_with('_')) {
            continue;
        }
        collapsed.push(c);
    }
    collapsed.trim_end_matches('_').to_string()
}

/// `[{"value": "42"}]` → `42`. Anything that is not a non-empty list whose
/// first element carries a `value` becomes null.
pub fn unwrap_value(value: &Value) -> Value {
    let inner = match value {
        Value::Array(items) => items.first().and_then(|first| first.get("value")),
        _ => None,
    };
    match inner {
        Some(Value::String(s)) => parse_number(s).unwrap_or_else(|| Value::String(s.clone())),
        Some(v @ Value::Number(_)) => v.clone(),
        Some(Value::Bool(b)) => Value::Bool(*b),
        _ => Value::Null,
    }
}

/// Parses a numeric string into an integer or float JSON number.
pub fn parse_number(s: &str) -> Option<Value> {
    let s = s.trim();
    if let Ok(i) = s.parse::<i64>() {
        return Some(Value::Number(i.into()));
    }
    s.parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .and_then(Number::from_f64)
        .map(Value::Number)
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

fn float_value(f: f64) -> Value {
    Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
}

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%Y%m%d"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y/%m/%d %H:%M:%S"];

/// Reduces recognized date or timestamp strings to `YYYY-MM-DD`.
/// Unrecognized values are returned unchanged.
pub fn normalize_date(value: &Value) -> Value {
    let raw = match value {
        Value::String(s) => s.trim(),
        other => return other.clone(),
    };

    let parsed = DATE_FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(raw, f).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|f| NaiveDateTime::parse_from_str(raw, f).ok())
                .map(|dt| dt.date())
        })
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()));

    match parsed {
        Some(date) => Value::String(date.format("%Y-%m-%d").to_string()),
        None => value.clone(),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scope() -> AccountScope {
        AccountScope::parse("123").unwrap()
    }

    fn loaded_at() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-01-04T06:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_snake_case() {
        assert_eq!(snake_case("metrics_costMicros"), "metrics_cost_micros");
        assert_eq!(snake_case("Time Period"), "time_period");
        assert_eq!(snake_case("CTR"), "ctr");
        assert_eq!(snake_case("AdGroupId"), "ad_group_id");
        assert_eq!(snake_case("segments.date"), "segments_date");
        assert_eq!(snake_case("already_snake"), "already_snake");
        assert_eq!(snake_case("Spend (USD)"), "spend_usd");
    }

    #[test]
    fn test_micros_conversion_keeps_raw_column() {
        let normalizer = Normalizer::new("Google Ads");
        let rows = normalizer.normalize(
            vec![json!({"metrics": {"costMicros": 2_500_000}})],
            &scope(),
            "campaign",
            loaded_at(),
        );

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["metrics_cost"], json!(2.5));
        assert_eq!(rows[0]["metrics_cost_micros"], json!(2_500_000));
    }

    #[test]
    fn test_micros_can_be_dropped() {
        let normalizer = Normalizer::new("DV360").with_drop_micros(true);
        let rows = normalizer.normalize(
            vec![json!({"revenue_micros": "1000000", "cost_micros": "n/a"})],
            &scope(),
            "standard",
            loaded_at(),
        );

        assert_eq!(rows[0]["revenue"], json!(1.0));
        assert_eq!(rows[0]["cost"], Value::Null);
        assert!(!rows[0].contains_key("revenue_micros"));
    }

    #[test]
    fn test_value_wrapper_unwrapping() {
        assert_eq!(unwrap_value(&json!([{"value": "42"}])), json!(42));
        assert_eq!(unwrap_value(&json!([{"action_type": "video_view", "value": "1.5"}])), json!(1.5));
        assert_eq!(unwrap_value(&json!([])), Value::Null);
        assert_eq!(unwrap_value(&json!([{"action_type": "x"}])), Value::Null);
        assert_eq!(unwrap_value(&json!("oops")), Value::Null);
    }

    #[test]
    fn test_missing_wrapper_field_becomes_null() {
        let normalizer = Normalizer::new("Meta").with_unwrap_fields(&["video_play_actions", "video_thruplay_watched_actions"]);
        let rows = normalizer.normalize(
            vec![json!({"video_play_actions": [{"value": "42"}]})],
            &scope(),
            "ad",
            loaded_at(),
        );

        assert_eq!(rows[0]["video_play_actions"], json!(42));
        assert_eq!(rows[0]["video_thruplay_watched_actions"], Value::Null);
    }

    #[test]
    fn test_date_and_metadata_columns() {
        let normalizer = Normalizer::new("Meta").with_date_fields(&["date_start"]);
        let rows = normalizer.normalize(
            vec![json!({"date_start": "2025-01-02", "spend": "10.5"})],
            &scope(),
            "ad",
            loaded_at(),
        );

        let row = &rows[0];
        assert_eq!(row["date"], json!("2025-01-02"));
        assert_eq!(row["source"], json!("Meta"));
        assert_eq!(row["account_id"], json!("123"));
        assert_eq!(row["report_type"], json!("ad"));
        assert_eq!(row["loaded_at"], json!("2025-01-04T06:00:00Z"));
    }

    #[test]
    fn test_date_formats() {
        assert_eq!(normalize_date(&json!("2025-01-02 00:00:00")), json!("2025-01-02"));
        assert_eq!(normalize_date(&json!("1/2/2025")), json!("2025-01-02"));
        assert_eq!(normalize_date(&json!("2025/01/02")), json!("2025-01-02"));
        assert_eq!(normalize_date(&json!("20250102")), json!("2025-01-02"));
        assert_eq!(normalize_date(&json!("2025-01-02T10:00:00+02:00")), json!("2025-01-02"));
        assert_eq!(normalize_date(&json!("last week")), json!("last week"));
    }

    #[test]
    fn test_first_present_date_field_wins() {
        let normalizer = Normalizer::new("Bing Ads").with_date_fields(&["time_period", "date"]);
        let rows = normalizer.normalize(
            vec![json!({"TimePeriod": "2025-01-03"})],
            &scope(),
            "CampaignPerformanceReport",
            loaded_at(),
        );
        assert_eq!(rows[0]["date"], json!("2025-01-03"));
    }

    #[test]
    fn test_non_object_records_are_skipped() {
        let rows = Normalizer::new("TikTok").normalize(
            vec![json!(1), json!({"a": 1}), json!(null)],
            &scope(),
            "ad",
            loaded_at(),
        );
        assert_eq!(rows.len(), 1);
    }
}
