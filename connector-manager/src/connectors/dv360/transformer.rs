use adsync::FetchWindow;
use chrono::{Datelike, NaiveDate};
use serde_json::{json, Value};

use super::config::{DEFAULT_GROUP_BYS, DEFAULT_METRICS};

fn api_date(date: NaiveDate) -> Value {
    json!({"year": date.year(), "month": date.month(), "day": date.day()})
}

pub fn data_range(window: &FetchWindow) -> Value {
    json!({
        "range": "CUSTOM_DATES",
        "customStartDate": api_date(window.start_date()),
        "customEndDate": api_date(window.end_date()),
    })
}

/// A one-time query body for one advertiser.
///
/// `query_spec` may override `dimensions`, `metrics` and `filters`; the
/// advertiser filter is always present.
pub fn query_body(advertiser_id: &str, window: &FetchWindow, query_spec: Option<&Value>) -> Value {
    let list = |key: &str, default: &[&str]| -> Value {
        match query_spec.and_then(|s| s.get(key)) {
            Some(Value::Array(items)) if !items.is_empty() => Value::Array(items.clone()),
            _ => json!(default),
        }
    };

    let mut filters: Vec<Value> = match query_spec.and_then(|s| s.get("filters")) {
        Some(Value::Array(items)) => items.clone(),
        _ => Vec::new(),
    };
    let has_advertiser = filters
        .iter()
        .any(|f| f.get("type").and_then(Value::as_str) == Some("FILTER_ADVERTISER"));
    if !has_advertiser {
        filters.push(json!({"type": "FILTER_ADVERTISER", "value": advertiser_id}));
    }

    json!({
        "metadata": {
            "title": format!("adsync {} {}", advertiser_id, window),
            "dataRange": data_range(window),
            "format": "CSV",
        },
        "params": {
            "type": "STANDARD",
            "groupBys": list("dimensions", DEFAULT_GROUP_BYS),
            "metrics": list("metrics", DEFAULT_METRICS),
            "filters": filters,
        },
        "schedule": {"frequency": "ONE_TIME"},
    })
}
