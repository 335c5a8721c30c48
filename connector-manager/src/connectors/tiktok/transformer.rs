use adsync::normalize::parse_number;
use serde_json::{Map, Value};

/// `{"dimensions": {...}, "metrics": {...}}` → one flat record. Metric
/// strings are cast to numbers where they parse; empty strings become null.
pub fn report_row_to_record(row: Value) -> Value {
    let mut record = Map::new();

    if let Some(Value::Object(dimensions)) = row.get("dimensions") {
        for (key, value) in dimensions {
            record.insert(key.clone(), value.clone());
        }
    }

    if let Some(Value::Object(metrics)) = row.get("metrics") {
        for (key, value) in metrics {
            let value = match value {
                Value::String(s) if s.trim().is_empty() => Value::Null,
                Value::String(s) => parse_number(s).unwrap_or_else(|| value.clone()),
                other => other.clone(),
            };
            record.insert(key.clone(), value);
        }
    }

    Value::Object(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merges_dimensions_and_casts_metrics() {
        let record = report_row_to_record(json!({
            "dimensions": {"campaign_id": "17", "stat_time_day": "2025-01-01 00:00:00"},
            "metrics": {"spend": "12.50", "clicks": "4", "ctr": "", "objective": "REACH"}
        }));
        assert_eq!(
            record,
            json!({
                "campaign_id": "17",
                "stat_time_day": "2025-01-01 00:00:00",
                "spend": 12.5,
                "clicks": 4,
                "ctr": null,
                "objective": "REACH"
            })
        );
    }
}
