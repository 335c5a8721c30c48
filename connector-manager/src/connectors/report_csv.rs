//! CSV report artifacts (DV360, Bing).

use adsync::normalize::parse_number;
use adsync::FetchError;
use serde_json::{Map, Value};

/// Parses a downloaded report into records.
///
/// Headers are lowercased with spaces replaced by `_`. Rows whose first
/// field is empty (totals) are skipped, and the first row with a different
/// field count than the header ends the data (trailing report metadata).
pub fn parse_report_csv(bytes: &[u8]) -> Result<Vec<Value>, FetchError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .has_headers(true)
        .from_reader(bytes);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| FetchError::Decode(format!("report header: {}", e)))?
        .iter()
        .map(header_name)
        .collect();
    if headers.iter().all(|h| h.is_empty()) {
        return Ok(Vec::new());
    }

    let mut records = Vec::new();
    for result in reader.records() {
        let row = result.map_err(|e| FetchError::Decode(format!("report row: {}", e)))?;
        if row.len() != headers.len() {
            break;
        }
        if row.get(0).map_or(true, |first| first.trim().is_empty()) {
            continue;
        }

        let record: Map<String, Value> = headers
            .iter()
            .zip(row.iter())
            .map(|(name, raw)| (name.clone(), cell_value(raw)))
            .collect();
        records.push(Value::Object(record));
    }
    Ok(records)
}

fn header_name(raw: &str) -> String {
    raw.trim_start_matches('\u{feff}')
        .trim()
        .trim_matches('"')
        .to_lowercase()
        .replace(' ', "_")
}

fn cell_value(raw: &str) -> Value {
    let raw = raw.trim();
    if raw.is_empty() {
        return Value::Null;
    }
    parse_number(raw).unwrap_or_else(|| Value::String(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_skips_totals_and_stops_at_metadata() {
        let csv = "Date,Advertiser ID,Impressions\n\
                   2025/01/01,42,100\n\
                   2025/01/02,42,\n\
                   ,,100\n\
                   \n\
                   Report Time:,2025/01/04 10:00\n\
                   Date Range:,2025/01/01 to 2025/01/02,x,y\n";
        let records = parse_report_csv(csv.as_bytes()).unwrap();
        assert_eq!(
            records,
            vec![
                json!({"date": "2025/01/01", "advertiser_id": 42, "impressions": 100}),
                json!({"date": "2025/01/02", "advertiser_id": 42, "impressions": null}),
            ]
        );
    }

    #[test]
    fn test_strips_bom_and_quotes() {
        let csv = "\u{feff}\"AccountId\",\"TimePeriod\",\"Spend\"\r\n\"7\",\"2025-01-01\",\"1.25\"\r\n";
        let records = parse_report_csv(csv.as_bytes()).unwrap();
        assert_eq!(records, vec![json!({"accountid": 7, "timeperiod": "2025-01-01", "spend": 1.25})]);
    }

    #[test]
    fn test_empty_report() {
        assert!(parse_report_csv(b"").unwrap().is_empty());
    }
}
