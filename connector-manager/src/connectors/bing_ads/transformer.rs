use adsync::{FetchError, FetchWindow};
use chrono::{Datelike, NaiveDate};
use serde_json::{json, Value};
use std::io::{Cursor, Read};

use super::config::AGGREGATION;

fn report_date(date: NaiveDate) -> Value {
    json!({"Day": date.day(), "Month": date.month(), "Year": date.year()})
}

/// The `ReportRequest` object for one account.
pub fn report_request(report_type: &str, account_id: &str, window: &FetchWindow, columns: &[String]) -> Value {
    json!({
        "Type": format!("{}Request", report_type),
        "ReportName": format!("{} {} {}", report_type, account_id, window),
        "Format": "Csv",
        "FormatVersion": "2.0",
        "ExcludeColumnHeaders": false,
        "ExcludeReportFooter": true,
        "ExcludeReportHeader": true,
        "ReturnOnlyCompleteData": false,
        "Aggregation": AGGREGATION,
        "Columns": columns,
        "Scope": {"AccountIds": [account_id]},
        "Time": {
            "CustomDateRangeStart": report_date(window.start_date()),
            "CustomDateRangeEnd": report_date(window.end_date()),
        },
    })
}

/// Reports are delivered as a zip holding one CSV.
pub fn unzip_report(bytes: &[u8]) -> Result<Vec<u8>, FetchError> {
    let mut archive =
        zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| FetchError::Decode(format!("report archive: {}", e)))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| FetchError::Decode(format!("report archive: {}", e)))?;
        if !entry.name().to_lowercase().ends_with(".csv") {
            continue;
        }
        let mut csv = Vec::new();
        entry
            .read_to_end(&mut csv)
            .map_err(|e| FetchError::Decode(format!("report archive: {}", e)))?;
        return Ok(csv);
    }
    Err(FetchError::Decode("report archive holds no CSV".to_string()))
}
