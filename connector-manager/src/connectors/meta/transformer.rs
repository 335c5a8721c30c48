use serde_json::Value;

/// Lowercases the `publisher_platform` breakdown value.
pub fn insight_to_record(mut record: Value) -> Value {
    if let Some(platform) = record
        .get("publisher_platform")
        .and_then(|v| v.as_str().map(|s| s.trim().to_lowercase()))
    {
        record["publisher_platform"] = Value::String(platform);
    }
    record
}
