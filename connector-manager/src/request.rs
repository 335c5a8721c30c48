//! Parsing of the `POST /run/:connector` payload.

use crate::types::Credentials;
use adsync::{AccountScope, FetchWindow, ValidationError, WriteMode};
use chrono::NaiveDate;
use serde_json::{Map, Value};

/// The raw job parameters with typed accessors.
#[derive(Clone, Debug, Default)]
pub struct RunParams(Map<String, Value>);

impl RunParams {
    pub fn from_value(value: Value) -> Result<Self, ValidationError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            _ => Err(ValidationError::InvalidParameter {
                name: "body".to_string(),
                reason: "expected a JSON object".to_string(),
            }),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// A non-empty string (numbers are stringified).
    pub fn optional_str(&self, name: &str) -> Option<String> {
        match self.0.get(name) {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn required_str(&self, name: &str) -> Result<String, ValidationError> {
        self.optional_str(name)
            .ok_or_else(|| ValidationError::MissingParameter(name.to_string()))
    }

    /// Accepts a list or a comma-separated string. Empty entries are dropped.
    pub fn string_list(&self, name: &str) -> Option<Vec<String>> {
        let items: Vec<String> = match self.0.get(name)? {
            Value::String(s) => s.split(',').map(|p| p.trim().to_string()).collect(),
            Value::Array(values) => values
                .iter()
                .filter_map(|v| match v {
                    Value::String(s) => Some(s.trim().to_string()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .collect(),
            _ => return None,
        };
        let items: Vec<String> = items.into_iter().filter(|s| !s.is_empty()).collect();
        (!items.is_empty()).then_some(items)
    }

    /// Reads account ids from the first of `keys` that is present.
    pub fn accounts(&self, keys: &[&str]) -> Result<Vec<AccountScope>, ValidationError> {
        let Some(key) = keys.iter().find(|k| self.0.contains_key(**k)) else {
            return Err(ValidationError::MissingParameter(
                keys.first().copied().unwrap_or("account_ids").to_string(),
            ));
        };

        let raw: Vec<&Value> = match &self.0[*key] {
            Value::Array(values) => values.iter().collect(),
            other => vec![other],
        };

        let mut scopes = Vec::new();
        for value in raw {
            match value {
                Value::String(s) => {
                    for part in s.split(',').filter(|p| !p.trim().is_empty()) {
                        scopes.push(AccountScope::parse(part)?);
                    }
                }
                other => scopes.push(AccountScope::from_value(other)?),
            }
        }

        if scopes.is_empty() {
            return Err(ValidationError::InvalidParameter {
                name: key.to_string(),
                reason: "no account ids given".to_string(),
            });
        }
        Ok(scopes)
    }

    pub fn write_mode(&self) -> Result<WriteMode, ValidationError> {
        match self.optional_str("if_exists") {
            Some(mode) => WriteMode::parse(&mode),
            None => Ok(WriteMode::Append),
        }
    }

    pub fn window(&self, days: u32, today: NaiveDate, ends_today: bool) -> Result<FetchWindow, ValidationError> {
        FetchWindow::resolve(
            self.optional_str("start_date").as_deref(),
            self.optional_str("end_date").as_deref(),
            days,
            today,
            ends_today,
        )
    }

    /// Stored secret fields overlaid with the request's own fields.
    pub fn credentials(&self, stored: Option<&Map<String, Value>>) -> Credentials {
        let mut merged = stored.cloned().unwrap_or_default();
        for (k, v) in &self.0 {
            merged.insert(k.clone(), v.clone());
        }
        Credentials::new(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adsync::model::parse_date;
    use serde_json::json;

    fn params(v: Value) -> RunParams {
        RunParams::from_value(v).unwrap()
    }

    #[test]
    fn test_rejects_non_object_body() {
        assert!(RunParams::from_value(json!([1, 2])).is_err());
    }

    #[test]
    fn test_accounts_from_list_or_string() {
        let p = params(json!({"customer_ids": ["123-456-7890", 42]}));
        let ids: Vec<String> = p
            .accounts(&["customer_ids"])
            .unwrap()
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(ids, vec!["1234567890", "42"]);

        let p = params(json!({"account_list": "1, 2,3"}));
        assert_eq!(p.accounts(&["account_ids", "account_list"]).unwrap().len(), 3);
    }

    #[test]
    fn test_accounts_missing_or_empty() {
        let p = params(json!({}));
        assert_eq!(
            p.accounts(&["advertiser_ids"]),
            Err(ValidationError::MissingParameter("advertiser_ids".to_string()))
        );

        let p = params(json!({"advertiser_ids": []}));
        assert!(p.accounts(&["advertiser_ids"]).is_err());

        let p = params(json!({"advertiser_ids": ["-"]}));
        assert_eq!(p.accounts(&["advertiser_ids"]), Err(ValidationError::EmptyAccountId));
    }

    #[test]
    fn test_window_and_mode() {
        let p = params(json!({"start_date": "2025-01-01", "end_date": "2025-01-03", "if_exists": "replace"}));
        let w = p.window(3, parse_date("2025-02-01").unwrap(), false).unwrap();
        assert_eq!(w.start_date(), parse_date("2025-01-01").unwrap());
        assert_eq!(w.end_date(), parse_date("2025-01-03").unwrap());
        assert_eq!(p.write_mode().unwrap(), WriteMode::Replace);

        let p = params(json!({"if_exists": "upsert"}));
        assert!(p.write_mode().is_err());
    }

    #[test]
    fn test_string_list() {
        let p = params(json!({"fields": "a, b,,c", "empty": [], "cols": ["x", 1]}));
        assert_eq!(p.string_list("fields").unwrap(), vec!["a", "b", "c"]);
        assert_eq!(p.string_list("empty"), None);
        assert_eq!(p.string_list("cols").unwrap(), vec!["x", "1"]);
        assert_eq!(p.string_list("absent"), None);
    }

    #[test]
    fn test_request_fields_override_stored_secret() {
        let p = params(json!({"access_token": "fresh"}));
        let stored = json!({"access_token": "stale", "app_id": "1"});
        let creds = p.credentials(stored.as_object());
        assert_eq!(creds.get("access_token").as_deref(), Some("fresh"));
        assert_eq!(creds.get("app_id").as_deref(), Some("1"));
    }
}
