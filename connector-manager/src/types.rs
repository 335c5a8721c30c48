use adsync::ValidationError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// How a connector produces pages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStyle {
    /// Each response carries the cursor for the next one.
    Cursor,
    /// Submit a report job, poll it, download one artifact.
    ReportJob,
}

/// Credential fields for one run: the job payload merged over any stored
/// secret.
#[derive(Clone, Debug, Default)]
pub struct Credentials(Map<String, Value>);

impl Credentials {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// A non-empty string field. Numbers are accepted and stringified.
    pub fn get(&self, name: &str) -> Option<String> {
        match self.0.get(name) {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn require(&self, name: &str) -> Result<String, ValidationError> {
        self.get(name)
            .ok_or_else(|| ValidationError::MissingParameter(name.to_string()))
    }

    /// Names from `fields` that are absent or empty.
    pub fn missing(&self, fields: &[&str]) -> Vec<String> {
        fields
            .iter()
            .filter(|f| self.get(f).is_none())
            .map(|f| f.to_string())
            .collect()
    }
}

/// An authenticated context for one account's fetch.
#[derive(Clone, Debug, Default)]
pub struct Session {
    pub access_token: String,
    /// Extra per-request headers (developer tokens, customer ids).
    pub headers: HashMap<String, String>,
}

impl Session {
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            headers: HashMap::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_string(), value.into());
        self
    }
}

/// One round-trip's worth of records.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Page {
    pub records: Vec<Value>,
    pub next: Option<String>,
}

impl Page {
    pub fn last(records: Vec<Value>) -> Self {
        Self { records, next: None }
    }
}

/// Handle for a submitted asynchronous report.
#[derive(Clone, Debug, PartialEq)]
pub struct ReportJob {
    pub id: String,
    /// Owning resource, e.g. the DV360 query a report belongs to.
    pub parent: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ReportStatus {
    Pending,
    /// Finished. `artifact` is where to download the result, if any was produced.
    Done { artifact: Option<String> },
    Failed(String),
}
