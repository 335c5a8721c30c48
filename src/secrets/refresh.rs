//! Secret refresher: reads a stored credential, refreshes it at the vendor
//! and writes the merged result back as a new version.
//!
//! ```text
//! Idle → Fetching → Refreshing → Persisting → Done
//!                 ↘ UpToDate
//!   (any step) → Failed
//! ```

use super::store::SecretStore;
use crate::oauth::{self, RefreshGrant, TokenError, GOOGLE_TOKEN_URL};
use chrono::{DateTime, Duration, NaiveDateTime, SecondsFormat, Utc};
use reqwest::Client;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

pub const META_GRAPH_URL: &str = "https://graph.facebook.com";
const META_GRAPH_VERSION: &str = "v23.0";
const META_INVALID_TOKEN_CODE: i64 = 190;
const META_DEFAULT_LIFETIME_DAYS: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Meta,
    Google,
}

impl Platform {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "meta" | "facebook" => Some(Platform::Meta),
            "google" | "google_ads" | "dv360" => Some(Platform::Google),
            _ => None,
        }
    }

    /// Fields the refresh call cannot do without.
    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            Platform::Meta => &["access_token", "app_id", "app_secret"],
            Platform::Google => &["refresh_token", "client_id", "client_secret"],
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Meta => write!(f, "meta"),
            Platform::Google => write!(f, "google"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshState {
    Idle,
    Fetching,
    Refreshing,
    UpToDate,
    Persisting,
    Done,
    Failed,
}

/// Body of `POST /refresh`.
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshRequest {
    pub secret_id: String,
    pub project_id: String,
    pub platform: String,
    #[serde(default, deserialize_with = "loose_bool")]
    pub force_refresh: bool,
}

/// Accepts `true`, `"true"`, `"1"`, `"yes"` and `1`.
fn loose_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(b) => b,
        Value::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes"),
        Value::Number(n) => n.as_i64() == Some(1),
        _ => false,
    })
}

#[derive(Error, Debug)]
pub enum RefreshError {
    #[error("unknown platform '{0}'")]
    UnknownPlatform(String),

    #[error("secret {project_id}/{secret_id} has no enabled version")]
    NotFound { project_id: String, secret_id: String },

    #[error("secret payload is not a JSON object")]
    NotAnObject,

    #[error("secret is missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<String>),

    /// The stored credential can no longer be refreshed and must be reissued.
    #[error("invalid_grant: {0}")]
    InvalidGrant(String),

    #[error("vendor refresh failed: {0}")]
    Vendor(String),

    #[error("secret storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl RefreshError {
    pub fn kind(&self) -> &'static str {
        match self {
            RefreshError::InvalidGrant(_) => "invalid_grant",
            RefreshError::UnknownPlatform(_) | RefreshError::MissingFields(_) => "validation",
            _ => "error",
        }
    }
}

impl From<TokenError> for RefreshError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::InvalidGrant(msg) => RefreshError::InvalidGrant(msg),
            other => RefreshError::Vendor(other.to_string()),
        }
    }
}

/// Structured result; refresh failures never escape as errors.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshOutcome {
    pub success: bool,
    pub state: RefreshState,
    pub refreshed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

struct Tracker<'a> {
    state: RefreshState,
    request: &'a RefreshRequest,
}

impl Tracker<'_> {
    fn enter(&mut self, next: RefreshState) {
        debug!(
            secret_id = %self.request.secret_id,
            from = ?self.state,
            to = ?next,
            "Refresh state transition"
        );
        self.state = next;
    }
}

pub struct SecretRefresher {
    store: Arc<SecretStore>,
    http_client: Client,
    meta_graph_url: String,
    google_token_url: Option<String>,
}

impl SecretRefresher {
    pub fn new(store: Arc<SecretStore>, http_client: Client) -> Self {
        Self {
            store,
            http_client,
            meta_graph_url: META_GRAPH_URL.to_string(),
            google_token_url: None,
        }
    }

    /// Points both vendor endpoints at a custom base URL (for testing).
    pub fn with_base_url(store: Arc<SecretStore>, http_client: Client, base_url: String) -> Self {
        Self {
            store,
            http_client,
            google_token_url: Some(format!("{}/token", base_url)),
            meta_graph_url: base_url,
        }
    }

    pub async fn refresh(&self, request: &RefreshRequest) -> RefreshOutcome {
        let mut tracker = Tracker {
            state: RefreshState::Idle,
            request,
        };

        match self.run(request, &mut tracker).await {
            Ok((version, refreshed)) => {
                info!(
                    secret_id = %request.secret_id,
                    project_id = %request.project_id,
                    platform = %request.platform,
                    version = version,
                    refreshed = refreshed,
                    "Secret refresh finished"
                );
                RefreshOutcome {
                    success: true,
                    state: tracker.state,
                    refreshed,
                    version: Some(version),
                    error_kind: None,
                    message: None,
                }
            }
            Err(e) => {
                let failed_in = tracker.state;
                tracker.enter(RefreshState::Failed);
                if matches!(e, RefreshError::InvalidGrant(_)) {
                    error!(
                        secret_id = %request.secret_id,
                        platform = %request.platform,
                        error = %e,
                        "Stored credential was rejected; it must be reissued manually"
                    );
                } else {
                    warn!(
                        secret_id = %request.secret_id,
                        platform = %request.platform,
                        state = ?failed_in,
                        error = %e,
                        "Secret refresh failed"
                    );
                }
                RefreshOutcome {
                    success: false,
                    state: RefreshState::Failed,
                    refreshed: false,
                    version: None,
                    error_kind: Some(e.kind().to_string()),
                    message: Some(e.to_string()),
                }
            }
        }
    }

    async fn run(
        &self,
        request: &RefreshRequest,
        tracker: &mut Tracker<'_>,
    ) -> Result<(u32, bool), RefreshError> {
        let platform = Platform::parse(&request.platform)
            .ok_or_else(|| RefreshError::UnknownPlatform(request.platform.clone()))?;

        tracker.enter(RefreshState::Fetching);
        let current = self
            .store
            .access(&request.project_id, &request.secret_id, None)?
            .ok_or_else(|| RefreshError::NotFound {
                project_id: request.project_id.clone(),
                secret_id: request.secret_id.clone(),
            })?;
        let payload = match current.payload {
            Value::Object(map) => map,
            _ => return Err(RefreshError::NotAnObject),
        };
        check_required(&payload, platform)?;

        let now = Utc::now();
        if !request.force_refresh && !is_expired(&payload, platform, now) {
            tracker.enter(RefreshState::UpToDate);
            return Ok((current.version, false));
        }

        tracker.enter(RefreshState::Refreshing);
        let refreshed = match platform {
            Platform::Meta => self.refresh_meta(&payload, now).await?,
            Platform::Google => self.refresh_google(&payload, now).await?,
        };

        tracker.enter(RefreshState::Persisting);
        let version = self
            .store
            .update(&request.project_id, &request.secret_id, &Value::Object(refreshed))?;

        tracker.enter(RefreshState::Done);
        Ok((version, true))
    }

    async fn refresh_meta(&self, payload: &Map<String, Value>, now: DateTime<Utc>) -> Result<Map<String, Value>, RefreshError> {
        let url = format!("{}/{}/oauth/access_token", self.meta_graph_url, META_GRAPH_VERSION);
        let response = self
            .http_client
            .get(&url)
            .query(&[
                ("grant_type", "fb_exchange_token"),
                ("client_id", field(payload, "app_id")),
                ("client_secret", field(payload, "app_secret")),
                ("fb_exchange_token", field(payload, "access_token")),
                ("set_token_expires_in_60_days", "true"),
            ])
            .send()
            .await
            .map_err(|e| RefreshError::Vendor(e.to_string()))?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| RefreshError::Vendor(format!("unreadable token response: {}", e)))?;

        if let Some(err) = body.get("error") {
            let message = err
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            if err.get("code").and_then(Value::as_i64) == Some(META_INVALID_TOKEN_CODE) {
                return Err(RefreshError::InvalidGrant(message));
            }
            return Err(RefreshError::Vendor(format!("{}: {}", status, message)));
        }
        if !status.is_success() {
            return Err(RefreshError::Vendor(format!("token exchange returned {}", status)));
        }

        let access_token = body
            .get("access_token")
            .and_then(Value::as_str)
            .ok_or_else(|| RefreshError::Vendor("token response has no access_token".to_string()))?;
        let lifetime = body
            .get("expires_in")
            .and_then(Value::as_i64)
            .map(Duration::seconds)
            .unwrap_or_else(|| Duration::days(META_DEFAULT_LIFETIME_DAYS));

        // Expiry is only tracked for documents that already carry it.
        let mut merged = payload.clone();
        merged.insert("access_token".to_string(), Value::String(access_token.to_string()));
        if merged.contains_key("expires_at") {
            merged.insert("expires_at".to_string(), Value::String(format_expiry(now + lifetime)));
        }
        Ok(merged)
    }

    async fn refresh_google(&self, payload: &Map<String, Value>, now: DateTime<Utc>) -> Result<Map<String, Value>, RefreshError> {
        let token_url = self
            .google_token_url
            .as_deref()
            .or_else(|| payload.get("token_uri").and_then(Value::as_str))
            .unwrap_or(GOOGLE_TOKEN_URL);

        let grant = RefreshGrant {
            token_url,
            client_id: field(payload, "client_id"),
            client_secret: field(payload, "client_secret"),
            refresh_token: field(payload, "refresh_token"),
            scope: None,
        };
        let token = oauth::refresh_access_token(&self.http_client, &grant).await?;

        let mut merged = payload.clone();
        merged.insert("token".to_string(), Value::String(token.access_token.clone()));
        if let Some(expiry) = token.expires_at(now) {
            merged.insert("expiry".to_string(), Value::String(format_expiry(expiry)));
        }
        if let Some(rotated) = token.refresh_token {
            merged.insert("refresh_token".to_string(), Value::String(rotated));
        }
        Ok(merged)
    }
}

fn field<'a>(payload: &'a Map<String, Value>, name: &str) -> &'a str {
    payload.get(name).and_then(Value::as_str).unwrap_or_default()
}

fn check_required(payload: &Map<String, Value>, platform: Platform) -> Result<(), RefreshError> {
    let missing: Vec<String> = platform
        .required_fields()
        .iter()
        .filter(|f| field(payload, f).trim().is_empty())
        .map(|f| f.to_string())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(RefreshError::MissingFields(missing))
    }
}

/// A credential with no recorded expiry counts as unexpired. An expiry we
/// cannot parse counts as expired.
fn is_expired(payload: &Map<String, Value>, platform: Platform, now: DateTime<Utc>) -> bool {
    let key = match platform {
        Platform::Meta => "expires_at",
        Platform::Google => "expiry",
    };
    match payload.get(key).and_then(Value::as_str) {
        None => false,
        Some(raw) => parse_expiry(raw).map_or(true, |at| at <= now),
    }
}

fn parse_expiry(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|dt| dt.and_utc())
        })
}

fn format_expiry(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn make_store() -> Arc<SecretStore> {
        Arc::new(SecretStore::new(":memory:", &BASE64.encode([0u8; 32])).unwrap())
    }

    fn request(platform: &str, force: bool) -> RefreshRequest {
        RefreshRequest {
            secret_id: "creds".to_string(),
            project_id: "proj".to_string(),
            platform: platform.to_string(),
            force_refresh: force,
        }
    }

    #[test]
    fn test_force_refresh_accepts_strings() {
        let req: RefreshRequest = serde_json::from_value(json!({
            "secret_id": "s", "project_id": "p", "platform": "meta", "force_refresh": "True"
        }))
        .unwrap();
        assert!(req.force_refresh);

        let req: RefreshRequest = serde_json::from_value(json!({
            "secret_id": "s", "project_id": "p", "platform": "meta"
        }))
        .unwrap();
        assert!(!req.force_refresh);
    }

    #[test]
    fn test_expiry_detection() {
        let now = Utc::now();
        let past = json!({"expiry": "2020-01-01T00:00:00Z"});
        let future = json!({"expiry": format_expiry(now + Duration::hours(1))});
        let fractional = json!({"expiry": "2020-01-01T00:00:00.123456"});
        let none = json!({});

        let map = |v: Value| v.as_object().cloned().unwrap();
        assert!(is_expired(&map(past), Platform::Google, now));
        assert!(!is_expired(&map(future), Platform::Google, now));
        assert!(is_expired(&map(fractional), Platform::Google, now));
        assert!(!is_expired(&map(none), Platform::Meta, now));
    }

    #[tokio::test]
    async fn test_meta_forced_refresh_persists_new_version() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/v23.0/oauth/access_token")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "fb_exchange_token".into()),
                Matcher::UrlEncoded("client_id".into(), "1".into()),
                Matcher::UrlEncoded("client_secret".into(), "S".into()),
                Matcher::UrlEncoded("fb_exchange_token".into(), "A".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"B","token_type":"bearer"}"#)
            .create_async()
            .await;

        let store = make_store();
        store
            .add_version("proj", "creds", &json!({"access_token": "A", "app_id": "1", "app_secret": "S"}))
            .unwrap();

        let refresher = SecretRefresher::with_base_url(Arc::clone(&store), Client::new(), server.url());
        let outcome = refresher.refresh(&request("meta", true)).await;

        assert!(outcome.success, "{:?}", outcome.message);
        assert_eq!(outcome.state, RefreshState::Done);
        assert_eq!(outcome.version, Some(2));

        let latest = store.access("proj", "creds", None).unwrap().unwrap();
        assert_eq!(
            latest.payload,
            json!({"access_token": "B", "app_id": "1", "app_secret": "S"})
        );
        assert!(store.access("proj", "creds", Some(1)).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_meta_refresh_renews_tracked_expiry() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/v23.0/oauth/access_token")
            .match_query(Matcher::UrlEncoded("set_token_expires_in_60_days".into(), "true".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"B","token_type":"bearer","expires_in":5184000}"#)
            .create_async()
            .await;

        let store = make_store();
        store
            .add_version(
                "proj",
                "creds",
                &json!({"access_token": "A", "app_id": "1", "app_secret": "S", "expires_at": "2020-01-01T00:00:00Z"}),
            )
            .unwrap();

        let refresher = SecretRefresher::with_base_url(Arc::clone(&store), Client::new(), server.url());
        let outcome = refresher.refresh(&request("meta", false)).await;
        assert!(outcome.success, "{:?}", outcome.message);

        let latest = store.access("proj", "creds", None).unwrap().unwrap();
        assert_eq!(latest.payload["access_token"], "B");
        let renewed = parse_expiry(latest.payload["expires_at"].as_str().unwrap()).unwrap();
        assert!(renewed > Utc::now() + Duration::days(59));
    }

    #[tokio::test]
    async fn test_meta_without_force_is_up_to_date() {
        let store = make_store();
        store
            .add_version("proj", "creds", &json!({"access_token": "A", "app_id": "1", "app_secret": "S"}))
            .unwrap();

        let refresher = SecretRefresher::with_base_url(
            Arc::clone(&store),
            Client::new(),
            "http://127.0.0.1:9".to_string(),
        );
        let outcome = refresher.refresh(&request("meta", false)).await;

        assert!(outcome.success);
        assert!(!outcome.refreshed);
        assert_eq!(outcome.state, RefreshState::UpToDate);
        assert_eq!(outcome.version, Some(1));
    }

    #[tokio::test]
    async fn test_meta_invalid_token_reports_invalid_grant() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", Matcher::Regex("^/v23.0/oauth/access_token".to_string()))
            .with_status(400)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":{"message":"Error validating access token","type":"OAuthException","code":190}}"#)
            .create_async()
            .await;

        let store = make_store();
        store
            .add_version("proj", "creds", &json!({"access_token": "A", "app_id": "1", "app_secret": "S"}))
            .unwrap();

        let refresher = SecretRefresher::with_base_url(Arc::clone(&store), Client::new(), server.url());
        let outcome = refresher.refresh(&request("meta", true)).await;

        assert!(!outcome.success);
        assert_eq!(outcome.state, RefreshState::Failed);
        assert_eq!(outcome.error_kind.as_deref(), Some("invalid_grant"));
        // Nothing persisted on failure.
        assert_eq!(store.latest_version("proj", "creds").unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_google_refresh_merges_and_keeps_refresh_token() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"ya29.new","expires_in":3599}"#)
            .create_async()
            .await;

        let store = make_store();
        store
            .add_version(
                "proj",
                "creds",
                &json!({
                    "token": "ya29.old",
                    "refresh_token": "1//r",
                    "client_id": "cid",
                    "client_secret": "cs",
                    "scopes": ["https://www.googleapis.com/auth/adwords"],
                    "expiry": "2020-01-01T00:00:00Z"
                }),
            )
            .unwrap();

        let refresher = SecretRefresher::with_base_url(Arc::clone(&store), Client::new(), server.url());
        let outcome = refresher.refresh(&request("google", false)).await;
        assert!(outcome.success, "{:?}", outcome.message);
        assert!(outcome.refreshed);

        let latest = store.access("proj", "creds", None).unwrap().unwrap().payload;
        assert_eq!(latest["token"], "ya29.new");
        assert_eq!(latest["refresh_token"], "1//r");
        assert_eq!(latest["scopes"][0], "https://www.googleapis.com/auth/adwords");
        assert_ne!(latest["expiry"], "2020-01-01T00:00:00Z");
    }

    #[tokio::test]
    async fn test_missing_fields_fail_without_calling_vendor() {
        let store = make_store();
        store
            .add_version("proj", "creds", &json!({"refresh_token": "r"}))
            .unwrap();

        let refresher = SecretRefresher::new(Arc::clone(&store), Client::new());
        let outcome = refresher.refresh(&request("google", true)).await;
        assert!(!outcome.success);
        let message = outcome.message.unwrap();
        assert!(message.contains("client_id"));
        assert!(message.contains("client_secret"));
    }

    #[tokio::test]
    async fn test_unknown_secret_and_platform() {
        let refresher = SecretRefresher::new(make_store(), Client::new());

        let outcome = refresher.refresh(&request("meta", true)).await;
        assert!(!outcome.success);
        assert!(outcome.message.unwrap().contains("no enabled version"));

        let outcome = refresher.refresh(&request("snapchat", true)).await;
        assert_eq!(outcome.error_kind.as_deref(), Some("validation"));
    }
}
