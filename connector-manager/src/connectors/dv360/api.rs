use adsync::oauth::GOOGLE_TOKEN_URL;
use adsync::FetchError;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use super::config::{API_VERSION, BASE_URL};
use crate::connectors::{access_token_from_refresh, send_bytes, send_json};
use crate::types::{Credentials, Session};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedQuery {
    pub query_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub key: ReportKey,
    #[serde(default)]
    pub metadata: ReportMetadata,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportKey {
    pub query_id: String,
    pub report_id: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ReportMetadata {
    #[serde(default)]
    pub status: Option<ReportState>,
    #[serde(default)]
    pub google_cloud_storage_path: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ReportState {
    #[serde(default)]
    pub state: String,
}

impl Report {
    pub fn state(&self) -> &str {
        self.metadata
            .status
            .as_ref()
            .map(|s| s.state.as_str())
            .unwrap_or("")
    }
}

/// HTTP client for the Bid Manager (DV360 reporting) API.
pub struct Dv360Client {
    http_client: Client,
    base_url: String,
    token_url: String,
}

impl Dv360Client {
    pub fn new(http_client: Client) -> Self {
        Self {
            http_client,
            base_url: BASE_URL.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
        }
    }

    /// API and token endpoint (`{base_url}/token`) on one server.
    pub fn with_base_url(http_client: Client, base_url: String) -> Self {
        Self {
            http_client,
            token_url: format!("{}/token", base_url),
            base_url,
        }
    }

    pub async fn access_token(&self, credentials: &Credentials) -> Result<String, FetchError> {
        access_token_from_refresh(&self.http_client, &self.token_url, credentials, None).await
    }

    pub async fn create_query(&self, session: &Session, body: &Value) -> Result<String, FetchError> {
        let url = format!("{}/{}/queries", self.base_url, API_VERSION);
        let value = send_json(
            self.http_client
                .post(&url)
                .bearer_auth(&session.access_token)
                .json(body),
        )
        .await?;
        let created: CreatedQuery =
            serde_json::from_value(value).map_err(|e| FetchError::Decode(e.to_string()))?;
        Ok(created.query_id)
    }

    /// Starts a report for `query_id` over `data_range`.
    pub async fn run_query(
        &self,
        session: &Session,
        query_id: &str,
        data_range: &Value,
    ) -> Result<Report, FetchError> {
        let url = format!("{}/{}/queries/{}:run", self.base_url, API_VERSION, query_id);
        let value = send_json(
            self.http_client
                .post(&url)
                .bearer_auth(&session.access_token)
                .json(&json!({ "dataRange": data_range })),
        )
        .await?;
        serde_json::from_value(value).map_err(|e| FetchError::Decode(e.to_string()))
    }

    pub async fn get_report(
        &self,
        session: &Session,
        query_id: &str,
        report_id: &str,
    ) -> Result<Report, FetchError> {
        let url = format!(
            "{}/{}/queries/{}/reports/{}",
            self.base_url, API_VERSION, query_id, report_id
        );
        let value = send_json(self.http_client.get(&url).bearer_auth(&session.access_token)).await?;
        serde_json::from_value(value).map_err(|e| FetchError::Decode(e.to_string()))
    }

    /// The storage path is a signed URL; no bearer token is sent.
    pub async fn download(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        send_bytes(self.http_client.get(url)).await
    }
}
