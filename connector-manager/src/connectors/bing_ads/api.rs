use adsync::FetchError;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};

use super::config::{AUTH_ERROR_CODES, BASE_URL, POLL_PATH, RATE_LIMIT_ERROR_CODE, SCOPE, SUBMIT_PATH, TOKEN_URL};
use crate::connectors::{access_token_from_refresh, send_bytes, with_session_headers};
use crate::types::{Credentials, Session};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SubmitResponse {
    pub report_request_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PollResponse {
    pub report_request_status: ReportRequestStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReportRequestStatus {
    pub status: String,
    /// Null when the report finished without data.
    #[serde(default)]
    pub report_download_url: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
struct FaultBody {
    #[serde(default)]
    errors: Vec<FaultDetail>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct FaultDetail {
    #[serde(default)]
    error_code: String,
    #[serde(default)]
    message: String,
}

/// HTTP client for the Microsoft Advertising REST reporting service.
pub struct BingClient {
    http_client: Client,
    base_url: String,
    token_url: String,
}

impl BingClient {
    pub fn new(http_client: Client) -> Self {
        Self {
            http_client,
            base_url: BASE_URL.to_string(),
            token_url: TOKEN_URL.to_string(),
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
        access_token_from_refresh(&self.http_client, &self.token_url, credentials, Some(SCOPE)).await
    }

    pub async fn submit(
        &self,
        session: &Session,
        account_id: &str,
        report_request: &Value,
    ) -> Result<String, FetchError> {
        let builder = self
            .http_client
            .post(format!("{}{}", self.base_url, SUBMIT_PATH))
            .bearer_auth(&session.access_token)
            .header("CustomerAccountId", account_id)
            .json(&json!({ "ReportRequest": report_request }));
        let body = read_response(with_session_headers(builder, session).send().await?).await?;
        let submitted: SubmitResponse =
            serde_json::from_value(body).map_err(|e| FetchError::Decode(e.to_string()))?;
        Ok(submitted.report_request_id)
    }

    pub async fn poll(&self, session: &Session, report_request_id: &str) -> Result<ReportRequestStatus, FetchError> {
        let builder = self
            .http_client
            .post(format!("{}{}", self.base_url, POLL_PATH))
            .bearer_auth(&session.access_token)
            .json(&json!({ "ReportRequestId": report_request_id }));
        let body = read_response(with_session_headers(builder, session).send().await?).await?;
        let polled: PollResponse =
            serde_json::from_value(body).map_err(|e| FetchError::Decode(e.to_string()))?;
        Ok(polled.report_request_status)
    }

    /// Download URLs are pre-signed.
    pub async fn download(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        send_bytes(self.http_client.get(url)).await
    }
}

async fn read_response(response: reqwest::Response) -> Result<Value, FetchError> {
    let status = response.status();
    let text = response.text().await?;
    if !status.is_success() {
        return Err(classify_error(status, &text));
    }
    serde_json::from_str(&text).map_err(|e| FetchError::Decode(e.to_string()))
}

/// Faults list `ErrorCode`s that say more than the HTTP status.
pub fn classify_error(status: StatusCode, body: &str) -> FetchError {
    let fault: FaultBody = serde_json::from_str(body).unwrap_or_default();
    let message = fault
        .errors
        .iter()
        .map(|e| format!("{}: {}", e.error_code, e.message))
        .collect::<Vec<_>>()
        .join("; ");
    let message = if message.is_empty() {
        fault.message.clone().unwrap_or_else(|| body.to_string())
    } else {
        message
    };

    if fault.errors.iter().any(|e| e.error_code == RATE_LIMIT_ERROR_CODE) {
        return FetchError::RateLimited {
            message,
            retry_after: None,
        };
    }
    if fault
        .errors
        .iter()
        .any(|e| AUTH_ERROR_CODES.contains(&e.error_code.as_str()))
    {
        return FetchError::Auth(message);
    }
    FetchError::from_status(status, None, &message)
}
