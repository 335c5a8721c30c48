use adsync::oauth::GOOGLE_TOKEN_URL;
use adsync::FetchError;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use super::config::{API_VERSION, BASE_URL};
use crate::connectors::{access_token_from_refresh, send_json, with_session_headers};
use crate::types::{Credentials, Session};

/// One page of `googleAds:search`.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SearchPage {
    #[serde(default)]
    pub results: Vec<Value>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// HTTP client for the Google Ads REST search endpoint.
pub struct GoogleAdsClient {
    http_client: Client,
    base_url: String,
    token_url: String,
}

impl GoogleAdsClient {
    pub fn new(http_client: Client) -> Self {
        Self {
            http_client,
            base_url: BASE_URL.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
        }
    }

    /// Points both the API and the token endpoint (`{base_url}/token`) at
    /// one server.
    pub fn with_base_url(http_client: Client, base_url: String) -> Self {
        Self {
            http_client,
            token_url: format!("{}/token", base_url),
            base_url,
        }
    }

    /// Exchanges the stored refresh token for a short-lived access token.
    pub async fn access_token(&self, credentials: &Credentials) -> Result<String, FetchError> {
        access_token_from_refresh(&self.http_client, &self.token_url, credentials, None).await
    }

    pub async fn search(
        &self,
        session: &Session,
        customer_id: &str,
        query: &str,
        page_token: Option<&str>,
    ) -> Result<SearchPage, FetchError> {
        let url = format!(
            "{}/{}/customers/{}/googleAds:search",
            self.base_url, API_VERSION, customer_id
        );
        let mut body = json!({ "query": query });
        if let Some(token) = page_token {
            body["pageToken"] = Value::String(token.to_string());
        }

        let builder = self
            .http_client
            .post(&url)
            .bearer_auth(&session.access_token)
            .json(&body);
        let value = send_json(with_session_headers(builder, session)).await?;
        serde_json::from_value(value).map_err(|e| FetchError::Decode(e.to_string()))
    }
}
