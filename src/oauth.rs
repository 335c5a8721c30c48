//! OAuth 2.0 refresh-token grant, shared by connectors that mint short-lived
//! access tokens and by the secret refresher.

use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Standard OAuth 2.0 token response.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub token_type: Option<String>,
}

impl TokenResponse {
    pub fn expires_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.expires_in.map(|secs| now + Duration::seconds(secs))
    }
}

#[derive(Deserialize, Debug, Default)]
struct OAuthErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Error, Debug)]
pub enum TokenError {
    /// The refresh token was revoked or expired; it must be reissued by hand.
    #[error("invalid_grant: {0}")]
    InvalidGrant(String),

    #[error("token endpoint returned {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("token request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl TokenError {
    pub fn is_invalid_grant(&self) -> bool {
        matches!(self, TokenError::InvalidGrant(_))
    }
}

/// Client credentials plus the long-lived refresh token.
#[derive(Debug, Clone)]
pub struct RefreshGrant<'a> {
    pub token_url: &'a str,
    pub client_id: &'a str,
    pub client_secret: &'a str,
    pub refresh_token: &'a str,
    pub scope: Option<&'a str>,
}

/// POSTs `grant_type=refresh_token` to the token endpoint.
pub async fn refresh_access_token(
    client: &Client,
    grant: &RefreshGrant<'_>,
) -> Result<TokenResponse, TokenError> {
    let mut form: HashMap<&str, &str> = HashMap::new();
    form.insert("grant_type", "refresh_token");
    form.insert("refresh_token", grant.refresh_token);
    form.insert("client_id", grant.client_id);
    form.insert("client_secret", grant.client_secret);
    if let Some(scope) = grant.scope {
        form.insert("scope", scope);
    }

    debug!(token_url = %grant.token_url, "Refreshing OAuth access token");

    let response = client
        .post(grant.token_url)
        .header("Accept", "application/json")
        .form(&form)
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        return Err(classify_failure(status, &body));
    }

    Ok(response.json::<TokenResponse>().await?)
}

fn classify_failure(status: u16, body: &str) -> TokenError {
    let parsed: OAuthErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = parsed
        .error_description
        .clone()
        .or_else(|| parsed.error.clone())
        .unwrap_or_else(|| body.to_string());

    if parsed.error.as_deref() == Some("invalid_grant") {
        TokenError::InvalidGrant(message)
    } else {
        TokenError::Rejected { status, message }
    }
}
