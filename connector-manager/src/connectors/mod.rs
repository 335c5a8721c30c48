pub mod bing_ads;
pub mod dv360;
pub mod google_ads;
pub mod meta;
pub mod report_csv;
pub mod tiktok;

use crate::types::{Credentials, Session};
use adsync::error::error_for_response;
use adsync::oauth::{refresh_access_token, RefreshGrant, TokenError};
use adsync::FetchError;
use reqwest::{Client, RequestBuilder};
use serde_json::Value;

/// Adds the session's extra headers to a vendor request.
pub(crate) fn with_session_headers(mut builder: RequestBuilder, session: &Session) -> RequestBuilder {
    for (name, value) in &session.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
}

/// Sends a request and decodes a JSON body. Non-2xx statuses are
/// classified with [`error_for_response`].
pub(crate) async fn send_json(builder: RequestBuilder) -> Result<Value, FetchError> {
    let response = builder.send().await?;
    if !response.status().is_success() {
        return Err(error_for_response(response).await);
    }
    let text = response.text().await?;
    serde_json::from_str(&text).map_err(|e| FetchError::Decode(e.to_string()))
}

/// Sends a request and returns the raw body bytes.
pub(crate) async fn send_bytes(builder: RequestBuilder) -> Result<Vec<u8>, FetchError> {
    let response = builder.send().await?;
    if !response.status().is_success() {
        return Err(error_for_response(response).await);
    }
    Ok(response.bytes().await?.to_vec())
}

/// Mints an access token from `client_id`, `client_secret` and
/// `refresh_token` in the credentials.
pub(crate) async fn access_token_from_refresh(
    http_client: &Client,
    token_url: &str,
    credentials: &Credentials,
    scope: Option<&str>,
) -> Result<String, FetchError> {
    let client_id = credentials.require("client_id")?;
    let client_secret = credentials.require("client_secret")?;
    let refresh_token = credentials.require("refresh_token")?;

    let grant = RefreshGrant {
        token_url,
        client_id: &client_id,
        client_secret: &client_secret,
        refresh_token: &refresh_token,
        scope,
    };
    let token = refresh_access_token(http_client, &grant)
        .await
        .map_err(token_error)?;
    Ok(token.access_token)
}

/// Maps an OAuth refresh failure to the fetch taxonomy.
fn token_error(err: TokenError) -> FetchError {
    match err {
        TokenError::InvalidGrant(msg) => FetchError::Auth(format!("invalid_grant: {}", msg)),
        TokenError::Rejected { status, message } if status >= 500 => {
            FetchError::Transient(format!("token endpoint returned {}: {}", status, message))
        }
        TokenError::Rejected { status, message } => {
            FetchError::Auth(format!("token endpoint returned {}: {}", status, message))
        }
        TokenError::Http(e) => FetchError::Http(e),
    }
}
