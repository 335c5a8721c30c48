//! Fetch error taxonomy. Retry decisions are driven by [`FetchError::is_transient`].

use crate::model::ValidationError;
use reqwest::StatusCode;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while talking to a vendor API.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("invalid request: {0}")]
    Validation(#[from] ValidationError),

    /// Vendor rejected the credentials.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Vendor asked us to slow down.
    #[error("rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },

    /// 5xx responses and other failures worth another attempt.
    #[error("transient failure: {0}")]
    Transient(String),

    #[error("report job did not finish within {0:?}")]
    ReportTimeout(Duration),

    #[error("report job failed: {0}")]
    ReportFailed(String),

    /// Non-retryable vendor error payload.
    #[error("vendor error: {0}")]
    Vendor(String),

    #[error("failed to decode vendor response: {0}")]
    Decode(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<FetchError>,
    },

    #[error("{0} is not supported by this connector")]
    Unsupported(&'static str),
}

/// Coarse category reported back to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Auth,
    Transient,
    Vendor,
    Load,
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::RateLimited { .. } | FetchError::Transient(_) => true,
            FetchError::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status()
                        .map(|s| s.is_server_error() || s == StatusCode::TOO_MANY_REQUESTS)
                        .unwrap_or(false)
            }
            _ => false,
        }
    }

    /// Delay requested by the vendor, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            FetchError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchError::Validation(_) => ErrorKind::Validation,
            FetchError::Auth(_) => ErrorKind::Auth,
            FetchError::RetriesExhausted { .. } | FetchError::ReportTimeout(_) => {
                ErrorKind::Transient
            }
            e if e.is_transient() => ErrorKind::Transient,
            _ => ErrorKind::Vendor,
        }
    }

    /// Maps a non-2xx HTTP status to the taxonomy.
    ///
    /// - 401/403 → auth
    /// - 429 → rate limit (honours `Retry-After` seconds)
    /// - 5xx, 408 → transient
    /// - anything else → vendor error
    pub fn from_status(status: StatusCode, retry_after: Option<&str>, body: &str) -> Self {
        let message = format!("{}: {}", status, truncate(body, 500));
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => FetchError::Auth(message),
            StatusCode::TOO_MANY_REQUESTS => FetchError::RateLimited {
                message,
                retry_after: retry_after
                    .and_then(|v| v.trim().parse::<u64>().ok())
                    .map(Duration::from_secs),
            },
            s if s.is_server_error() || s == StatusCode::REQUEST_TIMEOUT => {
                FetchError::Transient(message)
            }
            _ => FetchError::Vendor(message),
        }
    }
}

/// Reads the body of a failed response and classifies it.
pub async fn error_for_response(response: reqwest::Response) -> FetchError {
    let status = response.status();
    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = response.text().await.unwrap_or_default();
    FetchError::from_status(status, retry_after.as_deref(), &body)
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
