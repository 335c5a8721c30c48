use adsync::{FetchError, FetchWindow};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use super::config::{
    ReportLevel, AUTH_CODES, BASE_URL, DATE_DIMENSION, METRICS, PAGE_SIZE, RATE_LIMIT_CODE,
    REPORT_PATH,
};
use crate::connectors::{send_json, with_session_headers};
use crate::types::Session;

/// Business API envelope. Failures come back as HTTP 200 with `code != 0`.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Option<ReportData>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ReportData {
    #[serde(default)]
    pub list: Vec<Value>,
    #[serde(default)]
    pub page_info: Option<PageInfo>,
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct PageInfo {
    pub page: u32,
    #[serde(default)]
    pub total_page: u32,
}

/// HTTP client for the integrated report endpoint.
pub struct TikTokClient {
    http_client: Client,
    base_url: String,
}

impl TikTokClient {
    pub fn new(http_client: Client) -> Self {
        Self::with_base_url(http_client, BASE_URL.to_string())
    }

    pub fn with_base_url(http_client: Client, base_url: String) -> Self {
        Self {
            http_client,
            base_url,
        }
    }

    pub async fn fetch_report(
        &self,
        session: &Session,
        advertiser_id: &str,
        level: &ReportLevel,
        window: &FetchWindow,
        page: u32,
    ) -> Result<ReportData, FetchError> {
        let url = format!("{}{}", self.base_url, REPORT_PATH);
        let dimensions = serde_json::to_string(&[level.id_dimension, DATE_DIMENSION])
            .map_err(|e| FetchError::Decode(e.to_string()))?;
        let metrics = serde_json::to_string(METRICS).map_err(|e| FetchError::Decode(e.to_string()))?;

        let query: Vec<(&str, String)> = vec![
            ("advertiser_id", advertiser_id.to_string()),
            ("report_type", "BASIC".to_string()),
            ("data_level", level.data_level.to_string()),
            ("dimensions", dimensions),
            ("metrics", metrics),
            ("start_date", window.start_date().to_string()),
            ("end_date", window.end_date().to_string()),
            ("page", page.to_string()),
            ("page_size", PAGE_SIZE.to_string()),
        ];

        let builder = self.http_client.get(&url).query(&query);
        let body = send_json(with_session_headers(builder, session)).await?;
        let envelope: Envelope =
            serde_json::from_value(body).map_err(|e| FetchError::Decode(e.to_string()))?;
        into_data(envelope)
    }
}

/// Maps a non-zero `code` to the taxonomy.
pub fn into_data(envelope: Envelope) -> Result<ReportData, FetchError> {
    let message = format!("({}) {}", envelope.code, envelope.message);
    match envelope.code {
        0 => Ok(envelope.data.unwrap_or_default()),
        RATE_LIMIT_CODE => Err(FetchError::RateLimited {
            message,
            retry_after: None,
        }),
        code if AUTH_CODES.contains(&code) => Err(FetchError::Auth(message)),
        code if (50000..60000).contains(&code) => Err(FetchError::Transient(message)),
        _ => Err(FetchError::Vendor(message)),
    }
}
