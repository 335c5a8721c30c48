pub mod api;
pub mod config;
pub mod transformer;

use crate::connector::Connector;
use crate::request::RunParams;
use crate::types::{Credentials, FetchStyle, Page, Session};
use adsync::{AccountScope, FetchError, FetchWindow, Normalizer, ReportRequest, ValidationError};
use async_trait::async_trait;
use reqwest::Client;

use self::api::TikTokClient;
use self::config::{report_level, DEFAULT_DATASET, REPORT_LEVELS};
use self::transformer::report_row_to_record;

/// TikTok for Business integrated reports. Pages are numbered; the cursor
/// is the next page number.
pub struct TikTokConnector {
    client: TikTokClient,
}

impl TikTokConnector {
    pub fn new(http_client: Client) -> Self {
        Self {
            client: TikTokClient::new(http_client),
        }
    }

    /// Create a connector with a custom API base URL (for testing).
    pub fn with_base_url(http_client: Client, base_url: String) -> Self {
        Self {
            client: TikTokClient::with_base_url(http_client, base_url),
        }
    }
}

fn unknown_report_type(name: &str) -> ValidationError {
    let known: Vec<&str> = REPORT_LEVELS.iter().map(|l| l.name).collect();
    ValidationError::InvalidParameter {
        name: "report_type".to_string(),
        reason: format!("'{}' is not one of {}", name, known.join(", ")),
    }
}

#[async_trait]
impl Connector for TikTokConnector {
    fn name(&self) -> &str {
        "tiktok"
    }

    fn platform(&self) -> &str {
        "TikTok"
    }

    fn fetch_style(&self) -> FetchStyle {
        FetchStyle::Cursor
    }

    fn account_keys(&self) -> &'static [&'static str] {
        &["advertiser_ids"]
    }

    fn required_credentials(&self) -> &'static [&'static str] {
        &["access_token"]
    }

    fn default_report_type(&self) -> &str {
        "campaign"
    }

    /// `report_types` (list) wins over `report_type`. With neither, every
    /// level is extracted.
    fn report_types(&self, params: &RunParams) -> Result<Vec<String>, ValidationError> {
        let requested = params
            .string_list("report_types")
            .or_else(|| params.optional_str("report_type").map(|t| vec![t]))
            .unwrap_or_else(|| REPORT_LEVELS.iter().map(|l| l.name.to_string()).collect());

        let mut types: Vec<String> = Vec::with_capacity(requested.len());
        for name in requested {
            let name = name.to_lowercase();
            if report_level(&name).is_none() {
                return Err(unknown_report_type(&name));
            }
            if !types.contains(&name) {
                types.push(name);
            }
        }
        Ok(types)
    }

    fn default_destination(&self, report_type: &str, params: &RunParams) -> Option<String> {
        let level = report_level(report_type)?;
        let dataset = params
            .optional_str("dataset_id")
            .unwrap_or_else(|| DEFAULT_DATASET.to_string());
        Some(format!("{}.{}", dataset, level.table))
    }

    fn normalizer(&self) -> Normalizer {
        Normalizer::new(self.platform()).with_date_fields(&["stat_time_day"])
    }

    async fn authenticate(&self, credentials: &Credentials) -> Result<Session, FetchError> {
        let access_token = credentials.require("access_token")?;
        Ok(Session::bearer(access_token.clone()).with_header("Access-Token", access_token))
    }

    fn build_request(
        &self,
        scope: &AccountScope,
        window: &FetchWindow,
        report_type: &str,
        _params: &RunParams,
    ) -> Result<ReportRequest, ValidationError> {
        let level = report_level(report_type).ok_or_else(|| unknown_report_type(report_type))?;
        Ok(ReportRequest {
            scope: scope.clone(),
            window: *window,
            report_type: level.name.to_string(),
            fields: config::METRICS.iter().map(|m| m.to_string()).collect(),
            query: None,
            spec: None,
        })
    }

    async fn fetch_page(
        &self,
        session: &Session,
        request: &ReportRequest,
        cursor: Option<&str>,
    ) -> Result<Page, FetchError> {
        let level = report_level(&request.report_type)
            .ok_or_else(|| unknown_report_type(&request.report_type))?;
        let page = match cursor {
            Some(c) => c
                .parse::<u32>()
                .map_err(|_| FetchError::Decode(format!("bad page cursor '{}'", c)))?,
            None => 1,
        };

        let data = self
            .client
            .fetch_report(session, request.scope.as_str(), level, &request.window, page)
            .await?;

        let next = data
            .page_info
            .filter(|info| info.page < info.total_page)
            .map(|info| (info.page + 1).to_string());
        Ok(Page {
            records: data.list.into_iter().map(report_row_to_record).collect(),
            next,
        })
    }
}
