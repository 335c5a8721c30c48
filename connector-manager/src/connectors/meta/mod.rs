pub mod api;
pub mod config;
pub mod transformer;

use crate::connector::Connector;
use crate::request::RunParams;
use crate::types::{Credentials, FetchStyle, Page, Session};
use adsync::{AccountScope, FetchError, FetchWindow, Normalizer, ReportRequest, ValidationError};
use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use self::api::MetaClient;
use self::config::{DEFAULT_FIELDS, LOOKBACK_DAYS, UNWRAP_FIELDS};
use self::transformer::insight_to_record;

/// Meta (Facebook/Instagram) ad insights at ad level, one row per day and
/// publisher platform.
pub struct MetaConnector {
    client: MetaClient,
}

impl MetaConnector {
    pub fn new(http_client: Client) -> Self {
        Self {
            client: MetaClient::new(http_client),
        }
    }

    /// Create a connector with a custom Graph API base URL (for testing).
    pub fn with_base_url(http_client: Client, base_url: String) -> Self {
        Self {
            client: MetaClient::with_base_url(http_client, base_url),
        }
    }
}

#[async_trait]
impl Connector for MetaConnector {
    fn name(&self) -> &str {
        "meta"
    }

    fn platform(&self) -> &str {
        "Meta"
    }

    fn fetch_style(&self) -> FetchStyle {
        FetchStyle::Cursor
    }

    fn account_keys(&self) -> &'static [&'static str] {
        &["account_list", "account_ids"]
    }

    fn required_credentials(&self) -> &'static [&'static str] {
        &["access_token"]
    }

    fn default_lookback_days(&self) -> u32 {
        LOOKBACK_DAYS
    }

    fn window_ends_today(&self) -> bool {
        true
    }

    fn default_report_type(&self) -> &str {
        "ad_insights"
    }

    fn normalizer(&self) -> Normalizer {
        Normalizer::new(self.platform())
            .with_date_fields(&["date_start"])
            .with_unwrap_fields(UNWRAP_FIELDS)
    }

    async fn authenticate(&self, credentials: &Credentials) -> Result<Session, FetchError> {
        let access_token = credentials.require("access_token")?;
        let me = self.client.me(&access_token).await?;
        debug!(user_id = %me["id"], "Meta token accepted");
        Ok(Session::bearer(access_token))
    }

    fn build_request(
        &self,
        scope: &AccountScope,
        window: &FetchWindow,
        report_type: &str,
        params: &RunParams,
    ) -> Result<ReportRequest, ValidationError> {
        let fields = params
            .string_list("fields_list")
            .or_else(|| params.string_list("fields"))
            .unwrap_or_else(|| DEFAULT_FIELDS.iter().map(|f| f.to_string()).collect());

        Ok(ReportRequest {
            scope: scope.clone(),
            window: *window,
            report_type: report_type.to_string(),
            fields,
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
        let page = self
            .client
            .fetch_insights(
                &session.access_token,
                request.scope.as_str(),
                &request.window,
                &request.fields,
                cursor,
            )
            .await?;
        let next = page.next_cursor();
        Ok(Page {
            records: page.data.into_iter().map(insight_to_record).collect(),
            next,
        })
    }
}
