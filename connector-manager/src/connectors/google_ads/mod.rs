pub mod api;
pub mod config;
pub mod query;
pub mod transformer;

use crate::connector::Connector;
use crate::request::RunParams;
use crate::types::{Credentials, FetchStyle, Page, Session};
use adsync::{AccountScope, FetchError, FetchWindow, Normalizer, ReportRequest, ValidationError};
use async_trait::async_trait;
use reqwest::Client;

use self::api::GoogleAdsClient;
use self::config::{DEFAULT_QUERY, DEVELOPER_TOKEN_HEADER, LOGIN_CUSTOMER_HEADER};
use self::query::{selected_fields, with_date_range};
use self::transformer::fill_selected;

/// Google Ads search via GAQL. Costs arrive in micros and are converted by
/// the normalizer.
pub struct GoogleAdsConnector {
    client: GoogleAdsClient,
}

impl GoogleAdsConnector {
    pub fn new(http_client: Client) -> Self {
        Self {
            client: GoogleAdsClient::new(http_client),
        }
    }

    /// Create a connector against a mock server; the token endpoint is
    /// `{base_url}/token`.
    pub fn with_base_url(http_client: Client, base_url: String) -> Self {
        Self {
            client: GoogleAdsClient::with_base_url(http_client, base_url),
        }
    }
}

#[async_trait]
impl Connector for GoogleAdsConnector {
    fn name(&self) -> &str {
        "google_ads"
    }

    fn platform(&self) -> &str {
        "Google Ads"
    }

    fn fetch_style(&self) -> FetchStyle {
        FetchStyle::Cursor
    }

    fn account_keys(&self) -> &'static [&'static str] {
        &["customer_ids"]
    }

    fn required_credentials(&self) -> &'static [&'static str] {
        &["client_id", "client_secret", "refresh_token", "developer_token"]
    }

    fn default_report_type(&self) -> &str {
        "ad_group_performance"
    }

    fn normalizer(&self) -> Normalizer {
        Normalizer::new(self.platform()).with_date_fields(&["segments_date"])
    }

    async fn authenticate(&self, credentials: &Credentials) -> Result<Session, FetchError> {
        let developer_token = credentials.require("developer_token")?;
        let access_token = self.client.access_token(credentials).await?;

        let mut session = Session::bearer(access_token).with_header(DEVELOPER_TOKEN_HEADER, developer_token);
        if let Some(login) = credentials.get("login_customer_id") {
            session = session.with_header(LOGIN_CUSTOMER_HEADER, login.replace('-', ""));
        }
        Ok(session)
    }

    fn build_request(
        &self,
        scope: &AccountScope,
        window: &FetchWindow,
        report_type: &str,
        params: &RunParams,
    ) -> Result<ReportRequest, ValidationError> {
        let base = params
            .optional_str("query")
            .unwrap_or_else(|| DEFAULT_QUERY.to_string());
        let fields = selected_fields(&base);
        if fields.is_empty() {
            return Err(ValidationError::InvalidParameter {
                name: "query".to_string(),
                reason: "expected SELECT ... FROM ...".to_string(),
            });
        }

        Ok(ReportRequest {
            scope: scope.clone(),
            window: *window,
            report_type: report_type.to_string(),
            fields,
            query: Some(with_date_range(&base, window)),
            spec: None,
        })
    }

    async fn fetch_page(
        &self,
        session: &Session,
        request: &ReportRequest,
        cursor: Option<&str>,
    ) -> Result<Page, FetchError> {
        let query = request
            .query
            .as_deref()
            .ok_or_else(|| ValidationError::MissingParameter("query".to_string()))?;
        let page = self
            .client
            .search(session, request.scope.as_str(), query, cursor)
            .await?;

        Ok(Page {
            records: page
                .results
                .into_iter()
                .map(|r| fill_selected(r, &request.fields))
                .collect(),
            next: page.next_page_token.filter(|t| !t.is_empty()),
        })
    }
}
