use crate::request::RunParams;
use crate::types::{Credentials, FetchStyle, Page, ReportJob, ReportStatus, Session};
use adsync::{AccountScope, FetchError, FetchWindow, Normalizer, ReportRequest, ValidationError};
use async_trait::async_trait;
use serde_json::Value;

/// One ad platform's dialect.
///
/// Connectors are stateless: everything a fetch needs arrives through
/// [`Credentials`], [`Session`] and the immutable [`ReportRequest`]. The
/// pipeline around them (pagination, retry, normalization, export) is
/// shared.
///
/// # Lifecycle
/// 1. The manager reads account ids from the keys in `account_keys()`
/// 2. `authenticate(credentials)` once per account
/// 3. `build_request(...)` once per account and report type
/// 4. The paginator drives `fetch_page` (cursor style) or
///    `prepare_report` / `submit_report` / `poll_report` / `download_report`
///    (report-job style)
/// 5. Records go through `normalizer()` and into the loader
#[async_trait]
pub trait Connector: Send + Sync {
    /// Lowercase identifier used in the `/run/:connector` route and logs.
    fn name(&self) -> &str;

    /// Value written to the `source` column.
    fn platform(&self) -> &str;

    fn fetch_style(&self) -> FetchStyle;

    /// Payload keys that may hold the account id list, in priority order.
    fn account_keys(&self) -> &'static [&'static str];

    /// Credential fields `authenticate` needs.
    fn required_credentials(&self) -> &'static [&'static str];

    fn default_lookback_days(&self) -> u32 {
        3
    }

    /// Whether the default window includes today.
    fn window_ends_today(&self) -> bool {
        false
    }

    fn default_report_type(&self) -> &str;

    /// Report types to extract for this job. Most connectors run one.
    fn report_types(&self, params: &RunParams) -> Result<Vec<String>, ValidationError> {
        Ok(vec![params
            .optional_str("report_type")
            .unwrap_or_else(|| self.default_report_type().to_string())])
    }

    /// Destination to use when the job names none.
    fn default_destination(&self, _report_type: &str, _params: &RunParams) -> Option<String> {
        None
    }

    fn normalizer(&self) -> Normalizer;

    async fn authenticate(&self, credentials: &Credentials) -> Result<Session, FetchError>;

    fn build_request(
        &self,
        scope: &AccountScope,
        window: &FetchWindow,
        report_type: &str,
        params: &RunParams,
    ) -> Result<ReportRequest, ValidationError>;

    /// One page. `cursor` is `None` for the first page.
    async fn fetch_page(
        &self,
        _session: &Session,
        _request: &ReportRequest,
        _cursor: Option<&str>,
    ) -> Result<Page, FetchError> {
        Err(FetchError::Unsupported("cursor pagination"))
    }

    /// Vendor-side setup that must happen once per report, before submit.
    /// Returns the request `submit_report` should use. Retried on its own so
    /// a failed submit never repeats it.
    async fn prepare_report(
        &self,
        _session: &Session,
        request: &ReportRequest,
    ) -> Result<ReportRequest, FetchError> {
        Ok(request.clone())
    }

    async fn submit_report(
        &self,
        _session: &Session,
        _request: &ReportRequest,
    ) -> Result<ReportJob, FetchError> {
        Err(FetchError::Unsupported("report jobs"))
    }

    async fn poll_report(&self, _session: &Session, _job: &ReportJob) -> Result<ReportStatus, FetchError> {
        Err(FetchError::Unsupported("report jobs"))
    }

    /// Downloads and parses a finished report into raw records.
    async fn download_report(&self, _session: &Session, _artifact: &str) -> Result<Vec<Value>, FetchError> {
        Err(FetchError::Unsupported("report jobs"))
    }
}
