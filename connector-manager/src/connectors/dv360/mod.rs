pub mod api;
pub mod config;
pub mod transformer;

use crate::connector::Connector;
use crate::connectors::report_csv::parse_report_csv;
use crate::request::RunParams;
use crate::types::{Credentials, FetchStyle, ReportJob, ReportStatus, Session};
use adsync::{AccountScope, FetchError, FetchWindow, Normalizer, ReportRequest, ValidationError};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::info;

use self::api::Dv360Client;
use self::config::{STATE_DONE, STATE_FAILED};
use self::transformer::{data_range, query_body};

/// Display & Video 360 via Bid Manager offline reports: create (or reuse) a
/// query, run it, poll the report, download the CSV.
pub struct Dv360Connector {
    client: Dv360Client,
}

impl Dv360Connector {
    pub fn new(http_client: Client) -> Self {
        Self {
            client: Dv360Client::new(http_client),
        }
    }

    pub fn with_base_url(http_client: Client, base_url: String) -> Self {
        Self {
            client: Dv360Client::with_base_url(http_client, base_url),
        }
    }
}

fn query_spec(params: &RunParams) -> Result<Option<Value>, ValidationError> {
    match params.get("query_spec") {
        None | Some(Value::Null) => Ok(None),
        Some(spec @ Value::Object(_)) => Ok(Some(spec.clone())),
        Some(Value::String(raw)) => serde_json::from_str::<Value>(raw)
            .ok()
            .filter(Value::is_object)
            .map(Some)
            .ok_or_else(|| ValidationError::InvalidParameter {
                name: "query_spec".to_string(),
                reason: "expected a JSON object".to_string(),
            }),
        Some(_) => Err(ValidationError::InvalidParameter {
            name: "query_spec".to_string(),
            reason: "expected a JSON object".to_string(),
        }),
    }
}

#[async_trait]
impl Connector for Dv360Connector {
    fn name(&self) -> &str {
        "dv360"
    }

    fn platform(&self) -> &str {
        "DV360"
    }

    fn fetch_style(&self) -> FetchStyle {
        FetchStyle::ReportJob
    }

    fn account_keys(&self) -> &'static [&'static str] {
        &["advertiser_ids"]
    }

    fn required_credentials(&self) -> &'static [&'static str] {
        &["client_id", "client_secret", "refresh_token"]
    }

    fn default_report_type(&self) -> &str {
        "standard"
    }

    fn normalizer(&self) -> Normalizer {
        Normalizer::new(self.platform())
            .with_date_fields(&["date", "filter_date"])
            .with_drop_micros(true)
    }

    async fn authenticate(&self, credentials: &Credentials) -> Result<Session, FetchError> {
        let access_token = self.client.access_token(credentials).await?;
        Ok(Session::bearer(access_token))
    }

    fn build_request(
        &self,
        scope: &AccountScope,
        window: &FetchWindow,
        report_type: &str,
        params: &RunParams,
    ) -> Result<ReportRequest, ValidationError> {
        let spec = match params.optional_str("query_id") {
            Some(query_id) => json!({ "queryId": query_id }),
            None => query_body(scope.as_str(), window, query_spec(params)?.as_ref()),
        };

        Ok(ReportRequest {
            scope: scope.clone(),
            window: *window,
            report_type: report_type.to_string(),
            fields: Vec::new(),
            query: None,
            spec: Some(spec),
        })
    }

    /// Creates the one-time query unless the request already names one.
    async fn prepare_report(&self, session: &Session, request: &ReportRequest) -> Result<ReportRequest, FetchError> {
        let spec = request
            .spec
            .as_ref()
            .ok_or_else(|| ValidationError::MissingParameter("query_spec".to_string()))?;
        if spec.get("queryId").and_then(Value::as_str).is_some() {
            return Ok(request.clone());
        }

        let created = self.client.create_query(session, spec).await?;
        info!(advertiser_id = %request.scope, query_id = %created, "DV360 query created");
        Ok(ReportRequest {
            spec: Some(json!({ "queryId": created })),
            ..request.clone()
        })
    }

    async fn submit_report(&self, session: &Session, request: &ReportRequest) -> Result<ReportJob, FetchError> {
        let query_id = request
            .spec
            .as_ref()
            .and_then(|spec| spec.get("queryId"))
            .and_then(Value::as_str)
            .ok_or_else(|| FetchError::Vendor("report request has no query id".to_string()))?;

        let report = self
            .client
            .run_query(session, query_id, &data_range(&request.window))
            .await?;
        Ok(ReportJob {
            id: report.key.report_id,
            parent: Some(report.key.query_id),
        })
    }

    async fn poll_report(&self, session: &Session, job: &ReportJob) -> Result<ReportStatus, FetchError> {
        let query_id = job
            .parent
            .as_deref()
            .ok_or_else(|| FetchError::Vendor(format!("report {} has no query id", job.id)))?;
        let report = self.client.get_report(session, query_id, &job.id).await?;

        let state = report.state().to_string();
        Ok(match state.as_str() {
            STATE_DONE => ReportStatus::Done {
                artifact: report
                    .metadata
                    .google_cloud_storage_path
                    .filter(|p| !p.is_empty()),
            },
            STATE_FAILED => ReportStatus::Failed(format!("query {} report {} failed", query_id, job.id)),
            _ => ReportStatus::Pending,
        })
    }

    async fn download_report(&self, _session: &Session, artifact: &str) -> Result<Vec<Value>, FetchError> {
        let bytes = self.client.download(artifact).await?;
        parse_report_csv(&bytes)
    }
}
