//! Connector manager - runs one extract-and-load job end to end.
//!
//! A job is one connector, one window and a list of accounts. Accounts run
//! strictly one after another. A failure in one account is recorded in its
//! result entry and the remaining accounts still run.

use crate::connector::Connector;
use crate::paginator::{Paginator, ReportWait};
use crate::registry;
use crate::request::RunParams;
use crate::types::{Credentials, Session};
use adsync::config::AppConfig;
use adsync::secrets::SecretStore;
use adsync::warehouse::{LoadError, TableRef};
use adsync::{
    AccountScope, ErrorKind, FetchError, FetchWindow, IdempotentLoader, LoadBatch, RetryPolicy,
    ValidationError, WriteMode,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Failures that stop a job before any account is processed.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("unknown connector '{0}'")]
    UnknownConnector(String),

    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("failed to load credentials: {0}")]
    Secrets(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Success,
    Empty,
    Error,
}

/// Outcome for one (account, report type) pair.
#[derive(Debug, Clone, Serialize)]
pub struct AccountResult {
    pub account_id: String,
    pub report_type: String,
    pub destination_table: String,
    pub inserted_rows: usize,
    pub status: AccountStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunStatus {
    Ok,
    Partial,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunResponse {
    pub status: RunStatus,
    pub message: String,
    pub request_id: String,
    pub start_date: String,
    pub end_date: String,
    pub total_inserted_rows: usize,
    pub errors_count: usize,
    pub results: Vec<AccountResult>,
}

/// Why one account's report did not load.
enum StepError {
    Fetch(FetchError),
    Load(LoadError),
}

impl StepError {
    fn kind(&self) -> ErrorKind {
        match self {
            StepError::Fetch(e) => e.kind(),
            StepError::Load(_) => ErrorKind::Load,
        }
    }
}

impl std::fmt::Display for StepError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepError::Fetch(e) => write!(f, "{}", e),
            StepError::Load(e) => write!(f, "{}", e),
        }
    }
}

impl From<FetchError> for StepError {
    fn from(e: FetchError) -> Self {
        StepError::Fetch(e)
    }
}

impl From<ValidationError> for StepError {
    fn from(e: ValidationError) -> Self {
        StepError::Fetch(FetchError::Validation(e))
    }
}

impl From<LoadError> for StepError {
    fn from(e: LoadError) -> Self {
        StepError::Load(e)
    }
}

/// Report type paired with where its rows go.
struct Target {
    report_type: String,
    destination: TableRef,
}

/// Everything a job needs that does not change between accounts.
struct Job<'a> {
    connector: &'a dyn Connector,
    params: &'a RunParams,
    window: FetchWindow,
    mode: WriteMode,
    credentials: Credentials,
    targets: Vec<Target>,
}

pub struct ConnectorManager {
    connectors: Vec<Arc<dyn Connector>>,
    loader: IdempotentLoader,
    secrets: Option<Arc<SecretStore>>,
    retry: RetryPolicy,
    report_wait: ReportWait,
    days_reprocess: Option<u32>,
}

impl ConnectorManager {
    pub fn new(connectors: Vec<Arc<dyn Connector>>, loader: IdempotentLoader) -> Self {
        Self {
            connectors,
            loader,
            secrets: None,
            retry: RetryPolicy::default(),
            report_wait: ReportWait::default(),
            days_reprocess: None,
        }
    }

    /// All registered connectors, configured from `config`.
    pub fn from_config(
        config: &AppConfig,
        http_client: &reqwest::Client,
        loader: IdempotentLoader,
        secrets: Option<Arc<SecretStore>>,
    ) -> Self {
        let mut manager = Self::new(registry::get_all_connectors(http_client), loader)
            .with_retry(config.retry.clone())
            .with_report_wait(ReportWait {
                poll_interval: config.report_job.poll_interval(),
                max_wait: config.report_job.max_wait(),
            });
        manager.secrets = secrets;
        manager.days_reprocess = config.window.days_reprocess;
        manager
    }

    pub fn with_secrets(mut self, store: Arc<SecretStore>) -> Self {
        self.secrets = Some(store);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_report_wait(mut self, wait: ReportWait) -> Self {
        self.report_wait = wait;
        self
    }

    /// Lookback in days for every connector, replacing their defaults.
    pub fn with_days_reprocess(mut self, days: u32) -> Self {
        self.days_reprocess = Some(days);
        self
    }

    pub fn connectors(&self) -> &[Arc<dyn Connector>] {
        &self.connectors
    }

    pub fn loader(&self) -> &IdempotentLoader {
        &self.loader
    }

    /// Runs `connector_name` for the job described by `body`.
    ///
    /// Errors are returned only for problems found before the first account;
    /// per-account failures end up in [`RunResponse::results`].
    pub async fn run(&self, connector_name: &str, body: Value) -> Result<RunResponse, RunError> {
        let connector = registry::find(&self.connectors, connector_name)
            .ok_or_else(|| RunError::UnknownConnector(connector_name.to_string()))?;
        let request_id = Uuid::new_v4().to_string();

        let params = RunParams::from_value(body)?;
        let job = self.prepare(connector.as_ref(), &params)?;
        let accounts = params.accounts(connector.account_keys())?;

        info!(
            request_id = %request_id,
            connector = %connector.name(),
            accounts = accounts.len(),
            window = %job.window,
            mode = ?job.mode,
            "Starting run"
        );

        let mut results = Vec::new();
        for scope in &accounts {
            results.extend(self.run_account(&job, scope).await);
        }

        let total_inserted_rows: usize = results.iter().map(|r| r.inserted_rows).sum();
        let errors_count = results
            .iter()
            .filter(|r| r.status == AccountStatus::Error)
            .count();
        let status = if errors_count == 0 {
            RunStatus::Ok
        } else {
            RunStatus::Partial
        };
        let message = match status {
            RunStatus::Ok => format!(
                "{} run finished: {} rows loaded for {} account(s)",
                connector.platform(),
                total_inserted_rows,
                accounts.len()
            ),
            RunStatus::Partial => format!(
                "{} run finished with {} error(s): {} rows loaded",
                connector.platform(),
                errors_count,
                total_inserted_rows
            ),
        };

        info!(
            request_id = %request_id,
            connector = %connector.name(),
            total_inserted_rows,
            errors_count,
            "Run finished"
        );

        Ok(RunResponse {
            status,
            message,
            request_id,
            start_date: job.window.start_date().to_string(),
            end_date: job.window.end_date().to_string(),
            total_inserted_rows,
            errors_count,
            results,
        })
    }

    /// Validates the job-wide parameters and resolves credentials.
    fn prepare<'a>(&self, connector: &'a dyn Connector, params: &'a RunParams) -> Result<Job<'a>, RunError> {
        let project_id = params.required_str("project_id")?;

        let days = self
            .days_reprocess
            .unwrap_or_else(|| connector.default_lookback_days());
        let window = params.window(days, Utc::now().date_naive(), connector.window_ends_today())?;
        let mode = params.write_mode()?;

        // One table cannot hold several report types: their columns differ and
        // the append delete does not filter on report type.
        let report_types = connector.report_types(params)?;
        let shared_destination = params.optional_str("destination_table");
        if shared_destination.is_some() && report_types.len() > 1 {
            return Err(ValidationError::InvalidParameter {
                name: "destination_table".to_string(),
                reason: format!(
                    "cannot be shared by {} report types; name a single report_type or omit it",
                    report_types.len()
                ),
            }
            .into());
        }

        let mut targets = Vec::new();
        for report_type in report_types {
            let destination = shared_destination
                .clone()
                .or_else(|| connector.default_destination(&report_type, params))
                .ok_or_else(|| ValidationError::MissingParameter("destination_table".to_string()))?;
            targets.push(Target {
                destination: TableRef::parse(&destination, &project_id)?,
                report_type,
            });
        }

        let credentials = params.credentials(self.stored_credentials(params, &project_id)?.as_ref());
        let missing = credentials.missing(connector.required_credentials());
        if !missing.is_empty() {
            return Err(ValidationError::MissingParameter(missing.join(", ")).into());
        }

        Ok(Job {
            connector,
            params,
            window,
            mode,
            credentials,
            targets,
        })
    }

    /// Credential fields from the latest version of `secret_id`, if named.
    fn stored_credentials(
        &self,
        params: &RunParams,
        project_id: &str,
    ) -> Result<Option<serde_json::Map<String, Value>>, RunError> {
        let Some(secret_id) = params.optional_str("secret_id") else {
            return Ok(None);
        };
        let store = self
            .secrets
            .as_ref()
            .ok_or_else(|| RunError::Secrets("secret store is not configured".to_string()))?;

        let version = store
            .access(project_id, &secret_id, None)
            .map_err(|e| RunError::Secrets(format!("{:#}", e)))?
            .ok_or_else(|| ValidationError::InvalidParameter {
                name: "secret_id".to_string(),
                reason: format!("no enabled version of '{}' in project '{}'", secret_id, project_id),
            })?;

        match version.payload {
            Value::Object(fields) => Ok(Some(fields)),
            _ => Err(RunError::Secrets(format!("secret '{}' is not a JSON object", secret_id))),
        }
    }

    async fn run_account(&self, job: &Job<'_>, scope: &AccountScope) -> Vec<AccountResult> {
        let connector = job.connector;
        let session = match self
            .retry
            .run("authenticate", || connector.authenticate(&job.credentials))
            .await
        {
            Ok(session) => session,
            Err(e) => {
                error!(connector = %connector.name(), account_id = %scope, error = %e, "Authentication failed");
                let failure = StepError::Fetch(e);
                return job
                    .targets
                    .iter()
                    .map(|target| failed(scope, target, &failure))
                    .collect();
            }
        };

        let mut results = Vec::with_capacity(job.targets.len());
        for target in &job.targets {
            let result = match self.run_report(job, &session, scope, target).await {
                Ok(0) => AccountResult {
                    account_id: scope.to_string(),
                    report_type: target.report_type.clone(),
                    destination_table: target.destination.to_string(),
                    inserted_rows: 0,
                    status: AccountStatus::Empty,
                    error: None,
                    error_kind: None,
                },
                Ok(inserted_rows) => AccountResult {
                    account_id: scope.to_string(),
                    report_type: target.report_type.clone(),
                    destination_table: target.destination.to_string(),
                    inserted_rows,
                    status: AccountStatus::Success,
                    error: None,
                    error_kind: None,
                },
                Err(e) => {
                    error!(
                        connector = %connector.name(),
                        account_id = %scope,
                        report_type = %target.report_type,
                        error = %e,
                        "Account failed"
                    );
                    failed(scope, target, &e)
                }
            };
            results.push(result);
        }
        results
    }

    /// Fetch, normalize and export one report for one account.
    async fn run_report(
        &self,
        job: &Job<'_>,
        session: &Session,
        scope: &AccountScope,
        target: &Target,
    ) -> Result<usize, StepError> {
        let connector = job.connector;
        let request = connector.build_request(scope, &job.window, &target.report_type, job.params)?;

        let records = Paginator::new(connector, session, &request, &self.retry)
            .with_report_wait(self.report_wait)
            .collect_records()
            .await?;

        let rows = connector
            .normalizer()
            .normalize(records, scope, &target.report_type, Utc::now());
        let batch = LoadBatch { request, rows };

        if batch.is_empty() {
            warn!(
                connector = %connector.name(),
                account_id = %scope,
                report_type = %target.report_type,
                window = %job.window,
                "No rows returned"
            );
            return Ok(0);
        }

        let inserted = self.loader.export(
            &batch.rows,
            &batch.request.window,
            &target.destination,
            scope,
            job.mode,
        )?;
        Ok(inserted)
    }
}

fn failed(scope: &AccountScope, target: &Target, e: &StepError) -> AccountResult {
    AccountResult {
        account_id: scope.to_string(),
        report_type: target.report_type.clone(),
        destination_table: target.destination.to_string(),
        inserted_rows: 0,
        status: AccountStatus::Error,
        error: Some(e.to_string()),
        error_kind: Some(e.kind()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FetchStyle, Page};
    use adsync::warehouse::Warehouse;
    use adsync::{Normalizer, ReportRequest};
    use async_trait::async_trait;
    use crate::connectors::google_ads::GoogleAdsConnector;
    use crate::connectors::tiktok::TikTokConnector;
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
    use mockito::{Matcher, Server};
    use serde_json::json;

    /// Two rows per account; account "666" is rejected at authentication.
    struct Fixed;

    #[async_trait]
    impl Connector for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }
        fn platform(&self) -> &str {
            "Fixed"
        }
        fn fetch_style(&self) -> FetchStyle {
            FetchStyle::Cursor
        }
        fn account_keys(&self) -> &'static [&'static str] {
            &["account_ids"]
        }
        fn required_credentials(&self) -> &'static [&'static str] {
            &["access_token"]
        }
        fn default_report_type(&self) -> &str {
            "daily"
        }
        fn normalizer(&self) -> Normalizer {
            Normalizer::new("Fixed")
        }
        async fn authenticate(&self, credentials: &Credentials) -> Result<Session, FetchError> {
            match credentials.require("access_token")?.as_str() {
                "bad" => Err(FetchError::Auth("token expired".to_string())),
                token => Ok(Session::bearer(token)),
            }
        }
        fn build_request(
            &self,
            scope: &AccountScope,
            window: &FetchWindow,
            report_type: &str,
            _params: &RunParams,
        ) -> Result<ReportRequest, ValidationError> {
            Ok(ReportRequest {
                scope: scope.clone(),
                window: *window,
                report_type: report_type.to_string(),
                fields: vec![],
                query: None,
                spec: None,
            })
        }
        async fn fetch_page(
            &self,
            _session: &Session,
            request: &ReportRequest,
            _cursor: Option<&str>,
        ) -> Result<Page, FetchError> {
            match request.scope.as_str() {
                "666" => Err(FetchError::Vendor("account disabled".to_string())),
                "0" => Ok(Page::default()),
                _ => Ok(Page::last(vec![
                    json!({"date": "2025-01-01", "clicks": 1}),
                    json!({"date": "2025-01-02", "clicks": 2}),
                ])),
            }
        }
    }

    fn manager() -> ConnectorManager {
        let warehouse = Arc::new(Warehouse::open(":memory:").unwrap());
        ConnectorManager::new(vec![Arc::new(Fixed)], IdempotentLoader::new(warehouse))
            .with_retry(RetryPolicy::immediate(1))
    }

    fn body(extra: Value) -> Value {
        let mut body = json!({
            "project_id": "proj",
            "destination_table": "raw.fixed",
            "access_token": "tok",
            "start_date": "2025-01-01",
            "end_date": "2025-01-03",
        });
        if let (Some(base), Value::Object(extra)) = (body.as_object_mut(), extra) {
            base.extend(extra);
        }
        body
    }

    #[tokio::test]
    async fn test_run_loads_every_account() {
        let manager = manager();
        let response = manager
            .run("fixed", body(json!({"account_ids": ["1", "2"]})))
            .await
            .unwrap();

        assert_eq!(response.status, RunStatus::Ok);
        assert_eq!(response.total_inserted_rows, 4);
        assert_eq!(response.start_date, "2025-01-01");
        assert_eq!(response.results[1].destination_table, "proj.raw.fixed");
        assert_eq!(response.results[1].status, AccountStatus::Success);
    }

    #[tokio::test]
    async fn test_failed_account_does_not_stop_others() {
        let manager = manager();
        let response = manager
            .run("fixed", body(json!({"account_ids": "666,1,0"})))
            .await
            .unwrap();

        assert_eq!(response.status, RunStatus::Partial);
        assert_eq!(response.errors_count, 1);
        assert_eq!(response.results[0].status, AccountStatus::Error);
        assert_eq!(response.results[0].error_kind, Some(ErrorKind::Vendor));
        assert_eq!(response.results[1].inserted_rows, 2);
        assert_eq!(response.results[2].status, AccountStatus::Empty);
    }

    #[tokio::test]
    async fn test_auth_failure_is_reported_per_account() {
        let manager = manager();
        let response = manager
            .run("fixed", body(json!({"account_ids": ["1"], "access_token": "bad"})))
            .await
            .unwrap();

        assert_eq!(response.results[0].error_kind, Some(ErrorKind::Auth));
        assert_eq!(response.total_inserted_rows, 0);
    }

    #[tokio::test]
    async fn test_job_level_validation() {
        let manager = manager();

        let err = manager.run("nope", json!({})).await.unwrap_err();
        assert!(matches!(err, RunError::UnknownConnector(_)));

        let mut missing_project = body(json!({"account_ids": ["1"]}));
        missing_project.as_object_mut().unwrap().remove("project_id");
        let err = manager.run("fixed", missing_project).await.unwrap_err();
        assert!(err.to_string().contains("project_id"));

        let err = manager
            .run("fixed", body(json!({"account_ids": ["1"], "if_exists": "merge"})))
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::Validation(ValidationError::UnknownWriteMode(_))));

        let err = manager
            .run("fixed", body(json!({"account_ids": ["1"], "access_token": ""})))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("access_token"));

        let err = manager.run("fixed", body(json!({}))).await.unwrap_err();
        assert!(err.to_string().contains("account_ids"));
    }

    #[tokio::test]
    async fn test_credentials_from_secret_store() {
        let store = Arc::new(SecretStore::new(":memory:", &BASE64.encode([7u8; 32])).unwrap());
        store
            .add_version("proj", "fixed-creds", &json!({"access_token": "tok"}))
            .unwrap();
        let manager = manager().with_secrets(store);

        let mut job = body(json!({"account_ids": ["1"], "secret_id": "fixed-creds"}));
        job.as_object_mut().unwrap().remove("access_token");
        let response = manager.run("fixed", job).await.unwrap();
        assert_eq!(response.total_inserted_rows, 2);

        let err = manager
            .run("fixed", body(json!({"account_ids": ["1"], "secret_id": "missing"})))
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::Validation(_)));
    }

    #[tokio::test]
    async fn test_transient_auth_failure_is_retried() {
        let mut server = Server::new_async().await;
        let token = server
            .mock("POST", "/token")
            .with_status(503)
            .with_body(r#"{"error":"backend_error"}"#)
            .expect(3)
            .create_async()
            .await;

        let connector = GoogleAdsConnector::with_base_url(reqwest::Client::new(), server.url());
        let warehouse = Arc::new(Warehouse::open(":memory:").unwrap());
        let manager = ConnectorManager::new(vec![Arc::new(connector)], IdempotentLoader::new(warehouse))
            .with_retry(RetryPolicy::immediate(3));

        let response = manager
            .run(
                "google_ads",
                json!({
                    "project_id": "proj",
                    "destination_table": "raw.gads",
                    "customer_ids": "1234567890",
                    "client_id": "c",
                    "client_secret": "s",
                    "refresh_token": "r",
                    "developer_token": "d",
                    "start_date": "2025-01-01",
                    "end_date": "2025-01-03",
                }),
            )
            .await
            .unwrap();

        token.assert_async().await;
        assert_eq!(response.status, RunStatus::Partial);
        assert_eq!(response.results[0].error_kind, Some(ErrorKind::Transient));
    }

    fn tiktok_job(extra: Value) -> Value {
        let mut job = json!({
            "project_id": "proj",
            "advertiser_ids": ["123"],
            "access_token": "tok",
            "report_types": ["campaign", "ad"],
            "start_date": "2025-01-01",
            "end_date": "2025-01-03",
        });
        if let (Some(base), Value::Object(extra)) = (job.as_object_mut(), extra) {
            base.extend(extra);
        }
        job
    }

    #[tokio::test]
    async fn test_shared_destination_rejected_for_several_report_types() {
        let connector = TikTokConnector::new(reqwest::Client::new());
        let warehouse = Arc::new(Warehouse::open(":memory:").unwrap());
        let manager = ConnectorManager::new(vec![Arc::new(connector)], IdempotentLoader::new(warehouse));

        let err = manager
            .run("tiktok", tiktok_job(json!({"destination_table": "raw.tt"})))
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::Validation(_)));
        assert!(err.to_string().contains("destination_table"));
    }

    #[tokio::test]
    async fn test_report_types_load_into_their_own_tables() {
        let mut server = Server::new_async().await;
        let _campaign = server
            .mock("GET", "/open_api/v1.3/report/integrated/get/")
            .match_query(Matcher::UrlEncoded("data_level".into(), "AUCTION_CAMPAIGN".into()))
            .with_status(200)
            .with_body(
                r#"{"code":0,"message":"OK","data":{"list":[
                    {"dimensions":{"campaign_id":"1","stat_time_day":"2025-01-01 00:00:00"},"metrics":{"spend":"1.5"}}
                ],"page_info":{"page":1,"total_page":1}}}"#,
            )
            .create_async()
            .await;
        let _ad = server
            .mock("GET", "/open_api/v1.3/report/integrated/get/")
            .match_query(Matcher::UrlEncoded("data_level".into(), "AUCTION_AD".into()))
            .with_status(200)
            .with_body(
                r#"{"code":0,"message":"OK","data":{"list":[
                    {"dimensions":{"ad_id":"7","stat_time_day":"2025-01-01 00:00:00"},"metrics":{"spend":"0.5"}},
                    {"dimensions":{"ad_id":"8","stat_time_day":"2025-01-02 00:00:00"},"metrics":{"spend":"0.25"}}
                ],"page_info":{"page":1,"total_page":1}}}"#,
            )
            .create_async()
            .await;

        let connector = TikTokConnector::with_base_url(reqwest::Client::new(), server.url());
        let warehouse = Arc::new(Warehouse::open(":memory:").unwrap());
        let manager = ConnectorManager::new(
            vec![Arc::new(connector)],
            IdempotentLoader::new(Arc::clone(&warehouse)),
        )
        .with_retry(RetryPolicy::immediate(1));

        let response = manager.run("tiktok", tiktok_job(json!({}))).await.unwrap();
        assert_eq!(response.status, RunStatus::Ok);
        assert_eq!(response.total_inserted_rows, 3);
        assert_eq!(response.results[0].destination_table, "proj.RAW.TKT002_TIKTOK_ADS_CAMPAIGN");
        assert_eq!(response.results[1].destination_table, "proj.RAW.TKT004_TIKTOK_ADS_AD");

        let ads = TableRef::parse("RAW.TKT004_TIKTOK_ADS_AD", "proj").unwrap();
        assert_eq!(warehouse.read_rows(&ads).unwrap().len(), 2);
    }
}
