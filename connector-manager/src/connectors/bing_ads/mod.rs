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
use serde_json::Value;

use self::api::BingClient;
use self::config::{default_columns, AD_REPORT, CAMPAIGN_REPORT};
use self::transformer::{report_request, unzip_report};

/// Microsoft Advertising (Bing Ads) performance reports over the REST
/// reporting service. Reports are zipped CSVs.
pub struct BingAdsConnector {
    client: BingClient,
}

impl BingAdsConnector {
    pub fn new(http_client: Client) -> Self {
        Self {
            client: BingClient::new(http_client),
        }
    }

    pub fn with_base_url(http_client: Client, base_url: String) -> Self {
        Self {
            client: BingClient::with_base_url(http_client, base_url),
        }
    }
}

#[async_trait]
impl Connector for BingAdsConnector {
    fn name(&self) -> &str {
        "bing_ads"
    }

    fn platform(&self) -> &str {
        "Bing Ads"
    }

    fn fetch_style(&self) -> FetchStyle {
        FetchStyle::ReportJob
    }

    fn account_keys(&self) -> &'static [&'static str] {
        &["account_ids"]
    }

    fn required_credentials(&self) -> &'static [&'static str] {
        &["client_id", "client_secret", "refresh_token", "developer_token", "customer_id"]
    }

    fn default_report_type(&self) -> &str {
        CAMPAIGN_REPORT
    }

    fn normalizer(&self) -> Normalizer {
        Normalizer::new(self.platform()).with_date_fields(&["timeperiod", "time_period"])
    }

    async fn authenticate(&self, credentials: &Credentials) -> Result<Session, FetchError> {
        let developer_token = credentials.require("developer_token")?;
        let customer_id = credentials.require("customer_id")?;
        let access_token = self.client.access_token(credentials).await?;
        Ok(Session::bearer(access_token)
            .with_header("DeveloperToken", developer_token)
            .with_header("CustomerId", customer_id))
    }

    fn build_request(
        &self,
        scope: &AccountScope,
        window: &FetchWindow,
        report_type: &str,
        params: &RunParams,
    ) -> Result<ReportRequest, ValidationError> {
        let defaults = default_columns(report_type).ok_or_else(|| ValidationError::InvalidParameter {
            name: "report_type".to_string(),
            reason: format!("'{}' is not one of {}, {}", report_type, CAMPAIGN_REPORT, AD_REPORT),
        })?;
        let columns = params
            .string_list("columns")
            .unwrap_or_else(|| defaults.iter().map(|c| c.to_string()).collect());

        Ok(ReportRequest {
            scope: scope.clone(),
            window: *window,
            report_type: report_type.to_string(),
            spec: Some(report_request(report_type, scope.as_str(), window, &columns)),
            fields: columns,
            query: None,
        })
    }

    async fn submit_report(&self, session: &Session, request: &ReportRequest) -> Result<ReportJob, FetchError> {
        let body = request
            .spec
            .as_ref()
            .ok_or_else(|| ValidationError::MissingParameter("columns".to_string()))?;
        let id = self.client.submit(session, request.scope.as_str(), body).await?;
        Ok(ReportJob { id, parent: None })
    }

    async fn poll_report(&self, session: &Session, job: &ReportJob) -> Result<ReportStatus, FetchError> {
        let status = self.client.poll(session, &job.id).await?;
        Ok(match status.status.as_str() {
            "Success" => ReportStatus::Done {
                artifact: status.report_download_url.filter(|u| !u.is_empty()),
            },
            "Error" => ReportStatus::Failed(format!("report request {} failed", job.id)),
            _ => ReportStatus::Pending,
        })
    }

    async fn download_report(&self, _session: &Session, artifact: &str) -> Result<Vec<Value>, FetchError> {
        let zipped = self.client.download(artifact).await?;
        parse_report_csv(&unzip_report(&zipped)?)
    }
}

#[cfg(test)]
mod tests {
    use super::transformer::tests::zipped;
    use super::*;
    use crate::paginator::{Paginator, ReportWait};
    use adsync::model::parse_date;
    use adsync::RetryPolicy;
    use chrono::Utc;
    use mockito::{Matcher, Server};
    use serde_json::json;
    use std::time::Duration;

    fn window() -> FetchWindow {
        FetchWindow::new(parse_date("2025-01-01").unwrap(), parse_date("2025-01-03").unwrap()).unwrap()
    }

    #[test]
    fn test_report_type_and_columns() {
        let connector = BingAdsConnector::new(Client::new());
        let scope = AccountScope::parse("77").unwrap();

        let request = connector
            .build_request(&scope, &window(), "AdPerformanceReport", &RunParams::default())
            .unwrap();
        assert!(request.fields.contains(&"AdTitle".to_string()));

        let params = RunParams::from_value(json!({"columns": ["TimePeriod", "Spend"]})).unwrap();
        let request = connector
            .build_request(&scope, &window(), CAMPAIGN_REPORT, &params)
            .unwrap();
        assert_eq!(request.spec.unwrap()["Columns"], json!(["TimePeriod", "Spend"]));

        assert!(connector
            .build_request(&scope, &window(), "KeywordPerformanceReport", &RunParams::default())
            .is_err());
    }

    #[tokio::test]
    async fn test_submit_poll_download() {
        let mut server = Server::new_async().await;
        let _token = server
            .mock("POST", "/token")
            .match_body(Matcher::UrlEncoded("scope".into(), config::SCOPE.into()))
            .with_status(200)
            .with_body(r#"{"access_token":"ms","expires_in":3600}"#)
            .create_async()
            .await;
        let _submit = server
            .mock("POST", "/Reporting/v13/GenerateReport/Submit")
            .match_header("DeveloperToken", "dev")
            .match_header("CustomerId", "5")
            .match_header("CustomerAccountId", "77")
            .with_status(200)
            .with_body(r#"{"ReportRequestId":"rr1"}"#)
            .create_async()
            .await;
        let _pending = server
            .mock("POST", "/Reporting/v13/GenerateReport/Poll")
            .match_body(Matcher::PartialJson(json!({"ReportRequestId": "rr1"})))
            .with_status(200)
            .with_body(r#"{"ReportRequestStatus":{"Status":"Pending","ReportDownloadUrl":null}}"#)
            .expect(1)
            .create_async()
            .await;
        let done = format!(
            r#"{{"ReportRequestStatus":{{"Status":"Success","ReportDownloadUrl":"{}/download/rr1.zip"}}}}"#,
            server.url()
        );
        let _done = server
            .mock("POST", "/Reporting/v13/GenerateReport/Poll")
            .with_status(200)
            .with_body(done)
            .expect(1)
            .create_async()
            .await;
        let _download = server
            .mock("GET", "/download/rr1.zip")
            .with_status(200)
            .with_body(zipped(
                "rr1.csv",
                "\"AccountId\",\"TimePeriod\",\"Clicks\",\"Spend\"\r\n\"77\",\"2025-01-01\",\"3\",\"1.50\"\r\n\"77\",\"2025-01-02\",\"0\",\"0.00\"\r\n",
            ))
            .create_async()
            .await;

        let connector = BingAdsConnector::with_base_url(Client::new(), server.url());
        let creds = Credentials::new(
            json!({
                "client_id": "c",
                "client_secret": "s",
                "refresh_token": "r",
                "developer_token": "dev",
                "customer_id": "5"
            })
            .as_object()
            .cloned()
            .unwrap(),
        );
        let session = connector.authenticate(&creds).await.unwrap();
        let scope = AccountScope::parse("77").unwrap();
        let request = connector
            .build_request(&scope, &window(), CAMPAIGN_REPORT, &RunParams::default())
            .unwrap();
        let retry = RetryPolicy::immediate(1);

        let records = Paginator::new(&connector, &session, &request, &retry)
            .with_report_wait(ReportWait {
                poll_interval: Duration::from_millis(1),
                max_wait: Duration::from_secs(5),
            })
            .collect_records()
            .await
            .unwrap();
        let rows = connector
            .normalizer()
            .normalize(records, &scope, CAMPAIGN_REPORT, Utc::now());

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["date"], "2025-01-01");
        assert_eq!(rows[0]["spend"], 1.5);
        assert_eq!(rows[1]["source"], "Bing Ads");
        assert_eq!(rows[1]["account_id"], "77");
    }

    #[tokio::test]
    async fn test_success_without_url_is_empty() {
        let mut server = Server::new_async().await;
        let _done = server
            .mock("POST", "/Reporting/v13/GenerateReport/Poll")
            .with_status(200)
            .with_body(r#"{"ReportRequestStatus":{"Status":"Success","ReportDownloadUrl":null}}"#)
            .create_async()
            .await;

        let connector = BingAdsConnector::with_base_url(Client::new(), server.url());
        let job = ReportJob {
            id: "rr1".to_string(),
            parent: None,
        };
        let status = connector.poll_report(&Session::bearer("t"), &job).await.unwrap();
        assert_eq!(status, ReportStatus::Done { artifact: None });
    }
}
