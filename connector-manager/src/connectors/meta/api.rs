use adsync::{FetchError, FetchWindow};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;

use super::config::{
    API_VERSION, BASE_URL, BREAKDOWNS, INVALID_TOKEN_CODE, LEVEL, PAGE_LIMIT, RATE_LIMIT_CODES,
};

/// One page of `/act_{id}/insights`.
#[derive(Debug, Deserialize)]
pub struct InsightsPage {
    #[serde(default)]
    pub data: Vec<Value>,
    #[serde(default)]
    pub paging: Option<Paging>,
}

#[derive(Debug, Deserialize)]
pub struct Paging {
    #[serde(default)]
    pub cursors: Option<Cursors>,
    /// Present only when another page exists.
    #[serde(default)]
    pub next: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Cursors {
    #[serde(default)]
    pub after: Option<String>,
}

impl InsightsPage {
    /// The `after` cursor, when Meta says there is a next page.
    pub fn next_cursor(&self) -> Option<String> {
        let paging = self.paging.as_ref()?;
        paging.next.as_ref()?;
        paging.cursors.as_ref()?.after.clone()
    }
}

#[derive(Debug, Deserialize, Default)]
struct GraphErrorBody {
    #[serde(default)]
    error: Option<GraphError>,
}

#[derive(Debug, Deserialize)]
struct GraphError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: Option<i64>,
}

/// HTTP client for the Graph API insights edge.
pub struct MetaClient {
    http_client: Client,
    base_url: String,
}

impl MetaClient {
    pub fn new(http_client: Client) -> Self {
        Self::with_base_url(http_client, BASE_URL.to_string())
    }

    pub fn with_base_url(http_client: Client, base_url: String) -> Self {
        Self {
            http_client,
            base_url,
        }
    }

    /// Cheap token probe.
    pub async fn me(&self, access_token: &str) -> Result<Value, FetchError> {
        let url = format!("{}/{}/me", self.base_url, API_VERSION);
        let response = self
            .http_client
            .get(&url)
            .query(&[("access_token", access_token), ("fields", "id")])
            .send()
            .await?;
        read_graph_response(response).await
    }

    pub async fn fetch_insights(
        &self,
        access_token: &str,
        account_id: &str,
        window: &FetchWindow,
        fields: &[String],
        after: Option<&str>,
    ) -> Result<InsightsPage, FetchError> {
        let url = format!(
            "{}/{}/act_{}/insights",
            self.base_url,
            API_VERSION,
            account_id.trim_start_matches("act_")
        );
        let time_range = serde_json::json!({
            "since": window.start_date().to_string(),
            "until": window.end_date().to_string(),
        })
        .to_string();

        let mut query: Vec<(&str, String)> = vec![
            ("access_token", access_token.to_string()),
            ("fields", fields.join(",")),
            ("level", LEVEL.to_string()),
            ("breakdowns", BREAKDOWNS.to_string()),
            ("time_range", time_range),
            ("time_increment", "1".to_string()),
            ("limit", PAGE_LIMIT.to_string()),
        ];
        if let Some(after) = after {
            query.push(("after", after.to_string()));
        }

        let response = self.http_client.get(&url).query(&query).send().await?;
        let body = read_graph_response(response).await?;
        serde_json::from_value(body).map_err(|e| FetchError::Decode(e.to_string()))
    }
}

async fn read_graph_response(response: reqwest::Response) -> Result<Value, FetchError> {
    let status = response.status();
    let text = response.text().await?;
    if !status.is_success() {
        return Err(classify_error(status, &text));
    }
    serde_json::from_str(&text).map_err(|e| FetchError::Decode(e.to_string()))
}

/// Graph API errors carry a numeric `code` that is more precise than the
/// HTTP status.
pub fn classify_error(status: StatusCode, body: &str) -> FetchError {
    let parsed: GraphErrorBody = serde_json::from_str(body).unwrap_or_default();
    match parsed.error {
        Some(GraphError {
            code: Some(code),
            message,
        }) if code == INVALID_TOKEN_CODE => FetchError::Auth(format!("({}) {}", code, message)),
        Some(GraphError {
            code: Some(code),
            message,
        }) if RATE_LIMIT_CODES.contains(&code) => FetchError::RateLimited {
            message: format!("({}) {}", code, message),
            retry_after: None,
        },
        _ => FetchError::from_status(status, None, body),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_graph_errors() {
        let body = r#"{"error":{"message":"Error validating access token","type":"OAuthException","code":190}}"#;
        assert!(matches!(
            classify_error(StatusCode::BAD_REQUEST, body),
            FetchError::Auth(_)
        ));

        let body = r#"{"error":{"message":"User request limit reached","code":17}}"#;
        let err = classify_error(StatusCode::BAD_REQUEST, body);
        assert!(matches!(err, FetchError::RateLimited { .. }));
        assert!(err.is_transient());

        let body = r#"{"error":{"message":"Invalid parameter","code":100}}"#;
        assert!(matches!(
            classify_error(StatusCode::BAD_REQUEST, body),
            FetchError::Vendor(_)
        ));

        assert!(classify_error(StatusCode::BAD_GATEWAY, "<html>").is_transient());
    }

    #[test]
    fn test_next_cursor_requires_next_link() {
        let page: InsightsPage = serde_json::from_str(
            r#"{"data":[],"paging":{"cursors":{"before":"b","after":"a"}}}"#,
        )
        .unwrap();
        assert_eq!(page.next_cursor(), None);

        let page: InsightsPage = serde_json::from_str(
            r#"{"data":[{}],"paging":{"cursors":{"after":"a"},"next":"https://graph/next"}}"#,
        )
        .unwrap();
        assert_eq!(page.next_cursor().as_deref(), Some("a"));
    }
}
