//! Connector Manager HTTP API - the run trigger.
//!
//! Exposes three routes:
//! - `POST /run/:connector` - run one extract-and-load job
//! - `GET /api/connectors` - list the registered connectors
//! - `GET /health` - liveness probe

use crate::manager::{ConnectorManager, RunError, RunResponse, RunStatus};
use crate::types::FetchStyle;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

/// Shared state for the API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub manager: Arc<ConnectorManager>,
}

/// A single entry in the `GET /api/connectors` response.
#[derive(Serialize)]
pub struct ConnectorInfo {
    pub name: String,
    pub platform: String,
    pub fetch_style: FetchStyle,
}

#[derive(Serialize)]
struct ErrorResponse {
    status: &'static str,
    message: String,
}

// ---------------------------------------------------------------------------
// Business logic (called from HTTP handlers and unit tests)
// ---------------------------------------------------------------------------

/// Runs a job and picks the HTTP status for its outcome.
///
/// `207 Multi-Status` when at least one account failed.
pub async fn handle_run(
    state: &ApiState,
    connector: &str,
    body: Value,
) -> Result<(StatusCode, RunResponse), AppError> {
    let response = state.manager.run(connector, body).await?;
    let status = match response.status {
        RunStatus::Ok => StatusCode::OK,
        RunStatus::Partial => StatusCode::MULTI_STATUS,
    };
    Ok((status, response))
}

pub fn list_connector_info(state: &ApiState) -> Vec<ConnectorInfo> {
    state
        .manager
        .connectors()
        .iter()
        .map(|c| ConnectorInfo {
            name: c.name().to_string(),
            platform: c.platform().to_string(),
            fetch_style: c.fetch_style(),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// HTTP handlers
// ---------------------------------------------------------------------------

async fn post_run(
    State(state): State<Arc<ApiState>>,
    Path(connector): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<RunResponse>), AppError> {
    let Json(body) = body.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let (status, response) = handle_run(&state, &connector, body).await?;
    Ok((status, Json(response)))
}

async fn list_connectors(State(state): State<Arc<ApiState>>) -> Json<Vec<ConnectorInfo>> {
    Json(list_connector_info(&state))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "service": "connector-manager" }))
}

// ---------------------------------------------------------------------------
// Error handling
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl From<RunError> for AppError {
    fn from(e: RunError) -> Self {
        match e {
            RunError::UnknownConnector(_) => AppError::NotFound(e.to_string()),
            RunError::Validation(_) => AppError::BadRequest(e.to_string()),
            RunError::Secrets(_) => AppError::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => {
                warn!(error = %msg, "Rejected run request");
                (StatusCode::BAD_REQUEST, msg)
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Internal(msg) => {
                error!(error = %msg, "Run failed before processing any account");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };
        (
            status,
            Json(ErrorResponse {
                status: "Error",
                message,
            }),
        )
            .into_response()
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/run/:connector", post(post_run))
        .route("/api/connectors", get(list_connectors))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use adsync::warehouse::Warehouse;
    use adsync::IdempotentLoader;

    fn make_state() -> ApiState {
        let warehouse = Arc::new(Warehouse::open(":memory:").unwrap());
        let http_client = reqwest::Client::new();
        let manager = ConnectorManager::new(
            crate::registry::get_all_connectors(&http_client),
            IdempotentLoader::new(warehouse),
        );
        ApiState {
            manager: Arc::new(manager),
        }
    }

    #[test]
    fn test_list_connector_info() {
        let info = list_connector_info(&make_state());
        assert_eq!(info.len(), 5);
        let bing = info.iter().find(|c| c.name == "bing_ads").unwrap();
        assert_eq!(bing.platform, "Bing Ads");
        assert_eq!(bing.fetch_style, FetchStyle::ReportJob);
    }

    #[tokio::test]
    async fn test_unknown_connector_is_not_found() {
        let err = handle_run(&make_state(), "myspace", json!({})).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_missing_parameter_is_bad_request() {
        let err = handle_run(&make_state(), "tiktok", json!({"advertiser_ids": ["1"]}))
            .await
            .unwrap_err();
        match err {
            AppError::BadRequest(msg) => assert!(msg.contains("project_id")),
            other => panic!("expected BadRequest, got {:?}", other),
        }
    }
}
