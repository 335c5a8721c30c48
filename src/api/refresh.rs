//! `POST /refresh` and `GET /health` for the secret refresher service.

use super::{AppError, RefresherState};
use crate::secrets::{RefreshOutcome, RefreshRequest, RefreshState};
use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;

pub fn create_refresh_router(state: Arc<RefresherState>) -> Router {
    Router::new()
        .route("/refresh", post(post_refresh))
        .route("/health", get(health))
        .with_state(state)
}

/// Parses the body and runs one refresh. Validation problems become `400`,
/// refresh failures `500`, with the structured outcome as the body.
pub async fn handle_refresh(
    state: &RefresherState,
    body: Value,
) -> Result<(StatusCode, RefreshOutcome), AppError> {
    let request: RefreshRequest = serde_json::from_value(body)
        .map_err(|e| AppError::BadRequest(format!("invalid refresh request: {}", e)))?;

    for (name, value) in [
        ("secret_id", &request.secret_id),
        ("project_id", &request.project_id),
        ("platform", &request.platform),
    ] {
        if value.trim().is_empty() {
            return Err(AppError::BadRequest(format!("missing required parameter '{}'", name)));
        }
    }

    let outcome = state.refresher.refresh(&request).await;
    let status = match (&outcome.state, outcome.error_kind.as_deref()) {
        (RefreshState::Failed, Some("validation")) => StatusCode::BAD_REQUEST,
        (RefreshState::Failed, _) => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::OK,
    };
    Ok((status, outcome))
}

async fn post_refresh(
    State(state): State<Arc<RefresherState>>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<RefreshOutcome>), AppError> {
    let (status, outcome) = handle_refresh(&state, body).await?;
    Ok((status, Json(outcome)))
}

async fn health() -> Json<Value> {
    Json(json!({"status": "ok", "service": "adsync-refresher"}))
}
