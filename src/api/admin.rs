//! Secret administration: seed and inspect secret versions.
//!
//! - `POST /secrets/:project_id/:secret_id/versions` stores a JSON document as a new version
//! - `GET /secrets/:project_id/:secret_id/versions` lists version metadata (never payloads)

use super::{AppError, RefresherState};
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::get,
    Router,
};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

#[derive(Serialize)]
pub struct AddVersionResponse {
    pub version: u32,
}

pub fn create_admin_router(state: Arc<RefresherState>) -> Router {
    Router::new()
        .route(
            "/secrets/:project_id/:secret_id/versions",
            get(list_versions).post(add_version),
        )
        .with_state(state)
}

async fn add_version(
    State(state): State<Arc<RefresherState>>,
    Path((project_id, secret_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Result<(StatusCode, Json<AddVersionResponse>), AppError> {
    if !validate_admin_token(&headers, &state.admin_token) {
        return Err(AppError::Unauthorized("Unauthorized".to_string()));
    }
    if !payload.is_object() {
        return Err(AppError::BadRequest("secret payload must be a JSON object".to_string()));
    }

    let version = state
        .store
        .add_version(&project_id, &secret_id, &payload)
        .map_err(AppError::from)?;

    info!(project_id = %project_id, secret_id = %secret_id, version = version, "Secret version added");
    Ok((StatusCode::CREATED, Json(AddVersionResponse { version })))
}

async fn list_versions(
    State(state): State<Arc<RefresherState>>,
    Path((project_id, secret_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    if !validate_admin_token(&headers, &state.admin_token) {
        return Err(AppError::Unauthorized("Unauthorized".to_string()));
    }

    let versions = state
        .store
        .list_versions(&project_id, &secret_id)
        .map_err(AppError::from)?;
    if versions.is_empty() {
        return Err(AppError::NotFound(format!("secret {}/{} not found", project_id, secret_id)));
    }
    Ok(Json(serde_json::json!({ "versions": versions })))
}

/// Returns true if the bearer token in `Authorization` matches the expected admin token.
/// Returns true (no restriction) when `expected` is None.
fn validate_admin_token(headers: &HeaderMap, expected: &Option<String>) -> bool {
    let Some(expected_token) = expected else {
        return true;
    };

    let Some(value) = headers.get("Authorization").and_then(|h| h.to_str().ok()) else {
        return false;
    };
    let Some(token) = value.strip_prefix("Bearer ") else {
        return false;
    };

    token == expected_token
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_validate_admin_token() {
        let mut headers = HeaderMap::new();
        assert!(validate_admin_token(&headers, &None));
        assert!(!validate_admin_token(&headers, &Some("t0k".to_string())));

        headers.insert("Authorization", HeaderValue::from_static("Bearer t0k"));
        assert!(validate_admin_token(&headers, &Some("t0k".to_string())));
        assert!(!validate_admin_token(&headers, &Some("other".to_string())));

        headers.insert("Authorization", HeaderValue::from_static("t0k"));
        assert!(!validate_admin_token(&headers, &Some("t0k".to_string())));
    }
}
