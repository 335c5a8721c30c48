//! HTTP surface of the secret refresher service.

pub mod admin;
pub mod refresh;

pub use admin::create_admin_router;
pub use refresh::{create_refresh_router, handle_refresh};

use crate::secrets::{SecretRefresher, SecretStore};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared state for the refresher and admin handlers.
pub struct RefresherState {
    pub store: Arc<SecretStore>,
    pub refresher: Arc<SecretRefresher>,
    /// Bearer token for the admin routes. None = unrestricted.
    pub admin_token: Option<String>,
}

#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
}

pub enum AppError {
    BadRequest(String),
    Unauthorized(String),
    NotFound(String),
    Internal(String),
}

impl From<anyhow::Error> for AppError {
    fn from(e: anyhow::Error) -> Self {
        AppError::Internal(format!("{:#}", e))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(ErrorResponse { success: false, error })).into_response()
    }
}

pub fn create_router(state: RefresherState) -> Router {
    let state = Arc::new(state);
    Router::new()
        .merge(create_refresh_router(Arc::clone(&state)))
        .merge(create_admin_router(state))
        .layer(TraceLayer::new_for_http())
}
