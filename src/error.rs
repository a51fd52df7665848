use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Unified error type for the integrations-auth service.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    // ── Client Errors ───────────────────────────────────────────────────
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid or expired state parameter")]
    InvalidState,

    #[error("{0} not found")]
    NotFound(String),

    #[error("Provider {0} not found")]
    ProviderNotFound(String),

    // ── Provider Errors ─────────────────────────────────────────────────
    #[error("Token exchange failed ({}): {body}", upstream_status(.status))]
    TokenExchangeFailed { status: Option<u16>, body: String },

    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    // ── Internal ────────────────────────────────────────────────────────
    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

fn upstream_status(status: &Option<u16>) -> String {
    match status {
        Some(code) => code.to_string(),
        None => "no response".into(),
    }
}

impl From<sqlx::Error> for AuthError {
    fn from(e: sqlx::Error) -> Self {
        tracing::error!("Database error: {e}");
        AuthError::Database(e.to_string())
    }
}

impl From<anyhow::Error> for AuthError {
    fn from(e: anyhow::Error) -> Self {
        AuthError::Internal(e.to_string())
    }
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::InvalidRequest(_) | AuthError::InvalidState => StatusCode::BAD_REQUEST,
            AuthError::NotFound(_) | AuthError::ProviderNotFound(_) => StatusCode::NOT_FOUND,
            AuthError::TokenExchangeFailed { .. } | AuthError::RefreshFailed(_) => {
                StatusCode::BAD_GATEWAY
            }
            AuthError::Database(_) | AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AuthError::InvalidRequest(_) => "invalid_request",
            AuthError::InvalidState => "invalid_state",
            AuthError::NotFound(_) => "not_found",
            AuthError::ProviderNotFound(_) => "provider_not_found",
            AuthError::TokenExchangeFailed { .. } => "token_exchange_failed",
            AuthError::RefreshFailed(_) => "refresh_failed",
            AuthError::Database(_) | AuthError::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Internal details stay in the logs.
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("Request failed: {self}");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = json!({
            "error": {
                "code": self.code(),
                "message": message,
            }
        });

        (status, axum::Json(body)).into_response()
    }
}
