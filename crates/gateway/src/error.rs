//! Maps the orchestrator's error taxonomy onto HTTP status codes. Every
//! variant maps to exactly one status; nothing here inspects message text to
//! decide a code, since the sanitization already happened upstream.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use cmux_orchestrator::OrchestratorError;
use serde_json::json;

pub struct ApiError(pub OrchestratorError);

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self.0 {
            OrchestratorError::Auth => (StatusCode::UNAUTHORIZED, json!({"error": "authentication required"})),
            OrchestratorError::Forbidden => (StatusCode::FORBIDDEN, json!({"error": "forbidden"})),
            OrchestratorError::NotFound => (StatusCode::NOT_FOUND, json!({"error": "not found"})),
            OrchestratorError::Conflict(message) => (StatusCode::CONFLICT, json!({"error": message})),
            OrchestratorError::Upstream { kind, message } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"error": message, "kind": kind.as_str()}),
            ),
            OrchestratorError::NotConfigured => {
                (StatusCode::SERVICE_UNAVAILABLE, json!({"error": "provider not configured"}))
            }
            OrchestratorError::GatewayTimeout => (StatusCode::GATEWAY_TIMEOUT, json!({"error": "gateway timeout"})),
            OrchestratorError::BadRequest(message) => (StatusCode::BAD_REQUEST, json!({"error": message})),
            OrchestratorError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, json!({"error": "internal error"}))
            }
        };

        if matches!(self.0, OrchestratorError::Internal(ref message) if !message.is_empty()) {
            tracing::error!(error = %self.0, "internal error surfaced to caller as a generic 500");
        }

        (status, Json(body)).into_response()
    }
}
