//! JSON error bodies for the payments API
//!
//! Every failure a caller sees has the same shape: a stable code, a safe
//! message and the request id the logs are keyed by.

use crate::error::{AppError, AppErrorKind, ErrorCode, ValidationError};
use axum::{
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Body returned for every error. It never carries key material, computed
/// digests or the internal reason a callback was rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorCode,
    pub message: String,
    /// Same value as the `x-request-id` response header
    pub request_id: Option<String>,
    pub timestamp: String,
    /// Offending input field, for validation failures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub retryable: bool,
}

impl ErrorResponse {
    pub fn from_app_error(error: &AppError) -> Self {
        let field = match &error.kind {
            AppErrorKind::Validation(ValidationError::InvalidField { field, .. })
            | AppErrorKind::Validation(ValidationError::MissingField { field }) => {
                Some(field.clone())
            }
            _ => None,
        };

        Self {
            error: error.error_code(),
            message: error.user_message(),
            request_id: error.request_id.clone(),
            timestamp: Utc::now().to_rfc3339(),
            field,
            retryable: error.is_retryable(),
        }
    }

    /// The body could not be decoded into the expected request shape.
    pub fn malformed_body(request_id: Option<String>, detail: impl Into<String>) -> Self {
        Self {
            error: ErrorCode::ValidationError,
            message: format!("Request body is invalid: {}", detail.into()),
            request_id,
            timestamp: Utc::now().to_rfc3339(),
            field: Some("body".to_string()),
            retryable: false,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status_code =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        // Context goes to the log only.
        if status_code.is_server_error() {
            tracing::error!(
                error = ?self.kind,
                context = ?self.context,
                request_id = ?self.request_id,
                status = %status_code.as_u16(),
                "Request failed"
            );
        } else {
            tracing::warn!(
                error = ?self.kind,
                context = ?self.context,
                request_id = ?self.request_id,
                status = %status_code.as_u16(),
                "Request refused"
            );
        }

        (status_code, Json(ErrorResponse::from_app_error(&self))).into_response()
    }
}

/// `{"success": true, "data": .., "timestamp": ..}`
pub fn success_response<T: Serialize>(data: T) -> impl IntoResponse {
    Json(serde_json::json!({
        "success": true,
        "data": data,
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

pub fn request_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Fills in the request id unless the error already carries one, as a
/// rejected callback does with its correlation id.
pub fn attach_request_id(error: AppError, request_id: Option<String>) -> AppError {
    match (error.request_id.is_some(), request_id) {
        (false, Some(id)) => error.with_request_id(id),
        _ => error,
    }
}
