use axum::{
    extract::{rejection::JsonRejection, FromRequest, Path, Request, State},
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Form, Json,
};
use std::collections::HashMap;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::AppState;
use crate::database::order_repository::OrderStatus;
use crate::error::AppError;
use crate::middleware::error::{attach_request_id, request_id, success_response, ErrorResponse};
use crate::payments::types::CallbackPayload;
use crate::services::payment_orchestrator::{InitiationRequest, OrchestratorError};

/// Browser-facing result carried on the confirmation redirect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectStatus {
    Success,
    Failed,
    Error,
}

impl RedirectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RedirectStatus::Success => "success",
            RedirectStatus::Failed => "failed",
            RedirectStatus::Error => "error",
        }
    }
}

/// `FRONTEND_CONFIRMATION_URL?status=..&txnid=..&ref=..`. Falls back to the
/// bare URL if it cannot be parsed.
pub fn confirmation_url(
    base: &str,
    status: RedirectStatus,
    txnid: Option<&str>,
    correlation_id: &str,
) -> String {
    let mut params = vec![("status", status.as_str())];
    if let Some(txnid) = txnid {
        params.push(("txnid", txnid));
    }
    params.push(("ref", correlation_id));

    match reqwest::Url::parse_with_params(base, &params) {
        Ok(url) => url.to_string(),
        Err(e) => {
            error!(error = %e, "FRONTEND_CONFIRMATION_URL is not a valid URL");
            base.to_string()
        }
    }
}

/// POST /api/payments/initiate
pub async fn initiate_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<InitiationRequest>, JsonRejection>,
) -> Response {
    let request_id = request_id(&headers);

    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => {
            warn!(request_id = ?request_id, error = %rejection.body_text(), "Invalid initiation body");
            let body = ErrorResponse::malformed_body(request_id, rejection.body_text());
            return (StatusCode::BAD_REQUEST, Json(body)).into_response();
        }
    };

    info!(request_id = ?request_id, gateway = %request.gateway, "Payment initiation requested");

    match state.orchestrator.initiate(request).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => attach_request_id(AppError::from(e), request_id).into_response(),
    }
}

/// POST /api/payments/{gateway}/{outcome}
///
/// Always answers with a redirect so the gateway's POST is acknowledged;
/// failures only ever surface as `status=error` plus a correlation id.
pub async fn gateway_callback(
    State(state): State<AppState>,
    Path((gateway, outcome)): Path<(String, String)>,
    request: Request,
) -> Response {
    let correlation_id = request_id(request.headers())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let base = state.redirect.frontend_confirmation_url.clone();

    if !matches!(outcome.as_str(), "success" | "failure") {
        warn!(correlation_id = %correlation_id, outcome = %outcome, "Unknown callback outcome");
        return (StatusCode::NOT_FOUND, "Not Found").into_response();
    }

    let payload = match read_callback_payload(request).await {
        Ok(payload) => payload,
        Err(reason) => {
            warn!(correlation_id = %correlation_id, gateway = %gateway, reason = %reason, "Unreadable callback body");
            return Redirect::to(&confirmation_url(&base, RedirectStatus::Error, None, &correlation_id))
                .into_response();
        }
    };

    info!(correlation_id = %correlation_id, gateway = %gateway, outcome = %outcome, "Gateway callback received");

    let target = match state
        .orchestrator
        .on_callback(&gateway, &payload, &correlation_id)
        .await
    {
        Ok(receipt) => {
            let status = match receipt.order.status {
                OrderStatus::Booked => RedirectStatus::Success,
                OrderStatus::Failed => RedirectStatus::Failed,
                OrderStatus::Pending => RedirectStatus::Error,
            };
            info!(
                correlation_id = %correlation_id,
                outcome = ?receipt.outcome,
                status = %receipt.order.status,
                "Callback processed"
            );
            confirmation_url(&base, status, Some(&receipt.transaction_id), &correlation_id)
        }
        Err(OrchestratorError::OrderNotFound { transaction_id }) => {
            warn!(correlation_id = %correlation_id, txnid = %transaction_id, "Callback for unknown order acknowledged");
            confirmation_url(&base, RedirectStatus::Error, Some(&transaction_id), &correlation_id)
        }
        Err(OrchestratorError::CallbackRejected { .. }) => {
            confirmation_url(&base, RedirectStatus::Error, None, &correlation_id)
        }
        Err(e) => {
            error!(correlation_id = %correlation_id, error = %e, "Callback processing failed");
            confirmation_url(&base, RedirectStatus::Error, None, &correlation_id)
        }
    };

    Redirect::to(&target).into_response()
}

/// Form posts become field maps. Anything else is a JSON object of string
/// fields or a raw encrypted blob.
async fn read_callback_payload(request: Request) -> Result<CallbackPayload, String> {
    let is_form = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.starts_with("application/x-www-form-urlencoded"))
        .unwrap_or(false);

    if is_form {
        let Form(fields) = Form::<HashMap<String, String>>::from_request(request, &())
            .await
            .map_err(|e| e.body_text())?;
        return Ok(CallbackPayload::Form(fields));
    }

    let body = String::from_request(request, &())
        .await
        .map_err(|e| e.body_text())?;
    if let Ok(fields) = serde_json::from_str::<HashMap<String, String>>(&body) {
        return Ok(CallbackPayload::Form(fields));
    }
    Ok(CallbackPayload::Blob(body.trim().to_string()))
}

/// GET /api/payments/status/{txnid}
pub async fn payment_status(
    State(state): State<AppState>,
    Path(reference): Path<String>,
    headers: HeaderMap,
) -> Response {
    match state.orchestrator.payment_status(&reference).await {
        Ok(view) => success_response(view).into_response(),
        Err(e) => attach_request_id(AppError::from(e), request_id(&headers)).into_response(),
    }
}
