//! End-to-end order lifecycle against the in-memory store: initiation,
//! verified callbacks, idempotent replays and the HTTP edge.

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use mandi_payments::api::{self, AppState};
use mandi_payments::config::RedirectConfig;
use mandi_payments::database::order_repository::{InMemoryOrderStore, OrderStatus, OrderStore};
use mandi_payments::health::HealthChecker;
use mandi_payments::payments::checksum::{payu_response_hash, PayuHashFields, PAYU_UDF_COUNT};
use mandi_payments::payments::credentials::{Credential, PayuCredentials};
use mandi_payments::payments::providers::{PayuAdapter, PayuConfig};
use mandi_payments::payments::{CallbackPayload, GatewayRegistry, OutboundPayload};
use mandi_payments::services::{
    CallbackOutcome, InitiationRequest, OrchestratorConfig, OrchestratorError, PaymentOrchestrator,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tower::ServiceExt;

const SALT: &str = "eCwWELxi";

fn registry() -> GatewayRegistry {
    let mut registry = GatewayRegistry::new();
    registry.register(Arc::new(PayuAdapter::new(PayuConfig {
        credentials: PayuCredentials {
            merchant_key: Credential::set("gtKFFx"),
            salt: Credential::set(SALT),
        },
        ..PayuConfig::default()
    })));
    registry
}

fn orchestrator() -> (Arc<PaymentOrchestrator>, Arc<InMemoryOrderStore>) {
    let store = Arc::new(InMemoryOrderStore::new());
    let orchestrator = PaymentOrchestrator::new(
        registry(),
        store.clone() as Arc<dyn OrderStore>,
        OrchestratorConfig::default(),
    );
    (Arc::new(orchestrator), store)
}

fn initiation(txnid: &str) -> InitiationRequest {
    serde_json::from_value(json!({
        "gateway": "PayU",
        "txnid": txnid,
        "amount": "398.00",
        "product_name": "Basmati Rice",
        "quantity": 2,
        "unit": "quintal",
        "unit_price": "199",
        "buyer": {
            "full_name": "Asha Patil",
            "email": "asha@example.com",
            "phone": "9876543210"
        },
        "shipping": {
            "address_line_1": "4 Market Road",
            "city": "Nashik",
            "state": "Maharashtra",
            "country": "India",
            "pincode": "422001"
        }
    }))
    .unwrap()
}

/// The form PayU would post back for the given outbound payload.
fn signed_callback(payload: &OutboundPayload, status: &str, mihpayid: &str) -> HashMap<String, String> {
    let OutboundPayload::RedirectForm { fields, .. } = payload else {
        panic!("expected redirect form");
    };
    let mut form: HashMap<String, String> = fields
        .iter()
        .map(|f| (f.name.clone(), f.value.clone()))
        .collect();

    let hash = {
        let get = |name: &str| form.get(name).map(String::as_str).unwrap_or("");
        let names: Vec<String> = (1..=PAYU_UDF_COUNT).map(|i| format!("udf{}", i)).collect();
        let mut udf = [""; PAYU_UDF_COUNT];
        for (slot, name) in udf.iter_mut().zip(names.iter()) {
            *slot = get(name);
        }
        payu_response_hash(
            &PayuHashFields {
                key: get("key"),
                txnid: get("txnid"),
                amount: get("amount"),
                productinfo: get("productinfo"),
                firstname: get("firstname"),
                email: get("email"),
                udf,
            },
            status,
            SALT,
            None,
        )
    };

    form.insert("status".to_string(), status.to_string());
    form.insert("mihpayid".to_string(), mihpayid.to_string());
    form.insert("hash".to_string(), hash);
    form
}

#[tokio::test]
async fn success_books_once_and_replays_are_idempotent() {
    let (orchestrator, store) = orchestrator();
    let initiated = orchestrator.initiate(initiation("ORD-1")).await.unwrap();
    let callback = CallbackPayload::Form(signed_callback(&initiated.payload, "success", "PAYU-9001"));

    let first = orchestrator.on_callback("payu", &callback, "corr-1").await.unwrap();
    assert_eq!(first.outcome, CallbackOutcome::Applied);
    assert_eq!(first.order.status, OrderStatus::Booked);
    assert_eq!(first.order.utr_code, "PAYU-9001");

    let replay = orchestrator.on_callback("payu", &callback, "corr-2").await.unwrap();
    assert_eq!(replay.outcome, CallbackOutcome::AlreadyApplied);
    assert_eq!(replay.order.id, first.order.id);
    assert_eq!(store.len().await, 1);

    let view = orchestrator.payment_status("PAYU-9001").await.unwrap();
    assert_eq!(view.status, OrderStatus::Booked);
    assert_eq!(view.payment_option, "PayU");
    assert_eq!(view.amount_paid, "398.00");
}

#[tokio::test]
async fn concurrent_duplicate_callbacks_apply_exactly_once() {
    let (orchestrator, _store) = orchestrator();
    let initiated = orchestrator.initiate(initiation("ORD-2")).await.unwrap();
    let callback = CallbackPayload::Form(signed_callback(&initiated.payload, "success", "PAYU-9002"));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let orchestrator = orchestrator.clone();
            let callback = callback.clone();
            tokio::spawn(async move {
                orchestrator
                    .on_callback("payu", &callback, &format!("corr-{}", i))
                    .await
            })
        })
        .collect();

    let mut applied = 0;
    for handle in handles {
        let receipt = handle.await.unwrap().unwrap();
        assert_eq!(receipt.order.status, OrderStatus::Booked);
        match receipt.outcome {
            CallbackOutcome::Applied => applied += 1,
            CallbackOutcome::AlreadyApplied => {}
            CallbackOutcome::Ignored => panic!("same-status replay must not be ignored"),
        }
    }
    assert_eq!(applied, 1);
}

#[tokio::test]
async fn decline_after_success_leaves_the_booking_alone() {
    let (orchestrator, _store) = orchestrator();
    let initiated = orchestrator.initiate(initiation("ORD-3")).await.unwrap();

    let success = CallbackPayload::Form(signed_callback(&initiated.payload, "success", "PAYU-9003"));
    orchestrator.on_callback("payu", &success, "corr-a").await.unwrap();

    let decline = CallbackPayload::Form(signed_callback(&initiated.payload, "failure", "PAYU-9003"));
    let late = orchestrator.on_callback("payu", &decline, "corr-b").await.unwrap();
    assert_eq!(late.outcome, CallbackOutcome::Ignored);
    assert_eq!(late.order.status, OrderStatus::Booked);
}

#[tokio::test]
async fn forged_callback_changes_nothing() {
    let (orchestrator, _store) = orchestrator();
    let initiated = orchestrator.initiate(initiation("ORD-4")).await.unwrap();

    let mut forged = signed_callback(&initiated.payload, "success", "PAYU-9004");
    forged.insert("amount".to_string(), "1.00".to_string());
    let err = orchestrator
        .on_callback("payu", &CallbackPayload::Form(forged), "corr-forged")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::CallbackRejected { ref correlation_id } if correlation_id == "corr-forged"
    ));

    let view = orchestrator.payment_status("ORD-4").await.unwrap();
    assert_eq!(view.status, OrderStatus::Pending);
}

#[tokio::test]
async fn settled_txnid_cannot_be_reinitiated() {
    let (orchestrator, _store) = orchestrator();
    let initiated = orchestrator.initiate(initiation("ORD-5")).await.unwrap();
    let decline = CallbackPayload::Form(signed_callback(&initiated.payload, "failure", "PAYU-9005"));
    orchestrator.on_callback("payu", &decline, "corr-5").await.unwrap();

    let err = orchestrator.initiate(initiation("ORD-5")).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::DuplicateTransaction { .. }));
}

// ============================================================================
// HTTP edge
// ============================================================================

fn app(orchestrator: Arc<PaymentOrchestrator>, store: Arc<InMemoryOrderStore>) -> axum::Router {
    api::router(AppState {
        orchestrator,
        redirect: RedirectConfig {
            frontend_confirmation_url: "https://shop.example.com/payment/confirmation".to_string(),
        },
        health_checker: HealthChecker::new(store, registry()),
    })
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn http_initiate_then_callback_redirects_to_confirmation() {
    let (orchestrator, store) = orchestrator();
    let app = app(orchestrator, store);

    let body = serde_json::to_string(&json!({
        "gateway": "payu",
        "txnid": "ORD-HTTP-1",
        "amount": "398.00",
        "product_name": "Basmati Rice",
        "unit_price": "398.00",
        "buyer": { "full_name": "Asha Patil", "email": "asha@example.com" }
    }))
    .unwrap();
    let response = app
        .clone()
        .oneshot(
            Request::post("/api/payments/initiate")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    let initiated = body_json(response).await;
    assert_eq!(initiated["txnid"], "ORD-HTTP-1");
    assert_eq!(initiated["payload"]["type"], "redirect_form");

    let payload: OutboundPayload = serde_json::from_value(initiated["payload"].clone()).unwrap();
    let callback = signed_callback(&payload, "success", "PAYU-HTTP-1");
    let response = app
        .clone()
        .oneshot(
            Request::post("/api/payments/payu/success")
                .header(header::CONTENT_TYPE, "application/json")
                .header("x-request-id", "corr-http")
                .body(Body::from(serde_json::to_string(&callback).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        response.headers()[header::LOCATION],
        "https://shop.example.com/payment/confirmation?status=success&txnid=ORD-HTTP-1&ref=corr-http"
    );

    let response = app
        .oneshot(
            Request::get("/api/payments/status/PAYU-HTTP-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let status = body_json(response).await;
    assert_eq!(status["success"], true);
    assert_eq!(status["data"]["status"], "booked");
}

#[tokio::test]
async fn http_rejected_callback_redirects_with_error_and_reference_only() {
    let (orchestrator, store) = orchestrator();
    let app = app(orchestrator, store);

    let response = app
        .oneshot(
            Request::post("/api/payments/payu/failure")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .header("x-request-id", "corr-bad")
                .body(Body::from("txnid=ORD-X&status=success&hash=deadbeef"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        response.headers()[header::LOCATION],
        "https://shop.example.com/payment/confirmation?status=error&ref=corr-bad"
    );
}

#[tokio::test]
async fn http_unknown_gateway_on_initiate_is_a_client_error() {
    let (orchestrator, store) = orchestrator();
    let app = app(orchestrator, store);

    let body = json!({
        "gateway": "paytm",
        "amount": "10",
        "product_name": "Onion",
        "unit_price": "10",
        "buyer": { "full_name": "A", "email": "a@example.com" }
    })
    .to_string();
    let response = app
        .oneshot(
            Request::post("/api/payments/initiate")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error = body_json(response).await;
    assert_eq!(error["error"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn http_sub_paise_amount_is_refused_before_any_order_exists() {
    let (orchestrator, store) = orchestrator();
    let app = app(orchestrator, store.clone());

    let body = json!({
        "gateway": "PayU",
        "amount": "199.999",
        "product_name": "Onion",
        "unit_price": "199.999",
        "buyer": { "full_name": "A", "email": "a@example.com" }
    })
    .to_string();
    let response = app
        .oneshot(
            Request::post("/api/payments/initiate")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error = body_json(response).await;
    assert_eq!(error["error"], "VALIDATION_ERROR");
    assert_eq!(store.len().await, 0);
}

#[tokio::test]
async fn http_health_reports_storage_and_gateways() {
    let (orchestrator, store) = orchestrator();
    let response = app(orchestrator, store)
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let health = body_json(response).await;
    assert_eq!(health["status"], "Healthy");
    assert_eq!(health["checks"]["gateways"]["details"], "payu");
}
