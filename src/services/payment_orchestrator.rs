//! Payment Orchestrator Service
//!
//! Creates orders, hands them to the selected gateway adapter, and applies
//! authenticated callbacks to the order state machine:
//!
//! ```text
//! Pending -> Booked   (verified success; utr_code becomes the gateway reference)
//! Pending -> Failed   (verified decline; utr_code keeps the internal txnid)
//! ```
//!
//! Both targets are terminal. Every transition is a compare-and-swap on the
//! stored status, so duplicate or concurrent callbacks apply at most once.

use crate::database::error::{DatabaseError, DatabaseErrorKind};
use crate::database::order_repository::{NewOrder, Order, OrderStatus, OrderStore, UpdateOutcome};
use crate::error::{AppError, AppErrorKind, DomainError, ValidationError};
use crate::payments::error::PaymentError;
use crate::payments::factory::GatewayRegistry;
use crate::payments::types::{
    Amount, BuyerDetails, CallbackPayload, CallbackResult, CallbackStatus, GatewayName,
    OutboundPayload, PaymentRequest, ShippingAddress, UserDefinedFields, VerifiedCallback,
};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

// ============================================================================
// Configuration Types
// ============================================================================

/// Configuration for the payment orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// How many times a lost compare-and-swap is re-read and retried
    pub conflict_retries: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            conflict_retries: 1,
        }
    }
}

// ============================================================================
// Request / Response Types
// ============================================================================

/// Payment initiation as received from an authenticated caller
#[derive(Debug, Clone, Deserialize)]
pub struct InitiationRequest {
    pub gateway: String,
    /// Generated when absent
    #[serde(default)]
    pub txnid: Option<String>,
    pub amount: Amount,
    pub product_name: String,
    #[serde(default = "default_quantity")]
    pub quantity: i32,
    #[serde(default)]
    pub unit: String,
    pub unit_price: Amount,
    pub buyer: BuyerDetails,
    #[serde(default)]
    pub shipping: Option<ShippingAddress>,
    /// `udf1`..`udf20`
    #[serde(default)]
    pub udf: HashMap<String, String>,
    #[serde(default)]
    pub user_id: Option<Uuid>,
}

fn default_quantity() -> i32 {
    1
}

#[derive(Debug, Clone, Serialize)]
pub struct InitiationResponse {
    pub order_id: Uuid,
    pub txnid: String,
    pub gateway: GatewayName,
    pub payload: OutboundPayload,
}

/// What a verified callback did to its order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackOutcome {
    /// The order moved out of `Pending`
    Applied,
    /// The order was already in the status this callback asks for
    AlreadyApplied,
    /// The order is terminal in a different status; left untouched
    Ignored,
}

#[derive(Debug, Clone)]
pub struct CallbackReceipt {
    pub outcome: CallbackOutcome,
    /// Internal txnid the gateway echoed back
    pub transaction_id: String,
    pub order: Order,
}

/// Order state as exposed to status queries
#[derive(Debug, Clone, Serialize)]
pub struct PaymentStatusView {
    pub order_id: Uuid,
    pub utr_code: String,
    pub gateway: String,
    pub payment_option: String,
    pub status: OrderStatus,
    pub amount_paid: String,
    pub updated_at: DateTime<Utc>,
}

impl From<Order> for PaymentStatusView {
    fn from(order: Order) -> Self {
        Self {
            order_id: order.id,
            utr_code: order.utr_code,
            gateway: order.gateway,
            payment_option: order.payment_option,
            status: order.status,
            amount_paid: order.amount_paid.with_scale(2).to_string(),
            updated_at: order.updated_at,
        }
    }
}

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Payment(#[from] PaymentError),

    #[error(transparent)]
    Storage(#[from] DatabaseError),

    #[error("invalid {field}: {reason}")]
    InvalidRequest { field: String, reason: String },

    #[error("no order for transaction {transaction_id}")]
    OrderNotFound { transaction_id: String },

    #[error("transaction {transaction_id} already has a settled order")]
    DuplicateTransaction { transaction_id: String },

    /// Details are in the logs under `correlation_id`.
    #[error("callback rejected (ref {correlation_id})")]
    CallbackRejected { correlation_id: String },

    #[error("order for transaction {transaction_id} kept changing during update")]
    StorageConflict { transaction_id: String },
}

impl From<OrchestratorError> for AppError {
    fn from(err: OrchestratorError) -> Self {
        match err {
            OrchestratorError::Payment(e) => e.into(),
            OrchestratorError::Storage(e) => e.into(),
            OrchestratorError::InvalidRequest { field, reason } => AppError::new(
                AppErrorKind::Validation(ValidationError::InvalidField { field, reason }),
            ),
            OrchestratorError::OrderNotFound { transaction_id } => AppError::new(
                AppErrorKind::Domain(DomainError::OrderNotFound { transaction_id }),
            ),
            OrchestratorError::DuplicateTransaction { transaction_id } => AppError::new(
                AppErrorKind::Domain(DomainError::DuplicateTransaction { transaction_id }),
            ),
            OrchestratorError::CallbackRejected { correlation_id } => {
                AppError::new(AppErrorKind::Domain(DomainError::CallbackRejected))
                    .with_request_id(correlation_id)
            }
            OrchestratorError::StorageConflict { transaction_id } => {
                AppError::new(AppErrorKind::Domain(DomainError::StorageConflict {
                    order_id: transaction_id,
                }))
            }
        }
    }
}

/// Result type for orchestrator operations
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

// ============================================================================
// Main Payment Orchestrator
// ============================================================================

pub struct PaymentOrchestrator {
    registry: GatewayRegistry,
    orders: Arc<dyn OrderStore>,
    config: OrchestratorConfig,
}

impl PaymentOrchestrator {
    pub fn new(
        registry: GatewayRegistry,
        orders: Arc<dyn OrderStore>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            registry,
            orders,
            config,
        }
    }

    // =========================================================================
    // Initiation
    // =========================================================================

    /// Persists a `Pending` order and builds the gateway payload for it.
    ///
    /// A failed build leaves the order `Pending`; calling again with the same
    /// txnid resumes that order instead of creating another.
    pub async fn initiate(
        &self,
        request: InitiationRequest,
    ) -> OrchestratorResult<InitiationResponse> {
        let adapter = self.registry.resolve(&request.gateway)?;
        let gateway = adapter.name();

        if request.quantity <= 0 {
            return Err(OrchestratorError::InvalidRequest {
                field: "quantity".to_string(),
                reason: "quantity must be positive".to_string(),
            });
        }
        if request.product_name.trim().is_empty() {
            return Err(OrchestratorError::InvalidRequest {
                field: "product_name".to_string(),
                reason: "product name is required".to_string(),
            });
        }

        let txnid = request
            .txnid
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().simple().to_string());

        let payment_request = PaymentRequest {
            gateway,
            txnid: txnid.clone(),
            amount: request.amount.clone(),
            product_name: request.product_name.trim().to_string(),
            buyer: request.buyer.clone(),
            shipping: request.shipping.clone(),
            udf: UserDefinedFields::from_named(request.udf.iter())?,
        };
        payment_request.validate_common()?;

        let order = self.open_order(&request, &payment_request).await?;

        let payload = adapter
            .build_request(&payment_request)
            .await
            .map_err(|e| {
                warn!(
                    order_id = %order.id,
                    txnid = %txnid,
                    gateway = %gateway,
                    error = %e,
                    "Gateway request build failed; order left pending"
                );
                e
            })?;

        info!(
            order_id = %order.id,
            txnid = %txnid,
            gateway = %gateway,
            "Payment initiated"
        );

        Ok(InitiationResponse {
            order_id: order.id,
            txnid,
            gateway,
            payload,
        })
    }

    async fn open_order(
        &self,
        request: &InitiationRequest,
        payment: &PaymentRequest,
    ) -> OrchestratorResult<Order> {
        if let Some(existing) = self.orders.find_by_utr_code(&payment.txnid).await? {
            if existing.status == OrderStatus::Pending
                && existing.gateway == payment.gateway.as_str()
            {
                info!(order_id = %existing.id, txnid = %payment.txnid, "Resuming pending order");
                return Ok(existing);
            }
            return Err(OrchestratorError::DuplicateTransaction {
                transaction_id: payment.txnid.clone(),
            });
        }

        let shipping = payment.shipping_or_default();
        let total_price = request.unit_price.value() * BigDecimal::from(request.quantity);
        let new_order = NewOrder {
            user_id: request.user_id,
            gateway: payment.gateway.as_str().to_string(),
            product_name: payment.product_name.clone(),
            quantity: request.quantity,
            unit: request.unit.trim().to_string(),
            total_price,
            amount_paid: payment.amount.value().clone(),
            payment_option: payment.gateway.payment_option_label().to_string(),
            utr_code: payment.txnid.clone(),
            buyer_name: payment.buyer.full_name.trim().to_string(),
            buyer_mobile: payment.buyer.phone.trim().to_string(),
            address_line_1: shipping.address_line_1,
            address_line_2: shipping.address_line_2,
            city: shipping.city,
            state: shipping.state,
            pincode: shipping.pincode,
        };

        match self.orders.create(new_order).await {
            Ok(order) => Ok(order),
            Err(DatabaseError {
                kind: DatabaseErrorKind::UniqueViolation { .. },
            }) => Err(OrchestratorError::DuplicateTransaction {
                transaction_id: payment.txnid.clone(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    // =========================================================================
    // Callbacks
    // =========================================================================

    /// Verifies a gateway callback and applies it to its order.
    ///
    /// Rejected callbacks never touch storage; the reason is logged under
    /// `correlation_id` and the caller only learns that it was rejected.
    pub async fn on_callback(
        &self,
        gateway: &str,
        payload: &CallbackPayload,
        correlation_id: &str,
    ) -> OrchestratorResult<CallbackReceipt> {
        let adapter = self.registry.resolve(gateway)?;

        let verified = match adapter.parse_callback(payload) {
            CallbackResult::Verified(verified) => verified,
            CallbackResult::Rejected(rejection) => {
                warn!(
                    correlation_id = %correlation_id,
                    gateway = %adapter.name(),
                    reason = %rejection.reason,
                    txnid = ?rejection.transaction_id,
                    detail = %rejection.detail,
                    "Callback rejected"
                );
                return Err(OrchestratorError::CallbackRejected {
                    correlation_id: correlation_id.to_string(),
                });
            }
        };

        let target = match verified.status {
            CallbackStatus::Success => OrderStatus::Booked,
            CallbackStatus::Declined => OrderStatus::Failed,
        };

        let mut order = self.find_callback_order(&verified).await?;
        if let Some(reported) = verified.amount.as_deref() {
            let matches = Amount::parse(reported)
                .map(|a| a.value() == &order.amount_paid)
                .unwrap_or(false);
            if !matches {
                warn!(
                    correlation_id = %correlation_id,
                    txnid = %verified.transaction_id,
                    reported = %reported,
                    expected = %order.amount_paid,
                    "Callback amount differs from order amount"
                );
            }
        }

        for attempt in 0..=self.config.conflict_retries {
            if order.status.is_terminal() {
                return Ok(self.settled(order, target, &verified, correlation_id));
            }

            let new_utr = match target {
                OrderStatus::Booked => verified
                    .gateway_transaction_id
                    .clone()
                    .filter(|r| !r.trim().is_empty())
                    .unwrap_or_else(|| order.utr_code.clone()),
                _ => order.utr_code.clone(),
            };

            match self
                .orders
                .update_status_and_utr(order.id, target, &new_utr)
                .await?
            {
                UpdateOutcome::Committed(updated) => {
                    info!(
                        correlation_id = %correlation_id,
                        order_id = %updated.id,
                        txnid = %verified.transaction_id,
                        status = %updated.status,
                        utr_code = %updated.utr_code,
                        "Order status updated from callback"
                    );
                    return Ok(CallbackReceipt {
                        outcome: CallbackOutcome::Applied,
                        transaction_id: verified.transaction_id.clone(),
                        order: updated,
                    });
                }
                UpdateOutcome::Conflict => {
                    warn!(
                        correlation_id = %correlation_id,
                        order_id = %order.id,
                        attempt = attempt + 1,
                        "Concurrent order update; re-reading"
                    );
                    order = self.orders.find_by_id(order.id).await?.ok_or_else(|| {
                        OrchestratorError::OrderNotFound {
                            transaction_id: verified.transaction_id.clone(),
                        }
                    })?;
                }
            }
        }

        if order.status.is_terminal() {
            return Ok(self.settled(order, target, &verified, correlation_id));
        }

        error!(
            correlation_id = %correlation_id,
            order_id = %order.id,
            "Order update kept conflicting"
        );
        Err(OrchestratorError::StorageConflict {
            transaction_id: verified.transaction_id,
        })
    }

    /// Looks the order up by the txnid the gateway echoed. A booked order no
    /// longer carries that txnid, so a repeated success falls back to the
    /// gateway's own reference.
    async fn find_callback_order(&self, verified: &VerifiedCallback) -> OrchestratorResult<Order> {
        if let Some(order) = self
            .orders
            .find_by_utr_code(&verified.transaction_id)
            .await?
        {
            return Ok(order);
        }

        if let Some(reference) = verified
            .gateway_transaction_id
            .as_deref()
            .filter(|r| !r.trim().is_empty())
        {
            if let Some(order) = self.orders.find_by_utr_code(reference).await? {
                return Ok(order);
            }
        }

        warn!(txnid = %verified.transaction_id, "Callback for unknown transaction");
        Err(OrchestratorError::OrderNotFound {
            transaction_id: verified.transaction_id.clone(),
        })
    }

    fn settled(
        &self,
        order: Order,
        target: OrderStatus,
        verified: &VerifiedCallback,
        correlation_id: &str,
    ) -> CallbackReceipt {
        let outcome = if order.status == target {
            info!(
                correlation_id = %correlation_id,
                order_id = %order.id,
                status = %order.status,
                "Duplicate callback; order already settled"
            );
            CallbackOutcome::AlreadyApplied
        } else {
            warn!(
                correlation_id = %correlation_id,
                order_id = %order.id,
                current = %order.status,
                requested = %target,
                "Late callback for settled order ignored"
            );
            CallbackOutcome::Ignored
        };

        CallbackReceipt {
            outcome,
            transaction_id: verified.transaction_id.clone(),
            order,
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Current state of the order whose utr_code is `reference`: the internal
    /// txnid while pending or failed, the gateway reference once booked.
    pub async fn payment_status(&self, reference: &str) -> OrchestratorResult<PaymentStatusView> {
        let order = self
            .orders
            .find_by_utr_code(reference.trim())
            .await?
            .ok_or_else(|| OrchestratorError::OrderNotFound {
                transaction_id: reference.to_string(),
            })?;
        Ok(order.into())
    }
}
