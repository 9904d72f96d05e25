use crate::payments::error::PaymentResult;
use crate::payments::types::{CallbackPayload, CallbackResult, GatewayName, OutboundPayload, PaymentRequest};
use async_trait::async_trait;

/// One gateway's request signing and callback verification.
///
/// `parse_callback` never returns an error: every structural or integrity
/// problem becomes [`CallbackResult::Rejected`], and a declined payment is a
/// verified result with a declined status.
#[async_trait]
pub trait GatewayAdapter: Send + Sync {
    fn name(&self) -> GatewayName;

    async fn build_request(&self, request: &PaymentRequest) -> PaymentResult<OutboundPayload>;

    fn parse_callback(&self, payload: &CallbackPayload) -> CallbackResult;
}
