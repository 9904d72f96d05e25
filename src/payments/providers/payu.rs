//! PayU hosted checkout: a SHA-512 signed redirect form and its mirror-hashed callback.

use crate::payments::checksum::{
    payu_request_hash, verify_payu_response_hash, PayuHashFields, PAYU_UDF_COUNT,
};
use crate::payments::credentials::PayuCredentials;
use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::provider::GatewayAdapter;
use crate::payments::types::{
    CallbackFailure, CallbackPayload, CallbackResult, CallbackStatus, FormField, GatewayName,
    OutboundPayload, PaymentRequest, VerifiedCallback,
};
use crate::payments::utils::digest_prefix;
use async_trait::async_trait;
use tracing::{info, warn};

pub const PAYU_DEFAULT_BASE_URL: &str = "https://secure.payu.in/_payment";

#[derive(Debug, Clone)]
pub struct PayuConfig {
    pub credentials: PayuCredentials,
    pub base_url: String,
    pub success_url: String,
    pub failure_url: String,
}

impl Default for PayuConfig {
    fn default() -> Self {
        Self {
            credentials: PayuCredentials::default(),
            base_url: PAYU_DEFAULT_BASE_URL.to_string(),
            success_url: "http://localhost:8000/api/payments/payu/success".to_string(),
            failure_url: "http://localhost:8000/api/payments/payu/failure".to_string(),
        }
    }
}

/// Hash-signed auto-submit form. No server-side HTTP call is made.
pub struct PayuAdapter {
    config: PayuConfig,
}

impl PayuAdapter {
    pub fn new(config: PayuConfig) -> Self {
        Self { config }
    }

    fn udf_values(request: &PaymentRequest) -> PaymentResult<[String; PAYU_UDF_COUNT]> {
        if let Some(max) = request.udf.max_index() {
            if usize::from(max) > PAYU_UDF_COUNT {
                return Err(PaymentError::validation(
                    format!("PayU accepts at most {} user-defined fields", PAYU_UDF_COUNT),
                    format!("udf{}", max),
                ));
            }
        }
        let mut values: [String; PAYU_UDF_COUNT] = Default::default();
        for (slot, value) in values.iter_mut().enumerate() {
            *value = request.udf.get((slot + 1) as u8).to_string();
        }
        if values[0].is_empty() {
            values[0] = request.product_name.trim().to_string();
        }
        Ok(values)
    }
}

fn udf_refs(values: &[String; PAYU_UDF_COUNT]) -> [&str; PAYU_UDF_COUNT] {
    let mut refs = [""; PAYU_UDF_COUNT];
    for (slot, value) in refs.iter_mut().zip(values.iter()) {
        *slot = value.as_str();
    }
    refs
}

#[async_trait]
impl GatewayAdapter for PayuAdapter {
    fn name(&self) -> GatewayName {
        GatewayName::Payu
    }

    async fn build_request(&self, request: &PaymentRequest) -> PaymentResult<OutboundPayload> {
        request.validate_common()?;
        let key = self.config.credentials.merchant_key.require("PAYU_MERCHANT_KEY")?;
        let salt = self.config.credentials.salt.require("PAYU_SALT")?;

        let productinfo = request.product_name.trim();
        if productinfo.is_empty() {
            return Err(PaymentError::validation("product name is required", "product_name"));
        }
        let firstname = request.buyer.full_name.trim();
        if firstname.is_empty() {
            return Err(PaymentError::validation("buyer name is required", "full_name"));
        }

        let udf = Self::udf_values(request)?;
        let fields = PayuHashFields {
            key,
            txnid: request.txnid.trim(),
            amount: request.amount.as_given(),
            productinfo,
            firstname,
            email: request.buyer.email.trim(),
            udf: udf_refs(&udf),
        };
        let hash = payu_request_hash(&fields, salt);

        let mut form = vec![
            FormField::new("key", fields.key),
            FormField::new("txnid", fields.txnid),
            FormField::new("amount", fields.amount),
            FormField::new("productinfo", fields.productinfo),
            FormField::new("firstname", fields.firstname),
            FormField::new("email", fields.email),
            FormField::new("phone", request.buyer.phone.trim()),
            FormField::new("surl", self.config.success_url.as_str()),
            FormField::new("furl", self.config.failure_url.as_str()),
        ];
        for (index, value) in udf.iter().enumerate() {
            if !value.is_empty() {
                form.push(FormField::new(format!("udf{}", index + 1), value.as_str()));
            }
        }
        form.push(FormField::new("hash", hash.as_str()));

        info!(
            txnid = %fields.txnid,
            hash_prefix = %digest_prefix(&hash),
            "PayU payment form signed"
        );

        Ok(OutboundPayload::RedirectForm {
            action_url: self.config.base_url.clone(),
            fields: form,
        })
    }

    fn parse_callback(&self, payload: &CallbackPayload) -> CallbackResult {
        if matches!(payload, CallbackPayload::Blob(_)) {
            return CallbackResult::rejected(
                CallbackFailure::Malformed,
                None,
                "PayU callbacks are form posts",
            );
        }

        let field = |name: &str| payload.field(name).map(str::trim).unwrap_or("");
        let txnid = field("txnid");
        if txnid.is_empty() {
            return CallbackResult::missing("txnid", None);
        }
        let status = field("status");
        if status.is_empty() {
            return CallbackResult::missing("status", Some(txnid));
        }
        let received_hash = field("hash");
        if received_hash.is_empty() {
            return CallbackResult::missing("hash", Some(txnid));
        }

        let (key, salt) = match (
            self.config.credentials.merchant_key.require("PAYU_MERCHANT_KEY"),
            self.config.credentials.salt.require("PAYU_SALT"),
        ) {
            (Ok(key), Ok(salt)) => (key, salt),
            _ => {
                return CallbackResult::rejected(
                    CallbackFailure::Malformed,
                    Some(txnid),
                    "PayU credentials are not configured",
                )
            }
        };

        let mut udf = [""; PAYU_UDF_COUNT];
        let udf_names: Vec<String> = (1..=PAYU_UDF_COUNT).map(|i| format!("udf{}", i)).collect();
        for (slot, name) in udf.iter_mut().zip(udf_names.iter()) {
            *slot = field(name.as_str());
        }

        let fields = PayuHashFields {
            key,
            txnid,
            amount: field("amount"),
            productinfo: field("productinfo"),
            firstname: field("firstname"),
            email: field("email"),
            udf,
        };
        let additional_charges = payload
            .field("additional_charges")
            .map(str::trim)
            .filter(|c| !c.is_empty());

        if let Err(err) =
            verify_payu_response_hash(&fields, status, salt, additional_charges, received_hash)
        {
            warn!(
                txnid = %txnid,
                received_prefix = %digest_prefix(received_hash),
                "PayU callback hash did not verify"
            );
            return CallbackResult::rejected(CallbackFailure::from(err), Some(txnid), "hash mismatch");
        }

        let non_empty = |name: &str| Some(field(name)).filter(|v| !v.is_empty()).map(str::to_string);
        let outcome = if status.eq_ignore_ascii_case("success") {
            CallbackStatus::Success
        } else {
            CallbackStatus::Declined
        };

        CallbackResult::Verified(VerifiedCallback {
            transaction_id: txnid.to_string(),
            gateway_transaction_id: non_empty("mihpayid"),
            status: outcome,
            status_code: status.to_string(),
            message: non_empty("field9").or_else(|| non_empty("error_Message")),
            amount: non_empty("amount"),
            upi_vpa: non_empty("upi_va"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::checksum::payu_response_hash;
    use crate::payments::credentials::Credential;
    use crate::payments::types::{Amount, BuyerDetails, UserDefinedFields};
    use std::collections::HashMap;

    fn adapter() -> PayuAdapter {
        PayuAdapter::new(PayuConfig {
            credentials: PayuCredentials {
                merchant_key: Credential::set("gtKFFx"),
                salt: Credential::set("eCwWELxi"),
            },
            ..PayuConfig::default()
        })
    }

    fn request() -> PaymentRequest {
        PaymentRequest {
            gateway: GatewayName::Payu,
            txnid: "TXN123".to_string(),
            amount: Amount::parse("199.00").unwrap(),
            product_name: "Wheat Flour".to_string(),
            buyer: BuyerDetails {
                full_name: "Test".to_string(),
                email: "test@example.com".to_string(),
                phone: "9876543210".to_string(),
            },
            shipping: None,
            udf: UserDefinedFields::new(),
        }
    }

    fn signed_callback(status: &str) -> HashMap<String, String> {
        let mut udf = [""; PAYU_UDF_COUNT];
        udf[0] = "Wheat Flour";
        let fields = PayuHashFields {
            key: "gtKFFx",
            txnid: "TXN123",
            amount: "199.00",
            productinfo: "Wheat Flour",
            firstname: "Test",
            email: "test@example.com",
            udf,
        };
        let hash = payu_response_hash(&fields, status, "eCwWELxi", None);
        [
            ("key", "gtKFFx"),
            ("txnid", "TXN123"),
            ("amount", "199.00"),
            ("productinfo", "Wheat Flour"),
            ("firstname", "Test"),
            ("email", "test@example.com"),
            ("udf1", "Wheat Flour"),
            ("status", status),
            ("mihpayid", "403993715521"),
            ("field9", "Transaction Completed Successfully"),
            ("hash", hash.as_str()),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[tokio::test]
    async fn build_request_produces_signed_form() {
        let payload = adapter().build_request(&request()).await.unwrap();
        let OutboundPayload::RedirectForm { action_url, fields } = &payload else {
            panic!("expected redirect form");
        };
        assert_eq!(action_url, PAYU_DEFAULT_BASE_URL);

        let names: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "key", "txnid", "amount", "productinfo", "firstname", "email", "phone", "surl",
                "furl", "udf1", "hash"
            ]
        );
        assert_eq!(payload.field("amount"), Some("199.00"));
        assert_eq!(payload.field("udf1"), Some("Wheat Flour"));

        let mut udf = [""; PAYU_UDF_COUNT];
        udf[0] = "Wheat Flour";
        let expected = payu_request_hash(
            &PayuHashFields {
                key: "gtKFFx",
                txnid: "TXN123",
                amount: "199.00",
                productinfo: "Wheat Flour",
                firstname: "Test",
                email: "test@example.com",
                udf,
            },
            "eCwWELxi",
        );
        assert_eq!(payload.field("hash"), Some(expected.as_str()));
        assert_eq!(expected.len(), 128);
    }

    #[tokio::test]
    async fn build_request_keeps_amount_as_given() {
        let mut req = request();
        req.amount = Amount::parse("199").unwrap();
        let payload = adapter().build_request(&req).await.unwrap();
        assert_eq!(payload.field("amount"), Some("199"));
    }

    #[tokio::test]
    async fn build_request_rejects_udf_beyond_ten() {
        let mut req = request();
        req.udf.insert(11, "x").unwrap();
        let err = adapter().build_request(&req).await.unwrap_err();
        assert!(matches!(err, PaymentError::ValidationError { .. }));
    }

    #[tokio::test]
    async fn build_request_requires_credentials() {
        let err = PayuAdapter::new(PayuConfig::default())
            .build_request(&request())
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::Configuration { .. }));
    }

    #[test]
    fn success_callback_verifies() {
        let result = adapter().parse_callback(&CallbackPayload::Form(signed_callback("success")));
        let CallbackResult::Verified(verified) = result else {
            panic!("expected verified callback");
        };
        assert_eq!(verified.transaction_id, "TXN123");
        assert_eq!(verified.status, CallbackStatus::Success);
        assert_eq!(verified.gateway_transaction_id.as_deref(), Some("403993715521"));
        assert_eq!(
            verified.message.as_deref(),
            Some("Transaction Completed Successfully")
        );
    }

    #[test]
    fn failure_callback_is_valid_decline() {
        let result = adapter().parse_callback(&CallbackPayload::Form(signed_callback("failure")));
        assert!(result.is_valid());
        let CallbackResult::Verified(verified) = result else {
            unreachable!()
        };
        assert_eq!(verified.status, CallbackStatus::Declined);
    }

    #[test]
    fn altered_signed_field_is_checksum_mismatch() {
        for name in ["txnid", "amount", "productinfo", "firstname", "email", "udf1", "status"] {
            let mut form = signed_callback("success");
            if let Some(value) = form.get_mut(name) {
                value.push('x');
            }
            let result = adapter().parse_callback(&CallbackPayload::Form(form));
            assert_eq!(
                result.failure(),
                Some(CallbackFailure::ChecksumMismatch),
                "field {}",
                name
            );
        }
    }

    #[test]
    fn uppercase_hash_is_accepted() {
        let mut form = signed_callback("success");
        if let Some(hash) = form.get_mut("hash") {
            *hash = hash.to_uppercase();
        }
        assert!(adapter().parse_callback(&CallbackPayload::Form(form)).is_valid());
    }

    #[test]
    fn missing_hash_is_rejected() {
        let mut form = signed_callback("success");
        form.remove("hash");
        let result = adapter().parse_callback(&CallbackPayload::Form(form));
        assert_eq!(result.failure(), Some(CallbackFailure::MissingField));
        assert_eq!(result.transaction_id(), Some("TXN123"));
    }

    #[test]
    fn blob_payload_is_malformed() {
        let result = adapter().parse_callback(&CallbackPayload::Blob("abc".to_string()));
        assert_eq!(result.failure(), Some(CallbackFailure::Malformed));
    }
}
