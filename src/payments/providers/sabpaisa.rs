//! SabPaisa: one AES-GCM/HMAC blob out, the same scheme back on the callback.

use crate::payments::cipher::{CipherError, GcmHmacCipher};
use crate::payments::credentials::SabpaisaCredentials;
use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::provider::GatewayAdapter;
use crate::payments::sanitize::payer_name;
use crate::payments::types::{
    CallbackFailure, CallbackPayload, CallbackResult, CallbackStatus, GatewayName,
    OutboundPayload, PaymentRequest, VerifiedCallback,
};
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::{info, warn};

pub const SABPAISA_DEFAULT_BASE_URL: &str =
    "https://securepay.sabpaisa.in/SabPaisa/sabPaisaInit?v=1";

/// Form field carrying the encrypted blob in both directions.
pub const ENC_DATA_FIELD: &str = "encData";

#[derive(Debug, Clone)]
pub struct SabpaisaConfig {
    pub credentials: SabpaisaCredentials,
    pub base_url: String,
    pub callback_url: String,
}

impl Default for SabpaisaConfig {
    fn default() -> Self {
        Self {
            credentials: SabpaisaCredentials::default(),
            base_url: SABPAISA_DEFAULT_BASE_URL.to_string(),
            callback_url: "http://localhost:8000/api/payments/sabpaisa/success".to_string(),
        }
    }
}

/// Single encrypted `encData` blob plus the cleartext client code.
pub struct SabpaisaAdapter {
    config: SabpaisaConfig,
}

impl SabpaisaAdapter {
    pub fn new(config: SabpaisaConfig) -> Self {
        Self { config }
    }

    fn cipher(&self) -> PaymentResult<GcmHmacCipher> {
        let key = self.config.credentials.auth_key.require("SABPAISA_AUTH_KEY")?;
        let iv = self.config.credentials.auth_iv.require("SABPAISA_AUTH_IV")?;
        Ok(GcmHmacCipher::from_base64(key, iv)?)
    }

    /// `key=value` pairs joined with `&`; values are inlined without quoting
    /// or URL encoding.
    fn plaintext(&self, request: &PaymentRequest) -> PaymentResult<String> {
        let creds = &self.config.credentials;
        let name_source = if request.buyer.full_name.trim().is_empty() {
            request.buyer.email.trim()
        } else {
            request.buyer.full_name.trim()
        };

        let mut params: Vec<(String, String)> = vec![
            ("payerName".into(), payer_name(name_source)),
            ("payerEmail".into(), request.buyer.email.trim().to_string()),
            ("payerMobile".into(), request.buyer.phone.trim().to_string()),
            ("clientTxnId".into(), request.txnid.trim().to_string()),
            ("amount".into(), request.amount.plain()),
            (
                "clientCode".into(),
                creds.client_code.require("SABPAISA_CLIENT_CODE")?.trim().to_string(),
            ),
            (
                "transUserName".into(),
                creds.username.require("SABPAISA_USERNAME")?.trim().to_string(),
            ),
            (
                "transUserPassword".into(),
                creds.password.require("SABPAISA_PASSWORD")?.trim().to_string(),
            ),
            ("callbackUrl".into(), self.config.callback_url.trim().to_string()),
            ("amountType".into(), "INR".to_string()),
            ("channelId".into(), "W".to_string()),
        ];
        for (index, value) in request.udf.non_empty() {
            params.push((format!("udf{}", index), value.to_string()));
        }

        Ok(params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&"))
    }
}

/// Splits on `&`, then on the first `=`. No URL decoding.
pub fn parse_pairs(decrypted: &str) -> HashMap<String, String> {
    decrypted
        .split('&')
        .filter(|segment| !segment.is_empty())
        .filter_map(|segment| {
            segment
                .split_once('=')
                .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        })
        .collect()
}

#[async_trait]
impl GatewayAdapter for SabpaisaAdapter {
    fn name(&self) -> GatewayName {
        GatewayName::Sabpaisa
    }

    async fn build_request(&self, request: &PaymentRequest) -> PaymentResult<OutboundPayload> {
        request.validate_common()?;
        let client_code = self
            .config
            .credentials
            .client_code
            .require("SABPAISA_CLIENT_CODE")?
            .trim()
            .to_string();
        let cipher = self.cipher()?;
        let plaintext = self.plaintext(request)?;
        let enc_data = cipher.encrypt(&plaintext).map_err(PaymentError::from)?;

        info!(
            txnid = %request.txnid,
            blob_len = enc_data.len(),
            "SabPaisa payment blob encrypted"
        );

        Ok(OutboundPayload::EncryptedBlob {
            endpoint_url: self.config.base_url.clone(),
            enc_data,
            client_code,
        })
    }

    fn parse_callback(&self, payload: &CallbackPayload) -> CallbackResult {
        let blob = match payload.encrypted(ENC_DATA_FIELD) {
            Some(blob) => blob,
            None => return CallbackResult::missing(ENC_DATA_FIELD, None),
        };

        let cipher = match self.cipher() {
            Ok(cipher) => cipher,
            Err(_) => {
                return CallbackResult::rejected(
                    CallbackFailure::Malformed,
                    None,
                    "SabPaisa key material is not configured",
                )
            }
        };

        let decrypted = match cipher.decrypt(blob) {
            Ok(text) => text,
            Err(err) => {
                let reason = match err {
                    CipherError::Tampered => CallbackFailure::TamperDetected,
                    _ => CallbackFailure::DecryptFailure,
                };
                warn!(reason = %reason, "SabPaisa callback could not be decrypted");
                return CallbackResult::rejected(reason, None, err.to_string());
            }
        };

        let fields = parse_pairs(&decrypted);
        let get = |name: &str| {
            fields
                .get(name)
                .map(String::as_str)
                .filter(|v| !v.is_empty())
        };

        let txnid = match get("clientTxnId") {
            Some(txnid) => txnid,
            None => return CallbackResult::missing("clientTxnId", None),
        };
        let status = get("status").unwrap_or("");
        let outcome = if status.eq_ignore_ascii_case("SUCCESS") {
            CallbackStatus::Success
        } else {
            CallbackStatus::Declined
        };

        CallbackResult::Verified(VerifiedCallback {
            transaction_id: txnid.to_string(),
            gateway_transaction_id: get("sabpaisaTxnId").map(str::to_string),
            status: outcome,
            status_code: status.to_string(),
            message: get("statusMessage").map(str::to_string),
            amount: get("amount").or_else(|| get("paidAmount")).map(str::to_string),
            upi_vpa: None,
        })
    }
}
