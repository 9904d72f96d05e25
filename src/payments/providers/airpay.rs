//! Airpay V4: OAuth token, AES-CBC `encdata` and the CRC32-checked callback.

use crate::payments::checksum::{
    airpay_alldata_checksum, airpay_key_sha256, airpay_private_key, sorted_params_checksum,
    verify_airpay_callback_hash, AirpayAllData, AirpayCallbackHashFields, AirpayChecksumFormula,
};
use crate::payments::cipher::CbcCipher;
use crate::payments::clock::Clock;
use crate::payments::credentials::AirpayCredentials;
use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::provider::GatewayAdapter;
use crate::payments::providers::airpay_token::{
    AccessTokenSource, AirpayTokenClient, AIRPAY_DEFAULT_TIMEOUT_SECS, AIRPAY_DEFAULT_TOKEN_URL,
};
use crate::payments::sanitize::{normalize_phone, split_name};
use crate::payments::types::{
    CallbackFailure, CallbackPayload, CallbackResult, CallbackStatus, FormField, GatewayName,
    OutboundPayload, PaymentRequest, VerifiedCallback,
};
use crate::payments::utils::digest_prefix;
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine};
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub const AIRPAY_DEFAULT_PAYMENT_URL: &str = "https://payments.airpay.co.in/pay/v4/index.php";
pub const AIRPAY_DEFAULT_MERCHANT_DOMAIN: &str = "http://track.airpay.co.in";
pub const AIRPAY_SUCCESS_STATUS: &str = "200";

/// Form field carrying the encrypted v4 callback.
pub const RESPONSE_FIELD: &str = "response";

#[derive(Debug, Clone)]
pub struct AirpayConfig {
    pub credentials: AirpayCredentials,
    pub token_url: String,
    pub payment_url: String,
    pub merchant_domain: String,
    pub checksum_formula: AirpayChecksumFormula,
    pub timeout_secs: u64,
}

impl Default for AirpayConfig {
    fn default() -> Self {
        Self {
            credentials: AirpayCredentials::default(),
            token_url: AIRPAY_DEFAULT_TOKEN_URL.to_string(),
            payment_url: AIRPAY_DEFAULT_PAYMENT_URL.to_string(),
            merchant_domain: AIRPAY_DEFAULT_MERCHANT_DOMAIN.to_string(),
            checksum_formula: AirpayChecksumFormula::default(),
            timeout_secs: AIRPAY_DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// Encrypted payment payload. Field order is part of the wire format.
#[derive(Debug, Clone, Serialize)]
struct AirpayPaymentData<'a> {
    buyer_email: &'a str,
    buyer_firstname: &'a str,
    buyer_lastname: &'a str,
    buyer_address: &'a str,
    buyer_city: &'a str,
    buyer_state: &'a str,
    buyer_country: &'a str,
    amount: &'a str,
    orderid: &'a str,
    buyer_phone: &'a str,
    buyer_pincode: &'a str,
    iso_currency: &'a str,
    currency_code: &'a str,
    merchant_id: &'a str,
    mer_dom: &'a str,
}

impl AirpayPaymentData<'_> {
    fn as_pairs(&self) -> [(&'static str, &str); 15] {
        [
            ("buyer_email", self.buyer_email),
            ("buyer_firstname", self.buyer_firstname),
            ("buyer_lastname", self.buyer_lastname),
            ("buyer_address", self.buyer_address),
            ("buyer_city", self.buyer_city),
            ("buyer_state", self.buyer_state),
            ("buyer_country", self.buyer_country),
            ("amount", self.amount),
            ("orderid", self.orderid),
            ("buyer_phone", self.buyer_phone),
            ("buyer_pincode", self.buyer_pincode),
            ("iso_currency", self.iso_currency),
            ("currency_code", self.currency_code),
            ("merchant_id", self.merchant_id),
            ("mer_dom", self.mer_dom),
        ]
    }
}

/// Callback fields common to the v4 (encrypted JSON) and v3 (plain form)
/// shapes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct AirpayCallbackFields {
    order_id: String,
    ap_transaction_id: String,
    amount: String,
    status: String,
    message: String,
    secure_hash: String,
    chmod: String,
    customer_vpa: String,
}

/// Numbers and strings both appear in gateway JSON.
fn json_text(value: &JsonValue, keys: &[&str]) -> String {
    keys.iter()
        .find_map(|key| match value.get(*key) {
            Some(JsonValue::String(s)) => Some(s.trim().to_string()),
            Some(JsonValue::Number(n)) => Some(n.to_string()),
            _ => None,
        })
        .unwrap_or_default()
}

impl AirpayCallbackFields {
    fn from_json(value: &JsonValue) -> Self {
        let data = value.get("data").filter(|d| d.is_object()).unwrap_or(value);
        Self {
            order_id: json_text(data, &["orderid", "TRANSACTIONID"]),
            ap_transaction_id: json_text(data, &["ap_transactionid", "APTRANSACTIONID"]),
            amount: json_text(data, &["amount", "AMOUNT"]),
            status: json_text(data, &["transaction_status", "TRANSACTIONSTATUS"]),
            message: json_text(data, &["message", "MESSAGE"]),
            secure_hash: json_text(data, &["ap_securehash", "ap_SecureHash"]),
            chmod: json_text(data, &["chmod", "CHMOD"]),
            customer_vpa: json_text(data, &["CUSTOMERVPA", "customer_vpa"]),
        }
    }

    fn from_form(payload: &CallbackPayload) -> Self {
        let field = |name: &str| {
            payload
                .field(name)
                .map(|v| v.trim().to_string())
                .unwrap_or_default()
        };
        Self {
            order_id: field("TRANSACTIONID"),
            ap_transaction_id: field("APTRANSACTIONID"),
            amount: field("AMOUNT"),
            status: field("TRANSACTIONSTATUS"),
            message: field("MESSAGE"),
            secure_hash: field("ap_SecureHash"),
            chmod: field("CHMOD"),
            customer_vpa: field("CUSTOMERVPA"),
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    Some(value).filter(|v| !v.is_empty()).map(str::to_string)
}

/// OAuth bearer token, CBC-encrypted JSON payload and a date-suffixed
/// checksum. The build fails outright when no token can be obtained.
pub struct AirpayAdapter {
    config: AirpayConfig,
    token_source: Arc<dyn AccessTokenSource>,
    clock: Arc<dyn Clock>,
}

impl AirpayAdapter {
    pub fn new(config: AirpayConfig, clock: Arc<dyn Clock>) -> PaymentResult<Self> {
        let token_client = AirpayTokenClient::new(
            config.credentials.clone(),
            config.token_url.clone(),
            Duration::from_secs(config.timeout_secs),
            clock.clone(),
        )?;
        Ok(Self::with_token_source(config, Arc::new(token_client), clock))
    }

    pub fn with_token_source(
        config: AirpayConfig,
        token_source: Arc<dyn AccessTokenSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            token_source,
            clock,
        }
    }

    fn login(&self) -> PaymentResult<(&str, &str)> {
        let creds = &self.config.credentials;
        Ok((
            creds.username.require("AIRPAY_USERNAME")?,
            creds.password.require("AIRPAY_PASSWORD")?,
        ))
    }

    fn checksum(&self, data: &AirpayPaymentData<'_>, date: &str) -> PaymentResult<String> {
        let (username, password) = self.login()?;
        let alldata = AirpayAllData {
            email: data.buyer_email,
            first_name: data.buyer_firstname,
            last_name: data.buyer_lastname,
            address: data.buyer_address,
            city: data.buyer_city,
            state: data.buyer_state,
            country: data.buyer_country,
            amount: data.amount,
            order_id: data.orderid,
        };
        let key_sha256 = airpay_key_sha256(username, password);
        Ok(match self.config.checksum_formula {
            AirpayChecksumFormula::SortedParams => sorted_params_checksum(&data.as_pairs(), date),
            AirpayChecksumFormula::AllDataWithAddress => {
                airpay_alldata_checksum(&alldata, true, &key_sha256, date)
            }
            AirpayChecksumFormula::AllDataWithoutAddress => {
                airpay_alldata_checksum(&alldata, false, &key_sha256, date)
            }
        })
    }

    fn action_url(&self, token: &str) -> PaymentResult<String> {
        reqwest::Url::parse_with_params(&self.config.payment_url, &[("token", token)])
            .map(|url| url.to_string())
            .map_err(|e| PaymentError::Configuration {
                message: format!("AIRPAY_PAYMENT_URL is invalid: {}", e),
            })
    }

    fn read_callback(&self, payload: &CallbackPayload) -> Result<AirpayCallbackFields, CallbackResult> {
        let blob = match payload.encrypted(RESPONSE_FIELD) {
            Some(blob) => blob,
            None => return Ok(AirpayCallbackFields::from_form(payload)),
        };

        let (username, password) = self.login().map_err(|_| {
            CallbackResult::rejected(
                CallbackFailure::Malformed,
                None,
                "Airpay login is not configured",
            )
        })?;
        let decrypted = CbcCipher::from_login(username, password)
            .decrypt(blob)
            .map_err(|e| {
                warn!(error = %e, "Airpay callback could not be decrypted");
                CallbackResult::rejected(CallbackFailure::DecryptFailure, None, e.to_string())
            })?;
        let json: JsonValue = serde_json::from_str(&decrypted).map_err(|e| {
            CallbackResult::rejected(
                CallbackFailure::Malformed,
                None,
                format!("decrypted callback is not JSON: {}", e),
            )
        })?;
        Ok(AirpayCallbackFields::from_json(&json))
    }
}

#[async_trait]
impl GatewayAdapter for AirpayAdapter {
    fn name(&self) -> GatewayName {
        GatewayName::Airpay
    }

    async fn build_request(&self, request: &PaymentRequest) -> PaymentResult<OutboundPayload> {
        request.validate_common()?;
        let creds = &self.config.credentials;
        let merchant_id = creds.merchant_id.require("AIRPAY_MERCHANT_ID")?;
        let secret = creds.secret_key.require("AIRPAY_SECRET_KEY")?;
        let (username, password) = self.login()?;

        let token = self.token_source.access_token().await?;

        let (first_name, last_name) = split_name(&request.buyer.full_name);
        let phone = normalize_phone(&request.buyer.phone);
        let shipping = request.shipping_or_default();
        let street = shipping.street();
        let amount = request.amount.two_decimals();
        let mer_dom = general_purpose::STANDARD.encode(self.config.merchant_domain.trim());

        let data = AirpayPaymentData {
            buyer_email: request.buyer.email.trim(),
            buyer_firstname: &first_name,
            buyer_lastname: &last_name,
            buyer_address: &street,
            buyer_city: shipping.city.trim(),
            buyer_state: shipping.state.trim(),
            buyer_country: shipping.country.trim(),
            amount: &amount,
            orderid: request.txnid.trim(),
            buyer_phone: &phone,
            buyer_pincode: shipping.pincode.trim(),
            iso_currency: "INR",
            currency_code: "356",
            merchant_id,
            mer_dom: &mer_dom,
        };

        let json = serde_json::to_string(&data).map_err(|e| PaymentError::ValidationError {
            message: format!("payment payload could not be serialized: {}", e),
            field: None,
        })?;
        let encdata = CbcCipher::from_login(username, password).encrypt(&json);
        let checksum = self.checksum(&data, &self.clock.today_string())?;
        let privatekey = airpay_private_key(secret, username, password);

        info!(
            txnid = %data.orderid,
            formula = self.config.checksum_formula.as_str(),
            checksum_prefix = %digest_prefix(&checksum),
            "Airpay payment payload built"
        );

        Ok(OutboundPayload::RedirectForm {
            action_url: self.action_url(&token)?,
            fields: vec![
                FormField::new("privatekey", privatekey),
                FormField::new("merchant_id", merchant_id),
                FormField::new("encdata", encdata),
                FormField::new("checksum", checksum),
                FormField::new("chmod", ""),
            ],
        })
    }

    fn parse_callback(&self, payload: &CallbackPayload) -> CallbackResult {
        let fields = match self.read_callback(payload) {
            Ok(fields) => fields,
            Err(rejected) => return rejected,
        };

        if fields.order_id.is_empty() {
            return CallbackResult::missing("orderid", None);
        }
        let txnid = Some(fields.order_id.as_str());
        if fields.status.is_empty() {
            return CallbackResult::missing("transaction_status", txnid);
        }
        if fields.secure_hash.is_empty() {
            return CallbackResult::missing("ap_securehash", txnid);
        }

        let creds = &self.config.credentials;
        let (merchant_id, username) = match (
            creds.merchant_id.require("AIRPAY_MERCHANT_ID"),
            creds.username.require("AIRPAY_USERNAME"),
        ) {
            (Ok(m), Ok(u)) => (m, u),
            _ => {
                return CallbackResult::rejected(
                    CallbackFailure::Malformed,
                    txnid,
                    "Airpay merchant identity is not configured",
                )
            }
        };

        let hash_fields = AirpayCallbackHashFields {
            order_id: &fields.order_id,
            ap_transaction_id: &fields.ap_transaction_id,
            amount: &fields.amount,
            status: &fields.status,
            message: &fields.message,
            merchant_id,
            username,
            chmod: &fields.chmod,
            customer_vpa: &fields.customer_vpa,
        };
        if let Err(err) = verify_airpay_callback_hash(&hash_fields, &fields.secure_hash) {
            warn!(
                txnid = %fields.order_id,
                received_prefix = %digest_prefix(&fields.secure_hash),
                "Airpay callback hash did not verify"
            );
            return CallbackResult::rejected(CallbackFailure::from(err), txnid, "crc mismatch");
        }

        let status = if fields.status == AIRPAY_SUCCESS_STATUS {
            CallbackStatus::Success
        } else {
            CallbackStatus::Declined
        };
        let is_upi = fields.chmod.trim().eq_ignore_ascii_case("upi");

        CallbackResult::Verified(VerifiedCallback {
            transaction_id: fields.order_id.clone(),
            gateway_transaction_id: non_empty(&fields.ap_transaction_id),
            status,
            status_code: fields.status.clone(),
            message: non_empty(&fields.message),
            amount: non_empty(&fields.amount),
            upi_vpa: if is_upi {
                non_empty(&fields.customer_vpa)
            } else {
                None
            },
        })
    }
}
