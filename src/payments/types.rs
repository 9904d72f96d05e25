use crate::payments::error::{PaymentError, PaymentResult};
use bigdecimal::BigDecimal;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum GatewayName {
    Payu,
    Sabpaisa,
    Airpay,
}

impl GatewayName {
    pub const ALL: [GatewayName; 3] = [GatewayName::Payu, GatewayName::Sabpaisa, GatewayName::Airpay];

    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayName::Payu => "payu",
            GatewayName::Sabpaisa => "sabpaisa",
            GatewayName::Airpay => "airpay",
        }
    }

    /// Label stored in `orders.payment_option`.
    pub fn payment_option_label(&self) -> &'static str {
        match self {
            GatewayName::Payu => "PayU",
            GatewayName::Sabpaisa => "SabPaisa",
            GatewayName::Airpay => "Airpay",
        }
    }
}

impl std::fmt::Display for GatewayName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for GatewayName {
    type Err = PaymentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "payu" => Ok(GatewayName::Payu),
            "sabpaisa" | "sab-paisa" => Ok(GatewayName::Sabpaisa),
            "airpay" | "airpay_v4" | "airpay-v4" => Ok(GatewayName::Airpay),
            _ => Err(PaymentError::validation(
                format!("unsupported gateway: {}", value),
                "gateway",
            )),
        }
    }
}

// ============================================================================
// Amount
// ============================================================================

// Paise precision: every gateway must see the same value.
static PLAIN_DECIMAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]+(\.[0-9]{1,2})?$").expect("static regex"));

/// A positive decimal amount with at most two fraction digits, remembering
/// the caller's exact rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Amount {
    raw: String,
    value: BigDecimal,
}

impl Amount {
    pub fn parse(raw: &str) -> PaymentResult<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(PaymentError::validation("amount is required", "amount"));
        }
        if !PLAIN_DECIMAL.is_match(trimmed) {
            return Err(PaymentError::validation(
                format!("invalid decimal amount: {}", trimmed),
                "amount",
            ));
        }
        let value = BigDecimal::from_str(trimmed).map_err(|_| {
            PaymentError::validation(format!("invalid decimal amount: {}", trimmed), "amount")
        })?;
        if value <= BigDecimal::from(0) {
            return Err(PaymentError::validation(
                "amount must be greater than zero",
                "amount",
            ));
        }
        Ok(Self {
            raw: trimmed.to_string(),
            value,
        })
    }

    /// Exactly what the caller sent.
    pub fn as_given(&self) -> &str {
        &self.raw
    }

    pub fn value(&self) -> &BigDecimal {
        &self.value
    }

    /// Two fraction digits, e.g. `199` -> `199.00`.
    pub fn two_decimals(&self) -> String {
        self.value.round(2).with_scale(2).to_string()
    }

    /// Trailing zeros dropped but at least one fraction digit kept:
    /// `199` -> `199.0`, `199.50` -> `199.5`.
    pub fn plain(&self) -> String {
        let rendered = self.value.to_string();
        match rendered.split_once('.') {
            Some((whole, fraction)) => {
                let fraction = fraction.trim_end_matches('0');
                if fraction.is_empty() {
                    format!("{}.0", whole)
                } else {
                    format!("{}.{}", whole, fraction)
                }
            }
            None => format!("{}.0", rendered),
        }
    }
}

impl Serialize for Amount {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Amount::parse(&raw).map_err(|e| serde::de::Error::custom(e.to_string()))
    }
}

// ============================================================================
// User-defined fields
// ============================================================================

pub const MAX_UDF_INDEX: u8 = 20;

/// Numbered free-form fields `udf1..udf20`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDefinedFields(BTreeMap<u8, String>);

impl UserDefinedFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, index: u8, value: impl Into<String>) -> PaymentResult<()> {
        if index == 0 || index > MAX_UDF_INDEX {
            return Err(PaymentError::validation(
                format!("user-defined field index must be 1..={}", MAX_UDF_INDEX),
                format!("udf{}", index),
            ));
        }
        self.0.insert(index, value.into());
        Ok(())
    }

    /// Accepts keys written as `udf3` or `3`.
    pub fn from_named<I, K, V>(entries: I) -> PaymentResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut fields = Self::new();
        for (key, value) in entries {
            let key = key.as_ref().trim();
            let digits = key
                .strip_prefix("udf")
                .or_else(|| key.strip_prefix("UDF"))
                .unwrap_or(key);
            let index = digits.parse::<u8>().map_err(|_| {
                PaymentError::validation(format!("invalid user-defined field: {}", key), "udf")
            })?;
            fields.insert(index, value)?;
        }
        Ok(fields)
    }

    /// Trimmed value, empty string when absent.
    pub fn get(&self, index: u8) -> &str {
        self.0.get(&index).map(|v| v.trim()).unwrap_or("")
    }

    pub fn max_index(&self) -> Option<u8> {
        self.0.keys().next_back().copied()
    }

    /// Non-empty fields in ascending index order.
    pub fn non_empty(&self) -> impl Iterator<Item = (u8, &str)> {
        self.0
            .iter()
            .map(|(i, v)| (*i, v.trim()))
            .filter(|(_, v)| !v.is_empty())
    }
}

// ============================================================================
// Request side
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuyerDetails {
    pub full_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShippingAddress {
    #[serde(default)]
    pub address_line_1: String,
    #[serde(default)]
    pub address_line_2: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub pincode: String,
}

impl ShippingAddress {
    /// Both address lines joined with a single space.
    pub fn street(&self) -> String {
        [self.address_line_1.trim(), self.address_line_2.trim()]
            .iter()
            .filter(|s| !s.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// One payment attempt as handed to an adapter.
#[derive(Debug, Clone)]
pub struct PaymentRequest {
    pub gateway: GatewayName,
    pub txnid: String,
    pub amount: Amount,
    pub product_name: String,
    pub buyer: BuyerDetails,
    pub shipping: Option<ShippingAddress>,
    pub udf: UserDefinedFields,
}

impl PaymentRequest {
    /// Checks shared by every adapter before anything is signed.
    pub fn validate_common(&self) -> PaymentResult<()> {
        if self.txnid.trim().is_empty() {
            return Err(PaymentError::validation("txnid is required", "txnid"));
        }
        if self.buyer.email.trim().is_empty() {
            return Err(PaymentError::validation("buyer email is required", "email"));
        }
        if !self.buyer.email.contains('@') {
            return Err(PaymentError::validation("buyer email is malformed", "email"));
        }
        Ok(())
    }

    pub fn shipping_or_default(&self) -> ShippingAddress {
        self.shipping.clone().unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormField {
    pub name: String,
    pub value: String,
}

impl FormField {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// What the browser is sent to the gateway with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundPayload {
    RedirectForm {
        action_url: String,
        fields: Vec<FormField>,
    },
    EncryptedBlob {
        endpoint_url: String,
        enc_data: String,
        client_code: String,
    },
}

impl OutboundPayload {
    pub fn field(&self, name: &str) -> Option<&str> {
        match self {
            OutboundPayload::RedirectForm { fields, .. } => fields
                .iter()
                .find(|f| f.name == name)
                .map(|f| f.value.as_str()),
            OutboundPayload::EncryptedBlob {
                enc_data,
                client_code,
                ..
            } => match name {
                "encData" => Some(enc_data.as_str()),
                "clientCode" => Some(client_code.as_str()),
                _ => None,
            },
        }
    }
}

// ============================================================================
// Callback side
// ============================================================================

/// Raw callback transport: URL-encoded form fields or one opaque blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackPayload {
    Form(HashMap<String, String>),
    Blob(String),
}

impl CallbackPayload {
    pub fn form<I, K, V>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        CallbackPayload::Form(
            fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Form field by exact name. Always `None` for a blob.
    pub fn field(&self, name: &str) -> Option<&str> {
        match self {
            CallbackPayload::Form(fields) => fields.get(name).map(String::as_str),
            CallbackPayload::Blob(_) => None,
        }
    }

    /// The encrypted payload: the named form field, or the whole blob.
    pub fn encrypted(&self, field: &str) -> Option<&str> {
        match self {
            CallbackPayload::Form(fields) => fields
                .get(field)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty()),
            CallbackPayload::Blob(blob) => Some(blob.trim()).filter(|v| !v.is_empty()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackStatus {
    Success,
    Declined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackFailure {
    ChecksumMismatch,
    MissingField,
    DecryptFailure,
    TamperDetected,
    Malformed,
}

impl std::fmt::Display for CallbackFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            CallbackFailure::ChecksumMismatch => "checksum_mismatch",
            CallbackFailure::MissingField => "missing_field",
            CallbackFailure::DecryptFailure => "decrypt_failure",
            CallbackFailure::TamperDetected => "tamper_detected",
            CallbackFailure::Malformed => "malformed",
        };
        f.write_str(label)
    }
}

/// An authenticated callback. Declines are valid results too.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedCallback {
    pub transaction_id: String,
    pub gateway_transaction_id: Option<String>,
    pub status: CallbackStatus,
    /// Raw gateway status text, e.g. `success` or `200`.
    pub status_code: String,
    pub message: Option<String>,
    pub amount: Option<String>,
    pub upi_vpa: Option<String>,
}

/// A callback that could not be authenticated. `detail` is for internal logs
/// and must never reach a response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackRejection {
    pub reason: CallbackFailure,
    pub transaction_id: Option<String>,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackResult {
    Verified(VerifiedCallback),
    Rejected(CallbackRejection),
}

impl CallbackResult {
    pub fn rejected(
        reason: CallbackFailure,
        transaction_id: Option<&str>,
        detail: impl Into<String>,
    ) -> Self {
        CallbackResult::Rejected(CallbackRejection {
            reason,
            transaction_id: transaction_id.map(str::to_string),
            detail: detail.into(),
        })
    }

    pub fn missing(field: &str, transaction_id: Option<&str>) -> Self {
        Self::rejected(
            CallbackFailure::MissingField,
            transaction_id,
            format!("missing field {}", field),
        )
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, CallbackResult::Verified(_))
    }

    pub fn transaction_id(&self) -> Option<&str> {
        match self {
            CallbackResult::Verified(v) => Some(v.transaction_id.as_str()),
            CallbackResult::Rejected(r) => r.transaction_id.as_deref(),
        }
    }

    pub fn failure(&self) -> Option<CallbackFailure> {
        match self {
            CallbackResult::Verified(_) => None,
            CallbackResult::Rejected(r) => Some(r.reason),
        }
    }
}

impl From<PaymentError> for CallbackFailure {
    fn from(error: PaymentError) -> Self {
        match error {
            PaymentError::ChecksumMismatch { .. } => CallbackFailure::ChecksumMismatch,
            PaymentError::TamperDetected => CallbackFailure::TamperDetected,
            PaymentError::DecryptFailure { .. } => CallbackFailure::DecryptFailure,
            PaymentError::ValidationError { .. } => CallbackFailure::MissingField,
            _ => CallbackFailure::Malformed,
        }
    }
}
