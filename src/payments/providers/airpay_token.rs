//! OAuth2 client-credentials exchange for Airpay V4.
//!
//! The grant request is CBC-encrypted and carries a sorted-parameter checksum;
//! the response is a CBC blob wrapped in `{"response": ...}`. Every failure is
//! reported as `TokenAcquisitionFailed`, with no retries.

use crate::payments::checksum::sorted_params_checksum;
use crate::payments::cipher::CbcCipher;
use crate::payments::clock::Clock;
use crate::payments::credentials::AirpayCredentials;
use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::utils::PaymentHttpClient;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const AIRPAY_DEFAULT_TOKEN_URL: &str = "https://kraken.airpay.co.in/airpay/pay/v4/api/oauth2/";
pub const AIRPAY_DEFAULT_TIMEOUT_SECS: u64 = 15;

const GRANT_TYPE: &str = "client_credentials";

/// Anything that can hand out a bearer token for the payment call.
#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    async fn access_token(&self) -> PaymentResult<String>;
}

#[derive(Debug, Clone, Serialize)]
struct TokenGrant<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    grant_type: &'a str,
    merchant_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenEnvelope {
    response: Option<String>,
}

fn token_failure(cause: impl Into<String>) -> PaymentError {
    PaymentError::TokenAcquisitionFailed {
        cause: cause.into(),
    }
}

pub struct AirpayTokenClient {
    credentials: AirpayCredentials,
    token_url: String,
    http: PaymentHttpClient,
    clock: Arc<dyn Clock>,
}

impl AirpayTokenClient {
    pub fn new(
        credentials: AirpayCredentials,
        token_url: impl Into<String>,
        timeout: Duration,
        clock: Arc<dyn Clock>,
    ) -> PaymentResult<Self> {
        Ok(Self {
            credentials,
            token_url: token_url.into(),
            http: PaymentHttpClient::new(timeout)?,
            clock,
        })
    }

    fn cipher(&self) -> PaymentResult<CbcCipher> {
        let username = self.credentials.username.require("AIRPAY_USERNAME")?;
        let password = self.credentials.password.require("AIRPAY_PASSWORD")?;
        Ok(CbcCipher::from_login(username, password))
    }

    /// `(merchant_id, encdata, checksum)` for the token POST.
    pub fn grant_form(&self) -> PaymentResult<Vec<(&'static str, String)>> {
        let creds = &self.credentials;
        let grant = TokenGrant {
            client_id: creds.client_id.require("AIRPAY_CLIENT_ID")?,
            client_secret: creds.client_secret.require("AIRPAY_CLIENT_SECRET")?,
            grant_type: GRANT_TYPE,
            merchant_id: creds.merchant_id.require("AIRPAY_MERCHANT_ID")?,
        };

        let json = serde_json::to_string(&grant)
            .map_err(|e| token_failure(format!("grant serialization: {}", e)))?;
        let encdata = self.cipher()?.encrypt(&json);
        let checksum = sorted_params_checksum(
            &[
                ("client_id", grant.client_id),
                ("client_secret", grant.client_secret),
                ("grant_type", grant.grant_type),
                ("merchant_id", grant.merchant_id),
            ],
            &self.clock.today_string(),
        );

        Ok(vec![
            ("merchant_id", grant.merchant_id.to_string()),
            ("encdata", encdata),
            ("checksum", checksum),
        ])
    }

    /// Decrypts the `{"response": blob}` envelope and pulls out the token.
    pub fn extract_token(&self, body: &str) -> PaymentResult<String> {
        let envelope: TokenEnvelope = serde_json::from_str(body)
            .map_err(|e| token_failure(format!("response is not JSON: {}", e)))?;
        let blob = envelope
            .response
            .filter(|r| !r.trim().is_empty())
            .ok_or_else(|| token_failure("response field missing"))?;

        let decrypted = self
            .cipher()?
            .decrypt(&blob)
            .map_err(|e| token_failure(format!("response not decryptable: {}", e)))?;
        let payload: JsonValue = serde_json::from_str(&decrypted)
            .map_err(|e| token_failure(format!("decrypted response is not JSON: {}", e)))?;

        if is_explicit_failure(&payload) {
            let message = payload
                .get("msg")
                .or_else(|| payload.get("message"))
                .and_then(JsonValue::as_str)
                .unwrap_or("token request refused");
            return Err(token_failure(format!("gateway refused: {}", message)));
        }

        payload
            .get("data")
            .and_then(|d| d.get("access_token"))
            .or_else(|| payload.get("access_token"))
            .and_then(JsonValue::as_str)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .ok_or_else(|| token_failure("access_token missing from response"))
    }
}

fn is_explicit_failure(payload: &JsonValue) -> bool {
    match payload.get("success") {
        Some(JsonValue::Bool(ok)) => !ok,
        Some(JsonValue::String(s)) => s.eq_ignore_ascii_case("false"),
        _ => false,
    }
}

#[async_trait]
impl AccessTokenSource for AirpayTokenClient {
    async fn access_token(&self) -> PaymentResult<String> {
        let form = self.grant_form()?;
        let fields: Vec<(&str, &str)> = form.iter().map(|(k, v)| (*k, v.as_str())).collect();
        debug!(url = %self.token_url, "requesting Airpay access token");

        let body = self
            .http
            .post_form("airpay", &self.token_url, &fields)
            .await
            .map_err(|e| {
                warn!(error = %e, "Airpay token request failed");
                token_failure(e.to_string())
            })?;

        let token = self.extract_token(&body).map_err(|e| {
            warn!(error = %e, "Airpay token response rejected");
            e
        })?;
        info!(token_len = token.len(), "Airpay access token acquired");
        Ok(token)
    }
}
