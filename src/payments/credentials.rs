//! Per-gateway secret material.
//!
//! A credential is either `Unset` (never configured) or `Set`, possibly to an
//! empty string. Only presence is ever logged.

use crate::payments::error::{PaymentError, PaymentResult};
use std::fmt;

/// String that never prints its contents.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretString(***)")
    }
}

#[derive(Clone, PartialEq, Eq, Default)]
pub enum Credential {
    #[default]
    Unset,
    Set(SecretString),
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.presence())
    }
}

impl Credential {
    pub fn set(value: impl Into<String>) -> Self {
        Credential::Set(SecretString::new(value))
    }

    /// Reads an environment value, keeping "absent" distinct from "empty".
    pub fn from_env_value(value: Result<String, std::env::VarError>) -> Self {
        match value {
            Ok(v) => Credential::set(v),
            Err(_) => Credential::Unset,
        }
    }

    pub fn is_set(&self) -> bool {
        matches!(self, Credential::Set(_))
    }

    pub fn is_empty_but_set(&self) -> bool {
        matches!(self, Credential::Set(s) if s.expose().is_empty())
    }

    pub fn presence(&self) -> &'static str {
        match self {
            Credential::Set(_) => "SET",
            Credential::Unset => "NOT SET",
        }
    }

    pub fn require(&self, name: &str) -> PaymentResult<&str> {
        match self {
            Credential::Set(secret) => Ok(secret.expose()),
            Credential::Unset => Err(PaymentError::Configuration {
                message: format!("{} is not set", name),
            }),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PayuCredentials {
    pub merchant_key: Credential,
    pub salt: Credential,
}

#[derive(Debug, Clone, Default)]
pub struct SabpaisaCredentials {
    pub client_code: Credential,
    pub username: Credential,
    pub password: Credential,
    pub auth_key: Credential,
    pub auth_iv: Credential,
}

#[derive(Debug, Clone, Default)]
pub struct AirpayCredentials {
    pub merchant_id: Credential,
    pub username: Credential,
    pub password: Credential,
    pub secret_key: Credential,
    pub client_id: Credential,
    pub client_secret: Credential,
}

/// Read-only view of every gateway's credentials.
#[derive(Debug, Clone, Default)]
pub struct GatewayCredentials {
    pub payu: PayuCredentials,
    pub sabpaisa: SabpaisaCredentials,
    pub airpay: AirpayCredentials,
}

impl GatewayCredentials {
    /// `(ENV_NAME, credential)` pairs, for presence logging and validation.
    pub fn entries(&self) -> Vec<(&'static str, &Credential)> {
        vec![
            ("PAYU_MERCHANT_KEY", &self.payu.merchant_key),
            ("PAYU_SALT", &self.payu.salt),
            ("SABPAISA_CLIENT_CODE", &self.sabpaisa.client_code),
            ("SABPAISA_USERNAME", &self.sabpaisa.username),
            ("SABPAISA_PASSWORD", &self.sabpaisa.password),
            ("SABPAISA_AUTH_KEY", &self.sabpaisa.auth_key),
            ("SABPAISA_AUTH_IV", &self.sabpaisa.auth_iv),
            ("AIRPAY_MERCHANT_ID", &self.airpay.merchant_id),
            ("AIRPAY_USERNAME", &self.airpay.username),
            ("AIRPAY_PASSWORD", &self.airpay.password),
            ("AIRPAY_SECRET_KEY", &self.airpay.secret_key),
            ("AIRPAY_CLIENT_ID", &self.airpay.client_id),
            ("AIRPAY_CLIENT_SECRET", &self.airpay.client_secret),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_is_distinct_from_empty() {
        let unset = Credential::from_env_value(Err(std::env::VarError::NotPresent));
        let empty = Credential::from_env_value(Ok(String::new()));

        assert!(!unset.is_set());
        assert!(empty.is_set());
        assert!(empty.is_empty_but_set());
        assert_eq!(empty.require("PAYU_SALT").unwrap(), "");
        assert!(matches!(
            unset.require("PAYU_SALT"),
            Err(PaymentError::Configuration { .. })
        ));
    }

    #[test]
    fn debug_output_never_contains_secret() {
        let creds = PayuCredentials {
            merchant_key: Credential::set("merchant-key-value"),
            salt: Credential::set("super-secret-salt"),
        };
        let rendered = format!("{:?}", creds);
        assert!(!rendered.contains("super-secret-salt"));
        assert!(!rendered.contains("merchant-key-value"));
        assert!(rendered.contains("SET"));
    }
}
