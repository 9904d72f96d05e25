//! Application configuration module
//! Handles environment variable loading, configuration validation, and application settings

use crate::payments::checksum::AirpayChecksumFormula;
use crate::payments::credentials::{
    AirpayCredentials, Credential, GatewayCredentials, PayuCredentials, SabpaisaCredentials,
};
use crate::payments::providers::airpay::{
    AirpayConfig, AIRPAY_DEFAULT_MERCHANT_DOMAIN, AIRPAY_DEFAULT_PAYMENT_URL,
};
use crate::payments::providers::airpay_token::{
    AIRPAY_DEFAULT_TIMEOUT_SECS, AIRPAY_DEFAULT_TOKEN_URL,
};
use crate::payments::providers::payu::{PayuConfig, PAYU_DEFAULT_BASE_URL};
use crate::payments::providers::sabpaisa::{SabpaisaConfig, SABPAISA_DEFAULT_BASE_URL};
use crate::payments::types::GatewayName;
use std::env::{self, VarError};
use std::str::FromStr;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub gateways: GatewaysConfig,
    pub redirect: RedirectConfig,
    /// Run without Postgres, on the in-memory order store.
    pub skip_externals: bool,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub public_base_url: String,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout: u64,   // seconds
    pub idle_timeout: Option<u64>, // seconds
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log format options
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Plain,
}

/// Per-gateway settings and credentials
#[derive(Debug, Clone)]
pub struct GatewaysConfig {
    pub enabled: Vec<GatewayName>,
    pub payu: PayuConfig,
    pub sabpaisa: SabpaisaConfig,
    pub airpay: AirpayConfig,
}

/// Where the browser lands after a callback is processed
#[derive(Debug, Clone)]
pub struct RedirectConfig {
    pub frontend_confirmation_url: String,
}

fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes")
}

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenv::dotenv().ok();

        let server = ServerConfig::from_env()?;
        let gateways = GatewaysConfig::from_env(&server.public_base_url)?;

        Ok(AppConfig {
            database: DatabaseConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
            redirect: RedirectConfig::from_env()?,
            skip_externals: env::var("SKIP_EXTERNALS")
                .map(|v| is_truthy(&v))
                .unwrap_or(false),
            server,
            gateways,
        })
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        if !self.skip_externals {
            self.database.validate()?;
        }
        self.logging.validate()?;
        self.gateways.validate()?;
        self.redirect.validate()?;

        Ok(())
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "8000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".to_string()))?;
        Ok(ServerConfig {
            public_base_url: env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| format!("http://localhost:{}", port)),
            host,
            port,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidValue(
                "SERVER_PORT cannot be 0".to_string(),
            ));
        }

        if self.host.is_empty() {
            return Err(ConfigError::InvalidValue(
                "SERVER_HOST cannot be empty".to_string(),
            ));
        }

        if !is_http_url(&self.public_base_url) {
            return Err(ConfigError::InvalidValue(
                "PUBLIC_BASE_URL must be a valid URL".to_string(),
            ));
        }

        Ok(())
    }
}

impl DatabaseConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(DatabaseConfig {
            url: env::var("DATABASE_URL").ok().filter(|v| !v.trim().is_empty()),
            max_connections: env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DB_MAX_CONNECTIONS".to_string()))?,
            min_connections: env::var("DB_MIN_CONNECTIONS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DB_MIN_CONNECTIONS".to_string()))?,
            connection_timeout: env::var("DB_CONNECTION_TIMEOUT")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DB_CONNECTION_TIMEOUT".to_string()))?,
            idle_timeout: env::var("DB_IDLE_TIMEOUT")
                .ok()
                .and_then(|val| val.parse().ok()),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.is_none() {
            return Err(ConfigError::MissingVariable("DATABASE_URL".to_string()));
        }

        if self.max_connections == 0 {
            return Err(ConfigError::InvalidValue("DB_MAX_CONNECTIONS".to_string()));
        }

        if self.min_connections > self.max_connections {
            return Err(ConfigError::InvalidValue(
                "DB_MIN_CONNECTIONS must be <= DB_MAX_CONNECTIONS".to_string(),
            ));
        }

        Ok(())
    }
}

impl LoggingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "INFO".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "plain".to_string())
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Plain,
            },
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["TRACE", "DEBUG", "INFO", "WARN", "ERROR"];
        if !valid_levels.contains(&self.level.to_uppercase().as_str()) {
            return Err(ConfigError::InvalidValue("LOG_LEVEL".to_string()));
        }

        Ok(())
    }
}

impl GatewaysConfig {
    pub fn from_env(public_base_url: &str) -> Result<Self, ConfigError> {
        Self::from_source(|name| env::var(name), public_base_url)
    }

    /// Reads every gateway variable through `lookup`, so tests need not touch
    /// the process environment.
    pub fn from_source<F>(lookup: F, public_base_url: &str) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Result<String, VarError>,
    {
        let credential = |name: &str| Credential::from_env_value(lookup(name));
        let or_default = |name: &str, default: String| {
            lookup(name)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(default)
        };
        let callback = |gateway: &str, outcome: &str| {
            format!(
                "{}/api/payments/{}/{}",
                public_base_url.trim_end_matches('/'),
                gateway,
                outcome
            )
        };

        let enabled_raw = or_default(
            "ENABLED_PAYMENT_GATEWAYS",
            "payu,sabpaisa,airpay".to_string(),
        );
        let mut enabled = Vec::new();
        for part in enabled_raw.split(',') {
            let value = part.trim();
            if value.is_empty() {
                continue;
            }
            let name = GatewayName::from_str(value)
                .map_err(|_| ConfigError::InvalidValue(format!("ENABLED_PAYMENT_GATEWAYS: {}", value)))?;
            if !enabled.contains(&name) {
                enabled.push(name);
            }
        }

        let checksum_formula = match lookup("AIRPAY_CHECKSUM_FORMULA") {
            Ok(raw) if !raw.trim().is_empty() => AirpayChecksumFormula::from_str(&raw)
                .map_err(|_| ConfigError::InvalidValue("AIRPAY_CHECKSUM_FORMULA".to_string()))?,
            _ => AirpayChecksumFormula::default(),
        };
        let timeout_secs = or_default("AIRPAY_TIMEOUT_SECS", AIRPAY_DEFAULT_TIMEOUT_SECS.to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("AIRPAY_TIMEOUT_SECS".to_string()))?;

        Ok(GatewaysConfig {
            enabled,
            payu: PayuConfig {
                credentials: PayuCredentials {
                    merchant_key: credential("PAYU_MERCHANT_KEY"),
                    salt: credential("PAYU_SALT"),
                },
                base_url: or_default("PAYU_BASE_URL", PAYU_DEFAULT_BASE_URL.to_string()),
                success_url: or_default("PAYU_SUCCESS_URL", callback("payu", "success")),
                failure_url: or_default("PAYU_FAILURE_URL", callback("payu", "failure")),
            },
            sabpaisa: SabpaisaConfig {
                credentials: SabpaisaCredentials {
                    client_code: credential("SABPAISA_CLIENT_CODE"),
                    username: credential("SABPAISA_USERNAME"),
                    password: credential("SABPAISA_PASSWORD"),
                    auth_key: credential("SABPAISA_AUTH_KEY"),
                    auth_iv: credential("SABPAISA_AUTH_IV"),
                },
                base_url: or_default("SABPAISA_BASE_URL", SABPAISA_DEFAULT_BASE_URL.to_string()),
                callback_url: or_default("SABPAISA_CALLBACK_URL", callback("sabpaisa", "success")),
            },
            airpay: AirpayConfig {
                credentials: AirpayCredentials {
                    merchant_id: credential("AIRPAY_MERCHANT_ID"),
                    username: credential("AIRPAY_USERNAME"),
                    password: credential("AIRPAY_PASSWORD"),
                    secret_key: credential("AIRPAY_SECRET_KEY"),
                    client_id: credential("AIRPAY_CLIENT_ID"),
                    client_secret: credential("AIRPAY_CLIENT_SECRET"),
                },
                token_url: or_default("AIRPAY_TOKEN_URL", AIRPAY_DEFAULT_TOKEN_URL.to_string()),
                payment_url: or_default("AIRPAY_PAYMENT_URL", AIRPAY_DEFAULT_PAYMENT_URL.to_string()),
                merchant_domain: or_default(
                    "AIRPAY_MERCHANT_DOMAIN",
                    AIRPAY_DEFAULT_MERCHANT_DOMAIN.to_string(),
                ),
                checksum_formula,
                timeout_secs,
            },
        })
    }

    /// Read-only view of every credential, for presence logging.
    pub fn credentials(&self) -> GatewayCredentials {
        GatewayCredentials {
            payu: self.payu.credentials.clone(),
            sabpaisa: self.sabpaisa.credentials.clone(),
            airpay: self.airpay.credentials.clone(),
        }
    }

    fn required_credentials(&self, gateway: GatewayName) -> Vec<(&'static str, &Credential)> {
        match gateway {
            GatewayName::Payu => vec![
                ("PAYU_MERCHANT_KEY", &self.payu.credentials.merchant_key),
                ("PAYU_SALT", &self.payu.credentials.salt),
            ],
            GatewayName::Sabpaisa => {
                let c = &self.sabpaisa.credentials;
                vec![
                    ("SABPAISA_CLIENT_CODE", &c.client_code),
                    ("SABPAISA_USERNAME", &c.username),
                    ("SABPAISA_PASSWORD", &c.password),
                    ("SABPAISA_AUTH_KEY", &c.auth_key),
                    ("SABPAISA_AUTH_IV", &c.auth_iv),
                ]
            }
            GatewayName::Airpay => {
                let c = &self.airpay.credentials;
                vec![
                    ("AIRPAY_MERCHANT_ID", &c.merchant_id),
                    ("AIRPAY_USERNAME", &c.username),
                    ("AIRPAY_PASSWORD", &c.password),
                    ("AIRPAY_SECRET_KEY", &c.secret_key),
                    ("AIRPAY_CLIENT_ID", &c.client_id),
                    ("AIRPAY_CLIENT_SECRET", &c.client_secret),
                ]
            }
        }
    }

    /// Names of credentials that are set but empty on enabled gateways.
    pub fn empty_credentials(&self) -> Vec<&'static str> {
        self.enabled
            .iter()
            .flat_map(|g| self.required_credentials(*g))
            .filter(|(_, c)| c.is_empty_but_set())
            .map(|(name, _)| name)
            .collect()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.enabled.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "ENABLED_PAYMENT_GATEWAYS must name at least one gateway".to_string(),
            ));
        }

        let missing: Vec<&str> = self
            .enabled
            .iter()
            .flat_map(|g| self.required_credentials(*g))
            .filter(|(_, c)| !c.is_set())
            .map(|(name, _)| name)
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::MissingVariable(missing.join(", ")));
        }

        let urls = [
            ("PAYU_BASE_URL", &self.payu.base_url),
            ("PAYU_SUCCESS_URL", &self.payu.success_url),
            ("PAYU_FAILURE_URL", &self.payu.failure_url),
            ("SABPAISA_BASE_URL", &self.sabpaisa.base_url),
            ("SABPAISA_CALLBACK_URL", &self.sabpaisa.callback_url),
            ("AIRPAY_TOKEN_URL", &self.airpay.token_url),
            ("AIRPAY_PAYMENT_URL", &self.airpay.payment_url),
        ];
        for (name, url) in urls {
            if !is_http_url(url) {
                return Err(ConfigError::InvalidValue(format!(
                    "{} must be a valid URL",
                    name
                )));
            }
        }

        if self.airpay.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue("AIRPAY_TIMEOUT_SECS".to_string()));
        }

        Ok(())
    }
}

impl RedirectConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(RedirectConfig {
            frontend_confirmation_url: env::var("FRONTEND_CONFIRMATION_URL")
                .unwrap_or_else(|_| "http://localhost:3000/payment/confirmation".to_string()),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_http_url(&self.frontend_confirmation_url) {
            return Err(ConfigError::InvalidValue(
                "FRONTEND_CONFIRMATION_URL must be a valid URL".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),

    #[error("Invalid value for configuration: {0}")]
    InvalidValue(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

impl From<std::num::ParseIntError> for ConfigError {
    fn from(_: std::num::ParseIntError) -> Self {
        ConfigError::InvalidValue("Failed to parse integer value".to_string())
    }
}
