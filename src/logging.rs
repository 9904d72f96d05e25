//! Tracing setup and redacted startup diagnostics

use crate::config::{GatewaysConfig, LogFormat, LoggingConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Installs the global subscriber. `RUST_LOG` wins over `LOG_LEVEL` when set.
/// Calling it twice is harmless; the second call is ignored.
pub fn init_tracing(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.to_lowercase()));

    let result = match config.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_current_span(false)
            .try_init(),
        LogFormat::Plain => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init(),
    };

    if result.is_err() {
        warn!("Tracing subscriber already installed");
    }
}

/// Logs `SET` / `NOT SET` for every gateway credential and warns about
/// values that are present but empty. Values themselves are never logged.
pub fn log_credential_presence(gateways: &GatewaysConfig) {
    let credentials = gateways.credentials();
    for (name, credential) in credentials.entries() {
        info!(credential = name, presence = credential.presence(), "Gateway credential");
    }

    for name in gateways.empty_credentials() {
        warn!(
            credential = name,
            "Gateway credential is set but empty; signatures will not verify"
        );
    }
}
