use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type PaymentResult<T> = Result<T, PaymentError>;

/// Which side of a gateway exchange a checksum belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChecksumKind {
    /// Outbound: we could not sign a request.
    RequestSigning,
    /// Inbound: a callback could not be trusted.
    ResponseVerification,
}

impl std::fmt::Display for ChecksumKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChecksumKind::RequestSigning => write!(f, "request_signing"),
            ChecksumKind::ResponseVerification => write!(f, "response_verification"),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum PaymentError {
    #[error("Validation error: {message}")]
    ValidationError {
        message: String,
        field: Option<String>,
    },

    #[error("Checksum mismatch ({kind})")]
    ChecksumMismatch { kind: ChecksumKind },

    #[error("Decrypt failure: {message}")]
    DecryptFailure { message: String },

    #[error("Tamper detected: integrity check failed before decryption")]
    TamperDetected,

    #[error("Token acquisition failed: {cause}")]
    TokenAcquisitionFailed { cause: String },

    #[error("Network error: {message}")]
    NetworkError { message: String },

    #[error("Gateway error: gateway={gateway}, message={message}")]
    ProviderError {
        gateway: String,
        message: String,
        provider_code: Option<String>,
        retryable: bool,
    },

    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl PaymentError {
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        PaymentError::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            PaymentError::ValidationError { .. } => false,
            PaymentError::ChecksumMismatch { .. } => false,
            PaymentError::DecryptFailure { .. } => false,
            PaymentError::TamperDetected => false,
            PaymentError::TokenAcquisitionFailed { .. } => true,
            PaymentError::NetworkError { .. } => true,
            PaymentError::ProviderError { retryable, .. } => *retryable,
            PaymentError::Configuration { .. } => false,
        }
    }

    pub fn http_status_code(&self) -> u16 {
        match self {
            PaymentError::ValidationError { .. } => 400,
            PaymentError::ChecksumMismatch { .. } => 401,
            PaymentError::DecryptFailure { .. } => 401,
            PaymentError::TamperDetected => 401,
            PaymentError::TokenAcquisitionFailed { .. } => 503,
            PaymentError::NetworkError { .. } => 503,
            PaymentError::ProviderError { .. } => 502,
            PaymentError::Configuration { .. } => 500,
        }
    }

    /// Message safe to show a caller. Never includes key material or digests.
    pub fn user_message(&self) -> String {
        match self {
            PaymentError::ValidationError { message, .. } => message.clone(),
            PaymentError::ChecksumMismatch { .. }
            | PaymentError::DecryptFailure { .. }
            | PaymentError::TamperDetected => "Payment data could not be verified".to_string(),
            PaymentError::TokenAcquisitionFailed { .. } | PaymentError::NetworkError { .. } => {
                "Payment gateway is temporarily unavailable".to_string()
            }
            PaymentError::ProviderError { .. } => "Payment gateway returned an error".to_string(),
            PaymentError::Configuration { .. } => {
                "Payment gateway is not configured".to_string()
            }
        }
    }
}

impl From<PaymentError> for crate::error::AppError {
    fn from(err: PaymentError) -> Self {
        use crate::error::{
            AppError, AppErrorKind, DomainError, ExternalError, InfrastructureError,
            ValidationError,
        };

        let kind = match &err {
            PaymentError::ValidationError { message, field } => match field {
                Some(field) => AppErrorKind::Validation(ValidationError::InvalidField {
                    field: field.clone(),
                    reason: message.clone(),
                }),
                None => AppErrorKind::Validation(ValidationError::InvalidField {
                    field: "request".to_string(),
                    reason: message.clone(),
                }),
            },
            PaymentError::ChecksumMismatch { .. }
            | PaymentError::DecryptFailure { .. }
            | PaymentError::TamperDetected => AppErrorKind::Domain(DomainError::CallbackRejected),
            PaymentError::Configuration { message } => {
                AppErrorKind::Infrastructure(InfrastructureError::Configuration {
                    message: message.clone(),
                })
            }
            PaymentError::TokenAcquisitionFailed { .. }
            | PaymentError::NetworkError { .. }
            | PaymentError::ProviderError { .. } => {
                AppErrorKind::External(ExternalError::PaymentGateway {
                    gateway: match &err {
                        PaymentError::ProviderError { gateway, .. } => gateway.clone(),
                        _ => "gateway".to_string(),
                    },
                    message: err.to_string(),
                    is_retryable: err.is_retryable(),
                })
            }
        };

        AppError::new(kind)
    }
}
