use crate::payments::error::{PaymentError, PaymentResult};
use reqwest::Client;
use std::time::Duration;
use subtle::ConstantTimeEq;
use tracing::debug;

/// Outbound HTTP for gateway calls. Every request carries the client timeout;
/// there is no retry loop here.
#[derive(Clone)]
pub struct PaymentHttpClient {
    client: Client,
    timeout: Duration,
}

impl PaymentHttpClient {
    pub fn new(timeout: Duration) -> PaymentResult<Self> {
        let client =
            Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| PaymentError::NetworkError {
                    message: format!("failed to initialize HTTP client: {}", e),
                })?;

        Ok(Self { client, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// POSTs `application/x-www-form-urlencoded` fields and returns the body
    /// of a 2xx response.
    pub async fn post_form(
        &self,
        gateway: &str,
        url: &str,
        fields: &[(&str, &str)],
    ) -> PaymentResult<String> {
        let response = self
            .client
            .post(url)
            .timeout(self.timeout)
            .form(fields)
            .send()
            .await
            .map_err(|e| PaymentError::NetworkError {
                message: if e.is_timeout() {
                    format!("{} request timed out after {:?}", gateway, self.timeout)
                } else {
                    format!("{} request failed: {}", gateway, e)
                },
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| PaymentError::NetworkError {
                message: format!("{} response body unreadable: {}", gateway, e),
            })?;
        debug!(gateway = gateway, status = %status, bytes = text.len(), "gateway responded");

        if !status.is_success() {
            return Err(PaymentError::ProviderError {
                gateway: gateway.to_string(),
                message: format!("HTTP {}", status),
                provider_code: Some(status.as_u16().to_string()),
                retryable: status.is_server_error(),
            });
        }

        Ok(text)
    }
}

pub fn secure_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && bool::from(a.ct_eq(b))
}

/// First characters of a digest, enough to correlate log lines.
pub fn digest_prefix(digest: &str) -> &str {
    let end = digest
        .char_indices()
        .nth(8)
        .map(|(i, _)| i)
        .unwrap_or(digest.len());
    &digest[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secure_eq_behaves_correctly() {
        assert!(secure_eq(b"abc", b"abc"));
        assert!(!secure_eq(b"abc", b"abd"));
        assert!(!secure_eq(b"abc", b"ab"));
        assert!(secure_eq(b"", b""));
    }

    #[test]
    fn digest_prefix_truncates() {
        assert_eq!(digest_prefix("0123456789abcdef"), "01234567");
        assert_eq!(digest_prefix("abc"), "abc");
    }
}
