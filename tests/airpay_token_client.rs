//! Airpay OAuth2 token exchange against a mock token endpoint.

use chrono::NaiveDate;
use mandi_payments::payments::clock::FixedClock;
use mandi_payments::payments::credentials::{AirpayCredentials, Credential};
use mandi_payments::payments::providers::{AccessTokenSource, AirpayTokenClient};
use mandi_payments::payments::PaymentError;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN_RESPONSE: &str = r#"{"response":"c0f9e2d16031b0cevDTZubjJ+CFlTjau9F15n7x9Qqy+h856LcGb+k4aBvdzZfp9oYciRDUQUV9BRmaK+Ip6IDYa/of96nt8Vrm47g=="}"#;
const REFUSED_RESPONSE: &str = r#"{"response":"c0f9e2d16031b0ce6qqEpAanoHugu/VjheQG3K9F5wvuRqBcw9gqP9XE1TCd3fl2eaXNNgg4bhiqfP+V"}"#;

fn credentials() -> AirpayCredentials {
    AirpayCredentials {
        merchant_id: Credential::set("M12345"),
        username: Credential::set("testuser"),
        password: Credential::set("testpass"),
        secret_key: Credential::set("testsecret"),
        client_id: Credential::set("client-abc"),
        client_secret: Credential::set("client-secret-xyz"),
    }
}

fn client(server: &MockServer, timeout: Duration) -> AirpayTokenClient {
    AirpayTokenClient::new(
        credentials(),
        format!("{}/oauth2/", server.uri()),
        timeout,
        Arc::new(FixedClock(NaiveDate::from_ymd_opt(2025, 12, 26).unwrap())),
    )
    .unwrap()
}

#[tokio::test]
async fn posts_the_signed_grant_and_returns_the_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string_contains("merchant_id=M12345"))
        .and(body_string_contains(
            "checksum=cd083ba2817368e4a0b5a269c91d5c9a5ef3a4cb0d2acc49bea24e096028e612",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_string(TOKEN_RESPONSE))
        .expect(1)
        .mount(&server)
        .await;

    let token = client(&server, Duration::from_secs(5))
        .access_token()
        .await
        .unwrap();
    assert_eq!(token, "tok-123");
}

#[tokio::test]
async fn explicit_refusal_is_token_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string(REFUSED_RESPONSE))
        .mount(&server)
        .await;

    let err = client(&server, Duration::from_secs(5))
        .access_token()
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::TokenAcquisitionFailed { .. }));
}

#[tokio::test]
async fn server_error_is_token_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server, Duration::from_secs(5))
        .access_token()
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::TokenAcquisitionFailed { .. }));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn slow_endpoint_times_out_as_token_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(TOKEN_RESPONSE)
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let err = client(&server, Duration::from_millis(300))
        .access_token()
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::TokenAcquisitionFailed { .. }));
}

#[tokio::test]
async fn non_json_body_is_token_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let err = client(&server, Duration::from_secs(5))
        .access_token()
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::TokenAcquisitionFailed { .. }));
}
