//! HTTP contract tests for the email verification client.
//!
//! | Method | Path | Test |
//! |--------|------|------|
//! | POST | `/verify` | `verify_*` |

use std::time::Duration;

use titan_issuance::{verify_with_timeout, EmailVerifier, HttpEmailVerifier, IssuanceError};
use titan_receipt::destination::{interpret_verification, EmailCheck, EmailVerdict};
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn verifier_for(server: &MockServer, timeout: Duration) -> HttpEmailVerifier {
    HttpEmailVerifier::new(&format!("{}/verify", server.uri()), timeout).unwrap()
}

#[tokio::test]
async fn verify_accepts_valid_address() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/verify"))
        .and(body_json(serde_json::json!({ "email": "anna@example.com" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "valid": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let verifier = verifier_for(&server, Duration::from_secs(5));
    let verdict = verifier.verify("anna@example.com").await.unwrap();
    assert_eq!(verdict, EmailVerdict::Valid);
}

#[tokio::test]
async fn verify_returns_rejection_message() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/verify"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "valid": false,
            "message": "Mailbox does not exist"
        })))
        .mount(&server)
        .await;

    let verifier = verifier_for(&server, Duration::from_secs(5));
    let verdict = verifier.verify("ghost@example.com").await.unwrap();
    assert_eq!(
        verdict,
        EmailVerdict::Invalid {
            message: "Mailbox does not exist".into()
        }
    );
}

#[tokio::test]
async fn verify_rejection_without_message_gets_default() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/verify"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "valid": false })),
        )
        .mount(&server)
        .await;

    let verifier = verifier_for(&server, Duration::from_secs(5));
    match verifier.verify("ghost@example.com").await.unwrap() {
        EmailVerdict::Invalid { message } => assert!(!message.is_empty()),
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn verify_server_error_is_transport_failure() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/verify"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let verifier = verifier_for(&server, Duration::from_secs(5));
    let err = verifier.verify("anna@example.com").await.unwrap_err();
    assert!(matches!(err, IssuanceError::VerificationFailed(_)));
    assert!(err.is_retryable());

    // The flow never blocks on a broken service.
    let outcome = verify_with_timeout(&verifier, "anna@example.com", Duration::from_secs(5)).await;
    assert!(matches!(
        interpret_verification(outcome, &[]),
        EmailCheck::Unverified { .. }
    ));
}

#[tokio::test]
async fn verify_malformed_body_is_transport_failure() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/verify"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
        .mount(&server)
        .await;

    let verifier = verifier_for(&server, Duration::from_secs(5));
    let err = verifier.verify("anna@example.com").await.unwrap_err();
    assert!(matches!(err, IssuanceError::VerificationFailed(_)));
}

#[tokio::test]
async fn verify_slow_service_times_out() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/verify"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "valid": true }))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let verifier = verifier_for(&server, Duration::from_secs(30));
    let outcome =
        verify_with_timeout(&verifier, "anna@example.com", Duration::from_millis(200)).await;
    assert!(outcome.is_err());
}

#[tokio::test]
async fn bypass_message_lets_rejection_through() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/verify"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "valid": false,
            "message": "Mailbox full"
        })))
        .mount(&server)
        .await;

    let verifier = verifier_for(&server, Duration::from_secs(5));
    let outcome = verify_with_timeout(&verifier, "busy@example.com", Duration::from_secs(5)).await;
    let check = interpret_verification(outcome, &["mailbox full".to_string()]);
    assert!(check.is_accepted());
    assert!(matches!(check, EmailCheck::Bypassed { .. }));
}
