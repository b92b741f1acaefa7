//! # Email Verification
//!
//! Client for the external email verification service.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Verification Round Trip                              │
//! │                                                                         │
//! │   agent ──spawn──► verify_with_timeout(10s) ──► POST {"email": ...}     │
//! │     ▲                                                │                  │
//! │     │                                                ▼                  │
//! │     └── FlowEvent::EmailVerified ◄── {"valid": bool, "message": ...}    │
//! │                                                                         │
//! │   Network error, bad status, bad body or timeout all come back as      │
//! │   Err(description). The flow treats those as "no objection".           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

use titan_receipt::destination::{EmailVerdict, VerificationOutcome};

use crate::config::IssuanceConfig;
use crate::error::{IssuanceError, IssuanceResult};

/// Message used when the service rejects without saying why.
const DEFAULT_REJECTION: &str = "Email address was rejected";

// =============================================================================
// Verifier Trait
// =============================================================================

/// Checks whether an address can receive mail.
#[async_trait]
pub trait EmailVerifier: Send + Sync {
    async fn verify(&self, address: &str) -> IssuanceResult<EmailVerdict>;
}

/// Runs a verification bounded by `timeout` and folds every failure into
/// the outcome the flow expects.
pub async fn verify_with_timeout(
    verifier: &dyn EmailVerifier,
    address: &str,
    timeout: Duration,
) -> VerificationOutcome {
    match tokio::time::timeout(timeout, verifier.verify(address)).await {
        Ok(Ok(verdict)) => Ok(verdict),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(IssuanceError::Timeout(timeout.as_secs()).to_string()),
    }
}

// =============================================================================
// HTTP Verifier
// =============================================================================

#[derive(Debug, Serialize)]
struct VerifyRequest<'a> {
    email: &'a str,
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    valid: bool,
    #[serde(default)]
    message: Option<String>,
}

/// Verification over HTTP.
#[derive(Debug, Clone)]
pub struct HttpEmailVerifier {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpEmailVerifier {
    pub fn new(endpoint: &str, timeout: Duration) -> IssuanceResult<Self> {
        let endpoint = Url::parse(endpoint)?;
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(HttpEmailVerifier { client, endpoint })
    }

    /// Builds the verifier when the config turns verification on.
    pub fn from_config(config: &IssuanceConfig) -> IssuanceResult<Option<Self>> {
        if !config.verification_enabled() {
            return Ok(None);
        }
        match config.email_verification.endpoint.as_deref() {
            Some(endpoint) => Self::new(endpoint, config.verification_timeout()).map(Some),
            None => Ok(None),
        }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl EmailVerifier for HttpEmailVerifier {
    async fn verify(&self, address: &str) -> IssuanceResult<EmailVerdict> {
        debug!(endpoint = %self.endpoint, "Verifying email address");

        let resp = self
            .client
            .post(self.endpoint.clone())
            .json(&VerifyRequest { email: address })
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            return Err(IssuanceError::VerificationFailed(format!(
                "HTTP {status}: {body}"
            )));
        }

        let parsed: VerifyResponse = serde_json::from_str(&body)
            .map_err(|e| IssuanceError::VerificationFailed(format!("unexpected response: {e}")))?;

        if parsed.valid {
            Ok(EmailVerdict::Valid)
        } else {
            let message = parsed
                .message
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_REJECTION.to_string());
            Ok(EmailVerdict::Invalid { message })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Slow;

    #[async_trait]
    impl EmailVerifier for Slow {
        async fn verify(&self, _address: &str) -> IssuanceResult<EmailVerdict> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(EmailVerdict::Valid)
        }
    }

    struct Broken;

    #[async_trait]
    impl EmailVerifier for Broken {
        async fn verify(&self, _address: &str) -> IssuanceResult<EmailVerdict> {
            Err(IssuanceError::VerificationFailed("connection refused".into()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_becomes_error_outcome() {
        let outcome = verify_with_timeout(&Slow, "a@example.com", Duration::from_secs(10)).await;
        let err = outcome.unwrap_err();
        assert!(err.contains("10 seconds"));
    }

    #[tokio::test]
    async fn test_transport_error_becomes_error_outcome() {
        let outcome =
            verify_with_timeout(&Broken, "a@example.com", Duration::from_secs(10)).await;
        assert!(outcome.unwrap_err().contains("connection refused"));
    }

    #[test]
    fn test_from_config_disabled() {
        let config = IssuanceConfig::default();
        assert!(HttpEmailVerifier::from_config(&config).unwrap().is_none());
    }

    #[test]
    fn test_from_config_enabled() {
        let mut config = IssuanceConfig::default();
        config.email_verification.enabled = true;
        config.email_verification.endpoint = Some("https://verify.example.com/check".into());

        let verifier = HttpEmailVerifier::from_config(&config).unwrap().unwrap();
        assert_eq!(verifier.endpoint().path(), "/check");
    }
}
