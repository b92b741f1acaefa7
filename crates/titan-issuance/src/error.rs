//! # Issuance Error Types
//!
//! Errors raised by the runtime around the receipt flow.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Issuance Error Categories                           │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │  Verification   │  │     Collaborators       │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Verification   │  │  DispatchFailed         │ │
//! │  │  InvalidUrl     │  │   Failed        │  │  ChannelError           │ │
//! │  │  ConfigLoad/Save│  │  Timeout        │  │  ShuttingDown           │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  Flow(FlowError) - rejected by the receipt state machine        │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;
use titan_receipt::FlowError;

/// Result type alias for issuance operations.
pub type IssuanceResult<T> = Result<T, IssuanceError>;

/// Issuance runtime error.
#[derive(Debug, Error)]
pub enum IssuanceError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid issuance configuration.
    #[error("Invalid issuance configuration: {0}")]
    InvalidConfig(String),

    /// Invalid verification endpoint.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Verification Errors
    // =========================================================================
    /// The email verification service could not be reached or answered
    /// with something unreadable.
    #[error("Email verification failed: {0}")]
    VerificationFailed(String),

    /// The email verification service did not answer in time.
    #[error("Email verification timed out after {0} seconds")]
    Timeout(u64),

    // =========================================================================
    // Collaborator Errors
    // =========================================================================
    /// The business-operation dispatcher failed to take the request.
    #[error("Dispatch failed: {0}")]
    DispatchFailed(String),

    /// Scenario or payload could not be (de)serialized.
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    /// Channel send/receive failed.
    #[error("Channel error: {0}")]
    ChannelError(String),

    /// Agent is shutting down.
    #[error("Issuance agent is shutting down")]
    ShuttingDown,

    /// A receipt flow is still open for another transaction.
    #[error("Receipt flow for transaction {transaction_id} is still in progress")]
    FlowInProgress { transaction_id: String },

    /// An event arrived while no receipt flow is open.
    #[error("No receipt flow is open")]
    NoActiveFlow,

    // =========================================================================
    // Flow Errors
    // =========================================================================
    /// The receipt flow refused the event.
    #[error(transparent)]
    Flow(#[from] FlowError),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<std::io::Error> for IssuanceError {
    fn from(err: std::io::Error) -> Self {
        IssuanceError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for IssuanceError {
    fn from(err: toml::de::Error) -> Self {
        IssuanceError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for IssuanceError {
    fn from(err: toml::ser::Error) -> Self {
        IssuanceError::ConfigSaveFailed(err.to_string())
    }
}

impl From<serde_json::Error> for IssuanceError {
    fn from(err: serde_json::Error) -> Self {
        IssuanceError::SerializationFailed(err.to_string())
    }
}

impl From<url::ParseError> for IssuanceError {
    fn from(err: url::ParseError) -> Self {
        IssuanceError::InvalidUrl(err.to_string())
    }
}

impl From<reqwest::Error> for IssuanceError {
    fn from(err: reqwest::Error) -> Self {
        IssuanceError::VerificationFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl IssuanceError {
    /// Returns true if the same call may succeed when tried again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            IssuanceError::VerificationFailed(_)
                | IssuanceError::Timeout(_)
                | IssuanceError::DispatchFailed(_)
        )
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            IssuanceError::InvalidConfig(_)
                | IssuanceError::InvalidUrl(_)
                | IssuanceError::ConfigLoadFailed(_)
                | IssuanceError::ConfigSaveFailed(_)
        )
    }

    /// Returns true if the flow rejected the cashier's input and the same
    /// step should be shown again with the message.
    pub fn is_inline(&self) -> bool {
        matches!(self, IssuanceError::Flow(e) if e.is_validation())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use titan_receipt::ValidationError;

    #[test]
    fn test_retryable_errors() {
        assert!(IssuanceError::VerificationFailed("connection refused".into()).is_retryable());
        assert!(IssuanceError::Timeout(10).is_retryable());
        assert!(IssuanceError::DispatchFailed("busy".into()).is_retryable());
        assert!(!IssuanceError::InvalidConfig("bad".into()).is_retryable());
        assert!(!IssuanceError::ShuttingDown.is_retryable());
    }

    #[test]
    fn test_config_errors() {
        assert!(IssuanceError::InvalidUrl("nope".into()).is_config_error());
        assert!(IssuanceError::ConfigLoadFailed("missing".into()).is_config_error());
        assert!(!IssuanceError::Timeout(10).is_config_error());
    }

    #[test]
    fn test_flow_validation_is_inline() {
        let err: IssuanceError = FlowError::from(ValidationError::Required {
            field: "email".into(),
        })
        .into();
        assert!(err.is_inline());

        let err: IssuanceError = FlowError::Finished.into();
        assert!(!err.is_inline());
    }

    #[test]
    fn test_url_error_conversion() {
        let err: IssuanceError = url::Url::parse("not a url").unwrap_err().into();
        assert!(matches!(err, IssuanceError::InvalidUrl(_)));
    }
}
