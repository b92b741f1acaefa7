//! # Error Types
//!
//! Errors raised by the receipt engine.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  titan-receipt errors (this file)                                       │
//! │  ├── ValidationError  - Inline, blocking, stays on the current step     │
//! │  └── FlowError        - Event not acceptable in the current state       │
//! │                                                                         │
//! │  titan-issuance errors (runtime crate)                                  │
//! │  └── IssuanceError    - Config, verification transport, dispatcher      │
//! │                                                                         │
//! │  Flow: ValidationError → FlowError → IssuanceError → Frontend           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A validation error never moves the flow. The cashier sees it next to the
//! field that caused it and the same step is shown again.

use thiserror::Error;

use crate::tax_customer::TaxField;

// =============================================================================
// Validation Error
// =============================================================================

/// Step-level input validation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Email address does not follow the address grammar.
    #[error("'{value}' is not a valid email address: {reason}")]
    InvalidEmail { value: String, reason: String },

    /// Phone number is too short or contains non-digits.
    #[error("Phone number must have at least {min} digits")]
    InvalidPhone { min: usize },

    /// Tax customer lacks fields the country requires.
    #[error("Tax customer is missing required fields: {}", join_fields(.fields))]
    MissingTaxFields { fields: Vec<TaxField> },

    /// External email verification actively rejected the address.
    #[error("Email address rejected: {message}")]
    EmailRejected { message: String },

    /// Value is not among the offered options.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },
}

fn join_fields(fields: &[TaxField]) -> String {
    fields
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Flow Error
// =============================================================================

/// Errors raised by the flow controller.
///
/// None of these change the flow state: the event is refused and the
/// current step stays as it was.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlowError {
    /// Input on the current step was invalid.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The event is not meaningful in the current state.
    #[error("Event {event} is not accepted in state {state}")]
    InvalidTransition { state: String, event: String },

    /// Backward navigation is locked while a fiscal document is being issued.
    #[error("Fiscal document is being issued, navigation locked for {remaining_secs}s")]
    Locked { remaining_secs: i64 },

    /// No receipt category survived eligibility evaluation.
    #[error("No receipt option is available for transaction {transaction_id}")]
    NothingEligible { transaction_id: String },

    /// The flow was completed, cancelled or failed; start a new one.
    #[error("Receipt flow has already finished")]
    Finished,
}

impl FlowError {
    /// True for errors the cashier can fix by changing input.
    pub fn is_validation(&self) -> bool {
        matches!(self, FlowError::Validation(_))
    }
}

/// Convenience type alias for flow results.
pub type FlowResult<T> = Result<T, FlowError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::InvalidPhone { min: 7 };
        assert_eq!(err.to_string(), "Phone number must have at least 7 digits");

        let err = ValidationError::MissingTaxFields {
            fields: vec![TaxField::Ruc, TaxField::IdNumber],
        };
        assert_eq!(
            err.to_string(),
            "Tax customer is missing required fields: ruc, id_number"
        );
    }

    #[test]
    fn test_validation_converts_to_flow_error() {
        let err: FlowError = ValidationError::EmailRejected {
            message: "mailbox full".into(),
        }
        .into();
        assert!(err.is_validation());
        assert!(err.to_string().contains("mailbox full"));
    }

    #[test]
    fn test_locked_message() {
        let err = FlowError::Locked { remaining_secs: 12 };
        assert!(err.to_string().contains("12s"));
        assert!(!err.is_validation());
    }
}
