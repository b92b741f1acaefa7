//! # Destination Validation
//!
//! Email and phone checks for electronic receipts.
//!
//! ## Email Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Email Destination Check                              │
//! │                                                                         │
//! │  cashier types address                                                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  validate_email() ───── syntax error ──► stay on step (blocking)        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  external verification enabled?                                         │
//! │       │ no ──────────────────────────────────────────► accept           │
//! │       │ yes                                                             │
//! │       ▼                                                                 │
//! │  interpret_verification()                                               │
//! │       ├── Valid                                  ──► accept             │
//! │       ├── Invalid, message matches bypass list   ──► accept (bypassed)  │
//! │       ├── Invalid, any other message             ──► stay on step       │
//! │       └── network error / timeout                ──► accept (swallowed) │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Phones only get a minimal length check.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ValidationError, ValidationResult};

const MAX_EMAIL_LEN: usize = 254;
const MAX_LOCAL_LEN: usize = 64;
const MAX_LABEL_LEN: usize = 63;

/// Default minimum number of digits in a phone number.
pub const DEFAULT_PHONE_MIN_LENGTH: usize = 7;

// =============================================================================
// Email Syntax
// =============================================================================

/// Validates email syntax and returns the trimmed address.
///
/// ## Example
/// ```rust
/// use titan_receipt::destination::validate_email;
///
/// assert_eq!(validate_email("  ana@shop.pe ").unwrap(), "ana@shop.pe");
/// assert!(validate_email("ana@@shop.pe").is_err());
/// assert!(validate_email("ana@localhost").is_err());
/// ```
pub fn validate_email(raw: &str) -> ValidationResult<String> {
    let email = raw.trim();
    let invalid = |reason: &str| ValidationError::InvalidEmail {
        value: email.to_string(),
        reason: reason.to_string(),
    };

    if email.is_empty() {
        return Err(ValidationError::Required {
            field: "email".to_string(),
        });
    }
    if email.len() > MAX_EMAIL_LEN {
        return Err(invalid("address is too long"));
    }

    let (local, domain) = match email.split_once('@') {
        Some((l, d)) if !d.contains('@') => (l, d),
        _ => return Err(invalid("must contain exactly one '@'")),
    };

    check_local_part(local).map_err(|r| invalid(r))?;
    check_domain(domain).map_err(|r| invalid(r))?;

    Ok(email.to_string())
}

fn is_atext(c: char) -> bool {
    c.is_ascii_alphanumeric() || "!#$%&'*+/=?^_`{|}~-".contains(c)
}

fn check_local_part(local: &str) -> Result<(), &'static str> {
    if local.is_empty() {
        return Err("local part is empty");
    }
    if local.len() > MAX_LOCAL_LEN {
        return Err("local part is too long");
    }
    if local.starts_with('.') || local.ends_with('.') || local.contains("..") {
        return Err("misplaced dot in local part");
    }
    if !local.chars().all(|c| c == '.' || is_atext(c)) {
        return Err("invalid character in local part");
    }
    Ok(())
}

fn check_domain(domain: &str) -> Result<(), &'static str> {
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return Err("domain needs at least two labels");
    }

    for label in labels {
        if label.is_empty() || label.len() > MAX_LABEL_LEN {
            return Err("invalid domain label length");
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err("domain label cannot start or end with '-'");
        }
        if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err("invalid character in domain");
        }
    }
    Ok(())
}

// =============================================================================
// Phone
// =============================================================================

/// Validates a phone number and returns it normalized to digits (with a
/// leading `+` preserved).
///
/// Separators (spaces, dashes, dots, parentheses) are ignored.
pub fn validate_phone(raw: &str, min_length: usize) -> ValidationResult<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Required {
            field: "phone".to_string(),
        });
    }

    let (prefix, rest) = match trimmed.strip_prefix('+') {
        Some(rest) => ("+", rest),
        None => ("", trimmed),
    };

    let mut digits = String::with_capacity(rest.len());
    for c in rest.chars() {
        match c {
            '0'..='9' => digits.push(c),
            ' ' | '-' | '.' | '(' | ')' => {}
            _ => return Err(ValidationError::InvalidPhone { min: min_length }),
        }
    }

    if digits.len() < min_length {
        return Err(ValidationError::InvalidPhone { min: min_length });
    }

    Ok(format!("{prefix}{digits}"))
}

// =============================================================================
// External Verification
// =============================================================================

/// Answer of the external email verification service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EmailVerdict {
    Valid,
    Invalid { message: String },
}

/// Outcome of an external verification attempt, as seen by the flow.
///
/// `Err` carries the transport failure description (network error,
/// timeout, bad response). It never blocks the cashier.
pub type VerificationOutcome = Result<EmailVerdict, String>;

/// How the flow treats a verification outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmailCheck {
    Accepted,
    /// Rejected by the service, but the message is on the bypass list.
    Bypassed { message: String },
    /// External failure swallowed; treated as no objection.
    Unverified { error: String },
    Rejected { message: String },
}

impl EmailCheck {
    pub fn is_accepted(&self) -> bool {
        !matches!(self, EmailCheck::Rejected { .. })
    }
}

/// Interprets a verification outcome with the configured bypass messages.
pub fn interpret_verification(outcome: VerificationOutcome, bypass: &[String]) -> EmailCheck {
    match outcome {
        Ok(EmailVerdict::Valid) => EmailCheck::Accepted,
        Ok(EmailVerdict::Invalid { message }) => {
            let normalized = message.trim().to_lowercase();
            let bypassed = bypass
                .iter()
                .any(|b| b.trim().to_lowercase() == normalized);

            if bypassed {
                debug!(%message, "Email verification rejection bypassed");
                EmailCheck::Bypassed { message }
            } else {
                EmailCheck::Rejected { message }
            }
        }
        Err(error) => {
            warn!(%error, "Email verification failed, treating address as valid");
            EmailCheck::Unverified { error }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
