//! # Fiscal Print Outcomes
//!
//! Maps fiscal device response codes to what the flow does next.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                   Fiscal Response Handling                              │
//! │                                                                         │
//! │   NOT_CONNECTED ─┐                                                      │
//! │   REJECTED      ─┼──► Retry ──► printer choice (answers kept)           │
//! │   TIMEOUT       ─┘                                                      │
//! │                                                                         │
//! │   NOT_REFUNDABLE ──► retail (sale/return)? ── yes ──► Retry             │
//! │                                           └─ no  ──► Unrecoverable      │
//! │                                                                         │
//! │   anything else ──► Success                                             │
//! │                                                                         │
//! │   retries > max ──► Unrecoverable                                       │
//! │                                                                         │
//! │   ┌──────────────────────────────────────────────┐                      │
//! │   │ 30s lockout from dispatch start: no Back,    │                      │
//! │   │ no Cancel. Hardware requirement, not config. │                      │
//! │   └──────────────────────────────────────────────┘                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;
use tracing::warn;
use ts_rs::TS;

use crate::types::{ReceiptPrinter, TransactionClass};

/// Seconds during which backward navigation is blocked after a fiscal
/// dispatch starts.
pub const FISCAL_LOCKOUT_SECS: i64 = 30;

// =============================================================================
// Response Code
// =============================================================================

/// Response code reported by a fiscal device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum FiscalResponseCode {
    NotConnected,
    Rejected,
    Timeout,
    NotRefundable,
    /// Any other code. Treated as success.
    Other(String),
}

impl FromStr for FiscalResponseCode {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase().replace('-', "_");
        Ok(match normalized.as_str() {
            "NOT_CONNECTED" | "NOTCONNECTED" => FiscalResponseCode::NotConnected,
            "REJECTED" => FiscalResponseCode::Rejected,
            "TIMEOUT" => FiscalResponseCode::Timeout,
            "NOT_REFUNDABLE" | "NOTREFUNDABLE" => FiscalResponseCode::NotRefundable,
            _ => FiscalResponseCode::Other(s.trim().to_string()),
        })
    }
}

impl fmt::Display for FiscalResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FiscalResponseCode::NotConnected => f.write_str("NOT_CONNECTED"),
            FiscalResponseCode::Rejected => f.write_str("REJECTED"),
            FiscalResponseCode::Timeout => f.write_str("TIMEOUT"),
            FiscalResponseCode::NotRefundable => f.write_str("NOT_REFUNDABLE"),
            FiscalResponseCode::Other(code) => f.write_str(code),
        }
    }
}

// =============================================================================
// Outcome
// =============================================================================

/// What the flow does with a fiscal response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FiscalOutcome {
    Success,
    Retry { code: FiscalResponseCode },
    Unrecoverable { reason: String },
}

/// Classifies a response code.
///
/// `retries_used` counts the retries already granted on this flow, so the
/// first failure is classified with `0`.
pub fn classify(
    code: &FiscalResponseCode,
    class: TransactionClass,
    retries_used: u32,
    max_retries: u32,
) -> FiscalOutcome {
    let retryable = match code {
        FiscalResponseCode::NotConnected
        | FiscalResponseCode::Rejected
        | FiscalResponseCode::Timeout => true,
        FiscalResponseCode::NotRefundable => class.is_retail(),
        FiscalResponseCode::Other(_) => return FiscalOutcome::Success,
    };

    if !retryable {
        return FiscalOutcome::Unrecoverable {
            reason: format!("fiscal device returned {code} for a {class:?} transaction"),
        };
    }

    if retries_used >= max_retries {
        warn!(%code, retries_used, max_retries, "Fiscal retries exhausted");
        return FiscalOutcome::Unrecoverable {
            reason: format!("fiscal device returned {code} after {retries_used} retries"),
        };
    }

    FiscalOutcome::Retry { code: code.clone() }
}

/// Operator notice shown on the printer choice after a retryable failure.
pub fn retry_notice(code: &FiscalResponseCode) -> String {
    match code {
        FiscalResponseCode::NotConnected => {
            "The fiscal printer is not connected. Check the device or choose another printer."
                .to_string()
        }
        FiscalResponseCode::Rejected => {
            "The fiscal printer rejected the document. Choose a printer to try again.".to_string()
        }
        FiscalResponseCode::Timeout => {
            "The fiscal printer did not answer in time. Choose a printer to try again.".to_string()
        }
        FiscalResponseCode::NotRefundable => {
            "This fiscal printer cannot issue the refund. Choose another fiscal printer."
                .to_string()
        }
        FiscalResponseCode::Other(code) => format!("Fiscal printer reported {code}."),
    }
}

// =============================================================================
// Lockout
// =============================================================================

/// Backward-navigation lock started by a fiscal dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FiscalLockout {
    started_at: DateTime<Utc>,
}

impl FiscalLockout {
    pub fn start(now: DateTime<Utc>) -> Self {
        FiscalLockout { started_at: now }
    }

    pub fn ends_at(&self) -> DateTime<Utc> {
        self.started_at + Duration::seconds(FISCAL_LOCKOUT_SECS)
    }

    /// Whole seconds left, rounded up. Zero once the window has passed.
    pub fn remaining_secs(&self, now: DateTime<Utc>) -> i64 {
        let left = self.ends_at() - now;
        if left <= Duration::zero() {
            return 0;
        }
        let millis = left.num_milliseconds();
        (millis + 999) / 1000
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.remaining_secs(now) > 0
    }
}

// =============================================================================
// Post-Void Printers
// =============================================================================

/// Printers a post-void may print on: the fiscal device(s) whose serial
/// matches the one recorded on the original receipt line.
pub fn post_void_printers<'a>(
    printers: &'a [ReceiptPrinter],
    fiscal_serial: Option<&str>,
) -> Vec<&'a ReceiptPrinter> {
    let Some(serial) = fiscal_serial.map(str::trim).filter(|s| !s.is_empty()) else {
        return Vec::new();
    };
    printers
        .iter()
        .filter(|p| p.is_fiscal() && p.serial_number.as_deref().map(str::trim) == Some(serial))
        .collect()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PrinterClass;
    use chrono::TimeZone;

    fn printer(id: &str, class: PrinterClass, serial: Option<&str>) -> ReceiptPrinter {
        ReceiptPrinter {
            id: id.into(),
            description: format!("Printer {id}"),
            class,
            serial_number: serial.map(Into::into),
        }
    }

    #[test]
    fn test_parse_codes() {
        assert_eq!(
            "not-connected".parse::<FiscalResponseCode>().unwrap(),
            FiscalResponseCode::NotConnected
        );
        assert_eq!(
            " TIMEOUT ".parse::<FiscalResponseCode>().unwrap(),
            FiscalResponseCode::Timeout
        );
        assert_eq!(
            "Not_Refundable".parse::<FiscalResponseCode>().unwrap(),
            FiscalResponseCode::NotRefundable
        );
        assert_eq!(
            "OK".parse::<FiscalResponseCode>().unwrap(),
            FiscalResponseCode::Other("OK".into())
        );
    }

    #[test]
    fn test_failure_family_retries() {
        for code in [
            FiscalResponseCode::NotConnected,
            FiscalResponseCode::Rejected,
            FiscalResponseCode::Timeout,
        ] {
            assert!(matches!(
                classify(&code, TransactionClass::Order, 0, 3),
                FiscalOutcome::Retry { .. }
            ));
        }
    }

    #[test]
    fn test_not_refundable_only_retries_retail() {
        let code = FiscalResponseCode::NotRefundable;
        assert!(matches!(
            classify(&code, TransactionClass::Return, 0, 3),
            FiscalOutcome::Retry { .. }
        ));
        assert!(matches!(
            classify(&code, TransactionClass::Account, 0, 3),
            FiscalOutcome::Unrecoverable { .. }
        ));
    }

    #[test]
    fn test_other_codes_succeed() {
        let code = FiscalResponseCode::Other("PAPER_LOW".into());
        assert_eq!(classify(&code, TransactionClass::Sale, 5, 3), FiscalOutcome::Success);
    }

    #[test]
    fn test_retries_exhausted() {
        let code = FiscalResponseCode::Timeout;
        assert!(matches!(
            classify(&code, TransactionClass::Sale, 2, 3),
            FiscalOutcome::Retry { .. }
        ));
        assert!(matches!(
            classify(&code, TransactionClass::Sale, 3, 3),
            FiscalOutcome::Unrecoverable { .. }
        ));
    }

    #[test]
    fn test_lockout_window() {
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let lockout = FiscalLockout::start(start);

        assert_eq!(lockout.remaining_secs(start), 30);
        assert_eq!(
            lockout.remaining_secs(start + Duration::milliseconds(29_500)),
            1
        );
        assert!(lockout.is_active(start + Duration::seconds(29)));
        assert!(!lockout.is_active(start + Duration::seconds(30)));
        assert_eq!(lockout.remaining_secs(start + Duration::seconds(90)), 0);
    }

    #[test]
    fn test_post_void_printers_by_serial() {
        let printers = vec![
            printer("front", PrinterClass::Fiscal, Some("FX-001")),
            printer("back", PrinterClass::Fiscal, Some("FX-002")),
            printer("office", PrinterClass::Standard, Some("FX-001")),
        ];

        let found = post_void_printers(&printers, Some("FX-001"));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "front");

        assert!(post_void_printers(&printers, Some("FX-999")).is_empty());
        assert!(post_void_printers(&printers, None).is_empty());
    }
}
