//! # titan-receipt: Receipt Issuance Engine for Titan POS
//!
//! Decides which receipt a finished transaction may get and walks the
//! cashier through the fewest possible questions to get it issued.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Receipt Issuance Architecture                       │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    Presentation layer                           │   │
//! │  │    renders Prompt ──► cashier answers ──► FlowEvent             │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               titan-issuance (runtime shell)                    │   │
//! │  │    config, email verification, dispatcher, device feed          │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ titan-receipt (THIS CRATE) ★                    │   │
//! │  │                                                                 │   │
//! │  │   ┌─────────────┐  ┌─────────────┐  ┌─────────────────────┐    │   │
//! │  │   │ eligibility │  │    flow     │  │  tax_customer       │    │   │
//! │  │   │ decision    │─►│ state       │◄─│  destination        │    │   │
//! │  │   │ table       │  │ machine     │  │  fiscal             │    │   │
//! │  │   └─────────────┘  └─────────────┘  └─────────────────────┘    │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO CLOCK • NO NETWORK • DETERMINISTIC                │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Categories, channels, printers, snapshot, request
//! - [`money`] - Integer money for thresholds
//! - [`country`] - Country invoicing rules as data
//! - [`settings`] - What the engine reads from store configuration
//! - [`eligibility`] - Which categories and channels are allowed
//! - [`tax_customer`] - Per-country required tax fields
//! - [`destination`] - Email and phone validation
//! - [`fiscal`] - Fiscal device outcomes and the navigation lockout
//! - [`flow`] - The receipt flow state machine
//! - [`error`] - Validation and flow errors
//!
//! ## Example Usage
//!
//! ```rust
//! use chrono::Utc;
//! use titan_receipt::{CountryRuleTable, FlowEvent, Money, ReceiptCategory, ReceiptFlow};
//! use titan_receipt::{ReceiptSettings, Step, TransactionSnapshot};
//!
//! let table = CountryRuleTable::builtin();
//! let snapshot = TransactionSnapshot::sale("t-42", Money::from_cents(4_500), "EUR");
//! let (mut flow, step) =
//!     ReceiptFlow::start(ReceiptSettings::default(), table.rule_for("FR").clone(), snapshot, Utc::now())
//!         .unwrap();
//!
//! // Only the standard receipt is configured, so the cashier starts on the
//! // channel choice.
//! assert!(matches!(step, Step::Prompt { .. }));
//! assert_eq!(flow.category(), Some(ReceiptCategory::Receipt));
//!
//! let step = flow.handle(FlowEvent::Cancel, Utc::now()).unwrap();
//! assert_eq!(step, Step::Exited);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod country;
pub mod destination;
pub mod eligibility;
pub mod error;
pub mod fiscal;
pub mod flow;
pub mod money;
pub mod settings;
pub mod tax_customer;
pub mod types;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use country::{CountryInvoicingRule, CountryRuleTable, ThresholdComparison};
pub use eligibility::{evaluate, EligibilitySet};
pub use error::{FlowError, FlowResult, ValidationError, ValidationResult};
pub use fiscal::{FiscalOutcome, FiscalResponseCode, FISCAL_LOCKOUT_SECS};
pub use flow::{DispatchResult, FlowEvent, FlowState, Prompt, ReceiptFlow, Step};
pub use money::Money;
pub use settings::ReceiptSettings;
pub use tax_customer::{TaxField, TaxRequirements};
pub use types::*;
