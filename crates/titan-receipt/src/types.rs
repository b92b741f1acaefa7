//! # Domain Types
//!
//! Core types shared by the eligibility evaluator, the validators and the
//! flow controller.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Receipt Domain Types                            │
//! │                                                                         │
//! │  ┌─────────────────────┐  ┌─────────────────┐  ┌─────────────────────┐ │
//! │  │  ReceiptCategory    │  │  ReceiptType    │  │  ReceiptPrinter     │ │
//! │  │  ─────────────────  │  │  ─────────────  │  │  ─────────────────  │ │
//! │  │  Receipt, Vat...    │  │  Print / Email  │  │  id, description    │ │
//! │  │  Invoice, PostVoid  │  │  Both / Sms     │  │  class (fiscal?)    │ │
//! │  │  Till, NoSale, ...  │  │  None           │  │  serial_number      │ │
//! │  └─────────────────────┘  └─────────────────┘  └─────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────────┐  ┌─────────────────┐  ┌─────────────────────┐ │
//! │  │ TransactionSnapshot │  │  ReceiptLine    │  │  ReceiptRequest     │ │
//! │  │  ─────────────────  │  │  ─────────────  │  │  ─────────────────  │ │
//! │  │  origin event       │  │  what the orig. │  │  THE output: one    │ │
//! │  │  class, total       │──►  transaction    │  │  per flow instance  │ │
//! │  │  tax customer       │  │  printed/sent   │  │                     │ │
//! │  └─────────────────────┘  └─────────────────┘  └─────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::money::Money;

// =============================================================================
// Receipt Category
// =============================================================================

/// What kind of document is issued.
///
/// The first five variants are the *formats* a cashier can choose between at
/// the end of a sale or on a reprint. The rest are fixed by the business event
/// that opened the flow (a till count always produces a `Till` slip).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum ReceiptCategory {
    /// Standard end-of-transaction receipt.
    Receipt,
    /// Simplified VAT receipt.
    VatReceipt,
    /// Full-tax invoice.
    Invoice,
    FullPageInvoice,
    JapanRssReceipt,
    ReprintReceipt,
    PostVoid,
    Void,
    Till,
    PaidOperation,
    BalanceInquiry,
    Suspend,
    NoSale,
    TenderExchange,
    FullPageCreditNote,
}

impl ReceiptCategory {
    /// The formats offered on the category choice, in display order.
    pub const SELECTABLE_FORMATS: [ReceiptCategory; 5] = [
        ReceiptCategory::Receipt,
        ReceiptCategory::VatReceipt,
        ReceiptCategory::Invoice,
        ReceiptCategory::FullPageInvoice,
        ReceiptCategory::JapanRssReceipt,
    ];

    /// Priority order used when a return must reuse the original category.
    pub const RETURN_RESTRICTION_PRIORITY: [ReceiptCategory; 4] = [
        ReceiptCategory::Receipt,
        ReceiptCategory::VatReceipt,
        ReceiptCategory::Invoice,
        ReceiptCategory::FullPageInvoice,
    ];

    /// True for the five cashier-selectable formats.
    pub fn is_selectable_format(&self) -> bool {
        Self::SELECTABLE_FORMATS.contains(self)
    }

    /// Invoice-class documents need buyer tax identification.
    pub fn requires_tax_customer(&self) -> bool {
        matches!(
            self,
            ReceiptCategory::Invoice
                | ReceiptCategory::FullPageInvoice
                | ReceiptCategory::JapanRssReceipt
        )
    }

    /// Whether a flow opened by this event lets the cashier pick a format.
    pub fn offers_format_choice(&self) -> bool {
        matches!(self, ReceiptCategory::Receipt | ReceiptCategory::ReprintReceipt)
    }

    /// Original vs reprint, as seen by the country issuance restrictions.
    pub fn issuance_class(&self) -> IssuanceClass {
        if *self == ReceiptCategory::ReprintReceipt {
            IssuanceClass::Reprint
        } else {
            IssuanceClass::Original
        }
    }
}

impl fmt::Display for ReceiptCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReceiptCategory::Receipt => "receipt",
            ReceiptCategory::VatReceipt => "vat_receipt",
            ReceiptCategory::Invoice => "invoice",
            ReceiptCategory::FullPageInvoice => "full_page_invoice",
            ReceiptCategory::JapanRssReceipt => "japan_rss_receipt",
            ReceiptCategory::ReprintReceipt => "reprint_receipt",
            ReceiptCategory::PostVoid => "post_void",
            ReceiptCategory::Void => "void",
            ReceiptCategory::Till => "till",
            ReceiptCategory::PaidOperation => "paid_operation",
            ReceiptCategory::BalanceInquiry => "balance_inquiry",
            ReceiptCategory::Suspend => "suspend",
            ReceiptCategory::NoSale => "no_sale",
            ReceiptCategory::TenderExchange => "tender_exchange",
            ReceiptCategory::FullPageCreditNote => "full_page_credit_note",
        };
        f.write_str(name)
    }
}

// =============================================================================
// Receipt Type (delivery channel)
// =============================================================================

/// Delivery channel(s) for the receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum ReceiptType {
    Print,
    Email,
    /// Print and email.
    Both,
    Sms,
    /// No receipt at all.
    None,
}

impl ReceiptType {
    pub const ALL: [ReceiptType; 5] = [
        ReceiptType::Print,
        ReceiptType::Email,
        ReceiptType::Both,
        ReceiptType::Sms,
        ReceiptType::None,
    ];

    #[inline]
    pub fn needs_printer(&self) -> bool {
        matches!(self, ReceiptType::Print | ReceiptType::Both)
    }

    #[inline]
    pub fn needs_email(&self) -> bool {
        matches!(self, ReceiptType::Email | ReceiptType::Both)
    }

    #[inline]
    pub fn needs_phone(&self) -> bool {
        matches!(self, ReceiptType::Sms)
    }
}

impl fmt::Display for ReceiptType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReceiptType::Print => "print",
            ReceiptType::Email => "email",
            ReceiptType::Both => "both",
            ReceiptType::Sms => "sms",
            ReceiptType::None => "none",
        };
        f.write_str(name)
    }
}

// =============================================================================
// Transaction Classification
// =============================================================================

/// Business class of the transaction behind the receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum TransactionClass {
    #[default]
    Sale,
    Return,
    Order,
    Pickup,
    Account,
}

impl TransactionClass {
    /// Counter sales and returns. Fiscal refund retries only apply here.
    pub fn is_retail(&self) -> bool {
        matches!(self, TransactionClass::Sale | TransactionClass::Return)
    }

    /// Orders, pickups and account payments.
    pub fn is_order_like(&self) -> bool {
        matches!(
            self,
            TransactionClass::Order | TransactionClass::Pickup | TransactionClass::Account
        )
    }
}

/// Whether the receipt is issued for the first time or reprinted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum IssuanceClass {
    Original,
    Reprint,
}

/// Country restriction on which issuance class a format is offered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum AllowedIssuance {
    Original,
    Reprint,
    #[default]
    Both,
}

impl AllowedIssuance {
    pub fn permits(&self, class: IssuanceClass) -> bool {
        match self {
            AllowedIssuance::Both => true,
            AllowedIssuance::Original => class == IssuanceClass::Original,
            AllowedIssuance::Reprint => class == IssuanceClass::Reprint,
        }
    }
}

// =============================================================================
// Printers
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum PrinterClass {
    /// Government fiscal-reporting device with its own response protocol.
    Fiscal,
    #[default]
    Standard,
}

/// A configured receipt printer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ReceiptPrinter {
    pub id: String,

    /// Shown to the cashier on the printer choice.
    pub description: String,

    #[serde(default)]
    pub class: PrinterClass,

    /// Fiscal device serial. Post-voids must print on the device whose
    /// serial is recorded on the original receipt line.
    #[serde(default)]
    pub serial_number: Option<String>,
}

impl ReceiptPrinter {
    #[inline]
    pub fn is_fiscal(&self) -> bool {
        self.class == PrinterClass::Fiscal
    }
}

// =============================================================================
// Available Category Buttons (reprint gating)
// =============================================================================

/// Which format/channel combinations were actually available when the
/// original receipt was issued.
///
/// Only consulted when the current flow is a reprint. A reprint must never
/// offer an email full-tax invoice if the original sale could not email one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[serde(default)]
#[ts(export)]
pub struct AvailableCategoryButtons {
    pub email_standard_available: bool,
    pub reprint_standard_available: bool,
    pub email_vat_available: bool,
    pub reprint_vat_available: bool,
    pub email_full_tax_invoice_available: bool,
    pub reprint_full_tax_invoice_available: bool,
    pub email_full_page_invoice_available: bool,
    pub reprint_full_page_invoice_available: bool,
    pub email_japan_rss_available: bool,
    pub reprint_japan_rss_available: bool,
}

impl AvailableCategoryButtons {
    /// Everything available. Handy for tests and for stores that record
    /// nothing at issuance.
    pub fn all() -> Self {
        AvailableCategoryButtons {
            email_standard_available: true,
            reprint_standard_available: true,
            email_vat_available: true,
            reprint_vat_available: true,
            email_full_tax_invoice_available: true,
            reprint_full_tax_invoice_available: true,
            email_full_page_invoice_available: true,
            reprint_full_page_invoice_available: true,
            email_japan_rss_available: true,
            reprint_japan_rss_available: true,
        }
    }

    /// `(email, reprint)` flags for a selectable format.
    pub fn flags_for(&self, category: ReceiptCategory) -> Option<(bool, bool)> {
        match category {
            ReceiptCategory::Receipt => {
                Some((self.email_standard_available, self.reprint_standard_available))
            }
            ReceiptCategory::VatReceipt => {
                Some((self.email_vat_available, self.reprint_vat_available))
            }
            ReceiptCategory::Invoice => Some((
                self.email_full_tax_invoice_available,
                self.reprint_full_tax_invoice_available,
            )),
            ReceiptCategory::FullPageInvoice => Some((
                self.email_full_page_invoice_available,
                self.reprint_full_page_invoice_available,
            )),
            ReceiptCategory::JapanRssReceipt => Some((
                self.email_japan_rss_available,
                self.reprint_japan_rss_available,
            )),
            _ => None,
        }
    }

    /// Whether `receipt_type` may be offered for `category` on a reprint.
    ///
    /// Categories without recorded flags are not restricted.
    pub fn allows(&self, category: ReceiptCategory, receipt_type: ReceiptType) -> bool {
        let Some((email, reprint)) = self.flags_for(category) else {
            return true;
        };

        match receipt_type {
            ReceiptType::Print => reprint,
            ReceiptType::Email => email,
            ReceiptType::Both => email && reprint,
            ReceiptType::Sms => false,
            ReceiptType::None => true,
        }
    }
}

// =============================================================================
// Original Receipt Line
// =============================================================================

/// The receipt line recorded on an earlier transaction.
///
/// For a linked return this is the line of the sale being returned; for a
/// reprint or post-void it is the line of the transaction itself.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[serde(default)]
#[ts(export)]
pub struct ReceiptLine {
    /// Categories that were issued for the original transaction.
    pub categories_issued: Vec<ReceiptCategory>,

    /// Serial of the fiscal device that printed the original.
    pub fiscal_serial_number: Option<String>,

    pub print_succeeded: bool,
    pub email_succeeded: bool,

    /// Format/channel availability at original issuance (reprints only).
    pub available_buttons: Option<AvailableCategoryButtons>,
}

impl ReceiptLine {
    pub fn issued(&self, category: ReceiptCategory) -> bool {
        self.categories_issued.contains(&category)
    }
}

// =============================================================================
// Tax Customer
// =============================================================================

/// Buyer tax identification.
///
/// Which fields are required depends on the country; see
/// [`crate::tax_customer`]. Empty strings mean "not provided".
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[serde(default)]
#[ts(export)]
pub struct TaxCustomer {
    pub first_name: String,
    pub last_name: String,
    pub company_name: String,
    pub address_line1: String,
    pub address_line2: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country_code: String,
    /// Government tax identifier value (NIF, CF, RFC, ...).
    pub government_tax_identifier: String,
    pub tax_code: String,
    /// Italian certified e-mail (posta elettronica certificata).
    pub pec_address: String,
    /// Italian recipient code for e-invoicing.
    pub address_code: String,
    pub id_number: String,
    /// Peruvian taxpayer registry number.
    pub ruc: String,
    pub vat_number: String,
}

// =============================================================================
// Destination
// =============================================================================

/// Where an electronic receipt goes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "kind", content = "address", rename_all = "snake_case")]
#[ts(export)]
pub enum ReceiptDestination {
    Email(String),
    Phone(String),
}

// =============================================================================
// Transaction Snapshot
// =============================================================================

/// What the engine is told about the transaction.
///
/// Produced by the transaction business-state machine once the transaction
/// is receipt-eligible. Read-only for the whole flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TransactionSnapshot {
    pub transaction_id: String,

    /// Business event that opened the receipt flow.
    pub origin: ReceiptCategory,

    #[serde(default)]
    pub class: TransactionClass,

    /// Total in the accounting currency. Negative for refunds.
    pub total: Money,

    pub currency: String,

    /// A tax-free (export refund) form is being processed on this sale.
    #[serde(default)]
    pub tax_free_in_progress: bool,

    /// Recorded line of the original transaction (linked returns,
    /// reprints, post-voids).
    #[serde(default)]
    pub original_receipt: Option<ReceiptLine>,

    /// Tax customer already attached to the transaction, if any.
    #[serde(default)]
    pub tax_customer: Option<TaxCustomer>,

    #[serde(default)]
    pub customer_email: Option<String>,

    #[serde(default)]
    pub customer_phone: Option<String>,
}

impl TransactionSnapshot {
    /// Minimal sale snapshot; fields can be adjusted by the caller.
    pub fn sale(transaction_id: impl Into<String>, total: Money, currency: &str) -> Self {
        TransactionSnapshot {
            transaction_id: transaction_id.into(),
            origin: ReceiptCategory::Receipt,
            class: TransactionClass::Sale,
            total,
            currency: currency.to_string(),
            tax_free_in_progress: false,
            original_receipt: None,
            tax_customer: None,
            customer_email: None,
            customer_phone: None,
        }
    }

    pub fn issuance_class(&self) -> IssuanceClass {
        self.origin.issuance_class()
    }

    /// A return that references the sale it refunds.
    pub fn is_linked_return(&self) -> bool {
        self.class == TransactionClass::Return && self.original_receipt.is_some()
    }

    /// Reprint gating buttons, only present on reprint flows.
    pub fn reprint_buttons(&self) -> Option<&AvailableCategoryButtons> {
        if self.origin != ReceiptCategory::ReprintReceipt {
            return None;
        }
        self.original_receipt
            .as_ref()
            .and_then(|line| line.available_buttons.as_ref())
    }
}

// =============================================================================
// Receipt Request (engine output)
// =============================================================================

/// The fully resolved receipt request handed to the business-operation
/// dispatcher.
///
/// Built once, at the submit transition. Never modified afterwards: a fiscal
/// retry re-targets the print by `id`, it does not build a new request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ReceiptRequest {
    /// Request identifier (UUID v4).
    pub id: String,
    pub transaction_id: String,
    pub category: ReceiptCategory,
    pub receipt_type: ReceiptType,
    pub destination: Option<ReceiptDestination>,
    pub printer_id: Option<String>,
    pub tax_customer: Option<TaxCustomer>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invoice_class_categories() {
        assert!(ReceiptCategory::Invoice.requires_tax_customer());
        assert!(ReceiptCategory::FullPageInvoice.requires_tax_customer());
        assert!(ReceiptCategory::JapanRssReceipt.requires_tax_customer());
        assert!(!ReceiptCategory::VatReceipt.requires_tax_customer());
        assert!(!ReceiptCategory::FullPageCreditNote.requires_tax_customer());
    }

    #[test]
    fn test_format_choice_origins() {
        assert!(ReceiptCategory::Receipt.offers_format_choice());
        assert!(ReceiptCategory::ReprintReceipt.offers_format_choice());
        assert!(!ReceiptCategory::PostVoid.offers_format_choice());
        assert!(!ReceiptCategory::Till.offers_format_choice());
    }

    #[test]
    fn test_receipt_type_channels() {
        assert!(ReceiptType::Both.needs_printer());
        assert!(ReceiptType::Both.needs_email());
        assert!(!ReceiptType::Email.needs_printer());
        assert!(ReceiptType::Sms.needs_phone());
        assert!(!ReceiptType::None.needs_printer());
    }

    #[test]
    fn test_allowed_issuance() {
        assert!(AllowedIssuance::Both.permits(IssuanceClass::Reprint));
        assert!(AllowedIssuance::Original.permits(IssuanceClass::Original));
        assert!(!AllowedIssuance::Original.permits(IssuanceClass::Reprint));
        assert!(!AllowedIssuance::Reprint.permits(IssuanceClass::Original));
    }

    #[test]
    fn test_buttons_allow_by_channel() {
        let buttons = AvailableCategoryButtons {
            email_full_tax_invoice_available: false,
            reprint_full_tax_invoice_available: true,
            ..Default::default()
        };
        assert!(!buttons.allows(ReceiptCategory::Invoice, ReceiptType::Email));
        assert!(buttons.allows(ReceiptCategory::Invoice, ReceiptType::Print));
        assert!(!buttons.allows(ReceiptCategory::Invoice, ReceiptType::Both));
        assert!(buttons.allows(ReceiptCategory::Invoice, ReceiptType::None));
        // Non-format categories are never gated
        assert!(buttons.allows(ReceiptCategory::PostVoid, ReceiptType::Email));
    }

    #[test]
    fn test_reprint_buttons_only_on_reprint() {
        let mut snapshot = TransactionSnapshot::sale("t-1", Money::from_cents(100), "EUR");
        snapshot.original_receipt = Some(ReceiptLine {
            available_buttons: Some(AvailableCategoryButtons::all()),
            ..Default::default()
        });
        assert!(snapshot.reprint_buttons().is_none());

        snapshot.origin = ReceiptCategory::ReprintReceipt;
        assert!(snapshot.reprint_buttons().is_some());
    }

    #[test]
    fn test_category_serde_names() {
        let json = serde_json::to_string(&ReceiptCategory::JapanRssReceipt).unwrap();
        assert_eq!(json, "\"japan_rss_receipt\"");
        let parsed: ReceiptCategory = serde_json::from_str("\"full_page_invoice\"").unwrap();
        assert_eq!(parsed, ReceiptCategory::FullPageInvoice);
    }

    #[test]
    fn test_destination_serde_shape() {
        let dest = ReceiptDestination::Email("a@b.co".into());
        let json = serde_json::to_value(&dest).unwrap();
        assert_eq!(json["kind"], "email");
        assert_eq!(json["address"], "a@b.co");
    }
}
