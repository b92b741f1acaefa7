//! # Eligibility Evaluator
//!
//! Pure decision table: which receipt categories and delivery channels a
//! transaction may get.
//!
//! ## Decision Order
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       evaluate()                                        │
//! │                                                                         │
//! │  origin offers a format choice?                                         │
//! │     │ no  ──► categories = { origin }                                   │
//! │     │ yes                                                               │
//! │     ▼                                                                   │
//! │  per format: configured ∧ not hidden by tax-free mix                    │
//! │              ∧ not blocked for orders ∧ issuance class allowed          │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  linked return + restrict_return_to_original?                           │
//! │     │ yes, a recorded category passes ──► categories = { that one }     │
//! │     │ otherwise                                                         │
//! │     ▼                                                                   │
//! │  invoice available ∧ |total| meets mandate?                             │
//! │     │ yes ──► full_tax_invoice_required, drop Receipt / VatReceipt      │
//! │     ▼                                                                   │
//! │  per category: configured types                                         │
//! │                − SMS unless Receipt on an end-of-sale flow              │
//! │                − Print/Both unless printing is permitted                │
//! │                − reprint buttons (reprint flows only)                   │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  drop categories with no types left                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Same inputs, same [`EligibilitySet`]. Nothing here touches a device, the
//! network or the clock.

use serde::{Deserialize, Serialize};
use tracing::debug;
use ts_rs::TS;

use crate::country::CountryInvoicingRule;
use crate::settings::ReceiptSettings;
use crate::tax_customer::{
    is_id_number_required, is_ruc_required, is_vat_number_required, TaxRequirements,
};
use crate::types::{AvailableCategoryButtons, ReceiptCategory, ReceiptType, TransactionSnapshot};

// =============================================================================
// Eligibility Set
// =============================================================================

/// One eligible category and the channels it may be delivered through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CategoryEligibility {
    pub category: ReceiptCategory,
    pub types: Vec<ReceiptType>,
}

/// Result of the eligibility evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct EligibilitySet {
    /// Eligible categories in display order. Never contains a category
    /// with an empty type list.
    pub categories: Vec<CategoryEligibility>,

    /// Set when the return restriction collapsed the set to one category.
    pub forced_category: Option<ReceiptCategory>,

    /// The total meets the country's mandatory-invoice threshold.
    pub full_tax_invoice_required: bool,

    pub ruc_required: bool,
    pub id_number_required: bool,
    pub vat_number_required: bool,

    /// What the tax customer step requires and offers for this total.
    pub tax_requirements: TaxRequirements,
}

impl EligibilitySet {
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Eligible categories in display order.
    pub fn category_options(&self) -> Vec<ReceiptCategory> {
        self.categories.iter().map(|c| c.category).collect()
    }

    pub fn is_eligible(&self, category: ReceiptCategory) -> bool {
        self.categories.iter().any(|c| c.category == category)
    }

    /// Eligible types for a category. Empty when the category is not eligible.
    pub fn types_for(&self, category: ReceiptCategory) -> &[ReceiptType] {
        self.categories
            .iter()
            .find(|c| c.category == category)
            .map(|c| c.types.as_slice())
            .unwrap_or(&[])
    }

    /// The only eligible category, if there is exactly one.
    pub fn single_category(&self) -> Option<ReceiptCategory> {
        match self.categories.as_slice() {
            [only] => Some(only.category),
            _ => None,
        }
    }

    /// The only eligible (category, type) pair, if there is exactly one.
    pub fn single_choice(&self) -> Option<(ReceiptCategory, ReceiptType)> {
        match self.categories.as_slice() {
            [only] => match only.types.as_slice() {
                [receipt_type] => Some((only.category, *receipt_type)),
                _ => None,
            },
            _ => None,
        }
    }
}

// =============================================================================
// Category Gates
// =============================================================================

/// Whether a selectable format is configured and allowed for this
/// transaction. Channel filtering is not part of this check.
pub fn format_allowed(
    settings: &ReceiptSettings,
    snapshot: &TransactionSnapshot,
    rule: &CountryInvoicingRule,
    category: ReceiptCategory,
) -> bool {
    if !settings.formats.is_enabled(category) {
        return false;
    }

    let hidden_by_tax_free = rule.mix_with_tax_free_disabled
        && snapshot.tax_free_in_progress
        && matches!(
            category,
            ReceiptCategory::VatReceipt | ReceiptCategory::Invoice | ReceiptCategory::FullPageInvoice
        );
    if hidden_by_tax_free {
        return false;
    }

    if category == ReceiptCategory::Invoice
        && snapshot.class.is_order_like()
        && !settings.full_tax_invoice_for_orders
    {
        return false;
    }

    rule.allowed_issuance(category)
        .permits(snapshot.issuance_class())
}

/// Whether the full-tax invoice may be delivered through `receipt_type` on
/// a flow opened by `origin`.
///
/// The buttons only restrict reprints. On every other origin they are
/// ignored and the answer is `true`.
///
/// ```rust
/// use titan_receipt::eligibility::full_tax_invoice_is_available;
/// use titan_receipt::types::{AvailableCategoryButtons, ReceiptCategory, ReceiptType};
///
/// let buttons = AvailableCategoryButtons {
///     email_full_tax_invoice_available: false,
///     reprint_full_tax_invoice_available: true,
///     ..Default::default()
/// };
/// let reprint = ReceiptCategory::ReprintReceipt;
/// assert!(!full_tax_invoice_is_available(reprint, ReceiptType::Email, Some(&buttons)));
/// assert!(full_tax_invoice_is_available(reprint, ReceiptType::Print, Some(&buttons)));
/// ```
pub fn full_tax_invoice_is_available(
    origin: ReceiptCategory,
    receipt_type: ReceiptType,
    buttons: Option<&AvailableCategoryButtons>,
) -> bool {
    channel_available(ReceiptCategory::Invoice, origin, receipt_type, buttons)
}

/// Reprint button gate for any category.
pub fn channel_available(
    category: ReceiptCategory,
    origin: ReceiptCategory,
    receipt_type: ReceiptType,
    buttons: Option<&AvailableCategoryButtons>,
) -> bool {
    if origin != ReceiptCategory::ReprintReceipt {
        return true;
    }
    buttons.map_or(true, |b| b.allows(category, receipt_type))
}

/// Eligible delivery channels for a category.
fn eligible_types(
    settings: &ReceiptSettings,
    snapshot: &TransactionSnapshot,
    category: ReceiptCategory,
    buttons: Option<&AvailableCategoryButtons>,
) -> Vec<ReceiptType> {
    let origin = snapshot.origin;
    let printing = settings.printing_permitted(origin);

    settings
        .type_choices(category)
        .enabled()
        .into_iter()
        .filter(|t| match t {
            ReceiptType::Sms => {
                category == ReceiptCategory::Receipt && origin == ReceiptCategory::Receipt
            }
            _ => true,
        })
        .filter(|t| printing || !t.needs_printer())
        .filter(|t| channel_available(category, origin, *t, buttons))
        .collect()
}

/// First recorded category of the original sale that still passes its own
/// gates, walking the fixed return priority.
fn restricted_return_category(
    snapshot: &TransactionSnapshot,
    rule: &CountryInvoicingRule,
    allowed: &[ReceiptCategory],
) -> Option<ReceiptCategory> {
    if !rule.restrict_return_to_original || !snapshot.is_linked_return() {
        return None;
    }
    let line = snapshot.original_receipt.as_ref()?;

    let found = ReceiptCategory::RETURN_RESTRICTION_PRIORITY
        .into_iter()
        .find(|c| line.issued(*c) && allowed.contains(c));

    if found.is_none() {
        debug!(
            transaction_id = %snapshot.transaction_id,
            issued = ?line.categories_issued,
            "Original receipt category not available, return restriction skipped"
        );
    }
    found
}

// =============================================================================
// Evaluator
// =============================================================================

/// Evaluates which categories and channels the transaction may get.
///
/// `buttons` is only honoured when the flow's origin is a reprint.
pub fn evaluate(
    settings: &ReceiptSettings,
    snapshot: &TransactionSnapshot,
    rule: &CountryInvoicingRule,
    buttons: Option<&AvailableCategoryButtons>,
) -> EligibilitySet {
    let total = snapshot.total;
    let buttons = buttons.filter(|_| snapshot.origin == ReceiptCategory::ReprintReceipt);

    let mut forced_category = None;
    let mut full_tax_invoice_required = false;

    let candidates: Vec<ReceiptCategory> = if snapshot.origin.offers_format_choice() {
        let mut allowed: Vec<ReceiptCategory> = ReceiptCategory::SELECTABLE_FORMATS
            .into_iter()
            .filter(|c| format_allowed(settings, snapshot, rule, *c))
            .collect();

        if let Some(category) = restricted_return_category(snapshot, rule, &allowed) {
            forced_category = Some(category);
            allowed = vec![category];
        } else if allowed.contains(&ReceiptCategory::Invoice) && rule.invoice_mandated(total) {
            full_tax_invoice_required = true;
            allowed.retain(|c| {
                !matches!(c, ReceiptCategory::Receipt | ReceiptCategory::VatReceipt)
            });
        }
        allowed
    } else {
        vec![snapshot.origin]
    };

    let categories: Vec<CategoryEligibility> = candidates
        .into_iter()
        .filter_map(|category| {
            let types = eligible_types(settings, snapshot, category, buttons);
            if types.is_empty() {
                debug!(%category, "No delivery channel left, category dropped");
                None
            } else {
                Some(CategoryEligibility { category, types })
            }
        })
        .collect();

    let set = EligibilitySet {
        categories,
        forced_category,
        full_tax_invoice_required,
        ruc_required: is_ruc_required(rule, total),
        id_number_required: is_id_number_required(rule, total),
        vat_number_required: is_vat_number_required(rule, total),
        tax_requirements: TaxRequirements::for_total(rule, total),
    };

    debug!(
        transaction_id = %snapshot.transaction_id,
        origin = %snapshot.origin,
        categories = ?set.category_options(),
        forced = ?set.forced_category,
        invoice_required = set.full_tax_invoice_required,
        "Eligibility evaluated"
    );

    set
}

// =============================================================================
// Unit Tests
// =============================================================================
