//! # Receipt Settings
//!
//! The slice of store configuration the engine reads.
//!
//! Loading, file formats and environment overrides live in the runtime
//! crate. This module only defines the shape and the defaults. Settings are
//! read-only for the whole lifetime of a flow.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::destination::DEFAULT_PHONE_MIN_LENGTH;
use crate::types::{ReceiptCategory, ReceiptPrinter, ReceiptType};

/// Default number of fiscal retries before the flow gives up.
pub const DEFAULT_MAX_FISCAL_RETRIES: u32 = 3;

// =============================================================================
// Format Toggles
// =============================================================================

/// Which selectable formats the store has configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatToggles {
    pub standard: bool,
    pub vat: bool,
    pub full_tax_invoice: bool,
    pub full_page_invoice: bool,
    pub japan_rss: bool,
}

impl Default for FormatToggles {
    fn default() -> Self {
        FormatToggles {
            standard: true,
            vat: false,
            full_tax_invoice: false,
            full_page_invoice: false,
            japan_rss: false,
        }
    }
}

impl FormatToggles {
    pub fn is_enabled(&self, category: ReceiptCategory) -> bool {
        match category {
            ReceiptCategory::Receipt => self.standard,
            ReceiptCategory::VatReceipt => self.vat,
            ReceiptCategory::Invoice => self.full_tax_invoice,
            ReceiptCategory::FullPageInvoice => self.full_page_invoice,
            ReceiptCategory::JapanRssReceipt => self.japan_rss,
            _ => false,
        }
    }
}

// =============================================================================
// Type Choices
// =============================================================================

/// Delivery channels enabled for a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TypeChoices {
    pub print: bool,
    pub email: bool,
    pub both: bool,
    pub sms: bool,
    pub none: bool,
}

impl Default for TypeChoices {
    fn default() -> Self {
        TypeChoices {
            print: true,
            email: true,
            both: false,
            sms: false,
            none: true,
        }
    }
}

impl TypeChoices {
    /// Print only. Typical for till slips and post-voids.
    pub fn print_only() -> Self {
        TypeChoices {
            print: true,
            email: false,
            both: false,
            sms: false,
            none: false,
        }
    }

    pub fn is_enabled(&self, receipt_type: ReceiptType) -> bool {
        match receipt_type {
            ReceiptType::Print => self.print,
            ReceiptType::Email => self.email,
            ReceiptType::Both => self.both,
            ReceiptType::Sms => self.sms,
            ReceiptType::None => self.none,
        }
    }

    /// Enabled types in display order.
    pub fn enabled(&self) -> Vec<ReceiptType> {
        ReceiptType::ALL
            .into_iter()
            .filter(|t| self.is_enabled(*t))
            .collect()
    }
}

// =============================================================================
// Receipt Settings
// =============================================================================

/// Everything the engine needs from configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptSettings {
    #[serde(default)]
    pub formats: FormatToggles,

    /// Channels for categories without an override.
    #[serde(default)]
    pub default_types: TypeChoices,

    /// Per-category channel overrides.
    #[serde(default)]
    pub type_overrides: BTreeMap<ReceiptCategory, TypeChoices>,

    /// Business events for which printing is not permitted.
    #[serde(default)]
    pub print_disabled_for: Vec<ReceiptCategory>,

    /// Offer the full-tax invoice on order, pickup and account transactions.
    #[serde(default)]
    pub full_tax_invoice_for_orders: bool,

    #[serde(default = "default_phone_min_length")]
    pub phone_min_length: usize,

    #[serde(default = "default_max_fiscal_retries")]
    pub max_fiscal_retries: u32,

    /// Run the external email verification after the syntax check.
    #[serde(default)]
    pub verify_email: bool,

    /// Verification rejections with these messages are let through.
    #[serde(default)]
    pub email_bypass_messages: Vec<String>,

    /// Printers known when the flow starts. More may arrive later.
    #[serde(default)]
    pub printers: Vec<ReceiptPrinter>,
}

fn default_phone_min_length() -> usize {
    DEFAULT_PHONE_MIN_LENGTH
}

fn default_max_fiscal_retries() -> u32 {
    DEFAULT_MAX_FISCAL_RETRIES
}

impl Default for ReceiptSettings {
    fn default() -> Self {
        ReceiptSettings {
            formats: FormatToggles::default(),
            default_types: TypeChoices::default(),
            type_overrides: BTreeMap::new(),
            print_disabled_for: Vec::new(),
            full_tax_invoice_for_orders: false,
            phone_min_length: default_phone_min_length(),
            max_fiscal_retries: default_max_fiscal_retries(),
            verify_email: false,
            email_bypass_messages: Vec::new(),
            printers: Vec::new(),
        }
    }
}

impl ReceiptSettings {
    /// Channel configuration for a category.
    pub fn type_choices(&self, category: ReceiptCategory) -> TypeChoices {
        self.type_overrides
            .get(&category)
            .copied()
            .unwrap_or(self.default_types)
    }

    /// Whether printing is permitted for the business event.
    pub fn printing_permitted(&self, origin: ReceiptCategory) -> bool {
        !self.print_disabled_for.contains(&origin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_type_choices() {
        let settings = ReceiptSettings::default();
        assert_eq!(
            settings.type_choices(ReceiptCategory::Receipt).enabled(),
            vec![ReceiptType::Print, ReceiptType::Email, ReceiptType::None]
        );
    }

    #[test]
    fn test_type_override_wins() {
        let mut settings = ReceiptSettings::default();
        settings
            .type_overrides
            .insert(ReceiptCategory::Till, TypeChoices::print_only());
        assert_eq!(
            settings.type_choices(ReceiptCategory::Till).enabled(),
            vec![ReceiptType::Print]
        );
    }

    #[test]
    fn test_format_toggles() {
        let toggles = FormatToggles::default();
        assert!(toggles.is_enabled(ReceiptCategory::Receipt));
        assert!(!toggles.is_enabled(ReceiptCategory::Invoice));
        assert!(!toggles.is_enabled(ReceiptCategory::Till));
    }

    #[test]
    fn test_printing_permitted() {
        let settings = ReceiptSettings {
            print_disabled_for: vec![ReceiptCategory::NoSale],
            ..Default::default()
        };
        assert!(!settings.printing_permitted(ReceiptCategory::NoSale));
        assert!(settings.printing_permitted(ReceiptCategory::Receipt));
    }
}
