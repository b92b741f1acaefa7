//! # Country Invoicing Rules
//!
//! Per-country receipt regulation expressed as data.
//!
//! ## Why a Table?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Country Rule Lookup                                  │
//! │                                                                         │
//! │   store.country = "PE"                                                  │
//! │          │                                                              │
//! │          ▼                                                              │
//! │   CountryRuleTable::rule_for("PE")                                      │
//! │          │                                                              │
//! │          ├── configured [[country_rules]] entry?  ──► use it            │
//! │          ├── built-in entry?                       ──► use it           │
//! │          └── otherwise                             ──► permissive rule  │
//! │                                                                         │
//! │   Adding a locale = adding a TOML entry. No code change.                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The built-in entries cover the locales the POS ships with today. Stores
//! override them through the `[[country_rules]]` section of the issuance
//! configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::money::Money;
use crate::tax_customer::TaxField;
use crate::types::{AllowedIssuance, ReceiptCategory};

// =============================================================================
// Threshold Comparison
// =============================================================================

/// How a total is compared against a country threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdComparison {
    /// `|total| >= threshold` (Peru).
    Inclusive,
    /// `|total| > threshold`.
    #[default]
    Exclusive,
}

impl ThresholdComparison {
    pub fn is_met(&self, total: Money, threshold: Money) -> bool {
        let total = total.abs();
        match self {
            ThresholdComparison::Inclusive => total >= threshold,
            ThresholdComparison::Exclusive => total > threshold,
        }
    }
}

// =============================================================================
// Country Invoicing Rule
// =============================================================================

/// Receipt regulation for one country.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountryInvoicingRule {
    /// ISO 3166-1 alpha-2 code, upper case. `"*"` for the fallback rule.
    pub country: String,

    /// Totals above this amount must get a full-tax invoice.
    #[serde(default)]
    pub mandate_invoice_amount: Option<Money>,

    /// Comparison used for every threshold of this country.
    #[serde(default)]
    pub threshold_comparison: ThresholdComparison,

    /// Buyer id number becomes required from this total.
    #[serde(default)]
    pub id_number_threshold: Option<Money>,

    /// RUC becomes required from this total.
    #[serde(default)]
    pub ruc_threshold: Option<Money>,

    /// VAT number becomes required from this total.
    #[serde(default)]
    pub vat_number_threshold: Option<Money>,

    /// Tax documents cannot be mixed with a tax-free refund form.
    #[serde(default)]
    pub mix_with_tax_free_disabled: bool,

    /// Returns linked to a sale must reuse the sale's receipt category.
    #[serde(default)]
    pub restrict_return_to_original: bool,

    /// A customer-detail confirmation page is shown before printing.
    #[serde(default)]
    pub confirm_customer_before_print: bool,

    /// Original/reprint restriction per format. Missing formats allow both.
    #[serde(default)]
    pub issuance: BTreeMap<ReceiptCategory, AllowedIssuance>,

    /// Fields every invoice-class tax customer must have. A rule that
    /// leaves them out still requires name and address.
    #[serde(default = "default_tax_fields")]
    pub tax_fields: Vec<TaxField>,

    /// Fields offered on the tax customer form but only required once the
    /// matching threshold is met (id number, RUC, VAT number).
    #[serde(default)]
    pub additional_fields: Vec<TaxField>,
}

fn default_tax_fields() -> Vec<TaxField> {
    vec![TaxField::FirstName, TaxField::LastName, TaxField::AddressLine1]
}

impl CountryInvoicingRule {
    /// A rule with no restrictions at all.
    pub fn permissive(country: &str) -> Self {
        CountryInvoicingRule {
            country: country.to_uppercase(),
            mandate_invoice_amount: None,
            threshold_comparison: ThresholdComparison::Exclusive,
            id_number_threshold: None,
            ruc_threshold: None,
            vat_number_threshold: None,
            mix_with_tax_free_disabled: false,
            restrict_return_to_original: false,
            confirm_customer_before_print: false,
            issuance: BTreeMap::new(),
            tax_fields: default_tax_fields(),
            additional_fields: Vec::new(),
        }
    }

    /// Issuance restriction for a format.
    pub fn allowed_issuance(&self, category: ReceiptCategory) -> AllowedIssuance {
        self.issuance.get(&category).copied().unwrap_or_default()
    }

    /// Applies this country's comparison to an optional threshold.
    pub fn threshold_met(&self, threshold: Option<Money>, total: Money) -> bool {
        threshold.is_some_and(|t| self.threshold_comparison.is_met(total, t))
    }

    /// Whether the total forces a full-tax invoice.
    pub fn invoice_mandated(&self, total: Money) -> bool {
        self.threshold_met(self.mandate_invoice_amount, total)
    }
}

// =============================================================================
// Rule Table
// =============================================================================

/// Country rules keyed by country code.
#[derive(Debug, Clone)]
pub struct CountryRuleTable {
    rules: BTreeMap<String, CountryInvoicingRule>,
    fallback: CountryInvoicingRule,
}

impl Default for CountryRuleTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl CountryRuleTable {
    /// The rules shipped with the POS.
    pub fn builtin() -> Self {
        let mut table = CountryRuleTable {
            rules: BTreeMap::new(),
            fallback: CountryInvoicingRule::permissive("*"),
        };
        for rule in builtin_rules() {
            table.insert(rule);
        }
        table
    }

    /// Adds or replaces a rule. `"*"` replaces the fallback.
    pub fn insert(&mut self, mut rule: CountryInvoicingRule) {
        rule.country = rule.country.trim().to_uppercase();
        if rule.country == "*" {
            self.fallback = rule;
        } else {
            self.rules.insert(rule.country.clone(), rule);
        }
    }

    /// Built-in table with configured overrides applied on top.
    pub fn with_overrides(overrides: impl IntoIterator<Item = CountryInvoicingRule>) -> Self {
        let mut table = Self::builtin();
        for rule in overrides {
            table.insert(rule);
        }
        table
    }

    /// Rule for a country, falling back to the permissive rule.
    pub fn rule_for(&self, country: &str) -> &CountryInvoicingRule {
        self.rules
            .get(&country.trim().to_uppercase())
            .unwrap_or(&self.fallback)
    }

    pub fn countries(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }
}

fn builtin_rules() -> Vec<CountryInvoicingRule> {
    use ReceiptCategory as C;
    use TaxField as F;

    vec![
        // Peru: boleta with buyer DNI from S/ 700, factura needs RUC.
        CountryInvoicingRule {
            mandate_invoice_amount: Some(Money::from_major_minor(700, 0)),
            threshold_comparison: ThresholdComparison::Inclusive,
            id_number_threshold: Some(Money::from_major_minor(700, 0)),
            ruc_threshold: Some(Money::zero()),
            tax_fields: vec![F::FirstName, F::LastName, F::AddressLine1],
            additional_fields: vec![F::IdNumber, F::Ruc],
            ..CountryInvoicingRule::permissive("PE")
        },
        // Portugal: NIF mandatory above 1000 EUR.
        CountryInvoicingRule {
            vat_number_threshold: Some(Money::from_major_minor(1000, 0)),
            tax_fields: vec![
                F::FirstName,
                F::LastName,
                F::AddressLine1,
                F::City,
                F::PostalCode,
                F::CountryCode,
            ],
            additional_fields: vec![F::VatNumber],
            ..CountryInvoicingRule::permissive("PT")
        },
        // Costa Rica: electronic invoice, customer confirmed before print.
        CountryInvoicingRule {
            restrict_return_to_original: true,
            confirm_customer_before_print: true,
            tax_fields: vec![
                F::FirstName,
                F::LastName,
                F::GovernmentTaxIdentifier,
                F::AddressLine1,
            ],
            additional_fields: vec![F::IdNumber],
            ..CountryInvoicingRule::permissive("CR")
        },
        // France: détaxe cannot be mixed with tax documents.
        CountryInvoicingRule {
            mix_with_tax_free_disabled: true,
            tax_fields: vec![
                F::CompanyName,
                F::AddressLine1,
                F::City,
                F::PostalCode,
                F::CountryCode,
            ],
            additional_fields: vec![F::VatNumber],
            ..CountryInvoicingRule::permissive("FR")
        },
        // Italy: e-invoicing identifiers, returns keep the sale's format.
        CountryInvoicingRule {
            restrict_return_to_original: true,
            issuance: BTreeMap::from([(C::FullPageInvoice, AllowedIssuance::Original)]),
            tax_fields: vec![
                F::FirstName,
                F::LastName,
                F::AddressLine1,
                F::AddressLine2,
                F::GovernmentTaxIdentifier,
                F::TaxCode,
                F::PecAddress,
                F::AddressCode,
                F::CountryCode,
                F::City,
                F::State,
                F::PostalCode,
            ],
            additional_fields: vec![F::IdNumber, F::Ruc],
            ..CountryInvoicingRule::permissive("IT")
        },
        // Japan: RSS receipts only at original issuance, no tax-free mixing.
        CountryInvoicingRule {
            mix_with_tax_free_disabled: true,
            issuance: BTreeMap::from([(C::JapanRssReceipt, AllowedIssuance::Original)]),
            tax_fields: vec![F::FirstName, F::LastName, F::AddressLine1, F::PostalCode],
            ..CountryInvoicingRule::permissive("JP")
        },
    ]
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_comparison() {
        let threshold = Money::from_major_minor(700, 0);
        assert!(ThresholdComparison::Inclusive.is_met(threshold, threshold));
        assert!(!ThresholdComparison::Exclusive.is_met(threshold, threshold));
        assert!(ThresholdComparison::Exclusive.is_met(Money::from_cents(70_001), threshold));
        // Returns compare by absolute value
        assert!(ThresholdComparison::Inclusive.is_met(Money::from_cents(-70_000), threshold));
    }

    #[test]
    fn test_rule_lookup_is_case_insensitive() {
        let table = CountryRuleTable::builtin();
        assert_eq!(table.rule_for("pe").country, "PE");
        assert_eq!(table.rule_for(" it ").country, "IT");
    }

    #[test]
    fn test_unknown_country_uses_fallback() {
        let table = CountryRuleTable::builtin();
        let rule = table.rule_for("DE");
        assert_eq!(rule.country, "*");
        assert!(rule.mandate_invoice_amount.is_none());
        assert!(!rule.restrict_return_to_original);
    }

    #[test]
    fn test_peru_mandate_is_inclusive() {
        let table = CountryRuleTable::builtin();
        let peru = table.rule_for("PE");
        assert!(peru.invoice_mandated(Money::from_major_minor(700, 0)));
        assert!(!peru.invoice_mandated(Money::from_major_minor(699, 0)));
    }

    #[test]
    fn test_overrides_replace_builtin() {
        let custom = CountryInvoicingRule {
            mandate_invoice_amount: Some(Money::from_major_minor(50, 0)),
            ..CountryInvoicingRule::permissive("pt")
        };
        let table = CountryRuleTable::with_overrides(vec![custom]);
        let pt = table.rule_for("PT");
        assert_eq!(pt.mandate_invoice_amount, Some(Money::from_major_minor(50, 0)));
        assert!(pt.vat_number_threshold.is_none());
    }

    #[test]
    fn test_new_locale_is_data_only() {
        let mx = CountryInvoicingRule {
            mandate_invoice_amount: Some(Money::from_major_minor(2000, 0)),
            ..CountryInvoicingRule::permissive("MX")
        };
        let table = CountryRuleTable::with_overrides(vec![mx]);
        assert!(table.countries().any(|c| c == "MX"));
        assert!(table.rule_for("MX").invoice_mandated(Money::from_major_minor(2500, 0)));
    }

    #[test]
    fn test_issuance_defaults_to_both() {
        let table = CountryRuleTable::builtin();
        let it = table.rule_for("IT");
        assert_eq!(
            it.allowed_issuance(ReceiptCategory::FullPageInvoice),
            AllowedIssuance::Original
        );
        assert_eq!(it.allowed_issuance(ReceiptCategory::Invoice), AllowedIssuance::Both);
    }

    #[test]
    fn test_rule_deserializes_from_json() {
        let json = r#"{
            "country": "CL",
            "mandate_invoice_amount": 100000,
            "threshold_comparison": "inclusive",
            "issuance": { "invoice": "original" },
            "tax_fields": ["company_name", "government_tax_identifier"]
        }"#;
        let rule: CountryInvoicingRule = serde_json::from_str(json).unwrap();
        assert_eq!(rule.threshold_comparison, ThresholdComparison::Inclusive);
        assert_eq!(rule.allowed_issuance(ReceiptCategory::Invoice), AllowedIssuance::Original);
        assert_eq!(rule.tax_fields.len(), 2);
    }

    #[test]
    fn test_rule_without_tax_fields_keeps_base_requirements() {
        let json = r#"{ "country": "CL", "mandate_invoice_amount": 100000 }"#;
        let rule: CountryInvoicingRule = serde_json::from_str(json).unwrap();
        assert_eq!(rule.tax_fields, CountryInvoicingRule::permissive("CL").tax_fields);
        assert!(!crate::tax_customer::is_complete(&crate::types::TaxCustomer::default(), &rule));
    }
}
