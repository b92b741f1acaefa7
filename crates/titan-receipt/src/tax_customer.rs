//! # Tax Customer Validation
//!
//! Decides whether the buyer tax identification on hand is good enough to
//! issue an invoice-class document in the store's country.
//!
//! ## Required Fields
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                  Tax Customer Requirements                              │
//! │                                                                         │
//! │  rule.tax_fields          always required (conjunctive)                 │
//! │        +                                                                │
//! │  rule.additional_fields   offered; promoted to required when the        │
//! │                           matching threshold is met:                    │
//! │                             IdNumber   ◄── id_number_threshold          │
//! │                             Ruc        ◄── ruc_threshold                │
//! │                             VatNumber  ◄── vat_number_threshold         │
//! │                                                                         │
//! │  One empty required field fails the whole customer.                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::country::CountryInvoicingRule;
use crate::error::{ValidationError, ValidationResult};
use crate::money::Money;
use crate::types::TaxCustomer;

// =============================================================================
// Tax Field
// =============================================================================

/// A single tax customer field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum TaxField {
    FirstName,
    LastName,
    CompanyName,
    AddressLine1,
    AddressLine2,
    City,
    State,
    PostalCode,
    CountryCode,
    GovernmentTaxIdentifier,
    TaxCode,
    PecAddress,
    AddressCode,
    IdNumber,
    Ruc,
    VatNumber,
}

impl TaxField {
    /// The value of this field on a customer.
    pub fn value<'a>(&self, customer: &'a TaxCustomer) -> &'a str {
        match self {
            TaxField::FirstName => &customer.first_name,
            TaxField::LastName => &customer.last_name,
            TaxField::CompanyName => &customer.company_name,
            TaxField::AddressLine1 => &customer.address_line1,
            TaxField::AddressLine2 => &customer.address_line2,
            TaxField::City => &customer.city,
            TaxField::State => &customer.state,
            TaxField::PostalCode => &customer.postal_code,
            TaxField::CountryCode => &customer.country_code,
            TaxField::GovernmentTaxIdentifier => &customer.government_tax_identifier,
            TaxField::TaxCode => &customer.tax_code,
            TaxField::PecAddress => &customer.pec_address,
            TaxField::AddressCode => &customer.address_code,
            TaxField::IdNumber => &customer.id_number,
            TaxField::Ruc => &customer.ruc,
            TaxField::VatNumber => &customer.vat_number,
        }
    }

    /// Whether the customer has a non-blank value for this field.
    pub fn is_present(&self, customer: &TaxCustomer) -> bool {
        !self.value(customer).trim().is_empty()
    }
}

impl fmt::Display for TaxField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaxField::FirstName => "first_name",
            TaxField::LastName => "last_name",
            TaxField::CompanyName => "company_name",
            TaxField::AddressLine1 => "address_line1",
            TaxField::AddressLine2 => "address_line2",
            TaxField::City => "city",
            TaxField::State => "state",
            TaxField::PostalCode => "postal_code",
            TaxField::CountryCode => "country_code",
            TaxField::GovernmentTaxIdentifier => "government_tax_identifier",
            TaxField::TaxCode => "tax_code",
            TaxField::PecAddress => "pec_address",
            TaxField::AddressCode => "address_code",
            TaxField::IdNumber => "id_number",
            TaxField::Ruc => "ruc",
            TaxField::VatNumber => "vat_number",
        };
        f.write_str(name)
    }
}

// =============================================================================
// Threshold-Driven Requirements
// =============================================================================

/// RUC must be collected for this total.
pub fn is_ruc_required(rule: &CountryInvoicingRule, total: Money) -> bool {
    rule.threshold_met(rule.ruc_threshold, total)
}

/// Buyer id number must be collected for this total.
pub fn is_id_number_required(rule: &CountryInvoicingRule, total: Money) -> bool {
    rule.threshold_met(rule.id_number_threshold, total)
}

/// VAT number must be collected for this total.
pub fn is_vat_number_required(rule: &CountryInvoicingRule, total: Money) -> bool {
    rule.threshold_met(rule.vat_number_threshold, total)
}

/// Fields the tax customer step requires and merely offers.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaxRequirements {
    pub required: Vec<TaxField>,
    pub offered: Vec<TaxField>,
}

impl TaxRequirements {
    /// Requirements for a transaction total under a country rule.
    pub fn for_total(rule: &CountryInvoicingRule, total: Money) -> Self {
        let mut required = rule.tax_fields.clone();
        let mut offered = Vec::new();

        for field in &rule.additional_fields {
            let promoted = match field {
                TaxField::IdNumber => is_id_number_required(rule, total),
                TaxField::Ruc => is_ruc_required(rule, total),
                TaxField::VatNumber => is_vat_number_required(rule, total),
                _ => false,
            };
            if promoted {
                required.push(*field);
            } else {
                offered.push(*field);
            }
        }

        required.sort();
        required.dedup();
        offered.retain(|f| !required.contains(f));

        TaxRequirements { required, offered }
    }

    /// Required fields the customer does not have, in declaration order.
    pub fn missing_fields(&self, customer: &TaxCustomer) -> Vec<TaxField> {
        missing_fields(customer, &self.required)
    }

    /// Whether the customer satisfies every required field.
    pub fn is_satisfied_by(&self, customer: &TaxCustomer) -> bool {
        self.missing_fields(customer).is_empty()
    }

    /// Validates a customer, listing every missing field on failure.
    pub fn validate(&self, customer: &TaxCustomer) -> ValidationResult<()> {
        let fields = self.missing_fields(customer);
        if fields.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::MissingTaxFields { fields })
        }
    }
}

// =============================================================================
// Completeness Check
// =============================================================================

/// Listed fields the customer lacks, in declaration order.
pub fn missing_fields(customer: &TaxCustomer, fields: &[TaxField]) -> Vec<TaxField> {
    let mut missing: Vec<TaxField> = fields
        .iter()
        .copied()
        .filter(|f| !f.is_present(customer))
        .collect();
    missing.sort();
    missing.dedup();
    missing
}

/// Whether a customer carries every field the country always requires.
///
/// Conjunctive: a single blank field fails the check.
pub fn is_complete(customer: &TaxCustomer, rule: &CountryInvoicingRule) -> bool {
    rule.tax_fields.iter().all(|f| f.is_present(customer))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::country::CountryRuleTable;

    fn italian_customer() -> TaxCustomer {
        TaxCustomer {
            first_name: "Giulia".into(),
            last_name: "Rossi".into(),
            address_line1: "Via Roma 1".into(),
            address_line2: "Scala B".into(),
            city: "Milano".into(),
            state: "MI".into(),
            postal_code: "20121".into(),
            country_code: "IT".into(),
            government_tax_identifier: "IT12345678901".into(),
            tax_code: "RSSGLI80A01F205X".into(),
            pec_address: "giulia@pec.it".into(),
            address_code: "0000000".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_italy_complete_customer() {
        let table = CountryRuleTable::builtin();
        assert!(is_complete(&italian_customer(), table.rule_for("IT")));
    }

    #[test]
    fn test_single_missing_field_fails() {
        let table = CountryRuleTable::builtin();
        let mut customer = italian_customer();
        customer.pec_address = "   ".into();
        assert!(!is_complete(&customer, table.rule_for("IT")));
    }

    #[test]
    fn test_peru_thresholds_promote_fields() {
        let table = CountryRuleTable::builtin();
        let peru = table.rule_for("PE");

        let small = TaxRequirements::for_total(peru, Money::from_major_minor(100, 0));
        assert!(small.required.contains(&TaxField::Ruc));
        assert!(small.offered.contains(&TaxField::IdNumber));

        let large = TaxRequirements::for_total(peru, Money::from_major_minor(700, 0));
        assert!(large.required.contains(&TaxField::IdNumber));
        assert!(large.offered.is_empty());
    }

    #[test]
    fn test_portugal_vat_number_above_threshold() {
        let table = CountryRuleTable::builtin();
        let pt = table.rule_for("PT");
        assert!(!is_vat_number_required(pt, Money::from_major_minor(1000, 0)));
        assert!(is_vat_number_required(pt, Money::from_cents(100_001)));
        assert!(!is_ruc_required(pt, Money::from_major_minor(5000, 0)));
    }

    #[test]
    fn test_validate_lists_missing_fields() {
        let table = CountryRuleTable::builtin();
        let reqs = TaxRequirements::for_total(table.rule_for("PE"), Money::from_major_minor(800, 0));
        let customer = TaxCustomer {
            first_name: "Ana".into(),
            last_name: "Quispe".into(),
            address_line1: "Av. Arequipa 100".into(),
            ..Default::default()
        };

        let err = reqs.validate(&customer).unwrap_err();
        assert_eq!(
            err,
            ValidationError::MissingTaxFields {
                fields: vec![TaxField::IdNumber, TaxField::Ruc]
            }
        );
    }

    #[test]
    fn test_field_display_matches_serde() {
        let json = serde_json::to_string(&TaxField::PecAddress).unwrap();
        assert_eq!(json, format!("\"{}\"", TaxField::PecAddress));
    }
}
