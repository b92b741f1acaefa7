//! # Issuance Configuration
//!
//! Store-level receipt configuration for the issuance runtime.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     TITAN_RECEIPT_COUNTRY=PE                                           │
//! │     TITAN_EMAIL_VERIFY_URL=https://verify.example.com/check            │
//! │     TITAN_EMAIL_VERIFY_ENABLED=true                                    │
//! │     TITAN_FISCAL_MAX_RETRIES=5                                         │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/pos/receipts.toml (Linux)                                │
//! │     ~/Library/Application Support/com.titan.pos/receipts.toml (macOS)  │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     Permissive rule, standard receipt only, print/email/none           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # receipts.toml
//! [store]
//! country = "PE"
//! currency = "PEN"
//!
//! [receipts]
//! print_disabled_for = ["balance_inquiry"]
//! full_tax_invoice_for_orders = false
//! phone_min_length = 9
//!
//! [receipts.formats]
//! standard = true
//! full_tax_invoice = true
//!
//! [receipts.type_overrides.till]
//! print = true
//! email = false
//! none = false
//!
//! [[printers]]
//! id = "fp-1"
//! description = "Front counter"
//! class = "fiscal"
//! serial_number = "FX-001"
//!
//! [email_verification]
//! enabled = true
//! endpoint = "https://verify.example.com/check"
//! timeout_secs = 10
//! bypass_messages = ["mailbox full"]
//!
//! [fiscal]
//! max_retries = 3
//!
//! [[country_rules]]
//! country = "CL"
//! mandate_invoice_amount = 50000
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use titan_receipt::settings::{FormatToggles, TypeChoices, DEFAULT_MAX_FISCAL_RETRIES};
use titan_receipt::{
    CountryInvoicingRule, CountryRuleTable, ReceiptCategory, ReceiptPrinter, ReceiptSettings,
};

use crate::error::{IssuanceError, IssuanceResult};

/// Config file name inside the platform config directory.
const CONFIG_FILE_NAME: &str = "receipts.toml";

/// Default email verification timeout.
pub const DEFAULT_VERIFY_TIMEOUT_SECS: u64 = 10;

// =============================================================================
// Store Configuration
// =============================================================================

/// Where the store operates. Selects the country invoicing rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// ISO 3166-1 alpha-2 country code.
    #[serde(default = "default_country")]
    pub country: String,

    /// Accounting currency (ISO 4217).
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_country() -> String {
    "US".to_string()
}

fn default_currency() -> String {
    "USD".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            country: default_country(),
            currency: default_currency(),
        }
    }
}

// =============================================================================
// Receipt Options
// =============================================================================

/// Receipt formats and channels the store has switched on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptOptions {
    #[serde(default)]
    pub formats: FormatToggles,

    /// Channels for categories without an override.
    #[serde(default)]
    pub default_types: TypeChoices,

    #[serde(default)]
    pub type_overrides: BTreeMap<ReceiptCategory, TypeChoices>,

    /// Business events on which the cashier may not print.
    #[serde(default)]
    pub print_disabled_for: Vec<ReceiptCategory>,

    #[serde(default)]
    pub full_tax_invoice_for_orders: bool,

    #[serde(default = "default_phone_min_length")]
    pub phone_min_length: usize,
}

fn default_phone_min_length() -> usize {
    titan_receipt::destination::DEFAULT_PHONE_MIN_LENGTH
}

impl Default for ReceiptOptions {
    fn default() -> Self {
        ReceiptOptions {
            formats: FormatToggles::default(),
            default_types: TypeChoices::default(),
            type_overrides: BTreeMap::new(),
            print_disabled_for: Vec::new(),
            full_tax_invoice_for_orders: false,
            phone_min_length: default_phone_min_length(),
        }
    }
}

// =============================================================================
// Email Verification
// =============================================================================

/// External email verification service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailVerificationConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Endpoint receiving `POST {"email": "..."}`.
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default = "default_verify_timeout")]
    pub timeout_secs: u64,

    /// Rejection messages that still let the address through.
    #[serde(default)]
    pub bypass_messages: Vec<String>,
}

fn default_verify_timeout() -> u64 {
    DEFAULT_VERIFY_TIMEOUT_SECS
}

impl Default for EmailVerificationConfig {
    fn default() -> Self {
        EmailVerificationConfig {
            enabled: false,
            endpoint: None,
            timeout_secs: default_verify_timeout(),
            bypass_messages: Vec::new(),
        }
    }
}

// =============================================================================
// Fiscal Settings
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiscalConfig {
    /// Operator retries granted per flow before the print is given up.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_FISCAL_RETRIES
}

impl Default for FiscalConfig {
    fn default() -> Self {
        FiscalConfig {
            max_retries: default_max_retries(),
        }
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete issuance configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuanceConfig {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub receipts: ReceiptOptions,

    #[serde(default)]
    pub printers: Vec<ReceiptPrinter>,

    #[serde(default)]
    pub email_verification: EmailVerificationConfig,

    #[serde(default)]
    pub fiscal: FiscalConfig,

    /// Replaces or extends the built-in country rules by country code.
    #[serde(default)]
    pub country_rules: Vec<CountryInvoicingRule>,
}

impl IssuanceConfig {
    /// Loads configuration from file and environment.
    ///
    /// ## Loading Order
    /// 1. Start with defaults
    /// 2. Load from TOML file if exists
    /// 3. Override with environment variables
    /// 4. Validate
    pub fn load(config_path: Option<PathBuf>) -> IssuanceResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading receipt config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load receipt config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> IssuanceResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| IssuanceError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Receipt config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> IssuanceResult<()> {
        let country = self.store.country.trim();
        if country.len() != 2 || !country.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(IssuanceError::InvalidConfig(format!(
                "store.country must be a two-letter country code, got: '{}'",
                self.store.country
            )));
        }

        if self.store.currency.trim().is_empty() {
            return Err(IssuanceError::InvalidConfig(
                "store.currency must not be empty".into(),
            ));
        }

        if self.receipts.phone_min_length == 0 {
            return Err(IssuanceError::InvalidConfig(
                "receipts.phone_min_length must be greater than 0".into(),
            ));
        }

        let verification = &self.email_verification;
        if verification.timeout_secs == 0 {
            return Err(IssuanceError::InvalidConfig(
                "email_verification.timeout_secs must be greater than 0".into(),
            ));
        }
        if let Some(ref endpoint) = verification.endpoint {
            let url = url::Url::parse(endpoint)?;
            if url.scheme() != "http" && url.scheme() != "https" {
                return Err(IssuanceError::InvalidUrl(format!(
                    "Verification endpoint must be http:// or https://, got: {}",
                    endpoint
                )));
            }
        } else if verification.enabled {
            return Err(IssuanceError::InvalidConfig(
                "email_verification.enabled requires an endpoint".into(),
            ));
        }

        let mut seen = std::collections::BTreeSet::new();
        for printer in &self.printers {
            if printer.id.trim().is_empty() {
                return Err(IssuanceError::InvalidConfig("printer id must not be empty".into()));
            }
            if !seen.insert(printer.id.as_str()) {
                return Err(IssuanceError::InvalidConfig(format!(
                    "duplicate printer id: {}",
                    printer.id
                )));
            }
        }

        for rule in &self.country_rules {
            if rule.country.trim().is_empty() {
                return Err(IssuanceError::InvalidConfig(
                    "country_rules entries need a country code".into(),
                ));
            }
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(country) = std::env::var("TITAN_RECEIPT_COUNTRY") {
            debug!(country = %country, "Overriding store country from environment");
            self.store.country = country.trim().to_uppercase();
        }

        if let Ok(url) = std::env::var("TITAN_EMAIL_VERIFY_URL") {
            debug!(url = %url, "Overriding verification endpoint from environment");
            self.email_verification.endpoint = Some(url);
        }

        if let Ok(enabled) = std::env::var("TITAN_EMAIL_VERIFY_ENABLED") {
            match enabled.trim().to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.email_verification.enabled = true,
                "0" | "false" | "no" | "off" => self.email_verification.enabled = false,
                other => warn!(value = %other, "Ignoring TITAN_EMAIL_VERIFY_ENABLED"),
            }
        }

        if let Ok(retries) = std::env::var("TITAN_FISCAL_MAX_RETRIES") {
            if let Ok(n) = retries.parse::<u32>() {
                self.fiscal.max_retries = n;
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "titan", "pos")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    pub fn country(&self) -> &str {
        &self.store.country
    }

    pub fn currency(&self) -> &str {
        &self.store.currency
    }

    /// Returns true if addresses go to the external verification service.
    pub fn verification_enabled(&self) -> bool {
        self.email_verification.enabled && self.email_verification.endpoint.is_some()
    }

    pub fn verification_timeout(&self) -> Duration {
        Duration::from_secs(self.email_verification.timeout_secs)
    }

    /// Built-in country rules with the configured ones applied on top.
    pub fn rule_table(&self) -> CountryRuleTable {
        CountryRuleTable::with_overrides(self.country_rules.iter().cloned())
    }

    /// The rule for the configured store country.
    pub fn country_rule(&self) -> CountryInvoicingRule {
        self.rule_table().rule_for(&self.store.country).clone()
    }

    /// The settings handed to every receipt flow.
    pub fn receipt_settings(&self) -> ReceiptSettings {
        ReceiptSettings {
            formats: self.receipts.formats,
            default_types: self.receipts.default_types,
            type_overrides: self.receipts.type_overrides.clone(),
            print_disabled_for: self.receipts.print_disabled_for.clone(),
            full_tax_invoice_for_orders: self.receipts.full_tax_invoice_for_orders,
            phone_min_length: self.receipts.phone_min_length,
            max_fiscal_retries: self.fiscal.max_retries,
            verify_email: self.verification_enabled(),
            email_bypass_messages: self.email_verification.bypass_messages.clone(),
            printers: self.printers.clone(),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
