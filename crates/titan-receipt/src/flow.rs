//! # Receipt Flow
//!
//! The state machine that asks the cashier for the minimum set of answers
//! and produces exactly one [`ReceiptRequest`].
//!
//! ## States
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Receipt Flow                                    │
//! │                                                                         │
//! │  CategoryChoice ──► TaxCustomerCollection ──► TypeChoice                │
//! │        │              (invoice-class only,        │                     │
//! │        │               skipped when complete)     ▼                     │
//! │        │                              DestinationCollection(Email|Phone)│
//! │        │                                          │                     │
//! │        │                                          ▼                     │
//! │        │                                   PrinterSelection             │
//! │        │                                          │                     │
//! │        ▼                                          ▼                     │
//! │   (every step is skipped when it has           Submitting ──► Submitted │
//! │    a single answer or nothing to ask)           │      ▲                │
//! │                                                 ▼      │ reselect       │
//! │                                              FiscalRetry                │
//! │                                                 │                       │
//! │                                                 ▼                       │
//! │                                               Failed                    │
//! │                                                                         │
//! │  Cancel from any unlocked state ──► Cancelled (nothing dispatched)      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Driving the flow
//! Every input (operator answer, collaborator completion, device status) is a
//! [`FlowEvent`]. Every reaction is a [`Step`] telling the caller what to do
//! next. The flow never does I/O itself and never reads the clock: `now` is
//! passed in.
//!
//! ```rust
//! use chrono::Utc;
//! use titan_receipt::country::CountryRuleTable;
//! use titan_receipt::flow::{ReceiptFlow, Step};
//! use titan_receipt::money::Money;
//! use titan_receipt::settings::{ReceiptSettings, TypeChoices};
//! use titan_receipt::types::TransactionSnapshot;
//!
//! let settings = ReceiptSettings {
//!     default_types: TypeChoices { print: false, email: false, both: false, sms: false, none: true },
//!     ..Default::default()
//! };
//! let table = CountryRuleTable::builtin();
//! let snapshot = TransactionSnapshot::sale("t-1", Money::from_cents(1250), "EUR");
//!
//! let (_flow, step) =
//!     ReceiptFlow::start(settings, table.rule_for("DE").clone(), snapshot, Utc::now()).unwrap();
//! assert!(matches!(step, Step::Dispatch { .. }));
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, error, info, warn};
use ts_rs::TS;
use uuid::Uuid;

use crate::country::CountryInvoicingRule;
use crate::destination::{
    interpret_verification, validate_email, validate_phone, EmailCheck, VerificationOutcome,
};
use crate::eligibility::{evaluate, EligibilitySet};
use crate::error::{FlowError, FlowResult, ValidationError};
use crate::fiscal::{
    classify, post_void_printers, retry_notice, FiscalLockout, FiscalOutcome, FiscalResponseCode,
};
use crate::settings::ReceiptSettings;
use crate::tax_customer::TaxRequirements;
use crate::types::{
    ReceiptCategory, ReceiptDestination, ReceiptPrinter, ReceiptRequest, ReceiptType, TaxCustomer,
    TransactionSnapshot,
};

// =============================================================================
// States
// =============================================================================

/// Which destination the collection step asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum DestinationKind {
    Email,
    Phone,
}

/// Current step of a flow. Exactly one at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum FlowState {
    CategoryChoice,
    TaxCustomerCollection,
    TypeChoice,
    DestinationCollection(DestinationKind),
    PrinterSelection,
    /// Request dispatched, waiting for the collaborator or the device.
    Submitting,
    /// Fiscal device failed; the cashier picks a printer to retry on.
    FiscalRetry,
    Submitted,
    Failed,
    Cancelled,
}

impl FlowState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FlowState::Submitted | FlowState::Failed | FlowState::Cancelled
        )
    }

    /// Position in the answer sequence. Going back to a state discards the
    /// answers of every state with the same or a higher rank.
    fn rank(&self) -> u8 {
        match self {
            FlowState::CategoryChoice => 0,
            FlowState::TaxCustomerCollection => 1,
            FlowState::TypeChoice => 2,
            FlowState::DestinationCollection(_) => 3,
            FlowState::PrinterSelection => 4,
            _ => 5,
        }
    }
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowState::CategoryChoice => f.write_str("category_choice"),
            FlowState::TaxCustomerCollection => f.write_str("tax_customer_collection"),
            FlowState::TypeChoice => f.write_str("type_choice"),
            FlowState::DestinationCollection(DestinationKind::Email) => {
                f.write_str("destination_collection(email)")
            }
            FlowState::DestinationCollection(DestinationKind::Phone) => {
                f.write_str("destination_collection(phone)")
            }
            FlowState::PrinterSelection => f.write_str("printer_selection"),
            FlowState::Submitting => f.write_str("submitting"),
            FlowState::FiscalRetry => f.write_str("fiscal_retry"),
            FlowState::Submitted => f.write_str("submitted"),
            FlowState::Failed => f.write_str("failed"),
            FlowState::Cancelled => f.write_str("cancelled"),
        }
    }
}

// =============================================================================
// Events
// =============================================================================

/// What the business-operation dispatcher reported for a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "status", rename_all = "snake_case")]
#[ts(export)]
pub enum DispatchResult {
    Accepted,
    Rejected { reason: String },
}

/// Input to the flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum FlowEvent {
    ChooseCategory { category: ReceiptCategory },
    SaveTaxCustomer { customer: TaxCustomer },
    ChooseType { receipt_type: ReceiptType },
    /// Partial input on the destination step. Not validated.
    EditDestination { value: String },
    SubmitDestination { value: String },
    EmailVerified { address: String, outcome: VerificationOutcome },
    SelectPrinter { printer_id: String },
    PrintersChanged { printers: Vec<ReceiptPrinter> },
    /// Re-entry of the submit step, e.g. from a UI re-render.
    Submit,
    DispatchCompleted { request_id: String, result: DispatchResult },
    FiscalStatus { code: FiscalResponseCode },
    Back,
    Cancel,
}

impl FlowEvent {
    pub fn name(&self) -> &'static str {
        match self {
            FlowEvent::ChooseCategory { .. } => "choose_category",
            FlowEvent::SaveTaxCustomer { .. } => "save_tax_customer",
            FlowEvent::ChooseType { .. } => "choose_type",
            FlowEvent::EditDestination { .. } => "edit_destination",
            FlowEvent::SubmitDestination { .. } => "submit_destination",
            FlowEvent::EmailVerified { .. } => "email_verified",
            FlowEvent::SelectPrinter { .. } => "select_printer",
            FlowEvent::PrintersChanged { .. } => "printers_changed",
            FlowEvent::Submit => "submit",
            FlowEvent::DispatchCompleted { .. } => "dispatch_completed",
            FlowEvent::FiscalStatus { .. } => "fiscal_status",
            FlowEvent::Back => "back",
            FlowEvent::Cancel => "cancel",
        }
    }

    /// Events coming from collaborators rather than the cashier.
    fn is_collaborator_event(&self) -> bool {
        matches!(
            self,
            FlowEvent::EmailVerified { .. }
                | FlowEvent::PrintersChanged { .. }
                | FlowEvent::DispatchCompleted { .. }
                | FlowEvent::FiscalStatus { .. }
        )
    }
}

// =============================================================================
// Prompts and Steps
// =============================================================================

/// An operator decision the presentation layer has to render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "prompt", rename_all = "snake_case")]
#[ts(export)]
pub enum Prompt {
    ChooseCategory {
        options: Vec<ReceiptCategory>,
        full_tax_invoice_required: bool,
    },
    CollectTaxCustomer {
        category: ReceiptCategory,
        requirements: TaxRequirements,
        draft: TaxCustomer,
    },
    ChooseType {
        category: ReceiptCategory,
        options: Vec<ReceiptType>,
    },
    EnterEmail {
        value: String,
    },
    EnterPhone {
        value: String,
    },
    ChoosePrinter {
        printers: Vec<ReceiptPrinter>,
        /// Customer details to confirm before printing, where the country
        /// asks for it.
        confirm_customer: Option<TaxCustomer>,
    },
}

/// What the caller does next.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "step", rename_all = "snake_case")]
#[ts(export)]
pub enum Step {
    Prompt {
        prompt: Prompt,
        /// Explanation shown with the prompt (fiscal retry, rejection).
        notice: Option<String>,
    },
    /// Run the external email verification and report back with
    /// [`FlowEvent::EmailVerified`].
    VerifyEmail { address: String },
    /// Hand the request to the business-operation dispatcher.
    Dispatch { request: ReceiptRequest },
    /// Send the already-dispatched request to another fiscal printer.
    RetargetPrint { request_id: String, printer_id: String },
    /// Nothing new to show.
    Waiting,
    Completed { request: ReceiptRequest },
    /// The cashier left the receipt flow. Nothing was issued.
    Exited,
    Failed { reason: String },
}

// =============================================================================
// Answers
// =============================================================================

#[derive(Debug, Clone, Default)]
struct Answers {
    category: Option<ReceiptCategory>,
    tax_customer: Option<TaxCustomer>,
    receipt_type: Option<ReceiptType>,
    destination: Option<ReceiptDestination>,
    destination_draft: Option<String>,
    pending_email: Option<String>,
    printer_id: Option<String>,
}

impl Answers {
    fn clear_from(&mut self, state: FlowState) {
        let rank = state.rank();
        if rank == 0 {
            self.category = None;
        }
        if rank <= 1 {
            self.tax_customer = None;
        }
        if rank <= 2 {
            self.receipt_type = None;
        }
        if rank <= 3 {
            self.destination = None;
            self.destination_draft = None;
            self.pending_email = None;
        }
        if rank <= 4 {
            self.printer_id = None;
        }
    }
}

// =============================================================================
// Receipt Flow
// =============================================================================

/// One receipt flow instance for one transaction.
#[derive(Debug, Clone)]
pub struct ReceiptFlow {
    settings: ReceiptSettings,
    rule: CountryInvoicingRule,
    snapshot: TransactionSnapshot,
    eligibility: EligibilitySet,
    printers: Vec<ReceiptPrinter>,

    state: FlowState,
    answers: Answers,
    /// Operator-visible states, most recent last.
    visible: Vec<FlowState>,

    /// Request handed to the dispatcher and not yet completed or rejected.
    request: Option<ReceiptRequest>,
    /// Printer the outstanding request currently targets.
    active_printer: Option<String>,
    lockout: Option<FiscalLockout>,
    fiscal_retries: u32,
}

impl ReceiptFlow {
    /// Evaluates eligibility and moves to the first step that needs the
    /// cashier, or straight to dispatch when nothing does.
    pub fn start(
        settings: ReceiptSettings,
        rule: CountryInvoicingRule,
        snapshot: TransactionSnapshot,
        now: DateTime<Utc>,
    ) -> FlowResult<(Self, Step)> {
        let eligibility = evaluate(&settings, &snapshot, &rule, snapshot.reprint_buttons());
        if eligibility.is_empty() {
            warn!(transaction_id = %snapshot.transaction_id, origin = %snapshot.origin, "No receipt option eligible");
            return Err(FlowError::NothingEligible {
                transaction_id: snapshot.transaction_id.clone(),
            });
        }

        info!(
            transaction_id = %snapshot.transaction_id,
            origin = %snapshot.origin,
            categories = ?eligibility.category_options(),
            "Receipt flow started"
        );

        let printers = settings.printers.clone();
        let mut flow = ReceiptFlow {
            settings,
            rule,
            snapshot,
            eligibility,
            printers,
            state: FlowState::CategoryChoice,
            answers: Answers::default(),
            visible: Vec::new(),
            request: None,
            active_printer: None,
            lockout: None,
            fiscal_retries: 0,
        };
        let step = flow.advance(now)?;
        Ok((flow, step))
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn state(&self) -> FlowState {
        self.state
    }

    pub fn eligibility(&self) -> &EligibilitySet {
        &self.eligibility
    }

    pub fn snapshot(&self) -> &TransactionSnapshot {
        &self.snapshot
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn category(&self) -> Option<ReceiptCategory> {
        self.answers.category
    }

    pub fn receipt_type(&self) -> Option<ReceiptType> {
        self.answers.receipt_type
    }

    pub fn destination_draft(&self) -> Option<&str> {
        self.answers.destination_draft.as_deref()
    }

    /// The dispatched request that has not completed yet.
    pub fn outstanding_request(&self) -> Option<&ReceiptRequest> {
        self.request.as_ref()
    }

    pub fn fiscal_retries(&self) -> u32 {
        self.fiscal_retries
    }

    /// Prompt for the current state, if it is operator-visible.
    pub fn prompt(&self) -> Option<Prompt> {
        let prompt = match self.state {
            FlowState::CategoryChoice => Prompt::ChooseCategory {
                options: self.eligibility.category_options(),
                full_tax_invoice_required: self.eligibility.full_tax_invoice_required,
            },
            FlowState::TaxCustomerCollection => Prompt::CollectTaxCustomer {
                category: self.answers.category?,
                requirements: self.eligibility.tax_requirements.clone(),
                draft: self
                    .answers
                    .tax_customer
                    .clone()
                    .or_else(|| self.snapshot.tax_customer.clone())
                    .unwrap_or_default(),
            },
            FlowState::TypeChoice => {
                let category = self.answers.category?;
                Prompt::ChooseType {
                    category,
                    options: self.eligibility.types_for(category).to_vec(),
                }
            }
            FlowState::DestinationCollection(DestinationKind::Email) => Prompt::EnterEmail {
                value: self.destination_prefill(self.snapshot.customer_email.as_deref()),
            },
            FlowState::DestinationCollection(DestinationKind::Phone) => Prompt::EnterPhone {
                value: self.destination_prefill(self.snapshot.customer_phone.as_deref()),
            },
            FlowState::PrinterSelection | FlowState::FiscalRetry => Prompt::ChoosePrinter {
                printers: self.printer_candidates(),
                confirm_customer: self.customer_to_confirm(),
            },
            _ => return None,
        };
        Some(prompt)
    }

    fn destination_prefill(&self, known: Option<&str>) -> String {
        self.answers
            .destination_draft
            .as_deref()
            .or(known)
            .unwrap_or_default()
            .to_string()
    }

    fn customer_to_confirm(&self) -> Option<TaxCustomer> {
        if !self.rule.confirm_customer_before_print {
            return None;
        }
        Some(
            self.answers
                .tax_customer
                .clone()
                .or_else(|| self.snapshot.tax_customer.clone())
                .unwrap_or_default(),
        )
    }

    // =========================================================================
    // Event Handling
    // =========================================================================

    /// Applies one event.
    ///
    /// An `Err` never changes the state: the current step stays on screen.
    pub fn handle(&mut self, event: FlowEvent, now: DateTime<Utc>) -> FlowResult<Step> {
        if self.state.is_terminal() {
            if event.is_collaborator_event() {
                debug!(
                    transaction_id = %self.snapshot.transaction_id,
                    state = %self.state,
                    event = event.name(),
                    "Late collaborator event ignored"
                );
            }
            return Err(FlowError::Finished);
        }

        debug!(
            transaction_id = %self.snapshot.transaction_id,
            state = %self.state,
            event = event.name(),
            "Handling flow event"
        );

        match event {
            FlowEvent::Cancel => self.cancel(now),
            FlowEvent::Back => self.back(now),
            FlowEvent::ChooseCategory { category } => self.choose_category(category, now),
            FlowEvent::SaveTaxCustomer { customer } => self.save_tax_customer(customer, now),
            FlowEvent::ChooseType { receipt_type } => self.choose_type(receipt_type, now),
            FlowEvent::EditDestination { value } => self.edit_destination(value),
            FlowEvent::SubmitDestination { value } => self.submit_destination(&value, now),
            FlowEvent::EmailVerified { address, outcome } => {
                self.email_verified(address, outcome, now)
            }
            FlowEvent::SelectPrinter { printer_id } => self.select_printer(printer_id, now),
            FlowEvent::PrintersChanged { printers } => self.printers_changed(printers, now),
            FlowEvent::Submit => self.resubmit(),
            FlowEvent::DispatchCompleted { request_id, result } => {
                self.dispatch_completed(&request_id, result)
            }
            FlowEvent::FiscalStatus { code } => self.fiscal_status(code),
        }
    }

    fn invalid(&self, event: &str) -> FlowError {
        FlowError::InvalidTransition {
            state: self.state.to_string(),
            event: event.to_string(),
        }
    }

    fn expect_state(&self, expected: FlowState, event: &str) -> FlowResult<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(self.invalid(event))
        }
    }

    fn check_lockout(&self, now: DateTime<Utc>) -> FlowResult<()> {
        match self.lockout {
            Some(lockout) if lockout.is_active(now) => Err(FlowError::Locked {
                remaining_secs: lockout.remaining_secs(now),
            }),
            _ => Ok(()),
        }
    }

    // -------------------------------------------------------------------------
    // Navigation
    // -------------------------------------------------------------------------

    fn cancel(&mut self, now: DateTime<Utc>) -> FlowResult<Step> {
        self.check_lockout(now)?;

        info!(
            transaction_id = %self.snapshot.transaction_id,
            state = %self.state,
            "Receipt flow cancelled"
        );
        self.answers = Answers::default();
        self.visible.clear();
        self.request = None;
        self.active_printer = None;
        self.state = FlowState::Cancelled;
        Ok(Step::Exited)
    }

    fn back(&mut self, now: DateTime<Utc>) -> FlowResult<Step> {
        self.check_lockout(now)?;
        if matches!(self.state, FlowState::Submitting | FlowState::FiscalRetry) {
            return Err(self.invalid("back"));
        }

        self.visible.pop();
        match self.visible.last().copied() {
            Some(target) => {
                self.answers.clear_from(target);
                self.state = target;
                debug!(
                    transaction_id = %self.snapshot.transaction_id,
                    state = %target,
                    "Stepped back"
                );
                Ok(self.prompt_step(None))
            }
            None => self.cancel(now),
        }
    }

    /// Shows an operator-visible state.
    fn show(&mut self, state: FlowState) -> Step {
        self.state = state;
        if self.visible.last() != Some(&state) {
            self.visible.push(state);
        }
        info!(
            transaction_id = %self.snapshot.transaction_id,
            state = %state,
            "Awaiting operator"
        );
        self.prompt_step(None)
    }

    fn prompt_step(&self, notice: Option<String>) -> Step {
        match self.prompt() {
            Some(prompt) => Step::Prompt { prompt, notice },
            None => Step::Waiting,
        }
    }

    // -------------------------------------------------------------------------
    // Answers
    // -------------------------------------------------------------------------

    fn choose_category(&mut self, category: ReceiptCategory, now: DateTime<Utc>) -> FlowResult<Step> {
        self.expect_state(FlowState::CategoryChoice, "choose_category")?;
        if !self.eligibility.is_eligible(category) {
            return Err(ValidationError::NotAllowed {
                field: "category".to_string(),
                allowed: self
                    .eligibility
                    .category_options()
                    .iter()
                    .map(ToString::to_string)
                    .collect(),
            }
            .into());
        }

        info!(transaction_id = %self.snapshot.transaction_id, %category, "Category chosen");
        self.answers.category = Some(category);
        self.advance(now)
    }

    fn save_tax_customer(&mut self, customer: TaxCustomer, now: DateTime<Utc>) -> FlowResult<Step> {
        self.expect_state(FlowState::TaxCustomerCollection, "save_tax_customer")?;

        if let Err(err) = self.eligibility.tax_requirements.validate(&customer) {
            debug!(transaction_id = %self.snapshot.transaction_id, %err, "Tax customer rejected");
            return Err(err.into());
        }

        info!(transaction_id = %self.snapshot.transaction_id, "Tax customer saved");
        self.answers.tax_customer = Some(customer);
        self.advance(now)
    }

    fn choose_type(&mut self, receipt_type: ReceiptType, now: DateTime<Utc>) -> FlowResult<Step> {
        self.expect_state(FlowState::TypeChoice, "choose_type")?;
        let category = self.answers.category.ok_or_else(|| self.invalid("choose_type"))?;

        let options = self.eligibility.types_for(category);
        if !options.contains(&receipt_type) {
            return Err(ValidationError::NotAllowed {
                field: "receipt_type".to_string(),
                allowed: options.iter().map(ToString::to_string).collect(),
            }
            .into());
        }

        info!(transaction_id = %self.snapshot.transaction_id, %receipt_type, "Receipt type chosen");
        self.answers.receipt_type = Some(receipt_type);
        self.advance(now)
    }

    fn edit_destination(&mut self, value: String) -> FlowResult<Step> {
        if !matches!(self.state, FlowState::DestinationCollection(_)) {
            return Err(self.invalid("edit_destination"));
        }
        self.answers.destination_draft = Some(value);
        Ok(Step::Waiting)
    }

    fn submit_destination(&mut self, value: &str, now: DateTime<Utc>) -> FlowResult<Step> {
        let FlowState::DestinationCollection(kind) = self.state else {
            return Err(self.invalid("submit_destination"));
        };
        self.answers.destination_draft = Some(value.to_string());

        match kind {
            DestinationKind::Email => {
                let address = validate_email(value)?;
                if self.settings.verify_email {
                    debug!(transaction_id = %self.snapshot.transaction_id, "Requesting email verification");
                    self.answers.pending_email = Some(address.clone());
                    return Ok(Step::VerifyEmail { address });
                }
                self.answers.destination = Some(ReceiptDestination::Email(address));
            }
            DestinationKind::Phone => {
                let phone = validate_phone(value, self.settings.phone_min_length)?;
                self.answers.destination = Some(ReceiptDestination::Phone(phone));
            }
        }
        self.advance(now)
    }

    fn email_verified(
        &mut self,
        address: String,
        outcome: VerificationOutcome,
        now: DateTime<Utc>,
    ) -> FlowResult<Step> {
        let current = self.state == FlowState::DestinationCollection(DestinationKind::Email)
            && self.answers.pending_email.as_deref() == Some(address.as_str());
        if !current {
            debug!(transaction_id = %self.snapshot.transaction_id, "Stale email verification ignored");
            return Ok(Step::Waiting);
        }
        self.answers.pending_email = None;

        match interpret_verification(outcome, &self.settings.email_bypass_messages) {
            EmailCheck::Rejected { message } => {
                info!(transaction_id = %self.snapshot.transaction_id, %message, "Email address rejected");
                Err(ValidationError::EmailRejected { message }.into())
            }
            _ => {
                self.answers.destination = Some(ReceiptDestination::Email(address));
                self.advance(now)
            }
        }
    }

    fn select_printer(&mut self, printer_id: String, now: DateTime<Utc>) -> FlowResult<Step> {
        if !matches!(self.state, FlowState::PrinterSelection | FlowState::FiscalRetry) {
            return Err(self.invalid("select_printer"));
        }

        let candidates = self.printer_candidates();
        if !candidates.iter().any(|p| p.id == printer_id) {
            return Err(ValidationError::NotAllowed {
                field: "printer".to_string(),
                allowed: candidates.into_iter().map(|p| p.id).collect(),
            }
            .into());
        }

        if self.state == FlowState::FiscalRetry {
            return self.retarget(printer_id, now);
        }

        info!(transaction_id = %self.snapshot.transaction_id, %printer_id, "Printer chosen");
        self.answers.printer_id = Some(printer_id);
        self.advance(now)
    }

    fn printers_changed(&mut self, printers: Vec<ReceiptPrinter>, now: DateTime<Utc>) -> FlowResult<Step> {
        debug!(
            transaction_id = %self.snapshot.transaction_id,
            count = printers.len(),
            "Printer list updated"
        );
        self.printers = printers;

        match self.state {
            FlowState::PrinterSelection if self.is_post_void() && self.printer_candidates().is_empty() => {
                Ok(self.fail(
                    "No fiscal printer matches the serial recorded on the original receipt".to_string(),
                ))
            }
            FlowState::PrinterSelection => {
                if let Some(printer) = self.printer_shortcut() {
                    info!(
                        transaction_id = %self.snapshot.transaction_id,
                        printer_id = %printer,
                        "Single printer available, selection skipped"
                    );
                    self.answers.printer_id = Some(printer);
                    self.advance(now)
                } else {
                    Ok(self.prompt_step(None))
                }
            }
            FlowState::FiscalRetry if self.printer_candidates().is_empty() => Ok(self.fail(
                "The fiscal printer for the retry is no longer available".to_string(),
            )),
            FlowState::FiscalRetry => Ok(self.prompt_step(None)),
            _ => Ok(Step::Waiting),
        }
    }

    // =========================================================================
    // Step Resolution
    // =========================================================================

    /// Moves to the next step that still needs an answer, resolving every
    /// step that has a single possible answer on the way.
    fn advance(&mut self, now: DateTime<Utc>) -> FlowResult<Step> {
        let category = match self.answers.category {
            Some(category) => category,
            None => match self.eligibility.single_category() {
                Some(category) => {
                    debug!(%category, "Single category, choice skipped");
                    self.answers.category = Some(category);
                    category
                }
                None => return Ok(self.show(FlowState::CategoryChoice)),
            },
        };

        if category.requires_tax_customer() && self.answers.tax_customer.is_none() {
            let existing = self
                .snapshot
                .tax_customer
                .as_ref()
                .filter(|c| self.eligibility.tax_requirements.is_satisfied_by(c))
                .cloned();
            match existing {
                Some(customer) => {
                    debug!("Existing tax customer is complete, collection skipped");
                    self.answers.tax_customer = Some(customer);
                }
                None => return Ok(self.show(FlowState::TaxCustomerCollection)),
            }
        }

        let receipt_type = match self.answers.receipt_type {
            Some(receipt_type) => receipt_type,
            None => match *self.eligibility.types_for(category) {
                [only] => {
                    debug!(receipt_type = %only, "Single receipt type, choice skipped");
                    self.answers.receipt_type = Some(only);
                    only
                }
                _ => return Ok(self.show(FlowState::TypeChoice)),
            },
        };

        if receipt_type.needs_email()
            && !matches!(self.answers.destination, Some(ReceiptDestination::Email(_)))
        {
            return Ok(self.show(FlowState::DestinationCollection(DestinationKind::Email)));
        }
        if receipt_type.needs_phone()
            && !matches!(self.answers.destination, Some(ReceiptDestination::Phone(_)))
        {
            return Ok(self.show(FlowState::DestinationCollection(DestinationKind::Phone)));
        }

        if receipt_type.needs_printer() && self.answers.printer_id.is_none() {
            if self.is_post_void() && self.printer_candidates().is_empty() {
                return Ok(self.fail(
                    "No fiscal printer matches the serial recorded on the original receipt".to_string(),
                ));
            }
            match self.printer_shortcut() {
                Some(printer) => {
                    debug!(printer_id = %printer, "Single printer, selection skipped");
                    self.answers.printer_id = Some(printer);
                }
                None => return Ok(self.show(FlowState::PrinterSelection)),
            }
        }

        self.submit(now)
    }

    fn is_post_void(&self) -> bool {
        self.snapshot.origin == ReceiptCategory::PostVoid
    }

    /// Printers the cashier may choose from. A fiscal retry can only move to
    /// another fiscal device.
    fn printer_candidates(&self) -> Vec<ReceiptPrinter> {
        if self.is_post_void() {
            let serial = self
                .snapshot
                .original_receipt
                .as_ref()
                .and_then(|line| line.fiscal_serial_number.as_deref());
            post_void_printers(&self.printers, serial)
                .into_iter()
                .cloned()
                .collect()
        } else if self.state == FlowState::FiscalRetry {
            self.printers.iter().filter(|p| p.is_fiscal()).cloned().collect()
        } else {
            self.printers.clone()
        }
    }

    /// The printer to use without asking, if the choice is trivial.
    fn printer_shortcut(&self) -> Option<String> {
        if self.rule.confirm_customer_before_print || self.is_post_void() {
            return None;
        }
        match self.printers.as_slice() {
            [only] => Some(only.id.clone()),
            _ => None,
        }
    }

    fn printer_is_fiscal(&self, printer_id: Option<&str>) -> bool {
        printer_id.is_some_and(|id| self.printers.iter().any(|p| p.id == id && p.is_fiscal()))
    }

    // =========================================================================
    // Submission
    // =========================================================================

    fn submit(&mut self, now: DateTime<Utc>) -> FlowResult<Step> {
        if self.request.is_some() {
            debug!(transaction_id = %self.snapshot.transaction_id, "Request already dispatched");
            return Ok(Step::Waiting);
        }

        let category = self.answers.category.ok_or_else(|| self.invalid("submit"))?;
        let receipt_type = self.answers.receipt_type.ok_or_else(|| self.invalid("submit"))?;

        let request = ReceiptRequest {
            id: Uuid::new_v4().to_string(),
            transaction_id: self.snapshot.transaction_id.clone(),
            category,
            receipt_type,
            destination: self.answers.destination.clone(),
            printer_id: self.answers.printer_id.clone(),
            tax_customer: if category.requires_tax_customer() {
                self.answers.tax_customer.clone()
            } else {
                None
            },
            created_at: now,
        };

        self.state = FlowState::Submitting;
        self.active_printer = request.printer_id.clone();
        if self.printer_is_fiscal(self.active_printer.as_deref()) {
            self.lockout = Some(FiscalLockout::start(now));
        }
        self.request = Some(request.clone());

        info!(
            transaction_id = %request.transaction_id,
            request_id = %request.id,
            category = %request.category,
            receipt_type = %request.receipt_type,
            printer_id = ?request.printer_id,
            "Receipt request dispatched"
        );
        Ok(Step::Dispatch { request })
    }

    fn resubmit(&mut self) -> FlowResult<Step> {
        self.expect_state(FlowState::Submitting, "submit")?;
        debug!(transaction_id = %self.snapshot.transaction_id, "Duplicate submit ignored");
        Ok(Step::Waiting)
    }

    fn retarget(&mut self, printer_id: String, now: DateTime<Utc>) -> FlowResult<Step> {
        let request_id = match &self.request {
            Some(request) => request.id.clone(),
            None => return Err(self.invalid("select_printer")),
        };

        if self.printer_is_fiscal(Some(&printer_id)) {
            self.lockout = Some(FiscalLockout::start(now));
        }
        self.active_printer = Some(printer_id.clone());
        self.state = FlowState::Submitting;

        info!(
            transaction_id = %self.snapshot.transaction_id,
            %request_id,
            %printer_id,
            retry = self.fiscal_retries,
            "Retrying fiscal print"
        );
        Ok(Step::RetargetPrint {
            request_id,
            printer_id,
        })
    }

    fn is_outstanding(&self, request_id: &str) -> bool {
        self.request.as_ref().is_some_and(|r| r.id == request_id)
    }

    fn dispatch_completed(&mut self, request_id: &str, result: DispatchResult) -> FlowResult<Step> {
        if !self.is_outstanding(request_id) {
            debug!(transaction_id = %self.snapshot.transaction_id, %request_id, "Completion for unknown request ignored");
            return Ok(Step::Waiting);
        }

        match result {
            DispatchResult::Accepted => {
                if self.printer_is_fiscal(self.active_printer.as_deref()) {
                    debug!(%request_id, "Dispatch accepted, awaiting fiscal status");
                    Ok(Step::Waiting)
                } else {
                    Ok(self.complete())
                }
            }
            DispatchResult::Rejected { reason } => {
                warn!(
                    transaction_id = %self.snapshot.transaction_id,
                    %request_id,
                    %reason,
                    "Receipt request rejected"
                );
                self.request = None;
                self.active_printer = None;
                self.lockout = None;

                match self.visible.last().copied() {
                    Some(target) => {
                        self.answers.clear_from(target);
                        self.state = target;
                        Ok(self.prompt_step(Some(reason)))
                    }
                    None => Ok(self.fail(reason)),
                }
            }
        }
    }

    fn fiscal_status(&mut self, code: FiscalResponseCode) -> FlowResult<Step> {
        let awaiting = self.state == FlowState::Submitting
            && self.request.is_some()
            && self.printer_is_fiscal(self.active_printer.as_deref());
        if !awaiting {
            debug!(transaction_id = %self.snapshot.transaction_id, %code, "Fiscal status ignored");
            return Ok(Step::Waiting);
        }

        let outcome = classify(
            &code,
            self.snapshot.class,
            self.fiscal_retries,
            self.settings.max_fiscal_retries,
        );
        info!(transaction_id = %self.snapshot.transaction_id, %code, ?outcome, "Fiscal status received");

        match outcome {
            FiscalOutcome::Success => Ok(self.complete()),
            FiscalOutcome::Retry { code } => {
                self.fiscal_retries += 1;
                self.state = FlowState::FiscalRetry;
                if self.printer_candidates().is_empty() {
                    return Ok(self.fail(format!(
                        "Fiscal printer returned {code} and no fiscal device is available for a retry"
                    )));
                }
                // Released once the device reports a failure. Retargeting
                // starts a new window.
                self.lockout = None;
                Ok(self.prompt_step(Some(retry_notice(&code))))
            }
            FiscalOutcome::Unrecoverable { reason } => Ok(self.fail(reason)),
        }
    }

    fn complete(&mut self) -> Step {
        self.state = FlowState::Submitted;
        self.lockout = None;
        match self.request.take() {
            Some(request) => {
                info!(
                    transaction_id = %request.transaction_id,
                    request_id = %request.id,
                    "Receipt issued"
                );
                Step::Completed { request }
            }
            None => Step::Waiting,
        }
    }

    fn fail(&mut self, reason: String) -> Step {
        error!(
            transaction_id = %self.snapshot.transaction_id,
            state = %self.state,
            %reason,
            "Receipt flow failed"
        );
        self.state = FlowState::Failed;
        self.request = None;
        self.lockout = None;
        Step::Failed { reason }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
