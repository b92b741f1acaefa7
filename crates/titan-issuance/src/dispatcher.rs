//! # Collaborator Seams
//!
//! Traits for what the agent hands its steps to.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Collaborators                                    │
//! │                                                                         │
//! │   Step::Dispatch ──────► ReceiptDispatcher::dispatch ──► DispatchResult │
//! │   Step::RetargetPrint ─► ReceiptDispatcher::retarget                    │
//! │                                                                         │
//! │   Step::Prompt ────────► ReceiptSink::prompt      (presentation layer)  │
//! │   Step::Completed ─────► ReceiptSink::completed                         │
//! │   Step::Exited ────────► ReceiptSink::exited                            │
//! │   Step::Failed ────────► ReceiptSink::failed                            │
//! │   Err(..) ─────────────► ReceiptSink::error                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;

use titan_receipt::{DispatchResult, Prompt, ReceiptRequest};

use crate::error::{IssuanceError, IssuanceResult};

// =============================================================================
// Business-Operation Dispatcher
// =============================================================================

/// Runs the business operation behind a receipt request.
///
/// `Ok(Rejected)` is a business answer (e.g. the operation needs other
/// input). `Err` is a transport failure; the agent treats it as a
/// rejection carrying the error text.
#[async_trait]
pub trait ReceiptDispatcher: Send + Sync {
    async fn dispatch(&self, request: &ReceiptRequest) -> IssuanceResult<DispatchResult>;

    /// Sends the already dispatched fiscal print to another printer.
    async fn retarget(&self, request_id: &str, printer_id: &str) -> IssuanceResult<()>;
}

// =============================================================================
// Step Sink
// =============================================================================

/// Receives what the cashier should see next.
pub trait ReceiptSink: Send + Sync {
    fn prompt(&self, prompt: &Prompt, notice: Option<&str>);

    fn dispatched(&self, request: &ReceiptRequest);

    fn retargeted(&self, request_id: &str, printer_id: &str);

    fn completed(&self, request: &ReceiptRequest);

    fn exited(&self);

    fn failed(&self, reason: &str);

    /// An event was refused. The current prompt stays on screen.
    fn error(&self, error: &IssuanceError);
}

/// Sink that drops everything.
pub struct NoOpSink;

impl ReceiptSink for NoOpSink {
    fn prompt(&self, _prompt: &Prompt, _notice: Option<&str>) {}
    fn dispatched(&self, _request: &ReceiptRequest) {}
    fn retargeted(&self, _request_id: &str, _printer_id: &str) {}
    fn completed(&self, _request: &ReceiptRequest) {}
    fn exited(&self) {}
    fn failed(&self, _reason: &str) {}
    fn error(&self, _error: &IssuanceError) {}
}
