//! # receipt-sim
//!
//! Runs a scripted receipt flow and prints the issued request as JSON.
//!
//! ```text
//! receipt-sim <scenario.json> [--config <receipts.toml>]
//!
//! scenario.json
//! {
//!   "snapshot": { "transaction_id": "t-1", "origin": "receipt",
//!                 "total": 4500, "currency": "EUR" },
//!   "events": [
//!     { "event": "choose_type", "receipt_type": "print" },
//!     { "event": "select_printer", "printer_id": "fp-1" },
//!     { "event": "fiscal_status", "code": "timeout" },
//!     { "event": "select_printer", "printer_id": "fp-1" },
//!     { "event": "fiscal_status", "code": { "other": "OK" } }
//!   ],
//!   "dispatch_results": [ { "status": "accepted" } ]
//! }
//! ```
//!
//! Logs go to stderr (`RUST_LOG` overrides the `info` default); stdout only
//! carries the final request.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use titan_issuance::{
    IssuanceAgent, IssuanceConfig, IssuanceError, IssuanceResult, ReceiptDispatcher, ReceiptSink,
};
use titan_receipt::{DispatchResult, FlowEvent, Prompt, ReceiptRequest, TransactionSnapshot};

fn default_settle_ms() -> u64 {
    50
}

#[derive(Debug, Deserialize)]
struct Scenario {
    snapshot: TransactionSnapshot,

    /// Operator answers and device reports, in order.
    #[serde(default)]
    events: Vec<FlowEvent>,

    /// Answers of the business operation, one per dispatch. Accepted once
    /// the list runs out.
    #[serde(default)]
    dispatch_results: Vec<DispatchResult>,

    /// Pause after each event so collaborator results land first.
    #[serde(default = "default_settle_ms")]
    settle_ms: u64,
}

// =============================================================================
// Collaborators
// =============================================================================

/// Dispatcher that logs requests and answers from the scenario script.
struct LoggingDispatcher {
    results: Mutex<Vec<DispatchResult>>,
}

#[async_trait]
impl ReceiptDispatcher for LoggingDispatcher {
    async fn dispatch(&self, request: &ReceiptRequest) -> IssuanceResult<DispatchResult> {
        info!(
            request_id = %request.id,
            category = %request.category,
            receipt_type = %request.receipt_type,
            printer_id = ?request.printer_id,
            "Dispatching receipt request"
        );
        let mut results = self
            .results
            .lock()
            .map_err(|e| IssuanceError::DispatchFailed(e.to_string()))?;
        Ok(if results.is_empty() {
            DispatchResult::Accepted
        } else {
            results.remove(0)
        })
    }

    async fn retarget(&self, request_id: &str, printer_id: &str) -> IssuanceResult<()> {
        info!(%request_id, %printer_id, "Retargeting fiscal print");
        Ok(())
    }
}

/// Sink that logs prompts and keeps the issued request.
#[derive(Default)]
struct RecordingSink {
    issued: Mutex<Option<ReceiptRequest>>,
    failure: Mutex<Option<String>>,
}

impl ReceiptSink for RecordingSink {
    fn prompt(&self, prompt: &Prompt, notice: Option<&str>) {
        let rendered = serde_json::to_string(prompt).unwrap_or_default();
        info!(prompt = %rendered, notice = notice.unwrap_or(""), "Cashier prompt");
    }

    fn dispatched(&self, request: &ReceiptRequest) {
        info!(request_id = %request.id, "Request dispatched");
    }

    fn retargeted(&self, request_id: &str, printer_id: &str) {
        info!(%request_id, %printer_id, "Print retargeted");
    }

    fn completed(&self, request: &ReceiptRequest) {
        if let Ok(mut issued) = self.issued.lock() {
            *issued = Some(request.clone());
        }
    }

    fn exited(&self) {
        info!("Receipt flow exited without issuing");
    }

    fn failed(&self, reason: &str) {
        if let Ok(mut failure) = self.failure.lock() {
            *failure = Some(reason.to_string());
        }
    }

    fn error(&self, error: &IssuanceError) {
        warn!(%error, "Event refused");
    }
}

// =============================================================================
// Main
// =============================================================================

struct Args {
    scenario: PathBuf,
    config: Option<PathBuf>,
}

fn parse_args() -> Result<Args, String> {
    let mut scenario = None;
    let mut config = None;
    let mut args = std::env::args().skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let path = args.next().ok_or("--config needs a path")?;
                config = Some(PathBuf::from(path));
            }
            other if scenario.is_none() => scenario = Some(PathBuf::from(other)),
            other => return Err(format!("unexpected argument: {other}")),
        }
    }

    let scenario = scenario.ok_or("usage: receipt-sim <scenario.json> [--config <receipts.toml>]")?;
    Ok(Args { scenario, config })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let args = match parse_args() {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{message}");
            return ExitCode::from(2);
        }
    };

    match run(args).await {
        Ok(Some(request)) => match serde_json::to_string_pretty(&request) {
            Ok(json) => {
                println!("{json}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!(error = %e, "Failed to encode request");
                ExitCode::FAILURE
            }
        },
        Ok(None) => ExitCode::FAILURE,
        Err(e) => {
            error!(error = %e, "Simulation failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> IssuanceResult<Option<ReceiptRequest>> {
    let config = IssuanceConfig::load(args.config)?;
    info!(country = %config.country(), printers = config.printers.len(), "Configuration loaded");

    let contents = std::fs::read_to_string(&args.scenario)?;
    let mut scenario: Scenario = serde_json::from_str(&contents)?;
    if scenario.snapshot.transaction_id.trim().is_empty() {
        scenario.snapshot.transaction_id = uuid::Uuid::new_v4().to_string();
    }

    let dispatcher = Arc::new(LoggingDispatcher {
        results: Mutex::new(scenario.dispatch_results),
    });
    let sink = Arc::new(RecordingSink::default());
    let (handle, task) = IssuanceAgent::new(config, dispatcher)
        .with_sink(sink.clone())
        .spawn();

    let settle = Duration::from_millis(scenario.settle_ms);
    handle.start_flow(scenario.snapshot).await?;
    tokio::time::sleep(settle).await;

    for event in scenario.events {
        let name = event.name();
        match handle.send(event).await {
            Ok(step) => info!(event = name, step = ?step, "Event applied"),
            Err(e) if e.is_inline() => warn!(event = name, error = %e, "Input rejected"),
            Err(e) => warn!(event = name, error = %e, "Event refused"),
        }
        tokio::time::sleep(settle).await;
    }

    let state = handle.state().await?;
    handle.shutdown().await;
    task.await
        .map_err(|e| IssuanceError::ChannelError(e.to_string()))?;

    let issued = sink
        .issued
        .lock()
        .map_err(|e| IssuanceError::ChannelError(e.to_string()))?
        .take();
    if issued.is_none() {
        let failure = sink.failure.lock().ok().and_then(|mut f| f.take());
        warn!(state = ?state, failure = ?failure, "No receipt was issued");
    }
    Ok(issued)
}
