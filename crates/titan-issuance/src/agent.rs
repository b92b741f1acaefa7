//! # Issuance Agent
//!
//! Runs one receipt flow at a time and connects it to its collaborators.
//!
//! ## Agent Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       IssuanceAgent Event Loop                          │
//! │                                                                         │
//! │   IssuanceHandle (clonable)                                            │
//! │     start_flow / send / fiscal_status / printers_changed / shutdown    │
//! │                │                                                        │
//! │                ▼  mpsc<AgentCommand>                                    │
//! │   ┌─────────────────────────────────────────────────────────────────┐  │
//! │   │  tokio::select! {                                               │  │
//! │   │      command  ──► ReceiptFlow::handle ──► Step ──► reply        │  │
//! │   │      internal ──► ReceiptFlow::handle ──► Step                  │  │
//! │   │  }                                                              │  │
//! │   └──────────────┬──────────────────────────────────────▲───────────┘  │
//! │                  │ Step                                 │ FlowEvent     │
//! │                  ▼                                      │               │
//! │   VerifyEmail ─► spawn verify_with_timeout ─────────────┤ EmailVerified │
//! │   Dispatch ────► spawn ReceiptDispatcher::dispatch ─────┤ Dispatch-     │
//! │   RetargetPrint► spawn ReceiptDispatcher::retarget      │  Completed    │
//! │   Prompt/Completed/Exited/Failed ──► ReceiptSink                        │
//! │                                                                         │
//! │   Every event, from the cashier or a collaborator, goes through the    │
//! │   single loop, so two steps never run at once.                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use titan_receipt::{
    CountryInvoicingRule, DispatchResult, FiscalResponseCode, FlowError, FlowEvent, FlowState,
    ReceiptFlow, ReceiptPrinter, ReceiptSettings, Step, TransactionSnapshot,
};

use crate::config::IssuanceConfig;
use crate::dispatcher::{NoOpSink, ReceiptDispatcher, ReceiptSink};
use crate::error::{IssuanceError, IssuanceResult};
use crate::verifier::{verify_with_timeout, EmailVerifier, HttpEmailVerifier};

/// Command channel capacity.
const COMMAND_BUFFER: usize = 32;

// =============================================================================
// Commands
// =============================================================================

/// Messages accepted by the agent loop.
#[derive(Debug)]
pub enum AgentCommand {
    /// Opens a receipt flow for a finished transaction.
    StartFlow {
        snapshot: TransactionSnapshot,
        reply: oneshot::Sender<IssuanceResult<Step>>,
    },

    /// Cashier input or a device/printer update for the open flow.
    Event {
        event: FlowEvent,
        reply: oneshot::Sender<IssuanceResult<Step>>,
    },

    /// Current state of the open flow, if any.
    State {
        reply: oneshot::Sender<Option<FlowState>>,
    },

    Shutdown,
}

// =============================================================================
// Issuance Agent
// =============================================================================

/// Owns the open receipt flow and its collaborators.
pub struct IssuanceAgent {
    config: Arc<IssuanceConfig>,
    settings: ReceiptSettings,
    rule: CountryInvoicingRule,

    dispatcher: Arc<dyn ReceiptDispatcher>,
    verifier: Option<Arc<dyn EmailVerifier>>,
    sink: Arc<dyn ReceiptSink>,

    flow: Option<ReceiptFlow>,

    /// Collaborator results re-enter the loop through this channel.
    internal_tx: mpsc::UnboundedSender<FlowEvent>,
    internal_rx: mpsc::UnboundedReceiver<FlowEvent>,
}

impl IssuanceAgent {
    /// Creates an agent with a no-op sink and the HTTP verifier from the
    /// config, when verification is enabled.
    pub fn new(config: IssuanceConfig, dispatcher: Arc<dyn ReceiptDispatcher>) -> Self {
        let verifier: Option<Arc<dyn EmailVerifier>> = match HttpEmailVerifier::from_config(&config)
        {
            Ok(Some(v)) => Some(Arc::new(v)),
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "Email verifier unavailable, addresses will not be verified");
                None
            }
        };
        Self::with_parts(config, dispatcher, verifier, Arc::new(NoOpSink))
    }

    /// Creates an agent with explicit collaborators.
    pub fn with_parts(
        config: IssuanceConfig,
        dispatcher: Arc<dyn ReceiptDispatcher>,
        verifier: Option<Arc<dyn EmailVerifier>>,
        sink: Arc<dyn ReceiptSink>,
    ) -> Self {
        let settings = config.receipt_settings();
        let rule = config.country_rule();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();

        IssuanceAgent {
            config: Arc::new(config),
            settings,
            rule,
            dispatcher,
            verifier,
            sink,
            flow: None,
            internal_tx,
            internal_rx,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn ReceiptSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn EmailVerifier>) -> Self {
        self.verifier = Some(verifier);
        self.settings.verify_email = true;
        self
    }

    /// Spawns the agent loop and returns its handle.
    pub fn spawn(self) -> (IssuanceHandle, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let task = tokio::spawn(self.run(command_rx));
        (IssuanceHandle { command_tx }, task)
    }

    async fn run(mut self, mut commands: mpsc::Receiver<AgentCommand>) {
        info!(country = %self.rule.country, "Issuance agent started");

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(AgentCommand::Shutdown) | None => break,
                    Some(command) => self.on_command(command),
                },
                Some(event) = self.internal_rx.recv() => self.on_collaborator_event(event),
            }
        }

        info!("Issuance agent stopped");
    }

    fn on_command(&mut self, command: AgentCommand) {
        match command {
            AgentCommand::StartFlow { snapshot, reply } => {
                let result = self.start_flow(snapshot);
                let _ = reply.send(result);
            }
            AgentCommand::Event { event, reply } => {
                let result = self.apply(event);
                if let Err(ref e) = result {
                    self.sink.error(e);
                }
                let _ = reply.send(result);
            }
            AgentCommand::State { reply } => {
                let _ = reply.send(self.flow.as_ref().map(ReceiptFlow::state));
            }
            AgentCommand::Shutdown => {}
        }
    }

    fn on_collaborator_event(&mut self, event: FlowEvent) {
        match self.apply(event) {
            Ok(_) => {}
            Err(IssuanceError::Flow(FlowError::Finished)) | Err(IssuanceError::NoActiveFlow) => {
                debug!("Collaborator result arrived after the flow closed");
            }
            Err(e) => {
                if !e.is_inline() {
                    warn!(error = %e, "Collaborator event refused");
                }
                self.sink.error(&e);
            }
        }
    }

    // =========================================================================
    // Flow Handling
    // =========================================================================

    fn start_flow(&mut self, mut snapshot: TransactionSnapshot) -> IssuanceResult<Step> {
        if let Some(flow) = self.flow.as_ref().filter(|f| !f.is_finished()) {
            return Err(IssuanceError::FlowInProgress {
                transaction_id: flow.snapshot().transaction_id.clone(),
            });
        }

        if snapshot.currency.trim().is_empty() {
            snapshot.currency = self.config.currency().to_string();
        }

        let (flow, step) =
            ReceiptFlow::start(self.settings.clone(), self.rule.clone(), snapshot, Utc::now())?;
        self.flow = Some(flow);
        self.drive(&step);
        Ok(step)
    }

    fn apply(&mut self, event: FlowEvent) -> IssuanceResult<Step> {
        let flow = self.flow.as_mut().ok_or(IssuanceError::NoActiveFlow)?;
        let step = flow.handle(event, Utc::now())?;
        self.drive(&step);
        Ok(step)
    }

    /// Carries a step out to the collaborators.
    fn drive(&self, step: &Step) {
        match step {
            Step::Prompt { prompt, notice } => self.sink.prompt(prompt, notice.as_deref()),
            Step::VerifyEmail { address } => self.spawn_verification(address.clone()),
            Step::Dispatch { request } => {
                self.sink.dispatched(request);
                self.spawn_dispatch(request.clone());
            }
            Step::RetargetPrint {
                request_id,
                printer_id,
            } => {
                self.sink.retargeted(request_id, printer_id);
                self.spawn_retarget(request_id.clone(), printer_id.clone());
            }
            Step::Waiting => {}
            Step::Completed { request } => {
                info!(request_id = %request.id, category = %request.category, "Receipt issued");
                self.sink.completed(request);
            }
            Step::Exited => self.sink.exited(),
            Step::Failed { reason } => {
                error!(%reason, "Receipt flow failed");
                self.sink.failed(reason);
            }
        }
    }

    fn spawn_verification(&self, address: String) {
        let tx = self.internal_tx.clone();
        let verifier = self.verifier.clone();
        let timeout = self.config.verification_timeout();

        tokio::spawn(async move {
            let outcome = match verifier {
                Some(verifier) => verify_with_timeout(verifier.as_ref(), &address, timeout).await,
                None => Err("no email verifier configured".to_string()),
            };
            let _ = tx.send(FlowEvent::EmailVerified { address, outcome });
        });
    }

    fn spawn_dispatch(&self, request: titan_receipt::ReceiptRequest) {
        let tx = self.internal_tx.clone();
        let dispatcher = self.dispatcher.clone();

        tokio::spawn(async move {
            let result = match dispatcher.dispatch(&request).await {
                Ok(result) => result,
                Err(e) => {
                    warn!(request_id = %request.id, error = %e, "Dispatch failed");
                    DispatchResult::Rejected {
                        reason: e.to_string(),
                    }
                }
            };
            let _ = tx.send(FlowEvent::DispatchCompleted {
                request_id: request.id.clone(),
                result,
            });
        });
    }

    fn spawn_retarget(&self, request_id: String, printer_id: String) {
        let tx = self.internal_tx.clone();
        let dispatcher = self.dispatcher.clone();

        tokio::spawn(async move {
            if let Err(e) = dispatcher.retarget(&request_id, &printer_id).await {
                warn!(%request_id, %printer_id, error = %e, "Print retarget failed");
                let _ = tx.send(FlowEvent::FiscalStatus {
                    code: FiscalResponseCode::NotConnected,
                });
            }
        });
    }
}

// =============================================================================
// Agent Handle
// =============================================================================

/// Clonable handle for talking to a running agent.
#[derive(Debug, Clone)]
pub struct IssuanceHandle {
    command_tx: mpsc::Sender<AgentCommand>,
}

impl IssuanceHandle {
    /// Opens a receipt flow and returns its first step.
    pub async fn start_flow(&self, snapshot: TransactionSnapshot) -> IssuanceResult<Step> {
        let (reply, rx) = oneshot::channel();
        self.command(AgentCommand::StartFlow { snapshot, reply }).await?;
        rx.await.map_err(|_| IssuanceError::ShuttingDown)?
    }

    /// Sends cashier input to the open flow.
    pub async fn send(&self, event: FlowEvent) -> IssuanceResult<Step> {
        let (reply, rx) = oneshot::channel();
        self.command(AgentCommand::Event { event, reply }).await?;
        rx.await.map_err(|_| IssuanceError::ShuttingDown)?
    }

    /// Device status feed entry for the fiscal printer.
    pub async fn fiscal_status(&self, code: FiscalResponseCode) -> IssuanceResult<Step> {
        self.send(FlowEvent::FiscalStatus { code }).await
    }

    /// Printer list refreshed by device discovery.
    pub async fn printers_changed(&self, printers: Vec<ReceiptPrinter>) -> IssuanceResult<Step> {
        self.send(FlowEvent::PrintersChanged { printers }).await
    }

    pub async fn state(&self) -> IssuanceResult<Option<FlowState>> {
        let (reply, rx) = oneshot::channel();
        self.command(AgentCommand::State { reply }).await?;
        rx.await.map_err(|_| IssuanceError::ShuttingDown)
    }

    /// Signals the agent to stop.
    pub async fn shutdown(&self) {
        let _ = self.command_tx.send(AgentCommand::Shutdown).await;
    }

    async fn command(&self, command: AgentCommand) -> IssuanceResult<()> {
        self.command_tx
            .send(command)
            .await
            .map_err(|e| IssuanceError::ChannelError(e.to_string()))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;
    use titan_receipt::destination::EmailVerdict;
    use titan_receipt::{
        Money, Prompt, ReceiptCategory, ReceiptRequest, ReceiptType, ValidationError,
    };

    // -------------------------------------------------------------------------
    // Test doubles
    // -------------------------------------------------------------------------

    #[derive(Debug, Clone, PartialEq)]
    enum Seen {
        Prompt(Option<String>),
        Dispatched(String),
        Completed(String),
        Exited,
        Failed(String),
        Error(String),
    }

    struct ChannelSink(mpsc::UnboundedSender<Seen>);

    impl ReceiptSink for ChannelSink {
        fn prompt(&self, _prompt: &Prompt, notice: Option<&str>) {
            let _ = self.0.send(Seen::Prompt(notice.map(String::from)));
        }
        fn dispatched(&self, request: &ReceiptRequest) {
            let _ = self.0.send(Seen::Dispatched(request.id.clone()));
        }
        fn retargeted(&self, _request_id: &str, _printer_id: &str) {}
        fn completed(&self, request: &ReceiptRequest) {
            let _ = self.0.send(Seen::Completed(request.id.clone()));
        }
        fn exited(&self) {
            let _ = self.0.send(Seen::Exited);
        }
        fn failed(&self, reason: &str) {
            let _ = self.0.send(Seen::Failed(reason.to_string()));
        }
        fn error(&self, error: &IssuanceError) {
            let _ = self.0.send(Seen::Error(error.to_string()));
        }
    }

    struct ScriptedDispatcher {
        answers: Mutex<Vec<DispatchResult>>,
        seen: Mutex<Vec<ReceiptRequest>>,
    }

    impl ScriptedDispatcher {
        fn new(mut answers: Vec<DispatchResult>) -> Arc<Self> {
            answers.reverse();
            Arc::new(ScriptedDispatcher {
                answers: Mutex::new(answers),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn dispatched(&self) -> Vec<ReceiptRequest> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ReceiptDispatcher for ScriptedDispatcher {
        async fn dispatch(&self, request: &ReceiptRequest) -> IssuanceResult<DispatchResult> {
            self.seen.lock().unwrap().push(request.clone());
            Ok(self
                .answers
                .lock()
                .unwrap()
                .pop()
                .unwrap_or(DispatchResult::Accepted))
        }

        async fn retarget(&self, _request_id: &str, _printer_id: &str) -> IssuanceResult<()> {
            Ok(())
        }
    }

    struct FixedVerifier(EmailVerdict);

    #[async_trait]
    impl EmailVerifier for FixedVerifier {
        async fn verify(&self, _address: &str) -> IssuanceResult<EmailVerdict> {
            Ok(self.0.clone())
        }
    }

    fn spawn_agent(
        dispatcher: Arc<ScriptedDispatcher>,
        verifier: Option<Arc<dyn EmailVerifier>>,
    ) -> (IssuanceHandle, mpsc::UnboundedReceiver<Seen>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut config = IssuanceConfig::default();
        config.store.country = "FR".into();
        config.store.currency = "EUR".into();

        let mut agent = IssuanceAgent::with_parts(
            config,
            dispatcher,
            None,
            Arc::new(ChannelSink(tx)),
        );
        if let Some(verifier) = verifier {
            agent = agent.with_verifier(verifier);
        }
        let (handle, _task) = agent.spawn();
        (handle, rx)
    }

    fn sale() -> TransactionSnapshot {
        TransactionSnapshot::sale("t-1", Money::from_cents(2_500), "EUR")
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<Seen>) -> Seen {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("sink event in time")
            .expect("sink open")
    }

    /// Drives a fresh flow to the email entry prompt.
    async fn to_email_prompt(handle: &IssuanceHandle, rx: &mut mpsc::UnboundedReceiver<Seen>) {
        let step = handle.start_flow(sale()).await.unwrap();
        assert!(matches!(step, Step::Prompt { prompt: Prompt::ChooseType { .. }, .. }));
        assert_eq!(next(rx).await, Seen::Prompt(None));

        handle
            .send(FlowEvent::ChooseType {
                receipt_type: ReceiptType::Email,
            })
            .await
            .unwrap();
        assert_eq!(next(rx).await, Seen::Prompt(None));
    }

    // -------------------------------------------------------------------------
    // Tests
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_email_receipt_completes() {
        let dispatcher = ScriptedDispatcher::new(vec![DispatchResult::Accepted]);
        let (handle, mut rx) = spawn_agent(dispatcher.clone(), None);
        to_email_prompt(&handle, &mut rx).await;

        let step = handle
            .send(FlowEvent::SubmitDestination {
                value: "anna@example.com".into(),
            })
            .await
            .unwrap();
        let request = match step {
            Step::Dispatch { request } => request,
            other => panic!("expected dispatch, got {other:?}"),
        };
        assert_eq!(request.category, ReceiptCategory::Receipt);
        assert_eq!(request.receipt_type, ReceiptType::Email);

        assert_eq!(next(&mut rx).await, Seen::Dispatched(request.id.clone()));
        assert_eq!(next(&mut rx).await, Seen::Completed(request.id.clone()));
        assert_eq!(dispatcher.dispatched().len(), 1);
        assert_eq!(handle.state().await.unwrap(), Some(FlowState::Submitted));
    }

    #[tokio::test]
    async fn test_rejected_dispatch_returns_to_prompt_with_reason() {
        let dispatcher = ScriptedDispatcher::new(vec![DispatchResult::Rejected {
            reason: "mail server offline".into(),
        }]);
        let (handle, mut rx) = spawn_agent(dispatcher.clone(), None);
        to_email_prompt(&handle, &mut rx).await;

        handle
            .send(FlowEvent::SubmitDestination {
                value: "anna@example.com".into(),
            })
            .await
            .unwrap();

        assert!(matches!(next(&mut rx).await, Seen::Dispatched(_)));
        assert_eq!(
            next(&mut rx).await,
            Seen::Prompt(Some("mail server offline".into()))
        );
        assert_eq!(
            handle.state().await.unwrap(),
            Some(FlowState::DestinationCollection(
                titan_receipt::flow::DestinationKind::Email
            ))
        );
    }

    #[tokio::test]
    async fn test_verification_rejection_is_reported_inline() {
        let dispatcher = ScriptedDispatcher::new(Vec::new());
        let verifier: Arc<dyn EmailVerifier> = Arc::new(FixedVerifier(EmailVerdict::Invalid {
            message: "no such mailbox".into(),
        }));
        let (handle, mut rx) = spawn_agent(dispatcher.clone(), Some(verifier));
        to_email_prompt(&handle, &mut rx).await;

        let step = handle
            .send(FlowEvent::SubmitDestination {
                value: "ghost@example.com".into(),
            })
            .await
            .unwrap();
        assert!(matches!(step, Step::VerifyEmail { .. }));

        match next(&mut rx).await {
            Seen::Error(message) => assert!(message.contains("no such mailbox")),
            other => panic!("expected inline error, got {other:?}"),
        }
        assert!(dispatcher.dispatched().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_input_is_refused_without_state_change() {
        let (handle, mut rx) = spawn_agent(ScriptedDispatcher::new(Vec::new()), None);
        to_email_prompt(&handle, &mut rx).await;

        let err = handle
            .send(FlowEvent::SubmitDestination {
                value: "not-an-address".into(),
            })
            .await
            .unwrap_err();
        assert!(err.is_inline());
        assert!(matches!(
            err,
            IssuanceError::Flow(FlowError::Validation(ValidationError::InvalidEmail { .. }))
        ));
        assert!(matches!(next(&mut rx).await, Seen::Error(_)));
    }

    #[tokio::test]
    async fn test_second_flow_while_open_is_refused() {
        let (handle, _rx) = spawn_agent(ScriptedDispatcher::new(Vec::new()), None);
        handle.start_flow(sale()).await.unwrap();

        let err = handle.start_flow(sale()).await.unwrap_err();
        assert!(matches!(err, IssuanceError::FlowInProgress { .. }));

        handle.send(FlowEvent::Cancel).await.unwrap();
        assert!(handle.start_flow(sale()).await.is_ok());
    }

    #[tokio::test]
    async fn test_event_without_flow() {
        let (handle, _rx) = spawn_agent(ScriptedDispatcher::new(Vec::new()), None);
        let err = handle.send(FlowEvent::Submit).await.unwrap_err();
        assert!(matches!(err, IssuanceError::NoActiveFlow));
    }

    #[tokio::test]
    async fn test_shutdown_closes_handle() {
        let (handle, _rx) = spawn_agent(ScriptedDispatcher::new(Vec::new()), None);
        handle.shutdown().await;

        // The loop exits; later commands find the channel closed.
        let mut closed = false;
        for _ in 0..50 {
            if handle.state().await.is_err() {
                closed = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(closed);
    }
}
