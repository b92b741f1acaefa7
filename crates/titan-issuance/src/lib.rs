//! # titan-issuance: Receipt Issuance Runtime for Titan POS
//!
//! Hosts the receipt flow from `titan-receipt` and connects it to the
//! outside world: store configuration, the email verification service,
//! the business-operation dispatcher and the fiscal device feed.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Issuance Runtime Architecture                       │
//! │                                                                         │
//! │  receipts.toml + env ──► IssuanceConfig ──► ReceiptSettings + rule      │
//! │                                                    │                    │
//! │                                                    ▼                    │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                 IssuanceAgent (one flow at a time)              │  │
//! │  └───────┬───────────────────────┬─────────────────────────┬────────┘  │
//! │          ▼                       ▼                         ▼           │
//! │  ┌────────────────┐  ┌──────────────────────┐  ┌────────────────────┐  │
//! │  │ EmailVerifier  │  │ ReceiptDispatcher    │  │ ReceiptSink        │  │
//! │  │ (HTTP, 10s)    │  │ (business operation) │  │ (presentation)     │  │
//! │  └────────────────┘  └──────────────────────┘  └────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`agent`] - `IssuanceAgent` event loop and `IssuanceHandle`
//! - [`config`] - TOML + environment configuration
//! - [`dispatcher`] - Dispatcher and sink traits
//! - [`error`] - Runtime error types
//! - [`verifier`] - External email verification client
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use titan_issuance::{IssuanceAgent, IssuanceConfig};
//!
//! let config = IssuanceConfig::load_or_default(None);
//! let (handle, _task) = IssuanceAgent::new(config, Arc::new(my_dispatcher)).spawn();
//!
//! let step = handle.start_flow(snapshot).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod agent;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod verifier;

// =============================================================================
// Re-exports
// =============================================================================

pub use agent::{AgentCommand, IssuanceAgent, IssuanceHandle};
pub use config::{EmailVerificationConfig, FiscalConfig, IssuanceConfig, ReceiptOptions, StoreConfig};
pub use dispatcher::{NoOpSink, ReceiptDispatcher, ReceiptSink};
pub use error::{IssuanceError, IssuanceResult};
pub use verifier::{verify_with_timeout, EmailVerifier, HttpEmailVerifier};
