//! Akiba Settlement
//!
//! Gateway-facing layer over the ledger core:
//!
//! - **SavingsEngine**: deposit/withdraw orchestration — pending ledger
//!   transaction, payment-initiator call, provider reference capture
//! - **Reconciler**: idempotent application of asynchronous gateway
//!   callbacks (at-least-once, duplicated, out-of-order) to pending
//!   transactions
//! - **PaymentInitiator**: the abstract mobile-money gateway capability,
//!   with an in-memory mock for tests
//! - **signature / callback**: HMAC-SHA256 webhook authenticity and
//!   payload normalization across historical field variants
//!
//! Lock and read operations have no gateway leg; callers reach them
//! directly on [`ledger_core::Ledger`].

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod callback;
pub mod config;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod reconciler;
pub mod signature;

// Re-exports
pub use callback::CallbackEvent;
pub use config::{CallbackConfig, Config};
pub use engine::{DepositReceipt, SavingsEngine, WithdrawalReceipt};
pub use error::{Error, Result};
pub use gateway::{InitiationReceipt, MockGateway, PaymentInitiator};
pub use reconciler::{ReconcileOutcome, Reconciler};
