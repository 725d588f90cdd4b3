//! Akiba Ledger Core
//!
//! Custodial micro-savings ledger: cash balances, time-locked savings
//! positions, and an append-only transaction log kept mutually consistent
//! under concurrent requests and asynchronous gateway settlement.
//!
//! # Architecture
//!
//! - **Single Writer**: all guarded mutations are serialized through one
//!   actor task; guard evaluation and the dependent writes cannot interleave
//! - **Atomic row groups**: each operation commits every dependent row in
//!   one RocksDB `WriteBatch`, or none at all
//! - **Deferred settlement**: gateway-backed deposits and withdrawals move
//!   the balance only when the asynchronous callback confirms them
//!
//! # Invariants
//!
//! - A balance never goes negative: violating mutations are rejected
//! - A locked saving transitions exactly once, Active -> Unlocked
//! - A transaction moves Pending -> Success/Failed once; terminal rows are
//!   never mutated again, so duplicate callbacks are no-ops
//! - Available balance is always derived: total minus active lock principals

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod actor;
pub mod config;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod storage;
pub mod types;

// Re-exports
pub use config::Config;
pub use error::{Error, Result};
pub use ledger::Ledger;
pub use metrics::Metrics;
pub use storage::Storage;
pub use types::{
    Balance, BalanceView, LockDuration, LockStatus, LockView, LockedSaving, NetworkCode,
    PhoneNumber, SettlementOutcome, Transaction, TransactionKind, TransactionStatus,
    UnlockReceipt, UserId,
};
