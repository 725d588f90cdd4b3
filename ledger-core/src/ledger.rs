//! Main ledger orchestration layer
//!
//! This module ties together storage, the single-writer actor, and metrics
//! into a high-level API for balance, locked-savings, and settlement
//! operations.
//!
//! # Example
//!
//! ```no_run
//! use ledger_core::{Config, Ledger};
//!
//! #[tokio::main]
//! async fn main() -> ledger_core::Result<()> {
//!     let config = Config::default();
//!     let ledger = Ledger::open(config).await?;
//!
//!     // let view = ledger.get_balance(&user).await?;
//!
//!     Ok(())
//! }
//! ```

use crate::{
    actor::{spawn_ledger_actor, LedgerHandle},
    storage::StorageStats,
    types::{
        Balance, BalanceView, LockDuration, LockView, LockedSaving, NetworkCode, PhoneNumber,
        SettlementOutcome, Transaction, UnlockReceipt, UserId,
    },
    Config, Error, Metrics, Result, Storage,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

/// Main ledger interface
///
/// Cheap to share: concurrent request handlers clone the inner actor handle
/// and every mutation is serialized through the single writer task.
pub struct Ledger {
    /// Actor handle for all operations
    handle: LedgerHandle,

    /// Direct storage access (for statistics)
    storage: Arc<Storage>,

    /// Metrics collector
    metrics: Metrics,
}

impl Ledger {
    /// Open ledger with configuration
    pub async fn open(config: Config) -> Result<Self> {
        let storage = Arc::new(Storage::open(&config)?);
        let metrics =
            Metrics::new().map_err(|e| Error::Config(format!("Failed to create metrics: {}", e)))?;

        let handle = spawn_ledger_actor(storage.clone(), config.penalty_rate, metrics.clone());

        Ok(Self {
            handle,
            storage,
            metrics,
        })
    }

    /// Create a zero balance for a newly registered user
    pub async fn create_account(&self, user: UserId) -> Result<Balance> {
        self.handle.create_account(user).await
    }

    /// Create a pending deposit transaction
    ///
    /// The balance is credited only when the gateway callback settles the
    /// row via [`Ledger::settle`].
    pub async fn initiate_deposit(
        &self,
        user: UserId,
        amount: Decimal,
        phone: PhoneNumber,
    ) -> Result<Transaction> {
        validate_amount(amount)?;
        self.handle.initiate_deposit(user, amount, phone).await
    }

    /// Reserve a withdrawal against the available balance
    ///
    /// Fails with [`Error::InsufficientFunds`] when the amount exceeds the
    /// available (unlocked) balance. The debit itself is deferred to
    /// settlement.
    pub async fn initiate_withdrawal(
        &self,
        user: UserId,
        amount: Decimal,
        phone: PhoneNumber,
        network: NetworkCode,
    ) -> Result<Transaction> {
        validate_amount(amount)?;
        self.handle
            .initiate_withdrawal(user, amount, phone, network)
            .await
    }

    /// Attach the gateway-assigned reference to a pending transaction
    pub async fn attach_provider_reference(
        &self,
        transaction_id: Uuid,
        reference: String,
    ) -> Result<Transaction> {
        self.handle
            .attach_provider_reference(transaction_id, reference)
            .await
    }

    /// Mark a pending transaction failed (the payment initiator rejected it)
    pub async fn mark_transaction_failed(
        &self,
        transaction_id: Uuid,
        reason: String,
    ) -> Result<Transaction> {
        self.handle
            .mark_transaction_failed(transaction_id, reason)
            .await
    }

    /// Apply a gateway settlement to the transaction matching a reference
    ///
    /// Idempotent: a callback for an already-terminal row returns
    /// [`SettlementOutcome::AlreadyProcessed`] without touching anything.
    pub async fn settle(
        &self,
        reference: &str,
        succeeded: bool,
        description: Option<String>,
        raw_payload: Option<String>,
    ) -> Result<SettlementOutcome> {
        self.handle
            .settle(reference.to_string(), succeeded, description, raw_payload)
            .await
    }

    /// Debit the balance into a new locked saving
    ///
    /// `duration_days` must be one of 30/60/90/180/365.
    pub async fn create_lock(
        &self,
        user: UserId,
        amount: Decimal,
        duration_days: i64,
    ) -> Result<LockedSaving> {
        validate_amount(amount)?;
        let duration = LockDuration::from_days(duration_days).ok_or_else(|| {
            Error::Validation(format!(
                "Invalid lock duration: {}. Choose from: 30, 60, 90, 180, or 365 days",
                duration_days
            ))
        })?;

        self.handle.create_lock(user, amount, duration).await
    }

    /// Unlock a matured saving, crediting the full principal
    pub async fn unlock_mature(&self, user: UserId, lock_id: Uuid) -> Result<UnlockReceipt> {
        self.handle.unlock_mature(user, lock_id).await
    }

    /// Unlock an active saving before maturity, withholding the penalty
    pub async fn unlock_early(&self, user: UserId, lock_id: Uuid) -> Result<UnlockReceipt> {
        self.handle.unlock_early(user, lock_id).await
    }

    /// Live balance breakdown: total, locked, available
    pub async fn get_balance(&self, user: UserId) -> Result<BalanceView> {
        self.handle.get_balance(user).await
    }

    /// All locked savings with derived fields, newest first
    pub async fn list_locks(&self, user: UserId) -> Result<Vec<LockView>> {
        self.handle.list_locks(user).await
    }

    /// Transaction log, newest first
    pub async fn list_transactions(
        &self,
        user: UserId,
        limit: Option<usize>,
    ) -> Result<Vec<Transaction>> {
        self.handle.list_transactions(user, limit).await
    }

    /// Status read for a single transaction (cheap, idempotent; clients may
    /// poll this while waiting on gateway settlement)
    pub async fn get_transaction(&self, user: UserId, transaction_id: Uuid) -> Result<Transaction> {
        self.handle.get_transaction(user, transaction_id).await
    }

    /// Metrics collector (for scraping)
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Storage statistics
    pub fn stats(&self) -> Result<StorageStats> {
        self.storage.get_stats()
    }

    /// Shutdown ledger
    pub async fn shutdown(self) -> Result<()> {
        self.handle.shutdown().await
    }
}

fn validate_amount(amount: Decimal) -> Result<()> {
    if amount <= Decimal::ZERO {
        return Err(Error::Validation("Amount must be positive".to_string()));
    }
    Ok(())
}
