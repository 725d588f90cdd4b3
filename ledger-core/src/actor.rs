//! Actor-based concurrency for the ledger
//!
//! This module implements the single-writer pattern using Tokio actors:
//! - One logical writer task eliminates lost-update and double-spend races
//! - Each guarded mutation evaluates its guard and commits its dependent
//!   rows in one `WriteBatch` with nothing interleaved — the atomicity
//!   unit that replaces BEGIN/COMMIT/ROLLBACK
//! - Async message passing with backpressure
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │          Request handlers (external HTTP)             │
//! │        Concurrent deposit/withdraw/lock calls         │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │               LedgerHandle (Clone)                    │
//! │         Sends messages to actor mailbox              │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       │ mpsc::channel (bounded)
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │              LedgerActor (Single Task)                │
//! │   read -> guard -> compose rows -> WriteBatch commit  │
//! └──────────────────────────────────────────────────────┘
//! ```

use crate::types::{
    Balance, BalanceView, LockDuration, LockStatus, LockView, LockedSaving, NetworkCode,
    PhoneNumber, SettlementOutcome, Transaction, TransactionKind, TransactionStatus, UnlockReceipt,
    UserId,
};
use crate::{Error, Metrics, Result, Storage};
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

/// Message sent to the ledger actor
pub enum LedgerMessage {
    /// Create a zero balance for a new user
    CreateAccount {
        /// User to create
        user: UserId,
        /// Response channel
        response: oneshot::Sender<Result<Balance>>,
    },

    /// Create a pending deposit transaction (no balance change yet)
    InitiateDeposit {
        /// Depositing user
        user: UserId,
        /// Deposit amount
        amount: Decimal,
        /// Mobile-money source
        phone: PhoneNumber,
        /// Response channel
        response: oneshot::Sender<Result<Transaction>>,
    },

    /// Reserve a withdrawal against the available balance (no debit yet)
    InitiateWithdrawal {
        /// Withdrawing user
        user: UserId,
        /// Withdrawal amount
        amount: Decimal,
        /// Mobile-money destination
        phone: PhoneNumber,
        /// Carrier network
        network: NetworkCode,
        /// Response channel
        response: oneshot::Sender<Result<Transaction>>,
    },

    /// Attach the gateway's reference to a pending transaction
    AttachProviderReference {
        /// Transaction to update
        transaction_id: Uuid,
        /// Gateway-assigned reference
        reference: String,
        /// Response channel
        response: oneshot::Sender<Result<Transaction>>,
    },

    /// Mark a pending transaction failed (gateway rejected the initiation)
    MarkTransactionFailed {
        /// Transaction to update
        transaction_id: Uuid,
        /// Failure reason
        reason: String,
        /// Response channel
        response: oneshot::Sender<Result<Transaction>>,
    },

    /// Apply a gateway settlement to the transaction matching a reference
    Settle {
        /// Provider reference from the callback
        reference: String,
        /// Normalized gateway outcome
        succeeded: bool,
        /// Gateway result description
        description: Option<String>,
        /// Raw callback payload (JSON text)
        raw_payload: Option<String>,
        /// Response channel
        response: oneshot::Sender<Result<SettlementOutcome>>,
    },

    /// Debit the balance into a new locked saving
    CreateLock {
        /// Locking user
        user: UserId,
        /// Principal to lock
        amount: Decimal,
        /// Lock duration
        duration: LockDuration,
        /// Response channel
        response: oneshot::Sender<Result<LockedSaving>>,
    },

    /// Unlock a matured saving, crediting the full principal
    UnlockMature {
        /// Owning user
        user: UserId,
        /// Lock to unlock
        lock_id: Uuid,
        /// Response channel
        response: oneshot::Sender<Result<UnlockReceipt>>,
    },

    /// Unlock an active saving early, withholding the penalty
    UnlockEarly {
        /// Owning user
        user: UserId,
        /// Lock to unlock
        lock_id: Uuid,
        /// Response channel
        response: oneshot::Sender<Result<UnlockReceipt>>,
    },

    /// Compute the live balance breakdown
    GetBalance {
        /// User to read
        user: UserId,
        /// Response channel
        response: oneshot::Sender<Result<BalanceView>>,
    },

    /// List all locks with derived presentation fields, newest first
    ListLocks {
        /// User to read
        user: UserId,
        /// Response channel
        response: oneshot::Sender<Result<Vec<LockView>>>,
    },

    /// List the transaction log, newest first
    ListTransactions {
        /// User to read
        user: UserId,
        /// Optional row cap
        limit: Option<usize>,
        /// Response channel
        response: oneshot::Sender<Result<Vec<Transaction>>>,
    },

    /// Get a single transaction owned by a user
    GetTransaction {
        /// Owning user
        user: UserId,
        /// Transaction to read
        transaction_id: Uuid,
        /// Response channel
        response: oneshot::Sender<Result<Transaction>>,
    },

    /// Shutdown actor
    Shutdown,
}

/// Actor that processes ledger messages
pub struct LedgerActor {
    /// Storage backend
    storage: Arc<Storage>,

    /// Mailbox for incoming messages
    mailbox: mpsc::Receiver<LedgerMessage>,

    /// Penalty rate applied to new locks
    penalty_rate: Decimal,

    /// Metrics collector
    metrics: Metrics,
}

impl LedgerActor {
    /// Create new actor
    pub fn new(
        storage: Arc<Storage>,
        mailbox: mpsc::Receiver<LedgerMessage>,
        penalty_rate: Decimal,
        metrics: Metrics,
    ) -> Self {
        Self {
            storage,
            mailbox,
            penalty_rate,
            metrics,
        }
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        while let Some(msg) = self.mailbox.recv().await {
            if matches!(msg, LedgerMessage::Shutdown) {
                break;
            }
            self.handle_message(msg);
        }
    }

    /// Handle a single message
    fn handle_message(&mut self, msg: LedgerMessage) {
        let started = Instant::now();

        match msg {
            LedgerMessage::CreateAccount { user, response } => {
                let _ = response.send(self.create_account(user));
            }
            LedgerMessage::InitiateDeposit {
                user,
                amount,
                phone,
                response,
            } => {
                let _ = response.send(self.initiate_deposit(user, amount, phone));
            }
            LedgerMessage::InitiateWithdrawal {
                user,
                amount,
                phone,
                network,
                response,
            } => {
                let _ = response.send(self.initiate_withdrawal(user, amount, phone, network));
            }
            LedgerMessage::AttachProviderReference {
                transaction_id,
                reference,
                response,
            } => {
                let _ = response.send(self.attach_provider_reference(transaction_id, reference));
            }
            LedgerMessage::MarkTransactionFailed {
                transaction_id,
                reason,
                response,
            } => {
                let _ = response.send(self.mark_transaction_failed(transaction_id, reason));
            }
            LedgerMessage::Settle {
                reference,
                succeeded,
                description,
                raw_payload,
                response,
            } => {
                let _ = response.send(self.settle(reference, succeeded, description, raw_payload));
            }
            LedgerMessage::CreateLock {
                user,
                amount,
                duration,
                response,
            } => {
                let _ = response.send(self.create_lock(user, amount, duration));
            }
            LedgerMessage::UnlockMature {
                user,
                lock_id,
                response,
            } => {
                let _ = response.send(self.unlock(user, lock_id, UnlockPath::Mature));
            }
            LedgerMessage::UnlockEarly {
                user,
                lock_id,
                response,
            } => {
                let _ = response.send(self.unlock(user, lock_id, UnlockPath::Early));
            }
            LedgerMessage::GetBalance { user, response } => {
                let _ = response.send(self.get_balance_view(&user));
            }
            LedgerMessage::ListLocks { user, response } => {
                let _ = response.send(self.list_locks(&user));
            }
            LedgerMessage::ListTransactions {
                user,
                limit,
                response,
            } => {
                let _ = response.send(self.list_transactions(&user, limit));
            }
            LedgerMessage::GetTransaction {
                user,
                transaction_id,
                response,
            } => {
                let _ = response.send(self.get_owned_transaction(&user, transaction_id));
            }
            LedgerMessage::Shutdown => {
                // Handled in main loop
            }
        }

        self.metrics
            .record_mutation_duration(started.elapsed().as_secs_f64());
    }

    // Mutations
    //
    // Every method below runs inside the single writer task: the guard
    // read and the dependent WriteBatch commit cannot interleave with any
    // other mutation.

    fn create_account(&self, user: UserId) -> Result<Balance> {
        match self.storage.get_balance(&user) {
            Ok(_) => Err(Error::AlreadyExists(user.to_string())),
            Err(Error::AccountNotFound(_)) => {
                let balance = Balance {
                    user_id: user.clone(),
                    amount: Decimal::ZERO,
                    updated_at: Utc::now(),
                };
                self.storage.put_balance(&balance)?;

                tracing::info!(user_id = %user, "Account created with zero balance");
                Ok(balance)
            }
            Err(e) => Err(e),
        }
    }

    fn initiate_deposit(
        &self,
        user: UserId,
        amount: Decimal,
        phone: PhoneNumber,
    ) -> Result<Transaction> {
        // Account must exist; the balance itself is untouched until settlement
        self.storage.get_balance(&user)?;

        let transaction = Transaction::pending(
            user,
            TransactionKind::Deposit,
            amount,
            Some(phone),
            None,
            Utc::now(),
        );
        self.storage.commit_transaction(&transaction)?;

        Ok(transaction)
    }

    fn initiate_withdrawal(
        &self,
        user: UserId,
        amount: Decimal,
        phone: PhoneNumber,
        network: NetworkCode,
    ) -> Result<Transaction> {
        let balance = self.storage.get_balance(&user)?;
        let locked = self.storage.active_locked_total(&user)?;
        let available = balance.amount - locked;

        if amount > available {
            self.metrics.record_guard_failure();
            return Err(Error::InsufficientFunds { available });
        }

        let transaction = Transaction::pending(
            user,
            TransactionKind::Withdrawal,
            amount,
            Some(phone),
            Some(network),
            Utc::now(),
        );
        self.storage.commit_transaction(&transaction)?;

        Ok(transaction)
    }

    fn attach_provider_reference(
        &self,
        transaction_id: Uuid,
        reference: String,
    ) -> Result<Transaction> {
        let mut transaction = self.storage.get_transaction(transaction_id)?;

        if transaction.status.is_terminal() {
            return Err(Error::AlreadyProcessed(transaction_id.to_string()));
        }
        if self
            .storage
            .find_transaction_by_reference(&reference)?
            .is_some()
        {
            return Err(Error::DuplicateReference(reference));
        }

        transaction.provider_reference = Some(reference);
        transaction.updated_at = Utc::now();
        self.storage.commit_transaction(&transaction)?;

        Ok(transaction)
    }

    fn mark_transaction_failed(&self, transaction_id: Uuid, reason: String) -> Result<Transaction> {
        let mut transaction = self.storage.get_transaction(transaction_id)?;

        if transaction.status.is_terminal() {
            return Err(Error::AlreadyProcessed(transaction_id.to_string()));
        }

        transaction.status = TransactionStatus::Failed;
        transaction.result_description = Some(reason);
        transaction.updated_at = Utc::now();
        self.storage.commit_settlement(None, &transaction)?;

        tracing::warn!(
            transaction_id = %transaction.id,
            kind = %transaction.kind,
            "Transaction marked failed before settlement"
        );

        Ok(transaction)
    }

    fn settle(
        &self,
        reference: String,
        succeeded: bool,
        description: Option<String>,
        raw_payload: Option<String>,
    ) -> Result<SettlementOutcome> {
        let mut transaction = self
            .storage
            .find_transaction_by_reference(&reference)?
            .ok_or_else(|| Error::TransactionNotFound(reference.clone()))?;

        // Idempotency: terminal rows are never touched again
        if transaction.status.is_terminal() {
            self.metrics.record_duplicate_callback();
            tracing::info!(
                transaction_id = %transaction.id,
                status = ?transaction.status,
                "Callback for already-processed transaction ignored"
            );
            return Ok(SettlementOutcome::AlreadyProcessed {
                transaction_id: transaction.id,
                status: transaction.status,
            });
        }

        let now = Utc::now();
        transaction.result_description = description;
        transaction.callback_payload = raw_payload;
        transaction.updated_at = now;

        if !succeeded {
            transaction.status = TransactionStatus::Failed;
            if transaction.result_description.is_none() {
                transaction.result_description = Some("Unknown gateway error".to_string());
            }
            // A pending row never touched the balance, so nothing to reverse
            self.storage.commit_settlement(None, &transaction)?;

            tracing::info!(
                transaction_id = %transaction.id,
                kind = %transaction.kind,
                "Settlement failure applied"
            );
            return Ok(SettlementOutcome::Applied {
                transaction,
                new_balance: None,
            });
        }

        let mut balance = self.storage.get_balance(&transaction.user_id)?;
        match transaction.kind {
            TransactionKind::Deposit => {
                balance.amount += transaction.amount;
            }
            TransactionKind::Withdrawal => {
                // The debit was deferred until confirmation; it must still
                // never push the balance negative
                if balance.amount < transaction.amount {
                    self.metrics.record_guard_failure();
                    return Err(Error::InsufficientFunds {
                        available: balance.amount,
                    });
                }
                balance.amount -= transaction.amount;
            }
            kind => {
                return Err(Error::Validation(format!(
                    "Transaction kind {} is not settleable",
                    kind
                )));
            }
        }
        balance.updated_at = now;
        transaction.status = TransactionStatus::Success;

        // Status flip and balance move land in one batch, or neither does
        self.storage.commit_settlement(Some(&balance), &transaction)?;

        match transaction.kind {
            TransactionKind::Deposit => self.metrics.record_deposit_settled(),
            TransactionKind::Withdrawal => self.metrics.record_withdrawal_settled(),
            _ => {}
        }

        tracing::info!(
            transaction_id = %transaction.id,
            kind = %transaction.kind,
            amount = %transaction.amount,
            new_balance = %balance.amount,
            "Settlement applied"
        );

        Ok(SettlementOutcome::Applied {
            transaction,
            new_balance: Some(balance.amount),
        })
    }

    fn create_lock(
        &self,
        user: UserId,
        amount: Decimal,
        duration: LockDuration,
    ) -> Result<LockedSaving> {
        let mut balance = self.storage.get_balance(&user)?;

        // Guard uses the total balance: locking debits it directly, so
        // double-locking the same funds is prevented by the debit itself
        if balance.amount < amount {
            self.metrics.record_guard_failure();
            return Err(Error::InsufficientBalance {
                balance: balance.amount,
            });
        }

        let now = Utc::now();
        balance.amount -= amount;
        balance.updated_at = now;

        let lock = LockedSaving {
            id: Uuid::now_v7(),
            user_id: user.clone(),
            amount,
            duration,
            locked_at: now,
            unlock_date: now + chrono::Duration::days(duration.days()),
            penalty_rate: self.penalty_rate,
            status: LockStatus::Active,
            unlocked_at: None,
            penalty_paid: Decimal::ZERO,
        };

        let transaction = Transaction::completed(user, TransactionKind::LockCreated, amount, now);

        self.storage
            .commit_lock_create(&balance, &lock, &transaction)?;
        self.metrics.record_lock_created();

        tracing::info!(
            lock_id = %lock.id,
            user_id = %lock.user_id,
            amount = %lock.amount,
            duration = %lock.duration,
            "Locked saving created"
        );

        Ok(lock)
    }

    fn unlock(&self, user: UserId, lock_id: Uuid, path: UnlockPath) -> Result<UnlockReceipt> {
        let mut lock = match self.storage.get_lock(lock_id) {
            Ok(lock) if lock.user_id == user => lock,
            // A foreign lock is indistinguishable from a missing one
            Ok(_) | Err(Error::LockNotFound(_)) => {
                return Err(Error::LockNotFound(lock_id.to_string()))
            }
            Err(e) => return Err(e),
        };

        let now = Utc::now();

        // The state guard: only one unlock attempt can ever observe Active
        if lock.status != LockStatus::Active {
            self.metrics.record_guard_failure();
            return Err(Error::AlreadyUnlocked(lock_id.to_string()));
        }
        if path == UnlockPath::Mature && !lock.is_mature(now) {
            self.metrics.record_guard_failure();
            return Err(Error::NotMature {
                unlock_date: lock.unlock_date,
            });
        }

        let (penalty, returned, kind) = match path {
            UnlockPath::Mature => (Decimal::ZERO, lock.amount, TransactionKind::UnlockMature),
            UnlockPath::Early => {
                let penalty = lock.penalty();
                (penalty, lock.amount - penalty, TransactionKind::UnlockEarly)
            }
        };

        let mut balance = self.storage.get_balance(&user)?;
        balance.amount += returned;
        balance.updated_at = now;

        lock.status = LockStatus::Unlocked;
        lock.unlocked_at = Some(now);
        lock.penalty_paid = penalty;

        let transaction = Transaction::completed(user, kind, returned, now);

        self.storage.commit_unlock(&balance, &lock, &transaction)?;
        self.metrics.record_lock_unlocked();

        tracing::info!(
            lock_id = %lock.id,
            user_id = %lock.user_id,
            returned = %returned,
            penalty = %penalty,
            "Locked saving unlocked"
        );

        Ok(UnlockReceipt {
            lock_id,
            amount_returned: returned,
            penalty,
            new_balance: balance.amount,
        })
    }

    // Reads (always re-query authoritative state; nothing is cached)

    fn get_balance_view(&self, user: &UserId) -> Result<BalanceView> {
        let balance = self.storage.get_balance(user)?;
        let locked = self.storage.active_locked_total(user)?;

        Ok(BalanceView {
            total: balance.amount,
            locked,
            available: balance.amount - locked,
        })
    }

    fn list_locks(&self, user: &UserId) -> Result<Vec<LockView>> {
        let now = Utc::now();
        let mut locks = self.storage.user_locks(user)?;
        locks.sort_by(|a, b| b.locked_at.cmp(&a.locked_at));

        Ok(locks.iter().map(|l| LockView::derive(l, now)).collect())
    }

    fn list_transactions(&self, user: &UserId, limit: Option<usize>) -> Result<Vec<Transaction>> {
        let mut transactions = self.storage.user_transactions(user)?;
        transactions.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        if let Some(limit) = limit {
            transactions.truncate(limit);
        }
        Ok(transactions)
    }

    fn get_owned_transaction(&self, user: &UserId, transaction_id: Uuid) -> Result<Transaction> {
        match self.storage.get_transaction(transaction_id) {
            Ok(tx) if tx.user_id == *user => Ok(tx),
            Ok(_) | Err(Error::TransactionNotFound(_)) => {
                Err(Error::TransactionNotFound(transaction_id.to_string()))
            }
            Err(e) => Err(e),
        }
    }
}

/// Which unlock guard to apply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnlockPath {
    Mature,
    Early,
}

/// Handle for sending messages to the actor
#[derive(Clone)]
pub struct LedgerHandle {
    sender: mpsc::Sender<LedgerMessage>,
}

impl LedgerHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<LedgerMessage>) -> Self {
        Self { sender }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T>>) -> LedgerMessage,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Create a zero balance for a new user
    pub async fn create_account(&self, user: UserId) -> Result<Balance> {
        self.request(|response| LedgerMessage::CreateAccount { user, response })
            .await
    }

    /// Create a pending deposit transaction
    pub async fn initiate_deposit(
        &self,
        user: UserId,
        amount: Decimal,
        phone: PhoneNumber,
    ) -> Result<Transaction> {
        self.request(|response| LedgerMessage::InitiateDeposit {
            user,
            amount,
            phone,
            response,
        })
        .await
    }

    /// Reserve a withdrawal against the available balance
    pub async fn initiate_withdrawal(
        &self,
        user: UserId,
        amount: Decimal,
        phone: PhoneNumber,
        network: NetworkCode,
    ) -> Result<Transaction> {
        self.request(|response| LedgerMessage::InitiateWithdrawal {
            user,
            amount,
            phone,
            network,
            response,
        })
        .await
    }

    /// Attach the gateway's reference to a pending transaction
    pub async fn attach_provider_reference(
        &self,
        transaction_id: Uuid,
        reference: String,
    ) -> Result<Transaction> {
        self.request(|response| LedgerMessage::AttachProviderReference {
            transaction_id,
            reference,
            response,
        })
        .await
    }

    /// Mark a pending transaction failed
    pub async fn mark_transaction_failed(
        &self,
        transaction_id: Uuid,
        reason: String,
    ) -> Result<Transaction> {
        self.request(|response| LedgerMessage::MarkTransactionFailed {
            transaction_id,
            reason,
            response,
        })
        .await
    }

    /// Apply a gateway settlement
    pub async fn settle(
        &self,
        reference: String,
        succeeded: bool,
        description: Option<String>,
        raw_payload: Option<String>,
    ) -> Result<SettlementOutcome> {
        self.request(|response| LedgerMessage::Settle {
            reference,
            succeeded,
            description,
            raw_payload,
            response,
        })
        .await
    }

    /// Debit the balance into a new locked saving
    pub async fn create_lock(
        &self,
        user: UserId,
        amount: Decimal,
        duration: LockDuration,
    ) -> Result<LockedSaving> {
        self.request(|response| LedgerMessage::CreateLock {
            user,
            amount,
            duration,
            response,
        })
        .await
    }

    /// Unlock a matured saving
    pub async fn unlock_mature(&self, user: UserId, lock_id: Uuid) -> Result<UnlockReceipt> {
        self.request(|response| LedgerMessage::UnlockMature {
            user,
            lock_id,
            response,
        })
        .await
    }

    /// Unlock an active saving early
    pub async fn unlock_early(&self, user: UserId, lock_id: Uuid) -> Result<UnlockReceipt> {
        self.request(|response| LedgerMessage::UnlockEarly {
            user,
            lock_id,
            response,
        })
        .await
    }

    /// Compute the live balance breakdown
    pub async fn get_balance(&self, user: UserId) -> Result<BalanceView> {
        self.request(|response| LedgerMessage::GetBalance { user, response })
            .await
    }

    /// List all locks with derived fields
    pub async fn list_locks(&self, user: UserId) -> Result<Vec<LockView>> {
        self.request(|response| LedgerMessage::ListLocks { user, response })
            .await
    }

    /// List the transaction log
    pub async fn list_transactions(
        &self,
        user: UserId,
        limit: Option<usize>,
    ) -> Result<Vec<Transaction>> {
        self.request(|response| LedgerMessage::ListTransactions {
            user,
            limit,
            response,
        })
        .await
    }

    /// Get a single transaction owned by a user
    pub async fn get_transaction(&self, user: UserId, transaction_id: Uuid) -> Result<Transaction> {
        self.request(|response| LedgerMessage::GetTransaction {
            user,
            transaction_id,
            response,
        })
        .await
    }

    /// Shutdown actor
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(LedgerMessage::Shutdown)
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;
        Ok(())
    }
}

/// Spawn the ledger actor
pub fn spawn_ledger_actor(
    storage: Arc<Storage>,
    penalty_rate: Decimal,
    metrics: Metrics,
) -> LedgerHandle {
    let (tx, rx) = mpsc::channel(1000); // Bounded channel for backpressure
    let actor = LedgerActor::new(storage, rx, penalty_rate, metrics);

    tokio::spawn(async move {
        actor.run().await;
    });

    LedgerHandle::new(tx)
}
