//! Error types for the ledger

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Input failed validation (bad amount, phone, duration)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Withdrawal guard failed against the available balance
    #[error("Insufficient funds: available balance is KES {available}")]
    InsufficientFunds {
        /// Available balance at the moment the guard was evaluated
        available: Decimal,
    },

    /// Lock-create guard failed against the total balance
    #[error("Insufficient balance: current balance is KES {balance}")]
    InsufficientBalance {
        /// Total balance at the moment the guard was evaluated
        balance: Decimal,
    },

    /// No balance row for this user
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// No matching locked saving for this user
    #[error("Locked saving not found: {0}")]
    LockNotFound(String),

    /// No matching transaction for this user or reference
    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    /// Balance row already exists for this user
    #[error("Account already exists: {0}")]
    AlreadyExists(String),

    /// The locked saving was already unlocked by a prior operation
    #[error("Locked saving already unlocked: {0}")]
    AlreadyUnlocked(String),

    /// The transaction is already in a terminal state
    #[error("Transaction already processed: {0}")]
    AlreadyProcessed(String),

    /// Maturity guard failed
    #[error("Lock period has not expired yet (matures {unlock_date})")]
    NotMature {
        /// The date the lock becomes eligible for mature unlock
        unlock_date: DateTime<Utc>,
    },

    /// Provider reference is already attached to another transaction
    #[error("Duplicate provider reference: {0}")]
    DuplicateReference(String),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}
