//! Core types for the savings ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Memory safety (no unsafe code)
//! - Exact arithmetic (Decimal for money)

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// User identifier, owned by the external authentication layer.
///
/// The ledger treats this as an opaque foreign key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    /// Create new user ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Mobile-money phone number in international format (254 + 9 digits)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// Parse and validate a phone number
    pub fn parse(raw: &str) -> crate::Result<Self> {
        let valid = raw.len() == 12
            && raw.starts_with("254")
            && raw.bytes().all(|b| b.is_ascii_digit());

        if valid {
            Ok(Self(raw.to_string()))
        } else {
            Err(crate::Error::Validation(format!(
                "Invalid phone number: {} (expected 254XXXXXXXXX)",
                raw
            )))
        }
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Mobile-money carrier network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkCode {
    /// Safaricom M-Pesa (63902)
    Mpesa,
    /// Airtel Money (63903)
    Airtel,
}

impl NetworkCode {
    /// Wire code used by the gateway
    pub fn code(&self) -> &'static str {
        match self {
            NetworkCode::Mpesa => "63902",
            NetworkCode::Airtel => "63903",
        }
    }

    /// Parse from wire code
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "63902" => Some(NetworkCode::Mpesa),
            "63903" => Some(NetworkCode::Airtel),
            _ => None,
        }
    }

    /// Parse from wire code, failing with a client-visible validation error
    pub fn parse(code: &str) -> crate::Result<Self> {
        Self::from_code(code).ok_or_else(|| {
            crate::Error::Validation(format!(
                "Invalid network code: {} (expected 63902 or 63903)",
                code
            ))
        })
    }

    /// Human-readable carrier name
    pub fn carrier_name(&self) -> &'static str {
        match self {
            NetworkCode::Mpesa => "M-Pesa",
            NetworkCode::Airtel => "Airtel Money",
        }
    }
}

impl fmt::Display for NetworkCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Lock duration, restricted to the client-visible enumerated set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockDuration {
    /// 30 days
    Days30,
    /// 60 days
    Days60,
    /// 90 days
    Days90,
    /// 180 days
    Days180,
    /// 365 days
    Days365,
}

impl LockDuration {
    /// All valid durations
    pub const ALL: [LockDuration; 5] = [
        LockDuration::Days30,
        LockDuration::Days60,
        LockDuration::Days90,
        LockDuration::Days180,
        LockDuration::Days365,
    ];

    /// Duration in days
    pub fn days(&self) -> i64 {
        match self {
            LockDuration::Days30 => 30,
            LockDuration::Days60 => 60,
            LockDuration::Days90 => 90,
            LockDuration::Days180 => 180,
            LockDuration::Days365 => 365,
        }
    }

    /// Parse from a day count
    pub fn from_days(days: i64) -> Option<Self> {
        match days {
            30 => Some(LockDuration::Days30),
            60 => Some(LockDuration::Days60),
            90 => Some(LockDuration::Days90),
            180 => Some(LockDuration::Days180),
            365 => Some(LockDuration::Days365),
            _ => None,
        }
    }
}

impl fmt::Display for LockDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} days", self.days())
    }
}

/// Cash balance row, one per user
///
/// `amount` never goes negative: every debit is guarded inside the
/// single-writer actor and rejected rather than truncated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Balance {
    /// Owning user
    pub user_id: UserId,

    /// Current balance (exact decimal)
    pub amount: Decimal,

    /// Last mutation timestamp
    pub updated_at: DateTime<Utc>,
}

/// Locked saving lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockStatus {
    /// Principal is held out of the available balance
    Active,
    /// Terminal: principal (minus any penalty) returned to the balance
    Unlocked,
}

/// Time-locked savings position
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockedSaving {
    /// Unique lock ID (UUIDv7 for time-ordering)
    pub id: Uuid,

    /// Owning user
    pub user_id: UserId,

    /// Locked principal
    pub amount: Decimal,

    /// Lock duration
    pub duration: LockDuration,

    /// Creation timestamp
    pub locked_at: DateTime<Utc>,

    /// Date the lock matures (`locked_at + duration`)
    pub unlock_date: DateTime<Utc>,

    /// Early-unlock penalty rate in percent, fixed at creation
    pub penalty_rate: Decimal,

    /// Lifecycle state (transitions exactly once, Active -> Unlocked)
    pub status: LockStatus,

    /// Unlock timestamp (None while active)
    pub unlocked_at: Option<DateTime<Utc>>,

    /// Penalty charged on unlock (zero until unlock, zero for mature unlocks)
    pub penalty_paid: Decimal,
}

impl LockedSaving {
    /// Whether the unlock date has passed
    pub fn is_mature(&self, now: DateTime<Utc>) -> bool {
        now >= self.unlock_date
    }

    /// Whole days remaining until maturity, rounded up, floored at zero
    pub fn days_remaining(&self, now: DateTime<Utc>) -> i64 {
        let secs = (self.unlock_date - now).num_seconds();
        if secs <= 0 {
            0
        } else {
            (secs + 86_399) / 86_400
        }
    }

    /// Penalty charged for unlocking early: `amount * penalty_rate / 100`
    pub fn penalty(&self) -> Decimal {
        (self.amount * self.penalty_rate / Decimal::ONE_HUNDRED).round_dp(2)
    }
}

/// Transaction log entry type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionKind {
    /// Gateway-backed deposit (credits the balance on settlement)
    Deposit,
    /// Gateway-backed withdrawal (debits the balance on settlement)
    Withdrawal,
    /// Balance debited into a new locked saving
    LockCreated,
    /// Full principal returned at maturity
    UnlockMature,
    /// Principal minus penalty returned before maturity
    UnlockEarly,
}

impl TransactionKind {
    /// Stable name for logging
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Deposit => "deposit",
            TransactionKind::Withdrawal => "withdrawal",
            TransactionKind::LockCreated => "lock_created",
            TransactionKind::UnlockMature => "unlock_mature",
            TransactionKind::UnlockEarly => "unlock_early",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Transaction log entry status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    /// Awaiting asynchronous gateway settlement
    Pending,
    /// Settled successfully (terminal)
    Success,
    /// Settlement failed (terminal)
    Failed,
    /// Internal operation, settled at creation (terminal)
    Completed,
}

impl TransactionStatus {
    /// Terminal rows are never mutated again; reprocessing is a no-op
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

/// Append-only transaction log row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique transaction ID (UUIDv7 for time-ordering)
    pub id: Uuid,

    /// Owning user
    pub user_id: UserId,

    /// Entry type
    pub kind: TransactionKind,

    /// Amount moved (or to be moved) by this entry
    pub amount: Decimal,

    /// Settlement state
    pub status: TransactionStatus,

    /// Gateway-assigned reference; unique when present, the join key
    /// for asynchronous settlement
    pub provider_reference: Option<String>,

    /// Mobile-money phone number for gateway-backed entries
    pub phone_number: Option<PhoneNumber>,

    /// Carrier network for disbursements
    pub network_code: Option<NetworkCode>,

    /// Gateway result description (set on settlement or failure)
    pub result_description: Option<String>,

    /// Raw callback payload as delivered (JSON text)
    pub callback_payload: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last mutation timestamp
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// Create a pending gateway-backed entry
    pub fn pending(
        user_id: UserId,
        kind: TransactionKind,
        amount: Decimal,
        phone_number: Option<PhoneNumber>,
        network_code: Option<NetworkCode>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            user_id,
            kind,
            amount,
            status: TransactionStatus::Pending,
            provider_reference: None,
            phone_number,
            network_code,
            result_description: None,
            callback_payload: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a completed internal entry (lock lifecycle operations)
    pub fn completed(
        user_id: UserId,
        kind: TransactionKind,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            user_id,
            kind,
            amount,
            status: TransactionStatus::Completed,
            provider_reference: None,
            phone_number: None,
            network_code: None,
            result_description: None,
            callback_payload: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Live balance breakdown, computed from the two authoritative tables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceView {
    /// Balance row amount
    pub total: Decimal,

    /// Sum of active lock principals
    pub locked: Decimal,

    /// `total - locked`; never persisted
    pub available: Decimal,
}

/// Locked saving with derived presentation fields
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockView {
    /// Lock ID
    pub id: Uuid,

    /// Locked principal
    pub amount: Decimal,

    /// Lock duration in days
    pub duration_days: i64,

    /// Creation timestamp
    pub locked_at: DateTime<Utc>,

    /// Maturity date
    pub unlock_date: DateTime<Utc>,

    /// Penalty rate in percent
    pub penalty_rate: Decimal,

    /// Lifecycle state
    pub status: LockStatus,

    /// Unlock timestamp, if unlocked
    pub unlocked_at: Option<DateTime<Utc>>,

    /// Penalty charged on unlock
    pub penalty_paid: Decimal,

    /// Whole days until maturity, floored at zero
    pub days_remaining: i64,

    /// Whether the unlock date has passed
    pub is_mature: bool,

    /// Whether an unlock operation can still succeed
    pub can_unlock: bool,
}

impl LockView {
    /// Derive the presentation fields from a stored row
    pub fn derive(lock: &LockedSaving, now: DateTime<Utc>) -> Self {
        Self {
            id: lock.id,
            amount: lock.amount,
            duration_days: lock.duration.days(),
            locked_at: lock.locked_at,
            unlock_date: lock.unlock_date,
            penalty_rate: lock.penalty_rate,
            status: lock.status,
            unlocked_at: lock.unlocked_at,
            penalty_paid: lock.penalty_paid,
            days_remaining: lock.days_remaining(now),
            is_mature: lock.is_mature(now),
            can_unlock: lock.status == LockStatus::Active,
        }
    }
}

/// Result of an unlock operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnlockReceipt {
    /// Unlocked lock ID
    pub lock_id: Uuid,

    /// Amount credited back to the balance
    pub amount_returned: Decimal,

    /// Penalty withheld (zero for mature unlocks)
    pub penalty: Decimal,

    /// Balance after the credit
    pub new_balance: Decimal,
}

/// Result of applying a gateway settlement to a pending transaction
#[derive(Debug, Clone)]
pub enum SettlementOutcome {
    /// The callback was applied and the row moved to a terminal state
    Applied {
        /// Post-settlement transaction row
        transaction: Transaction,
        /// Post-settlement balance, when the settlement moved money
        new_balance: Option<Decimal>,
    },
    /// The row was already terminal; the callback was a no-op
    AlreadyProcessed {
        /// Matched transaction ID
        transaction_id: Uuid,
        /// Terminal status observed
        status: TransactionStatus,
    },
}
