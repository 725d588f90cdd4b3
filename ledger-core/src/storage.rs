//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `balances` - One row per user (key: user_id)
//! - `locks` - Locked savings positions (key: lock_id)
//! - `transactions` - Append-only transaction log (key: transaction_id)
//! - `indices` - Secondary indices for fast lookups
//!
//! Multi-row state changes commit through a single [`rocksdb::WriteBatch`],
//! so a guarded mutation either materializes every dependent row or none.

use crate::{
    error::{Error, Result},
    types::{Balance, LockedSaving, Transaction, UserId},
    Config,
};
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, Direction, IteratorMode, Options, WriteBatch, DB};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

/// Column family names
const CF_BALANCES: &str = "balances";
const CF_LOCKS: &str = "locks";
const CF_TRANSACTIONS: &str = "transactions";
const CF_INDICES: &str = "indices";

/// Storage wrapper for RocksDB
pub struct Storage {
    db: Arc<DB>,
    // Column family handles are stored in DB, accessed by name
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        // Create directory if not exists
        std::fs::create_dir_all(path)?;

        // Database options
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        // Tuning from config
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_target_file_size_base(config.rocksdb.target_file_size_mb * 1024 * 1024);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        // Column family descriptors
        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_BALANCES, Self::cf_options_rows()),
            ColumnFamilyDescriptor::new(CF_LOCKS, Self::cf_options_rows()),
            ColumnFamilyDescriptor::new(CF_TRANSACTIONS, Self::cf_options_log()),
            ColumnFamilyDescriptor::new(CF_INDICES, Self::cf_options_indices()),
        ];

        // Open database
        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!("Opened RocksDB at {:?}", path);

        Ok(Self { db: Arc::new(db) })
    }

    // Column family options

    fn cf_options_rows() -> Options {
        let mut opts = Options::default();
        // Balances and locks are frequently read, use LZ4 for speed
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_options_log() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts.set_bottommost_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_options_indices() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        // Indices benefit from bloom filters
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false); // 10 bits per key
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    // Helper: get column family handle

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    // Balance operations

    /// Get balance row for a user
    pub fn get_balance(&self, user_id: &UserId) -> Result<Balance> {
        let cf = self.cf_handle(CF_BALANCES)?;
        let value = self
            .db
            .get_cf(cf, user_id.as_str().as_bytes())?
            .ok_or_else(|| Error::AccountNotFound(user_id.to_string()))?;

        let balance: Balance = bincode::deserialize(&value)?;
        Ok(balance)
    }

    /// Put balance row (single, unbatched; used at account creation)
    pub fn put_balance(&self, balance: &Balance) -> Result<()> {
        let cf = self.cf_handle(CF_BALANCES)?;
        let value = bincode::serialize(balance)?;
        self.db.put_cf(cf, balance.user_id.as_str().as_bytes(), &value)?;
        Ok(())
    }

    // Lock operations

    /// Get locked saving by ID
    pub fn get_lock(&self, lock_id: Uuid) -> Result<LockedSaving> {
        let cf = self.cf_handle(CF_LOCKS)?;
        let value = self
            .db
            .get_cf(cf, lock_id.as_bytes())?
            .ok_or_else(|| Error::LockNotFound(lock_id.to_string()))?;

        let lock: LockedSaving = bincode::deserialize(&value)?;
        Ok(lock)
    }

    /// Get all locks for a user (via index)
    pub fn user_locks(&self, user_id: &UserId) -> Result<Vec<LockedSaving>> {
        let prefix = Self::index_prefix_user_lock(user_id);
        let ids = self.scan_index_ids(&prefix)?;

        let mut locks = Vec::with_capacity(ids.len());
        for id in ids {
            locks.push(self.get_lock(id)?);
        }
        Ok(locks)
    }

    /// Sum of active lock principals for a user
    pub fn active_locked_total(&self, user_id: &UserId) -> Result<Decimal> {
        let locks = self.user_locks(user_id)?;
        Ok(locks
            .iter()
            .filter(|l| l.status == crate::types::LockStatus::Active)
            .map(|l| l.amount)
            .sum())
    }

    // Transaction operations

    /// Get transaction by ID
    pub fn get_transaction(&self, transaction_id: Uuid) -> Result<Transaction> {
        let cf = self.cf_handle(CF_TRANSACTIONS)?;
        let value = self
            .db
            .get_cf(cf, transaction_id.as_bytes())?
            .ok_or_else(|| Error::TransactionNotFound(transaction_id.to_string()))?;

        let transaction: Transaction = bincode::deserialize(&value)?;
        Ok(transaction)
    }

    /// Look up a transaction by provider reference (via index)
    pub fn find_transaction_by_reference(&self, reference: &str) -> Result<Option<Transaction>> {
        let cf = self.cf_handle(CF_INDICES)?;
        let key = Self::index_key_reference(reference);

        match self.db.get_cf(cf, &key)? {
            Some(value) if value.len() == 16 => {
                let id_bytes: [u8; 16] = value[..16].try_into().unwrap();
                Ok(Some(self.get_transaction(Uuid::from_bytes(id_bytes))?))
            }
            Some(_) => Err(Error::Storage(format!(
                "Corrupt reference index entry for {}",
                reference
            ))),
            None => Ok(None),
        }
    }

    /// Get all transactions for a user (via index)
    pub fn user_transactions(&self, user_id: &UserId) -> Result<Vec<Transaction>> {
        let prefix = Self::index_prefix_user_transaction(user_id);
        let ids = self.scan_index_ids(&prefix)?;

        let mut transactions = Vec::with_capacity(ids.len());
        for id in ids {
            transactions.push(self.get_transaction(id)?);
        }
        Ok(transactions)
    }

    // Batch operations (atomic)
    //
    // Each commit_* method is one WriteBatch: all rows land or none do.

    /// Write a transaction row with its indices
    pub fn commit_transaction(&self, transaction: &Transaction) -> Result<()> {
        let mut batch = WriteBatch::default();
        self.batch_put_transaction(&mut batch, transaction)?;
        self.db.write(batch)?;

        tracing::debug!(
            transaction_id = %transaction.id,
            user_id = %transaction.user_id,
            kind = %transaction.kind,
            "Transaction row written"
        );

        Ok(())
    }

    /// Debit balance, insert lock, insert log entry — atomic
    pub fn commit_lock_create(
        &self,
        balance: &Balance,
        lock: &LockedSaving,
        transaction: &Transaction,
    ) -> Result<()> {
        let mut batch = WriteBatch::default();
        self.batch_put_balance(&mut batch, balance)?;
        self.batch_put_lock(&mut batch, lock)?;
        self.batch_put_transaction(&mut batch, transaction)?;
        self.db.write(batch)?;
        Ok(())
    }

    /// Close lock, credit balance, insert log entry — atomic
    pub fn commit_unlock(
        &self,
        balance: &Balance,
        lock: &LockedSaving,
        transaction: &Transaction,
    ) -> Result<()> {
        let mut batch = WriteBatch::default();
        self.batch_put_balance(&mut batch, balance)?;
        self.batch_put_lock(&mut batch, lock)?;
        self.batch_put_transaction(&mut batch, transaction)?;
        self.db.write(batch)?;
        Ok(())
    }

    /// Finalize a pending transaction, optionally moving the balance — atomic
    pub fn commit_settlement(
        &self,
        balance: Option<&Balance>,
        transaction: &Transaction,
    ) -> Result<()> {
        let mut batch = WriteBatch::default();
        if let Some(balance) = balance {
            self.batch_put_balance(&mut batch, balance)?;
        }
        self.batch_put_transaction(&mut batch, transaction)?;
        self.db.write(batch)?;
        Ok(())
    }

    // Batch composition helpers

    fn batch_put_balance(&self, batch: &mut WriteBatch, balance: &Balance) -> Result<()> {
        let cf = self.cf_handle(CF_BALANCES)?;
        let value = bincode::serialize(balance)?;
        batch.put_cf(cf, balance.user_id.as_str().as_bytes(), &value);
        Ok(())
    }

    fn batch_put_lock(&self, batch: &mut WriteBatch, lock: &LockedSaving) -> Result<()> {
        let cf = self.cf_handle(CF_LOCKS)?;
        let value = bincode::serialize(lock)?;
        batch.put_cf(cf, lock.id.as_bytes(), &value);

        let cf_indices = self.cf_handle(CF_INDICES)?;
        let idx = Self::index_key_user_lock(&lock.user_id, lock.id);
        batch.put_cf(cf_indices, &idx, &[]);
        Ok(())
    }

    fn batch_put_transaction(&self, batch: &mut WriteBatch, transaction: &Transaction) -> Result<()> {
        let cf = self.cf_handle(CF_TRANSACTIONS)?;
        let value = bincode::serialize(transaction)?;
        batch.put_cf(cf, transaction.id.as_bytes(), &value);

        let cf_indices = self.cf_handle(CF_INDICES)?;

        // Index: user -> transaction
        let idx_user = Self::index_key_user_transaction(&transaction.user_id, transaction.id);
        batch.put_cf(cf_indices, &idx_user, &[]);

        // Index: provider reference -> transaction (settlement join key)
        if let Some(reference) = &transaction.provider_reference {
            let idx_ref = Self::index_key_reference(reference);
            batch.put_cf(cf_indices, &idx_ref, transaction.id.as_bytes());
        }

        Ok(())
    }

    // Index key helpers

    fn index_prefix_user_transaction(user_id: &UserId) -> Vec<u8> {
        let mut key = b"utx|".to_vec();
        key.extend_from_slice(user_id.as_str().as_bytes());
        key.push(b'|'); // Separator
        key
    }

    fn index_key_user_transaction(user_id: &UserId, transaction_id: Uuid) -> Vec<u8> {
        let mut key = Self::index_prefix_user_transaction(user_id);
        key.extend_from_slice(transaction_id.as_bytes());
        key
    }

    fn index_prefix_user_lock(user_id: &UserId) -> Vec<u8> {
        let mut key = b"ulk|".to_vec();
        key.extend_from_slice(user_id.as_str().as_bytes());
        key.push(b'|');
        key
    }

    fn index_key_user_lock(user_id: &UserId, lock_id: Uuid) -> Vec<u8> {
        let mut key = Self::index_prefix_user_lock(user_id);
        key.extend_from_slice(lock_id.as_bytes());
        key
    }

    fn index_key_reference(reference: &str) -> Vec<u8> {
        let mut key = b"ref|".to_vec();
        key.extend_from_slice(reference.as_bytes());
        key
    }

    /// Scan an index prefix, extracting the trailing UUID of each key
    fn scan_index_ids(&self, prefix: &[u8]) -> Result<Vec<Uuid>> {
        let cf = self.cf_handle(CF_INDICES)?;
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(prefix, Direction::Forward));

        let mut ids = Vec::new();
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(prefix) {
                break;
            }

            let tail = &key[prefix.len()..];
            if tail.len() == 16 {
                let id_bytes: [u8; 16] = tail.try_into().unwrap();
                ids.push(Uuid::from_bytes(id_bytes));
            }
        }

        Ok(ids)
    }

    // Statistics

    /// Get storage statistics
    pub fn get_stats(&self) -> Result<StorageStats> {
        let cf_balances = self.cf_handle(CF_BALANCES)?;
        let cf_locks = self.cf_handle(CF_LOCKS)?;
        let cf_transactions = self.cf_handle(CF_TRANSACTIONS)?;

        Ok(StorageStats {
            total_accounts: self.approximate_count(cf_balances)?,
            total_locks: self.approximate_count(cf_locks)?,
            total_transactions: self.approximate_count(cf_transactions)?,
        })
    }

    fn approximate_count(&self, cf: &ColumnFamily) -> Result<u64> {
        // RocksDB property for approximate count
        let prop = self
            .db
            .property_int_value_cf(cf, "rocksdb.estimate-num-keys")?
            .unwrap_or(0);

        Ok(prop)
    }

    /// Close database (graceful shutdown)
    pub fn close(self) -> Result<()> {
        drop(self.db);
        tracing::info!("RocksDB closed gracefully");
        Ok(())
    }
}

/// Storage statistics
#[derive(Debug, Clone)]
pub struct StorageStats {
    /// Approximate balance row count
    pub total_accounts: u64,
    /// Approximate lock row count
    pub total_locks: u64,
    /// Approximate transaction row count
    pub total_transactions: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        LockDuration, LockStatus, TransactionKind, TransactionStatus,
    };
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    fn test_storage() -> (Storage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        (Storage::open(&config).unwrap(), temp_dir)
    }

    fn test_balance(user: &str, amount: Decimal) -> Balance {
        Balance {
            user_id: UserId::new(user),
            amount,
            updated_at: Utc::now(),
        }
    }

    fn test_lock(user: &str, amount: Decimal) -> LockedSaving {
        let now = Utc::now();
        LockedSaving {
            id: Uuid::now_v7(),
            user_id: UserId::new(user),
            amount,
            duration: LockDuration::Days30,
            locked_at: now,
            unlock_date: now + chrono::Duration::days(30),
            penalty_rate: dec!(10.00),
            status: LockStatus::Active,
            unlocked_at: None,
            penalty_paid: Decimal::ZERO,
        }
    }

    #[test]
    fn test_storage_open() {
        let (storage, _temp) = test_storage();
        assert!(storage.db.cf_handle(CF_BALANCES).is_some());
        assert!(storage.db.cf_handle(CF_INDICES).is_some());
    }

    #[test]
    fn test_put_and_get_balance() {
        let (storage, _temp) = test_storage();

        let balance = test_balance("user-1", dec!(1000.00));
        storage.put_balance(&balance).unwrap();

        let retrieved = storage.get_balance(&UserId::new("user-1")).unwrap();
        assert_eq!(retrieved.amount, dec!(1000.00));

        let missing = storage.get_balance(&UserId::new("user-2"));
        assert!(matches!(missing, Err(Error::AccountNotFound(_))));
    }

    #[test]
    fn test_transaction_reference_index() {
        let (storage, _temp) = test_storage();

        let mut tx = Transaction::pending(
            UserId::new("user-1"),
            TransactionKind::Deposit,
            dec!(200.00),
            None,
            None,
            Utc::now(),
        );
        tx.provider_reference = Some("REF-123".to_string());
        storage.commit_transaction(&tx).unwrap();

        let found = storage.find_transaction_by_reference("REF-123").unwrap();
        assert_eq!(found.unwrap().id, tx.id);

        let absent = storage.find_transaction_by_reference("REF-999").unwrap();
        assert!(absent.is_none());
    }

    #[test]
    fn test_lock_create_is_atomic_group() {
        let (storage, _temp) = test_storage();
        let user = UserId::new("user-1");

        let balance = test_balance("user-1", dec!(500.00));
        let lock = test_lock("user-1", dec!(500.00));
        let tx = Transaction::completed(
            user.clone(),
            TransactionKind::LockCreated,
            dec!(500.00),
            Utc::now(),
        );

        storage.commit_lock_create(&balance, &lock, &tx).unwrap();

        // All three rows visible after the batch
        assert_eq!(storage.get_balance(&user).unwrap().amount, dec!(500.00));
        assert_eq!(storage.get_lock(lock.id).unwrap().amount, dec!(500.00));
        assert_eq!(
            storage.get_transaction(tx.id).unwrap().status,
            TransactionStatus::Completed
        );
        assert_eq!(storage.active_locked_total(&user).unwrap(), dec!(500.00));
    }

    #[test]
    fn test_user_scans_stay_per_user() {
        let (storage, _temp) = test_storage();

        for user in ["alice", "bob"] {
            for _ in 0..3 {
                let tx = Transaction::pending(
                    UserId::new(user),
                    TransactionKind::Deposit,
                    dec!(10.00),
                    None,
                    None,
                    Utc::now(),
                );
                storage.commit_transaction(&tx).unwrap();
            }
        }

        let alice_txs = storage.user_transactions(&UserId::new("alice")).unwrap();
        assert_eq!(alice_txs.len(), 3);
        assert!(alice_txs.iter().all(|t| t.user_id == UserId::new("alice")));

        let carol_txs = storage.user_transactions(&UserId::new("carol")).unwrap();
        assert!(carol_txs.is_empty());
    }

    #[test]
    fn test_active_locked_total_ignores_unlocked() {
        let (storage, _temp) = test_storage();
        let user = UserId::new("user-1");

        let active = test_lock("user-1", dec!(300.00));
        let mut unlocked = test_lock("user-1", dec!(200.00));
        unlocked.status = LockStatus::Unlocked;

        let balance = test_balance("user-1", dec!(0.00));
        let tx1 = Transaction::completed(user.clone(), TransactionKind::LockCreated, dec!(300.00), Utc::now());
        let tx2 = Transaction::completed(user.clone(), TransactionKind::LockCreated, dec!(200.00), Utc::now());
        storage.commit_lock_create(&balance, &active, &tx1).unwrap();
        storage.commit_lock_create(&balance, &unlocked, &tx2).unwrap();

        assert_eq!(storage.active_locked_total(&user).unwrap(), dec!(300.00));
    }
}
