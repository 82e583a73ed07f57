//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `accounts` - Account rows (key: account id)
//! - `payments` - Payment rows (key: payment_id)
//! - `limits` - Spending limits (key: role || currency)
//! - `indices` - Secondary indices for idempotency and maker history
//!
//! The idempotency-key index is the source of truth for duplicate
//! creation: inserts are serialized through a mutex so concurrent
//! submissions of the same key converge to one payment row.

use crate::{
    error::{Error, Result},
    types::{Account, AccountId, Currency, Limit, Payment, PaymentStatus, Role},
    Config,
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DBCompactionStyle, Direction, IteratorMode, Options,
    WriteBatch, DB,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

/// Column family names
const CF_ACCOUNTS: &str = "accounts";
const CF_PAYMENTS: &str = "payments";
const CF_LIMITS: &str = "limits";
const CF_INDICES: &str = "indices";

/// Index key prefixes
const IDX_IDEMPOTENCY: &[u8] = b"idem/";
const IDX_MAKER: &[u8] = b"maker/";

/// Storage wrapper for RocksDB
pub struct Storage {
    db: Arc<DB>,

    /// Serializes payment inserts so the idempotency-key check and the
    /// row write are one critical section.
    insert_lock: Mutex<()>,
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        // Tuning from config
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_target_file_size_base(config.rocksdb.target_file_size_mb * 1024 * 1024);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);
        db_opts.set_compaction_style(DBCompactionStyle::Universal);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_ACCOUNTS, Self::cf_options_rows()),
            ColumnFamilyDescriptor::new(CF_PAYMENTS, Self::cf_options_rows()),
            ColumnFamilyDescriptor::new(CF_LIMITS, Self::cf_options_rows()),
            ColumnFamilyDescriptor::new(CF_INDICES, Self::cf_options_indices()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!("Opened RocksDB at {:?}", path);

        Ok(Self {
            db: Arc::new(db),
            insert_lock: Mutex::new(()),
        })
    }

    fn cf_options_rows() -> Options {
        let mut opts = Options::default();
        // Rows are frequently re-read, use LZ4 for speed
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_options_indices() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        // Indices benefit from bloom filters
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    // Account operations

    /// Put account row
    pub fn put_account(&self, account: &Account) -> Result<()> {
        let cf = self.cf_handle(CF_ACCOUNTS)?;
        let value = bincode::serialize(account)?;
        self.db.put_cf(cf, account.id.as_str().as_bytes(), &value)?;
        Ok(())
    }

    /// Get account by ID
    pub fn get_account(&self, id: &AccountId) -> Result<Account> {
        let cf = self.cf_handle(CF_ACCOUNTS)?;
        let value = self
            .db
            .get_cf(cf, id.as_str().as_bytes())?
            .ok_or_else(|| Error::AccountNotFound(id.to_string()))?;
        let account: Account = bincode::deserialize(&value)?;
        Ok(account)
    }

    // Payment operations

    /// Insert a payment, idempotently.
    ///
    /// If a payment already exists for the same idempotency key, the
    /// existing row is returned and nothing is written. Otherwise the
    /// payment row, idempotency index, and maker-history index are
    /// committed in one atomic batch. The returned flag is `true` when
    /// a new row was created.
    pub fn insert_payment_idempotent(&self, payment: &Payment) -> Result<(Payment, bool)> {
        let _guard = self.insert_lock.lock();

        if let Some(existing) = self.find_by_idempotency_key(&payment.idempotency_key)? {
            tracing::info!(
                payment_id = %existing.payment_id,
                idempotency_key = %payment.idempotency_key,
                "Duplicate idempotency key, returning existing payment"
            );
            return Ok((existing, false));
        }

        let mut batch = WriteBatch::default();

        let cf_payments = self.cf_handle(CF_PAYMENTS)?;
        let value = bincode::serialize(payment)?;
        batch.put_cf(cf_payments, payment.payment_id.as_bytes(), &value);

        let cf_indices = self.cf_handle(CF_INDICES)?;

        // Index: idempotency key -> payment_id
        batch.put_cf(
            cf_indices,
            Self::index_key_idempotency(&payment.idempotency_key),
            payment.payment_id.as_bytes(),
        );

        // Index: maker || created_at || payment_id -> empty
        batch.put_cf(
            cf_indices,
            Self::index_key_maker(&payment.created_by, payment.created_at, payment.payment_id),
            b"",
        );

        self.db.write(batch)?;

        tracing::debug!(
            payment_id = %payment.payment_id,
            source = %payment.source,
            target = %payment.target,
            "Payment inserted"
        );

        Ok((payment.clone(), true))
    }

    /// Get payment by ID
    pub fn get_payment(&self, payment_id: Uuid) -> Result<Payment> {
        let cf = self.cf_handle(CF_PAYMENTS)?;
        let value = self
            .db
            .get_cf(cf, payment_id.as_bytes())?
            .ok_or_else(|| Error::PaymentNotFound(payment_id.to_string()))?;
        let payment: Payment = bincode::deserialize(&value)?;
        Ok(payment)
    }

    /// Find payment by idempotency key
    pub fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Payment>> {
        let cf = self.cf_handle(CF_INDICES)?;
        let value = self.db.get_cf(cf, Self::index_key_idempotency(key))?;

        match value {
            Some(bytes) if bytes.len() == 16 => {
                let id_bytes: [u8; 16] = bytes[..16]
                    .try_into()
                    .map_err(|_| Error::Storage("Corrupt idempotency index entry".to_string()))?;
                Ok(Some(self.get_payment(Uuid::from_bytes(id_bytes))?))
            }
            Some(_) => Err(Error::Storage("Corrupt idempotency index entry".to_string())),
            None => Ok(None),
        }
    }

    /// Update an existing payment row
    pub fn update_payment(&self, payment: &Payment) -> Result<()> {
        let cf = self.cf_handle(CF_PAYMENTS)?;
        let value = bincode::serialize(payment)?;
        self.db.put_cf(cf, payment.payment_id.as_bytes(), &value)?;
        Ok(())
    }

    /// Persist a payment only if the stored row is still in `expected`
    /// status.
    ///
    /// Read and write happen under the insert lock, so two concurrent
    /// decisions on the same payment serialize here: exactly one caller
    /// sees `expected` and wins, the other observes the winner's status
    /// and gets `false` with nothing written.
    pub fn update_payment_if_status(
        &self,
        expected: PaymentStatus,
        payment: &Payment,
    ) -> Result<bool> {
        let _guard = self.insert_lock.lock();

        let current = self.get_payment(payment.payment_id)?;
        if current.status != expected {
            tracing::debug!(
                payment_id = %payment.payment_id,
                expected = %expected,
                found = %current.status,
                "Conditional payment update lost the race"
            );
            return Ok(false);
        }

        let cf = self.cf_handle(CF_PAYMENTS)?;
        let value = bincode::serialize(payment)?;
        self.db.put_cf(cf, payment.payment_id.as_bytes(), &value)?;
        Ok(true)
    }

    /// Sum the amounts of a maker's payments in a currency created at or
    /// after `since`, excluding REJECTED and FAILED payments.
    ///
    /// Pending and approved payments count: an unsettled payment is still
    /// a contingent liability against the daily cap.
    pub fn sum_spent_since(
        &self,
        maker: &Uuid,
        currency: Currency,
        since: DateTime<Utc>,
    ) -> Result<Decimal> {
        let cf = self.cf_handle(CF_INDICES)?;

        let prefix = Self::index_prefix_maker(maker);
        let start = Self::index_key_maker_bound(maker, since);

        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(&start, Direction::Forward));

        let mut total = Decimal::ZERO;
        for item in iter {
            let (key, _) = item?;

            if !key.starts_with(&prefix) {
                break;
            }

            // Key layout: prefix(5) || maker(16) || nanos(8) || payment_id(16)
            if key.len() < prefix.len() + 8 + 16 {
                continue;
            }
            let id_off = prefix.len() + 8;
            let id_bytes: [u8; 16] = key[id_off..id_off + 16]
                .try_into()
                .map_err(|_| Error::Storage("Corrupt maker index entry".to_string()))?;

            let payment = self.get_payment(Uuid::from_bytes(id_bytes))?;

            if payment.currency != currency {
                continue;
            }
            if matches!(
                payment.status,
                PaymentStatus::Rejected | PaymentStatus::Failed
            ) {
                continue;
            }

            total += payment.amount;
        }

        Ok(total)
    }

    // Limit operations

    /// Put limit row (one per role/currency pair)
    pub fn put_limit(&self, limit: &Limit) -> Result<()> {
        let cf = self.cf_handle(CF_LIMITS)?;
        let value = bincode::serialize(limit)?;
        self.db
            .put_cf(cf, Self::limit_key(limit.role, limit.currency), &value)?;
        Ok(())
    }

    /// Find the active limit for a (role, currency) pair, if any
    pub fn find_active_limit(&self, role: Role, currency: Currency) -> Result<Option<Limit>> {
        let cf = self.cf_handle(CF_LIMITS)?;
        let value = self.db.get_cf(cf, Self::limit_key(role, currency))?;

        match value {
            Some(bytes) => {
                let limit: Limit = bincode::deserialize(&bytes)?;
                Ok(if limit.active { Some(limit) } else { None })
            }
            None => Ok(None),
        }
    }

    // Settlement commit

    /// Persist both mutated account rows and the payment in one atomic
    /// commit scope.
    pub fn commit_settlement(
        &self,
        payment: &Payment,
        source: &Account,
        target: &Account,
    ) -> Result<()> {
        let mut batch = WriteBatch::default();

        let cf_payments = self.cf_handle(CF_PAYMENTS)?;
        batch.put_cf(
            cf_payments,
            payment.payment_id.as_bytes(),
            bincode::serialize(payment)?,
        );

        let cf_accounts = self.cf_handle(CF_ACCOUNTS)?;
        batch.put_cf(
            cf_accounts,
            source.id.as_str().as_bytes(),
            bincode::serialize(source)?,
        );
        batch.put_cf(
            cf_accounts,
            target.id.as_str().as_bytes(),
            bincode::serialize(target)?,
        );

        self.db.write(batch)?;

        tracing::info!(
            payment_id = %payment.payment_id,
            source = %source.id,
            target = %target.id,
            "Settlement committed"
        );

        Ok(())
    }

    // Index key helpers

    fn index_key_idempotency(key: &str) -> Vec<u8> {
        let mut k = IDX_IDEMPOTENCY.to_vec();
        k.extend_from_slice(key.as_bytes());
        k
    }

    fn index_prefix_maker(maker: &Uuid) -> Vec<u8> {
        let mut k = IDX_MAKER.to_vec();
        k.extend_from_slice(maker.as_bytes());
        k
    }

    fn index_key_maker_bound(maker: &Uuid, since: DateTime<Utc>) -> Vec<u8> {
        let mut k = Self::index_prefix_maker(maker);
        let nanos = since.timestamp_nanos_opt().unwrap_or(0);
        k.extend_from_slice(&nanos.to_be_bytes());
        k
    }

    fn index_key_maker(maker: &Uuid, created_at: DateTime<Utc>, payment_id: Uuid) -> Vec<u8> {
        let mut k = Self::index_key_maker_bound(maker, created_at);
        k.extend_from_slice(payment_id.as_bytes());
        k
    }

    fn limit_key(role: Role, currency: Currency) -> Vec<u8> {
        let mut k = role.code().as_bytes().to_vec();
        k.push(b'/');
        k.extend_from_slice(currency.code().as_bytes());
        k
    }
}
