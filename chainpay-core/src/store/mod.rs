//! Persistent store used by every engine.
//!
//! [`PaymentStore`] is the only way the engines touch storage. The
//! PostgreSQL implementation is used in production; the in-memory one backs
//! tests and local runs. Both honor the same atomicity guarantees: counter
//! updates are single atomic steps, completing a pending transaction is
//! conditional on it still being pending, and `(network_id, hash)` is
//! unique.

pub mod memory;
pub mod postgres;

use crate::entities::collector::CollectorContract;
use crate::entities::hot_wallet::{CounterChange, HotWallet, NonceCounters};
use crate::entities::transaction::{PendingIncomingFilter, Transaction, TransactionInsert};
use crate::entities::xpub_wallet::{
    DerivedAddress, DerivedAddressInsert, XpubWallet, XpubWalletInsert,
};
use crate::entities::TransactionStatus;
use crate::error::ErrorClass;
use async_trait::async_trait;
use chainpay_sdk::objects::Blockchain;
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{entity} {key} not found")]
    NotFound { entity: &'static str, key: String },

    #[error("conflict: {0}")]
    Conflict(String),
}

impl StoreError {
    pub fn class(&self) -> ErrorClass {
        match self {
            StoreError::Database(_) => ErrorClass::Storage,
            StoreError::NotFound { .. } => ErrorClass::NotFound,
            StoreError::Conflict(_) => ErrorClass::Validation,
        }
    }

    pub(crate) fn not_found(entity: &'static str, key: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            key: key.to_string(),
        }
    }
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    // -- receiving wallets ---------------------------------------------------

    async fn hot_wallet_by_uuid(&self, uuid: Uuid) -> Result<Option<HotWallet>, StoreError>;

    async fn hot_wallet(&self, id: i64) -> Result<Option<HotWallet>, StoreError>;

    async fn derived_address_by_uuid(
        &self,
        uuid: Uuid,
    ) -> Result<Option<DerivedAddress>, StoreError>;

    async fn collector_by_uuid(&self, uuid: Uuid)
    -> Result<Option<CollectorContract>, StoreError>;

    // -- xpub wallets ----------------------------------------------------------

    /// Fails with [`StoreError::Conflict`] when the merchant already has an
    /// active wallet on the chain.
    async fn create_xpub_wallet(&self, insert: XpubWalletInsert) -> Result<XpubWallet, StoreError>;

    async fn active_xpub_wallet(
        &self,
        merchant_id: i64,
        blockchain: Blockchain,
    ) -> Result<Option<XpubWallet>, StoreError>;

    async fn deactivate_xpub_wallet(&self, id: i64) -> Result<bool, StoreError>;

    /// Open an exclusive session on one xpub wallet. Sessions on the same
    /// wallet are serialized; the lock is held until the session is
    /// committed or dropped.
    async fn lock_xpub_wallet(&self, id: i64) -> Result<Box<dyn XpubWalletSession>, StoreError>;

    // -- transactions ----------------------------------------------------------

    async fn transaction(&self, id: i64) -> Result<Option<Transaction>, StoreError>;

    async fn transaction_by_hash(
        &self,
        network_id: &str,
        hash: &str,
    ) -> Result<Option<Transaction>, StoreError>;

    async fn find_pending_incoming(
        &self,
        filter: PendingIncomingFilter,
    ) -> Result<Option<Transaction>, StoreError>;

    async fn create_transaction(&self, insert: TransactionInsert)
    -> Result<Transaction, StoreError>;

    /// Insert unless `(network_id, hash)` already exists; `None` on conflict.
    async fn create_transaction_if_absent(
        &self,
        insert: TransactionInsert,
    ) -> Result<Option<Transaction>, StoreError>;

    /// Pending → Completed with the chain hash and sender. `None` when the row
    /// is no longer pending or already carries a hash.
    async fn complete_pending_incoming(
        &self,
        id: i64,
        hash: &str,
        sender_address: Option<&str>,
    ) -> Result<Option<Transaction>, StoreError>;

    /// Pending → InProgress for an outgoing transaction that was just broadcast.
    async fn attach_broadcast_hash(
        &self,
        id: i64,
        hash: &str,
    ) -> Result<Option<Transaction>, StoreError>;

    /// Move a non-terminal transaction into `status`.
    async fn finalize_transaction(
        &self,
        id: i64,
        status: TransactionStatus,
        network_fee: Option<Decimal>,
    ) -> Result<Option<Transaction>, StoreError>;

    async fn in_progress_outgoing(&self, limit: i64) -> Result<Vec<Transaction>, StoreError>;

    // -- nonce counters ----------------------------------------------------------

    /// Atomically apply `change` and return the counters after it.
    async fn update_nonce_counters(
        &self,
        wallet_id: i64,
        is_test: bool,
        change: CounterChange,
    ) -> Result<NonceCounters, StoreError>;
}

/// Exclusive access to one xpub wallet and its derived addresses.
#[async_trait]
pub trait XpubWalletSession: Send {
    fn wallet(&self) -> &XpubWallet;

    async fn lowest_unused_address(&mut self) -> Result<Option<DerivedAddress>, StoreError>;

    /// Increment the last-derived index and return the new value.
    async fn advance_index(&mut self) -> Result<i32, StoreError>;

    async fn insert_address(
        &mut self,
        insert: DerivedAddressInsert,
    ) -> Result<DerivedAddress, StoreError>;

    async fn mark_used(
        &mut self,
        address_id: i64,
        transaction_id: Option<i64>,
    ) -> Result<DerivedAddress, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
