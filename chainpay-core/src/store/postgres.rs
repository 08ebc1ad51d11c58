use super::{PaymentStore, StoreError, XpubWalletSession};
use crate::entities::collector::{CollectorContract, GetCollectorByUuid};
use crate::entities::hot_wallet::{
    CounterChange, GetHotWalletById, GetHotWalletByUuid, HotWallet, NonceCounters,
    UpdateNonceCounters,
};
use crate::entities::transaction::{
    AttachBroadcastHash, CompletePendingIncoming, FinalizeTransaction, GetTransactionByHash,
    GetTransactionById, InsertTransactionIfAbsent, ListInProgressOutgoing, PendingIncomingFilter,
    Transaction, TransactionInsert,
};
use crate::entities::xpub_wallet::{
    DeactivateXpubWallet, DerivedAddress, DerivedAddressInsert, GetActiveXpubWallet,
    GetDerivedAddressByUuid, XpubWallet, XpubWalletInsert,
};
use crate::entities::TransactionStatus;
use crate::framework::{DatabaseProcessor, TransactionProcessor};
use async_trait::async_trait;
use chainpay_sdk::objects::Blockchain;
use kanau::processor::Processor;
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

/// PostgreSQL-backed [`PaymentStore`].
#[derive(Clone)]
pub struct PgStore {
    db: DatabaseProcessor,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            db: DatabaseProcessor { pool },
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.db.pool
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait]
impl PaymentStore for PgStore {
    async fn hot_wallet_by_uuid(&self, uuid: Uuid) -> Result<Option<HotWallet>, StoreError> {
        Ok(self.db.process(GetHotWalletByUuid { uuid }).await?)
    }

    async fn hot_wallet(&self, id: i64) -> Result<Option<HotWallet>, StoreError> {
        Ok(self.db.process(GetHotWalletById { id }).await?)
    }

    async fn derived_address_by_uuid(
        &self,
        uuid: Uuid,
    ) -> Result<Option<DerivedAddress>, StoreError> {
        Ok(self.db.process(GetDerivedAddressByUuid { uuid }).await?)
    }

    async fn collector_by_uuid(
        &self,
        uuid: Uuid,
    ) -> Result<Option<CollectorContract>, StoreError> {
        Ok(self.db.process(GetCollectorByUuid { uuid }).await?)
    }

    async fn create_xpub_wallet(&self, insert: XpubWalletInsert) -> Result<XpubWallet, StoreError> {
        let merchant_id = insert.merchant_id;
        let blockchain = Blockchain::from(insert.blockchain);
        self.db.process(insert).await.map_err(|err| {
            if is_unique_violation(&err) {
                StoreError::Conflict(format!(
                    "merchant {merchant_id} already has an active {blockchain} xpub wallet"
                ))
            } else {
                StoreError::Database(err)
            }
        })
    }

    async fn active_xpub_wallet(
        &self,
        merchant_id: i64,
        blockchain: Blockchain,
    ) -> Result<Option<XpubWallet>, StoreError> {
        Ok(self
            .db
            .process(GetActiveXpubWallet {
                merchant_id,
                blockchain: blockchain.into(),
            })
            .await?)
    }

    async fn deactivate_xpub_wallet(&self, id: i64) -> Result<bool, StoreError> {
        Ok(self.db.process(DeactivateXpubWallet { id }).await?)
    }

    #[tracing::instrument(skip(self), err)]
    async fn lock_xpub_wallet(&self, id: i64) -> Result<Box<dyn XpubWalletSession>, StoreError> {
        let mut tx = TransactionProcessor {
            tx: self.db.pool.begin().await?,
        };
        let wallet = XpubWallet::lock_for_update(&mut tx, id)
            .await?
            .ok_or_else(|| StoreError::not_found("xpub wallet", id))?;
        Ok(Box::new(PgXpubSession { tx, wallet }))
    }

    async fn transaction(&self, id: i64) -> Result<Option<Transaction>, StoreError> {
        Ok(self.db.process(GetTransactionById { id }).await?)
    }

    async fn transaction_by_hash(
        &self,
        network_id: &str,
        hash: &str,
    ) -> Result<Option<Transaction>, StoreError> {
        Ok(self
            .db
            .process(GetTransactionByHash {
                network_id: network_id.to_owned(),
                hash: hash.to_owned(),
            })
            .await?)
    }

    async fn find_pending_incoming(
        &self,
        filter: PendingIncomingFilter,
    ) -> Result<Option<Transaction>, StoreError> {
        Ok(self.db.process(filter).await?)
    }

    async fn create_transaction(
        &self,
        insert: TransactionInsert,
    ) -> Result<Transaction, StoreError> {
        self.db.process(insert).await.map_err(|err| {
            if is_unique_violation(&err) {
                StoreError::Conflict("transaction hash already recorded".to_owned())
            } else {
                StoreError::Database(err)
            }
        })
    }

    async fn create_transaction_if_absent(
        &self,
        insert: TransactionInsert,
    ) -> Result<Option<Transaction>, StoreError> {
        Ok(self.db.process(InsertTransactionIfAbsent { insert }).await?)
    }

    async fn complete_pending_incoming(
        &self,
        id: i64,
        hash: &str,
        sender_address: Option<&str>,
    ) -> Result<Option<Transaction>, StoreError> {
        let command = CompletePendingIncoming {
            id,
            hash: hash.to_owned(),
            sender_address: sender_address.map(str::to_owned),
        };
        self.db.process(command).await.map_err(|err| {
            // The hash already belongs to another row.
            if is_unique_violation(&err) {
                StoreError::Conflict(format!("hash {hash} already recorded"))
            } else {
                StoreError::Database(err)
            }
        })
    }

    async fn attach_broadcast_hash(
        &self,
        id: i64,
        hash: &str,
    ) -> Result<Option<Transaction>, StoreError> {
        Ok(self
            .db
            .process(AttachBroadcastHash {
                id,
                hash: hash.to_owned(),
            })
            .await?)
    }

    async fn finalize_transaction(
        &self,
        id: i64,
        status: TransactionStatus,
        network_fee: Option<Decimal>,
    ) -> Result<Option<Transaction>, StoreError> {
        Ok(self
            .db
            .process(FinalizeTransaction {
                id,
                status,
                network_fee,
            })
            .await?)
    }

    async fn in_progress_outgoing(&self, limit: i64) -> Result<Vec<Transaction>, StoreError> {
        Ok(self.db.process(ListInProgressOutgoing { limit }).await?)
    }

    async fn update_nonce_counters(
        &self,
        wallet_id: i64,
        is_test: bool,
        change: CounterChange,
    ) -> Result<NonceCounters, StoreError> {
        self.db
            .process(UpdateNonceCounters {
                wallet_id,
                is_test,
                change,
            })
            .await?
            .ok_or_else(|| StoreError::not_found("hot wallet", wallet_id))
    }
}

/// Session backed by an open database transaction holding `FOR UPDATE` on
/// the wallet row. Dropping it without commit rolls everything back.
struct PgXpubSession {
    tx: TransactionProcessor<'static>,
    wallet: XpubWallet,
}

#[async_trait]
impl XpubWalletSession for PgXpubSession {
    fn wallet(&self) -> &XpubWallet {
        &self.wallet
    }

    async fn lowest_unused_address(&mut self) -> Result<Option<DerivedAddress>, StoreError> {
        Ok(DerivedAddress::lowest_unused(&mut self.tx, self.wallet.id).await?)
    }

    async fn advance_index(&mut self) -> Result<i32, StoreError> {
        let index = XpubWallet::advance_index(&mut self.tx, self.wallet.id).await?;
        self.wallet.last_derived_index = index;
        Ok(index)
    }

    async fn insert_address(
        &mut self,
        insert: DerivedAddressInsert,
    ) -> Result<DerivedAddress, StoreError> {
        Ok(DerivedAddress::insert(&mut self.tx, insert).await?)
    }

    async fn mark_used(
        &mut self,
        address_id: i64,
        transaction_id: Option<i64>,
    ) -> Result<DerivedAddress, StoreError> {
        DerivedAddress::mark_used(&mut self.tx, address_id, transaction_id)
            .await?
            .ok_or_else(|| StoreError::not_found("derived address", address_id))
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        Ok(self.tx.commit().await?)
    }
}
