use super::{PaymentStore, StoreError, XpubWalletSession};
use crate::entities::collector::CollectorContract;
use crate::entities::hot_wallet::{CounterChange, HotWallet, NonceCounters};
use crate::entities::transaction::{PendingIncomingFilter, Transaction, TransactionInsert};
use crate::entities::xpub_wallet::{
    DerivedAddress, DerivedAddressInsert, XpubWallet, XpubWalletInsert,
};
use crate::entities::{now_utc, ChainName, TransactionStatus, TransactionType};
use async_trait::async_trait;
use chainpay_sdk::objects::Blockchain;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    next_id: i64,
    hot_wallets: Vec<HotWallet>,
    xpub_wallets: Vec<XpubWallet>,
    derived_addresses: Vec<DerivedAddress>,
    collectors: Vec<CollectorContract>,
    transactions: Vec<Transaction>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn hash_taken(&self, network_id: &str, hash: &str) -> bool {
        self.transactions
            .iter()
            .any(|tx| tx.network_id == network_id && tx.hash.as_deref() == Some(hash))
    }
}

/// In-process [`PaymentStore`].
///
/// Each operation runs under one table lock, which gives the same
/// single-row atomicity as the database. Xpub sessions serialize on a
/// per-wallet lock but apply their writes immediately; there is no rollback.
#[derive(Default, Clone)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    wallet_locks: Arc<Mutex<HashMap<i64, Arc<Mutex<()>>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_hot_wallet(
        &self,
        merchant_id: Option<i64>,
        blockchain: Blockchain,
        address: &str,
    ) -> HotWallet {
        let mut tables = self.tables.lock().await;
        let wallet = HotWallet {
            id: tables.next_id(),
            uuid: Uuid::now_v7(),
            merchant_id,
            blockchain: blockchain.into(),
            address: address.to_owned(),
            confirmed_mainnet_txs: 0,
            pending_mainnet_txs: 0,
            confirmed_testnet_txs: 0,
            pending_testnet_txs: 0,
            is_active: true,
            created_at: now_utc(),
        };
        tables.hot_wallets.push(wallet.clone());
        wallet
    }

    pub async fn add_collector(
        &self,
        merchant_id: i64,
        blockchain: Blockchain,
        chain_id: i64,
        contract_address: &str,
    ) -> CollectorContract {
        let mut tables = self.tables.lock().await;
        let collector = CollectorContract {
            id: tables.next_id(),
            uuid: Uuid::now_v7(),
            merchant_id,
            blockchain: blockchain.into(),
            chain_id,
            contract_address: contract_address.to_owned(),
            owner_address: String::new(),
            factory_address: String::new(),
            subscription_id: None,
            is_active: true,
            created_at: now_utc(),
        };
        tables.collectors.push(collector.clone());
        collector
    }

    pub async fn transactions(&self) -> Vec<Transaction> {
        self.tables.lock().await.transactions.clone()
    }

    pub async fn derived_addresses(&self, xpub_wallet_id: i64) -> Vec<DerivedAddress> {
        self.tables
            .lock()
            .await
            .derived_addresses
            .iter()
            .filter(|addr| addr.xpub_wallet_id == xpub_wallet_id)
            .cloned()
            .collect()
    }

    /// Point the external id of an existing wallet row at `uuid`.
    #[cfg(test)]
    pub(crate) async fn set_external_id(&self, wallet: crate::entities::WalletRef, uuid: Uuid) {
        use crate::entities::WalletRef;
        let mut tables = self.tables.lock().await;
        match wallet {
            WalletRef::Hot(id) => tables
                .hot_wallets
                .iter_mut()
                .filter(|w| w.id == id)
                .for_each(|w| w.uuid = uuid),
            WalletRef::XpubAddress(id) => tables
                .derived_addresses
                .iter_mut()
                .filter(|a| a.id == id)
                .for_each(|a| a.uuid = uuid),
            WalletRef::Collector(id) => tables
                .collectors
                .iter_mut()
                .filter(|c| c.id == id)
                .for_each(|c| c.uuid = uuid),
        }
    }

    async fn wallet_lock(&self, id: i64) -> Arc<Mutex<()>> {
        self.wallet_locks
            .lock()
            .await
            .entry(id)
            .or_default()
            .clone()
    }

    async fn update_transaction<F>(&self, id: i64, apply: F) -> Option<Transaction>
    where
        F: FnOnce(&mut Transaction) -> bool + Send,
    {
        let mut tables = self.tables.lock().await;
        let tx = tables.transactions.iter_mut().find(|tx| tx.id == id)?;
        if !apply(tx) {
            return None;
        }
        tx.updated_at = now_utc();
        Some(tx.clone())
    }
}

#[async_trait]
impl PaymentStore for MemoryStore {
    async fn hot_wallet_by_uuid(&self, uuid: Uuid) -> Result<Option<HotWallet>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .hot_wallets
            .iter()
            .find(|w| w.uuid == uuid && w.is_active)
            .cloned())
    }

    async fn hot_wallet(&self, id: i64) -> Result<Option<HotWallet>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.hot_wallets.iter().find(|w| w.id == id).cloned())
    }

    async fn derived_address_by_uuid(
        &self,
        uuid: Uuid,
    ) -> Result<Option<DerivedAddress>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .derived_addresses
            .iter()
            .find(|a| a.uuid == uuid)
            .cloned())
    }

    async fn collector_by_uuid(
        &self,
        uuid: Uuid,
    ) -> Result<Option<CollectorContract>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .collectors
            .iter()
            .find(|c| c.uuid == uuid && c.is_active)
            .cloned())
    }

    async fn create_xpub_wallet(&self, insert: XpubWalletInsert) -> Result<XpubWallet, StoreError> {
        let mut tables = self.tables.lock().await;
        let exists = tables.xpub_wallets.iter().any(|w| {
            w.is_active && w.merchant_id == insert.merchant_id && w.blockchain == insert.blockchain
        });
        if exists {
            return Err(StoreError::Conflict(format!(
                "merchant {} already has an active {} xpub wallet",
                insert.merchant_id,
                Blockchain::from(insert.blockchain)
            )));
        }
        let now = now_utc();
        let wallet = XpubWallet {
            id: tables.next_id(),
            uuid: Uuid::now_v7(),
            merchant_id: insert.merchant_id,
            blockchain: insert.blockchain,
            xpub: insert.xpub,
            derivation_path: insert.derivation_path,
            last_derived_index: -1,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        tables.xpub_wallets.push(wallet.clone());
        Ok(wallet)
    }

    async fn active_xpub_wallet(
        &self,
        merchant_id: i64,
        blockchain: Blockchain,
    ) -> Result<Option<XpubWallet>, StoreError> {
        let chain = ChainName::from(blockchain);
        let tables = self.tables.lock().await;
        Ok(tables
            .xpub_wallets
            .iter()
            .find(|w| w.is_active && w.merchant_id == merchant_id && w.blockchain == chain)
            .cloned())
    }

    async fn deactivate_xpub_wallet(&self, id: i64) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().await;
        match tables
            .xpub_wallets
            .iter_mut()
            .find(|w| w.id == id && w.is_active)
        {
            Some(wallet) => {
                wallet.is_active = false;
                wallet.updated_at = now_utc();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn lock_xpub_wallet(&self, id: i64) -> Result<Box<dyn XpubWalletSession>, StoreError> {
        let guard = self.wallet_lock(id).await.lock_owned().await;
        let wallet = {
            let tables = self.tables.lock().await;
            tables
                .xpub_wallets
                .iter()
                .find(|w| w.id == id && w.is_active)
                .cloned()
                .ok_or_else(|| StoreError::not_found("xpub wallet", id))?
        };
        Ok(Box::new(MemoryXpubSession {
            _guard: guard,
            tables: self.tables.clone(),
            wallet,
        }))
    }

    async fn transaction(&self, id: i64) -> Result<Option<Transaction>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.transactions.iter().find(|tx| tx.id == id).cloned())
    }

    async fn transaction_by_hash(
        &self,
        network_id: &str,
        hash: &str,
    ) -> Result<Option<Transaction>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .transactions
            .iter()
            .find(|tx| tx.network_id == network_id && tx.hash.as_deref() == Some(hash))
            .cloned())
    }

    async fn find_pending_incoming(
        &self,
        filter: PendingIncomingFilter,
    ) -> Result<Option<Transaction>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .transactions
            .iter()
            .filter(|tx| filter.matches(tx))
            .min_by_key(|tx| tx.id)
            .cloned())
    }

    async fn create_transaction(
        &self,
        insert: TransactionInsert,
    ) -> Result<Transaction, StoreError> {
        let mut tables = self.tables.lock().await;
        if let Some(hash) = &insert.hash
            && tables.hash_taken(&insert.network_id, hash)
        {
            return Err(StoreError::Conflict(
                "transaction hash already recorded".to_owned(),
            ));
        }
        let id = tables.next_id();
        let row = insert.into_row(id);
        tables.transactions.push(row.clone());
        Ok(row)
    }

    async fn create_transaction_if_absent(
        &self,
        insert: TransactionInsert,
    ) -> Result<Option<Transaction>, StoreError> {
        let mut tables = self.tables.lock().await;
        if let Some(hash) = &insert.hash
            && tables.hash_taken(&insert.network_id, hash)
        {
            return Ok(None);
        }
        let id = tables.next_id();
        let row = insert.into_row(id);
        tables.transactions.push(row.clone());
        Ok(Some(row))
    }

    async fn complete_pending_incoming(
        &self,
        id: i64,
        hash: &str,
        sender_address: Option<&str>,
    ) -> Result<Option<Transaction>, StoreError> {
        let mut tables = self.tables.lock().await;
        let Some(position) = tables.transactions.iter().position(|tx| {
            tx.id == id && tx.status == TransactionStatus::Pending && tx.hash.is_none()
        }) else {
            return Ok(None);
        };
        if tables.hash_taken(&tables.transactions[position].network_id, hash) {
            return Err(StoreError::Conflict(format!("hash {hash} already recorded")));
        }
        let tx = &mut tables.transactions[position];
        tx.status = TransactionStatus::Completed;
        tx.hash = Some(hash.to_owned());
        tx.sender_address = sender_address.map(str::to_owned);
        tx.updated_at = now_utc();
        Ok(Some(tx.clone()))
    }

    async fn attach_broadcast_hash(
        &self,
        id: i64,
        hash: &str,
    ) -> Result<Option<Transaction>, StoreError> {
        let hash = hash.to_owned();
        Ok(self
            .update_transaction(id, move |tx| {
                if tx.status != TransactionStatus::Pending || tx.hash.is_some() {
                    return false;
                }
                tx.status = TransactionStatus::InProgress;
                tx.hash = Some(hash);
                true
            })
            .await)
    }

    async fn finalize_transaction(
        &self,
        id: i64,
        status: TransactionStatus,
        network_fee: Option<Decimal>,
    ) -> Result<Option<Transaction>, StoreError> {
        Ok(self
            .update_transaction(id, move |tx| {
                if tx.status.is_terminal() {
                    return false;
                }
                tx.status = status;
                if network_fee.is_some() {
                    tx.network_fee = network_fee;
                }
                true
            })
            .await)
    }

    async fn in_progress_outgoing(&self, limit: i64) -> Result<Vec<Transaction>, StoreError> {
        let tables = self.tables.lock().await;
        let mut rows: Vec<Transaction> = tables
            .transactions
            .iter()
            .filter(|tx| {
                tx.tx_type == TransactionType::Outgoing
                    && matches!(
                        tx.status,
                        TransactionStatus::InProgress | TransactionStatus::InProgressInvalid
                    )
                    && tx.hash.is_some()
            })
            .cloned()
            .collect();
        rows.sort_by_key(|tx| tx.updated_at);
        rows.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(rows)
    }

    async fn update_nonce_counters(
        &self,
        wallet_id: i64,
        is_test: bool,
        change: CounterChange,
    ) -> Result<NonceCounters, StoreError> {
        let mut tables = self.tables.lock().await;
        let wallet = tables
            .hot_wallets
            .iter_mut()
            .find(|w| w.id == wallet_id)
            .ok_or_else(|| StoreError::not_found("hot wallet", wallet_id))?;
        let (pending, confirmed) = if is_test {
            (
                &mut wallet.pending_testnet_txs,
                &mut wallet.confirmed_testnet_txs,
            )
        } else {
            (
                &mut wallet.pending_mainnet_txs,
                &mut wallet.confirmed_mainnet_txs,
            )
        };
        match change {
            CounterChange::Reserve => *pending += 1,
            CounterChange::Release => *pending = (*pending - 1).max(0),
            CounterChange::Commit => {
                *pending = (*pending - 1).max(0);
                *confirmed += 1;
            }
        }
        Ok(wallet.counters(is_test))
    }
}

struct MemoryXpubSession {
    _guard: OwnedMutexGuard<()>,
    tables: Arc<Mutex<Tables>>,
    wallet: XpubWallet,
}

#[async_trait]
impl XpubWalletSession for MemoryXpubSession {
    fn wallet(&self) -> &XpubWallet {
        &self.wallet
    }

    async fn lowest_unused_address(&mut self) -> Result<Option<DerivedAddress>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .derived_addresses
            .iter()
            .filter(|a| a.xpub_wallet_id == self.wallet.id && !a.is_used)
            .min_by_key(|a| a.derivation_index)
            .cloned())
    }

    async fn advance_index(&mut self) -> Result<i32, StoreError> {
        let mut tables = self.tables.lock().await;
        let wallet = tables
            .xpub_wallets
            .iter_mut()
            .find(|w| w.id == self.wallet.id)
            .ok_or_else(|| StoreError::not_found("xpub wallet", self.wallet.id))?;
        wallet.last_derived_index += 1;
        wallet.updated_at = now_utc();
        self.wallet.last_derived_index = wallet.last_derived_index;
        Ok(wallet.last_derived_index)
    }

    async fn insert_address(
        &mut self,
        insert: DerivedAddressInsert,
    ) -> Result<DerivedAddress, StoreError> {
        let mut tables = self.tables.lock().await;
        let duplicate = tables.derived_addresses.iter().any(|a| {
            a.xpub_wallet_id == insert.xpub_wallet_id
                && a.derivation_index == insert.derivation_index
        });
        if duplicate {
            return Err(StoreError::Conflict(format!(
                "index {} already derived",
                insert.derivation_index
            )));
        }
        let address = DerivedAddress {
            id: tables.next_id(),
            uuid: Uuid::now_v7(),
            xpub_wallet_id: insert.xpub_wallet_id,
            merchant_id: insert.merchant_id,
            blockchain: insert.blockchain,
            address: insert.address,
            derivation_path: insert.derivation_path,
            derivation_index: insert.derivation_index,
            public_key: insert.public_key,
            is_used: false,
            transaction_id: None,
            created_at: now_utc(),
        };
        tables.derived_addresses.push(address.clone());
        Ok(address)
    }

    async fn mark_used(
        &mut self,
        address_id: i64,
        transaction_id: Option<i64>,
    ) -> Result<DerivedAddress, StoreError> {
        let mut tables = self.tables.lock().await;
        let address = tables
            .derived_addresses
            .iter_mut()
            .find(|a| a.id == address_id)
            .ok_or_else(|| StoreError::not_found("derived address", address_id))?;
        address.is_used = true;
        if transaction_id.is_some() {
            address.transaction_id = transaction_id;
        }
        Ok(address.clone())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}
