//! Xpub wallet lifecycle and receiving-address issuance.
//!
//! Every operation that touches a wallet's index runs inside an exclusive
//! [`XpubWalletSession`](crate::store::XpubWalletSession), so concurrent
//! callers never derive or hand out the same index twice.

use super::{child_path, derive, parse_xpub, supports_derivation, DeriveError};
use crate::entities::xpub_wallet::{DerivedAddress, DerivedAddressInsert, XpubWallet, XpubWalletInsert};
use crate::error::ErrorClass;
use crate::store::{PaymentStore, StoreError, XpubWalletSession};
use chainpay_sdk::objects::{Blockchain, ChainFamily};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum AddressBookError {
    #[error(transparent)]
    Derive(#[from] DeriveError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("merchant {merchant_id} has no active {blockchain} xpub wallet")]
    NoActiveWallet {
        merchant_id: i64,
        blockchain: Blockchain,
    },

    #[error("xpub wallet {0} has no derivable indices left")]
    IndexExhausted(i64),
}

impl AddressBookError {
    pub fn class(&self) -> ErrorClass {
        match self {
            AddressBookError::Derive(e) => e.class(),
            AddressBookError::Store(e) => e.class(),
            AddressBookError::NoActiveWallet { .. } => ErrorClass::NotFound,
            AddressBookError::IndexExhausted(_) => ErrorClass::DerivationFailed,
        }
    }
}

/// Default BIP-44 external chain prefix for a blockchain.
pub fn default_path_prefix(blockchain: Blockchain) -> &'static str {
    match blockchain.family() {
        ChainFamily::Utxo => "m/44'/0'/0'/0",
        ChainFamily::Tron => "m/44'/195'/0'/0",
        _ => "m/44'/60'/0'/0",
    }
}

#[derive(Clone)]
pub struct AddressBook {
    store: Arc<dyn PaymentStore>,
}

impl AddressBook {
    pub fn new(store: Arc<dyn PaymentStore>) -> Self {
        Self { store }
    }

    /// Register a merchant's extended public key on one chain.
    ///
    /// The key is parsed before anything is stored; a merchant holds at most
    /// one active wallet per chain.
    pub async fn register_xpub_wallet(
        &self,
        merchant_id: i64,
        blockchain: Blockchain,
        xpub: &str,
        derivation_path: Option<&str>,
    ) -> Result<XpubWallet, AddressBookError> {
        if !supports_derivation(blockchain) {
            return Err(DeriveError::Unsupported(blockchain).into());
        }
        parse_xpub(xpub)?;

        let wallet = self
            .store
            .create_xpub_wallet(XpubWalletInsert {
                merchant_id,
                blockchain: blockchain.into(),
                xpub: xpub.trim().to_owned(),
                derivation_path: derivation_path
                    .unwrap_or_else(|| default_path_prefix(blockchain))
                    .to_owned(),
            })
            .await?;
        info!(
            merchant_id,
            xpub_wallet_id = wallet.id,
            %blockchain,
            "Registered xpub wallet"
        );
        Ok(wallet)
    }

    pub async fn deactivate_xpub_wallet(&self, wallet_id: i64) -> Result<bool, AddressBookError> {
        let deactivated = self.store.deactivate_xpub_wallet(wallet_id).await?;
        if deactivated {
            info!(xpub_wallet_id = wallet_id, "Deactivated xpub wallet");
        }
        Ok(deactivated)
    }

    /// Derive the address after the wallet's last derived index, whether or
    /// not earlier addresses are still unused.
    pub async fn derive_address(&self, wallet_id: i64) -> Result<DerivedAddress, AddressBookError> {
        let mut session = self.store.lock_xpub_wallet(wallet_id).await?;
        let address = derive_next(session.as_mut()).await?;
        session.commit().await?;
        Ok(address)
    }

    /// Lowest-index unused address, deriving a fresh one when every derived
    /// address is already used.
    ///
    /// The address is not claimed: concurrent callers see the same one until
    /// it is marked used. [`Self::assign_next_unused_address`] claims it.
    pub async fn get_next_unused_address(
        &self,
        wallet_id: i64,
    ) -> Result<DerivedAddress, AddressBookError> {
        let mut session = self.store.lock_xpub_wallet(wallet_id).await?;
        let address = next_unused(session.as_mut()).await?;
        session.commit().await?;
        Ok(address)
    }

    /// Like [`Self::get_next_unused_address`], for the merchant's active
    /// wallet on `blockchain`.
    pub async fn next_unused_for_merchant(
        &self,
        merchant_id: i64,
        blockchain: Blockchain,
    ) -> Result<DerivedAddress, AddressBookError> {
        let wallet = self
            .store
            .active_xpub_wallet(merchant_id, blockchain)
            .await?
            .ok_or(AddressBookError::NoActiveWallet {
                merchant_id,
                blockchain,
            })?;
        self.get_next_unused_address(wallet.id).await
    }

    /// Claim the next unused address for a payment. Selection and marking
    /// happen under the same wallet lock.
    pub async fn assign_next_unused_address(
        &self,
        wallet_id: i64,
        transaction_id: Option<i64>,
    ) -> Result<DerivedAddress, AddressBookError> {
        let mut session = self.store.lock_xpub_wallet(wallet_id).await?;
        let address = next_unused(session.as_mut()).await?;
        let address = session.mark_used(address.id, transaction_id).await?;
        session.commit().await?;
        info!(
            xpub_wallet_id = wallet_id,
            derivation_index = address.derivation_index,
            transaction_id,
            "Assigned receiving address"
        );
        Ok(address)
    }

    pub async fn mark_address_used(
        &self,
        wallet_id: i64,
        address_id: i64,
        transaction_id: Option<i64>,
    ) -> Result<DerivedAddress, AddressBookError> {
        let mut session = self.store.lock_xpub_wallet(wallet_id).await?;
        let address = session.mark_used(address_id, transaction_id).await?;
        session.commit().await?;
        Ok(address)
    }
}

async fn next_unused(
    session: &mut dyn XpubWalletSession,
) -> Result<DerivedAddress, AddressBookError> {
    match session.lowest_unused_address().await? {
        Some(address) => Ok(address),
        None => derive_next(session).await,
    }
}

async fn derive_next(
    session: &mut dyn XpubWalletSession,
) -> Result<DerivedAddress, AddressBookError> {
    let wallet_id = session.wallet().id;
    if session.wallet().last_derived_index == i32::MAX {
        return Err(AddressBookError::IndexExhausted(wallet_id));
    }
    let index = session.advance_index().await?;
    let index = u32::try_from(index).map_err(|_| AddressBookError::IndexExhausted(wallet_id))?;

    let wallet = session.wallet();
    let blockchain = Blockchain::from(wallet.blockchain);
    let key = derive(&wallet.xpub, blockchain, index)?;
    let insert = DerivedAddressInsert {
        xpub_wallet_id: wallet.id,
        merchant_id: wallet.merchant_id,
        blockchain: wallet.blockchain,
        address: key.address,
        derivation_path: child_path(&wallet.derivation_path, index),
        derivation_index: wallet.last_derived_index,
        public_key: Some(key.public_key),
    };
    let address = session.insert_address(insert).await?;
    info!(
        xpub_wallet_id = wallet_id,
        derivation_index = address.derivation_index,
        address = %address.address,
        "Derived receiving address"
    );
    Ok(address)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derivation::tests::XPUB;
    use crate::store::MemoryStore;
    use std::collections::HashSet;

    async fn book_with_wallet(blockchain: Blockchain) -> (AddressBook, MemoryStore, XpubWallet) {
        let store = MemoryStore::new();
        let book = AddressBook::new(Arc::new(store.clone()));
        let wallet = book
            .register_xpub_wallet(1, blockchain, XPUB, None)
            .await
            .unwrap();
        (book, store, wallet)
    }

    #[tokio::test]
    async fn test_first_address_uses_index_zero() {
        let (book, _, wallet) = book_with_wallet(Blockchain::Eth).await;
        assert_eq!(wallet.last_derived_index, -1);
        assert_eq!(wallet.derivation_path, "m/44'/60'/0'/0");

        let address = book.derive_address(wallet.id).await.unwrap();
        assert_eq!(address.derivation_index, 0);
        assert_eq!(address.address, "0x91860ef4Fc12f4dCa2564A3f7fcceA9325831aC6");
        assert_eq!(address.derivation_path, "m/44'/60'/0'/0/0");
        assert!(!address.is_used);
    }

    #[tokio::test]
    async fn test_next_unused_is_stable_until_claimed() {
        let (book, _, wallet) = book_with_wallet(Blockchain::Tron).await;

        let first = book.get_next_unused_address(wallet.id).await.unwrap();
        let again = book.get_next_unused_address(wallet.id).await.unwrap();
        assert_eq!(first.id, again.id);
        assert_eq!(first.address, "TPEfaR9SuTzhzpwCQZDTDRmZNkKunjb92m");

        let claimed = book
            .assign_next_unused_address(wallet.id, Some(42))
            .await
            .unwrap();
        assert_eq!(claimed.id, first.id);
        assert!(claimed.is_used);
        assert_eq!(claimed.transaction_id, Some(42));

        let next = book.get_next_unused_address(wallet.id).await.unwrap();
        assert_eq!(next.derivation_index, 1);
    }

    #[tokio::test]
    async fn test_lowest_unused_index_wins() {
        let (book, _, wallet) = book_with_wallet(Blockchain::Btc).await;
        let zero = book.derive_address(wallet.id).await.unwrap();
        let one = book.derive_address(wallet.id).await.unwrap();
        book.derive_address(wallet.id).await.unwrap();

        book.mark_address_used(wallet.id, zero.id, None).await.unwrap();
        let next = book.get_next_unused_address(wallet.id).await.unwrap();
        assert_eq!(next.id, one.id);
        assert_eq!(next.address, "1JQheacLPdM5ySCkrZkV66G2ApAXe1mqLj");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_claims_get_distinct_indices() {
        let (book, store, wallet) = book_with_wallet(Blockchain::Eth).await;
        let wallet_id = wallet.id;
        let callers: usize = 16;

        let handles: Vec<_> = (0..callers)
            .map(|_| {
                let book = book.clone();
                tokio::spawn(async move { book.assign_next_unused_address(wallet_id, None).await })
            })
            .collect();

        let mut indices = HashSet::new();
        for handle in handles {
            let address = handle.await.unwrap().unwrap();
            assert!(indices.insert(address.derivation_index));
        }
        assert_eq!(indices.len(), callers);

        let stored = store.derived_addresses(wallet.id).await;
        assert_eq!(stored.len(), callers);
        let stored: HashSet<_> = stored.iter().map(|a| a.derivation_index).collect();
        assert_eq!(stored, (0..callers as i32).collect::<HashSet<_>>());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_derivations_store_distinct_indices() {
        let (book, store, wallet) = book_with_wallet(Blockchain::Eth).await;
        let wallet_id = wallet.id;
        let callers: usize = 16;

        let handles: Vec<_> = (0..callers)
            .map(|_| {
                let book = book.clone();
                tokio::spawn(async move { book.derive_address(wallet_id).await })
            })
            .collect();

        let mut returned = HashSet::new();
        for handle in handles {
            let address = handle.await.unwrap().unwrap();
            assert!(returned.insert(address.derivation_index));
        }

        let stored = store.derived_addresses(wallet.id).await;
        assert_eq!(stored.len(), callers);
        let indices: HashSet<_> = stored.iter().map(|a| a.derivation_index).collect();
        assert_eq!(indices, (0..callers as i32).collect::<HashSet<_>>());
        let addresses: HashSet<_> = stored.iter().map(|a| a.address.clone()).collect();
        assert_eq!(addresses.len(), callers);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_lookups_share_one_unused_address() {
        let (book, store, wallet) = book_with_wallet(Blockchain::Eth).await;
        let wallet_id = wallet.id;

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let book = book.clone();
                tokio::spawn(async move { book.get_next_unused_address(wallet_id).await })
            })
            .collect();

        let mut ids = HashSet::new();
        for handle in handles {
            let address = handle.await.unwrap().unwrap();
            assert_eq!(address.derivation_index, 0);
            assert!(!address.is_used);
            ids.insert(address.id);
        }
        assert_eq!(ids.len(), 1);
        assert_eq!(store.derived_addresses(wallet.id).await.len(), 1);
    }

    #[tokio::test]
    async fn test_registration_rules() {
        let store = MemoryStore::new();
        let book = AddressBook::new(Arc::new(store));

        let err = book
            .register_xpub_wallet(1, Blockchain::Sol, XPUB, None)
            .await
            .unwrap_err();
        assert_eq!(err.class(), ErrorClass::Validation);

        let err = book
            .register_xpub_wallet(1, Blockchain::Eth, "xpub-not-a-key", None)
            .await
            .unwrap_err();
        assert_eq!(err.class(), ErrorClass::DerivationFailed);

        let wallet = book
            .register_xpub_wallet(1, Blockchain::Eth, XPUB, Some("m/44'/60'/1'/0"))
            .await
            .unwrap();
        let err = book
            .register_xpub_wallet(1, Blockchain::Eth, XPUB, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AddressBookError::Store(StoreError::Conflict(_))));

        assert!(book.deactivate_xpub_wallet(wallet.id).await.unwrap());
        let err = book.derive_address(wallet.id).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::NotFound);

        let err = book
            .next_unused_for_merchant(1, Blockchain::Eth)
            .await
            .unwrap_err();
        assert!(matches!(err, AddressBookError::NoActiveWallet { .. }));
    }
}
