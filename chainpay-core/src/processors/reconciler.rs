//! Reconciliation of provider notifications against expected payments.
//!
//! One notification is handled at a time per call:
//!
//! 1. mempool sightings and fee-only events are skipped
//! 2. the target id resolves to a hot wallet, a derived address or a
//!    collector contract, tried in that order
//! 3. the asset resolves to a registered currency on the notification's
//!    network, and the amount is parsed in that currency's precision
//! 4. a transaction that already carries the chain hash makes the
//!    notification a duplicate
//! 5. a pending incoming transaction for the same wallet, address, network
//!    and currency is completed with the hash
//! 6. anything else is recorded as an unexpected, already-completed payment
//!
//! A 1 TRX native transfer is an account activation, not a payment, and
//! always takes the unexpected path.

use crate::currency::{AssetRef, CryptoCurrency, CurrencyError, CurrencyRegistry};
use crate::entities::collector::CollectorContract;
use crate::entities::hot_wallet::HotWallet;
use crate::entities::transaction::{PendingIncomingFilter, Transaction, TransactionInsert};
use crate::entities::xpub_wallet::DerivedAddress;
use crate::entities::{TransactionStatus, TransactionType, WalletRef};
use crate::error::ErrorClass;
use crate::events::{emit, PaymentEvent, PaymentEventSender};
use crate::money::{AmountError, CryptoAmount};
use crate::store::{PaymentStore, StoreError};
use chainpay_sdk::objects::{Blockchain, NotificationKind, ProviderWebhook, ProviderWebhookKind};
use rust_decimal::Decimal;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Why a notification was ignored without touching the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Mempool,
    FeeOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Skipped(SkipReason),
    /// A pending payment was completed.
    Matched { transaction_id: i64 },
    /// No pending payment matched; an unexpected payment was recorded.
    Unexpected { transaction_id: i64 },
    /// The chain hash is already recorded.
    Duplicate { transaction_id: Option<i64> },
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("no wallet, derived address or collector with id {0}")]
    UnresolvedTarget(Uuid),

    #[error(transparent)]
    Currency(#[from] CurrencyError),

    #[error("invalid amount: {0}")]
    Amount(#[from] AmountError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ReconcileError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ReconcileError::UnresolvedTarget(_) => ErrorClass::UnresolvedWebhookTarget,
            ReconcileError::Currency(e) => e.class(),
            ReconcileError::Amount(_) => ErrorClass::Validation,
            ReconcileError::Store(e) => e.class(),
        }
    }

    /// Only storage failures are worth a redelivery; everything else will
    /// fail the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ReconcileError::Store(e) if e.class() == ErrorClass::Storage)
    }
}

/// The entity a notification was addressed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookTarget {
    Hot(HotWallet),
    XpubAddress(DerivedAddress),
    Collector(CollectorContract),
}

impl WebhookTarget {
    pub fn wallet_ref(&self) -> WalletRef {
        match self {
            WebhookTarget::Hot(w) => WalletRef::Hot(w.id),
            WebhookTarget::XpubAddress(a) => WalletRef::XpubAddress(a.id),
            WebhookTarget::Collector(c) => WalletRef::Collector(c.id),
        }
    }

    /// Wallet a pending invoice must be filed under. Derived addresses and
    /// collectors are matched by address alone.
    fn pending_wallet(&self) -> Option<WalletRef> {
        match self {
            WebhookTarget::Hot(w) => Some(WalletRef::Hot(w.id)),
            WebhookTarget::XpubAddress(_) | WebhookTarget::Collector(_) => None,
        }
    }

    pub fn blockchain(&self) -> Blockchain {
        match self {
            WebhookTarget::Hot(w) => w.blockchain.into(),
            WebhookTarget::XpubAddress(a) => a.blockchain.into(),
            WebhookTarget::Collector(c) => c.blockchain.into(),
        }
    }

    pub fn address(&self) -> &str {
        match self {
            WebhookTarget::Hot(w) => &w.address,
            WebhookTarget::XpubAddress(a) => &a.address,
            WebhookTarget::Collector(c) => &c.contract_address,
        }
    }

    pub fn merchant_id(&self) -> Option<i64> {
        match self {
            WebhookTarget::Hot(w) => w.merchant_id,
            WebhookTarget::XpubAddress(a) => Some(a.merchant_id),
            WebhookTarget::Collector(c) => Some(c.merchant_id),
        }
    }

    /// Network id to reconcile on, given the one from the delivery route.
    pub fn network_id(&self, routed: &str) -> String {
        match self {
            WebhookTarget::Collector(c) => c.effective_network_id(routed),
            _ => routed.to_owned(),
        }
    }
}

/// Amount of a native TRX transfer that only activates an account.
fn is_tron_activation(currency: &CryptoCurrency, amount: &CryptoAmount) -> bool {
    currency.blockchain == Blockchain::Tron && currency.is_coin() && amount.to_decimal() == Decimal::ONE
}

#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn PaymentStore>,
    currencies: Arc<CurrencyRegistry>,
    events: PaymentEventSender,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn PaymentStore>,
        currencies: Arc<CurrencyRegistry>,
        events: PaymentEventSender,
    ) -> Self {
        Self {
            store,
            currencies,
            events,
        }
    }

    /// Find the entity behind `target`, trying each wallet kind in order.
    pub async fn resolve_target(&self, target: Uuid) -> Result<Option<WebhookTarget>, StoreError> {
        if let Some(wallet) = self.store.hot_wallet_by_uuid(target).await? {
            return Ok(Some(WebhookTarget::Hot(wallet)));
        }
        if let Some(address) = self.store.derived_address_by_uuid(target).await? {
            return Ok(Some(WebhookTarget::XpubAddress(address)));
        }
        if let Some(collector) = self.store.collector_by_uuid(target).await? {
            return Ok(Some(WebhookTarget::Collector(collector)));
        }
        Ok(None)
    }

    /// Apply one provider notification. The payload must already be
    /// authenticated.
    #[tracing::instrument(skip_all, err, fields(target = %target, network_id, tx_id = %webhook.tx_id))]
    pub async fn process_incoming_webhook(
        &self,
        target: Uuid,
        network_id: &str,
        webhook: &ProviderWebhook,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        if webhook.mempool {
            debug!("Skipping mempool sighting");
            return Ok(ReconcileOutcome::Skipped(SkipReason::Mempool));
        }
        if webhook.webhook_kind() == ProviderWebhookKind::Fee {
            debug!("Skipping fee event");
            return Ok(ReconcileOutcome::Skipped(SkipReason::FeeOnly));
        }

        let Some(resolved) = self.resolve_target(target).await? else {
            warn!(
                target = %target,
                network_id,
                address = %webhook.address,
                asset = %webhook.asset,
                "Webhook target not found"
            );
            return Err(ReconcileError::UnresolvedTarget(target));
        };

        let blockchain = resolved.blockchain();
        let network_id = resolved.network_id(network_id);
        let asset = if webhook.is_native() {
            AssetRef::Native
        } else {
            AssetRef::Token(&webhook.asset)
        };
        let currency = self
            .currencies
            .resolve(blockchain, &network_id, asset)
            .inspect_err(|e| {
                warn!(
                    blockchain = %blockchain,
                    network_id = %network_id,
                    asset = %webhook.asset,
                    kind = %webhook.kind,
                    error = %e,
                    "Failed to resolve webhook currency"
                )
            })?;
        let is_test = currency.network_kind(&network_id) == Some(true);
        let amount = currency.parse_amount(&webhook.amount).inspect_err(|e| {
            warn!(amount = %webhook.amount, currency = %currency.ticker, error = %e, "Invalid webhook amount")
        })?;

        if let Some(existing) = self
            .store
            .transaction_by_hash(&network_id, &webhook.tx_id)
            .await?
        {
            info!(transaction_id = existing.id, "Duplicate notification");
            return Ok(ReconcileOutcome::Duplicate {
                transaction_id: Some(existing.id),
            });
        }

        if is_tron_activation(currency, &amount) {
            info!(address = %resolved.address(), "TRX activation transfer");
        } else if let Some(outcome) = self
            .complete_expected(&resolved, &network_id, currency, webhook)
            .await?
        {
            return Ok(outcome);
        }

        self.record_unexpected(&resolved, network_id, currency, amount, is_test, webhook)
            .await
    }

    /// Complete the pending payment this notification settles, if any.
    async fn complete_expected(
        &self,
        target: &WebhookTarget,
        network_id: &str,
        currency: &CryptoCurrency,
        webhook: &ProviderWebhook,
    ) -> Result<Option<ReconcileOutcome>, ReconcileError> {
        let filter = PendingIncomingFilter {
            wallet: target.pending_wallet(),
            recipient_address: target.address().to_owned(),
            network_id: network_id.to_owned(),
            currency: currency.ticker.to_string(),
        };
        let Some(pending) = self.store.find_pending_incoming(filter).await? else {
            return Ok(None);
        };

        let completed = match self
            .store
            .complete_pending_incoming(pending.id, &webhook.tx_id, webhook.sender.as_deref())
            .await
        {
            Ok(completed) => completed,
            Err(StoreError::Conflict(_)) => {
                // a concurrent delivery recorded the hash first
                return Ok(Some(ReconcileOutcome::Duplicate {
                    transaction_id: None,
                }));
            }
            Err(e) => return Err(e.into()),
        };

        match completed {
            Some(transaction) => {
                info!(
                    transaction_id = transaction.id,
                    currency = %transaction.currency,
                    "Pending payment completed"
                );
                self.notify(&transaction, NotificationKind::PaymentReceived);
                Ok(Some(ReconcileOutcome::Matched {
                    transaction_id: transaction.id,
                }))
            }
            None => {
                // lost the race for this row; the hash may be ours already
                match self
                    .store
                    .transaction_by_hash(network_id, &webhook.tx_id)
                    .await?
                {
                    Some(existing) => Ok(Some(ReconcileOutcome::Duplicate {
                        transaction_id: Some(existing.id),
                    })),
                    None => Ok(None),
                }
            }
        }
    }

    async fn record_unexpected(
        &self,
        target: &WebhookTarget,
        network_id: String,
        currency: &CryptoCurrency,
        amount: CryptoAmount,
        is_test: bool,
        webhook: &ProviderWebhook,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let insert = TransactionInsert {
            merchant_id: target.merchant_id(),
            tx_type: TransactionType::Incoming,
            status: TransactionStatus::Completed,
            blockchain: currency.blockchain.into(),
            network_id,
            currency: currency.ticker.to_string(),
            amount: amount.units(),
            sender_address: webhook.sender.clone(),
            recipient_address: target.address().to_owned(),
            hash: Some(webhook.tx_id.clone()),
            wallet: Some(target.wallet_ref()),
            is_test,
            is_unexpected: true,
        };
        match self.store.create_transaction_if_absent(insert).await? {
            Some(transaction) => {
                info!(
                    transaction_id = transaction.id,
                    amount = %amount,
                    "Recorded unexpected payment"
                );
                self.notify(&transaction, NotificationKind::UnexpectedPaymentReceived);
                Ok(ReconcileOutcome::Unexpected {
                    transaction_id: transaction.id,
                })
            }
            None => {
                info!("Duplicate notification");
                Ok(ReconcileOutcome::Duplicate {
                    transaction_id: None,
                })
            }
        }
    }

    fn notify(&self, transaction: &Transaction, kind: NotificationKind) {
        emit(
            &self.events,
            PaymentEvent {
                transaction_id: transaction.id,
                kind,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derivation::tests::XPUB;
    use crate::derivation::AddressBook;
    use crate::events::{payment_event_channel, PaymentEventReceiver};
    use crate::store::MemoryStore;
    use std::str::FromStr;

    const HOT_ADDRESS: &str = "0x91860ef4Fc12f4dCa2564A3f7fcceA9325831aC6";

    fn webhook(tx_id: &str, kind: &str, asset: &str, amount: &str) -> ProviderWebhook {
        ProviderWebhook {
            subscription_type: "ADDRESS_TRANSACTION".to_owned(),
            tx_id: tx_id.to_owned(),
            address: HOT_ADDRESS.to_owned(),
            sender: Some("0x29379f45f515c494483298225d1b347f73d1babf".to_owned()),
            asset: asset.to_owned(),
            amount: amount.to_owned(),
            block_number: Some(17_000_000),
            kind: kind.to_owned(),
            mempool: false,
            chain: "ethereum-mainnet".to_owned(),
        }
    }

    fn usdt_payment(tx_id: &str) -> ProviderWebhook {
        webhook(
            tx_id,
            "token",
            "0xdAC17F958D2ee523a2206206994597C13D831ec7",
            "12.50",
        )
    }

    fn reconciler(store: &MemoryStore) -> (Reconciler, PaymentEventReceiver) {
        let (tx, rx) = payment_event_channel();
        let reconciler = Reconciler::new(
            Arc::new(store.clone()),
            Arc::new(CurrencyRegistry::builtin()),
            tx,
        );
        (reconciler, rx)
    }

    /// A pending invoice filed only under its receiving address.
    async fn expect_at_address(
        store: &MemoryStore,
        blockchain: Blockchain,
        network_id: &str,
        address: &str,
        currency: &str,
        amount: i64,
    ) -> Transaction {
        store
            .create_transaction(TransactionInsert {
                merchant_id: Some(9),
                tx_type: TransactionType::Incoming,
                status: TransactionStatus::Pending,
                blockchain: blockchain.into(),
                network_id: network_id.to_owned(),
                currency: currency.to_owned(),
                amount: Decimal::from(amount),
                sender_address: None,
                recipient_address: address.to_owned(),
                hash: None,
                wallet: None,
                is_test: false,
                is_unexpected: false,
            })
            .await
            .unwrap()
    }

    async fn expect_payment(store: &MemoryStore, wallet: &HotWallet, currency: &str) -> Transaction {
        store
            .create_transaction(TransactionInsert {
                merchant_id: wallet.merchant_id,
                tx_type: TransactionType::Incoming,
                status: TransactionStatus::Pending,
                blockchain: wallet.blockchain,
                network_id: "1".to_owned(),
                currency: currency.to_owned(),
                amount: Decimal::from(12_500_000),
                sender_address: None,
                recipient_address: wallet.address.clone(),
                hash: None,
                wallet: Some(WalletRef::Hot(wallet.id)),
                is_test: false,
                is_unexpected: false,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_pending_payment_is_completed() {
        let store = MemoryStore::new();
        let wallet = store.add_hot_wallet(Some(7), Blockchain::Eth, HOT_ADDRESS).await;
        let pending = expect_payment(&store, &wallet, "ETH_USDT").await;
        let (reconciler, mut events) = reconciler(&store);

        let outcome = reconciler
            .process_incoming_webhook(wallet.uuid, "1", &usdt_payment("0xaaa"))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ReconcileOutcome::Matched {
                transaction_id: pending.id
            }
        );

        let stored = store.transaction(pending.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TransactionStatus::Completed);
        assert_eq!(stored.hash.as_deref(), Some("0xaaa"));
        assert_eq!(
            stored.sender_address.as_deref(),
            Some("0x29379f45f515c494483298225d1b347f73d1babf")
        );
        assert!(!stored.is_unexpected);

        let event = events.try_recv().unwrap();
        assert_eq!(event.transaction_id, pending.id);
        assert_eq!(event.kind, NotificationKind::PaymentReceived);
    }

    #[tokio::test]
    async fn test_redelivery_is_idempotent() {
        let store = MemoryStore::new();
        let wallet = store.add_hot_wallet(Some(7), Blockchain::Eth, HOT_ADDRESS).await;
        let first = expect_payment(&store, &wallet, "ETH_USDT").await;
        let second = expect_payment(&store, &wallet, "ETH_USDT").await;
        let (reconciler, _events) = reconciler(&store);

        let payment = usdt_payment("0xaaa");
        reconciler
            .process_incoming_webhook(wallet.uuid, "1", &payment)
            .await
            .unwrap();
        let again = reconciler
            .process_incoming_webhook(wallet.uuid, "1", &payment)
            .await
            .unwrap();
        assert!(matches!(again, ReconcileOutcome::Duplicate { .. }));

        let completed: Vec<_> = store
            .transactions()
            .await
            .into_iter()
            .filter(|tx| tx.status == TransactionStatus::Completed)
            .collect();
        assert_eq!(completed.len(), 1);
        // the second invoice stays open
        let untouched = store.transaction(second.id).await.unwrap().unwrap();
        assert_eq!(untouched.status, TransactionStatus::Pending);
        assert_ne!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_unmatched_payment_is_unexpected() {
        let store = MemoryStore::new();
        let wallet = store.add_hot_wallet(Some(7), Blockchain::Eth, HOT_ADDRESS).await;
        let (reconciler, mut events) = reconciler(&store);

        let outcome = reconciler
            .process_incoming_webhook(wallet.uuid, "1", &webhook("0xbbb", "native", "ETH", "0.5"))
            .await
            .unwrap();
        let ReconcileOutcome::Unexpected { transaction_id } = outcome else {
            panic!("unexpected outcome {outcome:?}");
        };
        let stored = store.transaction(transaction_id).await.unwrap().unwrap();
        assert!(stored.is_unexpected);
        assert_eq!(stored.status, TransactionStatus::Completed);
        assert_eq!(stored.currency, "ETH");
        assert_eq!(stored.amount, Decimal::from_str("500000000000000000").unwrap());
        assert_eq!(stored.wallet(), Some(WalletRef::Hot(wallet.id)));
        assert_eq!(
            events.try_recv().unwrap().kind,
            NotificationKind::UnexpectedPaymentReceived
        );

        // a second delivery creates nothing
        let again = reconciler
            .process_incoming_webhook(wallet.uuid, "1", &webhook("0xbbb", "native", "ETH", "0.5"))
            .await
            .unwrap();
        assert_eq!(
            again,
            ReconcileOutcome::Duplicate {
                transaction_id: Some(transaction_id)
            }
        );
        assert_eq!(store.transactions().await.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_target() {
        let store = MemoryStore::new();
        let (reconciler, _events) = reconciler(&store);
        let err = reconciler
            .process_incoming_webhook(Uuid::now_v7(), "1", &usdt_payment("0xccc"))
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::UnresolvedTarget(_)));
        assert_eq!(err.class(), ErrorClass::UnresolvedWebhookTarget);
        assert!(!err.is_retryable());
        assert!(store.transactions().await.is_empty());
    }

    #[tokio::test]
    async fn test_foreign_network_is_rejected() {
        let store = MemoryStore::new();
        let wallet = store.add_hot_wallet(Some(7), Blockchain::Eth, HOT_ADDRESS).await;
        expect_payment(&store, &wallet, "ETH_USDT").await;
        let (reconciler, _events) = reconciler(&store);

        let err = reconciler
            .process_incoming_webhook(wallet.uuid, "999", &usdt_payment("0xddd"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::Currency(CurrencyError::UnknownNetwork { .. })
        ));
        assert_eq!(err.class(), ErrorClass::Validation);
        assert_eq!(store.transactions().await.len(), 1);
    }

    #[tokio::test]
    async fn test_mempool_and_fee_events_are_skipped() {
        let store = MemoryStore::new();
        let (reconciler, _events) = reconciler(&store);

        let mut sighting = usdt_payment("0xeee");
        sighting.mempool = true;
        assert_eq!(
            reconciler
                .process_incoming_webhook(Uuid::now_v7(), "1", &sighting)
                .await
                .unwrap(),
            ReconcileOutcome::Skipped(SkipReason::Mempool)
        );

        let fee = webhook("0xfff", "fee", "ETH", "0.001");
        assert_eq!(
            reconciler
                .process_incoming_webhook(Uuid::now_v7(), "1", &fee)
                .await
                .unwrap(),
            ReconcileOutcome::Skipped(SkipReason::FeeOnly)
        );
    }

    #[tokio::test]
    async fn test_tron_activation_never_matches() {
        let store = MemoryStore::new();
        let address = "TPEfaR9ZGcjxBgQ3YBstKNgQEBrT6QJsPB";
        let wallet = store.add_hot_wallet(Some(7), Blockchain::Tron, address).await;
        let pending = store
            .create_transaction(TransactionInsert {
                merchant_id: Some(7),
                tx_type: TransactionType::Incoming,
                status: TransactionStatus::Pending,
                blockchain: Blockchain::Tron.into(),
                network_id: "mainnet".to_owned(),
                currency: "TRON".to_owned(),
                amount: Decimal::from(1_000_000),
                sender_address: None,
                recipient_address: address.to_owned(),
                hash: None,
                wallet: Some(WalletRef::Hot(wallet.id)),
                is_test: false,
                is_unexpected: false,
            })
            .await
            .unwrap();
        let (reconciler, _events) = reconciler(&store);

        let mut activation = webhook("trx-1", "native", "TRON", "1");
        activation.address = address.to_owned();
        let outcome = reconciler
            .process_incoming_webhook(wallet.uuid, "mainnet", &activation)
            .await
            .unwrap();
        assert!(matches!(outcome, ReconcileOutcome::Unexpected { .. }));
        let still_pending = store.transaction(pending.id).await.unwrap().unwrap();
        assert_eq!(still_pending.status, TransactionStatus::Pending);
    }

    #[tokio::test]
    async fn test_collector_uses_stored_chain_id() {
        let store = MemoryStore::new();
        let collector = store
            .add_collector(9, Blockchain::Matic, 137, "0x2222222222222222222222222222222222222222")
            .await;
        let (reconciler, _events) = reconciler(&store);

        let mut payment = webhook("0x123", "native", "MATIC", "3");
        payment.address = collector.contract_address.clone();
        let outcome = reconciler
            .process_incoming_webhook(collector.uuid, "polygon-mainnet", &payment)
            .await
            .unwrap();
        let ReconcileOutcome::Unexpected { transaction_id } = outcome else {
            panic!("unexpected outcome {outcome:?}");
        };
        let stored = store.transaction(transaction_id).await.unwrap().unwrap();
        assert_eq!(stored.network_id, "137");
        assert_eq!(stored.merchant_id, Some(9));
        assert_eq!(stored.wallet(), Some(WalletRef::Collector(collector.id)));
    }

    #[tokio::test]
    async fn test_derived_address_payment_is_matched() {
        let store = MemoryStore::new();
        let book = AddressBook::new(Arc::new(store.clone()));
        let xpub_wallet = book
            .register_xpub_wallet(9, Blockchain::Eth, XPUB, None)
            .await
            .unwrap();
        let address = book.derive_address(xpub_wallet.id).await.unwrap();
        let pending = expect_at_address(
            &store,
            Blockchain::Eth,
            "1",
            &address.address,
            "ETH_USDT",
            12_500_000,
        )
        .await;
        let (reconciler, mut events) = reconciler(&store);

        let mut payment = usdt_payment("0x777");
        payment.address = address.address.clone();
        let outcome = reconciler
            .process_incoming_webhook(address.uuid, "1", &payment)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ReconcileOutcome::Matched {
                transaction_id: pending.id
            }
        );
        let stored = store.transaction(pending.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TransactionStatus::Completed);
        assert_eq!(stored.hash.as_deref(), Some("0x777"));
        assert_eq!(events.try_recv().unwrap().kind, NotificationKind::PaymentReceived);
    }

    #[tokio::test]
    async fn test_derived_address_ignores_invoices_at_other_addresses() {
        let store = MemoryStore::new();
        let book = AddressBook::new(Arc::new(store.clone()));
        let xpub_wallet = book
            .register_xpub_wallet(9, Blockchain::Eth, XPUB, None)
            .await
            .unwrap();
        let first = book.derive_address(xpub_wallet.id).await.unwrap();
        let second = book.derive_address(xpub_wallet.id).await.unwrap();
        let pending =
            expect_at_address(&store, Blockchain::Eth, "1", &second.address, "ETH_USDT", 1).await;
        let (reconciler, _events) = reconciler(&store);

        let mut payment = usdt_payment("0x778");
        payment.address = first.address.clone();
        let outcome = reconciler
            .process_incoming_webhook(first.uuid, "1", &payment)
            .await
            .unwrap();
        assert!(matches!(outcome, ReconcileOutcome::Unexpected { .. }));
        let untouched = store.transaction(pending.id).await.unwrap().unwrap();
        assert_eq!(untouched.status, TransactionStatus::Pending);
    }

    #[tokio::test]
    async fn test_collector_payment_is_matched() {
        let store = MemoryStore::new();
        let contract = "0x2222222222222222222222222222222222222222";
        let collector = store.add_collector(9, Blockchain::Matic, 137, contract).await;
        let pending = expect_at_address(
            &store,
            Blockchain::Matic,
            "137",
            contract,
            "MATIC",
            3_000_000_000_000_000_000,
        )
        .await;
        let (reconciler, _events) = reconciler(&store);

        let mut payment = webhook("0x456", "native", "MATIC", "3");
        payment.address = contract.to_owned();
        let outcome = reconciler
            .process_incoming_webhook(collector.uuid, "polygon-mainnet", &payment)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ReconcileOutcome::Matched {
                transaction_id: pending.id
            }
        );
        let stored = store.transaction(pending.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TransactionStatus::Completed);
        assert_eq!(stored.network_id, "137");
    }

    #[tokio::test]
    async fn test_targets_resolve_hot_then_derived_then_collector() {
        let store = MemoryStore::new();
        let book = AddressBook::new(Arc::new(store.clone()));
        let hot = store.add_hot_wallet(Some(9), Blockchain::Eth, HOT_ADDRESS).await;
        let xpub_wallet = book
            .register_xpub_wallet(9, Blockchain::Eth, XPUB, None)
            .await
            .unwrap();
        let derived = book.derive_address(xpub_wallet.id).await.unwrap();
        let collector = store
            .add_collector(9, Blockchain::Eth, 1, "0x2222222222222222222222222222222222222222")
            .await;
        let (reconciler, _events) = reconciler(&store);

        let shared = Uuid::now_v7();
        store.set_external_id(WalletRef::Hot(hot.id), shared).await;
        store.set_external_id(WalletRef::XpubAddress(derived.id), shared).await;
        store.set_external_id(WalletRef::Collector(collector.id), shared).await;
        let target = reconciler.resolve_target(shared).await.unwrap().unwrap();
        assert_eq!(target.wallet_ref(), WalletRef::Hot(hot.id));

        let shared = Uuid::now_v7();
        store.set_external_id(WalletRef::XpubAddress(derived.id), shared).await;
        store.set_external_id(WalletRef::Collector(collector.id), shared).await;
        let target = reconciler.resolve_target(shared).await.unwrap().unwrap();
        assert_eq!(target.wallet_ref(), WalletRef::XpubAddress(derived.id));

        let target = reconciler
            .resolve_target(Uuid::now_v7())
            .await
            .unwrap();
        assert!(target.is_none());

        let shared = Uuid::now_v7();
        store.set_external_id(WalletRef::Collector(collector.id), shared).await;
        let target = reconciler.resolve_target(shared).await.unwrap().unwrap();
        assert_eq!(target.wallet_ref(), WalletRef::Collector(collector.id));
    }

    #[tokio::test]
    async fn test_testnet_contract_on_mainnet_is_rejected() {
        let store = MemoryStore::new();
        let wallet = store.add_hot_wallet(Some(7), Blockchain::Eth, HOT_ADDRESS).await;
        expect_payment(&store, &wallet, "ETH_USDT").await;
        let (reconciler, _events) = reconciler(&store);

        let goerli = webhook(
            "0x999",
            "token",
            "0xC2C527C0CACF457746Bd31B2a698Fe89de2b6d49",
            "12.50",
        );
        let err = reconciler
            .process_incoming_webhook(wallet.uuid, "1", &goerli)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::Currency(CurrencyError::NotFound { .. })
        ));
        let transactions = store.transactions().await;
        assert_eq!(transactions.len(), 1);
        assert_eq!(transactions[0].status, TransactionStatus::Pending);
    }

    #[tokio::test]
    async fn test_malformed_amount() {
        let store = MemoryStore::new();
        let wallet = store.add_hot_wallet(Some(7), Blockchain::Eth, HOT_ADDRESS).await;
        let (reconciler, _events) = reconciler(&store);
        let err = reconciler
            .process_incoming_webhook(wallet.uuid, "1", &webhook("0x1", "token", "USDT", "1.0000001"))
            .await
            .unwrap_err();
        assert_eq!(err.class(), ErrorClass::Validation);
    }
}
