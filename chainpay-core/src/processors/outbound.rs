//! Outbound transfers from hot wallets.
//!
//! A payout reserves a nonce slot on the sending wallet before anything is
//! signed. The slot is released again if signing or broadcasting fails, and
//! committed by the [`ConfirmationWatcher`](super::ConfirmationWatcher)
//! once the transfer lands on chain.

use crate::broadcast::{BroadcastEngine, BroadcastError};
use crate::collaborators::{SignedPayload, SignerError, SigningIntent, TransactionSigner};
use crate::currency::{CryptoCurrency, CurrencyError, CurrencyRegistry};
use crate::derivation::validate_address;
use crate::entities::hot_wallet::{CounterChange, HotWallet};
use crate::entities::transaction::{Transaction, TransactionInsert};
use crate::entities::{TransactionStatus, TransactionType, WalletRef};
use crate::error::ErrorClass;
use crate::fees::{FeeDetails, FeeEngine, FeeError};
use crate::money::{AmountError, CryptoAmount};
use crate::store::{PaymentStore, StoreError};
use chainpay_sdk::objects::Blockchain;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum OutboundError {
    #[error("hot wallet {0} not found")]
    WalletNotFound(i64),

    #[error("hot wallet {0} is inactive")]
    InactiveWallet(i64),

    #[error("{currency} cannot be sent from a {blockchain} wallet")]
    ChainMismatch {
        currency: String,
        blockchain: Blockchain,
    },

    #[error("invalid {blockchain} address {address:?}")]
    InvalidAddress {
        blockchain: Blockchain,
        address: String,
    },

    #[error("amount must be positive")]
    ZeroAmount,

    #[error(transparent)]
    Currency(#[from] CurrencyError),

    #[error("invalid amount: {0}")]
    Amount(#[from] AmountError),

    #[error(transparent)]
    Fee(#[from] FeeError),

    #[error(transparent)]
    Signer(#[from] SignerError),

    #[error(transparent)]
    Broadcast(#[from] BroadcastError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl OutboundError {
    pub fn class(&self) -> ErrorClass {
        match self {
            OutboundError::WalletNotFound(_) => ErrorClass::NotFound,
            OutboundError::InactiveWallet(_)
            | OutboundError::ChainMismatch { .. }
            | OutboundError::InvalidAddress { .. }
            | OutboundError::ZeroAmount
            | OutboundError::Amount(_) => ErrorClass::Validation,
            OutboundError::Currency(e) => e.class(),
            OutboundError::Fee(e) => e.class(),
            OutboundError::Signer(e) => e.class(),
            OutboundError::Broadcast(e) => e.class(),
            OutboundError::Store(e) => e.class(),
        }
    }
}

/// A payout as requested by an operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayoutRequest {
    pub wallet_id: i64,
    pub currency: String,
    pub recipient: String,
    /// Whole-unit decimal string.
    pub amount: String,
    pub is_test: bool,
}

/// A signed transfer and the nonce it was built with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransfer {
    pub payload: SignedPayload,
    pub nonce: u64,
}

#[derive(Clone)]
pub struct Payouts {
    store: Arc<dyn PaymentStore>,
    currencies: Arc<CurrencyRegistry>,
    fees: FeeEngine,
    broadcaster: BroadcastEngine,
    signer: Arc<dyn TransactionSigner>,
}

impl Payouts {
    pub fn new(
        store: Arc<dyn PaymentStore>,
        currencies: Arc<CurrencyRegistry>,
        fees: FeeEngine,
        broadcaster: BroadcastEngine,
        signer: Arc<dyn TransactionSigner>,
    ) -> Self {
        Self {
            store,
            currencies,
            fees,
            broadcaster,
            signer,
        }
    }

    /// Reserve the next nonce of `wallet` and have the signer build the
    /// transfer. The reservation is given back when signing fails.
    #[tracing::instrument(skip_all, err, fields(wallet_id = wallet.id, currency = %currency.ticker, is_test))]
    pub async fn create_signed_transaction(
        &self,
        wallet: &HotWallet,
        currency: &CryptoCurrency,
        recipient: &str,
        amount: &CryptoAmount,
        fee: &FeeDetails,
        is_test: bool,
    ) -> Result<SignedTransfer, OutboundError> {
        let counters = self
            .store
            .update_nonce_counters(wallet.id, is_test, CounterChange::Reserve)
            .await?;
        let nonce = u64::try_from(counters.confirmed + counters.pending - 1).unwrap_or(0);

        let intent = SigningIntent {
            wallet_id: wallet.uuid,
            blockchain: currency.blockchain,
            is_test,
            network_id: currency.choose_network(is_test).to_owned(),
            asset_type: currency.kind,
            contract_address: currency.choose_contract(is_test).map(str::to_owned),
            recipient: recipient.to_owned(),
            amount: amount.units().normalize().to_string(),
            nonce,
            fee: fee.clone(),
        };

        match self.signer.sign(&intent).await {
            Ok(payload) => Ok(SignedTransfer { payload, nonce }),
            Err(e) => {
                self.release_nonce(wallet.id, is_test).await;
                Err(e.into())
            }
        }
    }

    /// Quote, sign and broadcast one payout. The returned transaction is
    /// in progress; the confirmation watcher settles it.
    #[tracing::instrument(skip_all, err, fields(wallet_id = request.wallet_id, currency = %request.currency, is_test = request.is_test))]
    pub async fn send(&self, request: &PayoutRequest) -> Result<Transaction, OutboundError> {
        let wallet = self
            .store
            .hot_wallet(request.wallet_id)
            .await?
            .ok_or(OutboundError::WalletNotFound(request.wallet_id))?;
        if !wallet.is_active {
            return Err(OutboundError::InactiveWallet(wallet.id));
        }
        let blockchain: Blockchain = wallet.blockchain.into();
        let currency = self.currencies.by_ticker(&request.currency)?;
        if currency.blockchain != blockchain {
            return Err(OutboundError::ChainMismatch {
                currency: currency.ticker.to_string(),
                blockchain,
            });
        }
        if !validate_address(blockchain, &request.recipient) {
            return Err(OutboundError::InvalidAddress {
                blockchain,
                address: request.recipient.clone(),
            });
        }
        let amount = currency.parse_amount(&request.amount)?;
        if amount.is_zero() {
            return Err(OutboundError::ZeroAmount);
        }
        let quote = self.fees.quote(currency, request.is_test).await?;

        let transaction = self
            .store
            .create_transaction(TransactionInsert {
                merchant_id: wallet.merchant_id,
                tx_type: TransactionType::Outgoing,
                status: TransactionStatus::Pending,
                blockchain: wallet.blockchain,
                network_id: currency.choose_network(request.is_test).to_owned(),
                currency: currency.ticker.to_string(),
                amount: amount.units(),
                sender_address: Some(wallet.address.clone()),
                recipient_address: request.recipient.clone(),
                hash: None,
                wallet: Some(WalletRef::Hot(wallet.id)),
                is_test: request.is_test,
                is_unexpected: false,
            })
            .await?;

        let signed = match self
            .create_signed_transaction(
                &wallet,
                currency,
                &request.recipient,
                &amount,
                &quote.details,
                request.is_test,
            )
            .await
        {
            Ok(signed) => signed,
            Err(e) => {
                self.mark_failed(transaction.id).await;
                return Err(e);
            }
        };

        let hash = match self
            .broadcaster
            .broadcast_transaction(blockchain, &signed.payload.raw_transaction, request.is_test)
            .await
        {
            Ok(hash) => hash,
            Err(e) => {
                self.release_nonce(wallet.id, request.is_test).await;
                self.mark_failed(transaction.id).await;
                return Err(e.into());
            }
        };
        if let Some(expected) = &signed.payload.hash
            && !expected.eq_ignore_ascii_case(&hash)
        {
            warn!(expected = %expected, hash = %hash, "Node reported a different hash than the signer");
        }

        let transaction = self
            .store
            .attach_broadcast_hash(transaction.id, &hash)
            .await?
            .ok_or_else(|| StoreError::not_found("pending transaction", transaction.id))?;
        info!(
            transaction_id = transaction.id,
            hash = %hash,
            nonce = signed.nonce,
            "Payout broadcast"
        );
        Ok(transaction)
    }

    async fn release_nonce(&self, wallet_id: i64, is_test: bool) {
        if let Err(e) = self
            .store
            .update_nonce_counters(wallet_id, is_test, CounterChange::Release)
            .await
        {
            error!(wallet_id, is_test, error = %e, "Failed to release nonce reservation");
        }
    }

    async fn mark_failed(&self, transaction_id: i64) {
        if let Err(e) = self
            .store
            .finalize_transaction(transaction_id, TransactionStatus::Failed, None)
            .await
        {
            error!(transaction_id, error = %e, "Failed to mark payout as failed");
        }
    }
}
