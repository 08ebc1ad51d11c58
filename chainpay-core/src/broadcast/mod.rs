//! Submission of signed transactions and receipt lookup.
//!
//! Like fees, every chain is served by a [`BroadcastStrategy`] registered in
//! the [`BroadcastEngine`]'s table. Chains without a strategy (BTC, XMR)
//! fail with [`BroadcastError::UnsupportedChain`].

mod evm;
mod solana;
mod tron;

pub use evm::EvmBroadcaster;
pub use solana::SolanaBroadcaster;
pub use tron::TronBroadcaster;

use crate::currency::CurrencyError;
use crate::error::ErrorClass;
use crate::money::{AmountError, CryptoAmount};
use crate::rpc::RpcError;
use async_trait::async_trait;
use chainpay_sdk::objects::Blockchain;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;

/// Blocks after inclusion before a transaction counts as final.
pub const fn confirmation_threshold(blockchain: Blockchain) -> Option<u64> {
    match blockchain {
        Blockchain::Eth => Some(12),
        Blockchain::Matic => Some(30),
        Blockchain::Bsc => Some(15),
        Blockchain::Arbitrum | Blockchain::Avax => Some(20),
        Blockchain::Tron => Some(19),
        Blockchain::Sol => Some(32),
        Blockchain::Btc | Blockchain::Xmr => None,
    }
}

/// What the chain reports about a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub hash: String,
    /// Not every chain exposes the parties through its status query.
    pub sender: Option<String>,
    pub recipient: Option<String>,
    /// Fee actually paid, in the native coin.
    pub fee: CryptoAmount,
    pub confirmations: u64,
    pub is_confirmed: bool,
    /// `false` when the transaction was included but failed or reverted.
    pub success: bool,
}

#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("transaction {0} not found")]
    NotFound(String),

    #[error("transaction {hash} not confirmed after {attempts} attempts")]
    ConfirmationTimeout { hash: String, attempts: u32 },

    #[error("confirmation polling cancelled")]
    Cancelled,

    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error(transparent)]
    Amount(#[from] AmountError),

    #[error(transparent)]
    Currency(#[from] CurrencyError),

    #[error("broadcasting is not supported on {0}")]
    UnsupportedChain(Blockchain),
}

impl BroadcastError {
    pub fn class(&self) -> ErrorClass {
        match self {
            BroadcastError::InsufficientFunds(_) => ErrorClass::InsufficientFunds,
            BroadcastError::InvalidTransaction(_) => ErrorClass::InvalidTransaction,
            BroadcastError::NotFound(_) => ErrorClass::NotFound,
            BroadcastError::ConfirmationTimeout { .. } => ErrorClass::ConfirmationTimeout,
            BroadcastError::Cancelled => ErrorClass::Cancelled,
            BroadcastError::Rpc(e) => e.class(),
            BroadcastError::Currency(e) => e.class(),
            BroadcastError::Amount(_) | BroadcastError::UnsupportedChain(_) => {
                ErrorClass::Validation
            }
        }
    }
}

/// Map a provider rejection onto the broadcast taxonomy.
pub fn classify_provider_error(message: &str, body: &str) -> BroadcastError {
    const INSUFFICIENT_FUNDS: &str = "insufficient funds";
    if message.to_ascii_lowercase().contains(INSUFFICIENT_FUNDS)
        || body.to_ascii_lowercase().contains(INSUFFICIENT_FUNDS)
    {
        BroadcastError::InsufficientFunds(message.to_owned())
    } else {
        BroadcastError::InvalidTransaction(message.to_owned())
    }
}

/// Log a failed submission with its payload, then classify it. Transport
/// failures stay [`BroadcastError::Rpc`] since the payload was never judged.
pub(crate) fn rejected(blockchain: Blockchain, raw: &str, is_test: bool, err: RpcError) -> BroadcastError {
    match err {
        RpcError::Provider { message, body, .. } => {
            tracing::error!(
                blockchain = %blockchain,
                raw_tx = raw,
                response = %body,
                is_test,
                "Provider rejected transaction"
            );
            classify_provider_error(&message, &body)
        }
        other => {
            tracing::error!(
                blockchain = %blockchain,
                raw_tx = raw,
                is_test,
                error = %other,
                "Failed to submit transaction"
            );
            BroadcastError::Rpc(other)
        }
    }
}

#[async_trait]
pub trait BroadcastStrategy: Send + Sync {
    /// Submit a signed payload and return the chain transaction id.
    async fn broadcast(&self, raw: &str, is_test: bool) -> Result<String, BroadcastError>;

    /// Current receipt of `hash`. Strategies that poll stop when `cancel`
    /// turns `true`.
    async fn receipt(
        &self,
        hash: &str,
        is_test: bool,
        cancel: &watch::Receiver<bool>,
    ) -> Result<Receipt, BroadcastError>;
}

#[derive(Clone, Default)]
pub struct BroadcastEngine {
    strategies: HashMap<Blockchain, Arc<dyn BroadcastStrategy>>,
}

impl BroadcastEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, blockchain: Blockchain, strategy: Arc<dyn BroadcastStrategy>) {
        self.strategies.insert(blockchain, strategy);
    }

    pub fn with_strategy(mut self, blockchain: Blockchain, strategy: Arc<dyn BroadcastStrategy>) -> Self {
        self.register(blockchain, strategy);
        self
    }

    fn strategy(&self, blockchain: Blockchain) -> Result<&Arc<dyn BroadcastStrategy>, BroadcastError> {
        self.strategies
            .get(&blockchain)
            .ok_or(BroadcastError::UnsupportedChain(blockchain))
    }

    #[tracing::instrument(skip_all, err, fields(blockchain = %blockchain, is_test))]
    pub async fn broadcast_transaction(
        &self,
        blockchain: Blockchain,
        raw: &str,
        is_test: bool,
    ) -> Result<String, BroadcastError> {
        let hash = self.strategy(blockchain)?.broadcast(raw, is_test).await?;
        tracing::info!(blockchain = %blockchain, hash = %hash, is_test, "Broadcast transaction");
        Ok(hash)
    }

    pub async fn get_transaction_receipt(
        &self,
        blockchain: Blockchain,
        hash: &str,
        is_test: bool,
        cancel: &watch::Receiver<bool>,
    ) -> Result<Receipt, BroadcastError> {
        self.strategy(blockchain)?
            .receipt(hash, is_test, cancel)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let err = classify_provider_error(
            "insufficient funds for gas * price + value",
            r#"{"error":{"code":-32000}}"#,
        );
        assert!(matches!(err, BroadcastError::InsufficientFunds(_)));
        assert_eq!(err.class(), ErrorClass::InsufficientFunds);

        let err = classify_provider_error("nonce too low", "{}");
        match &err {
            BroadcastError::InvalidTransaction(message) => assert_eq!(message, "nonce too low"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(!err.class().is_retryable());
    }

    #[test]
    fn test_body_is_searched_too() {
        let err = classify_provider_error(
            "CONTRACT_VALIDATE_ERROR",
            "Contract validate error : Insufficient funds in account",
        );
        assert!(matches!(err, BroadcastError::InsufficientFunds(_)));
    }

    #[test]
    fn test_thresholds() {
        assert_eq!(confirmation_threshold(Blockchain::Eth), Some(12));
        assert_eq!(confirmation_threshold(Blockchain::Matic), Some(30));
        assert_eq!(confirmation_threshold(Blockchain::Sol), Some(32));
        assert_eq!(confirmation_threshold(Blockchain::Btc), None);
    }

    #[tokio::test]
    async fn test_unsupported_chain() {
        let engine = BroadcastEngine::new();
        let (_tx, rx) = watch::channel(false);
        assert!(matches!(
            engine.broadcast_transaction(Blockchain::Btc, "00", false).await,
            Err(BroadcastError::UnsupportedChain(Blockchain::Btc))
        ));
        assert!(matches!(
            engine
                .get_transaction_receipt(Blockchain::Xmr, "h", false, &rx)
                .await,
            Err(BroadcastError::UnsupportedChain(Blockchain::Xmr))
        ));
    }
}
