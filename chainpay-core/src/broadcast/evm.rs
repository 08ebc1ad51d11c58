use super::{confirmation_threshold, rejected, BroadcastError, BroadcastStrategy, Receipt};
use crate::config::NetworkPair;
use crate::currency::CryptoCurrency;
use crate::money::CryptoAmount;
use crate::rpc::EvmRpc;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;

pub struct EvmBroadcaster {
    rpc: NetworkPair<Arc<dyn EvmRpc>>,
    /// The chain's native coin; fees are paid in it.
    native: CryptoCurrency,
    threshold: u64,
}

impl EvmBroadcaster {
    pub fn new(native: CryptoCurrency, rpc: NetworkPair<Arc<dyn EvmRpc>>) -> Self {
        let threshold = confirmation_threshold(native.blockchain).unwrap_or(12);
        Self {
            rpc,
            native,
            threshold,
        }
    }
}

#[async_trait]
impl BroadcastStrategy for EvmBroadcaster {
    async fn broadcast(&self, raw: &str, is_test: bool) -> Result<String, BroadcastError> {
        self.rpc
            .select(is_test)
            .send_raw_transaction(raw)
            .await
            .map_err(|e| rejected(self.native.blockchain, raw, is_test, e))
    }

    async fn receipt(
        &self,
        hash: &str,
        is_test: bool,
        _cancel: &watch::Receiver<bool>,
    ) -> Result<Receipt, BroadcastError> {
        let rpc = self.rpc.select(is_test);
        let (transaction, receipt, latest) = tokio::try_join!(
            rpc.transaction_by_hash(hash),
            rpc.transaction_receipt(hash),
            rpc.block_number(),
        )?;
        let (Some(transaction), Some(receipt)) = (transaction, receipt) else {
            return Err(BroadcastError::NotFound(hash.to_owned()));
        };

        let fee_units = receipt
            .effective_gas_price
            .checked_mul(receipt.gas_used)
            .unwrap_or(u128::MAX);
        let fee = CryptoAmount::from_u128_units(
            self.native.ticker.clone(),
            fee_units,
            self.native.decimals,
        )?;
        let confirmations =
            u64::try_from(latest.saturating_sub(receipt.block_number)).unwrap_or(u64::MAX);

        Ok(Receipt {
            hash: receipt.transaction_hash.clone(),
            sender: Some(transaction.from),
            recipient: transaction.to,
            fee,
            confirmations,
            is_confirmed: confirmations >= self.threshold,
            success: receipt.succeeded(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::currency::CurrencyRegistry;
    use crate::error::ErrorClass;
    use crate::rpc::fakes::FakeEvm;
    use crate::rpc::{EvmReceipt, EvmTransaction};
    use chainpay_sdk::objects::Blockchain;
    use rust_decimal::Decimal;
    use std::collections::HashMap;

    const HASH: &str = "0x5c504ed432cb51138bcf09aa5e8a410dd4a1e204ef84bfed1be16dfba1b22060";

    fn broadcaster(node: FakeEvm) -> EvmBroadcaster {
        let registry = CurrencyRegistry::builtin();
        let node: Arc<dyn EvmRpc> = Arc::new(node);
        EvmBroadcaster::new(
            registry.native_coin(Blockchain::Eth).unwrap().clone(),
            NetworkPair::new(node.clone(), node),
        )
    }

    fn mined_node(latest: u128, status: u128) -> FakeEvm {
        FakeEvm {
            block_number: latest,
            transactions: HashMap::from([(
                HASH.to_owned(),
                EvmTransaction {
                    hash: HASH.to_owned(),
                    from: "0x1111111111111111111111111111111111111111".to_owned(),
                    to: Some("0x2222222222222222222222222222222222222222".to_owned()),
                    nonce: 3,
                    block_number: Some(100),
                },
            )]),
            receipts: HashMap::from([(
                HASH.to_owned(),
                EvmReceipt {
                    transaction_hash: HASH.to_owned(),
                    block_number: 100,
                    gas_used: 21_000,
                    effective_gas_price: 30_000_000_000,
                    status,
                },
            )]),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_receipt_combines_three_reads() {
        let (_tx, cancel) = watch::channel(false);
        let receipt = broadcaster(mined_node(112, 1))
            .receipt(HASH, false, &cancel)
            .await
            .unwrap();
        assert_eq!(receipt.confirmations, 12);
        assert!(receipt.is_confirmed);
        assert!(receipt.success);
        assert_eq!(
            receipt.sender.as_deref(),
            Some("0x1111111111111111111111111111111111111111")
        );
        assert_eq!(receipt.fee.units(), Decimal::from(630_000_000_000_000u64));
        assert_eq!(receipt.fee.ticker(), "ETH");
    }

    #[tokio::test]
    async fn test_shallow_and_reverted() {
        let (_tx, cancel) = watch::channel(false);
        let receipt = broadcaster(mined_node(105, 0))
            .receipt(HASH, false, &cancel)
            .await
            .unwrap();
        assert_eq!(receipt.confirmations, 5);
        assert!(!receipt.is_confirmed);
        assert!(!receipt.success);
    }

    #[tokio::test]
    async fn test_unknown_hash() {
        let (_tx, cancel) = watch::channel(false);
        let err = broadcaster(FakeEvm::default())
            .receipt(HASH, true, &cancel)
            .await
            .unwrap_err();
        assert_eq!(err.class(), ErrorClass::NotFound);
    }

    #[tokio::test]
    async fn test_rejection_is_classified() {
        let node = FakeEvm {
            reject_with: Some("insufficient funds for gas * price + value".to_owned()),
            ..Default::default()
        };
        let err = broadcaster(node).broadcast("f86c", false).await.unwrap_err();
        assert!(matches!(err, BroadcastError::InsufficientFunds(_)));

        let node = FakeEvm {
            reject_with: Some("replacement transaction underpriced".to_owned()),
            ..Default::default()
        };
        let err = broadcaster(node).broadcast("f86c", false).await.unwrap_err();
        assert!(matches!(err, BroadcastError::InvalidTransaction(_)));
    }

    #[tokio::test]
    async fn test_broadcast_returns_hash() {
        let hash = broadcaster(FakeEvm::default())
            .broadcast("0xf86c", false)
            .await
            .unwrap();
        assert!(hash.starts_with("0x"));
        assert_eq!(hash.len(), 66);
    }
}
