use super::{confirmation_threshold, rejected, BroadcastError, BroadcastStrategy, Receipt};
use crate::config::NetworkPair;
use crate::currency::CryptoCurrency;
use crate::money::CryptoAmount;
use crate::rpc::TronApi;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;

pub struct TronBroadcaster {
    api: NetworkPair<Arc<dyn TronApi>>,
    native: CryptoCurrency,
    threshold: u64,
}

impl TronBroadcaster {
    pub fn new(native: CryptoCurrency, api: NetworkPair<Arc<dyn TronApi>>) -> Self {
        let threshold = confirmation_threshold(native.blockchain).unwrap_or(19);
        Self {
            api,
            native,
            threshold,
        }
    }
}

#[async_trait]
impl BroadcastStrategy for TronBroadcaster {
    async fn broadcast(&self, raw: &str, is_test: bool) -> Result<String, BroadcastError> {
        self.api
            .select(is_test)
            .broadcast(raw)
            .await
            .map_err(|e| rejected(self.native.blockchain, raw, is_test, e))
    }

    async fn receipt(
        &self,
        hash: &str,
        is_test: bool,
        _cancel: &watch::Receiver<bool>,
    ) -> Result<Receipt, BroadcastError> {
        let api = self.api.select(is_test);
        let (transaction, info, latest) = tokio::try_join!(
            api.transaction(hash),
            api.transaction_info(hash),
            api.now_block_number(),
        )?;
        // the body exists as soon as the node accepted it; the info only
        // once it is in a block
        let (Some(transaction), Some(info)) = (transaction, info) else {
            return Err(BroadcastError::NotFound(hash.to_owned()));
        };

        let fee = CryptoAmount::from_u128_units(
            self.native.ticker.clone(),
            u128::from(info.fee),
            self.native.decimals,
        )?;
        let confirmations = latest.saturating_sub(info.block_number);

        Ok(Receipt {
            hash: transaction.tx_id.clone(),
            sender: transaction.sender(),
            recipient: transaction.recipient(),
            fee,
            confirmations,
            is_confirmed: confirmations >= self.threshold,
            success: info.succeeded(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::currency::CurrencyRegistry;
    use crate::rpc::fakes::FakeTron;
    use crate::rpc::{TronTransaction, TronTransactionInfo};
    use chainpay_sdk::objects::Blockchain;
    use rust_decimal::Decimal;
    use serde_json::json;
    use std::collections::HashMap;
    use std::str::FromStr;

    fn broadcaster(api: FakeTron) -> TronBroadcaster {
        let registry = CurrencyRegistry::builtin();
        let api: Arc<dyn TronApi> = Arc::new(api);
        TronBroadcaster::new(
            registry.native_coin(Blockchain::Tron).unwrap().clone(),
            NetworkPair::new(api.clone(), api),
        )
    }

    #[tokio::test]
    async fn test_trc20_receipt() {
        let transaction: TronTransaction = serde_json::from_value(json!({
            "txID": "abc",
            "raw_data": { "contract": [{ "parameter": { "value": {
                "owner_address": "41a614f803b6fd780986a42c78ec9c7f77e6ded13c",
                "contract_address": "41a614f803b6fd780986a42c78ec9c7f77e6ded13c"
            }}}]}
        }))
        .unwrap();
        let info = TronTransactionInfo {
            id: "abc".to_owned(),
            fee: 13_844_850,
            block_number: 1_000,
            ..Default::default()
        };
        let api = FakeTron {
            block_number: 1_019,
            transactions: HashMap::from([("abc".to_owned(), transaction)]),
            infos: HashMap::from([("abc".to_owned(), info)]),
            ..Default::default()
        };
        let (_tx, cancel) = watch::channel(false);

        let receipt = broadcaster(api).receipt("abc", false, &cancel).await.unwrap();
        assert_eq!(receipt.confirmations, 19);
        assert!(receipt.is_confirmed);
        assert!(receipt.success);
        assert_eq!(receipt.fee.to_decimal(), Decimal::from_str("13.84485").unwrap());
        assert_eq!(
            receipt.sender.as_deref(),
            Some("TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t")
        );
    }

    #[tokio::test]
    async fn test_unmined_is_not_found() {
        let (_tx, cancel) = watch::channel(false);
        let err = broadcaster(FakeTron::default())
            .receipt("abc", true, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, BroadcastError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_rejection() {
        let api = FakeTron {
            reject_with: Some("SIGERROR: Validate signature error".to_owned()),
            ..Default::default()
        };
        let err = broadcaster(api).broadcast("0a02", false).await.unwrap_err();
        assert!(matches!(err, BroadcastError::InvalidTransaction(_)));
    }
}
