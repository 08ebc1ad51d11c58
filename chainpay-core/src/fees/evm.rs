use super::{EvmFee, FeeDetails, FeeError, FeeStrategy};
use crate::config::NetworkPair;
use crate::currency::{CryptoCurrency, CurrencyKind};
use crate::rpc::EvmRpc;
use async_trait::async_trait;
use chainpay_sdk::objects::Blockchain;
use std::sync::Arc;

/// Gas constants of one EVM chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasProfile {
    pub coin_gas_units: u64,
    pub token_gas_units: u64,
    /// Margin on the suggested gas price, in percent (115 = +15%).
    pub confidence_percent: u32,
}

impl GasProfile {
    pub const fn for_chain(blockchain: Blockchain) -> Self {
        let confidence_percent = match blockchain {
            Blockchain::Eth => 115,
            _ => 110,
        };
        Self {
            coin_gas_units: 21_000,
            token_gas_units: 65_000,
            confidence_percent,
        }
    }

    pub fn gas_units(&self, kind: CurrencyKind) -> u64 {
        match kind {
            CurrencyKind::Coin => self.coin_gas_units,
            CurrencyKind::Token => self.token_gas_units,
        }
    }

    /// Suggested price with the margin applied, rounded up to whole wei.
    pub fn confident_gas_price(&self, suggested: u128) -> Option<u128> {
        suggested
            .checked_mul(u128::from(self.confidence_percent))
            .map(|scaled| scaled.div_ceil(100))
    }
}

/// Asks the node for the current gas price and tip.
pub struct EvmFeeStrategy {
    rpc: NetworkPair<Arc<dyn EvmRpc>>,
    profile: GasProfile,
}

impl EvmFeeStrategy {
    pub fn new(blockchain: Blockchain, rpc: NetworkPair<Arc<dyn EvmRpc>>) -> Self {
        Self {
            rpc,
            profile: GasProfile::for_chain(blockchain),
        }
    }

    pub fn with_profile(mut self, profile: GasProfile) -> Self {
        self.profile = profile;
        self
    }
}

#[async_trait]
impl FeeStrategy for EvmFeeStrategy {
    async fn estimate(
        &self,
        _base: &CryptoCurrency,
        currency: &CryptoCurrency,
        is_test: bool,
    ) -> Result<FeeDetails, FeeError> {
        if !currency.blockchain.is_evm() {
            return Err(FeeError::UnsupportedChain(currency.blockchain));
        }
        let rpc = self.rpc.select(is_test);
        let (suggested, priority_fee) = tokio::try_join!(rpc.gas_price(), rpc.max_priority_fee())?;
        let gas_price = self
            .profile
            .confident_gas_price(suggested)
            .ok_or(FeeError::Overflow(currency.blockchain))?;

        tracing::debug!(
            blockchain = %currency.blockchain,
            is_test,
            suggested,
            gas_price,
            priority_fee,
            "Estimated gas price"
        );

        Ok(FeeDetails::Evm(EvmFee {
            gas_units: self.profile.gas_units(currency.kind),
            gas_price,
            priority_fee,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::currency::CurrencyRegistry;
    use crate::rpc::fakes::FakeEvm;

    #[test]
    fn test_confidence_rounds_up() {
        let eth = GasProfile::for_chain(Blockchain::Eth);
        assert_eq!(eth.confident_gas_price(20_000_000_000), Some(23_000_000_000));
        assert_eq!(eth.confident_gas_price(1), Some(2));
        let matic = GasProfile::for_chain(Blockchain::Matic);
        assert_eq!(matic.confident_gas_price(30_000_000_000), Some(33_000_000_000));
        assert_eq!(matic.confident_gas_price(u128::MAX), None);
    }

    #[tokio::test]
    async fn test_testnet_uses_its_own_node() {
        let mainnet: Arc<dyn EvmRpc> = Arc::new(FakeEvm {
            gas_price: 100,
            ..Default::default()
        });
        let testnet: Arc<dyn EvmRpc> = Arc::new(FakeEvm {
            gas_price: 10,
            priority_fee: 1,
            ..Default::default()
        });
        let strategy = EvmFeeStrategy::new(Blockchain::Bsc, NetworkPair::new(mainnet, testnet));
        let registry = CurrencyRegistry::builtin();
        let bnb = registry.native_coin(Blockchain::Bsc).unwrap();

        let details = strategy.estimate(bnb, bnb, true).await.unwrap();
        assert_eq!(
            details,
            FeeDetails::Evm(EvmFee {
                gas_units: 21_000,
                gas_price: 11,
                priority_fee: 1,
            })
        );
    }
}
