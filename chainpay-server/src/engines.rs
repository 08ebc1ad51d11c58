//! Wires configured node endpoints into the fee and broadcast strategy tables.

use chainpay_core::broadcast::{BroadcastEngine, EvmBroadcaster, SolanaBroadcaster, TronBroadcaster};
use chainpay_core::collaborators::FiatConverter;
use chainpay_core::config::{ConfirmationPolicy, NetworkPair, RpcEndpoint};
use chainpay_core::currency::CurrencyRegistry;
use chainpay_core::fees::{
    EvmFeeStrategy, FeeEngine, MoneroFeeStrategy, SolanaFeeStrategy, TronFeeStrategy,
};
use chainpay_core::rpc::{
    DEFAULT_TIMEOUT, EvmJsonRpc, EvmRpc, JsonRpcClient, SolanaJsonRpc, SolanaRpc, TronApi,
    TronGrid,
};
use chainpay_sdk::objects::{Blockchain, ChainFamily};
use std::collections::HashMap;
use std::sync::Arc;

/// Fee strategies for every chain that can be quoted.
///
/// TRON, Solana and Monero use fixed schedules; EVM chains need a node.
pub fn build_fee_engine(
    currencies: Arc<CurrencyRegistry>,
    converter: Arc<dyn FiatConverter>,
    rpc: &HashMap<Blockchain, NetworkPair<RpcEndpoint>>,
) -> FeeEngine {
    let mut engine = FeeEngine::new(currencies, converter)
        .with_strategy(Blockchain::Tron, Arc::new(TronFeeStrategy))
        .with_strategy(Blockchain::Sol, Arc::new(SolanaFeeStrategy))
        .with_strategy(Blockchain::Xmr, Arc::new(MoneroFeeStrategy));

    for (blockchain, endpoints) in rpc {
        if blockchain.family() == ChainFamily::Evm {
            engine.register(
                *blockchain,
                Arc::new(EvmFeeStrategy::new(*blockchain, evm_clients(endpoints))),
            );
        }
    }
    engine
}

/// Broadcast strategies for every chain with configured endpoints.
pub fn build_broadcast_engine(
    currencies: &CurrencyRegistry,
    rpc: &HashMap<Blockchain, NetworkPair<RpcEndpoint>>,
    policy: ConfirmationPolicy,
) -> BroadcastEngine {
    let mut engine = BroadcastEngine::new();
    for (blockchain, endpoints) in rpc {
        let native = match currencies.native_coin(*blockchain) {
            Ok(native) => native,
            Err(e) => {
                tracing::warn!(%blockchain, error = %e, "Skipping broadcaster");
                continue;
            }
        };
        let native = native.clone();
        match blockchain.family() {
            ChainFamily::Evm => engine.register(
                *blockchain,
                Arc::new(EvmBroadcaster::new(native, evm_clients(endpoints))),
            ),
            ChainFamily::Tron => {
                let api = endpoints.clone().map(|endpoint| {
                    Arc::new(TronGrid::new(endpoint, DEFAULT_TIMEOUT)) as Arc<dyn TronApi>
                });
                engine.register(*blockchain, Arc::new(TronBroadcaster::new(native, api)));
            }
            ChainFamily::Solana => {
                let rpc = endpoints.clone().map(|endpoint| {
                    Arc::new(SolanaJsonRpc::new(JsonRpcClient::new(endpoint, DEFAULT_TIMEOUT)))
                        as Arc<dyn SolanaRpc>
                });
                engine.register(
                    *blockchain,
                    Arc::new(SolanaBroadcaster::new(native, rpc, policy)),
                );
            }
            ChainFamily::Utxo | ChainFamily::Monero => {}
        }
    }
    engine
}

fn evm_clients(endpoints: &NetworkPair<RpcEndpoint>) -> NetworkPair<Arc<dyn EvmRpc>> {
    endpoints.clone().map(|endpoint| {
        Arc::new(EvmJsonRpc::new(JsonRpcClient::new(endpoint, DEFAULT_TIMEOUT))) as Arc<dyn EvmRpc>
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainpay_core::collaborators::StaticRates;
    use url::Url;

    fn endpoints() -> HashMap<Blockchain, NetworkPair<RpcEndpoint>> {
        let endpoint = |s: &str| RpcEndpoint::new(Url::parse(s).unwrap());
        [Blockchain::Eth, Blockchain::Tron, Blockchain::Sol]
            .into_iter()
            .map(|b| {
                (
                    b,
                    NetworkPair::new(
                        endpoint("http://127.0.0.1:1/"),
                        endpoint("http://127.0.0.1:2/"),
                    ),
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn test_fixed_fee_chains_quote_without_nodes() {
        let currencies = Arc::new(CurrencyRegistry::builtin());
        let rates = StaticRates::new(HashMap::from([(
            "TRON".to_owned(),
            rust_decimal::Decimal::new(12, 2),
        )]));
        let engine = build_fee_engine(currencies.clone(), Arc::new(rates), &HashMap::new());

        let usdt = currencies.by_ticker("TRON_USDT").unwrap();
        let quote = engine.quote(usdt, false).await.unwrap();
        assert_eq!(quote.blockchain, Blockchain::Tron);
    }

    #[tokio::test]
    async fn test_unconfigured_chain_is_unsupported() {
        let currencies = CurrencyRegistry::builtin();
        let engine = build_broadcast_engine(&currencies, &endpoints(), ConfirmationPolicy::default());
        let err = engine
            .broadcast_transaction(Blockchain::Btc, "00", false)
            .await
            .unwrap_err();
        assert_eq!(
            err.class(),
            chainpay_core::error::ErrorClass::Validation,
            "{err}"
        );
    }
}
