//! Currency registry and resolution of provider asset references.

mod builtin;

use crate::error::ErrorClass;
use crate::money::{AmountError, CryptoAmount};
use chainpay_sdk::objects::{Blockchain, ChainFamily};
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use itertools::Itertools;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CurrencyKind {
    Coin,
    Token,
}

/// A currency as the gateway knows it: a native coin or a token contract on
/// one chain, with its main and test network identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CryptoCurrency {
    pub blockchain: Blockchain,
    /// Unique key, e.g. `ETH` or `ETH_USDT`.
    pub ticker: CompactString,
    /// Display symbol, e.g. `USDT`.
    pub symbol: CompactString,
    pub name: CompactString,
    pub kind: CurrencyKind,
    pub decimals: u32,
    pub network_id: CompactString,
    pub test_network_id: CompactString,
    #[serde(default)]
    pub token_contract: Option<CompactString>,
    #[serde(default)]
    pub test_token_contract: Option<CompactString>,
}

impl CryptoCurrency {
    pub fn is_coin(&self) -> bool {
        self.kind == CurrencyKind::Coin
    }

    pub fn family(&self) -> ChainFamily {
        self.blockchain.family()
    }

    pub fn choose_network(&self, is_test: bool) -> &str {
        if is_test {
            &self.test_network_id
        } else {
            &self.network_id
        }
    }

    pub fn choose_contract(&self, is_test: bool) -> Option<&str> {
        if is_test {
            self.test_token_contract.as_deref()
        } else {
            self.token_contract.as_deref()
        }
    }

    /// `Some(true)` for the test network, `Some(false)` for main, `None` if
    /// the id belongs to neither.
    pub fn network_kind(&self, network_id: &str) -> Option<bool> {
        if network_id == self.network_id {
            Some(false)
        } else if network_id == self.test_network_id {
            Some(true)
        } else {
            None
        }
    }

    /// Numeric chain id for account-model networks.
    pub fn evm_chain_id(&self, is_test: bool) -> Result<u64, CurrencyError> {
        let network = self.choose_network(is_test);
        network
            .parse::<u64>()
            .map_err(|_| CurrencyError::InvalidNetworkId {
                blockchain: self.blockchain,
                network_id: network.into(),
            })
    }

    pub fn parse_amount(&self, value: &str) -> Result<CryptoAmount, AmountError> {
        CryptoAmount::from_decimal_str(self.ticker.clone(), value, self.decimals)
    }

    pub fn zero(&self) -> Result<CryptoAmount, AmountError> {
        CryptoAmount::zero(self.ticker.clone(), self.decimals)
    }

    /// Compares only against the contract deployed on `network_id`.
    fn matches_contract(&self, network_id: &str, asset: &str) -> bool {
        let Some(contract) = self
            .network_kind(network_id)
            .and_then(|is_test| self.choose_contract(is_test))
        else {
            return false;
        };
        if self.blockchain.is_evm() {
            contract.eq_ignore_ascii_case(asset)
        } else {
            contract == asset
        }
    }

    fn matches_name(&self, asset: &str) -> bool {
        if self.ticker.eq_ignore_ascii_case(asset) || self.symbol.eq_ignore_ascii_case(asset) {
            return true;
        }
        // provider style: SYMBOL_CHAIN
        asset
            .rsplit_once('_')
            .is_some_and(|(symbol, chain)| {
                self.symbol.eq_ignore_ascii_case(symbol)
                    && chain.parse::<Blockchain>().ok() == Some(self.blockchain)
            })
    }
}

/// How a notification refers to the transferred asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetRef<'a> {
    Native,
    /// Contract address or ticker as sent by the provider.
    Token(&'a str),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CurrencyError {
    #[error("currency {asset:?} not found on {blockchain}")]
    NotFound {
        blockchain: Blockchain,
        asset: String,
    },
    #[error("unknown {blockchain} network id {network_id:?}, expected one of [{expected}, {expected_test}]")]
    UnknownNetwork {
        blockchain: Blockchain,
        network_id: String,
        expected: CompactString,
        expected_test: CompactString,
    },
    #[error("network id {network_id:?} of {blockchain} is not numeric")]
    InvalidNetworkId {
        blockchain: Blockchain,
        network_id: CompactString,
    },
    #[error("duplicate ticker {0}")]
    DuplicateTicker(CompactString),
    #[error("no native coin registered for {0}")]
    MissingNativeCoin(Blockchain),
}

impl CurrencyError {
    pub fn class(&self) -> ErrorClass {
        match self {
            CurrencyError::NotFound { .. } | CurrencyError::MissingNativeCoin(_) => {
                ErrorClass::NotFound
            }
            CurrencyError::UnknownNetwork { .. }
            | CurrencyError::InvalidNetworkId { .. }
            | CurrencyError::DuplicateTicker(_) => ErrorClass::Validation,
        }
    }
}

/// The read-only set of currencies the gateway accepts.
#[derive(Debug, Clone)]
pub struct CurrencyRegistry {
    currencies: Vec<CryptoCurrency>,
}

impl CurrencyRegistry {
    /// Validates that tickers are unique.
    pub fn new(currencies: Vec<CryptoCurrency>) -> Result<Self, CurrencyError> {
        if let Some(ticker) = currencies
            .iter()
            .map(|c| c.ticker.to_ascii_uppercase())
            .duplicates()
            .next()
        {
            return Err(CurrencyError::DuplicateTicker(ticker.into()));
        }
        Ok(Self { currencies })
    }

    /// Coins and major stablecoins of every supported chain.
    pub fn builtin() -> Self {
        Self {
            currencies: builtin::currencies(),
        }
    }

    pub fn list(&self) -> &[CryptoCurrency] {
        &self.currencies
    }

    pub fn blockchain_currencies(
        &self,
        blockchain: Blockchain,
    ) -> impl Iterator<Item = &CryptoCurrency> {
        self.currencies
            .iter()
            .filter(move |c| c.blockchain == blockchain)
    }

    pub fn by_ticker(&self, ticker: &str) -> Result<&CryptoCurrency, CurrencyError> {
        self.currencies
            .iter()
            .find(|c| c.ticker.eq_ignore_ascii_case(ticker))
            .ok_or_else(|| CurrencyError::NotFound {
                blockchain: guess_blockchain(ticker),
                asset: ticker.to_owned(),
            })
    }

    pub fn native_coin(&self, blockchain: Blockchain) -> Result<&CryptoCurrency, CurrencyError> {
        self.blockchain_currencies(blockchain)
            .find(|c| c.is_coin())
            .ok_or(CurrencyError::MissingNativeCoin(blockchain))
    }

    /// Resolve the currency of an incoming notification and check that
    /// `network_id` is one of the currency's two networks.
    pub fn resolve(
        &self,
        blockchain: Blockchain,
        network_id: &str,
        asset: AssetRef<'_>,
    ) -> Result<&CryptoCurrency, CurrencyError> {
        let currency = match asset {
            AssetRef::Native => self.native_coin(blockchain)?,
            AssetRef::Token(asset) => self.find_token(blockchain, network_id, asset)?,
        };
        if currency.network_kind(network_id).is_none() {
            return Err(CurrencyError::UnknownNetwork {
                blockchain,
                network_id: network_id.to_owned(),
                expected: currency.network_id.clone(),
                expected_test: currency.test_network_id.clone(),
            });
        }
        Ok(currency)
    }

    fn find_token(
        &self,
        blockchain: Blockchain,
        network_id: &str,
        asset: &str,
    ) -> Result<&CryptoCurrency, CurrencyError> {
        let asset = asset.trim();
        let tokens: Vec<&CryptoCurrency> = self
            .blockchain_currencies(blockchain)
            .filter(|c| !c.is_coin())
            .collect();
        tokens
            .iter()
            .find(|c| c.matches_contract(network_id, asset))
            .or_else(|| tokens.iter().find(|c| c.matches_name(asset)))
            .copied()
            .ok_or_else(|| CurrencyError::NotFound {
                blockchain,
                asset: asset.to_owned(),
            })
    }
}

fn guess_blockchain(ticker: &str) -> Blockchain {
    ticker
        .split('_')
        .next()
        .and_then(|prefix| prefix.parse().ok())
        .unwrap_or(Blockchain::Eth)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_native_on_main_and_test_networks() {
        let registry = CurrencyRegistry::builtin();
        let eth = registry.resolve(Blockchain::Eth, "1", AssetRef::Native).unwrap();
        assert_eq!(eth.ticker, "ETH");
        assert_eq!(eth.decimals, 18);
        assert_eq!(eth.network_kind("1"), Some(false));

        let eth = registry.resolve(Blockchain::Eth, "5", AssetRef::Native).unwrap();
        assert_eq!(eth.network_kind("5"), Some(true));
    }

    #[test]
    fn unknown_network_is_rejected() {
        let registry = CurrencyRegistry::builtin();
        let err = registry
            .resolve(Blockchain::Eth, "999", AssetRef::Native)
            .unwrap_err();
        assert!(matches!(err, CurrencyError::UnknownNetwork { .. }));
        assert_eq!(err.class(), ErrorClass::Validation);
        assert!(err.to_string().contains("\"999\""));

        // a MATIC chain id is not an ETH network
        assert!(registry
            .resolve(Blockchain::Eth, "137", AssetRef::Native)
            .is_err());
    }

    #[test]
    fn token_by_contract_is_case_insensitive_on_evm() {
        let registry = CurrencyRegistry::builtin();
        let usdt = registry
            .resolve(
                Blockchain::Eth,
                "1",
                AssetRef::Token("0xdac17f958d2ee523a2206206994597c13d831ec7"),
            )
            .unwrap();
        assert_eq!(usdt.ticker, "ETH_USDT");
        assert_eq!(usdt.decimals, 6);
    }

    #[test]
    fn contract_of_the_other_network_is_not_accepted() {
        let registry = CurrencyRegistry::builtin();
        let goerli_usdt = "0xC2C527C0CACF457746Bd31B2a698Fe89de2b6d49";

        let err = registry
            .resolve(Blockchain::Eth, "1", AssetRef::Token(goerli_usdt))
            .unwrap_err();
        assert!(matches!(err, CurrencyError::NotFound { .. }));

        let usdt = registry
            .resolve(Blockchain::Eth, "5", AssetRef::Token(goerli_usdt))
            .unwrap();
        assert_eq!(usdt.ticker, "ETH_USDT");
        assert_eq!(usdt.network_kind("5"), Some(true));

        // and the mainnet contract is not a testnet payment
        assert!(registry
            .resolve(
                Blockchain::Eth,
                "5",
                AssetRef::Token("0xdAC17F958D2ee523a2206206994597C13D831ec7"),
            )
            .is_err());
    }

    #[test]
    fn token_by_ticker_forms() {
        let registry = CurrencyRegistry::builtin();
        for asset in ["USDT_TRON", "TRON_USDT", "usdt", "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t"] {
            let currency = registry
                .resolve(Blockchain::Tron, "mainnet", AssetRef::Token(asset))
                .unwrap();
            assert_eq!(currency.ticker, "TRON_USDT", "asset {asset}");
        }
        // base58 contracts are case sensitive
        assert!(registry
            .resolve(
                Blockchain::Tron,
                "mainnet",
                AssetRef::Token("tr7nhqjekqxgtci8q8zy4pl8otszgjlj6t")
            )
            .is_err());
    }

    #[test]
    fn unknown_token() {
        let registry = CurrencyRegistry::builtin();
        let err = registry
            .resolve(Blockchain::Eth, "1", AssetRef::Token("0xdeadbeef"))
            .unwrap_err();
        assert!(matches!(err, CurrencyError::NotFound { .. }));
        assert_eq!(err.class(), ErrorClass::NotFound);
    }

    #[test]
    fn every_chain_has_a_native_coin() {
        let registry = CurrencyRegistry::builtin();
        for chain in Blockchain::ALL {
            let coin = registry.native_coin(chain).unwrap();
            assert!(coin.is_coin());
            assert!(coin.token_contract.is_none());
        }
    }

    #[test]
    fn duplicate_tickers_are_rejected() {
        let mut currencies = builtin::currencies();
        currencies.push(currencies[0].clone());
        assert!(matches!(
            CurrencyRegistry::new(currencies),
            Err(CurrencyError::DuplicateTicker(_))
        ));
    }

    #[test]
    fn evm_chain_ids() {
        let registry = CurrencyRegistry::builtin();
        let matic = registry.native_coin(Blockchain::Matic).unwrap();
        assert_eq!(matic.evm_chain_id(false).unwrap(), 137);
        assert_eq!(matic.evm_chain_id(true).unwrap(), 80001);
        let tron = registry.native_coin(Blockchain::Tron).unwrap();
        assert!(tron.evm_chain_id(false).is_err());
    }
}
