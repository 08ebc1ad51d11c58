//! Network fee estimation.
//!
//! Every chain gets a [`FeeStrategy`] registered in the [`FeeEngine`]'s
//! table. A strategy only produces the raw inputs of the fee
//! ([`FeeDetails`]); the engine turns them into a native-coin amount and a
//! USD cost.

mod evm;
mod fixed;

pub use evm::{EvmFeeStrategy, GasProfile};
pub use fixed::{
    MoneroFeeStrategy, SolanaFeeStrategy, TronFeeStrategy, SOLANA_LAMPORTS_PER_SIGNATURE,
};

use crate::collaborators::{ConversionError, FiatConverter};
use crate::currency::{CryptoCurrency, CurrencyError, CurrencyRegistry};
use crate::error::ErrorClass;
use crate::money::{ceil_to_cents, AmountError, CryptoAmount};
use crate::rpc::RpcError;
use async_trait::async_trait;
use chainpay_sdk::objects::Blockchain;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Withdrawals pay a second hop, so their fee is the transfer fee times 1.5.
pub const WITHDRAWAL_FEE_FACTOR: Decimal = Decimal::from_parts(15, 0, 0, false, 1);

/// A withdrawal never costs less than one cent.
pub const MIN_WITHDRAWAL_FEE_USD: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Gas-metered fee. `gas_price` already includes the confidence margin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvmFee {
    pub gas_units: u64,
    /// Max fee per gas, in wei.
    pub gas_price: u128,
    /// Priority fee per gas, in wei.
    pub priority_fee: u128,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TronFee {
    /// Upper bound on the energy and bandwidth burned, in sun.
    pub fee_limit_sun: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SolanaFee {
    pub lamports_per_signature: u64,
    pub signatures: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoneroFee {
    pub piconero_per_kb: u64,
    pub size_kb: u64,
}

/// Inputs of a fee, one variant per chain family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "family", rename_all = "lowercase")]
pub enum FeeDetails {
    Evm(EvmFee),
    Tron(TronFee),
    Solana(SolanaFee),
    Monero(MoneroFee),
}

impl FeeDetails {
    /// Total fee in the native coin's smallest unit; `None` on overflow.
    pub fn total_units(&self) -> Option<u128> {
        match self {
            FeeDetails::Evm(fee) => fee
                .gas_price
                .checked_add(fee.priority_fee)?
                .checked_mul(u128::from(fee.gas_units)),
            FeeDetails::Tron(fee) => Some(u128::from(fee.fee_limit_sun)),
            FeeDetails::Solana(fee) => {
                u128::from(fee.lamports_per_signature).checked_mul(u128::from(fee.signatures))
            }
            FeeDetails::Monero(fee) => {
                u128::from(fee.piconero_per_kb).checked_mul(u128::from(fee.size_kb))
            }
        }
    }
}

/// A computed fee. Not persisted; recompute when stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeeQuote {
    pub blockchain: Blockchain,
    /// Ticker of the currency being transferred.
    pub currency: String,
    pub is_test: bool,
    pub calculated_at: time::OffsetDateTime,
    pub details: FeeDetails,
    /// Cost in the chain's native coin.
    pub total: CryptoAmount,
    /// Unrounded USD value of `total`.
    pub usd: Decimal,
}

impl FeeQuote {
    pub fn withdrawal_fee_usd(&self) -> Decimal {
        withdrawal_fee_usd(self.usd)
    }
}

#[derive(Debug, Error)]
pub enum FeeError {
    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error(transparent)]
    Amount(#[from] AmountError),

    #[error(transparent)]
    Currency(#[from] CurrencyError),

    #[error("invalid fee arguments: {0}")]
    InvalidArguments(String),

    #[error("fee estimation is not supported on {0}")]
    UnsupportedChain(Blockchain),

    #[error("fee of {0} overflows")]
    Overflow(Blockchain),
}

impl FeeError {
    pub fn class(&self) -> ErrorClass {
        match self {
            FeeError::Rpc(e) => e.class(),
            FeeError::Conversion(e) => e.class(),
            FeeError::Currency(e) => e.class(),
            FeeError::Amount(_)
            | FeeError::InvalidArguments(_)
            | FeeError::UnsupportedChain(_)
            | FeeError::Overflow(_) => ErrorClass::Validation,
        }
    }
}

#[async_trait]
pub trait FeeStrategy: Send + Sync {
    /// Fee inputs for moving `currency`, paid in the native coin `base`.
    async fn estimate(
        &self,
        base: &CryptoCurrency,
        currency: &CryptoCurrency,
        is_test: bool,
    ) -> Result<FeeDetails, FeeError>;
}

/// Strategy table plus the conversion of raw fees into quotes.
#[derive(Clone)]
pub struct FeeEngine {
    currencies: Arc<CurrencyRegistry>,
    strategies: HashMap<Blockchain, Arc<dyn FeeStrategy>>,
    converter: Arc<dyn FiatConverter>,
}

impl FeeEngine {
    pub fn new(currencies: Arc<CurrencyRegistry>, converter: Arc<dyn FiatConverter>) -> Self {
        Self {
            currencies,
            strategies: HashMap::new(),
            converter,
        }
    }

    pub fn register(&mut self, blockchain: Blockchain, strategy: Arc<dyn FeeStrategy>) {
        self.strategies.insert(blockchain, strategy);
    }

    pub fn with_strategy(mut self, blockchain: Blockchain, strategy: Arc<dyn FeeStrategy>) -> Self {
        self.register(blockchain, strategy);
        self
    }

    /// Quote the fee of moving `currency`, paid in `base`.
    ///
    /// `base` must be the native coin of `currency`'s chain.
    #[tracing::instrument(skip_all, err, fields(base = %base.ticker, currency = %currency.ticker, is_test))]
    pub async fn calculate_fee(
        &self,
        base: &CryptoCurrency,
        currency: &CryptoCurrency,
        is_test: bool,
    ) -> Result<FeeQuote, FeeError> {
        if !base.is_coin() || base.blockchain != currency.blockchain {
            return Err(FeeError::InvalidArguments(format!(
                "{} is not the native coin of {}",
                base.ticker, currency.blockchain
            )));
        }
        let strategy = self
            .strategies
            .get(&currency.blockchain)
            .ok_or(FeeError::UnsupportedChain(currency.blockchain))?;

        let details = strategy.estimate(base, currency, is_test).await?;
        let units = details
            .total_units()
            .ok_or(FeeError::Overflow(currency.blockchain))?;
        let total = CryptoAmount::from_u128_units(base.ticker.clone(), units, base.decimals)?;
        let usd = self.converter.crypto_to_usd(&total).await?;

        Ok(FeeQuote {
            blockchain: currency.blockchain,
            currency: currency.ticker.to_string(),
            is_test,
            calculated_at: time::OffsetDateTime::now_utc(),
            details,
            total,
            usd,
        })
    }

    /// [`calculate_fee`](Self::calculate_fee) with the chain's registered
    /// native coin as base.
    pub async fn quote(&self, currency: &CryptoCurrency, is_test: bool) -> Result<FeeQuote, FeeError> {
        let base = self.currencies.native_coin(currency.blockchain)?;
        self.calculate_fee(base, currency, is_test).await
    }

    pub async fn calculate_withdrawal_fee_usd(
        &self,
        currency: &CryptoCurrency,
        is_test: bool,
    ) -> Result<Decimal, FeeError> {
        Ok(self.quote(currency, is_test).await?.withdrawal_fee_usd())
    }
}

/// USD fee charged for a withdrawal whose transfer fee is `fee_usd`.
pub fn withdrawal_fee_usd(fee_usd: Decimal) -> Decimal {
    let scaled = fee_usd
        .checked_mul(WITHDRAWAL_FEE_FACTOR)
        .unwrap_or(Decimal::MAX);
    ceil_to_cents(scaled).max(MIN_WITHDRAWAL_FEE_USD)
}
