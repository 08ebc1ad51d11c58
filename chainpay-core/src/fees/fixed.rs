//! Chains whose fee does not depend on current network conditions.

use super::{FeeDetails, FeeError, FeeStrategy, MoneroFee, SolanaFee, TronFee};
use crate::currency::{CryptoCurrency, CurrencyKind};
use async_trait::async_trait;
use chainpay_sdk::objects::ChainFamily;

/// Bandwidth points burned by a plain TRX transfer.
pub const TRON_COIN_BANDWIDTH: u64 = 350;
pub const TRON_SUN_PER_BANDWIDTH: u64 = 1_000;
/// 30 TRX.
pub const TRON_TOKEN_FEE_LIMIT_SUN: u64 = 30_000_000;

pub const SOLANA_LAMPORTS_PER_SIGNATURE: u64 = 5_000;

pub const MONERO_PICONERO_PER_KB: u64 = 20_000_000;
pub const MONERO_TX_SIZE_KB: u64 = 2;

fn expect_family(currency: &CryptoCurrency, family: ChainFamily) -> Result<(), FeeError> {
    if currency.family() == family {
        Ok(())
    } else {
        Err(FeeError::UnsupportedChain(currency.blockchain))
    }
}

pub struct TronFeeStrategy;

#[async_trait]
impl FeeStrategy for TronFeeStrategy {
    async fn estimate(
        &self,
        _base: &CryptoCurrency,
        currency: &CryptoCurrency,
        _is_test: bool,
    ) -> Result<FeeDetails, FeeError> {
        expect_family(currency, ChainFamily::Tron)?;
        let fee_limit_sun = match currency.kind {
            CurrencyKind::Coin => TRON_COIN_BANDWIDTH * TRON_SUN_PER_BANDWIDTH,
            CurrencyKind::Token => TRON_TOKEN_FEE_LIMIT_SUN,
        };
        Ok(FeeDetails::Tron(TronFee { fee_limit_sun }))
    }
}

pub struct SolanaFeeStrategy;

#[async_trait]
impl FeeStrategy for SolanaFeeStrategy {
    async fn estimate(
        &self,
        _base: &CryptoCurrency,
        currency: &CryptoCurrency,
        _is_test: bool,
    ) -> Result<FeeDetails, FeeError> {
        expect_family(currency, ChainFamily::Solana)?;
        Ok(FeeDetails::Solana(SolanaFee {
            lamports_per_signature: SOLANA_LAMPORTS_PER_SIGNATURE,
            signatures: 1,
        }))
    }
}

pub struct MoneroFeeStrategy;

#[async_trait]
impl FeeStrategy for MoneroFeeStrategy {
    async fn estimate(
        &self,
        _base: &CryptoCurrency,
        currency: &CryptoCurrency,
        _is_test: bool,
    ) -> Result<FeeDetails, FeeError> {
        expect_family(currency, ChainFamily::Monero)?;
        Ok(FeeDetails::Monero(MoneroFee {
            piconero_per_kb: MONERO_PICONERO_PER_KB,
            size_kb: MONERO_TX_SIZE_KB,
        }))
    }
}
