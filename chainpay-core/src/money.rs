//! Exact crypto and fiat amounts.
//!
//! Crypto amounts are kept as integers in the currency's smallest unit
//! (wei, sun, lamports, satoshi...) stored in a [`Decimal`] with scale 0.
//! Conversions to and from human-readable decimal strings never go through
//! floating point.

use compact_str::CompactString;
use rust_decimal::{Decimal, RoundingStrategy};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Decimal's mantissa holds 28 full digits.
pub const MAX_DECIMALS: u32 = 28;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("invalid amount {0:?}")]
    Malformed(String),
    #[error("negative amount {0}")]
    Negative(String),
    #[error("amount {value} has more than {decimals} decimal places")]
    TooPrecise { value: String, decimals: u32 },
    #[error("amount {0} overflows")]
    Overflow(String),
    #[error("unsupported decimals {0}")]
    UnsupportedDecimals(u32),
    #[error("amounts of {left} and {right} cannot be combined")]
    CurrencyMismatch {
        left: CompactString,
        right: CompactString,
    },
}

/// `10^decimals` as a Decimal.
pub fn pow10(decimals: u32) -> Result<Decimal, AmountError> {
    if decimals > MAX_DECIMALS {
        return Err(AmountError::UnsupportedDecimals(decimals));
    }
    10i128
        .checked_pow(decimals)
        .and_then(|v| Decimal::try_from_i128_with_scale(v, 0).ok())
        .ok_or(AmountError::UnsupportedDecimals(decimals))
}

/// A non-negative amount of one currency, counted in smallest units.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CryptoAmount {
    ticker: CompactString,
    units: Decimal,
    decimals: u32,
}

impl CryptoAmount {
    /// Build from an integer count of smallest units.
    pub fn from_units(
        ticker: impl Into<CompactString>,
        units: Decimal,
        decimals: u32,
    ) -> Result<Self, AmountError> {
        if decimals > MAX_DECIMALS {
            return Err(AmountError::UnsupportedDecimals(decimals));
        }
        if units.is_sign_negative() && !units.is_zero() {
            return Err(AmountError::Negative(units.to_string()));
        }
        if !units.fract().is_zero() {
            return Err(AmountError::TooPrecise {
                value: units.to_string(),
                decimals: 0,
            });
        }
        Ok(Self {
            ticker: ticker.into(),
            units: units.trunc().normalize(),
            decimals,
        })
    }

    pub fn from_u128_units(
        ticker: impl Into<CompactString>,
        units: u128,
        decimals: u32,
    ) -> Result<Self, AmountError> {
        let value = i128::try_from(units)
            .ok()
            .and_then(|v| Decimal::try_from_i128_with_scale(v, 0).ok())
            .ok_or_else(|| AmountError::Overflow(units.to_string()))?;
        Self::from_units(ticker, value, decimals)
    }

    /// Parse a whole-unit decimal string such as `"0.000123"`.
    ///
    /// Fails when the string carries more fractional digits than the
    /// currency supports instead of silently rounding.
    pub fn from_decimal_str(
        ticker: impl Into<CompactString>,
        value: &str,
        decimals: u32,
    ) -> Result<Self, AmountError> {
        let trimmed = value.trim();
        let parsed = Decimal::from_str(trimmed)
            .or_else(|_| Decimal::from_scientific(trimmed))
            .map_err(|_| AmountError::Malformed(value.to_owned()))?;
        Self::from_decimal(ticker, parsed, decimals)
    }

    pub fn from_decimal(
        ticker: impl Into<CompactString>,
        value: Decimal,
        decimals: u32,
    ) -> Result<Self, AmountError> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(AmountError::Negative(value.to_string()));
        }
        let units = value
            .checked_mul(pow10(decimals)?)
            .ok_or_else(|| AmountError::Overflow(value.to_string()))?;
        if !units.fract().is_zero() {
            return Err(AmountError::TooPrecise {
                value: value.to_string(),
                decimals,
            });
        }
        Self::from_units(ticker, units, decimals)
    }

    pub fn zero(ticker: impl Into<CompactString>, decimals: u32) -> Result<Self, AmountError> {
        Self::from_units(ticker, Decimal::ZERO, decimals)
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn decimals(&self) -> u32 {
        self.decimals
    }

    /// Integer count of smallest units.
    pub fn units(&self) -> Decimal {
        self.units
    }

    pub fn is_zero(&self) -> bool {
        self.units.is_zero()
    }

    /// Value in whole units.
    pub fn to_decimal(&self) -> Decimal {
        match pow10(self.decimals) {
            Ok(divisor) => (self.units / divisor).normalize(),
            Err(_) => self.units,
        }
    }

    pub fn checked_add(&self, other: &CryptoAmount) -> Result<CryptoAmount, AmountError> {
        self.same_currency(other)?;
        let units = self
            .units
            .checked_add(other.units)
            .ok_or_else(|| AmountError::Overflow(self.units.to_string()))?;
        Self::from_units(self.ticker.clone(), units, self.decimals)
    }

    fn same_currency(&self, other: &CryptoAmount) -> Result<(), AmountError> {
        if self.ticker != other.ticker || self.decimals != other.decimals {
            return Err(AmountError::CurrencyMismatch {
                left: self.ticker.clone(),
                right: other.ticker.clone(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for CryptoAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.to_decimal(), self.ticker)
    }
}

/// Round a fiat value up to the next cent.
pub fn ceil_to_cents(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::AwayFromZero)
}

/// Round a fiat value to the nearest cent, halves away from zero.
pub fn round_to_cents(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn parse_whole_units_into_smallest_units() {
        let amount = CryptoAmount::from_decimal_str("ETH_USDT", "12.5", 6).unwrap();
        assert_eq!(amount.units(), dec("12500000"));
        assert_eq!(amount.to_decimal(), dec("12.5"));

        let wei = CryptoAmount::from_decimal_str("ETH", "0.000000000000000001", 18).unwrap();
        assert_eq!(wei.units(), Decimal::ONE);

        let trx = CryptoAmount::from_decimal_str("TRON", "1", 6).unwrap();
        assert_eq!(trx.units(), dec("1000000"));
        assert_eq!(trx.to_string(), "1 TRON");
    }

    #[test]
    fn reject_excess_precision() {
        let err = CryptoAmount::from_decimal_str("ETH_USDT", "1.0000001", 6).unwrap_err();
        assert!(matches!(err, AmountError::TooPrecise { decimals: 6, .. }));
    }

    #[test]
    fn reject_bad_input() {
        assert!(matches!(
            CryptoAmount::from_decimal_str("ETH", "-1", 18),
            Err(AmountError::Negative(_))
        ));
        assert!(matches!(
            CryptoAmount::from_decimal_str("ETH", "one", 18),
            Err(AmountError::Malformed(_))
        ));
        assert!(matches!(
            CryptoAmount::from_decimal_str("ETH", "1", 29),
            Err(AmountError::UnsupportedDecimals(29))
        ));
    }

    #[test]
    fn trailing_zeros_are_fine() {
        let amount = CryptoAmount::from_decimal_str("SOL", "2.500000000", 9).unwrap();
        assert_eq!(amount.units(), dec("2500000000"));
    }

    #[test]
    fn add_requires_same_currency() {
        let a = CryptoAmount::from_decimal_str("ETH", "1", 18).unwrap();
        let b = CryptoAmount::from_decimal_str("ETH", "0.5", 18).unwrap();
        assert_eq!(a.checked_add(&b).unwrap().to_decimal(), dec("1.5"));

        let c = CryptoAmount::from_decimal_str("MATIC", "1", 18).unwrap();
        assert!(matches!(
            a.checked_add(&c),
            Err(AmountError::CurrencyMismatch { .. })
        ));
    }

    #[test]
    fn cent_rounding() {
        assert_eq!(ceil_to_cents(dec("0.001")), dec("0.01"));
        assert_eq!(ceil_to_cents(dec("1.2300")), dec("1.23"));
        assert_eq!(round_to_cents(dec("1.005")), dec("1.01"));
        assert_eq!(round_to_cents(dec("1.004")), dec("1.00"));
    }
}
