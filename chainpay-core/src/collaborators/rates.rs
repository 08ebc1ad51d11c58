use crate::error::ErrorClass;
use crate::money::CryptoAmount;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("no USD rate for {0}")]
    MissingRate(String),

    #[error("USD value of {0} overflows")]
    Overflow(String),
}

impl ConversionError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ConversionError::MissingRate(_) => ErrorClass::NotFound,
            ConversionError::Overflow(_) => ErrorClass::Validation,
        }
    }
}

#[async_trait]
pub trait FiatConverter: Send + Sync {
    /// USD value of `amount`, unrounded.
    async fn crypto_to_usd(&self, amount: &CryptoAmount) -> Result<Decimal, ConversionError>;
}

/// USD rates per ticker, replaceable at runtime.
#[derive(Debug, Clone, Default)]
pub struct StaticRates {
    rates: Arc<RwLock<HashMap<String, Decimal>>>,
}

impl StaticRates {
    pub fn new(rates: HashMap<String, Decimal>) -> Self {
        Self {
            rates: Arc::new(RwLock::new(normalize(rates))),
        }
    }

    pub async fn replace(&self, rates: HashMap<String, Decimal>) {
        *self.rates.write().await = normalize(rates);
    }
}

fn normalize(rates: HashMap<String, Decimal>) -> HashMap<String, Decimal> {
    rates
        .into_iter()
        .map(|(ticker, rate)| (ticker.to_ascii_uppercase(), rate))
        .collect()
}

#[async_trait]
impl FiatConverter for StaticRates {
    async fn crypto_to_usd(&self, amount: &CryptoAmount) -> Result<Decimal, ConversionError> {
        let ticker = amount.ticker().to_ascii_uppercase();
        let rate = self
            .rates
            .read()
            .await
            .get(&ticker)
            .copied()
            .ok_or_else(|| ConversionError::MissingRate(ticker))?;
        amount
            .to_decimal()
            .checked_mul(rate)
            .ok_or_else(|| ConversionError::Overflow(amount.to_string()))
    }
}
