//! Application state shared across all request handlers.

use crate::config::LoadedConfig;
use crate::engines::{build_broadcast_engine, build_fee_engine};
use chainpay_core::broadcast::BroadcastEngine;
use chainpay_core::collaborators::{ConfiguredMerchants, StaticRates, TransactionSigner};
use chainpay_core::currency::CurrencyRegistry;
use chainpay_core::derivation::AddressBook;
use chainpay_core::events::PaymentEventSender;
use chainpay_core::fees::FeeEngine;
use chainpay_core::processors::{Payouts, Reconciler};
use chainpay_core::store::PaymentStore;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Secrets that can be swapped by a SIGHUP reload.
#[derive(Debug, Clone)]
pub struct Secrets {
    /// Key of the provider's `x-payload-hash` HMAC.
    pub provider: Box<[u8]>,
    /// Argon2 PHC string of the admin secret.
    pub admin_hash: String,
}

/// Application state that is shared across all request handlers.
///
/// This is cloneable and cheap to pass around (everything is behind Arc).
#[derive(Clone)]
pub struct AppState {
    pub currencies: Arc<CurrencyRegistry>,
    pub reconciler: Reconciler,
    pub payouts: Payouts,
    pub fees: FeeEngine,
    pub broadcaster: BroadcastEngine,
    pub address_book: AddressBook,
    /// Reloadable merchant table.
    pub merchants: ConfiguredMerchants,
    /// Reloadable USD rates.
    pub rates: StaticRates,
    pub secrets: Arc<RwLock<Secrets>>,
}

impl AppState {
    /// Wire the engines and processors described by `config` around `store`.
    pub fn new(
        store: Arc<dyn PaymentStore>,
        config: LoadedConfig,
        events: PaymentEventSender,
        signer: Arc<dyn TransactionSigner>,
    ) -> Self {
        let currencies = Arc::new(config.currencies);
        let rates = StaticRates::new(config.rates);
        let merchants = ConfiguredMerchants::new(config.merchants);

        let fees = build_fee_engine(currencies.clone(), Arc::new(rates.clone()), &config.rpc);
        let broadcaster = build_broadcast_engine(&currencies, &config.rpc, config.confirmation);
        let reconciler = Reconciler::new(store.clone(), currencies.clone(), events);
        let payouts = Payouts::new(
            store.clone(),
            currencies.clone(),
            fees.clone(),
            broadcaster.clone(),
            signer,
        );

        Self {
            address_book: AddressBook::new(store),
            currencies,
            reconciler,
            payouts,
            fees,
            broadcaster,
            merchants,
            rates,
            secrets: Arc::new(RwLock::new(Secrets {
                provider: config.provider_secret,
                admin_hash: config.admin_secret_hash,
            })),
        }
    }

    /// Apply the reloadable sections of a fresh configuration.
    ///
    /// Node endpoints, currencies and the listen address need a restart.
    pub async fn apply_reload(&self, config: LoadedConfig) {
        self.merchants.replace(config.merchants).await;
        self.rates.replace(config.rates).await;
        *self.secrets.write().await = Secrets {
            provider: config.provider_secret,
            admin_hash: config.admin_secret_hash,
        };
    }
}
