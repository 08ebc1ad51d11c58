//! Configuration module for chainpay-server.
//!
//! Handles loading configuration from TOML files, CLI arguments,
//! and environment variables. Also handles admin secret hashing.

pub mod file;

use crate::config::file::{ConfirmationConfig, FileConfig, RpcEndpointConfig, RpcPairConfig};
use chainpay_core::config::{ConfirmationPolicy, MerchantContact, NetworkPair, RpcEndpoint};
use chainpay_core::currency::CurrencyRegistry;
use chainpay_sdk::objects::{Blockchain, ChainFamily};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("password hashing error: {0}")]
    HashError(String),

    #[error("DATABASE_URL environment variable not set")]
    MissingDatabaseUrl,
}

/// Remote signer settings.
#[derive(Debug, Clone)]
pub struct KmsSettings {
    pub url: Url,
    pub timeout: Duration,
}

/// Loaded configuration result containing all parts.
pub struct LoadedConfig {
    pub listen: SocketAddr,
    pub admin_secret_hash: String,
    pub provider_secret: Box<[u8]>,
    pub confirmation: ConfirmationPolicy,
    pub rpc: HashMap<Blockchain, NetworkPair<RpcEndpoint>>,
    pub kms: KmsSettings,
    pub rates: HashMap<String, Decimal>,
    pub merchants: Vec<MerchantContact>,
    pub currencies: CurrencyRegistry,
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: std::path::PathBuf,
    listen_override: Option<SocketAddr>,
}

impl ConfigLoader {
    /// Create a new config loader.
    pub fn new(config_path: impl AsRef<Path>, listen_override: Option<SocketAddr>) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            listen_override,
        }
    }

    /// Load and process the configuration.
    ///
    /// This will:
    /// 1. Read the TOML file
    /// 2. Apply CLI overrides
    /// 3. Validate the configuration
    /// 4. Hash the admin secret if it's plaintext (and rewrite the file)
    /// 5. Build the loaded configuration
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let config_content = std::fs::read_to_string(&self.config_path)?;
        let mut file_config: FileConfig = toml::from_str(&config_content)?;

        if let Some(listen) = self.listen_override {
            file_config.server.listen = listen;
        }

        let rpc = parse_rpc(&file_config)?;
        let currencies = build_currencies(&file_config)?;
        validate(&file_config)?;

        let secret_hash = if file_config.is_admin_secret_hashed() {
            file_config.admin.secret.clone()
        } else {
            let hash = hash_secret(&file_config.admin.secret)?;
            file_config.admin.secret = hash.clone();
            self.rewrite_config(&file_config)?;
            tracing::info!("Admin secret hashed and config file updated");
            hash
        };

        Ok(LoadedConfig {
            listen: file_config.server.listen,
            admin_secret_hash: secret_hash,
            provider_secret: file_config.provider.secret.into_bytes().into_boxed_slice(),
            confirmation: confirmation_policy(file_config.confirmation),
            rpc,
            kms: KmsSettings {
                url: file_config.kms.url,
                timeout: Duration::from_secs(file_config.kms.timeout_secs),
            },
            rates: file_config.rates.into_iter().collect(),
            merchants: file_config
                .merchants
                .into_iter()
                .map(|m| MerchantContact::new(m.id, m.name, m.notify_url, m.secret.into_bytes()))
                .collect(),
            currencies,
        })
    }

    /// Reload the configuration (used during SIGHUP).
    pub fn reload(&self) -> Result<LoadedConfig, ConfigError> {
        self.load()
    }

    fn rewrite_config(&self, config: &FileConfig) -> Result<(), ConfigError> {
        let toml_string = toml::to_string_pretty(config)?;

        // Write atomically: write to temp file, then rename
        let temp_path = self.config_path.with_extension("toml.tmp");
        std::fs::write(&temp_path, toml_string)?;
        std::fs::rename(&temp_path, &self.config_path)?;

        Ok(())
    }
}

fn validate(config: &FileConfig) -> Result<(), ConfigError> {
    if config.provider.secret.is_empty() {
        return Err(ConfigError::ValidationError(
            "provider secret must not be empty".into(),
        ));
    }
    if config.confirmation.max_attempts == 0 {
        return Err(ConfigError::ValidationError(
            "confirmation.max_attempts must be positive".into(),
        ));
    }
    let mut seen = HashSet::new();
    for merchant in &config.merchants {
        if !seen.insert(merchant.id) {
            return Err(ConfigError::ValidationError(format!(
                "duplicate merchant id {}",
                merchant.id
            )));
        }
    }
    Ok(())
}

/// Only chains with a broadcast path take node endpoints.
fn parse_rpc(
    config: &FileConfig,
) -> Result<HashMap<Blockchain, NetworkPair<RpcEndpoint>>, ConfigError> {
    config
        .rpc
        .iter()
        .map(|(key, pair)| {
            let blockchain: Blockchain = key
                .parse()
                .map_err(|e| ConfigError::ValidationError(format!("rpc.{key}: {e}")))?;
            match blockchain.family() {
                ChainFamily::Evm | ChainFamily::Tron | ChainFamily::Solana => {}
                other => {
                    return Err(ConfigError::ValidationError(format!(
                        "rpc.{key}: {other:?} chains are not broadcast by this server"
                    )));
                }
            }
            Ok((blockchain, endpoint_pair(pair)))
        })
        .collect()
}

fn endpoint_pair(pair: &RpcPairConfig) -> NetworkPair<RpcEndpoint> {
    let convert = |e: &RpcEndpointConfig| RpcEndpoint {
        url: e.url.clone(),
        api_key: e.api_key.clone(),
    };
    NetworkPair::new(convert(&pair.mainnet), convert(&pair.testnet))
}

fn build_currencies(config: &FileConfig) -> Result<CurrencyRegistry, ConfigError> {
    if config.currencies.is_empty() {
        return Ok(CurrencyRegistry::builtin());
    }
    CurrencyRegistry::new(config.currencies.clone())
        .map_err(|e| ConfigError::ValidationError(format!("currencies: {e}")))
}

fn confirmation_policy(config: ConfirmationConfig) -> ConfirmationPolicy {
    ConfirmationPolicy {
        max_attempts: config.max_attempts,
        interval: Duration::from_secs(config.interval_secs),
        watch_interval: Duration::from_secs(config.watch_interval_secs),
    }
}

fn hash_secret(plaintext: &str) -> Result<String, ConfigError> {
    use argon2::{
        Argon2, PasswordHasher,
        password_hash::{SaltString, rand_core::OsRng},
    };

    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(plaintext.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ConfigError::HashError(e.to_string()))
}

/// Check `candidate` against an argon2 PHC string.
pub fn verify_admin_secret(candidate: &str, hash: &str) -> bool {
    use argon2::{Argon2, PasswordHash, PasswordVerifier};

    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(candidate.as_bytes(), &parsed)
        .is_ok()
}

/// Get the database URL from the environment.
pub fn get_database_url() -> Result<String, ConfigError> {
    std::env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)
}
