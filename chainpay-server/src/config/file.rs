//! TOML file configuration structures.
//!
//! These structs directly map to the `chainpay-config.toml` file format.

use chainpay_core::currency::CryptoCurrency;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::{Ipv4Addr, SocketAddr};
use url::Url;

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub admin: AdminConfig,
    pub provider: ProviderConfig,
    #[serde(default)]
    pub confirmation: ConfirmationConfig,
    pub kms: KmsConfig,
    /// Node endpoints keyed by chain name (`"ETH"`, `"TRON"`, ...).
    #[serde(default)]
    pub rpc: BTreeMap<String, RpcPairConfig>,
    /// USD price of one whole unit, keyed by ticker.
    #[serde(default)]
    pub rates: BTreeMap<String, Decimal>,
    #[serde(default)]
    pub merchants: Vec<MerchantConfig>,
    /// Replaces the built-in currency table when non-empty.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub currencies: Vec<CryptoCurrency>,
}

/// Server configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The address and port to listen on (e.g., "0.0.0.0:8080").
    #[serde(default = "default_listen_addr")]
    pub listen: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8080))
}

/// Admin configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    /// The admin secret. If this is plaintext (doesn't start with `$argon2`),
    /// it will be hashed and the config file will be rewritten.
    pub secret: String,
}

/// Shared secret of the blockchain notification provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub secret: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_watch_interval_secs")]
    pub watch_interval_secs: u64,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            interval_secs: default_interval_secs(),
            watch_interval_secs: default_watch_interval_secs(),
        }
    }
}

fn default_max_attempts() -> u32 {
    30
}

fn default_interval_secs() -> u64 {
    2
}

fn default_watch_interval_secs() -> u64 {
    15
}

/// Remote signing service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KmsConfig {
    pub url: Url,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcPairConfig {
    pub mainnet: RpcEndpointConfig,
    pub testnet: RpcEndpointConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcEndpointConfig {
    pub url: Url,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

/// A merchant that receives payment notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerchantConfig {
    pub id: i64,
    /// Human-readable merchant name.
    pub name: String,
    /// Endpoint notifications are POSTed to.
    pub notify_url: Url,
    /// Secret key for signing notifications.
    pub secret: String,
}

impl FileConfig {
    /// Check if the admin secret is already hashed (argon2 format).
    pub fn is_admin_secret_hashed(&self) -> bool {
        self.admin.secret.starts_with("$argon2")
    }
}
