//! Merchant contact configuration.

use url::Url;

/// Where and how a merchant receives payment notifications.
#[derive(Debug, Clone)]
pub struct MerchantContact {
    pub id: i64,
    /// Human-readable merchant name.
    pub name: String,
    pub notify_url: Url,
    /// Secret key bytes for HMAC signing.
    pub secret: Box<[u8]>,
}

impl MerchantContact {
    pub fn new(id: i64, name: String, notify_url: Url, secret: impl Into<Box<[u8]>>) -> Self {
        Self {
            id,
            name,
            notify_url,
            secret: secret.into(),
        }
    }

    /// Get the secret key bytes for HMAC signing.
    pub fn secret_bytes(&self) -> &[u8] {
        &self.secret
    }
}
