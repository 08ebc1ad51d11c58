use crate::config::MerchantContact;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[async_trait]
pub trait MerchantDirectory: Send + Sync {
    async fn merchant(&self, merchant_id: i64) -> Option<MerchantContact>;
}

/// Merchants loaded from the configuration file, replaced on reload.
#[derive(Debug, Clone, Default)]
pub struct ConfiguredMerchants {
    merchants: Arc<RwLock<HashMap<i64, MerchantContact>>>,
}

impl ConfiguredMerchants {
    pub fn new(merchants: impl IntoIterator<Item = MerchantContact>) -> Self {
        Self {
            merchants: Arc::new(RwLock::new(index(merchants))),
        }
    }

    pub async fn replace(&self, merchants: impl IntoIterator<Item = MerchantContact>) {
        *self.merchants.write().await = index(merchants);
    }

    pub async fn count(&self) -> usize {
        self.merchants.read().await.len()
    }
}

fn index(merchants: impl IntoIterator<Item = MerchantContact>) -> HashMap<i64, MerchantContact> {
    merchants.into_iter().map(|m| (m.id, m)).collect()
}

#[async_trait]
impl MerchantDirectory for ConfiguredMerchants {
    async fn merchant(&self, merchant_id: i64) -> Option<MerchantContact> {
        self.merchants.read().await.get(&merchant_id).cloned()
    }
}
