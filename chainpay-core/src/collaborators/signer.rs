use crate::currency::CurrencyKind;
use crate::error::ErrorClass;
use crate::fees::FeeDetails;
use crate::rpc::http_client;
use async_trait::async_trait;
use chainpay_sdk::objects::Blockchain;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use url::Url;
use uuid::Uuid;

/// Everything the signing service needs to build one outbound transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SigningIntent {
    /// External id of the sending hot wallet.
    pub wallet_id: Uuid,
    pub blockchain: Blockchain,
    pub is_test: bool,
    pub network_id: String,
    pub asset_type: CurrencyKind,
    pub contract_address: Option<String>,
    pub recipient: String,
    /// Integer amount in the currency's smallest unit.
    pub amount: String,
    pub nonce: u64,
    pub fee: FeeDetails,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedPayload {
    pub raw_transaction: String,
    /// Some signers already know the resulting chain hash.
    #[serde(default)]
    pub hash: Option<String>,
}

#[derive(Debug, Error)]
pub enum SignerError {
    /// HTTP request error
    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("signer rejected the request with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("malformed signer response: {0}")]
    Decode(String),
}

impl SignerError {
    pub fn class(&self) -> ErrorClass {
        match self {
            SignerError::Rejected { status, .. } if (400..500).contains(status) => {
                ErrorClass::InvalidTransaction
            }
            _ => ErrorClass::Upstream,
        }
    }
}

#[async_trait]
pub trait TransactionSigner: Send + Sync {
    async fn sign(&self, intent: &SigningIntent) -> Result<SignedPayload, SignerError>;
}

/// [`TransactionSigner`] backed by the key-management HTTP service.
#[derive(Debug, Clone)]
pub struct KmsClient {
    http: reqwest::Client,
    base_url: Url,
}

impl KmsClient {
    pub fn new(base_url: Url, timeout: Duration) -> Self {
        Self {
            http: http_client(timeout),
            base_url,
        }
    }

    fn transaction_url(&self, intent: &SigningIntent) -> String {
        format!(
            "{}/api/kms/v1/wallet/{}/transaction/{}",
            self.base_url.as_str().trim_end_matches('/'),
            intent.wallet_id,
            intent.blockchain.as_str().to_ascii_lowercase()
        )
    }
}

#[async_trait]
impl TransactionSigner for KmsClient {
    #[tracing::instrument(skip_all, err, fields(wallet_id = %intent.wallet_id, blockchain = %intent.blockchain))]
    async fn sign(&self, intent: &SigningIntent) -> Result<SignedPayload, SignerError> {
        let response = self
            .http
            .post(self.transaction_url(intent))
            .json(intent)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(SignerError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        serde_json::from_str(&body).map_err(|e| SignerError::Decode(e.to_string()))
    }
}
