use super::{JsonRpcClient, RpcError};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

/// One entry of `getSignatureStatuses`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureStatus {
    pub slot: u64,
    /// `None` once the block is rooted.
    #[serde(default)]
    pub confirmations: Option<u64>,
    /// Set when the transaction failed on chain.
    #[serde(default)]
    pub err: Option<serde_json::Value>,
    #[serde(default)]
    pub confirmation_status: Option<String>,
}

impl SignatureStatus {
    pub fn failed(&self) -> bool {
        self.err.is_some()
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(
            self.confirmation_status.as_deref(),
            Some("confirmed" | "finalized")
        )
    }
}

#[derive(Deserialize)]
struct StatusesResult {
    value: Vec<Option<SignatureStatus>>,
}

#[derive(Deserialize)]
struct TransactionResult {
    meta: Option<TransactionMeta>,
}

#[derive(Deserialize)]
struct TransactionMeta {
    fee: u64,
}

#[async_trait]
pub trait SolanaRpc: Send + Sync {
    /// Submit a base64-encoded signed transaction and return its signature.
    async fn send_transaction(&self, signed: &str) -> Result<String, RpcError>;

    /// `None` while the cluster has not seen the signature.
    async fn signature_status(&self, signature: &str) -> Result<Option<SignatureStatus>, RpcError>;

    /// Fee in lamports charged for the transaction, `None` if the node has
    /// no metadata for it.
    async fn transaction_fee(&self, signature: &str) -> Result<Option<u64>, RpcError>;
}

#[derive(Debug, Clone)]
pub struct SolanaJsonRpc {
    client: JsonRpcClient,
}

impl SolanaJsonRpc {
    pub fn new(client: JsonRpcClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SolanaRpc for SolanaJsonRpc {
    async fn send_transaction(&self, signed: &str) -> Result<String, RpcError> {
        self.client
            .call(
                "sendTransaction",
                json!([signed, { "encoding": "base64", "preflightCommitment": "confirmed" }]),
            )
            .await
    }

    async fn signature_status(&self, signature: &str) -> Result<Option<SignatureStatus>, RpcError> {
        let result: StatusesResult = self
            .client
            .call(
                "getSignatureStatuses",
                json!([[signature], { "searchTransactionHistory": true }]),
            )
            .await?;
        Ok(result
            .value
            .into_iter()
            .next()
            .flatten()
            .filter(|status| status.slot > 0))
    }

    async fn transaction_fee(&self, signature: &str) -> Result<Option<u64>, RpcError> {
        let result: Option<TransactionResult> = self
            .client
            .call(
                "getTransaction",
                json!([signature, { "encoding": "json", "commitment": "confirmed", "maxSupportedTransactionVersion": 0 }]),
            )
            .await?;
        Ok(result.and_then(|tx| tx.meta).map(|meta| meta.fee))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_flags() {
        let result: StatusesResult = serde_json::from_value(json!({
            "context": { "slot": 82 },
            "value": [
                { "slot": 72, "confirmations": 10, "err": null, "confirmationStatus": "confirmed" },
                null,
                { "slot": 48, "confirmations": null, "err": { "InstructionError": [0, "Custom"] }, "confirmationStatus": "finalized" }
            ]
        }))
        .unwrap();

        let confirmed = result.value[0].as_ref().unwrap();
        assert!(confirmed.is_confirmed());
        assert!(!confirmed.failed());
        assert!(result.value[1].is_none());
        assert!(result.value[2].as_ref().unwrap().failed());
    }

    #[test]
    fn test_transaction_fee_from_meta() {
        let result: Option<TransactionResult> = serde_json::from_value(json!({
            "slot": 72,
            "meta": { "fee": 10000, "err": null },
            "transaction": {}
        }))
        .unwrap();
        assert_eq!(result.and_then(|tx| tx.meta).map(|m| m.fee), Some(10_000));

        let missing: Option<TransactionResult> = serde_json::from_value(json!(null)).unwrap();
        assert!(missing.is_none());
    }
}
