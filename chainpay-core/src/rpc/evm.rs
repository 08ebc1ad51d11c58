use super::{deserialize_opt_quantity, deserialize_quantity, parse_quantity, JsonRpcClient, RpcError};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

/// A transaction as returned by `eth_getTransactionByHash`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvmTransaction {
    pub hash: String,
    pub from: String,
    /// `None` for contract creation.
    pub to: Option<String>,
    #[serde(deserialize_with = "deserialize_quantity")]
    pub nonce: u128,
    #[serde(default, deserialize_with = "deserialize_opt_quantity")]
    pub block_number: Option<u128>,
}

/// The fields of `eth_getTransactionReceipt` the engines use.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvmReceipt {
    pub transaction_hash: String,
    #[serde(deserialize_with = "deserialize_quantity")]
    pub block_number: u128,
    #[serde(deserialize_with = "deserialize_quantity")]
    pub gas_used: u128,
    #[serde(deserialize_with = "deserialize_quantity")]
    pub effective_gas_price: u128,
    /// `1` for success, `0` for revert.
    #[serde(deserialize_with = "deserialize_quantity")]
    pub status: u128,
}

impl EvmReceipt {
    pub fn succeeded(&self) -> bool {
        self.status == 1
    }
}

#[async_trait]
pub trait EvmRpc: Send + Sync {
    /// Suggested legacy gas price in wei.
    async fn gas_price(&self) -> Result<u128, RpcError>;

    /// Suggested priority fee (tip) in wei.
    async fn max_priority_fee(&self) -> Result<u128, RpcError>;

    async fn block_number(&self) -> Result<u128, RpcError>;

    /// Submit a hex-encoded signed transaction and return its hash.
    async fn send_raw_transaction(&self, raw: &str) -> Result<String, RpcError>;

    async fn transaction_by_hash(&self, hash: &str) -> Result<Option<EvmTransaction>, RpcError>;

    async fn transaction_receipt(&self, hash: &str) -> Result<Option<EvmReceipt>, RpcError>;
}

/// [`EvmRpc`] over a standard Ethereum JSON-RPC endpoint.
#[derive(Debug, Clone)]
pub struct EvmJsonRpc {
    client: JsonRpcClient,
}

impl EvmJsonRpc {
    pub fn new(client: JsonRpcClient) -> Self {
        Self { client }
    }

    async fn quantity(&self, method: &str) -> Result<u128, RpcError> {
        let raw: String = self.client.call(method, json!([])).await?;
        parse_quantity(&raw)
    }
}

#[async_trait]
impl EvmRpc for EvmJsonRpc {
    async fn gas_price(&self) -> Result<u128, RpcError> {
        self.quantity("eth_gasPrice").await
    }

    async fn max_priority_fee(&self) -> Result<u128, RpcError> {
        self.quantity("eth_maxPriorityFeePerGas").await
    }

    async fn block_number(&self) -> Result<u128, RpcError> {
        self.quantity("eth_blockNumber").await
    }

    async fn send_raw_transaction(&self, raw: &str) -> Result<String, RpcError> {
        let raw = if raw.starts_with("0x") {
            raw.to_owned()
        } else {
            format!("0x{raw}")
        };
        self.client.call("eth_sendRawTransaction", json!([raw])).await
    }

    async fn transaction_by_hash(&self, hash: &str) -> Result<Option<EvmTransaction>, RpcError> {
        self.client
            .call("eth_getTransactionByHash", json!([hash]))
            .await
    }

    async fn transaction_receipt(&self, hash: &str) -> Result<Option<EvmReceipt>, RpcError> {
        self.client
            .call("eth_getTransactionReceipt", json!([hash]))
            .await
    }
}
