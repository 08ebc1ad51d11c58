use super::{http_client, RpcError};
use crate::config::RpcEndpoint;
use crate::derivation::encoding::tron_hex_to_base58;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

/// Fee and execution result of a mined transaction
/// (`/wallet/gettransactioninfobyid`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TronTransactionInfo {
    #[serde(default)]
    pub id: String,
    /// Total fee in sun.
    #[serde(default)]
    pub fee: u64,
    #[serde(rename = "blockNumber", default)]
    pub block_number: u64,
    /// `"FAILED"` when the transaction failed; absent otherwise.
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub receipt: TronResourceReceipt,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TronResourceReceipt {
    /// Contract execution result, e.g. `SUCCESS` or `REVERT`. Plain TRX
    /// transfers leave it empty.
    #[serde(default)]
    pub result: Option<String>,
}

impl TronTransactionInfo {
    pub fn succeeded(&self) -> bool {
        self.result.as_deref() != Some("FAILED")
            && self
                .receipt
                .result
                .as_deref()
                .is_none_or(|r| r == "SUCCESS")
    }
}

/// A transaction body (`/wallet/gettransactionbyid`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TronTransaction {
    #[serde(rename = "txID")]
    pub tx_id: String,
    pub raw_data: TronRawData,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TronRawData {
    #[serde(default)]
    pub contract: Vec<TronContract>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TronContract {
    pub parameter: TronContractParameter,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TronContractParameter {
    pub value: TronContractValue,
}

/// Hex (`41...`) addresses of one contract call.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TronContractValue {
    pub owner_address: Option<String>,
    /// Set for TRX transfers.
    pub to_address: Option<String>,
    /// Set for smart-contract calls such as TRC-20 transfers.
    pub contract_address: Option<String>,
}

impl TronTransaction {
    fn first_value(&self) -> Option<&TronContractValue> {
        self.raw_data.contract.first().map(|c| &c.parameter.value)
    }

    pub fn sender(&self) -> Option<String> {
        tron_hex_to_base58(self.first_value()?.owner_address.as_deref()?)
    }

    pub fn recipient(&self) -> Option<String> {
        let value = self.first_value()?;
        let hex = value
            .to_address
            .as_deref()
            .or(value.contract_address.as_deref())?;
        tron_hex_to_base58(hex)
    }
}

#[async_trait]
pub trait TronApi: Send + Sync {
    /// Broadcast a signed transaction and return its id. The payload is
    /// either the hex-encoded protobuf or the signed transaction JSON.
    async fn broadcast(&self, signed: &str) -> Result<String, RpcError>;

    async fn transaction(&self, txid: &str) -> Result<Option<TronTransaction>, RpcError>;

    async fn transaction_info(&self, txid: &str) -> Result<Option<TronTransactionInfo>, RpcError>;

    async fn now_block_number(&self) -> Result<u64, RpcError>;
}

#[derive(Debug, Deserialize)]
struct BroadcastResponse {
    #[serde(default)]
    result: bool,
    #[serde(default)]
    txid: Option<String>,
    #[serde(default)]
    code: Option<String>,
    /// Hex-encoded error text.
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NowBlock {
    block_header: BlockHeader,
}

#[derive(Debug, Deserialize)]
struct BlockHeader {
    raw_data: BlockRawData,
}

#[derive(Debug, Deserialize)]
struct BlockRawData {
    number: u64,
}

/// [`TronApi`] over the TronGrid full-node HTTP API.
#[derive(Debug, Clone)]
pub struct TronGrid {
    http: reqwest::Client,
    endpoint: RpcEndpoint,
}

impl TronGrid {
    const API_KEY_HEADER: &str = "TRON-PRO-API-KEY";

    pub fn new(endpoint: RpcEndpoint, timeout: Duration) -> Self {
        Self {
            http: http_client(timeout),
            endpoint,
        }
    }

    async fn post_raw<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<String, RpcError> {
        let url = format!(
            "{}/wallet/{path}",
            self.endpoint.url.as_str().trim_end_matches('/')
        );
        let mut builder = self.http.post(url).json(body);
        if let Some(key) = &self.endpoint.api_key {
            builder = builder.header(Self::API_KEY_HEADER, key);
        }
        Ok(builder.send().await?.text().await?)
    }

    /// Lookups answer `{}` for unknown ids.
    async fn lookup<T: DeserializeOwned>(&self, path: &str, txid: &str) -> Result<Option<T>, RpcError> {
        let body = self.post_raw(path, &json!({ "value": txid })).await?;
        let value: serde_json::Value =
            serde_json::from_str(&body).map_err(|e| RpcError::Decode(format!("{path}: {e}")))?;
        if value.as_object().is_some_and(|o| o.is_empty()) {
            return Ok(None);
        }
        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| RpcError::Decode(format!("{path}: {e}")))
    }
}

fn decode_message(message: &str) -> String {
    hex::decode(message)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_else(|| message.to_owned())
}

#[async_trait]
impl TronApi for TronGrid {
    async fn broadcast(&self, signed: &str) -> Result<String, RpcError> {
        let signed = signed.trim();
        let body = if signed.starts_with('{') {
            let transaction: serde_json::Value = serde_json::from_str(signed)
                .map_err(|e| RpcError::Decode(format!("signed transaction: {e}")))?;
            self.post_raw("broadcasttransaction", &transaction).await?
        } else {
            self.post_raw("broadcasthex", &json!({ "transaction": signed }))
                .await?
        };

        let response: BroadcastResponse = serde_json::from_str(&body)
            .map_err(|e| RpcError::Decode(format!("broadcast: {e}")))?;
        match response {
            BroadcastResponse {
                result: true,
                txid: Some(txid),
                ..
            } => Ok(txid),
            BroadcastResponse { code, message, .. } => Err(RpcError::Provider {
                code: 0,
                message: format!(
                    "{}: {}",
                    code.as_deref().unwrap_or("BROADCAST_FAILED"),
                    message.as_deref().map(decode_message).unwrap_or_default()
                ),
                body,
            }),
        }
    }

    async fn transaction(&self, txid: &str) -> Result<Option<TronTransaction>, RpcError> {
        self.lookup("gettransactionbyid", txid).await
    }

    async fn transaction_info(&self, txid: &str) -> Result<Option<TronTransactionInfo>, RpcError> {
        self.lookup("gettransactioninfobyid", txid).await
    }

    async fn now_block_number(&self) -> Result<u64, RpcError> {
        let body = self.post_raw("getnowblock", &json!({})).await?;
        let block: NowBlock =
            serde_json::from_str(&body).map_err(|e| RpcError::Decode(format!("getnowblock: {e}")))?;
        Ok(block.block_header.raw_data.number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_parties_are_base58() {
        let tx: TronTransaction = serde_json::from_value(json!({
            "txID": "abc",
            "raw_data": {
                "contract": [{
                    "parameter": {
                        "value": {
                            "owner_address": "41a614f803b6fd780986a42c78ec9c7f77e6ded13c",
                            "contract_address": "41a614f803b6fd780986a42c78ec9c7f77e6ded13c"
                        },
                        "type_url": "type.googleapis.com/protocol.TriggerSmartContract"
                    },
                    "type": "TriggerSmartContract"
                }]
            }
        }))
        .unwrap();
        assert_eq!(tx.sender().as_deref(), Some("TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t"));
        assert_eq!(tx.recipient(), tx.sender());
    }

    #[test]
    fn test_execution_result() {
        let ok: TronTransactionInfo = serde_json::from_value(json!({
            "id": "abc",
            "fee": 345000,
            "blockNumber": 100,
            "receipt": { "net_fee": 345000 }
        }))
        .unwrap();
        assert!(ok.succeeded());
        assert_eq!(ok.fee, 345_000);

        let reverted: TronTransactionInfo = serde_json::from_value(json!({
            "id": "abc",
            "result": "FAILED",
            "receipt": { "result": "REVERT" }
        }))
        .unwrap();
        assert!(!reverted.succeeded());
    }

    #[test]
    fn test_error_messages_are_hex() {
        assert_eq!(decode_message("5369676e6174757265206572726f72"), "Signature error");
        assert_eq!(decode_message("not hex"), "not hex");
    }
}
