//! Clients for upstream chain nodes.
//!
//! Each chain family gets a narrow trait (`EvmRpc`, `TronApi`, `SolanaRpc`)
//! covering only the calls the fee and broadcast engines need, plus one
//! HTTP implementation. Tests substitute in-memory fakes.

pub mod evm;
pub mod solana;
pub mod tron;

#[cfg(test)]
pub(crate) mod fakes;

use crate::config::RpcEndpoint;
use crate::error::ErrorClass;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;
use thiserror::Error;

pub use evm::{EvmJsonRpc, EvmReceipt, EvmRpc, EvmTransaction};
pub use solana::{SignatureStatus, SolanaJsonRpc, SolanaRpc};
pub use tron::{TronApi, TronGrid, TronTransaction, TronTransactionInfo};

/// Default per-request timeout for upstream calls.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum RpcError {
    /// HTTP request error
    #[error("HTTP request error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The node answered with an error object. `body` is the raw response.
    #[error("provider error {code}: {message}")]
    Provider {
        code: i64,
        message: String,
        body: String,
    },

    #[error("malformed response: {0}")]
    Decode(String),
}

impl RpcError {
    pub fn class(&self) -> ErrorClass {
        ErrorClass::Upstream
    }

    /// Raw provider response, when there is one.
    pub fn body(&self) -> Option<&str> {
        match self {
            RpcError::Provider { body, .. } => Some(body),
            _ => None,
        }
    }
}

pub(crate) fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

#[derive(Serialize)]
struct JsonRpcRequest<'a, P> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: P,
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: serde_json::Value,
    #[serde(default)]
    error: Option<JsonRpcErrorObject>,
}

#[derive(Deserialize)]
struct JsonRpcErrorObject {
    code: i64,
    message: String,
}

/// Minimal JSON-RPC 2.0 client over HTTP.
#[derive(Debug, Clone)]
pub struct JsonRpcClient {
    http: reqwest::Client,
    endpoint: RpcEndpoint,
    api_key_header: &'static str,
}

impl JsonRpcClient {
    pub fn new(endpoint: RpcEndpoint, timeout: Duration) -> Self {
        Self {
            http: http_client(timeout),
            endpoint,
            api_key_header: "x-api-key",
        }
    }

    pub fn with_api_key_header(mut self, header: &'static str) -> Self {
        self.api_key_header = header;
        self
    }

    pub fn endpoint(&self) -> &RpcEndpoint {
        &self.endpoint
    }

    /// Call `method` and decode its `result`. A JSON `null` result decodes
    /// into `Option::None` when `R` is an option.
    pub async fn call<P, R>(&self, method: &str, params: P) -> Result<R, RpcError>
    where
        P: Serialize + Send,
        R: DeserializeOwned,
    {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method,
            params,
        };
        let mut builder = self.http.post(self.endpoint.url.clone()).json(&request);
        if let Some(key) = &self.endpoint.api_key {
            builder = builder.header(self.api_key_header, key);
        }
        let body = builder.send().await?.text().await?;

        let response: JsonRpcResponse = serde_json::from_str(&body)
            .map_err(|e| RpcError::Decode(format!("{method}: {e}")))?;
        if let Some(error) = response.error {
            return Err(RpcError::Provider {
                code: error.code,
                message: error.message,
                body,
            });
        }
        serde_json::from_value(response.result)
            .map_err(|e| RpcError::Decode(format!("{method}: {e}")))
    }
}

/// Parse a `0x`-prefixed hex quantity.
pub fn parse_quantity(value: &str) -> Result<u128, RpcError> {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .ok_or_else(|| RpcError::Decode(format!("quantity {value:?} lacks 0x prefix")))?;
    if digits.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(digits, 16)
        .map_err(|e| RpcError::Decode(format!("quantity {value:?}: {e}")))
}

pub(crate) fn deserialize_quantity<'de, D>(deserializer: D) -> Result<u128, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_quantity(&raw).map_err(serde::de::Error::custom)
}

pub(crate) fn deserialize_opt_quantity<'de, D>(deserializer: D) -> Result<Option<u128>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(raw) => parse_quantity(&raw).map(Some).map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("0x0").unwrap(), 0);
        assert_eq!(parse_quantity("0x").unwrap(), 0);
        assert_eq!(parse_quantity("0x5208").unwrap(), 21_000);
        assert_eq!(parse_quantity("0x3B9ACA00").unwrap(), 1_000_000_000);
        assert!(parse_quantity("5208").is_err());
        assert!(parse_quantity("0xzz").is_err());
    }

    #[test]
    fn test_null_result_decodes_to_none() {
        let response: JsonRpcResponse =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"result":null}"#).unwrap();
        let decoded: Option<String> = serde_json::from_value(response.result).unwrap();
        assert!(decoded.is_none());

        let missing: JsonRpcResponse = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32000,"message":"insufficient funds for gas * price + value"}}"#,
        )
        .unwrap();
        let error = missing.error.unwrap();
        assert_eq!(error.code, -32000);
        assert!(error.message.contains("insufficient funds"));
    }
}
