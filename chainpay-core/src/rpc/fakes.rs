//! In-memory node doubles for engine tests.

use super::{
    EvmReceipt, EvmRpc, EvmTransaction, RpcError, SignatureStatus, SolanaRpc, TronApi,
    TronTransaction, TronTransactionInfo,
};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

fn rejection(message: &str) -> RpcError {
    RpcError::Provider {
        code: -32000,
        message: message.to_owned(),
        body: serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": { "code": -32000, "message": message }
        })
        .to_string(),
    }
}

#[derive(Default)]
pub(crate) struct FakeEvm {
    pub gas_price: u128,
    pub priority_fee: u128,
    pub block_number: u128,
    pub reject_with: Option<String>,
    pub transactions: HashMap<String, EvmTransaction>,
    pub receipts: HashMap<String, EvmReceipt>,
    pub sent: Mutex<Vec<String>>,
}

#[async_trait]
impl EvmRpc for FakeEvm {
    async fn gas_price(&self) -> Result<u128, RpcError> {
        Ok(self.gas_price)
    }

    async fn max_priority_fee(&self) -> Result<u128, RpcError> {
        Ok(self.priority_fee)
    }

    async fn block_number(&self) -> Result<u128, RpcError> {
        Ok(self.block_number)
    }

    async fn send_raw_transaction(&self, raw: &str) -> Result<String, RpcError> {
        if let Some(message) = &self.reject_with {
            return Err(rejection(message));
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push(raw.to_owned());
        Ok(format!("0x{:064x}", sent.len()))
    }

    async fn transaction_by_hash(&self, hash: &str) -> Result<Option<EvmTransaction>, RpcError> {
        Ok(self.transactions.get(hash).cloned())
    }

    async fn transaction_receipt(&self, hash: &str) -> Result<Option<EvmReceipt>, RpcError> {
        Ok(self.receipts.get(hash).cloned())
    }
}

#[derive(Default)]
pub(crate) struct FakeTron {
    pub block_number: u64,
    pub reject_with: Option<String>,
    pub transactions: HashMap<String, TronTransaction>,
    pub infos: HashMap<String, TronTransactionInfo>,
}

#[async_trait]
impl TronApi for FakeTron {
    async fn broadcast(&self, signed: &str) -> Result<String, RpcError> {
        match &self.reject_with {
            Some(message) => Err(rejection(message)),
            None => Ok(format!("tx-{}", signed.len())),
        }
    }

    async fn transaction(&self, txid: &str) -> Result<Option<TronTransaction>, RpcError> {
        Ok(self.transactions.get(txid).cloned())
    }

    async fn transaction_info(&self, txid: &str) -> Result<Option<TronTransactionInfo>, RpcError> {
        Ok(self.infos.get(txid).cloned())
    }

    async fn now_block_number(&self) -> Result<u64, RpcError> {
        Ok(self.block_number)
    }
}

/// Answers status queries from a script; an exhausted script keeps
/// answering "not seen yet".
#[derive(Default)]
pub(crate) struct FakeSolana {
    pub statuses: Mutex<VecDeque<Option<SignatureStatus>>>,
    pub queries: Mutex<u32>,
    /// Reported by `transaction_fee`; `None` means no metadata.
    pub fee: Option<u64>,
}

impl FakeSolana {
    pub fn scripted(statuses: impl IntoIterator<Item = Option<SignatureStatus>>) -> Self {
        Self {
            statuses: Mutex::new(statuses.into_iter().collect()),
            queries: Mutex::new(0),
            fee: None,
        }
    }

    pub fn with_fee(mut self, lamports: u64) -> Self {
        self.fee = Some(lamports);
        self
    }

    pub fn query_count(&self) -> u32 {
        *self.queries.lock().unwrap()
    }
}

#[async_trait]
impl SolanaRpc for FakeSolana {
    async fn send_transaction(&self, signed: &str) -> Result<String, RpcError> {
        Ok(format!("sig-{}", signed.len()))
    }

    async fn signature_status(&self, _signature: &str) -> Result<Option<SignatureStatus>, RpcError> {
        *self.queries.lock().unwrap() += 1;
        Ok(self.statuses.lock().unwrap().pop_front().flatten())
    }

    async fn transaction_fee(&self, _signature: &str) -> Result<Option<u64>, RpcError> {
        Ok(self.fee)
    }
}
