//! Inbound provider notifications and outbound merchant notifications.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::blockchains::Blockchain;
use super::transactions::{TransactionStatus, TransactionType};
use crate::signature::Signature;

/// A deposit notification as delivered by the chain-watching provider.
///
/// `asset` is either a native coin name, a token contract address or a token
/// ticker such as `USDT_TRON`. `amount` is a decimal string in whole units
/// ("0.000123"), never in the smallest unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderWebhook {
    #[serde(default)]
    pub subscription_type: String,
    #[serde(rename = "txId")]
    pub tx_id: String,
    pub address: String,
    #[serde(rename = "counterAddress", default)]
    pub sender: Option<String>,
    pub asset: String,
    pub amount: String,
    #[serde(default)]
    pub block_number: Option<i64>,
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Set only by account-model chains while the transaction is unconfirmed.
    #[serde(default)]
    pub mempool: bool,
    #[serde(default)]
    pub chain: String,
}

/// Classification of the provider's free-form `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderWebhookKind {
    Native,
    Token,
    /// Fee-only movement, never a payment.
    Fee,
    Other,
}

impl ProviderWebhook {
    pub fn webhook_kind(&self) -> ProviderWebhookKind {
        match self.kind.as_str() {
            "native" => ProviderWebhookKind::Native,
            "token" | "trc20" | "erc20" | "bep20" | "spl" => ProviderWebhookKind::Token,
            "fee" => ProviderWebhookKind::Fee,
            _ => ProviderWebhookKind::Other,
        }
    }

    /// Anything that is not explicitly a native transfer is treated as a token.
    pub fn is_native(&self) -> bool {
        self.webhook_kind() == ProviderWebhookKind::Native
    }
}

/// Event carried by a [`PaymentNotification`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    PaymentReceived,
    UnexpectedPaymentReceived,
    WithdrawalSettled,
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationKind::PaymentReceived => write!(f, "payment_received"),
            NotificationKind::UnexpectedPaymentReceived => {
                write!(f, "unexpected_payment_received")
            }
            NotificationKind::WithdrawalSettled => write!(f, "withdrawal_settled"),
        }
    }
}

/// Signed notification POSTed to the merchant's endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentNotification {
    pub event_type: NotificationKind,
    pub transaction_id: Uuid,
    pub merchant_id: i64,
    pub blockchain: Blockchain,
    pub ticker: String,
    /// Decimal string in whole units.
    pub amount: String,
    pub network_id: String,
    pub is_test: bool,
    pub transaction_type: TransactionType,
    pub status: TransactionStatus,
    pub transaction_hash: Option<String>,
    pub sender_address: Option<String>,
    pub recipient_address: String,
    pub timestamp: i64,
}

impl Signature for PaymentNotification {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_provider_payload() {
        let json = r#"{
            "subscriptionType": "ADDRESS_TRANSACTION",
            "txId": "0xabc",
            "address": "0x91860ef4fc12f4dca2564a3f7fccea9325831ac6",
            "counterAddress": "0x29379f45f515c494483298225d1b347f73d1babf",
            "asset": "ETH",
            "amount": "0.5",
            "blockNumber": 17000000,
            "type": "native",
            "chain": "ethereum-mainnet"
        }"#;
        let webhook: ProviderWebhook = serde_json::from_str(json).unwrap();
        assert_eq!(webhook.tx_id, "0xabc");
        assert!(webhook.is_native());
        assert!(!webhook.mempool);
        assert_eq!(webhook.block_number, Some(17000000));
        assert_eq!(
            webhook.sender.as_deref(),
            Some("0x29379f45f515c494483298225d1b347f73d1babf")
        );
    }

    #[test]
    fn unknown_kind_is_not_native() {
        let json = r#"{"txId":"h","address":"a","asset":"USDT_TRON","amount":"1","type":"trc20"}"#;
        let webhook: ProviderWebhook = serde_json::from_str(json).unwrap();
        assert_eq!(webhook.webhook_kind(), ProviderWebhookKind::Token);
        assert!(webhook.sender.is_none());

        let json = r#"{"txId":"h","address":"a","asset":"X","amount":"1","type":"internal"}"#;
        let webhook: ProviderWebhook = serde_json::from_str(json).unwrap();
        assert_eq!(webhook.webhook_kind(), ProviderWebhookKind::Other);
        assert!(!webhook.is_native());
    }
}
