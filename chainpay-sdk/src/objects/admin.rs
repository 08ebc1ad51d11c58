//! Admin API request and response types.
//!
//! Amounts are decimal strings in whole units unless a field says otherwise.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::blockchains::Blockchain;
use super::transactions::{TransactionStatus, TransactionType};

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Send funds from a hot wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePayoutRequest {
    pub wallet_id: i64,
    pub currency: String,
    pub recipient: String,
    pub amount: String,
    #[serde(default)]
    pub is_test: bool,
}

/// Register a merchant's extended public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterXpubWalletRequest {
    pub merchant_id: i64,
    pub blockchain: Blockchain,
    pub xpub: String,
    /// Defaults to the chain's BIP44 external chain prefix.
    #[serde(default)]
    pub derivation_path: Option<String>,
}

/// Query of `GET /fees/{ticker}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeQuery {
    #[serde(default)]
    pub is_test: bool,
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminTransactionResponse {
    pub id: i64,
    pub transaction_id: Uuid,
    pub merchant_id: Option<i64>,
    pub transaction_type: TransactionType,
    pub status: TransactionStatus,
    pub blockchain: Blockchain,
    pub network_id: String,
    pub currency: String,
    /// Integer amount in the currency's smallest unit.
    pub amount_units: String,
    pub hash: Option<String>,
    pub sender_address: Option<String>,
    pub recipient_address: String,
    pub is_test: bool,
    pub is_unexpected: bool,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XpubWalletResponse {
    pub id: i64,
    pub wallet_id: Uuid,
    pub merchant_id: i64,
    pub blockchain: Blockchain,
    pub derivation_path: String,
    pub last_derived_index: i32,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedAddressResponse {
    pub id: i64,
    /// Identifier the notification provider posts back to.
    pub target_id: Uuid,
    pub xpub_wallet_id: i64,
    pub blockchain: Blockchain,
    pub address: String,
    pub derivation_path: String,
    pub derivation_index: i32,
    pub is_used: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeQuoteResponse {
    pub blockchain: Blockchain,
    pub currency: String,
    pub is_test: bool,
    /// Ticker the fee is paid in.
    pub fee_currency: String,
    pub fee: String,
    pub fee_usd: String,
    /// What the merchant is charged for a withdrawal.
    pub withdrawal_fee_usd: String,
    /// Chain-specific fee parameters.
    pub details: serde_json::Value,
    pub calculated_at: i64,
}
