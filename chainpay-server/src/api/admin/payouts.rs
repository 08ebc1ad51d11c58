use axum::{Json, extract::State, http::StatusCode};
use chainpay_core::entities::transaction::Transaction;
use chainpay_core::processors::PayoutRequest;
use chainpay_sdk::objects::admin::{AdminTransactionResponse, CreatePayoutRequest};

use crate::api::extractors::AdminAuth;
use crate::state::AppState;

use super::AdminApiError;

/// `POST /payouts`: sign and broadcast a transfer from a hot wallet.
///
/// Returns the `InProgress` transaction; settlement is picked up by the
/// confirmation watcher.
pub async fn create_payout(
    State(state): State<AppState>,
    _auth: AdminAuth,
    Json(request): Json<CreatePayoutRequest>,
) -> Result<(StatusCode, Json<AdminTransactionResponse>), AdminApiError> {
    let transaction = state
        .payouts
        .send(&PayoutRequest {
            wallet_id: request.wallet_id,
            currency: request.currency,
            recipient: request.recipient,
            amount: request.amount,
            is_test: request.is_test,
        })
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(transaction_to_admin_response(&transaction)),
    ))
}

pub(crate) fn transaction_to_admin_response(t: &Transaction) -> AdminTransactionResponse {
    AdminTransactionResponse {
        id: t.id,
        transaction_id: t.uuid,
        merchant_id: t.merchant_id,
        transaction_type: t.tx_type.into(),
        status: t.status.into(),
        blockchain: t.blockchain.into(),
        network_id: t.network_id.clone(),
        currency: t.currency.clone(),
        amount_units: t.amount.normalize().to_string(),
        hash: t.hash.clone(),
        sender_address: t.sender_address.clone(),
        recipient_address: t.recipient_address.clone(),
        is_test: t.is_test,
        is_unexpected: t.is_unexpected,
        created_at: t.created_at.assume_utc().unix_timestamp(),
    }
}
