use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chainpay_core::entities::xpub_wallet::{DerivedAddress, XpubWallet};
use chainpay_sdk::objects::admin::{
    DerivedAddressResponse, RegisterXpubWalletRequest, XpubWalletResponse,
};

use crate::api::extractors::AdminAuth;
use crate::state::AppState;

use super::AdminApiError;

/// `POST /xpub-wallets`: register a merchant's extended public key.
pub async fn register(
    State(state): State<AppState>,
    _auth: AdminAuth,
    Json(request): Json<RegisterXpubWalletRequest>,
) -> Result<(StatusCode, Json<XpubWalletResponse>), AdminApiError> {
    let wallet = state
        .address_book
        .register_xpub_wallet(
            request.merchant_id,
            request.blockchain,
            &request.xpub,
            request.derivation_path.as_deref(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(wallet_response(&wallet))))
}

/// `DELETE /xpub-wallets/{id}`: soft-delete; derived addresses keep working.
pub async fn deactivate(
    State(state): State<AppState>,
    _auth: AdminAuth,
    Path(id): Path<i64>,
) -> Result<StatusCode, AdminApiError> {
    if state.address_book.deactivate_xpub_wallet(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AdminApiError::not_found(format!(
            "no active xpub wallet {id}"
        )))
    }
}

/// `POST /xpub-wallets/{id}/addresses`: derive the next index.
pub async fn derive(
    State(state): State<AppState>,
    _auth: AdminAuth,
    Path(id): Path<i64>,
) -> Result<(StatusCode, Json<DerivedAddressResponse>), AdminApiError> {
    let address = state.address_book.derive_address(id).await?;
    Ok((StatusCode::CREATED, Json(address_response(&address))))
}

/// `GET /xpub-wallets/{id}/next-address`
pub async fn next_unused(
    State(state): State<AppState>,
    _auth: AdminAuth,
    Path(id): Path<i64>,
) -> Result<Json<DerivedAddressResponse>, AdminApiError> {
    let address = state.address_book.get_next_unused_address(id).await?;
    Ok(Json(address_response(&address)))
}

fn wallet_response(w: &XpubWallet) -> XpubWalletResponse {
    XpubWalletResponse {
        id: w.id,
        wallet_id: w.uuid,
        merchant_id: w.merchant_id,
        blockchain: w.blockchain.into(),
        derivation_path: w.derivation_path.clone(),
        last_derived_index: w.last_derived_index,
        is_active: w.is_active,
    }
}

fn address_response(a: &DerivedAddress) -> DerivedAddressResponse {
    DerivedAddressResponse {
        id: a.id,
        target_id: a.uuid,
        xpub_wallet_id: a.xpub_wallet_id,
        blockchain: a.blockchain.into(),
        address: a.address.clone(),
        derivation_path: a.derivation_path.clone(),
        derivation_index: a.derivation_index,
        is_used: a.is_used,
    }
}
