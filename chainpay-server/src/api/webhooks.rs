//! Provider notification endpoint.
//!
//! `POST /webhooks/{target_id}/{network_id}`: `target_id` is the external id
//! of a hot wallet, derived address or collector contract; `network_id` is
//! the network the subscription was registered for.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chainpay_core::error::ErrorClass;
use chainpay_core::processors::{ReconcileError, ReconcileOutcome, SkipReason};
use serde::Serialize;
use uuid::Uuid;

use crate::api::extractors::ProviderSignedWebhook;
use crate::state::AppState;

/// Acknowledgement body returned to the provider.
#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<i64>,
}

impl From<ReconcileOutcome> for WebhookAck {
    fn from(outcome: ReconcileOutcome) -> Self {
        let (outcome, transaction_id) = match outcome {
            ReconcileOutcome::Skipped(SkipReason::Mempool) => ("skipped_mempool", None),
            ReconcileOutcome::Skipped(SkipReason::FeeOnly) => ("skipped_fee", None),
            ReconcileOutcome::Matched { transaction_id } => ("matched", Some(transaction_id)),
            ReconcileOutcome::Unexpected { transaction_id } => {
                ("unexpected", Some(transaction_id))
            }
            ReconcileOutcome::Duplicate { transaction_id } => ("duplicate", transaction_id),
        };
        Self {
            outcome,
            transaction_id,
        }
    }
}

/// Maps reconciliation failures onto provider retry semantics.
pub struct WebhookError(ReconcileError);

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let err = self.0;
        if err.is_retryable() {
            tracing::error!(error = %err, "Webhook processing failed, asking for redelivery");
            return (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response();
        }
        let status = match err.class() {
            ErrorClass::UnresolvedWebhookTarget | ErrorClass::Validation | ErrorClass::NotFound => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            _ => StatusCode::OK,
        };
        tracing::warn!(error = %err, class = %err.class(), "Dropped webhook");
        (status, err.to_string()).into_response()
    }
}

pub async fn receive_webhook(
    State(state): State<AppState>,
    Path((target_id, network_id)): Path<(Uuid, String)>,
    ProviderSignedWebhook(webhook): ProviderSignedWebhook,
) -> Result<Json<WebhookAck>, WebhookError> {
    let outcome = state
        .reconciler
        .process_incoming_webhook(target_id, &network_id, &webhook)
        .await
        .map_err(WebhookError)?;
    Ok(Json(outcome.into()))
}

#[cfg(test)]
mod tests {
    use crate::server::build_router;
    use crate::state::testing::{PROVIDER_SECRET, state};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chainpay_core::store::MemoryStore;
    use chainpay_sdk::objects::Blockchain;
    use chainpay_sdk::signature::{PROVIDER_SIGNATURE_HEADER, sign_provider_payload};
    use tower::ServiceExt;
    use uuid::Uuid;

    const HOT_ADDRESS: &str = "0x2ea6c3a3c3b5bd4a1ef95b4e4c0f5f8b2c5d7e61";

    fn body() -> Vec<u8> {
        serde_json::json!({
            "subscriptionType": "ADDRESS_TRANSACTION",
            "txId": "0xabc",
            "address": HOT_ADDRESS,
            "counterAddress": "0x29379f45f515c494483298225d1b347f73d1babf",
            "asset": "0xdAC17F958D2ee523a2206206994597C13D831ec7",
            "amount": "12.50",
            "blockNumber": 17000000,
            "type": "token",
            "mempool": false,
            "chain": "ethereum-mainnet"
        })
        .to_string()
        .into_bytes()
    }

    fn request(target: Uuid, body: Vec<u8>, digest: &str) -> Request<Body> {
        Request::post(format!("/webhooks/{target}/1"))
            .header("content-type", "application/json")
            .header(PROVIDER_SIGNATURE_HEADER, digest)
            .body(Body::from(body))
            .unwrap()
    }

    async fn read_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_signed_webhook_is_reconciled() {
        let store = MemoryStore::default();
        let wallet = store.add_hot_wallet(Some(1), Blockchain::Eth, HOT_ADDRESS).await;
        let (state, _rx) = state(store.clone());

        let body = body();
        let digest = sign_provider_payload(&body, PROVIDER_SECRET);
        let response = build_router(state)
            .oneshot(request(wallet.uuid, body, &digest))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let ack = read_json(response).await;
        assert_eq!(ack["outcome"], "unexpected");
        assert_eq!(store.transactions().await.len(), 1);
    }

    #[tokio::test]
    async fn test_bad_signature_has_no_side_effects() {
        let store = MemoryStore::default();
        let wallet = store.add_hot_wallet(Some(1), Blockchain::Eth, HOT_ADDRESS).await;
        let (state, _rx) = state(store.clone());

        let body = body();
        let digest = sign_provider_payload(&body, b"someone-else");
        let response = build_router(state)
            .oneshot(request(wallet.uuid, body, &digest))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(store.transactions().await.is_empty());
    }

    #[tokio::test]
    async fn test_missing_signature_is_unauthorized() {
        let (state, _rx) = state(MemoryStore::default());
        let request = Request::post(format!("/webhooks/{}/1", Uuid::new_v4()))
            .body(Body::from(body()))
            .unwrap();
        let response = build_router(state).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_unknown_target_is_acknowledged_as_unprocessable() {
        let (state, _rx) = state(MemoryStore::default());
        let body = body();
        let digest = sign_provider_payload(&body, PROVIDER_SECRET);
        let response = build_router(state)
            .oneshot(request(Uuid::new_v4(), body, &digest))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
