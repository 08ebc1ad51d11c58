//! Custom Axum extractors for request authentication.
//!
//! Provides:
//! - `ProviderSignedWebhook` verifies the provider's `x-payload-hash` header
//!   over the raw body before anything is deserialized.
//! - `AdminAuth` checks the `Chainpay-Admin-Authorization` header against the
//!   argon2 hash of the admin secret.

use axum::{
    extract::{FromRequest, FromRequestParts, Request},
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use chainpay_sdk::objects::ProviderWebhook;
use chainpay_sdk::signature::{PROVIDER_SIGNATURE_HEADER, SignatureError, verify_provider_payload};

use crate::config::verify_admin_secret;
use crate::state::AppState;

pub const ADMIN_AUTH_HEADER: &str = "Chainpay-Admin-Authorization";

const MAX_WEBHOOK_BODY: usize = 1024 * 1024;

// ---------------------------------------------------------------------------
// ProviderSignedWebhook
// ---------------------------------------------------------------------------

/// A provider notification whose HMAC-SHA512 digest matched.
pub struct ProviderSignedWebhook(pub ProviderWebhook);

#[derive(Debug, thiserror::Error)]
pub enum ProviderSignatureError {
    #[error("missing x-payload-hash header")]
    MissingHeader,
    #[error("invalid x-payload-hash header")]
    InvalidHeader,
    #[error("failed to read request body")]
    BodyReadError,
    #[error("signature verification failed")]
    VerificationFailed,
    #[error("invalid JSON body: {0}")]
    JsonError(serde_json::Error),
}

impl From<SignatureError> for ProviderSignatureError {
    fn from(err: SignatureError) -> Self {
        match err {
            SignatureError::InvalidFormat | SignatureError::InvalidBase64 => Self::InvalidHeader,
            SignatureError::Json(e) => Self::JsonError(e),
            SignatureError::SignatureMismatch | SignatureError::Expired => {
                Self::VerificationFailed
            }
        }
    }
}

impl IntoResponse for ProviderSignatureError {
    fn into_response(self) -> Response {
        let status = match self {
            ProviderSignatureError::BodyReadError | ProviderSignatureError::JsonError(_) => {
                StatusCode::BAD_REQUEST
            }
            ProviderSignatureError::MissingHeader
            | ProviderSignatureError::InvalidHeader
            | ProviderSignatureError::VerificationFailed => StatusCode::UNAUTHORIZED,
        };
        (status, self.to_string()).into_response()
    }
}

impl FromRequest<AppState> for ProviderSignedWebhook {
    type Rejection = ProviderSignatureError;

    async fn from_request(req: Request, state: &AppState) -> Result<Self, Self::Rejection> {
        let header_value = req
            .headers()
            .get(PROVIDER_SIGNATURE_HEADER)
            .ok_or(ProviderSignatureError::MissingHeader)?
            .to_str()
            .map_err(|_| ProviderSignatureError::InvalidHeader)?
            .to_owned();

        let body = axum::body::to_bytes(req.into_body(), MAX_WEBHOOK_BODY)
            .await
            .map_err(|_| ProviderSignatureError::BodyReadError)?;

        {
            let secrets = state.secrets.read().await;
            verify_provider_payload(&body, &header_value, &secrets.provider).inspect_err(|_| {
                tracing::warn!("Rejected provider webhook with a bad signature");
            })?;
        }

        let webhook = serde_json::from_slice(&body).map_err(ProviderSignatureError::JsonError)?;
        Ok(ProviderSignedWebhook(webhook))
    }
}

// ---------------------------------------------------------------------------
// AdminAuth
// ---------------------------------------------------------------------------

/// Marker extractor for admin routes.
pub struct AdminAuth;

#[derive(Debug)]
pub enum AdminAuthError {
    MissingHeader,
    InvalidSecret,
}

impl IntoResponse for AdminAuthError {
    fn into_response(self) -> Response {
        let message = match self {
            AdminAuthError::MissingHeader => "missing Chainpay-Admin-Authorization header",
            AdminAuthError::InvalidSecret => "invalid admin secret",
        };
        (StatusCode::UNAUTHORIZED, message).into_response()
    }
}

impl FromRequestParts<AppState> for AdminAuth {
    type Rejection = AdminAuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let candidate = parts
            .headers
            .get(ADMIN_AUTH_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(AdminAuthError::MissingHeader)?;

        let hash = state.secrets.read().await.admin_hash.clone();
        if verify_admin_secret(candidate, &hash) {
            Ok(AdminAuth)
        } else {
            tracing::warn!("Rejected admin request with a wrong secret");
            Err(AdminAuthError::InvalidSecret)
        }
    }
}
