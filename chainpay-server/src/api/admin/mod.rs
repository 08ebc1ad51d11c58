//! Admin API handlers.
//!
//! These endpoints are called by operators and require the
//! `Chainpay-Admin-Authorization` header with the plaintext admin secret.
//!
//! # Endpoints
//!
//! - `POST   /payouts`                          send funds from a hot wallet
//! - `GET    /fees/{ticker}`                    quote the current transfer fee
//! - `POST   /xpub-wallets`                     register an extended public key
//! - `DELETE /xpub-wallets/{id}`                deactivate an xpub wallet
//! - `POST   /xpub-wallets/{id}/addresses`      derive a fresh address
//! - `GET    /xpub-wallets/{id}/next-address`   oldest unused address, deriving if none

use axum::{
    Router,
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
};
use chainpay_core::error::ErrorClass;

use crate::state::AppState;

mod fees;
mod payouts;
mod xpub_wallets;

/// Build the Admin API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/payouts", post(payouts::create_payout))
        .route("/fees/{ticker}", get(fees::get_fee))
        .route("/xpub-wallets", post(xpub_wallets::register))
        .route("/xpub-wallets/{id}", delete(xpub_wallets::deactivate))
        .route("/xpub-wallets/{id}/addresses", post(xpub_wallets::derive))
        .route(
            "/xpub-wallets/{id}/next-address",
            get(xpub_wallets::next_unused),
        )
}

// ---------------------------------------------------------------------------
// Shared error type
// ---------------------------------------------------------------------------

/// Errors that can occur in Admin API handlers, already classified.
#[derive(Debug)]
pub(crate) struct AdminApiError {
    class: ErrorClass,
    message: String,
}

impl AdminApiError {
    pub(crate) fn new(class: ErrorClass, message: impl std::fmt::Display) -> Self {
        Self {
            class,
            message: message.to_string(),
        }
    }

    pub(crate) fn not_found(message: impl std::fmt::Display) -> Self {
        Self::new(ErrorClass::NotFound, message)
    }
}

fn status_for(class: ErrorClass) -> StatusCode {
    match class {
        ErrorClass::NotFound | ErrorClass::UnresolvedWebhookTarget => StatusCode::NOT_FOUND,
        ErrorClass::Validation | ErrorClass::DerivationFailed => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorClass::InsufficientFunds | ErrorClass::InvalidTransaction => StatusCode::CONFLICT,
        ErrorClass::Upstream | ErrorClass::ConfirmationTimeout => StatusCode::BAD_GATEWAY,
        ErrorClass::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        ErrorClass::Storage => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AdminApiError {
    fn into_response(self) -> axum::response::Response {
        let status = status_for(self.class);
        if status.is_server_error() {
            tracing::error!(class = %self.class, error = %self.message, "Admin API error");
        }
        if self.class == ErrorClass::Storage {
            return (status, "internal server error").into_response();
        }
        (status, self.message).into_response()
    }
}

macro_rules! classified {
    ($($error:ty),* $(,)?) => {
        $(
            impl From<$error> for AdminApiError {
                fn from(err: $error) -> Self {
                    Self::new(err.class(), err)
                }
            }
        )*
    };
}

classified!(
    chainpay_core::processors::OutboundError,
    chainpay_core::fees::FeeError,
    chainpay_core::derivation::AddressBookError,
    chainpay_core::currency::CurrencyError,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_errors_hide_details() {
        assert_eq!(status_for(ErrorClass::Storage), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(status_for(ErrorClass::Validation), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(status_for(ErrorClass::Upstream), StatusCode::BAD_GATEWAY);
    }
}
