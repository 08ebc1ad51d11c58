use axum::{
    Json,
    extract::{Path, Query, State},
};
use chainpay_sdk::objects::admin::{FeeQuery, FeeQuoteResponse};

use crate::api::extractors::AdminAuth;
use crate::state::AppState;

use super::AdminApiError;

/// `GET /fees/{ticker}?is_test=`: fee of moving one transfer of `ticker`.
pub async fn get_fee(
    State(state): State<AppState>,
    _auth: AdminAuth,
    Path(ticker): Path<String>,
    Query(query): Query<FeeQuery>,
) -> Result<Json<FeeQuoteResponse>, AdminApiError> {
    let currency = state.currencies.by_ticker(&ticker)?;
    let quote = state.fees.quote(currency, query.is_test).await?;

    let details = serde_json::to_value(quote.details)
        .map_err(|e| AdminApiError::new(chainpay_core::error::ErrorClass::Storage, e))?;

    Ok(Json(FeeQuoteResponse {
        blockchain: quote.blockchain,
        currency: quote.currency.clone(),
        is_test: quote.is_test,
        fee_currency: quote.total.ticker().to_owned(),
        fee: quote.total.to_decimal().to_string(),
        fee_usd: quote.usd.round_dp(6).normalize().to_string(),
        withdrawal_fee_usd: quote.withdrawal_fee_usd().to_string(),
        details,
        calculated_at: quote.calculated_at.unix_timestamp(),
    }))
}

#[cfg(test)]
mod tests {
    use crate::api::extractors::ADMIN_AUTH_HEADER;
    use crate::server::build_router;
    use crate::state::testing::{ADMIN_SECRET, state};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chainpay_core::store::MemoryStore;
    use tower::ServiceExt;

    fn get(uri: &str, secret: Option<&str>) -> Request<Body> {
        let mut builder = Request::get(uri);
        if let Some(secret) = secret {
            builder = builder.header(ADMIN_AUTH_HEADER, secret);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_fee_quote_for_tron_token() {
        let (state, _rx) = state(MemoryStore::default());
        let response = build_router(state)
            .oneshot(get("/admin/fees/TRON_USDT", Some(ADMIN_SECRET)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let quote: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(quote["blockchain"], "TRON");
        assert_eq!(quote["fee_currency"], "TRON");
        // 30 TRX fee limit at $0.12
        assert_eq!(quote["fee"], "30");
        assert_eq!(quote["fee_usd"], "3.6");
        assert_eq!(quote["withdrawal_fee_usd"], "5.40");
        assert_eq!(quote["details"]["family"], "tron");
    }

    #[tokio::test]
    async fn test_fee_quote_requires_admin_secret() {
        let (state, _rx) = state(MemoryStore::default());
        let router = build_router(state);

        let missing = router
            .clone()
            .oneshot(get("/admin/fees/TRON_USDT", None))
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

        let wrong = router
            .oneshot(get("/admin/fees/TRON_USDT", Some("guess")))
            .await
            .unwrap();
        assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_unknown_ticker_is_not_found() {
        let (state, _rx) = state(MemoryStore::default());
        let response = build_router(state)
            .oneshot(get("/admin/fees/DOGE", Some(ADMIN_SECRET)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
