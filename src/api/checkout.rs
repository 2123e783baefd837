use axum::{
    Json,
    extract::State,
    http::{HeaderMap, header::ORIGIN},
};
use std::sync::Arc;
use tracing::{error, info};

use super::{ApiError, AppState, CheckoutResponse, validation::parse_origin};

/// POST /api/create-checkout-session
pub async fn create_checkout_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<CheckoutResponse>, ApiError> {
    let config = state.config();

    let price_id = config
        .stripe
        .price_id
        .as_deref()
        .ok_or_else(|| ApiError::Misconfigured("Missing STRIPE_PRICE_ID".to_string()))?;

    if !state.shared.stripe.is_configured() {
        return Err(ApiError::Misconfigured(
            "Missing STRIPE_SECRET_KEY".to_string(),
        ));
    }

    let origin = headers
        .get(ORIGIN)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_origin)
        .unwrap_or_else(|| config.server.base_url.clone());

    let session = state
        .shared
        .stripe
        .create_checkout_session(price_id, &origin)
        .await
        .map_err(|e| {
            error!(error = %e, "Stripe checkout error");
            ApiError::checkout_failed(e.to_string())
        })?;

    info!(session_id = %session.id, origin = %origin, "Checkout session created");

    Ok(Json(CheckoutResponse {
        id: session.id,
        url: session.url,
    }))
}
