use axum::{
    Json,
    extract::{Query, State, rejection::JsonRejection},
    http::StatusCode,
};
use std::sync::Arc;

use super::{
    ApiError, AppState, ClaimRequest, SuccessResponse, TokenEmailResponse, TokenQuery,
    validation::non_empty,
};
use crate::services::ClaimError;

/// GET /api/check-signup-token?token=
pub async fn check_signup_token(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TokenQuery>,
) -> Result<Json<TokenEmailResponse>, ApiError> {
    let token = non_empty(query.token.as_deref()).ok_or(ClaimError::MissingToken)?;

    let email = state.shared.claim_service.check(token).await?;

    Ok(Json(TokenEmailResponse { email }))
}

/// POST /api/claim-signup
///
/// A body that is not JSON is treated like one with no fields.
pub async fn claim_signup(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ClaimRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SuccessResponse>), ApiError> {
    let payload = payload.map(|Json(p)| p).unwrap_or_default();

    let (Some(token), Some(password)) = (
        non_empty(payload.token.as_deref()),
        non_empty(payload.password.as_deref()),
    ) else {
        return Err(ClaimError::MissingInput.into());
    };

    state.shared.claim_service.claim(token, password).await?;

    Ok((StatusCode::OK, Json(SuccessResponse::ok())))
}
