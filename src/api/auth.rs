use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use std::sync::Arc;
use tower_sessions::Session;
use tracing::{info, warn};

use super::{
    ApiError, AppState, CredentialsRequest, EmailRequest, MessageResponse, PasswordRequest,
    SuccessResponse, TokenQuery,
    validation::{non_empty, validate_email},
};
use crate::constants::{SESSION_USER_KEY, paths};
use crate::models::Identity;

const MAGIC_LINK_MESSAGE: &str = "If an account exists for that email, a sign-in link is on its way.";

/// The identity id stored in the session, if any.
pub async fn session_user_id(session: &Session) -> Option<String> {
    match session.get::<String>(SESSION_USER_KEY).await {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "Failed to read session");
            None
        }
    }
}

/// Bind the session to `identity`, issuing a fresh session id.
async fn establish_session(session: &Session, identity: &Identity) -> Result<(), ApiError> {
    session
        .cycle_id()
        .await
        .map_err(|e| ApiError::internal(format!("Session error: {e}")))?;
    session
        .insert(SESSION_USER_KEY, identity.id.clone())
        .await
        .map_err(|e| ApiError::internal(format!("Session error: {e}")))?;

    tracing::Span::current().record("user_id", identity.id.as_str());
    Ok(())
}

/// POST /api/auth/signup
pub async fn signup(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CredentialsRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    let email = validate_email(&payload.email)?;

    state
        .shared
        .identity_service
        .sign_up(email, &payload.password)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            message: "Check your email to confirm your account.".to_string(),
        }),
    ))
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    session: Session,
    Json(payload): Json<CredentialsRequest>,
) -> Result<Json<Identity>, ApiError> {
    if payload.email.trim().is_empty() {
        return Err(ApiError::validation("Email is required"));
    }
    if payload.password.is_empty() {
        return Err(ApiError::validation("Password is required"));
    }

    let identity = state
        .shared
        .identity_service
        .sign_in(&payload.email, &payload.password)
        .await?;

    establish_session(&session, &identity).await?;
    info!(user_id = %identity.id, "User signed in");

    Ok(Json(identity))
}

/// POST /api/auth/magic-link
///
/// Responds identically whether or not the email is known.
pub async fn magic_link(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<EmailRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    if let Ok(email) = validate_email(&payload.email) {
        state.shared.identity_service.send_login_link(email).await?;
    }

    Ok(Json(MessageResponse {
        message: MAGIC_LINK_MESSAGE.to_string(),
    }))
}

/// GET /api/auth/callback?token=
pub async fn callback(
    State(state): State<Arc<AppState>>,
    session: Session,
    Query(query): Query<TokenQuery>,
) -> Result<Response, ApiError> {
    let invalid = || {
        Redirect::to(&format!(
            "{}?error=link_invalid",
            state.config().access.login_path
        ))
        .into_response()
    };

    let Some(token) = non_empty(query.token.as_deref()) else {
        return Ok(invalid());
    };

    let Some(identity) = state
        .shared
        .identity_service
        .redeem_login_link(token)
        .await?
    else {
        return Ok(invalid());
    };

    establish_session(&session, &identity).await?;
    info!(user_id = %identity.id, "User signed in with login link");

    Ok(Redirect::to(paths::APP).into_response())
}

/// POST /api/auth/logout
pub async fn logout(session: Session) -> Result<Json<SuccessResponse>, ApiError> {
    session
        .flush()
        .await
        .map_err(|e| ApiError::internal(format!("Failed to clear session: {e}")))?;

    Ok(Json(SuccessResponse::ok()))
}

/// GET /api/auth/me
pub async fn me(
    State(state): State<Arc<AppState>>,
    session: Session,
) -> Result<Json<Identity>, ApiError> {
    let user_id = session_user_id(&session)
        .await
        .ok_or_else(|| ApiError::unauthorized("Not signed in"))?;

    state
        .shared
        .identity_service
        .get_user(&user_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::unauthorized("Not signed in"))
}

/// PUT /api/auth/password
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    session: Session,
    Json(payload): Json<PasswordRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let user_id = session_user_id(&session)
        .await
        .ok_or_else(|| ApiError::unauthorized("Not signed in"))?;

    state
        .shared
        .identity_service
        .change_password(&user_id, &payload.password)
        .await?;

    Ok(Json(SuccessResponse::ok()))
}
