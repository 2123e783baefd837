use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::fmt;

use super::ErrorBody;
use crate::services::{AccessError, ClaimError, IdentityError};

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),

    DatabaseError(String),

    /// Stripe refused or failed to create a checkout session.
    CheckoutFailed(String),

    ValidationError(String),

    /// A required setting is absent; the message names it.
    Misconfigured(String),

    InternalError(String),

    Unauthorized(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(msg) => write!(f, "Not found: {msg}"),
            Self::DatabaseError(msg) => write!(f, "Database error: {msg}"),
            Self::CheckoutFailed(msg) => write!(f, "Stripe checkout error: {msg}"),
            Self::ValidationError(msg) => write!(f, "Validation error: {msg}"),
            Self::Misconfigured(msg) => write!(f, "Misconfigured: {msg}"),
            Self::InternalError(msg) => write!(f, "Internal error: {msg}"),
            Self::Unauthorized(msg) => write!(f, "Unauthorized: {msg}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            Self::DatabaseError(msg) => {
                tracing::error!("Database error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Server error".to_string())
            }
            Self::CheckoutFailed(msg) => {
                tracing::warn!("Stripe API error: {}", msg);
                (StatusCode::BAD_GATEWAY, "Stripe checkout error".to_string())
            }
            Self::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::Misconfigured(msg) => {
                tracing::error!("Missing configuration: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg.clone())
            }
            Self::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Server error".to_string())
            }
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
        };

        (status, Json(ErrorBody::new(error_message))).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::InternalError(format!("{err:#}"))
    }
}

impl From<IdentityError> for ApiError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::InvalidCredentials | IdentityError::EmailNotConfirmed => {
                Self::Unauthorized(err.to_string())
            }
            IdentityError::EmailTaken | IdentityError::Validation(_) => {
                Self::ValidationError(err.to_string())
            }
            IdentityError::UserNotFound => Self::NotFound(err.to_string()),
            IdentityError::Database(msg) => Self::DatabaseError(msg),
            IdentityError::Internal(msg) => Self::InternalError(msg),
        }
    }
}

impl From<ClaimError> for ApiError {
    fn from(err: ClaimError) -> Self {
        match err {
            ClaimError::MissingToken
            | ClaimError::MissingInput
            | ClaimError::InvalidToken
            | ClaimError::Validation(_) => Self::ValidationError(err.to_string()),
            // Provider conflicts are shown; provider internals are not.
            ClaimError::Identity(inner) if inner.is_user_facing() => {
                Self::ValidationError(inner.to_string())
            }
            ClaimError::Identity(inner) => Self::InternalError(inner.to_string()),
            ClaimError::Database(msg) => Self::DatabaseError(msg),
        }
    }
}

impl From<AccessError> for ApiError {
    fn from(err: AccessError) -> Self {
        match err {
            AccessError::Database(msg) => Self::DatabaseError(msg),
            AccessError::Internal(msg) => Self::InternalError(msg),
        }
    }
}

impl ApiError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::InternalError(msg.into())
    }

    pub fn checkout_failed(msg: impl Into<String>) -> Self {
        Self::CheckoutFailed(msg.into())
    }
}
