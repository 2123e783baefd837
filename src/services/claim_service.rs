//! Account claim flow: a payer without an account trades a single-use
//! signup token for an identity.

use thiserror::Error;

use crate::services::identity_service::IdentityError;

pub const INVALID_TOKEN_MESSAGE: &str = "This signup link is invalid or has expired.";

#[derive(Debug, Error)]
pub enum ClaimError {
    #[error("Missing token")]
    MissingToken,

    #[error("Missing token or password")]
    MissingInput,

    /// Absent, used and expired tokens are indistinguishable to the caller.
    #[error("{INVALID_TOKEN_MESSAGE}")]
    InvalidToken,

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Identity(IdentityError),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<IdentityError> for ClaimError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::Validation(msg) => Self::Validation(msg),
            other => Self::Identity(other),
        }
    }
}

impl From<sea_orm::DbErr> for ClaimError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for ClaimError {
    fn from(err: anyhow::Error) -> Self {
        Self::Database(err.to_string())
    }
}

#[async_trait::async_trait]
pub trait ClaimService: Send + Sync {
    /// Returns the email bound to a claimable token.
    async fn check(&self, token: &str) -> Result<String, ClaimError>;

    /// Creates the identity for the token's email and consumes the token.
    async fn claim(&self, token: &str, password: &str) -> Result<(), ClaimError>;
}
