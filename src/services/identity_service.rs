//! Domain service for authentication identities.
//!
//! Owns password policy, sign-in, magic login links and email confirmation.
//! The claim flow and the access guard depend only on this trait.

use thiserror::Error;

use crate::models::Identity;

/// Errors specific to identity operations.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Invalid login credentials")]
    InvalidCredentials,

    #[error("Email not confirmed")]
    EmailNotConfirmed,

    #[error("A user with this email address has already been registered")]
    EmailTaken,

    #[error("User not found")]
    UserNotFound,

    #[error("{0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IdentityError {
    /// Whether the message is safe and meaningful to show to the caller.
    #[must_use]
    pub const fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Self::InvalidCredentials
                | Self::EmailNotConfirmed
                | Self::EmailTaken
                | Self::UserNotFound
                | Self::Validation(_)
        )
    }
}

impl From<sea_orm::DbErr> for IdentityError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for IdentityError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Domain service trait for identities.
#[async_trait::async_trait]
pub trait IdentityService: Send + Sync {
    /// Creates an identity for `email`.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::Validation`] if the password is too short and
    /// [`IdentityError::EmailTaken`] if an identity already exists.
    async fn create_user(
        &self,
        email: &str,
        password: &str,
        email_confirmed: bool,
    ) -> Result<Identity, IdentityError>;

    /// Self-service signup: creates an unconfirmed identity and mails a
    /// confirmation link.
    async fn sign_up(&self, email: &str, password: &str) -> Result<Identity, IdentityError>;

    /// Verifies credentials of a confirmed identity.
    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, IdentityError>;

    async fn get_user(&self, id: &str) -> Result<Option<Identity>, IdentityError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, IdentityError>;

    async fn change_password(&self, id: &str, new_password: &str) -> Result<(), IdentityError>;

    /// Mails a login link if `email` belongs to an identity. Unknown emails
    /// succeed silently.
    async fn send_login_link(&self, email: &str) -> Result<(), IdentityError>;

    /// Redeems a login link, confirming the email it was sent to.
    async fn redeem_login_link(&self, token: &str) -> Result<Option<Identity>, IdentityError>;
}

/// Password policy shared by signup, claim and password change.
pub fn validate_password(password: &str, min_length: usize) -> Result<(), IdentityError> {
    if password.chars().count() < min_length {
        return Err(IdentityError::Validation(format!(
            "Password must be at least {min_length} characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_policy() {
        assert!(validate_password("12345", 6).is_err());
        assert!(validate_password("123456", 6).is_ok());
        assert!(validate_password("ééééé", 6).is_err());
    }
}
