use chrono::{DateTime, Utc};

use crate::entities::signup_tokens;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignupToken {
    pub id: i32,
    pub token: String,
    pub email: String,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<signup_tokens::Model> for SignupToken {
    fn from(model: signup_tokens::Model) -> Self {
        Self {
            id: model.id,
            token: model.token,
            email: model.email,
            expires_at: model.expires_at,
            used_at: model.used_at,
            created_at: model.created_at,
        }
    }
}

impl SignupToken {
    /// A token is claimable until it is used or its window closes; `expires_at == now` is closed.
    #[must_use]
    pub fn is_claimable_at(&self, now: DateTime<Utc>) -> bool {
        self.used_at.is_none() && self.expires_at > now
    }
}

/// Result of ensuring a live token exists for an email.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: SignupToken,
    pub reused: bool,
}
