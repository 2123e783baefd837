use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::entities::profiles;

/// Durable access record for a paying email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Profile {
    pub id: i32,
    pub user_id: Option<String>,
    pub email: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub disabled: bool,
    pub stripe_customer_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<profiles::Model> for Profile {
    fn from(model: profiles::Model) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            email: model.email,
            expires_at: model.expires_at,
            disabled: model.disabled,
            stripe_customer_id: model.stripe_customer_id,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

impl Profile {
    /// Entitled iff not disabled and either open-ended or expiring strictly after `now`.
    #[must_use]
    pub fn is_entitled_at(&self, now: DateTime<Utc>) -> bool {
        !self.disabled && self.expires_at.is_none_or(|expires| expires > now)
    }

    #[must_use]
    pub fn is_entitled(&self) -> bool {
        self.is_entitled_at(Utc::now())
    }
}
