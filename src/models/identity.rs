use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::entities::users;

/// Authentication identity, without the password hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub id: String,
    pub email: String,
    pub email_confirmed: bool,
    pub created_at: DateTime<Utc>,
}

impl From<users::Model> for Identity {
    fn from(model: users::Model) -> Self {
        Self {
            id: model.id,
            email: model.email,
            email_confirmed: model.email_confirmed,
            created_at: model.created_at,
        }
    }
}
