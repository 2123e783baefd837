//! Access guard decisions.
//!
//! One decision function shared by the page middleware, the status probe and
//! the long-lived re-check stream.

use serde::Serialize;
use thiserror::Error;

use crate::models::{Identity, Profile};

#[derive(Debug, Error)]
pub enum AccessError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sea_orm::DbErr> for AccessError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for AccessError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InactiveCause {
    NoProfile,
    Disabled,
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    NoSession,
    Inactive(InactiveCause),
}

impl DenyReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NoSession => "no_session",
            Self::Inactive(_) => "inactive",
        }
    }
}

/// Everything a protected page may render for the viewer.
#[derive(Debug, Clone, Serialize)]
pub struct AccessGrant {
    pub identity: Option<Identity>,
    pub profile: Option<Profile>,
    /// Allowed through the debug bypass rather than by entitlement.
    pub bypass: bool,
}

#[derive(Debug, Clone)]
pub enum AccessDecision {
    Allowed(AccessGrant),
    Denied(DenyReason),
}

impl AccessDecision {
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Allowed(_) => "allowed",
            Self::Denied(reason) => reason.as_str(),
        }
    }
}

/// Published when entitlement may have changed; open views re-check.
/// `user_id: None` addresses every view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessEvent {
    Recheck { user_id: Option<String> },
}

impl AccessEvent {
    #[must_use]
    pub fn concerns(&self, user_id: Option<&str>) -> bool {
        match self {
            Self::Recheck { user_id: None } => true,
            Self::Recheck {
                user_id: Some(target),
            } => user_id == Some(target.as_str()),
        }
    }
}

#[async_trait::async_trait]
pub trait AccessService: Send + Sync {
    /// Decide whether the session identified by `user_id` may see protected content.
    async fn evaluate(&self, user_id: Option<&str>) -> Result<AccessDecision, AccessError>;

    /// Like [`AccessService::evaluate`], honouring the debug bypass header when configured.
    async fn evaluate_request(
        &self,
        user_id: Option<&str>,
        bypass_header: Option<&str>,
    ) -> Result<AccessDecision, AccessError>;
}

/// Classify a profile against `now`. `None` means entitled.
#[must_use]
pub fn inactive_cause(
    profile: Option<&Profile>,
    now: chrono::DateTime<chrono::Utc>,
) -> Option<InactiveCause> {
    match profile {
        None => Some(InactiveCause::NoProfile),
        Some(p) if p.disabled => Some(InactiveCause::Disabled),
        Some(p) if !p.is_entitled_at(now) => Some(InactiveCause::Expired),
        Some(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn profile(expires_at: Option<chrono::DateTime<Utc>>, disabled: bool) -> Profile {
        let now = Utc::now();
        Profile {
            id: 1,
            user_id: Some("u1".to_string()),
            email: "a@example.com".to_string(),
            expires_at,
            disabled,
            stripe_customer_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_inactive_cause() {
        let now = Utc::now();
        assert_eq!(inactive_cause(None, now), Some(InactiveCause::NoProfile));
        assert_eq!(
            inactive_cause(Some(&profile(None, true)), now),
            Some(InactiveCause::Disabled)
        );
        assert_eq!(
            inactive_cause(Some(&profile(Some(now), false)), now),
            Some(InactiveCause::Expired)
        );
        assert_eq!(
            inactive_cause(Some(&profile(Some(now + Duration::days(1)), false)), now),
            None
        );
    }

    #[test]
    fn test_event_addressing() {
        let everyone = AccessEvent::Recheck { user_id: None };
        let one = AccessEvent::Recheck {
            user_id: Some("u1".to_string()),
        };
        assert!(everyone.concerns(None));
        assert!(everyone.concerns(Some("u2")));
        assert!(one.concerns(Some("u1")));
        assert!(!one.concerns(Some("u2")));
        assert!(!one.concerns(None));
    }
}
