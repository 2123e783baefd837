//! `SeaORM` implementation of the `AccessService` trait.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::{debug, warn};

use crate::db::Store;
use crate::services::access_service::{
    AccessDecision, AccessError, AccessGrant, AccessService, DenyReason, inactive_cause,
};
use crate::services::identity_service::IdentityService;

type HmacSha256 = Hmac<Sha256>;

/// Compare a presented bypass value to the configured secret in constant time.
fn secret_matches(secret: &str, candidate: &str) -> bool {
    let digest = |value: &str| {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
        mac.update(value.as_bytes());
        Some(mac)
    };
    match (digest(secret), digest(candidate)) {
        (Some(expected), Some(given)) => given
            .verify_slice(&expected.finalize().into_bytes())
            .is_ok(),
        _ => false,
    }
}

pub struct SeaOrmAccessService {
    store: Store,
    identities: Arc<dyn IdentityService>,
    bypass_secret: Option<String>,
}

impl SeaOrmAccessService {
    /// `bypass_secret` is only `Some` when the debug bypass is switched on.
    #[must_use]
    pub fn new(
        store: Store,
        identities: Arc<dyn IdentityService>,
        bypass_secret: Option<String>,
    ) -> Self {
        Self {
            store,
            identities,
            bypass_secret,
        }
    }

    fn record(decision: &AccessDecision) {
        metrics::counter!("access_decisions_total", "decision" => decision.label()).increment(1);
    }
}

#[async_trait]
impl AccessService for SeaOrmAccessService {
    async fn evaluate(&self, user_id: Option<&str>) -> Result<AccessDecision, AccessError> {
        let Some(user_id) = user_id else {
            let decision = AccessDecision::Denied(DenyReason::NoSession);
            Self::record(&decision);
            return Ok(decision);
        };

        let identity = self
            .identities
            .get_user(user_id)
            .await
            .map_err(|e| AccessError::Internal(e.to_string()))?;

        let Some(identity) = identity else {
            debug!(user_id, "Session refers to an unknown identity");
            let decision = AccessDecision::Denied(DenyReason::NoSession);
            Self::record(&decision);
            return Ok(decision);
        };

        let mut profile = self.store.get_profile_by_user_id(&identity.id).await?;

        if profile.is_none()
            && let Some(unlinked) = self
                .store
                .get_unlinked_profile_by_email(&identity.email)
                .await?
        {
            if self
                .store
                .link_profile_to_user(unlinked.id, &identity.id)
                .await?
            {
                debug!(user_id = %identity.id, email = %identity.email, "Linked profile on first access");
            } else {
                warn!(email = %identity.email, "Profile was linked concurrently");
            }
            profile = self.store.get_profile_by_user_id(&identity.id).await?;
        }

        let decision = match inactive_cause(profile.as_ref(), Utc::now()) {
            Some(cause) => AccessDecision::Denied(DenyReason::Inactive(cause)),
            None => AccessDecision::Allowed(AccessGrant {
                identity: Some(identity),
                profile,
                bypass: false,
            }),
        };

        Self::record(&decision);
        Ok(decision)
    }

    async fn evaluate_request(
        &self,
        user_id: Option<&str>,
        bypass_header: Option<&str>,
    ) -> Result<AccessDecision, AccessError> {
        if let (Some(secret), Some(header)) = (self.bypass_secret.as_deref(), bypass_header)
            && secret_matches(secret, header)
        {
            warn!("Access granted through debug bypass");
            let identity = match user_id {
                Some(id) => self
                    .identities
                    .get_user(id)
                    .await
                    .map_err(|e| AccessError::Internal(e.to_string()))?,
                None => None,
            };
            let decision = AccessDecision::Allowed(AccessGrant {
                identity,
                profile: None,
                bypass: true,
            });
            Self::record(&decision);
            return Ok(decision);
        }

        self.evaluate(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::secret_matches;

    #[test]
    fn test_secret_matches() {
        assert!(secret_matches("letmein", "letmein"));
        assert!(!secret_matches("letmein", "letmeout"));
        assert!(!secret_matches("letmein", "letmein "));
        assert!(!secret_matches("letmein", ""));
    }
}
