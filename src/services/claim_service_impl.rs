//! `SeaORM` implementation of the `ClaimService` trait.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::db::Store;
use crate::models::SignupToken;
use crate::services::claim_service::{ClaimError, ClaimService};
use crate::services::identity_service::{IdentityService, validate_password};

pub struct SeaOrmClaimService {
    store: Store,
    config: Arc<Config>,
    identities: Arc<dyn IdentityService>,
}

impl SeaOrmClaimService {
    #[must_use]
    pub fn new(store: Store, config: Arc<Config>, identities: Arc<dyn IdentityService>) -> Self {
        Self {
            store,
            config,
            identities,
        }
    }

    async fn claimable(&self, token: &str) -> Result<SignupToken, ClaimError> {
        let row = self.store.get_signup_token(token).await?;
        match row {
            Some(row) if row.is_claimable_at(Utc::now()) => Ok(row),
            _ => Err(ClaimError::InvalidToken),
        }
    }

    fn count(outcome: &'static str) {
        metrics::counter!("signup_claims_total", "outcome" => outcome).increment(1);
    }
}

#[async_trait]
impl ClaimService for SeaOrmClaimService {
    async fn check(&self, token: &str) -> Result<String, ClaimError> {
        if token.is_empty() {
            return Err(ClaimError::MissingToken);
        }

        Ok(self.claimable(token).await?.email)
    }

    async fn claim(&self, token: &str, password: &str) -> Result<(), ClaimError> {
        if token.is_empty() || password.is_empty() {
            return Err(ClaimError::MissingInput);
        }

        validate_password(password, self.config.auth.min_password_length)?;

        let row = match self.claimable(token).await {
            Ok(row) => row,
            Err(e) => {
                Self::count("invalid_token");
                return Err(e);
            }
        };

        let identity = match self.identities.create_user(&row.email, password, true).await {
            Ok(identity) => identity,
            Err(e) => {
                warn!(email = %row.email, error = %e, "Identity creation failed during claim");
                Self::count("identity_error");
                return Err(e.into());
            }
        };

        let linked = match self.store.get_unlinked_profile_by_email(&row.email).await {
            Ok(Some(profile)) => self.store.link_profile_to_user(profile.id, &identity.id).await,
            Ok(None) => Ok(false),
            Err(e) => Err(e),
        };
        if let Err(e) = linked {
            warn!(email = %row.email, error = %e, "Failed to link profile during claim");
        }

        match self.store.mark_signup_token_used(row.id).await {
            Ok(true) => {}
            Ok(false) => {
                error!(email = %row.email, token_id = row.id, "Signup token was already consumed");
            }
            Err(e) => {
                error!(email = %row.email, token_id = row.id, error = %e, "Failed to mark signup token used");
            }
        }

        Self::count("success");
        info!(user_id = %identity.id, email = %row.email, "Signup token claimed");
        Ok(())
    }
}
