//! `SeaORM` implementation of the `IdentityService` trait.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use tracing::{info, warn};

use crate::clients::mailer::{EmailMessage, Mailer};
use crate::config::Config;
use crate::db::{CreateUser, Store};
use crate::models::Identity;
use crate::services::identity_service::{IdentityError, IdentityService, validate_password};

pub struct SeaOrmIdentityService {
    store: Store,
    config: Arc<Config>,
    mailer: Arc<dyn Mailer>,
}

impl SeaOrmIdentityService {
    #[must_use]
    pub fn new(store: Store, config: Arc<Config>, mailer: Arc<dyn Mailer>) -> Self {
        Self {
            store,
            config,
            mailer,
        }
    }

    fn login_link_url(&self, token: &str) -> String {
        format!(
            "{}/api/auth/callback?token={}",
            self.config.server.base_url,
            urlencoding::encode(token)
        )
    }

    async fn mail_login_link(&self, identity: &Identity) -> Result<(), IdentityError> {
        let ttl = Duration::minutes(self.config.auth.login_link_ttl_minutes);
        let token = self.store.create_login_link(&identity.id, ttl).await?;
        let message = EmailMessage::login_link(&identity.email, &self.login_link_url(&token));

        if let Err(e) = self.mailer.send(&message).await {
            warn!(email = %identity.email, error = %e, "Failed to send login link");
        }
        Ok(())
    }

    /// Attach a waiting profile to a freshly created identity.
    async fn link_profile(&self, identity: &Identity) {
        let linked = match self.store.get_unlinked_profile_by_email(&identity.email).await {
            Ok(Some(profile)) => self.store.link_profile_to_user(profile.id, &identity.id).await,
            Ok(None) => return,
            Err(e) => Err(e),
        };
        if let Err(e) = linked {
            warn!(email = %identity.email, error = %e, "Failed to link profile to new identity");
        }
    }
}

#[async_trait]
impl IdentityService for SeaOrmIdentityService {
    async fn create_user(
        &self,
        email: &str,
        password: &str,
        email_confirmed: bool,
    ) -> Result<Identity, IdentityError> {
        validate_password(password, self.config.auth.min_password_length)?;

        if email.trim().is_empty() || !email.contains('@') {
            return Err(IdentityError::Validation(
                "A valid email address is required".to_string(),
            ));
        }

        match self
            .store
            .create_user(email, password, email_confirmed, &self.config.auth)
            .await?
        {
            CreateUser::Created(identity) => {
                info!(user_id = %identity.id, email = %identity.email, "Identity created");
                Ok(identity)
            }
            CreateUser::EmailTaken => Err(IdentityError::EmailTaken),
        }
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<Identity, IdentityError> {
        let identity = self.create_user(email, password, false).await?;
        self.link_profile(&identity).await;
        self.mail_login_link(&identity).await?;
        Ok(identity)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, IdentityError> {
        let identity = self
            .store
            .verify_user_password(email, password)
            .await?
            .ok_or(IdentityError::InvalidCredentials)?;

        if !identity.email_confirmed {
            return Err(IdentityError::EmailNotConfirmed);
        }

        Ok(identity)
    }

    async fn get_user(&self, id: &str) -> Result<Option<Identity>, IdentityError> {
        Ok(self.store.get_user_by_id(id).await?)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, IdentityError> {
        Ok(self.store.get_user_by_email(email).await?)
    }

    async fn change_password(&self, id: &str, new_password: &str) -> Result<(), IdentityError> {
        validate_password(new_password, self.config.auth.min_password_length)?;

        if self.store.get_user_by_id(id).await?.is_none() {
            return Err(IdentityError::UserNotFound);
        }

        self.store
            .update_user_password(id, new_password, &self.config.auth)
            .await?;

        info!(user_id = %id, "Password changed");
        Ok(())
    }

    async fn send_login_link(&self, email: &str) -> Result<(), IdentityError> {
        match self.store.get_user_by_email(email).await? {
            Some(identity) => self.mail_login_link(&identity).await,
            None => {
                info!(email = %email, "Login link requested for unknown email");
                Ok(())
            }
        }
    }

    async fn redeem_login_link(&self, token: &str) -> Result<Option<Identity>, IdentityError> {
        let Some(user_id) = self.store.redeem_login_link(token).await? else {
            return Ok(None);
        };

        self.store.confirm_user_email(&user_id).await?;
        Ok(self.store.get_user_by_id(&user_id).await?)
    }
}
