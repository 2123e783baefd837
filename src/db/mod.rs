use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use std::path::Path;
use tracing::info;

use crate::config::AuthConfig;
use crate::models::{Identity, Profile, SignupToken, signup_token::IssuedToken};

pub mod migrator;
pub mod repositories;

pub use repositories::user::CreateUser;

#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::with_pool_options(db_url, 5, 1).await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        if !db_url.contains(":memory:") {
            let path_str = db_url.trim_start_matches("sqlite:");
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)?;
            }
        }

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(std::time::Duration::from_secs(10))
            .acquire_timeout(std::time::Duration::from_secs(10))
            .idle_timeout(std::time::Duration::from_secs(300))
            .max_lifetime(std::time::Duration::from_secs(600))
            .sqlx_logging(false);

        let conn = Database::connect(opt).await?;

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn })
    }

    pub async fn ping(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        self.conn
            .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
            .await?;
        Ok(())
    }

    /// The underlying sqlx pool, shared with the session store.
    #[must_use]
    pub fn sqlite_pool(&self) -> sea_orm::sqlx::SqlitePool {
        self.conn.get_sqlite_connection_pool().clone()
    }

    fn user_repo(&self) -> repositories::user::UserRepository {
        repositories::user::UserRepository::new(self.conn.clone())
    }

    fn profile_repo(&self) -> repositories::profile::ProfileRepository {
        repositories::profile::ProfileRepository::new(self.conn.clone())
    }

    fn signup_token_repo(&self) -> repositories::signup_token::SignupTokenRepository {
        repositories::signup_token::SignupTokenRepository::new(self.conn.clone())
    }

    fn login_link_repo(&self) -> repositories::login_link::LoginLinkRepository {
        repositories::login_link::LoginLinkRepository::new(self.conn.clone())
    }

    fn webhook_event_repo(&self) -> repositories::webhook_event::WebhookEventRepository {
        repositories::webhook_event::WebhookEventRepository::new(self.conn.clone())
    }

    // ========== Profiles ==========

    pub async fn get_profile_by_user_id(&self, user_id: &str) -> Result<Option<Profile>> {
        self.profile_repo().get_by_user_id(user_id).await
    }

    pub async fn get_profile_by_email(&self, email: &str) -> Result<Option<Profile>> {
        self.profile_repo().get_by_email(email).await
    }

    pub async fn get_unlinked_profile_by_email(&self, email: &str) -> Result<Option<Profile>> {
        self.profile_repo().get_unlinked_by_email(email).await
    }

    pub async fn upsert_paid_profile(
        &self,
        email: &str,
        customer_id: Option<&str>,
    ) -> Result<Profile> {
        self.profile_repo().upsert_paid(email, customer_id).await
    }

    pub async fn set_profile_expiry_by_customer(
        &self,
        customer_id: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<u64> {
        self.profile_repo()
            .set_expiry_by_customer(customer_id, expires_at)
            .await
    }

    pub async fn link_profile_to_user(&self, profile_id: i32, user_id: &str) -> Result<bool> {
        self.profile_repo().link_user(profile_id, user_id).await
    }

    pub async fn set_profile_disabled(&self, email: &str, disabled: bool) -> Result<bool> {
        self.profile_repo().set_disabled(email, disabled).await
    }

    // ========== Signup tokens ==========

    pub async fn get_signup_token(&self, token: &str) -> Result<Option<SignupToken>> {
        self.signup_token_repo().get_by_token(token).await
    }

    pub async fn get_unused_signup_token(&self, email: &str) -> Result<Option<SignupToken>> {
        self.signup_token_repo().get_unused_for_email(email).await
    }

    pub async fn issue_signup_token(&self, email: &str, ttl: Duration) -> Result<IssuedToken> {
        self.signup_token_repo().issue(email, ttl).await
    }

    pub async fn mark_signup_token_used(&self, token_id: i32) -> Result<bool> {
        self.signup_token_repo()
            .mark_used(token_id, Utc::now())
            .await
    }

    // ========== Users ==========

    pub async fn get_user_by_id(&self, id: &str) -> Result<Option<Identity>> {
        self.user_repo().get_by_id(id).await
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<Identity>> {
        self.user_repo().get_by_email(email).await
    }

    pub async fn create_user(
        &self,
        email: &str,
        password: &str,
        email_confirmed: bool,
        config: &AuthConfig,
    ) -> Result<CreateUser> {
        self.user_repo()
            .create(email, password, email_confirmed, config)
            .await
    }

    pub async fn verify_user_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<Identity>> {
        self.user_repo().verify_password(email, password).await
    }

    pub async fn update_user_password(
        &self,
        id: &str,
        new_password: &str,
        config: &AuthConfig,
    ) -> Result<()> {
        self.user_repo()
            .update_password(id, new_password, config)
            .await
    }

    pub async fn confirm_user_email(&self, id: &str) -> Result<()> {
        self.user_repo().confirm_email(id).await
    }

    // ========== Login links ==========

    pub async fn create_login_link(&self, user_id: &str, ttl: Duration) -> Result<String> {
        self.login_link_repo().create(user_id, ttl).await
    }

    pub async fn redeem_login_link(&self, token: &str) -> Result<Option<String>> {
        self.login_link_repo().redeem(token).await
    }

    // ========== Webhook events ==========

    pub async fn is_webhook_event_processed(&self, event_id: &str) -> Result<bool> {
        self.webhook_event_repo().is_processed(event_id).await
    }

    pub async fn record_webhook_event(&self, event_id: &str, kind: &str) -> Result<()> {
        self.webhook_event_repo().record(event_id, kind).await
    }
}
