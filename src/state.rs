use std::sync::Arc;
use tokio::sync::broadcast;

use crate::clients::mailer::{self, Mailer};
use crate::clients::stripe::StripeClient;
use crate::config::Config;
use crate::constants::ACCESS_EVENT_BUFFER;
use crate::db::Store;
use crate::services::{
    AccessEvent, AccessService, ClaimService, IdentityService, SeaOrmAccessService,
    SeaOrmClaimService, SeaOrmIdentityService, StripeWebhookService, WebhookService,
};

#[derive(Clone)]
pub struct SharedState {
    pub config: Arc<Config>,

    pub store: Store,

    pub stripe: Arc<StripeClient>,

    pub mailer: Arc<dyn Mailer>,

    pub identity_service: Arc<dyn IdentityService>,

    pub claim_service: Arc<dyn ClaimService>,

    pub webhook_service: Arc<dyn WebhookService>,

    pub access_service: Arc<dyn AccessService>,

    /// Entitlement changes and focus events; every open view listens.
    pub access_events: broadcast::Sender<AccessEvent>,
}

impl SharedState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let mailer: Arc<dyn Mailer> = Arc::from(mailer::from_config(&config.email));
        Self::with_mailer(config, mailer).await
    }

    pub async fn with_mailer(config: Config, mailer: Arc<dyn Mailer>) -> anyhow::Result<Self> {
        let store = Store::with_pool_options(
            &config.general.database_url,
            config.general.max_db_connections,
            config.general.min_db_connections,
        )
        .await?;

        Ok(Self::from_parts(config, store, mailer))
    }

    /// Wire services over an already-open store.
    #[must_use]
    pub fn from_parts(config: Config, store: Store, mailer: Arc<dyn Mailer>) -> Self {
        let (access_events, _) = broadcast::channel(ACCESS_EVENT_BUFFER);
        let config = Arc::new(config);

        let stripe = Arc::new(StripeClient::new(
            &config.stripe.api_base,
            config.stripe.secret_key.clone(),
        ));

        let identity_service = Arc::new(SeaOrmIdentityService::new(
            store.clone(),
            config.clone(),
            mailer.clone(),
        )) as Arc<dyn IdentityService>;

        let claim_service = Arc::new(SeaOrmClaimService::new(
            store.clone(),
            config.clone(),
            identity_service.clone(),
        )) as Arc<dyn ClaimService>;

        let webhook_service = Arc::new(StripeWebhookService::new(
            store.clone(),
            config.clone(),
            identity_service.clone(),
            mailer.clone(),
            access_events.clone(),
        )) as Arc<dyn WebhookService>;

        // The bypass secret is read once here; later config changes do not apply.
        let access_service = Arc::new(SeaOrmAccessService::new(
            store.clone(),
            identity_service.clone(),
            config.access.active_bypass_secret().map(str::to_string),
        )) as Arc<dyn AccessService>;

        Self {
            config,
            store,
            stripe,
            mailer,
            identity_service,
            claim_service,
            webhook_service,
            access_service,
            access_events,
        }
    }
}
