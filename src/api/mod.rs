use axum::{
    Router,
    http::{HeaderName, HeaderValue, Method, header},
    middleware,
    routing::{get, post, put},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tower_sessions::{Expiry, SessionManagerLayer};
use tower_sessions_sqlx_store::SqliteStore;

use crate::config::Config;
use crate::db::Store;
use crate::state::SharedState;

pub mod access;
pub mod auth;
mod checkout;
mod claim;
mod error;
mod observability;
mod system;
mod types;
mod validation;
mod webhooks;

pub use error::ApiError;
pub use types::*;

use metrics_exporter_prometheus::PrometheusHandle;

#[derive(Clone)]
pub struct AppState {
    pub shared: Arc<SharedState>,

    pub session_store: SqliteStore,

    pub start_time: std::time::Instant,

    pub prometheus_handle: Option<PrometheusHandle>,
}

impl AppState {
    #[must_use]
    pub fn config(&self) -> &Arc<Config> {
        &self.shared.config
    }

    #[must_use]
    pub fn store(&self) -> &Store {
        &self.shared.store
    }

    #[must_use]
    pub fn access_events(
        &self,
    ) -> &tokio::sync::broadcast::Sender<crate::services::AccessEvent> {
        &self.shared.access_events
    }
}

pub async fn create_app_state(
    shared: Arc<SharedState>,
    prometheus_handle: Option<PrometheusHandle>,
) -> anyhow::Result<Arc<AppState>> {
    let session_store = SqliteStore::new(shared.store.sqlite_pool());
    session_store
        .migrate()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to migrate session store: {e}"))?;

    Ok(Arc::new(AppState {
        shared,
        session_store,
        start_time: std::time::Instant::now(),
        prometheus_handle,
    }))
}

pub async fn create_app_state_from_config(
    config: Config,
    prometheus_handle: Option<PrometheusHandle>,
) -> anyhow::Result<Arc<AppState>> {
    let shared = Arc::new(SharedState::new(config).await?);
    create_app_state(shared, prometheus_handle).await
}

pub fn router(state: Arc<AppState>) -> Router {
    let config = state.config().clone();

    let session_layer = SessionManagerLayer::new(state.session_store.clone())
        .with_secure(config.server.secure_cookies)
        .with_same_site(tower_sessions::cookie::SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::minutes(
            config.server.session_idle_minutes,
        )));

    let api_router = Router::new()
        .route("/stripe-webhook", post(webhooks::stripe_webhook))
        .route("/check-signup-token", get(claim::check_signup_token))
        .route("/claim-signup", post(claim::claim_signup))
        .route(
            "/create-checkout-session",
            post(checkout::create_checkout_session),
        )
        .route("/auth/signup", post(auth::signup))
        .route("/auth/login", post(auth::login))
        .route("/auth/magic-link", post(auth::magic_link))
        .route("/auth/callback", get(auth::callback))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/me", get(auth::me))
        .route("/auth/password", put(auth::change_password))
        .route("/access", get(access::access_status))
        .route("/access/events", get(access::access_events))
        .route("/access/recheck", post(access::recheck))
        .route("/health", get(system::health));

    let protected_pages = Router::new()
        .route(crate::constants::paths::APP, get(access::app_page))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            access::guard_middleware,
        ));

    let cors_origins = &config.server.cors_allowed_origins;
    let cors_layer = if cors_origins.iter().any(|o| o == "*") {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> =
            cors_origins.iter().filter_map(|s| s.parse().ok()).collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_credentials(true)
    }
    .allow_methods([Method::GET, Method::POST, Method::PUT])
    .allow_headers([
        header::CONTENT_TYPE,
        HeaderName::from_static(crate::constants::DEBUG_BYPASS_HEADER),
    ]);

    Router::new()
        .nest("/api", api_router)
        .merge(protected_pages)
        .route("/metrics", get(observability::get_metrics))
        .layer(session_layer)
        .with_state(state)
        .layer(cors_layer)
        .layer(middleware::from_fn(
            observability::security_headers_middleware,
        ))
        // Innermost of the two so handlers run inside the request span.
        .layer(middleware::from_fn(observability::logging_middleware))
        .layer(TraceLayer::new_for_http())
}
