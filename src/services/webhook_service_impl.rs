//! Stripe implementation of the `WebhookService` trait.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::clients::mailer::{EmailMessage, Mailer};
use crate::clients::stripe::{
    self, CheckoutSessionObject, Event, InvoiceObject, SubscriptionObject,
};
use crate::config::Config;
use crate::db::Store;
use crate::models::normalize_email;
use crate::services::access_service::AccessEvent;
use crate::services::identity_service::IdentityService;
use crate::services::webhook_service::{WebhookError, WebhookOutcome, WebhookService};

pub struct StripeWebhookService {
    store: Store,
    config: Arc<Config>,
    identities: Arc<dyn IdentityService>,
    mailer: Arc<dyn Mailer>,
    access_events: broadcast::Sender<AccessEvent>,
}

impl StripeWebhookService {
    #[must_use]
    pub fn new(
        store: Store,
        config: Arc<Config>,
        identities: Arc<dyn IdentityService>,
        mailer: Arc<dyn Mailer>,
        access_events: broadcast::Sender<AccessEvent>,
    ) -> Self {
        Self {
            store,
            config,
            identities,
            mailer,
            access_events,
        }
    }

    fn claim_url(&self, token: &str) -> String {
        format!(
            "{}/claim?token={}",
            self.config.server.base_url,
            urlencoding::encode(token)
        )
    }

    async fn on_checkout_completed(&self, event: &Event) -> Result<WebhookOutcome, WebhookError> {
        let session: CheckoutSessionObject = event.object().map_err(WebhookError::Malformed)?;

        let Some(email) = session.payer_email().map(normalize_email) else {
            warn!(event_id = %event.id, "checkout.session.completed received without customer email");
            return Ok(WebhookOutcome::Ignored);
        };

        let profile = self
            .store
            .upsert_paid_profile(&email, session.customer.as_deref())
            .await?;
        info!(
            email = %email,
            customer_id = session.customer.as_deref().unwrap_or("-"),
            "Upserted profile and marked active"
        );

        let existing = self
            .identities
            .find_by_email(&email)
            .await
            .map_err(|e| WebhookError::Store(e.to_string()))?;

        if let Some(identity) = existing {
            if profile.user_id.is_none() {
                self.store
                    .link_profile_to_user(profile.id, &identity.id)
                    .await?;
            }
            info!(email = %email, user_id = %identity.id, "Payer already has an account, no claim token issued");
            return Ok(WebhookOutcome::Processed);
        }

        let ttl = Duration::days(self.config.auth.signup_token_ttl_days);
        let issued = self.store.issue_signup_token(&email, ttl).await?;

        let message = EmailMessage::claim_link(&email, &self.claim_url(&issued.token.token));
        match self.mailer.send(&message).await {
            Ok(()) => info!(email = %email, reused = issued.reused, "Claim link sent"),
            Err(e) => error!(email = %email, error = %e, "Failed to send claim link"),
        }

        Ok(WebhookOutcome::Processed)
    }

    async fn set_expiry(
        &self,
        event: &Event,
        customer_id: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<WebhookOutcome, WebhookError> {
        let Some(customer_id) = customer_id else {
            warn!(event_id = %event.id, kind = %event.kind, "Event carries no customer id");
            return Ok(WebhookOutcome::Ignored);
        };

        let touched = self
            .store
            .set_profile_expiry_by_customer(customer_id, expires_at)
            .await?;

        if touched == 0 {
            warn!(customer_id, kind = %event.kind, "No profile matches customer");
            return Ok(WebhookOutcome::Ignored);
        }

        info!(
            customer_id,
            kind = %event.kind,
            entitled = expires_at.is_none_or(|t| t > Utc::now()),
            "Updated profile entitlement"
        );
        Ok(WebhookOutcome::Processed)
    }

    async fn dispatch(&self, event: &Event) -> Result<WebhookOutcome, WebhookError> {
        let now = Utc::now();

        match event.kind.as_str() {
            stripe::CHECKOUT_SESSION_COMPLETED => self.on_checkout_completed(event).await,
            stripe::SUBSCRIPTION_UPDATED => {
                let sub: SubscriptionObject = event.object().map_err(WebhookError::Malformed)?;
                let expires_at = if sub.is_active() {
                    sub.period_end()
                        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
                } else {
                    Some(now)
                };
                self.set_expiry(event, sub.customer.as_deref(), expires_at)
                    .await
            }
            stripe::SUBSCRIPTION_DELETED => {
                let sub: SubscriptionObject = event.object().map_err(WebhookError::Malformed)?;
                self.set_expiry(event, sub.customer.as_deref(), Some(now))
                    .await
            }
            stripe::INVOICE_PAYMENT_FAILED => {
                let invoice: InvoiceObject = event.object().map_err(WebhookError::Malformed)?;
                self.set_expiry(event, invoice.customer.as_deref(), Some(now))
                    .await
            }
            other => {
                info!(kind = other, "Ignoring unsupported event type");
                Ok(WebhookOutcome::Ignored)
            }
        }
    }
}

fn kind_label(kind: &str) -> &'static str {
    match kind {
        stripe::CHECKOUT_SESSION_COMPLETED => stripe::CHECKOUT_SESSION_COMPLETED,
        stripe::SUBSCRIPTION_UPDATED => stripe::SUBSCRIPTION_UPDATED,
        stripe::SUBSCRIPTION_DELETED => stripe::SUBSCRIPTION_DELETED,
        stripe::INVOICE_PAYMENT_FAILED => stripe::INVOICE_PAYMENT_FAILED,
        _ => "other",
    }
}

#[async_trait]
impl WebhookService for StripeWebhookService {
    async fn handle(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookOutcome, WebhookError> {
        let secret = self
            .config
            .stripe
            .webhook_secret
            .as_deref()
            .ok_or(WebhookError::MissingSecret)?;
        let signature = signature.ok_or(WebhookError::MissingSignature)?;

        stripe::verify_signature(
            payload,
            signature,
            secret,
            self.config.stripe.webhook_tolerance_seconds,
            Utc::now().timestamp(),
        )
        .map_err(WebhookError::Verification)?;

        let event = Event::parse(payload).map_err(WebhookError::Malformed)?;
        let kind = kind_label(&event.kind);

        if self.store.is_webhook_event_processed(&event.id).await? {
            info!(event_id = %event.id, kind, "Duplicate webhook delivery acknowledged");
            metrics::counter!("webhook_events_total", "kind" => kind, "outcome" => "duplicate")
                .increment(1);
            return Ok(WebhookOutcome::Duplicate);
        }

        let outcome = match self.dispatch(&event).await {
            Ok(outcome) => outcome,
            Err(e) => {
                metrics::counter!("webhook_events_total", "kind" => kind, "outcome" => "error")
                    .increment(1);
                return Err(e);
            }
        };

        self.store.record_webhook_event(&event.id, &event.kind).await?;

        if outcome == WebhookOutcome::Processed {
            // No receivers is fine: nobody has a view open.
            let _ = self.access_events.send(AccessEvent::Recheck { user_id: None });
        }

        metrics::counter!("webhook_events_total", "kind" => kind, "outcome" => outcome.as_str())
            .increment(1);
        Ok(outcome)
    }
}
