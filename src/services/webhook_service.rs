//! Reconciles payment-provider events into profiles and signup tokens.

use thiserror::Error;

use crate::clients::stripe::StripeError;

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("Missing Stripe signature or webhook secret")]
    MissingSecret,

    #[error("Missing Stripe signature or webhook secret")]
    MissingSignature,

    #[error("Webhook Error: {0}")]
    Verification(StripeError),

    #[error("Webhook Error: {0}")]
    Malformed(StripeError),

    #[error("Store error: {0}")]
    Store(String),
}

impl From<anyhow::Error> for WebhookError {
    fn from(err: anyhow::Error) -> Self {
        Self::Store(format!("{err:#}"))
    }
}

impl From<sea_orm::DbErr> for WebhookError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Store(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// The event mutated (or confirmed) local state.
    Processed,
    /// The event id was already handled.
    Duplicate,
    /// Unsupported type, or nothing to act on.
    Ignored,
}

impl WebhookOutcome {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Processed => "processed",
            Self::Duplicate => "duplicate",
            Self::Ignored => "ignored",
        }
    }
}

#[async_trait::async_trait]
pub trait WebhookService: Send + Sync {
    /// Verify and apply one delivery. `payload` must be the exact request body.
    async fn handle(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookOutcome, WebhookError>;
}
