pub mod access_monitor;
pub use access_monitor::{AccessProbe, MonitorHandle, MonitorUpdate, SessionProbe};

pub mod access_service;
pub mod access_service_impl;
pub use access_service::{
    AccessDecision, AccessError, AccessEvent, AccessGrant, AccessService, DenyReason,
    InactiveCause,
};
pub use access_service_impl::SeaOrmAccessService;

pub mod claim_service;
pub mod claim_service_impl;
pub use claim_service::{ClaimError, ClaimService};
pub use claim_service_impl::SeaOrmClaimService;

pub mod identity_service;
pub mod identity_service_impl;
pub use identity_service::{IdentityError, IdentityService};
pub use identity_service_impl::SeaOrmIdentityService;

pub mod webhook_service;
pub mod webhook_service_impl;
pub use webhook_service::{WebhookError, WebhookOutcome, WebhookService};
pub use webhook_service_impl::StripeWebhookService;
