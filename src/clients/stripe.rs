use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

pub const CHECKOUT_SESSION_COMPLETED: &str = "checkout.session.completed";
pub const SUBSCRIPTION_UPDATED: &str = "customer.subscription.updated";
pub const SUBSCRIPTION_DELETED: &str = "customer.subscription.deleted";
pub const INVOICE_PAYMENT_FAILED: &str = "invoice.payment_failed";

#[derive(Debug, thiserror::Error)]
pub enum StripeError {
    #[error("Unable to extract timestamp and signatures from header")]
    MalformedHeader,

    #[error("No signatures found with expected scheme")]
    NoSignatures,

    #[error("Timestamp outside the tolerance zone")]
    TimestampOutsideTolerance,

    #[error("No signatures found matching the expected signature for payload")]
    SignatureMismatch,

    #[error("Invalid event payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),

    #[error("Stripe API key not configured")]
    NotConfigured,

    #[error("Stripe request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Stripe API error ({status}): {message}")]
    Api { status: u16, message: String },
}

/// Verify a `Stripe-Signature` header (`t=<unix>,v1=<hex>[,v1=<hex>...]`)
/// against the raw request body.
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    tolerance_seconds: u64,
    now_unix: i64,
) -> Result<(), StripeError> {
    let mut timestamp: Option<i64> = None;
    let mut signatures: Vec<Vec<u8>> = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => timestamp = value.parse().ok(),
            // Undecodable entries can never match, so they are skipped.
            "v1" => {
                if let Ok(bytes) = hex::decode(value) {
                    signatures.push(bytes);
                }
            }
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(StripeError::MalformedHeader)?;
    if signatures.is_empty() {
        return Err(StripeError::NoSignatures);
    }

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| StripeError::SignatureMismatch)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);

    // verify_slice compares in constant time.
    let matched = signatures
        .iter()
        .any(|candidate| mac.clone().verify_slice(candidate).is_ok());
    if !matched {
        return Err(StripeError::SignatureMismatch);
    }

    if now_unix.abs_diff(timestamp) > tolerance_seconds {
        return Err(StripeError::TimestampOutsideTolerance);
    }

    Ok(())
}

/// Compute the `v1` signature for a payload, producing deliveries the
/// verifier accepts.
#[must_use]
pub fn sign_payload(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return String::new();
    };
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

#[derive(Debug, Clone, Deserialize)]
pub struct Event {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: EventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    pub object: serde_json::Value,
}

impl Event {
    pub fn parse(payload: &[u8]) -> Result<Self, StripeError> {
        Ok(serde_json::from_slice(payload)?)
    }

    /// Decode the embedded object into the shape expected for this event type.
    pub fn object<T: serde::de::DeserializeOwned>(&self) -> Result<T, StripeError> {
        Ok(serde_json::from_value(self.data.object.clone())?)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckoutSessionObject {
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub customer_details: Option<CustomerDetails>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomerDetails {
    #[serde(default)]
    pub email: Option<String>,
}

impl CheckoutSessionObject {
    /// Payer email, preferring the details collected at checkout.
    #[must_use]
    pub fn payer_email(&self) -> Option<&str> {
        let present = |e: &&str| !e.trim().is_empty();
        self.customer_details
            .as_ref()
            .and_then(|d| d.email.as_deref())
            .filter(present)
            .or_else(|| self.customer_email.as_deref().filter(present))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscriptionObject {
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub current_period_end: Option<i64>,
    #[serde(default)]
    pub items: Option<SubscriptionItems>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscriptionItems {
    #[serde(default)]
    pub data: Vec<SubscriptionItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscriptionItem {
    #[serde(default)]
    pub current_period_end: Option<i64>,
}

impl SubscriptionObject {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == "active"
    }

    /// Period end as a unix timestamp. Newer API versions only carry it on
    /// the subscription items.
    #[must_use]
    pub fn period_end(&self) -> Option<i64> {
        self.current_period_end.or_else(|| {
            self.items
                .as_ref()
                .and_then(|items| items.data.iter().filter_map(|i| i.current_period_end).max())
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InvoiceObject {
    #[serde(default)]
    pub customer: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: String,
}

#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    api_base: String,
    secret_key: Option<String>,
}

impl StripeClient {
    #[must_use]
    pub fn new(api_base: &str, secret_key: Option<String>) -> Self {
        Self {
            client: Client::builder()
                .user_agent("Quizgate/1.0")
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| Client::new()),
            api_base: api_base.trim_end_matches('/').to_string(),
            secret_key,
        }
    }

    #[must_use]
    pub const fn is_configured(&self) -> bool {
        self.secret_key.is_some()
    }

    /// Create a subscription-mode hosted Checkout Session for one unit of `price_id`.
    pub async fn create_checkout_session(
        &self,
        price_id: &str,
        origin: &str,
    ) -> Result<CheckoutSession, StripeError> {
        let secret_key = self.secret_key.as_deref().ok_or(StripeError::NotConfigured)?;
        let origin = origin.trim_end_matches('/');

        let success_url = format!("{origin}/checkout-success?session_id={{CHECKOUT_SESSION_ID}}");
        let cancel_url = format!("{origin}/checkout-cancelled");
        let form = [
            ("mode", "subscription"),
            ("payment_method_types[0]", "card"),
            ("line_items[0][price]", price_id),
            ("line_items[0][quantity]", "1"),
            ("success_url", success_url.as_str()),
            ("cancel_url", cancel_url.as_str()),
        ];

        debug!(price_id, origin, "Creating Stripe checkout session");

        let response = self
            .client
            .post(format!("{}/v1/checkout/sessions", self.api_base))
            .bearer_auth(secret_key)
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ApiErrorBody>()
                .await
                .map(|body| body.error.message)
                .unwrap_or_default();
            return Err(StripeError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test123secret456";
    const NOW: i64 = 1_700_000_000;

    fn header(payload: &[u8], secret: &str, timestamp: i64) -> String {
        format!("t={timestamp},v1={}", sign_payload(payload, secret, timestamp))
    }

    #[test]
    fn test_valid_signature() {
        let payload = br#"{"id":"evt_1","type":"invoice.payment_failed"}"#;
        let header = header(payload, SECRET, NOW);
        assert!(verify_signature(payload, &header, SECRET, 300, NOW).is_ok());
    }

    #[test]
    fn test_any_v1_may_match() {
        let payload = b"{}";
        let good = sign_payload(payload, SECRET, NOW);
        let header = format!("t={NOW},v1={},v1={good}", "00".repeat(32));
        assert!(verify_signature(payload, &header, SECRET, 300, NOW).is_ok());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let payload = b"{}";
        let header = header(payload, "wrong_secret", NOW);
        assert!(matches!(
            verify_signature(payload, &header, SECRET, 300, NOW),
            Err(StripeError::SignatureMismatch)
        ));
    }

    #[test]
    fn test_modified_payload_rejected() {
        let header = header(br#"{"amount":100}"#, SECRET, NOW);
        assert!(verify_signature(br#"{"amount":999}"#, &header, SECRET, 300, NOW).is_err());
    }

    #[test]
    fn test_old_timestamp_rejected() {
        let payload = b"{}";
        let header = header(payload, SECRET, NOW - 600);
        assert!(matches!(
            verify_signature(payload, &header, SECRET, 300, NOW),
            Err(StripeError::TimestampOutsideTolerance)
        ));
    }

    #[test]
    fn test_malformed_headers() {
        let payload = b"{}";
        assert!(matches!(
            verify_signature(payload, "v1=abcd", SECRET, 300, NOW),
            Err(StripeError::MalformedHeader)
        ));
        assert!(matches!(
            verify_signature(payload, "t=1234567890", SECRET, 300, NOW),
            Err(StripeError::NoSignatures)
        ));
        assert!(verify_signature(payload, "garbage", SECRET, 300, NOW).is_err());
        assert!(verify_signature(payload, "", SECRET, 300, NOW).is_err());
    }

    #[test]
    fn test_checkout_payer_email_prefers_details() {
        let object: CheckoutSessionObject = serde_json::from_value(serde_json::json!({
            "customer": "cus_1",
            "customer_email": "fallback@example.com",
            "customer_details": { "email": "details@example.com" }
        }))
        .unwrap();
        assert_eq!(object.payer_email(), Some("details@example.com"));

        let object: CheckoutSessionObject = serde_json::from_value(serde_json::json!({
            "customer_email": "fallback@example.com",
            "customer_details": { "email": null }
        }))
        .unwrap();
        assert_eq!(object.payer_email(), Some("fallback@example.com"));

        let object: CheckoutSessionObject = serde_json::from_value(serde_json::json!({
            "customer_email": "fallback@example.com",
            "customer_details": { "email": "" }
        }))
        .unwrap();
        assert_eq!(object.payer_email(), Some("fallback@example.com"));

        let object = CheckoutSessionObject::default();
        assert_eq!(object.payer_email(), None);
    }

    #[test]
    fn test_subscription_period_end_from_items() {
        let object: SubscriptionObject = serde_json::from_value(serde_json::json!({
            "customer": "cus_1",
            "status": "active",
            "items": { "data": [ { "current_period_end": 1_800_000_000 } ] }
        }))
        .unwrap();
        assert!(object.is_active());
        assert_eq!(object.period_end(), Some(1_800_000_000));
    }
}
