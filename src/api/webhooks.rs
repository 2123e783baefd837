use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{error, warn};

use super::{AppState, ReceivedResponse};
use crate::services::WebhookError;

const SIGNATURE_HEADER: &str = "stripe-signature";

/// POST /api/stripe-webhook
///
/// Takes the body as raw bytes: the signature covers the exact payload.
pub async fn stripe_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    match state.shared.webhook_service.handle(&body, signature).await {
        Ok(_) => Json(ReceivedResponse { received: true }).into_response(),
        Err(e) => webhook_error_response(&e),
    }
}

fn webhook_error_response(err: &WebhookError) -> Response {
    match err {
        WebhookError::MissingSecret | WebhookError::MissingSignature => {
            warn!(error = %err, "Rejected webhook without signature or secret");
            (StatusCode::BAD_REQUEST, err.to_string()).into_response()
        }
        WebhookError::Verification(_) | WebhookError::Malformed(_) => {
            warn!(error = %err, "Webhook verification failed");
            (StatusCode::BAD_REQUEST, err.to_string()).into_response()
        }
        WebhookError::Store(detail) => {
            error!(error = %detail, "Webhook handler error");
            (StatusCode::INTERNAL_SERVER_ERROR, "Webhook handler error").into_response()
        }
    }
}
