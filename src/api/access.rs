use axum::{
    Extension, Json,
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{
        IntoResponse, Redirect, Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures::stream::{self, Stream};
use std::{convert::Infallible, sync::Arc, time::Duration};
use tokio::sync::{broadcast, mpsc};
use tower_sessions::Session;
use tracing::{debug, info, warn};

use super::{AccessStatusDto, ApiError, AppPageDto, AppState, auth::session_user_id};
use crate::config::AccessConfig;
use crate::constants::{DEBUG_BYPASS_HEADER, intervals, paths};
use crate::services::access_monitor::{self, MonitorHandle, MonitorUpdate, SessionProbe};
use crate::services::{AccessDecision, AccessEvent, AccessGrant, DenyReason};

fn bypass_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get(DEBUG_BYPASS_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Where a denied viewer is sent.
fn redirect_target(reason: DenyReason, config: &AccessConfig) -> &str {
    match reason {
        DenyReason::NoSession => &config.login_path,
        DenyReason::Inactive(_) => &config.subscribe_path,
    }
}

/// Whether a denial ends the server-side session.
const fn ends_session(reason: DenyReason, config: &AccessConfig) -> bool {
    match reason {
        DenyReason::NoSession => true,
        DenyReason::Inactive(_) => config.sign_out_on_deny,
    }
}

async fn end_session(session: &Session) {
    if let Err(e) = session.flush().await {
        warn!(error = %e, "Failed to end session after access denial");
    }
}

pub fn status_dto(decision: &AccessDecision, config: &AccessConfig) -> AccessStatusDto {
    match decision {
        AccessDecision::Allowed(grant) => AccessStatusDto {
            state: "allowed",
            reason: None,
            detail: None,
            redirect: None,
            user: grant.identity.clone(),
            profile: grant.profile.clone(),
            bypass: grant.bypass,
        },
        AccessDecision::Denied(reason) => AccessStatusDto {
            state: "denied",
            reason: Some(reason.as_str()),
            detail: match reason {
                DenyReason::Inactive(cause) => Some(*cause),
                DenyReason::NoSession => None,
            },
            redirect: Some(redirect_target(*reason, config).to_string()),
            user: None,
            profile: None,
            bypass: false,
        },
    }
}

/// Guard for protected pages. Allowed requests carry the [`AccessGrant`] in
/// their extensions.
pub async fn guard_middleware(
    State(state): State<Arc<AppState>>,
    session: Session,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Response {
    let user_id = session_user_id(&session).await;
    let bypass = bypass_header(&headers);

    let decision = match state
        .shared
        .access_service
        .evaluate_request(user_id.as_deref(), bypass.as_deref())
        .await
    {
        Ok(decision) => decision,
        Err(e) => return ApiError::from(e).into_response(),
    };

    let config = &state.config().access;
    match decision {
        AccessDecision::Allowed(grant) => {
            if let Some(id) = user_id.as_deref() {
                tracing::Span::current().record("user_id", id);
            }
            request.extensions_mut().insert(grant);
            next.run(request).await
        }
        AccessDecision::Denied(reason) => {
            if matches!(reason, DenyReason::Inactive(_)) && ends_session(reason, config) {
                end_session(&session).await;
            }
            debug!(reason = reason.as_str(), "Protected page denied");
            Redirect::temporary(redirect_target(reason, config)).into_response()
        }
    }
}

/// GET /app
pub async fn app_page(Extension(grant): Extension<AccessGrant>) -> Json<AppPageDto> {
    let subscription_active = grant.bypass
        || grant
            .profile
            .as_ref()
            .is_some_and(crate::models::Profile::is_entitled);

    Json(AppPageDto {
        user: grant.identity,
        profile: grant.profile,
        subscription_active,
        quiz_path: paths::QUIZ,
    })
}

/// GET /api/access
pub async fn access_status(
    State(state): State<Arc<AppState>>,
    session: Session,
    headers: HeaderMap,
) -> Result<Json<AccessStatusDto>, ApiError> {
    let user_id = session_user_id(&session).await;
    let bypass = bypass_header(&headers);

    let decision = state
        .shared
        .access_service
        .evaluate_request(user_id.as_deref(), bypass.as_deref())
        .await?;

    let config = &state.config().access;
    if let AccessDecision::Denied(reason @ DenyReason::Inactive(_)) = decision
        && ends_session(reason, config)
    {
        end_session(&session).await;
    }

    Ok(Json(status_dto(&decision, config)))
}

/// POST /api/access/recheck
///
/// Sent by clients when a view regains focus.
pub async fn recheck(State(state): State<Arc<AppState>>, session: Session) -> StatusCode {
    if let Some(user_id) = session_user_id(&session).await {
        // No receivers means no open views.
        let _ = state.access_events().send(AccessEvent::Recheck {
            user_id: Some(user_id),
        });
    }
    StatusCode::ACCEPTED
}

struct View {
    // Held for its Drop: closing the stream stops the monitor.
    handle: MonitorHandle,
    updates: mpsc::Receiver<MonitorUpdate>,
    bus: broadcast::Receiver<AccessEvent>,
    bus_open: bool,
    session: Session,
    user_id: Option<String>,
    config: AccessConfig,
    done: bool,
}

impl View {
    /// Turn one monitor update into an SSE event. A denial or a failed check
    /// finishes the view.
    async fn render(&mut self, update: MonitorUpdate) -> Event {
        match update {
            MonitorUpdate::Checking => Event::default().event("checking").data("{}"),
            MonitorUpdate::Decided(decision) => {
                let dto = status_dto(&decision, &self.config);
                if let AccessDecision::Denied(reason) = decision {
                    if ends_session(reason, &self.config) {
                        end_session(&self.session).await;
                    }
                    info!(
                        user_id = self.user_id.as_deref().unwrap_or("-"),
                        reason = reason.as_str(),
                        "Open view lost access"
                    );
                    self.done = true;
                    self.handle.stop();
                }
                let json = serde_json::to_string(&dto).unwrap_or_default();
                Event::default().event(dto.state).data(json)
            }
            // A check that cannot complete is treated like a lost session.
            MonitorUpdate::Failed(message) => {
                warn!(error = %message, "Access re-check failed, ending view");
                end_session(&self.session).await;
                self.done = true;
                self.handle.stop();
                let json = serde_json::json!({ "redirect": self.config.login_path }).to_string();
                Event::default().event("error").data(json)
            }
        }
    }
}

/// GET /api/access/events
///
/// Server-sent events for one open view: `checking`, then `allowed` or
/// `denied`, on start, every recheck interval and on each recheck trigger.
/// The stream ends after a `denied` or `error` event.
pub async fn access_events(
    State(state): State<Arc<AppState>>,
    session: Session,
    headers: HeaderMap,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let config = state.config().access.clone();
    let user_id = session_user_id(&session).await;

    let probe = Arc::new(SessionProbe::new(
        state.shared.access_service.clone(),
        user_id.clone(),
        bypass_header(&headers),
    ));
    let (handle, updates) = access_monitor::spawn(
        probe,
        Duration::from_secs(config.recheck_interval_seconds),
    );

    let view = View {
        handle,
        updates,
        bus: state.access_events().subscribe(),
        bus_open: true,
        session,
        user_id,
        config,
        done: false,
    };

    let stream = stream::unfold(view, |mut view| async move {
        if view.done {
            return None;
        }

        loop {
            tokio::select! {
                update = view.updates.recv() => {
                    let update = update?;
                    let event = view.render(update).await;
                    return Some((Ok(event), view));
                }
                message = view.bus.recv(), if view.bus_open => match message {
                    Ok(event) if event.concerns(view.user_id.as_deref()) => view.handle.trigger(),
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(count)) => {
                        debug!("Access view lagged by {} events", count);
                        view.handle.trigger();
                    }
                    Err(broadcast::error::RecvError::Closed) => view.bus_open = false,
                },
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(intervals::SSE_KEEP_ALIVE))
}
