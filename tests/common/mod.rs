//! Shared harness for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, Response, header},
};
use http_body_util::BodyExt;
use quizgate::api::{self, AppState};
use quizgate::clients::mailer::{EmailMessage, MailError, Mailer};
use quizgate::clients::stripe;
use quizgate::config::Config;
use quizgate::db::Store;
use quizgate::state::SharedState;
use std::sync::{Arc, Mutex};

pub const WEBHOOK_SECRET: &str = "whsec_test_secret";
pub const BASE_URL: &str = "http://quiz.test";

#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<EmailMessage>>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().unwrap().clone()
    }

    /// The `token` query value of the last link mailed to `to`.
    pub fn last_token_for(&self, to: &str) -> Option<String> {
        self.sent()
            .iter()
            .rev()
            .find(|m| m.to == to)
            .and_then(|m| m.link.split_once("token=").map(|(_, t)| t.to_string()))
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError> {
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

/// A mailer whose provider always rejects the message.
pub struct FailingMailer;

#[async_trait]
impl Mailer for FailingMailer {
    async fn send(&self, _message: &EmailMessage) -> Result<(), MailError> {
        Err(MailError::Rejected {
            status: 503,
            body: "unavailable".to_string(),
        })
    }
}

pub struct TestApp {
    pub state: Arc<AppState>,
    pub router: Router,
    pub mailer: Arc<RecordingMailer>,
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        use tower::ServiceExt;
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub fn store(&self) -> &Store {
        self.state.store()
    }
}

pub fn test_config() -> Config {
    let db_path =
        std::env::temp_dir().join(format!("quizgate-test-{}.db", uuid::Uuid::new_v4()));

    let mut config = Config::default();
    config.general.database_url = format!("sqlite:{}", db_path.display());
    config.server.base_url = BASE_URL.to_string();
    config.server.cors_allowed_origins = vec![BASE_URL.to_string()];
    config.server.secure_cookies = false;
    config.stripe.webhook_secret = Some(WEBHOOK_SECRET.to_string());
    config.auth.argon2_memory_cost_kib = 1024;
    config.auth.argon2_time_cost = 1;
    config.observability.metrics_enabled = false;
    config
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(test_config()).await
}

pub async fn spawn_app_with(config: Config) -> TestApp {
    let mailer = Arc::new(RecordingMailer::default());
    build_app(config, mailer.clone(), mailer).await
}

/// Like [`spawn_app_with`], but deliveries go to `sender`. The returned
/// recorder stays empty.
pub async fn spawn_app_with_mailer(config: Config, sender: Arc<dyn Mailer>) -> TestApp {
    build_app(config, sender, Arc::new(RecordingMailer::default())).await
}

async fn build_app(
    config: Config,
    sender: Arc<dyn Mailer>,
    mailer: Arc<RecordingMailer>,
) -> TestApp {
    let store = Store::new(&config.general.database_url)
        .await
        .expect("failed to open test database");

    let shared = Arc::new(SharedState::from_parts(config, store, sender));
    let state = api::create_app_state(shared, None)
        .await
        .expect("failed to create app state");
    let router = api::router(state.clone());

    TestApp {
        state,
        router,
        mailer,
    }
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn get_with_cookie(uri: &str, cookie: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::COOKIE, cookie)
        .body(Body::empty())
        .unwrap()
}

pub fn json_request(method: &str, uri: &str, body: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// A webhook delivery signed with [`WEBHOOK_SECRET`] at the current time.
pub fn signed_webhook(payload: &serde_json::Value) -> Request<Body> {
    let body = payload.to_string();
    let timestamp = chrono::Utc::now().timestamp();
    let signature = stripe::sign_payload(body.as_bytes(), WEBHOOK_SECRET, timestamp);

    Request::builder()
        .method("POST")
        .uri("/api/stripe-webhook")
        .header("stripe-signature", format!("t={timestamp},v1={signature}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap()
}

pub fn checkout_completed(event_id: &str, email: &str, customer: &str) -> serde_json::Value {
    serde_json::json!({
        "id": event_id,
        "type": "checkout.session.completed",
        "data": {
            "object": {
                "id": "cs_test_1",
                "customer": customer,
                "customer_details": { "email": email }
            }
        }
    })
}

pub fn subscription_event(
    event_id: &str,
    kind: &str,
    customer: &str,
    status: &str,
) -> serde_json::Value {
    serde_json::json!({
        "id": event_id,
        "type": kind,
        "data": {
            "object": {
                "id": "sub_test_1",
                "customer": customer,
                "status": status
            }
        }
    })
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// `name=value` of the session cookie set on a response.
pub fn session_cookie(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(str::to_string)
}

pub fn location(response: &Response<Body>) -> Option<&str> {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
}

/// Sign in over HTTP and return the session cookie.
pub async fn login(app: &TestApp, email: &str, password: &str) -> String {
    let response = app
        .send(json_request(
            "POST",
            "/api/auth/login",
            &serde_json::json!({ "email": email, "password": password }),
        ))
        .await;
    assert_eq!(response.status(), 200, "login failed for {email}");
    session_cookie(&response).expect("login did not set a session cookie")
}
