mod common;

use axum::http::StatusCode;
use chrono::Duration;
use common::*;
use serde_json::json;

#[tokio::test]
async fn test_health() {
    let app = spawn_app().await;

    let response = app.send(get("/api/health")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["database"], true);
}

#[tokio::test]
async fn test_check_signup_token_errors() {
    let app = spawn_app().await;

    let response = app.send(get("/api/check-signup-token")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "Missing token");

    let response = app.send(get("/api/check-signup-token?token=")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "Missing token");

    let response = app.send(get("/api/check-signup-token?token=nope")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await["error"],
        "This signup link is invalid or has expired."
    );
}

#[tokio::test]
async fn test_claim_flow() {
    let app = spawn_app().await;
    let issued = app
        .store()
        .issue_signup_token("Claimer@Example.com", Duration::days(7))
        .await
        .unwrap();
    let token = issued.token.token;

    let response = app
        .send(get(&format!("/api/check-signup-token?token={token}")))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["email"], "claimer@example.com");

    let response = app
        .send(json_request(
            "POST",
            "/api/claim-signup",
            &json!({ "token": token, "password": "hunter22" }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["success"], true);

    // The token is now spent.
    let response = app
        .send(get(&format!("/api/check-signup-token?token={token}")))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .send(json_request(
            "POST",
            "/api/claim-signup",
            &json!({ "token": token, "password": "another1" }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await["error"],
        "This signup link is invalid or has expired."
    );

    // Claimed identities are confirmed and can sign in with the chosen password.
    login(&app, "claimer@example.com", "hunter22").await;
}

#[tokio::test]
async fn test_claim_signup_validation() {
    let app = spawn_app().await;

    let response = app
        .send(json_request("POST", "/api/claim-signup", &json!({})))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "Missing token or password");

    let response = app
        .send(
            axum::http::Request::builder()
                .method("POST")
                .uri("/api/claim-signup")
                .body(axum::body::Body::from("not json"))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "Missing token or password");

    let issued = app
        .store()
        .issue_signup_token("short@example.com", Duration::days(7))
        .await
        .unwrap();
    let response = app
        .send(json_request(
            "POST",
            "/api/claim-signup",
            &json!({ "token": issued.token.token, "password": "abc" }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // A rejected password leaves the token claimable.
    let response = app
        .send(get(&format!(
            "/api/check-signup-token?token={}",
            issued.token.token
        )))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_claim_for_existing_identity_is_rejected() {
    let app = spawn_app().await;
    let config = app.state.config().clone();

    app.store()
        .create_user("taken@example.com", "password1", true, &config.auth)
        .await
        .unwrap();
    let issued = app
        .store()
        .issue_signup_token("taken@example.com", Duration::days(7))
        .await
        .unwrap();

    let response = app
        .send(json_request(
            "POST",
            "/api/claim-signup",
            &json!({ "token": issued.token.token, "password": "password2" }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await["error"],
        "A user with this email address has already been registered"
    );

    // The failed claim leaves the token claimable.
    let stored = app
        .store()
        .get_signup_token(&issued.token.token)
        .await
        .unwrap()
        .unwrap();
    assert!(stored.used_at.is_none());

    let response = app
        .send(get(&format!(
            "/api/check-signup-token?token={}",
            issued.token.token
        )))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["email"], "taken@example.com");
}

#[tokio::test]
async fn test_auth_session_lifecycle() {
    let app = spawn_app().await;

    let response = app.send(get("/api/auth/me")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .send(json_request(
            "POST",
            "/api/auth/signup",
            &json!({ "email": "new@example.com", "password": "secret1" }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    // Unconfirmed identities cannot sign in with a password yet.
    let response = app
        .send(json_request(
            "POST",
            "/api/auth/login",
            &json!({ "email": "new@example.com", "password": "secret1" }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let token = app
        .mailer
        .last_token_for("new@example.com")
        .expect("signup should mail a login link");
    let response = app
        .send(get(&format!("/api/auth/callback?token={token}")))
        .await;
    assert!(response.status().is_redirection());
    assert_eq!(location(&response), Some("/app"));
    let cookie = session_cookie(&response).unwrap();

    let response = app.send(get_with_cookie("/api/auth/me", &cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["email"], "new@example.com");

    // Login links are single use.
    let response = app
        .send(get(&format!("/api/auth/callback?token={token}")))
        .await;
    assert_eq!(location(&response), Some("/login?error=link_invalid"));

    let response = app
        .send(
            axum::http::Request::builder()
                .method("POST")
                .uri("/api/auth/logout")
                .header(axum::http::header::COOKIE, &cookie)
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.send(get_with_cookie("/api/auth/me", &cookie)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    login(&app, "new@example.com", "secret1").await;
}

#[tokio::test]
async fn test_login_rejects_bad_credentials() {
    let app = spawn_app().await;

    let response = app
        .send(json_request(
            "POST",
            "/api/auth/login",
            &json!({ "email": "ghost@example.com", "password": "whatever" }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        body_json(response).await["error"],
        "Invalid login credentials"
    );
}

#[tokio::test]
async fn test_magic_link_does_not_reveal_accounts() {
    let app = spawn_app().await;

    let response = app
        .send(json_request(
            "POST",
            "/api/auth/magic-link",
            &json!({ "email": "nobody@example.com" }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let unknown = body_json(response).await;

    let config = app.state.config().clone();
    app.store()
        .create_user("known@example.com", "password1", true, &config.auth)
        .await
        .unwrap();

    let response = app
        .send(json_request(
            "POST",
            "/api/auth/magic-link",
            &json!({ "email": "known@example.com" }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, unknown);

    assert_eq!(app.mailer.sent().len(), 1);
    assert_eq!(app.mailer.sent()[0].to, "known@example.com");
}

#[tokio::test]
async fn test_change_password_requires_session() {
    let app = spawn_app().await;
    let config = app.state.config().clone();
    app.store()
        .create_user("pw@example.com", "password1", true, &config.auth)
        .await
        .unwrap();

    let response = app
        .send(json_request(
            "PUT",
            "/api/auth/password",
            &json!({ "password": "password2" }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let cookie = login(&app, "pw@example.com", "password1").await;
    let mut request = json_request(
        "PUT",
        "/api/auth/password",
        &json!({ "password": "password2" }),
    );
    request
        .headers_mut()
        .insert(axum::http::header::COOKIE, cookie.parse().unwrap());
    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::OK);

    login(&app, "pw@example.com", "password2").await;
}

#[tokio::test]
async fn test_checkout_requires_price() {
    let app = spawn_app().await;

    let response = app
        .send(json_request(
            "POST",
            "/api/create-checkout-session",
            &json!({}),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(response).await["error"], "Missing STRIPE_PRICE_ID");
}

#[tokio::test]
async fn test_metrics_disabled() {
    let app = spawn_app().await;

    let response = app.send(get("/metrics")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let app = spawn_app().await;

    let response = app
        .send(
            axum::http::Request::builder()
                .uri("/api/health")
                .header("x-request-id", "req-123")
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(
        response
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok()),
        Some("req-123")
    );
}
