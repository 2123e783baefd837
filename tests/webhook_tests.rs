mod common;

use axum::{body::Body, http::Request, http::StatusCode};
use common::*;
use serde_json::json;

#[tokio::test]
async fn test_checkout_completed_creates_profile_and_mails_claim_link() {
    let app = spawn_app().await;

    let response = app
        .send(signed_webhook(&checkout_completed(
            "evt_checkout_1",
            "Payer@Example.com",
            "cus_1",
        )))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["received"], true);

    let profile = app
        .store()
        .get_profile_by_email("payer@example.com")
        .await
        .unwrap()
        .expect("profile should exist");
    assert_eq!(profile.stripe_customer_id.as_deref(), Some("cus_1"));
    assert!(profile.expires_at.is_none());
    assert!(!profile.disabled);
    assert!(profile.user_id.is_none());

    let sent = app.mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "payer@example.com");
    assert!(sent[0].link.starts_with("http://quiz.test/claim?token="));

    let token = app.mailer.last_token_for("payer@example.com").unwrap();
    let stored = app.store().get_signup_token(&token).await.unwrap().unwrap();
    assert_eq!(stored.email, "payer@example.com");
    assert!(stored.used_at.is_none());
}

#[tokio::test]
async fn test_mail_failure_does_not_fail_webhook() {
    let app = spawn_app_with_mailer(test_config(), std::sync::Arc::new(FailingMailer)).await;

    let response = app
        .send(signed_webhook(&checkout_completed(
            "evt_mail_down",
            "unmailed@example.com",
            "cus_mail",
        )))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["received"], true);

    assert!(
        app.store()
            .get_profile_by_email("unmailed@example.com")
            .await
            .unwrap()
            .is_some()
    );
    let token = app
        .store()
        .get_unused_signup_token("unmailed@example.com")
        .await
        .unwrap()
        .expect("token should be persisted");
    assert!(token.used_at.is_none());

    // The event counts as processed, so redelivery does not retry the send.
    assert!(app.store().is_webhook_event_processed("evt_mail_down").await.unwrap());
}

#[tokio::test]
async fn test_replayed_event_is_processed_once() {
    let app = spawn_app().await;
    let event = checkout_completed("evt_replay", "replay@example.com", "cus_replay");

    for _ in 0..2 {
        let response = app.send(signed_webhook(&event)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
    assert_eq!(app.mailer.sent().len(), 1);

    // A second checkout for the same email under a new event id reuses the live token.
    let response = app
        .send(signed_webhook(&checkout_completed(
            "evt_replay_2",
            "replay@example.com",
            "cus_replay",
        )))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let sent = app.mailer.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].link, sent[1].link);

    let unused = app
        .store()
        .get_unused_signup_token("replay@example.com")
        .await
        .unwrap()
        .unwrap();
    assert!(sent[1].link.ends_with(&unused.token));
}

#[tokio::test]
async fn test_checkout_for_existing_identity_links_without_token() {
    let app = spawn_app().await;
    let config = app.state.config().clone();
    let identity = match app
        .store()
        .create_user("member@example.com", "password1", true, &config.auth)
        .await
        .unwrap()
    {
        quizgate::db::CreateUser::Created(identity) => identity,
        quizgate::db::CreateUser::EmailTaken => panic!("fresh database"),
    };

    let response = app
        .send(signed_webhook(&checkout_completed(
            "evt_member",
            "member@example.com",
            "cus_member",
        )))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let profile = app
        .store()
        .get_profile_by_email("member@example.com")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(profile.user_id.as_deref(), Some(identity.id.as_str()));
    assert!(app.mailer.sent().is_empty());
    assert!(
        app.store()
            .get_unused_signup_token("member@example.com")
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_bad_signature_is_rejected() {
    let app = spawn_app().await;
    let body = checkout_completed("evt_forged", "forged@example.com", "cus_forged").to_string();
    let timestamp = chrono::Utc::now().timestamp();
    let signature =
        quizgate::clients::stripe::sign_payload(body.as_bytes(), "whsec_wrong", timestamp);

    let response = app
        .send(
            Request::builder()
                .method("POST")
                .uri("/api/stripe-webhook")
                .header("stripe-signature", format!("t={timestamp},v1={signature}"))
                .body(Body::from(body))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_text(response).await.starts_with("Webhook Error:"));

    assert!(
        app.store()
            .get_profile_by_email("forged@example.com")
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_missing_signature_is_rejected() {
    let app = spawn_app().await;

    let response = app
        .send(
            Request::builder()
                .method("POST")
                .uri("/api/stripe-webhook")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_text(response).await,
        "Missing Stripe signature or webhook secret"
    );
}

#[tokio::test]
async fn test_missing_secret_is_rejected() {
    let mut config = test_config();
    config.stripe.webhook_secret = None;
    let app = spawn_app_with(config).await;

    let response = app
        .send(signed_webhook(&checkout_completed(
            "evt_nosecret",
            "nosecret@example.com",
            "cus_nosecret",
        )))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_event_type_is_acknowledged() {
    let app = spawn_app().await;

    let response = app
        .send(signed_webhook(&json!({
            "id": "evt_other",
            "type": "customer.created",
            "data": { "object": {} }
        })))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["received"], true);
}

#[tokio::test]
async fn test_subscription_updated_sets_period_end() {
    let app = spawn_app().await;
    app.send(signed_webhook(&checkout_completed(
        "evt_sub_checkout",
        "sub@example.com",
        "cus_sub",
    )))
    .await;

    let period_end = chrono::Utc::now().timestamp() + 30 * 24 * 3600;
    let mut event = subscription_event(
        "evt_sub_updated",
        "customer.subscription.updated",
        "cus_sub",
        "active",
    );
    event["data"]["object"]["current_period_end"] = json!(period_end);

    let response = app.send(signed_webhook(&event)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let profile = app
        .store()
        .get_profile_by_email("sub@example.com")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(profile.expires_at.map(|t| t.timestamp()), Some(period_end));
    assert!(profile.is_entitled());

    let response = app
        .send(signed_webhook(&subscription_event(
            "evt_sub_past_due",
            "customer.subscription.updated",
            "cus_sub",
            "past_due",
        )))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let profile = app
        .store()
        .get_profile_by_email("sub@example.com")
        .await
        .unwrap()
        .unwrap();
    assert!(!profile.is_entitled());
}

#[tokio::test]
async fn test_invoice_payment_failed_expires_profile() {
    let app = spawn_app().await;
    app.send(signed_webhook(&checkout_completed(
        "evt_inv_checkout",
        "inv@example.com",
        "cus_inv",
    )))
    .await;

    let response = app
        .send(signed_webhook(&json!({
            "id": "evt_inv_failed",
            "type": "invoice.payment_failed",
            "data": { "object": { "id": "in_1", "customer": "cus_inv" } }
        })))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let profile = app
        .store()
        .get_profile_by_email("inv@example.com")
        .await
        .unwrap()
        .unwrap();
    assert!(!profile.is_entitled());
}

#[tokio::test]
async fn test_processed_event_signals_open_views() {
    let app = spawn_app().await;
    let mut events = app.state.access_events().subscribe();

    app.send(signed_webhook(&checkout_completed(
        "evt_signal",
        "signal@example.com",
        "cus_signal",
    )))
    .await;

    let event = events.try_recv().expect("a recheck should be published");
    assert!(event.concerns(Some("any-user")));
}

#[tokio::test]
async fn test_end_to_end_purchase_claim_and_cancel() {
    let app = spawn_app().await;

    let response = app
        .send(signed_webhook(&checkout_completed(
            "evt_e2e_checkout",
            "e2e@example.com",
            "cus_e2e",
        )))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let token = app.mailer.last_token_for("e2e@example.com").unwrap();

    let response = app
        .send(get(&format!("/api/check-signup-token?token={token}")))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["email"], "e2e@example.com");

    let response = app
        .send(json_request(
            "POST",
            "/api/claim-signup",
            &json!({ "token": token, "password": "quizzes1" }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .send(json_request(
            "POST",
            "/api/claim-signup",
            &json!({ "token": token, "password": "quizzes2" }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let cookie = login(&app, "e2e@example.com", "quizzes1").await;

    let response = app.send(get_with_cookie("/app", &cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let page = body_json(response).await;
    assert_eq!(page["subscription_active"], true);
    assert_eq!(page["profile"]["email"], "e2e@example.com");
    assert_eq!(page["user"]["email"], "e2e@example.com");

    let response = app
        .send(signed_webhook(&subscription_event(
            "evt_e2e_deleted",
            "customer.subscription.deleted",
            "cus_e2e",
            "canceled",
        )))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.send(get_with_cookie("/app", &cookie)).await;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&response), Some("/subscribe"));
}
