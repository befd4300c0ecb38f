mod common;

use common::{MailSetup, TestApp};
use serde_json::{json, Value};

async fn verify(app: &TestApp, token: &str, uid: &str) -> reqwest::Response {
    app.client
        .get(app.url("/auth/verify"))
        .query(&[("token", token), ("uid", uid)])
        .send()
        .await
        .unwrap()
}

async fn is_verified(app: &TestApp, token: &str) -> bool {
    let body: Value = app
        .client
        .get(app.url("/auth/me"))
        .bearer_auth(token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    body["data"]["verified"].as_bool().unwrap()
}

#[tokio::test]
async fn verification_link_marks_user_verified_once() {
    let app = common::spawn_app().await;
    let (user_id, token, _) = common::create_test_user(&app, "link").await;
    let link_token = common::latest_token(&app.db, user_id).await;

    let resp = verify(&app, &link_token, &user_id.to_string()).await;
    assert_eq!(resp.status(), 303);
    assert_eq!(
        resp.headers().get("location").and_then(|v| v.to_str().ok()),
        Some("http://shop.test/")
    );
    assert!(is_verified(&app, &token).await);

    let resp = verify(&app, &link_token, &user_id.to_string()).await;
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Invalid or expired token");
}

#[tokio::test]
async fn verification_link_with_bad_parameters_is_rejected() {
    let app = common::spawn_app().await;
    let (user_id, _, _) = common::create_test_user(&app, "badlink").await;

    let resp = app
        .client
        .get(app.url("/auth/verify"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Invalid link");

    let resp = verify(&app, "whatever", "guest").await;
    assert_eq!(resp.status(), 400);

    let resp = verify(&app, "deadbeef", &user_id.to_string()).await;
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn resend_retires_the_previous_link() {
    let app = common::spawn_app().await;
    let (user_id, token, email) = common::create_test_user(&app, "resend").await;
    let first = common::latest_token(&app.db, user_id).await;

    let resp = app
        .client
        .post(app.url("/auth/verify/resend"))
        .json(&json!({ "email": email }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["ok"], true);
    assert_eq!(body["data"]["already_verified"], false);
    assert_eq!(app.mailer.with_subject("Verify your email").len(), 2);

    let second = common::latest_token(&app.db, user_id).await;
    assert_ne!(first, second);

    let resp = verify(&app, &first, &user_id.to_string()).await;
    assert_eq!(resp.status(), 400);

    let resp = verify(&app, &second, &user_id.to_string()).await;
    assert_eq!(resp.status(), 303);
    assert!(is_verified(&app, &token).await);
}

#[tokio::test]
async fn resend_for_verified_user_sends_nothing() {
    let app = common::spawn_app().await;
    let (user_id, _, email) = common::create_test_user(&app, "done").await;
    let link_token = common::latest_token(&app.db, user_id).await;
    verify(&app, &link_token, &user_id.to_string()).await;

    let resp = app
        .client
        .post(app.url("/auth/verify/resend"))
        .json(&json!({ "email": email }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["already_verified"], true);
    assert_eq!(body["message"], "already verified");
    assert_eq!(app.mailer.with_subject("Verify your email").len(), 1);
}

#[tokio::test]
async fn resend_for_unknown_email_is_404() {
    let app = common::spawn_app().await;

    let resp = app
        .client
        .post(app.url("/auth/verify/resend"))
        .json(&json!({ "email": "ghost@example.com" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn resend_reports_delivery_failure() {
    let app = common::spawn_app_with(MailSetup::Failing, |_| {}).await;
    let (_, _, email) = common::create_test_user(&app, "failmail").await;

    let resp = app
        .client
        .post(app.url("/auth/verify/resend"))
        .json(&json!({ "email": email }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 502);
}

#[tokio::test]
async fn otp_send_without_email_provider_is_502() {
    let app = common::spawn_app_with(MailSetup::Disabled, |_| {}).await;
    let (_, _, email) = common::create_test_user(&app, "nomail").await;

    let resp = app
        .client
        .post(app.url("/auth/otp/send"))
        .json(&json!({ "email": email }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 502);
}

#[tokio::test]
async fn otp_round_trip_verifies_user() {
    let app = common::spawn_app().await;
    let (user_id, token, email) = common::create_test_user(&app, "otp").await;

    let resp = app
        .client
        .post(app.url("/auth/otp/send"))
        .json(&json!({ "email": email }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let code = common::latest_token(&app.db, user_id).await;
    assert_eq!(code.len(), 6);
    let sent = app.mailer.with_subject("Your verification code");
    assert_eq!(sent.len(), 1);
    assert!(sent[0].html.contains(&code));

    let resp = app
        .client
        .post(app.url("/auth/otp/verify"))
        .json(&json!({ "email": email, "otp": "abc" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = app
        .client
        .post(app.url("/auth/otp/verify"))
        .json(&json!({ "email": email, "otp": code }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["ok"], true);
    assert!(is_verified(&app, &token).await);

    // Already verified: nothing new is sent.
    let resp = app
        .client
        .post(app.url("/auth/otp/send"))
        .json(&json!({ "email": email }))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["already_verified"], true);
    assert_eq!(app.mailer.with_subject("Your verification code").len(), 1);
}

#[tokio::test]
async fn otp_code_supersedes_pending_link() {
    let app = common::spawn_app().await;
    let (user_id, _, email) = common::create_test_user(&app, "mix").await;
    let link_token = common::latest_token(&app.db, user_id).await;

    app.client
        .post(app.url("/auth/otp/send"))
        .json(&json!({ "email": email }))
        .send()
        .await
        .unwrap();

    let resp = verify(&app, &link_token, &user_id.to_string()).await;
    assert_eq!(resp.status(), 400);
}

/// Push every live token of the user into the past.
async fn expire_tokens(app: &TestApp, user_id: i32) {
    use lootbox::models::{verification_token, VerificationToken};
    use sea_orm::{sea_query::Expr, ColumnTrait, EntityTrait, QueryFilter};

    let past = chrono::Utc::now().naive_utc() - chrono::Duration::minutes(1);
    VerificationToken::update_many()
        .col_expr(verification_token::Column::ExpiresAt, Expr::value(past))
        .filter(verification_token::Column::UserId.eq(user_id))
        .exec(&app.db)
        .await
        .unwrap();
}

#[tokio::test]
async fn expired_link_is_rejected() {
    let app = common::spawn_app().await;
    let (user_id, token, _) = common::create_test_user(&app, "stale").await;
    let link_token = common::latest_token(&app.db, user_id).await;
    expire_tokens(&app, user_id).await;

    let resp = verify(&app, &link_token, &user_id.to_string()).await;
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Invalid or expired token");
    assert!(!is_verified(&app, &token).await);
}

#[tokio::test]
async fn expired_otp_is_rejected() {
    let app = common::spawn_app().await;
    let (user_id, token, email) = common::create_test_user(&app, "staleotp").await;

    let resp = app
        .client
        .post(app.url("/auth/otp/send"))
        .json(&json!({ "email": email }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let code = common::latest_token(&app.db, user_id).await;
    expire_tokens(&app, user_id).await;

    let resp = app
        .client
        .post(app.url("/auth/otp/verify"))
        .json(&json!({ "email": email, "otp": code }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    assert!(!is_verified(&app, &token).await);
}

#[tokio::test]
async fn missing_fields_are_bad_requests() {
    let app = common::spawn_app().await;

    for path in ["/auth/verify/resend", "/auth/otp/send", "/auth/otp/verify"] {
        let resp = app
            .client
            .post(app.url(path))
            .json(&json!({}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400, "{path}");
        let body: Value = resp.json().await.unwrap();
        assert!(body["error"].is_string(), "{path}: {body}");
    }
}

#[tokio::test]
async fn numeric_otp_is_accepted() {
    let app = common::spawn_app().await;
    let (user_id, token, email) = common::create_test_user(&app, "numotp").await;

    app.client
        .post(app.url("/auth/otp/send"))
        .json(&json!({ "email": email }))
        .send()
        .await
        .unwrap();
    let code: u64 = common::latest_token(&app.db, user_id)
        .await
        .parse()
        .unwrap();

    let resp = app
        .client
        .post(app.url("/auth/otp/verify"))
        .json(&json!({ "email": email, "otp": code }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert!(is_verified(&app, &token).await);
}
