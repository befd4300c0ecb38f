mod common;

use common::{MailSetup, TestApp};
use lootbox::services::payfast;
use serde_json::{json, Value};

async fn pending_order(app: &TestApp) -> (i32, String) {
    let (user_id, _, email) = common::create_test_user(app, "pf").await;
    let order = common::place_order(
        app,
        json!({
            "userId": user_id,
            "items": [],
            "total": 100,
            "paymentMethod": "PayFast",
            "shippingAddress": "Cape Town"
        }),
    )
    .await;
    (order["id"].as_i64().unwrap() as i32, email)
}

async fn webhook(app: &TestApp, body: Value) -> reqwest::Response {
    app.client
        .post(app.url("/payments/payfast/webhook"))
        .json(&body)
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn create_returns_signed_redirect_and_stamps_order() {
    let app = common::spawn_app().await;
    let (order_id, email) = pending_order(&app).await;

    let resp = app
        .client
        .post(app.url("/payments/payfast/create"))
        .json(&json!({ "orderId": order_id, "amount": "100" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    let url = body["data"]["redirect_url"].as_str().unwrap();
    assert!(url.starts_with("https://sandbox.payfast.co.za/eng/process?"));
    assert!(url.contains("merchant_id=10000100"));
    assert!(url.contains(&format!("m_payment_id={}", order_id)));
    assert!(url.contains("amount=100.00"));
    assert!(url.contains(&format!("email_address={}", email.replace('@', "%40"))));
    assert!(url.contains("&signature="));
    assert!(body["data"].get("session_id").is_none());

    let order = common::get_order(&app, order_id).await;
    assert_eq!(order["payment_method"], "PayFast");
    assert_eq!(order["status"], "pending");
    let section = &order["payment_details"]["payfast"];
    assert_eq!(section["reference"], order_id.to_string());
    assert_eq!(section["amount"], 100.0);
    assert_eq!(section["currency"], "ZAR");
    assert_eq!(section["redirect_url"], url);
}

#[tokio::test]
async fn create_validates_request() {
    let app = common::spawn_app().await;

    let resp = app
        .client
        .post(app.url("/payments/payfast/create"))
        .json(&json!({ "amount": 10 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "orderId and amount are required");

    let resp = app
        .client
        .post(app.url("/payments/payfast/create"))
        .json(&json!({ "orderId": 1, "amount": 0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = app
        .client
        .post(app.url("/payments/payfast/create"))
        .json(&json!({ "orderId": 777, "amount": 10 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn create_without_merchant_is_bad_gateway() {
    let app = common::spawn_app_with(MailSetup::Recording, |config| {
        config.payfast.merchant_id = None;
    })
    .await;
    let (order_id, _) = pending_order(&app).await;

    let resp = app
        .client
        .post(app.url("/payments/payfast/create"))
        .json(&json!({ "orderId": order_id, "amount": 100 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 502);

    let order = common::get_order(&app, order_id).await;
    assert_eq!(order["payment_method"], "PayFast");
    assert!(order["payment_details"]["payfast"]["redirect_url"].is_null());
}

#[tokio::test]
async fn return_leg_redirects_and_updates_status() {
    let app = common::spawn_app().await;
    let (paid_id, _) = pending_order(&app).await;
    let (failed_id, _) = pending_order(&app).await;

    let resp = app
        .client
        .post(app.url("/payments/payfast/return"))
        .form(&[
            ("m_payment_id", paid_id.to_string()),
            ("payment_status", "COMPLETE".to_string()),
        ])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 303);
    assert_eq!(
        resp.headers().get("location").and_then(|v| v.to_str().ok()),
        Some("http://shop.test/orders")
    );
    assert_eq!(common::get_order(&app, paid_id).await["status"], "paid");

    let resp = app
        .client
        .get(app.url(&format!(
            "/payments/payfast/return?payment_status=cancelled&m_payment_id={}",
            failed_id
        )))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 303);
    assert_eq!(
        resp.headers().get("location").and_then(|v| v.to_str().ok()),
        Some("http://shop.test/checkout")
    );
    assert_eq!(common::get_order(&app, failed_id).await["status"], "failed");
}

#[tokio::test]
async fn return_leg_never_fails() {
    let app = common::spawn_app().await;

    for path in [
        "/payments/payfast/return",
        "/payments/payfast/return?m_payment_id=999",
        "/payments/payfast/return?m_payment_id=guest",
    ] {
        let resp = app.client.get(app.url(path)).send().await.unwrap();
        assert_eq!(resp.status(), 303, "path {}", path);
        assert_eq!(
            resp.headers().get("location").and_then(|v| v.to_str().ok()),
            Some("http://shop.test/orders")
        );
    }
}

#[tokio::test]
async fn paid_order_cannot_be_failed_by_a_late_return() {
    let app = common::spawn_app().await;
    let (order_id, _) = pending_order(&app).await;

    webhook(
        &app,
        json!({ "m_payment_id": order_id.to_string(), "payment_status": "COMPLETE" }),
    )
    .await;

    let resp = app
        .client
        .get(app.url(&format!(
            "/payments/payfast/return?payment_status=failed&m_payment_id={}",
            order_id
        )))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 303);
    assert_eq!(common::get_order(&app, order_id).await["status"], "paid");
}

#[tokio::test]
async fn webhook_records_delivery_and_invoices_once() {
    let app = common::spawn_app().await;
    let (order_id, email) = pending_order(&app).await;

    let resp = app
        .client
        .post(app.url("/payments/payfast/webhook"))
        .bearer_auth("should-not-be-stored")
        .json(&json!({ "m_payment_id": order_id, "payment_status": "COMPLETE" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({ "ok": true }));

    let order = common::get_order(&app, order_id).await;
    assert_eq!(order["status"], "paid");
    let section = &order["payment_details"]["payfast"];
    assert_eq!(section["latest_webhook"]["body"]["payment_status"], "COMPLETE");
    assert!(section["latest_webhook"]["headers"]
        .get("authorization")
        .is_none());
    assert_eq!(section["webhook_history"].as_array().unwrap().len(), 1);

    let invoices = app.mailer.with_subject("Order Invoice");
    assert_eq!(invoices.len(), 1);
    assert_eq!(invoices[0].to_email, email);

    // A duplicate delivery is recorded but does not re-send the invoice,
    // and a late failure does not undo the payment.
    webhook(
        &app,
        json!({ "m_payment_id": order_id.to_string(), "payment_status": "COMPLETE" }),
    )
    .await;
    webhook(
        &app,
        json!({ "m_payment_id": order_id.to_string(), "payment_status": "FAILED" }),
    )
    .await;

    let order = common::get_order(&app, order_id).await;
    assert_eq!(order["status"], "paid");
    assert_eq!(
        order["payment_details"]["payfast"]["webhook_history"]
            .as_array()
            .unwrap()
            .len(),
        3
    );
    assert_eq!(app.mailer.with_subject("Order Invoice").len(), 1);
}

#[tokio::test]
async fn webhook_failure_and_unknown_status() {
    let app = common::spawn_app().await;
    let (order_id, _) = pending_order(&app).await;

    let resp = webhook(
        &app,
        json!({ "m_payment_id": order_id.to_string(), "payment_status": "PENDING" }),
    )
    .await;
    assert_eq!(resp.status(), 200);
    assert_eq!(common::get_order(&app, order_id).await["status"], "pending");

    webhook(
        &app,
        json!({ "m_payment_id": order_id.to_string(), "payment_status": "CANCELLED" }),
    )
    .await;
    assert_eq!(common::get_order(&app, order_id).await["status"], "failed");
    assert!(app.mailer.with_subject("Order Invoice").is_empty());
}

#[tokio::test]
async fn webhook_rejects_missing_or_unknown_reference() {
    let app = common::spawn_app().await;

    let resp = webhook(&app, json!({ "payment_status": "COMPLETE" })).await;
    assert_eq!(resp.status(), 400);

    let resp = webhook(
        &app,
        json!({ "m_payment_id": "12345", "payment_status": "COMPLETE" }),
    )
    .await;
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn webhook_signature_is_checked_when_enabled() {
    let app = common::spawn_app_with(MailSetup::Recording, |config| {
        config.payfast.verify_webhook = true;
    })
    .await;
    let (order_id, _) = pending_order(&app).await;

    let params = vec![
        ("m_payment_id", order_id.to_string()),
        ("payment_status", "COMPLETE".to_string()),
        ("amount_gross", "100.00".to_string()),
        ("item_name", "Order test".to_string()),
    ];
    let good = payfast::signature(&params, None);

    let mut forged = params.clone();
    forged.push(("signature", "0".repeat(32)));
    let resp = app
        .client
        .post(app.url("/payments/payfast/webhook"))
        .form(&forged)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    assert_eq!(common::get_order(&app, order_id).await["status"], "pending");

    let mut signed = params.clone();
    signed.push(("signature", good));
    let resp = app
        .client
        .post(app.url("/payments/payfast/webhook"))
        .form(&signed)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(common::get_order(&app, order_id).await["status"], "paid");
}
