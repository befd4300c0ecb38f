mod common;

use common::TestApp;
use serde_json::{json, Value};

/// One product and one box whose ids do not collide.
async fn seed_catalog(app: &TestApp) -> (i32, i32) {
    let (_, admin) = common::create_admin(app).await;
    let product_id = common::create_product(
        app,
        &admin,
        json!({ "title": "Katana", "price": 250, "category": "anime" }),
    )
    .await;
    common::create_box(app, &admin, json!({ "name": "Filler", "price": 1 })).await;
    let box_id = common::create_box(
        app,
        &admin,
        json!({ "name": "Deluxe", "price": 999, "category": "gaming" }),
    )
    .await;
    assert_ne!(product_id, box_id);
    (product_id, box_id)
}

#[tokio::test]
async fn placed_order_resolves_products_and_boxes() {
    let app = common::spawn_app().await;
    let (product_id, box_id) = seed_catalog(&app).await;
    let (user_id, _, email) = common::create_test_user(&app, "buyer").await;

    let order = common::place_order(
        &app,
        json!({
            "userId": user_id.to_string(),
            "items": [
                { "productId": product_id, "quantity": 2 },
                { "productId": box_id.to_string() },
                { "productId": 4242 }
            ],
            "total": 1499,
            "paymentMethod": "PayFast",
            "paymentDetails": { "note": "gift" },
            "shippingAddress": "Durban"
        }),
    )
    .await;

    assert_eq!(order["status"], "pending");
    assert_eq!(order["user_id"], user_id);
    assert_eq!(order["user"]["email"], email.as_str());
    assert_eq!(order["total"], 1499.0);
    assert_eq!(order["payment_details"]["note"], "gift");
    assert_eq!(order["shipping_address"], "Durban");

    let items = order["items"].as_array().unwrap();
    assert_eq!(items.len(), 3);
    assert_eq!(items[0]["quantity"], 2);
    assert_eq!(items[0]["product"]["kind"], "product");
    assert_eq!(items[0]["product"]["title"], "Katana");
    assert_eq!(items[1]["quantity"], 1);
    assert_eq!(items[1]["product"]["kind"], "box");
    assert_eq!(items[1]["product"]["title"], "Deluxe");
    assert!(items[2]["product"].is_null());

    // No invoice for gateway orders until they are paid.
    assert!(app.mailer.with_subject("Order Invoice").is_empty());

    let id = order["id"].as_i64().unwrap() as i32;
    let fetched = common::get_order(&app, id).await;
    assert_eq!(fetched["id"], id);
    assert_eq!(fetched["items"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn cash_on_delivery_order_emails_an_invoice() {
    let app = common::spawn_app().await;
    let (product_id, _) = seed_catalog(&app).await;
    let (user_id, _, email) = common::create_test_user(&app, "cod").await;

    let order = common::place_order(
        &app,
        json!({
            "userId": user_id,
            "items": [{ "productId": product_id, "quantity": 2 }],
            "total": 500,
            "paymentMethod": "cash on delivery",
            "shippingAddress": "Soweto"
        }),
    )
    .await;
    assert_eq!(order["status"], "pending");

    let invoices = app.mailer.with_subject("Order Invoice");
    assert_eq!(invoices.len(), 1);
    assert_eq!(invoices[0].to_email, email);
    assert!(invoices[0]
        .html
        .contains(&format!("<h3>Order {}</h3>", order["id"])));
    assert!(invoices[0].html.contains("Katana"));
    assert!(invoices[0].html.contains("x 2 @ Rs.250"));
    assert!(invoices[0].html.contains("Soweto"));
}

#[tokio::test]
async fn order_creation_rejects_bad_input() {
    let app = common::spawn_app().await;
    let (user_id, _, _) = common::create_test_user(&app, "picky").await;

    let cases: [(Value, u16); 7] = [
        (json!({ "items": [], "total": 10 }), 400),
        (json!({ "userId": "guest", "items": [], "total": 10 }), 400),
        (json!({ "userId": user_id, "items": [] }), 400),
        (json!({ "userId": user_id, "items": [], "total": -5 }), 400),
        (
            json!({ "userId": user_id, "items": [{ "productId": 1, "quantity": 0 }], "total": 1 }),
            400,
        ),
        (json!({ "userId": user_id, "items": [{ "productId": "x" }], "total": 1 }), 400),
        (json!({ "userId": 9999, "items": [], "total": 10 }), 404),
    ];

    for (body, expected) in cases {
        let resp = app
            .client
            .post(app.url("/orders"))
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), expected, "body: {}", body);
    }
}

#[tokio::test]
async fn user_orders_are_newest_first_and_scoped() {
    let app = common::spawn_app().await;
    let (alice, _, _) = common::create_test_user(&app, "alice").await;
    let (bob, _, _) = common::create_test_user(&app, "bob").await;

    let first = common::place_order(&app, json!({ "userId": alice, "items": [], "total": 1 })).await;
    let second = common::place_order(&app, json!({ "userId": alice, "items": [], "total": 2 })).await;
    common::place_order(&app, json!({ "userId": bob, "items": [], "total": 3 })).await;

    let body: Value = app
        .client
        .get(app.url(&format!("/orders/user/{}", alice)))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let orders = body["data"].as_array().unwrap();
    assert_eq!(orders.len(), 2);
    assert_eq!(orders[0]["id"], second["id"]);
    assert_eq!(orders[1]["id"], first["id"]);

    let resp = app
        .client
        .get(app.url("/orders/user/guest"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn listing_all_orders_is_admin_only() {
    let app = common::spawn_app().await;
    let (user_id, token, _) = common::create_test_user(&app, "plain").await;
    let (_, admin) = common::create_admin(&app).await;
    common::place_order(&app, json!({ "userId": user_id, "items": [], "total": 1 })).await;

    let resp = app.client.get(app.url("/orders")).send().await.unwrap();
    assert_eq!(resp.status(), 401);

    let resp = app
        .client
        .get(app.url("/orders"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    let resp = app
        .client
        .get(app.url("/orders"))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["user"]["id"], user_id);
}

#[tokio::test]
async fn order_lookup_errors() {
    let app = common::spawn_app().await;

    let resp = app.client.get(app.url("/orders/999")).send().await.unwrap();
    assert_eq!(resp.status(), 404);

    let resp = app.client.get(app.url("/orders/abc")).send().await.unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn cash_on_delivery_order_survives_a_failing_mailer() {
    let app = common::spawn_app_with(common::MailSetup::Failing, |_| {}).await;
    let (product_id, _) = seed_catalog(&app).await;
    let (user_id, _, _) = common::create_test_user(&app, "codfail").await;

    let order = common::place_order(
        &app,
        json!({
            "userId": user_id,
            "items": [{ "productId": product_id, "quantity": 1 }],
            "total": 250,
            "paymentMethod": "Cash on Delivery",
            "shippingAddress": "Pretoria"
        }),
    )
    .await;

    assert_eq!(order["status"], "pending");
    assert_eq!(order["items"][0]["product"]["title"], "Katana");
    let id = order["id"].as_i64().unwrap() as i32;
    assert_eq!(common::get_order(&app, id).await["id"], id);
}

fn delivery(tag: &str) -> serde_json::Map<String, Value> {
    let mut fields = serde_json::Map::new();
    fields.insert(tag.to_string(), json!(true));
    fields
}

#[tokio::test]
async fn late_failure_keeps_paid_and_both_audit_entries() {
    use lootbox::models::OrderStatus;
    use lootbox::services::order::{merge_gateway_section, OrderService};

    let app = common::spawn_app().await;
    let (user_id, _, _) = common::create_test_user(&app, "race").await;
    let order = common::place_order(&app, json!({ "userId": user_id, "total": 10 })).await;
    let id = order["id"].as_i64().unwrap() as i32;
    let orders = OrderService::new(app.db.clone());

    // A failure notification loaded the order before the success landed.
    let seen_by_failure = orders.find(id).await.unwrap();
    assert_eq!(seen_by_failure.status, OrderStatus::Pending);

    let paid = orders
        .apply_payment(id, None, Some(OrderStatus::Paid), |d| {
            merge_gateway_section(d, "payfast", delivery("success_seen"))
        })
        .await
        .unwrap();
    assert!(paid.became_paid);

    let failed = orders
        .apply_payment(seen_by_failure.id, None, Some(OrderStatus::Failed), |d| {
            merge_gateway_section(d, "payfast", delivery("failure_seen"))
        })
        .await
        .unwrap();
    assert!(!failed.became_paid);
    assert_eq!(failed.order.status, OrderStatus::Paid);

    let stored = common::get_order(&app, id).await;
    assert_eq!(stored["status"], "paid");
    assert_eq!(stored["payment_details"]["payfast"]["success_seen"], true);
    assert_eq!(stored["payment_details"]["payfast"]["failure_seen"], true);
}

#[tokio::test]
async fn overlapping_deliveries_all_land() {
    use lootbox::models::OrderStatus;
    use lootbox::services::order::{merge_gateway_section, OrderService};

    let app = common::spawn_app().await;
    let (user_id, _, _) = common::create_test_user(&app, "burst").await;
    let order = common::place_order(&app, json!({ "userId": user_id, "total": 10 })).await;
    let id = order["id"].as_i64().unwrap() as i32;

    let mut handles = Vec::new();
    for n in 0..8 {
        let orders = OrderService::new(app.db.clone());
        let signal = if n == 3 { OrderStatus::Paid } else { OrderStatus::Failed };
        handles.push(tokio::spawn(async move {
            orders
                .apply_payment(id, None, Some(signal), move |d| {
                    merge_gateway_section(d, "stripe", delivery(&format!("delivery_{n}")))
                })
                .await
                .map(|applied| applied.became_paid)
        }));
    }

    let mut became_paid = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap() {
            became_paid += 1;
        }
    }
    assert_eq!(became_paid, 1);

    let stored = common::get_order(&app, id).await;
    assert_eq!(stored["status"], "paid");
    let section = stored["payment_details"]["stripe"].as_object().unwrap();
    assert_eq!(section.len(), 8);
}
