#![allow(dead_code)]

use async_trait::async_trait;
use lootbox::config::{
    database::DatabaseConfig,
    email::{EmailConfig, EmailProvider},
    jwt::JwtConfig,
    payment::{PayfastConfig, PayfastMode, StripeConfig},
    rate_limit::RateLimitConfig,
    AppConfig, ServerConfig,
};
use lootbox::models::{user, verification_token, User, VerificationToken};
use lootbox::services::email::{EmailService, Mailer, OutgoingEmail};
use lootbox::{create_app, AppState};
use reqwest::Client;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
};
use sea_orm_migration::MigratorTrait;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const FRONTEND: &str = "http://shop.test";
pub const STRIPE_WEBHOOK_SECRET: &str = "whsec_integration_test";

static USER_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Keeps every email the app tries to send.
#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<OutgoingEmail>>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().unwrap().clone()
    }

    pub fn with_subject(&self, subject: &str) -> Vec<OutgoingEmail> {
        self.sent()
            .into_iter()
            .filter(|e| e.subject == subject)
            .collect()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: &OutgoingEmail) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}

pub struct FailingMailer;

#[async_trait]
impl Mailer for FailingMailer {
    async fn send(&self, _email: &OutgoingEmail) -> anyhow::Result<()> {
        Err(anyhow::anyhow!("provider rejected the message"))
    }
}

pub enum MailSetup {
    Recording,
    Failing,
    Disabled,
}

pub struct TestApp {
    pub addr: String,
    pub db: DatabaseConnection,
    pub client: Client,
    pub mailer: Arc<RecordingMailer>,
    pub config: Arc<AppConfig>,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.addr, path)
    }
}

pub fn test_config(backend_base_url: &str) -> AppConfig {
    AppConfig {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            frontend_base_url: FRONTEND.to_string(),
            backend_base_url: backend_base_url.to_string(),
            cors_origins: "*".to_string(),
            static_dir: None,
        },
        database: DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            min_connections: 1,
        },
        jwt: JwtConfig::new(
            "integration_test_secret_that_is_at_least_32_characters_long".to_string(),
            3600,
        )
        .unwrap(),
        payfast: PayfastConfig {
            merchant_id: Some("10000100".to_string()),
            merchant_key: Some("46f0cd694581a".to_string()),
            passphrase: None,
            mode: PayfastMode::Sandbox,
            return_url: format!("{backend_base_url}/api/v1/payments/payfast/return"),
            cancel_url: format!(
                "{backend_base_url}/api/v1/payments/payfast/return?payment_status=cancelled"
            ),
            notify_url: format!("{backend_base_url}/api/v1/payments/payfast/webhook"),
            verify_webhook: false,
        },
        stripe: StripeConfig {
            secret_key: None,
            webhook_secret: Some(STRIPE_WEBHOOK_SECRET.to_string()),
            currency: "usd".to_string(),
            api_base: "http://127.0.0.1:9".to_string(),
            webhook_tolerance_secs: 300,
        },
        email: EmailConfig {
            provider: EmailProvider::Disabled,
            currency_symbol: "Rs.".to_string(),
        },
        rate_limit: RateLimitConfig::disabled(),
    }
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(MailSetup::Recording, |_| {}).await
}

/// Start the full app on a random port over a fresh in-memory database.
pub async fn spawn_app_with(mail: MailSetup, configure: impl FnOnce(&mut AppConfig)) -> TestApp {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let addr = format!("http://{}", listener.local_addr().unwrap());

    let mut config = test_config(&addr);
    configure(&mut config);
    let config = Arc::new(config);

    let db = lootbox::config::database::get_database(&config.database)
        .await
        .expect("Failed to open test database");
    lootbox::migration::Migrator::up(&db, None)
        .await
        .expect("Failed to run migrations");

    let mailer = Arc::new(RecordingMailer::default());
    let email = match mail {
        MailSetup::Recording => EmailService::with_mailer(mailer.clone(), "Rs."),
        MailSetup::Failing => EmailService::with_mailer(Arc::new(FailingMailer), "Rs."),
        MailSetup::Disabled => EmailService::disabled(),
    };

    let app = create_app(AppState {
        db: db.clone(),
        config: config.clone(),
        email,
        http: Client::new(),
    });

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    // Redirect responses are asserted on, not followed.
    let client = Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap();

    TestApp {
        addr,
        db,
        client,
        mailer,
        config,
    }
}

/// Sign up a fresh user and return (user_id, token, email).
pub async fn create_test_user(app: &TestApp, prefix: &str) -> (i32, String, String) {
    let counter = USER_COUNTER.fetch_add(1, Ordering::SeqCst);
    let username = format!("{}{}", prefix, counter);
    let email = format!("{}@test.com", username);

    let resp = app
        .client
        .post(app.url("/auth/signup"))
        .json(&serde_json::json!({
            "username": username,
            "email": email,
            "password": "test_password_123"
        }))
        .send()
        .await
        .expect("Failed to sign up user");

    let status = resp.status();
    let body: Value = resp.json().await.expect("Failed to parse signup response");
    assert_eq!(status, 201, "signup failed: {}", body);

    let user_id = body["data"]["user"]["id"]
        .as_i64()
        .expect("Response missing user id") as i32;
    let token = body["data"]["token"]
        .as_str()
        .expect("Response missing token")
        .to_string();
    (user_id, token, email)
}

/// Make a user admin by directly updating the database.
pub async fn make_admin(db: &DatabaseConnection, user_id: i32) {
    let existing = User::find_by_id(user_id)
        .one(db)
        .await
        .unwrap()
        .expect("user to promote must exist");
    let mut active: user::ActiveModel = existing.into();
    active.role = sea_orm::ActiveValue::Set(user::ROLE_ADMIN.to_string());
    active.update(db).await.expect("Failed to make user admin");
}

pub async fn create_admin(app: &TestApp) -> (i32, String) {
    let (id, token, _) = create_test_user(app, "admin").await;
    make_admin(&app.db, id).await;
    (id, token)
}

/// Latest unconsumed verification token for a user, read from the store.
pub async fn latest_token(db: &DatabaseConnection, user_id: i32) -> String {
    VerificationToken::find()
        .filter(verification_token::Column::UserId.eq(user_id))
        .filter(verification_token::Column::Consumed.eq(false))
        .order_by_desc(verification_token::Column::Id)
        .one(db)
        .await
        .unwrap()
        .expect("user has no live verification token")
        .token
}

pub async fn create_product(app: &TestApp, admin_token: &str, body: Value) -> i32 {
    let resp = app
        .client
        .post(app.url("/products"))
        .bearer_auth(admin_token)
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = resp.status();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(status, 201, "create product failed: {}", body);
    body["data"]["id"].as_i64().unwrap() as i32
}

pub async fn create_box(app: &TestApp, admin_token: &str, body: Value) -> i32 {
    let resp = app
        .client
        .post(app.url("/boxes"))
        .bearer_auth(admin_token)
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = resp.status();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(status, 201, "create box failed: {}", body);
    body["data"]["id"].as_i64().unwrap() as i32
}

/// Place an order and return the response body's `data`.
pub async fn place_order(app: &TestApp, body: Value) -> Value {
    let resp = app
        .client
        .post(app.url("/orders"))
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = resp.status();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(status, 201, "place order failed: {}", body);
    body["data"].clone()
}

pub async fn get_order(app: &TestApp, order_id: i32) -> Value {
    let body: Value = app
        .client
        .get(app.url(&format!("/orders/{}", order_id)))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    body["data"].clone()
}

/// Requests a Stripe stub received, as raw form bodies.
pub type StubRequests = Arc<Mutex<Vec<String>>>;

/// Stand-in for the hosted checkout API answering every session request
/// with `status` and `body`.
pub async fn spawn_stripe_stub(status: u16, body: Value) -> (String, StubRequests) {
    use axum::{extract::State, http::StatusCode, routing::post, Json, Router};

    let requests: StubRequests = Arc::new(Mutex::new(Vec::new()));
    let status = StatusCode::from_u16(status).unwrap();

    let app = Router::new()
        .route(
            "/v1/checkout/sessions",
            post(
                move |State(seen): State<StubRequests>, form: String| {
                    let body = body.clone();
                    async move {
                        seen.lock().unwrap().push(form);
                        (status, Json(body))
                    }
                },
            ),
        )
        .with_state(requests.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind stub port");
    let addr = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, requests)
}
