use crate::config::{AppConfig, ServerConfig};
use crate::routes;
use crate::services::email::EmailService;
use axum::{extract::Extension, response::IntoResponse, routing::get, Json, Router};
use sea_orm::{ConnectionTrait, DatabaseConnection, Statement};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        // Auth routes
        crate::handlers::signup,
        crate::handlers::login,
        crate::handlers::auth::login_or_signup,
        crate::handlers::auth::reset_password,
        crate::handlers::get_current_user,
        // Verification routes
        crate::handlers::verify::verify_link,
        crate::handlers::verify::resend_verification,
        crate::handlers::verify::send_otp,
        crate::handlers::verify::verify_otp,
        // Catalog routes
        crate::handlers::boxes::list_boxes,
        crate::handlers::boxes::get_box,
        crate::handlers::boxes::create_box,
        crate::handlers::boxes::update_box,
        crate::handlers::boxes::delete_box,
        crate::handlers::products::list_products,
        crate::handlers::products::create_product,
        // Order routes
        crate::handlers::orders::list_orders,
        crate::handlers::orders::list_user_orders,
        crate::handlers::orders::get_order,
        crate::handlers::orders::create_order,
        // Payment routes
        crate::handlers::payments::payfast_create,
        crate::handlers::payments::payfast_return,
        crate::handlers::payments::payfast_webhook,
        crate::handlers::payments::stripe_create,
        crate::handlers::payments::stripe_webhook,
    ),
    components(
        schemas(
            crate::response::ApiResponse<serde_json::Value>,
            crate::error::AppError,
            crate::utils::RawId,
            crate::services::catalog::BoxSize,
            // Auth
            crate::handlers::auth::SignupRequest,
            crate::handlers::auth::LoginRequest,
            crate::handlers::auth::ResetRequest,
            crate::handlers::auth::UserResponse,
            crate::handlers::auth::AuthResponse,
            // Verification
            crate::handlers::verify::EmailRequest,
            crate::handlers::verify::OtpVerifyRequest,
            crate::handlers::verify::OtpInput,
            crate::handlers::verify::VerificationStatus,
            // Catalog
            crate::handlers::boxes::BoxRequest,
            crate::handlers::boxes::BoxResponse,
            crate::handlers::boxes::BoxSampleResponse,
            crate::handlers::products::CreateProductRequest,
            crate::handlers::products::ProductResponse,
            // Orders
            crate::handlers::orders::OrderLineRequest,
            crate::handlers::orders::CreateOrderRequest,
            crate::handlers::orders::BuyerResponse,
            crate::handlers::orders::ItemSummary,
            crate::handlers::orders::OrderLineResponse,
            crate::handlers::orders::OrderResponse,
            // Payments
            crate::handlers::payments::RawAmount,
            crate::handlers::payments::CreatePaymentRequest,
            crate::handlers::payments::RedirectResponse,
        )
    ),
    tags(
        (name = "auth", description = "Signup, login and account operations"),
        (name = "verification", description = "Email verification by link or one-time code"),
        (name = "boxes", description = "Mystery box catalog"),
        (name = "products", description = "Product catalog"),
        (name = "orders", description = "Order placement and lookup"),
        (name = "payments", description = "PayFast and Stripe checkout"),
    )
)]
pub struct ApiDoc;

/// Shared handles every request may extract.
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: Arc<AppConfig>,
    pub email: EmailService,
    pub http: reqwest::Client,
}

/// The full application: API routes, health check, docs, optional SPA.
pub fn create_app(state: AppState) -> Router {
    let mut app = Router::new()
        .route("/", get(health_check))
        .route("/health", get(health_check))
        .merge(routes::create_routes(&state.config.rate_limit))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    if let Some(dir) = state.config.server.static_dir.as_deref() {
        let index = format!("{}/index.html", dir.trim_end_matches('/'));
        tracing::info!("Serving frontend from {}", dir);
        app = app.fallback_service(ServeDir::new(dir).not_found_service(ServeFile::new(index)));
    }

    app.layer(TraceLayer::new_for_http())
        .layer(build_cors_layer(&state.config.server))
        .layer(Extension(state.db))
        .layer(Extension(state.config))
        .layer(Extension(state.email))
        .layer(Extension(state.http))
}

fn build_cors_layer(server: &ServerConfig) -> CorsLayer {
    use axum::http::{header, HeaderName, HeaderValue, Method};

    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static("stripe-signature"),
        ]);

    if server.cors_origins.trim() == "*" {
        cors.allow_origin(tower_http::cors::Any)
    } else {
        let origins: Vec<HeaderValue> = server
            .cors_origins
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect();
        cors.allow_origin(origins)
    }
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check successful", body = serde_json::Value)
    )
)]
async fn health_check(Extension(db): Extension<DatabaseConnection>) -> impl IntoResponse {
    let db_ok = db
        .query_one(Statement::from_string(
            db.get_database_backend(),
            "SELECT 1".to_string(),
        ))
        .await
        .is_ok();

    let status = if db_ok { "ok" } else { "degraded" };

    Json(json!({
        "status": status,
        "service": "Mystery Box API",
        "version": env!("CARGO_PKG_VERSION"),
        "database": db_ok,
    }))
}
