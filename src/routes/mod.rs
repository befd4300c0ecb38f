use crate::config::rate_limit::{RateLimitConfig, RouteGroup};
use crate::handlers;
use crate::middleware::{auth_middleware, security_headers_middleware};
use axum::{middleware, routing, Router};
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};

pub fn create_routes(rate_limit: &RateLimitConfig) -> Router {
    Router::new().nest("/api/v1", api_routes(rate_limit))
}

fn api_routes(config: &RateLimitConfig) -> Router {
    let auth = auth_routes(config);
    let catalog = catalog_routes(config);
    let orders = order_routes(config);
    let payments = payment_routes(config);
    let protected = protected_routes(config).layer(middleware::from_fn(auth_middleware));

    auth.merge(catalog)
        .merge(orders)
        .merge(payments)
        .merge(protected)
        .merge(gateway_routes())
        .layer(middleware::from_fn(security_headers_middleware))
}

/// Signup, login and email verification.
fn auth_routes(config: &RateLimitConfig) -> Router {
    let router = Router::new()
        .route("/auth/signup", routing::post(handlers::signup))
        .route("/auth/login", routing::post(handlers::login))
        .route(
            "/auth/login-signup",
            routing::post(handlers::auth::login_or_signup),
        )
        .route("/auth/reset", routing::post(handlers::auth::reset_password))
        .route("/auth/verify", routing::get(handlers::verify::verify_link))
        .route(
            "/auth/verify/resend",
            routing::post(handlers::verify::resend_verification),
        )
        .route("/auth/otp/send", routing::post(handlers::verify::send_otp))
        .route(
            "/auth/otp/verify",
            routing::post(handlers::verify::verify_otp),
        );

    with_rate_limit(router, config, RouteGroup::Auth)
}

/// Public catalog reads.
fn catalog_routes(config: &RateLimitConfig) -> Router {
    let router = Router::new()
        .route("/boxes", routing::get(handlers::boxes::list_boxes))
        .route("/boxes/{id}", routing::get(handlers::boxes::get_box))
        .route(
            "/products",
            routing::get(handlers::products::list_products),
        );

    with_rate_limit(router, config, RouteGroup::Catalog)
}

/// Order placement and lookups.
fn order_routes(config: &RateLimitConfig) -> Router {
    let router = Router::new()
        .route("/orders", routing::post(handlers::orders::create_order))
        .route(
            "/orders/user/{user_id}",
            routing::get(handlers::orders::list_user_orders),
        )
        .route("/orders/{id}", routing::get(handlers::orders::get_order));

    with_rate_limit(router, config, RouteGroup::Orders)
}

/// Gateway hand-off. Each call creates a session or redirect upstream.
fn payment_routes(config: &RateLimitConfig) -> Router {
    let router = Router::new()
        .route(
            "/payments/payfast/create",
            routing::post(handlers::payments::payfast_create),
        )
        .route(
            "/payments/stripe/create",
            routing::post(handlers::payments::stripe_create),
        );

    with_rate_limit(router, config, RouteGroup::Payments)
}

/// Authenticated routes; admin checks happen in the handlers.
fn protected_routes(config: &RateLimitConfig) -> Router {
    let router = Router::new()
        .route("/auth/me", routing::get(handlers::get_current_user))
        .route("/orders", routing::get(handlers::orders::list_orders))
        .route("/boxes", routing::post(handlers::boxes::create_box))
        .route(
            "/boxes/{id}",
            routing::put(handlers::boxes::update_box).delete(handlers::boxes::delete_box),
        )
        .route(
            "/products",
            routing::post(handlers::products::create_product),
        );

    with_rate_limit(router, config, RouteGroup::Account)
}

/// Gateway callbacks. Never rate limited: the gateway retries on failure.
fn gateway_routes() -> Router {
    Router::new()
        .route(
            "/payments/payfast/return",
            routing::any(handlers::payments::payfast_return),
        )
        .route(
            "/payments/payfast/webhook",
            routing::post(handlers::payments::payfast_webhook),
        )
        .route(
            "/payments/stripe/webhook",
            routing::post(handlers::payments::stripe_webhook),
        )
}

fn with_rate_limit(router: Router, config: &RateLimitConfig, group: RouteGroup) -> Router {
    if !config.enabled {
        return router;
    }

    let rule = config.rule(group);
    match GovernorConfigBuilder::default()
        .per_second(rule.replenish_secs)
        .burst_size(rule.burst)
        .finish()
    {
        Some(governor_conf) => router.layer(GovernorLayer::new(governor_conf)),
        None => {
            tracing::warn!(
                "Rate limit {} for {} rejected by governor, group left unlimited",
                rule,
                group.name()
            );
            router
        }
    }
}
