use lootbox::config::{self, AppConfig};
use lootbox::migration::Migrator;
use lootbox::services::bootstrap_admin::{ensure_bootstrap_admin, BootstrapAdminConfig};
use lootbox::services::email::EmailService;
use lootbox::{create_app, AppState};
use sea_orm_migration::MigratorTrait;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lootbox=debug,tower_http=debug,axum=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Validate configuration before doing anything else
    let config = Arc::new(AppConfig::from_env()?);

    tracing::info!("Starting Mystery Box API v{}...", env!("CARGO_PKG_VERSION"));

    let db = config::database::get_database(&config.database).await?;
    tracing::info!("Database connected successfully");

    Migrator::up(&db, None).await?;
    tracing::info!("Database migrations applied successfully");

    let bootstrap = BootstrapAdminConfig::from_env();
    if let Err(e) = ensure_bootstrap_admin(&db, bootstrap.as_ref()).await {
        tracing::error!("Failed to bootstrap admin account: {}", e);
    }

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(15))
        .build()?;

    let email = EmailService::from_config(&config.email, http.clone());
    if email.is_configured() {
        tracing::info!("Email delivery configured");
    } else {
        tracing::warn!("Email not configured, emails will be skipped");
    }
    if config.payfast.merchant_id.is_none() {
        tracing::warn!("PayFast merchant not configured, PayFast checkout is unavailable");
    }
    if config.stripe.secret_key.is_none() {
        tracing::warn!("Stripe secret key not configured, Stripe checkout is unavailable");
    }

    let addr = format!("{}:{}", config.server.host, config.server.port);

    let app = create_app(AppState {
        db,
        config: config.clone(),
        email,
        http,
    });

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui/", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, gracefully shutting down...");
}
