pub mod database;
pub mod email;
pub mod jwt;
pub mod payment;
pub mod rate_limit;

use std::env;

use database::DatabaseConfig;
use email::EmailConfig;
use jwt::JwtConfig;
use payment::{PayfastConfig, StripeConfig};
use rate_limit::RateLimitConfig;

/// Everything the server reads from the environment, resolved once at startup
/// and shared read-only with handlers through `Extension<Arc<AppConfig>>`.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub payfast: PayfastConfig,
    pub stripe: StripeConfig,
    pub email: EmailConfig,
    pub rate_limit: RateLimitConfig,
}

impl AppConfig {
    /// Validate all required configuration at startup (fail-fast).
    pub fn from_env() -> anyhow::Result<Self> {
        let server = ServerConfig::from_env();
        let database = DatabaseConfig::from_env()?;
        let jwt = JwtConfig::from_env()?;
        let payfast = PayfastConfig::from_env(&server.backend_base_url);
        let stripe = StripeConfig::from_env();
        let email = EmailConfig::from_env();
        let rate_limit = RateLimitConfig::from_env();

        Ok(Self {
            server,
            database,
            jwt,
            payfast,
            stripe,
            email,
            rate_limit,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub frontend_base_url: String,
    pub backend_base_url: String,
    pub cors_origins: String,
    pub static_dir: Option<String>,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5000);
        let frontend_base_url = env::var("FRONTEND_BASE_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|_| "http://localhost:5173".to_string());
        let backend_base_url = env::var("BACKEND_BASE_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|_| format!("http://{}:{}", host, port));
        let cors_origins = env::var("CORS_ORIGINS").unwrap_or_else(|_| "*".to_string());
        let static_dir = env::var("STATIC_DIR")
            .ok()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());

        Self {
            host,
            port,
            frontend_base_url,
            backend_base_url,
            cors_origins,
            static_dir,
        }
    }

    pub fn frontend_url(&self, path: &str) -> String {
        format!("{}{}", self.frontend_base_url, path)
    }
}

pub(crate) fn parse_bool_env(var_name: &str, default: bool) -> bool {
    env::var(var_name)
        .ok()
        .and_then(|value| parse_bool(&value))
        .unwrap_or(default)
}

pub(crate) fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

/// Reads an optional variable, treating blank values as unset.
pub(crate) fn optional_env(var_name: &str) -> Option<String> {
    env::var(var_name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
