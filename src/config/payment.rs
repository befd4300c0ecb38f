use super::{optional_env, parse_bool_env};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayfastMode {
    Sandbox,
    Live,
}

impl PayfastMode {
    pub fn process_url(self) -> &'static str {
        match self {
            PayfastMode::Live => "https://www.payfast.co.za/eng/process",
            PayfastMode::Sandbox => "https://sandbox.payfast.co.za/eng/process",
        }
    }
}

#[derive(Clone)]
pub struct PayfastConfig {
    pub merchant_id: Option<String>,
    pub merchant_key: Option<String>,
    pub passphrase: Option<String>,
    pub mode: PayfastMode,
    pub return_url: String,
    pub cancel_url: String,
    pub notify_url: String,
    pub verify_webhook: bool,
}

impl std::fmt::Debug for PayfastConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayfastConfig")
            .field("merchant_id", &self.merchant_id)
            .field("merchant_key", &self.merchant_key.as_ref().map(|_| "***"))
            .field("passphrase", &self.passphrase.as_ref().map(|_| "***"))
            .field("mode", &self.mode)
            .field("return_url", &self.return_url)
            .field("cancel_url", &self.cancel_url)
            .field("notify_url", &self.notify_url)
            .field("verify_webhook", &self.verify_webhook)
            .finish()
    }
}

impl PayfastConfig {
    /// Browser and notify callbacks default to this server's own endpoints.
    pub fn from_env(backend_base_url: &str) -> Self {
        let mode = match optional_env("PAYFAST_MODE")
            .unwrap_or_default()
            .to_ascii_lowercase()
            .as_str()
        {
            "live" => PayfastMode::Live,
            _ => PayfastMode::Sandbox,
        };

        let return_url = optional_env("PAYFAST_RETURN_URL")
            .unwrap_or_else(|| format!("{}/api/v1/payments/payfast/return", backend_base_url));
        let cancel_url = optional_env("PAYFAST_CANCEL_URL").unwrap_or_else(|| {
            format!(
                "{}/api/v1/payments/payfast/return?payment_status=cancelled",
                backend_base_url
            )
        });
        let notify_url = optional_env("PAYFAST_NOTIFY_URL")
            .unwrap_or_else(|| format!("{}/api/v1/payments/payfast/webhook", backend_base_url));

        Self {
            merchant_id: optional_env("PAYFAST_MERCHANT_ID"),
            merchant_key: optional_env("PAYFAST_MERCHANT_KEY"),
            passphrase: optional_env("PAYFAST_PASSPHRASE"),
            mode,
            return_url,
            cancel_url,
            notify_url,
            verify_webhook: parse_bool_env("PAYFAST_VERIFY_WEBHOOK", false),
        }
    }
}

#[derive(Clone)]
pub struct StripeConfig {
    pub secret_key: Option<String>,
    pub webhook_secret: Option<String>,
    pub currency: String,
    pub api_base: String,
    /// Maximum age of a signed webhook timestamp, in seconds.
    pub webhook_tolerance_secs: i64,
}

impl std::fmt::Debug for StripeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeConfig")
            .field("secret_key", &self.secret_key.as_ref().map(|_| "***"))
            .field("webhook_secret", &self.webhook_secret.as_ref().map(|_| "***"))
            .field("currency", &self.currency)
            .field("api_base", &self.api_base)
            .field("webhook_tolerance_secs", &self.webhook_tolerance_secs)
            .finish()
    }
}

impl StripeConfig {
    pub fn from_env() -> Self {
        Self {
            secret_key: optional_env("STRIPE_SECRET_KEY"),
            webhook_secret: optional_env("STRIPE_WEBHOOK_SECRET"),
            currency: optional_env("STRIPE_CURRENCY")
                .unwrap_or_else(|| "usd".to_string())
                .to_ascii_lowercase(),
            api_base: optional_env("STRIPE_API_BASE")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| "https://api.stripe.com".to_string()),
            webhook_tolerance_secs: 300,
        }
    }
}
