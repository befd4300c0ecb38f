use super::optional_env;
use std::env;

#[derive(Debug, Clone)]
pub struct MailjetConfig {
    pub api_key: String,
    pub api_secret: String,
    pub sender_email: String,
    pub sender_name: String,
    pub api_url: String,
    pub verify_template_id: Option<u64>,
}

#[derive(Clone)]
pub struct SmtpConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: String,
    pub from_address: String,
}

impl std::fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("smtp_username", &self.smtp_username)
            .field("from_address", &self.from_address)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub enum EmailProvider {
    Mailjet(MailjetConfig),
    Smtp(SmtpConfig),
    Disabled,
}

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub provider: EmailProvider,
    /// Prefix printed before prices in invoices.
    pub currency_symbol: String,
}

impl EmailConfig {
    /// Mailjet wins when both providers are configured. Neither configured
    /// means emails are skipped (graceful degradation).
    pub fn from_env() -> Self {
        let provider = MailjetConfig::from_env()
            .map(EmailProvider::Mailjet)
            .or_else(|| SmtpConfig::from_env().map(EmailProvider::Smtp))
            .unwrap_or(EmailProvider::Disabled);

        let currency_symbol =
            env::var("INVOICE_CURRENCY_SYMBOL").unwrap_or_else(|_| "Rs.".to_string());

        Self {
            provider,
            currency_symbol,
        }
    }

    pub fn disabled() -> Self {
        Self {
            provider: EmailProvider::Disabled,
            currency_symbol: "Rs.".to_string(),
        }
    }
}

impl MailjetConfig {
    fn from_env() -> Option<Self> {
        let api_key = optional_env("MAILJET_API_KEY")?;
        let api_secret = optional_env("MAILJET_API_SECRET")?;
        let sender_email = optional_env("MAILJET_SENDER_EMAIL")?;
        let sender_name =
            optional_env("MAILJET_SENDER_NAME").unwrap_or_else(|| "Mystery Loot".to_string());
        let api_url = optional_env("MAILJET_API_URL")
            .unwrap_or_else(|| "https://api.mailjet.com/v3.1/send".to_string());
        let verify_template_id =
            optional_env("MAILJET_TEMPLATE_VERIFY").and_then(|id| id.parse().ok());

        Some(Self {
            api_key,
            api_secret,
            sender_email,
            sender_name,
            api_url,
            verify_template_id,
        })
    }
}

impl SmtpConfig {
    fn from_env() -> Option<Self> {
        let smtp_host = env::var("SMTP_HOST").ok()?;
        let smtp_port = env::var("SMTP_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(587);
        let smtp_username = env::var("SMTP_USERNAME").ok()?;
        let smtp_password = env::var("SMTP_PASSWORD").ok()?;
        let from_address = env::var("SMTP_FROM")
            .unwrap_or_else(|_| format!("Mystery Loot <{}>", smtp_username.clone()));

        Some(Self {
            smtp_host,
            smtp_port,
            smtp_username,
            smtp_password,
            from_address,
        })
    }
}
