use crate::config::email::{EmailConfig, EmailProvider, MailjetConfig, SmtpConfig};
use anyhow::Result;
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingEmail {
    pub to_email: String,
    pub to_name: String,
    pub subject: String,
    pub html: String,
    /// Provider-side template; mailers without template support send `html`.
    pub template: Option<EmailTemplate>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmailTemplate {
    pub id: u64,
    pub variables: serde_json::Value,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<()>;
}

/// Outcome of one send attempt. The caller decides whether a failure matters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    Skipped,
    Failed(String),
}

impl Delivery {
    pub fn is_failed(&self) -> bool {
        matches!(self, Delivery::Failed(_))
    }

    /// Record the outcome of a side-effect email without affecting the request.
    pub fn log(&self, context: &str) {
        match self {
            Delivery::Sent => tracing::info!("{context}: email sent"),
            Delivery::Skipped => tracing::debug!("{context}: email skipped"),
            Delivery::Failed(e) => tracing::warn!("{context}: email failed: {e}"),
        }
    }
}

#[derive(Clone)]
pub struct EmailService {
    mailer: Option<Arc<dyn Mailer>>,
    verify_template_id: Option<u64>,
    currency_symbol: String,
}

impl EmailService {
    /// If no provider is configured, sending is skipped (graceful degradation).
    pub fn from_config(config: &EmailConfig, http: reqwest::Client) -> Self {
        let (mailer, verify_template_id): (Option<Arc<dyn Mailer>>, Option<u64>) =
            match &config.provider {
                EmailProvider::Mailjet(cfg) => (
                    Some(Arc::new(MailjetMailer::new(cfg.clone(), http))),
                    cfg.verify_template_id,
                ),
                EmailProvider::Smtp(cfg) => match SmtpMailer::new(cfg) {
                    Ok(m) => (Some(Arc::new(m)), None),
                    Err(e) => {
                        tracing::warn!("Failed to build SMTP transport: {e}");
                        (None, None)
                    }
                },
                EmailProvider::Disabled => (None, None),
            };

        Self {
            mailer,
            verify_template_id,
            currency_symbol: config.currency_symbol.clone(),
        }
    }

    pub fn with_mailer(mailer: Arc<dyn Mailer>, currency_symbol: &str) -> Self {
        Self {
            mailer: Some(mailer),
            verify_template_id: None,
            currency_symbol: currency_symbol.to_string(),
        }
    }

    pub fn disabled() -> Self {
        Self {
            mailer: None,
            verify_template_id: None,
            currency_symbol: "Rs.".to_string(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.mailer.is_some()
    }

    pub fn currency_symbol(&self) -> &str {
        &self.currency_symbol
    }

    pub async fn deliver(&self, email: OutgoingEmail) -> Delivery {
        let Some(mailer) = &self.mailer else {
            tracing::debug!("Email not configured, skipping email to {}", email.to_email);
            return Delivery::Skipped;
        };

        match mailer.send(&email).await {
            Ok(()) => {
                tracing::info!("Email sent to {}: {}", email.to_email, email.subject);
                Delivery::Sent
            }
            Err(e) => Delivery::Failed(e.to_string()),
        }
    }

    pub async fn send_verification_link(&self, to: &str, name: &str, link: &str) -> Delivery {
        let html = format!(
            "<p>Hi {}, verify your email:</p><p><a href=\"{}\">Verify</a></p><p>This link expires in 24 hours.</p>",
            escape(name),
            escape(link)
        );
        let template = self.verify_template_id.map(|id| EmailTemplate {
            id,
            variables: serde_json::json!({ "link": link }),
        });

        self.deliver(OutgoingEmail {
            to_email: to.to_string(),
            to_name: display_name(name, to),
            subject: "Verify your email".to_string(),
            html,
            template,
        })
        .await
    }

    pub async fn send_otp(&self, to: &str, name: &str, code: &str) -> Delivery {
        let html = format!(
            "<p>Your code is <b>{}</b>. It expires in 10 minutes.</p>",
            escape(code)
        );

        self.deliver(OutgoingEmail {
            to_email: to.to_string(),
            to_name: display_name(name, to),
            subject: "Your verification code".to_string(),
            html,
            template: None,
        })
        .await
    }

    pub async fn send_html(&self, to: &str, name: &str, subject: &str, html: String) -> Delivery {
        self.deliver(OutgoingEmail {
            to_email: to.to_string(),
            to_name: display_name(name, to),
            subject: subject.to_string(),
            html,
            template: None,
        })
        .await
    }
}

fn display_name(name: &str, email: &str) -> String {
    if name.trim().is_empty() {
        email.to_string()
    } else {
        name.to_string()
    }
}

/// Escape text interpolated into HTML email bodies.
pub fn escape(text: &str) -> String {
    ammonia::clean_text(text)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct MailjetAddress {
    email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct MailjetMessage {
    from: MailjetAddress,
    to: Vec<MailjetAddress>,
    subject: String,
    #[serde(rename = "HTMLPart", skip_serializing_if = "Option::is_none")]
    html_part: Option<String>,
    #[serde(rename = "TemplateID", skip_serializing_if = "Option::is_none")]
    template_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    template_language: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    variables: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct MailjetSendBody {
    messages: Vec<MailjetMessage>,
}

/// Mailjet v3.1 send API over HTTPS.
pub struct MailjetMailer {
    client: reqwest::Client,
    config: MailjetConfig,
}

impl MailjetMailer {
    pub fn new(config: MailjetConfig, client: reqwest::Client) -> Self {
        Self { client, config }
    }

    fn body(&self, email: &OutgoingEmail) -> MailjetSendBody {
        let (html_part, template_id, template_language, variables) = match &email.template {
            Some(t) => (None, Some(t.id), Some(true), Some(t.variables.clone())),
            None => (Some(email.html.clone()), None, None, None),
        };

        MailjetSendBody {
            messages: vec![MailjetMessage {
                from: MailjetAddress {
                    email: self.config.sender_email.clone(),
                    name: Some(self.config.sender_name.clone()),
                },
                to: vec![MailjetAddress {
                    email: email.to_email.clone(),
                    name: Some(email.to_name.clone()),
                }],
                subject: email.subject.clone(),
                html_part,
                template_id,
                template_language,
                variables,
            }],
        }
    }
}

#[async_trait]
impl Mailer for MailjetMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<()> {
        let resp = self
            .client
            .post(&self.config.api_url)
            .basic_auth(&self.config.api_key, Some(&self.config.api_secret))
            .json(&self.body(email))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("Mailjet send failed ({}): {}", status, text));
        }
        Ok(())
    }
}

/// Plain SMTP relay, used when no Mailjet account is configured.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(cfg: &SmtpConfig) -> Result<Self> {
        let creds = Credentials::new(cfg.smtp_username.clone(), cfg.smtp_password.clone());
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&cfg.smtp_host)?
            .port(cfg.smtp_port)
            .credentials(creds)
            .build();
        let from: Mailbox = cfg.from_address.parse().map_err(
            |e: lettre::address::AddressError| {
                anyhow::anyhow!("Invalid from address '{}': {}", cfg.from_address, e)
            },
        )?;

        Ok(Self { transport, from })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<()> {
        let to_mailbox: Mailbox =
            email
                .to_email
                .parse()
                .map_err(|e: lettre::address::AddressError| {
                    anyhow::anyhow!("Invalid to address '{}': {}", email.to_email, e)
                })?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to_mailbox)
            .subject(email.subject.as_str())
            .header(ContentType::TEXT_HTML)
            .body(email.html.clone())?;

        self.transport.send(message).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Capture(Mutex<Vec<OutgoingEmail>>);

    #[async_trait]
    impl Mailer for Capture {
        async fn send(&self, email: &OutgoingEmail) -> Result<()> {
            self.0.lock().unwrap().push(email.clone());
            Ok(())
        }
    }

    struct Broken;

    #[async_trait]
    impl Mailer for Broken {
        async fn send(&self, _email: &OutgoingEmail) -> Result<()> {
            Err(anyhow::anyhow!("provider down"))
        }
    }

    #[tokio::test]
    async fn disabled_service_skips() {
        let service = EmailService::disabled();
        let outcome = service.send_otp("a@example.com", "a", "123456").await;
        assert_eq!(outcome, Delivery::Skipped);
    }

    #[tokio::test]
    async fn failures_are_reported_not_raised() {
        let service = EmailService::with_mailer(Arc::new(Broken), "Rs.");
        let outcome = service.send_otp("a@example.com", "a", "123456").await;
        assert!(outcome.is_failed());
    }

    #[tokio::test]
    async fn otp_email_contains_code_and_falls_back_to_email_name() {
        let capture = Arc::new(Capture::default());
        let service = EmailService::with_mailer(capture.clone(), "Rs.");
        service.send_otp("bob@example.com", "", "654321").await;

        let sent = capture.0.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to_name, "bob@example.com");
        assert_eq!(sent[0].subject, "Your verification code");
        assert!(sent[0].html.contains("654321"));
    }

    #[test]
    fn escape_neutralises_markup() {
        let escaped = escape("<b>x</b>");
        assert!(!escaped.contains('<'));
        assert!(escaped.starts_with("&lt;b&gt;x"));
    }

    #[test]
    fn mailjet_body_uses_template_when_present() {
        let mailer = MailjetMailer::new(
            MailjetConfig {
                api_key: "k".to_string(),
                api_secret: "s".to_string(),
                sender_email: "shop@example.com".to_string(),
                sender_name: "Shop".to_string(),
                api_url: "http://localhost/send".to_string(),
                verify_template_id: Some(42),
            },
            reqwest::Client::new(),
        );
        let email = OutgoingEmail {
            to_email: "a@example.com".to_string(),
            to_name: "A".to_string(),
            subject: "Verify your email".to_string(),
            html: "<p>x</p>".to_string(),
            template: Some(EmailTemplate {
                id: 42,
                variables: serde_json::json!({ "link": "http://x" }),
            }),
        };

        let body = serde_json::to_value(mailer.body(&email)).unwrap();
        let message = &body["Messages"][0];
        assert_eq!(message["TemplateID"], 42);
        assert_eq!(message["TemplateLanguage"], true);
        assert_eq!(message["Variables"]["link"], "http://x");
        assert!(message.get("HTMLPart").is_none());
        assert_eq!(message["From"]["Email"], "shop@example.com");
    }
}
