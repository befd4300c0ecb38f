use crate::{
    config::{payment::StripeConfig, AppConfig},
    error::{AppError, AppResult},
    models::OrderStatus,
    services::{
        email::EmailService,
        invoice::{self, CONFIRMATION_SUBJECT},
        order::{merge_gateway_section, OrderService},
    },
    utils::parse_id,
};
use hmac::{Hmac, Mac};
use sea_orm::DatabaseConnection;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use sha2::Sha256;
use std::sync::Arc;

pub const GATEWAY: &str = "stripe";
pub const PAYMENT_METHOD: &str = "Stripe";
pub const SIGNATURE_HEADER: &str = "stripe-signature";
const SESSION_COMPLETED: &str = "checkout.session.completed";

type HmacSha256 = Hmac<Sha256>;

/// Parts of a `Stripe-Signature` header: `t=<unix>,v1=<hex>[,v1=<hex>...]`.
#[derive(Debug, PartialEq, Eq)]
pub struct SignatureHeader {
    pub timestamp: i64,
    pub signatures: Vec<String>,
}

impl SignatureHeader {
    pub fn parse(header: &str) -> Result<Self, String> {
        let mut timestamp = None;
        let mut signatures = Vec::new();

        for part in header.split(',') {
            let Some((key, value)) = part.trim().split_once('=') else {
                continue;
            };
            match key {
                "t" => {
                    timestamp = Some(
                        value
                            .parse::<i64>()
                            .map_err(|_| "Invalid timestamp in signature header".to_string())?,
                    )
                }
                "v1" => signatures.push(value.to_string()),
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or_else(|| "No timestamp in signature header".to_string())?;
        if signatures.is_empty() {
            return Err("No v1 signature in signature header".to_string());
        }
        Ok(Self {
            timestamp,
            signatures,
        })
    }
}

/// HMAC-SHA256 over `"<t>.<payload>"`, compared in constant time against
/// every `v1` candidate, with a bound on the timestamp's age.
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now: i64,
    tolerance_secs: i64,
) -> Result<(), String> {
    let header = SignatureHeader::parse(header)?;

    if (now - header.timestamp).abs() > tolerance_secs {
        return Err("Timestamp outside the tolerance zone".to_string());
    }

    let matched = header.signatures.iter().any(|candidate| {
        let Ok(expected) = hex::decode(candidate) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
            return false;
        };
        mac.update(header.timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        mac.verify_slice(&expected).is_ok()
    });

    if matched {
        Ok(())
    } else {
        Err("No signatures found matching the expected signature for payload".to_string())
    }
}

/// Header value for `payload` signed at `timestamp`.
pub fn sign_payload(payload: &[u8], secret: &str, timestamp: i64) -> Result<String, String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|e| e.to_string())?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(format!(
        "t={},v1={}",
        timestamp,
        hex::encode(mac.finalize().into_bytes())
    ))
}

#[derive(Debug, Clone)]
pub struct SessionRequest<'a> {
    pub order_id: i32,
    pub amount: f64,
    pub currency: &'a str,
    pub success_url: String,
    pub cancel_url: String,
    pub customer_email: Option<&'a str>,
}

/// Amount in the currency's minor unit.
pub fn minor_units(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

/// Form fields for the checkout session API.
pub fn session_form(request: &SessionRequest<'_>) -> Vec<(String, String)> {
    let mut form = vec![
        ("mode".to_string(), "payment".to_string()),
        ("payment_method_types[0]".to_string(), "card".to_string()),
        (
            "line_items[0][price_data][currency]".to_string(),
            request.currency.to_string(),
        ),
        (
            "line_items[0][price_data][product_data][name]".to_string(),
            format!("Order #{}", request.order_id),
        ),
        (
            "line_items[0][price_data][product_data][description]".to_string(),
            "Mystery Loot Box Purchase".to_string(),
        ),
        (
            "line_items[0][price_data][unit_amount]".to_string(),
            minor_units(request.amount).to_string(),
        ),
        ("line_items[0][quantity]".to_string(), "1".to_string()),
        ("success_url".to_string(), request.success_url.clone()),
        ("cancel_url".to_string(), request.cancel_url.clone()),
        (
            "metadata[orderId]".to_string(),
            request.order_id.to_string(),
        ),
    ];
    if let Some(email) = request.customer_email.filter(|e| !e.is_empty()) {
        form.push(("customer_email".to_string(), email.to_string()));
    }
    form
}

#[derive(Debug, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    message: Option<String>,
}

/// Minimal client for the hosted checkout API.
pub struct StripeClient {
    http: reqwest::Client,
    config: StripeConfig,
}

impl StripeClient {
    pub fn new(http: reqwest::Client, config: StripeConfig) -> Self {
        Self { http, config }
    }

    pub async fn create_checkout_session(
        &self,
        request: &SessionRequest<'_>,
    ) -> AppResult<CheckoutSession> {
        let secret_key = self
            .config
            .secret_key
            .as_deref()
            .ok_or_else(|| AppError::Gateway("Stripe secret key is not configured".to_string()))?;

        let resp = self
            .http
            .post(format!("{}/v1/checkout/sessions", self.config.api_base))
            .bearer_auth(secret_key)
            .form(&session_form(request))
            .send()
            .await
            .map_err(|e| AppError::Gateway(format!("Stripe request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<StripeErrorBody>(&text)
                .ok()
                .and_then(|b| b.error.message)
                .unwrap_or_else(|| format!("Stripe error ({status})"));
            return Err(AppError::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        resp.json::<CheckoutSession>()
            .await
            .map_err(|e| AppError::Gateway(format!("Invalid Stripe response: {e}")))
    }
}

#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub data: EventData,
}

#[derive(Debug, Default, Deserialize)]
pub struct EventData {
    pub object: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutCreated {
    pub redirect_url: String,
    pub session_id: String,
}

pub struct StripeService {
    db: DatabaseConnection,
    config: Arc<AppConfig>,
    http: reqwest::Client,
}

impl StripeService {
    pub fn new(db: DatabaseConnection, config: Arc<AppConfig>, http: reqwest::Client) -> Self {
        Self { db, config, http }
    }

    pub async fn create(
        &self,
        order_id: i32,
        amount: f64,
        currency: Option<&str>,
    ) -> AppResult<CheckoutCreated> {
        let orders = OrderService::new(self.db.clone());
        let details = orders.get(order_id).await?;

        let currency = currency
            .map(|c| c.trim().to_ascii_lowercase())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| self.config.stripe.currency.clone());
        let server = &self.config.server;
        let request = SessionRequest {
            order_id: details.order.id,
            amount,
            currency: &currency,
            success_url: server.frontend_url("/orders?session_id={CHECKOUT_SESSION_ID}"),
            cancel_url: server.frontend_url("/checkout"),
            customer_email: details.buyer.as_ref().map(|b| b.email.as_str()),
        };

        let client = StripeClient::new(self.http.clone(), self.config.stripe.clone());
        let session = client.create_checkout_session(&request).await?;
        let redirect_url = session
            .url
            .clone()
            .ok_or_else(|| AppError::Gateway("Stripe session has no checkout URL".to_string()))?;

        let mut section = Map::new();
        section.insert("session_id".into(), json!(session.id));
        section.insert("amount".into(), json!(amount));
        section.insert("currency".into(), json!(currency));
        section.insert("checkout_url".into(), json!(redirect_url));
        section.insert(
            "created_at".into(),
            json!(chrono::Utc::now().to_rfc3339()),
        );
        orders
            .apply_payment(details.order.id, Some(PAYMENT_METHOD), None, |current| {
                merge_gateway_section(current, GATEWAY, section)
            })
            .await?;

        tracing::info!("Stripe session {} created for order {}", session.id, order_id);
        Ok(CheckoutCreated {
            redirect_url,
            session_id: session.id,
        })
    }

    /// Verify and apply a webhook delivery. Nothing is written unless the
    /// signature checks out.
    pub async fn handle_webhook(
        &self,
        signature: Option<&str>,
        payload: &[u8],
        email_service: &EmailService,
    ) -> AppResult<()> {
        let secret = self
            .config
            .stripe
            .webhook_secret
            .as_deref()
            .ok_or_else(|| AppError::Signature("Webhook secret is not configured".to_string()))?;
        let signature = signature
            .ok_or_else(|| AppError::Signature("Missing Stripe-Signature header".to_string()))?;

        verify_signature(
            payload,
            signature,
            secret,
            chrono::Utc::now().timestamp(),
            self.config.stripe.webhook_tolerance_secs,
        )
        .map_err(AppError::Signature)?;

        let event: WebhookEvent = serde_json::from_slice(payload)
            .map_err(|e| AppError::Signature(format!("Invalid payload: {e}")))?;

        if event.event_type != SESSION_COMPLETED {
            tracing::debug!("Ignoring Stripe event {}", event.event_type);
            return Ok(());
        }
        tracing::info!(
            "Stripe event {} ({})",
            event.event_type,
            event.id.as_deref().unwrap_or("no id")
        );

        self.complete_session(&event.data.object, email_service)
            .await
    }

    async fn complete_session(&self, session: &Value, email_service: &EmailService) -> AppResult<()> {
        let order_id = match session.pointer("/metadata/orderId") {
            Some(Value::String(s)) => parse_id(s, "orderId")?,
            Some(Value::Number(n)) => parse_id(&n.to_string(), "orderId")?,
            _ => {
                return Err(AppError::Validation(
                    "orderId missing from session metadata".to_string(),
                ))
            }
        };

        let mut completed = Map::new();
        completed.insert("session_id".into(), session.get("id").cloned().unwrap_or(Value::Null));
        for key in ["payment_intent", "payment_status", "amount_total", "currency"] {
            completed.insert(key.into(), session.get(key).cloned().unwrap_or(Value::Null));
        }
        completed.insert(
            "completed_at".into(),
            json!(chrono::Utc::now().to_rfc3339()),
        );

        let orders = OrderService::new(self.db.clone());
        let applied = orders
            .apply_payment(order_id, None, Some(OrderStatus::Paid), |current| {
                merge_gateway_section(current, GATEWAY, completed)
            })
            .await?;

        if applied.became_paid {
            let details = orders.expand_one(applied.order).await?;
            invoice::send_order_email(email_service, &details, CONFIRMATION_SUBJECT)
                .await
                .log(&format!("order {} Stripe confirmation", details.order.id));
        }

        Ok(())
    }
}
