use crate::{
    config::{payment::PayfastConfig, AppConfig},
    error::{AppError, AppResult},
    models::OrderStatus,
    services::{
        email::EmailService,
        invoice::{self, INVOICE_SUBJECT},
        order::{gateway_section, merge_gateway_section, with_gateway_section, OrderService},
    },
};
use md5::{Digest, Md5};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use sea_orm::DatabaseConnection;
use serde_json::{json, Map, Value};
use std::sync::Arc;

pub const GATEWAY: &str = "payfast";
pub const PAYMENT_METHOD: &str = "PayFast";
const WEBHOOK_HISTORY_LIMIT: usize = 20;
const ITEM_NAME_MAX: usize = 100;
const ITEM_DESCRIPTION_MAX: usize = 255;

/// Characters `encodeURIComponent` leaves alone.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Form-style encoding the gateway signs: spaces become `+`.
pub fn encode_value(value: &str) -> String {
    utf8_percent_encode(value, COMPONENT)
        .to_string()
        .replace("%20", "+")
}

/// MD5 over the non-empty parameters in key order, plus the passphrase.
pub fn signature(params: &[(&str, String)], passphrase: Option<&str>) -> String {
    let mut sorted: Vec<&(&str, String)> = params.iter().filter(|(_, v)| !v.is_empty()).collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));

    let mut base = sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, encode_value(v)))
        .collect::<Vec<_>>()
        .join("&");
    if let Some(passphrase) = passphrase.filter(|p| !p.is_empty()) {
        base.push_str("&passphrase=");
        base.push_str(&encode_value(passphrase));
    }

    format!("{:x}", Md5::digest(base.as_bytes()))
}

#[derive(Debug, Clone)]
pub struct RedirectRequest<'a> {
    pub amount: f64,
    pub item_name: &'a str,
    pub item_description: &'a str,
    pub payment_id: &'a str,
    pub buyer_email: Option<&'a str>,
}

/// Signed redirect into the hosted payment page, or `None` without merchant
/// credentials.
pub fn build_redirect_url(config: &PayfastConfig, request: &RedirectRequest<'_>) -> Option<String> {
    let merchant_id = config.merchant_id.as_deref()?;
    let merchant_key = config.merchant_key.as_deref()?;

    let params: Vec<(&str, String)> = vec![
        ("merchant_id", merchant_id.to_string()),
        ("merchant_key", merchant_key.to_string()),
        ("return_url", config.return_url.clone()),
        ("cancel_url", config.cancel_url.clone()),
        ("notify_url", config.notify_url.clone()),
        ("m_payment_id", request.payment_id.to_string()),
        ("amount", format!("{:.2}", request.amount)),
        ("item_name", truncate(request.item_name, ITEM_NAME_MAX)),
        (
            "item_description",
            truncate(request.item_description, ITEM_DESCRIPTION_MAX),
        ),
        (
            "email_address",
            request.buyer_email.unwrap_or_default().to_string(),
        ),
    ];

    let signature = signature(&params, config.passphrase.as_deref());
    let query = params
        .iter()
        .filter(|(_, v)| !v.is_empty())
        .map(|(k, v)| format!("{}={}", k, encode_value(v)))
        .collect::<Vec<_>>()
        .join("&");

    Some(format!(
        "{}?{}&signature={}",
        config.mode.process_url(),
        query,
        signature
    ))
}

fn truncate(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect()
}

/// Where the shopper's browser is sent after the gateway hands them back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnOutcome {
    Success,
    Failed,
}

impl ReturnOutcome {
    /// Only an explicit failure counts as one.
    pub fn from_status(status: &str) -> Self {
        match status.trim().to_ascii_lowercase().as_str() {
            "failed" | "cancelled" => ReturnOutcome::Failed,
            _ => ReturnOutcome::Success,
        }
    }

    pub fn frontend_path(self) -> &'static str {
        match self {
            ReturnOutcome::Success => "/orders",
            ReturnOutcome::Failed => "/checkout",
        }
    }
}

/// Status signal carried by a server-to-server notification.
pub fn webhook_signal(status: &str) -> Option<OrderStatus> {
    match status.trim().to_ascii_lowercase().as_str() {
        "complete" | "paid" | "success" => Some(OrderStatus::Paid),
        "failed" | "cancelled" => Some(OrderStatus::Failed),
        _ => None,
    }
}

/// A field as text, whether it arrived as a JSON string or number.
pub fn field(fields: &Map<String, Value>, key: &str) -> Option<String> {
    match fields.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Decode a callback body as JSON or as a url-encoded form.
pub fn parse_fields(content_type: Option<&str>, body: &[u8]) -> Result<Map<String, Value>, String> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Map::new());
    }

    let is_json = content_type.is_some_and(|ct| ct.contains("json"))
        || body.first().is_some_and(|b| *b == b'{');
    if is_json {
        return match serde_json::from_slice::<Value>(body) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err("body is not an object".to_string()),
            Err(e) => Err(format!("invalid JSON body: {e}")),
        };
    }

    serde_urlencoded::from_bytes::<Vec<(String, String)>>(body)
        .map(|pairs| {
            pairs
                .into_iter()
                .map(|(k, v)| (k, Value::String(v)))
                .collect()
        })
        .map_err(|e| format!("invalid form body: {e}"))
}

/// Recompute the signature over everything the gateway sent except the
/// signature itself.
pub fn notification_is_authentic(fields: &Map<String, Value>, passphrase: Option<&str>) -> bool {
    let Some(received) = field(fields, "signature") else {
        return false;
    };
    let params: Vec<(&str, String)> = fields
        .iter()
        .filter(|(k, _)| k.as_str() != "signature")
        .filter_map(|(k, _)| field(fields, k).map(|v| (k.as_str(), v)))
        .collect();

    signature(&params, passphrase).eq_ignore_ascii_case(&received)
}

pub struct PayfastService {
    db: DatabaseConnection,
    config: Arc<AppConfig>,
}

impl PayfastService {
    pub fn new(db: DatabaseConnection, config: Arc<AppConfig>) -> Self {
        Self { db, config }
    }

    /// Stamp the order as a PayFast payment and build the signed redirect.
    pub async fn create(&self, order_id: i32, amount: f64, currency: &str) -> AppResult<String> {
        let orders = OrderService::new(self.db.clone());
        let details = orders.get(order_id).await?;
        let order = &details.order;

        let reference = order.id.to_string();
        let item_name = format!("Order {}", order.id);
        let item_description = order
            .shipping_address
            .as_deref()
            .filter(|a| !a.trim().is_empty())
            .unwrap_or("Mystery Loot Box Order");
        let buyer_email = details.buyer.as_ref().map(|b| b.email.as_str());

        let redirect = build_redirect_url(
            &self.config.payfast,
            &RedirectRequest {
                amount,
                item_name: &item_name,
                item_description,
                payment_id: &reference,
                buyer_email,
            },
        );

        let server = &self.config.server;
        let mut section = Map::new();
        section.insert("reference".into(), json!(reference));
        section.insert("amount".into(), json!(amount));
        section.insert("currency".into(), json!(currency));
        section.insert("redirect_url".into(), json!(redirect));
        section.insert(
            "frontend_after_success".into(),
            json!(server.frontend_url("/orders")),
        );
        section.insert(
            "frontend_after_cancel".into(),
            json!(server.frontend_url("/checkout")),
        );
        section.insert(
            "created_at".into(),
            json!(chrono::Utc::now().to_rfc3339()),
        );

        orders
            .apply_payment(order.id, Some(PAYMENT_METHOD), None, |current| {
                merge_gateway_section(current, GATEWAY, section)
            })
            .await?;

        redirect.ok_or_else(|| AppError::Gateway("Failed to create PayFast redirect".to_string()))
    }

    /// Browser return leg. Never fails: problems are logged and the shopper
    /// is still redirected.
    pub async fn handle_return(
        &self,
        query: &Map<String, Value>,
        body: &Map<String, Value>,
    ) -> ReturnOutcome {
        let reference = field(query, "m_payment_id")
            .or_else(|| field(body, "m_payment_id"))
            .or_else(|| field(query, "reference"))
            .or_else(|| field(body, "reference"));
        let status = field(query, "payment_status")
            .or_else(|| field(body, "payment_status"))
            .unwrap_or_default();
        let outcome = ReturnOutcome::from_status(&status);

        let Some(reference) = reference else {
            tracing::debug!("PayFast return without a reference");
            return outcome;
        };
        let Ok(order_id) = reference.parse::<i32>() else {
            tracing::warn!("PayFast return with unusable reference {reference:?}");
            return outcome;
        };

        let signal = match outcome {
            ReturnOutcome::Success => OrderStatus::Paid,
            ReturnOutcome::Failed => OrderStatus::Failed,
        };

        let result = OrderService::new(self.db.clone())
            .apply_payment(order_id, None, Some(signal), |current| current)
            .await;
        if let Err(e) = result {
            tracing::warn!("PayFast return could not update order {order_id}: {e}");
        }

        outcome
    }

    /// Server-to-server notification. Records the delivery on the order and
    /// applies the status it carries.
    pub async fn handle_webhook(
        &self,
        headers: Value,
        fields: Map<String, Value>,
        email_service: &EmailService,
    ) -> AppResult<()> {
        let reference = field(&fields, "m_payment_id")
            .or_else(|| field(&fields, "reference"))
            .ok_or_else(|| AppError::Validation("reference required".to_string()))?;
        let order_id = reference
            .parse::<i32>()
            .ok()
            .filter(|id| *id > 0)
            .ok_or_else(|| AppError::Validation("reference is not a valid order id".to_string()))?;

        if self.config.payfast.verify_webhook
            && !notification_is_authentic(&fields, self.config.payfast.passphrase.as_deref())
        {
            return Err(AppError::Signature("PayFast signature mismatch".to_string()));
        }

        let signal = field(&fields, "payment_status").and_then(|s| webhook_signal(&s));
        let entry = json!({
            "headers": headers,
            "body": Value::Object(fields),
            "received_at": chrono::Utc::now().to_rfc3339(),
        });

        let orders = OrderService::new(self.db.clone());
        let applied = orders
            .apply_payment(order_id, None, signal, |current| {
                let mut section = gateway_section(&current, GATEWAY);
                push_history(&mut section, entry.clone());
                section.insert("latest_webhook".into(), entry);
                with_gateway_section(current, GATEWAY, section)
            })
            .await?;

        if applied.became_paid {
            let details = orders.expand_one(applied.order).await?;
            invoice::send_order_email(email_service, &details, INVOICE_SUBJECT)
                .await
                .log(&format!("order {} PayFast invoice", details.order.id));
        }

        Ok(())
    }
}

/// Append to `webhook_history`, keeping only the most recent entries.
fn push_history(section: &mut Map<String, Value>, entry: Value) {
    let mut history = match section.remove("webhook_history") {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    };
    history.push(entry);
    if history.len() > WEBHOOK_HISTORY_LIMIT {
        let excess = history.len() - WEBHOOK_HISTORY_LIMIT;
        history.drain(..excess);
    }
    section.insert("webhook_history".into(), Value::Array(history));
}
