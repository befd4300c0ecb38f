use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::response::ApiResponse;
use crate::services::email::EmailService;
use crate::services::payfast::{self, PayfastService};
use crate::services::stripe::{StripeService, SIGNATURE_HEADER};
use crate::utils::RawId;
use axum::{
    body::Bytes,
    extract::RawQuery,
    http::{header, HeaderMap},
    response::{IntoResponse, Redirect},
    Extension, Json,
};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use utoipa::ToSchema;

/// Amount as the storefront sends it: a number or a numeric string.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum RawAmount {
    Number(f64),
    Text(String),
}

impl RawAmount {
    fn value(&self) -> Option<f64> {
        match self {
            RawAmount::Number(n) => Some(*n),
            RawAmount::Text(s) => s.trim().parse().ok(),
        }
        .filter(|n: &f64| n.is_finite() && *n > 0.0)
    }
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentRequest {
    pub order_id: Option<RawId>,
    pub amount: Option<RawAmount>,
    /// Defaults per gateway
    pub currency: Option<String>,
}

impl CreatePaymentRequest {
    fn required(&self) -> AppResult<(i32, f64)> {
        let missing = || AppError::Validation("orderId and amount are required".to_string());
        let order_id = self.order_id.as_ref().ok_or_else(missing)?.parse("orderId")?;
        let amount = self
            .amount
            .as_ref()
            .and_then(RawAmount::value)
            .ok_or_else(missing)?;
        Ok((order_id, amount))
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RedirectResponse {
    /// Where to send the shopper's browser
    pub redirect_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/v1/payments/payfast/create",
    request_body = CreatePaymentRequest,
    responses(
        (status = 200, description = "Signed redirect to the hosted payment page", body = RedirectResponse),
        (status = 400, description = "orderId and amount are required", body = AppError),
        (status = 404, description = "Order not found", body = AppError),
        (status = 502, description = "Redirect could not be built", body = AppError),
    ),
    tag = "payments"
)]
pub async fn payfast_create(
    Extension(db): Extension<DatabaseConnection>,
    Extension(config): Extension<Arc<AppConfig>>,
    Json(payload): Json<CreatePaymentRequest>,
) -> AppResult<impl IntoResponse> {
    let (order_id, amount) = payload.required()?;
    let currency = payload
        .currency
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or("ZAR");

    let redirect_url = PayfastService::new(db, config)
        .create(order_id, amount, currency)
        .await?;

    Ok(ApiResponse::ok(RedirectResponse {
        redirect_url,
        session_id: None,
    }))
}

#[utoipa::path(
    get,
    path = "/api/v1/payments/payfast/return",
    request_body(content = String, content_type = "application/x-www-form-urlencoded", description = "PayFast return fields, also accepted in the query string"),
    responses(
        (status = 303, description = "Back to the storefront: /orders on success, /checkout on failure"),
    ),
    tag = "payments"
)]
pub async fn payfast_return(
    Extension(db): Extension<DatabaseConnection>,
    Extension(config): Extension<Arc<AppConfig>>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let query_fields = query
        .as_deref()
        .map(|q| payfast::parse_fields(Some("application/x-www-form-urlencoded"), q.as_bytes()))
        .transpose()
        .unwrap_or_else(|e| {
            tracing::warn!("PayFast return with unreadable query: {e}");
            None
        })
        .unwrap_or_default();
    let body_fields = payfast::parse_fields(content_type(&headers), &body).unwrap_or_else(|e| {
        tracing::warn!("PayFast return with unreadable body: {e}");
        Map::new()
    });

    let outcome = PayfastService::new(db, config.clone())
        .handle_return(&query_fields, &body_fields)
        .await;
    Redirect::to(&config.server.frontend_url(outcome.frontend_path()))
}

#[utoipa::path(
    post,
    path = "/api/v1/payments/payfast/webhook",
    request_body(content = String, content_type = "application/x-www-form-urlencoded", description = "PayFast ITN fields"),
    responses(
        (status = 200, description = "Notification recorded"),
        (status = 400, description = "Missing reference or bad signature", body = AppError),
        (status = 404, description = "Order not found", body = AppError),
    ),
    tag = "payments"
)]
pub async fn payfast_webhook(
    Extension(db): Extension<DatabaseConnection>,
    Extension(config): Extension<Arc<AppConfig>>,
    Extension(email_service): Extension<EmailService>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<impl IntoResponse> {
    let fields = payfast::parse_fields(content_type(&headers), &body).map_err(AppError::Validation)?;

    PayfastService::new(db, config)
        .handle_webhook(headers_json(&headers), fields, &email_service)
        .await?;

    Ok(Json(json!({ "ok": true })))
}

#[utoipa::path(
    post,
    path = "/api/v1/payments/stripe/create",
    request_body = CreatePaymentRequest,
    responses(
        (status = 200, description = "Checkout session created", body = RedirectResponse),
        (status = 400, description = "orderId and amount are required", body = AppError),
        (status = 404, description = "Order not found", body = AppError),
        (status = 502, description = "Gateway unavailable", body = AppError),
    ),
    tag = "payments"
)]
pub async fn stripe_create(
    Extension(db): Extension<DatabaseConnection>,
    Extension(config): Extension<Arc<AppConfig>>,
    Extension(http): Extension<reqwest::Client>,
    Json(payload): Json<CreatePaymentRequest>,
) -> AppResult<impl IntoResponse> {
    let (order_id, amount) = payload.required()?;

    let created = StripeService::new(db, config, http)
        .create(order_id, amount, payload.currency.as_deref())
        .await?;

    Ok(ApiResponse::ok(RedirectResponse {
        redirect_url: created.redirect_url,
        session_id: Some(created.session_id),
    }))
}

#[utoipa::path(
    post,
    path = "/api/v1/payments/stripe/webhook",
    request_body(content = String, content_type = "application/json", description = "Raw Stripe event, verified against the stripe-signature header"),
    responses(
        (status = 200, description = "Event received"),
        (status = 400, description = "Signature or payload rejected", body = AppError),
        (status = 404, description = "Order not found", body = AppError),
    ),
    tag = "payments"
)]
pub async fn stripe_webhook(
    Extension(db): Extension<DatabaseConnection>,
    Extension(config): Extension<Arc<AppConfig>>,
    Extension(http): Extension<reqwest::Client>,
    Extension(email_service): Extension<EmailService>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<impl IntoResponse> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    StripeService::new(db, config, http)
        .handle_webhook(signature, &body, &email_service)
        .await?;

    Ok(Json(json!({ "received": true })))
}

fn content_type(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
}

/// Request headers as a JSON object, for the audit trail.
fn headers_json(headers: &HeaderMap) -> Value {
    let map: Map<String, Value> = headers
        .iter()
        .filter(|(name, _)| *name != header::AUTHORIZATION && *name != header::COOKIE)
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                Value::String(String::from_utf8_lossy(value.as_bytes()).into_owned()),
            )
        })
        .collect();
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn amount_accepts_numbers_and_strings() {
        assert_eq!(RawAmount::Number(10.5).value(), Some(10.5));
        assert_eq!(RawAmount::Text(" 99.90 ".to_string()).value(), Some(99.9));
        assert_eq!(RawAmount::Number(0.0).value(), None);
        assert_eq!(RawAmount::Text("lots".to_string()).value(), None);
    }

    #[test]
    fn missing_fields_are_a_validation_error() {
        let req: CreatePaymentRequest = serde_json::from_value(json!({ "orderId": 3 })).unwrap();
        assert!(matches!(req.required(), Err(AppError::Validation(_))));

        let req: CreatePaymentRequest =
            serde_json::from_value(json!({ "orderId": "3", "amount": "25" })).unwrap();
        assert_eq!(req.required().unwrap(), (3, 25.0));
    }

    #[test]
    fn audit_headers_drop_credentials() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("10.0.0.1"));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer secret"));

        let recorded = headers_json(&headers);
        assert_eq!(recorded["x-forwarded-for"], "10.0.0.1");
        assert!(recorded.get("authorization").is_none());
    }
}
