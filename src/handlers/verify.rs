use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::response::ApiResponse;
use crate::services::email::EmailService;
use crate::services::verification::{ResendOutcome, VerificationService};
use crate::utils::parse_id;
use axum::{
    extract::Query,
    response::{IntoResponse, Redirect},
    Extension, Json,
};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Deserialize, IntoParams)]
pub struct VerifyLinkQuery {
    pub token: Option<String>,
    pub uid: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct EmailRequest {
    #[serde(default)]
    pub email: Option<String>,
}

/// Storefronts send the code either as typed text or as a number.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum OtpInput {
    Number(u64),
    Text(String),
}

impl OtpInput {
    fn into_code(self) -> String {
        match self {
            OtpInput::Number(n) => n.to_string(),
            OtpInput::Text(s) => s,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct OtpVerifyRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub otp: Option<OtpInput>,
}

fn required_email(email: Option<String>) -> AppResult<String> {
    email
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty())
        .ok_or_else(|| AppError::Validation("email required".to_string()))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VerificationStatus {
    pub ok: bool,
    /// Set when the account was already verified and nothing was sent
    pub already_verified: bool,
}

impl From<ResendOutcome> for VerificationStatus {
    fn from(outcome: ResendOutcome) -> Self {
        Self {
            ok: true,
            already_verified: outcome == ResendOutcome::AlreadyVerified,
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/auth/verify",
    params(VerifyLinkQuery),
    responses(
        (status = 303, description = "Verified, redirected to the storefront"),
        (status = 400, description = "Invalid or expired link", body = AppError),
        (status = 404, description = "User not found", body = AppError),
    ),
    tag = "verification"
)]
pub async fn verify_link(
    Extension(db): Extension<DatabaseConnection>,
    Extension(config): Extension<Arc<AppConfig>>,
    Query(query): Query<VerifyLinkQuery>,
) -> AppResult<impl IntoResponse> {
    let (Some(token), Some(uid)) = (query.token, query.uid) else {
        return Err(AppError::Validation("Invalid link".to_string()));
    };
    let user_id = parse_id(&uid, "uid")?;

    let frontend_root = config.server.frontend_url("/");
    VerificationService::new(db, config)
        .verify_link(user_id, &token)
        .await?;

    Ok(Redirect::to(&frontend_root))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/verify/resend",
    request_body = EmailRequest,
    responses(
        (status = 200, description = "Link sent, or already verified", body = VerificationStatus),
        (status = 404, description = "User not found", body = AppError),
        (status = 502, description = "Email could not be sent", body = AppError),
    ),
    tag = "verification"
)]
pub async fn resend_verification(
    Extension(db): Extension<DatabaseConnection>,
    Extension(config): Extension<Arc<AppConfig>>,
    Extension(email_service): Extension<EmailService>,
    Json(payload): Json<EmailRequest>,
) -> AppResult<impl IntoResponse> {
    let email = required_email(payload.email)?;
    let outcome = VerificationService::new(db, config)
        .resend(&email, &email_service)
        .await?;

    let message = match outcome {
        ResendOutcome::AlreadyVerified => "already verified",
        ResendOutcome::Sent => "Verification email sent",
    };
    Ok(ApiResponse::with_message(VerificationStatus::from(outcome), message))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/otp/send",
    request_body = EmailRequest,
    responses(
        (status = 200, description = "Code sent, or already verified", body = VerificationStatus),
        (status = 404, description = "User not found", body = AppError),
        (status = 502, description = "Email could not be sent", body = AppError),
    ),
    tag = "verification"
)]
pub async fn send_otp(
    Extension(db): Extension<DatabaseConnection>,
    Extension(config): Extension<Arc<AppConfig>>,
    Extension(email_service): Extension<EmailService>,
    Json(payload): Json<EmailRequest>,
) -> AppResult<impl IntoResponse> {
    let email = required_email(payload.email)?;
    let outcome = VerificationService::new(db, config)
        .send_otp(&email, &email_service)
        .await?;

    Ok(ApiResponse::ok(VerificationStatus::from(outcome)))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/otp/verify",
    request_body = OtpVerifyRequest,
    responses(
        (status = 200, description = "Email verified", body = VerificationStatus),
        (status = 400, description = "Invalid or expired code", body = AppError),
        (status = 404, description = "User not found", body = AppError),
    ),
    tag = "verification"
)]
pub async fn verify_otp(
    Extension(db): Extension<DatabaseConnection>,
    Extension(config): Extension<Arc<AppConfig>>,
    Json(payload): Json<OtpVerifyRequest>,
) -> AppResult<impl IntoResponse> {
    let (Some(email), Some(otp)) = (payload.email, payload.otp) else {
        return Err(AppError::Validation("email and otp are required".to_string()));
    };
    VerificationService::new(db, config)
        .verify_otp(&email, &otp.into_code())
        .await?;

    Ok(ApiResponse::ok(VerificationStatus {
        ok: true,
        already_verified: false,
    }))
}
