use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;
use crate::models::UserModel;
use crate::response::ApiResponse;
use crate::services::auth::{AuthService, ResetOutcome};
use crate::services::email::EmailService;
use axum::{response::IntoResponse, Extension, Json};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    /// Display name; defaults to the local part of the email
    #[serde(default)]
    #[validate(length(max = 50))]
    pub username: Option<String>,
    /// Email address
    #[serde(default)]
    #[validate(email)]
    pub email: String,
    /// Password
    #[serde(default)]
    #[validate(length(min = 1))]
    pub password: String,
}

/// Missing fields arrive empty and are rejected by the service with a 400.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResetRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub new_password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserResponse {
    pub id: i32,
    pub username: String,
    pub email: String,
    /// `user` or `admin`
    pub role: String,
    /// Whether the email address has been confirmed
    pub verified: bool,
    pub created_at: String,
}

impl From<UserModel> for UserResponse {
    fn from(user: UserModel) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            role: user.role,
            verified: user.verified,
            created_at: user.created_at.to_string(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuthResponse {
    /// JWT bearer token
    pub token: String,
    pub user: UserResponse,
    /// `login` or `signup`, only for the combined endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

impl AuthResponse {
    fn new(user: UserModel, token: String) -> Self {
        Self {
            token,
            user: user.into(),
            action: None,
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/signup",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "User created", body = AuthResponse),
        (status = 400, description = "Validation error or user already exists", body = AppError),
    ),
    tag = "auth"
)]
pub async fn signup(
    Extension(db): Extension<DatabaseConnection>,
    Extension(config): Extension<Arc<AppConfig>>,
    Extension(email_service): Extension<EmailService>,
    Json(payload): Json<SignupRequest>,
) -> AppResult<impl IntoResponse> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(format!("Validation error: {e}")))?;

    let service = AuthService::new(db, config);
    let (user, token) = service
        .signup(
            payload.username.as_deref().unwrap_or_default(),
            &payload.email,
            &payload.password,
            &email_service,
        )
        .await?;

    Ok(ApiResponse::with_message(
        AuthResponse::new(user, token),
        "Signup successful. Check your email to verify your account.",
    )
    .created())
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 400, description = "Invalid password", body = AppError),
        (status = 404, description = "User not found", body = AppError),
    ),
    tag = "auth"
)]
pub async fn login(
    Extension(db): Extension<DatabaseConnection>,
    Extension(config): Extension<Arc<AppConfig>>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<impl IntoResponse> {
    let service = AuthService::new(db, config);
    let (user, token) = service.login(&payload.email, &payload.password).await?;

    Ok(ApiResponse::ok(AuthResponse::new(user, token)))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/login-signup",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in to an existing account", body = AuthResponse),
        (status = 201, description = "Account created", body = AuthResponse),
        (status = 400, description = "Invalid password", body = AppError),
    ),
    tag = "auth"
)]
pub async fn login_or_signup(
    Extension(db): Extension<DatabaseConnection>,
    Extension(config): Extension<Arc<AppConfig>>,
    Extension(email_service): Extension<EmailService>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<impl IntoResponse> {
    let service = AuthService::new(db, config);
    let (user, token, action) = service
        .login_or_signup(&payload.email, &payload.password, &email_service)
        .await?;

    let mut response = AuthResponse::new(user, token);
    response.action = Some(action.as_str().to_string());

    let status = match action {
        crate::services::auth::AuthAction::Login => axum::http::StatusCode::OK,
        crate::services::auth::AuthAction::Signup => axum::http::StatusCode::CREATED,
    };
    Ok((status, ApiResponse::ok(response)))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/reset",
    request_body = ResetRequest,
    responses(
        (status = 200, description = "Password updated", body = AuthResponse),
        (status = 201, description = "Unknown email, account created", body = AuthResponse),
        (status = 400, description = "Validation error", body = AppError),
    ),
    tag = "auth"
)]
pub async fn reset_password(
    Extension(db): Extension<DatabaseConnection>,
    Extension(config): Extension<Arc<AppConfig>>,
    Json(payload): Json<ResetRequest>,
) -> AppResult<impl IntoResponse> {
    let service = AuthService::new(db, config);
    let (user, token, outcome) = service.reset(&payload.email, &payload.new_password).await?;

    let response = AuthResponse::new(user, token);
    Ok(match outcome {
        ResetOutcome::Updated => {
            (axum::http::StatusCode::OK, ApiResponse::with_message(response, "Password updated"))
        }
        ResetOutcome::Created => ApiResponse::with_message(response, "User created").created(),
    })
}

#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    security(("jwt_token" = [])),
    responses(
        (status = 200, description = "Current user retrieved successfully", body = UserResponse),
        (status = 401, description = "Unauthorized", body = AppError),
    ),
    tag = "auth"
)]
pub async fn get_current_user(
    Extension(db): Extension<DatabaseConnection>,
    Extension(config): Extension<Arc<AppConfig>>,
    auth_user: AuthUser,
) -> AppResult<impl IntoResponse> {
    let service = AuthService::new(db, config);
    let user = service.get_user_by_id(auth_user.user_id).await?;

    Ok(ApiResponse::ok(UserResponse::from(user)))
}
