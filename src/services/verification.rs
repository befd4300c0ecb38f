use crate::{
    config::AppConfig,
    error::{AppError, AppResult},
    models::{user, verification_token, User, UserModel, VerificationToken},
    services::email::{Delivery, EmailService},
    utils::token::{link_token, otp_code},
};
use chrono::Duration;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, TransactionTrait,
};
use std::sync::Arc;

const LINK_TTL_HOURS: i64 = 24;
const OTP_TTL_MINUTES: i64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResendOutcome {
    AlreadyVerified,
    Sent,
}

pub struct VerificationService {
    db: DatabaseConnection,
    config: Arc<AppConfig>,
}

impl VerificationService {
    pub fn new(db: DatabaseConnection, config: Arc<AppConfig>) -> Self {
        Self { db, config }
    }

    /// Issue a fresh link token and build the URL the user clicks.
    pub async fn issue_link(&self, user_id: i32) -> AppResult<String> {
        let token = link_token();
        self.issue(user_id, &token, Duration::hours(LINK_TTL_HOURS))
            .await?;
        Ok(self.link_for(&token, user_id))
    }

    pub fn link_for(&self, token: &str, user_id: i32) -> String {
        format!(
            "{}/api/v1/auth/verify?token={}&uid={}",
            self.config.server.backend_base_url,
            utf8_percent_encode(token, NON_ALPHANUMERIC),
            user_id
        )
    }

    /// Older unconsumed tokens for the user are retired first, so only the
    /// newest one can ever succeed.
    async fn issue(&self, user_id: i32, token: &str, ttl: Duration) -> AppResult<()> {
        let now = chrono::Utc::now().naive_utc();
        let txn = self.db.begin().await?;

        retire_tokens(&txn, user_id).await?;

        verification_token::ActiveModel {
            user_id: sea_orm::ActiveValue::Set(user_id),
            token: sea_orm::ActiveValue::Set(token.to_string()),
            expires_at: sea_orm::ActiveValue::Set(now + ttl),
            consumed: sea_orm::ActiveValue::Set(false),
            created_at: sea_orm::ActiveValue::Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;
        Ok(())
    }

    /// Consume a matching live token and mark the user verified.
    async fn consume(&self, user_id: i32, token: &str) -> AppResult<UserModel> {
        let now = chrono::Utc::now().naive_utc();
        let txn = self.db.begin().await?;

        let record = VerificationToken::find()
            .filter(verification_token::Column::UserId.eq(user_id))
            .filter(verification_token::Column::Token.eq(token))
            .filter(verification_token::Column::Consumed.eq(false))
            .filter(verification_token::Column::ExpiresAt.gt(now))
            .order_by_desc(verification_token::Column::CreatedAt)
            .order_by_desc(verification_token::Column::Id)
            .one(&txn)
            .await?
            .ok_or_else(|| AppError::Validation("Invalid or expired token".to_string()))?;

        let user = User::find_by_id(user_id)
            .one(&txn)
            .await?
            .ok_or(AppError::NotFound("User"))?;

        let mut active_token: verification_token::ActiveModel = record.into();
        active_token.consumed = sea_orm::ActiveValue::Set(true);
        active_token.update(&txn).await?;

        let mut active_user: user::ActiveModel = user.into();
        active_user.verified = sea_orm::ActiveValue::Set(true);
        active_user.updated_at = sea_orm::ActiveValue::Set(now);
        let user = active_user.update(&txn).await?;

        txn.commit().await?;
        tracing::info!("User {} verified their email", user.id);
        Ok(user)
    }

    pub async fn verify_link(&self, user_id: i32, token: &str) -> AppResult<UserModel> {
        if token.is_empty() {
            return Err(AppError::Validation("Missing token or uid".to_string()));
        }
        self.consume(user_id, token).await
    }

    pub async fn resend(&self, email: &str, email_service: &EmailService) -> AppResult<ResendOutcome> {
        let user = self.find_by_email(email).await?;
        if user.verified {
            return Ok(ResendOutcome::AlreadyVerified);
        }

        let link = self.issue_link(user.id).await?;
        let delivery = email_service
            .send_verification_link(&user.email, &user.username, &link)
            .await;
        require_delivery(delivery, "verification email")?;
        Ok(ResendOutcome::Sent)
    }

    pub async fn send_otp(&self, email: &str, email_service: &EmailService) -> AppResult<ResendOutcome> {
        let user = self.find_by_email(email).await?;
        if user.verified {
            return Ok(ResendOutcome::AlreadyVerified);
        }

        let code = otp_code()?;
        self.issue(user.id, &code, Duration::minutes(OTP_TTL_MINUTES))
            .await?;

        let delivery = email_service
            .send_otp(&user.email, &user.username, &code)
            .await;
        require_delivery(delivery, "one-time code")?;
        Ok(ResendOutcome::Sent)
    }

    pub async fn verify_otp(&self, email: &str, otp: &str) -> AppResult<UserModel> {
        let otp = otp.trim();
        if otp.is_empty() {
            return Err(AppError::Validation("email and otp are required".to_string()));
        }
        let user = self.find_by_email(email).await?;
        self.consume(user.id, otp).await
    }

    async fn find_by_email(&self, email: &str) -> AppResult<UserModel> {
        let email = email.trim();
        if email.is_empty() {
            return Err(AppError::Validation("Email is required".to_string()));
        }
        User::find()
            .filter(user::Column::Email.eq(email))
            .one(&self.db)
            .await?
            .ok_or(AppError::NotFound("User"))
    }
}

async fn retire_tokens<C: ConnectionTrait>(conn: &C, user_id: i32) -> AppResult<()> {
    VerificationToken::update_many()
        .col_expr(
            verification_token::Column::Consumed,
            sea_orm::sea_query::Expr::value(true),
        )
        .filter(verification_token::Column::UserId.eq(user_id))
        .filter(verification_token::Column::Consumed.eq(false))
        .exec(conn)
        .await?;
    Ok(())
}

/// For these endpoints the email is the whole request: no send, no success.
fn require_delivery(delivery: Delivery, what: &str) -> AppResult<()> {
    match delivery {
        Delivery::Sent => Ok(()),
        Delivery::Skipped => Err(AppError::Gateway(format!(
            "Email is not configured; could not send {what}"
        ))),
        Delivery::Failed(e) => Err(AppError::Gateway(format!("Failed to send {what}: {e}"))),
    }
}
