use crate::{
    config::AppConfig,
    error::{AppError, AppResult},
    models::{user, User, UserModel},
    services::{email::EmailService, verification::VerificationService},
    utils::{
        encode_token, hash_password,
        password::{check_password, PasswordCheck},
    },
};
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use std::sync::Arc;

/// Which branch a combined login-or-signup request took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthAction {
    Login,
    Signup,
}

impl AuthAction {
    pub fn as_str(self) -> &'static str {
        match self {
            AuthAction::Login => "login",
            AuthAction::Signup => "signup",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetOutcome {
    Updated,
    Created,
}

pub struct AuthService {
    db: DatabaseConnection,
    config: Arc<AppConfig>,
}

impl AuthService {
    pub fn new(db: DatabaseConnection, config: Arc<AppConfig>) -> Self {
        Self { db, config }
    }

    /// Register a new user and send a verification link (best-effort).
    /// Returns (user_model, token).
    pub async fn signup(
        &self,
        username: &str,
        email: &str,
        password: &str,
        email_service: &EmailService,
    ) -> AppResult<(UserModel, String)> {
        let email = normalize_email(email)?;
        require_password(password)?;

        if self.find_by_email(&email).await?.is_some() {
            return Err(AppError::Validation("User already exists".to_string()));
        }

        let user = self.create_user(username, &email, password).await?;
        let token = self.issue_token(&user)?;

        // Verification is optional for using the account, so a failure here
        // only gets logged.
        let verification = VerificationService::new(self.db.clone(), self.config.clone());
        match verification.issue_link(user.id).await {
            Ok(link) => email_service
                .send_verification_link(&user.email, &user.username, &link)
                .await
                .log("signup verification"),
            Err(e) => tracing::warn!("Failed to issue verification token for {}: {e}", user.id),
        }

        Ok((user, token))
    }

    /// Login user
    /// Returns (user_model, token)
    pub async fn login(&self, email: &str, password: &str) -> AppResult<(UserModel, String)> {
        let email = normalize_email(email)?;
        let user = self
            .find_by_email(&email)
            .await?
            .ok_or(AppError::NotFound("User"))?;

        let user = match check_password(password, &user.password_hash)? {
            PasswordCheck::Match => user,
            PasswordCheck::LegacyMatch => self.upgrade_legacy(user, password).await,
            PasswordCheck::Mismatch => {
                return Err(AppError::Validation("Invalid password".to_string()))
            }
        };

        let token = self.issue_token(&user)?;
        Ok((user, token))
    }

    /// Log in when the email is known, otherwise create the account.
    pub async fn login_or_signup(
        &self,
        email: &str,
        password: &str,
        email_service: &EmailService,
    ) -> AppResult<(UserModel, String, AuthAction)> {
        let normalized = normalize_email(email)?;
        if self.find_by_email(&normalized).await?.is_some() {
            let (user, token) = self.login(&normalized, password).await?;
            return Ok((user, token, AuthAction::Login));
        }

        let (user, token) = self
            .signup(&username_from_email(&normalized), &normalized, password, email_service)
            .await?;
        Ok((user, token, AuthAction::Signup))
    }

    /// Set a new password, creating the account if the email is unknown.
    pub async fn reset(
        &self,
        email: &str,
        new_password: &str,
    ) -> AppResult<(UserModel, String, ResetOutcome)> {
        let email = normalize_email(email)?;
        require_password(new_password)?;

        let (user, outcome) = match self.find_by_email(&email).await? {
            Some(existing) => {
                let mut active: user::ActiveModel = existing.into();
                active.password_hash = sea_orm::ActiveValue::Set(hash_password(new_password)?);
                active.updated_at = sea_orm::ActiveValue::Set(chrono::Utc::now().naive_utc());
                (active.update(&self.db).await?, ResetOutcome::Updated)
            }
            None => {
                let user = self
                    .create_user(&username_from_email(&email), &email, new_password)
                    .await?;
                (user, ResetOutcome::Created)
            }
        };

        let token = self.issue_token(&user)?;
        Ok((user, token, outcome))
    }

    pub async fn get_user_by_id(&self, user_id: i32) -> AppResult<UserModel> {
        User::find_by_id(user_id)
            .one(&self.db)
            .await?
            .ok_or(AppError::NotFound("User"))
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<UserModel>> {
        Ok(User::find()
            .filter(user::Column::Email.eq(email))
            .one(&self.db)
            .await?)
    }

    async fn create_user(&self, username: &str, email: &str, password: &str) -> AppResult<UserModel> {
        let password_hash = hash_password(password)?;
        let now = chrono::Utc::now().naive_utc();
        let username = match username.trim() {
            "" => username_from_email(email),
            name => name.to_string(),
        };

        let new_user = user::ActiveModel {
            username: sea_orm::ActiveValue::Set(username),
            email: sea_orm::ActiveValue::Set(email.to_string()),
            password_hash: sea_orm::ActiveValue::Set(password_hash),
            role: sea_orm::ActiveValue::Set(user::ROLE_USER.to_string()),
            verified: sea_orm::ActiveValue::Set(false),
            created_at: sea_orm::ActiveValue::Set(now),
            updated_at: sea_orm::ActiveValue::Set(now),
            ..Default::default()
        };

        Ok(new_user.insert(&self.db).await?)
    }

    /// Rows carried over from the old store keep plaintext passwords and may
    /// lack a username. Both are fixed on the first good login; a failed
    /// write leaves the login itself intact.
    async fn upgrade_legacy(&self, user: UserModel, password: &str) -> UserModel {
        let hash = match hash_password(password) {
            Ok(hash) => hash,
            Err(e) => {
                tracing::warn!("Could not rehash legacy password for {}: {e}", user.id);
                return user;
            }
        };

        let fallback = user.clone();
        let needs_username = user.username.trim().is_empty();
        let username = username_from_email(&user.email);
        let mut active: user::ActiveModel = user.into();
        active.password_hash = sea_orm::ActiveValue::Set(hash);
        if needs_username {
            active.username = sea_orm::ActiveValue::Set(username);
        }
        active.updated_at = sea_orm::ActiveValue::Set(chrono::Utc::now().naive_utc());

        match active.update(&self.db).await {
            Ok(updated) => {
                tracing::info!("Migrated legacy password for user {}", updated.id);
                updated
            }
            Err(e) => {
                tracing::warn!("Failed to migrate legacy password for {}: {e}", fallback.id);
                fallback
            }
        }
    }

    fn issue_token(&self, user: &UserModel) -> AppResult<String> {
        Ok(encode_token(&self.config.jwt, user.id, &user.email)?)
    }
}

fn normalize_email(email: &str) -> AppResult<String> {
    let email = email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::Validation("A valid email is required".to_string()));
    }
    Ok(email.to_string())
}

fn require_password(password: &str) -> AppResult<()> {
    if password.is_empty() {
        return Err(AppError::Validation("Password is required".to_string()));
    }
    Ok(())
}

/// `jane.doe@example.com` -> `jane.doe`
pub fn username_from_email(email: &str) -> String {
    email.split('@').next().unwrap_or(email).to_string()
}
