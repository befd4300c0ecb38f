use crate::config::{optional_env, parse_bool_env};
use crate::error::AppResult;
use crate::models::{user, User};
use crate::utils::hash_password;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};

#[derive(Clone)]
pub struct BootstrapAdminConfig {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for BootstrapAdminConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BootstrapAdminConfig")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &"***")
            .finish()
    }
}

impl BootstrapAdminConfig {
    pub fn from_env() -> Option<Self> {
        if !parse_bool_env("BOOTSTRAP_ADMIN_ENABLED", false) {
            return None;
        }

        let config = Self {
            username: optional_env("BOOTSTRAP_ADMIN_USERNAME")?,
            email: optional_env("BOOTSTRAP_ADMIN_EMAIL")?,
            password: optional_env("BOOTSTRAP_ADMIN_PASSWORD")?,
        };
        Some(config)
    }
}

/// Make sure an operator account exists at startup:
/// - any existing admin: nothing to do
/// - the configured email or username exists: promote it
/// - otherwise: create a verified admin
pub async fn ensure_bootstrap_admin(
    db: &DatabaseConnection,
    config: Option<&BootstrapAdminConfig>,
) -> AppResult<()> {
    let Some(cfg) = config else {
        return Ok(());
    };

    let admin_exists = User::find()
        .filter(user::Column::Role.eq(user::ROLE_ADMIN))
        .one(db)
        .await?
        .is_some();
    if admin_exists {
        return Ok(());
    }

    let existing = User::find()
        .filter(
            sea_orm::Condition::any()
                .add(user::Column::Email.eq(cfg.email.clone()))
                .add(user::Column::Username.eq(cfg.username.clone())),
        )
        .one(db)
        .await?;

    let now = chrono::Utc::now().naive_utc();

    if let Some(existing) = existing {
        let id = existing.id;
        let mut active: user::ActiveModel = existing.into();
        active.role = sea_orm::ActiveValue::Set(user::ROLE_ADMIN.to_string());
        active.updated_at = sea_orm::ActiveValue::Set(now);
        active.update(db).await?;
        tracing::info!("Promoted user {} to admin", id);
        return Ok(());
    }

    let new_admin = user::ActiveModel {
        username: sea_orm::ActiveValue::Set(cfg.username.clone()),
        email: sea_orm::ActiveValue::Set(cfg.email.clone()),
        password_hash: sea_orm::ActiveValue::Set(hash_password(&cfg.password)?),
        role: sea_orm::ActiveValue::Set(user::ROLE_ADMIN.to_string()),
        verified: sea_orm::ActiveValue::Set(true),
        created_at: sea_orm::ActiveValue::Set(now),
        updated_at: sea_orm::ActiveValue::Set(now),
        ..Default::default()
    };

    let admin = new_admin.insert(db).await?;
    tracing::info!("Created bootstrap admin {}", admin.email);
    Ok(())
}
