use crate::error::{AppError, AppResult};
use serde::Deserialize;
use utoipa::ToSchema;

/// Identifier as it arrives from the storefront: a JSON number or a string.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum RawId {
    Number(i64),
    Text(String),
}

impl RawId {
    /// Parse into a row id, rejecting anything that is not a positive integer.
    pub fn parse(&self, field: &str) -> AppResult<i32> {
        let parsed = match self {
            RawId::Number(n) => i32::try_from(*n).ok(),
            RawId::Text(s) => s.trim().parse::<i32>().ok(),
        };

        parsed
            .filter(|id| *id > 0)
            .ok_or_else(|| AppError::Validation(format!("{field} is not a valid identifier")))
    }
}

pub fn parse_id(raw: &str, field: &str) -> AppResult<i32> {
    RawId::Text(raw.to_string()).parse(field)
}
