use crate::config::jwt::JwtConfig;
use anyhow::Result;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user_id
    pub email: String,
    pub exp: usize, // expiration time
    pub iat: usize, // issued at
}

impl Claims {
    pub fn user_id(&self) -> Option<i32> {
        self.sub.parse().ok()
    }
}

pub fn encode_token(config: &JwtConfig, user_id: i32, email: &str) -> Result<String> {
    let now = chrono::Utc::now().timestamp() as usize;
    let claims = Claims {
        sub: user_id.to_string(),
        email: email.to_owned(),
        exp: now + config.token_expiry as usize,
        iat: now,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.secret.as_bytes()),
    )
    .map_err(|e| anyhow::anyhow!("Failed to encode token: {}", e))
}

pub fn decode_jwt(config: &JwtConfig, token: &str) -> Result<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| anyhow::anyhow!("Failed to decode JWT: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> JwtConfig {
        JwtConfig::new(
            "a_very_long_secret_key_that_is_at_least_32_chars".to_string(),
            3600,
        )
        .unwrap()
    }

    #[test]
    fn encode_decode_round_trip() {
        let config = config();
        let token = encode_token(&config, 42, "alice@example.com").unwrap();
        let claims = decode_jwt(&config, &token).unwrap();
        assert_eq!(claims.user_id(), Some(42));
        assert_eq!(claims.email, "alice@example.com");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn token_from_other_secret_fails() {
        let other = JwtConfig::new("b".repeat(40), 3600).unwrap();
        let token = encode_token(&other, 1, "x@example.com").unwrap();
        assert!(decode_jwt(&config(), &token).is_err());
    }

    #[test]
    fn tampered_token_fails() {
        let config = config();
        let token = encode_token(&config, 42, "alice@example.com").unwrap();
        // Flip a character in the middle of the token
        let mut chars: Vec<char> = token.chars().collect();
        let mid = chars.len() / 2;
        chars[mid] = if chars[mid] == 'A' { 'B' } else { 'A' };
        let tampered: String = chars.into_iter().collect();
        assert!(decode_jwt(&config, &tampered).is_err());
    }

    #[test]
    fn expired_token_fails() {
        let config = config();
        let now = chrono::Utc::now().timestamp() as usize;
        let claims = Claims {
            sub: "42".to_string(),
            email: "alice@example.com".to_string(),
            exp: now - 3600, // expired 1 hour ago
            iat: now - 7200,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.secret.as_bytes()),
        )
        .unwrap();
        assert!(decode_jwt(&config, &token).is_err());
    }

    #[test]
    fn empty_token_fails() {
        assert!(decode_jwt(&config(), "").is_err());
    }
}
