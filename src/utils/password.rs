use anyhow::{Context, Result};
use subtle::ConstantTimeEq;

const BCRYPT_COST: u32 = 10;

/// Hash a password using bcrypt
pub fn hash_password(password: &str) -> Result<String> {
    bcrypt::hash(password, BCRYPT_COST).context("Failed to hash password")
}

/// Verify a password against a hash
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    bcrypt::verify(password, hash).context("Failed to verify password")
}

/// Rows imported from the old store may still hold the password itself.
pub fn is_bcrypt_hash(stored: &str) -> bool {
    ["$2a$", "$2b$", "$2y$"]
        .iter()
        .any(|prefix| stored.starts_with(prefix))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordCheck {
    Mismatch,
    Match,
    /// Plaintext match; the caller should store a fresh hash.
    LegacyMatch,
}

pub fn check_password(password: &str, stored: &str) -> Result<PasswordCheck> {
    if is_bcrypt_hash(stored) {
        return Ok(if verify_password(password, stored)? {
            PasswordCheck::Match
        } else {
            PasswordCheck::Mismatch
        });
    }

    if bool::from(password.as_bytes().ct_eq(stored.as_bytes())) {
        Ok(PasswordCheck::LegacyMatch)
    } else {
        Ok(PasswordCheck::Mismatch)
    }
}
