use anyhow::Result;

/// Opaque token for emailed verification links.
pub fn link_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Six digit one-time code, never with a leading zero.
pub fn otp_code() -> Result<String> {
    let mut buf = [0u8; 4];
    getrandom::getrandom(&mut buf)
        .map_err(|e| anyhow::anyhow!("Failed to read OS randomness: {}", e))?;
    let n = u32::from_le_bytes(buf) % 900_000;
    Ok((100_000 + n).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn otp_is_six_digits() {
        for _ in 0..50 {
            let code = otp_code().unwrap();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
            assert_ne!(code.chars().next(), Some('0'));
        }
    }

    #[test]
    fn link_tokens_differ() {
        let a = link_token();
        assert_eq!(a.len(), 32);
        assert_ne!(a, link_token());
    }
}
