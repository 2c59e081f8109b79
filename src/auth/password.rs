use bcrypt::{hash, verify, DEFAULT_COST};

use crate::errors::{AppError, Result};

pub fn hash_password(password: &str) -> Result<String> {
    hash(password, DEFAULT_COST)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("failed to hash password: {e}")))
}

pub fn verify_password(password: &str, password_hash: &str) -> bool {
    verify(password, password_hash).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hashed = hash_password("Sup3r$ecret").unwrap();
        assert_ne!(hashed, "Sup3r$ecret");
        assert!(verify_password("Sup3r$ecret", &hashed));
        assert!(!verify_password("wrong", &hashed));
    }

    #[test]
    fn test_verify_with_malformed_hash() {
        assert!(!verify_password("anything", "not-a-bcrypt-hash"));
    }
}
