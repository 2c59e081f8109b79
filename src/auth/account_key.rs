use rand::{distributions::Alphanumeric, Rng};
use sha2::{Digest, Sha256};

use crate::errors::{AppError, Result};

const KEY_PREFIX: &str = "fk_";
const KEY_LEN: usize = 35; // 'fk_' + 32 characters

/// Long-lived account keys. Only the SHA-256 of a key is ever persisted, so
/// a key is recoverable exactly once: at the moment it is generated.
pub struct AccountKeyService;

impl AccountKeyService {
    pub fn generate() -> String {
        let key: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();

        format!("{}{}", KEY_PREFIX, key)
    }

    pub fn hash(key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn validate_format(key: &str) -> Result<()> {
        if !key.starts_with(KEY_PREFIX) {
            return Err(AppError::Validation(format!(
                "API key must start with '{}'",
                KEY_PREFIX
            )));
        }

        if key.len() != KEY_LEN {
            return Err(AppError::Validation(format!(
                "API key must be {} characters long",
                KEY_LEN
            )));
        }

        let key_part = &key[KEY_PREFIX.len()..];
        if !key_part.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(AppError::Validation(
                "API key contains invalid characters".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_key_is_well_formed() {
        let key = AccountKeyService::generate();
        assert!(key.starts_with("fk_"));
        assert_eq!(key.len(), 35);
        assert!(AccountKeyService::validate_format(&key).is_ok());
    }

    #[test]
    fn test_generated_keys_are_unique() {
        let a = AccountKeyService::generate();
        let b = AccountKeyService::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn test_hash_is_deterministic() {
        let key = "fk_test1234567890123456789012345678";
        let h1 = AccountKeyService::hash(key);
        let h2 = AccountKeyService::hash(key);

        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64); // sha256 hex
    }

    #[test]
    fn test_format_validation() {
        assert!(AccountKeyService::validate_format("fk_test1234567890123456789012345678").is_ok());
        assert!(AccountKeyService::validate_format("invalid_key").is_err());
        assert!(AccountKeyService::validate_format("fk_short").is_err());
        assert!(AccountKeyService::validate_format("fk_test123456789012345678901234567!").is_err());
    }
}
