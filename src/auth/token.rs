use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{AppError, Result};

pub const TOKEN_ISSUER: &str = "forge-uploader";

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // identity id
    pub email: String,
    pub exp: i64,
    pub iat: i64,
    pub iss: String,
}

/// Stateless signed session tokens. Revocation is only implicit: expiry, or
/// rotating the signing secret (which invalidates everything outstanding).
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validity: Duration,
}

impl TokenCodec {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_ref()),
            decoding_key: DecodingKey::from_secret(secret.as_ref()),
            validity: Duration::hours(24),
        }
    }

    pub fn issue(&self, user_id: Uuid, email: &str) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            email: email.to_string(),
            exp: (now + self.validity).timestamp(),
            iat: now.timestamp(),
            iss: TOKEN_ISSUER.to_string(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("failed to sign session token: {e}")))
    }

    /// Rejects bad signatures, malformed tokens, expired tokens and tokens
    /// issued in the future. Zero clock-skew tolerance.
    pub fn verify(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::default();
        validation.leeway = 0;
        validation.set_issuer(&[TOKEN_ISSUER]);

        let token_data = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|_| AppError::Unauthenticated)?;

        if token_data.claims.iat > Utc::now().timestamp() {
            return Err(AppError::Unauthenticated);
        }

        Ok(token_data.claims)
    }
}
