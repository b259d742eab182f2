//! HS256 access tokens.

use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    pub email: String,
    pub exp: i64,
    pub iat: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token encoding failed: {0}")]
    Encode(jsonwebtoken::errors::Error),
    #[error("invalid or expired token")]
    Invalid,
}

/// Issue an access token for a user.
pub fn issue(
    user_id: &str,
    email: &str,
    secret: &str,
    expiry_minutes: i64,
) -> Result<String, TokenError> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id.to_string(),
        email: email.to_string(),
        exp: (now + Duration::minutes(expiry_minutes)).timestamp(),
        iat: now.timestamp(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(TokenError::Encode)
}

/// Decode and validate an access token.
pub fn verify(token: &str, secret: &str) -> Result<Claims, TokenError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| TokenError::Invalid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_and_verify() {
        let token = issue("u1", "a@b.c", "secret", 60).unwrap();
        let claims = verify(&token, "secret").unwrap();
        assert_eq!(claims.sub, "u1");
        assert_eq!(claims.email, "a@b.c");
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = issue("u1", "a@b.c", "secret", 60).unwrap();
        assert!(verify(&token, "other").is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let token = issue("u1", "a@b.c", "secret", -120).unwrap();
        assert!(verify(&token, "secret").is_err());
    }

    #[test]
    fn test_mangled_token_rejected() {
        assert!(verify("not.a.jwt", "secret").is_err());
    }
}
