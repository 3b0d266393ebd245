//! Session tokens for the in-memory identity provider (HS256 JWT)

use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::types::{AccessToken, User};

/// JWT Claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id)
    pub sub: String,
    pub email: String,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
    /// Issued at (Unix timestamp)
    pub iat: u64,
}

/// Signs and validates session tokens
pub struct TokenIssuer {
    /// Secret key for signing tokens
    secret: String,
    /// Token expiration duration
    expiration: Duration,
}

impl TokenIssuer {
    pub fn new(secret: String, expiration_hours: u64) -> Self {
        Self {
            secret,
            expiration: Duration::from_secs(expiration_hours * 3600),
        }
    }

    /// Create a session token for a user
    pub fn issue(&self, user: &User) -> Result<AccessToken, jsonwebtoken::errors::Error> {
        let now = Utc::now().timestamp().max(0) as u64;

        let claims = Claims {
            sub: user.id.clone(),
            email: user.email.clone(),
            exp: now + self.expiration.as_secs(),
            iat: now,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map(AccessToken::new)
    }

    /// Validate a session token and extract claims
    pub fn validate(&self, token: &AccessToken) -> Result<Claims, jsonwebtoken::errors::Error> {
        let token_data = decode::<Claims>(
            token.as_str(),
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )?;

        Ok(token_data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User {
            id: "user-1".to_string(),
            email: "admin@example.com".to_string(),
        }
    }

    #[test]
    fn test_issue_and_validate_token() {
        let issuer = TokenIssuer::new("test-secret".to_string(), 1);

        let token = issuer.issue(&user()).unwrap();
        let claims = issuer.validate(&token).unwrap();
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.email, "admin@example.com");
    }

    #[test]
    fn test_token_from_other_secret_rejected() {
        let issuer = TokenIssuer::new("test-secret".to_string(), 1);
        let other = TokenIssuer::new("other-secret".to_string(), 1);

        let token = other.issue(&user()).unwrap();
        assert!(issuer.validate(&token).is_err());
        assert!(issuer.validate(&AccessToken::new("invalid-token")).is_err());
    }
}
