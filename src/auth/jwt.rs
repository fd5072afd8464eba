//! Session token generation and validation
//!
//! Issues HS256 JWTs for validated SEP-10 challenges and parses them back
//! for downstream request authentication.

use std::fmt;

use jsonwebtoken::errors::ErrorKind as JwtErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// JWT-related errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtError {
    #[error("JWT secret is required to have at least {0} characters")]
    InvalidSecret(usize),

    #[error("Invalid token claims: {0}")]
    InvalidClaims(String),

    #[error("Token encoding failed: {0}")]
    EncodingFailed(String),

    #[error("Token decoding failed: {0}")]
    DecodingFailed(String),

    #[error("Token expired")]
    TokenExpired,
}

/// JWT claims of a SEP-10 session token
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Sep10Claims {
    /// Issuer, `<scheme>://<home_domain>/auth`
    pub iss: String,
    /// Account id, or `account:memo` for memo-identified users
    pub sub: String,
    /// Hex hash of the challenge transaction
    pub jti: String,
    /// Start of the challenge time bounds (Unix timestamp)
    pub iat: i64,
    /// Expiration (Unix timestamp)
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home_domain: Option<String>,
}

impl Sep10Claims {
    pub fn validate(&self) -> Result<(), JwtError> {
        if self.iss.trim().is_empty() {
            return Err(JwtError::InvalidClaims("issuer is required".to_string()));
        }
        if self.sub.trim().is_empty() {
            return Err(JwtError::InvalidClaims("subject is required".to_string()));
        }
        if self.jti.trim().is_empty() {
            return Err(JwtError::InvalidClaims(
                "jti (JWT ID) is required".to_string(),
            ));
        }
        if self.exp <= self.iat {
            return Err(JwtError::InvalidClaims(
                "exp must be after iat".to_string(),
            ));
        }
        if matches!(&self.client_domain, Some(d) if d.trim().is_empty()) {
            return Err(JwtError::InvalidClaims(
                "client_domain cannot be empty if provided".to_string(),
            ));
        }
        if matches!(&self.home_domain, Some(d) if d.trim().is_empty()) {
            return Err(JwtError::InvalidClaims(
                "home_domain cannot be empty if provided".to_string(),
            ));
        }
        Ok(())
    }
}

/// Signs session tokens for validated challenges
pub trait TokenSigner: Send + Sync {
    fn issue(&self, claims: &Sep10Claims) -> Result<String, JwtError>;
}

/// HS256 token manager
#[derive(Clone)]
pub struct JwtManager {
    secret: String,
}

impl JwtManager {
    pub const MIN_SECRET_LEN: usize = 12;

    pub fn new(secret: impl Into<String>) -> Result<Self, JwtError> {
        let secret = secret.into();
        if secret.len() < Self::MIN_SECRET_LEN {
            return Err(JwtError::InvalidSecret(Self::MIN_SECRET_LEN));
        }
        Ok(Self { secret })
    }

    /// Verify a session token and return its claims
    pub fn parse_sep10_claims(&self, token: &str) -> Result<Sep10Claims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);

        let token_data = decode::<Sep10Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )
        .map_err(|e| match e.kind() {
            JwtErrorKind::ExpiredSignature => JwtError::TokenExpired,
            _ => JwtError::DecodingFailed(e.to_string()),
        })?;

        token_data.claims.validate()?;
        Ok(token_data.claims)
    }
}

impl TokenSigner for JwtManager {
    fn issue(&self, claims: &Sep10Claims) -> Result<String, JwtError> {
        claims.validate()?;

        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| JwtError::EncodingFailed(e.to_string()))
    }
}

impl fmt::Debug for JwtManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtManager")
            .field("secret", &"****")
            .finish()
    }
}
