//! Stateless session tokens.
//!
//! Sessions are HS256 JWTs signed with the configured symmetric secret.
//! The server keeps no session state: a token stays valid until its
//! encoded expiry, and there is no revocation list.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::Role;

/// Claims carried by a session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: String,
    pub email: String,
    pub role: Role,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("el token ha expirado")]
    Expired,
    #[error("token inválido: {0}")]
    Invalid(String),
    #[error("no se pudo firmar el token: {0}")]
    Signing(String),
}

/// Issue a signed, time-bounded session token for the given identity.
pub fn issue(
    secret: &str,
    user_id: &str,
    email: &str,
    role: Role,
    ttl: Duration,
) -> Result<String, SessionError> {
    let now = Utc::now();
    let claims = Claims {
        user_id: user_id.to_string(),
        email: email.to_string(),
        role,
        iat: now.timestamp(),
        exp: (now + ttl).timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| SessionError::Signing(e.to_string()))
}

/// Verify a session token and return its claims.
pub fn verify(secret: &str, token: &str) -> Result<Claims, SessionError> {
    let mut validation = Validation::default();
    validation.leeway = 0;

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => SessionError::Expired,
        _ => SessionError::Invalid(e.to_string()),
    })?;

    Ok(data.claims)
}
