//! Bearer-token sessions.
//!
//! Tokens are HS256 JWTs carrying the user object the access layer works
//! from: id, email, user type and role names.

use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use platform_authz::{CurrentUser, UserType};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

pub const DEFAULT_SESSION_TTL_MINUTES: i64 = 480;
/// One year.
pub const MAX_SESSION_TTL_MINUTES: i64 = 525_600;

#[derive(Debug, Error)]
pub enum AuthnError {
    #[error("missing bearer token")]
    MissingToken,
    #[error("authorization header is not a bearer token")]
    MalformedHeader,
    #[error("invalid session token")]
    InvalidToken(#[source] jsonwebtoken::errors::Error),
    #[error("failed to sign session token")]
    Signing(#[source] jsonwebtoken::errors::Error),
    #[error("session ttl of {0} minutes is out of range")]
    SessionTtl(i64),
}

#[derive(Clone)]
pub struct AuthConfig {
    secret: Vec<u8>,
    pub session_ttl_minutes: i64,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("secret", &"<redacted>")
            .field("session_ttl_minutes", &self.session_ttl_minutes)
            .finish()
    }
}

impl AuthConfig {
    pub fn new(secret: impl Into<Vec<u8>>, session_ttl_minutes: i64) -> Self {
        Self {
            secret: secret.into(),
            session_ttl_minutes,
        }
    }

    fn encoding_key(&self) -> EncodingKey {
        EncodingKey::from_secret(&self.secret)
    }

    fn decoding_key(&self) -> DecodingKey {
        DecodingKey::from_secret(&self.secret)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: Uuid,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_type: Option<UserType>,
    #[serde(default)]
    pub roles: Vec<String>,
    pub exp: usize,
    pub iat: usize,
}

impl From<SessionClaims> for CurrentUser {
    fn from(claims: SessionClaims) -> Self {
        CurrentUser {
            id: claims.sub,
            email: claims.email,
            name: claims.name,
            user_type: claims.user_type,
            roles: claims.roles,
        }
    }
}

pub fn issue_token(user: &CurrentUser, config: &AuthConfig) -> Result<String, AuthnError> {
    let now = Utc::now();
    let out_of_range = || AuthnError::SessionTtl(config.session_ttl_minutes);
    let ttl = Duration::try_minutes(config.session_ttl_minutes).ok_or_else(out_of_range)?;
    let exp = now
        .checked_add_signed(ttl)
        .ok_or_else(out_of_range)?
        .timestamp() as usize;
    let claims = SessionClaims {
        sub: user.id,
        email: user.email.clone(),
        name: user.name.clone(),
        user_type: user.user_type,
        roles: user.roles.clone(),
        exp,
        iat: now.timestamp() as usize,
    };
    jsonwebtoken::encode(&Header::default(), &claims, &config.encoding_key())
        .map_err(AuthnError::Signing)
}

pub fn decode_token(token: &str, config: &AuthConfig) -> Result<CurrentUser, AuthnError> {
    jsonwebtoken::decode::<SessionClaims>(token, &config.decoding_key(), &Validation::default())
        .map(|data| data.claims.into())
        .map_err(|err| {
            debug!(error = %err, "rejected session token");
            AuthnError::InvalidToken(err)
        })
}

/// Extracts the token from an `Authorization: Bearer <token>` value.
pub fn bearer_token(header: &str) -> Result<&str, AuthnError> {
    let (scheme, token) = header
        .trim()
        .split_once(' ')
        .ok_or(AuthnError::MalformedHeader)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthnError::MalformedHeader);
    }
    let token = token.trim();
    if token.is_empty() {
        return Err(AuthnError::MissingToken);
    }
    Ok(token)
}

/// Resolves an optional `Authorization` header to the current user.
///
/// A missing header is an anonymous request; a present but invalid header
/// is an error.
pub fn authenticate(
    header: Option<&str>,
    config: &AuthConfig,
) -> Result<Option<CurrentUser>, AuthnError> {
    match header {
        None => Ok(None),
        Some(value) => decode_token(bearer_token(value)?, config).map(Some),
    }
}
