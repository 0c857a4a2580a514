//! Session and token lifecycle
//!
//! This module implements the token-lifecycle pattern the product's UI
//! contexts all share: storing access/refresh token pairs, checking JWT
//! expiry without validating signatures, and persisting accounts across
//! restarts.
//!
//! # Example
//!
//! ```rust
//! use api_client::session::{StoredAccount, is_session_expired};
//!
//! let account = StoredAccount::new(
//!     "https://api.opswatch.example".to_string(),
//!     "usr_1".to_string(),
//!     "alice@example.com".to_string(),
//! );
//!
//! // No tokens yet, so the session counts as expired
//! assert!(is_session_expired(&account));
//! ```

mod manager;

pub use manager::{AccountStore, SessionManager, SessionManagerError};

use crate::types::User;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, decode_header, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during session operations
#[derive(Debug, Error)]
pub enum SessionError {
    /// JWT validation error
    #[error("JWT validation error: {0}")]
    JwtValidationError(#[from] jsonwebtoken::errors::Error),

    /// Missing required field
    #[error("Missing required field: {0}")]
    MissingField(String),
}

/// Result type for session operations
pub type Result<T> = std::result::Result<T, SessionError>;

/// A persisted account with authentication tokens
///
/// This is the shape each client context stores locally so a session can
/// be restored without re-entering credentials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredAccount {
    /// The backend base URL this account belongs to
    pub base_url: String,

    /// The user's id
    pub user_id: String,

    /// The user's email address
    pub email: String,

    /// Display name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Role within the organization
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    /// Organization name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,

    /// Access token (short lived)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    /// Refresh token (long lived)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Whether the session is active
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
}

impl StoredAccount {
    /// Create a new stored account with required fields
    pub fn new(base_url: String, user_id: String, email: String) -> Self {
        Self {
            base_url,
            user_id,
            email,
            name: None,
            role: None,
            organization: None,
            access_token: None,
            refresh_token: None,
            active: Some(true),
        }
    }

    /// Convert to a live auth session
    pub fn to_auth_session(&self) -> Result<AuthSession> {
        Ok(AuthSession {
            access_token: self
                .access_token
                .clone()
                .ok_or_else(|| SessionError::MissingField("accessToken".to_string()))?,
            refresh_token: self
                .refresh_token
                .clone()
                .ok_or_else(|| SessionError::MissingField("refreshToken".to_string()))?,
            user: User {
                id: self.user_id.clone(),
                email: self.email.clone(),
                name: self.name.clone().unwrap_or_default(),
                role: self.role.clone(),
                organization: self.organization.clone(),
            },
            active: self.active.unwrap_or(true),
        })
    }

    /// Check if this account has a full token pair
    pub fn has_tokens(&self) -> bool {
        self.access_token.is_some() && self.refresh_token.is_some()
    }
}

/// An active session used by the [`ApiAgent`](crate::agent::ApiAgent)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSession {
    /// Access token for authenticated requests
    pub access_token: String,

    /// Refresh token for obtaining a new access token
    pub refresh_token: String,

    /// The authenticated user
    pub user: User,

    /// Whether the session is active
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl AuthSession {
    /// Convert to the persisted account form
    pub fn to_stored_account(&self, base_url: String) -> StoredAccount {
        StoredAccount {
            base_url,
            user_id: self.user.id.clone(),
            email: self.user.email.clone(),
            name: Some(self.user.name.clone()),
            role: self.user.role.clone(),
            organization: self.user.organization.clone(),
            access_token: Some(self.access_token.clone()),
            refresh_token: Some(self.refresh_token.clone()),
            active: Some(self.active),
        }
    }
}

/// JWT claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject (user id)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    /// Issued at timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    /// Expiration timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,

    /// Token scope (e.g., "access" or "refresh")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// Additional claims
    #[serde(flatten)]
    pub extra: serde_json::Value,
}

/// Parse JWT claims without signature validation
///
/// The client never verifies signatures (it has no key material); the
/// claims are only used to decide when a refresh is due. The server
/// remains the authority on token validity.
pub fn parse_jwt_claims(token: &str) -> Result<JwtClaims> {
    let header = decode_header(token)?;

    let mut validation = Validation::new(header.alg);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_nbf = false;

    let token_data = decode::<JwtClaims>(
        token,
        // Dummy key since we're not validating
        &DecodingKey::from_secret(&[]),
        &validation,
    )?;

    Ok(token_data.claims)
}

/// Get the expiration time from a JWT token
///
/// Returns None if the token has no `exp` claim or cannot be parsed.
pub fn get_token_expiration(token: &str) -> Option<DateTime<Utc>> {
    let claims = parse_jwt_claims(token).ok()?;
    claims.exp.and_then(|exp| DateTime::from_timestamp(exp, 0))
}

/// Check if a JWT token is expired
///
/// A token without a parseable `exp` claim counts as expired.
pub fn is_token_expired(token: &str) -> bool {
    match get_token_expiration(token) {
        Some(exp_time) => exp_time <= Utc::now(),
        None => true,
    }
}

/// Check if a JWT token will expire within the given duration
pub fn is_token_expiring_soon(token: &str, threshold: Duration) -> bool {
    match get_token_expiration(token) {
        Some(exp_time) => exp_time <= Utc::now() + threshold,
        None => true,
    }
}

/// Check if a stored account's session is beyond recovery
///
/// The session is expired only when the access token is expired or
/// missing AND there is no refresh token left to recover with.
pub fn is_session_expired(account: &StoredAccount) -> bool {
    let Some(ref access_token) = account.access_token else {
        return true;
    };

    if !is_token_expired(access_token) {
        return false;
    }

    match &account.refresh_token {
        Some(refresh_token) => is_token_expired(refresh_token),
        None => true,
    }
}
