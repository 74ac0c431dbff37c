// Authentication types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed identity the session is established for
#[derive(Clone)]
pub struct Identity {
    /// Identity provider base URL (no trailing slash)
    pub identity_url: String,
    /// Anonymous key sent as the `apikey` header
    pub anon_key: String,
    pub email: String,
    pub password: String,
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("identity_url", &self.identity_url)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// Grant used against the token endpoint
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GrantType {
    Password,
    RefreshToken,
}

impl GrantType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrantType::Password => "password",
            GrantType::RefreshToken => "refresh_token",
        }
    }
}

/// Current token pair and its expiry
///
/// Both tokens are always replaced together from one provider response.
#[derive(Clone, Default)]
pub struct Session {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    /// An empty session counts as expired
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            None => true,
            Some(exp) => now >= exp,
        }
    }
}

impl From<TokenData> for Session {
    fn from(token: TokenData) -> Self {
        Self {
            access_token: Some(token.access_token),
            refresh_token: Some(token.refresh_token),
            expires_at: Some(token.expires_at),
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("has_access_token", &self.access_token.is_some())
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Token data from a login or refresh response, expiry already computed
#[derive(Clone)]
pub struct TokenData {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl fmt::Debug for TokenData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenData")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Password grant request body
#[derive(Serialize)]
pub struct PasswordGrantRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

/// Refresh grant request body
#[derive(Serialize)]
pub struct RefreshGrantRequest<'a> {
    pub refresh_token: &'a str,
}

/// Token endpoint response (both grants)
#[derive(Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}
