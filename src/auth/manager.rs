use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Client;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use super::clock::{Clock, SystemClock};
use super::grant;
use super::types::{GrantType, Identity, PasswordGrantRequest, RefreshGrantRequest, Session};
use crate::error::{ApiError, Result};

/// Credential manager
/// Owns the single session of this process: login, refresh and header construction
pub struct CredentialManager {
    /// Who we log in as
    identity: Identity,

    /// Current token pair, replaced as a whole
    session: RwLock<Session>,

    /// Held for the duration of a refresh so concurrent callers share it
    refresh_guard: Mutex<()>,

    /// HTTP client for identity provider requests
    client: Client,

    /// Time source for expiry checks
    clock: Arc<dyn Clock>,
}

impl CredentialManager {
    /// Create a manager with an empty session
    pub fn new(identity: Identity, client: Client) -> Self {
        Self::with_clock(identity, client, Arc::new(SystemClock))
    }

    /// Create a manager with an explicit time source
    pub fn with_clock(identity: Identity, client: Client, clock: Arc<dyn Clock>) -> Self {
        Self {
            identity,
            session: RwLock::new(Session::default()),
            refresh_guard: Mutex::new(()),
            client,
            clock,
        }
    }

    /// Initial login via email/password
    pub async fn login(&self) -> Result<()> {
        let body = PasswordGrantRequest {
            email: &self.identity.email,
            password: &self.identity.password,
        };
        let token = grant::request_token(
            &self.client,
            &self.identity,
            GrantType::Password,
            &body,
            || self.clock.now(),
        )
        .await?;

        *self.session.write().await = Session::from(token);
        tracing::info!("Logged in successfully");
        Ok(())
    }

    /// Refresh the session using the current refresh token
    ///
    /// Always calls the provider. A rejected refresh token is returned as
    /// `AuthFailure` and is not retried.
    pub async fn refresh(&self) -> Result<()> {
        let _flight = self.refresh_guard.lock().await;
        self.refresh_locked().await
    }

    /// Refresh after the API rejected `rejected` with a 401
    ///
    /// When a concurrent caller already replaced the token that was rejected,
    /// the new session is reused and no provider call is made.
    pub async fn refresh_after_rejection(&self, rejected: &HeaderMap) -> Result<()> {
        let _flight = self.refresh_guard.lock().await;

        let current = self.session.read().await.access_token.clone();
        let rejected = rejected.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
        if let (Some(current), Some(rejected)) = (current.as_deref(), rejected) {
            if rejected != bearer(current) {
                tracing::debug!("Session already refreshed by a concurrent request");
                return Ok(());
            }
        }

        self.refresh_locked().await
    }

    /// Caller must hold `refresh_guard`
    async fn refresh_locked(&self) -> Result<()> {
        let refresh_token = self
            .session
            .read()
            .await
            .refresh_token
            .clone()
            .ok_or_else(|| {
                ApiError::AuthError("No refresh token available, login first".to_string())
            })?;

        let body = RefreshGrantRequest {
            refresh_token: &refresh_token,
        };
        let token = grant::request_token(
            &self.client,
            &self.identity,
            GrantType::RefreshToken,
            &body,
            || self.clock.now(),
        )
        .await?;

        *self.session.write().await = Session::from(token);
        tracing::info!("Token refreshed");
        Ok(())
    }

    /// Get a valid access token, refreshing first if the session has expired
    pub async fn access_token(&self) -> Result<String> {
        if self.is_expired().await {
            let _flight = self.refresh_guard.lock().await;
            // Another caller may have refreshed while we waited
            if self.is_expired().await {
                tracing::debug!("Access token expired, refreshing");
                self.refresh_locked().await?;
            }
        }

        self.session
            .read()
            .await
            .access_token
            .clone()
            .ok_or_else(|| ApiError::AuthError("No access token available, login first".to_string()))
    }

    /// Authorization header for the current session
    pub async fn get_headers(&self) -> Result<HeaderMap> {
        let token = self.access_token().await?;
        let mut value = HeaderValue::from_str(&bearer(&token)).map_err(|_| {
            ApiError::AuthError("Access token is not a valid header value".to_string())
        })?;
        value.set_sensitive(true);

        let mut headers = HeaderMap::with_capacity(1);
        headers.insert(AUTHORIZATION, value);
        Ok(headers)
    }

    /// When the current access token stops being used
    pub async fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.session.read().await.expires_at
    }

    async fn is_expired(&self) -> bool {
        let now = self.clock.now();
        self.session.read().await.is_expired(now)
    }
}

fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::clock::ManualClock;
    use crate::auth::types::TokenData;
    use chrono::Duration;

    fn manager(clock: Arc<ManualClock>) -> CredentialManager {
        let identity = Identity {
            identity_url: "http://127.0.0.1:9".to_string(),
            anon_key: "anon".to_string(),
            email: "user@example.com".to_string(),
            password: "secret".to_string(),
        };
        let client = Client::builder()
            .connect_timeout(std::time::Duration::from_millis(200))
            .timeout(std::time::Duration::from_secs(2))
            .build()
            .unwrap();
        CredentialManager::with_clock(identity, client, clock)
    }

    async fn seed(manager: &CredentialManager, access: &str, expires_at: DateTime<Utc>) {
        *manager.session.write().await = Session::from(TokenData {
            access_token: access.to_string(),
            refresh_token: "r1".to_string(),
            expires_at,
        });
    }

    #[tokio::test]
    async fn test_headers_from_valid_session() {
        let clock = Arc::new(ManualClock::at_epoch());
        let manager = manager(clock.clone());
        seed(&manager, "t1", clock.now() + Duration::seconds(3540)).await;

        // The identity URL is unreachable, so any refresh attempt would fail
        let headers = manager.get_headers().await.unwrap();
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer t1");
        assert!(headers.get(AUTHORIZATION).unwrap().is_sensitive());
    }

    #[tokio::test]
    async fn test_headers_without_login_fail() {
        let clock = Arc::new(ManualClock::at_epoch());
        let manager = manager(clock);

        let err = manager.get_headers().await.unwrap_err();
        assert!(matches!(err, ApiError::AuthError(_)));
    }

    #[tokio::test]
    async fn test_rejection_of_replaced_token_skips_refresh() {
        let clock = Arc::new(ManualClock::at_epoch());
        let manager = manager(clock.clone());
        seed(&manager, "t2", clock.now() + Duration::seconds(3540)).await;

        let mut stale = HeaderMap::new();
        stale.insert(AUTHORIZATION, HeaderValue::from_static("Bearer t1"));

        // t1 was already replaced by t2, so no provider call is needed
        manager.refresh_after_rejection(&stale).await.unwrap();
        assert_eq!(manager.access_token().await.unwrap(), "t2");
    }

    #[tokio::test]
    async fn test_rejection_of_current_token_hits_provider() {
        let clock = Arc::new(ManualClock::at_epoch());
        let manager = manager(clock.clone());
        seed(&manager, "t1", clock.now() + Duration::seconds(3540)).await;

        let current = manager.get_headers().await.unwrap();
        let err = manager.refresh_after_rejection(&current).await.unwrap_err();
        assert!(matches!(err, ApiError::Transport(_)));
    }
}
