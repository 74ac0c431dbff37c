// Process lifecycle
// Owns the transport and the session for the life of the server

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::auth::{CredentialManager, Identity};
use crate::config::Config;
use crate::http_client::{self, ApiClient};

/// Long-lived state shared by every tool call
pub struct AppContext {
    pub api: Arc<ApiClient>,
    pub auth: Arc<CredentialManager>,
    pub config: Arc<Config>,
}

impl AppContext {
    /// Build the transport, log in and probe the API
    ///
    /// A failed login is fatal. A failed probe is only logged, since the API
    /// host may still be cold starting.
    pub async fn start(config: Config) -> Result<Self> {
        tracing::info!("Starting lending MCP server (env={})", config.env);

        let transport =
            http_client::build_transport(config.http_connect_timeout, config.http_request_timeout)?;

        let identity = Identity {
            identity_url: config.supabase_url.clone(),
            anon_key: config.supabase_anon_key.clone(),
            email: config.user_email.clone(),
            password: config.user_password.clone(),
        };
        let auth = Arc::new(CredentialManager::new(identity, transport.clone()));

        auth.login().await.context("Initial login failed")?;
        tracing::info!("Authenticated as {}", config.user_name);

        let api = Arc::new(ApiClient::new(
            transport,
            config.api_url.clone(),
            auth.clone(),
        ));

        probe_api(&api).await;

        Ok(Self {
            api,
            auth,
            config: Arc::new(config),
        })
    }

    /// Release the transport and the session
    pub fn shutdown(self) {
        drop(self.api);
        drop(self.auth);
        tracing::info!("MCP server shutdown");
    }
}

/// Best-effort health check that also wakes a sleeping API host
pub async fn probe_api(api: &ApiClient) {
    match api.get("/ping", &[]).await {
        Ok(response) => tracing::info!("API ping: {}", response.status().as_u16()),
        Err(e) => tracing::warn!("API ping failed (may be cold starting): {}", e),
    }
}
