// Shared fixtures for integration tests
//
// One mockito server plays both the identity provider and the lending API.

#![allow(dead_code)]

use mockito::{Matcher, Mock, Server, ServerGuard};
use serde_json::{json, Value};
use std::sync::Arc;

use lending_mcp::auth::{CredentialManager, Identity, ManualClock};
use lending_mcp::http_client::ApiClient;

pub const ANON_KEY: &str = "anon-key";

pub fn identity(server: &ServerGuard) -> Identity {
    Identity {
        identity_url: server.url(),
        anon_key: ANON_KEY.to_string(),
        email: "chester@example.com".to_string(),
        password: "correct-horse".to_string(),
    }
}

/// Match a path with or without a query string
pub fn path(p: &str) -> Matcher {
    Matcher::Regex(format!(r"^{}(\?.*)?$", p))
}

pub fn token_body(access: &str, refresh: &str, expires_in: i64) -> String {
    json!({
        "access_token": access,
        "refresh_token": refresh,
        "expires_in": expires_in,
        "token_type": "bearer"
    })
    .to_string()
}

/// Password grant answering with `access`/`refresh`
pub async fn mock_login(server: &mut ServerGuard, access: &str, refresh: &str) -> Mock {
    server
        .mock("POST", path("/auth/v1/token"))
        .match_query(Matcher::UrlEncoded("grant_type".into(), "password".into()))
        .match_header("apikey", ANON_KEY)
        .match_body(Matcher::Json(json!({
            "email": "chester@example.com",
            "password": "correct-horse"
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(token_body(access, refresh, 3600))
        .expect(1)
        .create_async()
        .await
}

/// Refresh grant for `old_refresh`, answering with a new pair, expected `hits` times
pub async fn mock_refresh(
    server: &mut ServerGuard,
    old_refresh: &str,
    access: &str,
    refresh: &str,
    hits: usize,
) -> Mock {
    server
        .mock("POST", path("/auth/v1/token"))
        .match_query(Matcher::UrlEncoded(
            "grant_type".into(),
            "refresh_token".into(),
        ))
        .match_header("apikey", ANON_KEY)
        .match_body(Matcher::Json(json!({ "refresh_token": old_refresh })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(token_body(access, refresh, 3600))
        .expect(hits)
        .create_async()
        .await
}

/// Logged-in manager (access `t1`, refresh `r1`) on a clock starting at t=0
pub async fn logged_in(
    server: &mut ServerGuard,
) -> (Arc<CredentialManager>, Arc<ManualClock>) {
    let login = mock_login(server, "t1", "r1").await;
    let clock = Arc::new(ManualClock::at_epoch());
    let auth = Arc::new(CredentialManager::with_clock(
        identity(server),
        reqwest::Client::new(),
        clock.clone(),
    ));
    auth.login().await.expect("login should succeed");
    login.assert_async().await;
    (auth, clock)
}

pub fn api_client(server: &ServerGuard, auth: Arc<CredentialManager>) -> ApiClient {
    ApiClient::new(reqwest::Client::new(), server.url(), auth)
}

pub async fn new_server() -> ServerGuard {
    Server::new_async().await
}

pub fn json_body(value: Value) -> String {
    value.to_string()
}
