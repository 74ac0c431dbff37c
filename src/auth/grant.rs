// Token endpoint calls (password and refresh grants)

use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Serialize;

use super::types::{GrantType, Identity, TokenData, TokenResponse};
use crate::error::{ApiError, Result};

/// Seconds subtracted from the declared token lifetime
pub const EXPIRY_MARGIN_SECS: i64 = 60;

/// Token endpoint URL for a grant
pub fn token_url(identity_url: &str, grant: GrantType) -> String {
    format!(
        "{}/auth/v1/token?grant_type={}",
        identity_url.trim_end_matches('/'),
        grant.as_str()
    )
}

/// Expiry for a token issued at `issued_at` with the declared lifetime
///
/// `None` when the lifetime does not fit the calendar.
pub fn compute_expires_at(issued_at: DateTime<Utc>, expires_in: i64) -> Option<DateTime<Utc>> {
    let lifetime = expires_in.checked_sub(EXPIRY_MARGIN_SECS)?;
    issued_at.checked_add_signed(Duration::try_seconds(lifetime)?)
}

/// POST a grant request to the identity provider
///
/// Any non-success status, or a success body that does not carry a usable token
/// pair, is reported as `AuthFailure` with the provider's status and raw body.
/// `now` is sampled once the response has arrived.
pub async fn request_token<B, F>(
    client: &Client,
    identity: &Identity,
    grant: GrantType,
    body: &B,
    now: F,
) -> Result<TokenData>
where
    B: Serialize + ?Sized,
    F: FnOnce() -> DateTime<Utc>,
{
    let url = token_url(&identity.identity_url, grant);
    tracing::debug!(grant = grant.as_str(), "Requesting token from identity provider");

    let response = client
        .post(&url)
        .header("apikey", &identity.anon_key)
        .header("Content-Type", "application/json")
        .json(body)
        .send()
        .await?;

    let status = response.status();
    let text = response.text().await?;

    if !status.is_success() {
        tracing::error!(
            grant = grant.as_str(),
            status = status.as_u16(),
            body = %text,
            "Identity provider rejected token request"
        );
        return Err(ApiError::AuthFailure {
            status: status.as_u16(),
            body: text,
        });
    }

    let data: TokenResponse = match serde_json::from_str(&text) {
        Ok(data) => data,
        Err(e) => {
            tracing::error!(grant = grant.as_str(), error = %e, "Malformed token response");
            return Err(ApiError::AuthFailure {
                status: status.as_u16(),
                body: text,
            });
        }
    };

    if data.access_token.is_empty() {
        return Err(ApiError::AuthFailure {
            status: status.as_u16(),
            body: "Token response does not contain access_token".to_string(),
        });
    }

    let Some(expires_at) = compute_expires_at(now(), data.expires_in) else {
        tracing::error!(
            grant = grant.as_str(),
            expires_in = data.expires_in,
            "Token lifetime out of range"
        );
        return Err(ApiError::AuthFailure {
            status: status.as_u16(),
            body: text,
        });
    };
    tracing::debug!(
        grant = grant.as_str(),
        expires_at = %expires_at.to_rfc3339(),
        "Token issued"
    );

    Ok(TokenData {
        access_token: data.access_token,
        refresh_token: data.refresh_token,
        expires_at,
    })
}
