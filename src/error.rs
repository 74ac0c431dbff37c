// Error handling module
// Defines the error taxonomy shared by the auth layer, the API client and the tools

use thiserror::Error;

/// Errors that can occur while talking to the identity provider or the lending API
#[derive(Error, Debug)]
pub enum ApiError {
    /// Login or refresh rejected by the identity provider
    #[error("Authentication failed: {status} - {body}")]
    AuthFailure { status: u16, body: String },

    /// Auth precondition not met (no session, unusable token)
    #[error("Authentication error: {0}")]
    AuthError(String),

    /// Network, timeout or connection failure
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-2xx, non-401 response from the lending API
    #[error("Remote API error: {status} - {body}")]
    RemoteRejection { status: u16, body: String },

    /// Tool argument validation error
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    /// True for failures reported by the identity provider or missing session state
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, ApiError::AuthFailure { .. } | ApiError::AuthError(_))
    }

    /// True for connect/read timeouts raised by the transport
    pub fn is_timeout(&self) -> bool {
        matches!(self, ApiError::Transport(e) if e.is_timeout())
    }

    /// HTTP status carried by the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::AuthFailure { status, .. } | ApiError::RemoteRejection { status, .. } => {
                Some(*status)
            }
            ApiError::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Result type alias for API operations
pub type Result<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ApiError::AuthFailure {
            status: 400,
            body: "invalid refresh token".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Authentication failed: 400 - invalid refresh token"
        );

        let err = ApiError::RemoteRejection {
            status: 422,
            body: r#"{"detail":"bad"}"#.to_string(),
        };
        assert_eq!(err.to_string(), r#"Remote API error: 422 - {"detail":"bad"}"#);
    }

    #[test]
    fn test_validation_error_message() {
        let err = ApiError::ValidationError("name is required".to_string());
        assert_eq!(err.to_string(), "Validation error: name is required");
    }

    #[test]
    fn test_internal_error_message() {
        let err = ApiError::Internal(anyhow::anyhow!("Something went wrong"));
        assert_eq!(err.to_string(), "Internal error: Something went wrong");
    }

    #[test]
    fn test_auth_failure_classification() {
        let err = ApiError::AuthFailure {
            status: 401,
            body: String::new(),
        };
        assert!(err.is_auth_failure());
        assert_eq!(err.status(), Some(401));

        let err = ApiError::AuthError("No refresh token available".to_string());
        assert!(err.is_auth_failure());
        assert_eq!(err.status(), None);

        let err = ApiError::RemoteRejection {
            status: 500,
            body: "boom".to_string(),
        };
        assert!(!err.is_auth_failure());
        assert!(!err.is_timeout());
        assert_eq!(err.status(), Some(500));
    }
}
