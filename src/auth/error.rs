use thiserror::Error;

use super::token::TokenTypeHint;
use crate::error::PortalError;

/// Authentication and token-lifecycle errors.
///
/// Every payload is a plain string so the type is `Clone`; a single refresh
/// outcome is handed to all callers waiting on it.
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    #[error("State mismatch - possible CSRF attack")]
    StateMismatch,
    #[error("Authorization failed: {0}")]
    Authorization(String),
    #[error("No authorization code received")]
    MissingCode,
    #[error("Token exchange failed: {0}")]
    TokenExchange(String),
    #[error("Refresh token failed: {0}")]
    TokenRefreshFailed(String),
    #[error("No refresh token available")]
    NoRefreshToken,
    #[error("API call failed ({status}): {detail}")]
    ApiCall { status: u16, detail: String },
    #[error("No {0} to revoke")]
    NoToken(TokenTypeHint),
    #[error("Token revocation failed: {0}")]
    Revocation(String),
    #[error("Discovery failed: {0}")]
    Discovery(String),
    #[error("{message}")]
    LoginRejected { code: String, message: String },
    #[error("{0}")]
    Validation(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<reqwest::Error> for AuthError {
    fn from(error: reqwest::Error) -> Self {
        Self::Network(error.to_string())
    }
}

impl From<std::io::Error> for AuthError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error.to_string())
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

impl From<toml::de::Error> for AuthError {
    fn from(error: toml::de::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

impl From<toml::ser::Error> for AuthError {
    fn from(error: toml::ser::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

impl From<AuthError> for PortalError {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::Io(message) => PortalError::Io(message),
            other => PortalError::Auth(other),
        }
    }
}

/// Pull a human-readable reason out of an error response body.
///
/// Prefers `detail`, then `message`, then the OAuth `error_description` and
/// `error` fields, then the raw text. Falls back to the status line when the
/// body is empty.
pub(crate) fn error_detail(status: reqwest::StatusCode, body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for field in ["detail", "message", "error_description", "error"] {
            match value.get(field) {
                Some(serde_json::Value::String(text)) if !text.is_empty() => {
                    return text.clone();
                }
                Some(serde_json::Value::String(_) | serde_json::Value::Null) | None => {}
                Some(other) => return other.to_string(),
            }
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        status.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Read an unsuccessful response body and extract its detail.
pub(crate) async fn response_detail(response: reqwest::Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    error_detail(status, &body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn error_detail_prefers_detail_field() {
        let body = r#"{"detail":"invalid_grant","message":"ignored"}"#;
        assert_eq!(error_detail(StatusCode::BAD_REQUEST, body), "invalid_grant");
    }

    #[test]
    fn error_detail_falls_back_to_message() {
        let body = r#"{"message":"client authentication failed"}"#;
        assert_eq!(
            error_detail(StatusCode::UNAUTHORIZED, body),
            "client authentication failed"
        );
    }

    #[test]
    fn error_detail_reads_oauth_error_fields() {
        let body = r#"{"error":"invalid_client"}"#;
        assert_eq!(error_detail(StatusCode::UNAUTHORIZED, body), "invalid_client");
    }

    #[test]
    fn error_detail_serializes_structured_detail() {
        let body = r#"{"detail":[{"loc":["body","code"],"msg":"field required"}]}"#;
        let detail = error_detail(StatusCode::UNPROCESSABLE_ENTITY, body);
        assert!(detail.contains("field required"));
    }

    #[test]
    fn error_detail_uses_plain_text_body() {
        assert_eq!(
            error_detail(StatusCode::BAD_GATEWAY, "upstream down\n"),
            "upstream down"
        );
    }

    #[test]
    fn error_detail_uses_status_for_empty_body() {
        assert_eq!(
            error_detail(StatusCode::INTERNAL_SERVER_ERROR, ""),
            "500 Internal Server Error"
        );
    }

    #[test]
    fn error_detail_skips_empty_fields() {
        let body = r#"{"detail":"","message":"Invalid refresh token"}"#;
        assert_eq!(
            error_detail(StatusCode::BAD_REQUEST, body),
            "Invalid refresh token"
        );
    }

    #[test]
    fn error_detail_with_only_empty_fields_uses_body() {
        let body = r#"{"detail":""}"#;
        assert_eq!(error_detail(StatusCode::BAD_REQUEST, body), body);
    }

    #[test]
    fn no_token_message_names_token_kind() {
        let err = AuthError::NoToken(TokenTypeHint::RefreshToken);
        assert_eq!(err.to_string(), "No refresh token to revoke");
    }
}
