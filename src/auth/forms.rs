//! Typed login and consent submissions.
//!
//! The portal's login and consent endpoints answer with redirects. These
//! calls post the same fields a browser form would and hand back the
//! redirect location instead of following it.

use std::fmt;
use std::sync::Arc;

use bon::Builder;
use reqwest::header::LOCATION;
use strum::{AsRefStr, Display, EnumString};
use url::Url;

use super::error::{response_detail, AuthError};
use super::oauth::{build_authorize_url, parse_lenient};
use crate::config::PortalConfig;

const MIN_PASSWORD_LENGTH: usize = 6;
const MISSING_PARAMS_MESSAGE: &str = "Missing OAuth parameters. Please try logging in again.";

/// OAuth parameters carried by the login and consent pages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizationParams {
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: String,
    pub state: String,
}

impl AuthorizationParams {
    /// Read the parameters from a page URL. Absent values are empty.
    pub fn from_url(raw: &str) -> Result<Self, AuthError> {
        let url = parse_lenient(raw)?;
        let mut params = Self::default();
        for (name, value) in url.query_pairs() {
            let slot = match name.as_ref() {
                "client_id" => &mut params.client_id,
                "redirect_uri" => &mut params.redirect_uri,
                "scope" => &mut params.scope,
                "state" => &mut params.state,
                _ => continue,
            };
            if slot.is_empty() {
                *slot = value.into_owned();
            }
        }
        Ok(params)
    }

    pub fn scopes(&self) -> Vec<&str> {
        self.scope.split_whitespace().collect()
    }

    fn require_client_and_state(&self) -> Result<(), AuthError> {
        if self.client_id.is_empty() || self.state.is_empty() {
            return Err(AuthError::Validation(MISSING_PARAMS_MESSAGE.to_string()));
        }
        Ok(())
    }
}

/// Credentials submitted to the portal login endpoint.
///
/// # Example
/// ```
/// use osm_portal::auth::{AuthorizationParams, LoginRequest};
///
/// let request = LoginRequest::builder()
///     .username("1234567890123")
///     .password("password")
///     .params(AuthorizationParams::default())
///     .build();
/// assert_eq!(request.user_type, "osm");
/// ```
#[derive(Clone, Builder)]
pub struct LoginRequest {
    #[builder(into)]
    pub username: String,
    #[builder(into)]
    pub password: String,
    #[builder(into, default = "osm".to_string())]
    pub user_type: String,
    pub params: AuthorizationParams,
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("username", &self.username)
            .field("password", &"[redacted]")
            .field("user_type", &self.user_type)
            .field("params", &self.params)
            .finish()
    }
}

impl LoginRequest {
    /// Check the fields locally before anything is sent.
    pub fn validate(&self) -> Result<(), AuthError> {
        let mut problems = Vec::new();
        if self.username.trim().is_empty() {
            problems.push("Username is required");
        }
        if self.password.is_empty() {
            problems.push("Password is required");
        } else if self.password.chars().count() < MIN_PASSWORD_LENGTH {
            problems.push("Password must be at least 6 characters");
        }
        if !problems.is_empty() {
            return Err(AuthError::Validation(problems.join("; ")));
        }
        self.params.require_client_and_state()
    }
}

/// The user's answer on the consent screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum ConsentAction {
    Approve,
    Deny,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsentRequest {
    pub params: AuthorizationParams,
    pub action: ConsentAction,
}

/// Human-readable message for an `error` code returned to the login page.
pub fn login_error_message(code: &str, description: Option<&str>) -> String {
    let known = match code {
        "invalid_client" => Some("Invalid client application."),
        "invalid_username_or_password" => Some("Invalid username or password."),
        "user_not_active" => Some("User account is not active."),
        "access_denied" => Some("Access denied."),
        "consent_failed" => Some("Failed to save consent."),
        _ => None,
    };
    match (known, description) {
        (Some(message), _) => message.to_string(),
        (None, Some(description)) if !description.is_empty() => description.to_string(),
        _ => format!("Error: {code}"),
    }
}

/// Client for the portal's login and consent endpoints.
pub struct PortalForms {
    config: Arc<PortalConfig>,
    http: reqwest::Client,
}

impl PortalForms {
    /// Build with an HTTP client that does not follow redirects.
    pub fn new(config: Arc<PortalConfig>) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self { config, http })
    }

    /// Replace the HTTP client. It must not follow redirects.
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    /// Submit credentials. Returns the location the portal redirects to,
    /// normally the authorize URL or the consent page.
    pub async fn login(&self, request: &LoginRequest) -> Result<String, AuthError> {
        request.validate()?;
        let params = &request.params;
        let redirect_to = build_authorize_url(
            &self.config.authorize_endpoint(),
            &params.client_id,
            &params.redirect_uri,
            &params.scope,
            &params.state,
        );
        let fields = [
            ("username", request.username.as_str()),
            ("password", request.password.as_str()),
            ("user_type", request.user_type.as_str()),
            ("client_id", params.client_id.as_str()),
            ("state", params.state.as_str()),
            ("redirect_uri", params.redirect_uri.as_str()),
            ("scope", params.scope.as_str()),
            ("redirect_to", redirect_to.as_str()),
        ];

        tracing::debug!(client_id = %params.client_id, "Submitting login");
        let response = self
            .http
            .post(self.config.login_endpoint())
            .form(&fields)
            .send()
            .await?;
        let location = self.redirect_location(response).await?;

        let target = parse_lenient(&location)?;
        let mut error = None;
        let mut description = None;
        for (name, value) in target.query_pairs() {
            match name.as_ref() {
                "error" if error.is_none() => error = Some(value.into_owned()),
                "error_description" if description.is_none() => {
                    description = Some(value.into_owned())
                }
                _ => {}
            }
        }
        if let Some(code) = error {
            let message = login_error_message(&code, description.as_deref());
            tracing::info!(code = %code, "Login rejected");
            return Err(AuthError::LoginRejected { code, message });
        }
        Ok(location)
    }

    /// Submit the consent decision. Returns the redirect location, normally
    /// the client callback carrying `code` and `state` or an `error`.
    pub async fn consent(&self, request: &ConsentRequest) -> Result<String, AuthError> {
        let params = &request.params;
        params.require_client_and_state()?;
        let redirect_uri = if params.redirect_uri.is_empty() {
            "/"
        } else {
            params.redirect_uri.as_str()
        };
        let mut fields: Vec<(&str, &str)> = params
            .scopes()
            .into_iter()
            .map(|scope| ("scopes", scope))
            .collect();
        fields.extend([
            ("client_id", params.client_id.as_str()),
            ("redirect_uri", redirect_uri),
            ("state", params.state.as_str()),
            ("action", request.action.as_ref()),
        ]);

        tracing::debug!(client_id = %params.client_id, action = %request.action, "Submitting consent");
        let response = self
            .http
            .post(self.config.consent_endpoint())
            .form(&fields)
            .send()
            .await?;
        self.redirect_location(response).await
    }

    async fn redirect_location(&self, response: reqwest::Response) -> Result<String, AuthError> {
        let status = response.status();
        if status.is_redirection() {
            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|value| value.to_str().ok())
                .ok_or_else(|| {
                    AuthError::InvalidResponse(format!("{status} redirect without Location"))
                })?;
            return Ok(self.resolve(location));
        }
        if status.is_success() {
            return Err(AuthError::InvalidResponse(format!(
                "expected a redirect, got {status}"
            )));
        }
        Err(AuthError::ApiCall {
            status: status.as_u16(),
            detail: response_detail(response).await,
        })
    }

    fn resolve(&self, location: &str) -> String {
        Url::parse(self.config.base_url())
            .and_then(|base| base.join(location))
            .map(String::from)
            .unwrap_or_else(|_| location.to_string())
    }
}
