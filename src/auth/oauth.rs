//! Authorization Code flow: redirect, callback validation, code exchange and
//! OpenID discovery.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

use super::error::{response_detail, AuthError};
use super::navigator::Navigator;
use super::state::generate_state;
use super::store::{StoreKey, TokenStore, TokenStoreExt};
use super::token::TokenSet;
use crate::config::PortalConfig;

/// Scopes requested when the caller does not name any.
pub const DEFAULT_AUTHORIZATION_SCOPES: [&str; 2] = ["openid", "profile"];

/// Authorization redirect that was issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRequest {
    pub url: String,
    pub state: String,
}

/// Query parameters the authorization server appends to the redirect URI.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl CallbackParams {
    /// Parse an absolute callback URL, a path with a query, or a bare
    /// `?query` string.
    pub fn from_url(raw: &str) -> Result<Self, AuthError> {
        let url = parse_lenient(raw)?;
        let mut params = Self::default();
        for (name, value) in url.query_pairs() {
            let slot = match name.as_ref() {
                "code" => &mut params.code,
                "state" => &mut params.state,
                "error" => &mut params.error,
                "error_description" => &mut params.error_description,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.into_owned());
            }
        }
        Ok(params)
    }
}

/// OpenID Connect discovery document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenIdConfiguration {
    #[serde(default)]
    pub issuer: Option<String>,
    #[serde(default)]
    pub authorization_endpoint: Option<String>,
    #[serde(default)]
    pub token_endpoint: Option<String>,
    #[serde(default)]
    pub userinfo_endpoint: Option<String>,
    #[serde(default)]
    pub revocation_endpoint: Option<String>,
    #[serde(default)]
    pub jwks_uri: Option<String>,
    #[serde(default)]
    pub scopes_supported: Vec<String>,
    #[serde(default)]
    pub response_types_supported: Vec<String>,
    #[serde(default)]
    pub grant_types_supported: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// JSON Web Key Set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Jwks {
    #[serde(default)]
    pub keys: Vec<Jwk>,
}

/// A single JSON Web Key. Key material beyond the common members is kept in
/// `params`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Jwk {
    pub kty: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

/// Client side of the portal's Authorization Code flow.
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use osm_portal::auth::{MemoryTokenStore, OAuth2Client, RecordingNavigator};
/// use osm_portal::config::PortalConfig;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = PortalConfig::new("abc", "secret", "https://portal", "https://app/oauth/callback")?;
/// let client = OAuth2Client::new(
///     Arc::new(config),
///     Arc::new(MemoryTokenStore::new()),
///     Arc::new(RecordingNavigator::new()),
/// );
/// let request = client.start_authorization(&["openid", "profile"])?;
/// println!("open {}", request.url);
/// # Ok(())
/// # }
/// ```
pub struct OAuth2Client {
    config: Arc<PortalConfig>,
    http: reqwest::Client,
    store: Arc<dyn TokenStore>,
    navigator: Arc<dyn Navigator>,
}

impl OAuth2Client {
    pub fn new(
        config: Arc<PortalConfig>,
        store: Arc<dyn TokenStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            store,
            navigator,
        }
    }

    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    pub fn config(&self) -> &PortalConfig {
        &self.config
    }

    /// Build the authorize URL for `scopes` and `state`.
    ///
    /// Values are percent-encoded with `%20` for spaces, so the joined scope
    /// list reads `openid%20profile`.
    pub fn authorization_url<S: AsRef<str>>(&self, scopes: &[S], state: &str) -> String {
        build_authorize_url(
            &self.config.authorize_endpoint(),
            self.config.client_id(),
            self.config.redirect_uri(),
            &join_scopes(scopes),
            state,
        )
    }

    /// Generate and store a fresh state, then navigate to the authorize URL.
    ///
    /// An empty scope list requests `openid profile`.
    pub fn start_authorization<S: AsRef<str>>(
        &self,
        scopes: &[S],
    ) -> Result<AuthorizationRequest, AuthError> {
        let state = generate_state();
        let url = if scopes.is_empty() {
            self.authorization_url(&DEFAULT_AUTHORIZATION_SCOPES, &state)
        } else {
            self.authorization_url(scopes, &state)
        };
        self.store.set(StoreKey::OauthState, &state)?;
        tracing::info!(client_id = self.config.client_id(), "Starting authorization");
        self.navigator.navigate(&url);
        Ok(AuthorizationRequest { url, state })
    }

    /// Validate the redirect back from the authorization server and exchange
    /// its code.
    ///
    /// The stored state is consumed whatever the outcome.
    pub async fn handle_callback(&self, current_url: &str) -> Result<TokenSet, AuthError> {
        let saved_state = self.store.get(StoreKey::OauthState)?;
        self.store.remove(StoreKey::OauthState)?;
        let params = CallbackParams::from_url(current_url)?;
        tracing::debug!(
            has_code = params.code.is_some(),
            has_error = params.error.is_some(),
            "Authorization callback received"
        );

        match (params.state.as_deref(), saved_state.as_deref()) {
            (Some(returned), Some(saved)) if returned == saved => {}
            _ => {
                tracing::warn!("Callback state does not match the stored state");
                return Err(AuthError::StateMismatch);
            }
        }

        if let Some(error) = params.error {
            let message = match params.error_description {
                Some(description) if !description.is_empty() => format!("{error}: {description}"),
                _ => error,
            };
            return Err(AuthError::Authorization(message));
        }

        let code = params
            .code
            .filter(|code| !code.is_empty())
            .ok_or(AuthError::MissingCode)?;
        self.exchange_code_for_token(&code).await
    }

    /// Exchange an authorization code and persist the issued token set.
    pub async fn exchange_code_for_token(&self, code: &str) -> Result<TokenSet, AuthError> {
        tracing::debug!("Exchanging authorization code");
        let response = self
            .http
            .post(self.config.token_endpoint())
            .basic_auth(self.config.client_id(), Some(self.config.client_secret()))
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.config.redirect_uri()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response_detail(response).await;
            tracing::warn!(%status, detail = %detail, "Token exchange rejected");
            return Err(AuthError::TokenExchange(detail));
        }

        let tokens: TokenSet = response
            .json()
            .await
            .map_err(|e| AuthError::InvalidResponse(format!("token response: {e}")))?;
        self.store.persist_token_set(&tokens)?;
        if tokens.refresh_token.is_none() {
            self.store.remove(StoreKey::RefreshToken)?;
        }
        self.store.remove(StoreKey::OauthState)?;
        tracing::info!(scope = tokens.scope.as_deref(), "Token exchange successful");
        Ok(tokens)
    }

    /// Fetch the discovery document.
    pub async fn get_openid_configuration(&self) -> Result<OpenIdConfiguration, AuthError> {
        let url = self.config.discovery_endpoint();
        self.get_discovery_json(&url, "OpenID configuration").await
    }

    /// Fetch the key set named by the discovery document's `jwks_uri`.
    pub async fn get_jwks(&self) -> Result<Jwks, AuthError> {
        let configuration = self.get_openid_configuration().await?;
        let jwks_uri = configuration.jwks_uri.ok_or_else(|| {
            AuthError::Discovery("OpenID configuration has no jwks_uri".to_string())
        })?;
        self.get_discovery_json(&jwks_uri, "JWKS").await
    }

    async fn get_discovery_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        what: &str,
    ) -> Result<T, AuthError> {
        let response = self.http.get(url).send().await.map_err(|e| {
            tracing::warn!(url, error = %e, "Discovery request failed");
            AuthError::Discovery(format!("Failed to fetch {what}: {e}"))
        })?;
        if !response.status().is_success() {
            let status = response.status();
            tracing::warn!(url, %status, "Discovery request rejected");
            return Err(AuthError::Discovery(format!(
                "Failed to fetch {what}: {status}"
            )));
        }
        response
            .json()
            .await
            .map_err(|e| AuthError::Discovery(format!("Invalid {what}: {e}")))
    }
}

pub(crate) fn build_authorize_url(
    endpoint: &str,
    client_id: &str,
    redirect_uri: &str,
    scope: &str,
    state: &str,
) -> String {
    format!(
        "{endpoint}?client_id={}&redirect_uri={}&scope={}&state={}",
        urlencoding::encode(client_id),
        urlencoding::encode(redirect_uri),
        urlencoding::encode(scope),
        urlencoding::encode(state),
    )
}

pub(crate) fn join_scopes<S: AsRef<str>>(scopes: &[S]) -> String {
    scopes
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse an absolute URL, or resolve a path or query against a placeholder
/// origin.
pub(crate) fn parse_lenient(raw: &str) -> Result<Url, AuthError> {
    match Url::parse(raw) {
        Ok(url) => Ok(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse("http://localhost/")
            .and_then(|base| base.join(raw))
            .map_err(|e| AuthError::Validation(format!("invalid URL '{raw}': {e}"))),
        Err(e) => Err(AuthError::Validation(format!("invalid URL '{raw}': {e}"))),
    }
}
