//! Session composition root.
//!
//! [`PortalSession`] owns one OAuth2 client and one API client built over a
//! shared config, token store and navigator, and tracks the state a UI needs
//! to render: whether the user is signed in, their profile, and the last
//! error.

use std::sync::{Arc, RwLock};

use serde_json::Value;

use crate::api::{ApiRequest, SecureApiClient, UserInfo};
use crate::auth::{
    AuthorizationRequest, Jwks, Navigator, OAuth2Client, OpenIdConfiguration, StoreKey, TokenSet,
    TokenStore,
};
use crate::config::PortalConfig;
use crate::error::Result;

/// Snapshot of what the UI shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub is_authenticated: bool,
    pub user_info: Option<UserInfo>,
    /// True until the first [`PortalSession::check_auth`] completes.
    pub loading: bool,
    pub error: Option<String>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            is_authenticated: false,
            user_info: None,
            loading: true,
            error: None,
        }
    }
}

/// What is currently stored, without revealing any token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenSummary {
    pub has_access_token: bool,
    pub access_token_length: usize,
    /// `None` when there is no access token to inspect.
    pub access_token_expired: Option<bool>,
    pub has_refresh_token: bool,
    pub refresh_token_length: usize,
    pub expires_in: Option<u64>,
    pub scope: Option<String>,
}

/// One signed-in (or signing-in) user of the portal.
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use osm_portal::auth::{MemoryTokenStore, RecordingNavigator};
/// use osm_portal::config::PortalConfig;
/// use osm_portal::session::PortalSession;
///
/// # async fn example() -> osm_portal::error::Result<()> {
/// let config = PortalConfig::from_env()?;
/// let session = PortalSession::new(
///     Arc::new(config),
///     Arc::new(MemoryTokenStore::new()),
///     Arc::new(RecordingNavigator::new()),
/// );
/// session.login::<&str>(&[])?;
/// # Ok(())
/// # }
/// ```
pub struct PortalSession {
    config: Arc<PortalConfig>,
    store: Arc<dyn TokenStore>,
    oauth: OAuth2Client,
    api: SecureApiClient,
    state: RwLock<SessionState>,
}

impl PortalSession {
    pub fn new(
        config: Arc<PortalConfig>,
        store: Arc<dyn TokenStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self {
            oauth: OAuth2Client::new(
                Arc::clone(&config),
                Arc::clone(&store),
                Arc::clone(&navigator),
            ),
            api: SecureApiClient::new(Arc::clone(&config), Arc::clone(&store), navigator),
            config,
            store,
            state: RwLock::new(SessionState::default()),
        }
    }

    /// Use `client` for every request the session makes.
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.oauth = self.oauth.with_http_client(client.clone());
        self.api = self.api.with_http_client(client);
        self
    }

    pub fn config(&self) -> &PortalConfig {
        &self.config
    }

    pub fn oauth(&self) -> &OAuth2Client {
        &self.oauth
    }

    pub fn api(&self) -> &SecureApiClient {
        &self.api
    }

    pub fn state(&self) -> SessionState {
        self.state
            .read()
            .map(|state| state.clone())
            .unwrap_or_default()
    }

    /// Summarize the stored token set.
    pub fn token_summary(&self) -> Result<TokenSummary> {
        let read = |key: StoreKey| -> Result<Option<String>> {
            Ok(self.store.get(key)?.filter(|v: &String| !v.is_empty()))
        };
        let access_token = read(StoreKey::AccessToken)?;
        let refresh_token = read(StoreKey::RefreshToken)?;
        Ok(TokenSummary {
            has_access_token: access_token.is_some(),
            access_token_length: access_token.as_ref().map_or(0, String::len),
            access_token_expired: access_token
                .as_deref()
                .map(|token| self.api.is_token_expired(token)),
            has_refresh_token: refresh_token.is_some(),
            refresh_token_length: refresh_token.as_ref().map_or(0, String::len),
            expires_in: read(StoreKey::ExpiresIn)?.and_then(|v| v.trim().parse().ok()),
            scope: read(StoreKey::Scope)?,
        })
    }

    /// Re-derive the session state from the stored token and the userinfo
    /// endpoint.
    ///
    /// An API error clears the stored access and refresh tokens.
    pub async fn check_auth(&self) -> SessionState {
        let has_token = matches!(self.store.get(StoreKey::AccessToken), Ok(Some(t)) if !t.is_empty());
        if !has_token {
            self.update(|state| {
                state.is_authenticated = false;
                state.user_info = None;
                state.loading = false;
            });
            return self.state();
        }

        tracing::debug!("Checking authentication status");
        match self.api.get_user_info().await {
            Ok(Some(info)) => {
                tracing::info!(sub = %info.sub, "Authentication check successful");
                self.update(|state| {
                    state.is_authenticated = true;
                    state.user_info = Some(info);
                    state.error = None;
                    state.loading = false;
                });
            }
            Ok(None) => {
                self.update(|state| {
                    state.is_authenticated = false;
                    state.user_info = None;
                    state.loading = false;
                });
            }
            Err(err) => {
                tracing::warn!(error = %err, "Authentication check failed");
                for key in [StoreKey::AccessToken, StoreKey::RefreshToken] {
                    if let Err(err) = self.store.remove(key) {
                        tracing::warn!(key = %key, error = %err, "Failed to clear token");
                    }
                }
                self.update(|state| {
                    state.is_authenticated = false;
                    state.user_info = None;
                    state.error = Some("Authentication failed".to_string());
                    state.loading = false;
                });
            }
        }
        self.state()
    }

    /// Start the authorization redirect. An empty list requests the
    /// configured default scopes.
    pub fn login<S: AsRef<str>>(&self, scopes: &[S]) -> Result<AuthorizationRequest> {
        tracing::info!("Starting OAuth2 login");
        let request = if scopes.is_empty() {
            self.oauth.start_authorization(self.config.default_scopes())?
        } else {
            self.oauth.start_authorization(scopes)?
        };
        Ok(request)
    }

    /// Revoke and forget every token. Revocation failures are logged only.
    pub async fn logout(&self) {
        tracing::info!("Logging out");
        if let Err(err) = self.api.revoke_all_tokens().await {
            tracing::warn!(error = %err, "Token revocation failed during logout");
        }
        self.update(|state| {
            state.is_authenticated = false;
            state.user_info = None;
            state.error = None;
            state.loading = false;
        });
    }

    /// Complete the redirect back to the client and load the profile.
    pub async fn handle_callback(&self, current_url: &str) -> Result<TokenSet> {
        match self.oauth.handle_callback(current_url).await {
            Ok(tokens) => {
                self.check_auth().await;
                Ok(tokens)
            }
            Err(err) => {
                tracing::warn!(error = %err, "OAuth2 callback failed");
                let message = err.to_string();
                self.update(|state| {
                    state.is_authenticated = false;
                    state.error = Some(message);
                    state.loading = false;
                });
                Err(err.into())
            }
        }
    }

    /// Reload the profile, bypassing the cache.
    pub async fn refresh_user_info(&self) -> Result<Option<UserInfo>> {
        self.api.clear_cache();
        match self.api.get_user_info().await {
            Ok(info) => {
                let loaded = info.clone();
                self.update(|state| {
                    if loaded.is_some() {
                        state.user_info = loaded;
                    }
                    state.error = None;
                });
                Ok(info)
            }
            Err(err) => {
                tracing::warn!(error = %err, "Failed to refresh user info");
                self.update(|state| {
                    state.error = Some("Failed to refresh user information".to_string());
                });
                Err(err.into())
            }
        }
    }

    /// Explicit refresh, then re-check the session.
    pub async fn refresh_token(&self, refresh_token: Option<&str>) -> Result<TokenSet> {
        match self.api.refresh_access_token(refresh_token).await {
            Ok(tokens) => {
                self.check_auth().await;
                Ok(tokens)
            }
            Err(err) => {
                tracing::warn!(error = %err, "Token refresh failed");
                self.update(|state| {
                    state.is_authenticated = false;
                    state.error = Some("Token refresh failed".to_string());
                });
                Err(err.into())
            }
        }
    }

    pub async fn revoke_access_token(&self, access_token: Option<&str>) -> Result<()> {
        self.api
            .revoke_access_token(access_token)
            .await
            .map_err(|err| {
                tracing::warn!(error = %err, "Access token revocation failed");
                err.into()
            })
    }

    pub async fn revoke_refresh_token(&self, refresh_token: Option<&str>) -> Result<()> {
        self.api
            .revoke_refresh_token(refresh_token)
            .await
            .map_err(|err| {
                tracing::warn!(error = %err, "Refresh token revocation failed");
                err.into()
            })
    }

    /// Valid access token, refreshing it if needed. A usable token also
    /// re-checks the session.
    pub async fn validate_and_refresh_token(&self) -> Option<String> {
        let token = self.api.validate_and_refresh_token().await;
        if token.is_some() {
            self.check_auth().await;
        }
        token
    }

    pub async fn openid_configuration(&self) -> Result<OpenIdConfiguration> {
        Ok(self.oauth.get_openid_configuration().await?)
    }

    pub async fn jwks(&self) -> Result<Jwks> {
        Ok(self.oauth.get_jwks().await?)
    }

    /// Authenticated call through the session's API client.
    pub async fn call_api(&self, endpoint: &str, request: ApiRequest) -> Result<Option<Value>> {
        Ok(self.api.call_api(endpoint, request).await?)
    }

    pub fn clear_cache(&self) {
        self.api.clear_cache();
    }

    fn update(&self, apply: impl FnOnce(&mut SessionState)) {
        if let Ok(mut state) = self.state.write() {
            apply(&mut state);
        }
    }
}
