use std::sync::Arc;

use super::claims;
use super::navigator::Navigator;
use super::refresh::TokenRefresher;
use super::store::{StoreKey, TokenStore, TokenStoreExt};
use crate::config::PortalConfig;

/// Keeps the stored access token usable, or tears the session down.
///
/// Every dead end ends the same way: stored session keys cleared and the
/// navigator sent to the login route. Nothing here returns an error.
pub struct TokenManager {
    store: Arc<dyn TokenStore>,
    navigator: Arc<dyn Navigator>,
    refresher: TokenRefresher,
    login_route: String,
}

impl TokenManager {
    pub fn new(
        config: Arc<PortalConfig>,
        store: Arc<dyn TokenStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        let login_route = config.login_route().to_string();
        Self {
            refresher: TokenRefresher::new(config, Arc::clone(&store)),
            store,
            navigator,
            login_route,
        }
    }

    /// Use `refresher` instead of a private one, so refreshes coalesce with
    /// other holders of the same refresher.
    pub fn with_refresher(mut self, refresher: TokenRefresher) -> Self {
        self.refresher = refresher;
        self
    }

    pub fn refresher(&self) -> &TokenRefresher {
        &self.refresher
    }

    /// Fail-closed expiry check on the token's `exp` claim.
    pub fn is_token_expired(&self, token: &str) -> bool {
        claims::is_token_expired(token)
    }

    /// Return `token` if still valid, otherwise a refreshed access token.
    ///
    /// `None` means the session was torn down and the user sent to login.
    pub async fn validate_token_before_use(&self, token: &str) -> Option<String> {
        if !self.is_token_expired(token) {
            return Some(token.to_string());
        }
        tracing::debug!("Access token expired; attempting refresh");
        self.refresh_access_token().await
    }

    /// Refresh with the stored refresh token.
    ///
    /// A missing refresh token or a failed refresh redirects to login and
    /// returns `None`; refresh failures are not retried. When several callers
    /// share one failed refresh, only the one that issued it redirects.
    pub async fn refresh_access_token(&self) -> Option<String> {
        let refresh_token = match self.store.get(StoreKey::RefreshToken) {
            Ok(Some(token)) if !token.is_empty() => token,
            Ok(_) => {
                tracing::info!("No refresh token available");
                self.redirect_to_login();
                return None;
            }
            Err(err) => {
                tracing::warn!(error = %err, "Failed to read refresh token");
                self.redirect_to_login();
                return None;
            }
        };

        let outcome = self.refresher.refresh_tracked(&refresh_token).await;
        match outcome.result {
            Ok(tokens) => Some(tokens.access_token),
            Err(err) if outcome.started => {
                tracing::warn!(error = %err, "Token refresh failed");
                self.redirect_to_login();
                None
            }
            // The caller that issued the shared request tears the session down.
            Err(err) => {
                tracing::debug!(error = %err, "Joined token refresh failed");
                None
            }
        }
    }

    /// Clear every stored session key and navigate to the login route.
    pub fn redirect_to_login(&self) {
        if let Err(err) = self.store.clear_session() {
            tracing::warn!(error = %err, "Failed to clear session before login redirect");
        }
        tracing::info!(route = %self.login_route, "Redirecting to login");
        self.navigator.navigate(&self.login_route);
    }
}
