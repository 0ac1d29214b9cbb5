//! Bearer-authenticated calls to the portal API.

use std::sync::Arc;

use bon::Builder;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::error::response_detail;
use crate::auth::{
    claims, AuthError, Navigator, StoreKey, TokenManager, TokenRefresher, TokenSet, TokenStore,
    TokenStoreExt, TokenTypeHint,
};
use crate::config::PortalConfig;
use crate::util::ResponseCache;

const USERINFO_CACHE_KEY: &str = "userinfo";
const PROFILE_PATH: &str = "/profile";

/// Profile record returned by the userinfo endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserInfo {
    pub sub: String,
    pub name: String,
    pub user_type: String,
    pub osm_code: String,
    pub province_code: String,
    pub province_name: String,
    pub district_code: String,
    pub district_name: String,
    pub subdistrict_code: String,
    pub subdistrict_name: String,
    pub email: Option<String>,
    pub client_id: String,
}

/// Options for [`SecureApiClient::call_api`].
///
/// Headers are applied after the defaults (`Authorization`,
/// `Content-Type: application/json`) and replace them by name.
///
/// # Example
/// ```
/// use osm_portal::api::ApiRequest;
/// use reqwest::Method;
/// use serde_json::json;
///
/// let request = ApiRequest::builder()
///     .method(Method::PUT)
///     .body(json!({"name": "Somchai"}))
///     .build();
/// assert_eq!(request.method, Method::PUT);
/// ```
#[derive(Debug, Clone, Builder)]
pub struct ApiRequest {
    #[builder(default = Method::GET)]
    pub method: Method,
    pub body: Option<Value>,
    #[builder(default)]
    pub headers: HeaderMap,
}

impl Default for ApiRequest {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// API client that validates, refreshes and revokes the stored tokens.
pub struct SecureApiClient {
    config: Arc<PortalConfig>,
    http: reqwest::Client,
    store: Arc<dyn TokenStore>,
    manager: TokenManager,
    refresher: TokenRefresher,
    cache: ResponseCache,
}

impl SecureApiClient {
    pub fn new(
        config: Arc<PortalConfig>,
        store: Arc<dyn TokenStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        let refresher = TokenRefresher::new(Arc::clone(&config), Arc::clone(&store));
        let manager = TokenManager::new(Arc::clone(&config), Arc::clone(&store), navigator)
            .with_refresher(refresher.clone());
        Self {
            cache: ResponseCache::new(config.cache_ttl()),
            http: reqwest::Client::new(),
            config,
            store,
            manager,
            refresher,
        }
    }

    /// Use `client` for API, refresh and revocation requests.
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.refresher = self.refresher.with_http_client(client.clone());
        self.manager = self.manager.with_refresher(self.refresher.clone());
        self.http = client;
        self
    }

    pub fn token_manager(&self) -> &TokenManager {
        &self.manager
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Call `endpoint` (relative to the base URL) with the stored access
    /// token.
    ///
    /// `Ok(None)` means the call could not be authorized: no stored token,
    /// a refresh that failed (the session is then torn down), or a second
    /// 401 after one refresh-and-retry. Empty success bodies decode to
    /// `Value::Null`.
    pub async fn call_api(
        &self,
        endpoint: &str,
        request: ApiRequest,
    ) -> Result<Option<Value>, AuthError> {
        let Some(stored) = self.stored(StoreKey::AccessToken)? else {
            tracing::info!(endpoint, "No access token found");
            self.manager.redirect_to_login();
            return Ok(None);
        };
        let Some(mut token) = self.manager.validate_token_before_use(&stored).await else {
            tracing::info!(endpoint, "Token validation failed");
            return Ok(None);
        };

        let mut retried = false;
        loop {
            tracing::debug!(endpoint, method = %request.method, "Calling API");
            let response = self.send(endpoint, &request, &token).await?;
            let status = response.status();

            if status == StatusCode::UNAUTHORIZED {
                if retried {
                    tracing::warn!(endpoint, "API still unauthorized after token refresh");
                    return Ok(None);
                }
                tracing::info!(endpoint, "API returned 401; refreshing token");
                match self.manager.refresh_access_token().await {
                    Some(refreshed) => {
                        token = refreshed;
                        retried = true;
                        continue;
                    }
                    None => return Ok(None),
                }
            }

            if !status.is_success() {
                let detail = response_detail(response).await;
                tracing::warn!(endpoint, %status, detail = %detail, "API call failed");
                return Err(AuthError::ApiCall {
                    status: status.as_u16(),
                    detail,
                });
            }

            let body = response.bytes().await?;
            if body.is_empty() {
                return Ok(Some(Value::Null));
            }
            let value = serde_json::from_slice(&body).map_err(|e| {
                AuthError::InvalidResponse(format!("{endpoint} returned invalid JSON: {e}"))
            })?;
            return Ok(Some(value));
        }
    }

    /// Cache-first read of the userinfo endpoint.
    pub async fn get_user_info(&self) -> Result<Option<UserInfo>, AuthError> {
        if let Some(cached) = self.cache.get(USERINFO_CACHE_KEY) {
            return Ok(Some(decode_user_info(cached)?));
        }
        let Some(value) = self
            .call_api(&self.config.userinfo_path(), ApiRequest::default())
            .await?
        else {
            return Ok(None);
        };
        let info = decode_user_info(value.clone())?;
        self.cache.insert(USERINFO_CACHE_KEY, value);
        Ok(Some(info))
    }

    pub async fn get_client_scopes(&self, client_id: &str) -> Result<Option<Value>, AuthError> {
        let endpoint = format!("/client-scopes/{}", urlencoding::encode(client_id));
        self.call_api(&endpoint, ApiRequest::default()).await
    }

    pub async fn get_profile(&self) -> Result<Option<Value>, AuthError> {
        self.call_api(PROFILE_PATH, ApiRequest::default()).await
    }

    /// `PUT /profile`. The cache is cleared before the call.
    pub async fn update_profile(&self, data: Value) -> Result<Option<Value>, AuthError> {
        self.cache.clear();
        let request = ApiRequest::builder().method(Method::PUT).body(data).build();
        self.call_api(PROFILE_PATH, request).await
    }

    /// Refresh with `refresh_token`, or the stored one when `None`.
    ///
    /// Unlike [`TokenManager::refresh_access_token`] a failure is returned to
    /// the caller and the session is left in place. Success clears the cache.
    pub async fn refresh_access_token(
        &self,
        refresh_token: Option<&str>,
    ) -> Result<TokenSet, AuthError> {
        let refresh_token = match refresh_token.filter(|t| !t.is_empty()) {
            Some(token) => token.to_string(),
            None => self
                .stored(StoreKey::RefreshToken)?
                .ok_or(AuthError::NoRefreshToken)?,
        };
        let tokens = self.refresher.refresh(&refresh_token).await?;
        self.cache.clear();
        Ok(tokens)
    }

    pub async fn revoke_access_token(&self, access_token: Option<&str>) -> Result<(), AuthError> {
        self.revoke(TokenTypeHint::AccessToken, access_token).await
    }

    pub async fn revoke_refresh_token(
        &self,
        refresh_token: Option<&str>,
    ) -> Result<(), AuthError> {
        self.revoke(TokenTypeHint::RefreshToken, refresh_token).await
    }

    /// Revoke both stored tokens, then clear the session and cache.
    ///
    /// Local state is cleared even when a revocation fails; the first error
    /// is returned afterwards.
    pub async fn revoke_all_tokens(&self) -> Result<(), AuthError> {
        tracing::info!("Revoking all tokens");
        let mut first_error = None;

        for hint in [TokenTypeHint::AccessToken, TokenTypeHint::RefreshToken] {
            let outcome = match self.stored(store_key(hint)) {
                Ok(Some(token)) => self.revoke(hint, Some(&token)).await,
                Ok(None) => Ok(()),
                Err(err) => Err(err),
            };
            if let Err(err) = outcome {
                tracing::warn!(%hint, error = %err, "Token revocation failed during logout");
                first_error.get_or_insert(err);
            }
        }

        if let Err(err) = self.store.clear_session() {
            first_error.get_or_insert(err);
        }
        self.cache.clear();

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    pub fn is_token_expired(&self, token: &str) -> bool {
        claims::is_token_expired(token)
    }

    /// The stored access token, refreshed first if it has expired.
    ///
    /// Returns `None` when there is no access token, no refresh token, or
    /// the refresh fails. Never redirects.
    pub async fn validate_and_refresh_token(&self) -> Option<String> {
        let access_token = self.stored(StoreKey::AccessToken).ok().flatten()?;
        if !self.is_token_expired(&access_token) {
            return Some(access_token);
        }
        tracing::debug!("Access token expired; refreshing");
        let Some(refresh_token) = self.stored(StoreKey::RefreshToken).ok().flatten() else {
            tracing::info!("No refresh token available");
            return None;
        };
        match self.refresh_access_token(Some(&refresh_token)).await {
            Ok(tokens) => Some(tokens.access_token),
            Err(err) => {
                tracing::warn!(error = %err, "Token refresh failed");
                None
            }
        }
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    async fn send(
        &self,
        endpoint: &str,
        request: &ApiRequest,
        token: &str,
    ) -> Result<reqwest::Response, AuthError> {
        let bearer = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
            AuthError::InvalidResponse("access token is not a valid header value".to_string())
        })?;
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.extend(request.headers.clone());

        let mut builder = self
            .http
            .request(request.method.clone(), self.config.api_url(endpoint))
            .headers(headers);
        if let Some(body) = &request.body {
            builder = builder.body(serde_json::to_vec(body)?);
        }
        Ok(builder.send().await?)
    }

    async fn revoke(&self, hint: TokenTypeHint, token: Option<&str>) -> Result<(), AuthError> {
        let key = store_key(hint);
        let token = match token.filter(|t| !t.is_empty()) {
            Some(token) => token.to_string(),
            None => self.stored(key)?.ok_or(AuthError::NoToken(hint))?,
        };

        tracing::debug!(%hint, "Revoking token");
        let response = self
            .http
            .post(self.config.revoke_endpoint())
            .basic_auth(self.config.client_id(), Some(self.config.client_secret()))
            .form(&[("token", token.as_str()), ("token_type_hint", hint.as_ref())])
            .send()
            .await?;

        if !response.status().is_success() {
            let detail = response_detail(response).await;
            return Err(AuthError::Revocation(detail));
        }
        self.store.remove(key)?;
        tracing::info!(%hint, "Token revoked");
        Ok(())
    }

    fn stored(&self, key: StoreKey) -> Result<Option<String>, AuthError> {
        Ok(self.store.get(key)?.filter(|value| !value.is_empty()))
    }
}

fn store_key(hint: TokenTypeHint) -> StoreKey {
    match hint {
        TokenTypeHint::AccessToken => StoreKey::AccessToken,
        TokenTypeHint::RefreshToken => StoreKey::RefreshToken,
    }
}

fn decode_user_info(value: Value) -> Result<UserInfo, AuthError> {
    serde_json::from_value(value)
        .map_err(|e| AuthError::InvalidResponse(format!("userinfo response: {e}")))
}
