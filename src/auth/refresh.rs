//! Refresh-token grant with request coalescing.

use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, FutureExt, Shared};

use super::error::{response_detail, AuthError};
use super::store::{TokenStore, TokenStoreExt};
use super::token::TokenSet;
use crate::config::PortalConfig;

type RefreshFuture = Shared<BoxFuture<'static, Result<TokenSet, AuthError>>>;

struct InFlight {
    refresh_token: String,
    future: RefreshFuture,
}

/// Issues `grant_type=refresh_token` requests.
///
/// Concurrent callers presenting the same refresh token share a single
/// request and all receive its outcome. The new token set is persisted once,
/// before any caller resumes. Clones share the in-flight slot.
#[derive(Clone)]
pub struct TokenRefresher {
    config: Arc<PortalConfig>,
    http: reqwest::Client,
    store: Arc<dyn TokenStore>,
    in_flight: Arc<Mutex<Option<InFlight>>>,
}

impl TokenRefresher {
    pub fn new(config: Arc<PortalConfig>, store: Arc<dyn TokenStore>) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            store,
            in_flight: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    /// Exchange `refresh_token` for a new token set, joining a request that is
    /// already running for the same token.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenSet, AuthError> {
        self.refresh_tracked(refresh_token).await.result
    }

    /// Like [`refresh`](Self::refresh), also reporting whether this call
    /// issued the request or joined one already in flight.
    pub(crate) async fn refresh_tracked(&self, refresh_token: &str) -> RefreshOutcome {
        let (future, started) = match self.in_flight.lock() {
            Ok(mut slot) => match slot.as_ref() {
                Some(in_flight) if in_flight.refresh_token == refresh_token => {
                    tracing::debug!("Joining in-flight token refresh");
                    (in_flight.future.clone(), false)
                }
                _ => {
                    let future = request_refresh(
                        Arc::clone(&self.config),
                        self.http.clone(),
                        Arc::clone(&self.store),
                        refresh_token.to_string(),
                    )
                    .boxed()
                    .shared();
                    *slot = Some(InFlight {
                        refresh_token: refresh_token.to_string(),
                        future: future.clone(),
                    });
                    (future, true)
                }
            },
            Err(_) => {
                return RefreshOutcome {
                    result: Err(AuthError::Io("refresh slot lock poisoned".to_string())),
                    started: true,
                }
            }
        };

        let result = future.clone().await;

        if let Ok(mut slot) = self.in_flight.lock() {
            if slot
                .as_ref()
                .is_some_and(|in_flight| in_flight.future.ptr_eq(&future))
            {
                *slot = None;
            }
        }
        RefreshOutcome { result, started }
    }
}

pub(crate) struct RefreshOutcome {
    pub(crate) result: Result<TokenSet, AuthError>,
    /// False when the caller joined a request another caller issued.
    pub(crate) started: bool,
}

async fn request_refresh(
    config: Arc<PortalConfig>,
    http: reqwest::Client,
    store: Arc<dyn TokenStore>,
    refresh_token: String,
) -> Result<TokenSet, AuthError> {
    tracing::debug!("Refreshing access token");
    let response = http
        .post(config.token_endpoint())
        .basic_auth(config.client_id(), Some(config.client_secret()))
        .form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.as_str()),
        ])
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status();
        let detail = response_detail(response).await;
        tracing::warn!(%status, detail = %detail, "Token refresh rejected");
        return Err(AuthError::TokenRefreshFailed(detail));
    }

    let tokens: TokenSet = response
        .json()
        .await
        .map_err(|e| AuthError::InvalidResponse(format!("token response: {e}")))?;
    store.persist_token_set(&tokens)?;
    tracing::info!(
        rotated = tokens.refresh_token.is_some(),
        "Token refresh successful"
    );
    Ok(tokens)
}
