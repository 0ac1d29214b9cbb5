#![allow(dead_code)]

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use osm_portal::auth::{MemoryTokenStore, RecordingNavigator, StoreKey, TokenStore};
use osm_portal::config::PortalConfig;
use serde_json::{json, Value};

pub const CLIENT_ID: &str = "portal-client";
pub const CLIENT_SECRET: &str = "portal-secret";
pub const REDIRECT_URI: &str = "http://localhost:3000/oauth/callback";
/// `Basic base64("portal-client:portal-secret")`
pub const BASIC_AUTH: &str = "Basic cG9ydGFsLWNsaWVudDpwb3J0YWwtc2VjcmV0";

/// Unsigned compact JWT carrying `claims`.
pub fn jwt(claims: Value) -> String {
    format!(
        "{}.{}.signature",
        URL_SAFE_NO_PAD.encode(r#"{"alg":"RS256","typ":"JWT"}"#),
        URL_SAFE_NO_PAD.encode(claims.to_string())
    )
}

/// JWT for `sub` expiring an hour from now.
pub fn fresh_jwt(sub: &str) -> String {
    jwt(json!({"sub": sub, "exp": Utc::now().timestamp() + 3600}))
}

/// JWT for `sub` that expired an hour ago.
pub fn expired_jwt(sub: &str) -> String {
    jwt(json!({"sub": sub, "exp": Utc::now().timestamp() - 3600}))
}

pub fn test_config(base_url: &str) -> Arc<PortalConfig> {
    Arc::new(
        PortalConfig::new(CLIENT_ID, CLIENT_SECRET, base_url, REDIRECT_URI)
            .expect("valid test config"),
    )
}

pub fn token_response(access_token: &str, refresh_token: Option<&str>) -> Value {
    let mut body = json!({
        "access_token": access_token,
        "token_type": "Bearer",
        "expires_in": 3600,
        "scope": "openid profile"
    });
    if let Some(refresh_token) = refresh_token {
        body["refresh_token"] = json!(refresh_token);
    }
    body
}

pub fn user_info_body(sub: &str) -> Value {
    json!({
        "sub": sub,
        "name": "Somchai Jaidee",
        "user_type": "osm",
        "osm_code": "OSM-0001",
        "province_code": "10",
        "province_name": "Bangkok",
        "district_code": "1001",
        "district_name": "Phra Nakhon",
        "subdistrict_code": "100101",
        "subdistrict_name": "Phra Borom Maha Ratchawang",
        "email": null,
        "client_id": CLIENT_ID
    })
}

/// Shared store and navigator for one test.
pub struct Fixture {
    pub config: Arc<PortalConfig>,
    pub store: Arc<MemoryTokenStore>,
    pub navigator: Arc<RecordingNavigator>,
}

impl Fixture {
    pub fn new(base_url: &str) -> Self {
        Self {
            config: test_config(base_url),
            store: Arc::new(MemoryTokenStore::new()),
            navigator: Arc::new(RecordingNavigator::new()),
        }
    }

    pub fn store(&self) -> Arc<dyn TokenStore> {
        self.store.clone()
    }

    pub fn seed(&self, key: StoreKey, value: &str) {
        self.store.set(key, value).expect("seed store");
    }

    pub fn stored(&self, key: StoreKey) -> Option<String> {
        self.store.get(key).expect("read store")
    }
}
