//! Portal client configuration (code > env > defaults).

use std::fmt;
use std::time::Duration;

use url::Url;

use crate::error::{PortalError, Result};

const AUTH_PREFIX: &str = "/api/v1/auth";

pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:3000/oauth/callback";
pub const DEFAULT_LOGIN_ROUTE: &str = "/login";
pub const DEFAULT_DISCOVERY_PATH: &str = "/.well-known/openid_configuration";
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_SCOPES: [&str; 4] = ["openid", "profile", "address", "email"];

/// Connection settings for one OAuth2 client registered with the portal.
///
/// Constructed once by the application and shared by `Arc` between every
/// client object of a session.
#[derive(Clone)]
pub struct PortalConfig {
    client_id: String,
    client_secret: String,
    base_url: String,
    redirect_uri: String,
    login_route: String,
    discovery_path: String,
    cache_ttl: Duration,
    default_scopes: Vec<String>,
}

impl fmt::Debug for PortalConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortalConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[redacted]")
            .field("base_url", &self.base_url)
            .field("redirect_uri", &self.redirect_uri)
            .field("login_route", &self.login_route)
            .field("discovery_path", &self.discovery_path)
            .field("cache_ttl", &self.cache_ttl)
            .field("default_scopes", &self.default_scopes)
            .finish()
    }
}

impl PortalConfig {
    /// Create a config from the required client registration values.
    ///
    /// # Errors
    ///
    /// Fails when `client_id` is empty or either URL does not parse.
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        base_url: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Result<Self> {
        let client_id = client_id.into();
        if client_id.trim().is_empty() {
            return Err(PortalError::Configuration(
                "client_id must not be empty".to_string(),
            ));
        }
        let base_url = parse_url("base URL", &base_url.into())?;
        let redirect_uri = redirect_uri.into();
        parse_url("redirect URI", &redirect_uri)?;

        Ok(Self {
            client_id,
            client_secret: client_secret.into(),
            base_url: base_url.as_str().trim_end_matches('/').to_string(),
            redirect_uri,
            login_route: DEFAULT_LOGIN_ROUTE.to_string(),
            discovery_path: DEFAULT_DISCOVERY_PATH.to_string(),
            cache_ttl: DEFAULT_CACHE_TTL,
            default_scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
        })
    }

    /// Load from environment variables, reading `.env` first when present.
    ///
    /// Each of `OAUTH_CLIENT_ID`, `OAUTH_CLIENT_SECRET` and `BACKEND_URL` is
    /// also accepted with a `NEXT_PUBLIC_` prefix.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let read = |name: &str| {
            lookup(name)
                .or_else(|| lookup(&format!("NEXT_PUBLIC_{name}")))
                .filter(|v| !v.trim().is_empty())
        };
        let required = |name: &str| {
            read(name).ok_or_else(|| {
                PortalError::Configuration(format!("{name} environment variable is not set"))
            })
        };

        let mut config = Self::new(
            required("OAUTH_CLIENT_ID")?,
            required("OAUTH_CLIENT_SECRET")?,
            required("BACKEND_URL")?,
            read("OAUTH_REDIRECT_URI").unwrap_or_else(|| DEFAULT_REDIRECT_URI.to_string()),
        )?;

        if let Some(route) = read("PORTAL_LOGIN_ROUTE") {
            config = config.with_login_route(route);
        }
        if let Some(path) = read("PORTAL_DISCOVERY_PATH") {
            config = config.with_discovery_path(path);
        }
        if let Some(secs) = read("PORTAL_CACHE_TTL_SECS") {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                PortalError::Configuration(format!(
                    "PORTAL_CACHE_TTL_SECS must be a whole number of seconds, got '{secs}'"
                ))
            })?;
            config = config.with_cache_ttl(Duration::from_secs(secs));
        }
        if let Some(scopes) = read("PORTAL_SCOPES") {
            config = config.with_default_scopes(parse_scopes(&scopes));
        }
        Ok(config)
    }

    /// Route navigated to when the session must re-authenticate.
    pub fn with_login_route(mut self, route: impl Into<String>) -> Self {
        self.login_route = route.into();
        self
    }

    /// Discovery document path, relative to the base URL.
    pub fn with_discovery_path(mut self, path: impl Into<String>) -> Self {
        self.discovery_path = path.into();
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Scopes requested when a login does not name any.
    pub fn with_default_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.default_scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    pub fn login_route(&self) -> &str {
        &self.login_route
    }

    pub fn cache_ttl(&self) -> Duration {
        self.cache_ttl
    }

    pub fn default_scopes(&self) -> &[String] {
        &self.default_scopes
    }

    /// Absolute URL for a path on the portal backend.
    pub fn api_url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    pub fn authorize_endpoint(&self) -> String {
        self.auth_url("authorize")
    }

    pub fn token_endpoint(&self) -> String {
        self.auth_url("token")
    }

    pub fn revoke_endpoint(&self) -> String {
        self.auth_url("revoke")
    }

    /// Userinfo path relative to the base URL, for bearer-authenticated
    /// calls through the API client.
    pub fn userinfo_path(&self) -> String {
        format!("{AUTH_PREFIX}/userinfo")
    }

    pub fn login_endpoint(&self) -> String {
        self.auth_url("login")
    }

    pub fn consent_endpoint(&self) -> String {
        self.auth_url("consent")
    }

    pub fn discovery_endpoint(&self) -> String {
        self.api_url(&self.discovery_path)
    }

    fn auth_url(&self, name: &str) -> String {
        format!("{}{AUTH_PREFIX}/{name}", self.base_url)
    }
}

/// Split a scope list on commas and whitespace.
pub fn parse_scopes(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_url(label: &str, raw: &str) -> Result<Url> {
    Url::parse(raw.trim())
        .map_err(|e| PortalError::Configuration(format!("invalid {label} '{raw}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    fn sample() -> PortalConfig {
        PortalConfig::new("abc", "secret", "https://portal.example/", "https://app/oauth/callback")
            .unwrap()
    }

    #[test]
    fn new_applies_defaults_and_trims_base_url() {
        let config = sample();
        assert_eq!(config.base_url(), "https://portal.example");
        assert_eq!(config.login_route(), "/login");
        assert_eq!(config.cache_ttl(), Duration::from_secs(300));
        assert_eq!(
            config.default_scopes(),
            &["openid", "profile", "address", "email"]
        );
    }

    #[test]
    fn endpoints_hang_off_auth_prefix() {
        let config = sample();
        assert_eq!(
            config.authorize_endpoint(),
            "https://portal.example/api/v1/auth/authorize"
        );
        assert_eq!(
            config.token_endpoint(),
            "https://portal.example/api/v1/auth/token"
        );
        assert_eq!(
            config.revoke_endpoint(),
            "https://portal.example/api/v1/auth/revoke"
        );
        assert_eq!(
            config.api_url(&config.userinfo_path()),
            "https://portal.example/api/v1/auth/userinfo"
        );
        assert_eq!(
            config.discovery_endpoint(),
            "https://portal.example/.well-known/openid_configuration"
        );
    }

    #[test]
    fn api_url_joins_relative_paths() {
        let config = sample();
        assert_eq!(config.api_url("/profile"), "https://portal.example/profile");
        assert_eq!(config.api_url("profile"), "https://portal.example/profile");
    }

    #[test]
    fn new_rejects_invalid_urls() {
        let err = PortalConfig::new("abc", "s", "not a url", "https://app/cb").unwrap_err();
        assert!(matches!(err, PortalError::Configuration(_)));
        let err = PortalConfig::new("abc", "s", "https://portal", "cb").unwrap_err();
        assert!(matches!(err, PortalError::Configuration(_)));
    }

    #[test]
    fn new_rejects_empty_client_id() {
        let err = PortalConfig::new(" ", "s", "https://portal", "https://app/cb").unwrap_err();
        assert!(matches!(err, PortalError::Configuration(_)));
    }

    #[test]
    fn debug_redacts_secret() {
        let rendered = format!("{:?}", sample());
        assert!(!rendered.contains("\"secret\""));
        assert!(rendered.contains("[redacted]"));
    }

    #[test]
    fn from_lookup_reads_required_and_optional_values() {
        let config = PortalConfig::from_lookup(lookup(&[
            ("OAUTH_CLIENT_ID", "portal-client"),
            ("OAUTH_CLIENT_SECRET", "portal-secret"),
            ("BACKEND_URL", "http://localhost:8000"),
            ("PORTAL_LOGIN_ROUTE", "/signin"),
            ("PORTAL_CACHE_TTL_SECS", "30"),
            ("PORTAL_SCOPES", "openid, profile"),
        ]))
        .unwrap();

        assert_eq!(config.client_id(), "portal-client");
        assert_eq!(config.redirect_uri(), DEFAULT_REDIRECT_URI);
        assert_eq!(config.login_route(), "/signin");
        assert_eq!(config.cache_ttl(), Duration::from_secs(30));
        assert_eq!(config.default_scopes(), &["openid", "profile"]);
    }

    #[test]
    fn from_lookup_accepts_next_public_prefix() {
        let config = PortalConfig::from_lookup(lookup(&[
            ("NEXT_PUBLIC_OAUTH_CLIENT_ID", "web-client"),
            ("NEXT_PUBLIC_OAUTH_CLIENT_SECRET", "web-secret"),
            ("NEXT_PUBLIC_BACKEND_URL", "http://localhost:8000"),
        ]))
        .unwrap();
        assert_eq!(config.client_id(), "web-client");
        assert_eq!(config.client_secret(), "web-secret");
    }

    #[test]
    fn from_lookup_reports_missing_variable() {
        let err = PortalConfig::from_lookup(lookup(&[("OAUTH_CLIENT_ID", "abc")])).unwrap_err();
        match err {
            PortalError::Configuration(message) => {
                assert!(message.contains("OAUTH_CLIENT_SECRET"), "{message}")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn from_lookup_rejects_bad_ttl() {
        let err = PortalConfig::from_lookup(lookup(&[
            ("OAUTH_CLIENT_ID", "abc"),
            ("OAUTH_CLIENT_SECRET", "s"),
            ("BACKEND_URL", "http://localhost:8000"),
            ("PORTAL_CACHE_TTL_SECS", "five"),
        ]))
        .unwrap_err();
        assert!(matches!(err, PortalError::Configuration(_)));
    }

    #[test]
    fn parse_scopes_accepts_commas_and_spaces() {
        assert_eq!(
            parse_scopes("openid,profile  email"),
            vec!["openid", "profile", "email"]
        );
    }
}
