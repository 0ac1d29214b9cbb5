use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};

use super::error::AuthError;
use super::token::TokenSet;

const SESSION_FILE_NAME: &str = "session.toml";
const SESSION_FILE_VERSION: u32 = 1;

/// Keys persisted for a client session.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, AsRefStr, Display, EnumIter, EnumString,
)]
#[strum(serialize_all = "snake_case")]
pub enum StoreKey {
    AccessToken,
    RefreshToken,
    TokenType,
    ExpiresIn,
    Scope,
    OauthState,
}

/// String key/value storage for session state.
///
/// Plays the role browser local storage plays for a web client: any caller
/// may read or write any key.
pub trait TokenStore: Send + Sync {
    fn get(&self, key: StoreKey) -> Result<Option<String>, AuthError>;
    fn set(&self, key: StoreKey, value: &str) -> Result<(), AuthError>;
    fn remove(&self, key: StoreKey) -> Result<(), AuthError>;
}

/// Session-level helpers layered over any [`TokenStore`].
pub trait TokenStoreExt: TokenStore {
    /// Persist a freshly issued token set.
    ///
    /// The refresh token is only overwritten when the server sent one, so a
    /// refresh grant without rotation keeps the previous refresh token.
    fn persist_token_set(&self, tokens: &TokenSet) -> Result<(), AuthError> {
        self.set(StoreKey::AccessToken, &tokens.access_token)?;
        if let Some(refresh_token) = &tokens.refresh_token {
            self.set(StoreKey::RefreshToken, refresh_token)?;
        }
        self.set(StoreKey::TokenType, &tokens.token_type)?;
        let expires_in = tokens.expires_in.map(|v| v.to_string()).unwrap_or_default();
        self.set(StoreKey::ExpiresIn, &expires_in)?;
        self.set(StoreKey::Scope, tokens.scope.as_deref().unwrap_or_default())?;
        Ok(())
    }

    /// Remove every session key.
    ///
    /// Keeps removing after a failure so no key is skipped; the first error
    /// is returned once all keys have been attempted.
    fn clear_session(&self) -> Result<(), AuthError> {
        let mut first_error = None;
        for key in StoreKey::iter() {
            if let Err(err) = self.remove(key) {
                tracing::warn!(key = %key, error = %err, "Failed to clear session key");
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl<T: TokenStore + ?Sized> TokenStoreExt for T {}

/// In-memory token store.
///
/// # Example
/// ```
/// use osm_portal::auth::{MemoryTokenStore, StoreKey, TokenStore};
///
/// let store = MemoryTokenStore::new();
/// store.set(StoreKey::OauthState, "abc")?;
/// assert_eq!(store.get(StoreKey::OauthState)?.as_deref(), Some("abc"));
/// # Ok::<(), osm_portal::auth::AuthError>(())
/// ```
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    values: Mutex<HashMap<StoreKey, String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<StoreKey, String>>, AuthError> {
        self.values
            .lock()
            .map_err(|_| AuthError::Io("token store lock poisoned".to_string()))
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self, key: StoreKey) -> Result<Option<String>, AuthError> {
        Ok(self.lock()?.get(&key).cloned())
    }

    fn set(&self, key: StoreKey, value: &str) -> Result<(), AuthError> {
        self.lock()?.insert(key, value.to_string());
        Ok(())
    }

    fn remove(&self, key: StoreKey) -> Result<(), AuthError> {
        self.lock()?.remove(&key);
        Ok(())
    }
}

/// Configuration for file-backed session storage.
#[derive(Debug, Clone)]
pub struct TokenStoreConfig {
    pub base_dir: PathBuf,
}

impl TokenStoreConfig {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// `~/.osm-portal`, or `./.osm-portal` when no home directory is known.
    pub fn default_dir() -> PathBuf {
        default_portal_dir()
    }
}

/// File-backed token store using a single TOML document.
///
/// Every write rewrites the whole file; the in-process mutex keeps
/// concurrent writers from interleaving.
///
/// # Example
/// ```no_run
/// use osm_portal::auth::{FileTokenStore, StoreKey, TokenStore};
///
/// let store = FileTokenStore::new_default();
/// store.set(StoreKey::AccessToken, "access")?;
/// # Ok::<(), osm_portal::auth::AuthError>(())
/// ```
#[derive(Debug)]
pub struct FileTokenStore {
    path: PathBuf,
    guard: Mutex<()>,
}

impl FileTokenStore {
    pub fn new(config: TokenStoreConfig) -> Self {
        Self {
            path: config.base_dir.join(SESSION_FILE_NAME),
            guard: Mutex::new(()),
        }
    }

    pub fn new_default() -> Self {
        Self::new(TokenStoreConfig::new(TokenStoreConfig::default_dir()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_values(&self) -> Result<BTreeMap<String, String>, AuthError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(err) => return Err(AuthError::Io(err.to_string())),
        };
        let file: SessionFile = toml::from_str(&raw)?;
        if file.version != SESSION_FILE_VERSION {
            return Err(AuthError::Serialization(format!(
                "unsupported session file version {} at {}",
                file.version,
                self.path.display()
            )));
        }
        Ok(file.values)
    }

    fn write_values(&self, values: BTreeMap<String, String>) -> Result<(), AuthError> {
        if values.is_empty() {
            return match fs::remove_file(&self.path) {
                Ok(()) => Ok(()),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(err) => Err(AuthError::Io(err.to_string())),
            };
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = SessionFile {
            version: SESSION_FILE_VERSION,
            saved_at: Utc::now(),
            values,
        };
        let serialized = toml::to_string(&file)?;
        fs::write(&self.path, serialized)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }

    fn update(
        &self,
        apply: impl FnOnce(&mut BTreeMap<String, String>),
    ) -> Result<(), AuthError> {
        let _guard = self
            .guard
            .lock()
            .map_err(|_| AuthError::Io("token store lock poisoned".to_string()))?;
        let mut values = self.read_values()?;
        apply(&mut values);
        self.write_values(values)
    }
}

impl TokenStore for FileTokenStore {
    fn get(&self, key: StoreKey) -> Result<Option<String>, AuthError> {
        Ok(self.read_values()?.remove(key.as_ref()))
    }

    fn set(&self, key: StoreKey, value: &str) -> Result<(), AuthError> {
        self.update(|values| {
            values.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: StoreKey) -> Result<(), AuthError> {
        self.update(|values| {
            values.remove(key.as_ref());
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionFile {
    version: u32,
    saved_at: DateTime<Utc>,
    values: BTreeMap<String, String>,
}

fn default_portal_dir() -> PathBuf {
    directories::UserDirs::new()
        .map(|dirs| dirs.home_dir().join(".osm-portal"))
        .unwrap_or_else(|| PathBuf::from(".osm-portal"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_store() -> (TempDir, FileTokenStore) {
        let dir = TempDir::new().unwrap();
        let store = FileTokenStore::new(TokenStoreConfig::new(dir.path().to_path_buf()));
        (dir, store)
    }

    fn token_set(refresh_token: Option<&str>) -> TokenSet {
        TokenSet {
            access_token: "access".to_string(),
            refresh_token: refresh_token.map(String::from),
            token_type: "Bearer".to_string(),
            expires_in: Some(3600),
            scope: Some("openid profile".to_string()),
        }
    }

    #[test]
    fn store_keys_use_storage_names() {
        let names: Vec<String> = StoreKey::iter().map(|k| k.to_string()).collect();
        assert_eq!(
            names,
            vec![
                "access_token",
                "refresh_token",
                "token_type",
                "expires_in",
                "scope",
                "oauth_state"
            ]
        );
    }

    #[test]
    fn file_store_round_trip_works() {
        let (_dir, store) = temp_store();
        store.set(StoreKey::AccessToken, "access").unwrap();
        store.set(StoreKey::OauthState, "state-123").unwrap();

        let reopened = FileTokenStore::new(TokenStoreConfig::new(
            store.path().parent().unwrap().to_path_buf(),
        ));
        assert_eq!(
            reopened.get(StoreKey::AccessToken).unwrap().as_deref(),
            Some("access")
        );
        assert_eq!(
            reopened.get(StoreKey::OauthState).unwrap().as_deref(),
            Some("state-123")
        );
    }

    #[test]
    fn file_store_missing_file_reads_empty() {
        let (_dir, store) = temp_store();
        assert!(store.get(StoreKey::AccessToken).unwrap().is_none());
    }

    #[test]
    fn file_store_removes_file_when_emptied() {
        let (_dir, store) = temp_store();
        store.set(StoreKey::Scope, "openid").unwrap();
        assert!(store.path().exists());
        store.remove(StoreKey::Scope).unwrap();
        assert!(!store.path().exists());
    }

    #[cfg(unix)]
    #[test]
    fn file_store_restricts_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let (_dir, store) = temp_store();
        store.set(StoreKey::AccessToken, "secret").unwrap();
        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn persist_token_set_writes_every_field() {
        let store = MemoryTokenStore::new();
        store.persist_token_set(&token_set(Some("refresh"))).unwrap();

        assert_eq!(store.get(StoreKey::AccessToken).unwrap().as_deref(), Some("access"));
        assert_eq!(store.get(StoreKey::RefreshToken).unwrap().as_deref(), Some("refresh"));
        assert_eq!(store.get(StoreKey::TokenType).unwrap().as_deref(), Some("Bearer"));
        assert_eq!(store.get(StoreKey::ExpiresIn).unwrap().as_deref(), Some("3600"));
        assert_eq!(store.get(StoreKey::Scope).unwrap().as_deref(), Some("openid profile"));
    }

    #[test]
    fn persist_without_refresh_token_keeps_previous_one() {
        let store = MemoryTokenStore::new();
        store.set(StoreKey::RefreshToken, "old-refresh").unwrap();
        let mut tokens = token_set(None);
        tokens.expires_in = None;
        tokens.scope = None;
        store.persist_token_set(&tokens).unwrap();

        assert_eq!(
            store.get(StoreKey::RefreshToken).unwrap().as_deref(),
            Some("old-refresh")
        );
        assert_eq!(store.get(StoreKey::ExpiresIn).unwrap().as_deref(), Some(""));
        assert_eq!(store.get(StoreKey::Scope).unwrap().as_deref(), Some(""));
    }

    #[test]
    fn clear_session_removes_every_key() {
        let (_dir, store) = temp_store();
        store.persist_token_set(&token_set(Some("refresh"))).unwrap();
        store.set(StoreKey::OauthState, "state").unwrap();

        store.clear_session().unwrap();

        for key in StoreKey::iter() {
            assert!(store.get(key).unwrap().is_none(), "{key} should be cleared");
        }
    }
}
