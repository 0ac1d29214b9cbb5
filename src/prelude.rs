//! Convenience re-exports for common use.

pub use crate::api::{ApiRequest, SecureApiClient, UserInfo};
pub use crate::auth::{
    AuthError, FileTokenStore, MemoryTokenStore, Navigator, OAuth2Client, TokenManager, TokenSet,
    TokenStore,
};
pub use crate::config::PortalConfig;
pub use crate::error::{PortalError, Result};
pub use crate::session::{PortalSession, SessionState, TokenSummary};
