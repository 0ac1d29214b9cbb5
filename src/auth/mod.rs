//! OAuth2 Authorization Code flow, token lifecycle and session storage.

pub mod claims;
pub mod error;
pub mod forms;
pub mod manager;
pub mod navigator;
pub mod oauth;
pub mod refresh;
pub mod state;
pub mod store;
pub mod token;

pub use error::AuthError;
pub use forms::{
    login_error_message, AuthorizationParams, ConsentAction, ConsentRequest, LoginRequest,
    PortalForms,
};
pub use manager::TokenManager;
pub use navigator::{Navigator, RecordingNavigator};
pub use oauth::{
    AuthorizationRequest, CallbackParams, Jwk, Jwks, OAuth2Client, OpenIdConfiguration,
};
pub use refresh::TokenRefresher;
pub use state::generate_state;
pub use store::{
    FileTokenStore, MemoryTokenStore, StoreKey, TokenStore, TokenStoreConfig, TokenStoreExt,
};
pub use token::{TokenSet, TokenTypeHint};
