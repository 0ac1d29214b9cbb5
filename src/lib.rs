//! OSM portal client.
//!
//! OAuth 2.0 Authorization Code client for the OSM primary health care
//! identity portal: authorization redirect and callback validation, token
//! exchange, refresh and revocation, and bearer-authenticated API calls with
//! a short-lived response cache.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use osm_portal::prelude::*;
//! use osm_portal::auth::RecordingNavigator;
//!
//! # async fn example(callback_url: &str) -> osm_portal::error::Result<()> {
//! let session = PortalSession::new(
//!     Arc::new(PortalConfig::from_env()?),
//!     Arc::new(FileTokenStore::new_default()),
//!     Arc::new(RecordingNavigator::new()),
//! );
//! session.login(&["openid", "profile"])?;
//! // ... the browser comes back to the redirect URI ...
//! session.handle_callback(callback_url).await?;
//! if let Some(user) = session.state().user_info {
//!     println!("signed in as {}", user.name);
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod prelude;
pub mod session;
pub mod util;

#[cfg(feature = "cli")]
pub mod cli;
