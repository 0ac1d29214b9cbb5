//! CLI entry point for the OSM portal client.

pub mod auth;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// OSM portal OAuth2 client
#[derive(Parser, Debug)]
#[command(name = "osm-portal", version, about = "OSM portal OAuth2 client CLI")]
pub struct Cli {
    /// Directory holding the session file (default: ~/.osm-portal)
    #[arg(long, global = true)]
    pub store_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start authorization and print the URL to open
    Authorize(AuthorizeArgs),
    /// Complete authorization with the URL the portal redirected to
    Callback(CallbackArgs),
    /// Submit credentials for a login page URL
    Login(LoginArgs),
    /// Approve or deny a consent page URL
    Consent(ConsentArgs),
    /// Show the signed-in user's profile
    Me,
    /// Show what is stored for the current session
    Tokens,
    /// Refresh the access token
    Refresh(RefreshArgs),
    /// Check the access token, refreshing it if expired
    Validate,
    /// Revoke one stored token
    Revoke(RevokeArgs),
    /// Revoke all tokens and clear the session
    Logout,
    /// Print the OpenID discovery document
    Discovery,
    /// Print the JSON Web Key Set
    Jwks,
}

/// Arguments for `osm-portal authorize`.
#[derive(Parser, Debug)]
pub struct AuthorizeArgs {
    /// Scopes to request (default: the configured scopes)
    pub scopes: Vec<String>,
}

/// Arguments for `osm-portal callback`.
#[derive(Parser, Debug)]
pub struct CallbackArgs {
    /// Redirect URL including its query string
    pub url: String,
}

/// Arguments for `osm-portal login`.
#[derive(Parser, Debug)]
pub struct LoginArgs {
    /// Login page URL carrying client_id, redirect_uri, scope and state
    pub page_url: String,

    /// Citizen ID or username
    #[arg(short, long)]
    pub username: String,

    /// Password
    #[arg(short, long)]
    pub password: String,

    /// Account type
    #[arg(long, default_value = "osm")]
    pub user_type: String,
}

/// Arguments for `osm-portal consent`.
#[derive(Parser, Debug)]
pub struct ConsentArgs {
    /// Consent page URL carrying client_id, redirect_uri, scope and state
    pub page_url: String,

    /// Deny instead of approving
    #[arg(long)]
    pub deny: bool,
}

/// Arguments for `osm-portal refresh`.
#[derive(Parser, Debug)]
pub struct RefreshArgs {
    /// Refresh token to use instead of the stored one
    #[arg(long)]
    pub refresh_token: Option<String>,
}

/// Arguments for `osm-portal revoke`.
#[derive(Parser, Debug)]
pub struct RevokeArgs {
    /// Which token to revoke
    #[arg(value_enum)]
    pub kind: RevokeKind,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum RevokeKind {
    Access,
    Refresh,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_revoke_kind() {
        let cli = Cli::try_parse_from(["osm-portal", "revoke", "refresh"]).unwrap();
        match cli.command {
            Commands::Revoke(args) => assert_eq!(args.kind, RevokeKind::Refresh),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_global_store_dir_after_subcommand() {
        let cli = Cli::try_parse_from(["osm-portal", "tokens", "--store-dir", "/tmp/s"]).unwrap();
        assert_eq!(cli.store_dir, Some(PathBuf::from("/tmp/s")));
        assert!(matches!(cli.command, Commands::Tokens));
    }

    #[test]
    fn authorize_accepts_scope_list() {
        let cli = Cli::try_parse_from(["osm-portal", "authorize", "openid", "email"]).unwrap();
        match cli.command {
            Commands::Authorize(args) => assert_eq!(args.scopes, vec!["openid", "email"]),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn login_requires_credentials() {
        assert!(Cli::try_parse_from(["osm-portal", "login", "/login?state=s"]).is_err());
    }
}
