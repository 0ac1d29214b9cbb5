//! CLI command handlers.

use std::sync::Arc;

use crate::auth::{
    AuthorizationParams, ConsentAction, ConsentRequest, FileTokenStore, LoginRequest, Navigator,
    PortalForms, TokenStore, TokenStoreConfig,
};
use crate::config::PortalConfig;
use crate::session::PortalSession;

use super::{Cli, Commands, RevokeKind};

type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Prints navigation targets instead of opening a browser.
pub struct StdoutNavigator;

impl Navigator for StdoutNavigator {
    fn navigate(&self, location: &str) {
        println!("🔗 Open: {location}");
    }
}

/// Run one CLI command against the persisted session.
pub async fn run(cli: Cli) -> CliResult {
    let config = Arc::new(PortalConfig::from_env()?);
    let store_dir = cli.store_dir.unwrap_or_else(TokenStoreConfig::default_dir);
    tracing::debug!(dir = %store_dir.display(), "Using session store");
    let store: Arc<dyn TokenStore> =
        Arc::new(FileTokenStore::new(TokenStoreConfig::new(store_dir)));
    let session = PortalSession::new(Arc::clone(&config), store, Arc::new(StdoutNavigator));

    match cli.command {
        Commands::Authorize(args) => {
            let request = session.login(&args.scopes)?;
            println!("📋 State: {}", request.state);
            Ok(())
        }
        Commands::Callback(args) => handle_callback(&session, &args.url).await,
        Commands::Login(args) => {
            let request = LoginRequest::builder()
                .username(args.username)
                .password(args.password)
                .user_type(args.user_type)
                .params(AuthorizationParams::from_url(&args.page_url)?)
                .build();
            let location = PortalForms::new(config)?.login(&request).await?;
            println!("✅ Login accepted");
            StdoutNavigator.navigate(&location);
            Ok(())
        }
        Commands::Consent(args) => {
            let action = if args.deny {
                ConsentAction::Deny
            } else {
                ConsentAction::Approve
            };
            let request = ConsentRequest {
                params: AuthorizationParams::from_url(&args.page_url)?,
                action,
            };
            let location = PortalForms::new(config)?.consent(&request).await?;
            StdoutNavigator.navigate(&location);
            println!("   Pass this URL to `osm-portal callback` to finish signing in.");
            Ok(())
        }
        Commands::Me => handle_me(&session).await,
        Commands::Tokens => handle_tokens(&session),
        Commands::Refresh(args) => {
            let tokens = session.refresh_token(args.refresh_token.as_deref()).await?;
            println!("✅ Token refreshed");
            if let Some(expires_in) = tokens.expires_in {
                println!("   Expires in: {expires_in}s");
            }
            Ok(())
        }
        Commands::Validate => match session.validate_and_refresh_token().await {
            Some(_) => {
                println!("✅ Access token is valid");
                Ok(())
            }
            None => Err("no usable access token; run `osm-portal authorize`".into()),
        },
        Commands::Revoke(args) => {
            match args.kind {
                RevokeKind::Access => session.revoke_access_token(None).await?,
                RevokeKind::Refresh => session.revoke_refresh_token(None).await?,
            }
            println!("✅ Token revoked");
            Ok(())
        }
        Commands::Logout => {
            session.logout().await;
            println!("✅ Logged out");
            Ok(())
        }
        Commands::Discovery => {
            let document = session.openid_configuration().await?;
            println!("{}", serde_json::to_string_pretty(&document)?);
            Ok(())
        }
        Commands::Jwks => {
            let jwks = session.jwks().await?;
            println!("{}", serde_json::to_string_pretty(&jwks)?);
            Ok(())
        }
    }
}

async fn handle_callback(session: &PortalSession, url: &str) -> CliResult {
    let tokens = session.handle_callback(url).await?;
    println!("✅ Signed in");
    println!("   Scope: {}", tokens.scope.as_deref().unwrap_or("N/A"));
    if let Some(user) = session.state().user_info {
        println!("   User: {} ({})", user.name, user.sub);
    }
    Ok(())
}

async fn handle_me(session: &PortalSession) -> CliResult {
    let state = session.check_auth().await;
    let Some(user) = state.user_info else {
        let reason = state.error.unwrap_or_else(|| "not signed in".to_string());
        return Err(reason.into());
    };
    println!("Name:         {}", user.name);
    println!("Subject:      {}", user.sub);
    println!("User type:    {}", user.user_type);
    println!("OSM code:     {}", user.osm_code);
    println!(
        "Province:     {} ({})",
        user.province_name, user.province_code
    );
    println!(
        "District:     {} ({})",
        user.district_name, user.district_code
    );
    println!(
        "Subdistrict:  {} ({})",
        user.subdistrict_name, user.subdistrict_code
    );
    println!("Email:        {}", user.email.as_deref().unwrap_or("N/A"));
    println!("Client:       {}", user.client_id);
    Ok(())
}

fn handle_tokens(session: &PortalSession) -> CliResult {
    let summary = session.token_summary()?;
    let presence = |present: bool, len: usize| {
        if present {
            format!("yes ({len} chars)")
        } else {
            "no".to_string()
        }
    };
    println!(
        "Access token:  {}",
        presence(summary.has_access_token, summary.access_token_length)
    );
    if let Some(expired) = summary.access_token_expired {
        println!("  Expired:     {}", if expired { "yes" } else { "no" });
    }
    println!(
        "Refresh token: {}",
        presence(summary.has_refresh_token, summary.refresh_token_length)
    );
    match summary.expires_in {
        Some(secs) => println!("Expires in:    {secs}s"),
        None => println!("Expires in:    N/A"),
    }
    println!(
        "Scope:         {}",
        summary.scope.as_deref().unwrap_or("N/A")
    );
    Ok(())
}
