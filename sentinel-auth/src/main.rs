//! sentinel-auth server
//!
//! Serves `POST /invite` and the console MFA API.

use sentinel_auth::api::ApiServer;
use sentinel_auth::config::{Config, ProviderKind};
use sentinel_auth::identity::{HttpIdentityProvider, IdentityProvider, InMemoryIdentityProvider};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args().nth(1);
    let config = Config::load(config_path.as_deref().map(Path::new))?;

    sentinel_auth::logging::init(&config.logging);

    info!("Starting sentinel-auth v{}", env!("CARGO_PKG_VERSION"));
    match &config_path {
        Some(path) => info!("Configuration loaded from {}", path),
        None => info!("No config file specified, using defaults and environment"),
    }

    let provider: Arc<dyn IdentityProvider> = match config.provider.kind {
        ProviderKind::Http => {
            info!("Using identity service at {}", config.provider.base_url);
            if config.provider.service_role_key.is_none() {
                warn!("provider.service_role_key not set, invites will fail");
            }
            Arc::new(HttpIdentityProvider::from_config(&config.provider)?)
        }
        ProviderKind::Memory => {
            warn!("Using in-memory identity provider, all state is lost on restart");
            let provider = Arc::new(InMemoryIdentityProvider::from_config(&config.provider));

            if let Ok(email) = std::env::var("SENTINEL_DEV_ADMIN") {
                let (user, token) = provider.sign_in(&email).await?;
                info!("Development admin {} ({}) signed in", user.email, user.id);
                println!("{}", token.as_str());
            }
            provider
        }
    };

    let server = ApiServer::new(provider, &config);
    server.run().await?;

    Ok(())
}
