//! # SAML IdP Server
//!
//! Main entry point for the identity provider.

#![forbid(unsafe_code)]

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use idp_server::{Server, ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.log_level))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(config = %config.idp_config.display(), "SAML IdP starting");

    Server::new(config)?.run().await
}
