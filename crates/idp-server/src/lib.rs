//! # idp-server
//!
//! Axum server hosting the SAML identity provider.
//!
//! The IdP itself is configured by the JSON file named in `IDP_CONFIG`.
//! Logins are performed by a fronting authentication proxy which passes
//! the username in a header; user attributes come from the directory in
//! `IDP_USERS`.
//!
//! ## Usage
//!
//! ```ignore
//! use idp_server::{Server, ServerConfig};
//!
//! let config = ServerConfig::from_env()?;
//! Server::new(config)?.run().await?;
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod config;
pub mod providers;
pub mod router;

pub use config::ServerConfig;
pub use router::create_router;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;

use idp_saml::config::IdpConfig;
use idp_saml::identity::ProcessorRegistry;
use idp_saml::idp::IdentityProvider;

use crate::providers::{HeaderPrincipalResolver, InMemorySessionStore, UserDirectory};

/// The IdP server.
pub struct Server {
    config: ServerConfig,
    idp: Arc<IdentityProvider>,
    users: Arc<UserDirectory>,
}

impl Server {
    /// Creates a server with the base processor only.
    ///
    /// # Errors
    ///
    /// Fails if the IdP configuration, its key material, the SP metadata
    /// or the user directory cannot be loaded.
    pub fn new(config: ServerConfig) -> anyhow::Result<Self> {
        Self::with_processors(config, &ProcessorRegistry::default())
    }

    /// Creates a server resolving SP processors from `processors`.
    ///
    /// # Errors
    ///
    /// See [`Server::new`].
    pub fn with_processors(config: ServerConfig, processors: &ProcessorRegistry) -> anyhow::Result<Self> {
        let idp_config = IdpConfig::from_file(&config.idp_config)?;
        let idp = IdentityProvider::from_config(idp_config, processors)?;
        tracing::info!(
            entity_id = %idp.config().entity_id,
            service_providers = idp.registry().len(),
            "identity provider loaded"
        );

        let users = match &config.users_file {
            Some(path) => UserDirectory::from_file(path)?,
            None => {
                tracing::warn!("IDP_USERS not set, no user can log in");
                UserDirectory::default()
            }
        };
        tracing::info!(users = users.len(), "user directory loaded");

        Ok(Self {
            config,
            idp: Arc::new(idp),
            users: Arc::new(users),
        })
    }

    /// Runs the server until it receives a shutdown signal.
    ///
    /// # Errors
    ///
    /// Fails if the address cannot be bound.
    pub async fn run(self) -> anyhow::Result<()> {
        let app = self.router();

        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port).parse()?;
        let listener = TcpListener::bind(addr).await?;

        tracing::info!("Server listening on http://{}", listener.local_addr()?);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }

    /// Returns the server configuration.
    #[must_use]
    pub const fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns the identity provider.
    #[must_use]
    pub fn idp(&self) -> &Arc<IdentityProvider> {
        &self.idp
    }

    /// Builds the router without starting the server.
    pub fn router(&self) -> Router {
        create_router(
            Arc::clone(&self.idp),
            Arc::new(InMemorySessionStore::new(self.config.session_ttl())),
            Arc::new(HeaderPrincipalResolver::new(
                self.config.user_header.clone(),
                Arc::clone(&self.users),
            )),
        )
    }
}

/// Waits for a shutdown signal.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "cannot listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
