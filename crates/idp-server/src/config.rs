//! Server configuration.
//!
//! Loaded from environment variables (and a `.env` file, if present).
//! Protocol settings live in the JSON file named by `IDP_CONFIG`.

use std::path::PathBuf;
use std::time::Duration;

/// Default header a fronting authentication proxy sets.
pub const DEFAULT_USER_HEADER: &str = "x-remote-user";

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server host to bind to.
    pub host: String,

    /// Server port.
    pub port: u16,

    /// IdP configuration file (JSON).
    pub idp_config: PathBuf,

    /// User directory file (JSON array of users).
    pub users_file: Option<PathBuf>,

    /// Header carrying the authenticated username.
    pub user_header: String,

    /// How long a parked `AuthnRequest` waits for the login, in seconds.
    pub session_ttl_secs: u64,

    /// Log filter.
    pub log_level: String,
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Fails if `IDP_CONFIG` is unset or a numeric variable does not parse.
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        let host = std::env::var("IDP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = parse_var("IDP_PORT")?.unwrap_or(8000);

        let idp_config = std::env::var("IDP_CONFIG")
            .map(PathBuf::from)
            .map_err(|_| anyhow::anyhow!("IDP_CONFIG environment variable is required"))?;

        let users_file = std::env::var("IDP_USERS").ok().map(PathBuf::from);
        let user_header = std::env::var("IDP_USER_HEADER")
            .map(|h| h.to_ascii_lowercase())
            .unwrap_or_else(|_| DEFAULT_USER_HEADER.to_string());
        let session_ttl_secs = parse_var("IDP_SESSION_TTL_SECS")?.unwrap_or(900); // 15 minutes
        let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            host,
            port,
            idp_config,
            users_file,
            user_header,
            session_ttl_secs,
            log_level,
        })
    }

    /// Creates a configuration for testing.
    #[must_use]
    pub fn for_testing(idp_config: impl Into<PathBuf>) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0, // Random port
            idp_config: idp_config.into(),
            users_file: None,
            user_header: DEFAULT_USER_HEADER.to_string(),
            session_ttl_secs: 900,
            log_level: "debug".to_string(),
        }
    }

    /// Returns the session lifetime.
    #[must_use]
    pub const fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }
}

fn parse_var<T>(name: &str) -> anyhow::Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{name}='{raw}': {e}")),
        Err(_) => Ok(None),
    }
}
