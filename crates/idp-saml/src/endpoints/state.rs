//! Endpoint state and the collaborators the endpoints depend on.

use std::sync::Arc;

use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};

use crate::error::SamlError;
use crate::identity::Principal;
use crate::idp::IdentityProvider;
use crate::request::DetachedSignature;
use crate::types::SamlBinding;

/// Cookie carrying the SSO session key.
pub const SESSION_COOKIE: &str = "idp_saml_session";

/// SAML endpoint state.
pub struct SamlState<S, P>
where
    S: SessionStore,
    P: PrincipalResolver,
{
    /// The identity provider.
    pub idp: Arc<IdentityProvider>,
    /// Storage for requests waiting on a login.
    pub sessions: Arc<S>,
    /// Resolves the logged-in principal of a browser request.
    pub principals: Arc<P>,
}

impl<S: SessionStore, P: PrincipalResolver> SamlState<S, P> {
    /// Creates a new SAML state.
    pub fn new(idp: Arc<IdentityProvider>, sessions: Arc<S>, principals: Arc<P>) -> Self {
        Self {
            idp,
            sessions,
            principals,
        }
    }
}

impl<S: SessionStore, P: PrincipalResolver> Clone for SamlState<S, P> {
    fn clone(&self) -> Self {
        Self {
            idp: Arc::clone(&self.idp),
            sessions: Arc::clone(&self.sessions),
            principals: Arc::clone(&self.principals),
        }
    }
}

/// An `AuthnRequest` received by the SSO endpoint and kept until the user
/// has logged in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRequest {
    /// Still-encoded `SAMLRequest` parameter.
    pub saml_request: String,
    /// `RelayState`, empty when the SP sent none.
    pub relay_state: String,
    /// Binding the request arrived on.
    pub binding: SamlBinding,
    /// Detached signature of a signed HTTP-Redirect request.
    pub detached: Option<DetachedSignature>,
}

impl PendingRequest {
    /// `RelayState` to echo, if any.
    #[must_use]
    pub fn relay_state(&self) -> Option<&str> {
        Some(self.relay_state.as_str()).filter(|rs| !rs.is_empty())
    }
}

/// Per-browser storage of pending requests.
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync + 'static {
    /// Starts a session holding `pending` and returns its key.
    async fn create(&self, pending: PendingRequest) -> Result<String, SessionError>;

    /// Replaces the pending request of an existing session.
    ///
    /// Returns `false` if the session is unknown.
    async fn put(&self, session_id: &str, pending: PendingRequest) -> Result<bool, SessionError>;

    /// The pending request of a session.
    async fn get(&self, session_id: &str) -> Result<Option<PendingRequest>, SessionError>;

    /// Forgets the pending request of a session.
    async fn remove(&self, session_id: &str) -> Result<(), SessionError>;
}

/// Answers "who is logged in" for a browser request.
#[async_trait::async_trait]
pub trait PrincipalResolver: Send + Sync + 'static {
    /// The authenticated principal, or `None` for anonymous requests.
    async fn resolve(&self, headers: &HeaderMap) -> Result<Option<Arc<dyn Principal>>, SessionError>;
}

/// Error type for session and principal lookups.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Storage error.
    #[error("session storage error: {0}")]
    Storage(String),

    /// The principal could not be loaded.
    #[error("principal lookup failed: {0}")]
    Principal(String),
}

impl From<SessionError> for SamlError {
    fn from(err: SessionError) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Reads the session key from the `Cookie` headers.
#[must_use]
pub fn session_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(axum::http::header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// `Set-Cookie` value for a new session.
#[must_use]
pub fn session_cookie(session_id: &str) -> String {
    format!("{SESSION_COOKIE}={session_id}; Path=/; HttpOnly; SameSite=Lax")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_is_read_from_cookies() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "cookie",
            format!("theme=dark; {SESSION_COOKIE}=abc123; lang=en").parse().unwrap(),
        );
        assert_eq!(session_id(&headers).as_deref(), Some("abc123"));
    }

    #[test]
    fn missing_or_empty_cookie() {
        let mut headers = HeaderMap::new();
        assert_eq!(session_id(&headers), None);
        headers.insert("cookie", format!("{SESSION_COOKIE}=").parse().unwrap());
        assert_eq!(session_id(&headers), None);
    }

    #[test]
    fn empty_relay_state_is_absent() {
        let pending = PendingRequest {
            saml_request: "x".to_string(),
            relay_state: String::new(),
            binding: SamlBinding::HttpPost,
            detached: None,
        };
        assert_eq!(pending.relay_state(), None);
    }

    #[test]
    fn session_error_is_internal() {
        let err: SamlError = SessionError::Storage("down".to_string()).into();
        assert_eq!(err.http_status(), 500);
    }
}
