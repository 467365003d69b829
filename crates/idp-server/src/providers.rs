//! Session and principal providers for the server.
//!
//! Parked requests are kept in memory. Authentication is delegated to a
//! fronting proxy, which reports the logged-in user in a request header;
//! the user's attributes come from a JSON user directory.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use idp_saml::endpoints::{PendingRequest, PrincipalResolver, SessionError, SessionStore};
use idp_saml::identity::{Principal, UserRecord};

// ============================================================================
// In-Memory Session Store
// ============================================================================

struct StoredRequest {
    pending: PendingRequest,
    created_at: DateTime<Utc>,
}

/// In-memory store of requests waiting for a login.
///
/// Entries expire after the configured lifetime. For several server
/// instances behind one host name, use a shared store instead.
pub struct InMemorySessionStore {
    inner: DashMap<String, StoredRequest>,
    ttl: Duration,
}

impl InMemorySessionStore {
    /// Creates a store whose entries live for `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: DashMap::new(),
            ttl,
        }
    }

    /// Number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether there are no sessions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    fn expired(&self, stored: &StoredRequest, now: DateTime<Utc>) -> bool {
        let elapsed = now
            .signed_duration_since(stored.created_at)
            .to_std()
            .unwrap_or(Duration::ZERO);
        elapsed > self.ttl
    }

    fn purge_expired(&self) {
        let now = Utc::now();
        let before = self.inner.len();
        self.inner.retain(|_, stored| !self.expired(stored, now));
        let removed = before.saturating_sub(self.inner.len());
        if removed > 0 {
            tracing::debug!(removed, "dropped expired SSO sessions");
        }
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self, pending: PendingRequest) -> Result<String, SessionError> {
        self.purge_expired();
        let id = Uuid::new_v4().to_string();
        self.inner.insert(
            id.clone(),
            StoredRequest {
                pending,
                created_at: Utc::now(),
            },
        );
        Ok(id)
    }

    async fn put(&self, session_id: &str, pending: PendingRequest) -> Result<bool, SessionError> {
        let now = Utc::now();
        match self.inner.get_mut(session_id) {
            Some(mut stored) if !self.expired(&stored, now) => {
                stored.pending = pending;
                stored.created_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get(&self, session_id: &str) -> Result<Option<PendingRequest>, SessionError> {
        let Some(stored) = self.inner.get(session_id) else {
            return Ok(None);
        };
        if self.expired(&stored, Utc::now()) {
            drop(stored);
            self.inner.remove(session_id);
            return Ok(None);
        }
        Ok(Some(stored.pending.clone()))
    }

    async fn remove(&self, session_id: &str) -> Result<(), SessionError> {
        self.inner.remove(session_id);
        Ok(())
    }
}

// ============================================================================
// User Directory
// ============================================================================

/// Users known to the IdP, keyed by username.
#[derive(Debug, Default)]
pub struct UserDirectory {
    users: HashMap<String, Arc<UserRecord>>,
}

impl UserDirectory {
    /// Builds a directory from records.
    #[must_use]
    pub fn new(records: impl IntoIterator<Item = UserRecord>) -> Self {
        let users = records
            .into_iter()
            .map(|user| (user.username.clone(), Arc::new(user)))
            .collect();
        Self { users }
    }

    /// Reads a JSON array of users.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("cannot read {}: {e}", path.display()))?;
        let records: Vec<UserRecord> = serde_json::from_str(&json)
            .map_err(|e| anyhow::anyhow!("invalid user directory {}: {e}", path.display()))?;
        Ok(Self::new(records))
    }

    /// Looks a user up by username.
    #[must_use]
    pub fn get(&self, username: &str) -> Option<Arc<UserRecord>> {
        self.users.get(username).cloned()
    }

    /// Number of users.
    #[must_use]
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Whether the directory is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

// ============================================================================
// Header Principal Resolver
// ============================================================================

/// Trusts the username a fronting authentication proxy puts in a header.
///
/// The header must be stripped from client requests by that proxy.
pub struct HeaderPrincipalResolver {
    header: String,
    directory: Arc<UserDirectory>,
}

impl HeaderPrincipalResolver {
    /// Creates a resolver reading `header`.
    #[must_use]
    pub fn new(header: impl Into<String>, directory: Arc<UserDirectory>) -> Self {
        Self {
            header: header.into(),
            directory,
        }
    }
}

#[async_trait]
impl PrincipalResolver for HeaderPrincipalResolver {
    async fn resolve(&self, headers: &HeaderMap) -> Result<Option<Arc<dyn Principal>>, SessionError> {
        let Some(value) = headers.get(self.header.as_str()) else {
            return Ok(None);
        };
        let username = value
            .to_str()
            .map_err(|_| SessionError::Principal(format!("{} is not valid text", self.header)))?
            .trim();
        if username.is_empty() {
            return Ok(None);
        }

        match self.directory.get(username) {
            Some(user) => Ok(Some(user as Arc<dyn Principal>)),
            None => {
                tracing::warn!(username, "authenticated user is not in the directory");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use idp_saml::types::SamlBinding;

    fn pending(request: &str) -> PendingRequest {
        PendingRequest {
            saml_request: request.to_string(),
            relay_state: String::new(),
            binding: SamlBinding::HttpRedirect,
            detached: None,
        }
    }

    #[tokio::test]
    async fn sessions_round_trip() {
        let store = InMemorySessionStore::new(Duration::from_secs(60));
        let id = store.create(pending("a")).await.unwrap();
        assert_eq!(store.get(&id).await.unwrap(), Some(pending("a")));

        assert!(store.put(&id, pending("b")).await.unwrap());
        assert_eq!(store.get(&id).await.unwrap().unwrap().saml_request, "b");

        store.remove(&id).await.unwrap();
        assert_eq!(store.get(&id).await.unwrap(), None);
        assert!(!store.put(&id, pending("c")).await.unwrap());
    }

    #[tokio::test]
    async fn expired_sessions_are_gone() {
        let store = InMemorySessionStore::new(Duration::ZERO);
        let id = store.create(pending("a")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(store.get(&id).await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn header_resolves_directory_user() {
        let directory = Arc::new(UserDirectory::new([UserRecord::new(7, "alice")]));
        let resolver = HeaderPrincipalResolver::new("x-remote-user", directory);

        let mut headers = HeaderMap::new();
        assert!(resolver.resolve(&headers).await.unwrap().is_none());

        headers.insert("x-remote-user", "alice".parse().unwrap());
        let principal = resolver.resolve(&headers).await.unwrap().unwrap();
        assert_eq!(principal.id(), 7);

        headers.insert("x-remote-user", "mallory".parse().unwrap());
        assert!(resolver.resolve(&headers).await.unwrap().is_none());
    }

    #[test]
    fn directory_reads_json() {
        let user: Vec<UserRecord> = serde_json::from_str(
            r#"[{"id": 1, "username": "bob", "attributes": {"email": "bob@example.com"}}]"#,
        )
        .unwrap();
        let directory = UserDirectory::new(user);
        assert_eq!(directory.len(), 1);
        assert!(directory.get("bob").is_some());
    }
}
