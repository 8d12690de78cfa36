//! Client-side session store.
//!
//! Holds the signed-in identity and the loading flag for one portal client, and mirrors
//! the identity into an [`IdentityCache`] so it survives restarts. A cached identity is
//! trusted as-is on startup; without one the directory's own session is consulted.

pub mod cache;

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::core::error::PortalResult;
use crate::directory::{DirectoryProvider, Identity, Registration};

pub use cache::{FileIdentityCache, IdentityCache, InMemoryIdentityCache};

pub const IDENTITY_KEY: &str = "supportdesk.identity";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionState {
    pub identity: Option<Identity>,
    pub loading: bool,
    /// The directory could not be reached while restoring the session.
    pub degraded: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            identity: None,
            loading: true,
            degraded: false,
        }
    }
}

impl SessionState {
    pub fn signed_in(identity: Identity) -> Self {
        Self {
            identity: Some(identity),
            loading: false,
            degraded: false,
        }
    }

    pub fn signed_out() -> Self {
        Self {
            identity: None,
            loading: false,
            degraded: false,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }
}

pub struct SessionStore {
    provider: Arc<dyn DirectoryProvider>,
    cache: Arc<dyn IdentityCache>,
    state: RwLock<SessionState>,
    closed: AtomicBool,
}

impl SessionStore {
    pub fn new(provider: Arc<dyn DirectoryProvider>, cache: Arc<dyn IdentityCache>) -> Self {
        Self {
            provider,
            cache,
            state: RwLock::new(SessionState::default()),
            closed: AtomicBool::new(false),
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Restores the session. Never fails; provider trouble only raises `degraded`.
    pub async fn initialize(&self) -> SessionState {
        if let Some(identity) = self.read_cached().await {
            debug!("Restored cached identity {}", identity.id);
            if !self.is_closed() {
                *self.state.write().await = SessionState::signed_in(identity);
            }
            return self.snapshot().await;
        }

        let lookup = self.provider.current_session().await;
        if self.is_closed() {
            debug!("Session lookup finished after shutdown, discarding");
            return self.snapshot().await;
        }

        let mut next = SessionState::signed_out();
        match lookup {
            Ok(Some(identity)) => {
                self.persist(&identity).await;
                next.identity = Some(identity);
            }
            Ok(None) => {}
            Err(e) => {
                warn!("Directory unreachable during session restore: {e}");
                next.degraded = true;
            }
        }

        *self.state.write().await = next.clone();
        next
    }

    pub async fn login(&self, email: &str, password: &str) -> PortalResult<Identity> {
        self.set_loading(true).await;
        let result = self.provider.sign_in(email, password).await;
        self.settle(result).await
    }

    /// Signs up and makes the new identity current.
    pub async fn register(&self, registration: Registration) -> PortalResult<Identity> {
        self.set_loading(true).await;
        let result = self.provider.sign_up(registration).await;
        self.settle(result).await
    }

    pub async fn logout(&self) {
        if let Err(e) = self.provider.sign_out().await {
            warn!("Remote sign-out failed: {e}");
        }
        if self.is_closed() {
            return;
        }

        if let Err(e) = self.cache.remove(IDENTITY_KEY).await {
            warn!("Failed to clear cached identity: {e}");
        }
        let mut state = self.state.write().await;
        state.identity = None;
        state.loading = false;
        info!("Signed out");
    }

    /// Replaces the current identity when `identity` is the signed-in one.
    pub async fn apply_identity_update(&self, identity: Identity) -> bool {
        if self.is_closed() {
            return false;
        }

        let mut state = self.state.write().await;
        match state.identity {
            Some(ref current) if current.id == identity.id => {
                self.persist(&identity).await;
                state.identity = Some(identity);
                true
            }
            _ => false,
        }
    }

    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub async fn snapshot(&self) -> SessionState {
        self.state.read().await.clone()
    }

    pub async fn current(&self) -> Option<Identity> {
        self.state.read().await.identity.clone()
    }

    pub async fn is_loading(&self) -> bool {
        self.state.read().await.loading
    }

    pub async fn is_authenticated(&self) -> bool {
        self.state.read().await.is_authenticated()
    }

    pub async fn is_degraded(&self) -> bool {
        self.state.read().await.degraded
    }

    async fn settle(&self, result: PortalResult<Identity>) -> PortalResult<Identity> {
        if self.is_closed() {
            return result;
        }

        match result {
            Ok(identity) => {
                self.persist(&identity).await;
                let mut state = self.state.write().await;
                state.identity = Some(identity.clone());
                state.loading = false;
                info!("Session started for {} ({})", identity.id, identity.role);
                Ok(identity)
            }
            Err(e) => {
                self.set_loading(false).await;
                Err(e)
            }
        }
    }

    async fn set_loading(&self, loading: bool) {
        if !self.is_closed() {
            self.state.write().await.loading = loading;
        }
    }

    async fn read_cached(&self) -> Option<Identity> {
        let raw = match self.cache.get(IDENTITY_KEY).await {
            Ok(raw) => raw?,
            Err(e) => {
                warn!("Identity cache unreadable: {e}");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(identity) => Some(identity),
            Err(e) => {
                warn!("Discarding malformed cached identity: {e}");
                if let Err(e) = self.cache.remove(IDENTITY_KEY).await {
                    warn!("Failed to remove malformed identity: {e}");
                }
                None
            }
        }
    }

    async fn persist(&self, identity: &Identity) {
        let result = match serde_json::to_string(identity) {
            Ok(raw) => self.cache.set(IDENTITY_KEY, &raw).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            warn!("Failed to persist identity {}: {e}", identity.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::PortalError;
    use crate::directory::{IdentityPatch, InMemoryDirectory, Role};
    use async_trait::async_trait;
    use uuid::Uuid;

    struct UnreachableDirectory;

    #[async_trait]
    impl DirectoryProvider for UnreachableDirectory {
        async fn current_session(&self) -> PortalResult<Option<Identity>> {
            Err(PortalError::ProviderUnavailable("connection refused".into()))
        }
        async fn sign_in(&self, _: &str, _: &str) -> PortalResult<Identity> {
            Err(PortalError::ProviderUnavailable("connection refused".into()))
        }
        async fn sign_up(&self, _: Registration) -> PortalResult<Identity> {
            Err(PortalError::ProviderUnavailable("connection refused".into()))
        }
        async fn sign_out(&self) -> PortalResult<()> {
            Err(PortalError::ProviderUnavailable("connection refused".into()))
        }
        async fn get(&self, _: Uuid) -> PortalResult<Option<Identity>> {
            Ok(None)
        }
        async fn list(&self) -> PortalResult<Vec<Identity>> {
            Ok(Vec::new())
        }
        async fn update(&self, id: Uuid, _: IdentityPatch) -> PortalResult<Identity> {
            Err(PortalError::NotFound(id.to_string()))
        }
        async fn remove(&self, id: Uuid) -> PortalResult<()> {
            Err(PortalError::NotFound(id.to_string()))
        }
        fn provider_name(&self) -> &'static str {
            "unreachable"
        }
    }

    async fn seeded_store() -> (SessionStore, Arc<InMemoryIdentityCache>) {
        let directory = InMemoryDirectory::with_defaults().expect("hasher");
        directory
            .provision(
                Registration::new("client@example.com", "password1", "Casey", Role::Client)
                    .with_department("Finance"),
            )
            .await
            .expect("provision");

        let cache = Arc::new(InMemoryIdentityCache::new());
        let store = SessionStore::new(Arc::new(directory), cache.clone());
        (store, cache)
    }

    #[tokio::test]
    async fn test_logout_then_login_restores_identity() {
        let (store, cache) = seeded_store().await;
        store.initialize().await;

        let first = store.login("client@example.com", "password1").await.unwrap();
        assert!(cache.get(IDENTITY_KEY).await.unwrap().is_some());

        store.logout().await;
        assert!(!store.is_authenticated().await);
        assert!(cache.get(IDENTITY_KEY).await.unwrap().is_none());

        let second = store.login("CLIENT@example.com", "password1").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(store.current().await, Some(second));
    }

    #[tokio::test]
    async fn test_failed_login_clears_loading() {
        let (store, _) = seeded_store().await;
        store.initialize().await;

        let err = store.login("client@example.com", "wrong").await.unwrap_err();
        assert!(matches!(err, PortalError::InvalidCredentials));
        assert!(!store.is_loading().await);
        assert!(!store.is_authenticated().await);
    }

    #[tokio::test]
    async fn test_cached_identity_is_trusted() {
        let cache = Arc::new(InMemoryIdentityCache::new());
        let cached = Identity::new("ghost@example.com", "Ghost", Role::Support);
        cache
            .set(IDENTITY_KEY, &serde_json::to_string(&cached).unwrap())
            .await
            .unwrap();

        let store = SessionStore::new(Arc::new(UnreachableDirectory), cache);
        assert!(store.is_loading().await);

        let state = store.initialize().await;
        assert_eq!(state.identity, Some(cached));
        assert!(!state.loading);
        assert!(!state.degraded);
    }

    #[tokio::test]
    async fn test_malformed_cache_entry_is_removed() {
        let cache = Arc::new(InMemoryIdentityCache::new());
        cache.set(IDENTITY_KEY, "{not json").await.unwrap();

        let store = SessionStore::new(Arc::new(UnreachableDirectory), cache.clone());
        let state = store.initialize().await;

        assert!(state.identity.is_none());
        assert!(state.degraded);
        assert!(cache.get(IDENTITY_KEY).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_logout_survives_provider_failure() {
        let cache = Arc::new(InMemoryIdentityCache::new());
        let store = SessionStore::new(Arc::new(UnreachableDirectory), cache);
        store.initialize().await;
        store.logout().await;
        assert!(!store.is_authenticated().await);
    }

    #[tokio::test]
    async fn test_register_becomes_current() {
        let (store, _) = seeded_store().await;
        store.initialize().await;

        let identity = store
            .register(Registration::new("new@example.com", "password1", "Nova", Role::Support))
            .await
            .unwrap();
        assert_eq!(store.current().await, Some(identity));

        let err = store
            .register(Registration::new("client@example.com", "password1", "Dup", Role::Client))
            .await
            .unwrap_err();
        assert!(matches!(err, PortalError::DuplicateEmail(_)));
    }

    #[tokio::test]
    async fn test_identity_update_rewrites_cache() {
        let (store, cache) = seeded_store().await;
        store.initialize().await;
        let mut identity = store.login("client@example.com", "password1").await.unwrap();

        identity.name = "Casey Jones".into();
        assert!(store.apply_identity_update(identity.clone()).await);

        let raw = cache.get(IDENTITY_KEY).await.unwrap().unwrap();
        let stored: Identity = serde_json::from_str(&raw).unwrap();
        assert_eq!(stored.name, "Casey Jones");

        let stranger = Identity::new("other@example.com", "Other", Role::Client);
        assert!(!store.apply_identity_update(stranger).await);
    }

    #[tokio::test]
    async fn test_results_after_shutdown_are_discarded() {
        let (store, cache) = seeded_store().await;
        store.initialize().await;
        store.shutdown();

        let identity = store.login("client@example.com", "password1").await.unwrap();
        assert_eq!(identity.email, "client@example.com");
        assert!(store.current().await.is_none());
        assert!(cache.get(IDENTITY_KEY).await.unwrap().is_none());
    }
}
