use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use super::{normalize_email, DirectoryProvider, Identity, IdentityPatch, Registration};
use crate::core::error::{PortalError, PortalResult};
use crate::security::password::CredentialHasher;

struct Account {
    identity: Identity,
    password_hash: String,
}

/// Directory backed by process memory.
///
/// Email addresses are unique (case-insensitive). The provider-side session is the
/// identity of the last successful `sign_in`/`sign_up` until `sign_out`.
pub struct InMemoryDirectory {
    accounts: RwLock<HashMap<Uuid, Account>>,
    active: RwLock<Option<Uuid>>,
    hasher: CredentialHasher,
}

impl InMemoryDirectory {
    pub fn new(hasher: CredentialHasher) -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
            active: RwLock::new(None),
            hasher,
        }
    }

    pub fn with_defaults() -> PortalResult<Self> {
        Ok(Self::new(CredentialHasher::with_defaults()?))
    }

    /// Inserts an account without touching the provider-side session.
    pub async fn provision(&self, registration: Registration) -> PortalResult<Identity> {
        registration.validate()?;
        self.hasher.enforce_policy(&registration.password)?;

        let email = normalize_email(&registration.email);
        if self.email_taken(&email).await {
            return Err(PortalError::DuplicateEmail(email));
        }

        let password_hash = tokio::task::spawn_blocking({
            let hasher = self.hasher.clone();
            let password = registration.password.clone();
            move || hasher.hash(&password)
        })
        .await
        .map_err(|e| PortalError::Internal(format!("Hashing task failed: {e}")))??;

        let mut accounts = self.accounts.write().await;
        // A concurrent registration may have claimed the email while hashing.
        if accounts.values().any(|a| a.identity.email == email) {
            return Err(PortalError::DuplicateEmail(email));
        }

        let mut identity = Identity::new(&email, &registration.name, registration.role);
        identity.department = registration.department.filter(|d| !d.is_empty());

        accounts.insert(
            identity.id,
            Account {
                identity: identity.clone(),
                password_hash,
            },
        );
        info!("Provisioned {} identity {}", identity.role, identity.id);

        Ok(identity)
    }

    async fn email_taken(&self, email: &str) -> bool {
        let accounts = self.accounts.read().await;
        accounts.values().any(|a| a.identity.email == email)
    }

    pub async fn len(&self) -> usize {
        self.accounts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.accounts.read().await.is_empty()
    }
}

#[async_trait]
impl DirectoryProvider for InMemoryDirectory {
    async fn current_session(&self) -> PortalResult<Option<Identity>> {
        let active = *self.active.read().await;
        let Some(id) = active else {
            return Ok(None);
        };
        self.get(id).await
    }

    async fn sign_in(&self, email: &str, password: &str) -> PortalResult<Identity> {
        let email = normalize_email(email);
        let (identity, password_hash) = {
            let accounts = self.accounts.read().await;
            let account = accounts
                .values()
                .find(|a| a.identity.email == email)
                .ok_or(PortalError::InvalidCredentials)?;
            (account.identity.clone(), account.password_hash.clone())
        };

        let verified = tokio::task::spawn_blocking({
            let hasher = self.hasher.clone();
            let password = password.to_string();
            move || hasher.verify(&password, &password_hash)
        })
        .await
        .map_err(|e| PortalError::Internal(format!("Verification task failed: {e}")))?;

        if !verified {
            debug!("Password mismatch for identity {}", identity.id);
            return Err(PortalError::InvalidCredentials);
        }

        *self.active.write().await = Some(identity.id);
        Ok(identity)
    }

    async fn sign_up(&self, registration: Registration) -> PortalResult<Identity> {
        let identity = self.provision(registration).await?;
        *self.active.write().await = Some(identity.id);
        Ok(identity)
    }

    async fn sign_out(&self) -> PortalResult<()> {
        *self.active.write().await = None;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> PortalResult<Option<Identity>> {
        let accounts = self.accounts.read().await;
        Ok(accounts.get(&id).map(|a| a.identity.clone()))
    }

    async fn list(&self) -> PortalResult<Vec<Identity>> {
        let accounts = self.accounts.read().await;
        let mut identities: Vec<Identity> =
            accounts.values().map(|a| a.identity.clone()).collect();
        identities.sort_by_key(|i| i.created_at);
        Ok(identities)
    }

    async fn update(&self, id: Uuid, patch: IdentityPatch) -> PortalResult<Identity> {
        let mut accounts = self.accounts.write().await;

        if let Some(ref email) = patch.email {
            let email = normalize_email(email);
            if accounts
                .values()
                .any(|a| a.identity.id != id && a.identity.email == email)
            {
                return Err(PortalError::DuplicateEmail(email));
            }
        }

        let account = accounts
            .get_mut(&id)
            .ok_or_else(|| PortalError::NotFound(format!("User {id}")))?;

        let mut updated = account.identity.clone();
        patch.apply(&mut updated)?;
        account.identity = updated.clone();
        debug!("Updated identity {id} at {}", Utc::now());

        Ok(updated)
    }

    async fn remove(&self, id: Uuid) -> PortalResult<()> {
        let removed = self.accounts.write().await.remove(&id);
        if removed.is_none() {
            return Err(PortalError::NotFound(format!("User {id}")));
        }

        let mut active = self.active.write().await;
        if *active == Some(id) {
            *active = None;
        }
        info!("Removed identity {id}");
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "memory"
    }
}
