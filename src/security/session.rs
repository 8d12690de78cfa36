//! Server-side login sessions.
//!
//! A successful `/api/auth/login` issues an opaque token bound to an identity id. The
//! token travels as a bearer header or as a cookie; the auth middleware resolves it
//! back to an identity on each request.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::device::{profile_from_user_agent, DeviceClass};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub idle_timeout_minutes: i64,
    pub absolute_timeout_hours: i64,
    pub max_concurrent_sessions: usize,
    pub token_length: usize,
    pub cookie_name: String,
    pub cookie_secure: bool,
    pub cookie_http_only: bool,
    pub cookie_same_site: SameSite,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_minutes: 30,
            absolute_timeout_hours: 24,
            max_concurrent_sessions: 5,
            token_length: 32,
            cookie_name: "supportdesk_session".into(),
            cookie_secure: true,
            cookie_http_only: true,
            cookie_same_site: SameSite::Strict,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl SameSite {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strict => "Strict",
            Self::Lax => "Lax",
            Self::None => "None",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Active,
    Revoked,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSession {
    pub token: String,
    pub identity_id: Uuid,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub absolute_expires_at: DateTime<Utc>,
    pub device: Option<DeviceClass>,
}

impl AuthSession {
    pub fn new(identity_id: Uuid, config: &SessionConfig) -> Self {
        let now = Utc::now();

        Self {
            token: generate_token(config.token_length),
            identity_id,
            status: SessionStatus::Active,
            created_at: now,
            last_accessed_at: now,
            expires_at: now + Duration::minutes(config.idle_timeout_minutes),
            absolute_expires_at: now + Duration::hours(config.absolute_timeout_hours),
            device: None,
        }
    }

    pub fn with_device(mut self, device: DeviceClass) -> Self {
        self.device = Some(device);
        self
    }

    pub fn is_valid(&self) -> bool {
        self.status == SessionStatus::Active && !self.is_expired()
    }

    pub fn is_expired(&self) -> bool {
        let now = Utc::now();
        now > self.expires_at || now > self.absolute_expires_at
    }

    pub fn touch(&mut self, idle_timeout_minutes: i64) {
        let now = Utc::now();
        self.last_accessed_at = now;
        self.expires_at = now + Duration::minutes(idle_timeout_minutes);
    }

    pub fn revoke(&mut self) {
        self.status = SessionStatus::Revoked;
    }

    pub fn time_until_expiry(&self) -> Duration {
        let now = Utc::now();
        (self.expires_at - now).min(self.absolute_expires_at - now)
    }
}

pub trait TokenStore: Send + Sync {
    fn create(&self, session: AuthSession) -> impl std::future::Future<Output = Result<()>> + Send;
    fn get(&self, token: &str) -> impl std::future::Future<Output = Result<Option<AuthSession>>> + Send;
    fn update(&self, session: &AuthSession) -> impl std::future::Future<Output = Result<()>> + Send;
    fn delete(&self, token: &str) -> impl std::future::Future<Output = Result<()>> + Send;
    fn for_identity(&self, identity_id: Uuid) -> impl std::future::Future<Output = Result<Vec<AuthSession>>> + Send;
    fn cleanup_expired(&self) -> impl std::future::Future<Output = Result<usize>> + Send;
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryTokenStore {
    sessions: Arc<RwLock<HashMap<String, AuthSession>>>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for InMemoryTokenStore {
    async fn create(&self, session: AuthSession) -> Result<()> {
        self.sessions
            .write()
            .await
            .insert(session.token.clone(), session);
        Ok(())
    }

    async fn get(&self, token: &str) -> Result<Option<AuthSession>> {
        Ok(self.sessions.read().await.get(token).cloned())
    }

    async fn update(&self, session: &AuthSession) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(&session.token) {
            Some(existing) => {
                *existing = session.clone();
                Ok(())
            }
            None => Err(anyhow!("Session not found")),
        }
    }

    async fn delete(&self, token: &str) -> Result<()> {
        self.sessions.write().await.remove(token);
        Ok(())
    }

    async fn for_identity(&self, identity_id: Uuid) -> Result<Vec<AuthSession>> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .values()
            .filter(|s| s.identity_id == identity_id)
            .cloned()
            .collect())
    }

    async fn cleanup_expired(&self) -> Result<usize> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.is_valid());
        Ok(before - sessions.len())
    }
}

pub struct SessionManager<S: TokenStore> {
    store: S,
    config: SessionConfig,
}

impl<S: TokenStore> SessionManager<S> {
    pub fn new(store: S, config: SessionConfig) -> Self {
        Self { store, config }
    }

    pub async fn create_session(
        &self,
        identity_id: Uuid,
        user_agent: Option<&str>,
    ) -> Result<AuthSession> {
        let mut active: Vec<AuthSession> = self
            .store
            .for_identity(identity_id)
            .await?
            .into_iter()
            .filter(|s| s.is_valid())
            .collect();

        if active.len() >= self.config.max_concurrent_sessions {
            active.sort_by_key(|s| s.last_accessed_at);
            let excess = active.len() + 1 - self.config.max_concurrent_sessions;
            for session in active.iter().take(excess) {
                self.store.delete(&session.token).await?;
                debug!("Dropped oldest session for identity {identity_id}");
            }
        }

        let mut session = AuthSession::new(identity_id, &self.config);
        if let Some(ua) = user_agent {
            session = session.with_device(profile_from_user_agent(ua).class);
        }

        self.store.create(session.clone()).await?;
        info!("Created session for identity {identity_id}");

        Ok(session)
    }

    /// Returns the live session for `token`, sliding its idle window.
    pub async fn validate_session(&self, token: &str) -> Result<Option<AuthSession>> {
        let Some(mut session) = self.store.get(token).await? else {
            return Ok(None);
        };

        if !session.is_valid() {
            if session.is_expired() {
                self.store.delete(token).await?;
                debug!("Removed expired session");
            }
            return Ok(None);
        }

        session.touch(self.config.idle_timeout_minutes);
        self.store.update(&session).await?;
        Ok(Some(session))
    }

    pub async fn revoke_session(&self, token: &str) -> Result<bool> {
        let Some(mut session) = self.store.get(token).await? else {
            return Ok(false);
        };

        session.revoke();
        self.store.update(&session).await?;
        info!("Revoked session for identity {}", session.identity_id);
        Ok(true)
    }

    pub async fn revoke_identity_sessions(&self, identity_id: Uuid) -> Result<usize> {
        let mut revoked = 0;
        for mut session in self.store.for_identity(identity_id).await? {
            if session.status == SessionStatus::Active {
                session.revoke();
                self.store.update(&session).await?;
                revoked += 1;
            }
        }

        info!("Revoked {revoked} sessions for identity {identity_id}");
        Ok(revoked)
    }

    pub async fn cleanup_expired_sessions(&self) -> Result<usize> {
        let cleaned = self.store.cleanup_expired().await?;
        if cleaned > 0 {
            info!("Cleaned up {cleaned} expired sessions");
        }
        Ok(cleaned)
    }

    pub fn build_cookie(&self, session: &AuthSession) -> String {
        let max_age = session.time_until_expiry().num_seconds().max(0);
        format!(
            "{}={}; Path=/; Max-Age={max_age}{}",
            self.config.cookie_name,
            session.token,
            self.cookie_attributes()
        )
    }

    pub fn build_logout_cookie(&self) -> String {
        format!(
            "{}=; Path=/; Max-Age=0{}",
            self.config.cookie_name,
            self.cookie_attributes()
        )
    }

    fn cookie_attributes(&self) -> String {
        let mut attrs = String::new();
        if self.config.cookie_secure {
            attrs.push_str("; Secure");
        }
        if self.config.cookie_http_only {
            attrs.push_str("; HttpOnly");
        }
        attrs.push_str("; SameSite=");
        attrs.push_str(self.config.cookie_same_site.as_str());
        attrs
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}

pub type PortalSessions = SessionManager<InMemoryTokenStore>;

pub fn generate_token(length: usize) -> String {
    use rand::Rng;

    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::rng();

    (0..length)
        .map(|_| CHARSET[rng.random_range(0..CHARSET.len())] as char)
        .collect()
}

pub fn extract_token_from_cookie(cookie_header: &str, cookie_name: &str) -> Option<String> {
    cookie_header
        .split(';')
        .filter_map(|c| c.trim().split_once('='))
        .find(|(name, _)| name.trim() == cookie_name)
        .map(|(_, value)| value.trim().to_string())
        .filter(|v| !v.is_empty())
}
