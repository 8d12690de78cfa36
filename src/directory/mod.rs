//! Identity directory
//!
//! Identities, roles and the `DirectoryProvider` seam through which the portal talks to
//! its persistence/auth backend. Two providers exist: an in-memory directory used for
//! tests and local runs, and a REST client for a hosted auth/storage service. The
//! provider is chosen once, when `AppState` is built.

pub mod api;
pub mod memory;
pub mod remote;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::core::error::{PortalError, PortalResult};

pub use memory::InMemoryDirectory;
pub use remote::{RemoteDirectory, RemoteDirectoryConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Client,
    Support,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Admin, Role::Client, Role::Support];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Client => "client",
            Self::Support => "support",
        }
    }

    /// Landing page on the desktop tree.
    pub fn home_path(&self) -> &'static str {
        match self {
            Self::Admin => "/dashboard/admin",
            Self::Client => "/dashboard/client",
            Self::Support => "/dashboard/support",
        }
    }

    pub fn can_manage_tickets(&self) -> bool {
        matches!(self, Self::Admin | Self::Support)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = PortalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "client" => Ok(Self::Client),
            "support" => Ok(Self::Support),
            other => Err(PortalError::Validation(format!("Unknown role: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Identity {
    pub fn new(email: &str, name: &str, role: Role) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: normalize_email(email),
            name: name.trim().to_string(),
            role,
            department: None,
            avatar: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_department(mut self, department: impl Into<String>) -> Self {
        self.department = Some(department.into());
        self
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.role == role
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Registration {
    pub email: String,
    pub password: String,
    pub name: String,
    pub role: Role,
    #[serde(default)]
    pub department: Option<String>,
}

impl Registration {
    pub fn new(email: &str, password: &str, name: &str, role: Role) -> Self {
        Self {
            email: email.to_string(),
            password: password.to_string(),
            name: name.to_string(),
            role,
            department: None,
        }
    }

    pub fn with_department(mut self, department: impl Into<String>) -> Self {
        self.department = Some(department.into());
        self
    }

    pub fn validate(&self) -> PortalResult<()> {
        let email = self.email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(PortalError::Validation("A valid email is required".into()));
        }
        if self.name.trim().is_empty() {
            return Err(PortalError::Validation("Name cannot be empty".into()));
        }
        if self.password.is_empty() {
            return Err(PortalError::Validation("Password cannot be empty".into()));
        }
        Ok(())
    }
}

/// Profile fields that may change after creation. Role is deliberately absent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IdentityPatch {
    pub email: Option<String>,
    pub name: Option<String>,
    pub department: Option<String>,
    pub avatar: Option<String>,
}

impl IdentityPatch {
    pub fn apply(&self, identity: &mut Identity) -> PortalResult<()> {
        if let Some(ref email) = self.email {
            if email.trim().is_empty() || !email.contains('@') {
                return Err(PortalError::Validation("A valid email is required".into()));
            }
            identity.email = normalize_email(email);
        }
        if let Some(ref name) = self.name {
            if name.trim().is_empty() {
                return Err(PortalError::Validation("Name cannot be empty".into()));
            }
            identity.name = name.trim().to_string();
        }
        if let Some(ref department) = self.department {
            identity.department = Some(department.clone()).filter(|d| !d.is_empty());
        }
        if let Some(ref avatar) = self.avatar {
            identity.avatar = Some(avatar.clone()).filter(|a| !a.is_empty());
        }
        Ok(())
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Persistence and authentication backend.
///
/// `current_session`, `sign_in` and `sign_out` describe the provider-side session of
/// the handle's owner; the remaining operations are the profile/role rows keyed by
/// identity id and never depend on that session.
#[async_trait]
pub trait DirectoryProvider: Send + Sync {
    async fn current_session(&self) -> PortalResult<Option<Identity>>;

    async fn sign_in(&self, email: &str, password: &str) -> PortalResult<Identity>;

    async fn sign_up(&self, registration: Registration) -> PortalResult<Identity>;

    async fn sign_out(&self) -> PortalResult<()>;

    async fn get(&self, id: Uuid) -> PortalResult<Option<Identity>>;

    async fn list(&self) -> PortalResult<Vec<Identity>>;

    async fn update(&self, id: Uuid, patch: IdentityPatch) -> PortalResult<Identity>;

    async fn remove(&self, id: Uuid) -> PortalResult<()>;

    fn provider_name(&self) -> &'static str;
}
