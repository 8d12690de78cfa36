//! Application configuration.
//!
//! Layers, lowest precedence first: built-in defaults, `supportdesk.toml` (or the file
//! named by `SUPPORTDESK_CONFIG`), then `SUPPORTDESK_*` environment variables where `__`
//! separates nested keys, e.g. `SUPPORTDESK_SERVER__PORT=9000`.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::core::error::{PortalError, PortalResult};
use crate::device::DeviceConfig;
use crate::directory::RemoteDirectoryConfig;
use crate::security::session::SessionConfig;
use crate::tickets::TransitionPolicy;

pub const DEFAULT_CONFIG_FILE: &str = "supportdesk.toml";
pub const ENV_PREFIX: &str = "SUPPORTDESK_";

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub directory: DirectoryConfig,
    pub session: SessionConfig,
    pub tickets: TicketsConfig,
    pub device: DeviceConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8080,
            cors_origins: Vec::new(),
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> PortalResult<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| PortalError::Validation(format!("Invalid listen address: {e}")))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectoryBackend {
    #[default]
    Memory,
    Remote,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BootstrapAdmin {
    pub email: String,
    pub password: String,
    #[serde(default = "default_admin_name")]
    pub name: String,
}

fn default_admin_name() -> String {
    "Administrator".into()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    pub backend: DirectoryBackend,
    pub url: String,
    pub api_key: String,
    pub timeout_seconds: u64,
    /// Seeded into the in-memory directory on startup.
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            backend: DirectoryBackend::Memory,
            url: String::new(),
            api_key: String::new(),
            timeout_seconds: 10,
            bootstrap_admin: None,
        }
    }
}

impl DirectoryConfig {
    pub fn remote(&self) -> PortalResult<RemoteDirectoryConfig> {
        if self.url.trim().is_empty() || self.api_key.trim().is_empty() {
            return Err(PortalError::Validation(
                "directory.url and directory.api_key are required for the remote backend".into(),
            ));
        }
        Ok(RemoteDirectoryConfig {
            url: self.url.clone(),
            api_key: self.api_key.clone(),
            timeout_seconds: self.timeout_seconds,
        })
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TicketsConfig {
    pub transition_policy: TransitionPolicy,
}

impl AppConfig {
    pub fn figment(path: Option<PathBuf>) -> Figment {
        let path = path
            .or_else(|| std::env::var_os("SUPPORTDESK_CONFIG").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn load() -> PortalResult<Self> {
        Self::from_figment(Self::figment(None))
    }

    pub fn from_figment(figment: Figment) -> PortalResult<Self> {
        let config: AppConfig = figment
            .extract()
            .map_err(|e| PortalError::Validation(format!("Invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> PortalResult<()> {
        if self.device.mobile_breakpoint >= self.device.tablet_breakpoint {
            return Err(PortalError::Validation(
                "device.mobile_breakpoint must be below device.tablet_breakpoint".into(),
            ));
        }
        if self.session.max_concurrent_sessions == 0 {
            return Err(PortalError::Validation(
                "session.max_concurrent_sessions must be at least 1".into(),
            ));
        }
        if self.directory.backend == DirectoryBackend::Remote {
            self.directory.remote()?;
        }
        Ok(())
    }
}
