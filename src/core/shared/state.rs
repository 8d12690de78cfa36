use std::sync::Arc;
use tracing::info;

use crate::core::config::{AppConfig, DirectoryBackend};
use crate::core::error::{PortalError, PortalResult};
use crate::directory::{
    DirectoryProvider, InMemoryDirectory, Registration, RemoteDirectory, Role,
};
use crate::notifications::NotificationHub;
use crate::routes::RouteTable;
use crate::security::password::CredentialHasher;
use crate::security::session::{InMemoryTokenStore, PortalSessions, SessionManager};
use crate::tickets::TicketManager;

/// Everything a request handler can reach. Built once at startup and shared as
/// `Arc<AppState>`.
pub struct AppState {
    pub config: AppConfig,
    pub directory: Arc<dyn DirectoryProvider>,
    pub sessions: PortalSessions,
    pub tickets: TicketManager,
    pub notifications: Arc<NotificationHub>,
    pub routes: RouteTable,
}

impl AppState {
    pub fn new(config: AppConfig, directory: Arc<dyn DirectoryProvider>) -> Self {
        let notifications = Arc::new(NotificationHub::new());
        let tickets = TicketManager::new(directory.clone(), notifications.clone())
            .with_policy(config.tickets.transition_policy);
        let sessions = SessionManager::new(InMemoryTokenStore::new(), config.session.clone());

        Self {
            config,
            directory,
            sessions,
            tickets,
            notifications,
            routes: RouteTable::default(),
        }
    }

    /// Builds the configured directory backend, seeding the bootstrap admin when the
    /// in-memory backend is used.
    pub async fn from_config(config: AppConfig) -> PortalResult<Self> {
        let directory: Arc<dyn DirectoryProvider> = match config.directory.backend {
            DirectoryBackend::Memory => {
                let directory = InMemoryDirectory::new(CredentialHasher::with_defaults()?);
                if let Some(ref admin) = config.directory.bootstrap_admin {
                    let identity = directory
                        .provision(Registration::new(
                            &admin.email,
                            &admin.password,
                            &admin.name,
                            Role::Admin,
                        ))
                        .await
                        .map_err(|e| {
                            PortalError::Validation(format!("Bootstrap admin rejected: {e}"))
                        })?;
                    info!("Seeded bootstrap admin {}", identity.email);
                }
                Arc::new(directory)
            }
            DirectoryBackend::Remote => {
                Arc::new(RemoteDirectory::new(config.directory.remote()?)?)
            }
        };

        info!(
            "Using {} directory, {:?} ticket transitions",
            directory.provider_name(),
            config.tickets.transition_policy
        );
        Ok(Self::new(config, directory))
    }
}
