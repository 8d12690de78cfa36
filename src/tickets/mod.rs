//! Ticket lifecycle.
//!
//! Tickets are created by any signed-in identity and mutated only by support and admin
//! identities. They are never deleted. Status and assignment changes are published to
//! the notification hub.

pub mod api;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::error::{PortalError, PortalResult};
use crate::directory::{DirectoryProvider, Identity, Role};
use crate::notifications::{NewNotification, NotificationCategory, NotificationHub, NotificationType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Open,
    InProgress,
    Resolved,
    Closed,
}

impl TicketStatus {
    pub const ALL: [TicketStatus; 4] = [
        TicketStatus::Open,
        TicketStatus::InProgress,
        TicketStatus::Resolved,
        TicketStatus::Closed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Resolved => "resolved",
            Self::Closed => "closed",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Open => 0,
            Self::InProgress => 1,
            Self::Resolved => 2,
            Self::Closed => 3,
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketStatus {
    type Err = PortalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "open" => Ok(Self::Open),
            "in_progress" => Ok(Self::InProgress),
            "resolved" => Ok(Self::Resolved),
            "closed" => Ok(Self::Closed),
            other => Err(PortalError::Validation(format!("Unknown ticket status: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketPriority {
    Low,
    #[default]
    Medium,
    High,
}

impl TicketPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl FromStr for TicketPriority {
    type Err = PortalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(PortalError::Validation(format!("Unknown ticket priority: {other}"))),
        }
    }
}

/// Which status edges `update` accepts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionPolicy {
    #[default]
    Unrestricted,
    /// Status may only move towards `closed`; `reopen` is the way back.
    ForwardOnly,
}

impl TransitionPolicy {
    pub fn check(&self, from: TicketStatus, to: TicketStatus) -> PortalResult<()> {
        match self {
            Self::Unrestricted => Ok(()),
            Self::ForwardOnly if to.rank() >= from.rank() => Ok(()),
            Self::ForwardOnly => Err(PortalError::InvalidTransition {
                from: from.to_string(),
                to: to.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: Uuid,
    pub ticket_number: String,
    pub title: String,
    pub description: String,
    pub status: TicketStatus,
    pub priority: TicketPriority,
    pub reporter: Uuid,
    pub assigned_agent: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    /// Numeric part of `ticket_number`, used for ordering.
    #[serde(skip)]
    sequence: u64,
}

impl Ticket {
    pub fn link(&self) -> String {
        format!("/tickets/{}", self.id)
    }

    fn set_status(&mut self, status: TicketStatus, now: DateTime<Utc>) {
        self.status = status;
        match status {
            TicketStatus::Open | TicketStatus::InProgress => {
                self.resolved_at = None;
                self.closed_at = None;
            }
            TicketStatus::Resolved => {
                self.resolved_at.get_or_insert(now);
                self.closed_at = None;
            }
            TicketStatus::Closed => {
                self.closed_at.get_or_insert(now);
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTicket {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub priority: TicketPriority,
}

impl NewTicket {
    pub fn new(title: &str, description: &str, priority: TicketPriority) -> Self {
        Self {
            title: title.to_string(),
            description: description.to_string(),
            priority,
        }
    }
}

/// Partial update. `assigned_agent: Some(None)` unassigns.
#[derive(Debug, Clone, Default)]
pub struct TicketPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TicketStatus>,
    pub priority: Option<TicketPriority>,
    pub assigned_agent: Option<Option<Uuid>>,
}

impl TicketPatch {
    pub fn status(status: TicketStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn assign(agent: Option<Uuid>) -> Self {
        Self {
            assigned_agent: Some(agent),
            ..Default::default()
        }
    }

    fn validate(&self) -> PortalResult<()> {
        if self.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(PortalError::Validation("Title cannot be empty".into()));
        }
        if self.description.as_deref().is_some_and(|d| d.trim().is_empty()) {
            return Err(PortalError::Validation("Description cannot be empty".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct TicketQuery {
    pub search: Option<String>,
    pub status: Option<TicketStatus>,
    pub priority: Option<TicketPriority>,
    pub reporter: Option<Uuid>,
    pub assigned_agent: Option<Uuid>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl TicketQuery {
    fn matches(&self, ticket: &Ticket) -> bool {
        if self.status.is_some_and(|s| s != ticket.status)
            || self.priority.is_some_and(|p| p != ticket.priority)
            || self.reporter.is_some_and(|r| r != ticket.reporter)
            || self
                .assigned_agent
                .is_some_and(|a| Some(a) != ticket.assigned_agent)
        {
            return false;
        }

        match self.search.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(needle) => {
                let needle = needle.to_lowercase();
                ticket.title.to_lowercase().contains(&needle)
                    || ticket.description.to_lowercase().contains(&needle)
                    || ticket.ticket_number.to_lowercase().contains(&needle)
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TicketStats {
    pub total_tickets: usize,
    pub open_tickets: usize,
    pub in_progress_tickets: usize,
    pub resolved_tickets: usize,
    pub closed_tickets: usize,
    pub unassigned_tickets: usize,
    pub high_priority_tickets: usize,
}

pub struct TicketManager {
    tickets: RwLock<HashMap<Uuid, Ticket>>,
    sequence: AtomicU64,
    directory: Arc<dyn DirectoryProvider>,
    notifications: Arc<NotificationHub>,
    policy: TransitionPolicy,
}

impl TicketManager {
    pub fn new(directory: Arc<dyn DirectoryProvider>, notifications: Arc<NotificationHub>) -> Self {
        Self {
            tickets: RwLock::new(HashMap::new()),
            sequence: AtomicU64::new(0),
            directory,
            notifications,
            policy: TransitionPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: TransitionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> TransitionPolicy {
        self.policy
    }

    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub async fn create(&self, reporter: &Identity, new: NewTicket) -> PortalResult<Ticket> {
        let title = new.title.trim();
        let description = new.description.trim();
        if title.is_empty() {
            return Err(PortalError::Validation("Title cannot be empty".into()));
        }
        if description.is_empty() {
            return Err(PortalError::Validation("Description cannot be empty".into()));
        }

        let now = Utc::now();
        let sequence = self.next_sequence();
        let ticket = Ticket {
            id: Uuid::new_v4(),
            ticket_number: format!("TKT-{sequence:06}"),
            title: title.to_string(),
            description: description.to_string(),
            status: TicketStatus::Open,
            priority: new.priority,
            reporter: reporter.id,
            assigned_agent: None,
            created_at: now,
            updated_at: now,
            resolved_at: None,
            closed_at: None,
            sequence,
        };

        self.tickets.write().await.insert(ticket.id, ticket.clone());
        info!("Created ticket {} for {}", ticket.ticket_number, reporter.id);
        Ok(ticket)
    }

    /// Clients only see tickets they reported; anything else reads as missing.
    pub async fn get(&self, actor: &Identity, id: Uuid) -> PortalResult<Ticket> {
        let tickets = self.tickets.read().await;
        tickets
            .get(&id)
            .filter(|t| actor.role.can_manage_tickets() || t.reporter == actor.id)
            .cloned()
            .ok_or_else(|| PortalError::NotFound(format!("Ticket {id}")))
    }

    /// Newest first. Clients are always scoped to their own tickets.
    pub async fn list(&self, actor: &Identity, query: &TicketQuery) -> Vec<Ticket> {
        let mut query = query.clone();
        if actor.role == Role::Client {
            query.reporter = Some(actor.id);
        }

        let tickets = self.tickets.read().await;
        let mut matching: Vec<Ticket> = tickets
            .values()
            .filter(|t| query.matches(t))
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.sequence.cmp(&a.sequence))
        });

        matching
            .into_iter()
            .skip(query.offset.unwrap_or(0))
            .take(query.limit.unwrap_or(usize::MAX))
            .collect()
    }

    pub async fn update(&self, actor: &Identity, id: Uuid, patch: TicketPatch) -> PortalResult<Ticket> {
        self.apply(actor, id, patch, self.policy).await
    }

    async fn apply(
        &self,
        actor: &Identity,
        id: Uuid,
        patch: TicketPatch,
        policy: TransitionPolicy,
    ) -> PortalResult<Ticket> {
        let visible = self
            .tickets
            .read()
            .await
            .get(&id)
            .is_some_and(|t| actor.role.can_manage_tickets() || t.reporter == actor.id);
        if !visible {
            return Err(PortalError::NotFound(format!("Ticket {id}")));
        }

        if !actor.role.can_manage_tickets() {
            warn!("{} {} attempted to modify ticket {id}", actor.role, actor.id);
            return Err(PortalError::Forbidden(
                "Only support and admin users can modify tickets".into(),
            ));
        }

        patch.validate()?;

        let new_agent = match patch.assigned_agent {
            Some(Some(agent_id)) => Some(self.resolve_agent(agent_id).await?),
            _ => None,
        };

        let (before, after) = {
            let mut tickets = self.tickets.write().await;
            let ticket = tickets
                .get_mut(&id)
                .ok_or_else(|| PortalError::NotFound(format!("Ticket {id}")))?;
            // Policy is checked against the locked ticket, not the earlier read.
            if let Some(status) = patch.status {
                policy.check(ticket.status, status)?;
            }
            let before = ticket.clone();
            let now = Utc::now();

            if let Some(ref title) = patch.title {
                ticket.title = title.trim().to_string();
            }
            if let Some(ref description) = patch.description {
                ticket.description = description.trim().to_string();
            }
            if let Some(priority) = patch.priority {
                ticket.priority = priority;
            }
            if let Some(status) = patch.status {
                ticket.set_status(status, now);
            }
            if let Some(agent) = patch.assigned_agent {
                ticket.assigned_agent = agent;
            }
            ticket.updated_at = now;

            (before, ticket.clone())
        };

        debug!("Updated ticket {} by {}", after.ticket_number, actor.id);
        self.publish_changes(actor, &before, &after, new_agent.as_ref())
            .await;
        Ok(after)
    }

    pub async fn assign(&self, actor: &Identity, id: Uuid, agent: Option<Uuid>) -> PortalResult<Ticket> {
        self.update(actor, id, TicketPatch::assign(agent)).await
    }

    pub async fn change_status(
        &self,
        actor: &Identity,
        id: Uuid,
        status: TicketStatus,
    ) -> PortalResult<Ticket> {
        self.update(actor, id, TicketPatch::status(status)).await
    }

    /// Back to `open` regardless of policy, clearing resolution timestamps.
    pub async fn reopen(&self, actor: &Identity, id: Uuid) -> PortalResult<Ticket> {
        let patch = TicketPatch::status(TicketStatus::Open);
        self.apply(actor, id, patch, TransitionPolicy::Unrestricted)
            .await
    }

    /// Unassigns every ticket held by `agent_id` and tells each reporter.
    pub async fn release_agent(&self, agent_id: Uuid) -> usize {
        let released: Vec<Ticket> = {
            let mut tickets = self.tickets.write().await;
            let now = Utc::now();
            tickets
                .values_mut()
                .filter(|t| t.assigned_agent == Some(agent_id))
                .map(|t| {
                    t.assigned_agent = None;
                    t.updated_at = now;
                    t.clone()
                })
                .collect()
        };

        for ticket in &released {
            let note = NewNotification::new(
                NotificationCategory::Ticket,
                NotificationType::Warning,
                format!("Ticket {} unassigned", ticket.ticket_number),
                format!("\"{}\" is waiting for a new agent", ticket.title),
            )
            .with_link(ticket.link());
            self.notifications.publish(ticket.reporter, note).await;
        }

        if !released.is_empty() {
            info!("Released {} tickets held by {agent_id}", released.len());
        }
        released.len()
    }

    pub async fn stats(&self, actor: &Identity) -> TicketStats {
        let tickets = self.list(actor, &TicketQuery::default()).await;
        let mut stats = TicketStats {
            total_tickets: tickets.len(),
            ..Default::default()
        };

        for ticket in &tickets {
            match ticket.status {
                TicketStatus::Open => stats.open_tickets += 1,
                TicketStatus::InProgress => stats.in_progress_tickets += 1,
                TicketStatus::Resolved => stats.resolved_tickets += 1,
                TicketStatus::Closed => stats.closed_tickets += 1,
            }
            if ticket.assigned_agent.is_none() {
                stats.unassigned_tickets += 1;
            }
            if ticket.priority == TicketPriority::High {
                stats.high_priority_tickets += 1;
            }
        }
        stats
    }

    async fn resolve_agent(&self, agent_id: Uuid) -> PortalResult<Identity> {
        match self.directory.get(agent_id).await? {
            Some(agent) if agent.role == Role::Support => Ok(agent),
            Some(other) => Err(PortalError::InvalidAssignee(format!(
                "{} has role {}, expected support",
                other.id, other.role
            ))),
            None => Err(PortalError::InvalidAssignee(format!("No identity {agent_id}"))),
        }
    }

    async fn publish_changes(
        &self,
        actor: &Identity,
        before: &Ticket,
        after: &Ticket,
        new_agent: Option<&Identity>,
    ) {
        if before.status != after.status {
            let kind = match after.status {
                TicketStatus::Resolved => NotificationType::Success,
                _ => NotificationType::Info,
            };
            let note = NewNotification::new(
                NotificationCategory::Ticket,
                kind,
                format!("Ticket {} updated", after.ticket_number),
                format!(
                    "\"{}\" moved from {} to {}",
                    after.title, before.status, after.status
                ),
            )
            .with_link(after.link());

            self.notifications.publish(after.reporter, note.clone()).await;
            if let Some(agent) = after.assigned_agent {
                if agent != actor.id && agent != after.reporter {
                    self.notifications.publish(agent, note).await;
                }
            }
        }

        if let Some(agent) = new_agent {
            if before.assigned_agent != Some(agent.id) {
                let to_agent = NewNotification::new(
                    NotificationCategory::Ticket,
                    NotificationType::Info,
                    format!("Ticket {} assigned to you", after.ticket_number),
                    format!("You are now handling \"{}\"", after.title),
                )
                .with_link(after.link());
                self.notifications.publish(agent.id, to_agent).await;

                let to_reporter = NewNotification::new(
                    NotificationCategory::Ticket,
                    NotificationType::Info,
                    format!("Ticket {} assigned", after.ticket_number),
                    format!("{} is now handling \"{}\"", agent.name, after.title),
                )
                .with_link(after.link());
                self.notifications.publish(after.reporter, to_reporter).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{InMemoryDirectory, Registration};
    use crate::notifications::NotificationFilter;

    struct Fixture {
        manager: TicketManager,
        hub: Arc<NotificationHub>,
        client: Identity,
        agent: Identity,
        admin: Identity,
    }

    async fn fixture(policy: TransitionPolicy) -> Fixture {
        let directory = InMemoryDirectory::with_defaults().expect("hasher");
        let client = directory
            .provision(Registration::new("client@example.com", "password1", "Casey", Role::Client))
            .await
            .expect("client");
        let agent = directory
            .provision(Registration::new("agent@example.com", "password1", "Sam", Role::Support))
            .await
            .expect("agent");
        let admin = directory
            .provision(Registration::new("admin@example.com", "password1", "Alex", Role::Admin))
            .await
            .expect("admin");

        let hub = Arc::new(NotificationHub::new());
        let manager = TicketManager::new(Arc::new(directory), hub.clone()).with_policy(policy);
        Fixture {
            manager,
            hub,
            client,
            agent,
            admin,
        }
    }

    fn printer_ticket(priority: TicketPriority) -> NewTicket {
        NewTicket::new("Printer offline", "The 3rd floor printer is not responding", priority)
    }

    #[tokio::test]
    async fn test_create_starts_open_and_unassigned() {
        let f = fixture(TransitionPolicy::Unrestricted).await;
        let ticket = f
            .manager
            .create(&f.client, printer_ticket(TicketPriority::Low))
            .await
            .expect("Create failed");

        assert_eq!(ticket.status, TicketStatus::Open);
        assert_eq!(ticket.assigned_agent, None);
        assert_eq!(ticket.reporter, f.client.id);
        assert_eq!(ticket.ticket_number, "TKT-000001");

        let second = f
            .manager
            .create(&f.client, printer_ticket(TicketPriority::Low))
            .await
            .unwrap();
        assert_eq!(second.ticket_number, "TKT-000002");
    }

    #[tokio::test]
    async fn test_create_requires_title_and_description() {
        let f = fixture(TransitionPolicy::Unrestricted).await;
        let err = f
            .manager
            .create(&f.client, NewTicket::new("  ", "body", TicketPriority::Low))
            .await
            .unwrap_err();
        assert!(matches!(err, PortalError::Validation(_)));

        let err = f
            .manager
            .create(&f.client, NewTicket::new("title", "", TicketPriority::Low))
            .await
            .unwrap_err();
        assert!(matches!(err, PortalError::Validation(_)));
    }

    #[tokio::test]
    async fn test_update_unknown_ticket() {
        let f = fixture(TransitionPolicy::Unrestricted).await;
        let err = f
            .manager
            .update(&f.agent, Uuid::new_v4(), TicketPatch::status(TicketStatus::Closed))
            .await
            .unwrap_err();
        assert!(matches!(err, PortalError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_resolve_then_reopen_via_update() {
        let f = fixture(TransitionPolicy::Unrestricted).await;
        let ticket = f
            .manager
            .create(&f.client, printer_ticket(TicketPriority::High))
            .await
            .unwrap();

        let resolved = f
            .manager
            .change_status(&f.agent, ticket.id, TicketStatus::Resolved)
            .await
            .unwrap();
        assert!(resolved.resolved_at.is_some());

        let reopened = f
            .manager
            .change_status(&f.agent, ticket.id, TicketStatus::Open)
            .await
            .unwrap();
        assert_eq!(reopened.status, TicketStatus::Open);
        assert_eq!(reopened.priority, TicketPriority::High);
        assert_eq!(reopened.resolved_at, None);
    }

    #[tokio::test]
    async fn test_forward_only_policy() {
        let f = fixture(TransitionPolicy::ForwardOnly).await;
        let ticket = f
            .manager
            .create(&f.client, printer_ticket(TicketPriority::Medium))
            .await
            .unwrap();

        f.manager
            .change_status(&f.agent, ticket.id, TicketStatus::Closed)
            .await
            .unwrap();
        let err = f
            .manager
            .change_status(&f.agent, ticket.id, TicketStatus::InProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, PortalError::InvalidTransition { .. }));

        let reopened = f.manager.reopen(&f.admin, ticket.id).await.unwrap();
        assert_eq!(reopened.status, TicketStatus::Open);
        assert_eq!(reopened.closed_at, None);
    }

    #[tokio::test]
    async fn test_assignee_must_be_support() {
        let f = fixture(TransitionPolicy::Unrestricted).await;
        let ticket = f
            .manager
            .create(&f.client, printer_ticket(TicketPriority::Medium))
            .await
            .unwrap();

        for bad in [f.admin.id, f.client.id, Uuid::new_v4()] {
            let err = f.manager.assign(&f.admin, ticket.id, Some(bad)).await.unwrap_err();
            assert!(matches!(err, PortalError::InvalidAssignee(_)));
        }

        let assigned = f
            .manager
            .assign(&f.admin, ticket.id, Some(f.agent.id))
            .await
            .unwrap();
        assert_eq!(assigned.assigned_agent, Some(f.agent.id));

        let unassigned = f.manager.assign(&f.admin, ticket.id, None).await.unwrap();
        assert_eq!(unassigned.assigned_agent, None);
    }

    #[tokio::test]
    async fn test_clients_cannot_mutate() {
        let f = fixture(TransitionPolicy::Unrestricted).await;
        let ticket = f
            .manager
            .create(&f.client, printer_ticket(TicketPriority::Medium))
            .await
            .unwrap();

        let err = f
            .manager
            .change_status(&f.client, ticket.id, TicketStatus::Closed)
            .await
            .unwrap_err();
        assert!(matches!(err, PortalError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_foreign_ticket_update_reads_as_missing() {
        let f = fixture(TransitionPolicy::Unrestricted).await;
        let theirs = f
            .manager
            .create(&f.agent, NewTicket::new("VPN", "Cannot connect", TicketPriority::Low))
            .await
            .unwrap();

        let foreign = f
            .manager
            .change_status(&f.client, theirs.id, TicketStatus::Closed)
            .await
            .unwrap_err();
        let unknown = f
            .manager
            .change_status(&f.client, Uuid::new_v4(), TicketStatus::Closed)
            .await
            .unwrap_err();
        assert!(matches!(foreign, PortalError::NotFound(_)));
        assert!(matches!(unknown, PortalError::NotFound(_)));

        let err = f.manager.reopen(&f.client, theirs.id).await.unwrap_err();
        assert!(matches!(err, PortalError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_release_agent_unassigns_and_notifies() {
        let f = fixture(TransitionPolicy::Unrestricted).await;
        let held = f
            .manager
            .create(&f.client, printer_ticket(TicketPriority::High))
            .await
            .unwrap();
        let other = f
            .manager
            .create(&f.client, printer_ticket(TicketPriority::Low))
            .await
            .unwrap();
        f.manager
            .assign(&f.admin, held.id, Some(f.agent.id))
            .await
            .unwrap();
        let unread = f.hub.unread_count(f.client.id).await;

        assert_eq!(f.manager.release_agent(f.agent.id).await, 1);

        let released = f.manager.get(&f.admin, held.id).await.unwrap();
        assert_eq!(released.assigned_agent, None);
        assert!(released.updated_at >= held.updated_at);
        assert_eq!(f.manager.get(&f.admin, other.id).await.unwrap(), other);

        assert_eq!(f.hub.unread_count(f.client.id).await, unread + 1);
        let latest = &f.hub.list(f.client.id, &NotificationFilter::new()).await[0];
        assert_eq!(latest.kind, NotificationType::Warning);

        assert_eq!(f.manager.release_agent(f.agent.id).await, 0);
        assert_eq!(f.manager.stats(&f.admin).await.unassigned_tickets, 2);
    }

    #[tokio::test]
    async fn test_same_instant_orders_by_number_past_six_digits() {
        let f = fixture(TransitionPolicy::Unrestricted).await;
        f.manager.sequence.store(999_998, Ordering::SeqCst);
        let older = f
            .manager
            .create(&f.client, printer_ticket(TicketPriority::Low))
            .await
            .unwrap();
        let newer = f
            .manager
            .create(&f.client, printer_ticket(TicketPriority::Low))
            .await
            .unwrap();
        assert_eq!(older.ticket_number, "TKT-999999");
        assert_eq!(newer.ticket_number, "TKT-1000000");

        {
            let mut tickets = f.manager.tickets.write().await;
            let instant = older.created_at;
            for ticket in tickets.values_mut() {
                ticket.created_at = instant;
            }
        }

        let listed = f.manager.list(&f.admin, &TicketQuery::default()).await;
        let numbers: Vec<_> = listed.iter().map(|t| t.ticket_number.as_str()).collect();
        assert_eq!(numbers, ["TKT-1000000", "TKT-999999"]);
    }

    #[tokio::test]
    async fn test_changes_notify_reporter_and_agent() {
        let f = fixture(TransitionPolicy::Unrestricted).await;
        let ticket = f
            .manager
            .create(&f.client, printer_ticket(TicketPriority::Medium))
            .await
            .unwrap();

        f.manager
            .assign(&f.admin, ticket.id, Some(f.agent.id))
            .await
            .unwrap();
        assert_eq!(f.hub.unread_count(f.agent.id).await, 1);
        assert_eq!(f.hub.unread_count(f.client.id).await, 1);

        f.manager
            .change_status(&f.admin, ticket.id, TicketStatus::InProgress)
            .await
            .unwrap();
        assert_eq!(f.hub.unread_count(f.client.id).await, 2);
        assert_eq!(f.hub.unread_count(f.agent.id).await, 2);

        // The acting agent is not told about their own change.
        f.manager
            .change_status(&f.agent, ticket.id, TicketStatus::Resolved)
            .await
            .unwrap();
        assert_eq!(f.hub.unread_count(f.agent.id).await, 2);

        let latest = &f.hub.list(f.client.id, &NotificationFilter::new()).await[0];
        assert_eq!(latest.kind, NotificationType::Success);
        assert_eq!(latest.link_to.as_deref(), Some(ticket.link().as_str()));
        assert_eq!(f.hub.unread_count(f.admin.id).await, 0);
    }

    #[tokio::test]
    async fn test_list_scoping_and_stats() {
        let f = fixture(TransitionPolicy::Unrestricted).await;
        let mine = f
            .manager
            .create(&f.client, printer_ticket(TicketPriority::High))
            .await
            .unwrap();
        let theirs = f
            .manager
            .create(&f.agent, NewTicket::new("VPN", "Cannot connect", TicketPriority::Low))
            .await
            .unwrap();

        let client_view = f.manager.list(&f.client, &TicketQuery::default()).await;
        assert_eq!(client_view, vec![mine.clone()]);
        assert!(matches!(
            f.manager.get(&f.client, theirs.id).await.unwrap_err(),
            PortalError::NotFound(_)
        ));

        let all = f.manager.list(&f.admin, &TicketQuery::default()).await;
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, theirs.id);

        let search = TicketQuery {
            search: Some("printer".into()),
            ..Default::default()
        };
        assert_eq!(f.manager.list(&f.admin, &search).await.len(), 1);

        let stats = f.manager.stats(&f.admin).await;
        assert_eq!(stats.total_tickets, 2);
        assert_eq!(stats.open_tickets, 2);
        assert_eq!(stats.high_priority_tickets, 1);
        assert_eq!(f.manager.stats(&f.client).await.total_tickets, 1);
    }
}
