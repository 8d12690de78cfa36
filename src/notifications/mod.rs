//! Per-identity notification feeds.
//!
//! A [`NotificationFeed`] is the append-only event list of one identity. The
//! [`NotificationHub`] owns every feed and is where ticket events are published.

pub mod api;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::core::error::{PortalError, PortalResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationType {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationCategory {
    Ticket,
    Chat,
    User,
    System,
}

impl FromStr for NotificationCategory {
    type Err = PortalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ticket" => Ok(Self::Ticket),
            "chat" => Ok(Self::Chat),
            "user" => Ok(Self::User),
            "system" => Ok(Self::System),
            other => Err(PortalError::Validation(format!(
                "Unknown notification category: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub category: NotificationCategory,
    pub timestamp: DateTime<Utc>,
    pub is_read: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_to: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub title: String,
    pub message: String,
    pub kind: NotificationType,
    pub category: NotificationCategory,
    pub link_to: Option<String>,
}

impl NewNotification {
    pub fn new(
        category: NotificationCategory,
        kind: NotificationType,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            kind,
            category,
            link_to: None,
        }
    }

    pub fn with_link(mut self, path: impl Into<String>) -> Self {
        self.link_to = Some(path.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationFilter {
    pub search: Option<String>,
    /// `None` matches every category.
    pub category: Option<NotificationCategory>,
}

impl NotificationFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn with_category(mut self, category: NotificationCategory) -> Self {
        self.category = Some(category);
        self
    }

    /// Parses a category name, where `all` (or nothing) means no restriction.
    pub fn parse_category(raw: Option<&str>) -> PortalResult<Option<NotificationCategory>> {
        match raw.map(str::trim) {
            None | Some("") => Ok(None),
            Some(s) if s.eq_ignore_ascii_case("all") => Ok(None),
            Some(s) => s.parse().map(Some),
        }
    }

    fn matches(&self, notification: &Notification) -> bool {
        if self
            .category
            .is_some_and(|c| c != notification.category)
        {
            return false;
        }

        match self.search.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(needle) => {
                let needle = needle.to_lowercase();
                notification.title.to_lowercase().contains(&needle)
                    || notification.message.to_lowercase().contains(&needle)
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NotificationFeed {
    items: Vec<Notification>,
}

impl NotificationFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, new: NewNotification) -> Notification {
        self.push_at(new, Utc::now())
    }

    pub fn push_at(&mut self, new: NewNotification, timestamp: DateTime<Utc>) -> Notification {
        let notification = Notification {
            id: Uuid::new_v4(),
            title: new.title,
            message: new.message,
            kind: new.kind,
            category: new.category,
            timestamp,
            is_read: false,
            read_at: None,
            link_to: new.link_to,
        };
        self.items.push(notification.clone());
        notification
    }

    /// Newest first; equal timestamps keep latest-inserted first.
    pub fn list(&self, filter: &NotificationFilter) -> Vec<Notification> {
        let mut matching: Vec<Notification> = self
            .items
            .iter()
            .rev()
            .filter(|n| filter.matches(n))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        matching
    }

    pub fn unread(&self, filter: &NotificationFilter) -> Vec<Notification> {
        self.list(filter).into_iter().filter(|n| !n.is_read).collect()
    }

    pub fn read(&self, filter: &NotificationFilter) -> Vec<Notification> {
        self.list(filter).into_iter().filter(|n| n.is_read).collect()
    }

    pub fn unread_count(&self) -> usize {
        self.items.iter().filter(|n| !n.is_read).count()
    }

    /// True only when an unread entry flipped; absent or already-read ids are a no-op.
    pub fn mark_read(&mut self, id: Uuid) -> bool {
        match self.items.iter_mut().find(|n| n.id == id) {
            Some(n) if !n.is_read => {
                n.is_read = true;
                n.read_at = Some(Utc::now());
                true
            }
            _ => false,
        }
    }

    pub fn mark_all_read(&mut self) -> usize {
        let now = Utc::now();
        let mut marked = 0;
        for n in self.items.iter_mut().filter(|n| !n.is_read) {
            n.is_read = true;
            n.read_at = Some(now);
            marked += 1;
        }
        marked
    }

    pub fn clear(&mut self, id: Uuid) -> bool {
        let before = self.items.len();
        self.items.retain(|n| n.id != id);
        self.items.len() != before
    }

    pub fn clear_all(&mut self) -> usize {
        let removed = self.items.len();
        self.items.clear();
        removed
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct NotificationHub {
    feeds: RwLock<HashMap<Uuid, NotificationFeed>>,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn publish(&self, owner: Uuid, new: NewNotification) -> Notification {
        let notification = self.feeds.write().await.entry(owner).or_default().push(new);
        debug!(
            "Published {:?} notification {} to {owner}",
            notification.category, notification.id
        );
        notification
    }

    pub async fn list(&self, owner: Uuid, filter: &NotificationFilter) -> Vec<Notification> {
        self.feeds
            .read()
            .await
            .get(&owner)
            .map(|feed| feed.list(filter))
            .unwrap_or_default()
    }

    pub async fn unread_count(&self, owner: Uuid) -> usize {
        self.feeds
            .read()
            .await
            .get(&owner)
            .map_or(0, NotificationFeed::unread_count)
    }

    pub async fn mark_read(&self, owner: Uuid, id: Uuid) -> bool {
        self.feeds
            .write()
            .await
            .get_mut(&owner)
            .is_some_and(|feed| feed.mark_read(id))
    }

    pub async fn mark_all_read(&self, owner: Uuid) -> usize {
        self.feeds
            .write()
            .await
            .get_mut(&owner)
            .map_or(0, NotificationFeed::mark_all_read)
    }

    pub async fn clear(&self, owner: Uuid, id: Uuid) -> bool {
        self.feeds
            .write()
            .await
            .get_mut(&owner)
            .is_some_and(|feed| feed.clear(id))
    }

    pub async fn clear_all(&self, owner: Uuid) -> usize {
        self.feeds
            .write()
            .await
            .get_mut(&owner)
            .map_or(0, NotificationFeed::clear_all)
    }

    /// Drops the feed of a removed identity.
    pub async fn forget(&self, owner: Uuid) {
        self.feeds.write().await.remove(&owner);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn ticket_note(title: &str, message: &str) -> NewNotification {
        NewNotification::new(
            NotificationCategory::Ticket,
            NotificationType::Info,
            title,
            message,
        )
    }

    #[test]
    fn test_newest_first_and_stable() {
        let mut feed = NotificationFeed::new();
        let base = Utc::now();
        let old = feed.push_at(ticket_note("old", ""), base - Duration::minutes(5));
        let a = feed.push_at(ticket_note("a", ""), base);
        let b = feed.push_at(ticket_note("b", ""), base);

        let ids: Vec<Uuid> = feed.list(&NotificationFilter::new()).iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![b.id, a.id, old.id]);
        let again: Vec<Uuid> = feed.list(&NotificationFilter::new()).iter().map(|n| n.id).collect();
        assert_eq!(ids, again);
    }

    #[test]
    fn test_mixed_case_search_over_message() {
        let mut feed = NotificationFeed::new();
        feed.push(ticket_note("Status changed", "Printer on floor 3 is ONLINE again"));
        feed.push(ticket_note("Assigned", "You have a new ticket"));

        let found = feed.list(&NotificationFilter::new().with_search("printer On FLOOR"));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].title, "Status changed");
    }

    #[test]
    fn test_category_filter() {
        let mut feed = NotificationFeed::new();
        feed.push(ticket_note("t", "m"));
        feed.push(NewNotification::new(
            NotificationCategory::System,
            NotificationType::Warning,
            "Maintenance",
            "Tonight",
        ));

        let system = feed.list(&NotificationFilter::new().with_category(NotificationCategory::System));
        assert_eq!(system.len(), 1);
        assert_eq!(feed.list(&NotificationFilter::new()).len(), 2);

        assert_eq!(NotificationFilter::parse_category(Some("all")).unwrap(), None);
        assert_eq!(NotificationFilter::parse_category(None).unwrap(), None);
        assert_eq!(
            NotificationFilter::parse_category(Some("Chat")).unwrap(),
            Some(NotificationCategory::Chat)
        );
        assert!(NotificationFilter::parse_category(Some("billing")).is_err());
    }

    #[test]
    fn test_mark_all_read_empties_unread() {
        let mut feed = NotificationFeed::new();
        feed.push(ticket_note("one", ""));
        feed.push(ticket_note("two", ""));
        assert_eq!(feed.unread_count(), 2);

        assert_eq!(feed.mark_all_read(), 2);
        let all = NotificationFilter::new();
        assert!(feed.unread(&all).is_empty());
        assert_eq!(feed.read(&all).len(), 2);
        assert_eq!(feed.mark_all_read(), 0);
    }

    #[test]
    fn test_mark_read_is_idempotent() {
        let mut feed = NotificationFeed::new();
        let n = feed.push(ticket_note("one", ""));

        assert!(feed.mark_read(n.id));
        let first_read_at = feed.list(&NotificationFilter::new())[0].read_at;
        assert!(!feed.mark_read(n.id));
        assert_eq!(feed.list(&NotificationFilter::new())[0].read_at, first_read_at);
        assert!(!feed.mark_read(Uuid::new_v4()));
    }

    #[test]
    fn test_clear() {
        let mut feed = NotificationFeed::new();
        let a = feed.push(ticket_note("a", ""));
        feed.push(ticket_note("b", ""));

        assert!(feed.clear(a.id));
        assert!(!feed.clear(a.id));
        assert_eq!(feed.len(), 1);
        assert_eq!(feed.clear_all(), 1);
        assert!(feed.is_empty());
    }

    #[tokio::test]
    async fn test_hub_scopes_feeds_per_owner() {
        let hub = NotificationHub::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        let n = hub.publish(alice, ticket_note("for alice", "")).await;
        assert_eq!(hub.unread_count(alice).await, 1);
        assert_eq!(hub.unread_count(bob).await, 0);

        assert!(!hub.mark_read(bob, n.id).await);
        assert!(hub.mark_read(alice, n.id).await);
        assert_eq!(hub.unread_count(alice).await, 0);
        assert!(hub.list(bob, &NotificationFilter::new()).await.is_empty());

        hub.forget(alice).await;
        assert!(hub.list(alice, &NotificationFilter::new()).await.is_empty());
    }
}
