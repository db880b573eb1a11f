//! Lifecycle notifications.
//!
//! The pipeline calls a [`NotificationSink`] at batch start, after each file,
//! and at batch end or failure. Sinks are fire-and-forget: the pipeline never
//! reads their state.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Severity of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    pub fn new(kind: NotificationKind, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            title: title.into(),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn info(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NotificationKind::Info, title, message)
    }

    pub fn success(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NotificationKind::Success, title, message)
    }

    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NotificationKind::Error, title, message)
    }
}

pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Routes notifications to `tracing`.
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&self, n: Notification) {
        match n.kind {
            NotificationKind::Info => tracing::info!(title = %n.title, "{}", n.message),
            NotificationKind::Success => tracing::info!(title = %n.title, "{}", n.message),
            NotificationKind::Error => tracing::error!(title = %n.title, "{}", n.message),
        }
    }
}

/// Drops every notification.
pub struct NoNotifications;

impl NotificationSink for NoNotifications {
    fn notify(&self, _notification: Notification) {}
}

/// Number of notifications a feed keeps.
pub const FEED_CAPACITY: usize = 10;

/// Bounded in-memory feed, newest first.
pub struct NotificationFeed {
    items: Mutex<VecDeque<Notification>>,
    capacity: usize,
}

impl Default for NotificationFeed {
    fn default() -> Self {
        Self::with_capacity(FEED_CAPACITY)
    }
}

impl NotificationFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
        }
    }

    /// Snapshot of the feed, newest first.
    pub fn items(&self) -> Vec<Notification> {
        match self.items.lock() {
            Ok(items) => items.iter().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().iter().cloned().collect(),
        }
    }
}

impl NotificationSink for NotificationFeed {
    fn notify(&self, notification: Notification) {
        let mut items = match self.items.lock() {
            Ok(items) => items,
            Err(poisoned) => poisoned.into_inner(),
        };
        items.push_front(notification);
        items.truncate(self.capacity);
    }
}

/// Pluralize "document" for user-facing messages.
pub(crate) fn documents(n: usize) -> String {
    if n == 1 {
        "1 document".to_string()
    } else {
        format!("{} documents", n)
    }
}
