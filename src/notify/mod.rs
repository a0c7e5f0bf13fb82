//! Notification surface for the companion agent.
//!
//! The surface shows a single ongoing notification, identified by a fixed
//! id, that is replaced on every post. Posting is fire-and-forget: a surface
//! never reports failure back to the movement daemon.

pub mod console;
pub mod queued;

pub use console::ConsoleSurface;
pub use queued::QueuedSurface;

use serde::{Deserialize, Serialize};

/// Id of the ongoing status notification.
pub const STATUS_NOTIFICATION_ID: u32 = 0x01;

/// Title shown on every companion notification.
pub const NOTIFICATION_TITLE: &str = "·  ˚  ✦  ·  ˚";

/// Importance of a notification channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Importance {
    Low,
    Default,
    High,
}

/// A notification channel, created once before the first post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSpec {
    pub id: String,
    pub name: String,
    pub description: String,
    pub importance: Importance,
}

impl ChannelSpec {
    /// The low-importance channel the daemon posts on.
    pub fn daemon() -> Self {
        Self {
            id: "daemon_channel".to_string(),
            name: "Daemon".to_string(),
            description: "daemon companion".to_string(),
            importance: Importance::Low,
        }
    }
}

/// A `(title, body)` pair targeted at a notification id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: u32,
    pub title: String,
    pub body: String,
}

impl Notification {
    /// A notification replacing the ongoing status one.
    pub fn status(body: impl Into<String>) -> Self {
        Self {
            id: STATUS_NOTIFICATION_ID,
            title: NOTIFICATION_TITLE.to_string(),
            body: body.into(),
        }
    }
}

/// Something that can display notifications.
pub trait NotificationSurface: Send + Sync {
    /// Create the channel if it does not exist yet. Must be idempotent.
    fn ensure_channel(&self, channel: &ChannelSpec);

    /// Show `notification`, replacing any with the same id.
    fn post(&self, notification: Notification);
}
