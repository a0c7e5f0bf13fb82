//! Terminal notification surface.

use crate::notify::{ChannelSpec, Notification, NotificationSurface};
use chrono::Local;
use std::collections::HashSet;
use std::sync::Mutex;

/// Prints each notification as a timestamped line on stdout.
#[derive(Default)]
pub struct ConsoleSurface {
    channels: Mutex<HashSet<String>>,
}

impl ConsoleSurface {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NotificationSurface for ConsoleSurface {
    fn ensure_channel(&self, channel: &ChannelSpec) {
        let mut channels = self
            .channels
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if channels.insert(channel.id.clone()) {
            tracing::debug!(
                channel = %channel.id,
                importance = ?channel.importance,
                "notification channel created"
            );
        }
    }

    fn post(&self, notification: Notification) {
        println!(
            "[{}] {}  {}",
            Local::now().format("%H:%M:%S"),
            notification.title,
            notification.body
        );
    }
}
