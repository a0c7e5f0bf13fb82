//! Fire-and-forget delivery in front of a slow surface.

use crate::notify::{ChannelSpec, Notification, NotificationSurface};
use crossbeam_channel::{bounded, Sender, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

enum Delivery {
    Channel(ChannelSpec),
    Post(Notification),
}

/// Hands notifications to a worker thread so posting never blocks.
///
/// When the queue is full the notification is dropped; the next status
/// refresh supersedes it anyway.
pub struct QueuedSurface {
    sender: Option<Sender<Delivery>>,
    worker: Option<JoinHandle<()>>,
}

impl QueuedSurface {
    pub fn new(inner: Arc<dyn NotificationSurface>, capacity: usize) -> Self {
        let (sender, receiver) = bounded::<Delivery>(capacity.max(1));

        let worker = thread::spawn(move || {
            for delivery in receiver.iter() {
                match delivery {
                    Delivery::Channel(spec) => inner.ensure_channel(&spec),
                    Delivery::Post(notification) => inner.post(notification),
                }
            }
        });

        Self {
            sender: Some(sender),
            worker: Some(worker),
        }
    }

    fn enqueue(&self, delivery: Delivery) {
        let Some(sender) = &self.sender else {
            return;
        };
        match sender.try_send(delivery) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::warn!("notification queue full, dropping notification");
            }
            Err(TrySendError::Disconnected(_)) => {
                tracing::warn!("notification worker gone, dropping notification");
            }
        }
    }
}

impl NotificationSurface for QueuedSurface {
    fn ensure_channel(&self, channel: &ChannelSpec) {
        self.enqueue(Delivery::Channel(channel.clone()));
    }

    fn post(&self, notification: Notification) {
        self.enqueue(Delivery::Post(notification));
    }
}

impl Drop for QueuedSurface {
    /// Delivers whatever is still queued, then joins the worker.
    fn drop(&mut self) {
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
