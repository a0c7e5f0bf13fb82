//! A fix source for when no location provider is available.
//!
//! This covers a denied permission or a disabled provider. The daemon keeps
//! running against it and simply never observes movement.

use crate::source::types::PositionFix;
use crate::source::SourceError;
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A source that never emits fixes.
pub struct NoopSource {
    reason: String,
    _sender: Sender<PositionFix>,
    receiver: Receiver<PositionFix>,
    running: Arc<AtomicBool>,
}

impl NoopSource {
    /// Create a noop source, recording why no provider is available.
    pub fn new(reason: impl Into<String>) -> Self {
        let (sender, receiver) = bounded(1);
        Self {
            reason: reason.into(),
            _sender: sender,
            receiver,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start the source.
    ///
    /// This only marks the source as running; no fix will ever arrive.
    pub fn start(&mut self) -> Result<(), SourceError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(SourceError::AlreadyRunning);
        }
        tracing::warn!(reason = %self.reason, "location unavailable, movement tracking idle");
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Stop the source.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Check if the source is currently running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Get the receiver for position fixes.
    pub fn receiver(&self) -> &Receiver<PositionFix> {
        &self.receiver
    }

    /// Report the permission state of this source.
    pub fn check_permission(&self) -> Result<(), SourceError> {
        Err(SourceError::PermissionUnavailable(self.reason.clone()))
    }
}
