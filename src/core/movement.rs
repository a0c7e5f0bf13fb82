//! Movement state machine.
//!
//! Turns a stream of noisy fixes into a session distance, a mood and a
//! throttled trickle of messages. All state transitions happen under one
//! lock; notifications are emitted after the lock is released.

use crate::core::geo;
use crate::core::messages::MessagePool;
use crate::core::mood::{Mood, MoodThresholds};
use crate::journal::SharedJourneyLog;
use crate::notify::{ChannelSpec, Notification, NotificationSurface};
use crate::source::PositionFix;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Tunable thresholds for the movement daemon.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MovementSettings {
    #[serde(flatten)]
    pub mood: MoodThresholds,
    /// Accumulated distance that triggers a throttled message
    pub notify_every_m: f64,
}

impl Default for MovementSettings {
    fn default() -> Self {
        Self {
            mood: MoodThresholds::default(),
            notify_every_m: 500.0,
        }
    }
}

/// Session movement state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MovementState {
    last_fix: Option<PositionFix>,
    total_distance_m: f64,
    distance_since_last_notify_m: f64,
    mood: Mood,
    fixes_seen: u64,
}

/// What a single fix did to the state.
#[derive(Debug, Clone, PartialEq)]
pub struct FixStep {
    /// Distance from the previous fix, `None` for the baseline fix
    pub delta_m: Option<f64>,
    /// Whether the notify threshold was crossed (and the counter reset)
    pub threshold_crossed: bool,
    pub snapshot: MovementSnapshot,
}

/// Read-only copy of the movement state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementSnapshot {
    pub total_distance_m: f64,
    pub distance_since_last_notify_m: f64,
    pub mood: Mood,
    pub fixes_seen: u64,
    pub last_fix: Option<PositionFix>,
}

impl MovementState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one fix.
    ///
    /// The first fix only establishes a baseline. Afterwards the distance
    /// from the previous fix is accumulated, the mood is reclassified from
    /// that distance alone, and the notify counter resets once it reaches
    /// `settings.notify_every_m`.
    pub fn apply(&mut self, fix: PositionFix, settings: &MovementSettings) -> FixStep {
        self.fixes_seen += 1;

        let Some(previous) = self.last_fix.replace(fix) else {
            return FixStep {
                delta_m: None,
                threshold_crossed: false,
                snapshot: self.snapshot(),
            };
        };

        let delta = geo::distance_m(&previous, &fix);
        self.total_distance_m += delta;
        self.distance_since_last_notify_m += delta;
        self.mood = Mood::classify(delta, &settings.mood);

        let threshold_crossed = self.distance_since_last_notify_m >= settings.notify_every_m;
        if threshold_crossed {
            self.distance_since_last_notify_m = 0.0;
        }

        FixStep {
            delta_m: Some(delta),
            threshold_crossed,
            snapshot: self.snapshot(),
        }
    }

    pub fn snapshot(&self) -> MovementSnapshot {
        MovementSnapshot {
            total_distance_m: self.total_distance_m,
            distance_since_last_notify_m: self.distance_since_last_notify_m,
            mood: self.mood,
            fixes_seen: self.fixes_seen,
            last_fix: self.last_fix,
        }
    }

    pub fn mood(&self) -> Mood {
        self.mood
    }

    pub fn total_distance_m(&self) -> f64 {
        self.total_distance_m
    }
}

/// Outcome of `MovementDaemon::on_position_fix`.
#[derive(Debug, Clone, PartialEq)]
pub struct FixOutcome {
    pub step: FixStep,
    /// Body of the status refresh that was pushed
    pub status: String,
    /// The throttled message, when one fired
    pub message: Option<String>,
}

/// Errors from the daemon lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("movement daemon is already running")]
    AlreadyRunning,
}

struct DaemonShared {
    state: Mutex<MovementState>,
    settings: MovementSettings,
    display_name: String,
    messages: Mutex<MessagePool>,
    surface: Arc<dyn NotificationSurface>,
    journal: Option<SharedJourneyLog>,
}

/// The movement daemon: owns the session state and its worker.
pub struct MovementDaemon {
    shared: Arc<DaemonShared>,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl MovementDaemon {
    pub fn new(
        display_name: impl Into<String>,
        settings: MovementSettings,
        surface: Arc<dyn NotificationSurface>,
    ) -> Self {
        Self {
            shared: Arc::new(DaemonShared {
                state: Mutex::new(MovementState::new()),
                settings,
                display_name: display_name.into(),
                messages: Mutex::new(MessagePool::new()),
                surface,
                journal: None,
            }),
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    /// Use a specific message pool (e.g. a seeded one).
    ///
    /// Ignored, with a warning, while the worker is running.
    pub fn with_messages(mut self, pool: MessagePool) -> Self {
        match Arc::get_mut(&mut self.shared) {
            Some(shared) => shared.messages = Mutex::new(pool),
            None => tracing::warn!("message pool not replaced: daemon is running"),
        }
        self
    }

    /// Record counters into a journey log.
    ///
    /// Ignored, with a warning, while the worker is running.
    pub fn with_journal(mut self, journal: SharedJourneyLog) -> Self {
        match Arc::get_mut(&mut self.shared) {
            Some(shared) => shared.journal = Some(journal),
            None => tracing::warn!("journal not attached: daemon is running"),
        }
        self
    }

    /// Start a new session and consume fixes from `fixes` on a worker thread.
    ///
    /// Every session starts from zero distance with no baseline fix. Fixes
    /// are processed strictly in arrival order. If the source never sends
    /// anything, or disconnects, the worker idles until `stop`.
    pub fn start(&mut self, fixes: Receiver<PositionFix>) -> Result<(), DaemonError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(DaemonError::AlreadyRunning);
        }
        *self.shared.lock_state() = MovementState::new();

        self.shared.surface.ensure_channel(&ChannelSpec::daemon());
        self.shared.surface.post(Notification::status(format!(
            "{} active",
            self.shared.display_name
        )));
        tracing::info!(name = %self.shared.display_name, "movement daemon started");

        let shared = self.shared.clone();
        let running = self.running.clone();
        self.worker = Some(thread::spawn(move || {
            run_worker(&shared, &fixes, &running);
        }));

        Ok(())
    }

    /// Stop the worker and return the final state.
    pub fn stop(&mut self) -> MovementSnapshot {
        self.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("movement worker panicked");
            }
        }
        let snapshot = self.snapshot();
        tracing::info!(
            total_m = snapshot.total_distance_m,
            fixes = snapshot.fixes_seen,
            "movement daemon stopped"
        );
        snapshot
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Process one fix and push the resulting notifications.
    ///
    /// Every call pushes exactly one status refresh.
    pub fn on_position_fix(&self, fix: PositionFix) -> FixOutcome {
        self.shared.on_position_fix(fix)
    }

    pub fn snapshot(&self) -> MovementSnapshot {
        self.shared.lock_state().snapshot()
    }

    pub fn settings(&self) -> &MovementSettings {
        &self.shared.settings
    }
}

impl Drop for MovementDaemon {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.stop();
        }
    }
}

impl DaemonShared {
    fn lock_state(&self) -> MutexGuard<'_, MovementState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn on_position_fix(&self, fix: PositionFix) -> FixOutcome {
        let step = self.lock_state().apply(fix, &self.settings);

        let status = status_line(&self.display_name, &step.snapshot);
        self.surface.post(Notification::status(status.clone()));

        let message = if step.threshold_crossed {
            let text = self
                .messages
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .pick(&self.display_name, step.snapshot.total_distance_m);
            tracing::info!(
                total_m = step.snapshot.total_distance_m.round(),
                message = %text,
                "throttled message"
            );
            self.surface.post(Notification::status(text.clone()));
            Some(text)
        } else {
            None
        };

        if let Some(journal) = &self.journal {
            journal.record_fix();
            if let Some(delta) = step.delta_m {
                journal.record_distance(delta);
            }
            if message.is_some() {
                journal.record_message();
            }
        }

        tracing::debug!(
            delta_m = ?step.delta_m,
            mood = %step.snapshot.mood,
            total_m = step.snapshot.total_distance_m,
            "fix processed"
        );

        FixOutcome {
            step,
            status,
            message,
        }
    }
}

fn run_worker(shared: &DaemonShared, fixes: &Receiver<PositionFix>, running: &AtomicBool) {
    let mut disconnected = false;

    while running.load(Ordering::SeqCst) {
        if disconnected {
            thread::sleep(POLL_INTERVAL);
            continue;
        }

        match fixes.recv_timeout(POLL_INTERVAL) {
            Ok(fix) => {
                shared.on_position_fix(fix);
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                tracing::debug!("fix source disconnected, idling");
                disconnected = true;
            }
        }
    }

    // Anything already queued was observed before the stop request.
    while let Ok(fix) = fixes.try_recv() {
        shared.on_position_fix(fix);
    }
}

/// Body of the ongoing status notification.
pub fn status_line(name: &str, snapshot: &MovementSnapshot) -> String {
    format!(
        "{} ({}) · {:.1}km",
        name,
        snapshot.mood,
        snapshot.total_distance_m / 1000.0
    )
}
