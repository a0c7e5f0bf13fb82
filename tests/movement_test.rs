//! Integration tests for the movement daemon

use companion_agent::core::geo::EARTH_RADIUS_M;
use companion_agent::core::{distance_m, MessagePool, Mood, MovementDaemon, MovementSettings};
use companion_agent::journal::JourneyLog;
use companion_agent::notify::{
    ChannelSpec, Notification, NotificationSurface, NOTIFICATION_TITLE, STATUS_NOTIFICATION_ID,
};
use companion_agent::source::{NoopSource, PositionFix};
use crossbeam_channel::bounded;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct RecordingSurface {
    channels: Mutex<Vec<ChannelSpec>>,
    posted: Mutex<Vec<Notification>>,
}

impl RecordingSurface {
    fn posted(&self) -> Vec<Notification> {
        self.posted.lock().unwrap().clone()
    }

    fn bodies(&self) -> Vec<String> {
        self.posted().into_iter().map(|n| n.body).collect()
    }
}

impl NotificationSurface for RecordingSurface {
    fn ensure_channel(&self, channel: &ChannelSpec) {
        let mut channels = self.channels.lock().unwrap();
        if !channels.contains(channel) {
            channels.push(channel.clone());
        }
    }

    fn post(&self, notification: Notification) {
        self.posted.lock().unwrap().push(notification);
    }
}

/// A fix on the equator `meters` east of the origin.
fn east(meters: f64) -> PositionFix {
    PositionFix {
        latitude: 0.0,
        longitude: (meters / EARTH_RADIUS_M).to_degrees(),
        accuracy: None,
        timestamp: None,
    }
}

fn daemon(surface: &Arc<RecordingSurface>) -> MovementDaemon {
    MovementDaemon::new("mira", MovementSettings::default(), surface.clone())
        .with_messages(MessagePool::seeded(3))
}

#[test]
fn test_total_is_sum_of_consecutive_distances() {
    let surface = Arc::new(RecordingSurface::default());
    let daemon = daemon(&surface);

    let fixes = [
        PositionFix::new(48.8566, 2.3522).unwrap(),
        PositionFix::new(48.8570, 2.3530).unwrap(),
        PositionFix::new(48.8581, 2.3549).unwrap(),
        PositionFix::new(48.8581, 2.3549).unwrap(),
        PositionFix::new(48.8600, 2.3500).unwrap(),
    ];

    let mut expected = 0.0;
    for (i, fix) in fixes.iter().enumerate() {
        if i > 0 {
            expected += distance_m(&fixes[i - 1], fix);
        }
        daemon.on_position_fix(*fix);
    }

    let snapshot = daemon.snapshot();
    assert!((snapshot.total_distance_m - expected).abs() < 1e-6);
    assert_eq!(snapshot.fixes_seen, fixes.len() as u64);
    // Distance never decreases, even across a duplicate fix.
    assert!(snapshot.total_distance_m >= 0.0);
}

#[test]
fn test_mood_sequence() {
    let surface = Arc::new(RecordingSurface::default());
    let daemon = daemon(&surface);

    daemon.on_position_fix(east(0.0));
    let moods: Vec<Mood> = [5.0, 65.0, 85.0]
        .into_iter()
        .map(|position| daemon.on_position_fix(east(position)).step.snapshot.mood)
        .collect();

    assert_eq!(moods, vec![Mood::Calm, Mood::Excited, Mood::Content]);
}

#[test]
fn test_one_status_refresh_per_fix() {
    let surface = Arc::new(RecordingSurface::default());
    let daemon = daemon(&surface);

    for position in [0.0, 3.0, 9.0, 40.0] {
        let outcome = daemon.on_position_fix(east(position));
        assert!(outcome.message.is_none());
    }

    let posted = surface.posted();
    assert_eq!(posted.len(), 4);
    assert!(posted
        .iter()
        .all(|n| n.id == STATUS_NOTIFICATION_ID && n.title == NOTIFICATION_TITLE));
    assert_eq!(posted[0].body, "mira (calm) · 0.0km");
    assert_eq!(posted[3].body, "mira (content) · 0.0km");
}

#[test]
fn test_throttled_message_fires_on_threshold() {
    let surface = Arc::new(RecordingSurface::default());
    let daemon = daemon(&surface);

    daemon.on_position_fix(east(0.0));
    let first = daemon.on_position_fix(east(300.0));
    let second = daemon.on_position_fix(east(550.0));

    assert!(first.message.is_none());
    let message = second.message.expect("threshold crossed");
    assert!(message.contains("mira"));
    assert_eq!(second.step.snapshot.distance_since_last_notify_m, 0.0);

    // Status refresh comes first, then the message on the same id.
    let bodies = surface.bodies();
    assert_eq!(bodies.len(), 4);
    assert_eq!(bodies[2], second.status);
    assert_eq!(bodies[3], message);
}

#[test]
fn test_seeded_messages_are_reproducible() {
    let run = || {
        let surface = Arc::new(RecordingSurface::default());
        let daemon = daemon(&surface);
        let mut messages = Vec::new();
        for step in 0..6 {
            let outcome = daemon.on_position_fix(east(step as f64 * 600.0));
            messages.extend(outcome.message);
        }
        messages
    };

    let first = run();
    assert_eq!(first.len(), 5);
    assert_eq!(first, run());
}

#[test]
fn test_custom_thresholds() {
    let surface = Arc::new(RecordingSurface::default());
    let mut settings = MovementSettings::default();
    settings.mood.calm_max_m = 1.0;
    settings.notify_every_m = 20.0;
    let daemon = MovementDaemon::new("kit", settings, surface.clone());

    daemon.on_position_fix(east(0.0));
    let outcome = daemon.on_position_fix(east(25.0));

    assert_eq!(outcome.step.snapshot.mood, Mood::Content);
    assert!(outcome.message.is_some());
}

#[test]
fn test_worker_consumes_channel_in_order() {
    let surface = Arc::new(RecordingSurface::default());
    let journal = Arc::new(JourneyLog::new());
    let mut daemon = daemon(&surface).with_journal(journal.clone());

    let (sender, receiver) = bounded(16);
    daemon.start(receiver.clone()).unwrap();
    assert!(daemon.is_running());
    assert!(daemon.start(receiver).is_err());

    for position in [0.0, 100.0, 250.0, 600.0] {
        sender.send(east(position)).unwrap();
    }

    let snapshot = daemon.stop();
    assert!(!daemon.is_running());
    assert_eq!(snapshot.fixes_seen, 4);
    assert!((snapshot.total_distance_m - 600.0).abs() < 1e-6);

    let channels = surface.channels.lock().unwrap().clone();
    assert_eq!(channels, vec![ChannelSpec::daemon()]);

    let bodies = surface.bodies();
    assert_eq!(bodies[0], "mira active");
    // Start notice, four refreshes and one message at 600 m.
    assert_eq!(bodies.len(), 6);

    let stats = journal.stats();
    assert_eq!(stats.fixes_processed, 4);
    assert_eq!(stats.messages_emitted, 1);
    assert!((stats.lifetime_distance_m() - 600.0).abs() < 0.01);
}

#[test]
fn test_unavailable_source_leaves_daemon_idle() {
    let surface = Arc::new(RecordingSurface::default());
    let mut daemon = daemon(&surface);

    let mut source = NoopSource::new("permission denied");
    source.start().unwrap();
    daemon.start(source.receiver().clone()).unwrap();

    std::thread::sleep(Duration::from_millis(250));
    let snapshot = daemon.stop();
    source.stop();

    assert_eq!(snapshot.fixes_seen, 0);
    assert_eq!(snapshot.total_distance_m, 0.0);
    assert_eq!(snapshot.mood, Mood::Calm);
    assert_eq!(surface.bodies(), vec!["mira active".to_string()]);
}

#[test]
fn test_disconnected_source_keeps_state() {
    let surface = Arc::new(RecordingSurface::default());
    let mut daemon = daemon(&surface);

    let (sender, receiver) = bounded(4);
    daemon.start(receiver).unwrap();
    sender.send(east(0.0)).unwrap();
    sender.send(east(30.0)).unwrap();
    drop(sender);

    std::thread::sleep(Duration::from_millis(250));
    assert!(daemon.is_running());

    let snapshot = daemon.stop();
    assert_eq!(snapshot.fixes_seen, 2);
    assert_eq!(snapshot.mood, Mood::Content);
}

#[test]
fn test_restart_begins_a_fresh_session() {
    let surface = Arc::new(RecordingSurface::default());
    let mut daemon = daemon(&surface);

    let (sender, receiver) = bounded(4);
    daemon.start(receiver).unwrap();
    sender.send(east(0.0)).unwrap();
    sender.send(east(400.0)).unwrap();
    let first = daemon.stop();
    assert!((first.total_distance_m - 400.0).abs() < 1e-6);

    let (sender, receiver) = bounded(4);
    daemon.start(receiver).unwrap();
    let idle = daemon.snapshot();
    assert_eq!(idle.total_distance_m, 0.0);
    assert_eq!(idle.distance_since_last_notify_m, 0.0);
    assert_eq!(idle.last_fix, None);
    assert_eq!(idle.fixes_seen, 0);

    // Far from the old position, yet only a baseline for the new session.
    sender.send(east(5_000.0)).unwrap();
    sender.send(east(5_003.0)).unwrap();
    let second = daemon.stop();
    assert!((second.total_distance_m - 3.0).abs() < 1e-6);
    assert_eq!(second.mood, Mood::Calm);
    assert_eq!(second.fixes_seen, 2);
}
