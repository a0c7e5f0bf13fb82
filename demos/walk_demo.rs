//! Demonstration of the movement daemon on a simulated walk.
//!
//! This example shows how to:
//! 1. Create a movement daemon with a notification surface
//! 2. Feed it position fixes through a channel
//! 3. Watch mood and throttled messages change with the pace
//!
//! Run with: cargo run --example walk_demo

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use companion_agent::{
    core::{geo::EARTH_RADIUS_M, status_line, MessagePool, MovementDaemon, MovementSettings},
    journal::JourneyLog,
    notify::ConsoleSurface,
    PositionFix, PRINCIPLES,
};

/// Meters moved between consecutive fixes: standing, strolling, running,
/// then standing again.
const LEGS: &[(f64, usize)] = &[(2.0, 4), (25.0, 12), (80.0, 10), (3.0, 4)];

fn main() {
    println!("Companion Agent - Walk Demo");
    println!("===========================");
    println!("{PRINCIPLES}");

    let journal = Arc::new(JourneyLog::new());
    let mut daemon = MovementDaemon::new(
        "daemon",
        MovementSettings::default(),
        Arc::new(ConsoleSurface::new()),
    )
    .with_messages(MessagePool::seeded(2024))
    .with_journal(journal.clone());

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl+C handler");

    let (sender, receiver) = crossbeam_channel::bounded(16);
    daemon.start(receiver).expect("daemon starts once");

    // Walk east along a parallel near Paris.
    let latitude: f64 = 48.8566;
    let meters_per_degree = EARTH_RADIUS_M * latitude.to_radians().cos() * 1.0_f64.to_radians();
    let mut longitude = 2.3522;

    sender
        .send(PositionFix::new(latitude, longitude).unwrap())
        .unwrap();

    'walk: for &(step_m, count) in LEGS {
        for _ in 0..count {
            if !running.load(Ordering::SeqCst) {
                break 'walk;
            }
            thread::sleep(Duration::from_millis(150));
            longitude += step_m / meters_per_degree;
            sender
                .send(PositionFix::new(latitude, longitude).unwrap().with_accuracy(5.0))
                .unwrap();
        }
    }

    println!();
    println!("Stopping...");
    let snapshot = daemon.stop();

    println!();
    println!("Final: {}", status_line("daemon", &snapshot));
    println!();
    println!("{}", journal.summary());
}
