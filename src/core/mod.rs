//! Core movement logic for the companion agent.
//!
//! This module contains:
//! - Great-circle distance between fixes
//! - Mood classification from inter-fix distance
//! - The throttled message pool
//! - The movement state machine and its daemon

pub mod geo;
pub mod messages;
pub mod mood;
pub mod movement;

pub use geo::distance_m;
pub use messages::{MessagePool, MESSAGE_TEMPLATES};
pub use mood::{Mood, MoodThresholds};
pub use movement::{
    status_line, DaemonError, FixOutcome, FixStep, MovementDaemon, MovementSettings,
    MovementSnapshot, MovementState,
};
