//! Cross-session journey statistics.
//!
//! Movement state itself is session-scoped; the journal is the only thing
//! that survives a restart, and it only holds aggregate counters.

pub mod log;

pub use log::{JourneyLog, JourneyStats, SharedJourneyLog};
