//! Position fix sources for the companion agent.
//!
//! A source pushes fixes into a bounded channel at whatever cadence the
//! provider chooses (typically ~10 s / ~10 m). A source may go quiet at any
//! time without signalling anything; consumers treat that as idle, not as an
//! error.

pub mod jsonl;
pub mod noop;
pub mod types;

pub use jsonl::{FixInput, JsonLinesSource};
pub use noop::NoopSource;
pub use types::{FixError, PositionFix};

/// Errors raised by fix sources.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("location unavailable: {0}")]
    PermissionUnavailable(String),
    #[error("source is already running")]
    AlreadyRunning,
    #[error("could not open fix input: {0}")]
    Io(#[from] std::io::Error),
}
