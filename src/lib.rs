//! Companion Agent - a background companion that walks with you.
//!
//! Two independent parts share only the configuration store and the
//! notification surface:
//!
//! - **Movement daemon**: turns position fixes into a session distance, a
//!   coarse mood and a throttled trickle of messages.
//! - **Tunnel supervisor**: keeps an SSH local forward to the home host and
//!   hands its web interface to a presenter once it is reachable.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       Companion Agent                        │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌──────────────┐        │
//! │  │ Fix Source  │──▶│  Movement   │──▶│ Notification │        │
//! │  │ (jsonl/noop)│   │   Daemon    │   │   Surface    │        │
//! │  └─────────────┘   └─────────────┘   └──────────────┘        │
//! │                           │                                  │
//! │                           ▼                                  │
//! │                    ┌─────────────┐                           │
//! │                    │ Journey Log │                           │
//! │                    └─────────────┘                           │
//! │                                                              │
//! │  ┌─────────────┐   ┌─────────────┐   ┌──────────────┐        │
//! │  │   Config    │──▶│   Tunnel    │──▶│  Presenter   │        │
//! │  │   Store     │   │ Supervisor  │   │  (browser)   │        │
//! │  └─────────────┘   └─────────────┘   └──────────────┘        │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use companion_agent::{core::{MovementDaemon, MovementSettings}, notify::ConsoleSurface, PositionFix};
//!
//! let daemon = MovementDaemon::new("daemon", MovementSettings::default(), Arc::new(ConsoleSurface::new()));
//! daemon.on_position_fix(PositionFix::new(48.8566, 2.3522).unwrap());
//! daemon.on_position_fix(PositionFix::new(48.8570, 2.3530).unwrap());
//! println!("{:?}", daemon.snapshot().mood);
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod journal;
pub mod notify;
pub mod source;
pub mod tunnel;

// Re-export key types at crate root for convenience
pub use config::{Config, ConfigStore, TunnelConfig};
pub use core::{Mood, MovementDaemon, MovementSettings, MovementSnapshot, MovementState};
pub use error::{ConfigError, TunnelError};
pub use journal::{JourneyLog, JourneyStats, SharedJourneyLog};
pub use notify::{Notification, NotificationSurface};
pub use source::{PositionFix, SourceError};
pub use tunnel::{TunnelEvent, TunnelState, TunnelSupervisor};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// What the companion does and does not keep, shown by `companion about`.
pub const PRINCIPLES: &str = r#"
·  ˚  ✦  ·  ˚

  everything stays local:
    • position fixes are used to measure distance, then forgotten
    • only aggregate counters are written to disk (journey log)
    • the tunnel goes to your own host, nobody else's

  nothing is exported:
    • no coordinates are stored or sent anywhere
    • no health or fitness data is produced
"#;
