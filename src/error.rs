//! Error types shared across the companion agent.

use std::time::Duration;

/// Tunnel failures. All of them are recoverable by calling `connect` again.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TunnelError {
    /// The configuration cannot describe a tunnel (e.g. empty host).
    #[error("invalid tunnel config: {0}")]
    InvalidConfig(String),

    /// The forwarding process could not be started.
    #[error("could not start forwarding process: {0}")]
    SpawnFailure(String),

    /// The forwarding process exited before or after becoming ready.
    #[error("forwarding process exited ({status}){}", format_stderr(.stderr))]
    ProcessExited { status: String, stderr: String },

    /// Something else already listens on the local port.
    #[error("local port {port} is already in use: {reason}")]
    LocalPortInUse { port: u16, reason: String },

    /// The forwarded port never accepted a connection.
    #[error("forwarded port not ready after {}s", whole_secs(.waited))]
    NotReady { waited: Duration },

    /// A teardown or a newer connect replaced this attempt.
    #[error("superseded by a newer session")]
    Superseded,
}

fn whole_secs(duration: &Duration) -> u64 {
    duration.as_secs()
}

fn format_stderr(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(": {trimmed}")
    }
}

/// Configuration store errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Serialize error: {0}")]
    Serialize(String),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}
