//! Tunnel lifecycle management.
//!
//! Establishes an SSH local forward to the home host, supervises the client
//! process, and hands the local URL to a presenter once forwarding works.

pub mod command;
pub mod present;
pub mod process;
pub mod retry;
pub mod supervisor;

pub use present::{renderer_url, BrowserPresenter, Presenter};
pub use process::ForwardingProcess;
pub use retry::RetryPolicy;
pub use supervisor::{Readiness, SupervisorSettings, TunnelEvent, TunnelState, TunnelSupervisor};
