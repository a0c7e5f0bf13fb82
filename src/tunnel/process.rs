//! Scoped ownership of the forwarding process.

use std::process::ExitStatus;
use std::time::Duration;
use tokio::process::Child;

/// Owns the forwarding child process and terminates it exactly once.
///
/// Termination happens on `terminate()`, `shutdown()` or drop, whichever
/// comes first; later calls are no-ops.
#[derive(Debug)]
pub struct ForwardingProcess {
    child: Option<Child>,
    pid: Option<u32>,
    killed: bool,
}

impl ForwardingProcess {
    pub fn new(child: Child) -> Self {
        let pid = child.id();
        Self {
            child: Some(child),
            pid,
            killed: false,
        }
    }

    /// OS process id captured at spawn.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Check whether the process has exited, without blocking.
    ///
    /// Returns `Ok(None)` while it is still running. Once an exit has been
    /// observed the handle is released, the process counts as terminated and
    /// later calls return `Ok(None)`.
    pub fn try_exit(&mut self) -> std::io::Result<Option<ExitStatus>> {
        let Some(child) = self.child.as_mut() else {
            return Ok(None);
        };
        let status = child.try_wait()?;
        if status.is_some() {
            self.child = None;
        }
        Ok(status)
    }

    /// Send the kill signal but keep the handle, so `shutdown` can still
    /// wait for the exit. Returns whether a signal was sent.
    pub fn kill(&mut self) -> bool {
        if self.killed {
            return false;
        }
        let Some(child) = self.child.as_mut() else {
            return false;
        };
        if let Ok(Some(_)) = child.try_wait() {
            return false;
        }

        match child.start_kill() {
            Ok(()) => {
                self.killed = true;
                tracing::debug!(pid = ?self.pid, "forwarding process killed");
                true
            }
            Err(e) => {
                tracing::debug!(pid = ?self.pid, error = %e, "kill failed, process likely gone");
                false
            }
        }
    }

    /// Kill the process if it is still owned and release the handle.
    /// Returns whether a kill was sent.
    pub fn terminate(&mut self) -> bool {
        let killed = self.kill();
        self.child = None;
        killed
    }

    /// Kill the process and wait up to `timeout` for it to exit.
    ///
    /// Returns whether the exit was observed. Once this returns `true` the
    /// process no longer holds any of its ports.
    pub async fn shutdown(mut self, timeout: Duration) -> bool {
        self.kill();
        let Some(mut child) = self.child.take() else {
            return true;
        };

        match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                tracing::warn!(
                    pid = ?self.pid,
                    error = %e,
                    "waiting for forwarding process failed"
                );
                false
            }
            Err(_) => {
                tracing::warn!(
                    pid = ?self.pid,
                    ?timeout,
                    "forwarding process did not exit in time"
                );
                false
            }
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.child.is_none()
    }
}

impl Drop for ForwardingProcess {
    fn drop(&mut self) {
        self.terminate();
    }
}
