//! Tunnel supervisor.
//!
//! One session at a time moves through
//! `Idle → Connecting → {Ready | Failed}`, `Failed → Connecting` on retry and
//! `Ready → Idle` on teardown or process exit.
//!
//! Attempts run as tasks on a tokio runtime. Their results come back through
//! a channel that the owning thread drains with [`TunnelSupervisor::pump`],
//! so presenter callbacks always run on that thread. Every event carries the
//! generation of the attempt that produced it; `connect` and `teardown` bump
//! the generation, which is how a late event from a replaced attempt gets
//! discarded.
//!
//! Only one forwarding process holds the local port at a time: a replaced
//! or failed process is awaited until it exits before the next one is
//! spawned, and an attempt refuses to start while anything else listens on
//! the port.

use crate::config::TunnelConfig;
use crate::error::TunnelError;
use crate::tunnel::command;
use crate::tunnel::present::{renderer_url, Presenter};
use crate::tunnel::process::ForwardingProcess;
use crate::tunnel::retry::RetryPolicy;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::process::ChildStderr;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Most stderr kept for a failure reason.
const STDERR_LIMIT: u64 = 4096;

/// How long to wait for an exited process's stderr to drain.
const STDERR_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Liveness poll granularity during a settle delay.
const SETTLE_POLL: Duration = Duration::from_millis(100);

/// How long a replaced or discarded process gets to exit after the kill.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// How the supervisor decides that a spawned process is forwarding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Assume ready once the process survived this long.
    Settle(Duration),
    /// Connect to the local port every `interval` until it accepts or
    /// `timeout` elapses.
    PortOpen { interval: Duration, timeout: Duration },
}

impl Readiness {
    /// The fixed two-second settle delay.
    pub fn settle() -> Self {
        Readiness::Settle(Duration::from_secs(2))
    }
}

impl Default for Readiness {
    fn default() -> Self {
        Readiness::PortOpen {
            interval: Duration::from_millis(250),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Supervisor tuning.
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    /// SSH client executable
    pub program: PathBuf,
    pub readiness: Readiness,
    pub retry: RetryPolicy,
    /// Liveness poll interval once the tunnel is ready
    pub liveness_interval: Duration,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            program: PathBuf::from("ssh"),
            readiness: Readiness::default(),
            retry: RetryPolicy::default(),
            liveness_interval: Duration::from_millis(500),
        }
    }
}

/// State of the current session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TunnelState {
    Idle,
    Connecting,
    Ready,
    Failed(String),
}

/// Lifecycle notifications delivered to the owning thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TunnelEvent {
    Connecting { attempt: u32 },
    Ready { local_port: u16 },
    Failed { reason: String },
    Closed { reason: String },
}

#[derive(Debug)]
struct Envelope {
    generation: u64,
    event: TunnelEvent,
}

#[derive(Debug)]
struct Session {
    state: TunnelState,
    generation: u64,
    process: Option<ForwardingProcess>,
}

/// Shared handle to the session, safe to use from attempt tasks.
#[derive(Debug, Clone)]
struct SessionHandle(Arc<Mutex<Session>>);

impl SessionHandle {
    fn new() -> Self {
        Self(Arc::new(Mutex::new(Session {
            state: TunnelState::Idle,
            generation: 0,
            process: None,
        })))
    }

    fn lock(&self) -> MutexGuard<'_, Session> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_current(&self, generation: u64) -> bool {
        self.lock().generation == generation
    }

    /// Hand the freshly spawned process to the session.
    ///
    /// If the attempt was replaced meanwhile the process is dropped, which
    /// kills it.
    fn install(&self, generation: u64, process: ForwardingProcess) -> Result<(), TunnelError> {
        let mut session = self.lock();
        if session.generation != generation {
            return Err(TunnelError::Superseded);
        }
        if let Some(mut previous) = session.process.replace(process) {
            previous.terminate();
        }
        Ok(())
    }

    /// Check the attempt's process for exit. `Some(status)` means it exited.
    fn poll_exit(&self, generation: u64) -> Result<Option<String>, TunnelError> {
        let mut session = self.lock();
        if session.generation != generation {
            return Err(TunnelError::Superseded);
        }
        let Some(process) = session.process.as_mut() else {
            return Err(TunnelError::Superseded);
        };

        match process.try_exit() {
            Ok(None) => Ok(None),
            Ok(Some(status)) => {
                session.process = None;
                Ok(Some(status.to_string()))
            }
            Err(e) => {
                if let Some(mut process) = session.process.take() {
                    process.terminate();
                }
                Ok(Some(format!("wait failed: {e}")))
            }
        }
    }

    /// Take the attempt's process out of the session, if the attempt is
    /// still current.
    fn take_process(&self, generation: u64) -> Option<ForwardingProcess> {
        let mut session = self.lock();
        if session.generation != generation {
            return None;
        }
        session.process.take()
    }

    /// Move to `state` if the attempt is still current.
    fn transition(&self, generation: u64, state: TunnelState) -> bool {
        let mut session = self.lock();
        if session.generation != generation {
            return false;
        }
        session.state = state;
        true
    }
}

/// Owns the single tunnel session.
pub struct TunnelSupervisor {
    session: SessionHandle,
    runtime: Handle,
    settings: SupervisorSettings,
    events_tx: Sender<Envelope>,
    events_rx: Receiver<Envelope>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl TunnelSupervisor {
    /// Create a supervisor whose attempts run on `runtime`.
    pub fn new(runtime: Handle, settings: SupervisorSettings) -> Self {
        let (events_tx, events_rx) = unbounded();
        Self {
            session: SessionHandle::new(),
            runtime,
            settings,
            events_tx,
            events_rx,
            task: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &SupervisorSettings {
        &self.settings
    }

    pub fn state(&self) -> TunnelState {
        self.session.lock().state.clone()
    }

    /// Whether a forwarding process is currently owned by the session.
    pub fn has_process(&self) -> bool {
        self.session.lock().process.is_some()
    }

    /// Start a session for `config`, replacing any current one.
    ///
    /// Returns immediately; progress is reported through `pump`. An invalid
    /// config is rejected synchronously and leaves the session untouched.
    pub fn connect(&self, config: &TunnelConfig) -> Result<(), TunnelError> {
        config.validate()?;

        let (generation, previous) = {
            let mut session = self.session.lock();
            session.generation += 1;
            session.state = TunnelState::Connecting;
            let previous = session.process.take().map(|mut previous| {
                previous.kill();
                previous
            });
            (session.generation, previous)
        };
        if previous.is_some() {
            tracing::info!("replacing previous forwarding process");
        }

        tracing::info!(
            host = %config.host,
            local_port = config.local_port,
            remote_port = config.remote_port,
            generation,
            "tunnel connecting"
        );

        let handle = self.runtime.spawn(run_session(
            self.session.clone(),
            generation,
            previous,
            config.clone(),
            self.settings.clone(),
            self.events_tx.clone(),
        ));

        if let Some(previous) = self.lock_task().replace(handle) {
            previous.abort();
        }
        Ok(())
    }

    /// Kill the forwarding process, if any, and return to `Idle`.
    ///
    /// Safe from any state and safe to repeat. Wins against an in-flight
    /// `connect`: that attempt can no longer reach `Ready`.
    pub fn teardown(&self) {
        let process = {
            let mut session = self.session.lock();
            session.generation += 1;
            session.state = TunnelState::Idle;
            session.process.take()
        };

        if let Some(task) = self.lock_task().take() {
            task.abort();
        }

        if let Some(mut process) = process {
            process.kill();
            // Reap in the background; dropping the handle instead would
            // leave the exit unobserved.
            self.runtime.spawn(process.shutdown(SHUTDOWN_TIMEOUT));
            tracing::info!("tunnel torn down");
        }
    }

    /// Deliver pending events to `presenter` on the calling thread.
    ///
    /// Events from replaced attempts are dropped. Returns the events that
    /// were delivered.
    pub fn pump(&self, presenter: &mut dyn Presenter) -> Vec<TunnelEvent> {
        let mut delivered = Vec::new();
        while let Ok(envelope) = self.events_rx.try_recv() {
            if let Some(event) = self.accept(envelope) {
                dispatch(&event, presenter);
                delivered.push(event);
            }
        }
        delivered
    }

    /// Wait up to `timeout` for the next current event.
    pub fn next_event(&self, timeout: Duration) -> Option<TunnelEvent> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.events_rx.recv_timeout(remaining) {
                Ok(envelope) => {
                    if let Some(event) = self.accept(envelope) {
                        return Some(event);
                    }
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    return None;
                }
            }
        }
    }

    fn accept(&self, envelope: Envelope) -> Option<TunnelEvent> {
        let current = self.session.lock().generation;
        if envelope.generation != current {
            tracing::debug!(
                generation = envelope.generation,
                current,
                event = ?envelope.event,
                "discarding event from replaced attempt"
            );
            return None;
        }
        Some(envelope.event)
    }

    fn lock_task(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for TunnelSupervisor {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn dispatch(event: &TunnelEvent, presenter: &mut dyn Presenter) {
    match event {
        TunnelEvent::Connecting { attempt } => presenter.connecting(*attempt),
        TunnelEvent::Ready { local_port } => presenter.attach(&renderer_url(*local_port)),
        TunnelEvent::Failed { reason } => presenter.failed(reason),
        TunnelEvent::Closed { reason } => presenter.detach(reason),
    }
}

fn emit(events: &Sender<Envelope>, generation: u64, event: TunnelEvent) {
    // The receiver lives as long as the supervisor; a send error only means
    // it is being dropped.
    let _ = events.send(Envelope { generation, event });
}

async fn run_session(
    session: SessionHandle,
    generation: u64,
    previous: Option<ForwardingProcess>,
    config: TunnelConfig,
    settings: SupervisorSettings,
    events: Sender<Envelope>,
) {
    if let Some(previous) = previous {
        previous.shutdown(SHUTDOWN_TIMEOUT).await;
    }

    let mut attempt = 1;

    loop {
        if !session.is_current(generation) {
            return;
        }
        emit(&events, generation, TunnelEvent::Connecting { attempt });

        match attempt_once(&session, generation, &config, &settings).await {
            Ok(stderr) => {
                if !session.transition(generation, TunnelState::Ready) {
                    return;
                }
                tracing::info!(
                    url = %renderer_url(config.local_port),
                    attempt,
                    "tunnel ready"
                );
                emit(
                    &events,
                    generation,
                    TunnelEvent::Ready {
                        local_port: config.local_port,
                    },
                );

                if let Some(reason) = supervise(&session, generation, &settings, stderr).await {
                    if session.transition(generation, TunnelState::Idle) {
                        tracing::warn!(%reason, "tunnel closed");
                        emit(&events, generation, TunnelEvent::Closed { reason });
                    }
                }
                return;
            }
            Err(TunnelError::Superseded) => return,
            Err(err) => {
                if let Some(process) = session.take_process(generation) {
                    process.shutdown(SHUTDOWN_TIMEOUT).await;
                }

                if !settings.retry.allows_another(attempt) {
                    let reason = err.to_string();
                    if session.transition(generation, TunnelState::Failed(reason.clone())) {
                        tracing::warn!(attempt, %reason, "tunnel failed");
                        emit(&events, generation, TunnelEvent::Failed { reason });
                    }
                    return;
                }

                let delay = settings.retry.backoff_after(attempt);
                tracing::warn!(
                    attempt,
                    error = %err,
                    delay_ms = delay.as_millis() as u64,
                    "tunnel attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Spawn one forwarding process and wait until it is ready.
async fn attempt_once(
    session: &SessionHandle,
    generation: u64,
    config: &TunnelConfig,
    settings: &SupervisorSettings,
) -> Result<Option<ChildStderr>, TunnelError> {
    ensure_port_free(config.local_port).await?;
    tracing::debug!(command = %command::describe(&settings.program, config), "spawning");

    let mut child = command::forwarding_command(&settings.program, config)
        .spawn()
        .map_err(|e| TunnelError::SpawnFailure(format!("{}: {e}", settings.program.display())))?;
    let mut stderr = child.stderr.take();
    session.install(generation, ForwardingProcess::new(child))?;

    match settings.readiness {
        Readiness::Settle(delay) => {
            let deadline = Instant::now() + delay;
            loop {
                if let Some(status) = session.poll_exit(generation)? {
                    return Err(exited(status, stderr.take()).await);
                }
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return Ok(stderr);
                }
                tokio::time::sleep(remaining.min(SETTLE_POLL)).await;
            }
        }
        Readiness::PortOpen { interval, timeout } => {
            let deadline = Instant::now() + timeout;
            loop {
                if let Some(status) = session.poll_exit(generation)? {
                    return Err(exited(status, stderr.take()).await);
                }
                if port_accepts(config.local_port, interval).await {
                    // The process may have died while the connect was in flight.
                    if let Some(status) = session.poll_exit(generation)? {
                        return Err(exited(status, stderr.take()).await);
                    }
                    return Ok(stderr);
                }
                if Instant::now() >= deadline {
                    return Err(TunnelError::NotReady { waited: timeout });
                }
                tokio::time::sleep(interval).await;
            }
        }
    }
}

/// Watch a ready tunnel. Returns the reason if its process exits while the
/// attempt is still current.
async fn supervise(
    session: &SessionHandle,
    generation: u64,
    settings: &SupervisorSettings,
    stderr: Option<ChildStderr>,
) -> Option<String> {
    loop {
        tokio::time::sleep(settings.liveness_interval).await;
        match session.poll_exit(generation) {
            Ok(None) => continue,
            Ok(Some(status)) => return Some(exited(status, stderr).await.to_string()),
            Err(_) => return None,
        }
    }
}

/// Fail if anything already listens on the local port, so readiness can
/// only ever be observed on our own forward.
async fn ensure_port_free(port: u16) -> Result<(), TunnelError> {
    match TcpListener::bind(("127.0.0.1", port)).await {
        Ok(listener) => {
            drop(listener);
            Ok(())
        }
        Err(e) => Err(TunnelError::LocalPortInUse {
            port,
            reason: e.to_string(),
        }),
    }
}

async fn port_accepts(port: u16, timeout: Duration) -> bool {
    matches!(
        tokio::time::timeout(timeout, TcpStream::connect(("127.0.0.1", port))).await,
        Ok(Ok(_))
    )
}

async fn exited(status: String, stderr: Option<ChildStderr>) -> TunnelError {
    TunnelError::ProcessExited {
        status,
        stderr: read_stderr(stderr).await,
    }
}

async fn read_stderr(stderr: Option<ChildStderr>) -> String {
    let Some(stderr) = stderr else {
        return String::new();
    };

    let mut buf = Vec::new();
    let mut limited = stderr.take(STDERR_LIMIT);
    let _ = tokio::time::timeout(STDERR_DRAIN_TIMEOUT, limited.read_to_end(&mut buf)).await;
    String::from_utf8_lossy(&buf).trim().to_string()
}
