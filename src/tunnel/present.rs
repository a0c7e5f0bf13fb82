//! Handoff from the tunnel to whatever displays the remote interface.

use std::io;
use std::process::{Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};

/// URL the renderer loads once the tunnel is up.
pub fn renderer_url(local_port: u16) -> String {
    format!("http://127.0.0.1:{local_port}/")
}

/// Receives tunnel lifecycle callbacks on the thread that owns it.
pub trait Presenter {
    /// A connection attempt started (1-based).
    fn connecting(&mut self, _attempt: u32) {}

    /// The tunnel is ready; show `url`.
    fn attach(&mut self, url: &str);

    /// The last attempt failed. The user may retry with the same config.
    fn failed(&mut self, reason: &str);

    /// A ready tunnel went away.
    fn detach(&mut self, _reason: &str) {}
}

/// Presents the remote interface in the system browser.
///
/// The browser provides script and local storage support.
#[derive(Debug, Default)]
pub struct BrowserPresenter {
    open_browser: bool,
    attached: Option<String>,
}

impl BrowserPresenter {
    pub fn new(open_browser: bool) -> Self {
        Self {
            open_browser,
            attached: None,
        }
    }

    /// URL currently shown, if any.
    pub fn attached_url(&self) -> Option<&str> {
        self.attached.as_deref()
    }
}

impl Presenter for BrowserPresenter {
    fn connecting(&mut self, attempt: u32) {
        if attempt == 1 {
            println!("·  ˚  ✦  ·  ˚");
            println!();
            println!("connecting...");
        } else {
            println!("connecting... (attempt {attempt})");
        }
    }

    fn attach(&mut self, url: &str) {
        println!("tunnel ready: {url}");
        if self.open_browser {
            if let Err(e) = open_url(url) {
                eprintln!("Warning: could not open browser: {e}");
            }
        }
        self.attached = Some(url.to_string());
    }

    fn failed(&mut self, reason: &str) {
        self.attached = None;
        eprintln!("error: {reason}");
        eprintln!();
        eprintln!("Run `companion connect` to try again.");
    }

    fn detach(&mut self, reason: &str) {
        self.attached = None;
        eprintln!("tunnel closed: {reason}");
    }
}

/// Open `url` with the platform's default handler.
pub fn open_url(url: &str) -> io::Result<()> {
    #[cfg(target_os = "macos")]
    let mut command = {
        let mut c = Command::new("open");
        c.arg(url);
        c
    };

    #[cfg(target_os = "windows")]
    let mut command = {
        let mut c = Command::new("cmd");
        c.args(["/C", "start", "", url]);
        c
    };

    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    let mut command = {
        let mut c = Command::new("xdg-open");
        c.arg(url);
        c
    };

    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    spawn_reaped(command).map(|_| ())
}

/// Spawn `command` and wait for it on a detached thread, so a short-lived
/// opener never lingers as a zombie.
fn spawn_reaped(mut command: Command) -> io::Result<JoinHandle<io::Result<ExitStatus>>> {
    let mut child = command.spawn()?;
    Ok(thread::spawn(move || child.wait()))
}
