//! Newline-delimited JSON fix source.
//!
//! Each line is one fix, e.g. `{"lat": 48.85, "lon": 2.35, "accuracy": 6.0}`.
//! This is how recorded tracks are replayed and how an external location
//! bridge feeds a live stream through stdin.

use crate::source::types::PositionFix;
use crate::source::SourceError;
use crossbeam_channel::{bounded, Receiver, Sender};
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

const CHANNEL_CAPACITY: usize = 1024;

/// Where fixes are read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FixInput {
    Stdin,
    File(PathBuf),
}

impl FixInput {
    /// Interpret a CLI argument, where `-` means stdin.
    pub fn from_arg(arg: &str) -> Self {
        if arg == "-" {
            FixInput::Stdin
        } else {
            FixInput::File(PathBuf::from(arg))
        }
    }
}

/// Reads fixes on a background thread into a bounded channel.
pub struct JsonLinesSource {
    input: FixInput,
    sender: Sender<PositionFix>,
    receiver: Receiver<PositionFix>,
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
}

impl JsonLinesSource {
    pub fn new(input: FixInput) -> Self {
        let (sender, receiver) = bounded(CHANNEL_CAPACITY);
        Self {
            input,
            sender,
            receiver,
            running: Arc::new(AtomicBool::new(false)),
            thread_handle: None,
        }
    }

    /// Open the input and start reading in a background thread.
    ///
    /// The source stops on its own at end of input.
    pub fn start(&mut self) -> Result<(), SourceError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(SourceError::AlreadyRunning);
        }

        let reader: Box<dyn Read + Send> = match &self.input {
            FixInput::Stdin => Box::new(std::io::stdin()),
            FixInput::File(path) => Box::new(File::open(path)?),
        };

        self.running.store(true, Ordering::SeqCst);

        let sender = self.sender.clone();
        let running = self.running.clone();
        let handle = thread::spawn(move || {
            read_fixes(BufReader::new(reader), &sender, &running);
            running.store(false, Ordering::SeqCst);
            tracing::debug!("fix input exhausted");
        });

        self.thread_handle = Some(handle);
        Ok(())
    }

    /// Stop reading.
    ///
    /// A reader blocked on stdin is detached rather than joined.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            if handle.is_finished() {
                let _ = handle.join();
            }
        }
    }

    /// Check if the reader is still producing fixes.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn receiver(&self) -> &Receiver<PositionFix> {
        &self.receiver
    }
}

impl Drop for JsonLinesSource {
    fn drop(&mut self) {
        self.stop();
    }
}

fn read_fixes<R: BufRead>(reader: R, sender: &Sender<PositionFix>, running: &AtomicBool) {
    for (index, line) in reader.lines().enumerate() {
        if !running.load(Ordering::SeqCst) {
            break;
        }

        let line = match line {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "fix input read failed");
                break;
            }
        };

        match parse_line(&line) {
            Ok(Some(fix)) => {
                if sender.send(fix).is_err() {
                    break;
                }
            }
            Ok(None) => {}
            Err(reason) => {
                tracing::warn!(line = index + 1, %reason, "skipping malformed fix");
            }
        }
    }
}

/// Parse one input line. Blank lines and `#` comments yield `None`.
pub fn parse_line(line: &str) -> Result<Option<PositionFix>, String> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }

    let fix: PositionFix = serde_json::from_str(trimmed).map_err(|e| e.to_string())?;
    fix.validate().map_err(|e| e.to_string())?;
    Ok(Some(fix))
}
