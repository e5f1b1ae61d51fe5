// ABOUTME: Messages a build unit sends back to its caller
// ABOUTME: Any number of log events, then exactly one terminal Ready or Error; secret values are masked

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BuildEvent {
    /// Progress output with no control meaning
    Log { level: LogLevel, message: String },
    /// The bridge answered the handshake on this port
    Ready { port: u16 },
    /// The build attempt failed
    Error { message: String },
}

impl BuildEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, BuildEvent::Log { .. })
    }
}

/// Sending half of a build's event channel
///
/// Only the first terminal event is delivered; later ones are dropped.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<BuildEvent>,
    finished: Arc<AtomicBool>,
    redactions: Arc<Vec<String>>,
}

/// Replacement for a masked secret value
pub const REDACTED: &str = "[redacted]";

pub fn channel() -> (EventSink, mpsc::UnboundedReceiver<BuildEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        EventSink {
            tx,
            finished: Arc::new(AtomicBool::new(false)),
            redactions: Arc::new(Vec::new()),
        },
        rx,
    )
}

impl EventSink {
    /// Mask these values in every message sent from now on
    pub fn with_redactions(mut self, values: impl IntoIterator<Item = String>) -> Self {
        let mut values: Vec<String> = values.into_iter().filter(|v| !v.is_empty()).collect();
        // Longest first so a value containing another is masked whole
        values.sort_by(|a, b| b.len().cmp(&a.len()));
        values.dedup();
        self.redactions = Arc::new(values);
        self
    }

    pub fn scrub(&self, text: &str) -> String {
        self.redactions
            .iter()
            .fold(text.to_string(), |acc, value| acc.replace(value.as_str(), REDACTED))
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        let _ = self.tx.send(BuildEvent::Log {
            level,
            message: self.scrub(&message.into()),
        });
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.log(LogLevel::Debug, message);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.log(LogLevel::Warn, message);
    }

    pub fn ready(&self, port: u16) {
        self.finish(BuildEvent::Ready { port });
    }

    pub fn error(&self, message: impl Into<String>) {
        self.finish(BuildEvent::Error {
            message: self.scrub(&message.into()),
        });
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    fn finish(&self, event: BuildEvent) {
        if !self.finished.swap(true, Ordering::SeqCst) {
            let _ = self.tx.send(event);
        }
    }
}
