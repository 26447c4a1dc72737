// Events the upload pipeline hands to whoever draws the log and progress bar

use chrono::{DateTime, Local};
use std::fmt;
use tokio::sync::mpsc::UnboundedSender;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Muted,
    Accent,
    Success,
    Warning,
    Error,
}

impl Severity {
    /// Colour hint for renderers that support it
    pub fn color_hint(&self) -> &'static str {
        match self {
            Severity::Info => "var(--text-primary)",
            Severity::Muted => "var(--text-muted)",
            Severity::Accent => "var(--accent)",
            Severity::Success => "#4caf50",
            Severity::Warning => "#ffa500",
            Severity::Error => "#ff5555",
        }
    }

    fn log_level(&self) -> log::Level {
        match self {
            Severity::Muted => log::Level::Debug,
            Severity::Info | Severity::Accent | Severity::Success => log::Level::Info,
            Severity::Warning => log::Level::Warn,
            Severity::Error => log::Level::Error,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub message: String,
    pub severity: Severity,
}

impl LogEntry {
    pub fn new(message: impl Into<String>, severity: Severity) -> Self {
        Self {
            timestamp: Local::now(),
            message: message.into(),
            severity,
        }
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.timestamp.format("%H:%M:%S"), self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CycleSummary {
    pub succeeded: usize,
    pub failed: usize,
}

#[derive(Debug, Clone)]
pub enum UploadEvent {
    /// Overall percent, only sent when it changes
    Progress(u8),
    /// Queue drained; the bar goes back to zero
    ProgressReset,
    Log(LogEntry),
    Completed(CycleSummary),
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: UploadEvent);
}

impl EventSink for UnboundedSender<UploadEvent> {
    fn emit(&self, event: UploadEvent) {
        if let Err(e) = self.send(event) {
            log::warn!("Failed to emit upload event (non-critical): {:?}", e.0);
        }
    }
}

/// Emit a log entry and mirror it to the log facade
pub fn emit_log(sink: &dyn EventSink, message: impl Into<String>, severity: Severity) {
    let entry = LogEntry::new(message, severity);
    log::log!(severity.log_level(), "{}", entry.message);
    sink.emit(UploadEvent::Log(entry));
}
