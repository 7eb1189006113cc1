//! Run log: the ordered record of what each department did during a run.
//!
//! Entries are immutable once appended. The order of `append` calls is the
//! display order; timestamps are informational only.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single entry in the run log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Unique identifier for this entry
    pub id: Uuid,

    /// When the entry was recorded
    pub timestamp: DateTime<Utc>,

    /// Which participant produced the entry
    pub source: LogSource,

    /// Severity, used for rendering and diagnostics
    pub severity: Severity,

    /// Short headline
    pub message: String,

    /// Optional longer text (prompt previews, error messages)
    pub details: Option<String>,
}

impl LogEntry {
    /// Create an informational entry with the current timestamp
    pub fn new(source: LogSource, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source,
            severity: Severity::Info,
            message: message.into(),
            details: None,
        }
    }

    /// Attach details to the entry
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Mark the entry as a non-fatal warning
    pub fn warning(mut self) -> Self {
        self.severity = Severity::Warning;
        self
    }

    /// Mark the entry as an error
    pub fn error(mut self) -> Self {
        self.severity = Severity::Error;
        self
    }
}

/// Participant that produced a log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogSource {
    /// The person submitting the brief
    User,

    /// Planning stage (and top-level run events)
    Planner,

    /// Image synthesis stage
    ImageDept,

    /// Video synthesis stage and playback fetch
    VideoDept,
}

impl fmt::Display for LogSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::User => "USER",
            Self::Planner => "PLANNER",
            Self::ImageDept => "IMAGE_DEPT",
            Self::VideoDept => "VIDEO_DEPT",
        };
        f.write_str(label)
    }
}

/// Severity of a log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    Info,
    Warning,
    Error,
}

/// Append-only, ordered sequence of log entries scoped to one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunLog {
    entries: Vec<LogEntry>,
}

impl RunLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry. Always succeeds.
    pub fn append(&mut self, entry: LogEntry) -> &LogEntry {
        self.entries.push(entry);
        &self.entries[self.entries.len() - 1]
    }

    /// All entries in append order
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Entries appended after the first `seen` entries
    pub fn since(&self, seen: usize) -> &[LogEntry] {
        self.entries.get(seen..).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn last(&self) -> Option<&LogEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries produced by one source
    pub fn from_source(&self, source: LogSource) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter().filter(move |e| e.source == source)
    }

    // Only a newly accepted run may clear the log.
    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Truncate `text` to at most `max_chars` characters, appending "..." when cut.
pub fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
