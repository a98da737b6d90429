//! Diagnostics Bridge
//!
//! Rejected input and backend failures are reported through the `log` facade
//! and also recorded here so the host can read them back as a text snapshot.
//! Each renderer keeps a log scoped to its current scene; the context keeps a
//! log spanning every scene until the host clears it.

use std::fmt;

use log::Level;

/// One recorded message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticEntry {
    /// Severity
    pub level: Level,
    /// Human-readable text
    pub message: String,
}

impl fmt::Display for DiagnosticEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.level, self.message)
    }
}

/// Ordered collection of warnings and errors
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    entries: Vec<DiagnosticEntry>,
}

impl Diagnostics {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Record and log a warning
    pub fn warn(&mut self, message: impl Into<String>) {
        self.record(Level::Warn, message.into());
    }

    /// Record and log an error
    pub fn error(&mut self, message: impl Into<String>) {
        self.record(Level::Error, message.into());
    }

    fn record(&mut self, level: Level, message: String) {
        log::log!(level, "{}", message);
        self.entries.push(DiagnosticEntry { level, message });
    }

    /// Append an entry that was already logged elsewhere
    pub fn push(&mut self, entry: DiagnosticEntry) {
        self.entries.push(entry);
    }

    /// Recorded entries in order
    pub fn entries(&self) -> &[DiagnosticEntry] {
        &self.entries
    }

    /// Whether anything was recorded
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether any error (not just warnings) was recorded
    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(|entry| entry.level == Level::Error)
    }

    /// Forget every entry
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// All entries as newline-terminated lines
    pub fn to_log_string(&self) -> String {
        self.entries.iter().map(|entry| format!("{entry}\n")).collect()
    }
}
