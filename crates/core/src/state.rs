//! Shared run-state record: the single observable blob the orchestrator
//! mutates and the UI reads.

use serde::{Deserialize, Serialize};

/// Lifecycle of the current or most recent booking run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    #[default]
    Idle,
    Running,
    Done,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Warn,
    Error,
}

/// One line in the user-facing run log. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Wall-clock time of day, "HH:MM:SS" local.
    pub time: String,
    pub level: LogLevel,
    pub msg: String,
}

impl LogEntry {
    pub fn now(level: LogLevel, msg: impl Into<String>) -> Self {
        Self {
            time: chrono::Local::now().format("%H:%M:%S").to_string(),
            level,
            msg: msg.into(),
        }
    }
}

/// Produced once per successfully clicked booking control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRecord {
    /// Short descriptive label, or a fallback ordinal like "Booking 2".
    pub date: String,
    /// Best-effort extracted desk identifier, or the literal "Booked".
    pub desk: String,
}

/// The shared run record. One instance at a time, session scoped,
/// replaced wholesale on each run start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RunState {
    pub status: RunStatus,
    pub current: u32,
    pub total: u32,
    pub log: Vec<LogEntry>,
    pub bookings: Vec<BookingRecord>,
}

impl RunState {
    /// Fresh record for a run that is starting: running status, everything
    /// else cleared.
    pub fn running() -> Self {
        Self {
            status: RunStatus::Running,
            ..Self::default()
        }
    }

    pub fn push_log(&mut self, level: LogLevel, msg: impl Into<String>) {
        self.log.push(LogEntry::now(level, msg));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_record_is_clean() {
        let state = RunState::running();
        assert_eq!(state.status, RunStatus::Running);
        assert_eq!(state.current, 0);
        assert_eq!(state.total, 0);
        assert!(state.log.is_empty());
        assert!(state.bookings.is_empty());
    }

    #[test]
    fn log_appends_in_order() {
        let mut state = RunState::default();
        state.push_log(LogLevel::Info, "first");
        state.push_log(LogLevel::Warn, "second");
        assert_eq!(state.log.len(), 2);
        assert_eq!(state.log[0].msg, "first");
        assert_eq!(state.log[1].level, LogLevel::Warn);
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&RunStatus::Running).unwrap(),
            "\"running\""
        );
        assert_eq!(
            serde_json::to_string(&LogLevel::Success).unwrap(),
            "\"success\""
        );
    }
}
