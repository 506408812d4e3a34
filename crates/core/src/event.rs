//! Wire contract between the page agent and the orchestrator.
//!
//! Events flow one way (agent -> orchestrator) over an mpsc channel with
//! at-most-once, best-effort delivery: the emitting side never treats a
//! failed send as fatal.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::state::{BookingRecord, LogLevel};

/// Event emitted by the page agent during a booking run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PageEvent {
    #[serde(rename = "LOG")]
    Log { level: LogLevel, msg: String },

    #[serde(rename = "BOOKING_PROGRESS")]
    Progress { current: u32, total: u32 },

    #[serde(rename = "BOOKING_DONE")]
    Done {
        total: u32,
        bookings: Vec<BookingRecord>,
    },

    /// Soft zero-result outcome: nothing matched, or the day filter
    /// removed everything. Not an error.
    #[serde(rename = "BOOKING_NONE")]
    NoneFound { message: String },

    #[serde(rename = "BOOKING_ERROR")]
    Failed { message: String },
}

impl PageEvent {
    /// Done, none and error end a run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PageEvent::Done { .. } | PageEvent::NoneFound { .. } | PageEvent::Failed { .. }
        )
    }
}

/// Inbound command for the page agent task.
#[derive(Debug)]
pub enum AgentCommand {
    /// Start the booking run. Receipt is acknowledged over `ack` before
    /// the run begins; the run itself proceeds asynchronously.
    Start {
        selected_days: HashSet<u8>,
        ack: oneshot::Sender<()>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_carry_wire_names() {
        let ev = PageEvent::Progress {
            current: 2,
            total: 5,
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "BOOKING_PROGRESS");
        assert_eq!(json["current"], 2);

        let ev = PageEvent::NoneFound {
            message: "nothing".into(),
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "BOOKING_NONE");
    }

    #[test]
    fn terminal_events() {
        assert!(PageEvent::Done {
            total: 0,
            bookings: vec![]
        }
        .is_terminal());
        assert!(PageEvent::Failed {
            message: String::new()
        }
        .is_terminal());
        assert!(!PageEvent::Progress {
            current: 1,
            total: 2
        }
        .is_terminal());
    }

    #[test]
    fn done_round_trips() {
        let ev = PageEvent::Done {
            total: 1,
            bookings: vec![crate::state::BookingRecord {
                date: "Mon, Mar 3".into(),
                desk: "Desk 12".into(),
            }],
        };
        let json = serde_json::to_string(&ev).unwrap();
        let back: PageEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ev);
    }
}
