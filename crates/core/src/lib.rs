pub mod config;
pub mod error;
pub mod event;
pub mod paths;
pub mod state;

pub use config::{AutoRunConfig, BrowserConfig, Config, NotifyConfig};
pub use error::{Error, Result};
pub use event::{AgentCommand, PageEvent};
pub use paths::Paths;
pub use state::{BookingRecord, LogEntry, LogLevel, RunState, RunStatus};
