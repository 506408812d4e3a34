//! Page agent: booking interactions inside the target page.
//!
//! The page is abstracted as a [`driver::PageDriver`] capability; all
//! string/pattern matching lives in [`heuristics`] as pure functions.

pub mod agent;
pub mod driver;
pub mod heuristics;
pub mod wait;

pub use agent::{spawn_agent, BookingAgent, Pacing};
pub use driver::{Control, Dialog, DialogButton, PageDriver};
