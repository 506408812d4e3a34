//! Booking run orchestration: lifecycle, shared observable state, daily
//! scheduling and terminal notifications.

pub mod guard;
pub mod notify;
pub mod redirect;
pub mod run;
pub mod schedule;
pub mod store;

pub use guard::RunGuard;
pub use notify::{Notifier, Notify};
pub use redirect::{classify_resolved_url, RedirectOutcome};
pub use run::{Orchestrator, TabHost, TabId, Timing};
pub use store::StateStore;
