//! Single-run mutual exclusion.

use std::sync::Mutex;

use crate::run::TabId;

#[derive(Debug, Default)]
enum Slot {
    #[default]
    Free,
    /// A run is in flight; the tab id is bound once the tab exists.
    Held {
        tab: Option<TabId>,
    },
}

/// Process-wide marker holding at most one in-flight run. Set on run
/// start, cleared on terminal events or tab-open failure. A second start
/// while held is rejected, never queued.
#[derive(Debug, Default)]
pub struct RunGuard {
    slot: Mutex<Slot>,
}

impl RunGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the guard for a new run. False when a run is in flight.
    pub fn try_begin(&self) -> bool {
        let mut slot = self.slot.lock().unwrap();
        match *slot {
            Slot::Free => {
                *slot = Slot::Held { tab: None };
                true
            }
            Slot::Held { .. } => false,
        }
    }

    /// Bind the opened tab to the in-flight run.
    pub fn bind_tab(&self, tab: &TabId) {
        let mut slot = self.slot.lock().unwrap();
        if let Slot::Held { tab: bound } = &mut *slot {
            *bound = Some(tab.clone());
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(*self.slot.lock().unwrap(), Slot::Held { .. })
    }

    pub fn active_tab(&self) -> Option<TabId> {
        match &*self.slot.lock().unwrap() {
            Slot::Held { tab } => tab.clone(),
            Slot::Free => None,
        }
    }

    /// Release the guard, returning the tab that was bound, if any.
    pub fn release(&self) -> Option<TabId> {
        let mut slot = self.slot.lock().unwrap();
        match std::mem::take(&mut *slot) {
            Slot::Held { tab } => tab,
            Slot::Free => None,
        }
    }
}
