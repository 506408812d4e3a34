//! Observable run-state store.
//!
//! Single writer (the orchestrator), any number of observers. Every
//! mutation publishes a whole-record snapshot over a watch channel; the
//! UI re-renders from snapshots and never holds the lock.

use tokio::sync::{watch, RwLock};

use deskbot_core::{LogLevel, RunState};

pub struct StateStore {
    inner: RwLock<RunState>,
    tx: watch::Sender<RunState>,
}

impl StateStore {
    pub fn new() -> Self {
        let state = RunState::default();
        let (tx, _rx) = watch::channel(state.clone());
        Self {
            inner: RwLock::new(state),
            tx,
        }
    }

    pub async fn snapshot(&self) -> RunState {
        self.inner.read().await.clone()
    }

    /// New receivers see the current state immediately.
    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.tx.subscribe()
    }

    /// Mutate under the write lock and publish the result. Observers may
    /// lag; they always converge on the latest snapshot.
    pub async fn update<F: FnOnce(&mut RunState)>(&self, f: F) {
        let mut state = self.inner.write().await;
        f(&mut state);
        let _ = self.tx.send(state.clone());
    }

    /// Replace the record wholesale (run start).
    pub async fn replace(&self, state: RunState) {
        let mut guard = self.inner.write().await;
        *guard = state;
        let _ = self.tx.send(guard.clone());
    }

    pub async fn append_log(&self, level: LogLevel, msg: impl Into<String>) {
        let msg = msg.into();
        self.update(|state| state.push_log(level, msg)).await;
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deskbot_core::RunStatus;

    #[tokio::test]
    async fn updates_reach_subscribers() {
        let store = StateStore::new();
        let mut rx = store.subscribe();
        assert_eq!(rx.borrow().status, RunStatus::Idle);

        store.replace(RunState::running()).await;
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().status, RunStatus::Running);

        store.append_log(LogLevel::Info, "hello").await;
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().log[0].msg, "hello");
    }

    #[tokio::test]
    async fn replace_clears_previous_run() {
        let store = StateStore::new();
        store
            .update(|s| {
                s.current = 3;
                s.total = 5;
                s.push_log(LogLevel::Info, "old");
            })
            .await;
        store.replace(RunState::running()).await;
        let state = store.snapshot().await;
        assert_eq!(state.current, 0);
        assert!(state.log.is_empty());
    }
}
