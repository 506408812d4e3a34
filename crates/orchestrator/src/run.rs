//! Run lifecycle, end to end: tab creation, page validation, agent
//! start, inbound event handling, cleanup and notification.
//!
//! State machine: idle -> running -> {done | error}; back to idle only
//! implicitly when the next run replaces the record. Terminal paths all
//! converge on the same cleanup: close tab, release guard, persist the
//! last-run date, notify.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Local;
use tokio::sync::{mpsc, watch, RwLock};
use tracing::{error, info, warn};

use deskbot_core::{Config, LogLevel, PageEvent, Paths, Result, RunState, RunStatus};

use crate::guard::RunGuard;
use crate::notify::{Notifier, Notify};
use crate::redirect::{classify_resolved_url, RedirectOutcome};
use crate::store::StateStore;

pub type TabId = String;

/// The orchestrator's seam over the browser layer. The real
/// implementation lives in deskbot-browser; tests script it.
#[async_trait]
pub trait TabHost: Send + Sync {
    /// Open the target page in a new, non-focused tab.
    async fn open_tab(&self, url: &str) -> Result<TabId>;

    /// Wait for the tab to reach load-complete, bounded by `timeout`.
    async fn wait_loaded(&self, tab: &TabId, timeout: Duration) -> Result<()>;

    /// The tab's resolved address after load (redirects included).
    async fn resolved_url(&self, tab: &TabId) -> Result<String>;

    /// Best-effort close; the tab may already be gone.
    async fn close_tab(&self, tab: &TabId);

    /// Spawn the page agent in the tab and deliver the start command.
    /// Errors mean the agent could not be reached.
    async fn start_agent(
        &self,
        tab: &TabId,
        selected_days: HashSet<u8>,
        events: mpsc::Sender<PageEvent>,
    ) -> Result<()>;
}

/// Orchestrator-side timeouts and delays.
#[derive(Debug, Clone)]
pub struct Timing {
    pub load_timeout: Duration,
    /// Settle time for client-side rendering after load-complete.
    pub render_settle: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            load_timeout: Duration::from_secs(20),
            render_settle: Duration::from_millis(1500),
        }
    }
}

impl Timing {
    pub fn instant() -> Self {
        Self {
            load_timeout: Duration::from_millis(50),
            render_settle: Duration::ZERO,
        }
    }
}

pub struct Orchestrator {
    store: StateStore,
    guard: RunGuard,
    host: Arc<dyn TabHost>,
    notifier: Arc<dyn Notify>,
    config: RwLock<Config>,
    paths: Paths,
    timing: Timing,
}

impl Orchestrator {
    pub fn new(host: Arc<dyn TabHost>, config: Config, paths: Paths) -> Arc<Self> {
        let notifier = Arc::new(Notifier::from_config(&config.notify));
        Self::with_parts(host, notifier, config, paths, Timing::default())
    }

    pub fn with_parts(
        host: Arc<dyn TabHost>,
        notifier: Arc<dyn Notify>,
        config: Config,
        paths: Paths,
        timing: Timing,
    ) -> Arc<Self> {
        Arc::new(Self {
            store: StateStore::new(),
            guard: RunGuard::new(),
            host,
            notifier,
            config: RwLock::new(config),
            paths,
            timing,
        })
    }

    /// Current state snapshot (the GET_STATE query).
    pub async fn state(&self) -> RunState {
        self.store.snapshot().await
    }

    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.store.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.guard.is_active()
    }

    pub async fn config_snapshot(&self) -> Config {
        self.config.read().await.clone()
    }

    /// Start a booking run. Returns once the run is claimed and spawned;
    /// progress flows through the observable state. A second start while
    /// one is in flight logs a warning and does nothing.
    pub async fn start_run(self: &Arc<Self>, selected_days: HashSet<u8>) {
        if !self.guard.try_begin() {
            // Rejection must not touch the running run's state record.
            warn!("A booking run is already in progress, ignoring start request");
            return;
        }

        self.store.replace(RunState::running()).await;
        let this = self.clone();
        tokio::spawn(async move {
            this.drive_run(selected_days).await;
        });
    }

    async fn drive_run(self: Arc<Self>, selected_days: HashSet<u8>) {
        let url = self.config.read().await.schedule_url.clone();
        info!(%url, "Starting booking run");
        self.store
            .append_log(LogLevel::Info, format!("Opening schedule page {url}"))
            .await;

        let tab = match self.host.open_tab(&url).await {
            Ok(tab) => tab,
            Err(e) => {
                self.fail(None, format!("Failed to open the schedule tab: {e}"))
                    .await;
                return;
            }
        };
        self.guard.bind_tab(&tab);

        if let Err(e) = self.host.wait_loaded(&tab, self.timing.load_timeout).await {
            self.fail(
                Some(&tab),
                format!("Schedule page did not finish loading: {e}"),
            )
            .await;
            return;
        }

        let resolved = match self.host.resolved_url(&tab).await {
            Ok(resolved) => resolved,
            Err(e) => {
                self.fail(Some(&tab), format!("Could not read the tab address: {e}"))
                    .await;
                return;
            }
        };
        match classify_resolved_url(&url, &resolved) {
            RedirectOutcome::Ok => {}
            RedirectOutcome::ForeignHost => {
                self.fail(
                    Some(&tab),
                    format!("Redirected away from the schedule host ({resolved})"),
                )
                .await;
                return;
            }
            RedirectOutcome::Auth => {
                self.fail(
                    Some(&tab),
                    format!("Redirected to login, authentication required ({resolved})"),
                )
                .await;
                return;
            }
        }

        // Let client-side rendering settle before talking to the page.
        tokio::time::sleep(self.timing.render_settle).await;

        let (events_tx, events_rx) = mpsc::channel::<PageEvent>(64);
        if let Err(e) = self
            .host
            .start_agent(&tab, selected_days, events_tx)
            .await
        {
            self.fail(Some(&tab), format!("Could not reach the page agent: {e}"))
                .await;
            return;
        }
        self.store
            .append_log(LogLevel::Info, "Booking agent started")
            .await;

        self.consume_events(tab, events_rx).await;
    }

    /// Apply inbound agent events to the shared state until a terminal
    /// event arrives (or the agent goes away, which only stops the loop;
    /// the fixed timeouts inside the agent are the real backstop).
    async fn consume_events(&self, tab: TabId, mut events: mpsc::Receiver<PageEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                PageEvent::Log { level, msg } => {
                    self.store.append_log(level, msg).await;
                }
                PageEvent::Progress { current, total } => {
                    self.store
                        .update(|s| {
                            s.status = RunStatus::Running;
                            s.current = current;
                            s.total = total;
                            s.push_log(LogLevel::Info, format!("Booked {current} of {total}"));
                        })
                        .await;
                }
                PageEvent::Done { total, bookings } => {
                    self.store
                        .update(|s| {
                            s.status = RunStatus::Done;
                            s.current = total;
                            s.total = total;
                            s.bookings = bookings;
                            s.push_log(
                                LogLevel::Success,
                                format!("Run complete: {total} booked"),
                            );
                        })
                        .await;
                    self.finish(&tab).await;
                    let message = if total == 0 {
                        "No desks were booked".to_string()
                    } else {
                        format!("Booked {total} desk(s)")
                    };
                    self.notifier.send("Desk booking complete", &message).await;
                    return;
                }
                PageEvent::NoneFound { message } => {
                    self.store
                        .update(|s| {
                            s.status = RunStatus::Done;
                            s.current = 0;
                            s.total = 0;
                            s.push_log(LogLevel::Warn, message.clone());
                        })
                        .await;
                    self.finish(&tab).await;
                    self.notifier.send("Desk booking complete", &message).await;
                    return;
                }
                PageEvent::Failed { message } => {
                    error!(%message, "Booking run failed");
                    self.store
                        .update(|s| {
                            s.status = RunStatus::Error;
                            s.push_log(LogLevel::Error, message.clone());
                        })
                        .await;
                    self.finish(&tab).await;
                    self.notifier.send("Desk booking failed", &message).await;
                    return;
                }
            }
        }
        // Agent went away without a terminal event.
        warn!("Page agent channel closed without a terminal event");
        self.store
            .update(|s| {
                s.status = RunStatus::Error;
                s.push_log(LogLevel::Error, "Page agent stopped reporting");
            })
            .await;
        self.finish(&tab).await;
        self.notifier
            .send("Desk booking failed", "Page agent stopped reporting")
            .await;
    }

    /// Orchestrator-side failure before the agent produced a terminal
    /// event: mark error, clean up, notify.
    async fn fail(&self, tab: Option<&TabId>, message: String) {
        error!(%message, "Booking run aborted");
        self.store
            .update(|s| {
                s.status = RunStatus::Error;
                s.push_log(LogLevel::Error, message.clone());
            })
            .await;
        if let Some(tab) = tab {
            self.host.close_tab(tab).await;
        }
        self.guard.release();
        self.persist_last_run_date().await;
        self.notifier.send("Desk booking failed", &message).await;
    }

    async fn finish(&self, tab: &TabId) {
        self.host.close_tab(tab).await;
        self.guard.release();
        self.persist_last_run_date().await;
    }

    async fn persist_last_run_date(&self) {
        let today = Local::now().date_naive().to_string();
        let mut config = self.config.write().await;
        config.last_run_date = Some(today);
        if let Err(e) = config.save(&self.paths) {
            warn!(error = %e, "Failed to persist last run date");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deskbot_core::BookingRecord;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    const SCHEDULE_URL: &str = "https://desks.corp.test/schedule";

    #[derive(Default)]
    struct FakeHost {
        opens: AtomicU32,
        closed: Mutex<Vec<TabId>>,
        resolved: Mutex<Option<String>>,
        fail_open: bool,
        fail_load: bool,
        fail_start: bool,
        /// Captured event sender, so tests can play the agent.
        agent_events: Mutex<Option<mpsc::Sender<PageEvent>>>,
    }

    #[async_trait]
    impl TabHost for FakeHost {
        async fn open_tab(&self, _url: &str) -> Result<TabId> {
            if self.fail_open {
                return Err(deskbot_core::Error::Browser("no browser".into()));
            }
            let n = self.opens.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(format!("tab-{n}"))
        }

        async fn wait_loaded(&self, _tab: &TabId, _timeout: Duration) -> Result<()> {
            if self.fail_load {
                return Err(deskbot_core::Error::Timeout("load timed out".into()));
            }
            Ok(())
        }

        async fn resolved_url(&self, _tab: &TabId) -> Result<String> {
            Ok(self
                .resolved
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(|| SCHEDULE_URL.to_string()))
        }

        async fn close_tab(&self, tab: &TabId) {
            self.closed.lock().unwrap().push(tab.clone());
        }

        async fn start_agent(
            &self,
            _tab: &TabId,
            _selected_days: HashSet<u8>,
            events: mpsc::Sender<PageEvent>,
        ) -> Result<()> {
            if self.fail_start {
                return Err(deskbot_core::Error::Channel("agent not listening".into()));
            }
            *self.agent_events.lock().unwrap() = Some(events);
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl Notify for RecordingNotifier {
        async fn send(&self, title: &str, message: &str) {
            self.sent
                .lock()
                .unwrap()
                .push((title.to_string(), message.to_string()));
        }
    }

    fn test_paths(tag: &str) -> Paths {
        let base = std::env::temp_dir().join(format!(
            "deskbot-test-{tag}-{}-{}",
            std::process::id(),
            chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));
        let paths = Paths::with_base(base);
        paths.ensure_dirs().unwrap();
        paths
    }

    fn orchestrator(
        host: Arc<FakeHost>,
        notifier: Arc<RecordingNotifier>,
        tag: &str,
    ) -> Arc<Orchestrator> {
        let mut config = Config::default();
        config.schedule_url = SCHEDULE_URL.to_string();
        Orchestrator::with_parts(host, notifier, config, test_paths(tag), Timing::instant())
    }

    async fn wait_for_status(orch: &Arc<Orchestrator>, status: RunStatus) -> RunState {
        let mut rx = orch.subscribe();
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if rx.borrow_and_update().status == status {
                    return rx.borrow().clone();
                }
                rx.changed().await.expect("store dropped");
            }
        })
        .await
        .expect("run did not reach expected status")
    }

    async fn agent_tx(host: &FakeHost) -> mpsc::Sender<PageEvent> {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if let Some(tx) = host.agent_events.lock().unwrap().clone() {
                    return tx;
                }
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("agent never started")
    }

    /// The tab resolving to a login address fails the run with an
    /// authentication message and a notification.
    #[tokio::test]
    async fn login_redirect_fails_the_run() {
        let host = Arc::new(FakeHost::default());
        *host.resolved.lock().unwrap() = Some("https://desks.corp.test/login?next=x".into());
        let notifier = Arc::new(RecordingNotifier::default());
        let orch = orchestrator(host.clone(), notifier.clone(), "login");

        orch.start_run(HashSet::from([1])).await;
        let state = wait_for_status(&orch, RunStatus::Error).await;

        assert!(state.log.iter().any(|l| l.msg.contains("login")));
        assert_eq!(host.closed.lock().unwrap().len(), 1);
        assert!(!orch.is_running());
        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.contains("login"));
    }

    #[tokio::test]
    async fn foreign_host_redirect_fails_the_run() {
        let host = Arc::new(FakeHost::default());
        *host.resolved.lock().unwrap() = Some("https://sso.elsewhere.test/start".into());
        let notifier = Arc::new(RecordingNotifier::default());
        let orch = orchestrator(host.clone(), notifier.clone(), "foreign");

        orch.start_run(HashSet::from([1])).await;
        let state = wait_for_status(&orch, RunStatus::Error).await;
        assert!(state.log.iter().any(|l| l.msg.contains("Redirected away")));
    }

    #[tokio::test]
    async fn second_start_is_rejected_without_mutation() {
        let host = Arc::new(FakeHost::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let orch = orchestrator(host.clone(), notifier.clone(), "guard");

        orch.start_run(HashSet::from([1])).await;
        let tx = agent_tx(&host).await;
        // Let the startup log lines land before snapshotting.
        let mut rx = orch.subscribe();
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if rx
                    .borrow_and_update()
                    .log
                    .iter()
                    .any(|l| l.msg.contains("Booking agent started"))
                {
                    break;
                }
                rx.changed().await.unwrap();
            }
        })
        .await
        .unwrap();
        let before = orch.state().await;

        orch.start_run(HashSet::from([1])).await;
        let after = orch.state().await;
        assert_eq!(host.opens.load(Ordering::SeqCst), 1, "no second tab");
        assert_eq!(after, before, "rejection must not mutate state");

        tx.send(PageEvent::Done {
            total: 0,
            bookings: vec![],
        })
        .await
        .unwrap();
        wait_for_status(&orch, RunStatus::Done).await;
        assert!(!orch.is_running());
    }

    #[tokio::test]
    async fn done_event_completes_the_run() {
        let host = Arc::new(FakeHost::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let orch = orchestrator(host.clone(), notifier.clone(), "done");

        orch.start_run(HashSet::from([1, 3, 5])).await;
        let tx = agent_tx(&host).await;

        tx.send(PageEvent::Progress {
            current: 1,
            total: 2,
        })
        .await
        .unwrap();
        tx.send(PageEvent::Progress {
            current: 2,
            total: 2,
        })
        .await
        .unwrap();
        tx.send(PageEvent::Done {
            total: 2,
            bookings: vec![
                BookingRecord {
                    date: "Mon, Mar 2".into(),
                    desk: "Desk 4".into(),
                },
                BookingRecord {
                    date: "Wed, Mar 4".into(),
                    desk: "Booked".into(),
                },
            ],
        })
        .await
        .unwrap();

        let state = wait_for_status(&orch, RunStatus::Done).await;
        assert_eq!(state.current, state.total);
        assert_eq!(state.total, 2);
        assert_eq!(state.bookings.len(), 2);
        assert_eq!(host.closed.lock().unwrap().len(), 1);
        assert!(!orch.is_running());

        // Last run date persisted for the daily scheduler.
        let config = orch.config_snapshot().await;
        assert_eq!(
            config.last_run_date.as_deref(),
            Some(Local::now().date_naive().to_string().as_str())
        );

        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent[0].1, "Booked 2 desk(s)");
    }

    #[tokio::test]
    async fn none_event_is_a_soft_done() {
        let host = Arc::new(FakeHost::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let orch = orchestrator(host.clone(), notifier.clone(), "none");

        orch.start_run(HashSet::from([1])).await;
        let tx = agent_tx(&host).await;
        tx.send(PageEvent::NoneFound {
            message: "No booking controls found on the page".into(),
        })
        .await
        .unwrap();

        let state = wait_for_status(&orch, RunStatus::Done).await;
        assert_eq!(state.current, 0);
        assert_eq!(state.total, 0);
        assert!(!orch.is_running());
        let sent = notifier.sent.lock().unwrap();
        assert!(sent[0].1.contains("No booking controls"));
    }

    #[tokio::test]
    async fn open_failure_releases_the_guard() {
        let host = Arc::new(FakeHost {
            fail_open: true,
            ..FakeHost::default()
        });
        let notifier = Arc::new(RecordingNotifier::default());
        let orch = orchestrator(host.clone(), notifier.clone(), "open-fail");

        orch.start_run(HashSet::from([1])).await;
        let state = wait_for_status(&orch, RunStatus::Error).await;
        assert!(state.log.iter().any(|l| l.msg.contains("Failed to open")));
        assert!(!orch.is_running());
        // No tab existed, so nothing to close.
        assert!(host.closed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn load_timeout_closes_the_tab() {
        let host = Arc::new(FakeHost {
            fail_load: true,
            ..FakeHost::default()
        });
        let notifier = Arc::new(RecordingNotifier::default());
        let orch = orchestrator(host.clone(), notifier.clone(), "load-fail");

        orch.start_run(HashSet::from([1])).await;
        wait_for_status(&orch, RunStatus::Error).await;
        assert_eq!(host.closed.lock().unwrap().len(), 1);
        assert!(!orch.is_running());
    }

    #[tokio::test]
    async fn undeliverable_start_command_fails_the_run() {
        let host = Arc::new(FakeHost {
            fail_start: true,
            ..FakeHost::default()
        });
        let notifier = Arc::new(RecordingNotifier::default());
        let orch = orchestrator(host.clone(), notifier.clone(), "start-fail");

        orch.start_run(HashSet::from([1])).await;
        let state = wait_for_status(&orch, RunStatus::Error).await;
        assert!(state
            .log
            .iter()
            .any(|l| l.msg.contains("Could not reach the page agent")));
        assert_eq!(host.closed.lock().unwrap().len(), 1);
    }
}
