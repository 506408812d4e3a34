//! `TabHost` implementation over a running Chrome instance: tab
//! bookkeeping plus wiring the page agent into an attached tab.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, warn};

use deskbot_core::{AgentCommand, Error, PageEvent, Result};
use deskbot_orchestrator::{TabHost, TabId};
use deskbot_page::{spawn_agent, Pacing};

use crate::chrome::{Chrome, Tab};
use crate::page::CdpPage;

const AGENT_ACK_TIMEOUT: Duration = Duration::from_secs(5);

pub struct BrowserHost {
    chrome: Chrome,
    tabs: Mutex<HashMap<TabId, Tab>>,
    schedule_url: String,
    pacing: Pacing,
}

impl BrowserHost {
    pub fn new(chrome: Chrome, schedule_url: impl Into<String>) -> Self {
        Self {
            chrome,
            tabs: Mutex::new(HashMap::new()),
            schedule_url: schedule_url.into(),
            pacing: Pacing::default(),
        }
    }
}

#[async_trait]
impl TabHost for BrowserHost {
    async fn open_tab(&self, url: &str) -> Result<TabId> {
        let tab = self.chrome.open_tab(url).await?;
        let id = tab.target_id.clone();
        self.tabs.lock().await.insert(id.clone(), tab);
        Ok(id)
    }

    async fn wait_loaded(&self, tab: &TabId, timeout: Duration) -> Result<()> {
        let tabs = self.tabs.lock().await;
        let tab = tabs
            .get(tab)
            .ok_or_else(|| Error::Browser(format!("unknown tab {tab}")))?;
        tab.wait_loaded(timeout).await
    }

    async fn resolved_url(&self, tab: &TabId) -> Result<String> {
        let tabs = self.tabs.lock().await;
        let tab = tabs
            .get(tab)
            .ok_or_else(|| Error::Browser(format!("unknown tab {tab}")))?;
        tab.resolved_url().await
    }

    async fn close_tab(&self, tab: &TabId) {
        self.tabs.lock().await.remove(tab);
        if let Err(e) = self.chrome.close_tab(tab).await {
            // The tab may already be gone; closing is best effort.
            debug!(%tab, error = %e, "Tab close failed");
        }
    }

    async fn start_agent(
        &self,
        tab: &TabId,
        selected_days: HashSet<u8>,
        events: mpsc::Sender<PageEvent>,
    ) -> Result<()> {
        let driver = {
            let tabs = self.tabs.lock().await;
            let tab = tabs
                .get(tab)
                .ok_or_else(|| Error::Browser(format!("unknown tab {tab}")))?;
            CdpPage::new(tab.client.clone())
        };

        let commands = spawn_agent(
            driver,
            self.schedule_url.clone(),
            self.pacing.clone(),
            events,
        );

        let (ack_tx, ack_rx) = oneshot::channel();
        commands
            .send(AgentCommand::Start {
                selected_days,
                ack: ack_tx,
            })
            .await
            .map_err(|_| Error::Channel("booking agent dropped its command channel".into()))?;

        match tokio::time::timeout(AGENT_ACK_TIMEOUT, ack_rx).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(Error::Channel(
                "booking agent exited before acknowledging start".into(),
            )),
            Err(_) => {
                warn!(%tab, "Booking agent did not acknowledge start in time");
                Err(Error::Timeout(format!(
                    "booking agent start not acknowledged within {}s",
                    AGENT_ACK_TIMEOUT.as_secs()
                )))
            }
        }
    }
}
