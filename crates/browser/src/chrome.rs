//! Chrome lifecycle: locate a binary, launch with a dedicated profile
//! and remote debugging enabled, open and close tabs.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::net::TcpListener;
use tokio::process::{Child, Command};
use tracing::{debug, info};

use deskbot_core::{BrowserConfig, Error, Result};

use crate::cdp::CdpClient;

const CDP_READY_TIMEOUT: Duration = Duration::from_secs(15);

#[cfg(target_os = "macos")]
const KNOWN_BINARIES: &[&str] = &[
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    "/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
];

#[cfg(not(target_os = "macos"))]
const KNOWN_BINARIES: &[&str] = &[
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
];

const BINARY_NAMES: &[&str] = &[
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
    "chrome",
];

/// Resolve a Chrome-compatible binary: explicit config first, then
/// well-known install locations, then PATH lookup.
pub fn find_browser_binary(config: &BrowserConfig) -> Result<PathBuf> {
    if let Some(binary) = &config.binary {
        let path = PathBuf::from(binary);
        if path.exists() {
            return Ok(path);
        }
        return Err(Error::Browser(format!(
            "configured browser binary not found: {binary}"
        )));
    }
    for candidate in KNOWN_BINARIES {
        let path = Path::new(candidate);
        if path.exists() {
            return Ok(path.to_path_buf());
        }
    }
    for name in BINARY_NAMES {
        if let Ok(path) = which::which(name) {
            return Ok(path);
        }
    }
    Err(Error::Browser(
        "no Chrome or Chromium binary found; set browser.binary in the config".into(),
    ))
}

async fn find_free_port() -> Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .map_err(|e| Error::Browser(format!("could not reserve a debug port: {e}")))?;
    let port = listener
        .local_addr()
        .map_err(|e| Error::Browser(format!("could not read debug port: {e}")))?
        .port();
    drop(listener);
    Ok(port)
}

/// A running browser process plus its browser-level CDP connection.
pub struct Chrome {
    child: Child,
    port: u16,
    browser: CdpClient,
    http: reqwest::Client,
}

/// One open page: its target id plus a page-level CDP connection.
pub struct Tab {
    pub target_id: String,
    pub client: Arc<CdpClient>,
}

impl Chrome {
    /// Launch the browser with a dedicated user-data directory so the
    /// login session survives restarts.
    pub async fn launch(config: &BrowserConfig, profile_dir: &Path) -> Result<Self> {
        let binary = find_browser_binary(config)?;
        let port = find_free_port().await?;

        let mut cmd = Command::new(&binary);
        cmd.arg(format!("--remote-debugging-port={port}"))
            .arg(format!("--user-data-dir={}", profile_dir.display()))
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-background-networking")
            .arg("--disable-sync")
            .arg("about:blank");
        if config.headless {
            cmd.arg("--headless=new").arg("--disable-gpu");
        }
        cmd.stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true);

        info!(binary = %binary.display(), port, headless = config.headless, "Launching browser");
        let child = cmd
            .spawn()
            .map_err(|e| Error::Browser(format!("failed to launch {}: {e}", binary.display())))?;

        let http = reqwest::Client::new();
        let ws_url = wait_for_cdp_ready(&http, port).await?;
        let browser = CdpClient::connect(&ws_url).await?;

        Ok(Self {
            child,
            port,
            browser,
            http,
        })
    }

    /// Open `url` in a new background tab and attach to it.
    pub async fn open_tab(&self, url: &str) -> Result<Tab> {
        let target_id = self.browser.create_target(url).await?;
        let ws_url = self.page_ws_url(&target_id).await?;
        let client = CdpClient::connect(&ws_url).await?;
        client.enable_domain("Page").await?;
        client.enable_domain("Runtime").await?;
        debug!(%target_id, "Attached to new tab");
        Ok(Tab {
            target_id,
            client: Arc::new(client),
        })
    }

    pub async fn close_tab(&self, target_id: &str) -> Result<()> {
        self.browser.close_target(target_id).await
    }

    /// Look up the page target's WebSocket endpoint via the HTTP
    /// discovery API. Retried briefly; the target list lags creation.
    async fn page_ws_url(&self, target_id: &str) -> Result<String> {
        let url = format!("http://127.0.0.1:{}/json/list", self.port);
        for _ in 0..20 {
            let targets: Vec<Value> = self
                .http
                .get(&url)
                .send()
                .await
                .map_err(|e| Error::Browser(format!("CDP target list failed: {e}")))?
                .json()
                .await
                .map_err(|e| Error::Browser(format!("CDP target list parse failed: {e}")))?;
            let found = targets.iter().find(|t| {
                t.get("id").and_then(|v| v.as_str()) == Some(target_id)
            });
            if let Some(target) = found {
                if let Some(ws) = target
                    .get("webSocketDebuggerUrl")
                    .and_then(|v| v.as_str())
                {
                    return Ok(ws.to_string());
                }
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        Err(Error::Browser(format!(
            "target {target_id} never appeared in the CDP target list"
        )))
    }
}

impl Drop for Chrome {
    fn drop(&mut self) {
        let _ = self.child.start_kill();
    }
}

/// Poll the version endpoint until the debug server answers, returning
/// the browser-level WebSocket URL.
async fn wait_for_cdp_ready(http: &reqwest::Client, port: u16) -> Result<String> {
    let url = format!("http://127.0.0.1:{port}/json/version");
    let deadline = tokio::time::Instant::now() + CDP_READY_TIMEOUT;
    loop {
        match http.get(&url).send().await {
            Ok(resp) => {
                if let Ok(version) = resp.json::<Value>().await {
                    if let Some(ws) = version
                        .get("webSocketDebuggerUrl")
                        .and_then(|v| v.as_str())
                    {
                        debug!(port, "CDP endpoint ready");
                        return Ok(ws.to_string());
                    }
                }
            }
            Err(_) if tokio::time::Instant::now() < deadline => {}
            Err(e) => {
                return Err(Error::Browser(format!(
                    "browser debug endpoint never came up on port {port}: {e}"
                )));
            }
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(Error::Timeout(format!(
                "browser debug endpoint not ready after {}s",
                CDP_READY_TIMEOUT.as_secs()
            )));
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}

impl Tab {
    /// Wait for load-complete by polling the document ready state.
    pub async fn wait_loaded(&self, timeout: Duration) -> Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let state = self.client.evaluate("document.readyState").await?;
            if state.as_str() == Some("complete") {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(Error::Timeout(format!(
                    "page did not finish loading within {}s",
                    timeout.as_secs()
                )));
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    }

    /// The address the page actually landed on, redirects included.
    pub async fn resolved_url(&self) -> Result<String> {
        let value = self.client.evaluate("window.location.href").await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| Error::Browser("window.location.href returned no string".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_configured_binary_is_an_error() {
        let config = BrowserConfig {
            binary: Some("/nonexistent/chrome-binary".into()),
            headless: true,
        };
        let err = find_browser_binary(&config).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/chrome-binary"));
    }

    #[tokio::test]
    async fn free_port_is_bindable() {
        let port = find_free_port().await.unwrap();
        assert!(port > 0);
    }
}
