//! Terminal-event notifications: one human-readable line per run
//! outcome. Delivery is best-effort on every channel: failures are
//! logged and swallowed.

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};

use deskbot_core::NotifyConfig;

#[async_trait]
pub trait Notify: Send + Sync {
    async fn send(&self, title: &str, message: &str);
}

pub struct Notifier {
    desktop: bool,
    webhook_url: Option<String>,
    http: reqwest::Client,
}

impl Notifier {
    pub fn from_config(config: &NotifyConfig) -> Self {
        Self {
            desktop: config.desktop,
            webhook_url: config.webhook_url.clone(),
            http: reqwest::Client::new(),
        }
    }

    /// No channels configured; useful for tests and headless CI.
    pub fn disabled() -> Self {
        Self {
            desktop: false,
            webhook_url: None,
            http: reqwest::Client::new(),
        }
    }

    async fn send_webhook(&self, url: &str, title: &str, message: &str) {
        let body = json!({
            "title": title,
            "message": message,
            "timestamp": chrono::Utc::now().timestamp_millis(),
        });
        match self.http.post(url).json(&body).send().await {
            Ok(resp) if resp.status().is_success() => {
                debug!(%url, "Webhook notification delivered");
            }
            Ok(resp) => {
                warn!(%url, status = %resp.status(), "Webhook notification rejected");
            }
            Err(e) => {
                warn!(%url, error = %e, "Webhook notification failed");
            }
        }
    }
}

#[async_trait]
impl Notify for Notifier {
    async fn send(&self, title: &str, message: &str) {
        if self.desktop {
            if let Err(e) = send_desktop(title, message).await {
                warn!(error = %e, "Desktop notification failed");
            }
        }
        if let Some(url) = &self.webhook_url {
            self.send_webhook(url, title, message).await;
        }
    }
}

#[cfg(target_os = "macos")]
async fn send_desktop(title: &str, message: &str) -> std::io::Result<()> {
    let script = format!(
        "display notification \"{}\" with title \"{}\"",
        escape_applescript(message),
        escape_applescript(title)
    );
    tokio::process::Command::new("osascript")
        .arg("-e")
        .arg(script)
        .status()
        .await?;
    Ok(())
}

#[cfg(target_os = "linux")]
async fn send_desktop(title: &str, message: &str) -> std::io::Result<()> {
    tokio::process::Command::new("notify-send")
        .arg(title)
        .arg(message)
        .status()
        .await?;
    Ok(())
}

#[cfg(not(any(target_os = "macos", target_os = "linux")))]
async fn send_desktop(_title: &str, _message: &str) -> std::io::Result<()> {
    Ok(())
}

#[cfg(target_os = "macos")]
fn escape_applescript(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}
