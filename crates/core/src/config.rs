use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::paths::Paths;

fn default_selected_days() -> Vec<u8> {
    // Mon..Fri, 0=Sunday.
    vec![1, 2, 3, 4, 5]
}

fn default_schedule_url() -> String {
    "https://desks.example.com/schedule".to_string()
}

fn default_true() -> bool {
    true
}

fn default_auto_run_hour() -> u32 {
    8
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoRunConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Local hour of day after which the daily run may fire.
    #[serde(default = "default_auto_run_hour")]
    pub hour: u32,
}

impl Default for AutoRunConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            hour: default_auto_run_hour(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserConfig {
    /// Explicit browser binary. Auto-detected when unset.
    #[serde(default)]
    pub binary: Option<String>,
    #[serde(default = "default_true")]
    pub headless: bool,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            binary: None,
            headless: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifyConfig {
    /// Native desktop notification on terminal events.
    #[serde(default = "default_true")]
    pub desktop: bool,
    /// Generic webhook to POST terminal summaries to.
    #[serde(default)]
    pub webhook_url: Option<String>,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            desktop: true,
            webhook_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Weekdays to book, 0=Sunday..6=Saturday.
    #[serde(default = "default_selected_days")]
    pub selected_days: Vec<u8>,
    /// ISO date of the last terminal run outcome, written after every
    /// terminal event. Drives the daily auto-run catch-up check.
    #[serde(default)]
    pub last_run_date: Option<String>,
    /// The schedule view of the target booking site.
    #[serde(default = "default_schedule_url")]
    pub schedule_url: String,
    #[serde(default)]
    pub auto_run: AutoRunConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
}

impl Default for Config {
    fn default() -> Self {
        serde_json::from_str("{}").expect("empty config must deserialize")
    }
}

impl Config {
    /// Load from the config file, falling back to defaults when absent.
    pub fn load(paths: &Paths) -> Result<Self> {
        let path = paths.config_file();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)?;
        serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn save(&self, paths: &Paths) -> Result<()> {
        let path = paths.config_file();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, content)?;
        Ok(())
    }
}
