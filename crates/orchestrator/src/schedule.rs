//! Daily auto-run: fire a booking run once per calendar day at/after the
//! configured hour. Best-effort scheduling, reset whenever the process
//! restarts, not a cron guarantee.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, Timelike};
use cron::Schedule;
use tracing::{debug, info};

use deskbot_core::Config;

use crate::run::Orchestrator;

/// Next trigger instant: the upcoming `hour`:00 local time.
pub fn next_trigger(hour: u32) -> Option<DateTime<Local>> {
    let expr = format!("0 0 {hour} * * *");
    let schedule = Schedule::from_str(&expr).ok()?;
    schedule.upcoming(Local).next()
}

/// Whether the catch-up check should start a run right now: auto-run
/// enabled, past the trigger hour, and no run recorded today.
pub fn should_run_now(config: &Config, now: DateTime<Local>) -> bool {
    if !config.auto_run.enabled {
        return false;
    }
    if now.hour() < config.auto_run.hour {
        return false;
    }
    let today = now.date_naive().to_string();
    config.last_run_date.as_deref() != Some(today.as_str())
}

/// Run forever: one catch-up check at startup, then one check per daily
/// trigger. Stops on the shutdown broadcast.
pub async fn run_loop(
    orchestrator: Arc<Orchestrator>,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) {
    info!("Daily scheduler started");
    maybe_start(&orchestrator).await;

    loop {
        let hour = orchestrator.config_snapshot().await.auto_run.hour;
        let Some(next) = next_trigger(hour) else {
            info!(hour, "No valid daily trigger, scheduler idle");
            let _ = shutdown.recv().await;
            break;
        };
        let wait = (next - Local::now())
            .to_std()
            .unwrap_or(Duration::from_secs(1));
        debug!(next = %next, "Sleeping until next daily trigger");

        tokio::select! {
            _ = tokio::time::sleep(wait) => {
                maybe_start(&orchestrator).await;
            }
            _ = shutdown.recv() => {
                info!("Daily scheduler shutting down");
                break;
            }
        }
    }
}

async fn maybe_start(orchestrator: &Arc<Orchestrator>) {
    let config = orchestrator.config_snapshot().await;
    if !should_run_now(&config, Local::now()) {
        debug!("Daily trigger conditions not met");
        return;
    }
    info!("Starting scheduled booking run");
    let days = config.selected_days.iter().copied().collect();
    orchestrator.start_run(days).await;
}
