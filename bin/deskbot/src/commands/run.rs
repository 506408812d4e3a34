use std::collections::HashSet;
use std::sync::Arc;

use deskbot_browser::{BrowserHost, Chrome};
use deskbot_core::{Config, LogLevel, Paths, RunStatus};
use deskbot_orchestrator::Orchestrator;

/// One booking pass: launch the browser, drive the run, stream the run
/// log to stdout and print the result. Exits non-zero on failure.
pub async fn run(days: Option<String>, headed: bool) -> anyhow::Result<()> {
    let paths = Paths::new();
    paths.ensure_dirs()?;
    let mut config = Config::load(&paths)?;
    if headed {
        config.browser.headless = false;
    }

    let selected: HashSet<u8> = match days {
        Some(list) => super::parse_days(&list)?,
        None => config.selected_days.iter().copied().collect(),
    };

    let chrome = Chrome::launch(&config.browser, &paths.browser_dir()).await?;
    let host = Arc::new(BrowserHost::new(chrome, config.schedule_url.clone()));
    let orchestrator = Orchestrator::new(host, config, paths);

    let mut rx = orchestrator.subscribe();
    orchestrator.start_run(selected).await;

    let mut printed = 0usize;
    loop {
        let state = rx.borrow_and_update().clone();
        for entry in &state.log[printed..] {
            println!("[{}] {} {}", entry.time, level_mark(entry.level), entry.msg);
        }
        printed = state.log.len();

        match state.status {
            RunStatus::Done => {
                if state.bookings.is_empty() {
                    println!();
                    println!("No desks booked.");
                } else {
                    println!();
                    println!("Booked {} desk(s):", state.bookings.len());
                    for booking in &state.bookings {
                        println!("  {}  {}", booking.date, booking.desk);
                    }
                }
                return Ok(());
            }
            RunStatus::Error => {
                anyhow::bail!("booking run failed");
            }
            RunStatus::Idle | RunStatus::Running => {}
        }

        if rx.changed().await.is_err() {
            anyhow::bail!("booking run ended without a result");
        }
    }
}

fn level_mark(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Info => "·",
        LogLevel::Success => "✓",
        LogLevel::Warn => "!",
        LogLevel::Error => "✗",
    }
}
