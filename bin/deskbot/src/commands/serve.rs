use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::info;

use deskbot_browser::{BrowserHost, Chrome};
use deskbot_core::{Config, Paths};
use deskbot_orchestrator::{schedule, Orchestrator};

/// Long-running daemon: keeps the browser up and fires one booking run
/// per day at the configured hour. Ctrl-C shuts it down.
pub async fn run(headed: bool) -> anyhow::Result<()> {
    let paths = Paths::new();
    paths.ensure_dirs()?;
    let mut config = Config::load(&paths)?;
    if headed {
        config.browser.headless = false;
    }

    let chrome = Chrome::launch(&config.browser, &paths.browser_dir()).await?;
    let host = Arc::new(BrowserHost::new(chrome, config.schedule_url.clone()));
    let orchestrator = Orchestrator::new(host, config, paths);

    // Mirror each run's log into the daemon's own log stream.
    let mut rx = orchestrator.subscribe();
    tokio::spawn(async move {
        let mut printed = 0usize;
        loop {
            {
                let state = rx.borrow_and_update();
                // Each run replaces the record, resetting the log.
                if printed > state.log.len() {
                    printed = 0;
                }
                for entry in &state.log[printed..] {
                    info!(level = ?entry.level, "{}", entry.msg);
                }
                printed = state.log.len();
            }
            if rx.changed().await.is_err() {
                break;
            }
        }
    });

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let scheduler = tokio::spawn(schedule::run_loop(orchestrator, shutdown_rx));

    info!("deskbot serving; press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    let _ = shutdown_tx.send(());
    let _ = scheduler.await;

    Ok(())
}
