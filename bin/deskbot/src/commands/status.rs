use deskbot_browser::find_browser_binary;
use deskbot_core::{Config, Paths};
use deskbot_page::heuristics::weekday_name;

pub async fn run() -> anyhow::Result<()> {
    let paths = Paths::new();

    println!("deskbot status");
    println!("==============");
    println!();

    let config_path = paths.config_file();
    let config_exists = config_path.exists();
    println!(
        "Config:    {} {}",
        config_path.display(),
        if config_exists { "✓" } else { "✗ (defaults)" }
    );

    let config = Config::load(&paths)?;

    println!("Schedule:  {}", config.schedule_url);

    let days: Vec<&str> = config
        .selected_days
        .iter()
        .map(|&d| weekday_name(d))
        .collect();
    println!("Days:      {}", days.join(", "));

    println!(
        "Auto-run:  {} at {:02}:00",
        if config.auto_run.enabled {
            "enabled"
        } else {
            "disabled"
        },
        config.auto_run.hour
    );
    println!(
        "Last run:  {}",
        config.last_run_date.as_deref().unwrap_or("never")
    );

    match find_browser_binary(&config.browser) {
        Ok(binary) => println!("Browser:   {} ✓", binary.display()),
        Err(e) => println!("Browser:   ✗ {e}"),
    }

    Ok(())
}
