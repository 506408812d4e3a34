use deskbot_core::{Config, Paths};
use deskbot_page::heuristics::weekday_name;

/// Show the current configuration as pretty-printed JSON.
pub async fn show() -> anyhow::Result<()> {
    let paths = Paths::new();
    let config = Config::load(&paths)?;

    println!("File: {}", paths.config_file().display());
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

pub async fn set_days(days: &str) -> anyhow::Result<()> {
    let parsed = super::parse_days(days)?;

    let paths = Paths::new();
    paths.ensure_dirs()?;
    let mut config = Config::load(&paths)?;
    let mut selected: Vec<u8> = parsed.into_iter().collect();
    selected.sort_unstable();
    config.selected_days = selected;
    config.save(&paths)?;

    let names: Vec<&str> = config
        .selected_days
        .iter()
        .map(|&d| weekday_name(d))
        .collect();
    println!("Booking days set to: {}", names.join(", "));
    Ok(())
}

pub async fn set_url(url: &str) -> anyhow::Result<()> {
    let parsed = url::Url::parse(url)?;
    if parsed.host_str().is_none() {
        anyhow::bail!("schedule URL needs a host: {url}");
    }

    let paths = Paths::new();
    paths.ensure_dirs()?;
    let mut config = Config::load(&paths)?;
    config.schedule_url = parsed.to_string();
    config.save(&paths)?;

    println!("Schedule URL set to: {}", config.schedule_url);
    Ok(())
}
