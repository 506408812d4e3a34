mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "deskbot")]
#[command(about = "Automated desk booking for shared-office schedule pages", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one booking pass now and print the outcome
    Run {
        /// Weekdays to book, comma separated (names or 0=Sun..6=Sat);
        /// defaults to the configured days
        #[arg(short, long)]
        days: Option<String>,

        /// Show the browser window instead of running headless
        #[arg(long)]
        headed: bool,
    },

    /// Run as a daemon with the daily auto-run scheduler
    Serve {
        /// Show the browser window instead of running headless
        #[arg(long)]
        headed: bool,
    },

    /// Show configuration and last run info
    Status,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the current configuration
    Show,
    /// Set the weekdays to book (e.g. "mon,tue,fri" or "1,2,5")
    SetDays {
        /// Comma-separated weekdays
        days: String,
    },
    /// Set the schedule page URL
    SetUrl {
        /// Full URL of the schedule view
        url: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup tracing
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match cli.command {
        Commands::Run { days, headed } => {
            commands::run::run(days, headed).await?;
        }
        Commands::Serve { headed } => {
            commands::serve::run(headed).await?;
        }
        Commands::Status => {
            commands::status::run().await?;
        }
        Commands::Config { command } => match command {
            ConfigCommands::Show => {
                commands::config_cmd::show().await?;
            }
            ConfigCommands::SetDays { days } => {
                commands::config_cmd::set_days(&days).await?;
            }
            ConfigCommands::SetUrl { url } => {
                commands::config_cmd::set_url(&url).await?;
            }
        },
    }

    Ok(())
}
