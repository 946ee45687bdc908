//! Button panel daemon. Runs inside the control window of the dashboard's
//! tmux session and turns GPIO button presses into menu confirmations and
//! maintenance commands.

use std::{fs::OpenOptions, path::PathBuf, sync::Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use settings::{load_settings, resolve_config_path, LoggingSettings};
use tokio::{
    select,
    signal::{
        self,
        unix::{signal as unix_signal, SignalKind},
    },
};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod app;

#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Configuration file. Falls back to $PANEL_CONFIG, then
    /// /etc/button-panel/panel.toml, then built-in defaults.
    #[arg(long, short)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = resolve_config_path(cli.config);
    let settings = load_settings(config_path.as_deref()).context("load configuration")?;
    init_logging(&settings.logging)?;
    info!(config = ?config_path, "button panel starting");

    let panel = app::Panel::start(&settings).await?;
    wait_for_shutdown().await?;
    info!("received shutdown signal");
    panel.stop().await;
    Ok(())
}

fn init_logging(logging: &LoggingSettings) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .with_context(|| format!("invalid log level '{}'", logging.level))?;

    match &logging.file {
        // stdout is the control window, so logs must stay out of it
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
    }
    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    let mut terminate = unix_signal(SignalKind::terminate()).context("install SIGTERM handler")?;
    select! {
        result = signal::ctrl_c() => result.context("wait for ctrl-c")?,
        _ = terminate.recv() => {}
    }
    Ok(())
}
