use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use dispatch::ActionRunner;
use display::TerminalConsole;
use settings::{load_settings, resolve_config_path, Settings};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, short)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the stock configuration as TOML.
    DefaultConfig,
    /// Load and validate the configuration, then summarise it.
    Check,
    /// Run one configured action now, without buttons or menus.
    Run { action: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::DefaultConfig => {
            print!("{}", Settings::default().to_toml()?);
        }
        Command::Check => {
            let path = resolve_config_path(cli.config);
            let settings = load_settings(path.as_deref()).context("configuration is invalid")?;
            match &path {
                Some(path) => println!("{} is valid", path.display()),
                None => println!("no configuration file; stock layout is valid"),
            }
            for button in &settings.buttons {
                println!(
                    "  button {} on pin {}: press {:?}, hold {:?}",
                    button.id.0,
                    button.pin,
                    button.press,
                    button.hold_binding()
                );
            }
            for menu in &settings.menus {
                let options: Vec<_> = menu.options.iter().map(|o| o.action.as_str()).collect();
                println!("  menu {} -> {}", menu.id, options.join(", "));
            }
        }
        Command::Run { action } => {
            let path = resolve_config_path(cli.config);
            let settings = load_settings(path.as_deref()).context("configuration is invalid")?;
            let Some(spec) = settings.actions.get(&action) else {
                bail!(
                    "no action named '{action}' (known: {})",
                    settings.actions.keys().cloned().collect::<Vec<_>>().join(", ")
                );
            };

            let runner = ActionRunner::new(Arc::new(TerminalConsole));
            let permit = runner.try_begin(&spec.label)?;
            let report = permit.run_action(spec).await;
            if let Err(fault) = report.result {
                bail!(fault);
            }
        }
    }

    Ok(())
}
