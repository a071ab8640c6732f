//! The `photoram config` command for configuration management.

use clap::{Args, Subcommand};
use photoram_core::{Config, PhotoramError};

/// Arguments for the `config` command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Subcommands for configuration management.
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Display the effective configuration
    Show,

    /// Show config file path
    Path,

    /// Initialize a new config file with defaults
    Init {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
}

/// Execute the config command.
pub async fn execute(args: ConfigArgs) -> anyhow::Result<()> {
    match args.command {
        ConfigCommand::Show => {
            let config = Config::load().map_err(PhotoramError::from)?;
            println!("{}", config.to_toml().map_err(PhotoramError::from)?);
        }

        ConfigCommand::Path => {
            println!("{}", Config::default_path().display());
            println!(
                "{}  (tag overrides)",
                Config::default_overrides_path().display()
            );
        }

        ConfigCommand::Init { force } => {
            let path = Config::default_path();

            if path.exists() && !force {
                anyhow::bail!(
                    "Config file already exists at: {}\nUse --force to overwrite.",
                    path.display()
                );
            }

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let toml = Config::default().to_toml().map_err(PhotoramError::from)?;
            std::fs::write(&path, toml)?;

            tracing::info!("Config file created at: {}", path.display());
            println!("Configuration initialized at: {}", path.display());
            println!(
                "Set checkpoint.base_url, checkpoint.weights_blake3 and \
                 checkpoint.labels_blake3 before running `photoram models download`."
            );
        }
    }

    Ok(())
}
