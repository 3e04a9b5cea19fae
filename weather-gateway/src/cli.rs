use std::{net::SocketAddr, path::PathBuf};

use anyhow::bail;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use weather_core::Config;

use crate::server;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weather-gateway", version, about = "HTTP gateway for Open-Meteo weather data")]
pub struct Cli {
    /// Config file; defaults to the platform config directory.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP server.
    Serve {
        /// Listen address, overriding `server.bind`.
        #[arg(long)]
        bind: Option<SocketAddr>,
    },

    /// Print the effective configuration as TOML.
    ShowConfig,

    /// Write the default configuration file.
    InitConfig {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Command::Serve { bind } => {
                let mut config = Config::load(self.config.as_deref())?;
                if let Some(bind) = bind {
                    config.server.bind = bind;
                }

                init_tracing(&config.log_filter);
                server::serve(config).await?;
            }
            Command::ShowConfig => {
                let config = Config::load(self.config.as_deref())?;
                print!("{}", config.to_toml()?);
            }
            Command::InitConfig { force } => {
                let path = match self.config {
                    Some(path) => path,
                    None => Config::config_file_path()?,
                };
                if path.exists() && !force {
                    bail!(
                        "Config file already exists: {}\n\
                         Hint: pass --force to overwrite it.",
                        path.display()
                    );
                }

                Config::default().save_to(&path)?;
                println!("Wrote default configuration to {}", path.display());
            }
        }

        Ok(())
    }
}

/// `RUST_LOG` wins over the configured filter.
fn init_tracing(default_filter: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();
}
