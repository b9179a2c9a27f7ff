mod cli;
mod commands;
mod output;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Command};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .with_target(false)
    .init();

    let cli = Cli::parse();

    let exit_code = match cli.command {
        Command::Discover { cidr } => commands::discover(cidr).await?,
        Command::Add { ip, name } => {
            let config = shellyfleet_config::load(None)?;
            commands::add(&config, ip, name).await?
        }
        Command::Export { format, output, compression } => {
            let config = shellyfleet_config::load(None)?;
            commands::export(&config, format, output, compression).await?
        }
        Command::Import { format, file, dry_run } => {
            let config = shellyfleet_config::load(None)?;
            commands::import(&config, format, file, dry_run).await?
        }
        Command::Server { config: config_path } => {
            let config = shellyfleet_config::load(config_path.as_deref())?;
            commands::server(config).await?
        }
    };

    std::process::exit(exit_code);
}
