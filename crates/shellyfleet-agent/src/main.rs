mod error;
mod manager_client;
mod runner;
mod wifi;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use manager_client::ManagerClient;
use runner::{AgentConfig, Runner};
use tracing_subscriber::EnvFilter;
use wifi::StubWifiAdapter;

/// The Provisioner: a thin agent with physical Wi-Fi access to
/// unconfigured devices, reporting back to a Manager over HTTP.
#[derive(Debug, Parser)]
#[command(name = "shellyfleet-agent", version)]
struct Args {
    /// Base URL of the Manager's provisioner API.
    #[arg(long, env = "SHELLYFLEET_MANAGER_URL")]
    manager_url: String,

    /// Hostname this agent registers with; defaults to the OS hostname.
    #[arg(long, env = "SHELLYFLEET_AGENT_HOSTNAME")]
    hostname: Option<String>,

    /// Capabilities declared at registration (e.g. "gen1", "gen2", "2.4ghz").
    #[arg(long = "capability", env = "SHELLYFLEET_AGENT_CAPABILITIES", value_delimiter = ',')]
    capabilities: Vec<String>,

    /// Production Wi-Fi network devices should be handed off to.
    #[arg(long, env = "SHELLYFLEET_PRODUCTION_SSID")]
    production_ssid: String,

    /// Production Wi-Fi password, via env to avoid shell history leakage.
    #[arg(long, env = "SHELLYFLEET_PRODUCTION_PASSWORD")]
    production_password: Option<String>,

    /// Password for the device's own temporary AP, if it requires one.
    #[arg(long, env = "SHELLYFLEET_DEVICE_AP_PASSWORD")]
    device_ap_password: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).with_target(false).init();

    let args = Args::parse();
    let hostname = args.hostname.unwrap_or_else(|| {
            hostname_or_fallback()
    });

    let client = ManagerClient::new(args.manager_url);
    let wifi = Arc::new(StubWifiAdapter::new());
    let config = AgentConfig {
        hostname,
        capabilities: args.capabilities,
        device_ap_password: args.device_ap_password,
        production_ssid: args.production_ssid,
        production_password: args.production_password,
    };

    let runner = Runner::new(client, wifi, config);
    runner.run().await?;
    Ok(())
}

fn hostname_or_fallback() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "shellyfleet-agent".to_string())
}
