use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "shellyfleet",
    about = "Fleet management for Shelly smart-home devices: discovery, provisioning, config sync",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Scan a CIDR range for Shelly devices and print what answered.
    Discover {
        /// e.g. 192.168.1.0/24
        cidr: String,
    },

    /// Register a device at a known IP under a given name.
    Add {
        ip: std::net::Ipv4Addr,
        name: String,
    },

    /// Export devices/templates through a sync plugin.
    Export {
        /// Plugin name: "json" or "sma".
        #[arg(long = "format", default_value = "json")]
        format: String,

        /// Directory the artifact is written under.
        #[arg(long)]
        output: PathBuf,

        #[arg(long, default_value = "none")]
        compression: String,
    },

    /// Import devices/templates through a sync plugin.
    Import {
        /// Plugin name: "json" or "sma".
        #[arg(long = "format", default_value = "json")]
        format: String,

        /// Path to the artifact to read.
        #[arg(long)]
        file: PathBuf,

        /// Preview the import without applying it.
        #[arg(long)]
        dry_run: bool,
    },

    /// Run the Manager HTTP API until a termination signal arrives.
    Server {
        /// YAML config file; env vars and defaults fill in anything absent.
        #[arg(long)]
        config: Option<PathBuf>,
    },
}
