//! torctl - control the Tor router from the command line
//!
//! Connects to the tor-router control port, runs one command, prints the
//! result and exits.

mod commands;

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::time::Duration;
use torctl_client::{ClientConfig, TorController, WireMode};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "torctl")]
#[command(about = "Control-plane client for a pool of Tor proxy instances")]
#[command(version)]
pub struct Cli {
    /// YAML config file (defaults and env overrides still apply)
    #[arg(short, long, env = "TORCTL_CONFIG")]
    config: Option<PathBuf>,

    /// Control-plane host
    #[arg(long)]
    host: Option<String>,

    /// Control-plane port
    #[arg(short, long)]
    port: Option<u16>,

    /// Request timeout in seconds
    #[arg(short, long)]
    timeout: Option<u64>,

    /// Wire framing: framed or jsonl
    #[arg(long)]
    wire_mode: Option<WireMode>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the Tor pool
    CreatePool,

    /// Open the SOCKS listener
    CreateSocksServer {
        /// Listener port (defaults to the configured port, then 9050)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Spawn Tor instances
    CreateInstances {
        /// Number of instances
        count: u32,
    },

    /// Tear down all Tor instances
    CloseInstances,

    /// Create the pool, the SOCKS listener and the instances in one go
    Bootstrap {
        /// Number of instances
        #[arg(short, long, default_value = "1")]
        instances: u32,

        /// SOCKS listener port
        #[arg(long)]
        socks_port: Option<u16>,
    },
}

fn load_config(cli: &Cli) -> Result<ClientConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => ClientConfig::from_file(path)?,
        None => ClientConfig::default(),
    };
    config.apply_env_overrides();

    if let Some(host) = &cli.host {
        config.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.control_port = port;
    }
    if let Some(secs) = cli.timeout {
        config = config.with_request_timeout(Duration::from_secs(secs));
    }
    if let Some(mode) = cli.wire_mode {
        config = config.with_wire_mode(mode);
    }

    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load config: {}", e);
            return Err(e);
        }
    };

    tracing::debug!("Using control endpoint {}", config.address());
    let controller = TorController::connect(config).await.map_err(|e| {
        eprintln!("{}: {}", "Connection failed".red(), e);
        e
    })?;

    let result = commands::execute(&controller, cli.command).await;
    controller.connection().close();

    match result {
        Ok(output) => {
            println!("{}", output);
            Ok(())
        }
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            std::process::exit(1);
        }
    }
}
