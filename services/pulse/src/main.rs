//! Pulse CLI
//!
//! Opens a live view on one monitor and logs every update.

use std::path::PathBuf;

use clap::Parser;
use pulse::types::StatsPeriod;
use pulse::{load_config, Config};
use tracing::Level;

#[derive(Parser)]
#[command(name = "pulse")]
#[command(about = "Live monitor health view")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Team owning the monitor (overrides config file)
    #[arg(short, long)]
    team: Option<String>,

    /// Monitor to watch (overrides config file)
    #[arg(short, long)]
    monitor: Option<String>,

    /// Statistics period: 24h, 7d, 30d or 90d
    #[arg(short, long)]
    period: Option<StatsPeriod>,

    /// Bearer token for the REST API
    #[arg(long, env = "PULSE_API_TOKEN")]
    api_token: Option<String>,

    /// Serve the status API on this port
    #[arg(long)]
    status_port: Option<u16>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: Level,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .init();

    tracing::debug!(
        "Parsed command line arguments: config={:?}, team={:?}, monitor={:?}, period={:?}, status_port={:?}",
        args.config,
        args.team,
        args.monitor,
        args.period,
        args.status_port
    );

    let mut config = if let Some(config_path) = &args.config {
        tracing::debug!("Loading configuration from {:?}", config_path);
        load_config(config_path)?
    } else {
        tracing::debug!("Using default configuration");
        Config::default()
    };

    if let Some(team) = args.team {
        config.session.team_id = Some(team);
    }
    if let Some(monitor) = args.monitor {
        config.session.monitor_id = Some(monitor);
    }
    if let Some(period) = args.period {
        config.session.period = period;
    }
    if let Some(token) = args.api_token {
        config.api.api_token = Some(token);
    }
    if let Some(port) = args.status_port {
        config.status_api.enabled = true;
        config.status_api.port = port;
    }

    tracing::info!("Starting pulse");
    pulse::run(config).await?;

    Ok(())
}
