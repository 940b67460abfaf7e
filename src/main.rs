//! rayagent: keeps a v2ray node in sync with RayDash
//!
//! Exit codes: 0 after a clean shutdown, 1 when startup fails, 130 when a
//! second interrupt cuts shutdown short.

use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info, warn};

use rayagent::{logging, Config, Overrides, RayAgent};

#[derive(Parser)]
#[command(name = "rayagent")]
#[command(about = "Fleet agent reconciling v2ray with the RayDash control plane")]
struct Cli {
    /// Path to configuration file (TOML or YAML)
    #[arg(short, long, env = "RAYAGENT_CONFIG")]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: Overrides,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // an explicit path must load; discovery only yields files that exist
    let path = cli.config.clone().or_else(Config::discover);
    let mut config = match &path {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    config.apply(&cli.overrides);

    logging::init(&config.log.level);
    match &path {
        Some(path) => info!(path = %path.display(), "Loaded configuration"),
        None => info!("No config file found, using environment and flags only"),
    }

    let agent = match RayAgent::start(&config).await {
        Ok(agent) => agent,
        Err(e) => {
            error!(error = %e, "Startup failed");
            std::process::exit(1);
        }
    };

    tokio::signal::ctrl_c().await?;
    info!("Interrupt received");

    tokio::select! {
        _ = agent.shutdown() => {}
        _ = tokio::signal::ctrl_c() => {
            warn!("Second interrupt, exiting without draining");
            std::process::exit(130);
        }
    }

    Ok(())
}
