//! Headless trading runtime. No GUI, no HTTP server, no incoming
//! connections. Metrics are pushed via structured JSON log lines
//! (prefixed `METRICS_JSON:`) on an interval.
//!
//! # Usage
//! ```sh
//! DERIV_TOKEN=... cargo run
//! ```

use anyhow::Result;
use synth_strategy_runtime::application::TradingSystem;
use synth_strategy_runtime::config::Config;
use tracing::{Level, info};
use tracing_subscriber::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(false);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(stdout_layer)
        .init();

    info!("synth-strategy-runtime {} starting", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    info!(symbol = %config.broker.symbol, "configuration loaded");

    let mut system = TradingSystem::build(&config).await?;
    system.start().await?;
    info!("trading system running, press Ctrl+C to shut down");

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received, exiting");

    Ok(())
}
