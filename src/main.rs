//! CoinPulse server
//!
//! Usage: cargo run (config from config/*.toml and COINPULSE__* env vars)

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

use coinpulse::api::{self, AppState};
use coinpulse::cache::MarketCache;
use coinpulse::config::AppConfig;
use coinpulse::ingestion::CoinGeckoIngester;
use coinpulse::pipeline::Refresher;
use coinpulse::poller::Poller;
use coinpulse::transform::{QualityThresholds, Transformer};

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;
    coinpulse::logging::init(&config.logging)?;

    info!(config = %config, "Starting CoinPulse");

    let ingester = Arc::new(CoinGeckoIngester::from_config(&config.ingestion)?);
    let transformer = Arc::new(Transformer::new(QualityThresholds::from(&config.quality)));
    let cache = Arc::new(MarketCache::new());
    let refresher = Refresher::new(ingester, transformer, cache);

    let poller = config
        .ingestion
        .poll_enabled
        .then(|| Poller::spawn(refresher.clone(), config.ingestion.interval()));

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("server.host and server.port do not form a valid socket address")?;

    let served = api::start_server(AppState::new(refresher), addr, shutdown_signal()).await;

    if let Some(poller) = poller {
        poller.shutdown().await;
    }

    served
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
