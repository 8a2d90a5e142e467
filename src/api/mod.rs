//! API Module
//!
//! Provides the HTTP surface of CoinPulse: on-demand refresh plus read-only
//! data and health endpoints over the shared cache.

mod handlers;
mod types;

pub use handlers::create_router;
pub use types::*;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::cache::MarketCache;
use crate::pipeline::Refresher;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    refresher: Refresher,
}

impl AppState {
    pub fn new(refresher: Refresher) -> Self {
        Self { refresher }
    }

    pub fn refresher(&self) -> &Refresher {
        &self.refresher
    }

    pub fn cache(&self) -> &Arc<MarketCache> {
        self.refresher.cache()
    }
}

/// Start the API server, returning once `shutdown` resolves
pub async fn start_server<F>(state: AppState, addr: SocketAddr, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(state);

    tracing::info!("CoinPulse API starting on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    tracing::info!("CoinPulse API stopped");
    Ok(())
}
