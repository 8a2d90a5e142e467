//! Ingestion module - upstream market data fetching
//!
//! Pulls one snapshot per call from the upstream price API and tracks
//! consecutive failures for health reporting. Retry cadence belongs to the
//! caller (the poller or the refresh route).

mod coingecko;

pub use coingecko::CoinGeckoIngester;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::{HealthState, RawSnapshot};

/// Consecutive failures at which an ingester reports itself unhealthy
pub const UNHEALTHY_ERROR_THRESHOLD: u32 = 3;

/// Trait for market data sources
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Get the source name
    fn name(&self) -> &'static str;

    /// Fetch one snapshot for every configured asset. Single attempt.
    async fn fetch(&self) -> Result<RawSnapshot, IngestError>;

    /// Health metrics, without side effects
    async fn status(&self) -> IngesterStatus;
}

/// Why a fetch produced no snapshot
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// Upstream answered 429. Logged and counted like any other failure.
    #[error("upstream rate limit reached (HTTP 429)")]
    RateLimited,
    #[error("upstream returned HTTP {status}")]
    Status { status: u16 },
    #[error("request to upstream failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected upstream response body: {0}")]
    Decode(String),
}

impl IngestError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, IngestError::RateLimited)
    }
}

/// Ingester health snapshot served under `/api/health`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngesterStatus {
    pub last_fetch_time: Option<String>,
    pub error_count: u32,
    pub monitored_cryptos: usize,
    pub status: HealthState,
}

impl IngesterStatus {
    pub fn new(last_fetch_time: Option<String>, error_count: u32, monitored_cryptos: usize) -> Self {
        let status = if error_count < UNHEALTHY_ERROR_THRESHOLD {
            HealthState::Healthy
        } else {
            HealthState::Unhealthy
        };

        Self {
            last_fetch_time,
            error_count,
            monitored_cryptos,
            status,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HealthState::Healthy
    }
}
