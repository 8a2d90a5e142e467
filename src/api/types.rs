//! API Types
//!
//! DTOs returned by the HTTP endpoints.

use serde::{Deserialize, Serialize};

use crate::cache::{CacheSnapshot, CacheStats};
use crate::ingestion::IngesterStatus;
use crate::transform::QualityAlert;
use crate::types::{HealthState, TransformedBatch};

/// Message returned when the refresh fetch fails
pub const FETCH_FAILED_MESSAGE: &str = "Failed to fetch market data from CoinGecko";

/// GET /api/data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataResponse {
    pub data: Option<TransformedBatch>,
    pub last_update: Option<String>,
    pub stats: CacheStats,
}

impl From<CacheSnapshot> for DataResponse {
    fn from(snapshot: CacheSnapshot) -> Self {
        let stats = snapshot.stats();
        Self {
            data: snapshot.latest_data,
            last_update: snapshot.last_update,
            stats,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshStatus {
    Success,
    Error,
}

/// GET /api/refresh
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshResponse {
    pub status: RefreshStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<TransformedBatch>,
}

impl RefreshResponse {
    pub fn success(batch: TransformedBatch) -> Self {
        Self {
            status: RefreshStatus::Success,
            message: format!("Fetched {} cryptocurrencies", batch.summary.valid_count),
            data: Some(batch),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: RefreshStatus::Error,
            message: message.into(),
            data: None,
        }
    }
}

/// Cache section of the health report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheHealth {
    pub has_data: bool,
    pub last_update: Option<String>,
    pub update_count: u64,
    pub error_count: u64,
    pub quality_alerts: Vec<QualityAlert>,
}

impl From<CacheSnapshot> for CacheHealth {
    fn from(snapshot: CacheSnapshot) -> Self {
        Self {
            has_data: snapshot.has_data(),
            last_update: snapshot.last_update,
            update_count: snapshot.update_count,
            error_count: snapshot.error_count,
            quality_alerts: snapshot.quality_alerts,
        }
    }
}

/// GET /api/health
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthState,
    pub timestamp: String,
    pub ingester: IngesterStatus,
    pub cache: CacheHealth,
}

/// Body of 404 and 500 responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
