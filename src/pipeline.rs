//! Refresh pipeline
//!
//! fetch → transform → validate → assess → commit. Shared by the refresh
//! route and the poller so both update the cache the same way.

use std::sync::Arc;

use crate::cache::MarketCache;
use crate::ingestion::{IngestError, MarketDataSource};
use crate::transform::Transformer;
use crate::types::TransformedBatch;

/// Why a refresh left the cache untouched
#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    #[error("failed to fetch market data: {0}")]
    Fetch(#[from] IngestError),
    #[error("failed to serialize transformed batch: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("transformed batch is missing required keys")]
    Invalid,
}

/// Runs one refresh cycle against a shared cache
#[derive(Clone)]
pub struct Refresher {
    source: Arc<dyn MarketDataSource>,
    transformer: Arc<Transformer>,
    cache: Arc<MarketCache>,
}

impl Refresher {
    pub fn new(
        source: Arc<dyn MarketDataSource>,
        transformer: Arc<Transformer>,
        cache: Arc<MarketCache>,
    ) -> Self {
        Self {
            source,
            transformer,
            cache,
        }
    }

    pub fn source(&self) -> &Arc<dyn MarketDataSource> {
        &self.source
    }

    pub fn cache(&self) -> &Arc<MarketCache> {
        &self.cache
    }

    /// Run one cycle. On failure the cache error count is bumped.
    pub async fn refresh(&self) -> Result<TransformedBatch, RefreshError> {
        match self.run().await {
            Ok(batch) => Ok(batch),
            Err(e) => {
                let error_count = self.cache.record_error().await;
                tracing::error!(error = %e, error_count, "Refresh failed");
                Err(e)
            }
        }
    }

    async fn run(&self) -> Result<TransformedBatch, RefreshError> {
        let raw = self.source.fetch().await?;
        let batch = self.transformer.transform(Some(&raw));

        let value = serde_json::to_value(&batch)?;
        if !Transformer::validate(&value) {
            return Err(RefreshError::Invalid);
        }

        let committed = self
            .cache
            .commit_with(batch.clone(), |previous| {
                self.transformer.assess(&batch, previous)
            })
            .await;
        let Some((update_count, alerts)) = committed else {
            tracing::warn!(
                timestamp = %batch.timestamp,
                "Discarded batch older than the cached one"
            );
            return Ok(batch);
        };

        for alert in &alerts {
            tracing::warn!(alert = %alert, "Data quality alert");
        }
        tracing::info!(
            valid = batch.summary.valid_count,
            total = batch.summary.total_count,
            score = batch.summary.data_quality_score,
            update_count,
            "Data refreshed successfully"
        );

        Ok(batch)
    }
}
