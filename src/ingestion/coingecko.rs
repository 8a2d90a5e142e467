//! CoinGecko simple price client
//!
//! One GET to `/simple/price` per fetch, covering every tracked asset.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::config::IngestionConfig;
use crate::ingestion::{IngestError, IngesterStatus, MarketDataSource};
use crate::types::{iso_timestamp, RawSnapshot, SnapshotMetadata, SOURCE_NAME};

#[derive(Debug, Default)]
struct FetchState {
    last_fetch_time: Option<DateTime<Utc>>,
    error_count: u32,
}

/// CoinGecko-backed market data source
#[derive(Debug)]
pub struct CoinGeckoIngester {
    client: reqwest::Client,
    endpoint: String,
    assets: Vec<String>,
    state: Mutex<FetchState>,
}

impl CoinGeckoIngester {
    pub fn new(api_url: &str, assets: Vec<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            endpoint: format!("{}/simple/price", api_url.trim_end_matches('/')),
            assets,
            state: Mutex::new(FetchState::default()),
        })
    }

    pub fn from_config(config: &IngestionConfig) -> Result<Self> {
        Self::new(
            &config.api_url,
            config.assets.clone(),
            config.request_timeout(),
        )
    }

    /// Tracked asset identifiers, in request order
    pub fn assets(&self) -> &[String] {
        &self.assets
    }

    fn query_params(&self) -> [(&'static str, String); 5] {
        [
            ("ids", self.assets.join(",")),
            ("vs_currencies", "usd".to_string()),
            ("include_market_cap", "true".to_string()),
            ("include_24hr_vol", "true".to_string()),
            ("include_24hr_change", "true".to_string()),
        ]
    }

    async fn request(&self) -> Result<RawSnapshot, IngestError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&self.query_params())
            .header("accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(IngestError::RateLimited);
        }
        if !status.is_success() {
            return Err(IngestError::Status {
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await?;
        let value: Value =
            serde_json::from_slice(&body).map_err(|e| IngestError::Decode(e.to_string()))?;

        // Parse like: { "bitcoin": {"usd": 45000.0, "usd_market_cap": ...}, ... }
        match value {
            Value::Object(quotes) => Ok(RawSnapshot::new(
                quotes,
                Some(SnapshotMetadata::success_now()),
            )),
            other => Err(IngestError::Decode(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }
}

#[async_trait]
impl MarketDataSource for CoinGeckoIngester {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    async fn fetch(&self) -> Result<RawSnapshot, IngestError> {
        let result = self.request().await;
        let mut state = self.state.lock().await;

        match result {
            Ok(snapshot) => {
                state.error_count = 0;
                state.last_fetch_time = Some(Utc::now());
                tracing::info!(
                    source = %SOURCE_NAME,
                    assets = snapshot.len(),
                    "Fetched market data"
                );
                Ok(snapshot)
            }
            Err(err) => {
                state.error_count = state.error_count.saturating_add(1);
                if err.is_rate_limited() {
                    tracing::warn!(
                        source = %SOURCE_NAME,
                        error_count = state.error_count,
                        "Rate limit reached (429). Backing off until the next cycle"
                    );
                } else {
                    tracing::error!(
                        source = %SOURCE_NAME,
                        error = %err,
                        error_count = state.error_count,
                        "Failed to fetch market data"
                    );
                }
                Err(err)
            }
        }
    }

    async fn status(&self) -> IngesterStatus {
        let state = self.state.lock().await;
        IngesterStatus::new(
            state.last_fetch_time.map(iso_timestamp),
            state.error_count,
            self.assets.len(),
        )
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
