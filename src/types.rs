//! Core types used throughout CoinPulse
//!
//! Defines the raw upstream snapshot, the normalized records derived from it
//! and the batch structure served by the HTTP API.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Source label attached to every snapshot and batch
pub const SOURCE_NAME: &str = "CoinGecko";

/// Reserved key carrying snapshot metadata in the JSON form of a snapshot
pub const METADATA_KEY: &str = "_metadata";

/// Format a UTC instant as ISO-8601 with microsecond precision.
pub fn iso_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Current UTC time as ISO-8601.
pub fn now_iso() -> String {
    iso_timestamp(Utc::now())
}

/// Round to 2 decimal places, exact ties to even. Values too large to scale
/// are returned unchanged.
pub fn round2(value: f64) -> f64 {
    let scaled = value * 100.0;
    if !scaled.is_finite() {
        return value;
    }
    scaled.round_ties_even() / 100.0
}

// ─────────────────────────────────────────────────────────────────
// Raw snapshot
// ─────────────────────────────────────────────────────────────────

/// Metadata stamped on a snapshot by the ingester
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub timestamp: String,
    pub source: String,
    pub status: String,
}

impl SnapshotMetadata {
    /// Metadata for a snapshot fetched successfully right now
    pub fn success_now() -> Self {
        Self {
            timestamp: now_iso(),
            source: SOURCE_NAME.to_string(),
            status: "success".to_string(),
        }
    }
}

/// One fetched upstream response covering all tracked assets.
///
/// Quotes keep the upstream key order. Each quote is kept as raw JSON so that
/// per-asset validation can tell a missing price from a non-numeric one.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSnapshot {
    quotes: Map<String, Value>,
    metadata: Option<SnapshotMetadata>,
}

impl RawSnapshot {
    /// Build a snapshot. A stray `_metadata` entry in `quotes` is dropped.
    pub fn new(mut quotes: Map<String, Value>, metadata: Option<SnapshotMetadata>) -> Self {
        quotes.remove(METADATA_KEY);
        Self { quotes, metadata }
    }

    pub fn metadata(&self) -> Option<&SnapshotMetadata> {
        self.metadata.as_ref()
    }

    /// Asset quotes in upstream order, metadata excluded
    pub fn quotes(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.quotes.iter()
    }

    pub fn quote(&self, id: &str) -> Option<&Value> {
        self.quotes.get(id)
    }

    /// Number of asset entries, metadata excluded
    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }

    /// JSON form with metadata under the reserved `_metadata` key
    pub fn to_value(&self) -> Value {
        let mut map = self.quotes.clone();
        if let Some(metadata) = &self.metadata {
            if let Ok(meta) = serde_json::to_value(metadata) {
                map.insert(METADATA_KEY.to_string(), meta);
            }
        }
        Value::Object(map)
    }
}

// ─────────────────────────────────────────────────────────────────
// Normalized output
// ─────────────────────────────────────────────────────────────────

/// Stable internal schema for one asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub id: String,
    pub display_name: String,
    pub price_usd: f64,
    pub market_cap_usd: Option<f64>,
    pub volume_24h_usd: Option<f64>,
    pub change_24h_percent: Option<f64>,
    pub transformed_at: String,
}

/// Why an asset produced no normalized record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum InvalidAsset {
    #[error("usd price field is missing")]
    MissingPrice,
    #[error("usd price field is not numeric")]
    NonNumericPrice,
    #[error("asset record is not an object")]
    MalformedRecord,
}

/// A null tally with the reason the asset was rejected
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NullTally {
    pub id: String,
    pub reason: InvalidAsset,
}

/// Per-batch counts and quality score.
///
/// `total_count == valid_count + null_count` and `errors.len() == null_count`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Summary {
    pub total_count: u64,
    pub valid_count: u64,
    pub null_count: u64,
    pub errors: Vec<NullTally>,
    pub data_quality_score: f64,
}

impl Summary {
    /// Percentage of assets that produced no record
    pub fn null_percentage(&self) -> f64 {
        if self.total_count == 0 {
            return 0.0;
        }
        self.null_count as f64 / self.total_count as f64 * 100.0
    }
}

/// Normalized result of one transform call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformedBatch {
    pub timestamp: String,
    pub source: String,
    pub cryptos: Vec<NormalizedRecord>,
    pub summary: Summary,
}

impl TransformedBatch {
    /// Empty batch returned on degraded input
    pub fn empty() -> Self {
        Self {
            timestamp: now_iso(),
            source: SOURCE_NAME.to_string(),
            cryptos: Vec::new(),
            summary: Summary::default(),
        }
    }

    pub fn record(&self, id: &str) -> Option<&NormalizedRecord> {
        self.cryptos.iter().find(|record| record.id == id)
    }
}

/// Overall health of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthState::Healthy => write!(f, "healthy"),
            HealthState::Degraded => write!(f, "degraded"),
            HealthState::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn round2_truncates_extra_precision() {
        assert_eq!(round2(0.123456), 0.12);
        assert_eq!(round2(45000.0), 45000.0);
        assert_eq!(round2(2.345678), 2.35);
    }

    #[test]
    fn round2_breaks_exact_ties_to_even() {
        assert_eq!(round2(0.125), 0.12);
        assert_eq!(round2(0.375), 0.38);
        assert_eq!(round2(45000.125), 45000.12);
        assert_eq!(round2(-0.125), -0.12);
    }

    #[test]
    fn round2_keeps_huge_values_finite() {
        assert_eq!(round2(1e307), 1e307);
        assert_eq!(round2(-1e307), -1e307);
        assert!(round2(f64::MAX).is_finite());
    }

    #[test]
    fn snapshot_drops_stray_metadata_quote() {
        let quotes = json!({
            "bitcoin": {"usd": 1.0},
            "_metadata": {"timestamp": "t", "source": "s", "status": "x"}
        });
        let Value::Object(map) = quotes else {
            panic!("expected object");
        };

        let snapshot = RawSnapshot::new(map, None);

        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.quote(METADATA_KEY).is_none());
    }

    #[test]
    fn snapshot_json_form_carries_metadata_last() {
        let mut quotes = Map::new();
        quotes.insert("ethereum".to_string(), json!({"usd": 2500}));
        quotes.insert("bitcoin".to_string(), json!({"usd": 45000}));
        let snapshot = RawSnapshot::new(quotes, Some(SnapshotMetadata::success_now()));

        let value = snapshot.to_value();
        let keys: Vec<&String> = value.as_object().unwrap().keys().collect();

        assert_eq!(keys, vec!["ethereum", "bitcoin", METADATA_KEY]);
        assert_eq!(value[METADATA_KEY]["source"], SOURCE_NAME);
        assert_eq!(value[METADATA_KEY]["status"], "success");
    }

    #[test]
    fn null_percentage_guards_empty_summary() {
        assert_eq!(Summary::default().null_percentage(), 0.0);

        let summary = Summary {
            total_count: 4,
            valid_count: 3,
            null_count: 1,
            ..Summary::default()
        };
        assert_eq!(summary.null_percentage(), 25.0);
    }

    #[test]
    fn invalid_asset_serializes_as_reason_code() {
        let tally = NullTally {
            id: "cardano".to_string(),
            reason: InvalidAsset::NonNumericPrice,
        };
        let value = serde_json::to_value(&tally).unwrap();
        assert_eq!(value["reason"], "non_numeric_price");
    }
}
