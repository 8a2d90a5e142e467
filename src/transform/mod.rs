//! Transform module - raw snapshot normalization
//!
//! Converts one raw snapshot into the stable batch schema and scores it.
//! Failures are absorbed at two levels:
//! - per asset: the asset becomes a null tally with a reason code
//! - per batch: a malformed top-level structure yields the empty batch, never
//!   a partial one

pub mod quality;

pub use quality::{assess, quality_score, QualityAlert, QualityThresholds};

use serde_json::{Map, Value};

use crate::types::{
    now_iso, round2, InvalidAsset, NormalizedRecord, NullTally, RawSnapshot, SnapshotMetadata,
    Summary, TransformedBatch, METADATA_KEY,
};

/// Top-level keys every accepted batch must carry
pub const REQUIRED_BATCH_KEYS: [&str; 3] = ["timestamp", "cryptos", "summary"];

/// Batch-level failure. Callers only ever see the empty batch that replaces it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransformError {
    #[error("malformed batch: {0}")]
    MalformedBatch(String),
}

/// Normalizes snapshots and scores their quality
#[derive(Debug, Clone, Default)]
pub struct Transformer {
    thresholds: QualityThresholds,
}

impl Transformer {
    pub fn new(thresholds: QualityThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &QualityThresholds {
        &self.thresholds
    }

    /// Transform a snapshot. Absent input or missing metadata yields the
    /// empty batch.
    pub fn transform(&self, raw: Option<&RawSnapshot>) -> TransformedBatch {
        let Some(raw) = raw else {
            tracing::warn!("Invalid or missing raw data");
            return TransformedBatch::empty();
        };
        let Some(metadata) = raw.metadata() else {
            tracing::warn!("Raw data carries no metadata");
            return TransformedBatch::empty();
        };

        self.transform_snapshot(raw, metadata)
    }

    /// Transform an untyped JSON candidate, metadata under `_metadata`.
    pub fn transform_value(&self, raw: Option<&Value>) -> TransformedBatch {
        let Some(map) = raw.and_then(Value::as_object) else {
            tracing::warn!("Invalid or missing raw data");
            return TransformedBatch::empty();
        };
        let Some(meta) = map.get(METADATA_KEY) else {
            tracing::warn!("Raw data carries no metadata");
            return TransformedBatch::empty();
        };

        match parse_metadata(meta) {
            Ok(metadata) => {
                let snapshot = RawSnapshot::new(map.clone(), Some(metadata));
                self.transform(Some(&snapshot))
            }
            Err(e) => {
                tracing::error!(error = %e, "Error transforming data");
                TransformedBatch::empty()
            }
        }
    }

    fn transform_snapshot(
        &self,
        raw: &RawSnapshot,
        metadata: &SnapshotMetadata,
    ) -> TransformedBatch {
        let mut cryptos = Vec::with_capacity(raw.len());
        let mut summary = Summary::default();

        for (id, record) in raw.quotes() {
            match transform_asset(id, record) {
                Ok(normalized) => {
                    cryptos.push(normalized);
                    summary.valid_count += 1;
                }
                Err(reason) => {
                    tracing::warn!(asset = %id, reason = %reason, "Failed to transform asset");
                    summary.null_count += 1;
                    summary.errors.push(NullTally {
                        id: id.clone(),
                        reason,
                    });
                }
            }
            summary.total_count += 1;
        }

        summary.data_quality_score = quality_score(summary.valid_count, summary.total_count);

        tracing::debug!(
            total = summary.total_count,
            valid = summary.valid_count,
            null = summary.null_count,
            score = summary.data_quality_score,
            "Transformed batch"
        );

        TransformedBatch {
            timestamp: metadata.timestamp.clone(),
            source: metadata.source.clone(),
            cryptos,
            summary,
        }
    }

    /// Quality alerts for `batch`, compared with the batch it replaces
    pub fn assess(
        &self,
        batch: &TransformedBatch,
        previous: Option<&TransformedBatch>,
    ) -> Vec<QualityAlert> {
        assess(batch, previous, &self.thresholds)
    }

    /// Structural check: true iff all of `timestamp`, `cryptos` and `summary`
    /// are present. Their contents are not inspected.
    pub fn validate(batch: &Value) -> bool {
        batch
            .as_object()
            .is_some_and(|map| REQUIRED_BATCH_KEYS.iter().all(|key| map.contains_key(*key)))
    }
}

/// Normalize one asset record
pub fn transform_asset(id: &str, record: &Value) -> Result<NormalizedRecord, InvalidAsset> {
    let record = record.as_object().ok_or(InvalidAsset::MalformedRecord)?;
    let price = record.get("usd").ok_or(InvalidAsset::MissingPrice)?;
    let price = price.as_f64().ok_or(InvalidAsset::NonNumericPrice)?;

    Ok(NormalizedRecord {
        id: id.to_lowercase(),
        display_name: display_name(id),
        price_usd: round2(price),
        market_cap_usd: optional_number(record, "usd_market_cap"),
        volume_24h_usd: optional_number(record, "usd_24h_vol"),
        change_24h_percent: optional_number(record, "usd_24h_change"),
        transformed_at: now_iso(),
    })
}

fn optional_number(record: &Map<String, Value>, key: &str) -> Option<f64> {
    record.get(key).and_then(Value::as_f64)
}

/// Underscores become spaces, then each word is title-cased. A word starts
/// after any non-letter character.
pub fn display_name(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    let mut prev_letter = false;

    for ch in id.chars() {
        let ch = if ch == '_' { ' ' } else { ch };
        if ch.is_alphabetic() {
            if prev_letter {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            prev_letter = true;
        } else {
            out.push(ch);
            prev_letter = false;
        }
    }

    out
}

fn parse_metadata(meta: &Value) -> Result<SnapshotMetadata, TransformError> {
    let meta = meta
        .as_object()
        .ok_or_else(|| TransformError::MalformedBatch("metadata is not an object".to_string()))?;

    let field = |key: &str| -> Result<String, TransformError> {
        meta.get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| TransformError::MalformedBatch(format!("metadata {key} is missing")))
    };

    Ok(SnapshotMetadata {
        timestamp: field("timestamp")?,
        source: field("source")?,
        status: meta
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string(),
    })
}
