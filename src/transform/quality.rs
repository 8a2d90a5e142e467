//! Batch quality checks
//!
//! Alerts never reject a batch; they are logged and kept next to it in the
//! cache.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::QualityConfig;
use crate::types::{round2, TransformedBatch};

/// Percentage of valid records, rounded to 2dp. 0.0 for an empty batch.
pub fn quality_score(valid_count: u64, total_count: u64) -> f64 {
    if total_count == 0 {
        return 0.0;
    }
    round2(valid_count as f64 / total_count as f64 * 100.0)
}

/// Alert thresholds, in percent
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityThresholds {
    pub max_null_percentage: f64,
    pub max_price_change_percentage: f64,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            max_null_percentage: 10.0,
            max_price_change_percentage: 20.0,
        }
    }
}

impl From<&QualityConfig> for QualityThresholds {
    fn from(config: &QualityConfig) -> Self {
        Self {
            max_null_percentage: config.max_null_percentage,
            max_price_change_percentage: config.max_price_change_percentage,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QualityAlert {
    /// Too many assets in the batch produced no record
    HighNullRate {
        null_percentage: f64,
        threshold: f64,
    },
    /// An asset moved more than allowed since the previous batch
    PriceJump {
        id: String,
        previous_price: f64,
        current_price: f64,
        change_percentage: f64,
        threshold: f64,
    },
}

impl fmt::Display for QualityAlert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QualityAlert::HighNullRate {
                null_percentage,
                threshold,
            } => write!(
                f,
                "{null_percentage:.2}% of assets are null (threshold {threshold:.2}%)"
            ),
            QualityAlert::PriceJump {
                id,
                previous_price,
                current_price,
                change_percentage,
                threshold,
            } => write!(
                f,
                "{id} moved {change_percentage:.2}% ({previous_price} -> {current_price}, threshold {threshold:.2}%)"
            ),
        }
    }
}

/// Check `batch` against the thresholds and, when given, the batch it replaces
pub fn assess(
    batch: &TransformedBatch,
    previous: Option<&TransformedBatch>,
    thresholds: &QualityThresholds,
) -> Vec<QualityAlert> {
    let mut alerts = Vec::new();

    let null_percentage = batch.summary.null_percentage();
    if batch.summary.total_count > 0 && null_percentage > thresholds.max_null_percentage {
        alerts.push(QualityAlert::HighNullRate {
            null_percentage: round2(null_percentage),
            threshold: thresholds.max_null_percentage,
        });
    }

    let Some(previous) = previous else {
        return alerts;
    };

    for record in &batch.cryptos {
        let Some(before) = previous.record(&record.id) else {
            continue;
        };
        if before.price_usd <= 0.0 {
            continue;
        }

        let change = (record.price_usd - before.price_usd) / before.price_usd * 100.0;
        if change.abs() > thresholds.max_price_change_percentage {
            alerts.push(QualityAlert::PriceJump {
                id: record.id.clone(),
                previous_price: before.price_usd,
                current_price: record.price_usd,
                change_percentage: round2(change),
                threshold: thresholds.max_price_change_percentage,
            });
        }
    }

    alerts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NormalizedRecord, Summary};

    fn record(id: &str, price: f64) -> NormalizedRecord {
        NormalizedRecord {
            id: id.to_string(),
            display_name: id.to_string(),
            price_usd: price,
            market_cap_usd: None,
            volume_24h_usd: None,
            change_24h_percent: None,
            transformed_at: "2024-01-01T00:00:00.000000Z".to_string(),
        }
    }

    fn batch(records: Vec<NormalizedRecord>, null_count: u64) -> TransformedBatch {
        let valid_count = records.len() as u64;
        let total_count = valid_count + null_count;
        TransformedBatch {
            timestamp: "2024-01-01T00:00:00.000000Z".to_string(),
            source: "CoinGecko".to_string(),
            cryptos: records,
            summary: Summary {
                total_count,
                valid_count,
                null_count,
                errors: Vec::new(),
                data_quality_score: quality_score(valid_count, total_count),
            },
        }
    }

    #[test]
    fn score_handles_empty_and_partial_batches() {
        assert_eq!(quality_score(0, 0), 0.0);
        assert_eq!(quality_score(2, 2), 100.0);
        assert_eq!(quality_score(1, 2), 50.0);
        assert_eq!(quality_score(4, 5), 80.0);
        assert_eq!(quality_score(1, 3), 33.33);
        assert_eq!(quality_score(2, 3), 66.67);
    }

    #[test]
    fn score_ties_round_to_even() {
        assert_eq!(quality_score(1, 32), 3.12);
        assert_eq!(quality_score(3, 32), 9.38);
    }

    #[test]
    fn null_rate_above_threshold_alerts() {
        let current = batch(vec![record("bitcoin", 1.0)], 1);

        let alerts = assess(&current, None, &QualityThresholds::default());

        assert_eq!(
            alerts,
            vec![QualityAlert::HighNullRate {
                null_percentage: 50.0,
                threshold: 10.0
            }]
        );
    }

    #[test]
    fn empty_batch_raises_no_null_alert() {
        let current = batch(Vec::new(), 0);
        assert!(assess(&current, None, &QualityThresholds::default()).is_empty());
    }

    #[test]
    fn price_jump_against_previous_batch_alerts() {
        let previous = batch(vec![record("bitcoin", 100.0), record("ethereum", 10.0)], 0);
        let current = batch(vec![record("bitcoin", 130.0), record("ethereum", 11.0)], 0);

        let alerts = assess(&current, Some(&previous), &QualityThresholds::default());

        assert_eq!(alerts.len(), 1);
        match &alerts[0] {
            QualityAlert::PriceJump {
                id,
                change_percentage,
                ..
            } => {
                assert_eq!(id, "bitcoin");
                assert_eq!(*change_percentage, 30.0);
            }
            other => panic!("unexpected alert: {other:?}"),
        }
    }

    #[test]
    fn new_assets_are_not_compared() {
        let previous = batch(vec![record("bitcoin", 100.0)], 0);
        let current = batch(vec![record("bitcoin", 101.0), record("solana", 5.0)], 0);

        assert!(assess(&current, Some(&previous), &QualityThresholds::default()).is_empty());
    }

    #[test]
    fn alert_serializes_with_kind_tag() {
        let alert = QualityAlert::HighNullRate {
            null_percentage: 20.0,
            threshold: 10.0,
        };
        let value = serde_json::to_value(&alert).unwrap();
        assert_eq!(value["kind"], "high_null_rate");
        assert!(alert.to_string().contains("20.00%"));
    }
}
