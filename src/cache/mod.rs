//! In-memory market data cache
//!
//! Holds the latest accepted batch and the refresh counters. Every mutation
//! commits all of its fields under a single write guard, so readers never see
//! `last_update` advanced without the matching batch.

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::transform::QualityAlert;
use crate::types::{now_iso, TransformedBatch};

/// Success/error counters served under `/api/data`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CacheStats {
    pub update_count: u64,
    pub error_count: u64,
}

/// Consistent copy of the cache contents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CacheSnapshot {
    pub latest_data: Option<TransformedBatch>,
    pub last_update: Option<String>,
    pub update_count: u64,
    pub error_count: u64,
    pub quality_alerts: Vec<QualityAlert>,
}

impl CacheSnapshot {
    pub fn has_data(&self) -> bool {
        self.latest_data.is_some()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            update_count: self.update_count,
            error_count: self.error_count,
        }
    }
}

/// Process-wide cache, shared behind an `Arc`
#[derive(Debug, Default)]
pub struct MarketCache {
    state: RwLock<CacheSnapshot>,
}

impl MarketCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the cached batch wholesale. Returns the new update count.
    pub async fn commit(&self, batch: TransformedBatch, alerts: Vec<QualityAlert>) -> u64 {
        let mut state = self.state.write().await;
        state.latest_data = Some(batch);
        state.last_update = Some(now_iso());
        state.update_count = state.update_count.saturating_add(1);
        state.quality_alerts = alerts;
        state.update_count
    }

    /// Judge `batch` against the cached one and commit it under the same write
    /// guard. A batch stamped earlier than the cached one is discarded and
    /// `None` is returned.
    pub async fn commit_with<F>(
        &self,
        batch: TransformedBatch,
        assess: F,
    ) -> Option<(u64, Vec<QualityAlert>)>
    where
        F: FnOnce(Option<&TransformedBatch>) -> Vec<QualityAlert>,
    {
        let mut state = self.state.write().await;
        if state
            .latest_data
            .as_ref()
            .is_some_and(|previous| is_older(&batch, previous))
        {
            return None;
        }

        let alerts = assess(state.latest_data.as_ref());
        state.latest_data = Some(batch);
        state.last_update = Some(now_iso());
        state.update_count = state.update_count.saturating_add(1);
        state.quality_alerts = alerts.clone();
        Some((state.update_count, alerts))
    }

    /// Count a failed refresh. Returns the new error count.
    pub async fn record_error(&self) -> u64 {
        let mut state = self.state.write().await;
        state.error_count = state.error_count.saturating_add(1);
        state.error_count
    }

    pub async fn snapshot(&self) -> CacheSnapshot {
        self.state.read().await.clone()
    }

    pub async fn stats(&self) -> CacheStats {
        self.state.read().await.stats()
    }
}

/// Unparseable stamps never count as older
fn is_older(batch: &TransformedBatch, previous: &TransformedBatch) -> bool {
    match (
        DateTime::parse_from_rfc3339(&batch.timestamp),
        DateTime::parse_from_rfc3339(&previous.timestamp),
    ) {
        (Ok(new), Ok(old)) => new < old,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn new_cache_is_empty() {
        let cache = MarketCache::new();
        let snapshot = cache.snapshot().await;

        assert!(!snapshot.has_data());
        assert!(snapshot.last_update.is_none());
        assert_eq!(snapshot.stats(), CacheStats::default());
    }

    #[tokio::test]
    async fn commit_replaces_batch_and_stamps_update() {
        let cache = MarketCache::new();
        let first = TransformedBatch::empty();
        let mut second = TransformedBatch::empty();
        second.source = "second".to_string();

        assert_eq!(cache.commit(first, Vec::new()).await, 1);
        assert_eq!(cache.commit(second.clone(), Vec::new()).await, 2);

        let snapshot = cache.snapshot().await;
        assert_eq!(snapshot.latest_data, Some(second));
        assert!(snapshot.last_update.is_some());
        assert_eq!(snapshot.update_count, 2);
        assert_eq!(snapshot.error_count, 0);
    }

    #[tokio::test]
    async fn errors_do_not_touch_cached_batch() {
        let cache = MarketCache::new();
        cache.commit(TransformedBatch::empty(), Vec::new()).await;

        assert_eq!(cache.record_error().await, 1);
        assert_eq!(cache.record_error().await, 2);

        let snapshot = cache.snapshot().await;
        assert!(snapshot.has_data());
        assert_eq!(snapshot.stats(), CacheStats { update_count: 1, error_count: 2 });
    }

    fn stamped(timestamp: &str, source: &str) -> TransformedBatch {
        let mut batch = TransformedBatch::empty();
        batch.timestamp = timestamp.to_string();
        batch.source = source.to_string();
        batch
    }

    #[tokio::test]
    async fn commit_with_assesses_against_cached_batch() {
        let cache = MarketCache::new();
        let first = stamped("2024-01-01T00:00:00.000000Z", "first");

        let committed = cache
            .commit_with(first.clone(), |previous| {
                assert!(previous.is_none());
                Vec::new()
            })
            .await;
        assert_eq!(committed, Some((1, Vec::new())));

        let alert = QualityAlert::HighNullRate {
            null_percentage: 50.0,
            threshold: 10.0,
        };
        let second = stamped("2024-01-01T00:01:00.000000Z", "second");
        let committed = cache
            .commit_with(second.clone(), |previous| {
                assert_eq!(previous, Some(&first));
                vec![alert.clone()]
            })
            .await;

        assert_eq!(committed, Some((2, vec![alert.clone()])));
        let snapshot = cache.snapshot().await;
        assert_eq!(snapshot.latest_data, Some(second));
        assert_eq!(snapshot.quality_alerts, vec![alert]);
    }

    #[tokio::test]
    async fn commit_with_discards_batch_older_than_cached() {
        let cache = MarketCache::new();
        let newer = stamped("2024-01-01T00:01:00.000000Z", "newer");
        cache.commit_with(newer.clone(), |_| Vec::new()).await;

        let older = stamped("2024-01-01T00:00:00.000000Z", "older");
        let committed = cache
            .commit_with(older, |_| panic!("stale batch must not be assessed"))
            .await;

        assert!(committed.is_none());
        let snapshot = cache.snapshot().await;
        assert_eq!(snapshot.latest_data, Some(newer));
        assert_eq!(snapshot.update_count, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_assessments_each_see_the_previous_commit() {
        let cache = Arc::new(MarketCache::new());

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move {
                    cache
                        .commit_with(TransformedBatch::empty(), |previous| {
                            previous
                                .map(|_| QualityAlert::HighNullRate {
                                    null_percentage: 0.0,
                                    threshold: 0.0,
                                })
                                .into_iter()
                                .collect()
                        })
                        .await
                })
            })
            .collect();

        let mut first_commits = 0;
        for task in tasks {
            if let Some((_, alerts)) = task.await.unwrap() {
                if alerts.is_empty() {
                    first_commits += 1;
                }
            }
        }

        // Only the very first commit finds an empty cache
        assert_eq!(first_commits, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_commits_are_all_counted() {
        let cache = Arc::new(MarketCache::new());

        let tasks: Vec<_> = (0..32)
            .map(|i| {
                let cache = cache.clone();
                tokio::spawn(async move {
                    if i % 4 == 0 {
                        cache.record_error().await;
                    } else {
                        cache.commit(TransformedBatch::empty(), Vec::new()).await;
                    }
                    let snapshot = cache.snapshot().await;
                    // A visible update stamp always comes with its batch
                    assert_eq!(snapshot.last_update.is_some(), snapshot.has_data());
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(
            cache.stats().await,
            CacheStats { update_count: 24, error_count: 8 }
        );
    }
}
