//! Last-known-good market data with a two-tier fallback.
//!
//! Live fetch → cached rows younger than the TTL → static sample rows.

use super::fallback::fallback_snapshots;
use super::MarketSnapshot;
use crate::exchange::MarketDataSource;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Default time-to-live of the last-known-good rows.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(10 * 60);

/// Where a set of rows came from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DataOrigin {
    Live,
    Cached { age: Duration },
    Fallback,
}

impl DataOrigin {
    pub fn is_live(&self) -> bool {
        matches!(self, DataOrigin::Live)
    }
}

/// Rows for one evaluation cycle plus their provenance.
#[derive(Debug, Clone)]
pub struct MarketView {
    pub rows: Vec<MarketSnapshot>,
    pub origin: DataOrigin,
    /// Upstream error that forced a degraded origin
    pub error: Option<String>,
}

#[derive(Debug)]
struct CachedRows {
    rows: Vec<MarketSnapshot>,
    fetched_at: Instant,
}

/// Market data provider owned by the scheduler.
pub struct MarketDataCache {
    source: Arc<dyn MarketDataSource>,
    ttl: Duration,
    last_good: RwLock<Option<CachedRows>>,
}

impl MarketDataCache {
    pub fn new(source: Arc<dyn MarketDataSource>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            last_good: RwLock::new(None),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fetch fresh rows, degrading to the cache and then to sample rows.
    ///
    /// Never fails: an upstream error is reported in [`MarketView::error`].
    pub async fn snapshots(&self) -> MarketView {
        match self.source.fetch_snapshots().await {
            Ok(rows) => {
                debug!(count = rows.len(), "Fetched live market snapshots");
                *self.last_good.write().await = Some(CachedRows {
                    rows: rows.clone(),
                    fetched_at: Instant::now(),
                });
                MarketView {
                    rows,
                    origin: DataOrigin::Live,
                    error: None,
                }
            }
            Err(e) => {
                let reason = format!("{:#}", e);
                let cached = self.last_good.read().await;

                if let Some(entry) = cached.as_ref() {
                    let age = entry.fetched_at.elapsed();
                    if age <= self.ttl {
                        warn!(
                            error = %reason,
                            age_secs = age.as_secs(),
                            "Market data fetch failed, serving cached rows"
                        );
                        return MarketView {
                            rows: entry.rows.clone(),
                            origin: DataOrigin::Cached { age },
                            error: Some(reason),
                        };
                    }
                }

                warn!(error = %reason, "Market data fetch failed, serving sample rows");
                MarketView {
                    rows: fallback_snapshots(),
                    origin: DataOrigin::Fallback,
                    error: Some(reason),
                }
            }
        }
    }

    /// Mark price for `base` from the last live rows, if they are within the TTL.
    ///
    /// Does not fetch and never reads the sample rows.
    pub async fn mark_price(&self, base: &str) -> Option<f64> {
        let cached = self.last_good.read().await;
        let entry = cached.as_ref()?;
        if entry.fetched_at.elapsed() > self.ttl {
            return None;
        }
        entry
            .rows
            .iter()
            .find(|row| row.base.eq_ignore_ascii_case(base))
            .map(|row| row.mark_price)
            .filter(|price| price.is_finite() && *price > 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::FundingInterval;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FlakySource {
        failing: AtomicBool,
    }

    #[async_trait]
    impl MarketDataSource for FlakySource {
        async fn fetch_snapshots(&self) -> Result<Vec<MarketSnapshot>> {
            if self.failing.load(Ordering::SeqCst) {
                Err(anyhow!("upstream 502"))
            } else {
                Ok(vec![MarketSnapshot::new("HYPE", 0.0001, FundingInterval::Hourly)
                    .with_prices(25.0, Some(25.0))])
            }
        }
    }

    fn cache_with(failing: bool) -> (Arc<FlakySource>, MarketDataCache) {
        let source = Arc::new(FlakySource {
            failing: AtomicBool::new(failing),
        });
        let cache = MarketDataCache::new(source.clone(), DEFAULT_CACHE_TTL);
        (source, cache)
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_then_cached_then_fallback() {
        let (source, cache) = cache_with(false);

        let view = cache.snapshots().await;
        assert!(view.origin.is_live());
        assert_eq!(view.rows[0].base, "HYPE");

        source.failing.store(true, Ordering::SeqCst);
        tokio::time::advance(Duration::from_secs(60)).await;

        let view = cache.snapshots().await;
        assert!(matches!(view.origin, DataOrigin::Cached { .. }));
        assert_eq!(view.rows[0].base, "HYPE");
        assert!(view.error.as_deref().unwrap().contains("upstream 502"));

        tokio::time::advance(DEFAULT_CACHE_TTL).await;

        let view = cache.snapshots().await;
        assert_eq!(view.origin, DataOrigin::Fallback);
        assert_eq!(view.rows.len(), 3);
    }

    #[tokio::test]
    async fn test_fallback_without_cache() {
        let (_source, cache) = cache_with(true);
        let view = cache.snapshots().await;
        assert_eq!(view.origin, DataOrigin::Fallback);
        assert!(view.error.is_some());
    }

    #[tokio::test]
    async fn test_mark_price_lookup() {
        let (_source, cache) = cache_with(false);
        // Nothing fetched yet
        assert_eq!(cache.mark_price("hype").await, None);

        cache.snapshots().await;
        assert_eq!(cache.mark_price("hype").await, Some(25.0));
        assert_eq!(cache.mark_price("DOGE").await, None);
    }

    #[tokio::test]
    async fn test_mark_price_ignores_sample_rows() {
        let (_source, cache) = cache_with(true);
        let view = cache.snapshots().await;
        assert_eq!(view.origin, DataOrigin::Fallback);
        assert!(view.rows.iter().any(|row| row.base == "ETH"));

        assert_eq!(cache.mark_price("ETH").await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mark_price_expires_with_ttl() {
        let (source, cache) = cache_with(false);
        cache.snapshots().await;
        source.failing.store(true, Ordering::SeqCst);

        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(cache.mark_price("HYPE").await, Some(25.0));

        tokio::time::advance(DEFAULT_CACHE_TTL).await;
        assert_eq!(cache.mark_price("HYPE").await, None);
    }
}
