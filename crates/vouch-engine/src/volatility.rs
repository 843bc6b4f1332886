//! Shared, TTL-bound cache of the reference asset's annualized volatility.
//!
//! One oracle fetch serves every address scored within the TTL. Concurrent
//! misses queue on a single fetch lock so a batch triggers one fetch, not
//! one per address. Failed fetches are not cached.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use vouch_core::constants::PERIODS_PER_YEAR_DAILY;
use vouch_core::error::OracleError;
use vouch_core::traits::PriceOracle;
use vouch_scoring::annualized_volatility;

#[derive(Debug, Clone, Copy, PartialEq)]
struct CachedVolatility {
    value: f64,
    fetched_at: i64,
}

pub struct VolatilityCache {
    oracle: Arc<dyn PriceOracle>,
    entries: DashMap<String, CachedVolatility>,
    fetch_lock: Mutex<()>,
    window: usize,
    ttl_secs: u64,
}

impl VolatilityCache {
    pub fn new(oracle: Arc<dyn PriceOracle>, window: usize, ttl_secs: u64) -> Self {
        Self {
            oracle,
            entries: DashMap::new(),
            fetch_lock: Mutex::new(()),
            window,
            ttl_secs,
        }
    }

    fn cached(&self, asset: &str, now: i64) -> Option<f64> {
        self.entries
            .get(asset)
            .filter(|e| now.saturating_sub(e.fetched_at) < self.ttl_secs as i64)
            .map(|e| e.value)
    }

    /// Annualized volatility of `asset`, or `None` when the oracle cannot
    /// supply enough history.
    pub async fn get(&self, asset: &str, now: i64) -> Option<f64> {
        if let Some(v) = self.cached(asset, now) {
            return Some(v);
        }
        let _fetching = self.fetch_lock.lock().await;
        if let Some(v) = self.cached(asset, now) {
            return Some(v);
        }

        match self.fetch(asset).await {
            Ok(value) => {
                debug!(asset, value, "volatility: refreshed");
                self.entries
                    .insert(asset.to_string(), CachedVolatility { value, fetched_at: now });
                Some(value)
            }
            Err(e) => {
                warn!(asset, "volatility: oracle unavailable, no penalty applied: {e}");
                None
            }
        }
    }

    async fn fetch(&self, asset: &str) -> Result<f64, OracleError> {
        let prices = self.oracle.price_history(asset, self.window).await?;
        annualized_volatility(&prices, PERIODS_PER_YEAR_DAILY).ok_or(
            OracleError::InsufficientHistory {
                have: prices.len(),
                need: 3,
            },
        )
    }

    /// Forget every cached value.
    pub fn invalidate(&self) {
        self.entries.clear();
    }
}
