//! TTL feature cache in front of a persistent feature store.
//!
//! Lookups go cache, then backend, then extraction. Backend failures are
//! logged and treated as misses so a broken store never blocks scoring.
//! Empty maps are never cached: "no data yet" must not stick for a full TTL.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, warn};

use vouch_core::traits::FeatureKvStore;
use vouch_core::types::{ActivityWindow, StoredFeatures, WalletFeatures};

use crate::extractor::FeatureExtractor;

/// Where a feature map returned by [`FeatureStore::get_or_extract`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureSource {
    Cache,
    Extracted,
}

type CacheKey = (String, String);

pub struct FeatureStore {
    cache: DashMap<CacheKey, StoredFeatures>,
    backend: Option<Arc<dyn FeatureKvStore>>,
    ttl_secs: u64,
}

impl FeatureStore {
    /// Cache with an optional persistent backend.
    pub fn new(backend: Option<Arc<dyn FeatureKvStore>>, ttl_secs: u64) -> Self {
        Self {
            cache: DashMap::new(),
            backend,
            ttl_secs,
        }
    }

    /// In-process cache only.
    pub fn in_memory(ttl_secs: u64) -> Self {
        Self::new(None, ttl_secs)
    }

    fn is_fresh(&self, stored: &StoredFeatures, now: i64) -> bool {
        now.saturating_sub(stored.extracted_at) < self.ttl_secs as i64
    }

    /// Unexpired features for `(address, version)` as of `now`.
    pub fn get(&self, address: &str, version: &str, now: i64) -> Option<WalletFeatures> {
        let key = (address.to_string(), version.to_string());
        if let Some(entry) = self.cache.get(&key) {
            if self.is_fresh(entry.value(), now) {
                return Some(entry.features.clone());
            }
        }

        let backend = self.backend.as_ref()?;
        match backend.get_features(address, version) {
            Ok(Some(stored)) if self.is_fresh(&stored, now) && !stored.features.is_empty() => {
                let features = stored.features.clone();
                self.cache.insert(key, stored);
                Some(features)
            }
            Ok(_) => None,
            Err(e) => {
                warn!(%address, version, "features: backend read failed: {e}");
                None
            }
        }
    }

    /// Record `features` as extracted at `now`. Empty maps are ignored.
    pub fn put(&self, address: &str, version: &str, features: &WalletFeatures, now: i64) {
        if features.is_empty() {
            return;
        }
        let stored = StoredFeatures {
            features: features.clone(),
            extracted_at: now,
        };
        if let Some(backend) = &self.backend {
            if let Err(e) = backend.put_features(address, version, &stored) {
                warn!(%address, version, "features: backend write failed: {e}");
            }
        }
        self.cache
            .insert((address.to_string(), version.to_string()), stored);
    }

    /// Cached features if fresh, otherwise extract, store and return them.
    pub async fn get_or_extract(
        &self,
        extractor: &FeatureExtractor,
        address: &str,
        version: &str,
        window: ActivityWindow,
        now: i64,
    ) -> (WalletFeatures, FeatureSource) {
        if let Some(features) = self.get(address, version, now) {
            debug!(%address, version, "features: cache hit");
            return (features, FeatureSource::Cache);
        }
        let features = extractor.extract(address, window).await;
        self.put(address, version, &features, now);
        (features, FeatureSource::Extracted)
    }

    /// Extract regardless of what is cached and replace the entry.
    pub async fn refresh(
        &self,
        extractor: &FeatureExtractor,
        address: &str,
        version: &str,
        window: ActivityWindow,
        now: i64,
    ) -> WalletFeatures {
        let features = extractor.extract(address, window).await;
        self.put(address, version, &features, now);
        features
    }

    /// Drop expired entries from the in-process cache. Returns how many went.
    pub fn evict_expired(&self, now: i64) -> usize {
        let before = self.cache.len();
        self.cache.retain(|_, stored| self.is_fresh(stored, now));
        before - self.cache.len()
    }

    /// Number of entries in the in-process cache.
    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }
}
