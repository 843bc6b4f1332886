//! Feature extraction from an activity feed.

use std::sync::Arc;

use tracing::{debug, warn};

use vouch_core::error::FeedError;
use vouch_core::traits::ActivityFeed;
use vouch_core::types::{ActivityRecord, ActivityWindow, FeatureMap, WalletFeatures};

use crate::groups::{ExtractionContext, SUB_EXTRACTORS};

/// Fetches activity and derives features for one wallet.
pub struct FeatureExtractor {
    feed: Arc<dyn ActivityFeed>,
}

impl FeatureExtractor {
    pub fn new(feed: Arc<dyn ActivityFeed>) -> Self {
        Self { feed }
    }

    /// Extract features for `address` over `window`.
    ///
    /// A feed failure yields an empty map; the caller treats that as "no
    /// data", which is not an error.
    pub async fn extract(&self, address: &str, window: ActivityWindow) -> WalletFeatures {
        match self.try_extract(address, window).await {
            Ok(features) => features,
            Err(e) => {
                warn!(%address, "features: activity feed failed: {e}");
                WalletFeatures::empty()
            }
        }
    }

    /// Like [`extract`](Self::extract) but surfaces feed errors.
    pub async fn try_extract(
        &self,
        address: &str,
        window: ActivityWindow,
    ) -> Result<WalletFeatures, FeedError> {
        let records = self.feed.get_activity(address, window).await?;
        Ok(extract_from_records(address, &records, window))
    }
}

/// Derive the feature map for `address` from raw records.
///
/// Records outside `window` are ignored. The result depends only on the
/// multiset of records and the window, never on input order or the clock.
/// No records in the window produces an empty map.
pub fn extract_from_records(
    address: &str,
    records: &[ActivityRecord],
    window: ActivityWindow,
) -> WalletFeatures {
    let mut in_window: Vec<&ActivityRecord> =
        records.iter().filter(|r| window.contains(r.timestamp)).collect();
    if in_window.is_empty() {
        return WalletFeatures::empty();
    }
    in_window.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.hash.cmp(&b.hash)));

    let ctx = ExtractionContext {
        address,
        records: in_window,
        window,
    };

    let mut merged = FeatureMap::new();
    for (group, extract) in SUB_EXTRACTORS {
        match extract(&ctx) {
            Ok(map) => merged.extend(map),
            Err(e) => warn!(%address, group, "features: sub-extractor failed: {e}"),
        }
    }
    debug!(%address, records = ctx.records.len(), features = merged.len(), "features: extracted");
    WalletFeatures::new(merged)
}
