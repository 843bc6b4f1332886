//! Trait interfaces for the collaborators the scoring pipeline consumes.
//!
//! Remote lookups are async (`async-trait`, so they stay object safe);
//! local stores and model artifacts are synchronous:
//! - [`ActivityFeed`]: transaction/token-transfer feed (blockchain indexer)
//! - [`StakingLookup`]: staking tier and staked amount
//! - [`PriceOracle`]: reference asset prices and history
//! - [`ScoreWriter`]: on-chain score update
//! - [`ModelLoader`] / [`ModelArtifact`]: versioned learned model
//! - [`FeatureKvStore`], [`ScoreRepository`], [`HistoryLog`], [`CheckpointStore`]
//!   for persistence (vouch-store implements)

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::{FeedError, ModelError, OracleError, StakingError, StoreError, WriteError};
use crate::types::{
    ActivityRecord, ActivityWindow, Checkpoint, ScoreHistoryEntry, ScoreRecord, ScoreResult,
    StoredFeatures, WalletFeatures,
};

/// Source of raw wallet activity.
#[async_trait]
pub trait ActivityFeed: Send + Sync {
    /// All records touching `address` inside `window`, in any order.
    async fn get_activity(
        &self,
        address: &str,
        window: ActivityWindow,
    ) -> Result<Vec<ActivityRecord>, FeedError>;

    /// Timestamp of the newest record for `address`, `None` if it has none.
    ///
    /// Used by the recalculation gate to detect new activity without pulling
    /// the whole feed.
    async fn last_activity_at(&self, address: &str) -> Result<Option<i64>, FeedError>;
}

/// Staking contract lookups.
#[async_trait]
pub trait StakingLookup: Send + Sync {
    /// Raw tier as stored on-chain (valid values are `0–3`).
    async fn tier(&self, address: &str) -> Result<u8, StakingError>;

    /// Staked amount in the token's smallest unit.
    async fn staked_amount(&self, address: &str) -> Result<u128, StakingError>;
}

/// Reference asset price source.
#[async_trait]
pub trait PriceOracle: Send + Sync {
    async fn price(&self, asset: &str) -> Result<f64, OracleError>;

    /// The most recent `periods` daily closing prices, oldest first.
    async fn price_history(&self, asset: &str, periods: usize) -> Result<Vec<f64>, OracleError>;
}

/// Writes a score to the on-chain registry.
#[async_trait]
pub trait ScoreWriter: Send + Sync {
    /// Returns the transaction hash of the update.
    async fn write_score(&self, address: &str, result: &ScoreResult) -> Result<String, WriteError>;
}

/// A loaded, versioned learned model.
///
/// Implementations may panic on malformed input; callers isolate panics.
pub trait ModelArtifact: Send + Sync {
    fn version(&self) -> &str;

    /// Probability-like output in `[0, 1]`; higher is more creditworthy.
    fn predict_single(&self, features: &WalletFeatures) -> Result<f64, ModelError>;

    /// The `top_n` feature contributions, ranked by absolute magnitude.
    fn explain(
        &self,
        features: &WalletFeatures,
        top_n: usize,
    ) -> Result<Vec<(String, f64)>, ModelError>;
}

/// Loads model artifacts by version.
pub trait ModelLoader: Send + Sync {
    fn load(&self, version: &str) -> Result<Arc<dyn ModelArtifact>, ModelError>;
}

/// Persisted feature maps keyed by `(address, version)`.
pub trait FeatureKvStore: Send + Sync {
    fn get_features(&self, address: &str, version: &str) -> Result<Option<StoredFeatures>, StoreError>;

    fn put_features(
        &self,
        address: &str,
        version: &str,
        features: &StoredFeatures,
    ) -> Result<(), StoreError>;
}

/// Latest accepted score per address.
pub trait ScoreRepository: Send + Sync {
    fn latest(&self, address: &str) -> Result<Option<ScoreRecord>, StoreError>;

    fn save(&self, address: &str, record: &ScoreRecord) -> Result<(), StoreError>;

    /// Every address with a stored score, sorted ascending.
    fn addresses(&self) -> Result<Vec<String>, StoreError>;
}

/// Append-only score audit trail. There is deliberately no update or delete.
pub trait HistoryLog: Send + Sync {
    fn append(&self, address: &str, entry: &ScoreHistoryEntry) -> Result<(), StoreError>;

    /// Up to `limit` entries for `address`, oldest first.
    fn history(&self, address: &str, limit: usize) -> Result<Vec<ScoreHistoryEntry>, StoreError>;
}

/// Persisted scheduler cursor.
pub trait CheckpointStore: Send + Sync {
    fn load_checkpoint(&self) -> Result<Option<Checkpoint>, StoreError>;

    fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), StoreError>;

    fn clear_checkpoint(&self) -> Result<(), StoreError>;
}
