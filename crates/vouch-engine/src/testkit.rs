//! In-memory collaborators for the engine's unit tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use vouch_core::constants::SECONDS_PER_DAY;
use vouch_core::error::{FeedError, OracleError, StakingError, WriteError};
use vouch_core::traits::{ActivityFeed, PriceOracle, ScoreWriter, StakingLookup};
use vouch_core::types::{ActivityKind, ActivityRecord, ActivityWindow, ScoreResult};
use vouch_store::MemoryStore;

use crate::clock::ManualClock;
use crate::config::EngineConfig;
use crate::service::{Collaborators, ScoringService};

pub const NOW: i64 = 1_780_000_000;

pub fn addr(n: u8) -> String {
    format!("0x{n:040x}")
}

pub fn transfer(to: &str, hash: &str, timestamp: i64, value: f64) -> ActivityRecord {
    ActivityRecord {
        hash: hash.to_string(),
        timestamp,
        from: "0x00000000000000000000000000000000000000ff".into(),
        to: to.to_string(),
        value,
        token: Some("USDC".into()),
        kind: ActivityKind::TokenTransfer,
        contract: None,
        success: true,
        fee: 0.5,
    }
}

#[derive(Default)]
pub struct FixtureFeed {
    records: Mutex<HashMap<String, Vec<ActivityRecord>>>,
    pub down: AtomicBool,
}

impl FixtureFeed {
    pub fn push(&self, address: &str, record: ActivityRecord) {
        self.records.lock().entry(address.to_string()).or_default().push(record);
    }
}

#[async_trait]
impl ActivityFeed for FixtureFeed {
    async fn get_activity(
        &self,
        address: &str,
        window: ActivityWindow,
    ) -> Result<Vec<ActivityRecord>, FeedError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(FeedError::Unavailable("indexer offline".into()));
        }
        Ok(self
            .records
            .lock()
            .get(address)
            .map(|rs| rs.iter().filter(|r| window.contains(r.timestamp)).cloned().collect())
            .unwrap_or_default())
    }

    async fn last_activity_at(&self, address: &str) -> Result<Option<i64>, FeedError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(FeedError::Unavailable("indexer offline".into()));
        }
        Ok(self
            .records
            .lock()
            .get(address)
            .and_then(|rs| rs.iter().map(|r| r.timestamp).max()))
    }
}

#[derive(Default)]
pub struct FixedStaking {
    tiers: Mutex<HashMap<String, u8>>,
}

impl FixedStaking {
    pub fn set(&self, address: &str, tier: u8) {
        self.tiers.lock().insert(address.to_string(), tier);
    }
}

#[async_trait]
impl StakingLookup for FixedStaking {
    async fn tier(&self, address: &str) -> Result<u8, StakingError> {
        Ok(self.tiers.lock().get(address).copied().unwrap_or(0))
    }

    async fn staked_amount(&self, address: &str) -> Result<u128, StakingError> {
        let tier = self.tier(address).await?;
        Ok(u128::from(tier) * 1_000)
    }
}

/// Flat prices, so volatility is zero and no penalty applies.
pub struct FlatOracle;

#[async_trait]
impl PriceOracle for FlatOracle {
    async fn price(&self, _asset: &str) -> Result<f64, OracleError> {
        Ok(2_000.0)
    }

    async fn price_history(&self, _asset: &str, periods: usize) -> Result<Vec<f64>, OracleError> {
        Ok(vec![2_000.0; periods])
    }
}

#[derive(Default)]
pub struct RecordingWriter {
    pub writes: Mutex<Vec<(String, u16)>>,
    pub calls: AtomicUsize,
    pub reject: AtomicBool,
}

#[async_trait]
impl ScoreWriter for RecordingWriter {
    async fn write_score(&self, address: &str, result: &ScoreResult) -> Result<String, WriteError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.reject.load(Ordering::SeqCst) {
            return Err(WriteError::Rejected("nonce too low".into()));
        }
        self.writes.lock().push((address.to_string(), result.score));
        Ok(format!("0xtx{n}"))
    }
}

pub struct TestRig {
    pub feed: Arc<FixtureFeed>,
    pub staking: Arc<FixedStaking>,
    pub writer: Arc<RecordingWriter>,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub config: EngineConfig,
}

impl TestRig {
    pub fn new() -> Self {
        Self {
            feed: Arc::new(FixtureFeed::default()),
            staking: Arc::new(FixedStaking::default()),
            writer: Arc::new(RecordingWriter::default()),
            store: Arc::new(MemoryStore::new()),
            clock: Arc::new(ManualClock::new(NOW)),
            config: EngineConfig::default(),
        }
    }

    /// Ten monthly transfers into `address` over the last year.
    pub fn seed_activity(&self, address: &str) {
        for i in 0..10 {
            let ts = NOW - (i + 1) * 30 * SECONDS_PER_DAY;
            self.feed.push(address, transfer(address, &format!("h{i}"), ts, 250.0));
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            feed: self.feed.clone(),
            staking: self.staking.clone(),
            oracle: Arc::new(FlatOracle),
            writer: self.writer.clone(),
            features: Some(self.store.clone()),
            scores: self.store.clone(),
            history: self.store.clone(),
        }
    }

    pub fn service(&self) -> Arc<ScoringService> {
        Arc::new(ScoringService::with_clock(
            self.config.clone(),
            self.collaborators(),
            None,
            self.clock.clone(),
        ))
    }
}
