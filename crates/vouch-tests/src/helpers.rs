//! Shared collaborators and builders for the integration tests.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;

use vouch_core::constants::SECONDS_PER_DAY;
use vouch_core::error::{FeedError, ModelError, OracleError, StakingError, WriteError};
use vouch_core::traits::{
    ActivityFeed, CheckpointStore, FeatureKvStore, HistoryLog, ModelArtifact, ModelLoader,
    PriceOracle, ScoreRepository, ScoreWriter, StakingLookup,
};
use vouch_core::types::{ActivityKind, ActivityRecord, ActivityWindow, ScoreResult, WalletFeatures};
use vouch_engine::{Collaborators, EngineConfig, ManualClock, ScoringService};
use vouch_store::MemoryStore;

/// Fixed "now" for every test: 2026-05-28T20:26:40Z.
pub const NOW: i64 = 1_780_000_000;

/// Deterministic hex address from a seed byte.
pub fn addr(seed: u8) -> String {
    format!("0x{seed:040x}")
}

pub fn record(
    address: &str,
    hash: &str,
    days_ago: i64,
    value: f64,
    token: &str,
    kind: ActivityKind,
) -> ActivityRecord {
    ActivityRecord {
        hash: hash.to_string(),
        timestamp: NOW - days_ago * SECONDS_PER_DAY,
        from: "0x00000000000000000000000000000000000000ee".into(),
        to: address.to_string(),
        value,
        token: Some(token.to_string()),
        kind,
        contract: None,
        success: true,
        fee: 0.5,
    }
}

/// A long-lived, active wallet: a year of weekly stablecoin inflows plus
/// regular DeFi interactions with several contracts.
pub fn established_wallet(address: &str) -> Vec<ActivityRecord> {
    let mut records = Vec::new();
    for week in 0..52 {
        let hash = format!("in{week}");
        records.push(record(address, &hash, week * 7 + 1, 400.0, "USDC", ActivityKind::TokenTransfer));
    }
    for i in 0..24 {
        let hash = format!("defi{i}");
        let mut defi = record(address, &hash, i * 14 + 3, 150.0, "USDC", ActivityKind::Swap);
        defi.contract = Some(format!("0x{:040x}", 0xc0 + (i % 12)));
        records.push(defi);
    }
    records
}

/// A brand-new wallet with two small native transfers.
pub fn thin_wallet(address: &str) -> Vec<ActivityRecord> {
    vec![
        record(address, "t0", 2, 0.05, "ETH", ActivityKind::Transfer),
        record(address, "t1", 1, 0.02, "ETH", ActivityKind::Transfer),
    ]
}

// ---------------------------------------------------------------------------
// Feed
// ---------------------------------------------------------------------------

/// Activity feed over fixed records, with switchable outages and a list of
/// addresses whose activity fetch panics.
#[derive(Default)]
pub struct ScriptedFeed {
    records: Mutex<HashMap<String, Vec<ActivityRecord>>>,
    panic_for: Mutex<HashSet<String>>,
    pub down: AtomicBool,
    pub fetches: AtomicUsize,
}

impl ScriptedFeed {
    pub fn set(&self, address: &str, records: Vec<ActivityRecord>) {
        self.records.lock().insert(address.to_string(), records);
    }

    pub fn push(&self, address: &str, record: ActivityRecord) {
        self.records.lock().entry(address.to_string()).or_default().push(record);
    }

    pub fn panic_on(&self, address: &str) {
        self.panic_for.lock().insert(address.to_string());
    }

    fn check(&self) -> Result<(), FeedError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(FeedError::Unavailable("indexer offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ActivityFeed for ScriptedFeed {
    async fn get_activity(
        &self,
        address: &str,
        window: ActivityWindow,
    ) -> Result<Vec<ActivityRecord>, FeedError> {
        if self.panic_for.lock().contains(address) {
            panic!("feed exploded for {address}");
        }
        self.check()?;
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .records
            .lock()
            .get(address)
            .map(|rs| rs.iter().filter(|r| window.contains(r.timestamp)).cloned().collect())
            .unwrap_or_default())
    }

    async fn last_activity_at(&self, address: &str) -> Result<Option<i64>, FeedError> {
        self.check()?;
        Ok(self
            .records
            .lock()
            .get(address)
            .and_then(|rs| rs.iter().map(|r| r.timestamp).max()))
    }
}

// ---------------------------------------------------------------------------
// Staking and oracle
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct TierTable {
    tiers: Mutex<HashMap<String, u8>>,
    pub down: AtomicBool,
}

impl TierTable {
    pub fn set(&self, address: &str, tier: u8) {
        self.tiers.lock().insert(address.to_string(), tier);
    }
}

#[async_trait]
impl StakingLookup for TierTable {
    async fn tier(&self, address: &str) -> Result<u8, StakingError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(StakingError::Unavailable("rpc timeout".into()));
        }
        Ok(self.tiers.lock().get(address).copied().unwrap_or(0))
    }

    async fn staked_amount(&self, address: &str) -> Result<u128, StakingError> {
        Ok(u128::from(self.tier(address).await?) * 10_000)
    }
}

/// Oracle replaying a fixed daily price series.
pub struct SeriesOracle {
    series: Mutex<Vec<f64>>,
    pub down: AtomicBool,
    pub history_calls: AtomicUsize,
}

impl SeriesOracle {
    pub fn flat() -> Self {
        Self::with_series(vec![2_000.0; 60])
    }

    /// Alternating ±`swing` daily moves around 2000.
    pub fn choppy(swing: f64) -> Self {
        Self::with_series(
            (0..60)
                .map(|i| if i % 2 == 0 { 2_000.0 } else { 2_000.0 * (1.0 + swing) })
                .collect(),
        )
    }

    pub fn with_series(series: Vec<f64>) -> Self {
        Self {
            series: Mutex::new(series),
            down: AtomicBool::new(false),
            history_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl PriceOracle for SeriesOracle {
    async fn price(&self, _asset: &str) -> Result<f64, OracleError> {
        self.series
            .lock()
            .last()
            .copied()
            .ok_or_else(|| OracleError::Unavailable("empty series".into()))
    }

    async fn price_history(&self, _asset: &str, periods: usize) -> Result<Vec<f64>, OracleError> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        if self.down.load(Ordering::SeqCst) {
            return Err(OracleError::Unavailable("oracle paused".into()));
        }
        let series = self.series.lock();
        let start = series.len().saturating_sub(periods);
        Ok(series[start..].to_vec())
    }
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// Writer that records every call and flags any two calls for the same
/// address that overlap in time.
#[derive(Default)]
pub struct GuardedWriter {
    in_flight: Mutex<HashSet<String>>,
    pub writes: Mutex<Vec<(String, u16)>>,
    pub overlapped: AtomicBool,
    pub reject: AtomicBool,
    pub delay: Mutex<Duration>,
    trip: Mutex<Option<(usize, watch::Sender<bool>)>>,
}

impl GuardedWriter {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Mutex::new(delay),
            ..Self::default()
        }
    }

    /// Signal shutdown once `writes` calls have been recorded.
    pub fn trip_after(&self, writes: usize, shutdown: watch::Sender<bool>) {
        *self.trip.lock() = Some((writes, shutdown));
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().len()
    }

    pub fn writes_for(&self, address: &str) -> usize {
        self.writes.lock().iter().filter(|(a, _)| a == address).count()
    }
}

#[async_trait]
impl ScoreWriter for GuardedWriter {
    async fn write_score(&self, address: &str, result: &ScoreResult) -> Result<String, WriteError> {
        if !self.in_flight.lock().insert(address.to_string()) {
            self.overlapped.store(true, Ordering::SeqCst);
        }
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.lock().remove(address);

        if self.reject.load(Ordering::SeqCst) {
            return Err(WriteError::Rejected("gas price too low".into()));
        }
        let count = {
            let mut writes = self.writes.lock();
            writes.push((address.to_string(), result.score));
            writes.len()
        };
        if let Some((after, shutdown)) = self.trip.lock().as_ref() {
            if count >= *after {
                let _ = shutdown.send(true);
            }
        }
        Ok(format!("0x{count:064x}"))
    }
}

// ---------------------------------------------------------------------------
// Models
// ---------------------------------------------------------------------------

/// What a [`StubModel`] does when asked to predict.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ModelBehavior {
    Returns(f64),
    Fails,
    Panics,
}

pub struct StubModel {
    pub version: String,
    pub behavior: ModelBehavior,
}

impl ModelArtifact for StubModel {
    fn version(&self) -> &str {
        &self.version
    }

    fn predict_single(&self, _features: &WalletFeatures) -> Result<f64, ModelError> {
        match self.behavior {
            ModelBehavior::Returns(p) => Ok(p),
            ModelBehavior::Fails => Err(ModelError::Inference("shape mismatch".into())),
            ModelBehavior::Panics => panic!("model weights corrupted"),
        }
    }

    fn explain(
        &self,
        _features: &WalletFeatures,
        top_n: usize,
    ) -> Result<Vec<(String, f64)>, ModelError> {
        let mut factors = vec![
            ("tx_count".to_string(), 0.8),
            ("days_active".to_string(), 0.5),
            ("volatility".to_string(), -0.2),
        ];
        factors.truncate(top_n);
        Ok(factors)
    }
}

/// Loader serving a single [`StubModel`] version.
pub struct StubLoader(pub ModelBehavior);

impl ModelLoader for StubLoader {
    fn load(&self, version: &str) -> Result<Arc<dyn ModelArtifact>, ModelError> {
        Ok(Arc::new(StubModel {
            version: version.to_string(),
            behavior: self.0,
        }))
    }
}

/// Model probability that can be moved while a service holds the model.
#[derive(Debug, Default)]
pub struct ModelDial(AtomicU64);

impl ModelDial {
    pub fn set(&self, probability: f64) {
        self.0.store(probability.to_bits(), Ordering::SeqCst);
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::SeqCst))
    }
}

struct DialModel {
    version: String,
    dial: Arc<ModelDial>,
}

impl ModelArtifact for DialModel {
    fn version(&self) -> &str {
        &self.version
    }

    fn predict_single(&self, _features: &WalletFeatures) -> Result<f64, ModelError> {
        Ok(self.dial.get())
    }

    fn explain(
        &self,
        _features: &WalletFeatures,
        _top_n: usize,
    ) -> Result<Vec<(String, f64)>, ModelError> {
        Ok(vec![("tx_count".to_string(), self.dial.get())])
    }
}

/// Loader whose model reads its output from a shared [`ModelDial`].
pub struct DialLoader(pub Arc<ModelDial>);

impl ModelLoader for DialLoader {
    fn load(&self, version: &str) -> Result<Arc<dyn ModelArtifact>, ModelError> {
        Ok(Arc::new(DialModel {
            version: version.to_string(),
            dial: self.0.clone(),
        }))
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// Persistence handles for one backing store.
#[derive(Clone)]
pub struct Stores {
    pub features: Arc<dyn FeatureKvStore>,
    pub scores: Arc<dyn ScoreRepository>,
    pub history: Arc<dyn HistoryLog>,
    pub checkpoints: Arc<dyn CheckpointStore>,
}

impl Stores {
    pub fn backed_by<S>(store: Arc<S>) -> Self
    where
        S: FeatureKvStore + ScoreRepository + HistoryLog + CheckpointStore + 'static,
    {
        Self {
            features: store.clone(),
            scores: store.clone(),
            history: store.clone(),
            checkpoints: store,
        }
    }

    pub fn memory() -> Self {
        Self::backed_by(Arc::new(MemoryStore::new()))
    }
}

pub struct Harness {
    pub feed: Arc<ScriptedFeed>,
    pub staking: Arc<TierTable>,
    pub oracle: Arc<SeriesOracle>,
    pub writer: Arc<GuardedWriter>,
    pub stores: Stores,
    pub clock: Arc<ManualClock>,
    pub config: EngineConfig,
    pub loader: Option<Arc<dyn ModelLoader>>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_stores(Stores::memory())
    }

    pub fn with_stores(stores: Stores) -> Self {
        Self {
            feed: Arc::new(ScriptedFeed::default()),
            staking: Arc::new(TierTable::default()),
            oracle: Arc::new(SeriesOracle::flat()),
            writer: Arc::new(GuardedWriter::default()),
            stores,
            clock: Arc::new(ManualClock::new(NOW)),
            config: EngineConfig::default(),
            loader: None,
        }
    }

    /// Serve `behavior` as model `version`.
    pub fn with_model(mut self, version: &str, behavior: ModelBehavior) -> Self {
        self.config.model_version = Some(version.to_string());
        self.loader = Some(Arc::new(StubLoader(behavior)));
        self
    }

    /// Serve a model whose probability the returned dial controls.
    pub fn with_dial(mut self, version: &str, probability: f64) -> (Self, Arc<ModelDial>) {
        let dial = Arc::new(ModelDial::default());
        dial.set(probability);
        self.config.model_version = Some(version.to_string());
        self.loader = Some(Arc::new(DialLoader(dial.clone())));
        (self, dial)
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            feed: self.feed.clone(),
            staking: self.staking.clone(),
            oracle: self.oracle.clone(),
            writer: self.writer.clone(),
            features: Some(self.stores.features.clone()),
            scores: self.stores.scores.clone(),
            history: self.stores.history.clone(),
        }
    }

    pub fn service(&self) -> Arc<ScoringService> {
        Arc::new(ScoringService::with_clock(
            self.config.clone(),
            self.collaborators(),
            self.loader.clone(),
            self.clock.clone(),
        ))
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}
