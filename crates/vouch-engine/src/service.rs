//! Scoring service: one address from feed to persisted, gated, written score.

use std::fmt;
use std::sync::Arc;

use tokio::task::JoinError;
use tracing::{debug, error, info, warn};

use vouch_core::error::VouchError;
use vouch_core::traits::{
    ActivityFeed, FeatureKvStore, HistoryLog, ModelLoader, PriceOracle, ScoreRepository,
    ScoreWriter, StakingLookup,
};
use vouch_core::types::{
    ActivityWindow, ScoreHistoryEntry, ScoreRecord, ScoreResult, StakingTier, WalletFeatures,
    normalize_address,
};
use vouch_features::{FeatureExtractor, FeatureSource, FeatureStore};
use vouch_scoring::adjust::AdjustmentInputs;
use vouch_scoring::aggregate::ScoreParts;
use vouch_scoring::{AdjustmentPipeline, BasePrediction, BaseScorer, ModelScorer, ScoreAggregator};

use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::gate::{Freshness, RecalculationGate, StaleReason, WriteDecision};
use crate::locks::AddressLocks;
use crate::volatility::VolatilityCache;

/// External collaborators the service consumes.
#[derive(Clone)]
pub struct Collaborators {
    pub feed: Arc<dyn ActivityFeed>,
    pub staking: Arc<dyn StakingLookup>,
    pub oracle: Arc<dyn PriceOracle>,
    pub writer: Arc<dyn ScoreWriter>,
    pub features: Option<Arc<dyn FeatureKvStore>>,
    pub scores: Arc<dyn ScoreRepository>,
    pub history: Arc<dyn HistoryLog>,
}

/// Outcome of the on-chain write step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteStatus {
    Written { tx_hash: String },
    Skipped,
    Failed { error: String },
}

impl fmt::Display for WriteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Written { tx_hash } => write!(f, "written ({tx_hash})"),
            Self::Skipped => f.write_str("skipped"),
            Self::Failed { error } => write!(f, "failed ({error})"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecalcStatus {
    /// Prior score reused; nothing recomputed.
    Fresh,
    Recomputed,
    /// Scoring failed outright. The documented default is reported but
    /// nothing is persisted, written or added to history.
    Defaulted,
}

/// Result of one [`ScoringService::recalculate`] call.
#[derive(Debug, Clone, PartialEq)]
pub struct RecalcReport {
    pub address: String,
    pub status: RecalcStatus,
    pub freshness: Freshness,
    pub old_score: Option<u16>,
    /// `None` when nothing was recomputed.
    pub new_score: Option<u16>,
    /// `None` when nothing was recomputed.
    pub write: Option<WriteStatus>,
    /// The score now on record for the address, or the documented default
    /// when scoring failed.
    pub result: ScoreResult,
}

pub struct ScoringService {
    collaborators: Collaborators,
    extractor: FeatureExtractor,
    feature_store: FeatureStore,
    volatility: VolatilityCache,
    scorer: BaseScorer,
    adjustments: AdjustmentPipeline,
    aggregator: ScoreAggregator,
    gate: RecalculationGate,
    locks: AddressLocks,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl ScoringService {
    /// Build a service with the system clock. A configured model that fails
    /// to load leaves the rule-based scorer in charge.
    pub fn new(
        config: EngineConfig,
        collaborators: Collaborators,
        model_loader: Option<Arc<dyn ModelLoader>>,
    ) -> Self {
        Self::with_clock(config, collaborators, model_loader, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: EngineConfig,
        collaborators: Collaborators,
        model_loader: Option<Arc<dyn ModelLoader>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let scorer = match (model_loader, config.model_version.as_deref()) {
            (Some(loader), Some(version)) => {
                let model = ModelScorer::new(loader);
                if !model.load(version) {
                    warn!(version, "service: model unavailable, scoring rule-based until loaded");
                }
                BaseScorer::Model(model)
            }
            _ => BaseScorer::rule_based(),
        };

        Self {
            extractor: FeatureExtractor::new(collaborators.feed.clone()),
            feature_store: FeatureStore::new(
                collaborators.features.clone(),
                config.feature_ttl_secs,
            ),
            volatility: VolatilityCache::new(
                collaborators.oracle.clone(),
                config.volatility_window,
                config.volatility_cache_ttl_secs,
            ),
            scorer,
            adjustments: AdjustmentPipeline::new(config.volatility, config.seasonal),
            aggregator: ScoreAggregator::new(),
            gate: RecalculationGate::new(config.max_age_secs(), config.change_threshold),
            locks: AddressLocks::new(),
            clock,
            collaborators,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    /// Expire cached features and drop idle address locks.
    pub fn housekeeping(&self) {
        let evicted = self.feature_store.evict_expired(self.now());
        let pruned = self.locks.prune();
        debug!(evicted, pruned, "service: housekeeping");
    }

    // -----------------------------------------------------------------------
    // Scoring
    // -----------------------------------------------------------------------

    async fn staking(&self, address: &str) -> (StakingTier, u128) {
        let staking = &self.collaborators.staking;
        let (tier, amount) = tokio::join!(staking.tier(address), staking.staked_amount(address));
        let tier = match tier {
            Ok(raw) => StakingTier::from_u8(raw).unwrap_or_else(|| {
                warn!(%address, raw, "staking: tier out of range, treating as unstaked");
                StakingTier::Unstaked
            }),
            Err(e) => {
                warn!(%address, "staking: lookup failed, treating as unstaked: {e}");
                StakingTier::Unstaked
            }
        };
        let amount = amount.unwrap_or_else(|e| {
            debug!(%address, "staking: amount lookup failed: {e}");
            0
        });
        (tier, amount)
    }

    async fn features_and_prediction(
        &self,
        address: &str,
        now: i64,
        refresh: bool,
    ) -> (WalletFeatures, BasePrediction) {
        let window = ActivityWindow::trailing(now, self.config.activity_window_days);
        let version = &self.config.feature_version;
        let (features, source) = if refresh {
            let features = self
                .feature_store
                .refresh(&self.extractor, address, version, window, now)
                .await;
            (features, FeatureSource::Extracted)
        } else {
            self.feature_store
                .get_or_extract(&self.extractor, address, version, window, now)
                .await
        };
        debug!(%address, ?source, features = features.len(), "score: features ready");
        let prediction = self.scorer.predict(&features);
        (features, prediction)
    }

    /// Score `address` (already normalized) at time `now`, using cached
    /// features when they are still within their TTL.
    pub async fn score_at(&self, address: &str, now: i64) -> ScoreResult {
        self.compute(address, now, false).await
    }

    /// Feature extraction plus inference, the volatility lookup and the
    /// staking lookups run concurrently; aggregation is pure. `refresh`
    /// re-extracts features even when a cached map is live.
    async fn compute(&self, address: &str, now: i64, refresh: bool) -> ScoreResult {
        let ((features, prediction), volatility, (tier, staked_amount)) = tokio::join!(
            self.features_and_prediction(address, now, refresh),
            self.volatility.get(&self.config.reference_asset, now),
            self.staking(address),
        );

        let adjustments = self.adjustments.run(&AdjustmentInputs {
            tier,
            volatility,
            reference_ts: now,
        });
        let result = self.aggregator.aggregate(&ScoreParts {
            prediction: &prediction,
            adjustments: &adjustments,
            tier,
            staked_amount,
            has_data: !features.is_empty(),
        });
        debug!(
            %address,
            score = result.score,
            band = result.risk_band.as_u8(),
            ml_used = result.ml_used,
            "score: computed"
        );
        result
    }

    /// Score a raw address now, without touching the gate or any store
    /// other than the feature cache. A panic during scoring yields the
    /// documented default.
    pub async fn score(self: &Arc<Self>, address: &str) -> Result<ScoreResult, VouchError> {
        let address = normalize_address(address)?;
        let scored = self.score_isolated(&address, self.now(), false).await;
        Ok(scored.unwrap_or_else(|_| ScoreResult::fallback_default()))
    }

    /// Score on a separate task so a panic anywhere in scoring cannot unwind
    /// into the caller.
    async fn score_isolated(
        self: &Arc<Self>,
        address: &str,
        now: i64,
        refresh: bool,
    ) -> Result<ScoreResult, JoinError> {
        let this = Arc::clone(self);
        let owned = address.to_string();
        tokio::spawn(async move { this.compute(&owned, now, refresh).await })
            .await
            .inspect_err(|e| error!(%address, "score: scoring task failed, using default: {e}"))
    }

    // -----------------------------------------------------------------------
    // Recalculation
    // -----------------------------------------------------------------------

    /// Gate, recompute, persist, write and audit one address.
    ///
    /// Collaborator failures degrade inside scoring; only persistence errors
    /// and invalid addresses are returned.
    pub async fn recalculate(
        self: &Arc<Self>,
        address: &str,
        force: bool,
    ) -> Result<RecalcReport, VouchError> {
        let address = normalize_address(address)?;
        let _guard = self.locks.acquire(&address).await;
        let now = self.now();

        let prior = self.collaborators.scores.latest(&address)?;
        let latest_activity = self.collaborators.feed.last_activity_at(&address).await;
        if let Err(e) = &latest_activity {
            warn!(%address, "recalc: activity lookup failed, treating as new activity: {e}");
        }
        let freshness = self.gate.assess(prior.as_ref(), &latest_activity, now);
        let old_score = prior.as_ref().map(|p| p.result.score);
        let last_written = prior.as_ref().and_then(|p| p.last_written_score);

        if !freshness.needs_recompute() && !force {
            debug!(%address, "recalc: fresh, skipped");
            let result = match prior {
                Some(p) => p.result,
                None => ScoreResult::fallback_default(),
            };
            return Ok(RecalcReport {
                address,
                status: RecalcStatus::Fresh,
                freshness,
                old_score,
                new_score: None,
                write: None,
                result,
            });
        }

        // Age alone does not change the activity set, so a live cache entry
        // is still accurate; any other reason to recompute re-extracts.
        let refresh = freshness != Freshness::Stale(StaleReason::MaxAge);
        let Ok(result) = self.score_isolated(&address, now, refresh).await else {
            warn!(%address, ?old_score, "recalc: scoring failed, keeping prior record");
            return Ok(RecalcReport {
                address,
                status: RecalcStatus::Defaulted,
                freshness,
                old_score,
                new_score: None,
                write: None,
                result: ScoreResult::fallback_default(),
            });
        };
        let new_score = result.score;

        // Persist before writing on-chain so the score stays cached even
        // when the write fails.
        let last_activity_at = match &latest_activity {
            Ok(ts) => ts.or(prior.as_ref().and_then(|p| p.last_activity_at)),
            Err(_) => prior.as_ref().and_then(|p| p.last_activity_at),
        };
        let mut record = ScoreRecord {
            result: result.clone(),
            last_updated: now,
            last_activity_at,
            last_written_score: last_written,
        };
        self.collaborators.scores.save(&address, &record)?;

        let write = match self.gate.write_decision(last_written, new_score, force) {
            WriteDecision::Skip => {
                debug!(%address, ?last_written, new_score, "recalc: write skipped");
                WriteStatus::Skipped
            }
            WriteDecision::Write => {
                match self.collaborators.writer.write_score(&address, &result).await {
                    Ok(tx_hash) => {
                        info!(%address, new_score, %tx_hash, "recalc: score written");
                        record.last_written_score = Some(new_score);
                        self.collaborators.scores.save(&address, &record)?;
                        WriteStatus::Written { tx_hash }
                    }
                    Err(e) => {
                        warn!(%address, new_score, "recalc: on-chain write failed: {e}");
                        WriteStatus::Failed {
                            error: e.to_string(),
                        }
                    }
                }
            }
        };

        self.collaborators.history.append(
            &address,
            &ScoreHistoryEntry {
                previous_score: old_score,
                new_score,
                change_reason: freshness.change_reason(force),
                explanation: result.explanation.clone(),
                timestamp: now,
            },
        )?;

        Ok(RecalcReport {
            address,
            status: RecalcStatus::Recomputed,
            freshness,
            old_score,
            new_score: Some(new_score),
            write: Some(write),
            result,
        })
    }
}
