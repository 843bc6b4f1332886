//! Final score composition.
//!
//! `score = clamp(base - oracle_penalty + staking_boost + seasonal, 0, 1000)`
//!
//! The risk band comes from the base score, not the final one. A staking
//! tier of 2 or more then improves it by exactly one band. An empty feature
//! map is band 0 (unknown) regardless of staking.

use vouch_core::constants::{BAND_IMPROVEMENT_MIN_TIER, MAX_SCORE, MIN_SCORE};
use vouch_core::types::{RiskBand, ScoreResult, StakingTier};

use crate::adjust::AppliedAdjustments;
use crate::explain::{self, BandImprovement};
use crate::scorer::BasePrediction;

/// Everything the aggregator combines for one wallet.
#[derive(Debug, Clone)]
pub struct ScoreParts<'a> {
    pub prediction: &'a BasePrediction,
    pub adjustments: &'a AppliedAdjustments,
    pub tier: StakingTier,
    pub staked_amount: u128,
    /// Whether the wallet had any features at all.
    pub has_data: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreAggregator;

impl ScoreAggregator {
    pub fn new() -> Self {
        Self
    }

    pub fn aggregate(&self, parts: &ScoreParts<'_>) -> ScoreResult {
        let base = parts.prediction.score.min(MAX_SCORE);
        let adj = parts.adjustments;

        let raw = i32::from(base) + adj.oracle.delta + adj.staking.delta + adj.seasonal.delta;
        let score = raw.clamp(i32::from(MIN_SCORE), i32::from(MAX_SCORE)) as u16;

        let (risk_band, improvement) = risk_band(base, parts.tier, parts.has_data);

        ScoreResult {
            score,
            risk_band,
            explanation: explain::generate(parts.prediction, adj, improvement.as_ref()),
            base_score: base,
            staking_boost: adj.staking_boost(),
            oracle_penalty: adj.oracle_penalty(),
            seasonal_adjustment: adj.seasonal_delta(),
            staked_amount: parts.staked_amount,
            staking_tier: parts.tier,
            model_version: parts
                .prediction
                .ml_used
                .then(|| parts.prediction.model_version.clone())
                .flatten(),
            ml_used: parts.prediction.ml_used,
        }
    }
}

/// Band for a base score after any staking improvement.
pub fn risk_band(
    base_score: u16,
    tier: StakingTier,
    has_data: bool,
) -> (RiskBand, Option<BandImprovement>) {
    if !has_data {
        return (RiskBand::Unknown, None);
    }
    let base_band = RiskBand::from_base_score(base_score);
    if tier.as_u8() >= BAND_IMPROVEMENT_MIN_TIER && base_band > RiskBand::Low {
        let improved = base_band.improved();
        return (
            improved,
            Some(BandImprovement {
                from: base_band,
                to: improved,
                tier,
            }),
        );
    }
    (base_band, None)
}
