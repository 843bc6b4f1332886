//! Bounded adjustments applied on top of the base score.
//!
//! Each adjustment is a pure function of its inputs producing a signed
//! delta and an explanation clause (empty when the delta is zero). The
//! pipeline only computes them; [`ScoreAggregator`](crate::ScoreAggregator)
//! applies them in order and clamps.

use chrono::{DateTime, Datelike};
use serde::{Deserialize, Serialize};

use vouch_core::constants::{
    SEASONAL_MAX_ABS, VOLATILITY_HIGH, VOLATILITY_LOW, VOLATILITY_MID, VOLATILITY_PENALTY_MAX,
    VOLATILITY_PENALTY_MIN,
};
use vouch_core::types::StakingTier;

/// A signed score delta with its explanation clause.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Adjustment {
    pub delta: i32,
    pub clause: String,
}

impl Adjustment {
    pub fn none() -> Self {
        Self::default()
    }
}

// ---------------------------------------------------------------------------
// Staking
// ---------------------------------------------------------------------------

/// Additive boost for the wallet's staking tier.
pub fn staking_adjustment(tier: StakingTier) -> Adjustment {
    let boost = tier.boost();
    if boost == 0 {
        return Adjustment::none();
    }
    Adjustment {
        delta: i32::from(boost),
        clause: format!("Staking tier {tier} boost +{boost}."),
    }
}

// ---------------------------------------------------------------------------
// Oracle volatility
// ---------------------------------------------------------------------------

/// Annualized volatility of a price series.
///
/// Population standard deviation of log returns, scaled by
/// `sqrt(periods_per_year)`. Returns `None` with fewer than three prices or
/// when any price is non-positive or non-finite.
///
/// ```
/// use vouch_scoring::annualized_volatility;
///
/// assert_eq!(annualized_volatility(&[1.0, 1.0, 1.0], 365.0), Some(0.0));
/// assert_eq!(annualized_volatility(&[1.0, 2.0], 365.0), None);
/// assert_eq!(annualized_volatility(&[1.0, 0.0, 1.0], 365.0), None);
/// ```
pub fn annualized_volatility(prices: &[f64], periods_per_year: f64) -> Option<f64> {
    if prices.len() < 3 || prices.iter().any(|p| !p.is_finite() || *p <= 0.0) {
        return None;
    }
    let returns: Vec<f64> = prices.windows(2).map(|w| (w[1] / w[0]).ln()).collect();
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let vol = variance.sqrt() * periods_per_year.sqrt();
    vol.is_finite().then_some(vol)
}

/// Volatility thresholds and the penalties attached to them.
///
/// | Annualized volatility | Penalty                     |
/// |-----------------------|-----------------------------|
/// | `< low`               | 0                           |
/// | `[low, mid)`          | `min_penalty`               |
/// | `[mid, high)`         | linear `min_penalty..max_penalty` |
/// | `>= high`             | `max_penalty`               |
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolatilityTiers {
    pub low: f64,
    pub mid: f64,
    pub high: f64,
    pub min_penalty: u16,
    pub max_penalty: u16,
}

impl Default for VolatilityTiers {
    fn default() -> Self {
        Self {
            low: VOLATILITY_LOW,
            mid: VOLATILITY_MID,
            high: VOLATILITY_HIGH,
            min_penalty: VOLATILITY_PENALTY_MIN,
            max_penalty: VOLATILITY_PENALTY_MAX,
        }
    }
}

impl VolatilityTiers {
    /// Thresholds must be finite, non-negative and strictly increasing, and
    /// the penalties non-decreasing.
    pub fn validate(&self) -> Result<(), String> {
        let all_finite = [self.low, self.mid, self.high].iter().all(|t| t.is_finite());
        if !all_finite || self.low < 0.0 {
            return Err("volatility thresholds must be finite and non-negative".into());
        }
        if !(self.low < self.mid && self.mid < self.high) {
            return Err(format!(
                "volatility thresholds must increase: {} < {} < {}",
                self.low, self.mid, self.high
            ));
        }
        if self.min_penalty > self.max_penalty {
            return Err(format!(
                "volatility penalties must not decrease: {} > {}",
                self.min_penalty, self.max_penalty
            ));
        }
        Ok(())
    }

    /// Penalty for an annualized volatility. Non-finite input scores `0`.
    pub fn penalty(&self, volatility: f64) -> u16 {
        if !volatility.is_finite() || volatility < self.low {
            0
        } else if volatility < self.mid {
            self.min_penalty
        } else if volatility < self.high {
            let fraction = (volatility - self.mid) / (self.high - self.mid);
            let span = f64::from(self.max_penalty.saturating_sub(self.min_penalty));
            self.min_penalty + (fraction * span).round() as u16
        } else {
            self.max_penalty
        }
    }

    /// Penalty as an adjustment; `None` volatility (oracle down) is no penalty.
    pub fn adjustment(&self, volatility: Option<f64>) -> Adjustment {
        let Some(vol) = volatility else {
            return Adjustment::none();
        };
        let penalty = self.penalty(vol);
        if penalty == 0 {
            return Adjustment::none();
        }
        Adjustment {
            delta: -i32::from(penalty),
            clause: format!(
                "Market volatility penalty -{penalty} (annualized volatility {:.1}%).",
                vol * 100.0
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Seasonal
// ---------------------------------------------------------------------------

/// Optional per-month score nudge, disabled by default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeasonalTable {
    pub enabled: bool,
    /// January first. Entries are clamped to `±5` when applied.
    pub monthly: [i16; 12],
}

impl SeasonalTable {
    /// Delta for the month containing `reference_ts` (unix seconds, UTC).
    pub fn delta_at(&self, reference_ts: i64) -> i16 {
        if !self.enabled {
            return 0;
        }
        let Some(date) = DateTime::from_timestamp(reference_ts, 0) else {
            return 0;
        };
        let month = date.month0() as usize;
        self.monthly[month].clamp(-SEASONAL_MAX_ABS, SEASONAL_MAX_ABS)
    }

    pub fn adjustment(&self, reference_ts: i64) -> Adjustment {
        let delta = self.delta_at(reference_ts);
        if delta == 0 {
            return Adjustment::none();
        }
        Adjustment {
            delta: i32::from(delta),
            clause: format!("Seasonal adjustment {delta:+}."),
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Inputs the adjustments depend on, gathered by the caller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdjustmentInputs {
    pub tier: StakingTier,
    /// `None` when the oracle was unavailable.
    pub volatility: Option<f64>,
    /// Scoring reference date, unix seconds.
    pub reference_ts: i64,
}

/// Every adjustment for one scoring call, in application order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppliedAdjustments {
    pub oracle: Adjustment,
    pub staking: Adjustment,
    pub seasonal: Adjustment,
}

impl AppliedAdjustments {
    pub fn oracle_penalty(&self) -> u16 {
        u16::try_from(-self.oracle.delta).unwrap_or(0)
    }

    pub fn staking_boost(&self) -> u16 {
        u16::try_from(self.staking.delta).unwrap_or(0)
    }

    pub fn seasonal_delta(&self) -> i16 {
        i16::try_from(self.seasonal.delta).unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AdjustmentPipeline {
    pub volatility: VolatilityTiers,
    pub seasonal: SeasonalTable,
}

impl AdjustmentPipeline {
    pub fn new(volatility: VolatilityTiers, seasonal: SeasonalTable) -> Self {
        Self { volatility, seasonal }
    }

    pub fn run(&self, inputs: &AdjustmentInputs) -> AppliedAdjustments {
        AppliedAdjustments {
            oracle: self.volatility.adjustment(inputs.volatility),
            staking: staking_adjustment(inputs.tier),
            seasonal: self.seasonal.adjustment(inputs.reference_ts),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    // 2026-03-15T00:00:00Z
    const MID_MARCH: i64 = 1_773_532_800;

    #[test]
    fn staking_boost_table() {
        let boosts: Vec<i32> = StakingTier::ALL
            .iter()
            .map(|t| staking_adjustment(*t).delta)
            .collect();
        assert_eq!(boosts, vec![0, 50, 150, 300]);
        assert_eq!(
            staking_adjustment(StakingTier::Tier3).clause,
            "Staking tier 3 boost +300."
        );
        assert!(staking_adjustment(StakingTier::Unstaked).clause.is_empty());
    }

    #[test]
    fn volatility_penalty_tiers() {
        let tiers = VolatilityTiers::default();
        assert_eq!(tiers.penalty(0.05), 0);
        assert_eq!(tiers.penalty(0.1), 25);
        assert_eq!(tiers.penalty(0.15), 25);
        assert_eq!(tiers.penalty(0.2), 25);
        assert_eq!(tiers.penalty(0.28), 45);
        assert_eq!(tiers.penalty(0.3), 50);
        assert_eq!(tiers.penalty(0.5), 50);
        assert_eq!(tiers.penalty(f64::NAN), 0);
    }

    #[test]
    fn oracle_outage_means_no_penalty() {
        assert_eq!(VolatilityTiers::default().adjustment(None), Adjustment::none());
    }

    #[test]
    fn volatility_clause_format() {
        let adj = VolatilityTiers::default().adjustment(Some(0.15));
        assert_eq!(adj.delta, -25);
        assert_eq!(adj.clause, "Market volatility penalty -25 (annualized volatility 15.0%).");
    }

    #[test]
    fn validate_rejects_unordered_tiers() {
        assert!(VolatilityTiers::default().validate().is_ok());
        let bad = VolatilityTiers { mid: 0.05, ..VolatilityTiers::default() };
        assert!(bad.validate().is_err());
        let bad = VolatilityTiers { min_penalty: 60, ..VolatilityTiers::default() };
        assert!(bad.validate().is_err());
        let bad = VolatilityTiers { high: f64::NAN, ..VolatilityTiers::default() };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn annualized_volatility_of_alternating_series() {
        // Log returns alternate between +r and -r: std-dev is exactly r.
        let up = 1.1_f64;
        let prices = [100.0, 100.0 * up, 100.0, 100.0 * up, 100.0];
        let vol = annualized_volatility(&prices, 1.0).unwrap();
        assert!((vol - up.ln()).abs() < 1e-12);

        let annual = annualized_volatility(&prices, 365.0).unwrap();
        assert!((annual - up.ln() * 365.0_f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn seasonal_disabled_by_default() {
        let table = SeasonalTable::default();
        assert_eq!(table.delta_at(MID_MARCH), 0);
        assert!(table.adjustment(MID_MARCH).clause.is_empty());
    }

    #[test]
    fn seasonal_uses_reference_month_and_clamps() {
        let mut monthly = [0; 12];
        monthly[2] = 3;
        let table = SeasonalTable { enabled: true, monthly };
        let adj = table.adjustment(MID_MARCH);
        assert_eq!(adj.delta, 3);
        assert_eq!(adj.clause, "Seasonal adjustment +3.");

        monthly[2] = -40;
        let table = SeasonalTable { enabled: true, monthly };
        assert_eq!(table.delta_at(MID_MARCH), -5);
    }

    #[test]
    fn pipeline_reports_components() {
        let applied = AdjustmentPipeline::default().run(&AdjustmentInputs {
            tier: StakingTier::Tier2,
            volatility: Some(0.5),
            reference_ts: MID_MARCH,
        });
        assert_eq!(applied.oracle_penalty(), 50);
        assert_eq!(applied.staking_boost(), 150);
        assert_eq!(applied.seasonal_delta(), 0);
    }

    proptest! {
        #[test]
        fn penalty_is_monotone_in_volatility(a in 0.0f64..2.0, b in 0.0f64..2.0) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let tiers = VolatilityTiers::default();
            prop_assert!(tiers.penalty(lo) <= tiers.penalty(hi));
            prop_assert!(tiers.penalty(hi) <= tiers.max_penalty);
        }

        #[test]
        fn volatility_is_non_negative(prices in proptest::collection::vec(0.01f64..1e6, 3..60)) {
            let vol = annualized_volatility(&prices, 365.0).unwrap();
            prop_assert!(vol >= 0.0);
        }
    }
}
