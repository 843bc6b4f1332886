//! Deterministic explanation text.
//!
//! Clauses appear in a fixed order and are joined by single spaces:
//!
//! 1. base-score rationale with top factors
//! 2. model version tag, when a model produced the base score
//! 3. volatility penalty, when non-zero
//! 4. staking boost, when non-zero
//! 5. risk-band improvement, when applied
//! 6. seasonal adjustment, when non-zero
//!
//! The same inputs always produce a byte-identical string.

use vouch_core::types::{RiskBand, StakingTier};

use crate::adjust::AppliedAdjustments;
use crate::scorer::BasePrediction;

/// A one-band improvement granted by staking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BandImprovement {
    pub from: RiskBand,
    pub to: RiskBand,
    pub tier: StakingTier,
}

pub fn base_rationale(prediction: &BasePrediction) -> String {
    let source = if prediction.ml_used { "model" } else { "rule-based" };
    if prediction.factors.is_empty() {
        return format!("Base score {} from {source} assessment.", prediction.score);
    }
    let factors: Vec<String> = prediction
        .factors
        .iter()
        .map(|(name, value)| {
            if prediction.ml_used {
                format!("{name} {value:+.3}")
            } else {
                format!("{name} {:+}", value.round() as i64)
            }
        })
        .collect();
    format!(
        "Base score {} from {source} assessment (top factors: {}).",
        prediction.score,
        factors.join(", ")
    )
}

pub fn band_clause(improvement: &BandImprovement) -> String {
    format!(
        "Risk band improved from {} to {} by staking tier {}.",
        improvement.from, improvement.to, improvement.tier
    )
}

/// Assemble the full explanation.
pub fn generate(
    prediction: &BasePrediction,
    adjustments: &AppliedAdjustments,
    improvement: Option<&BandImprovement>,
) -> String {
    let mut clauses = vec![base_rationale(prediction)];
    if prediction.ml_used {
        if let Some(version) = &prediction.model_version {
            clauses.push(format!("Model {version} applied."));
        }
    }
    clauses.push(adjustments.oracle.clause.clone());
    clauses.push(adjustments.staking.clause.clone());
    if let Some(improvement) = improvement {
        clauses.push(band_clause(improvement));
    }
    clauses.push(adjustments.seasonal.clause.clone());

    clauses.retain(|c| !c.is_empty());
    clauses.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adjust::Adjustment;

    fn rule_prediction() -> BasePrediction {
        BasePrediction {
            score: 980,
            factors: vec![
                ("tx_count".into(), 200.0),
                ("total_volume".into(), 200.0),
                ("days_active".into(), 150.0),
            ],
            model_version: None,
            ml_used: false,
        }
    }

    fn adjustments(oracle: (i32, &str), staking: (i32, &str), seasonal: (i32, &str)) -> AppliedAdjustments {
        let adj = |(delta, clause): (i32, &str)| Adjustment {
            delta,
            clause: clause.to_string(),
        };
        AppliedAdjustments {
            oracle: adj(oracle),
            staking: adj(staking),
            seasonal: adj(seasonal),
        }
    }

    #[test]
    fn golden_rule_based_with_every_clause() {
        let mut prediction = rule_prediction();
        prediction.model_version = Some("v2".into());
        let applied = adjustments(
            (-25, "Market volatility penalty -25 (annualized volatility 15.0%)."),
            (300, "Staking tier 3 boost +300."),
            (3, "Seasonal adjustment +3."),
        );
        let improvement = BandImprovement {
            from: RiskBand::Medium,
            to: RiskBand::Low,
            tier: StakingTier::Tier2,
        };

        // A model version without ml_used is not tagged.
        assert_eq!(
            generate(&prediction, &applied, Some(&improvement)),
            "Base score 980 from rule-based assessment (top factors: tx_count +200, \
             total_volume +200, days_active +150). \
             Market volatility penalty -25 (annualized volatility 15.0%). \
             Staking tier 3 boost +300. \
             Risk band improved from 2 to 1 by staking tier 2. \
             Seasonal adjustment +3."
        );
    }

    #[test]
    fn golden_model_tag() {
        let prediction = BasePrediction {
            score: 812,
            factors: vec![("tx_count".into(), 1.25), ("volatility".into(), -0.5)],
            model_version: Some("v2".into()),
            ml_used: true,
        };
        assert_eq!(
            generate(&prediction, &AppliedAdjustments::default(), None),
            "Base score 812 from model assessment (top factors: tx_count +1.250, \
             volatility -0.500). Model v2 applied."
        );
    }

    #[test]
    fn zero_adjustments_are_omitted() {
        assert_eq!(
            generate(&rule_prediction(), &AppliedAdjustments::default(), None),
            "Base score 980 from rule-based assessment (top factors: tx_count +200, \
             total_volume +200, days_active +150)."
        );
    }

    #[test]
    fn no_factors_drops_parenthetical() {
        let prediction = BasePrediction {
            score: 700,
            factors: Vec::new(),
            model_version: Some("v3".into()),
            ml_used: true,
        };
        assert_eq!(
            generate(&prediction, &AppliedAdjustments::default(), None),
            "Base score 700 from model assessment. Model v3 applied."
        );
    }

    #[test]
    fn output_is_reproducible() {
        let applied = adjustments((0, ""), (50, "Staking tier 1 boost +50."), (0, ""));
        let a = generate(&rule_prediction(), &applied, None);
        let b = generate(&rule_prediction(), &applied, None);
        assert_eq!(a, b);
    }
}
