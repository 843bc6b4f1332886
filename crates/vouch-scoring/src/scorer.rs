//! Strategy dispatch between rule-based and model scoring.

use vouch_core::constants::EXPLANATION_TOP_FACTORS;
use vouch_core::types::WalletFeatures;

use crate::model::ModelScorer;
use crate::rule::{RuleBasedScorer, RuleScore};

/// Base score and its attribution, before any adjustment.
#[derive(Debug, Clone, PartialEq)]
pub struct BasePrediction {
    pub score: u16,
    /// Top contributions, largest first. Points for rule-based scoring,
    /// logit contributions for a model.
    pub factors: Vec<(String, f64)>,
    pub model_version: Option<String>,
    pub ml_used: bool,
}

impl BasePrediction {
    pub fn from_rule(rule: &RuleScore, top_n: usize) -> Self {
        Self {
            score: rule.score,
            factors: rule
                .top_factors(top_n)
                .into_iter()
                .map(|(name, points)| (name.to_string(), f64::from(points)))
                .collect(),
            model_version: None,
            ml_used: false,
        }
    }
}

/// The scoring strategy in use.
pub enum BaseScorer {
    RuleBased(RuleBasedScorer),
    Model(ModelScorer),
}

impl BaseScorer {
    pub fn rule_based() -> Self {
        Self::RuleBased(RuleBasedScorer::new())
    }

    /// Never fails: a model strategy substitutes rule-based output itself.
    pub fn predict(&self, features: &WalletFeatures) -> BasePrediction {
        match self {
            Self::RuleBased(rule) => {
                BasePrediction::from_rule(&rule.score(features), EXPLANATION_TOP_FACTORS)
            }
            Self::Model(model) => model.predict(features),
        }
    }

    pub fn is_model(&self) -> bool {
        matches!(self, Self::Model(_))
    }
}
