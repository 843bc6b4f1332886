//! Deterministic rule-based scorer.
//!
//! Seven whitelisted features are each mapped to points through a bucket
//! table. The maxima of the tables sum to [`MAX_SCORE`], so the total is in
//! `0–1000` by construction. A missing or non-finite feature scores half its
//! table's maximum.
//!
//! | Feature            | Max | Direction        |
//! |--------------------|-----|------------------|
//! | `tx_count`         | 200 | higher is better |
//! | `total_volume`     | 200 | higher is better |
//! | `stablecoin_ratio` | 150 | higher is better |
//! | `days_active`      | 150 | higher is better |
//! | `unique_contracts` | 100 | higher is better |
//! | `volatility`       | 100 | lower is better  |
//! | `max_drawdown`     | 100 | lower is better  |

use vouch_core::constants::MAX_SCORE;
use vouch_core::types::WalletFeatures;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    /// Buckets are `(min, points)`; the first with `value >= min` wins.
    HigherIsBetter,
    /// Buckets are `(max, points)`; the first with `value <= max` wins.
    LowerIsBetter,
}

#[derive(Debug)]
struct FeatureRule {
    name: &'static str,
    max_points: u16,
    direction: Direction,
    buckets: &'static [(f64, u16)],
    /// Points when no bucket matches.
    floor: u16,
}

impl FeatureRule {
    fn points(&self, value: Option<f64>) -> u16 {
        let Some(v) = value else {
            return self.neutral();
        };
        self.buckets
            .iter()
            .find(|(bound, _)| match self.direction {
                Direction::HigherIsBetter => v >= *bound,
                Direction::LowerIsBetter => v <= *bound,
            })
            .map_or(self.floor, |(_, points)| *points)
    }

    fn neutral(&self) -> u16 {
        self.max_points / 2
    }
}

const RULES: &[FeatureRule] = &[
    FeatureRule {
        name: "tx_count",
        max_points: 200,
        direction: Direction::HigherIsBetter,
        buckets: &[(100.0, 200), (50.0, 150), (20.0, 100), (5.0, 50)],
        floor: 20,
    },
    FeatureRule {
        name: "total_volume",
        max_points: 200,
        direction: Direction::HigherIsBetter,
        buckets: &[(1000.0, 200), (500.0, 150), (100.0, 100), (10.0, 50)],
        floor: 20,
    },
    FeatureRule {
        name: "stablecoin_ratio",
        max_points: 150,
        direction: Direction::HigherIsBetter,
        buckets: &[(0.7, 150), (0.5, 110), (0.3, 75), (0.1, 40)],
        floor: 15,
    },
    FeatureRule {
        name: "days_active",
        max_points: 150,
        direction: Direction::HigherIsBetter,
        buckets: &[(90.0, 150), (60.0, 110), (30.0, 75), (7.0, 40)],
        floor: 10,
    },
    FeatureRule {
        name: "unique_contracts",
        max_points: 100,
        direction: Direction::HigherIsBetter,
        buckets: &[(10.0, 100), (5.0, 70), (2.0, 40)],
        floor: 10,
    },
    FeatureRule {
        name: "volatility",
        max_points: 100,
        direction: Direction::LowerIsBetter,
        buckets: &[(0.1, 100), (0.2, 80), (0.4, 50), (0.6, 25)],
        floor: 0,
    },
    FeatureRule {
        name: "max_drawdown",
        max_points: 100,
        direction: Direction::LowerIsBetter,
        buckets: &[(0.1, 100), (0.2, 80), (0.35, 50), (0.5, 25)],
        floor: 0,
    },
];

/// Names of the features the rule-based scorer reads, in table order.
pub fn whitelist() -> impl Iterator<Item = &'static str> {
    RULES.iter().map(|r| r.name)
}

/// Output of one rule-based scoring call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleScore {
    pub score: u16,
    /// Points per whitelisted feature, in table order.
    pub points: Vec<(&'static str, u16)>,
}

impl RuleScore {
    /// The `n` largest contributions. Ties keep table order.
    pub fn top_factors(&self, n: usize) -> Vec<(&'static str, u16)> {
        let mut ranked = self.points.clone();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked.truncate(n);
        ranked
    }
}

/// Stateless bucketed scorer over the fixed feature whitelist.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBasedScorer;

impl RuleBasedScorer {
    pub fn new() -> Self {
        Self
    }

    pub fn score(&self, features: &WalletFeatures) -> RuleScore {
        let points: Vec<(&'static str, u16)> = RULES
            .iter()
            .map(|rule| (rule.name, rule.points(features.number(rule.name))))
            .collect();
        let total: u32 = points.iter().map(|(_, p)| u32::from(*p)).sum();
        RuleScore {
            score: total.min(u32::from(MAX_SCORE)) as u16,
            points,
        }
    }
}
