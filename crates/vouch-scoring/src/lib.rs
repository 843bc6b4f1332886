//! # vouch-scoring: From a feature map to a bounded, explained score.
//!
//! Everything in this crate is synchronous and free of IO except
//! [`model::FileModelLoader`], which reads model artifacts from disk.
//!
//! - [`rule::RuleBasedScorer`]: deterministic bucketed scorer; never fails.
//! - [`model::ModelScorer`]: versioned learned model with per-call fallback
//!   to the rule-based scorer.
//! - [`scorer::BaseScorer`]: strategy dispatch between the two.
//! - [`adjust`]: staking boost, volatility penalty, seasonal term.
//! - [`aggregate::ScoreAggregator`]: composes everything into a
//!   [`ScoreResult`](vouch_core::types::ScoreResult).
//! - [`explain`]: deterministic explanation text.

pub mod adjust;
pub mod aggregate;
pub mod explain;
pub mod model;
pub mod rule;
pub mod scorer;

pub use adjust::{AdjustmentPipeline, VolatilityTiers, annualized_volatility};
pub use aggregate::ScoreAggregator;
pub use model::{FileModelLoader, LinearModel, ModelScorer};
pub use rule::RuleBasedScorer;
pub use scorer::{BasePrediction, BaseScorer};
