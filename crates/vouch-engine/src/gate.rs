//! Recalculation gate.
//!
//! Two independent decisions per address:
//!
//! 1. **Freshness**: should the score be recomputed at all?
//!    - no prior score: [`Freshness::Unknown`], recompute
//!    - new activity since the prior score, or the prior score is older than
//!      `max_age`: [`Freshness::Stale`], recompute
//!    - otherwise [`Freshness::Fresh`], skip unless forced
//! 2. **Write**: after recomputing, is the change large enough to justify an
//!    on-chain write? `|new - old| / old >= change_threshold`, or forced.

use std::fmt;

use vouch_core::error::FeedError;
use vouch_core::types::{ChangeReason, ScoreRecord};

/// Why a prior score is stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaleReason {
    NewActivity,
    MaxAge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Unknown,
    Stale(StaleReason),
    Fresh,
}

impl Freshness {
    pub fn needs_recompute(self) -> bool {
        !matches!(self, Self::Fresh)
    }

    /// History reason for a recalculation in this state.
    pub fn change_reason(self, force: bool) -> ChangeReason {
        match self {
            Self::Unknown => ChangeReason::Initial,
            _ if force => ChangeReason::Forced,
            Self::Stale(StaleReason::NewActivity) => ChangeReason::NewActivity,
            Self::Stale(StaleReason::MaxAge) => ChangeReason::MaxAge,
            Self::Fresh => ChangeReason::Forced,
        }
    }
}

impl fmt::Display for Freshness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => f.write_str("unknown"),
            Self::Stale(StaleReason::NewActivity) => f.write_str("stale (new activity)"),
            Self::Stale(StaleReason::MaxAge) => f.write_str("stale (max age)"),
            Self::Fresh => f.write_str("fresh"),
        }
    }
}

/// Outcome of the write gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteDecision {
    Write,
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecalculationGate {
    max_age_secs: i64,
    change_threshold: f64,
}

impl RecalculationGate {
    pub fn new(max_age_secs: i64, change_threshold: f64) -> Self {
        Self {
            max_age_secs,
            change_threshold,
        }
    }

    /// Classify the prior score for an address at time `now`.
    ///
    /// `latest_activity` is the feed's newest activity timestamp. A failed
    /// lookup counts as new activity so that an outage never pins a stale
    /// score in place.
    pub fn assess(
        &self,
        prior: Option<&ScoreRecord>,
        latest_activity: &Result<Option<i64>, FeedError>,
        now: i64,
    ) -> Freshness {
        let Some(prior) = prior else {
            return Freshness::Unknown;
        };

        let new_activity = match latest_activity {
            Err(_) => true,
            Ok(None) => false,
            // Compare against the newest activity the prior score saw when
            // known; otherwise against when it was computed.
            Ok(Some(ts)) => *ts > prior.last_activity_at.unwrap_or(prior.last_updated),
        };
        if new_activity {
            return Freshness::Stale(StaleReason::NewActivity);
        }
        if now.saturating_sub(prior.last_updated) > self.max_age_secs {
            return Freshness::Stale(StaleReason::MaxAge);
        }
        Freshness::Fresh
    }

    /// Decide whether a recomputed score should be written on-chain.
    ///
    /// `old` is the score last confirmed on-chain, not the last one computed,
    /// so a run of small moves is measured against what the chain holds.
    pub fn write_decision(&self, old: Option<u16>, new: u16, force: bool) -> WriteDecision {
        if force {
            return WriteDecision::Write;
        }
        let decision = match old {
            None => true,
            Some(0) => new != 0,
            Some(old) => {
                let change = (f64::from(new) - f64::from(old)).abs() / f64::from(old);
                change >= self.change_threshold
            }
        };
        if decision { WriteDecision::Write } else { WriteDecision::Skip }
    }
}
