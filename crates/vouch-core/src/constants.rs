//! Scoring constants and documented defaults.
//!
//! Thresholds that operators may tune live in `vouch-engine`'s configuration;
//! the values here are the defaults that configuration falls back to, plus
//! the fixed protocol tables (score bounds, staking boosts).

// ---------------------------------------------------------------------------
// Score bounds
// ---------------------------------------------------------------------------

/// Lowest possible reputation score.
pub const MIN_SCORE: u16 = 0;

/// Highest possible reputation score.
pub const MAX_SCORE: u16 = 1000;

/// Score returned when no score at all can be produced.
pub const DEFAULT_SCORE: u16 = 500;

/// Explanation attached to [`DEFAULT_SCORE`].
pub const DEFAULT_EXPLANATION: &str = "Error computing score, using default";

// ---------------------------------------------------------------------------
// Risk bands
// ---------------------------------------------------------------------------

/// Base score at or above which a wallet is low risk (band 1).
pub const BAND_LOW_RISK_MIN: u16 = 750;

/// Base score at or above which a wallet is medium risk (band 2).
pub const BAND_MEDIUM_RISK_MIN: u16 = 500;

/// Base score at or above which a wallet is high risk (band 3). Scores below
/// this are also band 3; the boundary is kept so the table reads completely.
pub const BAND_HIGH_RISK_MIN: u16 = 250;

/// Minimum staking tier that earns a one-band risk improvement.
pub const BAND_IMPROVEMENT_MIN_TIER: u8 = 2;

// ---------------------------------------------------------------------------
// Staking
// ---------------------------------------------------------------------------

/// Score boost per staking tier, indexed by tier.
///
/// | Tier | Boost |
/// |------|-------|
/// | 0    | 0     |
/// | 1    | 50    |
/// | 2    | 150   |
/// | 3    | 300   |
pub const STAKING_BOOST_TABLE: [u16; 4] = [0, 50, 150, 300];

// ---------------------------------------------------------------------------
// Oracle volatility penalty defaults
// ---------------------------------------------------------------------------

/// Annualized volatility below which no penalty applies.
pub const VOLATILITY_LOW: f64 = 0.1;

/// Annualized volatility at which the penalty starts scaling up.
pub const VOLATILITY_MID: f64 = 0.2;

/// Annualized volatility at or above which the maximum penalty applies.
pub const VOLATILITY_HIGH: f64 = 0.3;

/// Penalty in the `[low, mid)` volatility band.
pub const VOLATILITY_PENALTY_MIN: u16 = 25;

/// Penalty at and above [`VOLATILITY_HIGH`].
pub const VOLATILITY_PENALTY_MAX: u16 = 50;

/// Return periods per year for daily price series.
pub const PERIODS_PER_YEAR_DAILY: f64 = 365.0;

/// Absolute bound on the optional seasonal adjustment.
pub const SEASONAL_MAX_ABS: i16 = 5;

// ---------------------------------------------------------------------------
// Recalculation defaults
// ---------------------------------------------------------------------------

/// Seconds in one day.
pub const SECONDS_PER_DAY: i64 = 86_400;

/// A prior score older than this many days is stale.
pub const DEFAULT_MAX_AGE_DAYS: u64 = 7;

/// Relative score change that justifies an on-chain write.
pub const DEFAULT_CHANGE_THRESHOLD: f64 = 0.05;

/// Concurrent addresses per batch window.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Feature cache time-to-live in seconds.
pub const DEFAULT_FEATURE_TTL_SECS: u64 = 3_600;

/// Oracle volatility cache time-to-live in seconds.
pub const DEFAULT_VOLATILITY_TTL_SECS: u64 = 900;

/// Trailing activity window in days.
pub const DEFAULT_ACTIVITY_WINDOW_DAYS: u64 = 365;

/// Trailing price window for volatility, in daily periods.
pub const DEFAULT_VOLATILITY_WINDOW: usize = 30;

/// Seconds between scheduled recalculation passes.
pub const DEFAULT_SCHEDULER_INTERVAL_SECS: u64 = 3_600;

/// Feature schema version written to the feature store.
pub const DEFAULT_FEATURE_VERSION: &str = "v1";

/// Reference asset whose volatility penalizes scores.
pub const DEFAULT_REFERENCE_ASSET: &str = "ETH";

/// Number of attribution entries quoted in an explanation.
pub const EXPLANATION_TOP_FACTORS: usize = 3;

// ---------------------------------------------------------------------------
// Feature extraction
// ---------------------------------------------------------------------------

/// Token symbols counted as stablecoins for `stablecoin_ratio`.
pub const STABLECOINS: &[&str] = &[
    "USDC", "USDT", "DAI", "BUSD", "TUSD", "USDP", "FRAX", "LUSD", "GUSD", "PYUSD",
];

/// Native asset symbol assumed when a record carries no token.
pub const NATIVE_ASSET: &str = "ETH";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staking_boost_table_is_non_decreasing() {
        for pair in STAKING_BOOST_TABLE.windows(2) {
            assert!(pair[0] <= pair[1]);
        }
    }

    #[test]
    fn volatility_thresholds_are_ordered() {
        assert!(VOLATILITY_LOW < VOLATILITY_MID);
        assert!(VOLATILITY_MID < VOLATILITY_HIGH);
        assert!(VOLATILITY_PENALTY_MIN <= VOLATILITY_PENALTY_MAX);
    }

    #[test]
    fn band_thresholds_are_ordered() {
        assert!(BAND_LOW_RISK_MIN > BAND_MEDIUM_RISK_MIN);
        assert!(BAND_MEDIUM_RISK_MIN > BAND_HIGH_RISK_MIN);
        assert!(DEFAULT_SCORE <= MAX_SCORE);
    }
}
