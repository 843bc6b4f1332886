//! Core domain types: wallet activity, feature maps, scores and audit records.
//!
//! Scores are dimensionless integers in `0–1000`. Timestamps are unix seconds
//! (`i64`). Monetary values in activity records are expressed in a single
//! reference currency so they can be summed across tokens.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{
    BAND_HIGH_RISK_MIN, BAND_LOW_RISK_MIN, BAND_MEDIUM_RISK_MIN, DEFAULT_EXPLANATION,
    DEFAULT_SCORE, SECONDS_PER_DAY, STAKING_BOOST_TABLE,
};
use crate::error::AddressError;

// ---------------------------------------------------------------------------
// Addresses
// ---------------------------------------------------------------------------

/// Normalize a wallet address for use as a cache and storage key.
///
/// Surrounding whitespace is trimmed. EVM-style `0x` addresses must be valid
/// hex and are lower-cased so that checksummed and plain spellings share one
/// key. Other address formats are accepted verbatim. `/` is rejected because
/// stores use it as a key separator.
///
/// ```
/// use vouch_core::types::normalize_address;
///
/// assert_eq!(
///     normalize_address(" 0xAbCdEf0000000000000000000000000000000001 ").unwrap(),
///     "0xabcdef0000000000000000000000000000000001",
/// );
/// assert!(normalize_address("").is_err());
/// assert!(normalize_address("0xZZ").is_err());
/// ```
pub fn normalize_address(raw: &str) -> Result<String, AddressError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AddressError::Empty);
    }
    if let Some(c) = trimmed.chars().find(|c| *c == '/' || c.is_whitespace()) {
        return Err(AddressError::InvalidCharacter(c));
    }
    if let Some(body) = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        hex::decode(body).map_err(|_| AddressError::InvalidHex)?;
        return Ok(format!("0x{}", body.to_ascii_lowercase()));
    }
    Ok(trimmed.to_string())
}

// ---------------------------------------------------------------------------
// Activity feed records
// ---------------------------------------------------------------------------

/// Category of an on-chain activity record.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Transfer,
    TokenTransfer,
    ContractCall,
    Swap,
    Lend,
    Borrow,
    Repay,
    Stake,
}

impl ActivityKind {
    /// Whether this activity is an interaction with a DeFi protocol.
    pub fn is_defi(self) -> bool {
        matches!(
            self,
            Self::Swap | Self::Lend | Self::Borrow | Self::Repay | Self::Stake
        )
    }
}

/// One transaction or token transfer touching a wallet.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ActivityRecord {
    /// Transaction hash.
    pub hash: String,
    /// Block timestamp, unix seconds.
    pub timestamp: i64,
    /// Sender address.
    pub from: String,
    /// Recipient address (or the contract called).
    pub to: String,
    /// Value moved, in reference-currency units.
    pub value: f64,
    /// Token symbol; `None` for the native asset.
    #[serde(default)]
    pub token: Option<String>,
    pub kind: ActivityKind,
    /// Contract address interacted with, if any.
    #[serde(default)]
    pub contract: Option<String>,
    #[serde(default = "default_success")]
    pub success: bool,
    /// Fee paid, in reference-currency units.
    #[serde(default)]
    pub fee: f64,
}

fn default_success() -> bool {
    true
}

/// Closed time interval `[start, end]` in unix seconds.
///
/// Temporal features are measured relative to `end`, which keeps extraction
/// independent of the wall clock.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct ActivityWindow {
    pub start: i64,
    pub end: i64,
}

impl ActivityWindow {
    /// The `days`-long window ending at `end`.
    ///
    /// ```
    /// use vouch_core::types::ActivityWindow;
    ///
    /// let w = ActivityWindow::trailing(864_000, 10);
    /// assert_eq!(w.start, 0);
    /// assert!(w.contains(0) && w.contains(864_000));
    /// assert!(!w.contains(864_001));
    /// ```
    pub fn trailing(end: i64, days: u64) -> Self {
        let span = (days as i64).saturating_mul(SECONDS_PER_DAY);
        Self {
            start: end.saturating_sub(span),
            end,
        }
    }

    pub fn contains(&self, timestamp: i64) -> bool {
        timestamp >= self.start && timestamp <= self.end
    }
}

// ---------------------------------------------------------------------------
// Features
// ---------------------------------------------------------------------------

/// A single feature value: numeric or categorical.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, bincode::Encode, bincode::Decode,
)]
#[serde(untagged)]
pub enum FeatureValue {
    Number(f64),
    Category(String),
}

impl From<f64> for FeatureValue {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<&str> for FeatureValue {
    fn from(v: &str) -> Self {
        Self::Category(v.to_string())
    }
}

/// Mutable map a sub-extractor fills in before it is frozen into
/// [`WalletFeatures`].
pub type FeatureMap = BTreeMap<String, FeatureValue>;

/// Immutable, name-ordered feature map for one wallet.
///
/// Ordered by feature name so iteration, serialization and attribution
/// tie-breaking are deterministic.
#[derive(
    Serialize, Deserialize, Clone, Debug, Default, PartialEq, bincode::Encode, bincode::Decode,
)]
#[serde(transparent)]
pub struct WalletFeatures(FeatureMap);

impl WalletFeatures {
    pub fn new(map: FeatureMap) -> Self {
        Self(map)
    }

    /// A map with no features (no data for the wallet).
    pub fn empty() -> Self {
        Self(FeatureMap::new())
    }

    /// Build a purely numeric feature map.
    ///
    /// ```
    /// use vouch_core::types::WalletFeatures;
    ///
    /// let f = WalletFeatures::from_numbers(&[("tx_count", 150.0)]);
    /// assert_eq!(f.number("tx_count"), Some(150.0));
    /// assert_eq!(f.number("missing"), None);
    /// ```
    pub fn from_numbers(entries: &[(&str, f64)]) -> Self {
        entries
            .iter()
            .map(|(k, v)| ((*k).to_string(), FeatureValue::Number(*v)))
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<&FeatureValue> {
        self.0.get(name)
    }

    /// Numeric value of a feature; `None` if missing, categorical or non-finite.
    pub fn number(&self, name: &str) -> Option<f64> {
        match self.0.get(name) {
            Some(FeatureValue::Number(v)) if v.is_finite() => Some(*v),
            _ => None,
        }
    }

    /// Categorical value of a feature; `None` if missing or numeric.
    pub fn category(&self, name: &str) -> Option<&str> {
        match self.0.get(name) {
            Some(FeatureValue::Category(c)) => Some(c.as_str()),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FeatureValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn as_map(&self) -> &FeatureMap {
        &self.0
    }
}

impl From<FeatureMap> for WalletFeatures {
    fn from(map: FeatureMap) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, FeatureValue)> for WalletFeatures {
    fn from_iter<I: IntoIterator<Item = (String, FeatureValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Persisted form of a feature map.
///
/// `extracted_at` drives cache expiry only and is never part of the features.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, bincode::Encode, bincode::Decode,
)]
pub struct StoredFeatures {
    pub features: WalletFeatures,
    pub extracted_at: i64,
}

// ---------------------------------------------------------------------------
// Staking tier
// ---------------------------------------------------------------------------

/// Staking tier `0–3` with a fixed score boost per tier.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
#[serde(into = "u8", try_from = "u8")]
pub enum StakingTier {
    #[default]
    Unstaked = 0,
    Tier1 = 1,
    Tier2 = 2,
    Tier3 = 3,
}

impl StakingTier {
    pub const ALL: [StakingTier; 4] = [Self::Unstaked, Self::Tier1, Self::Tier2, Self::Tier3];

    /// Tier for a raw on-chain value; `None` above 3.
    pub fn from_u8(tier: u8) -> Option<Self> {
        Self::ALL.get(tier as usize).copied()
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Score boost for this tier (see [`STAKING_BOOST_TABLE`]).
    ///
    /// ```
    /// use vouch_core::types::StakingTier;
    ///
    /// assert_eq!(StakingTier::Unstaked.boost(), 0);
    /// assert_eq!(StakingTier::Tier3.boost(), 300);
    /// ```
    pub fn boost(self) -> u16 {
        STAKING_BOOST_TABLE[self as usize]
    }
}

impl From<StakingTier> for u8 {
    fn from(t: StakingTier) -> u8 {
        t.as_u8()
    }
}

impl TryFrom<u8> for StakingTier {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        Self::from_u8(v).ok_or_else(|| format!("staking tier out of range: {v}"))
    }
}

impl fmt::Display for StakingTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

// ---------------------------------------------------------------------------
// Risk band
// ---------------------------------------------------------------------------

/// Discrete risk band: 1 = low, 2 = medium, 3 = high, 0 = unknown (no data).
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(into = "u8", try_from = "u8")]
pub enum RiskBand {
    Unknown = 0,
    Low = 1,
    Medium = 2,
    High = 3,
}

impl RiskBand {
    /// Band for a base score.
    ///
    /// | Base score | Band |
    /// |------------|------|
    /// | 750–1000   | 1    |
    /// | 500–749    | 2    |
    /// | 0–499      | 3    |
    ///
    /// ```
    /// use vouch_core::types::RiskBand;
    ///
    /// assert_eq!(RiskBand::from_base_score(750), RiskBand::Low);
    /// assert_eq!(RiskBand::from_base_score(749), RiskBand::Medium);
    /// assert_eq!(RiskBand::from_base_score(0), RiskBand::High);
    /// ```
    pub fn from_base_score(score: u16) -> Self {
        match score {
            s if s >= BAND_LOW_RISK_MIN => Self::Low,
            s if s >= BAND_MEDIUM_RISK_MIN => Self::Medium,
            s if s >= BAND_HIGH_RISK_MIN => Self::High,
            _ => Self::High,
        }
    }

    /// One band lower risk. Low and Unknown are returned unchanged so that
    /// improvement can never produce band 0.
    pub fn improved(self) -> Self {
        match self {
            Self::High => Self::Medium,
            Self::Medium => Self::Low,
            other => other,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl From<RiskBand> for u8 {
    fn from(b: RiskBand) -> u8 {
        b.as_u8()
    }
}

impl TryFrom<u8> for RiskBand {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(Self::Unknown),
            1 => Ok(Self::Low),
            2 => Ok(Self::Medium),
            3 => Ok(Self::High),
            _ => Err(format!("risk band out of range: {v}")),
        }
    }
}

impl fmt::Display for RiskBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

// Both enums are stored as their single-byte wire value so the on-disk
// encoding matches the JSON one.
macro_rules! impl_u8_codec {
    ($ty:ty, $what:literal) => {
        impl bincode::Encode for $ty {
            fn encode<E: bincode::enc::Encoder>(
                &self,
                encoder: &mut E,
            ) -> Result<(), bincode::error::EncodeError> {
                bincode::Encode::encode(&self.as_u8(), encoder)
            }
        }

        impl<Context> bincode::Decode<Context> for $ty {
            fn decode<D: bincode::de::Decoder<Context = Context>>(
                decoder: &mut D,
            ) -> Result<Self, bincode::error::DecodeError> {
                let raw: u8 = bincode::Decode::decode(decoder)?;
                <$ty>::try_from(raw).map_err(|_| bincode::error::DecodeError::Other($what))
            }
        }

        bincode::impl_borrow_decode!($ty);
    };
}

impl_u8_codec!(StakingTier, "staking tier out of range");
impl_u8_codec!(RiskBand, "risk band out of range");

// ---------------------------------------------------------------------------
// Score result
// ---------------------------------------------------------------------------

/// Final output of one scoring call. Never mutated after construction.
///
/// `score = clamp(base_score - oracle_penalty + staking_boost + seasonal_adjustment, 0, 1000)`
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq, bincode::Encode, bincode::Decode,
)]
#[serde(rename_all = "camelCase")]
pub struct ScoreResult {
    pub score: u16,
    pub risk_band: RiskBand,
    pub explanation: String,
    pub base_score: u16,
    pub staking_boost: u16,
    pub oracle_penalty: u16,
    /// Signed seasonal term, `0` when the adjustment is disabled.
    pub seasonal_adjustment: i16,
    pub staked_amount: u128,
    pub staking_tier: StakingTier,
    pub model_version: Option<String>,
    pub ml_used: bool,
}

impl ScoreResult {
    /// The documented result when no score at all can be produced.
    pub fn fallback_default() -> Self {
        Self {
            score: DEFAULT_SCORE,
            risk_band: RiskBand::Medium,
            explanation: DEFAULT_EXPLANATION.to_string(),
            base_score: DEFAULT_SCORE,
            staking_boost: 0,
            oracle_penalty: 0,
            seasonal_adjustment: 0,
            staked_amount: 0,
            staking_tier: StakingTier::Unstaked,
            model_version: None,
            ml_used: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Persistence records
// ---------------------------------------------------------------------------

/// Latest accepted score for an address.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq, bincode::Encode, bincode::Decode,
)]
pub struct ScoreRecord {
    pub result: ScoreResult,
    /// When the score was computed, unix seconds.
    pub last_updated: i64,
    /// Newest activity timestamp known when the score was computed.
    pub last_activity_at: Option<i64>,
    /// Score most recently confirmed on-chain, the baseline for the write gate.
    #[serde(default)]
    pub last_written_score: Option<u16>,
}

/// Why a recalculation was accepted.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, bincode::Encode, bincode::Decode,
)]
#[serde(rename_all = "snake_case")]
pub enum ChangeReason {
    Initial,
    NewActivity,
    MaxAge,
    Forced,
}

impl fmt::Display for ChangeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Initial => "initial",
            Self::NewActivity => "new_activity",
            Self::MaxAge => "max_age",
            Self::Forced => "forced",
        };
        f.write_str(s)
    }
}

/// Append-only audit record, one per accepted recalculation.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq, bincode::Encode, bincode::Decode,
)]
#[serde(rename_all = "camelCase")]
pub struct ScoreHistoryEntry {
    pub previous_score: Option<u16>,
    pub new_score: u16,
    pub change_reason: ChangeReason,
    pub explanation: String,
    pub timestamp: i64,
}

/// Scheduler cursor: the last address fully processed in the current pass.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq, bincode::Encode, bincode::Decode,
)]
pub struct Checkpoint {
    pub pass_started_at: i64,
    pub last_address: String,
}
