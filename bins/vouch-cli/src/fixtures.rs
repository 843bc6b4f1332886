//! File-backed collaborators for running the pipeline offline.
//!
//! A fixture file is JSON:
//!
//! ```json
//! {
//!   "activity": { "0xabc…": [ { "hash": "…", "timestamp": 0, … } ] },
//!   "staking":  { "0xabc…": { "tier": 2, "amount": 5000 } },
//!   "prices":   { "ETH": [2010.5, 1998.0, …] }
//! }
//! ```
//!
//! Addresses are normalized on load. Prices are ordered oldest first.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::info;

use vouch_core::error::{FeedError, OracleError, StakingError, WriteError};
use vouch_core::traits::{ActivityFeed, PriceOracle, ScoreWriter, StakingLookup};
use vouch_core::types::{ActivityRecord, ActivityWindow, ScoreResult, normalize_address};

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct StakePosition {
    pub tier: u8,
    #[serde(default)]
    pub amount: u128,
}

#[derive(Debug, Default, Deserialize)]
pub struct Fixtures {
    #[serde(default)]
    activity: HashMap<String, Vec<ActivityRecord>>,
    #[serde(default)]
    staking: HashMap<String, StakePosition>,
    #[serde(default)]
    prices: HashMap<String, Vec<f64>>,
}

impl Fixtures {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read fixtures: {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("invalid fixtures: {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let parsed: Self = serde_json::from_str(raw)?;
        let activity = parsed
            .activity
            .into_iter()
            .map(|(a, records)| -> Result<(String, Vec<ActivityRecord>)> {
                Ok((normalize_address(&a)?, records))
            })
            .collect::<Result<_>>()?;
        let staking = parsed
            .staking
            .into_iter()
            .map(|(a, pos)| -> Result<(String, StakePosition)> {
                Ok((normalize_address(&a)?, pos))
            })
            .collect::<Result<_>>()?;
        Ok(Self {
            activity,
            staking,
            prices: parsed.prices,
        })
    }

    /// Every address with activity or a stake, sorted.
    pub fn addresses(&self) -> Vec<String> {
        let mut all: Vec<String> = self
            .activity
            .keys()
            .chain(self.staking.keys())
            .cloned()
            .collect();
        all.sort();
        all.dedup();
        all
    }
}

#[async_trait]
impl ActivityFeed for Fixtures {
    async fn get_activity(
        &self,
        address: &str,
        window: ActivityWindow,
    ) -> Result<Vec<ActivityRecord>, FeedError> {
        Ok(self
            .activity
            .get(address)
            .map(|rs| rs.iter().filter(|r| window.contains(r.timestamp)).cloned().collect())
            .unwrap_or_default())
    }

    async fn last_activity_at(&self, address: &str) -> Result<Option<i64>, FeedError> {
        Ok(self
            .activity
            .get(address)
            .and_then(|rs| rs.iter().map(|r| r.timestamp).max()))
    }
}

#[async_trait]
impl StakingLookup for Fixtures {
    async fn tier(&self, address: &str) -> Result<u8, StakingError> {
        Ok(self.staking.get(address).map_or(0, |p| p.tier))
    }

    async fn staked_amount(&self, address: &str) -> Result<u128, StakingError> {
        Ok(self.staking.get(address).map_or(0, |p| p.amount))
    }
}

#[async_trait]
impl PriceOracle for Fixtures {
    async fn price(&self, asset: &str) -> Result<f64, OracleError> {
        self.prices
            .get(asset)
            .and_then(|p| p.last().copied())
            .ok_or_else(|| OracleError::Unavailable(format!("no prices for {asset}")))
    }

    async fn price_history(&self, asset: &str, periods: usize) -> Result<Vec<f64>, OracleError> {
        let series = self
            .prices
            .get(asset)
            .ok_or_else(|| OracleError::Unavailable(format!("no prices for {asset}")))?;
        let start = series.len().saturating_sub(periods);
        Ok(series[start..].to_vec())
    }
}

/// Logs the update instead of submitting it and returns a receipt hash
/// derived from the payload.
pub struct DryRunWriter;

impl DryRunWriter {
    pub fn receipt(address: &str, result: &ScoreResult) -> String {
        let mut hasher = Sha256::new();
        hasher.update(address.as_bytes());
        hasher.update(result.score.to_be_bytes());
        hasher.update([result.risk_band.as_u8()]);
        hasher.update(result.explanation.as_bytes());
        format!("0x{}", hex::encode(hasher.finalize()))
    }
}

#[async_trait]
impl ScoreWriter for DryRunWriter {
    async fn write_score(&self, address: &str, result: &ScoreResult) -> Result<String, WriteError> {
        let receipt = Self::receipt(address, result);
        info!(
            %address,
            score = result.score,
            band = result.risk_band.as_u8(),
            %receipt,
            "dry-run: score update"
        );
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"{
        "activity": {
            "0xAB00000000000000000000000000000000000001": [
                {"hash": "h1", "timestamp": 100, "from": "0xpeer", "to": "0xab00000000000000000000000000000000000001",
                 "value": 12.5, "token": "USDC", "kind": "token_transfer"},
                {"hash": "h2", "timestamp": 300, "from": "0xab00000000000000000000000000000000000001", "to": "0xpeer",
                 "value": 2.0, "kind": "transfer"}
            ]
        },
        "staking": { "0xab00000000000000000000000000000000000002": { "tier": 3, "amount": 90000 } },
        "prices": { "ETH": [1.0, 2.0, 3.0, 4.0] }
    }"#;

    const A1: &str = "0xab00000000000000000000000000000000000001";
    const A2: &str = "0xab00000000000000000000000000000000000002";

    #[tokio::test]
    async fn parses_and_normalizes() {
        let f = Fixtures::parse(FIXTURE).unwrap();
        assert_eq!(f.addresses(), vec![A1.to_string(), A2.to_string()]);
        assert_eq!(f.last_activity_at(A1).await.unwrap(), Some(300));
        let window = ActivityWindow { start: 0, end: 200 };
        assert_eq!(f.get_activity(A1, window).await.unwrap().len(), 1);
        assert_eq!(f.tier(A2).await.unwrap(), 3);
        assert_eq!(f.staked_amount(A2).await.unwrap(), 90_000);
        assert_eq!(f.tier(A1).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn price_history_returns_most_recent_periods() {
        let f = Fixtures::parse(FIXTURE).unwrap();
        assert_eq!(f.price_history("ETH", 2).await.unwrap(), vec![3.0, 4.0]);
        assert_eq!(f.price("ETH").await.unwrap(), 4.0);
        assert!(f.price_history("BTC", 2).await.is_err());
    }

    #[test]
    fn rejects_invalid_addresses() {
        assert!(Fixtures::parse(r#"{"staking": {"0xZZ": {"tier": 1}}}"#).is_err());
    }

    #[test]
    fn receipt_is_deterministic() {
        let result = ScoreResult::fallback_default();
        let a = DryRunWriter::receipt(A1, &result);
        assert_eq!(a, DryRunWriter::receipt(A1, &result));
        assert_ne!(a, DryRunWriter::receipt(A2, &result));
        assert_eq!(a.len(), 66);
    }
}
