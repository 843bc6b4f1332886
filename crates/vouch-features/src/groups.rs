//! Feature sub-extractors.
//!
//! Each sub-extractor is a pure function over an [`ExtractionContext`] and
//! returns its own group of features. Groups are independent: none reads
//! another group's output, so one group failing cannot corrupt another.
//!
//! All temporal quantities are measured against `window.end`.

use std::collections::{BTreeMap, BTreeSet};

use vouch_core::constants::{NATIVE_ASSET, SECONDS_PER_DAY, STABLECOINS};
use vouch_core::error::ExtractionError;
use vouch_core::types::{ActivityKind, ActivityRecord, ActivityWindow, FeatureMap, FeatureValue};

/// Days without activity after which a wallet is `dormant`.
pub const DORMANT_AFTER_DAYS: f64 = 180.0;

/// Transactions per 30 days at or above which a wallet is `heavy`.
pub const HEAVY_TX_PER_MONTH: f64 = 30.0;

/// Transactions per 30 days at or above which a wallet is `regular`.
pub const REGULAR_TX_PER_MONTH: f64 = 4.0;

/// Input shared by all sub-extractors.
///
/// `records` are already restricted to the window and sorted by
/// `(timestamp, hash)`.
pub struct ExtractionContext<'a> {
    pub address: &'a str,
    pub records: Vec<&'a ActivityRecord>,
    pub window: ActivityWindow,
}

impl ExtractionContext<'_> {
    fn is_outgoing(&self, rec: &ActivityRecord) -> bool {
        rec.from.eq_ignore_ascii_case(self.address)
    }

    fn is_incoming(&self, rec: &ActivityRecord) -> bool {
        rec.to.eq_ignore_ascii_case(self.address)
    }

    fn first_timestamp(&self) -> Option<i64> {
        self.records.first().map(|r| r.timestamp)
    }

    fn last_timestamp(&self) -> Option<i64> {
        self.records.last().map(|r| r.timestamp)
    }
}

/// Signature shared by every sub-extractor.
pub type SubExtractor = fn(&ExtractionContext<'_>) -> Result<FeatureMap, ExtractionError>;

/// All sub-extractors, in the order they run.
pub const SUB_EXTRACTORS: &[(&str, SubExtractor)] = &[
    ("transaction", transaction_patterns),
    ("token", token_holdings),
    ("defi", defi_interactions),
    ("network", network_breadth),
    ("temporal", temporal),
    ("financial", financial),
    ("behavioral", behavioral),
];

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn insert(map: &mut FeatureMap, name: &str, value: f64) {
    map.insert(name.to_string(), FeatureValue::Number(value));
}

/// Reject records whose amounts cannot be summed.
fn checked_value(rec: &ActivityRecord) -> Result<f64, ExtractionError> {
    if !rec.value.is_finite() || rec.value < 0.0 {
        return Err(ExtractionError::InvalidRecord {
            hash: rec.hash.clone(),
            reason: format!("value {} is not a finite non-negative amount", rec.value),
        });
    }
    Ok(rec.value)
}

fn days_between(from: i64, to: i64) -> f64 {
    to.saturating_sub(from).max(0) as f64 / SECONDS_PER_DAY as f64
}

fn day_index(timestamp: i64) -> i64 {
    timestamp.div_euclid(SECONDS_PER_DAY)
}

/// Population mean and standard deviation; `None` for an empty slice.
pub(crate) fn mean_and_std(values: &[f64]) -> Option<(f64, f64)> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Some((mean, variance.sqrt()))
}

fn ensure_finite(group: &'static str, map: FeatureMap) -> Result<FeatureMap, ExtractionError> {
    let finite = map.values().all(|v| match v {
        FeatureValue::Number(n) => n.is_finite(),
        FeatureValue::Category(_) => true,
    });
    if finite { Ok(map) } else { Err(ExtractionError::NonFinite(group)) }
}

// ---------------------------------------------------------------------------
// Sub-extractors
// ---------------------------------------------------------------------------

/// Counts and volumes: `tx_count`, `total_volume`, `avg_tx_value`,
/// `max_tx_value`, `incoming_count`, `outgoing_count`, `failed_tx_ratio`.
pub fn transaction_patterns(ctx: &ExtractionContext<'_>) -> Result<FeatureMap, ExtractionError> {
    let mut total = 0.0;
    let mut max = 0.0_f64;
    let mut incoming = 0u64;
    let mut outgoing = 0u64;
    let mut failed = 0u64;

    for rec in &ctx.records {
        let value = checked_value(rec)?;
        total += value;
        max = max.max(value);
        if ctx.is_outgoing(rec) {
            outgoing += 1;
        }
        if ctx.is_incoming(rec) {
            incoming += 1;
        }
        if !rec.success {
            failed += 1;
        }
    }

    let n = ctx.records.len() as f64;
    let mut map = FeatureMap::new();
    insert(&mut map, "tx_count", n);
    insert(&mut map, "total_volume", total);
    insert(&mut map, "avg_tx_value", if n > 0.0 { total / n } else { 0.0 });
    insert(&mut map, "max_tx_value", max);
    insert(&mut map, "incoming_count", incoming as f64);
    insert(&mut map, "outgoing_count", outgoing as f64);
    insert(&mut map, "failed_tx_ratio", if n > 0.0 { failed as f64 / n } else { 0.0 });
    ensure_finite("transaction", map)
}

/// Token mix: `stablecoin_ratio`, `token_diversity`, `dominant_token_share`.
///
/// Ratios are by volume. Records without a token count as the native asset.
pub fn token_holdings(ctx: &ExtractionContext<'_>) -> Result<FeatureMap, ExtractionError> {
    let mut per_token: BTreeMap<String, f64> = BTreeMap::new();
    let mut stable = 0.0;
    let mut total = 0.0;

    for rec in &ctx.records {
        let value = checked_value(rec)?;
        let symbol = rec
            .token
            .as_deref()
            .unwrap_or(NATIVE_ASSET)
            .to_ascii_uppercase();
        if STABLECOINS.contains(&symbol.as_str()) {
            stable += value;
        }
        total += value;
        *per_token.entry(symbol).or_insert(0.0) += value;
    }

    let dominant = per_token.values().copied().fold(0.0_f64, f64::max);
    let mut map = FeatureMap::new();
    insert(&mut map, "stablecoin_ratio", if total > 0.0 { stable / total } else { 0.0 });
    insert(&mut map, "token_diversity", per_token.len() as f64);
    insert(&mut map, "dominant_token_share", if total > 0.0 { dominant / total } else { 0.0 });
    ensure_finite("token", map)
}

/// DeFi usage: `defi_interaction_count`, `swap_count`, `lending_count`,
/// `borrow_count`, and `repay_ratio` when the wallet has borrowed.
pub fn defi_interactions(ctx: &ExtractionContext<'_>) -> Result<FeatureMap, ExtractionError> {
    let count = |kind: ActivityKind| ctx.records.iter().filter(|r| r.kind == kind).count();

    let defi = ctx.records.iter().filter(|r| r.kind.is_defi()).count();
    let borrows = count(ActivityKind::Borrow);
    let repays = count(ActivityKind::Repay);

    let mut map = FeatureMap::new();
    insert(&mut map, "defi_interaction_count", defi as f64);
    insert(&mut map, "swap_count", count(ActivityKind::Swap) as f64);
    insert(&mut map, "lending_count", count(ActivityKind::Lend) as f64);
    insert(&mut map, "borrow_count", borrows as f64);
    if borrows > 0 {
        insert(&mut map, "repay_ratio", (repays as f64 / borrows as f64).min(1.0));
    }
    Ok(map)
}

/// Breadth of the wallet's graph: `unique_counterparties`, `unique_contracts`.
pub fn network_breadth(ctx: &ExtractionContext<'_>) -> Result<FeatureMap, ExtractionError> {
    let mut counterparties = BTreeSet::new();
    let mut contracts = BTreeSet::new();

    for rec in &ctx.records {
        let other = if ctx.is_outgoing(rec) { &rec.to } else { &rec.from };
        if !other.eq_ignore_ascii_case(ctx.address) {
            counterparties.insert(other.to_ascii_lowercase());
        }
        match (&rec.contract, rec.kind) {
            (Some(contract), _) => {
                contracts.insert(contract.to_ascii_lowercase());
            }
            (None, ActivityKind::ContractCall) => {
                contracts.insert(rec.to.to_ascii_lowercase());
            }
            _ => {}
        }
    }

    let mut map = FeatureMap::new();
    insert(&mut map, "unique_counterparties", counterparties.len() as f64);
    insert(&mut map, "unique_contracts", contracts.len() as f64);
    Ok(map)
}

/// Time span features: `days_active` (first to last record), `active_day_count`,
/// `wallet_age_days` and `days_since_last_tx` (both relative to `window.end`).
pub fn temporal(ctx: &ExtractionContext<'_>) -> Result<FeatureMap, ExtractionError> {
    let (Some(first), Some(last)) = (ctx.first_timestamp(), ctx.last_timestamp()) else {
        return Ok(FeatureMap::new());
    };
    let active_days: BTreeSet<i64> = ctx.records.iter().map(|r| day_index(r.timestamp)).collect();

    let mut map = FeatureMap::new();
    insert(&mut map, "days_active", days_between(first, last));
    insert(&mut map, "active_day_count", active_days.len() as f64);
    insert(&mut map, "wallet_age_days", days_between(first, ctx.window.end));
    insert(&mut map, "days_since_last_tx", days_between(last, ctx.window.end));
    Ok(map)
}

/// Balance-path features from cumulative net flow: `net_flow`,
/// `max_drawdown` (largest peak-to-trough fall relative to the peak, `0–1`)
/// and `volatility` (std-dev of day-over-day relative balance changes, only
/// when at least two changes exist).
pub fn financial(ctx: &ExtractionContext<'_>) -> Result<FeatureMap, ExtractionError> {
    let mut balance = 0.0_f64;
    let mut peak = 0.0_f64;
    let mut max_drawdown = 0.0_f64;
    let mut day_end: BTreeMap<i64, f64> = BTreeMap::new();

    for rec in &ctx.records {
        let value = checked_value(rec)?;
        if ctx.is_incoming(rec) && rec.success {
            balance += value;
        }
        if ctx.is_outgoing(rec) {
            if rec.success {
                balance -= value;
            }
            if rec.fee.is_finite() && rec.fee > 0.0 {
                balance -= rec.fee;
            }
        }
        peak = peak.max(balance);
        if peak > 0.0 {
            max_drawdown = max_drawdown.max(((peak - balance) / peak).clamp(0.0, 1.0));
        }
        day_end.insert(day_index(rec.timestamp), balance);
    }

    let balances: Vec<f64> = day_end.into_values().collect();
    let returns: Vec<f64> = balances
        .windows(2)
        .filter(|w| w[0].abs() > f64::EPSILON)
        .map(|w| (w[1] - w[0]) / w[0].abs())
        .collect();

    let mut map = FeatureMap::new();
    insert(&mut map, "net_flow", balance);
    insert(&mut map, "max_drawdown", max_drawdown);
    if returns.len() >= 2 {
        if let Some((_, std)) = mean_and_std(&returns) {
            insert(&mut map, "volatility", std);
        }
    }
    ensure_finite("financial", map)
}

/// Rhythm of activity: `tx_interval_regularity` (`1 / (1 + cv)` of the gaps
/// between records), `burstiness` (busiest day's share of all records) and the
/// categorical `activity_profile`.
pub fn behavioral(ctx: &ExtractionContext<'_>) -> Result<FeatureMap, ExtractionError> {
    let (Some(first), Some(last)) = (ctx.first_timestamp(), ctx.last_timestamp()) else {
        return Ok(FeatureMap::new());
    };
    let n = ctx.records.len() as f64;

    let gaps: Vec<f64> = ctx
        .records
        .windows(2)
        .map(|w| (w[1].timestamp - w[0].timestamp) as f64)
        .collect();

    let mut per_day: BTreeMap<i64, u64> = BTreeMap::new();
    for rec in &ctx.records {
        *per_day.entry(day_index(rec.timestamp)).or_insert(0) += 1;
    }
    let busiest = per_day.values().copied().max().unwrap_or(0) as f64;

    let span_months = (days_between(first, last) / 30.0).max(1.0);
    let tx_per_month = n / span_months;
    let profile = if days_between(last, ctx.window.end) > DORMANT_AFTER_DAYS {
        "dormant"
    } else if tx_per_month >= HEAVY_TX_PER_MONTH {
        "heavy"
    } else if tx_per_month >= REGULAR_TX_PER_MONTH {
        "regular"
    } else {
        "occasional"
    };

    let mut map = FeatureMap::new();
    if let Some((mean, std)) = mean_and_std(&gaps) {
        let regularity = if mean > 0.0 { 1.0 / (1.0 + std / mean) } else { 0.0 };
        insert(&mut map, "tx_interval_regularity", regularity);
    }
    insert(&mut map, "burstiness", busiest / n);
    map.insert("activity_profile".to_string(), FeatureValue::from(profile));
    ensure_finite("behavioral", map)
}
