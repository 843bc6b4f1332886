//! Engine configuration.
//!
//! [`EngineConfig`] is resolved from, lowest priority first:
//! 1. compiled defaults ([`EngineConfig::default`])
//! 2. an optional TOML file
//! 3. `VOUCH__*` environment variables (`VOUCH__BATCH_SIZE=20`,
//!    `VOUCH__VOLATILITY__HIGH=0.4`)
//!
//! The result is validated before use; a bad threshold ordering aborts
//! startup rather than producing inverted penalties.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use vouch_core::constants::{
    DEFAULT_ACTIVITY_WINDOW_DAYS, DEFAULT_BATCH_SIZE, DEFAULT_CHANGE_THRESHOLD,
    DEFAULT_FEATURE_TTL_SECS, DEFAULT_FEATURE_VERSION, DEFAULT_MAX_AGE_DAYS,
    DEFAULT_REFERENCE_ASSET, DEFAULT_SCHEDULER_INTERVAL_SECS, DEFAULT_VOLATILITY_TTL_SECS,
    DEFAULT_VOLATILITY_WINDOW, SECONDS_PER_DAY,
};
use vouch_core::error::ConfigError;
use vouch_scoring::adjust::SeasonalTable;
use vouch_scoring::VolatilityTiers;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "VOUCH";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Root directory for all persistent data.
    pub data_dir: PathBuf,
    /// Log level filter string (e.g. "info", "vouch_engine=debug").
    pub log_level: String,
    /// A prior score older than this is stale.
    pub max_age_days: u64,
    /// Relative change required before a score is written on-chain.
    pub change_threshold: f64,
    /// Addresses processed concurrently per batch window.
    pub batch_size: usize,
    pub feature_ttl_secs: u64,
    pub feature_version: String,
    pub activity_window_days: u64,
    pub volatility: VolatilityTiers,
    /// Trailing daily prices used for the volatility estimate.
    pub volatility_window: usize,
    pub volatility_cache_ttl_secs: u64,
    pub reference_asset: String,
    pub seasonal: SeasonalTable,
    pub scheduler_interval_secs: u64,
    /// Model artifact version to load; rule-based scoring when unset.
    pub model_version: Option<String>,
    /// Directory holding `<version>.json` artifacts. Defaults to `<data_dir>/models`.
    pub model_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("vouch");

        Self {
            data_dir,
            log_level: "info".to_string(),
            max_age_days: DEFAULT_MAX_AGE_DAYS,
            change_threshold: DEFAULT_CHANGE_THRESHOLD,
            batch_size: DEFAULT_BATCH_SIZE,
            feature_ttl_secs: DEFAULT_FEATURE_TTL_SECS,
            feature_version: DEFAULT_FEATURE_VERSION.to_string(),
            activity_window_days: DEFAULT_ACTIVITY_WINDOW_DAYS,
            volatility: VolatilityTiers::default(),
            volatility_window: DEFAULT_VOLATILITY_WINDOW,
            volatility_cache_ttl_secs: DEFAULT_VOLATILITY_TTL_SECS,
            reference_asset: DEFAULT_REFERENCE_ASSET.to_string(),
            seasonal: SeasonalTable::default(),
            scheduler_interval_secs: DEFAULT_SCHEDULER_INTERVAL_SECS,
            model_version: None,
            model_dir: None,
        }
    }
}

impl EngineConfig {
    /// Resolve defaults, `file` (if given and present) and environment, then validate.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let cfg: Self = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| ConfigError::Load(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check ranges and threshold ordering.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if !(self.change_threshold.is_finite() && self.change_threshold >= 0.0) {
            return invalid(format!(
                "change_threshold must be a non-negative number, got {}",
                self.change_threshold
            ));
        }
        if self.batch_size == 0 {
            return invalid("batch_size must be greater than 0".into());
        }
        if self.max_age_days == 0 {
            return invalid("max_age_days must be greater than 0".into());
        }
        if self.activity_window_days == 0 {
            return invalid("activity_window_days must be greater than 0".into());
        }
        if self.volatility_window < 3 {
            return invalid("volatility_window must cover at least 3 prices".into());
        }
        if self.feature_version.is_empty() || self.feature_version.contains('/') {
            return invalid(format!("invalid feature_version: {:?}", self.feature_version));
        }
        if self.reference_asset.is_empty() {
            return invalid("reference_asset must not be empty".into());
        }
        self.volatility.validate().map_err(ConfigError::Invalid)?;
        Ok(())
    }

    /// Path to the RocksDB data directory.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("vouchdb")
    }

    pub fn model_dir(&self) -> PathBuf {
        self.model_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("models"))
    }

    pub fn max_age_secs(&self) -> i64 {
        (self.max_age_days as i64).saturating_mul(SECONDS_PER_DAY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.max_age_days, 7);
        assert_eq!(cfg.change_threshold, 0.05);
        assert_eq!(cfg.batch_size, 10);
        assert_eq!(cfg.feature_ttl_secs, 3_600);
        assert_eq!(cfg.volatility_cache_ttl_secs, 900);
        assert_eq!(cfg.scheduler_interval_secs, 3_600);
        assert_eq!(cfg.feature_version, "v1");
        assert_eq!(cfg.reference_asset, "ETH");
        assert!(!cfg.seasonal.enabled);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn default_data_dir_ends_with_vouch() {
        let cfg = EngineConfig::default();
        assert!(cfg.data_dir.ends_with("vouch"), "{:?}", cfg.data_dir);
        assert!(cfg.db_path().ends_with("vouch/vouchdb"));
        assert!(cfg.model_dir().ends_with("vouch/models"));
    }

    #[test]
    fn max_age_in_seconds() {
        assert_eq!(EngineConfig::default().max_age_secs(), 7 * 86_400);
    }

    #[test]
    fn load_reads_toml_file_over_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
batch_size = 4
change_threshold = 0.1
model_version = "v2"

[volatility]
high = 0.4
"#
        )
        .unwrap();

        let cfg = EngineConfig::load(Some(file.path())).unwrap();
        assert_eq!(cfg.batch_size, 4);
        assert_eq!(cfg.change_threshold, 0.1);
        assert_eq!(cfg.model_version.as_deref(), Some("v2"));
        assert_eq!(cfg.volatility.high, 0.4);
        // Untouched fields keep their defaults.
        assert_eq!(cfg.volatility.low, 0.1);
        assert_eq!(cfg.max_age_days, 7);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = EngineConfig::load(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(cfg.batch_size, EngineConfig::default().batch_size);
    }

    #[test]
    fn load_rejects_unordered_thresholds() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[volatility]\nlow = 0.5").unwrap();
        let err = EngineConfig::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)), "{err}");
    }

    #[test]
    fn validate_rejects_bad_values() {
        let cases = [
            EngineConfig { batch_size: 0, ..EngineConfig::default() },
            EngineConfig { change_threshold: -0.1, ..EngineConfig::default() },
            EngineConfig { change_threshold: f64::NAN, ..EngineConfig::default() },
            EngineConfig { volatility_window: 2, ..EngineConfig::default() },
            EngineConfig { feature_version: "a/b".into(), ..EngineConfig::default() },
        ];
        for cfg in cases {
            assert!(cfg.validate().is_err(), "{cfg:?}");
        }
    }
}
