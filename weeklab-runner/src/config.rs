//! Serializable run configuration.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use weeklab_core::fill::FillKind;
use weeklab_core::store::AssetClass;
use weeklab_core::strategy::StrategyKind;

/// Unique identifier for a backtest run (content-addressable hash).
pub type RunId = String;

/// Which sampling strategy the planner uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SamplingStrategyKind {
    /// Stratified weeks per historical era, plus event and seasonal weeks.
    Comprehensive,
    /// Comprehensive, then capped per regime label.
    RegimeFocused,
    /// Only stress-event weeks and their recovery weeks.
    EventDriven,
    /// Only the curated list of historically known crisis weeks.
    StressTest,
    /// Only the seasonal anchor weeks.
    Seasonal,
}

/// How the harness treats a missing snapshot.
///
/// Nearest-snapshot substitution changes backtest semantics, so it is an
/// explicit opt-in policy, never a hidden default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SnapshotPolicy {
    Exact,
    NearestWithin { minutes: i64 },
}

/// Immutable configuration for a single backtest run.
///
/// Passed by reference into both the planner and the harness; captures
/// everything needed to reproduce a run from its `run_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub symbol: String,
    pub asset_class: AssetClass,
    /// Span start (inclusive); normalized to its Monday by the planner.
    pub start: NaiveDate,
    /// Span end (inclusive).
    pub end: NaiveDate,
    pub sampling: SamplingStrategyKind,

    /// Monday decision time.
    pub entry_time: NaiveTime,
    /// Wednesday decision time.
    pub management_time: NaiveTime,
    /// Friday flatten time.
    pub exit_time: NaiveTime,

    pub max_risk_per_position: f64,
    /// Per-regime week cap for `RegimeFocused`.
    pub regime_cap: usize,
    /// Stratified weeks per era for `Comprehensive` (clamped to 10..=15).
    pub era_target_weeks: usize,

    pub max_open_partitions: usize,
    pub seed: u64,
    pub snapshot_policy: SnapshotPolicy,
    /// Replay sampled weeks on the rayon pool (weeks are independent).
    pub parallel: bool,

    pub strategy: StrategyKind,
    pub fill: FillKind,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            symbol: "SPY".to_string(),
            asset_class: AssetClass::Etf,
            start: NaiveDate::from_ymd_opt(2005, 1, 3).expect("valid date"),
            end: NaiveDate::from_ymd_opt(2024, 12, 27).expect("valid date"),
            sampling: SamplingStrategyKind::Comprehensive,
            entry_time: NaiveTime::from_hms_opt(10, 0, 0).expect("valid time"),
            management_time: NaiveTime::from_hms_opt(13, 0, 0).expect("valid time"),
            exit_time: NaiveTime::from_hms_opt(15, 45, 0).expect("valid time"),
            max_risk_per_position: 500.0,
            regime_cap: 10,
            era_target_weeks: 12,
            max_open_partitions: 16,
            seed: 42,
            snapshot_policy: SnapshotPolicy::Exact,
            parallel: true,
            strategy: StrategyKind::default(),
            fill: FillKind::default(),
        }
    }
}

/// Errors from config loading/validation. Fatal to the whole run: no weeks
/// can be produced from a bad configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("empty symbol")]
    EmptySymbol,
    #[error("invalid date range: start {start} is after end {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },
    #[error("era_target_weeks {0} outside 10..=15")]
    EraTargetOutOfRange(usize),
}

impl RunConfig {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: RunConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.symbol.is_empty() {
            return Err(ConfigError::EmptySymbol);
        }
        if self.start > self.end {
            return Err(ConfigError::InvalidRange {
                start: self.start,
                end: self.end,
            });
        }
        if !(10..=15).contains(&self.era_target_weeks) {
            return Err(ConfigError::EraTargetOutOfRange(self.era_target_weeks));
        }
        Ok(())
    }

    /// Deterministic content hash of this configuration.
    ///
    /// Two runs with identical configs share the same RunId.
    pub fn run_id(&self) -> RunId {
        let json = serde_json::to_string(self).expect("RunConfig serialization failed");
        blake3::hash(json.as_bytes()).to_hex().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        RunConfig::default().validate().unwrap();
    }

    #[test]
    fn run_id_deterministic() {
        let config = RunConfig::default();
        assert_eq!(config.run_id(), config.run_id());
        assert!(!config.run_id().is_empty());
    }

    #[test]
    fn run_id_changes_with_params() {
        let a = RunConfig::default();
        let mut b = a.clone();
        b.seed = 43;
        assert_ne!(a.run_id(), b.run_id());
    }

    #[test]
    fn inverted_range_rejected() {
        let mut config = RunConfig::default();
        config.start = config.end + chrono::Duration::days(1);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidRange { .. })
        ));
    }

    #[test]
    fn era_target_bounds_enforced() {
        let mut config = RunConfig::default();
        config.era_target_weeks = 9;
        assert!(config.validate().is_err());
        config.era_target_weeks = 16;
        assert!(config.validate().is_err());
        config.era_target_weeks = 15;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn toml_roundtrip() {
        let config = RunConfig::default();
        let text = toml::to_string(&config).unwrap();
        let back: RunConfig = toml::from_str(&text).unwrap();
        assert_eq!(config, back);
    }

    #[test]
    fn snapshot_policy_serde() {
        let p = SnapshotPolicy::NearestWithin { minutes: 30 };
        let json = serde_json::to_string(&p).unwrap();
        let back: SnapshotPolicy = serde_json::from_str(&json).unwrap();
        assert_eq!(p, back);
    }
}
