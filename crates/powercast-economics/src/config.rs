//! Forecast configuration types
//!
//! Every section has a `Default` matching mainnet, so an empty TOML file is a
//! valid configuration and callers only override what they need.

use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::curve::CurveParams;
use crate::error::{ForecastError, Result};
use crate::vesting::{OfficialRelease, PenaltyGas, VestingSchedule};

/// Complete forecaster configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ForecastConfig {
    /// Protocol constants shared by every computation
    #[serde(default)]
    pub protocol: ProtocolParams,

    /// Forward projection defaults
    #[serde(default)]
    pub projection: ProjectionSettings,

    /// Miner amortization defaults
    #[serde(default)]
    pub amortization: AmortizationSettings,

    /// Result cache lifetimes
    #[serde(default)]
    pub cache: CacheSettings,
}

impl ForecastConfig {
    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Reject values that would make any computation meaningless
    pub fn validate(&self) -> Result<()> {
        self.protocol.curve.validate()?;
        self.protocol.vesting.validate()?;

        if self.protocol.expected_wins_per_height <= 0.0 {
            return Err(ForecastError::config("expected_wins_per_height must be positive"));
        }
        if self.protocol.sector_pledge_multiplier <= 0.0 {
            return Err(ForecastError::config("sector_pledge_multiplier must be positive"));
        }
        if self.projection.lookahead_days == 0 {
            return Err(ForecastError::config("lookahead_days must be at least 1"));
        }
        if self.projection.trailing_increase_days == 0 {
            return Err(ForecastError::config("trailing_increase_days must be at least 1"));
        }
        if self.amortization.package_days == 0 || self.amortization.horizon_days == 0 {
            return Err(ForecastError::config("package_days and horizon_days must be positive"));
        }
        Ok(())
    }
}

/// Protocol constants
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ProtocolParams {
    /// Network launch instant; day 0 starts on its calendar date
    #[serde(default = "default_launch")]
    pub launch: NaiveDateTime,

    /// Minting curve constants
    #[serde(default)]
    pub curve: CurveParams,

    /// Mined reward vesting rule
    #[serde(default)]
    pub vesting: VestingSchedule,

    /// Non-mining allocation release stages
    #[serde(default)]
    pub official_release: OfficialRelease,

    /// Penalty gas estimate coefficients
    #[serde(default)]
    pub penalty_gas: PenaltyGas,

    /// Block wins a single height is expected to produce
    #[serde(default = "default_expected_wins")]
    pub expected_wins_per_height: f64,

    /// Observed pledge is quoted per sector; this converts it to per TiB
    #[serde(default = "default_sector_pledge_multiplier")]
    pub sector_pledge_multiplier: f64,
}

impl Default for ProtocolParams {
    fn default() -> Self {
        Self {
            launch: default_launch(),
            curve: CurveParams::default(),
            vesting: VestingSchedule::default(),
            official_release: OfficialRelease::default(),
            penalty_gas: PenaltyGas::default(),
            expected_wins_per_height: default_expected_wins(),
            sector_pledge_multiplier: default_sector_pledge_multiplier(),
        }
    }
}

impl ProtocolParams {
    /// Calendar date of day 0
    pub fn launch_date(&self) -> NaiveDate {
        self.launch.date()
    }

    /// Day index of `date`, or `None` before launch
    pub fn day_index(&self, date: NaiveDate) -> Option<u32> {
        u32::try_from((date - self.launch_date()).num_days()).ok()
    }
}

/// Forward projection defaults
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ProjectionSettings {
    /// Horizon when the caller does not give one
    #[serde(default = "default_projection_days")]
    pub default_days: u32,

    /// Extra rows computed past the horizon for forward windows
    #[serde(default = "default_lookahead")]
    pub lookahead_days: u32,

    /// Trailing window for the default power increment
    #[serde(default = "default_trailing_increase")]
    pub trailing_increase_days: usize,

    /// Trailing window for the keep-gas-per-TiB average
    #[serde(default = "default_trailing_increase")]
    pub trailing_gas_days: usize,

    /// Share of circulating supply folded into the pledge estimate
    #[serde(default = "default_circulating_ratio")]
    pub circulating_pledge_ratio: f64,

    /// Subsidy offset added back to circulating supply each day
    #[serde(default = "default_supply_offset")]
    pub supply_offset: f64,
}

impl Default for ProjectionSettings {
    fn default() -> Self {
        Self {
            default_days: default_projection_days(),
            lookahead_days: default_lookahead(),
            trailing_increase_days: default_trailing_increase(),
            trailing_gas_days: default_trailing_increase(),
            circulating_pledge_ratio: default_circulating_ratio(),
            supply_offset: default_supply_offset(),
        }
    }
}

/// Miner amortization defaults
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AmortizationSettings {
    /// Days simulated
    #[serde(default = "default_package_days")]
    pub horizon_days: u32,

    /// Packing cycle length; pledge principal returns after it
    #[serde(default = "default_package_days")]
    pub package_days: u32,
}

impl Default for AmortizationSettings {
    fn default() -> Self {
        Self {
            horizon_days: default_package_days(),
            package_days: default_package_days(),
        }
    }
}

/// Cache lifetimes in seconds
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CacheSettings {
    #[serde(default = "default_history_ttl")]
    pub history_ttl_secs: i64,

    #[serde(default = "default_projection_ttl")]
    pub projection_ttl_secs: i64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            history_ttl_secs: default_history_ttl(),
            projection_ttl_secs: default_projection_ttl(),
        }
    }
}

pub(crate) fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or_default()
}

fn default_launch() -> NaiveDateTime {
    ymd(2020, 8, 25).and_hms_opt(6, 0, 0).unwrap_or_default()
}

fn default_expected_wins() -> f64 {
    EXPECTED_WINS_PER_HEIGHT
}

fn default_sector_pledge_multiplier() -> f64 {
    SECTORS_PER_TIB
}

fn default_projection_days() -> u32 {
    PACKAGE_DAYS
}

fn default_lookahead() -> u32 {
    PLEDGE_LOOKAHEAD_DAYS
}

fn default_trailing_increase() -> usize {
    7
}

fn default_circulating_ratio() -> f64 {
    0.3
}

fn default_supply_offset() -> f64 {
    5000.0
}

fn default_package_days() -> u32 {
    PACKAGE_DAYS
}

fn default_history_ttl() -> i64 {
    30 * 60
}

fn default_projection_ttl() -> i64 {
    2 * 60 * 60
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_is_mainnet() {
        let config = ForecastConfig::from_toml_str("").unwrap();
        assert_eq!(config, ForecastConfig::default());
        assert_eq!(config.protocol.launch_date(), ymd(2020, 8, 25));
        assert_eq!(config.projection.lookahead_days, 20);
    }

    #[test]
    fn test_partial_override() {
        let config = ForecastConfig::from_toml_str(
            r#"
            [cache]
            projection_ttl_secs = 60

            [protocol.vesting]
            release_days = 90
            "#,
        )
        .unwrap();

        assert_eq!(config.cache.projection_ttl_secs, 60);
        assert_eq!(config.cache.history_ttl_secs, 1800);
        assert_eq!(config.protocol.vesting.release_days, 90);
        assert_eq!(config.protocol.vesting.immediate_ratio, 0.25);
    }

    #[test]
    fn test_defaults_survive_toml() {
        let rendered = toml::to_string(&ForecastConfig::default()).unwrap();
        let parsed = ForecastConfig::from_toml_str(&rendered).unwrap();
        assert_eq!(parsed, ForecastConfig::default());
    }

    #[test]
    fn test_invalid_decay_rejected() {
        let result = ForecastConfig::from_toml_str(
            r#"
            [protocol.curve]
            simple_decay = 0.0
            "#,
        );
        assert!(matches!(result, Err(ForecastError::Configuration(_))));
    }

    #[test]
    fn test_day_index() {
        let params = ProtocolParams::default();
        assert_eq!(params.day_index(ymd(2020, 8, 25)), Some(0));
        assert_eq!(params.day_index(ymd(2020, 8, 26)), Some(1));
        assert_eq!(params.day_index(ymd(2020, 8, 24)), None);
    }
}
