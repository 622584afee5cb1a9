//! # Vesting & Release
//!
//! Mined rewards are locked and released over `release_days`. Since the
//! vesting cutover a quarter is released on the day it is mined and the
//! remainder linearly; before it everything was linear.
//!
//! ```text
//! date <  cutover:  immediate = 0             linear/day = R / 180
//! date >= cutover:  immediate = 0.25 · R      linear/day = 0.75 · R / 180
//! ```
//!
//! Also holds the staged release of non-mining allocations and the penalty
//! gas estimate, both of which feed circulating supply.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::ymd;
use crate::constants::*;
use crate::error::{ForecastError, Result};

/// One day's reward split into its immediate and per-day linear parts
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReleaseSplit {
    /// Released on the day the reward is mined
    pub immediate: f64,
    /// Released on each of the following `release_days` days
    pub linear_per_day: f64,
}

/// Reward vesting rule
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VestingSchedule {
    pub release_days: u32,
    pub immediate_ratio: f64,
    /// First day the immediate share applies
    pub cutover: NaiveDate,
}

impl Default for VestingSchedule {
    fn default() -> Self {
        Self {
            release_days: RELEASE_DAYS,
            immediate_ratio: IMMEDIATE_RELEASE_RATIO,
            cutover: ymd(2020, 10, 22),
        }
    }
}

impl VestingSchedule {
    pub fn validate(&self) -> Result<()> {
        if self.release_days == 0 {
            return Err(ForecastError::config("release_days must be positive"));
        }
        if !(0.0..=1.0).contains(&self.immediate_ratio) {
            return Err(ForecastError::config("immediate_ratio must be within [0, 1]"));
        }
        Ok(())
    }

    /// Split a reward mined on `date`
    pub fn split(&self, date: NaiveDate, reward: f64) -> ReleaseSplit {
        if date < self.cutover {
            ReleaseSplit {
                immediate: 0.0,
                linear_per_day: reward / self.release_days as f64,
            }
        } else {
            self.split_immediate(reward)
        }
    }

    /// Split with the immediate share regardless of date
    pub fn split_immediate(&self, reward: f64) -> ReleaseSplit {
        ReleaseSplit {
            immediate: reward * self.immediate_ratio,
            linear_per_day: reward * (1.0 - self.immediate_ratio) / self.release_days as f64,
        }
    }
}

/// A release stage ending on `until` (inclusive)
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ReleaseStage {
    pub until: NaiveDate,
    pub daily: f64,
}

/// Staged daily release of non-mining allocations
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OfficialRelease {
    /// First day of the first stage
    pub start: NaiveDate,
    /// Consecutive stages, each starting the day after the previous ends
    pub stages: Vec<ReleaseStage>,
}

impl Default for OfficialRelease {
    fn default() -> Self {
        let stage = |until, daily| ReleaseStage { until, daily };
        Self {
            start: ymd(2020, 10, 15),
            stages: vec![
                stage(ymd(2021, 4, 15), 653_067.36),
                stage(ymd(2021, 10, 15), 365_150.35),
                stage(ymd(2022, 10, 15), 277_933.82),
                stage(ymd(2023, 10, 15), 268_017.40),
                stage(ymd(2026, 10, 14), 187_125.59),
            ],
        }
    }
}

impl OfficialRelease {
    /// Tokens released on `date`
    pub fn daily(&self, date: NaiveDate) -> f64 {
        if date < self.start {
            return 0.0;
        }
        self.stages
            .iter()
            .find(|stage| date <= stage.until)
            .map_or(0.0, |stage| stage.daily)
    }
}

/// `penalty = coefficient · base_fee + constant`
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PenaltyGas {
    pub base_fee_coefficient: f64,
    pub constant: f64,
}

impl Default for PenaltyGas {
    fn default() -> Self {
        Self {
            base_fee_coefficient: 6.845e-6,
            constant: 10752.0,
        }
    }
}

impl PenaltyGas {
    pub fn estimate(&self, base_fee: f64) -> f64 {
        self.base_fee_coefficient * base_fee + self.constant
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_before_cutover_is_linear() {
        let vesting = VestingSchedule::default();
        let split = vesting.split(ymd(2020, 10, 21), 180.0);
        assert_eq!(split.immediate, 0.0);
        assert_eq!(split.linear_per_day, 1.0);
    }

    #[test]
    fn test_split_after_cutover() {
        let vesting = VestingSchedule::default();
        let split = vesting.split(ymd(2020, 10, 22), 100.0);
        assert_eq!(split.immediate, 25.0);
        assert!((split.linear_per_day - 75.0 / 180.0).abs() < 1e-12);
        assert_eq!(split, vesting.split_immediate(100.0));
    }

    #[test]
    fn test_official_release_stages() {
        let release = OfficialRelease::default();
        assert_eq!(release.daily(ymd(2020, 10, 14)), 0.0);
        assert_eq!(release.daily(ymd(2020, 10, 15)), 653_067.36);
        assert_eq!(release.daily(ymd(2021, 4, 15)), 653_067.36);
        assert_eq!(release.daily(ymd(2021, 4, 16)), 365_150.35);
        assert_eq!(release.daily(ymd(2026, 10, 14)), 187_125.59);
        assert_eq!(release.daily(ymd(2026, 10, 15)), 0.0);
    }

    #[test]
    fn test_invalid_ratio_rejected() {
        let vesting = VestingSchedule {
            immediate_ratio: 1.5,
            ..Default::default()
        };
        assert!(vesting.validate().is_err());
    }
}
