//! # Reward Curve
//!
//! Minting model of the network: a fixed simple pool released with
//! exponential decay per block, and a baseline pool released as the network's
//! cumulative capped power catches up with an exponentially growing baseline.
//!
//! ```text
//! simple(b)        = S · λ · e^(−λ·b)                    per block b
//! baseline_pow(d)  = B₀ · 2^(d / 365)                   bytes at day d
//! kpi_time(P)      = (365 / ln2) · ln(1 + ln2·P / (365·B₀))
//! sum_baseline(t)  = M · (1 − e^(−t·ln2 / half_life))
//! ```
//!
//! `P` is the running sum of daily capped power and `B₀` the initial baseline;
//! both are in bytes, so their ratio is unit-free.

use std::f64::consts::LN_2;
use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::error::{ForecastError, Result};

/// Minting curve constants
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CurveParams {
    /// Tokens in the simple pool
    pub simple_pool: f64,
    /// Tokens in the baseline pool
    pub baseline_pool: f64,
    /// Simple pool decay per block
    pub simple_decay: f64,
    /// Baseline pool half-life in days of effective network time
    pub baseline_half_life_days: f64,
    /// Baseline power at day 0, bytes
    pub initial_baseline: f64,
    /// Days for the baseline to double
    pub baseline_doubling_days: f64,
    pub blocks_per_day: u64,
    /// Irregular block count of the launch day
    pub launch_day_blocks: u64,
}

impl Default for CurveParams {
    fn default() -> Self {
        Self {
            simple_pool: SIMPLE_POOL,
            baseline_pool: BASELINE_POOL,
            simple_decay: SIMPLE_DECAY_PER_BLOCK,
            baseline_half_life_days: BASELINE_HALF_LIFE_DAYS,
            initial_baseline: INITIAL_BASELINE_BYTES,
            baseline_doubling_days: BASELINE_DOUBLING_DAYS,
            blocks_per_day: BLOCKS_PER_DAY,
            launch_day_blocks: LAUNCH_DAY_BLOCKS,
        }
    }
}

impl CurveParams {
    pub fn validate(&self) -> Result<()> {
        if !(self.simple_decay > 0.0) {
            return Err(ForecastError::config("simple_decay must be positive"));
        }
        if !(self.baseline_half_life_days > 0.0) {
            return Err(ForecastError::config("baseline_half_life_days must be positive"));
        }
        if !(self.initial_baseline > 0.0) {
            return Err(ForecastError::config("initial_baseline must be positive"));
        }
        if !(self.baseline_doubling_days > 0.0) {
            return Err(ForecastError::config("baseline_doubling_days must be positive"));
        }
        if self.simple_pool < 0.0 || self.baseline_pool < 0.0 {
            return Err(ForecastError::config("minting pools cannot be negative"));
        }
        if self.blocks_per_day == 0 {
            return Err(ForecastError::config("blocks_per_day must be positive"));
        }
        Ok(())
    }
}

/// Validated reward curve. Stateless; every method is a pure function.
#[derive(Clone, Debug)]
pub struct RewardCurve {
    params: CurveParams,
}

impl RewardCurve {
    pub fn new(params: CurveParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn mainnet() -> Self {
        Self {
            params: CurveParams::default(),
        }
    }

    pub fn params(&self) -> &CurveParams {
        &self.params
    }

    /// Simple reward minted at block `block`
    pub fn simple_reward_at_block(&self, block: u64) -> f64 {
        let lambda = self.params.simple_decay;
        self.params.simple_pool * lambda * (-lambda * block as f64).exp()
    }

    /// Blocks belonging to `day`. Day 0 is the shortened launch day.
    pub fn day_blocks(&self, day: u32) -> Range<u64> {
        if day == 0 {
            return 0..self.params.launch_day_blocks;
        }
        let start = self.params.launch_day_blocks + self.params.blocks_per_day * (day as u64 - 1);
        start..start + self.params.blocks_per_day
    }

    /// Simple reward of a whole day, summed block by block
    pub fn simple_reward_for_day(&self, day: u32) -> f64 {
        self.day_blocks(day)
            .map(|block| self.simple_reward_at_block(block))
            .sum()
    }

    /// Closed-form simple minting up to (not including) `block`
    pub fn cumulative_simple(&self, block: u64) -> f64 {
        self.params.simple_pool * (1.0 - (-self.params.simple_decay * block as f64).exp())
    }

    /// Baseline power at `day`, bytes
    pub fn baseline_power_at(&self, day: u32) -> f64 {
        self.params.initial_baseline * 2f64.powf(day as f64 / self.params.baseline_doubling_days)
    }

    /// Baseline power at `day` in the ledger's integer byte unit
    pub fn kpi_power_at(&self, day: u32) -> u128 {
        self.baseline_power_at(day) as u128
    }

    /// Effective network time for a cumulative capped power (byte-days).
    ///
    /// Inverse of the baseline power integral.
    pub fn effective_time_at(&self, cumulative_power: f64) -> Result<f64> {
        if cumulative_power.is_nan() || cumulative_power < 0.0 {
            return Err(ForecastError::config(format!(
                "cumulative power must be non-negative, got {cumulative_power}"
            )));
        }
        if cumulative_power == 0.0 {
            return Ok(0.0);
        }
        let period = self.params.baseline_doubling_days;
        let ratio = LN_2 * cumulative_power / (period * self.params.initial_baseline);
        Ok(period / LN_2 * ratio.ln_1p())
    }

    /// Baseline pool minted once effective network time reaches `kpi_time`
    pub fn cumulative_baseline(&self, kpi_time: f64) -> f64 {
        let rate = LN_2 / self.params.baseline_half_life_days;
        self.params.baseline_pool * (1.0 - (-kpi_time * rate).exp())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launch_day_block_range() {
        let curve = RewardCurve::mainnet();
        assert_eq!(curve.day_blocks(0), 0..2160);
        assert_eq!(curve.day_blocks(1), 2160..5040);
        assert_eq!(curve.day_blocks(2), 5040..7920);
    }

    #[test]
    fn test_day_sum_matches_closed_form() {
        let curve = RewardCurve::mainnet();
        for day in [0u32, 1, 100, 700] {
            let range = curve.day_blocks(day);
            let closed = curve.cumulative_simple(range.end) - curve.cumulative_simple(range.start);
            let summed = curve.simple_reward_for_day(day);
            // per-block sum is a left Riemann sum of the closed form
            assert!((summed - closed).abs() / closed < 1e-4, "day {day}: {summed} vs {closed}");
        }
    }

    #[test]
    fn test_simple_reward_decays() {
        let curve = RewardCurve::mainnet();
        assert!(curve.simple_reward_for_day(10) > curve.simple_reward_for_day(11));
        // launch day has fewer blocks
        assert!(curve.simple_reward_for_day(0) < curve.simple_reward_for_day(1));
    }

    #[test]
    fn test_baseline_doubles_yearly() {
        let curve = RewardCurve::mainnet();
        let ratio = curve.baseline_power_at(365) / curve.baseline_power_at(0);
        assert!((ratio - 2.0).abs() < 1e-12);
        assert_eq!(curve.baseline_power_at(0), INITIAL_BASELINE_BYTES);
    }

    #[test]
    fn test_effective_time() {
        let curve = RewardCurve::mainnet();
        assert_eq!(curve.effective_time_at(0.0).unwrap(), 0.0);

        // a network exactly at baseline for 365 days reaches one year of effective time
        let cumsum = (0..365).map(|d| curve.baseline_power_at(d)).sum::<f64>();
        let t = curve.effective_time_at(cumsum).unwrap();
        assert!((t - 365.0).abs() < 1.0, "effective time {t}");
    }

    #[test]
    fn test_negative_power_rejected() {
        let curve = RewardCurve::mainnet();
        assert!(matches!(
            curve.effective_time_at(-1.0),
            Err(ForecastError::Configuration(_))
        ));
    }

    #[test]
    fn test_invalid_params_rejected() {
        let params = CurveParams {
            simple_decay: -1.0,
            ..Default::default()
        };
        assert!(RewardCurve::new(params).is_err());

        let params = CurveParams {
            baseline_half_life_days: 0.0,
            ..Default::default()
        };
        assert!(RewardCurve::new(params).is_err());
    }

    #[test]
    fn test_cumulative_baseline_half_life() {
        let curve = RewardCurve::mainnet();
        assert_eq!(curve.cumulative_baseline(0.0), 0.0);
        let half = curve.cumulative_baseline(BASELINE_HALF_LIFE_DAYS);
        assert!((half - BASELINE_POOL / 2.0).abs() < 1.0);
    }
}
