//! # Miner Amortization
//!
//! Simulates a single miner's sealing ramp over a packing cycle: new capacity
//! is sealed at a fixed daily rate up to a target, pledged on the day it is
//! sealed, and earns the network's reward per TiB. After `package_days` the
//! pledge principal is returned and capacity is resealed from scratch.
//!
//! ```text
//! index         = day mod package_days
//! today_power   = min(init + ppd · index, total)          first cycle
//! today_pledge  = today_new_power · pledge_per_tib[day]
//! today_reward  = today_power · reward_per_tib[day]
//! today_release = 0.25 · reward[d] + Σ 0.75 · reward[d-180 .. d-1] / 180
//! principal     = today_pledge[d - package_days]
//! ```
//!
//! Power is in TiB and money in tokens.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::error::{ForecastError, Result};
use crate::projection::Projection;

/// Gas cost per TiB for both sector sizes
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GasRates {
    /// Sealing gas per TiB of new power, 32 GiB sectors
    pub create_per_tib: f64,
    /// Daily maintenance gas per TiB, 32 GiB sectors
    pub keep_per_tib: f64,
    pub create_per_tib_64: f64,
    pub keep_per_tib_64: f64,
}

/// Per-day network rates the miner earns and pledges at, day 1 first
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyRates {
    pub reward_per_tib: Vec<f64>,
    pub pledge_per_tib: Vec<f64>,
    /// Days whose pledge came from the fallback rather than the projection
    #[serde(default)]
    pub pledge_fallback_days: u32,
}

impl DailyRates {
    /// Rates for `days` days starting at `start`, read from a projection by date.
    ///
    /// Rows without a pledge estimate fall back to `fallback_pledge`.
    pub fn from_projection(projection: &Projection, start: NaiveDate, days: u32, fallback_pledge: f64) -> Result<Self> {
        let mut rates = Self {
            reward_per_tib: Vec::with_capacity(days as usize),
            pledge_per_tib: Vec::with_capacity(days as usize),
            pledge_fallback_days: 0,
        };
        for offset in 0..days {
            let date = start + Duration::days(offset as i64);
            let row = projection.row_on(date).ok_or_else(|| {
                ForecastError::unavailable(format!("no projected rates for {date}"))
            })?;
            rates.reward_per_tib.push(row.avg_reward);
            if row.avg_pledge > 0.0 {
                rates.pledge_per_tib.push(row.avg_pledge);
            } else {
                rates.pledge_per_tib.push(fallback_pledge);
                rates.pledge_fallback_days += 1;
            }
        }
        if rates.pledge_fallback_days > 0 {
            tracing::warn!(
                days = rates.pledge_fallback_days,
                fallback_pledge,
                "Projection lacks a pledge estimate; using the snapshot pledge"
            );
        }
        Ok(rates)
    }

    /// Caller-supplied rewards with a constant pledge
    pub fn from_override(reward_per_tib: Vec<f64>, pledge_per_tib: f64) -> Self {
        let pledge_per_tib = vec![pledge_per_tib; reward_per_tib.len()];
        Self {
            reward_per_tib,
            pledge_per_tib,
            pledge_fallback_days: 0,
        }
    }

    /// Days covered by both series
    pub fn len(&self) -> usize {
        self.reward_per_tib.len().min(self.pledge_per_tib.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Simulation inputs
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AmortizationParams {
    /// TiB sealed per day
    pub power_per_day: f64,
    /// Target capacity, TiB
    pub total_power: f64,
    /// Capacity already sealed before day 1, TiB
    pub init_power: f64,
    /// Date of day 1
    pub start_date: NaiveDate,
    pub horizon: u32,
    pub package_days: u32,
    pub release_days: u32,
    pub immediate_ratio: f64,
    pub gas: GasRates,
}

impl AmortizationParams {
    /// Mainnet cycle lengths and release rule
    pub fn new(power_per_day: f64, total_power: f64, init_power: f64, start_date: NaiveDate) -> Self {
        Self {
            power_per_day,
            total_power,
            init_power,
            start_date,
            horizon: PACKAGE_DAYS,
            package_days: PACKAGE_DAYS,
            release_days: RELEASE_DAYS,
            immediate_ratio: IMMEDIATE_RELEASE_RATIO,
            gas: GasRates::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.power_per_day > 0.0) || !self.power_per_day.is_finite() {
            return Err(ForecastError::config(format!(
                "power_per_day must be positive, got {}",
                self.power_per_day
            )));
        }
        if !(self.init_power >= 0.0) {
            return Err(ForecastError::config("init_power cannot be negative"));
        }
        if !(self.total_power >= self.init_power) {
            return Err(ForecastError::config("total_power must be at least init_power"));
        }
        if self.horizon == 0 || self.package_days == 0 || self.release_days == 0 {
            return Err(ForecastError::config("horizon, package_days and release_days must be positive"));
        }
        if self.horizon > MAX_HORIZON_DAYS {
            return Err(ForecastError::config(format!(
                "horizon of {} days exceeds the limit of {MAX_HORIZON_DAYS}",
                self.horizon
            )));
        }
        if !(0.0..=1.0).contains(&self.immediate_ratio) {
            return Err(ForecastError::config("immediate_ratio must be within [0, 1]"));
        }
        Ok(())
    }

    /// Days needed to seal from `init_power` up to `total_power`
    pub fn full_day(&self) -> u32 {
        ((self.total_power - self.init_power) / self.power_per_day).ceil() as u32
    }
}

/// One simulated day
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectionDay {
    pub day: u32,
    pub date: NaiveDate,
    pub reward_per_day: f64,
    pub pledge_per_day: f64,

    pub today_new_power: f64,
    pub today_power: f64,
    pub today_pledge: f64,
    pub today_reward_base: f64,
    pub today_reward: f64,
    pub today_release: f64,
    pub today_release_principal: f64,

    pub total_pledge: f64,
    pub total_reward: f64,
    pub total_release: f64,
    pub total_release_principal: f64,
    /// Released reward plus returned principal
    pub total_already_release: f64,
    /// Mined reward still vesting
    pub total_unreleased: f64,

    pub create_gas: f64,
    pub keep_gas: f64,
    pub create_gas_64: f64,
    pub keep_gas_64: f64,
    pub total_create_gas: f64,
    pub total_keep_gas: f64,
    pub total_create_gas_64: f64,
    pub total_keep_gas_64: f64,
}

/// Daily schedule simulator
pub struct MinerAmortizationSimulator {
    params: AmortizationParams,
}

impl MinerAmortizationSimulator {
    pub fn new(params: AmortizationParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &AmortizationParams {
        &self.params
    }

    /// Simulate `horizon` days
    pub fn simulate(&self, rates: &DailyRates) -> Result<Vec<ProjectionDay>> {
        let horizon = self.params.horizon as usize;
        if rates.len() < horizon {
            return Err(ForecastError::config(format!(
                "rate series covers {} days, horizon is {}",
                rates.len(),
                horizon
            )));
        }

        let mut schedule = self.ramp_and_pledge(rates);
        self.gas_and_release(&mut schedule);
        accumulate_totals(&mut schedule);

        tracing::debug!(
            days = schedule.len(),
            full_day = self.params.full_day(),
            "Simulated amortization schedule"
        );
        Ok(schedule)
    }

    fn ramp_and_pledge(&self, rates: &DailyRates) -> Vec<ProjectionDay> {
        let p = &self.params;
        (1..=p.horizon)
            .map(|day| {
                let (today_new_power, today_power) = self.ramp(day);
                let slot = (day - 1) as usize;
                let reward_per_day = rates.reward_per_tib[slot];
                let pledge_per_day = rates.pledge_per_tib[slot];
                let today_reward = today_power * reward_per_day;

                ProjectionDay {
                    day,
                    date: p.start_date + Duration::days(slot as i64),
                    reward_per_day,
                    pledge_per_day,
                    today_new_power,
                    today_power,
                    today_pledge: today_new_power * pledge_per_day,
                    today_reward_base: today_reward,
                    today_reward,
                    ..Default::default()
                }
            })
            .collect()
    }

    /// New and effective power on `day`
    fn ramp(&self, day: u32) -> (f64, f64) {
        let p = &self.params;
        let index = day % p.package_days;
        if index == 0 {
            return (0.0, p.total_power);
        }

        let sealed_days = (index - 1) as f64;
        if day > p.package_days {
            // Resealing from zero
            let new = (p.total_power - p.power_per_day * sealed_days).clamp(0.0, p.power_per_day);
            return (new, p.total_power - new);
        }

        let sealed = (p.init_power + p.power_per_day * sealed_days).min(p.total_power);
        let new = (p.total_power - sealed).clamp(0.0, p.power_per_day);
        let power = (p.init_power + p.power_per_day * index as f64).min(p.total_power);
        (new, power)
    }

    fn gas_and_release(&self, schedule: &mut [ProjectionDay]) {
        let p = &self.params;
        let gas = &p.gas;
        let linear_ratio = (1.0 - p.immediate_ratio) / p.release_days as f64;
        let release_days = p.release_days as usize;
        let package_days = p.package_days as usize;

        let (mut create, mut keep, mut create_64, mut keep_64) = (0.0, 0.0, 0.0, 0.0);
        for slot in 0..schedule.len() {
            let trailing_reward: f64 = schedule[slot.saturating_sub(release_days)..slot]
                .iter()
                .map(|day| day.today_reward)
                .sum();
            let principal = if slot >= package_days {
                schedule[slot - package_days].today_pledge
            } else {
                0.0
            };

            let day = &mut schedule[slot];
            day.create_gas = day.today_new_power * gas.create_per_tib;
            day.keep_gas = day.today_power * gas.keep_per_tib;
            day.create_gas_64 = day.today_new_power * gas.create_per_tib_64;
            day.keep_gas_64 = day.today_power * gas.keep_per_tib_64;
            create += day.create_gas;
            keep += day.keep_gas;
            create_64 += day.create_gas_64;
            keep_64 += day.keep_gas_64;
            day.total_create_gas = create;
            day.total_keep_gas = keep;
            day.total_create_gas_64 = create_64;
            day.total_keep_gas_64 = keep_64;

            day.today_release = day.today_reward * p.immediate_ratio + trailing_reward * linear_ratio;
            day.today_release_principal = principal;
        }
    }
}

fn accumulate_totals(schedule: &mut [ProjectionDay]) {
    let (mut pledge, mut reward, mut release, mut principal) = (0.0, 0.0, 0.0, 0.0);
    for day in schedule {
        pledge += day.today_pledge;
        reward += day.today_reward;
        release += day.today_release;
        principal += day.today_release_principal;
        day.total_pledge = pledge;
        day.total_reward = reward;
        day.total_release = release;
        day.total_release_principal = principal;
        day.total_already_release = release + principal;
        day.total_unreleased = reward - release;
    }
}

/// Headline figures of a schedule
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AmortizationSummary {
    /// Day the target capacity is fully sealed
    pub full_day: u32,
    /// First day cumulative income covers `cost`
    pub break_even_day: Option<u32>,
    /// Pledge still locked on the first day release outpaces new pledge
    pub pre_pledge: f64,
    /// Rows for days 180, 360, 540 and `full_day`
    pub milestones: Vec<ProjectionDay>,
}

impl AmortizationSummary {
    /// `price` converts tokens into the unit of `cost`; `use_gas` deducts gas from income
    pub fn summarize(params: &AmortizationParams, schedule: &[ProjectionDay], cost: f64, price: f64, use_gas: bool) -> Self {
        let full_day = params.full_day();

        let break_even_day = schedule
            .iter()
            .find(|day| {
                let gas = if use_gas {
                    day.total_create_gas + day.total_keep_gas
                } else {
                    0.0
                };
                (day.total_reward - gas) * price >= cost
            })
            .map(|day| day.day);

        let pre_pledge = schedule
            .iter()
            .find(|day| day.today_release >= day.today_pledge)
            .map_or(0.0, |day| day.total_pledge - day.total_release + day.today_release)
            .max(0.0);

        let milestones = schedule
            .iter()
            .filter(|day| [180, 360, 540, full_day].contains(&day.day))
            .cloned()
            .collect();

        Self {
            full_day,
            break_even_day,
            pre_pledge,
            milestones,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ymd;

    fn ramp_params(power_per_day: f64, total_power: f64, init_power: f64) -> AmortizationParams {
        AmortizationParams::new(power_per_day, total_power, init_power, ymd(2021, 3, 1))
    }

    fn flat(days: usize, reward: f64, pledge: f64) -> DailyRates {
        DailyRates::from_override(vec![reward; days], pledge)
    }

    #[test]
    fn test_full_ramp_boundary() {
        let sim = MinerAmortizationSimulator::new(ramp_params(10.0, 100.0, 0.0)).unwrap();
        let schedule = sim.simulate(&flat(540, 0.01, 0.2)).unwrap();

        assert_eq!(schedule.len(), 540);
        assert_eq!(schedule[0].today_power, 10.0);
        assert_eq!(schedule[9].today_power, 100.0);
        assert_eq!(schedule[9].today_new_power, 10.0);
        for day in &schedule[10..539] {
            assert_eq!(day.today_power, 100.0, "day {}", day.day);
            assert_eq!(day.today_new_power, 0.0, "day {}", day.day);
        }
        // cycle end
        assert_eq!(schedule[539].today_power, 100.0);
        assert_eq!(schedule[539].today_new_power, 0.0);
    }

    #[test]
    fn test_partial_last_increment() {
        let sim = MinerAmortizationSimulator::new(ramp_params(30.0, 100.0, 0.0)).unwrap();
        let schedule = sim.simulate(&flat(540, 0.01, 0.2)).unwrap();
        assert_eq!(schedule[3].today_new_power, 10.0);
        assert_eq!(schedule[3].today_power, 100.0);
        assert_eq!(schedule[4].today_new_power, 0.0);
        let sealed: f64 = schedule.iter().map(|d| d.today_new_power).sum();
        assert_eq!(sealed, 100.0);
    }

    #[test]
    fn test_release_schedule_for_single_reward() {
        // day 5 power is 50 TiB, so a rate of 2 earns exactly 100
        let mut rewards = vec![0.0; 540];
        rewards[4] = 2.0;
        let sim = MinerAmortizationSimulator::new(ramp_params(10.0, 100.0, 0.0)).unwrap();
        let schedule = sim.simulate(&DailyRates::from_override(rewards, 0.0)).unwrap();

        assert_eq!(schedule[4].today_reward, 100.0);
        assert_eq!(schedule[4].today_release, 25.0);
        let linear = 100.0 * 0.75 / 180.0;
        for day in &schedule[5..185] {
            assert!((day.today_release - linear).abs() < 1e-12, "day {}", day.day);
        }
        assert_eq!(schedule[185].today_release, 0.0);

        let tail: f64 = schedule[5..185].iter().map(|d| d.today_release).sum();
        assert!((tail - 75.0).abs() < 1e-9);
    }

    #[test]
    fn test_conservation() {
        let sim = MinerAmortizationSimulator::new(ramp_params(4.0, 250.0, 12.0)).unwrap();
        let rewards = (0..540).map(|i| 0.01 + (i % 7) as f64 * 0.001).collect();
        let schedule = sim.simulate(&DailyRates::from_override(rewards, 0.18)).unwrap();

        let mut reward = 0.0;
        for day in &schedule {
            reward += day.today_reward;
            assert!((day.total_reward - reward).abs() < 1e-9);
            assert!(day.total_release <= day.total_reward + 1e-9);
            assert_eq!(day.total_already_release, day.total_release + day.total_release_principal);
            assert_eq!(day.total_unreleased, day.total_reward - day.total_release);
        }
    }

    #[test]
    fn test_zero_ramp_rate_rejected() {
        let result = MinerAmortizationSimulator::new(ramp_params(0.0, 100.0, 0.0));
        assert!(matches!(result, Err(ForecastError::Configuration(_))));

        let result = MinerAmortizationSimulator::new(ramp_params(10.0, 10.0, 20.0));
        assert!(matches!(result, Err(ForecastError::Configuration(_))));
    }

    #[test]
    fn test_short_rate_series_rejected() {
        let sim = MinerAmortizationSimulator::new(ramp_params(10.0, 100.0, 0.0)).unwrap();
        assert!(matches!(
            sim.simulate(&flat(100, 0.01, 0.2)),
            Err(ForecastError::Configuration(_))
        ));
    }

    #[test]
    fn test_repacking_and_principal_return() {
        let params = AmortizationParams {
            horizon: 600,
            ..ramp_params(10.0, 100.0, 0.0)
        };
        let sim = MinerAmortizationSimulator::new(params).unwrap();
        let schedule = sim.simulate(&flat(600, 0.01, 0.5)).unwrap();

        // day 541 restarts sealing one increment below target
        let day = &schedule[540];
        assert_eq!(day.day, 541);
        assert_eq!(day.today_new_power, 10.0);
        assert_eq!(day.today_power, 90.0);
        assert_eq!(schedule[549].today_new_power, 10.0);
        assert_eq!(schedule[550].today_new_power, 0.0);
        assert_eq!(schedule[550].today_power, 100.0);

        // principal pledged on day 1 returns on day 541
        assert_eq!(schedule[539].today_release_principal, 0.0);
        assert_eq!(day.today_release_principal, schedule[0].today_pledge);
        assert_eq!(day.today_release_principal, 5.0);
    }

    #[test]
    fn test_fully_sealed_start_waits_for_repack() {
        let params = AmortizationParams {
            horizon: 600,
            ..ramp_params(10.0, 100.0, 100.0)
        };
        let sim = MinerAmortizationSimulator::new(params).unwrap();
        assert_eq!(sim.params().full_day(), 0);
        let schedule = sim.simulate(&flat(600, 0.01, 0.5)).unwrap();

        for day in &schedule[..540] {
            assert_eq!(day.today_new_power, 0.0, "day {}", day.day);
            assert_eq!(day.today_power, 100.0, "day {}", day.day);
            assert_eq!(day.today_pledge, 0.0, "day {}", day.day);
        }

        let repack = &schedule[540];
        assert_eq!(repack.day, 541);
        assert_eq!(repack.today_new_power, 10.0);
        assert_eq!(repack.today_power, 90.0);
        assert_eq!(repack.today_release_principal, 0.0);

        assert_eq!(schedule[550].day, 551);
        assert_eq!(schedule[550].today_new_power, 0.0);
        assert_eq!(schedule[550].today_power, 100.0);
    }

    #[test]
    fn test_horizon_limit() {
        let params = AmortizationParams {
            horizon: MAX_HORIZON_DAYS + 1,
            ..ramp_params(10.0, 100.0, 0.0)
        };
        assert!(matches!(
            MinerAmortizationSimulator::new(params),
            Err(ForecastError::Configuration(_))
        ));
    }

    #[test]
    fn test_gas_totals() {
        let params = AmortizationParams {
            gas: GasRates {
                create_per_tib: 0.1,
                keep_per_tib: 0.001,
                create_per_tib_64: 0.05,
                keep_per_tib_64: 0.0005,
            },
            ..ramp_params(10.0, 100.0, 0.0)
        };
        let sim = MinerAmortizationSimulator::new(params).unwrap();
        let schedule = sim.simulate(&flat(540, 0.01, 0.2)).unwrap();

        let last = schedule.last().unwrap();
        assert!((last.total_create_gas - 100.0 * 0.1).abs() < 1e-9);
        assert!((last.total_create_gas_64 - 100.0 * 0.05).abs() < 1e-9);
        let keep: f64 = schedule.iter().map(|d| d.today_power * 0.001).sum();
        assert!((last.total_keep_gas - keep).abs() < 1e-9);
    }

    #[test]
    fn test_summary() {
        let params = ramp_params(10.0, 100.0, 0.0);
        let sim = MinerAmortizationSimulator::new(params.clone()).unwrap();
        let schedule = sim.simulate(&flat(540, 0.01, 0.2)).unwrap();

        let summary = AmortizationSummary::summarize(&params, &schedule, 50.0, 1.0, false);
        assert_eq!(summary.full_day, 10);
        let day = summary.break_even_day.unwrap();
        assert!(schedule[day as usize - 1].total_reward >= 50.0);
        assert!(schedule[day as usize - 2].total_reward < 50.0);

        let days: Vec<u32> = summary.milestones.iter().map(|d| d.day).collect();
        assert_eq!(days, vec![10, 180, 360, 540]);
        for milestone in &summary.milestones {
            assert!(milestone.total_unreleased > 0.0, "day {}", milestone.day);
        }
        assert!(summary.pre_pledge >= 0.0);

        let never = AmortizationSummary::summarize(&params, &schedule, 1e12, 1.0, true);
        assert_eq!(never.break_even_day, None);
    }
}
