//! # Forward Projection
//!
//! Extends the historical ledger day by day under a constant luck and a
//! constant power increment. Runs in two passes over the combined
//! history + projection ledger:
//!
//! ```text
//! pass 1 (days + lookahead rows):
//!   power     = max(prev.power + Δ, 0)
//!   sum_power = prev.sum_power + min(power, baseline)
//!   reward    = simple + max(sum_baseline - prev.sum_baseline, 0)
//!
//! pass 2 (days rows):
//!   avg_pledge = Σ avg_reward[i .. i+lookahead) + 0.3 · cs[i-1] / max(power, baseline)
//!   cs[i]      = cs[i-1] + official + miner_release - (pledge + gas - offset)
//! ```
//!
//! The pledge estimate looks forward, so pass 1 runs `lookahead_days` past the
//! horizon; those rows are never returned.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::config::{ProjectionSettings, ProtocolParams};
use crate::constants::{ATTO, MAX_HORIZON_DAYS, TIB};
use crate::curve::RewardCurve;
use crate::error::{ForecastError, Result};
use crate::ledger::{Ledger, LedgerRow, Origin};

/// Caller-facing projection parameters; `None` means "derive a default"
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectionRequest {
    /// Constant luck applied to every projected day
    pub luck_v: Option<f64>,
    /// Constant daily power increment, bytes
    pub increase_power_per_day: Option<i128>,
    /// Horizon in days
    pub days: Option<u32>,
    /// Recompute even when a cached result exists
    #[serde(default)]
    pub must_refresh: bool,
}

/// Fully resolved projection inputs
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProjectionInputs {
    pub luck_v: f64,
    pub increase_power_per_day: i128,
    pub days: u32,
    /// Current base fee, drives the penalty gas estimate
    pub base_fee: f64,
    /// Sealing gas per TiB of new power
    pub create_gas_per_tib: f64,
    /// Maintenance gas per TiB of power
    pub keep_gas_per_tib: f64,
}

/// Historical rows followed by the projected horizon
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    pub rows: Vec<LedgerRow>,
    /// Number of leading historical rows
    pub history_len: usize,
    pub luck_v: f64,
    /// Live luck had no blocks; luck of 1 assumed
    pub luck_assumed: bool,
    pub increase_power_per_day: i128,
    /// Increment taken from the trailing historical average
    pub increase_derived: bool,
    /// No historical keep gas sample; keep gas projected as zero
    #[serde(default)]
    pub keep_gas_assumed: bool,
    pub days: u32,
}

impl Projection {
    pub fn history(&self) -> &[LedgerRow] {
        &self.rows[..self.history_len]
    }

    pub fn projected(&self) -> &[LedgerRow] {
        &self.rows[self.history_len..]
    }

    pub fn row_on(&self, date: NaiveDate) -> Option<&LedgerRow> {
        let first = self.rows.first()?;
        let pos = usize::try_from((date - first.date).num_days()).ok()?;
        self.rows.get(pos)
    }

    /// Rows from `date` onwards
    pub fn rows_from(&self, date: NaiveDate) -> &[LedgerRow] {
        let Some(first) = self.rows.first() else {
            return &[];
        };
        let pos = usize::try_from((date - first.date).num_days()).unwrap_or(0);
        &self.rows[pos.min(self.rows.len())..]
    }
}

/// Projects the ledger forward from its last historical row
pub struct ForwardProjector<'a> {
    protocol: &'a ProtocolParams,
    curve: &'a RewardCurve,
    settings: &'a ProjectionSettings,
}

impl<'a> ForwardProjector<'a> {
    pub fn new(protocol: &'a ProtocolParams, curve: &'a RewardCurve, settings: &'a ProjectionSettings) -> Self {
        Self {
            protocol,
            curve,
            settings,
        }
    }

    /// History followed by `inputs.days` projected rows
    pub fn project(&self, history: &[LedgerRow], inputs: &ProjectionInputs) -> Result<Vec<LedgerRow>> {
        let projected = self.run(history, inputs)?;
        let days = inputs.days as usize;

        let mut rows = Vec::with_capacity(history.len() + days);
        rows.extend_from_slice(history);
        rows.extend(projected.into_iter().skip(1).take(days));
        Ok(rows)
    }

    /// Seed row followed by every projected row, lookahead included.
    ///
    /// Only the first `inputs.days` projected rows carry pledge, gas and
    /// circulating supply.
    pub fn run(&self, history: &[LedgerRow], inputs: &ProjectionInputs) -> Result<Vec<LedgerRow>> {
        let seed = history
            .last()
            .cloned()
            .ok_or_else(|| ForecastError::unavailable("projection needs at least one historical row"))?;
        if !(0.0..=1.0).contains(&inputs.luck_v) {
            return Err(ForecastError::config(format!("luck must be within [0, 1], got {}", inputs.luck_v)));
        }

        if inputs.days > MAX_HORIZON_DAYS {
            return Err(ForecastError::config(format!(
                "projection of {} days exceeds the limit of {MAX_HORIZON_DAYS}",
                inputs.days
            )));
        }

        let lookahead = self.settings.lookahead_days;
        let span = inputs.days.checked_add(lookahead).ok_or_else(|| {
            ForecastError::config(format!("{} days plus {lookahead} lookahead overflows", inputs.days))
        })?;
        let start = seed.day_index;
        let end = start
            .checked_add(span)
            .and_then(|last| last.checked_add(1))
            .ok_or_else(|| ForecastError::config(format!("day {start} plus {span} overflows the day index")))?;
        let mut ledger = Ledger::from_rows(history.to_vec())?;

        let mut prev = seed.clone();
        for k in 1..=span {
            let row = self.estimate_day(&prev, &seed, k, inputs)?;
            ledger.push(row.clone())?;
            prev = row;
        }

        for k in 1..=inputs.days {
            self.settle_day(&mut ledger, seed.day_index + k, inputs)?;
        }

        tracing::debug!(days = inputs.days, lookahead, "Projected ledger");
        Ok(ledger.window(start..end).to_vec())
    }

    /// Pass 1: power, minting and vesting split for day `seed + k`
    fn estimate_day(&self, prev: &LedgerRow, seed: &LedgerRow, k: u32, inputs: &ProjectionInputs) -> Result<LedgerRow> {
        let day_index = seed.day_index + k;
        let date = seed.date + Duration::days(k as i64);
        let mut row = LedgerRow::empty(day_index, date, Origin::Projected);

        row.increase_power = inputs.increase_power_per_day;
        row.power = (prev.power as i128).saturating_add(inputs.increase_power_per_day).max(0) as u128;
        row.kpi_power = self.curve.kpi_power_at(day_index);
        row.limit_power = row.power.min(row.kpi_power);
        row.sum_power = prev.sum_power + row.limit_power;

        row.kpi_time = self.curve.effective_time_at(row.sum_power as f64)?;
        row.sum_baseline_reward = self.curve.cumulative_baseline(row.kpi_time);
        row.baseline_reward = (row.sum_baseline_reward - prev.sum_baseline_reward).max(0.0);
        row.simple_reward = self.curve.simple_reward_for_day(day_index);
        row.reward = row.simple_reward + row.baseline_reward;

        row.luck_v = inputs.luck_v;
        row.reward_by_luck = row.reward * inputs.luck_v;
        row.avg_reward = if row.power == 0 {
            0.0
        } else {
            row.reward_by_luck / (row.power as f64 / TIB)
        };

        let split = self.protocol.vesting.split(date, row.reward_by_luck);
        row.day_release = split.immediate;
        row.day_line_release = split.linear_per_day;
        row.official_release = self.protocol.official_release.daily(date);
        row.base_fee = seed.base_fee;
        Ok(row)
    }

    /// Pass 2: release, pledge, gas and circulating supply for `day_index`
    fn settle_day(&self, ledger: &mut Ledger, day_index: u32, inputs: &ProjectionInputs) -> Result<()> {
        let release_days = self.protocol.vesting.release_days;
        let lookahead = self.settings.lookahead_days;

        let line_release_sum = ledger.trailing_line_release(day_index, release_days);
        let forward_reward: f64 = ledger
            .window(day_index..day_index + lookahead)
            .iter()
            .map(|row| row.avg_reward)
            .sum();
        let (prev_supply, prev_sum_pledge) = ledger
            .get(day_index - 1)
            .map(|prev| (prev.circulating_supply / ATTO, prev.sum_pledge))
            .ok_or_else(|| ForecastError::unavailable(format!("no ledger row before day {day_index}")))?;

        let row = ledger
            .get_mut(day_index)
            .ok_or_else(|| ForecastError::unavailable(format!("no projected row for day {day_index}")))?;
        let increase_tib = inputs.increase_power_per_day as f64 / TIB;
        let power_tib = row.power as f64 / TIB;

        row.day_line_release_sum = line_release_sum;
        row.miner_release = row.day_release + line_release_sum;

        let pledge_base = row.power.max(row.kpi_power) as f64 / TIB;
        row.avg_pledge = forward_reward + self.settings.circulating_pledge_ratio * prev_supply / pledge_base;
        row.pledge = row.avg_pledge * increase_tib + (row.reward_by_luck - row.miner_release);
        row.sum_pledge = prev_sum_pledge + row.pledge;

        row.create_gas = inputs.create_gas_per_tib * increase_tib;
        row.keep_gas = inputs.keep_gas_per_tib * power_tib;
        row.penalty_gas = self.protocol.penalty_gas.estimate(inputs.base_fee);

        let burnt = row.pledge + row.create_gas + row.keep_gas + row.penalty_gas - self.settings.supply_offset;
        row.circulating_supply = (prev_supply + row.official_release + row.miner_release - burnt) * ATTO;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ymd;
    use crate::constants::PIB;
    use crate::history::HistoricalLedgerBuilder;
    use crate::source::ObservedDay;

    fn history(days: usize) -> Vec<LedgerRow> {
        let observed: Vec<ObservedDay> = (0..days)
            .map(|i| ObservedDay {
                date: ymd(2021, 1, 1) + Duration::days(i as i64),
                power: (3000 + 10 * i as u128) * PIB as u128,
                increase_power: 10 * PIB as i128,
                luck: Some(0.95),
                avg_reward: 0.01,
                avg_pledge: Some(0.2),
                base_fee: 2e9,
                circulating_supply: 1.2e8 * ATTO,
                ..Default::default()
            })
            .collect();
        let protocol = ProtocolParams {
            launch: ymd(2021, 1, 1).and_hms_opt(6, 0, 0).unwrap(),
            ..Default::default()
        };
        let curve = RewardCurve::mainnet();
        HistoricalLedgerBuilder::new(&protocol, &curve).build(&observed).unwrap()
    }

    fn inputs(days: u32) -> ProjectionInputs {
        ProjectionInputs {
            luck_v: 0.9,
            increase_power_per_day: 8 * PIB as i128,
            days,
            base_fee: 1e9,
            create_gas_per_tib: 0.05,
            keep_gas_per_tib: 0.0001,
        }
    }

    fn with_projector<T>(f: impl FnOnce(&ForwardProjector) -> T) -> T {
        let protocol = ProtocolParams {
            launch: ymd(2021, 1, 1).and_hms_opt(6, 0, 0).unwrap(),
            ..Default::default()
        };
        let curve = RewardCurve::mainnet();
        let settings = ProjectionSettings::default();
        f(&ForwardProjector::new(&protocol, &curve, &settings))
    }

    #[test]
    fn test_seam_continuity() {
        let history = history(30);
        let rows = with_projector(|p| p.run(&history, &inputs(10)).unwrap());

        // seed + days + lookahead
        assert_eq!(rows.len(), 1 + 10 + 20);
        assert_eq!(rows[0], *history.last().unwrap());

        let seed = &rows[0];
        let first = &rows[1];
        assert_eq!(first.day_index, seed.day_index + 1);
        assert_eq!(first.date, seed.date + Duration::days(1));
        assert_eq!(first.power, (seed.power as i128 + 8 * PIB as i128) as u128);
        assert_eq!(first.sum_power, seed.sum_power + first.limit_power);
        assert!(first.sum_baseline_reward >= seed.sum_baseline_reward);
        assert_eq!(first.origin, Origin::Projected);
    }

    #[test]
    fn test_project_returns_history_then_horizon() {
        let history = history(30);
        let rows = with_projector(|p| p.project(&history, &inputs(15)).unwrap());
        assert_eq!(rows.len(), 45);
        assert_eq!(&rows[..30], &history[..]);
        for pair in rows.windows(2) {
            assert_eq!(pair[1].day_index, pair[0].day_index + 1);
        }
        assert!(rows[30..].iter().all(|row| row.origin == Origin::Projected));
    }

    #[test]
    fn test_pledge_and_supply_recurrence() {
        let history = history(30);
        let rows = with_projector(|p| p.run(&history, &inputs(5)).unwrap());

        for k in 1..=5 {
            let (prev, row) = (&rows[k - 1], &rows[k]);
            assert!((row.sum_pledge - (prev.sum_pledge + row.pledge)).abs() < 1e-6);
            assert!((row.miner_release - (row.day_release + row.day_line_release_sum)).abs() < 1e-9);

            let forward: f64 = rows[k..k + 20].iter().map(|r| r.avg_reward).sum();
            let base = row.power.max(row.kpi_power) as f64 / TIB;
            let expected = forward + 0.3 * (prev.circulating_supply / ATTO) / base;
            assert!((row.avg_pledge - expected).abs() < 1e-9);
        }

        // lookahead rows never settle
        assert_eq!(rows[6].pledge, 0.0);
        assert_eq!(rows[6].circulating_supply, 0.0);
    }

    #[test]
    fn test_power_floors_at_zero() {
        let history = history(3);
        let mut shrinking = inputs(3);
        shrinking.increase_power_per_day = -(1i128 << 100);
        let rows = with_projector(|p| p.run(&history, &shrinking).unwrap());
        assert!(rows[1..].iter().all(|row| row.power == 0 && row.avg_reward == 0.0));
    }

    #[test]
    fn test_empty_history_fails() {
        let result = with_projector(|p| p.run(&[], &inputs(3)));
        assert!(matches!(result, Err(ForecastError::DataUnavailable(_))));
    }

    #[test]
    fn test_oversized_horizon_rejected() {
        let history = history(3);
        for days in [MAX_HORIZON_DAYS + 1, u32::MAX] {
            let result = with_projector(|p| p.project(&history, &inputs(days)));
            assert!(matches!(result, Err(ForecastError::Configuration(_))), "days {days}");
        }
    }

    #[test]
    fn test_rows_from_date() {
        let history = history(10);
        let rows = with_projector(|p| p.project(&history, &inputs(5)).unwrap());
        let projection = Projection {
            rows,
            history_len: 10,
            luck_v: 0.9,
            luck_assumed: false,
            increase_power_per_day: 8 * PIB as i128,
            increase_derived: false,
            keep_gas_assumed: false,
            days: 5,
        };
        assert_eq!(projection.projected().len(), 5);
        assert_eq!(projection.rows_from(ymd(2021, 1, 11)).len(), 5);
        assert_eq!(projection.row_on(ymd(2021, 1, 11)).unwrap().origin, Origin::Projected);
        assert!(projection.row_on(ymd(2020, 12, 31)).is_none());
    }
}
