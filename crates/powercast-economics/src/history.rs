//! # Historical Ledger
//!
//! Rebuilds one ledger row per observed day, oldest first. Each row depends
//! only on rows already built:
//!
//! ```text
//! sum_power[i]      = sum_power[i-1] + limit_power[i-1]
//! limit_power[i]    = min(power[i], baseline(i))
//! baseline_rwd[i]   = sum_baseline(kpi_time(sum_power[i])) - sum_baseline[i-1]
//! reward[i]         = simple(i) + baseline_rwd[i]
//! miner_release[i]  = immediate[i] + Σ linear[i-180 .. i-1]
//! pledge[i]         = avg_pledge[i] · Δpower[i] + reward_by_luck[i] - miner_release[i]
//! ```

use crate::config::ProtocolParams;
use crate::constants::TIB;
use crate::curve::RewardCurve;
use crate::error::{ForecastError, Result};
use crate::ledger::{Ledger, LedgerRow, Origin};
use crate::luck::LuckEstimator;
use crate::source::{LuckWindow, ObservedDay, WinCountSource};

/// Builds the historical ledger from observed days
pub struct HistoricalLedgerBuilder<'a> {
    protocol: &'a ProtocolParams,
    curve: &'a RewardCurve,
    wins: Option<&'a dyn WinCountSource>,
}

impl<'a> HistoricalLedgerBuilder<'a> {
    pub fn new(protocol: &'a ProtocolParams, curve: &'a RewardCurve) -> Self {
        Self {
            protocol,
            curve,
            wins: None,
        }
    }

    /// Estimate luck from the day's blocks when a day carries none
    pub fn with_win_source(mut self, wins: &'a dyn WinCountSource) -> Self {
        self.wins = Some(wins);
        self
    }

    /// Build every row. Days must be consecutive and start on or after launch.
    pub fn build(&self, days: &[ObservedDay]) -> Result<Vec<LedgerRow>> {
        if days.is_empty() {
            return Err(ForecastError::unavailable("no observed days"));
        }

        let mut ledger = Ledger::with_capacity(days.len());
        for day in days {
            let row = self.next_row(&ledger, day)?;
            ledger.push(row)?;
        }

        let rows = ledger.into_rows();
        let assumed = rows.iter().filter(|row| row.luck_assumed).count();
        let carried = rows.iter().filter(|row| row.pledge_carried).count();
        if assumed > 0 || carried > 0 {
            tracing::warn!(assumed_luck = assumed, carried_pledge = carried, "History built with fallbacks");
        }
        tracing::debug!(rows = rows.len(), "Built historical ledger");
        Ok(rows)
    }

    fn next_row(&self, ledger: &Ledger, day: &ObservedDay) -> Result<LedgerRow> {
        let day_index = self.protocol.day_index(day.date).ok_or_else(|| {
            ForecastError::unavailable(format!("observed day {} precedes launch", day.date))
        })?;
        let prev = ledger.last();

        let mut row = LedgerRow::empty(day_index, day.date, Origin::Historical);
        row.power = day.power;
        row.increase_power = day.increase_power;

        // Capped power enters the running sum one day late
        row.sum_power = prev.map_or(0, |p| p.sum_power + p.limit_power);
        row.kpi_power = self.curve.kpi_power_at(day_index);
        row.limit_power = row.power.min(row.kpi_power);

        row.kpi_time = self.curve.effective_time_at(row.sum_power as f64)?;
        row.sum_baseline_reward = self.curve.cumulative_baseline(row.kpi_time);
        row.baseline_reward = row.sum_baseline_reward - prev.map_or(0.0, |p| p.sum_baseline_reward);
        row.simple_reward = self.curve.simple_reward_for_day(day_index);
        row.reward = row.simple_reward + row.baseline_reward;

        let (luck, assumed) = self.resolve_luck(day)?;
        row.luck_v = luck;
        row.luck_assumed = assumed;
        row.reward_by_luck = row.reward * luck;

        let vesting = &self.protocol.vesting;
        let split = vesting.split(day.date, row.reward_by_luck);
        row.day_release = split.immediate;
        row.day_line_release = split.linear_per_day;
        row.day_line_release_sum = ledger.trailing_line_release(day_index, vesting.release_days);
        row.miner_release = row.day_release + row.day_line_release_sum;

        row.avg_pledge = match (day.avg_pledge, prev) {
            (Some(per_sector), _) => per_sector * self.protocol.sector_pledge_multiplier,
            (None, Some(p)) => {
                row.pledge_carried = true;
                p.avg_pledge
            }
            (None, None) => {
                return Err(ForecastError::unavailable(format!(
                    "no pledge sample for first observed day {}",
                    day.date
                )))
            }
        };
        row.pledge = row.avg_pledge * (day.increase_power as f64 / TIB)
            + (row.reward_by_luck - row.miner_release);
        row.sum_pledge = prev.map_or(0.0, |p| p.sum_pledge) + row.pledge;

        row.avg_reward = day.avg_reward;
        row.base_fee = day.base_fee;
        row.circulating_supply = day.circulating_supply;
        row.create_gas = day.create_gas;
        row.keep_gas = day.keep_gas;
        row.penalty_gas = self.protocol.penalty_gas.estimate(day.base_fee);
        row.official_release = self.protocol.official_release.daily(day.date);

        Ok(row)
    }

    /// Observed luck, else luck measured from the day's blocks, else 1 (assumed)
    fn resolve_luck(&self, day: &ObservedDay) -> Result<(f64, bool)> {
        if let Some(luck) = day.luck {
            if !(0.0..=1.0).contains(&luck) {
                return Err(ForecastError::unavailable(format!(
                    "observed luck {luck} on {} is outside [0, 1]",
                    day.date
                )));
            }
            return Ok((luck, false));
        }

        match self.wins {
            Some(wins) => {
                let estimator = LuckEstimator::new(wins, self.protocol.expected_wins_per_height);
                Ok(estimator.estimate(LuckWindow::Day(day.date))?.or_assume(1.0))
            }
            None => Ok((1.0, true)),
        }
    }
}
