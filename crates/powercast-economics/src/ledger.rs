//! Daily ledger rows and the day-indexed arena that holds them

use std::ops::Range;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, Result};

/// Where a row's power and reward figures come from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Historical,
    Projected,
}

/// One calendar day of minting, vesting and collateral.
///
/// Historical and projected rows share every field; values that a path does
/// not produce stay at zero.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LedgerRow {
    /// Days since launch
    pub day_index: u32,
    pub date: NaiveDate,
    pub origin: Origin,

    /// Effective network power, bytes
    pub power: u128,
    /// Power capped at the baseline
    pub limit_power: u128,
    /// Running sum of capped power
    pub sum_power: u128,
    /// Baseline power
    pub kpi_power: u128,
    /// Daily power increment, bytes
    pub increase_power: i128,

    /// Effective network time, days
    pub kpi_time: f64,
    pub sum_baseline_reward: f64,
    pub simple_reward: f64,
    pub baseline_reward: f64,
    pub reward: f64,
    pub reward_by_luck: f64,
    pub luck_v: f64,
    /// Reward per TiB
    pub avg_reward: f64,

    pub day_release: f64,
    pub day_line_release: f64,
    /// Linear release owed today by the previous `release_days` rows
    pub day_line_release_sum: f64,
    pub miner_release: f64,

    /// Pledge per TiB
    pub avg_pledge: f64,
    pub pledge: f64,
    pub sum_pledge: f64,

    pub base_fee: f64,
    /// Atto units
    pub circulating_supply: f64,
    pub create_gas: f64,
    pub keep_gas: f64,
    pub penalty_gas: f64,
    pub official_release: f64,

    /// No block was observed; luck of 1 was assumed
    pub luck_assumed: bool,
    /// Pledge sample missing; previous day's pledge carried forward
    pub pledge_carried: bool,
}

impl LedgerRow {
    /// A row with every figure zeroed
    pub fn empty(day_index: u32, date: NaiveDate, origin: Origin) -> Self {
        Self {
            day_index,
            date,
            origin,
            power: 0,
            limit_power: 0,
            sum_power: 0,
            kpi_power: 0,
            increase_power: 0,
            kpi_time: 0.0,
            sum_baseline_reward: 0.0,
            simple_reward: 0.0,
            baseline_reward: 0.0,
            reward: 0.0,
            reward_by_luck: 0.0,
            luck_v: 0.0,
            avg_reward: 0.0,
            day_release: 0.0,
            day_line_release: 0.0,
            day_line_release_sum: 0.0,
            miner_release: 0.0,
            avg_pledge: 0.0,
            pledge: 0.0,
            sum_pledge: 0.0,
            base_fee: 0.0,
            circulating_supply: 0.0,
            create_gas: 0.0,
            keep_gas: 0.0,
            penalty_gas: 0.0,
            official_release: 0.0,
            luck_assumed: false,
            pledge_carried: false,
        }
    }
}

/// Rows addressed directly by `day_index`.
///
/// Rows must be pushed for consecutive days, so a day's position is
/// `day_index - first_day`.
#[derive(Clone, Debug, Default)]
pub struct Ledger {
    rows: Vec<LedgerRow>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            rows: Vec::with_capacity(capacity),
        }
    }

    /// Adopt existing rows, checking they are consecutive
    pub fn from_rows(rows: Vec<LedgerRow>) -> Result<Self> {
        let mut ledger = Self::with_capacity(rows.len());
        for row in rows {
            ledger.push(row)?;
        }
        Ok(ledger)
    }

    /// Append the next day's row
    pub fn push(&mut self, row: LedgerRow) -> Result<()> {
        if let Some(last) = self.rows.last() {
            if row.day_index != last.day_index + 1 {
                return Err(ForecastError::unavailable(format!(
                    "ledger rows must be consecutive: day {} ({}) follows day {} ({})",
                    row.day_index, row.date, last.day_index, last.date
                )));
            }
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn first_day(&self) -> Option<u32> {
        self.rows.first().map(|row| row.day_index)
    }

    pub fn last(&self) -> Option<&LedgerRow> {
        self.rows.last()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn position(&self, day_index: u32) -> Option<usize> {
        let first = self.first_day()?;
        let pos = day_index.checked_sub(first)? as usize;
        (pos < self.rows.len()).then_some(pos)
    }

    pub fn get(&self, day_index: u32) -> Option<&LedgerRow> {
        self.position(day_index).map(|pos| &self.rows[pos])
    }

    pub fn get_mut(&mut self, day_index: u32) -> Option<&mut LedgerRow> {
        let pos = self.position(day_index)?;
        Some(&mut self.rows[pos])
    }

    /// Rows whose day falls in `days`, clipped to what the ledger holds
    pub fn window(&self, days: Range<u32>) -> &[LedgerRow] {
        let Some(first) = self.first_day() else {
            return &[];
        };
        let len = self.rows.len();
        let clip = |day: u32| (day.saturating_sub(first) as usize).min(len);
        let (start, end) = (clip(days.start), clip(days.end));
        if start >= end {
            return &[];
        }
        &self.rows[start..end]
    }

    /// Sum of `day_line_release` over the `release_days` rows before `day_index`
    pub fn trailing_line_release(&self, day_index: u32, release_days: u32) -> f64 {
        self.window(day_index.saturating_sub(release_days)..day_index)
            .iter()
            .map(|row| row.day_line_release)
            .sum()
    }

    pub fn rows(&self) -> &[LedgerRow] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<LedgerRow> {
        self.rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ymd;

    fn row(day_index: u32, line: f64) -> LedgerRow {
        let date = ymd(2020, 8, 25) + chrono::Duration::days(day_index as i64);
        LedgerRow {
            day_line_release: line,
            ..LedgerRow::empty(day_index, date, Origin::Historical)
        }
    }

    #[test]
    fn test_indexed_lookup() {
        let ledger = Ledger::from_rows((5..10).map(|d| row(d, d as f64)).collect()).unwrap();
        assert_eq!(ledger.first_day(), Some(5));
        assert_eq!(ledger.get(7).unwrap().day_index, 7);
        assert!(ledger.get(4).is_none());
        assert!(ledger.get(10).is_none());
    }

    #[test]
    fn test_gap_rejected() {
        let mut ledger = Ledger::new();
        ledger.push(row(0, 0.0)).unwrap();
        let err = ledger.push(row(2, 0.0)).unwrap_err();
        assert!(matches!(err, ForecastError::DataUnavailable(_)));
    }

    #[test]
    fn test_window_clipping() {
        let ledger = Ledger::from_rows((10..20).map(|d| row(d, 1.0)).collect()).unwrap();
        assert_eq!(ledger.window(0..12).len(), 2);
        assert_eq!(ledger.window(15..100).len(), 5);
        assert!(ledger.window(30..40).is_empty());
    }

    #[test]
    fn test_trailing_line_release_excludes_current_day() {
        let ledger = Ledger::from_rows((0..400).map(|d| row(d, 1.0)).collect()).unwrap();
        assert_eq!(ledger.trailing_line_release(0, 180), 0.0);
        assert_eq!(ledger.trailing_line_release(10, 180), 10.0);
        assert_eq!(ledger.trailing_line_release(300, 180), 180.0);
    }
}
