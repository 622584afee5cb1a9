//! # Luck Estimation
//!
//! Luck compares the block wins actually produced per height with the
//! protocol's expected wins per height:
//!
//! ```text
//! luck = min(1, Σ wins / #heights / expected_wins_per_height)
//! ```
//!
//! A window without any recorded block is reported as
//! [`LuckEstimate::NoBlocks`], never as a luck of zero. Choosing a fallback is
//! left to the caller.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::source::{LuckWindow, WinCountSource};

/// Outcome of a luck estimate
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum LuckEstimate {
    /// Measured from recorded blocks, within `[0, 1]`
    Measured(f64),
    /// No block recorded in the window
    NoBlocks,
}

impl LuckEstimate {
    pub fn value(&self) -> Option<f64> {
        match self {
            Self::Measured(v) => Some(*v),
            Self::NoBlocks => None,
        }
    }

    /// Measured value, or `fallback` together with an "assumed" flag
    pub fn or_assume(&self, fallback: f64) -> (f64, bool) {
        match self {
            Self::Measured(v) => (*v, false),
            Self::NoBlocks => (fallback, true),
        }
    }
}

/// Computes luck from a block win source
pub struct LuckEstimator<'a> {
    source: &'a dyn WinCountSource,
    expected_wins_per_height: f64,
}

impl<'a> LuckEstimator<'a> {
    pub fn new(source: &'a dyn WinCountSource, expected_wins_per_height: f64) -> Self {
        Self {
            source,
            expected_wins_per_height,
        }
    }

    pub fn estimate(&self, window: LuckWindow) -> Result<LuckEstimate> {
        let records = self.source.win_counts(window)?;

        let mut per_height: BTreeMap<u64, u64> = BTreeMap::new();
        for record in &records {
            *per_height.entry(record.height).or_insert(0) += record.win_count;
        }

        let estimate = luck_from_heights(per_height.values().copied(), self.expected_wins_per_height);
        tracing::debug!(?window, heights = per_height.len(), ?estimate, "Estimated luck");
        Ok(estimate)
    }
}

/// Luck from the summed win count of each distinct height
pub fn luck_from_heights(wins: impl IntoIterator<Item = u64>, expected_wins_per_height: f64) -> LuckEstimate {
    let (heights, total) = wins
        .into_iter()
        .fold((0u64, 0u64), |(n, sum), w| (n + 1, sum + w));
    if heights == 0 {
        return LuckEstimate::NoBlocks;
    }
    let raw = total as f64 / heights as f64 / expected_wins_per_height;
    LuckEstimate::Measured(raw.min(1.0))
}
