//! # Powercast Economics - Storage Network Reward & Pledge Forecasting
//!
//! Reconstructs the daily minting, vesting and collateral ledger of a
//! proof-of-storage network from observed history, projects it forward under
//! assumed luck and power growth, and simulates a single miner's sealing ramp
//! against the projected per-TiB rates.
//!
//! ## Pipeline
//!
//! ```text
//! ┌──────────────┐   ┌────────────────────┐   ┌──────────────────┐   ┌───────────────────┐
//! │ ObservedDay  │──►│ HistoricalLedger   │──►│ ForwardProjector │──►│ MinerAmortization │
//! │ (DaySource)  │   │ Builder            │   │ (luck, Δpower)   │   │ Simulator         │
//! └──────────────┘   └────────────────────┘   └──────────────────┘   └───────────────────┘
//!                              ▲                        ▲
//!                       RewardCurve              LuckEstimator
//! ```
//!
//! ## Minting
//!
//! | Pool | Tokens | Release |
//! |------|--------|---------|
//! | Simple | 330M | exponential decay per block |
//! | Baseline | 770M | as capped network power catches the baseline |
//!
//! Mined rewards vest over 180 days, 25% immediately since 2020-10-22.

pub mod amortization;
pub mod cache;
pub mod config;
pub mod curve;
pub mod error;
pub mod forecast;
pub mod history;
pub mod ledger;
pub mod luck;
pub mod projection;
pub mod source;
pub mod vesting;

// Re-exports
pub use amortization::{
    AmortizationParams, AmortizationSummary, DailyRates, GasRates, MinerAmortizationSimulator, ProjectionDay,
};
pub use cache::{CacheStats, MemoizedCache};
pub use config::{AmortizationSettings, CacheSettings, ForecastConfig, ProjectionSettings, ProtocolParams};
pub use curve::{CurveParams, RewardCurve};
pub use error::{ForecastError, Result};
pub use forecast::{Amortization, AmortizationRequest, Forecaster, HistoryKey, ProjectionKey, Sources};
pub use history::HistoricalLedgerBuilder;
pub use ledger::{Ledger, LedgerRow, Origin};
pub use luck::{LuckEstimate, LuckEstimator};
pub use projection::{ForwardProjector, Projection, ProjectionInputs, ProjectionRequest};
pub use source::{
    Dataset, DaySource, HeightWins, LuckWindow, NetworkOverview, NetworkSnapshotSource, ObservedDay,
    WinCountSource,
};
pub use vesting::{OfficialRelease, PenaltyGas, ReleaseSplit, ReleaseStage, VestingSchedule};

/// Network and unit constants
pub mod constants {
    /// Bytes in one TiB
    pub const TIB: f64 = 1_099_511_627_776.0;

    /// Bytes in one PiB
    pub const PIB: f64 = 1024.0 * TIB;

    /// Bytes in one EiB
    pub const EIB: f64 = 1024.0 * PIB;

    /// Atto units per token
    pub const ATTO: f64 = 1e18;

    /// Tokens minted by the simple pool over the network's lifetime
    pub const SIMPLE_POOL: f64 = 330_000_000.0;

    /// Tokens minted by the baseline pool over the network's lifetime
    pub const BASELINE_POOL: f64 = 770_000_000.0;

    /// Simple pool decay per block (six-year half-life)
    pub const SIMPLE_DECAY_PER_BLOCK: f64 = 1.09897764548444e-7;

    /// Baseline pool half-life in days of effective network time
    pub const BASELINE_HALF_LIFE_DAYS: f64 = 6.0 * 365.0;

    /// Days for the baseline power to double
    pub const BASELINE_DOUBLING_DAYS: f64 = 365.0;

    /// Baseline power at launch: 2.5 EiB
    pub const INITIAL_BASELINE_BYTES: f64 = 2.5 * EIB;

    /// Epochs per day (30 s epochs)
    pub const BLOCKS_PER_DAY: u64 = 2880;

    /// Epochs on the launch day, which started at 06:00
    pub const LAUNCH_DAY_BLOCKS: u64 = 2160;

    /// Days over which mined rewards vest
    pub const RELEASE_DAYS: u32 = 180;

    /// Share of a mined reward released immediately
    pub const IMMEDIATE_RELEASE_RATIO: f64 = 0.25;

    /// Sector packing cycle length
    pub const PACKAGE_DAYS: u32 = 540;

    /// Forward window of the projected pledge estimate
    pub const PLEDGE_LOOKAHEAD_DAYS: u32 = 20;

    /// Longest projection or simulation horizon accepted, about a century
    pub const MAX_HORIZON_DAYS: u32 = 36_500;

    /// Block wins expected per height
    pub const EXPECTED_WINS_PER_HEIGHT: f64 = 5.0;

    /// 32 GiB sectors in one TiB
    pub const SECTORS_PER_TIB: f64 = 32.0;
}

pub use constants::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_ladder() {
        assert_eq!(PIB / TIB, 1024.0);
        assert_eq!(EIB, 1024f64.powi(6));
    }

    #[test]
    fn test_launch_day_is_three_quarters() {
        assert_eq!(LAUNCH_DAY_BLOCKS * 4, BLOCKS_PER_DAY * 3);
    }
}
