//! # Forecaster
//!
//! Entry point tying the data sources, the reward model and the result caches
//! together. Every operation takes the caller's notion of "now" so cache
//! expiry never depends on a hidden clock.
//!
//! ```text
//! DaySource ──► HistoricalLedgerBuilder ──► [history cache]
//!                                              │
//! WinCountSource ──► LuckEstimator ──┐         ▼
//! NetworkSnapshotSource ─────────────┴─► ForwardProjector ──► [projection cache]
//!                                                                  │
//!                                     MinerAmortizationSimulator ◄─┘
//! ```

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::amortization::{
    AmortizationParams, AmortizationSummary, DailyRates, GasRates, MinerAmortizationSimulator, ProjectionDay,
};
use crate::cache::{CacheStats, MemoizedCache};
use crate::config::ForecastConfig;
use crate::constants::TIB;
use crate::curve::RewardCurve;
use crate::error::{ForecastError, Result};
use crate::history::HistoricalLedgerBuilder;
use crate::ledger::LedgerRow;
use crate::luck::{LuckEstimate, LuckEstimator};
use crate::projection::{ForwardProjector, Projection, ProjectionInputs, ProjectionRequest};
use crate::source::{Dataset, DaySource, LuckWindow, NetworkSnapshotSource, WinCountSource};

/// External collaborators
#[derive(Clone)]
pub struct Sources {
    pub days: Arc<dyn DaySource>,
    pub wins: Arc<dyn WinCountSource>,
    pub snapshot: Arc<dyn NetworkSnapshotSource>,
}

impl Sources {
    /// Serve everything from one dataset
    pub fn from_dataset(dataset: Dataset) -> Self {
        let dataset = Arc::new(dataset);
        Self {
            days: dataset.clone(),
            wins: dataset.clone(),
            snapshot: dataset,
        }
    }
}

/// The history has a single global entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HistoryKey;

/// Projection parameters after defaults are resolved
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ProjectionKey {
    /// `f64::to_bits` of the luck
    pub luck_bits: u64,
    pub increase_power: i128,
    pub days: u32,
}

/// Miner simulation request
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AmortizationRequest {
    /// TiB sealed per day
    pub power_per_day: f64,
    /// Target capacity, TiB
    pub total_power: f64,
    #[serde(default)]
    pub init_power: f64,
    /// Date of day 1; defaults to the `as_of` date
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub horizon: Option<u32>,

    /// Luck for the underlying projection
    #[serde(default)]
    pub luck_v: Option<f64>,
    /// Network power increment for the underlying projection, bytes
    #[serde(default)]
    pub increase_power_per_day: Option<i128>,
    /// Reward per TiB for each day, replacing the projection
    #[serde(default)]
    pub reward_override: Option<Vec<f64>>,
    /// Pledge per TiB used with `reward_override` or `use_snapshot_rates`
    #[serde(default)]
    pub pledge_override: Option<f64>,
    /// Price every day at the snapshot's reward per TiB instead of a projection
    #[serde(default)]
    pub use_snapshot_rates: bool,

    /// Outlay to recover, in the unit of `price`
    #[serde(default)]
    pub cost: f64,
    /// Token price; defaults to the snapshot price
    #[serde(default)]
    pub price: Option<f64>,
    /// Deduct gas from income when finding the break-even day
    #[serde(default)]
    pub use_gas: bool,
    #[serde(default)]
    pub must_refresh: bool,
}

/// Simulation output
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Amortization {
    pub params: AmortizationParams,
    pub schedule: Vec<ProjectionDay>,
    pub summary: AmortizationSummary,
    /// Rates came from `reward_override` rather than a projection
    pub rates_overridden: bool,
    /// Rates are the snapshot's constant reward per TiB
    pub snapshot_rates: bool,
    /// Days priced at the snapshot pledge because the projection had none
    pub pledge_fallback_days: u32,
    /// Target capacity as a share of the snapshot's network power
    pub network_share: f64,
    /// Luck of the projection the rates came from
    pub luck_v: Option<f64>,
    pub luck_assumed: bool,
}

/// Reward and pledge forecasting service
pub struct Forecaster {
    config: ForecastConfig,
    curve: RewardCurve,
    sources: Sources,
    history: MemoizedCache<HistoryKey, Vec<LedgerRow>>,
    projections: MemoizedCache<ProjectionKey, Projection>,
}

impl Forecaster {
    pub fn new(config: ForecastConfig, sources: Sources) -> Result<Self> {
        config.validate()?;
        let curve = RewardCurve::new(config.protocol.curve.clone())?;
        let history = MemoizedCache::new(Duration::seconds(config.cache.history_ttl_secs));
        let projections = MemoizedCache::new(Duration::seconds(config.cache.projection_ttl_secs));

        Ok(Self {
            config,
            curve,
            sources,
            history,
            projections,
        })
    }

    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    pub fn curve(&self) -> &RewardCurve {
        &self.curve
    }

    /// Historical ledger, one row per observed day
    pub fn build_history(&self, as_of: DateTime<Utc>, must_refresh: bool) -> Result<Arc<Vec<LedgerRow>>> {
        self.history.get_or_compute(&HistoryKey, as_of, must_refresh, || {
            let days = self.sources.days.days_ordered()?;
            tracing::info!(days = days.len(), "Rebuilding historical ledger");
            HistoricalLedgerBuilder::new(&self.config.protocol, &self.curve)
                .with_win_source(self.sources.wins.as_ref())
                .build(&days)
        })
    }

    /// History extended `days` into the future
    pub fn project(&self, request: &ProjectionRequest, as_of: DateTime<Utc>) -> Result<Arc<Projection>> {
        let history = self.build_history(as_of, request.must_refresh)?;

        let (luck_v, luck_assumed) = match request.luck_v {
            Some(luck) => (luck, false),
            None => self.live_luck()?.or_assume(1.0),
        };
        if luck_assumed {
            tracing::warn!("No live blocks; assuming luck of 1");
        }

        let (increase, increase_derived) = match request.increase_power_per_day {
            Some(increase) => (increase, false),
            None => (self.trailing_increase(&history)?, true),
        };
        let days = request.days.unwrap_or(self.config.projection.default_days);

        let key = ProjectionKey {
            luck_bits: luck_v.to_bits(),
            increase_power: increase,
            days,
        };
        self.projections.get_or_compute(&key, as_of, request.must_refresh, || {
            tracing::info!(luck_v, increase, days, "Recomputing projection");
            let overview = self.sources.snapshot.overview()?;
            let (keep_gas_per_tib, keep_gas_assumed) = self.trailing_keep_gas(&history);
            let inputs = ProjectionInputs {
                luck_v,
                increase_power_per_day: increase,
                days,
                base_fee: overview.base_fee,
                create_gas_per_tib: overview.create_gas_per_tib,
                keep_gas_per_tib,
            };

            let projector = ForwardProjector::new(&self.config.protocol, &self.curve, &self.config.projection);
            let rows = projector.project(&history, &inputs)?;
            Ok(Projection {
                rows,
                history_len: history.len(),
                luck_v,
                luck_assumed,
                increase_power_per_day: increase,
                increase_derived,
                keep_gas_assumed,
                days,
            })
        })
    }

    /// Day-by-day schedule for a single miner
    pub fn simulate_amortization(&self, request: &AmortizationRequest, as_of: DateTime<Utc>) -> Result<Amortization> {
        let overview = self.sources.snapshot.overview()?;
        let start_date = request.start_date.unwrap_or_else(|| as_of.date_naive());
        let settings = &self.config.amortization;

        let mut params = AmortizationParams::new(
            request.power_per_day,
            request.total_power,
            request.init_power,
            start_date,
        );
        params.horizon = request.horizon.unwrap_or(settings.horizon_days);
        params.package_days = settings.package_days;
        params.release_days = self.config.protocol.vesting.release_days;
        params.immediate_ratio = self.config.protocol.vesting.immediate_ratio;
        params.gas = GasRates {
            create_per_tib: overview.create_gas_per_tib,
            keep_per_tib: overview.keep_gas_per_tib,
            create_per_tib_64: overview.create_gas_per_tib_64,
            keep_per_tib_64: overview.keep_gas_per_tib_64,
        };
        let simulator = MinerAmortizationSimulator::new(params)?;

        let horizon = simulator.params().horizon;
        let snapshot_pledge = overview.avg_pledge * self.config.protocol.sector_pledge_multiplier;
        let pledge = request.pledge_override.unwrap_or(snapshot_pledge);
        let (rates, luck_v, luck_assumed) = match &request.reward_override {
            Some(rewards) => (DailyRates::from_override(rewards.clone(), pledge), None, false),
            None if request.use_snapshot_rates => {
                tracing::info!(avg_reward = overview.avg_reward, pledge, "Pricing at snapshot rates");
                let rewards = vec![overview.avg_reward; horizon as usize];
                (DailyRates::from_override(rewards, pledge), None, false)
            }
            None => {
                let projection = self.projection_covering(request, start_date, horizon, as_of)?;
                let rates = DailyRates::from_projection(&projection, start_date, horizon, snapshot_pledge)?;
                (rates, Some(projection.luck_v), projection.luck_assumed)
            }
        };

        let schedule = simulator.simulate(&rates)?;
        let price = request.price.unwrap_or(overview.price);
        let summary = AmortizationSummary::summarize(simulator.params(), &schedule, request.cost, price, request.use_gas);

        Ok(Amortization {
            params: simulator.params().clone(),
            schedule,
            summary,
            rates_overridden: request.reward_override.is_some(),
            snapshot_rates: request.reward_override.is_none() && request.use_snapshot_rates,
            pledge_fallback_days: rates.pledge_fallback_days,
            network_share: network_share(request.total_power, overview.total_power),
            luck_v,
            luck_assumed,
        })
    }

    /// Luck over the most recent blocks
    pub fn live_luck(&self) -> Result<LuckEstimate> {
        LuckEstimator::new(self.sources.wins.as_ref(), self.config.protocol.expected_wins_per_height)
            .estimate(LuckWindow::Live)
    }

    pub fn history_cache_stats(&self) -> CacheStats {
        self.history.stats()
    }

    pub fn projection_cache_stats(&self) -> CacheStats {
        self.projections.stats()
    }

    /// Projection long enough to price every simulated day
    fn projection_covering(
        &self,
        request: &AmortizationRequest,
        start_date: NaiveDate,
        horizon: u32,
        as_of: DateTime<Utc>,
    ) -> Result<Arc<Projection>> {
        let history = self.build_history(as_of, false)?;
        let last = history
            .last()
            .ok_or_else(|| ForecastError::unavailable("history is empty"))?;
        let last_sim_day = start_date
            .checked_add_signed(Duration::days(i64::from(horizon) - 1))
            .ok_or_else(|| ForecastError::config(format!("{horizon} days from {start_date} is out of range")))?;
        let needed = u32::try_from((last_sim_day - last.date).num_days().max(0))
            .map_err(|_| ForecastError::config(format!("simulation ending {last_sim_day} is too far ahead")))?;

        let projection_request = ProjectionRequest {
            luck_v: request.luck_v,
            increase_power_per_day: request.increase_power_per_day,
            days: Some(needed.max(self.config.projection.default_days)),
            must_refresh: request.must_refresh,
        };
        self.project(&projection_request, as_of)
    }

    /// Mean daily increment of the trailing historical window
    fn trailing_increase(&self, history: &[LedgerRow]) -> Result<i128> {
        let window = self.config.projection.trailing_increase_days;
        let tail = &history[history.len().saturating_sub(window)..];
        if tail.is_empty() {
            return Err(ForecastError::unavailable("no history to derive a power increment from"));
        }
        let increase = tail.iter().map(|row| row.increase_power).sum::<i128>() / tail.len() as i128;
        tracing::warn!(increase, window = tail.len(), "Derived power increment from history");
        Ok(increase)
    }

    /// Mean keep gas per TiB of the trailing historical window, flagged when there is no sample
    fn trailing_keep_gas(&self, history: &[LedgerRow]) -> (f64, bool) {
        let window = self.config.projection.trailing_gas_days;
        let samples: Vec<f64> = history[history.len().saturating_sub(window)..]
            .iter()
            .filter(|row| row.power > 0)
            .map(|row| row.keep_gas / (row.power as f64 / TIB))
            .collect();
        if samples.is_empty() {
            tracing::warn!(window, "No keep gas sample in trailing history; projecting zero keep gas");
            return (0.0, true);
        }
        (samples.iter().sum::<f64>() / samples.len() as f64, false)
    }
}

/// `capacity_tib` over the network's power in bytes, 0 for an empty network
fn network_share(capacity_tib: f64, network_power: u128) -> f64 {
    if network_power == 0 {
        return 0.0;
    }
    capacity_tib / (network_power as f64 / TIB)
}
