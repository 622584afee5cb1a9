//! External data sources
//!
//! The forecaster reads observed history, per-height block wins and a live
//! network snapshot through these traits. Storage and fetching live outside
//! this crate; [`Dataset`] is a JSON-backed implementation of all three.

use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One observed network day
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ObservedDay {
    pub date: NaiveDate,
    /// Effective network power, bytes
    pub power: u128,
    /// Net power added that day, bytes
    #[serde(default)]
    pub increase_power: i128,
    /// Luck measured for the day; `None` when no blocks were recorded
    #[serde(default)]
    pub luck: Option<f64>,
    /// Reward per TiB observed that day
    #[serde(default)]
    pub avg_reward: f64,
    /// Initial pledge per sector; `None` when the sample is missing
    #[serde(default)]
    pub avg_pledge: Option<f64>,
    #[serde(default)]
    pub base_fee: f64,
    /// Circulating supply in atto units
    #[serde(default)]
    pub circulating_supply: f64,
    /// Sealing gas burnt network-wide
    #[serde(default)]
    pub create_gas: f64,
    /// Proof maintenance gas burnt network-wide
    #[serde(default)]
    pub keep_gas: f64,
}

/// Win count recorded for a block at `height`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HeightWins {
    pub height: u64,
    pub date: NaiveDate,
    pub win_count: u64,
}

/// Which blocks a luck estimate covers
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LuckWindow {
    /// All blocks of one calendar day
    Day(NaiveDate),
    /// The rolling window of recently seen blocks
    Live,
}

/// Point-in-time network statistics
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkOverview {
    /// Network power, bytes
    pub total_power: u128,
    /// Reward per TiB per day
    pub avg_reward: f64,
    /// Initial pledge per sector
    pub avg_pledge: f64,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub base_fee: f64,
    /// Sealing gas per TiB, 32 GiB sectors
    #[serde(default)]
    pub create_gas_per_tib: f64,
    /// Sealing gas per TiB, 64 GiB sectors
    #[serde(default)]
    pub create_gas_per_tib_64: f64,
    /// Daily maintenance gas per TiB, 32 GiB sectors
    #[serde(default)]
    pub keep_gas_per_tib: f64,
    /// Daily maintenance gas per TiB, 64 GiB sectors
    #[serde(default)]
    pub keep_gas_per_tib_64: f64,
}

/// Observed-day store
pub trait DaySource: Send + Sync {
    /// All observed days, oldest first
    fn days_ordered(&self) -> Result<Vec<ObservedDay>>;

    fn get_day(&self, date: NaiveDate) -> Result<Option<ObservedDay>> {
        Ok(self.days_ordered()?.into_iter().find(|day| day.date == date))
    }
}

/// Block win records
pub trait WinCountSource: Send + Sync {
    fn win_counts(&self, window: LuckWindow) -> Result<Vec<HeightWins>>;
}

/// Live network statistics
pub trait NetworkSnapshotSource: Send + Sync {
    fn overview(&self) -> Result<NetworkOverview>;
}

/// In-memory sources, loadable from JSON
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    pub days: Vec<ObservedDay>,
    /// Historical block wins
    #[serde(default)]
    pub blocks: Vec<HeightWins>,
    /// Recently seen block wins
    #[serde(default)]
    pub live_blocks: Vec<HeightWins>,
    #[serde(default)]
    pub overview: NetworkOverview,
}

impl Dataset {
    pub fn from_json_str(content: &str) -> Result<Self> {
        let mut dataset: Self = serde_json::from_str(content)?;
        dataset.days.sort_by_key(|day| day.date);
        Ok(dataset)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }
}

impl DaySource for Dataset {
    fn days_ordered(&self) -> Result<Vec<ObservedDay>> {
        Ok(self.days.clone())
    }

    fn get_day(&self, date: NaiveDate) -> Result<Option<ObservedDay>> {
        Ok(self
            .days
            .binary_search_by_key(&date, |day| day.date)
            .ok()
            .map(|i| self.days[i].clone()))
    }
}

impl WinCountSource for Dataset {
    fn win_counts(&self, window: LuckWindow) -> Result<Vec<HeightWins>> {
        Ok(match window {
            LuckWindow::Day(date) => self
                .blocks
                .iter()
                .filter(|block| block.date == date)
                .cloned()
                .collect(),
            LuckWindow::Live => self.live_blocks.clone(),
        })
    }
}

impl NetworkSnapshotSource for Dataset {
    fn overview(&self) -> Result<NetworkOverview> {
        Ok(self.overview.clone())
    }
}
