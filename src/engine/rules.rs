//! Strategy rules and configuration of the trade simulator.

use chrono::NaiveTime;

use crate::engine::Side;
use crate::errors::{Error, Result};

/// Which capital a new position is sized from.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CapitalPolicy {
    /// Percentage of the whole realized capital.
    Total,
    /// Percentage of the capital not committed to open positions.
    #[default]
    Free,
}

/// How a stop distance is turned into an integer before matching the distance filter.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoundingRule {
    Floor,
    /// Nearest integer, halves away from zero.
    #[default]
    Nearest,
}

impl RoundingRule {
    pub fn apply(&self, distance: f64) -> i64 {
        match self {
            Self::Floor => distance.floor() as i64,
            Self::Nearest => distance.round() as i64,
        }
    }
}

/// Whether matching distances are rejected or are the only ones accepted.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterMode {
    #[default]
    Deny,
    Allow,
}

/// One entry of a distance filter table.
///
/// In JSON an entry is either a number (`12`) or an inclusive range (`[6, 10]`).
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceRule {
    Exact(i64),
    /// Inclusive on both ends.
    Range(i64, i64),
}

impl DistanceRule {
    pub fn contains(&self, distance: i64) -> bool {
        match *self {
            Self::Exact(value) => distance == value,
            Self::Range(min, max) => (min..=max).contains(&distance),
        }
    }
}

/// Side-specific filter on the rounded stop distance of a candidate trade.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DistanceFilter {
    pub mode: FilterMode,
    pub rounding: RoundingRule,
    pub buy: Vec<DistanceRule>,
    pub sell: Vec<DistanceRule>,
}

impl DistanceFilter {
    /// A deny filter that rejects nothing.
    pub fn none() -> Self {
        Self::default()
    }

    fn rules(&self, side: Side) -> &[DistanceRule] {
        match side {
            Side::Buy => &self.buy,
            Side::Sell => &self.sell,
        }
    }

    /// Returns `true` when a trade of `side` with this stop `distance` must not be opened.
    pub fn rejects(&self, side: Side, distance: f64) -> bool {
        let rounded = self.rounding.apply(distance);
        let matched = self.rules(side).iter().any(|rule| rule.contains(rounded));
        match self.mode {
            FilterMode::Deny => matched,
            FilterMode::Allow => !matched,
        }
    }

    fn validate(&self) -> Result<()> {
        for rule in self.buy.iter().chain(&self.sell) {
            if let DistanceRule::Range(min, max) = *rule
                && min > max
            {
                return Err(Error::InvalidRange(min, max));
            }
        }
        Ok(())
    }
}

/// Inclusive wall-clock window during which no new position is opened.
///
/// A window whose `end` is before its `start` wraps around midnight.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// A window covering a single instant.
    pub fn at(time: NaiveTime) -> Self {
        Self { start: time, end: time }
    }

    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.start <= self.end {
            self.start <= time && time <= self.end
        } else {
            time >= self.start || time <= self.end
        }
    }
}

/// What reward multiple a position still open at the end of the data gets.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EndOfDataPolicy {
    /// Always recorded as a loss, whatever its unrealized P&L.
    #[default]
    AsLoss,
    /// Realized multiple at the last close; a loss when not strictly positive.
    MarkToMarket,
}

/// Configuration of a [`TradeSimulator`](crate::engine::TradeSimulator) run.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatorConfig {
    pub initial_capital: f64,
    /// Percentage of the available capital put in each position (e.g. 2.9 for 2.9%).
    pub position_percent: f64,
    /// Added to the close for buys, subtracted for sells.
    pub entry_offset: f64,
    /// Placed beyond the wick: below the low for buys, above the high for sells.
    pub stop_offset: f64,
    pub excluded_times: Vec<TimeWindow>,
    pub capital_policy: CapitalPolicy,
    pub distance_filter: DistanceFilter,
    pub end_of_data: EndOfDataPolicy,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        use DistanceRule::{Exact, Range};

        Self {
            initial_capital: 5_000.0,
            position_percent: 2.9,
            entry_offset: 0.2,
            stop_offset: 0.2,
            excluded_times: NaiveTime::from_hms_opt(1, 30, 0).map(TimeWindow::at).into_iter().collect(),
            capital_policy: CapitalPolicy::Free,
            distance_filter: DistanceFilter {
                mode: FilterMode::Deny,
                rounding: RoundingRule::Nearest,
                buy: vec![
                    Exact(3),
                    Range(6, 10),
                    Exact(12),
                    Exact(14),
                    Range(16, 17),
                    Exact(19),
                    Exact(23),
                    Exact(26),
                    Exact(28),
                    Exact(31),
                    Range(36, 37),
                    Range(42, 45),
                    Range(47, 48),
                    Range(52, 56),
                    Range(58, 71),
                ],
                sell: vec![
                    Exact(2),
                    Range(4, 11),
                    Range(13, 19),
                    Range(21, 22),
                    Range(24, 25),
                    Exact(29),
                    Range(31, 34),
                    Range(36, 38),
                    Exact(40),
                    Exact(42),
                    Exact(47),
                    Range(49, 56),
                    Exact(58),
                    Range(62, 64),
                    Range(67, 72),
                    Exact(74),
                    Range(77, 94),
                ],
            },
            end_of_data: EndOfDataPolicy::AsLoss,
        }
    }
}

impl SimulatorConfig {
    /// A configuration with no offsets, no excluded time and no distance filter.
    pub fn unfiltered(initial_capital: f64, position_percent: f64) -> Self {
        Self {
            initial_capital,
            position_percent,
            entry_offset: 0.0,
            stop_offset: 0.0,
            excluded_times: Vec::new(),
            distance_filter: DistanceFilter::none(),
            ..Self::default()
        }
    }

    pub fn with_initial_capital(mut self, initial_capital: f64) -> Self {
        self.initial_capital = initial_capital;
        self
    }

    pub fn with_position_percent(mut self, position_percent: f64) -> Self {
        self.position_percent = position_percent;
        self
    }

    pub fn with_offsets(mut self, entry_offset: f64, stop_offset: f64) -> Self {
        self.entry_offset = entry_offset;
        self.stop_offset = stop_offset;
        self
    }

    pub fn with_excluded_time(mut self, window: TimeWindow) -> Self {
        self.excluded_times.push(window);
        self
    }

    pub fn with_capital_policy(mut self, capital_policy: CapitalPolicy) -> Self {
        self.capital_policy = capital_policy;
        self
    }

    pub fn with_distance_filter(mut self, distance_filter: DistanceFilter) -> Self {
        self.distance_filter = distance_filter;
        self
    }

    pub fn with_end_of_data(mut self, end_of_data: EndOfDataPolicy) -> Self {
        self.end_of_data = end_of_data;
        self
    }

    /// Returns `true` when `time` falls in one of the excluded windows.
    pub fn is_excluded(&self, time: NaiveTime) -> bool {
        self.excluded_times.iter().any(|window| window.contains(time))
    }

    /// Checks the values before a run.
    pub fn validate(&self) -> Result<()> {
        if self.initial_capital <= 0.0 || !self.initial_capital.is_finite() {
            return Err(Error::NegZeroBalance(self.initial_capital));
        }
        if !(self.position_percent > 0.0 && self.position_percent <= 100.0) {
            return Err(Error::InvalidPercent(self.position_percent));
        }
        for offset in [self.entry_offset, self.stop_offset] {
            if offset < 0.0 || !offset.is_finite() {
                return Err(Error::InvalidOffset(offset));
            }
        }
        self.distance_filter.validate()
    }

    /// Reads a configuration from a JSON file. Missing fields take their default value.
    #[cfg(feature = "serde")]
    pub fn from_json_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        use std::{fs::File, io::BufReader};

        let file = File::open(path)?;
        let config: Self = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }
}
