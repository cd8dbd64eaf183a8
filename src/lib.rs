//! # BTS Drawdown: candle strategy backtest and worst-case drawdown search
//!
//! **BTS Drawdown** replays a candle-polarity strategy over OHLC data and then measures, for
//! every integer reward threshold, the worst cumulative drawdown the resulting trade sequence
//! could have produced.
//!
//! ## Core Components
//! | Component   | Description                                                                                     |
//! |-------------|-------------------------------------------------------------------------------------------------|
//! | **`Candle`** | OHLC data for a single time period.                                                           |
//! | **`Position`** | An open trade with a stop-loss and a 1:1 take-profit.                                        |
//! | **`TradeOutcome`** | The closed trade, with its `RewardMultiple` (a loss or a positive win multiple).        |
//! | **`Wallet`** | Tracks realized, committed and unrealized capital.                                            |
//! | **`TradeSimulator`** | Walks the candles, opens and closes positions under a `SimulatorConfig`.              |
//! | **`DrawdownAnalyzer`** | Lowest running balance per reward threshold, with the start that produced it.       |
//! | **`Metrics`** | Run summary and scores of the outcome list.                                                  |
//!
//! ## Features
//! | Feature      | Description                                                                                    |
//! |--------------|------------------------------------------------------------------------------------------------|
//! | `metrics`    | Run summary, scoring helpers and categorization *(default)*.                                   |
//! | `serde`      | Serialize/deserialize every record and load configs and candles from JSON.                     |
//! | `parallel`   | Evaluate drawdown thresholds on a [`rayon`](https://crates.io/crates/rayon) pool.              |
//! | `cli`        | The `bts-drawdown` binary, CSV loading and writing.                                            |
//!
//! ## Getting Started
//! ```rust
//! use bts_drawdown::prelude::*;
//! use chrono::{DateTime, Duration};
//!
//! fn main() {
//!     let start = DateTime::default();
//!     let bar = |hours, open, high, low, close| {
//!         CandleBuilder::builder()
//!             .open(open)
//!             .high(high)
//!             .low(low)
//!             .close(close)
//!             .open_time(start + Duration::hours(hours))
//!             .build()
//!             .unwrap()
//!     };
//!     let candles = vec![
//!         bar(0, 100.0, 106.0, 99.0, 105.0),
//!         bar(4, 105.0, 113.0, 104.0, 112.0),
//!         bar(8, 112.0, 113.0, 100.0, 101.0),
//!     ];
//!
//!     let simulator = TradeSimulator::new(SimulatorConfig::unfiltered(10_000.0, 2.0)).unwrap();
//!     let report = simulator.run(&candles).unwrap();
//!
//!     let analyzer = DrawdownAnalyzer::new(report.reward_multiples()).unwrap();
//!     for result in analyzer.analyze_all().unwrap() {
//!         println!("R={} lowest={} start={}", result.threshold, result.absolute_lowest, result.worst_start_index);
//!     }
//!
//!     #[cfg(feature = "metrics")]
//!     println!("{}", Metrics::from(&report));
//! }
//! ```
//!
//! ## Error Handling
//! Every fallible operation returns [`errors::Result`]:
//! - Empty, unordered or malformed candle data.
//! - Invalid configuration values.
//! - An empty outcome sequence or a zero threshold at the drawdown analyzer.
//!
//! Candles that cannot open a trade (doji, excluded time, filtered distance, no capital) are
//! not errors: they are reported as [`engine::SkipReason`]s.
//!
//! ## License
//! MIT
#![warn(missing_docs)]

/// Core trading engine components: candles, positions, wallet, and the trade simulator.
pub mod engine;

/// Error types for the library.
pub mod errors;

/// Worst-case drawdown per reward threshold.
pub mod drawdown;

/// Candle loaders and record writers.
pub mod utils;

/// Performance metrics: max drawdown, win rate, scores, etc.
#[cfg(feature = "metrics")]
pub mod metrics;

/// Grouping of trades by distance, hour and weekday.
#[cfg(feature = "metrics")]
pub mod categorize;

/// Re-exports of commonly used types and traits for convenience.
pub mod prelude {
    pub use super::*;
    pub use crate::drawdown::*;
    pub use crate::engine::*;
    pub use crate::errors::*;

    #[cfg(feature = "metrics")]
    pub use crate::metrics::*;
}

use std::ops::{Div, Mul, Sub};

/// Trait for performing percentage-based calculations.
///
/// This trait provides methods to calculate percentages
/// for numeric types, enabling common financial calculations.
pub trait PercentCalculus {
    /// Calculates the absolute value of a percentage.
    ///
    /// ### Arguments
    /// * `percent` - The percentage to calculate (e.g., 10.0 for 10%).
    ///
    /// ### Returns
    /// The absolute value of the given percentage.
    fn how_many(self, percent: Self) -> Self;

    /// Calculates the percentage change between two values.
    ///
    /// ### Arguments
    /// * `new` - The new value to compare with.
    ///
    /// ### Returns
    /// The percentage change from the original value to the new value.
    fn change(self, new: Self) -> Self;
}

impl PercentCalculus for f64 {
    fn how_many(self, percent: Self) -> Self {
        percent.mul(self.div(100.0))
    }

    fn change(self, new: Self) -> Self {
        new.sub(self).div(self).mul(100.0)
    }
}
