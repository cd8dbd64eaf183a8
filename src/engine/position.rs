use chrono::{DateTime, Utc};

use crate::engine::Candle;

/// Direction of a trade.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Side {
    /// Long: profits when price rises.
    Buy,
    /// Short: profits when price falls.
    Sell,
}

impl Side {
    /// Reads the side from the candle polarity, `None` on a doji.
    pub fn from_candle(candle: &Candle) -> Option<Self> {
        if candle.is_doji() {
            None
        } else if candle.close() > candle.open() {
            Some(Self::Buy)
        } else {
            Some(Self::Sell)
        }
    }

    /// `1.0` for buys, `-1.0` for sells.
    pub fn sign(&self) -> f64 {
        match self {
            Self::Buy => 1.0,
            Self::Sell => -1.0,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "Buy"),
            Self::Sell => write!(f, "Sell"),
        }
    }
}

/// Why a position was closed.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    /// Closed synthetically at the last close of the series.
    EndOfData,
}

/// An open trade with a fixed stop-loss and a 1:1 take-profit.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    // slot of the outcome this position finalizes
    id: usize,
    side: Side,
    entry_price: f64,
    stop_loss: f64,
    take_profit: f64,
    size: f64,
    open_index: usize,
    open_time: DateTime<Utc>,
}

impl Position {
    /// Opens a position. The take-profit sits one stop distance past the entry.
    pub(crate) fn new(
        id: usize,
        side: Side,
        entry_price: f64,
        stop_loss: f64,
        size: f64,
        open_index: usize,
        open_time: DateTime<Utc>,
    ) -> Self {
        let distance = (entry_price - stop_loss).abs();
        Self {
            id,
            side,
            entry_price,
            stop_loss,
            take_profit: entry_price + side.sign() * distance,
            size,
            open_index,
            open_time,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn entry_price(&self) -> f64 {
        self.entry_price
    }

    pub fn stop_loss(&self) -> f64 {
        self.stop_loss
    }

    pub fn take_profit(&self) -> f64 {
        self.take_profit
    }

    pub fn size(&self) -> f64 {
        self.size
    }

    /// Index of the candle the position was opened on.
    pub fn open_index(&self) -> usize {
        self.open_index
    }

    pub fn open_time(&self) -> DateTime<Utc> {
        self.open_time
    }

    /// Absolute distance between entry and stop-loss.
    pub fn distance(&self) -> f64 {
        (self.entry_price - self.stop_loss).abs()
    }

    /// Capital committed to the position (`entry_price × size`).
    pub fn cost(&self) -> f64 {
        self.entry_price * self.size
    }

    /// Profit or loss if the position were closed at `exit_price`.
    pub fn estimate_pnl(&self, exit_price: f64) -> f64 {
        (exit_price - self.entry_price) * self.side.sign() * self.size
    }

    /// Tests the exit levels against a candle's range.
    ///
    /// The stop-loss is tested first, so a candle touching both levels closes at the stop.
    pub fn check_exit(&self, candle: &Candle) -> Option<(ExitReason, f64)> {
        let (stop_hit, target_hit) = match self.side {
            Side::Buy => (candle.low() <= self.stop_loss, candle.high() >= self.take_profit),
            Side::Sell => (candle.high() >= self.stop_loss, candle.low() <= self.take_profit),
        };

        if stop_hit {
            Some((ExitReason::StopLoss, self.stop_loss))
        } else if target_hit {
            Some((ExitReason::TakeProfit, self.take_profit))
        } else {
            None
        }
    }
}
