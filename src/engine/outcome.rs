use chrono::{DateTime, NaiveDate, NaiveTime, Utc, Weekday};

use crate::engine::{ExitReason, Position, Side};

/// Reward of a closed trade in multiples of its risk.
///
/// A trade either lost (closed at or beyond its stop) or won some positive multiple.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RewardMultiple {
    Loss,
    /// Always strictly positive.
    Win(f64),
}

impl RewardMultiple {
    /// Classifies a realized multiple: anything not strictly positive is a loss.
    pub fn from_multiple(multiple: f64) -> Self {
        if multiple.is_finite() && multiple > 0.0 {
            Self::Win(multiple)
        } else {
            Self::Loss
        }
    }

    pub fn is_loss(&self) -> bool {
        matches!(self, Self::Loss)
    }

    /// The multiple of a win, `None` for a loss.
    pub fn multiple(&self) -> Option<f64> {
        match self {
            Self::Loss => None,
            Self::Win(multiple) => Some(*multiple),
        }
    }

    /// `true` when this is a win worth at least `threshold`.
    pub fn reaches(&self, threshold: f64) -> bool {
        self.multiple().is_some_and(|m| m >= threshold)
    }
}

/// Final record of a trade, written once when its position closes.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TradeOutcome {
    pub side: Side,
    pub entry: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub distance: f64,
    pub size: f64,
    pub open_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
    pub exit_price: f64,
    pub exit_reason: ExitReason,
    pub profit: f64,
    pub reward_multiple: RewardMultiple,
}

impl TradeOutcome {
    /// Finalizes `position` closed at `exit_price`.
    pub(crate) fn close(
        position: &Position,
        exit_reason: ExitReason,
        exit_price: f64,
        close_time: DateTime<Utc>,
        reward_multiple: RewardMultiple,
    ) -> Self {
        Self {
            side: position.side(),
            entry: position.entry_price(),
            stop_loss: position.stop_loss(),
            take_profit: position.take_profit(),
            distance: position.distance(),
            size: position.size(),
            open_time: position.open_time(),
            close_time,
            exit_price,
            exit_reason,
            profit: position.estimate_pnl(exit_price),
            reward_multiple,
        }
    }

    pub fn is_loss(&self) -> bool {
        self.reward_multiple.is_loss()
    }

    /// Capital the trade committed at open.
    pub fn money_used(&self) -> f64 {
        self.entry * self.size
    }

    pub fn date(&self) -> NaiveDate {
        self.open_time.date_naive()
    }

    pub fn time(&self) -> NaiveTime {
        self.open_time.time()
    }

    pub fn day_of_week(&self) -> Weekday {
        use chrono::Datelike;
        self.open_time.weekday()
    }
}
