//! Core trading engine components.
//!
//! This module provides the fundamental types for the candle simulation:
//! - `Candle`: OHLC data for backtesting.
//! - `Position`: Open trades with a stop-loss and a 1:1 take-profit.
//! - `TradeOutcome`: Closed trades, in open order.
//! - `Wallet`: Tracks realized, committed and unrealized capital.
//! - `TradeSimulator`: Walks the candles and opens/closes positions.

mod candle;
mod outcome;
mod position;
mod rules;
mod wallet;

use std::collections::{BTreeMap, VecDeque, vec_deque::Iter};

use chrono::{DateTime, Datelike, Utc};
use tracing::{debug, info, trace};

use crate::{
    PercentCalculus,
    errors::{Error, Result},
};

pub use candle::*;
pub use outcome::*;
pub use position::*;
pub use rules::*;
pub use wallet::*;

#[cfg(test)]
mod scenarios;

/// Why a candle did not open a position.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The candle time falls in an excluded window.
    ExcludedTime,
    /// Close equals open: no direction.
    Doji,
    /// Entry and stop-loss coincide.
    ZeroDistance,
    /// The rounded distance is rejected by the distance filter.
    FilteredDistance,
    /// No capital is available under the configured policy.
    NoCapital,
}

/// Number of candles skipped, by reason.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SkipCounts {
    /// See [`SkipReason::ExcludedTime`].
    pub excluded_time: usize,
    /// See [`SkipReason::Doji`].
    pub doji: usize,
    /// See [`SkipReason::ZeroDistance`].
    pub zero_distance: usize,
    /// See [`SkipReason::FilteredDistance`].
    pub filtered_distance: usize,
    /// See [`SkipReason::NoCapital`].
    pub no_capital: usize,
}

impl SkipCounts {
    fn record(&mut self, reason: SkipReason) {
        match reason {
            SkipReason::ExcludedTime => self.excluded_time += 1,
            SkipReason::Doji => self.doji += 1,
            SkipReason::ZeroDistance => self.zero_distance += 1,
            SkipReason::FilteredDistance => self.filtered_distance += 1,
            SkipReason::NoCapital => self.no_capital += 1,
        }
    }

    /// Total of all skipped candles.
    pub fn total(&self) -> usize {
        self.excluded_time + self.doji + self.zero_distance + self.filtered_distance + self.no_capital
    }
}

/// What happened on a single candle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepReport {
    /// Outcome slots finalized on this candle, in the order they were checked.
    pub closed: Vec<usize>,
    /// Outcome slot of the position opened on this candle.
    pub opened: Option<usize>,
    /// Why no position was opened, when one was considered and rejected.
    pub skipped: Option<SkipReason>,
}

/// Mutable state of a simulation, threaded through [`TradeSimulator::step`].
#[derive(Debug, Clone)]
pub struct SimulationContext {
    wallet: Wallet,
    positions: VecDeque<Position>,
    // one slot per opened position, in open order; filled on close
    outcomes: Vec<Option<TradeOutcome>>,
    capital_history: Vec<(DateTime<Utc>, f64)>,
    yearly_capital: BTreeMap<i32, f64>,
    skipped: SkipCounts,
    index: usize,
    last_candle: Option<Candle>,
}

impl std::ops::Deref for SimulationContext {
    type Target = Wallet;

    fn deref(&self) -> &Self::Target {
        &self.wallet
    }
}

impl SimulationContext {
    fn new(initial_capital: f64) -> Result<Self> {
        Ok(Self {
            wallet: Wallet::new(initial_capital)?,
            positions: VecDeque::new(),
            outcomes: Vec::new(),
            capital_history: Vec::new(),
            yearly_capital: BTreeMap::new(),
            skipped: SkipCounts::default(),
            index: 0,
            last_candle: None,
        })
    }

    /// Returns an iterator over the open positions.
    pub fn positions(&self) -> Iter<'_, Position> {
        self.positions.iter()
    }

    /// Returns the outcome of slot `id`, `None` while its position is open.
    pub fn outcome(&self, id: usize) -> Option<&TradeOutcome> {
        self.outcomes.get(id).and_then(Option::as_ref)
    }

    /// Number of positions opened so far.
    pub fn opened(&self) -> usize {
        self.outcomes.len()
    }

    /// Number of candles processed so far.
    pub fn candles_seen(&self) -> usize {
        self.index
    }

    /// Candles skipped so far, by reason.
    pub fn skipped(&self) -> &SkipCounts {
        &self.skipped
    }
}

/// Final state of a simulation run.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationReport {
    /// Every opened trade, in open order.
    pub outcomes: Vec<TradeOutcome>,
    /// Capital the run started with.
    pub initial_capital: f64,
    /// Initial capital plus realized P&L of stop-loss and take-profit closes.
    pub capital: f64,
    /// P&L of the positions closed at the end of the data.
    pub unrealized_pnl: f64,
    /// Positions still open on the last candle.
    pub open_at_end: usize,
    /// Candles processed.
    pub candles: usize,
    /// Candles that did not open a position, by reason.
    pub skipped: SkipCounts,
    /// Realized capital after each close.
    pub capital_history: Vec<(DateTime<Utc>, f64)>,
    /// Realized capital at the last open of each calendar year.
    pub yearly_capital: BTreeMap<i32, f64>,
}

impl SimulationReport {
    /// Realized capital plus the P&L of positions still open at the end.
    pub fn final_capital(&self) -> f64 {
        self.capital + self.unrealized_pnl
    }

    /// The reward multiples in open order, as consumed by the drawdown analyzer.
    pub fn reward_multiples(&self) -> Vec<RewardMultiple> {
        self.outcomes.iter().map(|o| o.reward_multiple).collect()
    }
}

/// Per-candle simulator of the candle-polarity strategy.
///
/// Every non-doji candle outside the excluded windows is a signal: a bullish candle buys
/// above its close with a stop under its low, a bearish one sells below its close with
/// a stop over its high. Targets are always one stop distance away from the entry.
#[derive(Debug, Clone)]
pub struct TradeSimulator {
    config: SimulatorConfig,
}

impl TradeSimulator {
    /// Creates a simulator after validating `config`.
    pub fn new(config: SimulatorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    /// Returns a fresh context holding the initial capital.
    pub fn context(&self) -> Result<SimulationContext> {
        SimulationContext::new(self.config.initial_capital)
    }

    /// Checks the shape of every candle and that timestamps never go back.
    pub fn validate_series(candles: &[Candle]) -> Result<()> {
        if candles.is_empty() {
            return Err(Error::CandleDataEmpty);
        }
        for (index, candle) in candles.iter().enumerate() {
            candle.check(index)?;
        }
        if let Some(index) = candles
            .windows(2)
            .position(|pair| pair[1].open_time() < pair[0].open_time())
        {
            return Err(Error::InvalidInputOrder { index: index + 1 });
        }
        Ok(())
    }

    /// Runs the whole series and closes what is left open on the last candle.
    ///
    /// ### Arguments
    /// * `candles` - Candles ordered by time.
    ///
    /// ### Returns
    /// The simulation report, or an error when the series is empty, malformed or out of order.
    ///
    /// ### Example
    /// ```rust
    /// use bts_drawdown::prelude::*;
    /// use chrono::{DateTime, Duration};
    ///
    /// let start = DateTime::default();
    /// let candles = vec![
    ///     CandleBuilder::builder().open(100.0).high(106.0).low(99.0).close(105.0).open_time(start).build().unwrap(),
    ///     CandleBuilder::builder().open(105.0).high(113.0).low(104.0).close(112.0).open_time(start + Duration::hours(4)).build().unwrap(),
    /// ];
    ///
    /// let simulator = TradeSimulator::new(SimulatorConfig::unfiltered(1_000.0, 10.0)).unwrap();
    /// let report = simulator.run(&candles).unwrap();
    /// assert_eq!(report.outcomes[0].exit_reason, ExitReason::TakeProfit);
    /// ```
    pub fn run(&self, candles: &[Candle]) -> Result<SimulationReport> {
        Self::validate_series(candles)?;

        let mut ctx = self.context()?;
        for candle in candles {
            self.step(&mut ctx, candle)?;
        }
        let report = self.finish(ctx)?;

        info!(
            candles = report.candles,
            trades = report.outcomes.len(),
            open_at_end = report.open_at_end,
            skipped = report.skipped.total(),
            capital = report.capital,
            final_capital = report.final_capital(),
            "simulation finished"
        );
        Ok(report)
    }

    /// Processes one candle: closes positions hit by it, then considers opening a new one.
    pub fn step(&self, ctx: &mut SimulationContext, candle: &Candle) -> Result<StepReport> {
        let index = ctx.index;
        candle.check(index)?;
        if let Some(last) = &ctx.last_candle
            && candle.open_time() < last.open_time()
        {
            return Err(Error::InvalidInputOrder { index });
        }

        let mut report = StepReport {
            closed: self.execute_positions(ctx, candle)?,
            ..Default::default()
        };

        match self.try_open(ctx, candle) {
            Ok(id) => report.opened = Some(id),
            Err(reason) => {
                trace!(index, ?reason, "no position opened");
                ctx.skipped.record(reason);
                report.skipped = Some(reason);
            }
        }

        ctx.index += 1;
        ctx.last_candle = Some(*candle);
        Ok(report)
    }

    /// Closes every open position at the last close and builds the report.
    pub fn finish(&self, mut ctx: SimulationContext) -> Result<SimulationReport> {
        let last = ctx.last_candle.ok_or(Error::CandleDataEmpty)?;
        let exit_price = last.close();
        let open_at_end = ctx.positions.len();

        let mut unrealized_pnl = 0.0;
        while let Some(position) = ctx.positions.pop_front() {
            let reward_multiple = match self.config.end_of_data {
                EndOfDataPolicy::AsLoss => RewardMultiple::Loss,
                EndOfDataPolicy::MarkToMarket => {
                    let moved = (exit_price - position.entry_price()) * position.side().sign();
                    RewardMultiple::from_multiple(moved / position.distance())
                }
            };
            let outcome = TradeOutcome::close(
                &position,
                ExitReason::EndOfData,
                exit_price,
                last.open_time(),
                reward_multiple,
            );
            unrealized_pnl += outcome.profit;
            Self::store(&mut ctx, position.id(), outcome)?;
        }
        ctx.wallet.set_unrealized_pnl(unrealized_pnl);

        let outcomes = ctx
            .outcomes
            .into_iter()
            .enumerate()
            .map(|(id, slot)| slot.ok_or_else(|| Error::Unreachable(format!("outcome {id} never closed"))))
            .collect::<Result<Vec<_>>>()?;

        Ok(SimulationReport {
            outcomes,
            initial_capital: ctx.wallet.initial_balance(),
            capital: ctx.wallet.balance(),
            unrealized_pnl,
            open_at_end,
            candles: ctx.index,
            skipped: ctx.skipped,
            capital_history: ctx.capital_history,
            yearly_capital: ctx.yearly_capital,
        })
    }

    /// Checks stop-loss and take-profit of every open position against `candle`.
    fn execute_positions(&self, ctx: &mut SimulationContext, candle: &Candle) -> Result<Vec<usize>> {
        let mut closed = Vec::new();
        let mut positions = VecDeque::with_capacity(ctx.positions.len());

        while let Some(position) = ctx.positions.pop_front() {
            let Some((exit_reason, exit_price)) = position.check_exit(candle) else {
                positions.push_back(position);
                continue;
            };

            let reward_multiple = match exit_reason {
                ExitReason::TakeProfit => RewardMultiple::Win(1.0),
                _ => RewardMultiple::Loss,
            };
            let outcome = TradeOutcome::close(&position, exit_reason, exit_price, candle.open_time(), reward_multiple);
            let capital = ctx.wallet.settle(position.cost(), outcome.profit)?;
            ctx.capital_history.push((candle.open_time(), capital));

            debug!(
                id = position.id(),
                side = %position.side(),
                ?exit_reason,
                exit_price,
                profit = outcome.profit,
                capital,
                "position closed"
            );
            Self::store(ctx, position.id(), outcome)?;
            closed.push(position.id());
        }

        let unrealized_pnl = positions.iter().map(|p| p.estimate_pnl(candle.close())).sum();
        ctx.positions.append(&mut positions);
        ctx.wallet.set_unrealized_pnl(unrealized_pnl);
        Ok(closed)
    }

    /// Opens a position on `candle` when every rule allows it.
    fn try_open(&self, ctx: &mut SimulationContext, candle: &Candle) -> std::result::Result<usize, SkipReason> {
        let config = &self.config;

        if config.is_excluded(candle.time_of_day()) {
            return Err(SkipReason::ExcludedTime);
        }

        let side = Side::from_candle(candle).ok_or(SkipReason::Doji)?;
        let (entry_price, stop_loss) = match side {
            Side::Buy => (candle.close() + config.entry_offset, candle.low() - config.stop_offset),
            Side::Sell => (candle.close() - config.entry_offset, candle.high() + config.stop_offset),
        };

        let distance = (entry_price - stop_loss).abs();
        if !(distance > 0.0 && distance.is_finite()) {
            return Err(SkipReason::ZeroDistance);
        }
        if config.distance_filter.rejects(side, distance) {
            return Err(SkipReason::FilteredDistance);
        }

        let available = ctx.wallet.available(config.capital_policy);
        if available <= 0.0 {
            return Err(SkipReason::NoCapital);
        }
        let size = available.how_many(config.position_percent) / entry_price;

        let id = ctx.outcomes.len();
        let position = Position::new(id, side, entry_price, stop_loss, size, ctx.index, candle.open_time());
        ctx.wallet.commit(position.cost());
        ctx.outcomes.push(None);
        ctx.positions.push_back(position);
        ctx.yearly_capital.insert(candle.open_time().year(), ctx.wallet.balance());

        debug!(
            id,
            side = %side,
            entry_price,
            stop_loss,
            distance,
            size,
            "position opened"
        );
        Ok(id)
    }

    fn store(ctx: &mut SimulationContext, id: usize, outcome: TradeOutcome) -> Result<()> {
        let slot = ctx.outcomes.get_mut(id).ok_or(Error::PositionNotFound)?;
        if slot.is_some() {
            return Err(Error::Unreachable(format!("outcome {id} closed twice")));
        }
        *slot = Some(outcome);
        Ok(())
    }
}
