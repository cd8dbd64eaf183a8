//! Performance metrics and scoring of a simulation.
//!
//! This module provides tools to calculate:
//! - A summary of a run: capital, win rate, max drawdown, yearly capital
//! - Scores of an outcome list against a reward threshold
//! - The profitability formula of an outcome list
//! - Drawdown scores of the trades that survive [`filter_level_one`]
//!
//! It needs to enable `metrics` feature to use it.

use std::collections::BTreeMap;
use std::fmt;

use tracing::warn;

use crate::PercentCalculus;
use crate::categorize::filter_level_one;
use crate::drawdown::{CandidateStarts, DrawdownAnalyzer, DrawdownResult};
use crate::engine::*;
use crate::errors::{Error, Result};

/// A summary of a simulation run.
///
/// `Metrics` is built from a [`SimulationReport`] and computes key performance indicators
/// such as max drawdown, win rate and the longest losing streak.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    initial_capital: f64,
    capital: f64,
    final_capital: f64,
    trades: usize,
    take_profits: usize,
    stop_losses: usize,
    open_at_end: usize,
    filtered: usize,
    skipped: usize,
    average_win: Option<f64>,
    average_reward_risk: f64,
    longest_losing_streak: usize,
    capital_history: Vec<f64>,
    yearly_capital: BTreeMap<i32, f64>,
}

impl From<&SimulationReport> for Metrics {
    fn from(value: &SimulationReport) -> Self {
        let count = |reason| value.outcomes.iter().filter(|o| o.exit_reason == reason).count();
        let wins: Vec<f64> = value
            .outcomes
            .iter()
            .filter_map(|o| o.reward_multiple.multiple())
            .collect();

        Self {
            initial_capital: value.initial_capital,
            capital: value.capital,
            final_capital: value.final_capital(),
            trades: value.outcomes.len(),
            take_profits: count(ExitReason::TakeProfit),
            stop_losses: count(ExitReason::StopLoss),
            open_at_end: value.open_at_end,
            filtered: value.skipped.filtered_distance,
            skipped: value.skipped.total() - value.skipped.filtered_distance,
            average_win: (!wins.is_empty()).then(|| wins.iter().sum::<f64>() / wins.len() as f64),
            average_reward_risk: average_reward_risk(&value.outcomes),
            longest_losing_streak: longest_losing_streak(&value.reward_multiples()),
            capital_history: value.capital_history.iter().map(|(_, capital)| *capital).collect(),
            yearly_capital: value.yearly_capital.clone(),
        }
    }
}

impl Metrics {
    /// Returns the initial capital.
    pub fn initial_capital(&self) -> f64 {
        self.initial_capital
    }

    /// Returns the realized capital.
    pub fn capital(&self) -> f64 {
        self.capital
    }

    /// Returns the realized capital plus the P&L of positions closed at the end of the data.
    pub fn final_capital(&self) -> f64 {
        self.final_capital
    }

    /// Returns the number of opened trades.
    pub fn trades(&self) -> usize {
        self.trades
    }

    /// Returns the number of candidate trades rejected by the distance filter.
    pub fn filtered(&self) -> usize {
        self.filtered
    }

    /// Returns the capital at the last open of each year.
    pub fn yearly_capital(&self) -> &BTreeMap<i32, f64> {
        &self.yearly_capital
    }

    /// Returns the longest run of consecutive losses.
    pub fn longest_losing_streak(&self) -> usize {
        self.longest_losing_streak
    }

    /// Computes the total return as a percentage of the initial capital.
    pub fn total_return(&self) -> f64 {
        self.initial_capital.change(self.final_capital)
    }

    /// Computes the maximum drawdown of the realized capital as a percentage.
    pub fn max_drawdown(&self) -> f64 {
        let mut max_peak = self.initial_capital;
        let mut max_drawdown = 0.0;

        for &capital in &self.capital_history {
            if capital > max_peak {
                max_peak = capital;
            }
            let drawdown = (max_peak - capital) / max_peak;
            if drawdown > max_drawdown {
                max_drawdown = drawdown;
            }
        }

        max_drawdown * 100.0
    }

    /// Computes the win rate as a percentage of trades closed on their stop or target.
    pub fn win_rate(&self) -> f64 {
        let closed = self.take_profits + self.stop_losses;
        if closed == 0 {
            return 0.0;
        }

        (self.take_profits as f64 / closed as f64) * 100.0
    }

    /// Returns the average multiple of winning trades, `None` without any win.
    pub fn average_win(&self) -> Option<f64> {
        self.average_win
    }

    /// Returns the average reward/risk over stop and target closes, a stop-loss counting as 0.
    pub fn average_reward_risk(&self) -> f64 {
        self.average_reward_risk
    }
}

// trades still open at the end of the data are left out
fn average_reward_risk(outcomes: &[TradeOutcome]) -> f64 {
    let closed: Vec<f64> = outcomes
        .iter()
        .filter_map(|o| match o.exit_reason {
            ExitReason::TakeProfit => Some(o.reward_multiple.multiple().unwrap_or(0.0)),
            ExitReason::StopLoss => Some(0.0),
            ExitReason::EndOfData => None,
        })
        .collect();
    if closed.is_empty() {
        return 0.0;
    }
    closed.iter().sum::<f64>() / closed.len() as f64
}

impl fmt::Display for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Simulation Metrics ===")?;
        writeln!(f, "Initial Capital: {:.2}", self.initial_capital)?;
        writeln!(f, "Realized Capital: {:.2}", self.capital)?;
        writeln!(f, "Final Capital: {:.2}", self.final_capital)?;
        writeln!(f, "Total Return: {:.2}%", self.total_return())?;
        #[allow(clippy::writeln_empty_string)]
        writeln!(f, "")?;
        writeln!(f, "Trades: {}", self.trades)?;
        writeln!(f, "Take Profits: {}", self.take_profits)?;
        writeln!(f, "Stop Losses: {}", self.stop_losses)?;
        writeln!(f, "Open at End: {}", self.open_at_end)?;
        writeln!(f, "Filtered by Distance: {}", self.filtered)?;
        writeln!(f, "Other Skipped Candles: {}", self.skipped)?;
        #[allow(clippy::writeln_empty_string)]
        writeln!(f, "")?;
        writeln!(f, "Max Drawdown: {:.2}%", self.max_drawdown())?;
        writeln!(f, "Win Rate: {:.2}%", self.win_rate())?;
        match self.average_win {
            Some(average) => writeln!(f, "Average Win: {average:.2}R")?,
            None => writeln!(f, "Average Win: -")?,
        }
        writeln!(f, "Average Reward/Risk: {:.2}", self.average_reward_risk)?;
        write!(f, "Longest Losing Streak: {}", self.longest_losing_streak)?;
        for (year, capital) in &self.yearly_capital {
            write!(f, "\nCapital {year}: {capital:.2}")?;
        }
        Ok(())
    }
}

/// Length of the longest run of consecutive losses.
pub fn longest_losing_streak(multiples: &[RewardMultiple]) -> usize {
    let mut longest = 0;
    let mut current = 0;
    for multiple in multiples {
        if multiple.is_loss() {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    longest
}

// +threshold for a win strictly above it, -1 for anything else
fn tally(multiples: &[RewardMultiple], threshold: u32) -> i64 {
    multiples
        .iter()
        .map(|m| match m.multiple() {
            Some(value) if value > f64::from(threshold) => i64::from(threshold),
            _ => -1,
        })
        .sum()
}

/// Score of an outcome list against `threshold`, penalized by one tenth of its length.
pub fn net_score(multiples: &[RewardMultiple], threshold: u32) -> f64 {
    tally(multiples, threshold) as f64 - multiples.len() as f64 / 10.0
}

/// Integer score of an outcome list, penalized by one point per 20 trades.
///
/// A group with a positive score is kept by [`filter_level_one`].
pub fn list_score(multiples: &[RewardMultiple], threshold: u32) -> i64 {
    tally(multiples, threshold) - (multiples.len() / 20) as i64
}

/// `(10 / |lowest|) × net_score`, `None` when the drawdown never went below zero.
pub fn quality_metric(net_score: f64, lowest: i64) -> Option<f64> {
    if lowest == 0 {
        return None;
    }
    Some(10.0 / lowest.unsigned_abs() as f64 * net_score)
}

/// Results of the profitability formula, one per win in order.
///
/// Step `i` is `win × (wins − i) − (losses + i)`: every processed win counts as a loss
/// for the next step.
pub fn profitability_steps(multiples: &[RewardMultiple]) -> Vec<f64> {
    let wins: Vec<f64> = multiples.iter().filter_map(RewardMultiple::multiple).collect();
    let losses = multiples.len() - wins.len();

    wins.iter()
        .enumerate()
        .map(|(i, value)| value * (wins.len() - i) as f64 - (losses + i) as f64)
        .collect()
}

/// `true` when one step of the profitability formula is positive.
pub fn passes_profitability(multiples: &[RewardMultiple]) -> bool {
    profitability_steps(multiples).into_iter().any(|result| result > 0.0)
}

/// Scores of an outcome list for one reward threshold.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdScore {
    /// Reward threshold the scores are computed for.
    pub threshold: u32,
    /// Length of the scored outcome list.
    pub trades: usize,
    /// See [`net_score`].
    pub net_score: f64,
    /// Lowest drawdown found for this threshold.
    pub lowest: i64,
    /// Start index of the lowest drawdown.
    pub worst_start_index: usize,
    /// See [`quality_metric`].
    pub quality: Option<f64>,
}

fn score(multiples: &[RewardMultiple], drawdown: &DrawdownResult) -> ThresholdScore {
    let net_score = net_score(multiples, drawdown.threshold);
    ThresholdScore {
        threshold: drawdown.threshold,
        trades: multiples.len(),
        net_score,
        lowest: drawdown.absolute_lowest,
        worst_start_index: drawdown.worst_start_index,
        quality: quality_metric(net_score, drawdown.absolute_lowest),
    }
}

/// Combines every drawdown result with the net score of the same threshold.
pub fn score_thresholds(multiples: &[RewardMultiple], drawdowns: &[DrawdownResult]) -> Vec<ThresholdScore> {
    drawdowns.iter().map(|drawdown| score(multiples, drawdown)).collect()
}

/// Scores, for every threshold, the trades kept by [`filter_level_one`] at that threshold.
///
/// Thresholds leaving no trade are skipped.
///
/// ### Returns
/// `InvalidThreshold` for a threshold of 0.
pub fn score_filtered(
    outcomes: &[TradeOutcome],
    thresholds: &[u32],
    rounding: RoundingRule,
    candidates: CandidateStarts,
) -> Result<Vec<ThresholdScore>> {
    let mut scores = Vec::with_capacity(thresholds.len());
    for &threshold in thresholds {
        if threshold == 0 {
            return Err(Error::InvalidThreshold(threshold));
        }
        let kept = filter_level_one(outcomes, threshold, rounding);
        if kept.is_empty() {
            warn!(threshold, "no trade survives the filter");
            continue;
        }
        let multiples: Vec<RewardMultiple> = kept.iter().map(|o| o.reward_multiple).collect();
        let drawdown = DrawdownAnalyzer::new(multiples.clone())?
            .with_candidates(candidates)
            .analyze_threshold(threshold)?;
        scores.push(score(&multiples, &drawdown));
    }
    Ok(scores)
}

#[cfg(test)]
use RewardMultiple::{Loss, Win};

#[cfg(test)]
fn report(capital_history: Vec<f64>) -> SimulationReport {
    use chrono::DateTime;

    SimulationReport {
        outcomes: vec![],
        initial_capital: 10_000.0,
        capital: capital_history.last().copied().unwrap_or(10_000.0),
        unrealized_pnl: 0.0,
        open_at_end: 0,
        candles: capital_history.len(),
        skipped: SkipCounts::default(),
        capital_history: capital_history.into_iter().map(|c| (DateTime::default(), c)).collect(),
        yearly_capital: BTreeMap::new(),
    }
}

#[cfg(test)]
fn outcome(exit_reason: ExitReason, reward_multiple: RewardMultiple) -> TradeOutcome {
    use chrono::DateTime;

    let position = Position::new(0, Side::Buy, 100.0, 95.0, 1.0, 0, DateTime::default());
    let exit_price = match exit_reason {
        ExitReason::TakeProfit => 105.0,
        _ => 95.0,
    };
    TradeOutcome::close(&position, exit_reason, exit_price, DateTime::default(), reward_multiple)
}

#[cfg(test)]
#[test]
fn max_drawdown() {
    let metrics = Metrics::from(&report(vec![10_000.0, 12_000.0, 9_000.0, 11_000.0]));
    assert_eq!(metrics.max_drawdown(), 25.0); // (12000 - 9000) / 12000 = 25%
}

#[cfg(test)]
#[test]
fn max_drawdown_no_closes() {
    let metrics = Metrics::from(&report(vec![]));
    assert_eq!(metrics.max_drawdown(), 0.0);
}

#[cfg(test)]
#[test]
fn win_rate_ignores_end_of_data() {
    let mut report = report(vec![]);
    report.outcomes = vec![
        outcome(ExitReason::TakeProfit, Win(1.0)),
        outcome(ExitReason::StopLoss, Loss),
        outcome(ExitReason::StopLoss, Loss),
        outcome(ExitReason::TakeProfit, Win(1.0)),
        outcome(ExitReason::EndOfData, Loss),
    ];
    let metrics = Metrics::from(&report);
    assert_eq!(metrics.trades(), 5);
    assert_eq!(metrics.win_rate(), 50.0);
    assert_eq!(metrics.average_win(), Some(1.0));
    assert_eq!(metrics.average_reward_risk(), 0.5);
    assert_eq!(metrics.longest_losing_streak(), 2);
}

#[cfg(test)]
#[test]
fn win_rate_no_trades() {
    let metrics = Metrics::from(&report(vec![]));
    assert_eq!(metrics.win_rate(), 0.0);
    assert_eq!(metrics.average_win(), None);
    assert_eq!(metrics.average_reward_risk(), 0.0);
}

#[cfg(test)]
#[test]
fn total_return() {
    let metrics = Metrics::from(&report(vec![11_000.0]));
    assert_eq!(metrics.total_return(), 10.0);
}

#[cfg(test)]
#[test]
fn display_block() {
    let mut report = report(vec![10_500.0]);
    report.yearly_capital.insert(2024, 10_000.0);
    let text = Metrics::from(&report).to_string();
    assert!(text.starts_with("=== Simulation Metrics ==="));
    assert!(text.contains("Final Capital: 10500.00"));
    assert!(text.contains("Capital 2024: 10000.00"));
}

#[cfg(test)]
#[test]
fn losing_streak() {
    assert_eq!(longest_losing_streak(&[]), 0);
    assert_eq!(longest_losing_streak(&[Win(1.0), Win(2.0)]), 0);
    assert_eq!(longest_losing_streak(&[Loss, Win(1.0), Loss, Loss, Loss, Win(2.0), Loss]), 3);
}

#[cfg(test)]
#[test]
fn net_score_is_strict() {
    // 2.0 does not beat a threshold of 2
    let multiples = [Win(3.0), Win(2.0), Loss, Win(2.5), Loss];
    assert_eq!(net_score(&multiples, 2), 2.0 + 2.0 - 3.0 - 0.5);
}

#[cfg(test)]
#[test]
fn list_score_penalty() {
    let mut multiples = vec![Win(4.0); 10];
    multiples.extend(vec![Loss; 30]);
    // 10 × 3 − 30 − floor(40 / 20)
    assert_eq!(list_score(&multiples, 3), -2);
    assert_eq!(list_score(&multiples[..19], 3), 30 - 9);
}

#[cfg(test)]
#[test]
fn quality() {
    assert_eq!(quality_metric(5.0, -4), Some(12.5));
    assert_eq!(quality_metric(-2.0, -10), Some(-2.0));
    assert_eq!(quality_metric(5.0, 0), None);
}

#[cfg(test)]
#[test]
fn profitability_formula() {
    // wins 3 and 1, three losses
    let multiples = [Loss, Win(3.0), Loss, Win(1.0), Loss];
    assert_eq!(profitability_steps(&multiples), vec![3.0 * 2.0 - 3.0, 1.0 - 4.0]);
    assert!(passes_profitability(&multiples));

    let multiples = [Loss, Win(1.0), Loss, Loss];
    assert_eq!(profitability_steps(&multiples), vec![-2.0]);
    assert!(!passes_profitability(&multiples));

    assert!(profitability_steps(&[Loss, Loss]).is_empty());
    assert!(!passes_profitability(&[Loss, Loss]));
}

#[cfg(test)]
#[test]
fn scores_per_threshold() {
    let multiples = [Win(2.0), Loss, Win(1.0), Loss, Win(3.0)];
    let drawdowns = [
        DrawdownResult { threshold: 1, absolute_lowest: -1, worst_start_index: 1 },
        DrawdownResult { threshold: 2, absolute_lowest: 0, worst_start_index: 1 },
    ];
    let scores = score_thresholds(&multiples, &drawdowns);
    // two wins above 1, three others, minus 0.5
    assert_eq!(scores[0].trades, 5);
    assert_eq!(scores[0].net_score, 2.0 - 3.0 - 0.5);
    assert_eq!(scores[0].quality, Some(10.0 * -1.5));
    assert_eq!(scores[1].quality, None);
}

#[cfg(test)]
#[test]
fn scores_after_filter() {
    let outcomes = [
        outcome(ExitReason::TakeProfit, Win(2.0)),
        outcome(ExitReason::StopLoss, Loss),
        outcome(ExitReason::TakeProfit, Win(2.0)),
        outcome(ExitReason::TakeProfit, Win(2.0)),
    ];
    let multiples: Vec<RewardMultiple> = outcomes.iter().map(|o| o.reward_multiple).collect();

    // nothing beats 3, so that threshold is skipped
    let scores = score_filtered(&outcomes, &[1, 3], RoundingRule::Nearest, CandidateStarts::LossPositions).unwrap();
    assert_eq!(scores.len(), 1);
    assert_eq!(scores[0].threshold, 1);
    assert_eq!(scores[0].trades, 4);
    assert_eq!(scores[0].lowest, -1);
    assert_eq!(scores[0].worst_start_index, 1);
    assert_eq!(scores[0].net_score, net_score(&multiples, 1));

    assert!(matches!(
        score_filtered(&outcomes, &[0], RoundingRule::Nearest, CandidateStarts::LossPositions),
        Err(Error::InvalidThreshold(0))
    ));
}
