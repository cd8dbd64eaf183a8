//! Grouping of closed trades by stop distance, open hour and open weekday.
//!
//! Every group is keyed by side first, then by the grouping value. Inside a group, wins
//! come first sorted by ascending multiple and losses come last, in open order.
//!
//! [`filter_level_one`] chains the groupings into a filter: trades survive only when their
//! distance group, then their hour within that group, then their weekday score above zero.

use std::collections::BTreeMap;

use chrono::{Timelike, Weekday};
use tracing::debug;

use crate::engine::{RewardMultiple, RoundingRule, Side, TradeOutcome};
use crate::metrics::list_score;

/// Trades of one `(side, key)` group.
pub type Groups<K> = BTreeMap<(Side, K), Vec<TradeOutcome>>;

fn group_by<K, F>(outcomes: &[TradeOutcome], key: F) -> Groups<K>
where
    K: Ord,
    F: Fn(&TradeOutcome) -> K,
{
    let mut groups: Groups<K> = BTreeMap::new();
    for outcome in outcomes {
        groups.entry((outcome.side, key(outcome))).or_default().push(*outcome);
    }
    for trades in groups.values_mut() {
        sort_wins_first(trades);
    }
    groups
}

/// Sorts wins by ascending multiple and moves losses to the end.
pub fn sort_wins_first(trades: &mut [TradeOutcome]) {
    // stable: losses keep their open order
    trades.sort_by(|a, b| match (a.reward_multiple, b.reward_multiple) {
        (RewardMultiple::Win(x), RewardMultiple::Win(y)) => x.total_cmp(&y),
        (RewardMultiple::Win(_), RewardMultiple::Loss) => std::cmp::Ordering::Less,
        (RewardMultiple::Loss, RewardMultiple::Win(_)) => std::cmp::Ordering::Greater,
        (RewardMultiple::Loss, RewardMultiple::Loss) => std::cmp::Ordering::Equal,
    });
}

/// Groups by stop distance, turned into an integer with `rounding`.
pub fn by_distance(outcomes: &[TradeOutcome], rounding: RoundingRule) -> Groups<i64> {
    group_by(outcomes, |o| rounding.apply(o.distance))
}

/// Groups by the hour of the open time (0 to 23).
pub fn by_hour(outcomes: &[TradeOutcome]) -> Groups<u32> {
    group_by(outcomes, |o| o.time().hour())
}

/// Groups by the weekday of the open time, keyed by days since Monday (0 to 6).
pub fn by_weekday(outcomes: &[TradeOutcome]) -> Groups<u32> {
    group_by(outcomes, |o| o.day_of_week().num_days_from_monday())
}

/// Weekday of a [`by_weekday`] key.
pub fn weekday(key: u32) -> Option<Weekday> {
    u8::try_from(key).ok().and_then(|day| Weekday::try_from(day).ok())
}

// groups whose list score is positive
fn passing<I>(groups: I, threshold: u32, level: &'static str) -> impl Iterator<Item = Vec<TradeOutcome>>
where
    I: IntoIterator<Item = Vec<TradeOutcome>>,
{
    groups.into_iter().filter(move |trades| {
        let multiples: Vec<RewardMultiple> = trades.iter().map(|t| t.reward_multiple).collect();
        let score = list_score(&multiples, threshold);
        debug!(level, threshold, trades = trades.len(), score, passed = score > 0, "group scored");
        score > 0
    })
}

/// Keeps the trades that pass three successive group filters for `threshold`.
///
/// 1. `(side, distance)` groups with a positive [`list_score`] are kept.
/// 2. Each kept distance group is split by hour and only its positive hours are kept.
/// 3. The survivors of every group are split by weekday, both sides together, and only
///    positive weekdays are kept.
///
/// The result is in open order.
pub fn filter_level_one(outcomes: &[TradeOutcome], threshold: u32, rounding: RoundingRule) -> Vec<TradeOutcome> {
    let mut hourly = Vec::new();
    for group in passing(by_distance(outcomes, rounding).into_values(), threshold, "distance") {
        hourly.extend(passing(by_hour(&group).into_values(), threshold, "hour").flatten());
    }

    let mut days: BTreeMap<u32, Vec<TradeOutcome>> = BTreeMap::new();
    for outcome in hourly {
        days.entry(outcome.day_of_week().num_days_from_monday())
            .or_default()
            .push(outcome);
    }

    let mut kept: Vec<TradeOutcome> = passing(days.into_values(), threshold, "weekday").flatten().collect();
    kept.sort_by_key(|o| o.open_time);
    kept
}

/// Counts of one group.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroupSummary {
    /// Trades in the group.
    pub trades: usize,
    /// Trades classified as losses.
    pub losses: usize,
    /// Average multiple of the winning trades.
    pub average_win: Option<f64>,
}

impl From<&[TradeOutcome]> for GroupSummary {
    fn from(trades: &[TradeOutcome]) -> Self {
        let wins: Vec<f64> = trades.iter().filter_map(|t| t.reward_multiple.multiple()).collect();
        Self {
            trades: trades.len(),
            losses: trades.len() - wins.len(),
            average_win: (!wins.is_empty()).then(|| wins.iter().sum::<f64>() / wins.len() as f64),
        }
    }
}
