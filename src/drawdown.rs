//! Worst-case drawdown of an outcome sequence under coarser reward thresholds.
//!
//! For a threshold `R`, every outcome whose reward multiple reaches `R` counts as a win
//! worth `+R` and everything else counts as a loss worth `-1`. The analyzer looks for the
//! start index from which the running balance of that sequence sinks the lowest.
//!
//! Running sums are read from one prefix-sum array per threshold together with its
//! suffix minimum, so every candidate start costs O(1) and a threshold costs O(n).
//!
//! ### Example
//! ```rust
//! use bts_drawdown::prelude::*;
//!
//! use RewardMultiple::{Loss, Win};
//!
//! let analyzer = DrawdownAnalyzer::new(vec![Win(2.0), Loss, Win(1.0), Loss, Win(3.0)]).unwrap();
//! let results = analyzer.analyze_all().unwrap();
//!
//! assert_eq!(results.len(), 3);
//! assert_eq!(results[0].absolute_lowest, -1);
//! assert_eq!(results[0].worst_start_index, 1);
//! assert_eq!(results[1].absolute_lowest, -3);
//! ```

use tracing::{debug, info, warn};

use crate::engine::RewardMultiple;
use crate::errors::{Error, Result};

/// Which indices of the sequence are tried as starting points.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CandidateStarts {
    /// Every loss outcome, or index 0 when the sequence holds no loss.
    #[default]
    LossPositions,
    /// Index 0, plus the first loss following every point where the running total
    /// of the whole sequence comes back to exactly zero.
    ZeroCrossings,
}

/// Worst drawdown found for one threshold.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawdownResult {
    /// Reward threshold `R`.
    pub threshold: u32,
    /// Lowest running balance reached, never positive.
    pub absolute_lowest: i64,
    /// First start index reaching `absolute_lowest`.
    pub worst_start_index: usize,
}

/// Maps every outcome to `+threshold` when it reaches `threshold`, `-1` otherwise.
pub fn map_outcomes(multiples: &[RewardMultiple], threshold: u32) -> Vec<i64> {
    multiples
        .iter()
        .map(|m| {
            if m.reaches(f64::from(threshold)) {
                i64::from(threshold)
            } else {
                -1
            }
        })
        .collect()
}

// P[0] = 0, P[k + 1] = P[k] + v[k], and M[k] = min(P[k..])
struct PrefixSums {
    prefix: Vec<i64>,
    suffix_min: Vec<i64>,
}

impl PrefixSums {
    fn new(values: &[i64]) -> Self {
        let mut prefix = Vec::with_capacity(values.len() + 1);
        prefix.push(0);
        for value in values {
            let last = prefix[prefix.len() - 1];
            prefix.push(last + value);
        }

        let mut suffix_min = prefix.clone();
        for k in (0..suffix_min.len() - 1).rev() {
            suffix_min[k] = suffix_min[k].min(suffix_min[k + 1]);
        }

        Self { prefix, suffix_min }
    }

    /// Lowest running balance when playing from `start`, touching zero is not a low.
    fn lowest_from(&self, start: usize) -> i64 {
        (self.suffix_min[start + 1] - self.prefix[start]).min(0)
    }
}

/// Drawdown search over a fixed outcome sequence.
#[derive(Debug, Clone)]
pub struct DrawdownAnalyzer {
    multiples: Vec<RewardMultiple>,
    candidates: CandidateStarts,
}

impl DrawdownAnalyzer {
    /// Creates an analyzer over `multiples`, in open order.
    ///
    /// ### Returns
    /// `NoData` when the sequence is empty.
    pub fn new(multiples: Vec<RewardMultiple>) -> Result<Self> {
        if multiples.is_empty() {
            return Err(Error::NoData);
        }
        Ok(Self {
            multiples,
            candidates: CandidateStarts::default(),
        })
    }

    /// Selects how candidate starts are chosen.
    pub fn with_candidates(mut self, candidates: CandidateStarts) -> Self {
        self.candidates = candidates;
        self
    }

    pub fn candidates(&self) -> CandidateStarts {
        self.candidates
    }

    pub fn multiples(&self) -> &[RewardMultiple] {
        &self.multiples
    }

    /// Largest win multiple of the sequence, `None` when there is no win.
    pub fn max_multiple(&self) -> Option<f64> {
        self.multiples
            .iter()
            .filter_map(RewardMultiple::multiple)
            .reduce(f64::max)
    }

    /// Thresholds `1..=floor(max multiple)`, empty when there is no win of at least 1.
    pub fn default_thresholds(&self) -> Vec<u32> {
        let max = self.max_multiple().map_or(0.0, f64::floor);
        if max < 1.0 {
            return Vec::new();
        }
        (1..=max.min(f64::from(u32::MAX)) as u32).collect()
    }

    /// Candidate start indices for `threshold`, ascending and without duplicates.
    pub fn candidate_starts(&self, threshold: u32) -> Vec<usize> {
        self.starts(&PrefixSums::new(&map_outcomes(&self.multiples, threshold)))
    }

    fn starts(&self, sums: &PrefixSums) -> Vec<usize> {
        match self.candidates {
            CandidateStarts::LossPositions => self.loss_positions(),
            CandidateStarts::ZeroCrossings => self.zero_crossings(sums),
        }
    }

    fn loss_positions(&self) -> Vec<usize> {
        let losses: Vec<usize> = self
            .multiples
            .iter()
            .enumerate()
            .filter_map(|(i, m)| m.is_loss().then_some(i))
            .collect();
        if losses.is_empty() { vec![0] } else { losses }
    }

    fn zero_crossings(&self, sums: &PrefixSums) -> Vec<usize> {
        let mut starts = vec![0];
        let mut next_loss = None;
        // walk backwards so the next loss after `i` is known in O(1)
        for i in (0..self.multiples.len()).rev() {
            if sums.prefix[i + 1] == 0
                && let Some(j) = next_loss
            {
                starts.push(j);
            }
            if self.multiples[i].is_loss() {
                next_loss = Some(i);
            }
        }
        starts.sort_unstable();
        starts.dedup();
        starts
    }

    /// Finds the worst drawdown for one threshold.
    ///
    /// ### Returns
    /// `InvalidThreshold` for a threshold of 0.
    pub fn analyze_threshold(&self, threshold: u32) -> Result<DrawdownResult> {
        if threshold == 0 {
            return Err(Error::InvalidThreshold(threshold));
        }
        Ok(self.evaluate(threshold))
    }

    fn evaluate(&self, threshold: u32) -> DrawdownResult {
        let sums = PrefixSums::new(&map_outcomes(&self.multiples, threshold));

        let mut worst: Option<(i64, usize)> = None;
        for start in self.starts(&sums) {
            let lowest = sums.lowest_from(start);
            if worst.is_none_or(|(current, _)| lowest < current) {
                worst = Some((lowest, start));
            }
        }
        // both strategies always yield at least one start
        let (absolute_lowest, worst_start_index) = worst.unwrap_or((0, 0));
        let result = DrawdownResult {
            threshold,
            absolute_lowest,
            worst_start_index,
        };

        debug!(
            threshold,
            lowest = result.absolute_lowest,
            start = result.worst_start_index,
            "threshold evaluated"
        );
        result
    }

    /// Finds the worst drawdown for every threshold of `thresholds`, in the given order.
    ///
    /// Thresholds above the largest multiple of the sequence are dropped from the output.
    pub fn analyze(&self, thresholds: &[u32]) -> Result<Vec<DrawdownResult>> {
        if let Some(&threshold) = thresholds.iter().find(|&&t| t == 0) {
            return Err(Error::InvalidThreshold(threshold));
        }

        let max = self.max_multiple().unwrap_or(0.0);
        let kept: Vec<u32> = thresholds.iter().copied().filter(|&t| f64::from(t) <= max).collect();
        if kept.len() < thresholds.len() {
            warn!(
                requested = thresholds.len(),
                kept = kept.len(),
                max_multiple = max,
                "thresholds above the largest multiple skipped"
            );
        }

        let results = self.evaluate_all(&kept);
        info!(
            outcomes = self.multiples.len(),
            thresholds = results.len(),
            candidates = ?self.candidates,
            "drawdown analysis finished"
        );
        Ok(results)
    }

    /// Same as [`analyze`](Self::analyze) over [`default_thresholds`](Self::default_thresholds).
    pub fn analyze_all(&self) -> Result<Vec<DrawdownResult>> {
        self.analyze(&self.default_thresholds())
    }

    #[cfg(not(feature = "parallel"))]
    fn evaluate_all(&self, thresholds: &[u32]) -> Vec<DrawdownResult> {
        thresholds.iter().map(|&t| self.evaluate(t)).collect()
    }

    #[cfg(feature = "parallel")]
    fn evaluate_all(&self, thresholds: &[u32]) -> Vec<DrawdownResult> {
        use rayon::prelude::*;

        let chunk_size = thresholds.len().div_ceil(num_cpus::get()).max(1);
        thresholds
            .par_chunks(chunk_size)
            .map(|chunk| chunk.iter().map(|&t| self.evaluate(t)).collect::<Vec<_>>())
            .collect::<Vec<_>>()
            .into_iter()
            .flatten()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use RewardMultiple::{Loss, Win};
    use rand::{Rng, SeedableRng, rngs::StdRng};

    fn sequence() -> Vec<RewardMultiple> {
        vec![Win(2.0), Loss, Win(1.0), Loss, Win(3.0)]
    }

    // rescans every start from scratch
    fn naive(multiples: &[RewardMultiple], threshold: u32, starts: &[usize]) -> (i64, usize) {
        let values = map_outcomes(multiples, threshold);
        let mut best: Option<(i64, usize)> = None;
        for &start in starts {
            let mut running = 0;
            let mut lowest = 0;
            for value in &values[start..] {
                running += value;
                lowest = lowest.min(running);
            }
            if best.is_none_or(|(b, _)| lowest < b) {
                best = Some((lowest, start));
            }
        }
        best.unwrap()
    }

    #[test]
    fn map_values() {
        assert_eq!(map_outcomes(&sequence(), 1), vec![1, -1, 1, -1, 1]);
        assert_eq!(map_outcomes(&sequence(), 2), vec![2, -1, -1, -1, 2]);
        assert_eq!(map_outcomes(&sequence(), 3), vec![-1, -1, -1, -1, 3]);
    }

    #[test]
    fn concrete_scenario() {
        let analyzer = DrawdownAnalyzer::new(sequence()).unwrap();
        assert_eq!(analyzer.candidate_starts(1), vec![1, 3]);

        let results = analyzer.analyze_all().unwrap();
        assert_eq!(
            results,
            vec![
                DrawdownResult { threshold: 1, absolute_lowest: -1, worst_start_index: 1 },
                DrawdownResult { threshold: 2, absolute_lowest: -3, worst_start_index: 1 },
                DrawdownResult { threshold: 3, absolute_lowest: -3, worst_start_index: 1 },
            ]
        );
    }

    #[test]
    fn zero_crossing_candidates() {
        let analyzer = DrawdownAnalyzer::new(sequence())
            .unwrap()
            .with_candidates(CandidateStarts::ZeroCrossings);

        // running totals 1, 0, 1, 0, 1: zero after index 1 and 3, next loss after 1 is 3
        assert_eq!(analyzer.candidate_starts(1), vec![0, 3]);
        let result = analyzer.analyze_threshold(1).unwrap();
        assert_eq!(result.absolute_lowest, -1);
        assert_eq!(result.worst_start_index, 3);
    }

    #[test]
    fn zero_crossings_without_return_to_zero() {
        let analyzer = DrawdownAnalyzer::new(vec![Loss, Loss, Win(1.0)])
            .unwrap()
            .with_candidates(CandidateStarts::ZeroCrossings);
        assert_eq!(analyzer.candidate_starts(1), vec![0]);
        assert_eq!(analyzer.analyze_threshold(1).unwrap().absolute_lowest, -2);
    }

    #[test]
    fn no_loss_falls_back_to_start() {
        let multiples = vec![Win(3.0), Win(1.0), Win(1.0)];
        let analyzer = DrawdownAnalyzer::new(multiples.clone()).unwrap();
        assert_eq!(analyzer.candidate_starts(2), vec![0]);

        // 2, -1, -1: back to zero, never below
        let result = analyzer.analyze_threshold(2).unwrap();
        assert_eq!(result.absolute_lowest, 0);
        assert_eq!(result.worst_start_index, 0);
        assert_eq!(naive(&multiples, 2, &[0]), (0, 0));

        let result = analyzer.analyze_threshold(3).unwrap();
        assert_eq!((result.absolute_lowest, result.worst_start_index), naive(&multiples, 3, &[0]));
    }

    #[test]
    fn ties_resolve_to_first_start() {
        let analyzer = DrawdownAnalyzer::new(vec![Loss, Win(1.0), Loss, Win(1.0), Loss]).unwrap();
        let result = analyzer.analyze_threshold(1).unwrap();
        assert_eq!(result.absolute_lowest, -1);
        assert_eq!(result.worst_start_index, 0);
    }

    #[test]
    fn thresholds_above_max_are_pruned() {
        let analyzer = DrawdownAnalyzer::new(vec![Win(2.5), Loss, Loss]).unwrap();
        assert_eq!(analyzer.default_thresholds(), vec![1, 2]);

        let results = analyzer.analyze(&[1, 3, 2, 10]).unwrap();
        let thresholds: Vec<u32> = results.iter().map(|r| r.threshold).collect();
        assert_eq!(thresholds, vec![1, 2]);
    }

    #[test]
    fn all_losses_yield_no_threshold() {
        let analyzer = DrawdownAnalyzer::new(vec![Loss, Loss]).unwrap();
        assert_eq!(analyzer.max_multiple(), None);
        assert!(analyzer.analyze_all().unwrap().is_empty());
        // explicit request still answers
        assert_eq!(analyzer.analyze_threshold(1).unwrap().absolute_lowest, -2);
    }

    #[test]
    fn empty_sequence() {
        assert!(matches!(DrawdownAnalyzer::new(vec![]), Err(Error::NoData)));
    }

    #[test]
    fn zero_threshold() {
        let analyzer = DrawdownAnalyzer::new(sequence()).unwrap();
        assert!(matches!(analyzer.analyze_threshold(0), Err(Error::InvalidThreshold(0))));
        assert!(matches!(analyzer.analyze(&[1, 0]), Err(Error::InvalidThreshold(0))));
    }

    #[test]
    fn idempotent() {
        let analyzer = DrawdownAnalyzer::new(sequence()).unwrap();
        assert_eq!(analyzer.analyze_all().unwrap(), analyzer.analyze_all().unwrap());
    }

    #[test]
    fn prefix_sums_match_naive_rescan() {
        let mut rng = StdRng::seed_from_u64(42);

        for _ in 0..200 {
            let len = rng.random_range(1..60usize);
            let multiples: Vec<RewardMultiple> = (0..len)
                .map(|_| {
                    if rng.random_bool(0.45) {
                        Loss
                    } else {
                        Win(f64::from(rng.random_range(1..=4u32)) * 0.75)
                    }
                })
                .collect();

            for candidates in [CandidateStarts::LossPositions, CandidateStarts::ZeroCrossings] {
                let analyzer = DrawdownAnalyzer::new(multiples.clone())
                    .unwrap()
                    .with_candidates(candidates);
                for result in analyzer.analyze_all().unwrap() {
                    let starts = analyzer.candidate_starts(result.threshold);
                    assert!(result.absolute_lowest <= 0);
                    assert!(starts.contains(&result.worst_start_index));
                    assert_eq!(
                        (result.absolute_lowest, result.worst_start_index),
                        naive(&multiples, result.threshold, &starts)
                    );
                }
            }
        }
    }

    #[test]
    fn worst_start_is_a_loss() {
        let mut rng = StdRng::seed_from_u64(7);
        let multiples: Vec<RewardMultiple> = (0..500)
            .map(|_| if rng.random_bool(0.5) { Loss } else { Win(rng.random_range(1.0..5.0)) })
            .collect();
        let analyzer = DrawdownAnalyzer::new(multiples.clone()).unwrap();
        for result in analyzer.analyze_all().unwrap() {
            assert!(multiples[result.worst_start_index].is_loss());
        }
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn parallel_matches_sequential() {
        let mut rng = StdRng::seed_from_u64(11);
        let multiples: Vec<RewardMultiple> = (0..2000)
            .map(|_| {
                if rng.random_bool(0.6) {
                    Loss
                } else {
                    Win(f64::from(rng.random_range(1..=17u32)) + 0.5)
                }
            })
            .collect();

        for candidates in [CandidateStarts::LossPositions, CandidateStarts::ZeroCrossings] {
            let analyzer = DrawdownAnalyzer::new(multiples.clone())
                .unwrap()
                .with_candidates(candidates);
            let thresholds = analyzer.default_thresholds();
            let sequential: Vec<DrawdownResult> = thresholds
                .iter()
                .map(|&t| analyzer.analyze_threshold(t).unwrap())
                .collect();

            assert_eq!(analyzer.evaluate_all(&thresholds), sequential);
            assert_eq!(analyzer.analyze_all().unwrap(), sequential);
        }
    }
}
