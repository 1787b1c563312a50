use crate::model::{SymbolId, SymbolModel};
use fsmc_core::PositionWeighting;
use num_traits::ToPrimitive;
use std::cmp::Reverse;
use std::collections::BTreeMap;

pub const SCORE_FRACTION_BITS: u32 = 16;
/// Fixed-point one. Scores leave the floating-point domain before they reach
/// the code table so encoder and decoder rank identically.
pub const SCORE_ONE: u64 = 1 << SCORE_FRACTION_BITS;

#[inline]
pub fn quantize(score: f64) -> u64 {
    (score * SCORE_ONE as f64).round().to_u64().unwrap_or(0)
}

/// One entry of a ranking, best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankedSymbol {
    pub id: SymbolId,
    /// Fixed-point rank score (`SCORE_ONE` = 1.0).
    pub score: u64,
    /// Occurrences inside the window, the first tie-breaker.
    pub frequency: u32,
}

/// Window symbols ordered by descending rank score.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ranking {
    entries: Vec<RankedSymbol>,
}

impl Ranking {
    pub fn entries(&self) -> &[RankedSymbol] {
        &self.entries
    }

    pub fn top(&self, k: usize) -> &[RankedSymbol] {
        &self.entries[..k.min(self.entries.len())]
    }

    pub fn ids(&self) -> impl Iterator<Item = SymbolId> + '_ {
        self.entries.iter().map(|entry| entry.id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Position-weighted information scorer.
///
/// For window entry `j` with predecessor `c`:
/// `score = w(j) * log2(1 / P(s_j | c)) * f_d(j)` where
/// `f_d(j) = exp(-decay * (L - 1 - j) / W)`.
///
/// A ranking accumulates `w(j) * f_d(j) * (1 + log2(1 / P))` per symbol so a
/// fully predictable symbol (`P = 1`) still earns credit for its presence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FsmScorer {
    weighting: PositionWeighting,
    decay: f64,
}

impl FsmScorer {
    pub fn new(weighting: PositionWeighting, decay: f64) -> Self {
        Self { weighting, decay }
    }

    pub fn position_weight(&self, position: usize, len: usize) -> f64 {
        match self.weighting {
            PositionWeighting::Linear => {
                if len <= 1 {
                    1.0
                } else {
                    position as f64 / (len - 1) as f64
                }
            }
            PositionWeighting::Uniform => 1.0,
            PositionWeighting::Fractal => 1.0 + (position.max(1) as f64).log2(),
        }
    }

    pub fn decay_factor(&self, position: usize, len: usize, capacity: usize) -> f64 {
        let age = len.saturating_sub(1).saturating_sub(position) as f64;
        (-self.decay * age / capacity.max(1) as f64).exp()
    }

    /// `P(next | context)` from live window counts, `None` if never seen.
    pub fn probability(&self, model: &SymbolModel, context: SymbolId, next: SymbolId) -> Option<f64> {
        let total = model.context_total(context);
        let count = model.transition_count(context, next);
        if total == 0 || count == 0 {
            return None;
        }
        Some(count as f64 / total as f64)
    }

    /// Information score of `context -> next` placed at window `position`.
    /// Unseen transitions score 0.
    pub fn score_at(
        &self,
        model: &SymbolModel,
        context: SymbolId,
        next: SymbolId,
        position: usize,
    ) -> f64 {
        let Some(p) = self.probability(model, context, next) else {
            return 0.0;
        };
        let window = model.window();
        let len = window.len();
        self.position_weight(position, len)
            * (1.0 / p).log2()
            * self.decay_factor(position, len, window.capacity())
    }

    /// Score at the newest window position.
    pub fn score(&self, model: &SymbolModel, context: SymbolId, next: SymbolId) -> f64 {
        let position = model.window().len().saturating_sub(1);
        self.score_at(model, context, next, position)
    }

    /// Ranks every symbol present in the window.
    ///
    /// Deterministic for identical model state: accumulation follows window
    /// order, ties fall back to window frequency, then to the lower id.
    pub fn rank(&self, model: &SymbolModel) -> Ranking {
        let window = model.window();
        let len = window.len();
        let capacity = window.capacity();

        let mut totals: BTreeMap<SymbolId, f64> = BTreeMap::new();
        let mut previous: Option<SymbolId> = None;
        for (position, slot) in window.iter().enumerate() {
            if let Some(context) = previous {
                let total = model.context_total(context);
                let count = model.transition_count(context, slot.id);
                if total > 0 && count > 0 {
                    let information = (total as f64 / count as f64).log2();
                    let weight = self.position_weight(position, len)
                        * self.decay_factor(position, len, capacity);
                    *totals.entry(slot.id).or_insert(0.0) += weight * (1.0 + information);
                }
            }
            previous = Some(slot.id);
        }

        let mut entries: Vec<RankedSymbol> = totals
            .into_iter()
            .map(|(id, score)| RankedSymbol {
                id,
                score: quantize(score),
                frequency: model.window_frequency(id),
            })
            .collect();
        entries.sort_by_key(|e| (Reverse(e.score), Reverse(e.frequency), e.id));
        Ranking { entries }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fsmc_core::Symbol;

    fn observe_all(model: &mut SymbolModel, data: &[u8]) {
        for &b in data {
            model.observe(&Symbol::Byte(b)).unwrap();
        }
    }

    #[test]
    fn test_unseen_transition_scores_zero() {
        let mut model = SymbolModel::new(16);
        observe_all(&mut model, b"ab");
        let scorer = FsmScorer::new(PositionWeighting::Linear, 1.0);
        let a = model.lookup(&Symbol::Byte(b'a')).unwrap();
        let b = model.lookup(&Symbol::Byte(b'b')).unwrap();
        assert_eq!(scorer.score(&model, b, a), 0.0);
        // a -> b is certain: log2(1) = 0
        assert_eq!(scorer.score(&model, a, b), 0.0);
    }

    #[test]
    fn test_surprising_transition_scores_higher() {
        let mut model = SymbolModel::new(64);
        observe_all(&mut model, b"abababac");
        let scorer = FsmScorer::new(PositionWeighting::Uniform, 0.0);
        let a = model.lookup(&Symbol::Byte(b'a')).unwrap();
        let b = model.lookup(&Symbol::Byte(b'b')).unwrap();
        let c = model.lookup(&Symbol::Byte(b'c')).unwrap();
        assert!(scorer.score(&model, a, c) > scorer.score(&model, a, b));
        // P(c|a) = 1/4
        assert!((scorer.score(&model, a, c) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_decay_favors_recent_positions() {
        let scorer = FsmScorer::new(PositionWeighting::Uniform, 2.0);
        assert!(scorer.decay_factor(9, 10, 10) > scorer.decay_factor(0, 10, 10));
        assert_eq!(scorer.decay_factor(9, 10, 10), 1.0);
    }

    #[test]
    fn test_weightings() {
        let linear = FsmScorer::new(PositionWeighting::Linear, 1.0);
        assert_eq!(linear.position_weight(4, 5), 1.0);
        assert_eq!(linear.position_weight(0, 5), 0.0);
        let fractal = FsmScorer::new(PositionWeighting::Fractal, 1.0);
        assert_eq!(fractal.position_weight(8, 16), 4.0);
    }

    #[test]
    fn test_rank_is_deterministic_and_ordered() {
        let mut model = SymbolModel::new(128);
        observe_all(&mut model, b"the quick brown fox jumps over the lazy dog");
        let scorer = FsmScorer::new(PositionWeighting::Linear, 1.0);
        let first = scorer.rank(&model);
        let second = scorer.rank(&model.clone());
        assert_eq!(first, second);
        for pair in first.entries().windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }
}
