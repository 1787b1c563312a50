use alloc::collections::BTreeMap;

/// First-order transition counts scoped to a sliding window.
///
/// Maps `context -> next -> count`, with a per-context total kept alongside
/// so `p(next | context)` is a pair of lookups.
///
/// ## Determinism
/// Ordered maps are used throughout: any iteration (successor scans for the
/// residual coder, snapshots) visits keys in the same order on every
/// platform, which the decoder relies on.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransitionTable {
    counts: BTreeMap<u32, BTreeMap<u32, u32>>,
    totals: BTreeMap<u32, u32>,
    aggregate: u64,
}

impl TransitionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&mut self, context: u32, next: u32) {
        *self.counts.entry(context).or_default().entry(next).or_insert(0) += 1;
        *self.totals.entry(context).or_insert(0) += 1;
        self.aggregate += 1;
    }

    /// Removes one occurrence of `context -> next`.
    ///
    /// Returns `false` when the pair had no count, leaving the table untouched.
    /// Empty entries are pruned so snapshots only carry live transitions.
    pub fn decrement(&mut self, context: u32, next: u32) -> bool {
        let Some(successors) = self.counts.get_mut(&context) else {
            return false;
        };
        let Some(count) = successors.get_mut(&next) else {
            return false;
        };

        *count -= 1;
        if *count == 0 {
            successors.remove(&next);
        }
        if successors.is_empty() {
            self.counts.remove(&context);
        }

        if let Some(total) = self.totals.get_mut(&context) {
            *total -= 1;
            if *total == 0 {
                self.totals.remove(&context);
            }
        }
        self.aggregate -= 1;
        true
    }

    #[inline]
    pub fn count(&self, context: u32, next: u32) -> u32 {
        self.counts
            .get(&context)
            .and_then(|successors| successors.get(&next))
            .copied()
            .unwrap_or(0)
    }

    #[inline]
    pub fn context_total(&self, context: u32) -> u32 {
        self.totals.get(&context).copied().unwrap_or(0)
    }

    /// Sum of every live transition count.
    #[inline]
    pub fn aggregate(&self) -> u64 {
        self.aggregate
    }

    /// Successors of `context` in ascending id order.
    pub fn successors(&self, context: u32) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.counts
            .get(&context)
            .into_iter()
            .flat_map(|successors| successors.iter().map(|(&next, &count)| (next, count)))
    }

    /// Contexts with at least one live transition, ascending.
    pub fn contexts(&self) -> impl Iterator<Item = u32> + '_ {
        self.totals.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.aggregate == 0
    }
}
