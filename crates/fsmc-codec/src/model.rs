use fsmc_core::{CodecError, Result, Symbol};
use fsmc_dsa::{SlidingWindow, TransitionTable, WindowSlot, START_CONTEXT};
use std::collections::HashMap;

/// Dense alphabet index, assigned in insertion order.
pub type SymbolId = u32;

/// Result of advancing the model by one symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    pub id: SymbolId,
    /// The symbol entered the alphabet with this observation.
    pub novel: bool,
}

/// Sliding-window first-order statistics over the symbol stream.
///
/// ## Window Invariant
/// The window ranges over `[START, s0, s1, ...]` and a transition is counted
/// iff both of its endpoints are inside the window. The aggregate transition
/// count is therefore always `min(observed, window - 1)`.
///
/// Every mutation is a paired update: one increment for the new transition,
/// and, if the ring overflowed, one decrement for the evicted one. Nothing is
/// ever recomputed from scratch.
#[derive(Clone)]
pub struct SymbolModel {
    alphabet: Vec<Symbol>,
    index: HashMap<Symbol, SymbolId>,
    window: SlidingWindow,
    transitions: TransitionTable,
    /// Occurrences of each id currently inside the window.
    window_counts: Vec<u32>,
    novel_in_window: u32,
    observed: u64,
}

impl std::fmt::Debug for SymbolModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymbolModel")
            .field("alphabet", &self.alphabet.len())
            .field("window", &self.window)
            .field("transitions", &self.transitions.aggregate())
            .field("observed", &self.observed)
            .finish()
    }
}

impl SymbolModel {
    pub fn new(window: usize) -> Self {
        let mut ring = SlidingWindow::new(window);
        ring.push(WindowSlot::start());
        Self {
            alphabet: Vec::new(),
            index: HashMap::new(),
            window: ring,
            transitions: TransitionTable::new(),
            window_counts: Vec::new(),
            novel_in_window: 0,
            observed: 0,
        }
    }

    /// Admits `symbol` into the alphabet without touching the window.
    pub fn preseed(&mut self, symbol: &Symbol) -> Result<SymbolId> {
        match self.index.get(symbol) {
            Some(&id) => Ok(id),
            None => self.admit(symbol.clone()),
        }
    }

    fn admit(&mut self, symbol: Symbol) -> Result<SymbolId> {
        // START_CONTEXT is reserved.
        if self.alphabet.len() >= START_CONTEXT as usize {
            return Err(CodecError::CapacityExceeded("alphabet id space exhausted".into()));
        }
        let id = self.alphabet.len() as SymbolId;
        self.index.insert(symbol.clone(), id);
        self.alphabet.push(symbol);
        self.window_counts.push(0);
        Ok(id)
    }

    /// Appends `symbol` to the window, admitting it first if novel.
    pub fn observe(&mut self, symbol: &Symbol) -> Result<Observation> {
        let observation = match self.index.get(symbol) {
            Some(&id) => Observation { id, novel: false },
            None => Observation {
                id: self.admit(symbol.clone())?,
                novel: true,
            },
        };
        self.advance(observation);
        Ok(observation)
    }

    /// Appends an already-admitted id. Used by the decoder, which resolves
    /// ids straight from the code table.
    pub fn observe_id(&mut self, id: SymbolId) -> Result<Observation> {
        if id as usize >= self.alphabet.len() {
            return Err(CodecError::Desync(format!("symbol id {} outside alphabet", id)));
        }
        let observation = Observation { id, novel: false };
        self.advance(observation);
        Ok(observation)
    }

    fn advance(&mut self, observation: Observation) {
        let previous = self.current_context();
        self.transitions.increment(previous, observation.id);
        self.window_counts[observation.id as usize] += 1;
        if observation.novel {
            self.novel_in_window += 1;
        }

        let slot = WindowSlot {
            id: observation.id,
            novel: observation.novel,
        };
        if let Some(evicted) = self.window.push(slot) {
            // The evicted entry's outgoing transition lands on the new oldest.
            if let Some(oldest) = self.window.oldest() {
                let successor = oldest.id;
                self.transitions.decrement(evicted.id, successor);
            }
            if !evicted.is_start() {
                self.window_counts[evicted.id as usize] -= 1;
            }
            if evicted.novel {
                self.novel_in_window -= 1;
            }
        }
        self.observed += 1;
    }

    /// Context for the next symbol: the newest window entry.
    #[inline]
    pub fn current_context(&self) -> SymbolId {
        self.window.newest().map(|slot| slot.id).unwrap_or(START_CONTEXT)
    }

    #[inline]
    pub fn transition_count(&self, context: SymbolId, next: SymbolId) -> u32 {
        self.transitions.count(context, next)
    }

    #[inline]
    pub fn context_total(&self, context: SymbolId) -> u32 {
        self.transitions.context_total(context)
    }

    pub fn successors(&self, context: SymbolId) -> impl Iterator<Item = (SymbolId, u32)> + '_ {
        self.transitions.successors(context)
    }

    /// Immutable copy of the live transition counts.
    pub fn snapshot(&self) -> TransitionTable {
        self.transitions.clone()
    }

    pub fn aggregate_transitions(&self) -> u64 {
        self.transitions.aggregate()
    }

    pub fn window(&self) -> &SlidingWindow {
        &self.window
    }

    pub fn window_frequency(&self, id: SymbolId) -> u32 {
        self.window_counts.get(id as usize).copied().unwrap_or(0)
    }

    /// Window entries whose symbol was novel when observed.
    pub fn novel_in_window(&self) -> u32 {
        self.novel_in_window
    }

    pub fn lookup(&self, symbol: &Symbol) -> Option<SymbolId> {
        self.index.get(symbol).copied()
    }

    pub fn symbol(&self, id: SymbolId) -> Option<&Symbol> {
        self.alphabet.get(id as usize)
    }

    pub fn alphabet(&self) -> &[Symbol] {
        &self.alphabet
    }

    pub fn alphabet_len(&self) -> usize {
        self.alphabet.len()
    }

    pub fn observed(&self) -> u64 {
        self.observed
    }
}
