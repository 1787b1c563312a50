use alloc::vec::Vec;
use core::fmt;

/// Context id of the virtual stream-start entry.
///
/// The window ranges over `[START, s0, s1, ...]`, so the very first symbol
/// already has a predecessor to be counted against.
pub const START_CONTEXT: u32 = u32::MAX;

/// One entry of the sliding window.
///
/// `novel` records whether the symbol entered the alphabet at the moment it
/// was observed. The model uses it to weigh the escape leaf.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WindowSlot {
    pub id: u32,
    pub novel: bool,
}

impl WindowSlot {
    pub const fn start() -> Self {
        Self { id: START_CONTEXT, novel: false }
    }

    #[inline(always)]
    pub fn is_start(&self) -> bool {
        self.id == START_CONTEXT
    }
}

static_assertions::assert_eq_size!(WindowSlot, [u8; 8]);

/// A fixed-capacity FIFO ring over window slots.
///
/// ## Arena Layout
/// Storage grows with the slots actually pushed, doubling up to `capacity`
/// and never past it; a window declared far larger than its stream costs
/// only what the stream fills. Until the ring is full `head` stays at 0.
/// After that it points at the oldest slot, pushes overwrite it in place
/// and hand the evicted slot back so paired counts can be decremented.
#[derive(Clone)]
pub struct SlidingWindow {
    slots: Vec<WindowSlot>,
    head: usize,
    capacity: usize,
}

/// First allocation made by a growing window.
const MIN_GROWTH: usize = 16;

impl fmt::Debug for SlidingWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlidingWindow")
            .field("len", &self.slots.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl SlidingWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::new(),
            head: 0,
            capacity: capacity.max(1),
        }
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline(always)]
    pub fn is_full(&self) -> bool {
        self.slots.len() == self.capacity
    }

    /// Slots currently backed by memory.
    pub fn allocated(&self) -> usize {
        self.slots.capacity()
    }

    /// Appends a slot, returning the evicted oldest slot when the ring was full.
    pub fn push(&mut self, slot: WindowSlot) -> Option<WindowSlot> {
        let len = self.slots.len();
        if len < self.capacity {
            if len == self.slots.capacity() {
                let grow = len.max(MIN_GROWTH).min(self.capacity - len);
                self.slots.reserve_exact(grow);
            }
            self.slots.push(slot);
            None
        } else {
            let evicted = self.slots[self.head];
            self.slots[self.head] = slot;
            self.head = (self.head + 1) % self.capacity;
            Some(evicted)
        }
    }

    /// Slot at logical position `pos`, where 0 is the oldest.
    #[inline(always)]
    pub fn get(&self, pos: usize) -> Option<&WindowSlot> {
        if pos >= self.slots.len() {
            return None;
        }
        self.slots.get((self.head + pos) % self.capacity)
    }

    pub fn oldest(&self) -> Option<&WindowSlot> {
        self.get(0)
    }

    pub fn newest(&self) -> Option<&WindowSlot> {
        self.slots.len().checked_sub(1).and_then(|pos| self.get(pos))
    }

    /// Iterates oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &WindowSlot> + '_ {
        (0..self.slots.len()).filter_map(move |pos| self.get(pos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(id: u32) -> WindowSlot {
        WindowSlot { id, novel: false }
    }

    #[test]
    fn evicts_fifo_once_full() {
        let mut window = SlidingWindow::new(3);
        assert!(window.push(slot(1)).is_none());
        assert!(window.push(slot(2)).is_none());
        assert!(window.push(slot(3)).is_none());
        assert!(window.is_full());

        assert_eq!(window.push(slot(4)), Some(slot(1)));
        assert_eq!(window.push(slot(5)), Some(slot(2)));

        let ids: Vec<u32> = window.iter().map(|s| s.id).collect();
        assert_eq!(ids, [3, 4, 5]);
        assert_eq!(window.oldest().map(|s| s.id), Some(3));
        assert_eq!(window.newest().map(|s| s.id), Some(5));
    }

    #[test]
    fn capacity_one_keeps_only_newest() {
        let mut window = SlidingWindow::new(1);
        assert!(window.push(slot(7)).is_none());
        assert_eq!(window.push(slot(8)), Some(slot(7)));
        assert_eq!(window.len(), 1);
        assert_eq!(window.newest().map(|s| s.id), Some(8));
    }

    #[test]
    fn storage_follows_pushes_not_capacity() {
        let mut window = SlidingWindow::new(1 << 24);
        assert_eq!(window.allocated(), 0);
        for id in 0..40 {
            window.push(slot(id));
        }
        assert_eq!(window.len(), 40);
        assert!(window.allocated() >= 40);
        assert!(window.allocated() <= 4 * MIN_GROWTH, "allocated {}", window.allocated());
        assert_eq!(window.oldest().map(|s| s.id), Some(0));
    }

    #[test]
    fn growth_stops_at_capacity() {
        let mut window = SlidingWindow::new(20);
        for id in 0..100 {
            window.push(slot(id));
            assert!(window.allocated() <= 20);
        }
        assert!(window.is_full());
        let ids: Vec<u32> = window.iter().map(|s| s.id).collect();
        assert_eq!(ids, (80..100).collect::<Vec<u32>>());
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let window = SlidingWindow::new(0);
        assert_eq!(window.capacity(), 1);
        assert!(window.is_empty());
        assert!(window.newest().is_none());
    }
}

#[cfg(kani)]
mod proofs {
    use super::*;

    #[kani::proof]
    #[kani::unwind(6)]
    fn prove_window_never_exceeds_capacity() {
        let capacity: usize = kani::any();
        kani::assume(capacity > 0 && capacity <= 4);
        let mut window = SlidingWindow::new(capacity);
        for _ in 0..5 {
            let _ = window.push(WindowSlot { id: kani::any(), novel: kani::any() });
            assert!(window.len() <= window.capacity());
        }
    }
}
