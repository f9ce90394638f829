//! Position-centric cache window
//!
//! The window is the set of collection indices that should hold a decoded
//! full-resolution buffer. It is centred on the current index and stretches to
//! the far side near either end of the collection instead of shrinking, so it
//! always holds `min(2 * cache_size + 1, len)` slots.
//!
//! Slots are kept in load priority order: the current index, then the forward
//! neighbours, then the backward neighbours by increasing distance.

use std::collections::HashSet;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheWindow {
    /// Centre of the window (always `slots[0]` when non-empty)
    index: usize,
    slots: Vec<usize>,
}

impl CacheWindow {
    /// Compute the window around `index` for a collection of `len` items.
    ///
    /// An out-of-range `index` is clamped to the last item; an empty collection
    /// yields an empty window.
    pub fn compute(index: usize, cache_size: usize, len: usize) -> Self {
        if len == 0 {
            return Self::default();
        }
        let index = index.min(len - 1);

        let mut slots = Vec::with_capacity((2 * cache_size + 1).min(len));
        slots.push(index);

        // Compensation cursors: how far past the nominal radius each run has
        // been stretched to make up for the other side hitting a boundary.
        let mut back_stretch = 0;
        let mut forward_stretch = 0;

        for i in 1..=cache_size {
            if index + i < len {
                slots.push(index + i);
            } else if let Some(behind) = index.checked_sub(cache_size + back_stretch + 1) {
                slots.push(behind);
                back_stretch += 1;
            }

            if let Some(behind) = index.checked_sub(i) {
                slots.push(behind);
            } else {
                let ahead = index + cache_size + forward_stretch + 1;
                if ahead < len {
                    slots.push(ahead);
                    forward_stretch += 1;
                }
            }
        }

        sort_by_priority(&mut slots, index);
        Self { index, slots }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Slots in load priority order
    pub fn slots(&self) -> &[usize] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, index: usize) -> bool {
        self.slots.contains(&index)
    }

    /// Indices held by `self` that are absent from `next`, ascending
    pub fn evicted_by(&self, next: &CacheWindow) -> Vec<usize> {
        let keep: HashSet<usize> = next.slots.iter().copied().collect();
        let mut evicted: Vec<usize> = self
            .slots
            .iter()
            .copied()
            .filter(|i| !keep.contains(i))
            .collect();
        evicted.sort_unstable();
        evicted
    }
}

/// Forward slots (`>= index`) first by position, then backward slots by
/// increasing distance from `index`.
fn sort_by_priority(slots: &mut [usize], index: usize) {
    slots.sort_by_key(|&slot| {
        if slot >= index {
            (0, slot - index)
        } else {
            (1, index - slot)
        }
    });
}
