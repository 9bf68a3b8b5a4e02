//! Indexed binary min-heap with decrease-key

use std::cmp::Ordering;

const NOT_QUEUED: usize = usize::MAX;

/// Heap entry for one wavefront pixel
#[derive(Debug, Clone, Copy)]
pub struct HeapEntry {
    /// Tentative arrival time
    pub time: f64,
    /// Insertion counter, breaks time ties
    pub sequence: u64,
    /// Linear pixel index
    pub pixel: usize,
}

impl HeapEntry {
    fn precedes(&self, other: &Self) -> bool {
        match self.time.total_cmp(&other.time) {
            Ordering::Less => true,
            Ordering::Greater => false,
            Ordering::Equal => self.sequence < other.sequence,
        }
    }
}

/// Min-heap over a contiguous entry array
///
/// `slots[pixel]` is the index of that pixel's entry in `entries`, or
/// `NOT_QUEUED`. Every public method leaves the slot map consistent.
#[derive(Debug, Clone)]
pub struct IndexedHeap {
    entries: Vec<HeapEntry>,
    slots: Vec<usize>,
    next_sequence: u64,
}

impl IndexedHeap {
    /// Empty heap addressing `pixels` linear indices
    pub fn new(pixels: usize) -> Self {
        Self {
            entries: Vec::new(),
            slots: vec![NOT_QUEUED; pixels],
            next_sequence: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, pixel: usize) -> bool {
        self.slots.get(pixel).is_some_and(|&s| s != NOT_QUEUED)
    }

    /// Current tentative time of a queued pixel
    pub fn time_of(&self, pixel: usize) -> Option<f64> {
        let slot = *self.slots.get(pixel)?;
        self.entries.get(slot).map(|e| e.time)
    }

    /// Queue a pixel; a pixel already queued is decrease-keyed instead
    pub fn push(&mut self, pixel: usize, time: f64) {
        if self.contains(pixel) {
            self.decrease_key(pixel, time);
            return;
        }
        let entry = HeapEntry {
            time,
            sequence: self.next_sequence,
            pixel,
        };
        self.next_sequence += 1;
        let slot = self.entries.len();
        self.entries.push(entry);
        self.slots[pixel] = slot;
        self.sift_up(slot);
    }

    /// Lower the time of a queued pixel; returns whether anything changed
    pub fn decrease_key(&mut self, pixel: usize, time: f64) -> bool {
        let Some(&slot) = self.slots.get(pixel) else {
            return false;
        };
        if slot == NOT_QUEUED || time.total_cmp(&self.entries[slot].time) != Ordering::Less {
            return false;
        }
        self.entries[slot].time = time;
        self.sift_up(slot);
        true
    }

    /// Remove and return the entry with the smallest (time, sequence)
    pub fn pop(&mut self) -> Option<HeapEntry> {
        if self.entries.is_empty() {
            return None;
        }
        let last = self.entries.len() - 1;
        self.swap(0, last);
        let top = self.entries.pop()?;
        self.slots[top.pixel] = NOT_QUEUED;
        if !self.entries.is_empty() {
            self.sift_down(0);
        }
        Some(top)
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.entries.swap(a, b);
        self.slots[self.entries[a].pixel] = a;
        self.slots[self.entries[b].pixel] = b;
    }

    fn sift_up(&mut self, mut slot: usize) {
        while slot > 0 {
            let parent = (slot - 1) / 2;
            if self.entries[slot].precedes(&self.entries[parent]) {
                self.swap(slot, parent);
                slot = parent;
            } else {
                break;
            }
        }
    }

    fn sift_down(&mut self, mut slot: usize) {
        let len = self.entries.len();
        loop {
            let left = 2 * slot + 1;
            let right = left + 1;
            let mut best = slot;
            if left < len && self.entries[left].precedes(&self.entries[best]) {
                best = left;
            }
            if right < len && self.entries[right].precedes(&self.entries[best]) {
                best = right;
            }
            if best == slot {
                break;
            }
            self.swap(slot, best);
            slot = best;
        }
    }

    #[cfg(test)]
    fn is_consistent(&self) -> bool {
        let slots_ok = self
            .entries
            .iter()
            .enumerate()
            .all(|(i, e)| self.slots[e.pixel] == i);
        let order_ok = (1..self.entries.len())
            .all(|i| !self.entries[i].precedes(&self.entries[(i - 1) / 2]));
        let queued = self.slots.iter().filter(|&&s| s != NOT_QUEUED).count();
        slots_ok && order_ok && queued == self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pop_in_time_order() {
        let mut heap = IndexedHeap::new(10);
        for (pixel, time) in [(3, 2.5), (7, 0.5), (1, 9.0), (4, 1.0), (9, 3.0)] {
            heap.push(pixel, time);
            assert!(heap.is_consistent());
        }

        let popped: Vec<usize> = std::iter::from_fn(|| heap.pop()).map(|e| e.pixel).collect();
        assert_eq!(popped, vec![7, 4, 3, 9, 1]);
        assert!(heap.is_empty());
    }

    #[test]
    fn test_ties_follow_insertion_order() {
        let mut heap = IndexedHeap::new(6);
        for pixel in [5, 2, 0, 4] {
            heap.push(pixel, 1.0);
        }
        let popped: Vec<usize> = std::iter::from_fn(|| heap.pop()).map(|e| e.pixel).collect();
        assert_eq!(popped, vec![5, 2, 0, 4]);
    }

    #[test]
    fn test_decrease_key_moves_entry() {
        let mut heap = IndexedHeap::new(8);
        heap.push(0, 5.0);
        heap.push(1, 4.0);
        heap.push(2, 3.0);

        assert!(heap.decrease_key(0, 1.0));
        assert!(heap.is_consistent());
        // Increasing is not a decrease
        assert!(!heap.decrease_key(2, 10.0));
        assert!(!heap.decrease_key(6, 0.0));

        assert_eq!(heap.time_of(0), Some(1.0));
        assert_eq!(heap.pop().map(|e| e.pixel), Some(0));
        assert_eq!(heap.pop().map(|e| e.pixel), Some(2));
        assert!(!heap.contains(0));
        assert!(heap.contains(1));
    }

    #[test]
    fn test_infinite_times_sort_last() {
        let mut heap = IndexedHeap::new(3);
        heap.push(0, f64::INFINITY);
        heap.push(1, 2.0);
        heap.push(2, f64::INFINITY);
        assert_eq!(heap.pop().map(|e| e.pixel), Some(1));
        assert_eq!(heap.pop().map(|e| e.pixel), Some(0));
        assert_eq!(heap.pop().map(|e| e.pixel), Some(2));
        assert_eq!(heap.len(), 0);
    }

    #[test]
    fn test_many_operations_stay_consistent() {
        let mut heap = IndexedHeap::new(64);
        for pixel in 0..64 {
            heap.push(pixel, ((pixel * 37) % 64) as f64);
        }
        for pixel in (0..64).step_by(3) {
            heap.decrease_key(pixel, -(pixel as f64));
            assert!(heap.is_consistent());
        }
        let mut last = f64::NEG_INFINITY;
        while let Some(entry) = heap.pop() {
            assert!(entry.time >= last);
            last = entry.time;
            assert!(heap.is_consistent());
        }
    }
}
