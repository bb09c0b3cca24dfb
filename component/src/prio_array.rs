//! A bucketed priority queue.
//!
//! `PrioArray` keeps one FIFO queue per priority level plus a bitmap of
//! non-empty levels, so peeking the most urgent item costs a scan over a
//! handful of bitmap words instead of a walk over every queued item.
//! Lower numeric priority means more urgent.

use alloc::collections::VecDeque;
use alloc::vec::Vec;

use crate::bitmap::Bitmap;

/// Number of priority levels.
pub const MAX_PRIO: usize = 140;

pub struct PrioArray<T> {
    queues: Vec<VecDeque<T>>,
    // 非空队列对应的 bit 被置位
    bitmap: Bitmap,
}

impl<T> PrioArray<T> {
    pub fn new() -> Self {
        Self {
            queues: (0..MAX_PRIO).map(|_| VecDeque::new()).collect(),
            bitmap: Bitmap::new(MAX_PRIO),
        }
    }

    /// Append `item` to the queue for `priority`.
    pub fn push(&mut self, item: T, priority: usize) {
        assert!(priority < MAX_PRIO, "priority {} out of range", priority);
        self.queues[priority].push_back(item);
        self.bitmap.mark(priority);
    }

    /// Pop the oldest item of the most urgent non-empty level.
    pub fn pop(&mut self) -> Option<T> {
        let prio = self.bitmap.find_first_set()?;
        let item = self.queues[prio].pop_front();
        assert!(item.is_some(), "bitmap bit set for an empty queue");
        if self.queues[prio].is_empty() {
            self.bitmap.clear(prio);
        }
        item
    }

    /// Remove the first item of level `priority` matching `pred`.
    ///
    /// Used when an item's priority changes while queued: take it out of
    /// its old level, then [`push`](PrioArray::push) it at the new one.
    pub fn remove<P: Fn(&T) -> bool>(&mut self, priority: usize, pred: P) -> Option<T> {
        assert!(priority < MAX_PRIO, "priority {} out of range", priority);
        let queue = &mut self.queues[priority];
        let pos = queue.iter().position(pred)?;
        let item = queue.remove(pos);
        if queue.is_empty() {
            self.bitmap.clear(priority);
        }
        item
    }

    /// Priority of the most urgent queued item, if any.
    pub fn best_priority(&self) -> Option<usize> {
        self.bitmap.find_first_set()
    }

    pub fn is_empty(&self) -> bool {
        self.bitmap.find_first_set().is_none()
    }

    pub fn count(&self) -> usize {
        self.queues.iter().map(|q| q.len()).sum()
    }

    /// Visit every queued item, most urgent level first, FIFO within level.
    pub fn apply<F: FnMut(usize, &T)>(&self, mut f: F) {
        for (prio, queue) in self.queues.iter().enumerate() {
            for item in queue {
                f(prio, item);
            }
        }
    }
}

impl<T> Default for PrioArray<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn pop_prefers_urgent_levels() {
        let mut array = PrioArray::new();
        array.push("slow", 139);
        array.push("default", 120);
        array.push("urgent", 100);

        assert_eq!(array.pop(), Some("urgent"));
        assert_eq!(array.pop(), Some("default"));
        assert_eq!(array.pop(), Some("slow"));
        assert_eq!(array.pop(), None);
        assert!(array.is_empty());
    }

    #[test]
    fn fifo_within_level() {
        let mut array = PrioArray::new();
        array.push(1, 120);
        array.push(2, 120);
        array.push(3, 120);
        assert_eq!(array.pop(), Some(1));
        array.push(4, 120);
        assert_eq!(array.pop(), Some(2));
        assert_eq!(array.pop(), Some(3));
        assert_eq!(array.pop(), Some(4));
    }

    #[test]
    fn remove_requeues_at_new_level() {
        let mut array = PrioArray::new();
        array.push(7, 125);
        array.push(8, 125);
        let item = array.remove(125, |&v| v == 8).unwrap();
        array.push(item, 110);
        assert_eq!(array.pop(), Some(8));
        assert_eq!(array.pop(), Some(7));
    }

    proptest! {
        #[test]
        fn drains_in_priority_then_fifo_order(
            items in proptest::collection::vec((0usize..MAX_PRIO, any::<u16>()), 0..64)
        ) {
            let mut array = PrioArray::new();
            for (prio, tag) in &items {
                array.push((*prio, *tag), *prio);
            }
            prop_assert_eq!(array.count(), items.len());

            let mut expected = items.clone();
            // 稳定排序保持同级 FIFO 次序
            expected.sort_by_key(|(prio, _)| *prio);

            let mut drained = Vec::new();
            while let Some(item) = array.pop() {
                drained.push(item);
            }
            prop_assert_eq!(drained, expected);
        }
    }
}
