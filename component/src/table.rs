//! A bounded table handing out small integer handles.
//!
//! Thread identifiers and file descriptors are both indices into one of
//! these: a fixed number of slots, the lowest free slot is reused first,
//! and exhaustion is reported to the caller instead of growing.

use alloc::vec::Vec;

pub struct Table<T> {
    slots: Vec<Option<T>>,
}

impl<T> Table<T> {
    /// Create a table with `size` slots.
    pub fn new(size: usize) -> Self {
        assert_ne!(size, 0);
        Self {
            slots: (0..size).map(|_| None).collect(),
        }
    }

    /// Store `item` in the lowest free slot and return its handle.
    ///
    /// Returns `None` when the table is full.
    pub fn add(&mut self, item: T) -> Option<usize> {
        let idx = self.slots.iter().position(|slot| slot.is_none())?;
        self.slots[idx] = Some(item);
        Some(idx)
    }

    pub fn get(&self, handle: usize) -> Option<&T> {
        self.slots.get(handle).and_then(|slot| slot.as_ref())
    }

    pub fn get_mut(&mut self, handle: usize) -> Option<&mut T> {
        self.slots.get_mut(handle).and_then(|slot| slot.as_mut())
    }

    /// Free the slot at `handle`, returning its previous occupant.
    pub fn remove(&mut self, handle: usize) -> Option<T> {
        self.slots.get_mut(handle).and_then(|slot| slot.take())
    }

    pub fn has(&self, handle: usize) -> bool {
        self.get(handle).is_some()
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Visit every occupied slot in handle order.
    pub fn apply<F: FnMut(usize, &T)>(&self, mut f: F) {
        for (handle, slot) in self.slots.iter().enumerate() {
            if let Some(item) = slot {
                f(handle, item);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowest_slot_first() {
        let mut table = Table::new(3);
        assert_eq!(table.add("a"), Some(0));
        assert_eq!(table.add("b"), Some(1));
        assert_eq!(table.remove(0), Some("a"));
        assert_eq!(table.add("c"), Some(0));
        assert_eq!(table.add("d"), Some(2));
        assert_eq!(table.add("e"), None);
    }

    #[test]
    fn out_of_range_handles() {
        let mut table: Table<u32> = Table::new(2);
        assert!(table.get(5).is_none());
        assert!(table.remove(5).is_none());
        assert!(!table.has(1));
    }
}
