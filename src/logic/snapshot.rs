//! Snapshot Cell - atomically swapped immutable models
//!
//! Readers clone the `Arc` under a short read lock and keep scoring against
//! that version; the retraining job builds a complete new value off to the
//! side and swaps the pointer in one write.

use std::sync::Arc;
use parking_lot::RwLock;

pub struct SnapshotCell<T> {
    inner: RwLock<Option<Arc<T>>>,
}

impl<T> SnapshotCell<T> {
    pub const fn empty() -> Self {
        Self { inner: RwLock::new(None) }
    }

    pub fn new(value: T) -> Self {
        Self { inner: RwLock::new(Some(Arc::new(value))) }
    }

    /// Current snapshot, if one has been installed
    pub fn load(&self) -> Option<Arc<T>> {
        self.inner.read().clone()
    }

    /// Install a new snapshot, returning the one it replaced
    pub fn store(&self, value: T) -> Option<Arc<T>> {
        let next = Arc::new(value);
        std::mem::replace(&mut *self.inner.write(), Some(next))
    }

    pub fn is_loaded(&self) -> bool {
        self.inner.read().is_some()
    }
}

impl<T> Default for SnapshotCell<T> {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_keeps_old_version_after_swap() {
        let cell = SnapshotCell::new(vec![1, 2, 3]);
        let held = cell.load().unwrap();

        let previous = cell.store(vec![9]);
        assert_eq!(previous.as_deref(), Some(&vec![1, 2, 3]));

        // In-flight reader still sees the complete old value
        assert_eq!(*held, vec![1, 2, 3]);
        assert_eq!(*cell.load().unwrap(), vec![9]);
    }

    #[test]
    fn test_empty_cell() {
        let cell: SnapshotCell<u32> = SnapshotCell::default();
        assert!(!cell.is_loaded());
        assert!(cell.load().is_none());
        cell.store(7);
        assert!(cell.is_loaded());
    }
}
