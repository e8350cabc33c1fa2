//! Failed-changes queue
//!
//! Every time a change fails, a snapshot of it is appended here. The queue is
//! shared by all entries of one processing queue; cloning a
//! [`FailedChangesQueue`] clones the handle, not the contents.
//!
//! Mutation is expected from a single writer (the processing queue); the
//! mutex only makes the handle `Send + Sync`.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use syncbox_core::domain::{ChangeId, FileChange};

/// Shared handle to the queue of failed change snapshots
#[derive(Debug, Clone, Default)]
pub struct FailedChangesQueue {
    inner: Arc<Mutex<VecDeque<FileChange>>>,
}

impl FailedChangesQueue {
    /// Creates an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<FileChange>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends a failed change snapshot
    pub fn push(&self, change: FileChange) {
        self.lock().push_back(change);
    }

    /// Number of recorded failures
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if no failures are recorded
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Number of recorded failures for one change
    pub fn count_for(&self, id: &ChangeId) -> usize {
        self.lock().iter().filter(|c| c.id() == id).count()
    }

    /// Removes and returns every recorded failure, oldest first
    pub fn drain(&self) -> Vec<FileChange> {
        self.lock().drain(..).collect()
    }

    /// Forgets every failure recorded for one change, returning how many
    pub fn purge(&self, id: &ChangeId) -> usize {
        let mut queue = self.lock();
        let before = queue.len();
        queue.retain(|c| c.id() != id);
        before - queue.len()
    }
}

#[cfg(test)]
mod tests {
    use syncbox_core::domain::{ChangeKind, TransferDirection};

    use super::*;

    fn change(path: &str) -> FileChange {
        FileChange::new(ChangeKind::Modified, path, TransferDirection::Upload).unwrap()
    }

    #[test]
    fn test_clones_share_contents() {
        let queue = FailedChangesQueue::new();
        let handle = queue.clone();
        handle.push(change("/a"));
        assert_eq!(queue.len(), 1);
        assert!(!queue.is_empty());
    }

    #[test]
    fn test_count_and_purge_per_change() {
        let queue = FailedChangesQueue::new();
        let a = change("/a");
        let b = change("/b");
        queue.push(a.clone());
        queue.push(b.clone());
        queue.push(a.clone());

        assert_eq!(queue.count_for(a.id()), 2);
        assert_eq!(queue.purge(a.id()), 2);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.count_for(b.id()), 1);
    }

    #[test]
    fn test_drain_empties_in_order() {
        let queue = FailedChangesQueue::new();
        queue.push(change("/1"));
        queue.push(change("/2"));

        let drained = queue.drain();
        assert_eq!(drained[0].path().to_str(), Some("/1"));
        assert_eq!(drained[1].path().to_str(), Some("/2"));
        assert!(queue.is_empty());
    }
}
