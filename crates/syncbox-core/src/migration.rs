//! Ordered migration list
//!
//! Storage adapters evolve their schema through a list of
//! `(version, migration)` pairs. On open, the adapter reads its current
//! version `v` and applies [`MigrationList::migrations_after`]`(v)` in order.
//!
//! Versions are kept sorted, so "everything after `v`" is a binary search
//! for the first version greater than `v` followed by a slice walk.

use std::iter::FusedIterator;
use std::slice;

use crate::domain::errors::DomainError;

/// Sorted list of versioned migrations
#[derive(Debug, Clone)]
pub struct MigrationList<M> {
    entries: Vec<(u32, M)>,
}

impl<M> MigrationList<M> {
    /// Builds the list, sorting by version
    ///
    /// # Errors
    /// Returns `DomainError::ValidationFailed` if two migrations share a
    /// version
    pub fn new(migrations: impl IntoIterator<Item = (u32, M)>) -> Result<Self, DomainError> {
        let mut entries: Vec<(u32, M)> = migrations.into_iter().collect();
        entries.sort_by_key(|(version, _)| *version);

        if let Some(pair) = entries.windows(2).find(|pair| pair[0].0 == pair[1].0) {
            return Err(DomainError::ValidationFailed(format!(
                "duplicate migration version {}",
                pair[0].0
            )));
        }

        Ok(Self { entries })
    }

    /// Highest known version, or `None` for an empty list
    pub fn latest_version(&self) -> Option<u32> {
        self.entries.last().map(|(version, _)| *version)
    }

    /// Number of migrations
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no migrations
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every migration strictly newer than `version`, in ascending order
    ///
    /// The returned iterator is lazy and can be cloned to restart from the
    /// same position.
    pub fn migrations_after(&self, version: u32) -> MigrationsAfter<'_, M> {
        let start = self.entries.partition_point(|(v, _)| *v <= version);
        MigrationsAfter {
            remaining: self.entries[start..].iter(),
        }
    }
}

/// Iterator over the migrations after a given version
#[derive(Debug)]
pub struct MigrationsAfter<'a, M> {
    remaining: slice::Iter<'a, (u32, M)>,
}

impl<M> Clone for MigrationsAfter<'_, M> {
    fn clone(&self) -> Self {
        Self {
            remaining: self.remaining.clone(),
        }
    }
}

impl<'a, M> Iterator for MigrationsAfter<'a, M> {
    type Item = (u32, &'a M);

    fn next(&mut self) -> Option<Self::Item> {
        self.remaining.next().map(|(version, m)| (*version, m))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.remaining.size_hint()
    }
}

impl<M> ExactSizeIterator for MigrationsAfter<'_, M> {}

impl<M> FusedIterator for MigrationsAfter<'_, M> {}

#[cfg(test)]
mod tests {
    use super::*;

    fn list() -> MigrationList<&'static str> {
        MigrationList::new([(5, "five"), (1, "one"), (3, "three"), (10, "ten")]).unwrap()
    }

    fn versions_after(list: &MigrationList<&'static str>, v: u32) -> Vec<u32> {
        list.migrations_after(v).map(|(version, _)| version).collect()
    }

    #[test]
    fn test_empty_when_at_latest_version() {
        let list = list();
        assert_eq!(list.latest_version(), Some(10));
        assert_eq!(list.migrations_after(10).count(), 0);
        assert_eq!(list.migrations_after(99).count(), 0);
    }

    #[test]
    fn test_all_when_below_lowest_version() {
        let list = list();
        assert_eq!(versions_after(&list, 0), vec![1, 3, 5, 10]);
        let names: Vec<&str> = list.migrations_after(0).map(|(_, m)| *m).collect();
        assert_eq!(names, vec!["one", "three", "five", "ten"]);
    }

    #[test]
    fn test_strictly_after_version() {
        let list = list();
        assert_eq!(versions_after(&list, 3), vec![5, 10]);
        assert_eq!(versions_after(&list, 4), vec![5, 10]);
        assert_eq!(versions_after(&list, 1), vec![3, 5, 10]);
    }

    #[test]
    fn test_iterator_is_restartable() {
        let list = list();
        let mut iter = list.migrations_after(1);
        assert_eq!(iter.len(), 3);
        iter.next();
        let snapshot = iter.clone();
        assert_eq!(iter.map(|(v, _)| v).collect::<Vec<_>>(), vec![5, 10]);
        assert_eq!(snapshot.map(|(v, _)| v).collect::<Vec<_>>(), vec![5, 10]);
    }

    #[test]
    fn test_duplicate_versions_rejected() {
        let result = MigrationList::new([(1, "a"), (1, "b")]);
        assert!(matches!(result, Err(DomainError::ValidationFailed(_))));
    }

    #[test]
    fn test_empty_list() {
        let list: MigrationList<()> = MigrationList::new(Vec::new()).unwrap();
        assert!(list.is_empty());
        assert_eq!(list.latest_version(), None);
        assert_eq!(list.migrations_after(0).count(), 0);
    }
}
