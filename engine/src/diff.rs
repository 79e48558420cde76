//! Set differences between two snapshots of the same collection.

use std::collections::HashSet;
use std::hash::Hash;

/// Items of `left` that do not occur in `right`, in `left` order.
pub fn difference<T: Eq + Hash + Clone>(left: &[T], right: &[T]) -> Vec<T> {
    let right: HashSet<&T> = right.iter().collect();
    left.iter()
        .filter(|item| !right.contains(item))
        .cloned()
        .collect()
}

/// Membership changes between an old and a new snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionDiff<T> {
    /// In the new snapshot but not the old one (new order)
    pub added: Vec<T>,
    /// In the old snapshot but not the new one (old order)
    pub removed: Vec<T>,
}

impl<T: Eq + Hash + Clone> CollectionDiff<T> {
    /// Compute `added = new - old` and `removed = old - new`.
    pub fn between(old: &[T], new: &[T]) -> Self {
        Self {
            added: difference(new, old),
            removed: difference(old, new),
        }
    }

    /// Check if membership is unchanged (reordering is not a change).
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}
