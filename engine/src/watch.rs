//! Dirty-checking watchers over a bound collection.
//!
//! A [`WatchTable`] remembers the last digested shape of the collection (its
//! item keys, in order) and one baseline snapshot per watched item. Each
//! [`WatchTable::digest`] compares the live collection against those
//! baselines, reports what changed, and moves the baselines forward.

use crate::collection::{BoundCollection, ItemKey};
use crate::diff::CollectionDiff;
use crate::record::{Origin, Record};
use std::collections::HashMap;

/// The collection's shape changed between two digests.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionChange {
    /// Keys at the previous digest
    pub old: Vec<ItemKey>,
    /// Keys now
    pub new: Vec<ItemKey>,
    /// Items that appeared, with their current value
    pub added: Vec<(ItemKey, Record)>,
    /// Items that disappeared, with their last digested value
    pub removed: Vec<(ItemKey, Record)>,
}

impl CollectionChange {
    /// Keys of the added items.
    pub fn added_keys(&self) -> Vec<ItemKey> {
        self.added.iter().map(|(key, _)| *key).collect()
    }

    /// Keys of the removed items.
    pub fn removed_keys(&self) -> Vec<ItemKey> {
        self.removed.iter().map(|(key, _)| *key).collect()
    }
}

/// The contents of one watched item changed between two digests.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemChange {
    pub key: ItemKey,
    pub old: Record,
    pub new: Record,
}

/// Everything one digest observed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Digest {
    /// Who made the changes
    pub origin: Origin,
    pub collection: Option<CollectionChange>,
    pub items: Vec<ItemChange>,
}

impl Digest {
    /// Check if nothing changed.
    pub fn is_empty(&self) -> bool {
        self.collection.is_none() && self.items.is_empty()
    }
}

/// Collection-level and per-item watchers of one binding.
#[derive(Debug, Clone, Default)]
pub struct WatchTable {
    shape: Vec<ItemKey>,
    items: HashMap<ItemKey, Record>,
}

impl WatchTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Baseline the whole collection: its shape and one watcher per item.
    pub fn install(&mut self, collection: &BoundCollection) {
        self.shape = collection.keys();
        self.items = collection
            .iter()
            .map(|(key, record)| (key, record.clone()))
            .collect();
    }

    /// Check if an item has a watcher.
    pub fn is_watching(&self, key: ItemKey) -> bool {
        self.items.contains_key(&key)
    }

    /// Number of item watchers.
    pub fn watcher_count(&self) -> usize {
        self.items.len()
    }

    /// Compare `collection` with the baselines and advance them.
    ///
    /// Items that appeared since the last digest get a watcher whose baseline
    /// is their current value, so they never produce an [`ItemChange`] in the
    /// digest that discovers them. Watchers of removed items are dropped.
    pub fn digest(&mut self, collection: &BoundCollection) -> Digest {
        self.digest_as(collection, Origin::Local)
    }

    /// Like [`WatchTable::digest`], attributing the changes to `origin`.
    pub fn digest_as(&mut self, collection: &BoundCollection, origin: Origin) -> Digest {
        let mut digest = Digest {
            origin,
            ..Digest::default()
        };

        let current = collection.keys();
        if current != self.shape {
            let diff = CollectionDiff::between(&self.shape, &current);
            let removed = diff
                .removed
                .into_iter()
                .filter_map(|key| self.items.remove(&key).map(|record| (key, record)))
                .collect();
            let added = diff
                .added
                .into_iter()
                .filter_map(|key| collection.get(key).map(|record| (key, record.clone())))
                .collect::<Vec<_>>();
            for (key, record) in &added {
                self.items.insert(*key, record.clone());
            }
            digest.collection = Some(CollectionChange {
                old: std::mem::replace(&mut self.shape, current),
                new: self.shape.clone(),
                added,
                removed,
            });
        }

        for (key, record) in collection.iter() {
            if let Some(baseline) = self.items.get_mut(&key) {
                if baseline != record {
                    let old = std::mem::replace(baseline, record.clone());
                    digest.items.push(ItemChange {
                        key,
                        old,
                        new: record.clone(),
                    });
                }
            }
        }

        digest
    }
}
