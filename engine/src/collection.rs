//! The ordered, identity-keyed collection a binding keeps in sync.

use crate::record::Record;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_KEY: AtomicU64 = AtomicU64::new(1);

/// Stable identity of an item in a [`BoundCollection`].
///
/// Keys are allocated process-wide and never reused, so a key always denotes
/// the same item for as long as it is in a collection, independent of its
/// position and of whether it has a server id yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemKey(u64);

impl ItemKey {
    fn next() -> Self {
        ItemKey(NEXT_KEY.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An ordered sequence of records held under stable item keys.
#[derive(Debug, Clone, Default)]
pub struct BoundCollection {
    items: Vec<(ItemKey, Record)>,
}

impl BoundCollection {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Create a collection holding `records` in order.
    pub fn from_records(records: impl IntoIterator<Item = Record>) -> Self {
        Self {
            items: records
                .into_iter()
                .map(|record| (ItemKey::next(), record))
                .collect(),
        }
    }

    /// Append a record.
    pub fn push(&mut self, record: Record) -> ItemKey {
        let key = ItemKey::next();
        self.items.push((key, record));
        key
    }

    /// Insert a record at `index` (clamped to the length).
    pub fn insert(&mut self, index: usize, record: Record) -> ItemKey {
        let key = ItemKey::next();
        let index = index.min(self.items.len());
        self.items.insert(index, (key, record));
        key
    }

    /// Remove an item by key.
    pub fn remove(&mut self, key: ItemKey) -> Option<Record> {
        let index = self.position(key)?;
        Some(self.items.remove(index).1)
    }

    /// Keep only the records matching `keep`; returns how many were removed.
    pub fn retain(&mut self, mut keep: impl FnMut(&Record) -> bool) -> usize {
        let before = self.items.len();
        self.items.retain(|(_, record)| keep(record));
        before - self.items.len()
    }

    /// Get a record by key.
    pub fn get(&self, key: ItemKey) -> Option<&Record> {
        self.items.iter().find(|(k, _)| *k == key).map(|(_, r)| r)
    }

    /// Get a mutable record by key.
    pub fn get_mut(&mut self, key: ItemKey) -> Option<&mut Record> {
        self.items
            .iter_mut()
            .find(|(k, _)| *k == key)
            .map(|(_, r)| r)
    }

    /// Current position of an item.
    pub fn position(&self, key: ItemKey) -> Option<usize> {
        self.items.iter().position(|(k, _)| *k == key)
    }

    /// Key of the first record whose id numerically equals `id`.
    pub fn find_by_id(&self, id: &Value) -> Option<ItemKey> {
        self.items
            .iter()
            .find(|(_, record)| record.matches_id(id))
            .map(|(key, _)| *key)
    }

    /// Key of the item at `index`.
    pub fn key_at(&self, index: usize) -> Option<ItemKey> {
        self.items.get(index).map(|(key, _)| *key)
    }

    /// All keys in order.
    pub fn keys(&self) -> Vec<ItemKey> {
        self.items.iter().map(|(key, _)| *key).collect()
    }

    /// Iterate `(key, record)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (ItemKey, &Record)> {
        self.items.iter().map(|(key, record)| (*key, record))
    }

    /// Iterate records in order.
    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.items.iter().map(|(_, record)| record)
    }

    /// Copy the records out, in order.
    pub fn to_vec(&self) -> Vec<Record> {
        self.records().cloned().collect()
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if the collection is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
