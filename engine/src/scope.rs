//! Scope - the application-side owner of bound collections.
//!
//! A scope holds collections by name and carries a revision counter. Every
//! mutation made through [`Scope::apply`] or [`Scope::assign`] bumps the
//! revision, which wakes the bindings observing the scope so they can digest
//! the change.

use crate::collection::BoundCollection;
use crate::record::Record;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// Shared handle to a set of named collections.
///
/// Cloning is cheap; all clones refer to the same collections.
#[derive(Clone)]
pub struct Scope {
    inner: Arc<ScopeInner>,
}

struct ScopeInner {
    collections: Mutex<HashMap<String, BoundCollection>>,
    revision: watch::Sender<u64>,
}

impl Scope {
    /// Create an empty scope.
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            inner: Arc::new(ScopeInner {
                collections: Mutex::new(HashMap::new()),
                revision,
            }),
        }
    }

    /// Mutate the collection `name`.
    ///
    /// Returns `None` if no such collection exists. The closure runs under the
    /// scope lock and must not call back into the scope.
    pub fn apply<R>(&self, name: &str, f: impl FnOnce(&mut BoundCollection) -> R) -> Option<R> {
        let result = {
            let mut collections = self.inner.collections.lock();
            let collection = collections.get_mut(name)?;
            f(collection)
        };
        self.bump();
        Some(result)
    }

    /// Create or replace the collection `name`.
    pub fn assign(&self, name: impl Into<String>, collection: BoundCollection) {
        self.inner
            .collections
            .lock()
            .insert(name.into(), collection);
        self.bump();
    }

    /// Remove the collection `name`.
    pub fn remove(&self, name: &str) -> Option<BoundCollection> {
        let removed = self.inner.collections.lock().remove(name);
        if removed.is_some() {
            self.bump();
        }
        removed
    }

    /// Read the collection `name` without marking the scope changed.
    pub fn read<R>(&self, name: &str, f: impl FnOnce(&BoundCollection) -> R) -> Option<R> {
        let collections = self.inner.collections.lock();
        collections.get(name).map(f)
    }

    /// Copy of the records in `name`, in order.
    pub fn records(&self, name: &str) -> Option<Vec<Record>> {
        self.read(name, BoundCollection::to_vec)
    }

    /// Number of records in `name`.
    pub fn len(&self, name: &str) -> Option<usize> {
        self.read(name, BoundCollection::len)
    }

    /// Check if a collection exists.
    pub fn contains(&self, name: &str) -> bool {
        self.inner.collections.lock().contains_key(name)
    }

    /// Current revision; increases on every mutation.
    pub fn revision(&self) -> u64 {
        *self.inner.revision.borrow()
    }

    /// Receiver notified on every revision change.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.revision.subscribe()
    }

    fn bump(&self) {
        self.inner.revision.send_modify(|rev| *rev += 1);
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let collections = self.inner.collections.lock();
        let mut names: Vec<_> = collections.keys().cloned().collect();
        names.sort();
        f.debug_struct("Scope")
            .field("collections", &names)
            .field("revision", &self.revision())
            .finish()
    }
}
