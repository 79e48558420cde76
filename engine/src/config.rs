//! Configuration for bindings.

use serde::{Deserialize, Serialize};

/// Configuration applied to every binding made by a
/// [`Synchronizer`](crate::Synchronizer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncConfig {
    /// Appended to the resource name to name the bound collection.
    pub collection_suffix: String,
    /// Only propagate a local edit when it changed `updatedAt`.
    ///
    /// Edits whose `updatedAt` is unchanged are treated as server echoes.
    /// Remote changes are suppressed by origin regardless of this flag.
    pub require_timestamp_change: bool,
    /// Look a removed record up on the server before deleting it.
    pub confirm_before_destroy: bool,
    /// Number of settled intents the outbox retains.
    pub outbox_history: usize,
}

impl SyncConfig {
    /// Creates a configuration with the default settings.
    pub fn new() -> Self {
        Self {
            collection_suffix: "s".to_string(),
            require_timestamp_change: true,
            confirm_before_destroy: true,
            outbox_history: 256,
        }
    }

    /// Sets the collection name suffix.
    pub fn with_collection_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.collection_suffix = suffix.into();
        self
    }

    /// Sets whether local edits must change `updatedAt` to be sent.
    pub fn with_require_timestamp_change(mut self, required: bool) -> Self {
        self.require_timestamp_change = required;
        self
    }

    /// Sets whether removals are confirmed with the server before deleting.
    pub fn with_confirm_before_destroy(mut self, confirm: bool) -> Self {
        self.confirm_before_destroy = confirm;
        self
    }

    /// Sets the settled-intent history size.
    pub fn with_outbox_history(mut self, history: usize) -> Self {
        self.outbox_history = history;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}
