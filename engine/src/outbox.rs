//! Outbox - acknowledgment tracking for outbound requests.
//!
//! Every create, update and destroy the binding sends to the server is
//! recorded as an [`Intent`]. Intents start `Pending` and settle as
//! `Confirmed`, `Skipped` or `Failed`, so a propagation failure is visible to
//! the application instead of silently desyncing the collection.

use crate::collection::ItemKey;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;

/// Identifier of an intent within one outbox.
pub type IntentId = u64;

/// What an intent asks the server to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentKind {
    Create,
    Update,
    Destroy,
}

/// Acknowledgment state of an intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "lowercase")]
pub enum IntentState {
    /// Sent (or about to be), no answer yet
    Pending,
    /// The server acknowledged it
    Confirmed,
    /// Not sent, the precondition no longer held (record already gone)
    Skipped,
    /// The request failed
    Failed(String),
}

impl IntentState {
    /// Check if the intent has reached a final state.
    pub fn is_settled(&self) -> bool {
        !matches!(self, IntentState::Pending)
    }
}

/// One outbound request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Intent {
    pub id: IntentId,
    pub kind: IntentKind,
    /// The collection item the intent was raised for
    pub item: ItemKey,
    /// Server id of the record; for creates, filled in on confirmation
    pub record_id: Option<Value>,
    /// Body sent with the request
    pub payload: Value,
    pub state: IntentState,
}

/// Ordered log of intents with bounded history of settled entries.
#[derive(Debug, Clone)]
pub struct Outbox {
    intents: VecDeque<Intent>,
    next_id: IntentId,
    history: usize,
}

impl Outbox {
    /// Create an outbox keeping at most `history` settled intents.
    pub fn new(history: usize) -> Self {
        Self {
            intents: VecDeque::new(),
            next_id: 1,
            history,
        }
    }

    /// Record a new pending intent.
    pub fn enqueue(
        &mut self,
        kind: IntentKind,
        item: ItemKey,
        record_id: Option<Value>,
        payload: Value,
    ) -> IntentId {
        let id = self.next_id;
        self.next_id += 1;
        self.intents.push_back(Intent {
            id,
            kind,
            item,
            record_id,
            payload,
            state: IntentState::Pending,
        });
        id
    }

    /// Mark an intent confirmed, optionally recording the server id.
    pub fn confirm(&mut self, id: IntentId, record_id: Option<Value>) {
        if let Some(intent) = self.get_mut(id) {
            intent.state = IntentState::Confirmed;
            if record_id.is_some() {
                intent.record_id = record_id;
            }
        }
        self.prune();
    }

    /// Mark an intent skipped.
    pub fn skip(&mut self, id: IntentId) {
        self.settle(id, IntentState::Skipped);
    }

    /// Mark an intent failed.
    pub fn fail(&mut self, id: IntentId, reason: impl Into<String>) {
        self.settle(id, IntentState::Failed(reason.into()));
    }

    /// Look up an intent.
    pub fn get(&self, id: IntentId) -> Option<&Intent> {
        self.intents.iter().find(|i| i.id == id)
    }

    /// All retained intents, oldest first.
    pub fn all(&self) -> Vec<Intent> {
        self.intents.iter().cloned().collect()
    }

    /// Intents still waiting for an answer.
    pub fn pending(&self) -> impl Iterator<Item = &Intent> {
        self.intents
            .iter()
            .filter(|i| i.state == IntentState::Pending)
    }

    /// Intents that failed.
    pub fn failed(&self) -> impl Iterator<Item = &Intent> {
        self.intents
            .iter()
            .filter(|i| matches!(i.state, IntentState::Failed(_)))
    }

    /// Count of pending intents.
    pub fn pending_count(&self) -> usize {
        self.pending().count()
    }

    /// Number of retained intents.
    pub fn len(&self) -> usize {
        self.intents.len()
    }

    /// Check if nothing is retained.
    pub fn is_empty(&self) -> bool {
        self.intents.is_empty()
    }

    fn get_mut(&mut self, id: IntentId) -> Option<&mut Intent> {
        self.intents.iter_mut().find(|i| i.id == id)
    }

    fn settle(&mut self, id: IntentId, state: IntentState) {
        if let Some(intent) = self.get_mut(id) {
            intent.state = state;
        }
        self.prune();
    }

    /// Drop the oldest settled intents beyond the history limit.
    fn prune(&mut self) {
        let mut settled = self
            .intents
            .iter()
            .filter(|i| i.state.is_settled())
            .count();
        while settled > self.history {
            match self.intents.iter().position(|i| i.state.is_settled()) {
                Some(index) => {
                    self.intents.remove(index);
                    settled -= 1;
                }
                None => break,
            }
        }
    }
}

impl Default for Outbox {
    fn default() -> Self {
        Self::new(256)
    }
}
