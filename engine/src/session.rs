//! Synchronizer - binds a scope collection to a server resource.
//!
//! # Lifecycle of a binding
//!
//! 1. Subscribe to the resource's change channel (events queue up)
//! 2. Fetch the initial set and seed the collection `<resource>s`
//! 3. Baseline the watchers on every seeded item
//! 4. Spawn the driver, which from then on serializes three inputs:
//!    - remote change events, applied to the collection
//!    - scope revisions, digested and propagated as create/update/destroy
//!    - completions of the requests it issued
//!
//! # Loop avoidance
//!
//! Every mutation the driver makes itself (remote events, merging server
//! fields after a create) happens under the scope lock, followed by a digest
//! tagged [`Origin::Remote`]. That digest moves the watcher baselines past the
//! change and is dropped by `propagate`, so nothing received from the server
//! is ever sent back. Local changes still pending at that moment are digested
//! first, tagged [`Origin::Local`], and propagated normally.

use crate::collection::{BoundCollection, ItemKey};
use crate::config::SyncConfig;
use crate::error::{Error, Result};
use crate::event::{ChangeMessage, RemoteEvent};
use crate::outbox::{Intent, IntentId, IntentKind, Outbox};
use crate::record::{kind_of, Origin, Record};
use crate::resource::Resource;
use crate::scope::Scope;
use crate::transport::{EventStream, Request, Transport};
use crate::watch::{Digest, WatchTable};
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Creates bindings between scope collections and server resources.
#[derive(Clone)]
pub struct Synchronizer {
    transport: Arc<dyn Transport>,
    config: SyncConfig,
}

impl Synchronizer {
    /// Create a synchronizer over `transport`.
    pub fn new(transport: Arc<dyn Transport>, config: SyncConfig) -> Self {
        Self { transport, config }
    }

    /// The configuration applied to new bindings.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Bind the collection `<resource><suffix>` of `scope` to `resource`.
    ///
    /// `subset` is passed verbatim as the parameters of the initial fetch
    /// (filters, sort, limit). Returns once the collection is seeded and
    /// watched; synchronization continues for as long as the returned
    /// [`Binding`] is alive.
    ///
    /// # Errors
    ///
    /// Fails if the resource name is invalid, the subscription is refused, or
    /// the initial fetch fails or returns something other than records. The
    /// scope is left untouched in that case.
    pub async fn bind(
        &self,
        resource: &str,
        scope: &Scope,
        subset: Option<Value>,
    ) -> Result<Binding> {
        let resource = Resource::new(resource)?;
        let collection_name = resource.collection_name(&self.config.collection_suffix);

        let events = self.transport.subscribe(resource.name()).await?;

        let params = subset.unwrap_or_else(|| Value::Object(Map::new()));
        let response = self
            .transport
            .request(Request::get(resource.find_path(), params))
            .await?;
        let records = normalize(response)?;
        let seeded = records.len();

        let collection = BoundCollection::from_records(records);
        let mut watches = WatchTable::new();
        watches.install(&collection);

        let mut revisions = scope.subscribe();
        scope.assign(collection_name.clone(), collection);
        revisions.borrow_and_update();

        info!(
            resource = %resource,
            collection = %collection_name,
            records = seeded,
            "Collection bound"
        );

        let outbox = Arc::new(Mutex::new(Outbox::new(self.config.outbox_history)));
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();

        let driver = Driver {
            resource: resource.clone(),
            collection: collection_name.clone(),
            scope: scope.clone(),
            transport: self.transport.clone(),
            config: self.config.clone(),
            watches,
            outbox: outbox.clone(),
            completions: completion_tx,
            in_flight: 0,
            waiters: Vec::new(),
        };
        let task = tokio::spawn(driver.run(events, revisions, control_rx, completion_rx));

        Ok(Binding {
            resource,
            collection: collection_name,
            scope: scope.clone(),
            outbox,
            control: control_tx,
            task,
        })
    }
}

/// A live binding. Dropping it stops synchronization; the collection stays in
/// the scope.
#[must_use = "dropping a Binding stops synchronization"]
pub struct Binding {
    resource: Resource,
    collection: String,
    scope: Scope,
    outbox: Arc<Mutex<Outbox>>,
    control: mpsc::UnboundedSender<Control>,
    task: JoinHandle<()>,
}

impl Binding {
    /// The bound resource.
    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    /// Name of the bound collection in the scope.
    pub fn collection_name(&self) -> &str {
        &self.collection
    }

    /// The scope holding the collection.
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Copy of the bound records, in order.
    pub fn records(&self) -> Vec<Record> {
        self.scope.records(&self.collection).unwrap_or_default()
    }

    /// All retained outbound intents, oldest first.
    pub fn outbox(&self) -> Vec<Intent> {
        self.outbox.lock().all()
    }

    /// Intents whose request failed.
    pub fn failed(&self) -> Vec<Intent> {
        self.outbox.lock().failed().cloned().collect()
    }

    /// Number of intents still waiting for the server.
    pub fn pending_count(&self) -> usize {
        self.outbox.lock().pending_count()
    }

    /// Check if the driver is still running.
    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }

    /// Wait until every input queued so far has been handled and no request
    /// is in flight.
    pub async fn settled(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.control
            .send(Control::Settle(tx))
            .map_err(|_| Error::BindingClosed)?;
        rx.await.map_err(|_| Error::BindingClosed)
    }

    /// Stop synchronizing.
    pub fn unbind(self) {
        drop(self);
    }
}

impl Drop for Binding {
    fn drop(&mut self) {
        self.task.abort();
    }
}

enum Control {
    Settle(oneshot::Sender<()>),
}

enum Completion {
    Created {
        intent: IntentId,
        key: ItemKey,
        result: Result<Record>,
    },
    Updated {
        intent: IntentId,
        result: Result<()>,
    },
    Destroyed {
        intent: IntentId,
        /// `Ok(false)` when the record was already gone from the server
        result: Result<bool>,
    },
}

struct Driver {
    resource: Resource,
    collection: String,
    scope: Scope,
    transport: Arc<dyn Transport>,
    config: SyncConfig,
    watches: WatchTable,
    outbox: Arc<Mutex<Outbox>>,
    completions: mpsc::UnboundedSender<Completion>,
    in_flight: usize,
    waiters: Vec<oneshot::Sender<()>>,
}

impl Driver {
    async fn run(
        mut self,
        mut events: EventStream,
        mut revisions: watch::Receiver<u64>,
        mut control: mpsc::UnboundedReceiver<Control>,
        mut completions: mpsc::UnboundedReceiver<Completion>,
    ) {
        // Changes made between seeding and startup
        self.digest_local();

        let mut remote_open = true;
        loop {
            tokio::select! {
                biased;

                message = events.recv(), if remote_open => match message {
                    Some(message) => self.handle_message(message),
                    None => {
                        info!(resource = %self.resource, "Remote channel closed");
                        remote_open = false;
                    }
                },

                changed = revisions.changed() => match changed {
                    Ok(()) => {
                        revisions.borrow_and_update();
                        self.digest_local();
                    }
                    Err(_) => break,
                },

                Some(completion) = completions.recv() => self.handle_completion(completion),

                command = control.recv() => match command {
                    Some(Control::Settle(tx)) => self.waiters.push(tx),
                    None => break,
                },
            }

            if self.in_flight == 0 {
                for waiter in self.waiters.drain(..) {
                    let _ = waiter.send(());
                }
            }
        }

        debug!(resource = %self.resource, "Binding driver stopped");
    }

    fn handle_message(&mut self, message: ChangeMessage) {
        let event = match RemoteEvent::decode(message) {
            Ok(RemoteEvent::Unknown { verb }) => {
                warn!(resource = %self.resource, verb = %verb, "Ignoring remote event with unknown verb");
                return;
            }
            Ok(event) => event,
            Err(e) => {
                warn!(resource = %self.resource, "Ignoring malformed remote event: {}", e);
                return;
            }
        };

        debug!(resource = %self.resource, verb = event.verb(), "Applying remote event");

        let verb = event.verb().to_string();
        let watches = &mut self.watches;
        let outcome = self.scope.apply(&self.collection, |collection| {
            let local = watches.digest(collection);
            let changed = apply_remote(collection, event);
            let remote = watches.digest_as(collection, Origin::Remote);
            (local, remote, changed)
        });

        match outcome {
            Some((local, remote, changed)) => {
                if !changed {
                    trace!(resource = %self.resource, verb = %verb, "Remote event matched no record");
                }
                self.propagate(local);
                self.propagate(remote);
            }
            None => {
                warn!(collection = %self.collection, "Bound collection missing from scope");
            }
        }
    }

    fn digest_local(&mut self) {
        let watches = &mut self.watches;
        let Some(digest) = self.scope.read(&self.collection, |c| watches.digest(c)) else {
            return;
        };
        self.propagate(digest);
    }

    /// Turn a digest of local changes into requests. Remote digests only
    /// advance the baselines and are dropped here.
    fn propagate(&mut self, digest: Digest) {
        if digest.is_empty() {
            return;
        }
        if digest.origin == Origin::Remote {
            trace!(
                resource = %self.resource,
                shape_changed = digest.collection.is_some(),
                edits = digest.items.len(),
                "Absorbed remote change"
            );
            return;
        }
        trace!(
            resource = %self.resource,
            shape_changed = digest.collection.is_some(),
            edits = digest.items.len(),
            "Digest"
        );

        if let Some(change) = digest.collection {
            for (key, record) in change.removed {
                self.destroy(key, &record);
            }
            for (key, record) in change.added {
                if !record.has_id() {
                    self.create(key, &record);
                }
            }
        }

        for change in digest.items {
            if is_local_edit(&change.old, &change.new, self.config.require_timestamp_change) {
                self.update(change.key, &change.old, &change.new);
            }
        }
    }

    fn create(&mut self, key: ItemKey, record: &Record) {
        let payload = record.to_value();
        let intent = self
            .outbox
            .lock()
            .enqueue(IntentKind::Create, key, None, payload.clone());
        debug!(resource = %self.resource, item = %key, intent, "Creating record");

        let transport = self.transport.clone();
        let resource = self.resource.clone();
        self.spawn_request(async move {
            let result = async {
                let created = transport
                    .request(Request::put(resource.create_path(), payload))
                    .await?;
                let id = created
                    .get("id")
                    .filter(|id| !id.is_null())
                    .cloned()
                    .ok_or_else(|| {
                        Error::InvalidResponse("create response carries no id".into())
                    })?;
                let canonical = transport
                    .request(Request::get(resource.find_one_path(&id), json!({})))
                    .await?;
                Record::from_value(canonical)
            }
            .await;
            Completion::Created {
                intent,
                key,
                result,
            }
        });
    }

    fn update(&mut self, key: ItemKey, old: &Record, new: &Record) {
        let Some(id) = old.id().cloned() else {
            return;
        };
        let payload = new.to_value();
        let intent =
            self.outbox
                .lock()
                .enqueue(IntentKind::Update, key, Some(id.clone()), payload.clone());
        debug!(resource = %self.resource, item = %key, intent, "Updating record");

        let transport = self.transport.clone();
        let path = self.resource.update_path(&id);
        self.spawn_request(async move {
            let result = transport
                .request(Request::post(path, payload))
                .await
                .map(|_| ());
            Completion::Updated { intent, result }
        });
    }

    fn destroy(&mut self, key: ItemKey, record: &Record) {
        if !record.has_id() {
            trace!(resource = %self.resource, item = %key, "Removed record was never persisted");
            return;
        }
        let Some(id) = record.id().cloned() else {
            return;
        };
        let intent =
            self.outbox
                .lock()
                .enqueue(IntentKind::Destroy, key, Some(id.clone()), Value::Null);
        debug!(resource = %self.resource, item = %key, intent, "Destroying record");

        let transport = self.transport.clone();
        let resource = self.resource.clone();
        let confirm = self.config.confirm_before_destroy;
        self.spawn_request(async move {
            let result = async {
                if confirm {
                    let lookup = transport
                        .request(Request::get(resource.find_path(), json!({ "id": id })))
                        .await;
                    let exists = match lookup {
                        Ok(found) => exists_on_backend(&found),
                        Err(Error::NotFound(_)) => false,
                        Err(e) => return Err(e),
                    };
                    if !exists {
                        return Ok(false);
                    }
                }
                transport
                    .request(Request::delete(resource.destroy_path(&id)))
                    .await?;
                Ok(true)
            }
            .await;
            Completion::Destroyed { intent, result }
        });
    }

    fn spawn_request<F>(&mut self, request: F)
    where
        F: Future<Output = Completion> + Send + 'static,
    {
        self.in_flight += 1;
        let completions = self.completions.clone();
        tokio::spawn(async move {
            let _ = completions.send(request.await);
        });
    }

    fn handle_completion(&mut self, completion: Completion) {
        self.in_flight = self.in_flight.saturating_sub(1);

        match completion {
            Completion::Created {
                intent,
                key,
                result: Ok(canonical),
            } => {
                let id = canonical.id().cloned();
                let watches = &mut self.watches;
                let outcome = self.scope.apply(&self.collection, |collection| {
                    let local = watches.digest(collection);
                    let present = merge_created(collection, key, &canonical);
                    let remote = watches.digest_as(collection, Origin::Remote);
                    (local, remote, present)
                });
                self.outbox.lock().confirm(intent, id.clone());

                match outcome {
                    Some((local, remote, present)) => {
                        if present {
                            debug!(resource = %self.resource, item = %key, id = ?id, "Record created");
                        } else {
                            warn!(
                                resource = %self.resource,
                                id = ?id,
                                "Created record was removed locally before the server answered"
                            );
                        }
                        self.propagate(local);
                        self.propagate(remote);
                    }
                    None => {
                        warn!(collection = %self.collection, "Bound collection missing from scope");
                    }
                }
            }
            Completion::Created {
                intent,
                result: Err(e),
                ..
            } => {
                warn!(resource = %self.resource, intent, "Create failed: {}", e);
                self.outbox.lock().fail(intent, e.to_string());
            }
            Completion::Updated { intent, result } => match result {
                Ok(()) => self.outbox.lock().confirm(intent, None),
                Err(e) => {
                    warn!(resource = %self.resource, intent, "Update failed: {}", e);
                    self.outbox.lock().fail(intent, e.to_string());
                }
            },
            Completion::Destroyed { intent, result } => match result {
                Ok(true) => self.outbox.lock().confirm(intent, None),
                Ok(false) => {
                    debug!(resource = %self.resource, intent, "Record already gone from server");
                    self.outbox.lock().skip(intent);
                }
                Err(e) => {
                    warn!(resource = %self.resource, intent, "Destroy failed: {}", e);
                    self.outbox.lock().fail(intent, e.to_string());
                }
            },
        }
    }
}

/// Merge the server's copy of a created record onto the item `key` that
/// asked for it. A copy of the same record already appended by its `created`
/// event is folded into that item and removed. Returns false if `key` is gone.
fn merge_created(collection: &mut BoundCollection, key: ItemKey, canonical: &Record) -> bool {
    if collection.get(key).is_none() {
        return false;
    }
    let echo = canonical
        .id()
        .and_then(|id| collection.find_by_id(id))
        .filter(|found| *found != key)
        .and_then(|found| collection.remove(found));
    match collection.get_mut(key) {
        Some(item) => {
            if let Some(echo) = echo {
                item.merge(echo.fields());
            }
            item.merge(canonical.fields());
            true
        }
        None => false,
    }
}

/// Normalize the initial fetch response to a list of records.
fn normalize(response: Value) -> Result<Vec<Record>> {
    match response {
        Value::Array(items) => items.into_iter().map(Record::from_value).collect(),
        Value::Null => Ok(Vec::new()),
        object @ Value::Object(_) => Ok(vec![Record::from_value(object)?]),
        other => Err(Error::InvalidResponse(format!(
            "expected records, got {}",
            kind_of(&other)
        ))),
    }
}

/// Apply a remote event to the collection. Returns whether anything matched.
fn apply_remote(collection: &mut BoundCollection, event: RemoteEvent) -> bool {
    match event {
        RemoteEvent::Created { record } => {
            let existing = record.id().and_then(|id| collection.find_by_id(id));
            match existing.and_then(|key| collection.get_mut(key)) {
                Some(item) => item.merge(record.fields()),
                None => {
                    collection.push(record);
                }
            }
            true
        }
        RemoteEvent::Updated { id, data } => {
            match collection
                .find_by_id(&id)
                .and_then(|key| collection.get_mut(key))
            {
                Some(item) => {
                    item.merge(&data);
                    true
                }
                None => false,
            }
        }
        RemoteEvent::Destroyed { id } => match collection.find_by_id(&id) {
            Some(key) => collection.remove(key).is_some(),
            None => false,
        },
        RemoteEvent::Unknown { .. } => false,
    }
}

/// Decide whether an observed item change is a local edit worth sending.
fn is_local_edit(old: &Record, new: &Record, require_timestamp_change: bool) -> bool {
    if old == new {
        return false;
    }
    match (old.numeric_id(), new.numeric_id()) {
        (Some(a), Some(b)) if a == b => {}
        _ => return false,
    }
    !(require_timestamp_change && old.updated_at() == new.updated_at())
}

/// Interpret a lookup response: present and not an error body.
fn exists_on_backend(found: &Value) -> bool {
    match found {
        Value::Null => false,
        Value::Array(items) => !items.is_empty(),
        Value::Object(fields) => !fields.contains_key("error"),
        _ => true,
    }
}
