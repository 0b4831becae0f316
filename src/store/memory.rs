use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard,
    },
};

use async_trait::async_trait;
use futures_util::FutureExt;
use serde_json::Value;
use tokio::sync::broadcast;

use super::{
    generate_id, resolve_server_timestamps, Clock, CollectionPath, DocPath, Document, DocumentStore, Query,
    StoreError, StoreResult, Subscription,
};

#[derive(Default)]
struct State {
    clock: Clock,
    // insertion order doubles as the tie breaker for ordered queries
    collections: HashMap<CollectionPath, Vec<Document>>,
    unavailable: HashSet<CollectionPath>,
}

struct Inner {
    state: Mutex<State>,
    changes: broadcast::Sender<CollectionPath>,
    create_calls: AtomicU64,
    writes: AtomicU64,
}

/// In-process [`DocumentStore`] with the same semantics as [`super::SqliteStore`].
///
/// Collections can be marked unavailable to exercise failure paths; every
/// operation touching them then fails with [`StoreError::Transient`].
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                changes: broadcast::channel(256).0,
                create_calls: AtomicU64::new(0),
                writes: AtomicU64::new(0),
            }),
        }
    }

    pub fn set_unavailable(&self, collection: &CollectionPath, unavailable: bool) {
        let mut state = self.lock();
        if unavailable {
            state.unavailable.insert(collection.clone());
        } else {
            state.unavailable.remove(collection);
        }
    }

    /// Number of conditional creates issued, successful or not.
    pub fn create_calls(&self) -> u64 {
        self.inner.create_calls.load(Ordering::Relaxed)
    }

    /// Number of writes that changed the store.
    pub fn writes(&self) -> u64 {
        self.inner.writes.load(Ordering::Relaxed)
    }

    pub fn len(&self, collection: &CollectionPath) -> usize {
        self.lock().collections.get(collection).map_or(0, Vec::len)
    }

    pub fn is_empty(&self, collection: &CollectionPath) -> bool {
        self.len(collection) == 0
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // a panicking test must not wedge every other user of the store
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn available(&self, collection: &CollectionPath) -> StoreResult<MutexGuard<'_, State>> {
        let state = self.lock();
        if state.unavailable.contains(collection) {
            return Err(StoreError::Transient(format!("{collection} is unavailable")));
        }
        Ok(state)
    }

    fn committed(&self, collection: &CollectionPath) {
        self.inner.writes.fetch_add(1, Ordering::Relaxed);
        let _ = self.inner.changes.send(collection.clone());
    }

    fn read(&self, collection: &CollectionPath, query: &Query) -> StoreResult<Vec<Document>> {
        let state = self.available(collection)?;
        let mut docs: Vec<Document> = state
            .collections
            .get(collection)
            .into_iter()
            .flatten()
            .filter(|doc| query.filter.as_ref().is_none_or(|f| f.matches(&doc.data)))
            .cloned()
            .collect();
        if let Some(order) = &query.order {
            docs.sort_by(|a, b| order.compare(&a.data, &b.data));
        }
        Ok(docs)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, path: &DocPath) -> StoreResult<Option<Document>> {
        let state = self.available(&path.collection)?;
        Ok(state
            .collections
            .get(&path.collection)
            .and_then(|docs| docs.iter().find(|doc| doc.id == path.id))
            .cloned())
    }

    async fn query(&self, collection: &CollectionPath, query: &Query) -> StoreResult<Vec<Document>> {
        self.read(collection, query)
    }

    async fn create(&self, path: &DocPath, mut data: Value) -> StoreResult<bool> {
        self.inner.create_calls.fetch_add(1, Ordering::Relaxed);
        {
            let mut state = self.available(&path.collection)?;
            let now = state.clock.tick();
            let docs = state.collections.entry(path.collection.clone()).or_default();
            if docs.iter().any(|doc| doc.id == path.id) {
                return Ok(false);
            }
            resolve_server_timestamps(&mut data, now);
            docs.push(Document {
                id: path.id.clone(),
                data,
            });
        }
        self.committed(&path.collection);
        Ok(true)
    }

    async fn set(&self, path: &DocPath, mut data: Value, merge: bool) -> StoreResult<()> {
        {
            let mut state = self.available(&path.collection)?;
            let now = state.clock.tick();
            resolve_server_timestamps(&mut data, now);
            let docs = state.collections.entry(path.collection.clone()).or_default();
            match docs.iter_mut().find(|doc| doc.id == path.id) {
                Some(doc) if merge => merge_patch(&mut doc.data, data),
                Some(doc) => doc.data = data,
                None => docs.push(Document {
                    id: path.id.clone(),
                    data,
                }),
            }
        }
        self.committed(&path.collection);
        Ok(())
    }

    async fn add(&self, collection: &CollectionPath, mut data: Value) -> StoreResult<Document> {
        let doc = {
            let mut state = self.available(collection)?;
            let now = state.clock.tick();
            resolve_server_timestamps(&mut data, now);
            let doc = Document {
                id: generate_id(),
                data,
            };
            state.collections.entry(collection.clone()).or_default().push(doc.clone());
            doc
        };
        self.committed(collection);
        Ok(doc)
    }

    async fn delete(&self, path: &DocPath) -> StoreResult<()> {
        let removed = {
            let mut state = self.available(&path.collection)?;
            let Some(docs) = state.collections.get_mut(&path.collection) else {
                return Ok(());
            };
            let before = docs.len();
            docs.retain(|doc| doc.id != path.id);
            before != docs.len()
        };
        if removed {
            self.committed(&path.collection);
        }
        Ok(())
    }

    async fn subscribe(&self, collection: &CollectionPath, query: &Query) -> StoreResult<Subscription> {
        drop(self.available(collection)?);
        let changes = self.inner.changes.subscribe();
        let store = self.clone();
        let watched = collection.clone();
        let query = query.clone();
        Ok(Subscription::watch(collection.clone(), changes, move || {
            let result = store.read(&watched, &query);
            async move { result }.boxed()
        }))
    }
}

/// RFC 7396 merge patch, matching sqlite's `json_patch`.
fn merge_patch(target: &mut Value, patch: Value) {
    let Value::Object(patch) = patch else {
        *target = patch;
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Default::default());
    }
    if let Value::Object(target) = target {
        for (key, value) in patch {
            if value.is_null() {
                target.remove(&key);
            } else {
                merge_patch(target.entry(key).or_insert(Value::Null), value);
            }
        }
    }
}
