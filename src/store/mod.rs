//! Document store capability.
//!
//! A schemaless store addressed by `collection/.../id` paths, with equality and
//! array-containment filters, ordering, conditional creation and live queries.

mod memory;
mod sqlite;
mod subscription;

use std::{cmp::Ordering, fmt, sync::Arc};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use thiserror::Error;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use subscription::Subscription;

pub type SharedStore = Arc<dyn DocumentStore>;
pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document not found: {0}")]
    NotFound(String),

    #[error("store unavailable: {0}")]
    Transient(String),

    #[error("store error: {0}")]
    Unknown(String),

    #[error("malformed document: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        use sqlx::Error::*;
        match err {
            RowNotFound => StoreError::NotFound(err.to_string()),
            PoolTimedOut | PoolClosed | Io(_) | WorkerCrashed => StoreError::Transient(err.to_string()),
            other => StoreError::Unknown(other.to_string()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CollectionPath(String);

impl CollectionPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn doc(&self, id: impl Into<String>) -> DocPath {
        DocPath {
            collection: self.clone(),
            id: id.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DocPath {
    pub collection: CollectionPath,
    pub id: String,
}

impl DocPath {
    /// Sub-collection nested under this document.
    pub fn collection(&self, name: &str) -> CollectionPath {
        CollectionPath(format!("{}/{}/{}", self.collection, self.id, name))
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Value,
}

impl Document {
    pub fn decode<T: DeserializeOwned>(&self) -> StoreResult<T> {
        Ok(serde_json::from_value(self.data.clone())?)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    ArrayContains(String, Value),
}

impl Filter {
    fn matches(&self, data: &Value) -> bool {
        match self {
            Filter::Eq(field, value) => data.get(field) == Some(value),
            Filter::ArrayContains(field, value) => data
                .get(field)
                .and_then(Value::as_array)
                .is_some_and(|items| items.contains(value)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

impl OrderBy {
    fn compare(&self, a: &Value, b: &Value) -> Ordering {
        let ord = compare_values(a.get(&self.field), b.get(&self.field));
        match self.direction {
            Direction::Asc => ord,
            Direction::Desc => ord.reverse(),
        }
    }
}

/// Missing fields sort first, then numbers, then strings.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(a)), Some(Value::Number(b))) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        (Some(Value::Number(_)), Some(Value::String(_))) => Ordering::Less,
        (Some(Value::String(_)), Some(Value::Number(_))) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Query {
    pub filter: Option<Filter>,
    pub order: Option<OrderBy>,
}

impl Query {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order = Some(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }
}

const SERVER_VALUE: &str = ".sv";

/// Placeholder replaced with the store clock when the document is written.
pub fn server_timestamp() -> Value {
    json!({ SERVER_VALUE: "timestamp" })
}

fn is_server_timestamp(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|obj| obj.len() == 1 && obj.get(SERVER_VALUE).and_then(Value::as_str) == Some("timestamp"))
}

pub(crate) fn resolve_server_timestamps(data: &mut Value, now: i64) {
    if is_server_timestamp(data) {
        *data = Value::from(now);
        return;
    }
    match data {
        Value::Object(obj) => obj.values_mut().for_each(|v| resolve_server_timestamps(v, now)),
        Value::Array(items) => items.iter_mut().for_each(|v| resolve_server_timestamps(v, now)),
        _ => {}
    }
}

/// Strictly increasing write clock in microseconds since the Unix epoch.
#[derive(Debug, Default)]
pub(crate) struct Clock {
    last: i64,
}

impl Clock {
    pub(crate) fn tick(&mut self) -> i64 {
        let now = (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000) as i64;
        self.last = now.max(self.last + 1);
        self.last
    }
}

pub(crate) fn generate_id() -> String {
    uuid::Uuid::now_v7().simple().to_string()
}

/// Capability over the backing document database.
///
/// Every write that commits notifies live subscriptions on the written
/// collection.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, path: &DocPath) -> StoreResult<Option<Document>>;

    async fn query(&self, collection: &CollectionPath, query: &Query) -> StoreResult<Vec<Document>>;

    /// Writes `data` only if nothing exists at `path`. Returns whether it wrote.
    async fn create(&self, path: &DocPath, data: Value) -> StoreResult<bool>;

    async fn set(&self, path: &DocPath, data: Value, merge: bool) -> StoreResult<()>;

    async fn add(&self, collection: &CollectionPath, data: Value) -> StoreResult<Document>;

    async fn delete(&self, path: &DocPath) -> StoreResult<()>;

    async fn subscribe(&self, collection: &CollectionPath, query: &Query) -> StoreResult<Subscription>;
}
