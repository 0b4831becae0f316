use std::{str::FromStr, sync::Arc};

use async_trait::async_trait;
use futures_util::FutureExt;
use serde_json::Value;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use tokio::sync::{broadcast, Mutex};

use super::{
    generate_id, resolve_server_timestamps, Clock, CollectionPath, Direction, DocPath, Document, DocumentStore,
    Filter, Query, StoreError, StoreResult, Subscription,
};

const SCHEMA: [&str; 2] = [
    r#"CREATE TABLE IF NOT EXISTS documents (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        collection TEXT NOT NULL,
        id TEXT NOT NULL,
        data TEXT NOT NULL,
        UNIQUE (collection, id)
    )"#,
    "CREATE INDEX IF NOT EXISTS documents_collection ON documents (collection, seq)",
];

/// [`DocumentStore`] over a single sqlite table of JSON documents.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    // held across timestamping and insert so timestamp order is commit order
    clock: Arc<Mutex<Clock>>,
    changes: broadcast::Sender<CollectionPath>,
}

enum Scalar {
    Text(String),
    Int(i64),
    Real(f64),
}

impl Scalar {
    fn from_json(value: &Value) -> StoreResult<Scalar> {
        match value {
            Value::String(s) => Ok(Scalar::Text(s.clone())),
            Value::Bool(b) => Ok(Scalar::Int(*b as i64)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Ok(Scalar::Int(i)),
                None => Ok(Scalar::Real(n.as_f64().unwrap_or_default())),
            },
            other => Err(StoreError::Unknown(format!("cannot filter on {other}"))),
        }
    }
}

fn json_path(field: &str) -> String {
    format!("$.{field}")
}

impl SqliteStore {
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(16)
            .connect_with(options)
            .await?;
        Self::with_pool(pool).await
    }

    /// Private database that lives as long as the store.
    pub async fn in_memory() -> StoreResult<Self> {
        // every connection to :memory: is its own database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Self::with_pool(pool).await
    }

    pub async fn with_pool(pool: SqlitePool) -> StoreResult<Self> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }

        Ok(Self {
            pool,
            clock: Arc::new(Mutex::new(Clock::default())),
            changes: broadcast::channel(256).0,
        })
    }

    fn committed(&self, collection: &CollectionPath) {
        let _ = self.changes.send(collection.clone());
    }

    async fn read(&self, collection: &CollectionPath, query: &Query) -> StoreResult<Vec<Document>> {
        let mut sql = String::from("SELECT id, data FROM documents WHERE collection = ?");
        let mut filter_args = None;
        match &query.filter {
            Some(Filter::Eq(field, value)) => {
                sql += " AND json_extract(data, ?) = ?";
                filter_args = Some((json_path(field), Scalar::from_json(value)?));
            }
            Some(Filter::ArrayContains(field, value)) => {
                sql += " AND EXISTS (SELECT 1 FROM json_each(data, ?) WHERE json_each.value = ?)";
                filter_args = Some((json_path(field), Scalar::from_json(value)?));
            }
            None => {}
        }
        match &query.order {
            Some(order) => {
                sql += match order.direction {
                    Direction::Asc => " ORDER BY json_extract(data, ?) ASC, seq ASC",
                    Direction::Desc => " ORDER BY json_extract(data, ?) DESC, seq ASC",
                };
            }
            None => sql += " ORDER BY seq ASC",
        }

        let mut q = sqlx::query_as::<_, (String, String)>(&sql).bind(collection.as_str());
        if let Some((path, scalar)) = filter_args {
            q = q.bind(path);
            q = match scalar {
                Scalar::Text(s) => q.bind(s),
                Scalar::Int(i) => q.bind(i),
                Scalar::Real(f) => q.bind(f),
            };
        }
        if let Some(order) = &query.order {
            q = q.bind(json_path(&order.field));
        }

        q.fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(|(id, data)| -> StoreResult<Document> {
                Ok(Document {
                    id,
                    data: serde_json::from_str(&data)?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn get(&self, path: &DocPath) -> StoreResult<Option<Document>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT data FROM documents WHERE collection = ? AND id = ?")
            .bind(path.collection.as_str())
            .bind(&path.id)
            .fetch_optional(&self.pool)
            .await?;

        let Some((data,)) = row else {
            return Ok(None);
        };
        Ok(Some(Document {
            id: path.id.clone(),
            data: serde_json::from_str(&data)?,
        }))
    }

    async fn query(&self, collection: &CollectionPath, query: &Query) -> StoreResult<Vec<Document>> {
        self.read(collection, query).await
    }

    async fn create(&self, path: &DocPath, mut data: Value) -> StoreResult<bool> {
        let result = {
            let mut clock = self.clock.lock().await;
            resolve_server_timestamps(&mut data, clock.tick());
            sqlx::query("INSERT INTO documents (collection, id, data) VALUES (?, ?, ?) ON CONFLICT (collection, id) DO NOTHING")
                .bind(path.collection.as_str())
                .bind(&path.id)
                .bind(data.to_string())
                .execute(&self.pool)
                .await?
        };

        let created = result.rows_affected() == 1;
        if created {
            self.committed(&path.collection);
        }
        Ok(created)
    }

    async fn set(&self, path: &DocPath, mut data: Value, merge: bool) -> StoreResult<()> {
        let sql = if merge {
            "INSERT INTO documents (collection, id, data) VALUES (?, ?, ?) \
             ON CONFLICT (collection, id) DO UPDATE SET data = json_patch(documents.data, excluded.data)"
        } else {
            "INSERT INTO documents (collection, id, data) VALUES (?, ?, ?) \
             ON CONFLICT (collection, id) DO UPDATE SET data = excluded.data"
        };

        {
            let mut clock = self.clock.lock().await;
            resolve_server_timestamps(&mut data, clock.tick());
            sqlx::query(sql)
                .bind(path.collection.as_str())
                .bind(&path.id)
                .bind(data.to_string())
                .execute(&self.pool)
                .await?;
        }

        self.committed(&path.collection);
        Ok(())
    }

    async fn add(&self, collection: &CollectionPath, mut data: Value) -> StoreResult<Document> {
        let id = generate_id();
        {
            let mut clock = self.clock.lock().await;
            resolve_server_timestamps(&mut data, clock.tick());
            sqlx::query("INSERT INTO documents (collection, id, data) VALUES (?, ?, ?)")
                .bind(collection.as_str())
                .bind(&id)
                .bind(data.to_string())
                .execute(&self.pool)
                .await?;
        }

        self.committed(collection);
        Ok(Document { id, data })
    }

    async fn delete(&self, path: &DocPath) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM documents WHERE collection = ? AND id = ?")
            .bind(path.collection.as_str())
            .bind(&path.id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() > 0 {
            self.committed(&path.collection);
        }
        Ok(())
    }

    async fn subscribe(&self, collection: &CollectionPath, query: &Query) -> StoreResult<Subscription> {
        let changes = self.changes.subscribe();
        let store = self.clone();
        let watched = collection.clone();
        let query = query.clone();
        Ok(Subscription::watch(collection.clone(), changes, move || {
            let store = store.clone();
            let watched = watched.clone();
            let query = query.clone();
            async move { store.read(&watched, &query).await }.boxed()
        }))
    }
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;
    use serde_json::json;

    use super::*;
    use crate::store::server_timestamp;

    #[tokio::test]
    async fn conditional_create_and_merge() {
        let store = SqliteStore::in_memory().await.unwrap();
        let chat = CollectionPath::new("chats").doc("alice_bob");

        assert!(store.create(&chat, json!({ "participants": ["alice", "bob"] })).await.unwrap());
        assert!(!store.create(&chat, json!({ "participants": ["mallory", "bob"] })).await.unwrap());

        store.set(&chat, json!({ "titles": { "alice": "Bob" } }), true).await.unwrap();
        let doc = store.get(&chat).await.unwrap().unwrap();
        assert_eq!(doc.data, json!({ "participants": ["alice", "bob"], "titles": { "alice": "Bob" } }));

        store.delete(&chat).await.unwrap();
        store.delete(&chat).await.unwrap();
        assert!(store.get(&chat).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn array_contains_and_equality_filters() {
        let store = SqliteStore::in_memory().await.unwrap();
        let chats = CollectionPath::new("chats");
        store.set(&chats.doc("alice_bob"), json!({ "participants": ["alice", "bob"], "open": true }), false).await.unwrap();
        store.set(&chats.doc("bob_carol"), json!({ "participants": ["bob", "carol"], "open": false }), false).await.unwrap();

        let with_alice = Query::all().filter(Filter::ArrayContains("participants".into(), json!("alice")));
        let ids: Vec<_> = store.query(&chats, &with_alice).await.unwrap().into_iter().map(|d| d.id).collect();
        assert_eq!(ids, ["alice_bob"]);

        let open = Query::all().filter(Filter::Eq("open".into(), json!(true)));
        let ids: Vec<_> = store.query(&chats, &open).await.unwrap().into_iter().map(|d| d.id).collect();
        assert_eq!(ids, ["alice_bob"]);
    }

    #[tokio::test]
    async fn server_timestamps_follow_write_order() {
        let store = SqliteStore::in_memory().await.unwrap();
        let messages = CollectionPath::new("chats/alice_bob/messages");
        for text in ["one", "two", "three"] {
            store.add(&messages, json!({ "text": text, "timestamp": server_timestamp() })).await.unwrap();
        }

        let query = Query::all().order_by("timestamp", Direction::Desc);
        let docs = store.query(&messages, &query).await.unwrap();
        let texts: Vec<_> = docs.iter().map(|d| d.data["text"].as_str().unwrap()).collect();
        assert_eq!(texts, ["three", "two", "one"]);
    }

    #[tokio::test]
    async fn subscription_stops_after_detach() {
        let store = SqliteStore::in_memory().await.unwrap();
        let messages = CollectionPath::new("chats/alice_bob/messages");

        let mut sub = store.subscribe(&messages, &Query::all()).await.unwrap();
        assert!(sub.next().await.unwrap().unwrap().is_empty());

        store.add(&messages, json!({ "text": "hi" })).await.unwrap();
        assert_eq!(sub.next().await.unwrap().unwrap().len(), 1);

        sub.detach();
        store.add(&messages, json!({ "text": "again" })).await.unwrap();
        assert_eq!(store.query(&messages, &Query::all()).await.unwrap().len(), 2);
    }
}
