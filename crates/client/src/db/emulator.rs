//! In-memory document store.
//!
//! Every write publishes the collection name on a broadcast channel; live
//! queries re-run when their collection changes and emit only when their
//! result set differs, matching the hosted database's snapshot behavior.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::{RwLock, broadcast};

use super::{Document, DocumentStore, Query};
use crate::error::BackendError;
use crate::subscription::LiveQuery;

/// Capacity of the change feed. Slow watchers that fall behind re-query.
const CHANGE_FEED_CAPACITY: usize = 64;

type Collections = HashMap<String, BTreeMap<String, Value>>;

/// Document store held in process memory.
///
/// Cheap to clone; clones share the same documents.
#[derive(Clone)]
pub struct EmulatorStore {
    inner: Arc<EmulatorStoreInner>,
}

struct EmulatorStoreInner {
    collections: RwLock<Collections>,
    changes: broadcast::Sender<String>,
}

impl Default for EmulatorStore {
    fn default() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            inner: Arc::new(EmulatorStoreInner {
                collections: RwLock::new(HashMap::new()),
                changes,
            }),
        }
    }
}

impl std::fmt::Debug for EmulatorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmulatorStore").finish_non_exhaustive()
    }
}

impl EmulatorStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents in `collection`.
    pub async fn count(&self, collection: &str) -> usize {
        self.inner
            .collections
            .read()
            .await
            .get(collection)
            .map_or(0, BTreeMap::len)
    }

    /// Number of live queries still attached to the change feed.
    #[must_use]
    pub fn watcher_count(&self) -> usize {
        self.inner.changes.receiver_count()
    }

    /// Wait until at most `count` live queries remain attached.
    ///
    /// Cancelled queries detach once their task has been torn down, which
    /// happens on the next scheduler pass rather than immediately.
    pub async fn settle_watchers(&self, count: usize) {
        while self.watcher_count() > count {
            tokio::task::yield_now().await;
        }
    }

    fn notify(&self, collection: &str) {
        // No receivers just means nobody is watching.
        let _ = self.inner.changes.send(collection.to_string());
    }

    async fn run_query(&self, query: &Query) -> Vec<Document> {
        let collections = self.inner.collections.read().await;
        let Some(docs) = collections.get(&query.collection) else {
            return Vec::new();
        };

        let limit = query
            .limit
            .map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(usize::MAX));
        docs.iter()
            .filter(|(_, data)| query.matches(data))
            .take(limit)
            .map(|(id, data)| Document {
                id: id.clone(),
                data: data.clone(),
            })
            .collect()
    }
}

fn require_object(collection: &str, data: &Value) -> Result<(), BackendError> {
    if data.is_object() {
        Ok(())
    } else {
        Err(BackendError::Malformed {
            path: collection.to_string(),
            reason: "document data must be an object".to_string(),
        })
    }
}

#[async_trait]
impl DocumentStore for EmulatorStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, BackendError> {
        let collections = self.inner.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|data| Document {
                id: id.to_string(),
                data: data.clone(),
            }))
    }

    async fn add(&self, collection: &str, data: Value) -> Result<String, BackendError> {
        require_object(collection, &data)?;
        let id = uuid::Uuid::new_v4().simple().to_string();
        self.inner
            .collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), data);
        self.notify(collection);
        Ok(id)
    }

    async fn set(&self, collection: &str, id: &str, data: Value) -> Result<(), BackendError> {
        require_object(collection, &data)?;
        self.inner
            .collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), data);
        self.notify(collection);
        Ok(())
    }

    async fn increment(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        by: i64,
    ) -> Result<(), BackendError> {
        {
            let mut collections = self.inner.collections.write().await;
            let doc = collections
                .entry(collection.to_string())
                .or_default()
                .entry(id.to_string())
                .or_insert_with(|| Value::Object(Map::new()));

            let Some(object) = doc.as_object_mut() else {
                return Err(BackendError::Malformed {
                    path: format!("{collection}/{id}"),
                    reason: "document data must be an object".to_string(),
                });
            };
            let current = object.get(field).and_then(Value::as_i64).unwrap_or(0);
            object.insert(field.to_string(), Value::from(current.saturating_add(by)));
        }
        self.notify(collection);
        Ok(())
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>, BackendError> {
        Ok(self.run_query(query).await)
    }

    fn watch(&self, query: Query) -> LiveQuery<Vec<Document>> {
        let store = self.clone();
        // Subscribe before the first read so no write can slip in between.
        let mut changes = self.inner.changes.subscribe();

        LiveQuery::spawn(move |tx| async move {
            let mut last = store.run_query(&query).await;
            if tx.send(Ok(last.clone())).await.is_err() {
                return;
            }

            loop {
                match changes.recv().await {
                    Ok(collection) if collection != query.collection => continue,
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                }

                let docs = store.run_query(&query).await;
                if docs == last {
                    continue;
                }
                last = docs.clone();
                if tx.send(Ok(docs)).await.is_err() {
                    break;
                }
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::db::ORDERS;

    async fn next_snapshot(query: &mut LiveQuery<Vec<Document>>) -> Vec<Document> {
        tokio::time::timeout(Duration::from_secs(1), query.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_add_then_get() {
        let store = EmulatorStore::new();
        let id = store.add(ORDERS, json!({"table_no": "05"})).await.unwrap();

        let doc = store.get(ORDERS, &id).await.unwrap().unwrap();
        assert_eq!(doc.data, json!({"table_no": "05"}));
        assert!(store.get(ORDERS, "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_add_rejects_non_object() {
        let store = EmulatorStore::new();
        assert!(store.add(ORDERS, json!("nope")).await.is_err());
        assert_eq!(store.count(ORDERS).await, 0);
    }

    #[tokio::test]
    async fn test_increment_creates_and_adds() {
        let store = EmulatorStore::new();
        store.increment("users", "u1", "points", 5).await.unwrap();
        store.increment("users", "u1", "points", 3).await.unwrap();

        let doc = store.get("users", "u1").await.unwrap().unwrap();
        assert_eq!(doc.data, json!({"points": 8}));
    }

    #[tokio::test]
    async fn test_query_filters_and_limits() {
        let store = EmulatorStore::new();
        store.set(ORDERS, "a", json!({"table_no": "05"})).await.unwrap();
        store.set(ORDERS, "b", json!({"table_no": "06"})).await.unwrap();
        store.set(ORDERS, "c", json!({"table_no": "05"})).await.unwrap();

        let docs = store
            .query(&Query::collection(ORDERS).where_eq("table_no", "05"))
            .await
            .unwrap();
        let ids: Vec<_> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, ["a", "c"]);

        let limited = store
            .query(&Query::collection(ORDERS).where_eq("table_no", "05").limit(1))
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn test_watch_delivers_initial_snapshot_then_changes() {
        let store = EmulatorStore::new();
        store.set(ORDERS, "a", json!({"table_no": "05"})).await.unwrap();

        let mut live = store.watch(Query::collection(ORDERS).where_eq("table_no", "05"));
        assert_eq!(next_snapshot(&mut live).await.len(), 1);

        store.set(ORDERS, "b", json!({"table_no": "05"})).await.unwrap();
        assert_eq!(next_snapshot(&mut live).await.len(), 2);
    }

    #[tokio::test]
    async fn test_watch_ignores_unrelated_writes() {
        let store = EmulatorStore::new();
        let mut live = store.watch(Query::collection(ORDERS).where_eq("table_no", "05"));
        assert!(next_snapshot(&mut live).await.is_empty());

        // Neither write changes the result set.
        store.set("coupons", "X", json!({"code": "X"})).await.unwrap();
        store.set(ORDERS, "b", json!({"table_no": "06"})).await.unwrap();
        store.set(ORDERS, "c", json!({"table_no": "05"})).await.unwrap();

        let docs = next_snapshot(&mut live).await;
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, "c");
    }

    #[tokio::test]
    async fn test_cancelled_watch_detaches() {
        let store = EmulatorStore::new();
        let mut live = store.watch(Query::collection(ORDERS));
        next_snapshot(&mut live).await;
        assert!(live.is_active());
        assert_eq!(store.watcher_count(), 1);

        live.cancel();

        tokio::time::timeout(Duration::from_secs(1), store.settle_watchers(0))
            .await
            .unwrap();
        assert_eq!(store.watcher_count(), 0);
    }

    #[tokio::test]
    async fn test_dropped_watch_detaches() {
        let store = EmulatorStore::new();
        let first = store.watch(Query::collection(ORDERS));
        let _second = store.watch(Query::collection(ORDERS));
        assert_eq!(store.watcher_count(), 2);

        drop(first);

        tokio::time::timeout(Duration::from_secs(1), store.settle_watchers(1))
            .await
            .unwrap();
        assert_eq!(store.watcher_count(), 1);
    }
}
