/// In-memory record store
///
/// Mirrors the query semantics of the SQLite store (cross-type ordering,
/// id tie-break, rejection of empty containment filters) so the social core
/// can be exercised without a database.
use crate::{
    error::FlockResult,
    store::{compare_values, Collection, Direction, Filter, FilterOp, Query, RecordStore},
};
use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

type Documents = BTreeMap<String, Value>;

/// Record store holding every collection in process memory
#[derive(Default)]
pub struct MemoryRecordStore {
    collections: RwLock<HashMap<Collection, Documents>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn matches_filter(doc: &Value, filter: &Filter) -> bool {
    let field = doc.get(filter.field).filter(|v| !v.is_null());
    let Some(field) = field else {
        return false;
    };

    let cmp = |other: &Value| compare_values(Some(field), Some(other));

    match &filter.op {
        FilterOp::Eq(value) => cmp(value) == Ordering::Equal,
        FilterOp::In(values) => values.iter().any(|v| cmp(v) == Ordering::Equal),
        FilterOp::Gte(value) => cmp(value) != Ordering::Less,
        FilterOp::Lte(value) => cmp(value) != Ordering::Greater,
    }
}

/// Matching `(id, document)` pairs in query order, limit applied
fn select<'a>(docs: Option<&'a Documents>, query: &Query) -> FlockResult<Vec<(&'a String, &'a Value)>> {
    query.validate()?;

    let Some(docs) = docs else {
        return Ok(Vec::new());
    };

    // BTreeMap iteration is id-ascending, and the sort below is stable
    let mut selected: Vec<(&String, &Value)> = docs
        .iter()
        .filter(|(_, doc)| query.filters.iter().all(|f| matches_filter(doc, f)))
        .collect();

    if let Some((field, direction)) = query.order_by {
        selected.sort_by(|(_, a), (_, b)| {
            let ord = compare_values(a.get(field), b.get(field));
            match direction {
                Direction::Asc => ord,
                Direction::Desc => ord.reverse(),
            }
        });
    }

    if let Some(limit) = query.limit {
        selected.truncate(limit);
    }

    Ok(selected)
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn get(&self, collection: Collection, id: &str) -> FlockResult<Option<Value>> {
        let collections = self.collections.read().await;
        Ok(collections.get(&collection).and_then(|docs| docs.get(id)).cloned())
    }

    async fn exists(&self, collection: Collection, id: &str) -> FlockResult<bool> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(&collection)
            .map(|docs| docs.contains_key(id))
            .unwrap_or(false))
    }

    async fn put(&self, collection: Collection, id: &str, record: Value) -> FlockResult<()> {
        let mut collections = self.collections.write().await;
        collections
            .entry(collection)
            .or_default()
            .insert(id.to_string(), record);
        Ok(())
    }

    async fn insert(&self, collection: Collection, id: &str, record: Value) -> FlockResult<bool> {
        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection).or_default();

        if docs.contains_key(id) {
            return Ok(false);
        }
        docs.insert(id.to_string(), record);
        Ok(true)
    }

    async fn delete(&self, collection: Collection, id: &str) -> FlockResult<bool> {
        let mut collections = self.collections.write().await;
        Ok(collections
            .get_mut(&collection)
            .map(|docs| docs.remove(id).is_some())
            .unwrap_or(false))
    }

    async fn delete_many(&self, collection: Collection, ids: &[String]) -> FlockResult<u64> {
        let mut collections = self.collections.write().await;
        let Some(docs) = collections.get_mut(&collection) else {
            return Ok(0);
        };

        Ok(ids.iter().filter(|id| docs.remove(id.as_str()).is_some()).count() as u64)
    }

    async fn query(&self, collection: Collection, query: &Query) -> FlockResult<Vec<Value>> {
        let collections = self.collections.read().await;
        let selected = select(collections.get(&collection), query)?;
        Ok(selected.into_iter().map(|(_, doc)| doc.clone()).collect())
    }

    async fn query_ids(&self, collection: Collection, query: &Query) -> FlockResult<Vec<String>> {
        let collections = self.collections.read().await;
        let selected = select(collections.get(&collection), query)?;
        Ok(selected.into_iter().map(|(id, _)| id.clone()).collect())
    }

    async fn count(&self, collection: Collection, query: &Query) -> FlockResult<u64> {
        let unbounded = Query {
            order_by: None,
            limit: None,
            ..query.clone()
        };

        let collections = self.collections.read().await;
        Ok(select(collections.get(&collection), &unbounded)?.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FlockError;
    use serde_json::json;

    #[tokio::test]
    async fn test_query_matches_sqlite_semantics() {
        let store = MemoryRecordStore::new();

        store.put(Collection::Posts, "b", json!({"author_id": "alice", "created_at": 20})).await.unwrap();
        store.put(Collection::Posts, "a", json!({"author_id": "alice", "created_at": 20})).await.unwrap();
        store.put(Collection::Posts, "c", json!({"author_id": "bob", "created_at": 30})).await.unwrap();
        store.put(Collection::Posts, "d", json!({"author_id": "carol", "created_at": 40})).await.unwrap();
        store.put(Collection::Posts, "e", json!({"author_id": "alice", "reply_to": null, "created_at": 5})).await.unwrap();

        let query = Query::new()
            .is_in("author_id", vec!["alice", "bob"])
            .order_by("created_at", Direction::Desc)
            .limit(3);

        let ids = store.query_ids(Collection::Posts, &query).await.unwrap();
        assert_eq!(ids, vec!["c", "a", "b"]);
        assert_eq!(store.count(Collection::Posts, &query).await.unwrap(), 4);

        // null fields never match an equality filter
        let replies = Query::new().eq("reply_to", "x");
        assert_eq!(store.count(Collection::Posts, &replies).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_insert_and_delete_many() {
        let store = MemoryRecordStore::new();

        assert!(store.insert(Collection::Follows, "k", json!({})).await.unwrap());
        assert!(!store.insert(Collection::Follows, "k", json!({"x": 1})).await.unwrap());
        assert_eq!(store.get(Collection::Follows, "k").await.unwrap(), Some(json!({})));

        let removed = store
            .delete_many(Collection::Follows, &["k".to_string(), "nope".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.delete_many(Collection::Likes, &["k".to_string()]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_rejects_empty_containment() {
        let store = MemoryRecordStore::new();
        let query = Query::new().is_in("author_id", Vec::<String>::new());
        assert!(matches!(
            store.query(Collection::Posts, &query).await,
            Err(FlockError::Store(_))
        ));
    }
}
