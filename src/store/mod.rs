/// Record Store
///
/// Document storage consumed by the social core: point operations by id
/// inside a named collection, plus filtered queries with a single sort key
/// and a limit. Supports multiple backend implementations (SQLite, memory).

pub mod memory;
pub mod sqlite;

pub use memory::MemoryRecordStore;
pub use sqlite::SqliteRecordStore;

use crate::error::{FlockError, FlockResult};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

/// Named collections of documents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    Accounts,
    Posts,
    Retweets,
    Likes,
    Follows,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Accounts => "accounts",
            Collection::Posts => "posts",
            Collection::Retweets => "retweets",
            Collection::Likes => "likes",
            Collection::Follows => "follows",
        }
    }
}

/// A typed document living in exactly one collection
pub trait Record: Serialize + DeserializeOwned + Send + Sync {
    const COLLECTION: Collection;

    fn record_id(&self) -> String;
}

/// Comparison applied to one document field
#[derive(Debug, Clone, PartialEq)]
pub enum FilterOp {
    Eq(Value),
    /// Containment; an empty list is rejected
    In(Vec<Value>),
    Gte(Value),
    Lte(Value),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: &'static str,
    pub op: FilterOp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

/// Filtered query; filters are AND-ed, ties on the sort key break by id ascending
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order_by: Option<(&'static str, Direction)>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: &'static str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            field,
            op: FilterOp::Eq(value.into()),
        });
        self
    }

    pub fn is_in<V: Into<Value>>(mut self, field: &'static str, values: impl IntoIterator<Item = V>) -> Self {
        self.filters.push(Filter {
            field,
            op: FilterOp::In(values.into_iter().map(Into::into).collect()),
        });
        self
    }

    pub fn gte(mut self, field: &'static str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            field,
            op: FilterOp::Gte(value.into()),
        });
        self
    }

    pub fn lte(mut self, field: &'static str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            field,
            op: FilterOp::Lte(value.into()),
        });
        self
    }

    /// Range matching every string starting with `prefix`
    pub fn prefix(self, field: &'static str, prefix: &str) -> Self {
        let upper = format!("{}\u{10FFFF}", prefix);
        self.gte(field, prefix).lte(field, upper)
    }

    pub fn order_by(mut self, field: &'static str, direction: Direction) -> Self {
        self.order_by = Some((field, direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Reject queries no backend should be asked to run
    pub fn validate(&self) -> FlockResult<()> {
        let fields = self
            .filters
            .iter()
            .map(|f| f.field)
            .chain(self.order_by.iter().map(|(field, _)| *field));

        for field in fields {
            if field.is_empty() || !field.chars().all(|c| c.is_ascii_lowercase() || c == '_') {
                return Err(FlockError::Store(format!("Unsupported field name: {:?}", field)));
            }
        }

        for filter in &self.filters {
            match &filter.op {
                FilterOp::In(values) if values.is_empty() => {
                    return Err(FlockError::Store(format!(
                        "Empty containment filter on {}",
                        filter.field
                    )));
                }
                FilterOp::Eq(Value::Null)
                | FilterOp::Gte(Value::Null)
                | FilterOp::Lte(Value::Null) => {
                    return Err(FlockError::Store(format!(
                        "Null comparison on {}",
                        filter.field
                    )));
                }
                _ => {}
            }
        }

        Ok(())
    }
}

/// Record store backend trait
///
/// Implementations hold JSON documents keyed by `(collection, id)`.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Get a document by id
    async fn get(&self, collection: Collection, id: &str) -> FlockResult<Option<Value>>;

    /// Check if a document exists
    async fn exists(&self, collection: Collection, id: &str) -> FlockResult<bool>;

    /// Create or replace a document
    async fn put(&self, collection: Collection, id: &str, record: Value) -> FlockResult<()>;

    /// Create a document only if the id is free; returns false if it already existed
    async fn insert(&self, collection: Collection, id: &str, record: Value) -> FlockResult<bool>;

    /// Delete a document; returns false if it did not exist
    async fn delete(&self, collection: Collection, id: &str) -> FlockResult<bool>;

    /// Delete a batch of documents, returning how many were removed
    async fn delete_many(&self, collection: Collection, ids: &[String]) -> FlockResult<u64>;

    /// Documents matching the query, in query order
    async fn query(&self, collection: Collection, query: &Query) -> FlockResult<Vec<Value>>;

    /// Ids of documents matching the query, in query order
    async fn query_ids(&self, collection: Collection, query: &Query) -> FlockResult<Vec<String>>;

    /// Number of documents matching the filters; order and limit are ignored
    async fn count(&self, collection: Collection, query: &Query) -> FlockResult<u64>;
}

impl dyn RecordStore {
    /// Typed point lookup
    pub async fn fetch<T: Record>(&self, id: &str) -> FlockResult<Option<T>> {
        match self.get(T::COLLECTION, id).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Typed upsert
    pub async fn save<T: Record>(&self, record: &T) -> FlockResult<()> {
        let value = serde_json::to_value(record)?;
        self.put(T::COLLECTION, &record.record_id(), value).await
    }

    /// Typed insert-if-absent
    pub async fn create<T: Record>(&self, record: &T) -> FlockResult<bool> {
        let value = serde_json::to_value(record)?;
        self.insert(T::COLLECTION, &record.record_id(), value).await
    }

    /// Typed filtered query
    pub async fn find<T: Record>(&self, query: &Query) -> FlockResult<Vec<T>> {
        self.query(T::COLLECTION, query)
            .await?
            .into_iter()
            .map(|value| serde_json::from_value(value).map_err(FlockError::from))
            .collect()
    }
}

/// Ordering between JSON field values, following SQLite's cross-type order:
/// missing/null < numbers (booleans count as 0/1) < text < everything else
pub(crate) fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(v: Option<&Value>) -> u8 {
        match v {
            None | Some(Value::Null) => 0,
            Some(Value::Bool(_)) | Some(Value::Number(_)) => 1,
            Some(Value::String(_)) => 2,
            Some(_) => 3,
        }
    }

    fn numeric(v: &Value) -> f64 {
        match v {
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Number(n) => n.as_f64().unwrap_or(0.0),
            _ => 0.0,
        }
    }

    match (a, b) {
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(x), Some(y)) if rank(a) == 1 && rank(b) == 1 => {
            match (x.as_i64(), y.as_i64()) {
                (Some(i), Some(j)) => i.cmp(&j),
                _ => numeric(x).partial_cmp(&numeric(y)).unwrap_or(Ordering::Equal),
            }
        }
        (Some(x), Some(y)) if rank(a) == 3 && rank(b) == 3 => x.to_string().cmp(&y.to_string()),
        _ => rank(a).cmp(&rank(b)),
    }
}
