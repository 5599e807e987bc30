/// SQLite-backed record store
///
/// Every collection lives in one `record` table; documents are stored as
/// JSON text and filtered with `json_extract`.
use crate::{
    db::{self, DatabaseOptions},
    error::{FlockError, FlockResult},
    store::{Collection, Direction, FilterOp, Query, RecordStore},
};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::path::Path;

/// Max ids bound into one DELETE statement
const DELETE_CHUNK: usize = 500;

/// Record store over a SQLite pool
#[derive(Clone)]
pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    /// Wrap an existing pool; migrations must already have run
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (or create) a database file, run migrations and test the connection
    pub async fn open(path: &Path, options: DatabaseOptions) -> FlockResult<Self> {
        let pool = db::create_pool(path, options).await?;
        db::run_migrations(&pool).await?;
        db::test_connection(&pool).await?;

        tracing::info!("Opened SQLite record store at {}", path.display());

        Ok(Self::new(pool))
    }
}

fn field_expr(field: &str) -> String {
    format!("json_extract(body, '$.{}')", field)
}

fn push_value(qb: &mut QueryBuilder<'_, Sqlite>, value: &Value) -> FlockResult<()> {
    match value {
        Value::String(s) => {
            qb.push_bind(s.clone());
        }
        Value::Bool(b) => {
            qb.push_bind(i64::from(*b));
        }
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                qb.push_bind(i);
            } else if let Some(f) = n.as_f64() {
                qb.push_bind(f);
            } else {
                return Err(FlockError::Store(format!("Unsupported number: {}", n)));
            }
        }
        other => {
            return Err(FlockError::Store(format!(
                "Unsupported filter value: {}",
                other
            )))
        }
    }

    Ok(())
}

/// Append `WHERE collection = ? AND <filters>` to the builder
fn push_filters(
    qb: &mut QueryBuilder<'_, Sqlite>,
    collection: Collection,
    query: &Query,
) -> FlockResult<()> {
    query.validate()?;

    qb.push(" WHERE collection = ");
    qb.push_bind(collection.as_str());

    for filter in &query.filters {
        qb.push(" AND ");
        qb.push(field_expr(filter.field));

        match &filter.op {
            FilterOp::Eq(value) => {
                qb.push(" = ");
                push_value(qb, value)?;
            }
            FilterOp::In(values) => {
                // One bound JSON array keeps large sets under SQLite's variable limit
                if let Some(bad) = values
                    .iter()
                    .find(|v| !matches!(v, Value::String(_) | Value::Bool(_) | Value::Number(_)))
                {
                    return Err(FlockError::Store(format!("Unsupported filter value: {}", bad)));
                }
                qb.push(" IN (SELECT value FROM json_each(");
                qb.push_bind(serde_json::to_string(values)?);
                qb.push("))");
            }
            FilterOp::Gte(value) => {
                qb.push(" >= ");
                push_value(qb, value)?;
            }
            FilterOp::Lte(value) => {
                qb.push(" <= ");
                push_value(qb, value)?;
            }
        }
    }

    Ok(())
}

fn push_order_and_limit(qb: &mut QueryBuilder<'_, Sqlite>, query: &Query) {
    qb.push(" ORDER BY ");
    if let Some((field, direction)) = query.order_by {
        qb.push(field_expr(field));
        qb.push(match direction {
            Direction::Asc => " ASC, ",
            Direction::Desc => " DESC, ",
        });
    }
    qb.push("id ASC");

    if let Some(limit) = query.limit {
        qb.push(" LIMIT ");
        qb.push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn get(&self, collection: Collection, id: &str) -> FlockResult<Option<Value>> {
        let row = sqlx::query("SELECT body FROM record WHERE collection = ?1 AND id = ?2")
            .bind(collection.as_str())
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let body: String = row.get("body");
                Ok(Some(serde_json::from_str(&body)?))
            }
            None => Ok(None),
        }
    }

    async fn exists(&self, collection: Collection, id: &str) -> FlockResult<bool> {
        let found: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM record WHERE collection = ?1 AND id = ?2")
                .bind(collection.as_str())
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(found.is_some())
    }

    async fn put(&self, collection: Collection, id: &str, record: Value) -> FlockResult<()> {
        sqlx::query(
            "INSERT INTO record (collection, id, body) VALUES (?1, ?2, ?3)
             ON CONFLICT(collection, id) DO UPDATE SET body = excluded.body",
        )
        .bind(collection.as_str())
        .bind(id)
        .bind(record.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn insert(&self, collection: Collection, id: &str, record: Value) -> FlockResult<bool> {
        let result =
            sqlx::query("INSERT OR IGNORE INTO record (collection, id, body) VALUES (?1, ?2, ?3)")
                .bind(collection.as_str())
                .bind(id)
                .bind(record.to_string())
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete(&self, collection: Collection, id: &str) -> FlockResult<bool> {
        let result = sqlx::query("DELETE FROM record WHERE collection = ?1 AND id = ?2")
            .bind(collection.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_many(&self, collection: Collection, ids: &[String]) -> FlockResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut deleted = 0;

        for chunk in ids.chunks(DELETE_CHUNK) {
            let mut qb = QueryBuilder::<Sqlite>::new("DELETE FROM record WHERE collection = ");
            qb.push_bind(collection.as_str());
            qb.push(" AND id IN (");
            let mut separated = qb.separated(", ");
            for id in chunk {
                separated.push_bind(id.clone());
            }
            separated.push_unseparated(")");

            deleted += qb.build().execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;

        Ok(deleted)
    }

    async fn query(&self, collection: Collection, query: &Query) -> FlockResult<Vec<Value>> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT body FROM record");
        push_filters(&mut qb, collection, query)?;
        push_order_and_limit(&mut qb, query);

        tracing::debug!(collection = collection.as_str(), sql = qb.sql(), "Running document query");

        let rows = qb.build().fetch_all(&self.pool).await?;

        rows.iter()
            .map(|row| {
                let body: String = row.get("body");
                serde_json::from_str(&body).map_err(FlockError::from)
            })
            .collect()
    }

    async fn query_ids(&self, collection: Collection, query: &Query) -> FlockResult<Vec<String>> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT id FROM record");
        push_filters(&mut qb, collection, query)?;
        push_order_and_limit(&mut qb, query);

        let ids = qb.build_query_scalar::<String>().fetch_all(&self.pool).await?;

        Ok(ids)
    }

    async fn count(&self, collection: Collection, query: &Query) -> FlockResult<u64> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM record");
        push_filters(&mut qb, collection, query)?;

        let count = qb.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

        Ok(count.max(0) as u64)
    }
}
