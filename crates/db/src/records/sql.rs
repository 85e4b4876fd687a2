use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection};
use tracing::debug;

use partsmart_core::store::{
    Fields, Filter, FilterOp, Query, Record, RecordId, RecordStore, StoreError, WriteOp,
    FIELD_ACTIVE, FIELD_CREATED_AT, FIELD_ID, FIELD_UPDATED_AT,
};
use partsmart_core::timestamp;

use crate::DbPool;

const RECORD_COLUMNS: &str = "id, fields_json, active, version, created_at, updated_at";

/// Record store over the `record` table. Document bodies are stored as JSON.
pub struct SqlRecordStore {
    pool: DbPool,
}

impl SqlRecordStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl RecordStore for SqlRecordStore {
    async fn get_by_id(
        &self,
        collection: &str,
        id: &RecordId,
    ) -> Result<Option<Record>, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(unavailable)?;
        fetch_record(&mut *conn, collection, id).await
    }

    async fn query(&self, collection: &str, query: Query) -> Result<Vec<Record>, StoreError> {
        let mut builder: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new(format!("SELECT {RECORD_COLUMNS} FROM record WHERE collection = "));
        builder.push_bind(collection.to_owned());

        // Plain string equality narrows the scan in SQL; the full query is
        // re-evaluated below so pushed-down filters only ever over-select.
        for filter in query.filters() {
            if let Some(value) = pushable_equality(filter) {
                builder
                    .push(" AND json_extract(fields_json, ")
                    .push_bind(format!("$.{}", filter.field))
                    .push(") = ")
                    .push_bind(value.to_owned());
            }
        }
        builder.push(" ORDER BY created_at ASC, id ASC");

        let rows = builder.build().fetch_all(&self.pool).await.map_err(unavailable)?;
        let records = rows.into_iter().map(record_from_row).collect::<Result<Vec<_>, _>>()?;
        Ok(query.apply(records))
    }

    async fn batch_write(&self, operations: Vec<WriteOp>) -> Result<(), StoreError> {
        let now = Utc::now();
        // IMMEDIATE takes the write lock up front, so concurrent writers queue on
        // `busy_timeout` instead of failing when their read snapshot goes stale.
        let mut tx = self
            .pool
            .begin_with("BEGIN IMMEDIATE")
            .await
            .map_err(|error| write_failure(error, &operations))?;

        for operation in &operations {
            let current = fetch_record(&mut *tx, operation.collection(), operation.id()).await?;
            let next = operation.apply(current.as_ref(), now)?;
            match (current, next) {
                (None, Some(created)) => insert_record(&mut *tx, operation, &created).await?,
                (Some(previous), Some(updated)) => {
                    update_record(&mut *tx, operation, previous.version, &updated).await?
                }
                (Some(_), None) => delete_record(&mut *tx, operation).await?,
                (None, None) => {}
            }
        }

        tx.commit().await.map_err(|error| write_failure(error, &operations))?;
        debug!(
            event_name = "store.sql.batch_committed",
            operations = operations.len(),
            "record batch committed"
        );
        Ok(())
    }
}

async fn fetch_record(
    conn: &mut SqliteConnection,
    collection: &str,
    id: &RecordId,
) -> Result<Option<Record>, StoreError> {
    let row = sqlx::query(&format!(
        "SELECT {RECORD_COLUMNS} FROM record WHERE collection = ? AND id = ?"
    ))
    .bind(collection)
    .bind(id.as_str())
    .fetch_optional(&mut *conn)
    .await
    .map_err(unavailable)?;

    row.map(record_from_row).transpose()
}

async fn insert_record(
    conn: &mut SqliteConnection,
    operation: &WriteOp,
    record: &Record,
) -> Result<(), StoreError> {
    let result = sqlx::query(
        "INSERT INTO record (collection, id, fields_json, active, version, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(operation.collection())
    .bind(record.id.as_str())
    .bind(fields_json(&record.fields)?)
    .bind(record.active)
    .bind(version_column(record.version)?)
    .bind(record.created_at.to_rfc3339())
    .bind(record.updated_at.to_rfc3339())
    .execute(&mut *conn)
    .await;

    match result {
        Ok(_) => Ok(()),
        Err(sqlx::Error::Database(error)) if error.is_unique_violation() => {
            Err(StoreError::AlreadyExists {
                collection: operation.collection().to_owned(),
                id: operation.id().clone(),
            })
        }
        Err(error) => Err(unavailable(error)),
    }
}

async fn update_record(
    conn: &mut SqliteConnection,
    operation: &WriteOp,
    expected_version: u64,
    record: &Record,
) -> Result<(), StoreError> {
    let updated = sqlx::query(
        "UPDATE record
         SET fields_json = ?, active = ?, version = ?, updated_at = ?
         WHERE collection = ? AND id = ? AND version = ?",
    )
    .bind(fields_json(&record.fields)?)
    .bind(record.active)
    .bind(version_column(record.version)?)
    .bind(record.updated_at.to_rfc3339())
    .bind(operation.collection())
    .bind(record.id.as_str())
    .bind(version_column(expected_version)?)
    .execute(&mut *conn)
    .await
    .map_err(unavailable)?;

    if updated.rows_affected() == 0 {
        return Err(StoreError::PreconditionFailed {
            collection: operation.collection().to_owned(),
            id: operation.id().clone(),
            field: "version".to_owned(),
            actual: format!("no longer {expected_version}"),
        });
    }
    Ok(())
}

async fn delete_record(conn: &mut SqliteConnection, operation: &WriteOp) -> Result<(), StoreError> {
    sqlx::query("DELETE FROM record WHERE collection = ? AND id = ?")
        .bind(operation.collection())
        .bind(operation.id().as_str())
        .execute(&mut *conn)
        .await
        .map_err(unavailable)?;
    Ok(())
}

fn record_from_row(row: SqliteRow) -> Result<Record, StoreError> {
    let id: String = row.try_get("id").map_err(unavailable)?;
    let raw_fields: String = row.try_get("fields_json").map_err(unavailable)?;
    let fields = serde_json::from_str::<Fields>(&raw_fields)
        .map_err(|error| StoreError::Decode(format!("record `{id}` has invalid fields: {error}")))?;
    let raw_created: String = row.try_get("created_at").map_err(unavailable)?;
    let raw_updated: String = row.try_get("updated_at").map_err(unavailable)?;
    let created_at = parse_timestamp(&id, "created_at", raw_created)?;
    let updated_at = parse_timestamp(&id, "updated_at", raw_updated)?;
    let active: bool = row.try_get("active").map_err(unavailable)?;
    let version: i64 = row.try_get("version").map_err(unavailable)?;
    let version = u64::try_from(version)
        .map_err(|_| StoreError::Decode(format!("record `{id}` has negative version")))?;

    Ok(Record { id: RecordId(id), created_at, updated_at, active, version, fields })
}

fn parse_timestamp(
    id: &str,
    column: &str,
    raw: String,
) -> Result<chrono::DateTime<Utc>, StoreError> {
    timestamp::parse_str(&raw).ok_or_else(|| {
        StoreError::Decode(format!("record `{id}` has invalid {column} `{raw}`"))
    })
}

fn fields_json(fields: &Fields) -> Result<String, StoreError> {
    serde_json::to_string(fields).map_err(|error| StoreError::Decode(error.to_string()))
}

fn version_column(version: u64) -> Result<i64, StoreError> {
    i64::try_from(version).map_err(|_| StoreError::Decode(format!("version {version} overflows")))
}

/// Only equality on plain strings is pushed down; timestamps may be stored in
/// several encodings and are compared by value in memory.
fn pushable_equality(filter: &Filter) -> Option<&str> {
    if filter.op != FilterOp::Eq {
        return None;
    }
    if [FIELD_ID, FIELD_CREATED_AT, FIELD_UPDATED_AT, FIELD_ACTIVE].contains(&filter.field.as_str())
    {
        return None;
    }
    if !filter.field.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_') {
        return None;
    }
    match &filter.value {
        Value::String(value) if timestamp::parse_str(value).is_none() => Some(value),
        _ => None,
    }
}

fn unavailable(error: sqlx::Error) -> StoreError {
    StoreError::Unavailable(error.to_string())
}

const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

/// A write lock still held by another writer after `busy_timeout` is a lost
/// race, reported against the first record of the batch.
fn write_failure(error: sqlx::Error, operations: &[WriteOp]) -> StoreError {
    match operations.first() {
        Some(first) if is_lock_contention(&error) => StoreError::PreconditionFailed {
            collection: first.collection().to_owned(),
            id: first.id().clone(),
            field: "write_lock".to_owned(),
            actual: "held by a concurrent writer".to_owned(),
        },
        _ => unavailable(error),
    }
}

fn is_lock_contention(error: &sqlx::Error) -> bool {
    let sqlx::Error::Database(error) = error else {
        return false;
    };
    // Extended codes (e.g. 517 BUSY_SNAPSHOT) keep the primary code in the low byte.
    error
        .code()
        .and_then(|code| code.parse::<i32>().ok())
        .is_some_and(|code| matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED))
}
