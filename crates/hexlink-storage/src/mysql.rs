use async_trait::async_trait;
use hexlink_core::error::{Result, StorageError};
use hexlink_core::{ReadStore, Record, RecordStore, ShortCode};
use sqlx::mysql::{MySqlConnection, MySqlRow};
use sqlx::{MySqlPool, Row};
use tracing::debug;

const SCHEMA: &str = include_str!("../ddl/mysql/short_urls.sql");

/// MySQL implementation of the record store contract.
///
/// Soft delete is implemented with `is_deleted`. Reads only return active
/// records. The primary key on `short_code` rejects code collisions and a
/// unique index over a generated hash of the active URL rejects a second
/// active code for the same URL, so both checks are enforced by the database
/// atomically with the insert. Deleted codes are never reused.
#[derive(Debug, Clone)]
pub struct MySqlStore {
    pool: MySqlPool,
}

impl MySqlStore {
    /// Creates a store from an existing MySQL connection pool.
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Creates a store by opening a new MySQL connection pool.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = MySqlPool::connect(database_url)
            .await
            .map_err(map_sqlx_error)?;
        Ok(Self::new(pool))
    }

    /// Creates the `short_urls` table if it does not exist.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    /// Returns a reference to the underlying pool.
    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(sqlx::error::DatabaseError::is_unique_violation)
}

fn map_sqlx_error(err: sqlx::Error) -> StorageError {
    let message = err.to_string();

    match err {
        sqlx::Error::PoolTimedOut => StorageError::Timeout(message),
        sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => StorageError::Unavailable(message),
        sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::TypeNotFound { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::RowNotFound => StorageError::InvalidData(message),
        _ => StorageError::Query(message),
    }
}

fn record_from_row(row: &MySqlRow) -> Result<Record> {
    let short_code: String = row.try_get("short_code").map_err(map_sqlx_error)?;
    Ok(Record {
        original_url: row.try_get("original_url").map_err(map_sqlx_error)?,
        short_code: ShortCode::new_unchecked(short_code),
        correlation_id: row.try_get("correlation_id").map_err(map_sqlx_error)?,
        user_id: row.try_get("user_id").map_err(map_sqlx_error)?,
        is_deleted: row.try_get("is_deleted").map_err(map_sqlx_error)?,
    })
}

async fn insert_one(conn: &mut MySqlConnection, record: &Record) -> Result<()> {
    let result = sqlx::query(
        r#"
        INSERT INTO short_urls (short_code, original_url, correlation_id, user_id, is_deleted)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(record.short_code.as_str())
    .bind(&record.original_url)
    .bind(&record.correlation_id)
    .bind(record.user_id)
    .bind(record.is_deleted)
    .execute(&mut *conn)
    .await;

    match result {
        Ok(_) => Ok(()),
        Err(err) if is_unique_violation(&err) => resolve_conflict(conn, record).await,
        Err(err) => Err(map_sqlx_error(err)),
    }
}

/// Works out which uniqueness rule a rejected insert violated.
///
/// Only an exact replay of a stored record counts as success; a deleted
/// code is never handed out again, not even to its own URL.
async fn resolve_conflict(conn: &mut MySqlConnection, record: &Record) -> Result<()> {
    let owner: Option<(String, bool)> =
        sqlx::query_as("SELECT original_url, is_deleted FROM short_urls WHERE short_code = ?")
            .bind(record.short_code.as_str())
            .fetch_optional(&mut *conn)
            .await
            .map_err(map_sqlx_error)?;

    match owner {
        Some((url, is_deleted)) if url == record.original_url && is_deleted == record.is_deleted => {
            Ok(())
        }
        Some(_) => Err(StorageError::DuplicateShortCode(
            record.short_code.to_string(),
        )),
        None => {
            let existing: Option<String> = sqlx::query_scalar(
                "SELECT short_code FROM short_urls WHERE original_url = ? AND is_deleted = FALSE LIMIT 1",
            )
            .bind(&record.original_url)
            .fetch_optional(&mut *conn)
            .await
            .map_err(map_sqlx_error)?;

            match existing {
                Some(short_code) => Err(StorageError::DuplicateOriginalUrl { short_code }),
                None => Err(StorageError::Query(format!(
                    "unique violation for {} without a conflicting row",
                    record.short_code
                ))),
            }
        }
    }
}

#[async_trait]
impl ReadStore for MySqlStore {
    async fn find_by_original_url(&self, original_url: &str) -> Result<Option<Record>> {
        let row = sqlx::query(
            r#"
            SELECT short_code, original_url, correlation_id, user_id, is_deleted
            FROM short_urls
            WHERE original_url = ?
              AND is_deleted = FALSE
            LIMIT 1
            "#,
        )
        .bind(original_url)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn find_by_short_code(&self, code: &ShortCode) -> Result<Option<Record>> {
        let row = sqlx::query(
            r#"
            SELECT short_code, original_url, correlation_id, user_id, is_deleted
            FROM short_urls
            WHERE short_code = ?
              AND is_deleted = FALSE
            LIMIT 1
            "#,
        )
        .bind(code.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.as_ref().map(record_from_row).transpose()
    }
}

#[async_trait]
impl RecordStore for MySqlStore {
    async fn save(&self, record: Record) -> Result<()> {
        let mut conn = self.pool.acquire().await.map_err(map_sqlx_error)?;
        insert_one(&mut conn, &record).await
    }

    async fn save_batch(&self, records: Vec<Record>) -> Result<Vec<Result<()>>> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        // A failed INSERT only rolls back its own statement in MySQL, so the
        // remaining rows of the transaction are unaffected.
        let mut results = Vec::with_capacity(records.len());
        for record in &records {
            results.push(insert_one(&mut tx, record).await);
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        debug!(
            total = results.len(),
            stored = results.iter().filter(|r| r.is_ok()).count(),
            "saved record batch"
        );
        Ok(results)
    }

    async fn delete(&self, code: &ShortCode, user_id: Option<i64>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE short_urls
            SET is_deleted = TRUE
            WHERE short_code = ?
              AND is_deleted = FALSE
              AND (? IS NULL OR user_id = ?)
            "#,
        )
        .bind(code.as_str())
        .bind(user_id)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_by_user(&self, user_id: i64) -> Result<Vec<Record>> {
        let rows = sqlx::query(
            r#"
            SELECT short_code, original_url, correlation_id, user_id, is_deleted
            FROM short_urls
            WHERE user_id = ?
              AND is_deleted = FALSE
            ORDER BY short_code
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.iter().map(record_from_row).collect()
    }
}
