use crate::error::Result;
use crate::record::Record;
use crate::shortcode::ShortCode;
use async_trait::async_trait;

/// A read-only view of a record store.
///
/// This trait provides only the lookup operations from [`RecordStore`],
/// allowing services like the redirector to have read-only access.
/// Both lookups only ever return active (non-deleted) records.
#[async_trait]
pub trait ReadStore: Send + Sync + 'static {
    /// Returns the active record for the given original URL.
    async fn find_by_original_url(&self, original_url: &str) -> Result<Option<Record>>;

    /// Returns the active record for the given short code.
    async fn find_by_short_code(&self, code: &ShortCode) -> Result<Option<Record>>;
}

#[async_trait]
pub trait RecordStore: ReadStore {
    /// Persists a new record.
    ///
    /// Saving a record whose code is already stored for the same URL is a
    /// no-op. Returns `Err(DuplicateShortCode)` if the code belongs to a
    /// different URL, and `Err(DuplicateOriginalUrl)` if the URL already has
    /// another active code. The uniqueness checks and the insert are atomic.
    async fn save(&self, record: Record) -> Result<()>;

    /// Persists several records in one pass.
    ///
    /// Returns one result per input record, in input order, with the same
    /// semantics as [`RecordStore::save`]. A rejected record never aborts the
    /// rest of the batch. The outer error is reserved for failures that
    /// prevent the batch from running at all.
    async fn save_batch(&self, records: Vec<Record>) -> Result<Vec<Result<()>>>;

    /// Soft-deletes the record with the given code.
    ///
    /// When `user_id` is set, only a record owned by that user is deleted.
    /// Returns `true` if a record was marked as deleted.
    async fn delete(&self, code: &ShortCode, user_id: Option<i64>) -> Result<bool>;

    /// Lists the active records owned by the given user.
    async fn list_by_user(&self, user_id: i64) -> Result<Vec<Record>>;
}

#[async_trait]
impl<T: ReadStore + ?Sized> ReadStore for std::sync::Arc<T> {
    async fn find_by_original_url(&self, original_url: &str) -> Result<Option<Record>> {
        (**self).find_by_original_url(original_url).await
    }

    async fn find_by_short_code(&self, code: &ShortCode) -> Result<Option<Record>> {
        (**self).find_by_short_code(code).await
    }
}

#[async_trait]
impl<T: RecordStore + ?Sized> RecordStore for std::sync::Arc<T> {
    async fn save(&self, record: Record) -> Result<()> {
        (**self).save(record).await
    }

    async fn save_batch(&self, records: Vec<Record>) -> Result<Vec<Result<()>>> {
        (**self).save_batch(records).await
    }

    async fn delete(&self, code: &ShortCode, user_id: Option<i64>) -> Result<bool> {
        (**self).delete(code, user_id).await
    }

    async fn list_by_user(&self, user_id: i64) -> Result<Vec<Record>> {
        (**self).list_by_user(user_id).await
    }
}
