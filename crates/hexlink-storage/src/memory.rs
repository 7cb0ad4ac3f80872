use async_trait::async_trait;
use hexlink_core::error::{Result, StorageError};
use hexlink_core::{ReadStore, Record, RecordStore, ShortCode};
use parking_lot::RwLock;
use std::collections::hash_map::Values;
use std::collections::HashMap;

/// Both indexes live behind one lock so they can never disagree.
#[derive(Debug, Default)]
struct Tables {
    /// Primary index: original URL -> code of its active record.
    by_url: HashMap<String, ShortCode>,
    /// Secondary index: code -> record, including soft-deleted records.
    by_code: HashMap<ShortCode, Record>,
}

impl Tables {
    /// Returns `true` if the record was added, `false` for an exact replay.
    fn insert(&mut self, record: Record) -> Result<bool> {
        if let Some(existing) = self.by_code.get(&record.short_code) {
            // A deleted record is never revived, even by its own URL.
            if existing.original_url == record.original_url
                && existing.is_deleted == record.is_deleted
            {
                return Ok(false);
            }
            return Err(StorageError::DuplicateShortCode(
                record.short_code.to_string(),
            ));
        }

        if record.is_active() {
            if let Some(code) = self.by_url.get(&record.original_url) {
                return Err(StorageError::DuplicateOriginalUrl {
                    short_code: code.to_string(),
                });
            }
            self.by_url
                .insert(record.original_url.clone(), record.short_code.clone());
        }

        self.by_code.insert(record.short_code.clone(), record);
        Ok(true)
    }

    fn mark_deleted(&mut self, code: &ShortCode, user_id: Option<i64>) -> bool {
        let Some(record) = self.by_code.get_mut(code) else {
            return false;
        };

        if record.is_deleted || user_id.is_some_and(|uid| record.user_id != Some(uid)) {
            return false;
        }

        record.is_deleted = true;
        if self.by_url.get(&record.original_url) == Some(code) {
            self.by_url.remove(&record.original_url);
        }
        true
    }

    fn remove(&mut self, code: &ShortCode) {
        if let Some(record) = self.by_code.remove(code) {
            if self.by_url.get(&record.original_url) == Some(code) {
                self.by_url.remove(&record.original_url);
            }
        }
    }

    fn undelete(&mut self, code: &ShortCode) {
        let Some(record) = self.by_code.get_mut(code) else {
            return;
        };
        if !self.by_url.contains_key(&record.original_url) {
            record.is_deleted = false;
            self.by_url
                .insert(record.original_url.clone(), record.short_code.clone());
        }
    }
}

/// In-memory record store.
///
/// A single `RwLock` guards the URL index and the short code index, so
/// `find_by_short_code` is a hash lookup rather than a scan and `save`
/// updates both indexes in one critical section. Reads share the lock.
/// The lock is never held across an `.await`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    /// Creates a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new in-memory store with the specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            tables: RwLock::new(Tables {
                by_url: HashMap::with_capacity(capacity),
                by_code: HashMap::with_capacity(capacity),
            }),
        }
    }

    /// Synchronous variant of [`RecordStore::save`].
    pub fn insert(&self, record: Record) -> Result<()> {
        self.tables.write().insert(record).map(|_| ())
    }

    /// Inserts every record under one write lock, returning per-record results.
    pub fn insert_many(&self, records: Vec<Record>) -> Vec<Result<()>> {
        self.insert_many_tracked(records)
            .into_iter()
            .map(|result| result.map(|_| ()))
            .collect()
    }

    /// Like [`MemoryStore::insert`], but tells an added record (`true`) apart
    /// from an exact replay (`false`).
    pub(crate) fn insert_tracked(&self, record: Record) -> Result<bool> {
        self.tables.write().insert(record)
    }

    pub(crate) fn insert_many_tracked(&self, records: Vec<Record>) -> Vec<Result<bool>> {
        let mut tables = self.tables.write();
        records
            .into_iter()
            .map(|record| tables.insert(record))
            .collect()
    }

    /// Synchronous variant of [`RecordStore::delete`].
    pub fn mark_deleted(&self, code: &ShortCode, user_id: Option<i64>) -> bool {
        self.tables.write().mark_deleted(code, user_id)
    }

    /// Drops records added by `insert_tracked`, used to undo a failed write.
    pub(crate) fn remove_all(&self, codes: &[ShortCode]) {
        let mut tables = self.tables.write();
        for code in codes {
            tables.remove(code);
        }
    }

    /// Reverts [`MemoryStore::mark_deleted`] unless the URL has been taken since.
    pub(crate) fn undelete(&self, code: &ShortCode) {
        self.tables.write().undelete(code);
    }

    /// Returns a point-in-time copy of every record, deleted ones included.
    pub fn snapshot(&self) -> Vec<Record> {
        self.with_records(|records| records.cloned().collect())
    }

    /// Runs `f` over every stored record while holding the read lock.
    ///
    /// Writers are blocked until `f` returns, so `f` sees a consistent view.
    /// `f` must not perform I/O.
    pub fn with_records<T>(&self, f: impl FnOnce(Values<'_, ShortCode, Record>) -> T) -> T {
        let tables = self.tables.read();
        f(tables.by_code.values())
    }

    /// Number of stored records, deleted ones included.
    pub fn len(&self) -> usize {
        self.tables.read().by_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ReadStore for MemoryStore {
    async fn find_by_original_url(&self, original_url: &str) -> Result<Option<Record>> {
        let tables = self.tables.read();
        let record = tables
            .by_url
            .get(original_url)
            .and_then(|code| tables.by_code.get(code))
            .cloned();
        Ok(record)
    }

    async fn find_by_short_code(&self, code: &ShortCode) -> Result<Option<Record>> {
        let tables = self.tables.read();
        Ok(tables
            .by_code
            .get(code)
            .filter(|record| record.is_active())
            .cloned())
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn save(&self, record: Record) -> Result<()> {
        self.insert(record)
    }

    async fn save_batch(&self, records: Vec<Record>) -> Result<Vec<Result<()>>> {
        Ok(self.insert_many(records))
    }

    async fn delete(&self, code: &ShortCode, user_id: Option<i64>) -> Result<bool> {
        Ok(self.mark_deleted(code, user_id))
    }

    async fn list_by_user(&self, user_id: i64) -> Result<Vec<Record>> {
        let tables = self.tables.read();
        let mut records: Vec<Record> = tables
            .by_code
            .values()
            .filter(|record| record.is_active() && record.user_id == Some(user_id))
            .cloned()
            .collect();
        records.sort_by(|a, b| a.short_code.cmp(&b.short_code));
        Ok(records)
    }
}
