mod line;

use crate::memory::MemoryStore;
use async_trait::async_trait;
use hexlink_core::error::{Result, StorageError};
use hexlink_core::{ReadStore, Record, RecordStore, ShortCode};
use line::SnapshotLine;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncBufReadExt;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

/// Default upper bound for a single snapshot write.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// When the file-backed store rewrites its snapshot file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotPolicy {
    /// Dump after every successful mutation.
    WriteThrough,
    /// Dump periodically from a background task, see [`FileStore::spawn_snapshotter`].
    Interval(Duration),
    /// Dump only when [`FileStore::dump`] is called, typically at shutdown.
    OnShutdown,
}

/// Outcome of [`FileStore::restore`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub loaded: usize,
    pub skipped: usize,
}

/// A record store decorator that snapshots a [`MemoryStore`] to a file.
///
/// The file holds one JSON object per line:
///
/// ```text
/// {"originalURL":"https://example.com","shortenedPath":"0f3a9bc1","correlationID":""}
/// ```
///
/// Reads are served from memory. Dumps take a consistent view under the
/// memory store's read lock, release it, then truncate and rewrite the file.
///
/// Under [`SnapshotPolicy::WriteThrough`] a mutation is applied and
/// persisted while holding the dump lock. If the write fails the mutation
/// is undone before the error is returned. Concurrent readers may see the
/// record in between.
///
/// A write that exceeds the write timeout leaves the file in an unknown
/// state, because the blocking write it started cannot be stopped. The
/// store then refuses every further snapshot with
/// [`StorageError::Unavailable`].
#[derive(Debug)]
pub struct FileStore {
    inner: MemoryStore,
    path: PathBuf,
    policy: SnapshotPolicy,
    write_timeout: Duration,
    // Serializes dumps so an older snapshot never lands after a newer one.
    dump_lock: Mutex<()>,
    failed: AtomicBool,
}

impl FileStore {
    /// Creates an empty file-backed store. Call [`FileStore::restore`] to load the file.
    pub fn new(path: impl Into<PathBuf>, policy: SnapshotPolicy) -> Self {
        Self {
            inner: MemoryStore::new(),
            path: path.into(),
            policy,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            dump_lock: Mutex::new(()),
            failed: AtomicBool::new(false),
        }
    }

    /// Creates the store and restores it from the file.
    pub async fn open(
        path: impl Into<PathBuf>,
        policy: SnapshotPolicy,
    ) -> Result<(Self, RestoreReport)> {
        let store = Self::new(path, policy);
        let report = store.restore().await?;
        Ok((store, report))
    }

    pub fn with_write_timeout(mut self, write_timeout: Duration) -> Self {
        self.write_timeout = write_timeout;
        self
    }

    /// Returns a reference to the wrapped in-memory store.
    ///
    /// Mutations made through it bypass snapshotting.
    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn policy(&self) -> SnapshotPolicy {
        self.policy
    }

    /// Whether a timed-out write has disabled snapshotting.
    pub fn is_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    /// Loads records from the snapshot file into memory.
    ///
    /// A missing file is created empty. Blank, malformed or conflicting
    /// lines are logged and skipped; they never fail the load.
    pub async fn restore(&self) -> Result<RestoreReport> {
        self.ensure_parent_dir().await?;

        let file = tokio::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&self.path)
            .await?;

        let mut lines = tokio::io::BufReader::new(file).split(b'\n');
        let mut report = RestoreReport::default();
        let mut line_no = 0usize;

        while let Some(raw) = lines.next_segment().await? {
            line_no += 1;
            if raw.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            let record = match SnapshotLine::decode(&raw) {
                Ok(record) => record,
                Err(reason) => {
                    warn!(path = %self.path.display(), line = line_no, %reason, "skipping malformed snapshot line");
                    report.skipped += 1;
                    continue;
                }
            };

            match self.inner.insert(record) {
                Ok(()) => report.loaded += 1,
                Err(err) => {
                    warn!(path = %self.path.display(), line = line_no, error = %err, "skipping conflicting snapshot line");
                    report.skipped += 1;
                }
            }
        }

        info!(
            path = %self.path.display(),
            loaded = report.loaded,
            skipped = report.skipped,
            "restored records from snapshot"
        );
        Ok(report)
    }

    /// Rewrites the snapshot file with every record currently in memory.
    ///
    /// A write that does not finish within the write timeout fails with
    /// [`StorageError::Timeout`] and is not retried.
    pub async fn dump(&self) -> Result<usize> {
        let _guard = self.dump_lock.lock().await;
        self.write_snapshot().await
    }

    /// Spawns a task that dumps every [`SnapshotPolicy::Interval`] period
    /// until `shutdown` turns `true` (or its sender is dropped), then dumps
    /// one last time. Returns `None` for the other policies.
    ///
    /// The task stops at the first failed dump and returns the error.
    pub fn spawn_snapshotter(
        self: &Arc<Self>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Option<JoinHandle<Result<()>>> {
        let SnapshotPolicy::Interval(period) = self.policy else {
            return None;
        };

        let store = Arc::clone(self);
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(err) = store.dump().await {
                            error!(path = %store.path.display(), error = %err, "periodic snapshot failed");
                            return Err(err);
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            trace!(path = %store.path.display(), "snapshotter shutting down");
            store.dump().await.map(|_| ())
        }))
    }

    /// Writes the snapshot. The caller holds `dump_lock`.
    async fn write_snapshot(&self) -> Result<usize> {
        if self.is_failed() {
            return Err(StorageError::Unavailable(format!(
                "snapshot {} is in an unknown state after a timed-out write",
                self.path.display()
            )));
        }

        let (bytes, count) = self.inner.with_records(|records| {
            let mut buf = Vec::new();
            let mut count = 0usize;
            for record in records {
                SnapshotLine::encode_into(record, &mut buf)?;
                count += 1;
            }
            Ok::<_, StorageError>((buf, count))
        })?;

        self.ensure_parent_dir().await?;
        match tokio::time::timeout(self.write_timeout, tokio::fs::write(&self.path, bytes)).await {
            Ok(written) => written?,
            Err(_) => {
                self.failed.store(true, Ordering::Release);
                error!(
                    path = %self.path.display(),
                    timeout = ?self.write_timeout,
                    "snapshot write timed out, disabling snapshots"
                );
                return Err(StorageError::Timeout(format!(
                    "writing snapshot {} took longer than {:?}",
                    self.path.display(),
                    self.write_timeout
                )));
            }
        }

        debug!(path = %self.path.display(), records = count, "dumped snapshot");
        Ok(count)
    }

    fn writes_through(&self) -> bool {
        self.policy == SnapshotPolicy::WriteThrough
    }

    async fn ensure_parent_dir(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ReadStore for FileStore {
    async fn find_by_original_url(&self, original_url: &str) -> Result<Option<Record>> {
        self.inner.find_by_original_url(original_url).await
    }

    async fn find_by_short_code(&self, code: &ShortCode) -> Result<Option<Record>> {
        self.inner.find_by_short_code(code).await
    }
}

#[async_trait]
impl RecordStore for FileStore {
    async fn save(&self, record: Record) -> Result<()> {
        if !self.writes_through() {
            return self.inner.insert(record);
        }

        let _guard = self.dump_lock.lock().await;
        let code = record.short_code.clone();
        if self.inner.insert_tracked(record)? {
            if let Err(err) = self.write_snapshot().await {
                self.inner.remove_all(std::slice::from_ref(&code));
                warn!(short_code = %code, error = %err, "rolled back save after failed snapshot");
                return Err(err);
            }
        }
        Ok(())
    }

    async fn save_batch(&self, records: Vec<Record>) -> Result<Vec<Result<()>>> {
        if !self.writes_through() {
            return Ok(self.inner.insert_many(records));
        }

        let _guard = self.dump_lock.lock().await;
        let codes: Vec<ShortCode> = records.iter().map(|r| r.short_code.clone()).collect();
        let results = self.inner.insert_many_tracked(records);
        let added: Vec<ShortCode> = codes
            .into_iter()
            .zip(&results)
            .filter(|(_, result)| matches!(result, Ok(true)))
            .map(|(code, _)| code)
            .collect();

        if !added.is_empty() {
            if let Err(err) = self.write_snapshot().await {
                self.inner.remove_all(&added);
                warn!(records = added.len(), error = %err, "rolled back batch after failed snapshot");
                return Err(err);
            }
        }

        Ok(results
            .into_iter()
            .map(|result| result.map(|_| ()))
            .collect())
    }

    async fn delete(&self, code: &ShortCode, user_id: Option<i64>) -> Result<bool> {
        if !self.writes_through() {
            return Ok(self.inner.mark_deleted(code, user_id));
        }

        let _guard = self.dump_lock.lock().await;
        let deleted = self.inner.mark_deleted(code, user_id);
        if deleted {
            if let Err(err) = self.write_snapshot().await {
                self.inner.undelete(code);
                warn!(short_code = %code, error = %err, "rolled back delete after failed snapshot");
                return Err(err);
            }
        }
        Ok(deleted)
    }

    async fn list_by_user(&self, user_id: i64) -> Result<Vec<Record>> {
        self.inner.list_by_user(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn code(s: &str) -> ShortCode {
        ShortCode::new_unchecked(s)
    }

    #[tokio::test]
    async fn restore_creates_missing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("records.json");

        let (store, report) = FileStore::open(&path, SnapshotPolicy::OnShutdown)
            .await
            .unwrap();

        assert_eq!(report, RestoreReport::default());
        assert!(store.inner().is_empty());
        assert!(path.exists());
    }

    #[tokio::test]
    async fn restore_skips_malformed_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("records.json");
        let content = [
            r#"{"originalURL":"https://a.example","shortenedPath":"aaaa1111","correlationID":"1"}"#,
            r#"{"originalURL":"https://b.example""#,
            "",
            "not json at all",
            r#"{"originalURL":"https://c.example","shortenedPath":"cccc3333","correlationID":"","extra":42}"#,
            r#"{"originalURL":"https://d.example"}"#,
            r#"{"originalURL":"https://e.example","shortenedPath":"aaaa1111","correlationID":""}"#,
        ]
        .join("\n");
        std::fs::write(&path, content).unwrap();

        let (store, report) = FileStore::open(&path, SnapshotPolicy::OnShutdown)
            .await
            .unwrap();

        assert_eq!(report.loaded, 2);
        assert_eq!(report.skipped, 4);

        let a = store.find_by_short_code(&code("aaaa1111")).await.unwrap().unwrap();
        assert_eq!(a.original_url, "https://a.example");
        assert_eq!(a.correlation_id, "1");
        assert!(store
            .find_by_original_url("https://c.example")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn restore_tolerates_invalid_utf8() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("records.json");
        let mut content = vec![0xff, 0xfe, b'\n'];
        content.extend_from_slice(
            br#"{"originalURL":"https://a.example","shortenedPath":"aaaa1111","correlationID":""}"#,
        );
        std::fs::write(&path, content).unwrap();

        let (_store, report) = FileStore::open(&path, SnapshotPolicy::OnShutdown)
            .await
            .unwrap();

        assert_eq!(report, RestoreReport { loaded: 1, skipped: 1 });
    }

    #[tokio::test]
    async fn dump_then_restore_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("records.json");

        let store = FileStore::new(&path, SnapshotPolicy::OnShutdown);
        store
            .save(Record::new("https://a.example", code("aaaa1111")).with_correlation_id("x"))
            .await
            .unwrap();
        store
            .save(Record::new("https://b.example", code("bbbb2222")).with_user_id(Some(9)))
            .await
            .unwrap();
        store
            .save(Record::new("https://c.example", code("cccc3333")))
            .await
            .unwrap();
        store.delete(&code("cccc3333"), None).await.unwrap();

        assert_eq!(store.dump().await.unwrap(), 3);

        let (restored, report) = FileStore::open(&path, SnapshotPolicy::OnShutdown)
            .await
            .unwrap();
        assert_eq!(report, RestoreReport { loaded: 3, skipped: 0 });

        for url in ["https://a.example", "https://b.example", "https://c.example"] {
            assert_eq!(
                store.find_by_original_url(url).await.unwrap(),
                restored.find_by_original_url(url).await.unwrap()
            );
        }
        for c in ["aaaa1111", "bbbb2222", "cccc3333"] {
            assert_eq!(
                store.find_by_short_code(&code(c)).await.unwrap(),
                restored.find_by_short_code(&code(c)).await.unwrap()
            );
        }

        let err = restored
            .save(Record::new("https://other.example", code("cccc3333")))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::DuplicateShortCode(_)));
    }

    #[tokio::test]
    async fn on_shutdown_policy_does_not_write_on_save() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("records.json");

        let store = FileStore::new(&path, SnapshotPolicy::OnShutdown);
        store
            .save(Record::new("https://a.example", code("aaaa1111")))
            .await
            .unwrap();

        assert!(!path.exists());
    }

    #[tokio::test]
    async fn write_through_policy_persists_every_save() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("records.json");

        let store = FileStore::new(&path, SnapshotPolicy::WriteThrough);
        store
            .save(Record::new("https://a.example", code("aaaa1111")))
            .await
            .unwrap();

        let (restored, _) = FileStore::open(&path, SnapshotPolicy::OnShutdown)
            .await
            .unwrap();
        assert!(restored
            .find_by_short_code(&code("aaaa1111"))
            .await
            .unwrap()
            .is_some());

        store.delete(&code("aaaa1111"), None).await.unwrap();
        let (restored, _) = FileStore::open(&path, SnapshotPolicy::OnShutdown)
            .await
            .unwrap();
        assert!(restored
            .find_by_short_code(&code("aaaa1111"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn dump_truncates_previous_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("records.json");
        std::fs::write(&path, "stale line\n".repeat(100)).unwrap();

        let store = FileStore::new(&path, SnapshotPolicy::OnShutdown);
        store
            .save(Record::new("https://a.example", code("aaaa1111")))
            .await
            .unwrap();
        store.dump().await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 1);
        assert!(!content.contains("stale"));
    }

    #[tokio::test]
    async fn dump_to_unwritable_path_is_unavailable() {
        let dir = tempdir().unwrap();
        // A directory cannot be overwritten as a file.
        let store = FileStore::new(dir.path(), SnapshotPolicy::OnShutdown);

        let err = store.dump().await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn failed_write_through_save_is_rolled_back() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path(), SnapshotPolicy::WriteThrough);

        let err = store
            .save(Record::new("https://a.example", code("aaaa1111")))
            .await
            .unwrap_err();
        assert!(err.is_retryable());

        assert!(store.inner().is_empty());
        assert!(store
            .find_by_short_code(&code("aaaa1111"))
            .await
            .unwrap()
            .is_none());
        assert!(store
            .find_by_original_url("https://a.example")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn failed_write_through_batch_is_rolled_back() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path(), SnapshotPolicy::WriteThrough);

        let result = store
            .save_batch(vec![
                Record::new("https://a.example", code("aaaa1111")),
                Record::new("https://b.example", code("bbbb2222")),
            ])
            .await;

        assert!(result.is_err());
        assert!(store.inner().is_empty());
    }

    #[tokio::test]
    async fn failed_write_through_delete_is_rolled_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("records.json");
        let store = FileStore::new(&path, SnapshotPolicy::WriteThrough);
        store
            .save(Record::new("https://a.example", code("aaaa1111")))
            .await
            .unwrap();

        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();

        assert!(store.delete(&code("aaaa1111"), None).await.is_err());

        let record = store
            .find_by_original_url("https://a.example")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.short_code, code("aaaa1111"));
        assert!(!record.is_deleted);
    }

    #[tokio::test]
    async fn timed_out_write_disables_snapshots() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("records.json");
        let store =
            FileStore::new(&path, SnapshotPolicy::OnShutdown).with_write_timeout(Duration::ZERO);

        assert!(matches!(
            store.dump().await.unwrap_err(),
            StorageError::Timeout(_)
        ));
        assert!(store.is_failed());
        assert!(matches!(
            store.dump().await.unwrap_err(),
            StorageError::Unavailable(_)
        ));
    }

    #[tokio::test]
    async fn snapshotter_only_runs_for_interval_policy() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("records.json");
        let (_tx, rx) = watch::channel(false);

        for policy in [SnapshotPolicy::OnShutdown, SnapshotPolicy::WriteThrough] {
            let store = Arc::new(FileStore::new(&path, policy));
            assert!(store.spawn_snapshotter(rx.clone()).is_none());
        }
    }

    #[tokio::test]
    async fn snapshotter_dumps_on_shutdown() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("records.json");
        let store = Arc::new(FileStore::new(
            &path,
            SnapshotPolicy::Interval(Duration::from_secs(3600)),
        ));
        let (tx, rx) = watch::channel(false);
        let handle = store.spawn_snapshotter(rx).unwrap();

        store
            .save(Record::new("https://a.example", code("aaaa1111")))
            .await
            .unwrap();
        tx.send(true).unwrap();
        handle.await.unwrap().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("aaaa1111"));
    }

    #[tokio::test]
    async fn snapshotter_dumps_periodically() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("records.json");
        let period = Duration::from_millis(20);
        let store = Arc::new(FileStore::new(&path, SnapshotPolicy::Interval(period)));
        let (_tx, rx) = watch::channel(false);
        let handle = store.spawn_snapshotter(rx).unwrap();

        store
            .save(Record::new("https://a.example", code("aaaa1111")))
            .await
            .unwrap();

        let mut dumped = false;
        for _ in 0..100 {
            tokio::time::sleep(period).await;
            if std::fs::read_to_string(&path).is_ok_and(|c| c.contains("aaaa1111")) {
                dumped = true;
                break;
            }
        }

        handle.abort();
        assert!(dumped);
    }
}
