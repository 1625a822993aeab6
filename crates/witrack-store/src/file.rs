use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, instrument};
use witrack_protocol::{Revision, RevisionStore, WitError, WitResult, WorkItemId};

use crate::ensure_after_latest;

const DEFAULT_LATEST_CACHE_CAPACITY: usize = 4096;

/// Append-only revision log, one JSONL file per work item.
///
/// Reads and appends of one work item are serialized by a per-item lock that
/// is dropped again once no task holds it.
#[derive(Debug)]
pub struct FileRevisionStore {
    root: PathBuf,
    item_locks: Mutex<HashMap<WorkItemId, Arc<tokio::sync::Mutex<()>>>>,
    latest_cache: Mutex<HashMap<WorkItemId, DateTime<Utc>>>,
    latest_cache_capacity: usize,
}

impl FileRevisionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            item_locks: Mutex::new(HashMap::new()),
            latest_cache: Mutex::new(HashMap::new()),
            latest_cache_capacity: DEFAULT_LATEST_CACHE_CAPACITY,
        }
    }

    /// Upper bound on cached latest revision times. The cache is a shortcut
    /// only; evicted items are re-read from their log.
    pub fn with_latest_cache_capacity(mut self, capacity: usize) -> Self {
        self.latest_cache_capacity = capacity.max(1);
        self
    }

    fn file_path(&self, work_item_id: WorkItemId) -> PathBuf {
        self.root
            .join("revisions")
            .join(format!("{}.jsonl", work_item_id.0.hyphenated()))
    }

    async fn ensure_parent(path: &Path) -> WitResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|error| io_error(format!("failed to create revisions dir {parent:?}"), error))?;
        }
        Ok(())
    }

    fn lock_for(&self, work_item_id: WorkItemId) -> Arc<tokio::sync::Mutex<()>> {
        let mut guard = self.item_locks.lock();
        guard
            .entry(work_item_id)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Drops the lock entry of a work item unless another task still holds a
    /// handle to it. Call after releasing the guard.
    fn release_lock(&self, work_item_id: WorkItemId, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut guard = self.item_locks.lock();
        // one handle in the map, one here
        if Arc::strong_count(&lock) <= 2 {
            guard.remove(&work_item_id);
        }
    }

    fn remember_latest(&self, work_item_id: WorkItemId, time: DateTime<Utc>) {
        let mut cache = self.latest_cache.lock();
        if cache.len() >= self.latest_cache_capacity && !cache.contains_key(&work_item_id) {
            cache.clear();
        }
        cache.insert(work_item_id, time);
    }

    async fn read_all(path: &Path) -> WitResult<Vec<Revision>> {
        let file = match OpenOptions::new().read(true).open(path).await {
            Ok(file) => file,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => {
                return Err(io_error(
                    format!("failed opening revision log {path:?}"),
                    error,
                ));
            }
        };
        let mut reader = BufReader::new(file).lines();
        let mut revisions = Vec::new();

        while let Some(line) = reader
            .next_line()
            .await
            .map_err(|error| io_error(format!("failed reading revision log {path:?}"), error))?
        {
            if line.trim().is_empty() {
                continue;
            }
            let revision: Revision = serde_json::from_str(&line).map_err(|error| {
                WitError::Internal(format!("failed parsing revision line in {path:?}: {error}"))
            })?;
            revisions.push(revision);
        }
        Ok(revisions)
    }
}

fn io_error(context: String, error: std::io::Error) -> WitError {
    WitError::Internal(format!("{context}: {error}"))
}

#[async_trait]
impl RevisionStore for FileRevisionStore {
    #[instrument(skip(self), fields(work_item_id = %work_item_id))]
    async fn list(&self, work_item_id: WorkItemId) -> WitResult<Vec<Revision>> {
        let lock = self.lock_for(work_item_id);
        let revisions = {
            let _guard = lock.lock().await;
            Self::read_all(&self.file_path(work_item_id)).await
        };
        self.release_lock(work_item_id, lock);
        let revisions = revisions?;
        debug!(count = revisions.len(), "revisions loaded from store");
        Ok(revisions)
    }

    #[instrument(
        skip(self, revision),
        fields(work_item_id = %revision.work_item_id, revision_id = %revision.id)
    )]
    async fn append(&self, revision: &Revision) -> WitResult<()> {
        let path = self.file_path(revision.work_item_id);
        Self::ensure_parent(&path).await?;

        let lock = self.lock_for(revision.work_item_id);
        let appended = {
            let _guard = lock.lock().await;
            self.append_locked(&path, revision).await
        };
        self.release_lock(revision.work_item_id, lock);
        appended?;

        self.remember_latest(revision.work_item_id, revision.time);
        debug!("revision appended to store");
        Ok(())
    }
}

impl FileRevisionStore {
    async fn append_locked(&self, path: &Path, revision: &Revision) -> WitResult<()> {
        let cached = self.latest_cache.lock().get(&revision.work_item_id).copied();
        let latest = match cached {
            Some(latest) => Some(latest),
            None => Self::read_all(path).await?.last().map(|last| last.time),
        };
        ensure_after_latest(latest, revision)?;

        let mut line = serde_json::to_string(revision)
            .map_err(|error| WitError::Internal(format!("failed serializing revision: {error}")))?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|error| io_error(format!("failed opening revision log {path:?}"), error))?;
        let write = async {
            file.write_all(line.as_bytes()).await?;
            file.flush().await
        };
        write
            .await
            .map_err(|error| io_error(format!("failed writing revision log {path:?}"), error))
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::{SystemTime, UNIX_EPOCH};

    use anyhow::Result;
    use chrono::Duration;
    use serde_json::json;
    use tokio::fs;
    use witrack_protocol::{
        FieldMap, IdentityId, Revision, RevisionStore, WorkItemId, WorkItemTypeId,
    };

    use super::FileRevisionStore;

    fn unique_test_root(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        std::env::temp_dir().join(format!("{name}-{nanos}"))
    }

    fn revision(work_item_id: WorkItemId, title: &str) -> Result<Revision> {
        let fields: FieldMap = serde_json::from_value(json!({ "title": title }))?;
        Ok(Revision::new(
            work_item_id,
            IdentityId::new(),
            WorkItemTypeId::new(),
            fields,
        ))
    }

    #[tokio::test]
    async fn file_revision_store_appends_and_lists_in_order() -> Result<()> {
        let root = unique_test_root("witrack-revisions");
        let store = FileRevisionStore::new(&root);
        let work_item_id = WorkItemId::new();

        let first = revision(work_item_id, "a")?;
        let mut second = revision(work_item_id, "b")?;
        second.time = first.time + Duration::seconds(1);

        store.append(&first).await?;
        store.append(&second).await?;

        let listed = store.list(work_item_id).await?;
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, first.id);
        assert_eq!(listed[1].field("title"), &json!("b"));

        let reopened = FileRevisionStore::new(&root);
        assert_eq!(reopened.list(work_item_id).await?.len(), 2);

        let _ = fs::remove_dir_all(root).await;
        Ok(())
    }

    #[tokio::test]
    async fn file_revision_store_rejects_out_of_order_revision() -> Result<()> {
        let root = unique_test_root("witrack-revisions-order");
        let store = FileRevisionStore::new(&root);
        let work_item_id = WorkItemId::new();

        let first = revision(work_item_id, "a")?;
        let mut stale = revision(work_item_id, "b")?;
        stale.time = first.time - Duration::seconds(1);

        store.append(&first).await?;
        let err = store.append(&stale).await.unwrap_err();
        assert!(err.is_bad_parameter());

        let reopened = FileRevisionStore::new(&root);
        let err = reopened.append(&stale).await.unwrap_err();
        assert!(err.is_bad_parameter());

        let _ = fs::remove_dir_all(root).await;
        Ok(())
    }

    #[tokio::test]
    async fn unknown_work_item_has_no_revisions() -> Result<()> {
        let root = unique_test_root("witrack-revisions-empty");
        let store = FileRevisionStore::new(&root);
        assert!(store.list(WorkItemId::new()).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn unreadable_root_is_an_error_not_an_empty_history() -> Result<()> {
        let root = unique_test_root("witrack-revisions-not-a-dir");
        fs::write(&root, b"not a directory").await?;
        let store = FileRevisionStore::new(&root);

        let err = store.list(WorkItemId::new()).await.unwrap_err();
        assert!(err.to_string().contains("failed opening revision log"));
        assert!(store.append(&revision(WorkItemId::new(), "a")?).await.is_err());

        let _ = fs::remove_file(root).await;
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_list_never_sees_a_partial_line() -> Result<()> {
        let root = unique_test_root("witrack-revisions-concurrent");
        let store = Arc::new(FileRevisionStore::new(&root));
        let work_item_id = WorkItemId::new();
        let long_title = "x".repeat(64 * 1024);

        let writer = {
            let store = store.clone();
            let long_title = long_title.clone();
            tokio::spawn(async move {
                let mut previous = None;
                for _ in 0..20 {
                    let mut next = revision(work_item_id, &long_title)?;
                    if let Some(time) = previous {
                        next.time = time + Duration::seconds(1);
                    }
                    previous = Some(next.time);
                    store.append(&next).await?;
                }
                anyhow::Ok(())
            })
        };

        let mut seen = 0;
        while !writer.is_finished() {
            let listed = store.list(work_item_id).await?;
            assert!(listed.len() >= seen);
            seen = listed.len();
            tokio::task::yield_now().await;
        }
        writer.await??;

        assert_eq!(store.list(work_item_id).await?.len(), 20);
        assert!(store.item_locks.lock().is_empty());

        let _ = fs::remove_dir_all(root).await;
        Ok(())
    }

    #[tokio::test]
    async fn latest_cache_stays_within_capacity() -> Result<()> {
        let root = unique_test_root("witrack-revisions-cache");
        let store = FileRevisionStore::new(&root).with_latest_cache_capacity(2);

        for title in ["a", "b", "c", "d", "e"] {
            store.append(&revision(WorkItemId::new(), title)?).await?;
            assert!(store.latest_cache.lock().len() <= 2);
        }
        assert!(store.item_locks.lock().is_empty());

        let _ = fs::remove_dir_all(root).await;
        Ok(())
    }

    #[tokio::test]
    async fn evicted_item_is_still_ordered_from_its_log() -> Result<()> {
        let root = unique_test_root("witrack-revisions-evicted");
        let store = FileRevisionStore::new(&root).with_latest_cache_capacity(1);
        let work_item_id = WorkItemId::new();

        let first = revision(work_item_id, "a")?;
        store.append(&first).await?;
        store.append(&revision(WorkItemId::new(), "other")?).await?;
        assert!(!store.latest_cache.lock().contains_key(&work_item_id));

        let mut stale = revision(work_item_id, "b")?;
        stale.time = first.time - Duration::seconds(1);
        assert!(store.append(&stale).await.unwrap_err().is_bad_parameter());

        let _ = fs::remove_dir_all(root).await;
        Ok(())
    }
}
