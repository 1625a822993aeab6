use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, instrument};
use witrack_protocol::{
    Identity, IdentityId, IdentityStore, Revision, RevisionStore, Space, SpaceId, SpaceStore,
    Tracker, TrackerId, TrackerQuery, TrackerQueryId, TrackerQueryStore, TrackerStore, WitError,
    WitResult, WorkItem, WorkItemFilter, WorkItemId, WorkItemSearch, WorkItemStore, WorkItemType,
    WorkItemTypeId, WorkItemTypeStore,
};

use crate::ensure_after_latest;

/// Keeps every entity in process memory. Backs tests and single-node
/// development servers.
///
/// A store built with [`InMemoryStore::open`] also writes a JSON snapshot of
/// its entities after every change and loads it back on the next open.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    revisions: RwLock<HashMap<WorkItemId, Vec<Revision>>>,
    work_items: RwLock<HashMap<WorkItemId, WorkItem>>,
    work_item_types: RwLock<HashMap<WorkItemTypeId, WorkItemType>>,
    identities: RwLock<HashMap<IdentityId, Identity>>,
    spaces: RwLock<HashMap<SpaceId, Space>>,
    trackers: RwLock<HashMap<TrackerId, Tracker>>,
    tracker_queries: RwLock<HashMap<TrackerQueryId, TrackerQuery>>,
    snapshot_path: Option<PathBuf>,
    persist_lock: tokio::sync::Mutex<()>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    identities: Vec<Identity>,
    #[serde(default)]
    spaces: Vec<Space>,
    #[serde(default)]
    trackers: Vec<Tracker>,
    #[serde(default)]
    work_item_types: Vec<WorkItemType>,
    #[serde(default)]
    work_items: Vec<WorkItem>,
    #[serde(default)]
    tracker_queries: Vec<TrackerQuery>,
    #[serde(default)]
    revisions: Vec<Revision>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a store backed by the snapshot at `path`. A missing file is an
    /// empty store.
    #[instrument(skip_all)]
    pub async fn open(path: impl Into<PathBuf>) -> WitResult<Self> {
        let path = path.into();
        let snapshot = match fs::read_to_string(&path).await {
            Ok(payload) => serde_json::from_str::<Snapshot>(&payload).map_err(|error| {
                WitError::Internal(format!("failed parsing entity snapshot {path:?}: {error}"))
            })?,
            Err(error) if error.kind() == ErrorKind::NotFound => Snapshot::default(),
            Err(error) => {
                return Err(WitError::Internal(format!(
                    "failed reading entity snapshot {path:?}: {error}"
                )));
            }
        };

        debug!(
            path = %path.display(),
            work_items = snapshot.work_items.len(),
            tracker_queries = snapshot.tracker_queries.len(),
            "entity snapshot loaded"
        );

        let mut revisions: HashMap<WorkItemId, Vec<Revision>> = HashMap::new();
        for revision in snapshot.revisions {
            revisions.entry(revision.work_item_id).or_default().push(revision);
        }
        Ok(Self {
            revisions: RwLock::new(revisions),
            work_items: RwLock::new(by_id(snapshot.work_items, |item| item.id)),
            work_item_types: RwLock::new(by_id(snapshot.work_item_types, |wit| wit.id)),
            identities: RwLock::new(by_id(snapshot.identities, |identity| identity.id)),
            spaces: RwLock::new(by_id(snapshot.spaces, |space| space.id)),
            trackers: RwLock::new(by_id(snapshot.trackers, |tracker| tracker.id)),
            tracker_queries: RwLock::new(by_id(snapshot.tracker_queries, |query| query.id)),
            snapshot_path: Some(path),
            persist_lock: tokio::sync::Mutex::new(()),
        })
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            identities: self.identities.read().values().cloned().collect(),
            spaces: self.spaces.read().values().cloned().collect(),
            trackers: self.trackers.read().values().cloned().collect(),
            work_item_types: self.work_item_types.read().values().cloned().collect(),
            work_items: self.work_items.read().values().cloned().collect(),
            tracker_queries: self.tracker_queries.read().values().cloned().collect(),
            revisions: self.revisions.read().values().flatten().cloned().collect(),
        }
    }

    /// Rewrites the snapshot file, if any. The snapshot is taken after the
    /// persist lock is held so the last writer always stores the newest state.
    async fn persist(&self) -> WitResult<()> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };
        let _guard = self.persist_lock.lock().await;
        let payload = serde_json::to_string_pretty(&self.snapshot()).map_err(|error| {
            WitError::Internal(format!("failed serializing entity snapshot: {error}"))
        })?;

        let write = async {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).await?;
            }
            let staged = path.with_extension("json.tmp");
            fs::write(&staged, payload).await?;
            fs::rename(&staged, path).await
        };
        write.await.map_err(|error| {
            WitError::Internal(format!("failed writing entity snapshot {path:?}: {error}"))
        })
    }
}

fn by_id<K, V>(values: Vec<V>, key: impl Fn(&V) -> K) -> HashMap<K, V>
where
    K: std::hash::Hash + Eq,
{
    values.into_iter().map(|value| (key(&value), value)).collect()
}

#[async_trait]
impl RevisionStore for InMemoryStore {
    async fn list(&self, work_item_id: WorkItemId) -> WitResult<Vec<Revision>> {
        Ok(self
            .revisions
            .read()
            .get(&work_item_id)
            .cloned()
            .unwrap_or_default())
    }

    #[instrument(skip(self, revision), fields(work_item_id = %revision.work_item_id, revision_id = %revision.id))]
    async fn append(&self, revision: &Revision) -> WitResult<()> {
        {
            let mut guard = self.revisions.write();
            let history = guard.entry(revision.work_item_id).or_default();
            ensure_after_latest(history.last().map(|last| last.time), revision)?;
            history.push(revision.clone());
            debug!(revisions = history.len(), "revision appended");
        }
        self.persist().await
    }
}

#[async_trait]
impl WorkItemStore for InMemoryStore {
    async fn check_exists(&self, id: WorkItemId) -> WitResult<()> {
        if self.work_items.read().contains_key(&id) {
            Ok(())
        } else {
            Err(WitError::not_found("work item", id))
        }
    }

    async fn load(&self, id: WorkItemId) -> WitResult<WorkItem> {
        self.work_items
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| WitError::not_found("work item", id))
    }

    async fn create(&self, item: WorkItem) -> WitResult<WorkItem> {
        self.work_items.write().insert(item.id, item.clone());
        self.persist().await?;
        Ok(item)
    }

    #[instrument(skip(self), fields(work_item_id = %id))]
    async fn delete(&self, id: WorkItemId, deleted_by: IdentityId) -> WitResult<()> {
        let removed = self.work_items.write().remove(&id);
        match removed {
            Some(_) => {
                debug!(%deleted_by, "work item deleted");
                self.persist().await
            }
            None => Err(WitError::not_found("work item", id)),
        }
    }
}

#[async_trait]
impl WorkItemSearch for InMemoryStore {
    async fn filter(&self, filter: &WorkItemFilter) -> WitResult<Vec<WorkItem>> {
        let mut matching: Vec<WorkItem> = self
            .work_items
            .read()
            .values()
            .filter(|item| filter.matches(item))
            .cloned()
            .collect();
        matching.sort_by_key(|item| item.id);
        Ok(matching)
    }
}

#[async_trait]
impl WorkItemTypeStore for InMemoryStore {
    async fn load(&self, id: WorkItemTypeId) -> WitResult<WorkItemType> {
        self.work_item_types
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| WitError::not_found("work item type", id))
    }

    async fn create(&self, work_item_type: WorkItemType) -> WitResult<WorkItemType> {
        self.work_item_types
            .write()
            .insert(work_item_type.id, work_item_type.clone());
        self.persist().await?;
        Ok(work_item_type)
    }
}

#[async_trait]
impl IdentityStore for InMemoryStore {
    async fn load(&self, id: IdentityId) -> WitResult<Identity> {
        self.identities
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| WitError::not_found("identity", id))
    }

    async fn create(&self, identity: Identity) -> WitResult<Identity> {
        self.identities.write().insert(identity.id, identity.clone());
        self.persist().await?;
        Ok(identity)
    }
}

#[async_trait]
impl SpaceStore for InMemoryStore {
    async fn check_exists(&self, id: SpaceId) -> WitResult<()> {
        if self.spaces.read().contains_key(&id) {
            Ok(())
        } else {
            Err(WitError::not_found("space", id))
        }
    }

    async fn create(&self, space: Space) -> WitResult<Space> {
        self.spaces.write().insert(space.id, space.clone());
        self.persist().await?;
        Ok(space)
    }
}

#[async_trait]
impl TrackerStore for InMemoryStore {
    async fn check_exists(&self, id: TrackerId) -> WitResult<()> {
        if self.trackers.read().contains_key(&id) {
            Ok(())
        } else {
            Err(WitError::not_found("tracker", id))
        }
    }

    async fn load(&self, id: TrackerId) -> WitResult<Tracker> {
        self.trackers
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| WitError::not_found("tracker", id))
    }

    async fn create(&self, tracker: Tracker) -> WitResult<Tracker> {
        self.trackers.write().insert(tracker.id, tracker.clone());
        self.persist().await?;
        Ok(tracker)
    }
}

#[async_trait]
impl TrackerQueryStore for InMemoryStore {
    async fn check_exists(&self, id: TrackerQueryId) -> WitResult<()> {
        if self.tracker_queries.read().contains_key(&id) {
            Ok(())
        } else {
            Err(WitError::not_found("tracker query", id))
        }
    }

    async fn load(&self, id: TrackerQueryId) -> WitResult<TrackerQuery> {
        self.tracker_queries
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| WitError::not_found("tracker query", id))
    }

    async fn create(&self, query: TrackerQuery) -> WitResult<TrackerQuery> {
        {
            let mut guard = self.tracker_queries.write();
            if guard.contains_key(&query.id) {
                return Err(WitError::bad_parameter("trackerquery", query.id)
                    .expected("unused trackerquery ID"));
            }
            guard.insert(query.id, query.clone());
        }
        self.persist().await?;
        Ok(query)
    }

    async fn delete(&self, id: TrackerQueryId) -> WitResult<()> {
        let removed = self.tracker_queries.write().remove(&id);
        match removed {
            Some(_) => self.persist().await,
            None => Err(WitError::not_found("tracker query", id)),
        }
    }

    async fn list(&self) -> WitResult<Vec<TrackerQuery>> {
        let mut queries: Vec<TrackerQuery> =
            self.tracker_queries.read().values().cloned().collect();
        queries.sort_by_key(|query| query.id);
        Ok(queries)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    use anyhow::Result;
    use chrono::Duration;
    use tokio::fs;
    use witrack_protocol::{
        FieldMap, Identity, IdentityId, IdentityStore, Revision, RevisionStore, Space, SpaceId,
        SpaceStore, TrackerId, TrackerQuery, TrackerQueryId, TrackerQueryStore, WorkItem,
        WorkItemFilter, WorkItemId, WorkItemSearch, WorkItemStore, WorkItemTypeId,
    };

    use super::InMemoryStore;

    fn unique_test_root(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        std::env::temp_dir().join(format!("{name}-{nanos}"))
    }

    #[tokio::test]
    async fn revisions_are_listed_in_append_order() -> Result<()> {
        let store = InMemoryStore::new();
        let work_item_id = WorkItemId::new();
        let first = Revision::new(
            work_item_id,
            IdentityId::new(),
            WorkItemTypeId::new(),
            FieldMap::new(),
        );
        let mut second = first.clone();
        second.id = Default::default();
        second.time = first.time + Duration::seconds(1);

        store.append(&first).await?;
        store.append(&second).await?;

        let listed = RevisionStore::list(&store, work_item_id).await?;
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, first.id);
        assert_eq!(listed[1].id, second.id);
        Ok(())
    }

    #[tokio::test]
    async fn revision_not_after_latest_is_rejected() -> Result<()> {
        let store = InMemoryStore::new();
        let first = Revision::new(
            WorkItemId::new(),
            IdentityId::new(),
            WorkItemTypeId::new(),
            FieldMap::new(),
        );
        let mut stale = first.clone();
        stale.id = Default::default();

        store.append(&first).await?;
        let err = store.append(&stale).await.unwrap_err();
        assert!(err.is_bad_parameter());
        Ok(())
    }

    #[tokio::test]
    async fn filter_matches_space_and_tracker_query() -> Result<()> {
        let store = InMemoryStore::new();
        let space = SpaceId::new();
        let query = TrackerQueryId::new();
        let wit = WorkItemTypeId::new();

        let imported = WorkItemStore::create(&store, WorkItem::new(space, wit).imported_by(query))
            .await?;
        WorkItemStore::create(&store, WorkItem::new(space, wit)).await?;
        WorkItemStore::create(
            &store,
            WorkItem::new(space, wit).imported_by(TrackerQueryId::new()),
        )
        .await?;

        let found = store
            .filter(&WorkItemFilter {
                space_id: space,
                tracker_query_id: query,
            })
            .await?;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, imported.id);
        Ok(())
    }

    #[tokio::test]
    async fn deleting_unknown_work_item_is_not_found() {
        let store = InMemoryStore::new();
        let err = WorkItemStore::delete(&store, WorkItemId::new(), IdentityId::new())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn snapshot_survives_reopen() -> Result<()> {
        let root = unique_test_root("witrack-entities");
        let path = root.join("entities.json");
        let store = InMemoryStore::open(&path).await?;

        let identity = IdentityStore::create(&store, Identity::new("jdoe")).await?;
        let space = SpaceStore::create(&store, Space::new("demo")).await?;
        let kept = WorkItemStore::create(&store, WorkItem::new(space.id, WorkItemTypeId::new()))
            .await?;
        let dropped = WorkItemStore::create(&store, WorkItem::new(space.id, WorkItemTypeId::new()))
            .await?;
        WorkItemStore::delete(&store, dropped.id, identity.id).await?;
        let query = TrackerQueryStore::create(
            &store,
            TrackerQuery {
                id: TrackerQueryId::new(),
                query: "is:open".to_owned(),
                schedule: "@daily".to_owned(),
                tracker_id: TrackerId::new(),
                space_id: space.id,
                work_item_type: None,
            },
        )
        .await?;
        let revision = Revision::new(kept.id, identity.id, kept.work_item_type, FieldMap::new());
        store.append(&revision).await?;
        drop(store);

        let reopened = InMemoryStore::open(&path).await?;
        assert_eq!(IdentityStore::load(&reopened, identity.id).await?.username, "jdoe");
        SpaceStore::check_exists(&reopened, space.id).await?;
        WorkItemStore::check_exists(&reopened, kept.id).await?;
        assert!(WorkItemStore::check_exists(&reopened, dropped.id).await.is_err());
        assert_eq!(TrackerQueryStore::load(&reopened, query.id).await?.query, "is:open");
        let revisions = RevisionStore::list(&reopened, kept.id).await?;
        assert_eq!(revisions.len(), 1);
        assert_eq!(revisions[0].id, revision.id);

        let _ = fs::remove_dir_all(root).await;
        Ok(())
    }

    #[tokio::test]
    async fn corrupt_snapshot_is_an_error() -> Result<()> {
        let root = unique_test_root("witrack-entities-corrupt");
        fs::create_dir_all(&root).await?;
        let path = root.join("entities.json");
        fs::write(&path, b"{ not json").await?;

        let err = InMemoryStore::open(&path).await.unwrap_err();
        assert!(err.to_string().contains("failed parsing entity snapshot"));

        let _ = fs::remove_dir_all(root).await;
        Ok(())
    }
}
