//! Wires the witrack stores, authorization and scheduler into one handle.
//!
//! [`KernelBuilder`] assembles a [`WitKernel`] over a data root. Revision
//! history is persisted as JSONL under `<root>/witrack/revisions`. Every other
//! entity is served from memory and mirrored to `<root>/witrack/entities.json`,
//! so a kernel rebuilt on the same root sees the same state.

mod tracker_query;

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};
use witrack_events::EventRepository;
use witrack_policy::{AllowAllAuthService, AuthService};
use witrack_protocol::{
    EventList, FieldMap, Identity, IdentityId, IdentityStore, ResultExt, Revision, RevisionStore,
    SchedulerPort, Space, SpaceStore, Tracker, TrackerStore, WitResult, WorkItem, WorkItemId,
    WorkItemStore, WorkItemType, WorkItemTypeId, WorkItemTypeStore,
};
use witrack_remote::{NoopFetcher, RemoteFetcher, Scheduler};
use witrack_store::{FileRevisionStore, InMemoryStore};

pub use tracker_query::{
    CreateTrackerQuery, TrackerQueryConfig, TrackerQueryService, TrackerQueryStores,
    access_tokens,
};

#[derive(Clone)]
pub struct KernelBuilder {
    root: PathBuf,
    config: TrackerQueryConfig,
    auth: Arc<dyn AuthService>,
    fetcher: Arc<dyn RemoteFetcher>,
}

impl KernelBuilder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            config: TrackerQueryConfig::default(),
            auth: Arc::new(AllowAllAuthService),
            fetcher: Arc::new(NoopFetcher),
        }
    }

    pub fn config(mut self, config: TrackerQueryConfig) -> Self {
        self.config = config;
        self
    }

    pub fn auth(mut self, auth: Arc<dyn AuthService>) -> Self {
        self.auth = auth;
        self
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn RemoteFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub async fn build(self) -> WitResult<WitKernel> {
        let data_dir = self.root.join("witrack");
        let store = Arc::new(InMemoryStore::open(data_dir.join("entities.json")).await?);
        let revisions = Arc::new(FileRevisionStore::new(data_dir));

        let events = EventRepository::new(
            revisions.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
        );
        let scheduler = Arc::new(Scheduler::new(store.clone(), store.clone(), self.fetcher));
        let tracker_queries = TrackerQueryService::new(
            TrackerQueryStores {
                queries: store.clone(),
                spaces: store.clone(),
                trackers: store.clone(),
                work_items: store.clone(),
                search: store.clone(),
            },
            self.auth,
            scheduler.clone(),
            self.config,
        );

        Ok(WitKernel {
            store,
            revisions,
            events,
            tracker_queries,
            scheduler,
        })
    }
}

#[derive(Clone)]
pub struct WitKernel {
    store: Arc<InMemoryStore>,
    revisions: Arc<FileRevisionStore>,
    events: EventRepository,
    tracker_queries: TrackerQueryService,
    scheduler: Arc<Scheduler>,
}

impl WitKernel {
    pub fn events(&self) -> &EventRepository {
        &self.events
    }

    pub fn tracker_queries(&self) -> &TrackerQueryService {
        &self.tracker_queries
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    #[instrument(skip(self), fields(work_item_id = %work_item_id))]
    pub async fn list_events(&self, work_item_id: WorkItemId) -> WitResult<EventList> {
        self.events.list(work_item_id).await
    }

    pub async fn list_events_with_cancel(
        &self,
        work_item_id: WorkItemId,
        cancel: &CancellationToken,
    ) -> WitResult<EventList> {
        self.events.list_with_cancel(work_item_id, cancel).await
    }

    /// Plans the imports of every stored tracker query.
    pub async fn start_scheduler(&self) {
        self.scheduler
            .schedule_all_queries(access_tokens(self.tracker_queries.config()))
            .await;
        info!(jobs = self.scheduler.jobs().len(), "scheduler started");
    }

    pub fn shutdown(&self) {
        self.scheduler.shutdown();
    }

    pub async fn create_identity(&self, identity: Identity) -> WitResult<Identity> {
        IdentityStore::create(self.store.as_ref(), identity).await
    }

    pub async fn create_space(&self, space: Space) -> WitResult<Space> {
        SpaceStore::create(self.store.as_ref(), space).await
    }

    pub async fn create_tracker(&self, tracker: Tracker) -> WitResult<Tracker> {
        TrackerStore::create(self.store.as_ref(), tracker).await
    }

    pub async fn create_work_item_type(
        &self,
        work_item_type: WorkItemType,
    ) -> WitResult<WorkItemType> {
        WorkItemTypeStore::create(self.store.as_ref(), work_item_type).await
    }

    pub async fn create_work_item(&self, item: WorkItem) -> WitResult<WorkItem> {
        WorkItemStore::create(self.store.as_ref(), item).await
    }

    pub async fn load_work_item(&self, id: WorkItemId) -> WitResult<WorkItem> {
        WorkItemStore::load(self.store.as_ref(), id).await
    }

    pub async fn append_revision(&self, revision: &Revision) -> WitResult<()> {
        self.revisions.append(revision).await
    }

    /// Records a new revision of an existing work item, stamped now (or just
    /// after the latest revision if the clock is behind it). The revision is
    /// typed as the work item unless `work_item_type` overrides it.
    #[instrument(skip(self, fields), fields(work_item_id = %work_item_id, modifier = %modifier))]
    pub async fn record_revision(
        &self,
        work_item_id: WorkItemId,
        modifier: IdentityId,
        work_item_type: Option<WorkItemTypeId>,
        fields: FieldMap,
    ) -> WitResult<Revision> {
        let item = WorkItemStore::load(self.store.as_ref(), work_item_id).await?;
        IdentityStore::load(self.store.as_ref(), modifier)
            .await
            .wrap_err_with(|| format!("failed to load modifier identity {modifier}"))?;
        let work_item_type = work_item_type.unwrap_or(item.work_item_type);
        WorkItemTypeStore::load(self.store.as_ref(), work_item_type)
            .await
            .wrap_err_with(|| format!("failed to load work item type {work_item_type}"))?;

        let mut revision = Revision::new(work_item_id, modifier, work_item_type, fields);
        let latest = self
            .revisions
            .list(work_item_id)
            .await?
            .last()
            .map(|last| last.time);
        if let Some(latest) = latest
            && revision.time <= latest
        {
            revision.time = latest + chrono::Duration::microseconds(1);
        }
        self.revisions.append(&revision).await?;
        info!(revision_id = %revision.id, "revision recorded");
        Ok(revision)
    }
}
