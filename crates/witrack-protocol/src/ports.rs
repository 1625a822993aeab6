//! Storage and scheduling ports.
//!
//! These traits are the boundary between the tracker core and its external
//! collaborators (relational storage, identity registry, work item type
//! registry, remote import scheduler). All are object safe through
//! `async-trait` so implementations can be swapped behind `Arc<dyn _>`.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::WitResult;
use crate::ids::{IdentityId, SpaceId, TrackerId, TrackerQueryId, WorkItemId, WorkItemTypeId};
use crate::schema::WorkItemType;
use crate::workitem::{
    Identity, Revision, Space, Tracker, TrackerQuery, WorkItem, WorkItemFilter,
};

/// Provider name to access token.
pub type AccessTokens = HashMap<String, String>;

#[async_trait]
pub trait RevisionStore: Send + Sync {
    /// All revisions of a work item, oldest first.
    async fn list(&self, work_item_id: WorkItemId) -> WitResult<Vec<Revision>>;
    async fn append(&self, revision: &Revision) -> WitResult<()>;
}

#[async_trait]
pub trait WorkItemStore: Send + Sync {
    async fn check_exists(&self, id: WorkItemId) -> WitResult<()>;
    async fn load(&self, id: WorkItemId) -> WitResult<WorkItem>;
    async fn create(&self, item: WorkItem) -> WitResult<WorkItem>;
    async fn delete(&self, id: WorkItemId, deleted_by: IdentityId) -> WitResult<()>;
}

#[async_trait]
pub trait WorkItemSearch: Send + Sync {
    async fn filter(&self, filter: &WorkItemFilter) -> WitResult<Vec<WorkItem>>;
}

#[async_trait]
pub trait WorkItemTypeStore: Send + Sync {
    async fn load(&self, id: WorkItemTypeId) -> WitResult<WorkItemType>;
    async fn create(&self, work_item_type: WorkItemType) -> WitResult<WorkItemType>;
}

#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn load(&self, id: IdentityId) -> WitResult<Identity>;
    async fn create(&self, identity: Identity) -> WitResult<Identity>;
}

#[async_trait]
pub trait SpaceStore: Send + Sync {
    async fn check_exists(&self, id: SpaceId) -> WitResult<()>;
    async fn create(&self, space: Space) -> WitResult<Space>;
}

#[async_trait]
pub trait TrackerStore: Send + Sync {
    async fn check_exists(&self, id: TrackerId) -> WitResult<()>;
    async fn load(&self, id: TrackerId) -> WitResult<Tracker>;
    async fn create(&self, tracker: Tracker) -> WitResult<Tracker>;
}

#[async_trait]
pub trait TrackerQueryStore: Send + Sync {
    async fn check_exists(&self, id: TrackerQueryId) -> WitResult<()>;
    async fn load(&self, id: TrackerQueryId) -> WitResult<TrackerQuery>;
    async fn create(&self, query: TrackerQuery) -> WitResult<TrackerQuery>;
    async fn delete(&self, id: TrackerQueryId) -> WitResult<()>;
    async fn list(&self) -> WitResult<Vec<TrackerQuery>>;
}

/// Re-plans the periodic remote imports.
#[async_trait]
pub trait SchedulerPort: Send + Sync {
    async fn schedule_all_queries(&self, access_tokens: AccessTokens);
}
