use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};
use witrack_policy::{AuthService, Scope};
use witrack_protocol::{
    AccessTokens, IdentityId, PROVIDER_GITHUB, ResultExt, SchedulerPort, SpaceId, SpaceStore,
    TrackerId, TrackerQuery, TrackerQueryId, TrackerQueryStore, TrackerStore, WitError, WitResult,
    WorkItemFilter, WorkItemSearch, WorkItemStore, WorkItemTypeId,
};

/// Settings the tracker query endpoints read at request time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerQueryConfig {
    #[serde(default)]
    pub github_auth_token: String,
    #[serde(default = "default_cache_control")]
    pub cache_control_tracker_queries: String,
}

fn default_cache_control() -> String {
    "max-age=300".to_owned()
}

impl Default for TrackerQueryConfig {
    fn default() -> Self {
        Self {
            github_auth_token: String::new(),
            cache_control_tracker_queries: default_cache_control(),
        }
    }
}

/// Provider name to access token, handed to the scheduler on every re-plan.
pub fn access_tokens(config: &TrackerQueryConfig) -> AccessTokens {
    AccessTokens::from([(
        PROVIDER_GITHUB.to_owned(),
        config.github_auth_token.clone(),
    )])
}

/// Input of [`TrackerQueryService::create`]. Absent relationship ids
/// deserialize to nil and are rejected by validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTrackerQuery {
    #[serde(default)]
    pub id: Option<TrackerQueryId>,
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub schedule: String,
    #[serde(default = "TrackerId::nil")]
    pub tracker_id: TrackerId,
    #[serde(default = "SpaceId::nil")]
    pub space_id: SpaceId,
    #[serde(default)]
    pub work_item_type: Option<WorkItemTypeId>,
}

impl CreateTrackerQuery {
    fn validate(&self) -> WitResult<()> {
        if self.query.is_empty() {
            return Err(WitError::bad_parameter("Query", "").expected("not empty"));
        }
        if self.schedule.is_empty() {
            return Err(WitError::bad_parameter("Schedule", "").expected("not empty"));
        }
        if self.tracker_id.is_nil() {
            return Err(WitError::bad_parameter("TrackerID", self.tracker_id).expected("not nil"));
        }
        if self.space_id.is_nil() {
            return Err(WitError::bad_parameter("SpaceID", self.space_id).expected("not nil"));
        }
        Ok(())
    }
}

/// Stores the tracker query lifecycle reads and writes.
#[derive(Clone)]
pub struct TrackerQueryStores {
    pub queries: Arc<dyn TrackerQueryStore>,
    pub spaces: Arc<dyn SpaceStore>,
    pub trackers: Arc<dyn TrackerStore>,
    pub work_items: Arc<dyn WorkItemStore>,
    pub search: Arc<dyn WorkItemSearch>,
}

/// Create, show and delete of tracker queries. Every successful mutation
/// re-plans the import scheduler.
#[derive(Clone)]
pub struct TrackerQueryService {
    stores: TrackerQueryStores,
    auth: Arc<dyn AuthService>,
    scheduler: Arc<dyn SchedulerPort>,
    config: TrackerQueryConfig,
}

impl TrackerQueryService {
    pub fn new(
        stores: TrackerQueryStores,
        auth: Arc<dyn AuthService>,
        scheduler: Arc<dyn SchedulerPort>,
        config: TrackerQueryConfig,
    ) -> Self {
        Self {
            stores,
            auth,
            scheduler,
            config,
        }
    }

    pub fn config(&self) -> &TrackerQueryConfig {
        &self.config
    }

    #[instrument(
        skip(self, payload),
        fields(space_id = %payload.space_id, tracker_id = %payload.tracker_id)
    )]
    pub async fn create(
        &self,
        identity: Option<IdentityId>,
        payload: CreateTrackerQuery,
    ) -> WitResult<TrackerQuery> {
        let identity = require_identity(identity)?;
        payload.validate()?;
        self.auth
            .require_scope(identity, payload.space_id, &Scope::contribute())
            .await?;

        if let Err(error) = self.stores.spaces.check_exists(payload.space_id).await {
            error!(%error, space_id = %payload.space_id, "unable to load space");
            return Err(WitError::bad_parameter("space", payload.space_id).expected("valid space ID"));
        }
        if let Err(error) = self.stores.trackers.check_exists(payload.tracker_id).await {
            error!(%error, tracker_id = %payload.tracker_id, "unable to load tracker");
            return Err(
                WitError::bad_parameter("tracker", payload.tracker_id).expected("valid tracker ID")
            );
        }
        if let Some(id) = payload.id
            && (id.is_nil() || self.stores.queries.check_exists(id).await.is_ok())
        {
            return Err(WitError::bad_parameter("trackerquery", id).expected("valid trackerquery ID"));
        }

        let query = TrackerQuery {
            id: payload.id.unwrap_or_default(),
            query: payload.query,
            schedule: payload.schedule,
            tracker_id: payload.tracker_id,
            space_id: payload.space_id,
            work_item_type: payload.work_item_type,
        };
        let query_id = query.id;
        let created = self
            .stores
            .queries
            .create(query)
            .await
            .wrap_err_with(|| format!("failed to create tracker query {query_id}"))?;
        info!(query_id = %created.id, created_by = %identity, "tracker query created");

        self.reschedule().await;
        Ok(created)
    }

    #[instrument(skip(self), fields(query_id = %id))]
    pub async fn show(&self, id: TrackerQueryId) -> WitResult<TrackerQuery> {
        self.stores
            .queries
            .load(id)
            .await
            .wrap_err_with(|| format!("failed to load tracker query {id}"))
    }

    /// Deletes the query and, with `delete_work_items`, every work item it
    /// imported into its space. Work items deleted before a failing one stay
    /// deleted.
    #[instrument(skip(self), fields(query_id = %id))]
    pub async fn delete(
        &self,
        identity: Option<IdentityId>,
        id: TrackerQueryId,
        delete_work_items: bool,
    ) -> WitResult<()> {
        let identity = require_identity(identity)?;
        let query = self
            .stores
            .queries
            .load(id)
            .await
            .wrap_err_with(|| format!("failed to delete tracker query {id}"))?;
        self.auth
            .require_scope(identity, query.space_id, &Scope::contribute())
            .await?;

        if delete_work_items {
            let filter = WorkItemFilter {
                space_id: query.space_id,
                tracker_query_id: query.id,
            };
            let items = self
                .stores
                .search
                .filter(&filter)
                .await
                .wrap_err("unable to list the work items")?;
            for item in &items {
                self.stores
                    .work_items
                    .delete(item.id, identity)
                    .await
                    .wrap_err_with(|| format!("error deleting work item {}", item.id))?;
            }
            info!(deleted = items.len(), "imported work items deleted");
        }

        self.stores
            .queries
            .delete(query.id)
            .await
            .wrap_err_with(|| format!("failed to delete tracker query {id}"))?;
        info!(deleted_by = %identity, "tracker query deleted");

        self.reschedule().await;
        Ok(())
    }

    async fn reschedule(&self) {
        self.scheduler
            .schedule_all_queries(access_tokens(&self.config))
            .await;
    }
}

fn require_identity(identity: Option<IdentityId>) -> WitResult<IdentityId> {
    identity.ok_or_else(|| WitError::Unauthorized("missing identity".to_owned()))
}
