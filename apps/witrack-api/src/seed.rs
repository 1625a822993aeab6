//! Plain JSON routes that create the entities tracker queries and events
//! refer to: identities, spaces, trackers, work item types, work items and
//! their revisions.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use indexmap::IndexMap;
use serde::Deserialize;
use witrack_protocol::{
    FieldDefinition, FieldMap, Identity, Revision, Space, SpaceId, Tracker, TrackerQueryId,
    WorkItem, WorkItemId, WorkItemType, WorkItemTypeId,
};

use crate::{ApiError, ApiResult, AppState, IDENTITY_HEADER, identity_from_headers, parse_uuid};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/identities", post(create_identity))
        .route("/spaces", post(create_space))
        .route("/trackers", post(create_tracker))
        .route("/workitemtypes", post(create_work_item_type))
        .route("/workitems", post(create_work_item))
        .route("/workitems/{work_item_id}/revisions", post(record_revision))
}

type Created<T> = (StatusCode, Json<T>);

fn created<T>(value: T) -> Created<T> {
    (StatusCode::CREATED, Json(value))
}

#[derive(Debug, Deserialize)]
struct CreateIdentityRequest {
    username: String,
}

#[derive(Debug, Deserialize)]
struct CreateSpaceRequest {
    name: String,
}

#[derive(Debug, Deserialize)]
struct CreateTrackerRequest {
    url: String,
    provider: String,
}

#[derive(Debug, Deserialize)]
struct CreateWorkItemTypeRequest {
    name: String,
    #[serde(default)]
    fields: IndexMap<String, FieldDefinition>,
}

#[derive(Debug, Deserialize)]
struct CreateWorkItemRequest {
    space_id: SpaceId,
    work_item_type: WorkItemTypeId,
    #[serde(default)]
    tracker_query: Option<TrackerQueryId>,
    #[serde(default)]
    fields: FieldMap,
}

#[derive(Debug, Deserialize)]
struct RecordRevisionRequest {
    #[serde(default)]
    work_item_type: Option<WorkItemTypeId>,
    #[serde(default)]
    fields: FieldMap,
}

async fn create_identity(
    State(state): State<AppState>,
    Json(request): Json<CreateIdentityRequest>,
) -> ApiResult<Created<Identity>> {
    if request.username.trim().is_empty() {
        return Err(ApiError::bad_request("username must not be empty"));
    }
    let identity = state
        .kernel
        .create_identity(Identity::new(request.username))
        .await?;
    Ok(created(identity))
}

async fn create_space(
    State(state): State<AppState>,
    Json(request): Json<CreateSpaceRequest>,
) -> ApiResult<Created<Space>> {
    let space = state.kernel.create_space(Space::new(request.name)).await?;
    Ok(created(space))
}

async fn create_tracker(
    State(state): State<AppState>,
    Json(request): Json<CreateTrackerRequest>,
) -> ApiResult<Created<Tracker>> {
    let tracker = state
        .kernel
        .create_tracker(Tracker::new(request.url, request.provider))
        .await?;
    Ok(created(tracker))
}

async fn create_work_item_type(
    State(state): State<AppState>,
    Json(request): Json<CreateWorkItemTypeRequest>,
) -> ApiResult<Created<WorkItemType>> {
    let mut work_item_type = WorkItemType::new(request.name);
    work_item_type.fields = request.fields;
    let work_item_type = state.kernel.create_work_item_type(work_item_type).await?;
    Ok(created(work_item_type))
}

async fn create_work_item(
    State(state): State<AppState>,
    Json(request): Json<CreateWorkItemRequest>,
) -> ApiResult<Created<WorkItem>> {
    let mut item = WorkItem::new(request.space_id, request.work_item_type);
    item.tracker_query = request.tracker_query;
    item.fields = request.fields;
    let item = state.kernel.create_work_item(item).await?;
    Ok(created(item))
}

async fn record_revision(
    Path(work_item_id): Path<String>,
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    Json(request): Json<RecordRevisionRequest>,
) -> ApiResult<Created<Revision>> {
    let work_item_id = WorkItemId(parse_uuid("work item", &work_item_id)?);
    let modifier = identity_from_headers(&headers)?
        .ok_or_else(|| ApiError::unauthorized(format!("missing {IDENTITY_HEADER} header")))?;
    let revision = state
        .kernel
        .record_revision(
            work_item_id,
            modifier,
            request.work_item_type,
            request.fields,
        )
        .await?;
    Ok(created(revision))
}
