//! JSON:API documents for events and tracker queries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use witrack_kernel::CreateTrackerQuery;
use witrack_protocol::{
    API_STRING_TYPE_EVENTS, API_STRING_TYPE_TRACKER_QUERY, ChangeValue, Event, IdentityId,
    RevisionId, SpaceId, TrackerId, TrackerQuery, TrackerQueryId, WorkItemTypeId,
};

pub const API_STRING_TYPE_IDENTITIES: &str = "identities";
pub const API_STRING_TYPE_WORK_ITEM_TYPES: &str = "workitemtypes";
pub const API_STRING_TYPE_TRACKERS: &str = "trackers";
pub const API_STRING_TYPE_SPACES: &str = "spaces";

pub fn tracker_query_href(id: TrackerQueryId) -> String {
    format!("/{API_STRING_TYPE_TRACKER_QUERY}/{id}")
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Document<T> {
    pub data: T,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationData<I> {
    pub id: I,
    #[serde(rename = "type", default)]
    pub kind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relation<I> {
    pub data: RelationData<I>,
}

impl<I> Relation<I> {
    fn to(kind: &str, id: I) -> Self {
        Self {
            data: RelationData {
                id,
                kind: kind.to_owned(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EventResource {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub id: RevisionId,
    pub attributes: EventAttributes,
    pub relationships: EventRelationships,
}

#[derive(Debug, Serialize)]
pub struct EventAttributes {
    pub name: String,
    pub timestamp: DateTime<Utc>,
    pub old: ChangeValue,
    pub new: ChangeValue,
}

#[derive(Debug, Serialize)]
pub struct EventRelationships {
    pub modifier: Relation<IdentityId>,
    pub workitemtype: Relation<WorkItemTypeId>,
}

impl From<Event> for EventResource {
    fn from(event: Event) -> Self {
        Self {
            kind: API_STRING_TYPE_EVENTS,
            id: event.revision_id,
            attributes: EventAttributes {
                name: event.name,
                timestamp: event.timestamp,
                old: event.old,
                new: event.new,
            },
            relationships: EventRelationships {
                modifier: Relation::to(API_STRING_TYPE_IDENTITIES, event.modifier),
                workitemtype: Relation::to(API_STRING_TYPE_WORK_ITEM_TYPES, event.work_item_type),
            },
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct TrackerQueryAttributes {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub schedule: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct TrackerQueryRelationships {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracker: Option<Relation<TrackerId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub space: Option<Relation<SpaceId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workitemtype: Option<Relation<WorkItemTypeId>>,
}

#[derive(Debug, Serialize)]
pub struct Links {
    #[serde(rename = "self")]
    pub self_link: String,
}

#[derive(Debug, Serialize)]
pub struct TrackerQueryResource {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub id: TrackerQueryId,
    pub attributes: TrackerQueryAttributes,
    pub relationships: TrackerQueryRelationships,
    pub links: Links,
}

impl From<TrackerQuery> for TrackerQueryResource {
    fn from(query: TrackerQuery) -> Self {
        Self {
            kind: API_STRING_TYPE_TRACKER_QUERY,
            id: query.id,
            attributes: TrackerQueryAttributes {
                query: query.query,
                schedule: query.schedule,
            },
            relationships: TrackerQueryRelationships {
                tracker: Some(Relation::to(API_STRING_TYPE_TRACKERS, query.tracker_id)),
                space: Some(Relation::to(API_STRING_TYPE_SPACES, query.space_id)),
                workitemtype: query
                    .work_item_type
                    .map(|id| Relation::to(API_STRING_TYPE_WORK_ITEM_TYPES, id)),
            },
            links: Links {
                self_link: tracker_query_href(query.id),
            },
        }
    }
}

/// Body of `POST /trackerqueries`.
#[derive(Debug, Default, Deserialize)]
pub struct CreateTrackerQueryData {
    #[serde(default)]
    pub id: Option<TrackerQueryId>,
    #[serde(default)]
    pub attributes: TrackerQueryAttributes,
    #[serde(default)]
    pub relationships: TrackerQueryRelationships,
}

impl From<CreateTrackerQueryData> for CreateTrackerQuery {
    fn from(data: CreateTrackerQueryData) -> Self {
        let relationships = data.relationships;
        Self {
            id: data.id,
            query: data.attributes.query,
            schedule: data.attributes.schedule,
            tracker_id: relationships
                .tracker
                .map(|relation| relation.data.id)
                .unwrap_or_else(TrackerId::nil),
            space_id: relationships
                .space
                .map(|relation| relation.data.id)
                .unwrap_or_else(SpaceId::nil),
            work_item_type: relationships.workitemtype.map(|relation| relation.data.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use witrack_kernel::CreateTrackerQuery;
    use witrack_protocol::{SpaceId, TrackerId, TrackerQuery, TrackerQueryId};

    use super::{CreateTrackerQueryData, Document, TrackerQueryResource};

    #[test]
    fn create_document_maps_relationships() -> Result<(), serde_json::Error> {
        let tracker = TrackerId::new();
        let space = SpaceId::new();
        let document: Document<CreateTrackerQueryData> = serde_json::from_value(json!({
            "data": {
                "type": "trackerqueries",
                "attributes": { "query": "is:open", "schedule": "@hourly" },
                "relationships": {
                    "tracker": { "data": { "id": tracker, "type": "trackers" } },
                    "space": { "data": { "id": space, "type": "spaces" } }
                }
            }
        }))?;

        let payload = CreateTrackerQuery::from(document.data);
        assert_eq!(payload.tracker_id, tracker);
        assert_eq!(payload.space_id, space);
        assert_eq!(payload.query, "is:open");
        assert!(payload.id.is_none());
        assert!(payload.work_item_type.is_none());
        Ok(())
    }

    #[test]
    fn missing_relationships_become_nil() -> Result<(), serde_json::Error> {
        let document: Document<CreateTrackerQueryData> =
            serde_json::from_value(json!({ "data": { "attributes": { "query": "q" } } }))?;
        let payload = CreateTrackerQuery::from(document.data);
        assert!(payload.tracker_id.is_nil());
        assert!(payload.space_id.is_nil());
        assert!(payload.schedule.is_empty());
        Ok(())
    }

    #[test]
    fn tracker_query_resource_links_self() -> Result<(), serde_json::Error> {
        let query = TrackerQuery {
            id: TrackerQueryId::new(),
            query: "is:open".to_owned(),
            schedule: "@daily".to_owned(),
            tracker_id: TrackerId::new(),
            space_id: SpaceId::new(),
            work_item_type: None,
        };
        let id = query.id;
        let value = serde_json::to_value(TrackerQueryResource::from(query))?;
        assert_eq!(value["type"], "trackerqueries");
        assert_eq!(value["links"]["self"], format!("/trackerqueries/{id}"));
        assert_eq!(value["relationships"]["space"]["data"]["type"], "spaces");
        assert!(value["relationships"].get("workitemtype").is_none());
        Ok(())
    }
}
