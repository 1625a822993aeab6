//! Work items, their revisions, and the surrounding entities (identities,
//! spaces, remote trackers and tracker queries).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ids::{
    IdentityId, RevisionId, SpaceId, TrackerId, TrackerQueryId, WorkItemId, WorkItemTypeId,
};

pub const API_STRING_TYPE_TRACKER_QUERY: &str = "trackerqueries";

pub const PROVIDER_GITHUB: &str = "github";
pub const PROVIDER_JIRA: &str = "jira";

/// Stored field values, keyed by field name.
pub type FieldMap = Map<String, Value>;

/// Immutable snapshot of a work item at one point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Revision {
    pub id: RevisionId,
    pub work_item_id: WorkItemId,
    pub time: DateTime<Utc>,
    pub modifier: IdentityId,
    pub work_item_type: WorkItemTypeId,
    #[serde(default)]
    pub fields: FieldMap,
}

impl Revision {
    pub fn new(
        work_item_id: WorkItemId,
        modifier: IdentityId,
        work_item_type: WorkItemTypeId,
        fields: FieldMap,
    ) -> Self {
        Self {
            id: RevisionId::new(),
            work_item_id,
            time: Utc::now(),
            modifier,
            work_item_type,
            fields,
        }
    }

    /// Stored value of a field; a missing key reads as `null`.
    pub fn field(&self, name: &str) -> &Value {
        self.fields.get(name).unwrap_or(&Value::Null)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: WorkItemId,
    pub space_id: SpaceId,
    pub work_item_type: WorkItemTypeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracker_query: Option<TrackerQueryId>,
    #[serde(default)]
    pub fields: FieldMap,
}

impl WorkItem {
    pub fn new(space_id: SpaceId, work_item_type: WorkItemTypeId) -> Self {
        Self {
            id: WorkItemId::new(),
            space_id,
            work_item_type,
            tracker_query: None,
            fields: FieldMap::new(),
        }
    }

    pub fn imported_by(mut self, tracker_query: TrackerQueryId) -> Self {
        self.tracker_query = Some(tracker_query);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: IdentityId,
    pub username: String,
}

impl Identity {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            id: IdentityId::new(),
            username: username.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Space {
    pub id: SpaceId,
    pub name: String,
}

impl Space {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: SpaceId::new(),
            name: name.into(),
        }
    }
}

/// A remote issue tracker work items are imported from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tracker {
    pub id: TrackerId,
    pub url: String,
    pub provider: String,
}

impl Tracker {
    pub fn new(url: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            id: TrackerId::new(),
            url: url.into(),
            provider: provider.into(),
        }
    }
}

/// A saved query against a remote tracker, re-run on a schedule to import
/// matching items into a space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerQuery {
    pub id: TrackerQueryId,
    pub query: String,
    pub schedule: String,
    pub tracker_id: TrackerId,
    pub space_id: SpaceId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_item_type: Option<WorkItemTypeId>,
}

/// Selects the work items of one space imported by one tracker query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkItemFilter {
    pub space_id: SpaceId,
    pub tracker_query_id: TrackerQueryId,
}

impl WorkItemFilter {
    pub fn matches(&self, item: &WorkItem) -> bool {
        item.space_id == self.space_id && item.tracker_query == Some(self.tracker_query_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_field_reads_as_null() {
        let mut fields = FieldMap::new();
        fields.insert("title".to_owned(), json!("hello"));
        let revision = Revision::new(
            WorkItemId::new(),
            IdentityId::new(),
            WorkItemTypeId::new(),
            fields,
        );
        assert_eq!(revision.field("title"), &json!("hello"));
        assert!(revision.field("missing").is_null());
    }

    #[test]
    fn filter_requires_space_and_query() {
        let space = SpaceId::new();
        let query = TrackerQueryId::new();
        let filter = WorkItemFilter {
            space_id: space,
            tracker_query_id: query,
        };

        let imported = WorkItem::new(space, WorkItemTypeId::new()).imported_by(query);
        let local = WorkItem::new(space, WorkItemTypeId::new());
        let elsewhere = WorkItem::new(SpaceId::new(), WorkItemTypeId::new()).imported_by(query);

        assert!(filter.matches(&imported));
        assert!(!filter.matches(&local));
        assert!(!filter.matches(&elsewhere));
    }
}
