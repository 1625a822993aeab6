//! Work item change events reconstructed from revisions.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::ids::{IdentityId, RevisionId, WorkItemTypeId};
use crate::value::ScalarValue;

/// Resource type name of events in API responses.
pub const API_STRING_TYPE_EVENTS: &str = "events";

/// Reserved event name for a change of the work item type.
pub const WORKITEM_TYPE_CHANGE_EVENT: &str = "workitemtype";

/// Old or new side of a change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ChangeValue {
    Scalar(ScalarValue),
    List(Vec<ScalarValue>),
    WorkItemType(WorkItemTypeId),
}

/// One reported change between two adjacent revisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    /// The newer revision of the pair.
    pub revision_id: RevisionId,
    pub name: String,
    pub work_item_type: WorkItemTypeId,
    pub timestamp: DateTime<Utc>,
    pub modifier: IdentityId,
    pub old: ChangeValue,
    pub new: ChangeValue,
}

impl Event {
    pub fn is_type_change(&self) -> bool {
        self.name == WORKITEM_TYPE_CHANGE_EVENT
    }
}

pub type EventList = Vec<Event>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    #[test]
    fn change_values_serialize_untagged() {
        let event = Event {
            revision_id: RevisionId::from(Uuid::nil()),
            name: "labels".to_owned(),
            work_item_type: WorkItemTypeId::from(Uuid::nil()),
            timestamp: DateTime::from_timestamp(0, 0).unwrap(),
            modifier: IdentityId::from(Uuid::nil()),
            old: ChangeValue::List(vec![]),
            new: ChangeValue::List(vec![ScalarValue::from("a")]),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["old"], json!([]));
        assert_eq!(json["new"], json!(["a"]));
        assert_eq!(json["timestamp"], json!("1970-01-01T00:00:00Z"));
        assert!(!event.is_type_change());
    }
}
