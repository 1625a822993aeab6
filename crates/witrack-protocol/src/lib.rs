//! # witrack-protocol: shared work item tracker contracts
//!
//! Types, error taxonomy and trait interfaces shared by every witrack crate.
//! Kept free of runtime dependencies (no tokio, no axum) so it can be used as
//! a pure contract crate.
//!
//! ## Module Overview
//!
//! - [`ids`]: Typed UUID wrappers (WorkItemId, RevisionId, SpaceId, ...)
//! - [`error`]: WitError, WitResult, ResultExt
//! - [`value`]: ScalarValue, Markup (comparable converted values)
//! - [`schema`]: Kind, FieldType, WorkItemType (field schema + conversion)
//! - [`workitem`]: Revision, WorkItem, Identity, Space, Tracker, TrackerQuery
//! - [`event`]: Event, ChangeValue, type-change sentinel
//! - [`ports`]: Storage and scheduler boundary traits

pub mod error;
pub mod event;
pub mod ids;
pub mod ports;
pub mod schema;
pub mod value;
pub mod workitem;

pub use error::{ResultExt, WitError, WitResult};
pub use event::{
    API_STRING_TYPE_EVENTS, ChangeValue, Event, EventList, WORKITEM_TYPE_CHANGE_EVENT,
};
pub use ids::{
    IdentityId, RevisionId, SpaceId, TrackerId, TrackerQueryId, WorkItemId, WorkItemTypeId,
};
pub use ports::{
    AccessTokens, IdentityStore, RevisionStore, SchedulerPort, SpaceStore, TrackerQueryStore,
    TrackerStore, WorkItemSearch, WorkItemStore, WorkItemTypeStore,
};
pub use schema::{EnumType, FieldDefinition, FieldType, Kind, ListType, SimpleType, WorkItemType};
pub use value::{Markup, ScalarValue};
pub use workitem::{
    API_STRING_TYPE_TRACKER_QUERY, FieldMap, Identity, PROVIDER_GITHUB, PROVIDER_JIRA, Revision,
    Space, Tracker, TrackerQuery, WorkItem, WorkItemFilter,
};
