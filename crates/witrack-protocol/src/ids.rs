//! Typed ID wrappers for the work item tracker.
//!
//! Every ID is a serde-transparent UUID. The nil UUID is representable so
//! that payload validation can reject it explicitly.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! typed_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new ID using UUID v4 (random).
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// The nil ID, never a valid reference.
            pub fn nil() -> Self {
                Self(Uuid::nil())
            }

            pub fn is_nil(&self) -> bool {
                self.0.is_nil()
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

typed_id!(
    /// Unique identifier for a work item.
    WorkItemId
);
typed_id!(
    /// Unique identifier for a work item type (the field schema).
    WorkItemTypeId
);
typed_id!(
    /// Unique identifier for a stored work item revision.
    RevisionId
);
typed_id!(
    /// Unique identifier for a user identity.
    IdentityId
);
typed_id!(
    /// Unique identifier for a space (project).
    SpaceId
);
typed_id!(
    /// Unique identifier for a remote tracker.
    TrackerId
);
typed_id!(
    /// Unique identifier for a saved tracker query.
    TrackerQueryId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_ids_are_unique() {
        let a = WorkItemId::new();
        let b = WorkItemId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn nil_id_is_detected() {
        assert!(SpaceId::nil().is_nil());
        assert!(!SpaceId::new().is_nil());
    }

    #[test]
    fn id_parses_from_str() {
        let raw = "6f1c7d2e-3a4b-4c5d-8e9f-0a1b2c3d4e5f";
        let id: TrackerQueryId = raw.parse().unwrap();
        assert_eq!(id.to_string(), raw);
        assert!("not-a-uuid".parse::<TrackerQueryId>().is_err());
    }

    #[test]
    fn id_serializes_transparently() {
        let id = RevisionId::from(Uuid::nil());
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"00000000-0000-0000-0000-000000000000\"");
        let back: RevisionId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
