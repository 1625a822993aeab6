//! Storage backends for the witrack ports.
//!
//! - [`InMemoryStore`] implements every port over process memory.
//! - [`FileRevisionStore`] persists revision history as JSONL files.

mod file;
mod memory;

use chrono::{DateTime, Utc};
use witrack_protocol::{Revision, WitError, WitResult};

pub use file::FileRevisionStore;
pub use memory::InMemoryStore;

/// Revisions of one work item must be strictly time-ordered.
fn ensure_after_latest(latest: Option<DateTime<Utc>>, revision: &Revision) -> WitResult<()> {
    match latest {
        Some(latest) if revision.time <= latest => Err(WitError::bad_parameter(
            "revision time",
            revision.time.to_rfc3339(),
        )
        .expected(format!("after {}", latest.to_rfc3339()))),
        _ => Ok(()),
    }
}
