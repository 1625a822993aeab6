//! Work item event reconstruction.
//!
//! Revisions are immutable snapshots of a work item. The change history is
//! rebuilt on demand by comparing every adjacent pair of revisions under the
//! field schema of the older revision's work item type.

use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};
use witrack_protocol::{
    ChangeValue, Event, EventList, FieldType, IdentityStore, Kind, ResultExt, Revision,
    RevisionStore, ScalarValue, WORKITEM_TYPE_CHANGE_EVENT, WitError, WitResult, WorkItemId,
    WorkItemStore, WorkItemTypeStore,
};

#[derive(Clone)]
pub struct EventRepository {
    revisions: Arc<dyn RevisionStore>,
    work_items: Arc<dyn WorkItemStore>,
    work_item_types: Arc<dyn WorkItemTypeStore>,
    identities: Arc<dyn IdentityStore>,
}

impl EventRepository {
    pub fn new(
        revisions: Arc<dyn RevisionStore>,
        work_items: Arc<dyn WorkItemStore>,
        work_item_types: Arc<dyn WorkItemTypeStore>,
        identities: Arc<dyn IdentityStore>,
    ) -> Self {
        Self {
            revisions,
            work_items,
            work_item_types,
            identities,
        }
    }

    /// All events of a work item, oldest first.
    pub async fn list(&self, work_item_id: WorkItemId) -> WitResult<EventList> {
        self.list_with_cancel(work_item_id, &CancellationToken::new())
            .await
    }

    /// Like [`EventRepository::list`], checking `cancel` before every
    /// revision pair. Any failure aborts the whole call.
    #[instrument(skip(self, cancel), fields(work_item_id = %work_item_id))]
    pub async fn list_with_cancel(
        &self,
        work_item_id: WorkItemId,
        cancel: &CancellationToken,
    ) -> WitResult<EventList> {
        let revisions = self
            .revisions
            .list(work_item_id)
            .await
            .wrap_err_with(|| format!("failed to list revisions for work item {work_item_id}"))?;
        if revisions.is_empty() {
            return Ok(EventList::new());
        }
        self.work_items
            .check_exists(work_item_id)
            .await
            .wrap_err_with(|| format!("failed to find work item: {work_item_id}"))?;

        let mut events = EventList::new();
        for pair in revisions.windows(2) {
            if cancel.is_cancelled() {
                return Err(WitError::Cancelled);
            }
            self.diff_revisions(&pair[0], &pair[1], &mut events).await?;
        }

        debug!(
            revisions = revisions.len(),
            events = events.len(),
            "work item events reconstructed"
        );
        Ok(events)
    }

    async fn diff_revisions(
        &self,
        old_rev: &Revision,
        new_rev: &Revision,
        events: &mut EventList,
    ) -> WitResult<()> {
        let wit = self
            .work_item_types
            .load(old_rev.work_item_type)
            .await
            .wrap_err_with(|| {
                format!(
                    "failed to load old work item type: {}",
                    old_rev.work_item_type
                )
            })?;

        let modifier = self
            .identities
            .load(new_rev.modifier)
            .await
            .wrap_err_with(|| format!("failed to load modifier identity {}", new_rev.modifier))?;

        let event = |name: &str, old: ChangeValue, new: ChangeValue| Event {
            revision_id: new_rev.id,
            name: name.to_owned(),
            work_item_type: new_rev.work_item_type,
            timestamp: new_rev.time,
            modifier: modifier.id,
            old,
            new,
        };

        // A type change replaces the field diff for this pair.
        if old_rev.work_item_type != new_rev.work_item_type {
            events.push(event(
                WORKITEM_TYPE_CHANGE_EVENT,
                ChangeValue::WorkItemType(old_rev.work_item_type),
                ChangeValue::WorkItemType(new_rev.work_item_type),
            ));
            return Ok(());
        }

        for (name, definition) in &wit.fields {
            let changed = diff_field(
                name,
                &definition.field_type,
                old_rev.field(name),
                new_rev.field(name),
            )?;
            if let Some((old, new)) = changed {
                events.push(event(name, old, new));
            }
        }
        Ok(())
    }
}

/// Converted old and new values of a field, or `None` when they are equal.
pub fn diff_field(
    name: &str,
    field_type: &FieldType,
    old: &Value,
    new: &Value,
) -> WitResult<Option<(ChangeValue, ChangeValue)>> {
    match field_type {
        FieldType::List(list) if list.component.kind.is_simple() => {
            let old = convert(name, "old", old, |v| list.convert_from_storage(v))?;
            let new = convert(name, "new", new, |v| list.convert_from_storage(v))?;
            Ok((old != new).then(|| (ChangeValue::List(old), ChangeValue::List(new))))
        }
        // Enum conversion validates membership, which the base type alone
        // does not.
        FieldType::Enum(enumeration) if enumeration.base.kind.is_simple() => {
            diff_scalar(name, old, new, |v| enumeration.convert_from_storage(v))
        }
        FieldType::Simple(simple) if simple.kind.is_simple() => {
            diff_scalar(name, old, new, |v| simple.convert_from_storage(v))
        }
        other => Err(WitError::UnknownFieldType(
            unsupported_kind(other).to_string(),
        )),
    }
}

fn diff_scalar<F>(
    name: &str,
    old: &Value,
    new: &Value,
    converter: F,
) -> WitResult<Option<(ChangeValue, ChangeValue)>>
where
    F: Fn(&Value) -> WitResult<ScalarValue>,
{
    let old = convert(name, "old", old, &converter)?;
    let new = convert(name, "new", new, &converter)?;
    Ok((old != new).then(|| (ChangeValue::Scalar(old), ChangeValue::Scalar(new))))
}

fn convert<T, F>(name: &str, side: &str, raw: &Value, converter: F) -> WitResult<T>
where
    F: Fn(&Value) -> WitResult<T>,
{
    converter(raw).wrap_err_with(|| {
        format!("failed to convert {side} value for field {name} from storage representation: {raw}")
    })
}

fn unsupported_kind(field_type: &FieldType) -> Kind {
    match field_type {
        FieldType::Simple(simple) => simple.kind,
        FieldType::Enum(enumeration) => enumeration.base.kind,
        FieldType::List(list) => list.component.kind,
    }
}
