//! Change-tracked work item entities.
//!
//! A [`WorkItem`] wraps the remote snapshot it was loaded from and exposes the
//! common fields as plain typed properties. Typed work items such as
//! [`agile::Bug`] embed a `WorkItem` and add their own bindings.
//!
//! The [`TrackedItem`] trait ties a type to its [`FieldMap`] and provides the
//! snapshot operations: reset, change detection and patch generation. The
//! object-safe [`DynWorkItem`] view is what the registry hands out when the
//! concrete type is only known at run time.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::sync::LazyLock;

use crate::binding::{FieldMap, FieldSpec};
use crate::convert;
use crate::error::{BindingError, UsageError, WitkitError};
use crate::fields;
use crate::models::{PatchDocument, WorkItemRecord};
use crate::relations::RelationLink;
use crate::value::{FieldValue, ValueKind};

pub mod agile;
mod tracking;

pub use tracking::FieldChange;

/// The common part of every work item.
#[derive(Debug, Clone, Default)]
pub struct WorkItem {
    snapshot: Option<WorkItemRecord>,
    pending_comment: Option<String>,

    pub work_item_type: String,
    pub project: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub state: String,
    pub reason: Option<String>,
    pub priority: Option<i64>,
    pub tags: Vec<String>,
    pub parent_id: Option<i64>,

    pub assigned_to: Option<String>,
    pub accepted_by: Option<String>,
    pub activated_by: Option<String>,
    pub authorized_as: Option<String>,
    pub created_by: Option<String>,
    pub changed_by: Option<String>,
    pub closed_by: Option<String>,
    pub resolved_by: Option<String>,
    pub resolved_reason: Option<String>,

    pub area_path: Option<String>,
    pub area_id: Option<i64>,
    pub iteration_path: Option<String>,
    pub iteration_id: Option<i64>,
    pub stack_rank: Option<f64>,
    pub board_column: Option<String>,
    pub board_column_done: Option<bool>,
    pub board_lane: Option<String>,

    pub revised_date: Option<DateTime<Utc>>,
    pub activated_date: Option<DateTime<Utc>>,
    pub authorized_date: Option<DateTime<Utc>>,
    pub changed_date: Option<DateTime<Utc>>,
    pub state_changed_date: Option<DateTime<Utc>>,
    pub created_date: Option<DateTime<Utc>>,
    pub closed_date: Option<DateTime<Utc>>,
    pub resolved_date: Option<DateTime<Utc>>,

    pub history: Option<String>,
    pub node_name: Option<String>,
    pub watermark: Option<i64>,
    pub comment_count: Option<i64>,
    pub related_link_count: Option<i64>,
    pub external_link_count: Option<i64>,
    pub hyperlink_count: Option<i64>,
    pub attached_file_count: Option<i64>,
    pub remote_link_count: Option<i64>,
}

static WORK_ITEM_FIELDS: LazyLock<FieldMap<WorkItem>> = LazyLock::new(|| {
    let ro = |property, field| FieldSpec::new(property, field).read_only();
    let who = |property, field| FieldSpec::new(property, field).with_converter(convert::identity());

    FieldMap::<WorkItem>::builder("WorkItem")
        .computed(ro("id", fields::ID), ValueKind::Integer, |w| {
            w.id().map_or(FieldValue::Null, FieldValue::from)
        })
        .computed(ro("revision", fields::REVISION), ValueKind::Integer, |w| {
            w.revision().map_or(FieldValue::Null, FieldValue::from)
        })
        .bind(ro("revised_date", fields::REVISED_DATE), |w| &w.revised_date, |w| &mut w.revised_date)
        .bind(FieldSpec::new("parent_id", fields::PARENT), |w| &w.parent_id, |w| &mut w.parent_id)
        .bind(ro("activated_date", fields::ACTIVATED_DATE), |w| &w.activated_date, |w| &mut w.activated_date)
        .bind(who("activated_by", fields::ACTIVATED_BY), |w| &w.activated_by, |w| &mut w.activated_by)
        .bind(ro("authorized_date", fields::AUTHORIZED_DATE), |w| &w.authorized_date, |w| &mut w.authorized_date)
        .bind(who("authorized_as", fields::AUTHORIZED_AS), |w| &w.authorized_as, |w| &mut w.authorized_as)
        .bind(ro("changed_date", fields::CHANGED_DATE), |w| &w.changed_date, |w| &mut w.changed_date)
        .bind(FieldSpec::new("board_column", fields::BOARD_COLUMN), |w| &w.board_column, |w| &mut w.board_column)
        .bind(
            FieldSpec::new("board_column_done", fields::BOARD_COLUMN_DONE),
            |w| &w.board_column_done,
            |w| &mut w.board_column_done,
        )
        .bind(FieldSpec::new("board_lane", fields::BOARD_LANE), |w| &w.board_lane, |w| &mut w.board_lane)
        .bind(
            ro("state_changed_date", fields::STATE_CHANGED_DATE),
            |w| &w.state_changed_date,
            |w| &mut w.state_changed_date,
        )
        .bind(who("created_by", fields::CREATED_BY), |w| &w.created_by, |w| &mut w.created_by)
        .bind(who("changed_by", fields::CHANGED_BY), |w| &w.changed_by, |w| &mut w.changed_by)
        .bind(ro("created_date", fields::CREATED_DATE), |w| &w.created_date, |w| &mut w.created_date)
        .bind(who("closed_by", fields::CLOSED_BY), |w| &w.closed_by, |w| &mut w.closed_by)
        .bind(ro("closed_date", fields::CLOSED_DATE), |w| &w.closed_date, |w| &mut w.closed_date)
        .bind(ro("comment_count", fields::COMMENT_COUNT), |w| &w.comment_count, |w| &mut w.comment_count)
        .bind(
            ro("related_link_count", fields::RELATED_LINK_COUNT),
            |w| &w.related_link_count,
            |w| &mut w.related_link_count,
        )
        .bind(
            ro("external_link_count", fields::EXTERNAL_LINK_COUNT),
            |w| &w.external_link_count,
            |w| &mut w.external_link_count,
        )
        .bind(ro("hyperlink_count", fields::HYPERLINK_COUNT), |w| &w.hyperlink_count, |w| &mut w.hyperlink_count)
        .bind(
            ro("attached_file_count", fields::ATTACHED_FILE_COUNT),
            |w| &w.attached_file_count,
            |w| &mut w.attached_file_count,
        )
        .bind(
            ro("remote_link_count", fields::REMOTE_LINK_COUNT),
            |w| &w.remote_link_count,
            |w| &mut w.remote_link_count,
        )
        .bind(ro("node_name", fields::NODE_NAME), |w| &w.node_name, |w| &mut w.node_name)
        .bind(ro("resolved_date", fields::RESOLVED_DATE), |w| &w.resolved_date, |w| &mut w.resolved_date)
        .bind(who("resolved_by", fields::RESOLVED_BY), |w| &w.resolved_by, |w| &mut w.resolved_by)
        .bind(
            FieldSpec::new("resolved_reason", fields::RESOLVED_REASON),
            |w| &w.resolved_reason,
            |w| &mut w.resolved_reason,
        )
        .bind(
            FieldSpec::new("work_item_type", fields::WORK_ITEM_TYPE),
            |w| &w.work_item_type,
            |w| &mut w.work_item_type,
        )
        .bind(FieldSpec::new("project", fields::PROJECT), |w| &w.project, |w| &mut w.project)
        .bind(ro("history", fields::HISTORY), |w| &w.history, |w| &mut w.history)
        .bind(FieldSpec::new("area_path", fields::AREA_PATH), |w| &w.area_path, |w| &mut w.area_path)
        .bind(FieldSpec::new("area_id", fields::AREA_ID), |w| &w.area_id, |w| &mut w.area_id)
        .bind(FieldSpec::new("iteration_path", fields::ITERATION_PATH), |w| &w.iteration_path, |w| &mut w.iteration_path)
        .bind(FieldSpec::new("iteration_id", fields::ITERATION_ID), |w| &w.iteration_id, |w| &mut w.iteration_id)
        .bind(FieldSpec::new("stack_rank", fields::STACK_RANK), |w| &w.stack_rank, |w| &mut w.stack_rank)
        .bind(FieldSpec::new("title", fields::TITLE), |w| &w.title, |w| &mut w.title)
        .bind(FieldSpec::new("description", fields::DESCRIPTION), |w| &w.description, |w| &mut w.description)
        .bind(FieldSpec::new("state", fields::STATE), |w| &w.state, |w| &mut w.state)
        .bind(FieldSpec::new("reason", fields::REASON), |w| &w.reason, |w| &mut w.reason)
        .bind(FieldSpec::new("priority", fields::PRIORITY), |w| &w.priority, |w| &mut w.priority)
        .bind(who("assigned_to", fields::ASSIGNED_TO), |w| &w.assigned_to, |w| &mut w.assigned_to)
        .bind(who("accepted_by", fields::ACCEPTED_BY), |w| &w.accepted_by, |w| &mut w.accepted_by)
        .bind(ro("watermark", fields::WATERMARK), |w| &w.watermark, |w| &mut w.watermark)
        .bind(
            FieldSpec::new("tags", fields::TAGS).with_converter(convert::semicolon_list()),
            |w| &w.tags,
            |w| &mut w.tags,
        )
        .build()
        .expect("WorkItem field bindings are valid")
});

impl WorkItem {
    /// A new, unsaved work item of the given remote type.
    #[must_use]
    pub fn with_type(work_item_type: impl Into<String>) -> Self {
        Self {
            work_item_type: work_item_type.into(),
            ..Self::default()
        }
    }

    /// Remote identifier. `None` until the item has been saved.
    #[must_use]
    pub fn id(&self) -> Option<i32> {
        self.snapshot.as_ref().map(|s| s.id)
    }

    /// Revision of the snapshot.
    #[must_use]
    pub fn revision(&self) -> Option<i32> {
        self.snapshot.as_ref().and_then(WorkItemRecord::revision)
    }

    #[must_use]
    pub fn is_new(&self) -> bool {
        self.snapshot.is_none()
    }

    #[must_use]
    pub fn snapshot(&self) -> Option<&WorkItemRecord> {
        self.snapshot.as_ref()
    }

    /// Fields present in the snapshot.
    pub fn valid_fields(&self) -> impl Iterator<Item = &str> {
        self.snapshot
            .iter()
            .flat_map(|s| s.fields.keys().map(String::as_str))
    }

    /// Raw snapshot value of a field.
    #[must_use]
    pub fn raw_field(&self, field: &str) -> Option<&Value> {
        self.snapshot.as_ref().and_then(|s| s.field(field))
    }

    /// Relations loaded with the snapshot.
    #[must_use]
    pub fn relations(&self) -> Vec<RelationLink> {
        self.snapshot
            .iter()
            .flat_map(|s| s.relations.iter().map(RelationLink::from))
            .collect()
    }

    /// Change the remote work item type.
    pub fn change_type(&mut self, work_item_type: impl Into<String>) {
        self.work_item_type = work_item_type.into();
    }

    /// Queue a line for `System.History`, sent with the next update.
    ///
    /// # Errors
    ///
    /// Returns [`UsageError::BlankComment`] for empty or whitespace-only text.
    pub fn add_comment_to_history(&mut self, text: &str) -> Result<(), UsageError> {
        if text.trim().is_empty() {
            return Err(UsageError::BlankComment);
        }
        let buffer = self.pending_comment.get_or_insert_with(String::new);
        buffer.push_str(text);
        buffer.push('\n');
        Ok(())
    }

    #[must_use]
    pub fn pending_comment(&self) -> Option<&str> {
        self.pending_comment.as_deref()
    }

    /// Put back a comment buffer saved before a failed send.
    pub(crate) fn restore_pending_comment(&mut self, saved: Option<String>) {
        self.pending_comment = saved;
    }
}

impl PartialEq for WorkItem {
    fn eq(&self, other: &Self) -> bool {
        match (self.id(), other.id()) {
            (Some(a), Some(b)) => a == b && self.work_item_type == other.work_item_type,
            _ => std::ptr::eq(self, other),
        }
    }
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let title = self.title.as_deref().unwrap_or_default();
        match self.id() {
            Some(id) => write!(f, "{} {id}: {title}", self.work_item_type),
            None => write!(f, "{} new: {title}", self.work_item_type),
        }
    }
}

/// A work item type with a declared field table.
pub trait TrackedItem: Default + Clone + fmt::Debug + Send + Sync + 'static {
    /// Remote work item type name. `None` for the untyped base.
    const TYPE_NAME: Option<&'static str>;

    fn fields() -> &'static FieldMap<Self>;

    fn core(&self) -> &WorkItem;

    fn core_mut(&mut self) -> &mut WorkItem;

    /// A new, unsaved item with its work item type filled in.
    fn new_item() -> Self {
        let mut item = Self::default();
        if let Some(name) = Self::TYPE_NAME {
            item.core_mut().work_item_type = name.to_string();
        }
        item
    }

    /// Build an item from a remote snapshot.
    fn from_record(record: WorkItemRecord) -> Result<Self, WitkitError> {
        let mut item = Self::new_item();
        item.initialize(record)?;
        Ok(item)
    }

    /// Attach a snapshot and reset every bound property from it.
    ///
    /// On error the item keeps its previous snapshot and values.
    ///
    /// # Errors
    ///
    /// Returns [`UsageError::IdentityMismatch`] when the item already holds a snapshot
    /// of a different work item, and a [`BindingError`] when a value cannot be assigned.
    fn initialize(&mut self, record: WorkItemRecord) -> Result<(), WitkitError> {
        if let Some(current) = self.core().id() {
            if current != record.id {
                return Err(UsageError::IdentityMismatch {
                    current,
                    incoming: record.id,
                }
                .into());
            }
        }
        // Reset a copy so a failed coercion leaves the item as it was.
        let mut staged = self.clone();
        staged.core_mut().snapshot = Some(record);
        staged.reset_to_initial_state()?;
        *self = staged;
        Ok(())
    }

    /// Discard local edits and the pending comment.
    fn reset_to_initial_state(&mut self) -> Result<(), BindingError> {
        tracking::reset(self)
    }

    fn has_changes(&self) -> Result<bool, BindingError> {
        tracking::has_changes(self)
    }

    /// The update payload for the local edits, or `None` when there is nothing to send.
    fn create_patch(&self) -> Result<Option<PatchDocument>, BindingError> {
        tracking::create_patch(self)
    }

    fn gather_change_list(&self) -> Result<Vec<FieldChange>, BindingError> {
        tracking::gather_change_list(self)
    }

    /// Current value of a bound property.
    fn property_value(&self, property: &str) -> Option<FieldValue> {
        Self::fields().get(property).map(|b| b.get(self))
    }
}

impl TrackedItem for WorkItem {
    const TYPE_NAME: Option<&'static str> = None;

    fn fields() -> &'static FieldMap<Self> {
        &WORK_ITEM_FIELDS
    }

    fn core(&self) -> &WorkItem {
        self
    }

    fn core_mut(&mut self) -> &mut WorkItem {
        self
    }
}

/// Object-safe view of a [`TrackedItem`].
///
/// Method names differ from [`TrackedItem`] so both traits can be in scope.
pub trait DynWorkItem: fmt::Debug + Send + Sync {
    fn work_item(&self) -> &WorkItem;

    fn work_item_mut(&mut self) -> &mut WorkItem;

    /// Declared remote type name of the concrete type.
    fn declared_type(&self) -> Option<&'static str>;

    fn read_property(&self, property: &str) -> Option<FieldValue>;

    fn bound_fields(&self) -> Vec<&'static str>;

    fn load_snapshot(&mut self, record: WorkItemRecord) -> Result<(), WitkitError>;

    fn is_changed(&self) -> Result<bool, BindingError>;

    fn build_patch(&self) -> Result<Option<PatchDocument>, BindingError>;

    fn change_list(&self) -> Result<Vec<FieldChange>, BindingError>;

    fn as_any(&self) -> &dyn Any;

    fn into_any(self: Box<Self>) -> Box<dyn Any>;

    fn clone_box(&self) -> Box<dyn DynWorkItem>;
}

impl<T: TrackedItem> DynWorkItem for T {
    fn work_item(&self) -> &WorkItem {
        self.core()
    }

    fn work_item_mut(&mut self) -> &mut WorkItem {
        self.core_mut()
    }

    fn declared_type(&self) -> Option<&'static str> {
        T::TYPE_NAME
    }

    fn read_property(&self, property: &str) -> Option<FieldValue> {
        self.property_value(property)
    }

    fn bound_fields(&self) -> Vec<&'static str> {
        T::fields().field_names()
    }

    fn load_snapshot(&mut self, record: WorkItemRecord) -> Result<(), WitkitError> {
        self.initialize(record)
    }

    fn is_changed(&self) -> Result<bool, BindingError> {
        self.has_changes()
    }

    fn build_patch(&self) -> Result<Option<PatchDocument>, BindingError> {
        self.create_patch()
    }

    fn change_list(&self) -> Result<Vec<FieldChange>, BindingError> {
        self.gather_change_list()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }

    fn clone_box(&self) -> Box<dyn DynWorkItem> {
        Box::new(self.clone())
    }
}

impl Clone for Box<dyn DynWorkItem> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

impl fmt::Display for dyn DynWorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.work_item(), f)
    }
}

impl dyn DynWorkItem {
    /// Borrow as a concrete type.
    #[must_use]
    pub fn downcast_ref<T: TrackedItem>(&self) -> Option<&T> {
        self.as_any().downcast_ref()
    }

    /// Take ownership as a concrete type.
    #[must_use]
    pub fn downcast<T: TrackedItem>(self: Box<Self>) -> Option<T> {
        self.into_any().downcast::<T>().ok().map(|item| *item)
    }
}
