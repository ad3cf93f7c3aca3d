//! Snapshot reset, change detection and patch generation.

use serde_json::Value;

use super::TrackedItem;
use crate::binding::FieldBinding;
use crate::error::BindingError;
use crate::fields;
use crate::models::{PatchDocument, PatchOperation};
use crate::value::{FieldValue, describe_wire, wire_equivalent};

/// One changed field, rendered for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChange {
    pub field: &'static str,
    pub old_value: String,
    pub new_value: String,
}

struct FieldDiff {
    field: &'static str,
    initial: Option<Value>,
    current: Option<Value>,
}

pub(super) fn reset<T: TrackedItem>(item: &mut T) -> Result<(), BindingError> {
    item.core_mut().pending_comment = None;

    for binding in T::fields().iter().filter(|b| !b.is_computed()) {
        let raw = item.core().raw_field(binding.field()).cloned();
        let value = snapshot_value(binding, raw.as_ref())?;

        if binding.field() == fields::WORK_ITEM_TYPE && value.is_null() {
            continue;
        }

        binding
            .set(item, value)
            .map_err(|source| assign_error(binding, raw.as_ref(), source))?;
    }
    Ok(())
}

fn snapshot_value<T>(
    binding: &FieldBinding<T>,
    raw: Option<&Value>,
) -> Result<FieldValue, BindingError> {
    let converted = match binding.converter() {
        Some(converter) => converter.convert(raw, binding.kind()),
        None => raw.map_or(Ok(FieldValue::Null), FieldValue::from_wire),
    };
    converted.map_err(|source| assign_error(binding, raw, source))
}

fn assign_error<T>(
    binding: &FieldBinding<T>,
    raw: Option<&Value>,
    source: crate::error::ConversionError,
) -> BindingError {
    BindingError::Assign {
        property: binding.property(),
        field: binding.field(),
        raw: describe_wire(raw),
        via: binding
            .converter()
            .map(|c| format!(" via {}", c.name()))
            .unwrap_or_default(),
        source,
    }
}

/// Writable fields whose current value differs from the snapshot.
fn changed_fields<T: TrackedItem>(item: &T, first_only: bool) -> Result<Vec<FieldDiff>, BindingError> {
    let mut diffs = Vec::new();

    for binding in T::fields().writable() {
        let initial = item.core().raw_field(binding.field());
        let local = binding.get(item);

        let current = match binding.converter() {
            Some(converter) => converter.convert_back(&local),
            None => Ok(local.to_wire()),
        }
        .map_err(|source| BindingError::Diff {
            property: binding.property(),
            field: binding.field(),
            source,
        })?;

        let unchanged = match binding.converter().and_then(|c| c.comparer()) {
            Some(comparer) => comparer.compare(initial, &local),
            None => wire_equivalent(initial, current.as_ref()),
        };

        if !unchanged {
            diffs.push(FieldDiff {
                field: binding.field(),
                initial: initial.cloned(),
                current,
            });
            if first_only {
                break;
            }
        }
    }
    Ok(diffs)
}

pub(super) fn has_changes<T: TrackedItem>(item: &T) -> Result<bool, BindingError> {
    if item.core().pending_comment.is_some() {
        return Ok(true);
    }
    Ok(!changed_fields(item, true)?.is_empty())
}

pub(super) fn create_patch<T: TrackedItem>(item: &T) -> Result<Option<PatchDocument>, BindingError> {
    let mut document = PatchDocument::with_precondition(item.core().revision());

    for diff in changed_fields(item, false)? {
        let path = format!("/fields/{}", diff.field);
        let operation = match (diff.current, diff.initial) {
            (None, _) => PatchOperation::remove(path),
            (Some(value), None) => PatchOperation::add(path, value),
            (Some(value), Some(_)) => PatchOperation::replace(path, value),
        };
        document.push(operation);
    }

    if let Some(comment) = &item.core().pending_comment {
        document.push(PatchOperation::add(
            format!("/fields/{}", fields::HISTORY),
            Value::String(comment.clone()),
        ));
    }

    if document.is_empty() {
        return Ok(None);
    }
    if item.core().is_new() {
        document.precondition = None;
    }
    Ok(Some(document))
}

pub(super) fn gather_change_list<T: TrackedItem>(item: &T) -> Result<Vec<FieldChange>, BindingError> {
    Ok(changed_fields(item, false)?
        .into_iter()
        .map(|diff| FieldChange {
            field: diff.field,
            old_value: describe_wire(diff.initial.as_ref()),
            new_value: describe_wire(diff.current.as_ref()),
        })
        .collect())
}
