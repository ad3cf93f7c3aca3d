//! Wire-level records exchanged with the work item tracking service.
//!
//! These are deliberately thin: a [`WorkItemRecord`] is the remote snapshot a
//! change-tracked entity wraps, and a [`PatchDocument`] is the JSON patch it produces.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::fields;

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A work item as returned by the service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItemRecord {
    pub id: i32,
    #[serde(default)]
    pub rev: Option<i32>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub fields: Map<String, Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub relations: Vec<RelationRecord>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub url: String,
}

impl WorkItemRecord {
    /// Raw value of a field. JSON `null` counts as absent.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name).filter(|v| !v.is_null())
    }

    /// The remote work item type name, e.g. `"Bug"`.
    #[must_use]
    pub fn work_item_type(&self) -> Option<&str> {
        self.field(fields::WORK_ITEM_TYPE).and_then(Value::as_str)
    }

    /// Revision from the record header, falling back to `System.Rev`.
    #[must_use]
    pub fn revision(&self) -> Option<i32> {
        self.rev.or_else(|| {
            self.field(fields::REVISION)
                .and_then(Value::as_i64)
                .and_then(|rev| i32::try_from(rev).ok())
        })
    }
}

/// A relation entry on a work item record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelationRecord {
    #[serde(default, deserialize_with = "null_as_default")]
    pub rel: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub attributes: Map<String, Value>,
}

/// JSON patch operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOp {
    Add,
    Remove,
    Replace,
    Test,
}

/// One JSON patch operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchOperation {
    pub op: PatchOp,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl PatchOperation {
    pub fn add(path: impl Into<String>, value: Value) -> Self {
        Self {
            op: PatchOp::Add,
            path: path.into(),
            value: Some(value),
        }
    }

    pub fn replace(path: impl Into<String>, value: Value) -> Self {
        Self {
            op: PatchOp::Replace,
            path: path.into(),
            value: Some(value),
        }
    }

    pub fn remove(path: impl Into<String>) -> Self {
        Self {
            op: PatchOp::Remove,
            path: path.into(),
            value: None,
        }
    }

    pub fn test(path: impl Into<String>, value: Value) -> Self {
        Self {
            op: PatchOp::Test,
            path: path.into(),
            value: Some(value),
        }
    }
}

/// An update payload: field operations plus an optional revision precondition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatchDocument {
    /// Revision the changes were computed against. Rendered as `test /rev` first.
    pub precondition: Option<i32>,
    pub operations: Vec<PatchOperation>,
}

impl PatchDocument {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_precondition(revision: Option<i32>) -> Self {
        Self {
            precondition: revision,
            operations: Vec::new(),
        }
    }

    pub fn push(&mut self, operation: PatchOperation) {
        self.operations.push(operation);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// The operations as sent on the wire, precondition first.
    #[must_use]
    pub fn to_operations(&self) -> Vec<PatchOperation> {
        let mut ops = Vec::with_capacity(self.operations.len() + 1);
        if let Some(rev) = self.precondition {
            ops.push(PatchOperation::test("/rev", Value::from(rev)));
        }
        ops.extend(self.operations.iter().cloned());
        ops
    }
}

/// Result of running a WIQL query: matching ids in server order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WiqlResult {
    pub ids: Vec<i32>,
    pub as_of: Option<DateTime<Utc>>,
}

/// A field defined in the organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDefinition {
    pub reference_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
}
