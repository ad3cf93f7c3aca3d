//! Mapping between azure_devops_rust_api types and the crate's wire records.
//!
//! Service payloads are mapped through their JSON form, which keeps the records
//! independent of how the generated models type each member.

use azure_devops_rust_api::wit::models as wit_models;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

use crate::error::ApiError;
use crate::models::{FieldDefinition, PatchOp, PatchOperation, WiqlResult, WorkItemRecord};

/// Convert azure_devops_rust_api WorkItem to a WorkItemRecord.
impl TryFrom<wit_models::WorkItem> for WorkItemRecord {
    type Error = ApiError;

    fn try_from(wi: wit_models::WorkItem) -> Result<Self, Self::Error> {
        let value = serde_json::to_value(&wi).map_err(parse_error)?;
        let mut record: WorkItemRecord = serde_json::from_value(value).map_err(parse_error)?;
        if record.url.is_empty() {
            record.url = wi
                .work_item_tracking_resource
                .work_item_tracking_resource_reference
                .url;
        }
        Ok(record)
    }
}

/// Convert a PatchOperation to the generated JSON patch model.
impl From<PatchOperation> for wit_models::JsonPatchOperation {
    fn from(operation: PatchOperation) -> Self {
        use wit_models::json_patch_operation::Op;

        let op = match operation.op {
            PatchOp::Add => Op::Add,
            PatchOp::Remove => Op::Remove,
            PatchOp::Replace => Op::Replace,
            PatchOp::Test => Op::Test,
        };
        wit_models::JsonPatchOperation {
            op: Some(op),
            path: Some(operation.path),
            value: operation.value,
            from: None,
        }
    }
}

pub(crate) fn to_wire_operations(
    operations: Vec<PatchOperation>,
) -> Vec<wit_models::JsonPatchOperation> {
    operations.into_iter().map(Into::into).collect()
}

/// The revision asserted by a leading `test /rev` operation.
pub(crate) fn precondition_of(operations: &[PatchOperation]) -> Option<i32> {
    operations
        .iter()
        .find(|op| op.op == PatchOp::Test && op.path == "/rev")
        .and_then(|op| op.value.as_ref())
        .and_then(Value::as_i64)
        .and_then(|rev| i32::try_from(rev).ok())
}

pub(crate) fn to_offset_date_time(instant: DateTime<Utc>) -> Result<time::OffsetDateTime, ApiError> {
    let nanos = instant
        .timestamp_nanos_opt()
        .ok_or_else(|| ApiError::ParseError {
            message: format!("{instant} is out of range"),
        })?;
    time::OffsetDateTime::from_unix_timestamp_nanos(i128::from(nanos)).map_err(|e| {
        ApiError::ParseError {
            message: e.to_string(),
        }
    })
}

/// Rewrite the select list of a WIQL query to `[System.Id]`.
///
/// The query endpoint only returns references, so any other select list is wasted.
/// Queries without a `FROM` are passed through untouched.
pub fn wiql_id_query(query: &str) -> String {
    let upper = query.to_ascii_uppercase();
    match upper.find("FROM") {
        Some(index) => format!("SELECT [System.Id] {}", &query[index..]),
        None => query.to_string(),
    }
}

/// Extract ids and the as-of timestamp from a serialized query result.
pub fn extract_wiql_result(value: &Value) -> Result<WiqlResult, ApiError> {
    let ids = value
        .get("workItems")
        .and_then(Value::as_array)
        .map(|refs| {
            refs.iter()
                .filter_map(|r| r.get("id").and_then(Value::as_i64))
                .filter_map(|id| i32::try_from(id).ok())
                .collect()
        })
        .unwrap_or_default();

    let as_of = match value.get("asOf").and_then(Value::as_str) {
        Some(text) => Some(
            DateTime::parse_from_rfc3339(text)
                .map_err(|e| ApiError::ParseError {
                    message: format!("invalid asOf '{text}': {e}"),
                })?
                .with_timezone(&Utc),
        ),
        None => None,
    };

    Ok(WiqlResult { ids, as_of })
}

/// Extract field definitions from a serialized field list.
pub fn extract_field_definitions(value: &Value) -> Result<Vec<FieldDefinition>, ApiError> {
    let entries = value
        .get("value")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    entries
        .into_iter()
        .filter(|entry| entry.get("referenceName").is_some_and(Value::is_string))
        .map(|entry| serde_json::from_value(entry).map_err(parse_error))
        .collect()
}

fn parse_error(e: serde_json::Error) -> ApiError {
    ApiError::ParseError {
        message: e.to_string(),
    }
}

fn not_found_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\b404\b|not ?found|\bTF401232\b").expect("Invalid not-found regex")
    })
}

fn conflict_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\b412\b|precondition ?failed|\bTF26071\b").expect("Invalid conflict regex")
    })
}

fn unauthorized_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\b40[13]\b|unauthorized|forbidden").expect("Invalid unauthorized regex")
    })
}

fn status_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\b[45]\d\d\b").expect("Invalid status regex"))
}

/// Classify a transport failure from its message.
///
/// `write_target` carries the id and expected revision of a write, which turns a failed
/// precondition into a concurrency conflict.
pub fn classify_error(message: &str, write_target: Option<(i32, Option<i32>)>) -> ApiError {
    if conflict_pattern().is_match(message) {
        if let Some((id, revision)) = write_target {
            return ApiError::ConcurrencyConflict { id, revision };
        }
        return ApiError::RequestFailed {
            status: Some(412),
            message: message.to_string(),
        };
    }
    if unauthorized_pattern().is_match(message) {
        return ApiError::Unauthorized;
    }
    if not_found_pattern().is_match(message) {
        return ApiError::NotFound {
            resource: message.to_string(),
        };
    }

    let status = status_pattern()
        .find(message)
        .and_then(|m| m.as_str().parse().ok());
    ApiError::RequestFailed {
        status,
        message: message.to_string(),
    }
}
