//! Traits for Azure DevOps work item tracking operations.
//!
//! [`WitOperations`] is the raw transport seam: every call the typed client makes goes
//! through it, so tests can swap the service for an in-memory double.

use async_trait::async_trait;
use azure_devops_rust_api::wit;
use azure_devops_rust_api::wit::models as wit_models;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};

use super::mappers::{
    classify_error, extract_field_definitions, extract_wiql_result, precondition_of,
    to_offset_date_time, to_wire_operations, wiql_id_query,
};
use crate::error::ApiError;
use crate::models::{FieldDefinition, PatchOperation, WiqlResult, WorkItemRecord};

/// Raw work item tracking operations.
///
/// Implementations talk to one organization and project; ids, fields and patch
/// operations are passed through without interpretation.
#[async_trait]
pub trait WitOperations: Send + Sync {
    /// Fetches a single work item.
    ///
    /// An empty `fields` slice asks the service for its default field set.
    async fn get_work_item(
        &self,
        id: i32,
        fields: &[&str],
        as_of: Option<DateTime<Utc>>,
        expand_relations: bool,
    ) -> Result<WorkItemRecord, ApiError>;

    /// Fetches one batch of work items. Fails with `NotFound` if any id is missing.
    async fn get_work_items(
        &self,
        ids: &[i32],
        fields: &[&str],
        as_of: Option<DateTime<Utc>>,
    ) -> Result<Vec<WorkItemRecord>, ApiError>;

    /// Runs a WIQL query and returns the matching ids.
    async fn query_by_wiql(
        &self,
        query: &str,
        top: Option<i32>,
        time_precision: bool,
    ) -> Result<WiqlResult, ApiError>;

    /// Creates a work item of the given type.
    async fn create_work_item(
        &self,
        project: &str,
        work_item_type: &str,
        operations: Vec<PatchOperation>,
        validate_only: bool,
        bypass_rules: bool,
    ) -> Result<WorkItemRecord, ApiError>;

    /// Applies a patch to an existing work item.
    async fn update_work_item(
        &self,
        id: i32,
        operations: Vec<PatchOperation>,
        validate_only: bool,
        bypass_rules: bool,
    ) -> Result<WorkItemRecord, ApiError>;

    /// Moves a work item to the recycle bin.
    async fn delete_work_item(&self, id: i32) -> Result<(), ApiError>;

    /// Lists the fields defined in the organization.
    async fn list_fields(&self) -> Result<Vec<FieldDefinition>, ApiError>;
}

/// Real implementation wrapping `azure_devops_rust_api::wit::Client`.
#[derive(Clone)]
pub struct RealWitOperations {
    client: wit::Client,
    organization: String,
    project: String,
}

impl RealWitOperations {
    /// Creates a new RealWitOperations wrapper.
    pub fn new(client: wit::Client, organization: String, project: String) -> Self {
        Self {
            client,
            organization,
            project,
        }
    }

    /// Builds a client authenticated with a Personal Access Token.
    ///
    /// The PAT stays wrapped until it is handed to the credential.
    pub fn with_pat(organization: String, project: String, pat: &SecretString) -> Self {
        let credential =
            azure_devops_rust_api::Credential::from_pat(pat.expose_secret().to_string());
        let client = wit::ClientBuilder::new(credential).build();
        Self::new(client, organization, project)
    }

    pub fn organization(&self) -> &str {
        &self.organization
    }

    pub fn project(&self) -> &str {
        &self.project
    }
}

#[async_trait]
impl WitOperations for RealWitOperations {
    async fn get_work_item(
        &self,
        id: i32,
        fields: &[&str],
        as_of: Option<DateTime<Utc>>,
        expand_relations: bool,
    ) -> Result<WorkItemRecord, ApiError> {
        let mut request =
            self.client
                .work_items_client()
                .get_work_item(&self.organization, id, &self.project);
        // The service rejects a field list combined with an expand.
        if expand_relations {
            request = request.expand("relations");
        } else if !fields.is_empty() {
            request = request.fields(fields.join(","));
        }
        if let Some(as_of) = as_of {
            request = request.as_of(to_offset_date_time(as_of)?);
        }

        let work_item = request
            .await
            .map_err(|e| classify_error(&e.to_string(), None))?;
        WorkItemRecord::try_from(work_item)
    }

    async fn get_work_items(
        &self,
        ids: &[i32],
        fields: &[&str],
        as_of: Option<DateTime<Utc>>,
    ) -> Result<Vec<WorkItemRecord>, ApiError> {
        let ids_csv = ids
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");

        let mut request = self
            .client
            .work_items_client()
            .list(&self.organization, ids_csv, &self.project);
        if !fields.is_empty() {
            request = request.fields(fields.join(","));
        }
        if let Some(as_of) = as_of {
            request = request.as_of(to_offset_date_time(as_of)?);
        }

        let work_items = request
            .await
            .map_err(|e| classify_error(&e.to_string(), None))?;
        work_items
            .value
            .into_iter()
            .map(WorkItemRecord::try_from)
            .collect()
    }

    async fn query_by_wiql(
        &self,
        query: &str,
        top: Option<i32>,
        time_precision: bool,
    ) -> Result<WiqlResult, ApiError> {
        let wiql = wit_models::Wiql {
            query: Some(wiql_id_query(query)),
        };

        let mut request = self
            .client
            .wiql_client()
            .query_by_wiql(&self.organization, wiql, &self.project, "")
            .time_precision(time_precision);
        if let Some(top) = top {
            request = request.top(top);
        }

        let result = request
            .await
            .map_err(|e| classify_error(&e.to_string(), None))?;
        let value = serde_json::to_value(&result).map_err(|e| ApiError::ParseError {
            message: e.to_string(),
        })?;
        extract_wiql_result(&value)
    }

    async fn create_work_item(
        &self,
        project: &str,
        work_item_type: &str,
        operations: Vec<PatchOperation>,
        validate_only: bool,
        bypass_rules: bool,
    ) -> Result<WorkItemRecord, ApiError> {
        let work_item = self
            .client
            .work_items_client()
            .create(
                &self.organization,
                to_wire_operations(operations),
                project,
                work_item_type,
            )
            .validate_only(validate_only)
            .bypass_rules(bypass_rules)
            .await
            .map_err(|e| classify_error(&e.to_string(), None))?;
        WorkItemRecord::try_from(work_item)
    }

    async fn update_work_item(
        &self,
        id: i32,
        operations: Vec<PatchOperation>,
        validate_only: bool,
        bypass_rules: bool,
    ) -> Result<WorkItemRecord, ApiError> {
        let revision = precondition_of(&operations);
        let work_item = self
            .client
            .work_items_client()
            .update(
                &self.organization,
                to_wire_operations(operations),
                id,
                &self.project,
            )
            .validate_only(validate_only)
            .bypass_rules(bypass_rules)
            .await
            .map_err(|e| classify_error(&e.to_string(), Some((id, revision))))?;
        WorkItemRecord::try_from(work_item)
    }

    async fn delete_work_item(&self, id: i32) -> Result<(), ApiError> {
        self.client
            .work_items_client()
            .delete(&self.organization, id, &self.project)
            .await
            .map_err(|e| classify_error(&e.to_string(), None))?;
        Ok(())
    }

    async fn list_fields(&self) -> Result<Vec<FieldDefinition>, ApiError> {
        let fields = self
            .client
            .fields_client()
            .list(&self.organization, &self.project)
            .await
            .map_err(|e| classify_error(&e.to_string(), None))?;
        let value = serde_json::to_value(&fields).map_err(|e| ApiError::ParseError {
            message: e.to_string(),
        })?;
        extract_field_definitions(&value)
    }
}

#[cfg(test)]
pub mod mocks {
    //! In-memory implementation for testing.

    use super::*;
    use crate::models::PatchOp;
    use serde_json::{Map, Value, json};
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    /// Stateful mock of the work item service.
    ///
    /// Stored records are patched the way the service would patch them, including
    /// the `test /rev` precondition, and every call is recorded for assertions.
    #[derive(Default)]
    pub struct MockWitOperations {
        /// Work items known to the mock, by id.
        pub items: Arc<Mutex<BTreeMap<i32, WorkItemRecord>>>,
        /// Ids requested by each `get_work_items` call, in order.
        pub batches: Arc<Mutex<Vec<Vec<i32>>>>,
        /// Field lists requested by each `get_work_items` call.
        pub requested_fields: Arc<Mutex<Vec<Vec<String>>>>,
        /// Queries received, with their `top`.
        pub queries: Arc<Mutex<Vec<(String, Option<i32>)>>>,
        /// Ids returned by the next query. Defaults to every stored id.
        pub query_ids: Arc<Mutex<Option<Vec<i32>>>>,
        /// Patches received by create, with the requested type.
        pub creates: Arc<Mutex<Vec<(String, Vec<PatchOperation>)>>>,
        /// Patches received by update, with the target id.
        pub updates: Arc<Mutex<Vec<(i32, Vec<PatchOperation>)>>>,
        /// Bypass-rules flags received by update.
        pub update_bypass_rules: Arc<Mutex<Vec<bool>>>,
        /// Ids deleted.
        pub deleted: Arc<Mutex<Vec<i32>>>,
        /// Field definitions returned by `list_fields`; `None` lists every field in use.
        pub fields: Arc<Mutex<Option<Vec<FieldDefinition>>>>,
        /// Number of `list_fields` calls.
        pub list_fields_calls: Arc<Mutex<usize>>,
        /// Error returned by the next call of any kind.
        pub next_error: Arc<Mutex<Option<ApiError>>>,
    }

    impl MockWitOperations {
        pub fn new() -> Self {
            Self::default()
        }

        /// Stores a work item with the given type, revision 1 and extra fields.
        pub async fn insert(&self, id: i32, work_item_type: &str, fields: Value) {
            let mut map = fields.as_object().cloned().unwrap_or_default();
            map.insert("System.Id".to_string(), json!(id));
            map.insert("System.WorkItemType".to_string(), json!(work_item_type));
            map.entry("System.TeamProject")
                .or_insert_with(|| json!("Fabrikam"));
            self.insert_record(WorkItemRecord {
                id,
                rev: Some(1),
                fields: map,
                relations: Vec::new(),
                url: item_url(id),
            })
            .await;
        }

        pub async fn insert_record(&self, record: WorkItemRecord) {
            self.items.lock().await.insert(record.id, record);
        }

        pub async fn record(&self, id: i32) -> Option<WorkItemRecord> {
            self.items.lock().await.get(&id).cloned()
        }

        pub async fn set_query_ids(&self, ids: Vec<i32>) {
            *self.query_ids.lock().await = Some(ids);
        }

        pub async fn set_fields(&self, names: &[&str]) {
            *self.fields.lock().await = Some(
                names
                    .iter()
                    .map(|name| FieldDefinition {
                        reference_name: (*name).to_string(),
                        name: (*name).to_string(),
                    })
                    .collect(),
            );
        }

        pub async fn fail_next(&self, error: ApiError) {
            *self.next_error.lock().await = Some(error);
        }

        async fn take_error(&self) -> Result<(), ApiError> {
            match self.next_error.lock().await.take() {
                Some(error) => Err(error),
                None => Ok(()),
            }
        }

        fn project_fields(record: &WorkItemRecord, fields: &[&str]) -> WorkItemRecord {
            if fields.is_empty() {
                return record.clone();
            }
            let mut projected = record.clone();
            projected.fields = record
                .fields
                .iter()
                .filter(|(name, _)| fields.contains(&name.as_str()))
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect();
            projected.relations = Vec::new();
            projected
        }
    }

    pub fn item_url(id: i32) -> String {
        format!("https://dev.azure.com/fabrikam/_apis/wit/workItems/{id}")
    }

    fn apply(record: &mut WorkItemRecord, operations: &[PatchOperation]) -> Result<(), ApiError> {
        for operation in operations {
            let path = operation.path.as_str();
            if operation.op == PatchOp::Test && path == "/rev" {
                let expected = operation.value.as_ref().and_then(Value::as_i64);
                if expected != record.rev.map(i64::from) {
                    return Err(ApiError::ConcurrencyConflict {
                        id: record.id,
                        revision: expected.and_then(|r| i32::try_from(r).ok()),
                    });
                }
            } else if let Some(field) = path.strip_prefix("/fields/") {
                match operation.op {
                    PatchOp::Add | PatchOp::Replace => {
                        let value = operation.value.clone().unwrap_or(Value::Null);
                        if field == "System.History" {
                            let history = record
                                .fields
                                .get(field)
                                .and_then(Value::as_str)
                                .unwrap_or_default()
                                .to_string();
                            let text = value.as_str().unwrap_or_default();
                            record
                                .fields
                                .insert(field.to_string(), json!(format!("{history}{text}")));
                        } else {
                            record.fields.insert(field.to_string(), value);
                        }
                    }
                    PatchOp::Remove => {
                        record.fields.remove(field);
                    }
                    PatchOp::Test => {}
                }
            } else if path == "/relations/-" {
                let relation = operation
                    .value
                    .clone()
                    .map(serde_json::from_value)
                    .transpose()
                    .map_err(|e| ApiError::ParseError {
                        message: e.to_string(),
                    })?
                    .unwrap_or_default();
                record.relations.push(relation);
            } else if let Some(index) = path.strip_prefix("/relations/") {
                let index: usize = index.parse().map_err(|_| ApiError::RequestFailed {
                    status: Some(400),
                    message: format!("bad relation path {path}"),
                })?;
                if index >= record.relations.len() {
                    return Err(ApiError::RequestFailed {
                        status: Some(400),
                        message: format!("relation index {index} out of range"),
                    });
                }
                record.relations.remove(index);
            }
        }
        Ok(())
    }

    fn bump_revision(record: &mut WorkItemRecord) {
        let rev = record.rev.unwrap_or(0) + 1;
        record.rev = Some(rev);
        record.fields.insert("System.Rev".to_string(), json!(rev));
    }

    #[async_trait]
    impl WitOperations for MockWitOperations {
        async fn get_work_item(
            &self,
            id: i32,
            fields: &[&str],
            _as_of: Option<DateTime<Utc>>,
            expand_relations: bool,
        ) -> Result<WorkItemRecord, ApiError> {
            self.take_error().await?;
            let items = self.items.lock().await;
            let record = items.get(&id).ok_or_else(|| ApiError::NotFound {
                resource: format!("work item {id}"),
            })?;
            if expand_relations {
                Ok(record.clone())
            } else {
                Ok(Self::project_fields(record, fields))
            }
        }

        async fn get_work_items(
            &self,
            ids: &[i32],
            fields: &[&str],
            _as_of: Option<DateTime<Utc>>,
        ) -> Result<Vec<WorkItemRecord>, ApiError> {
            self.take_error().await?;
            self.batches.lock().await.push(ids.to_vec());
            self.requested_fields
                .lock()
                .await
                .push(fields.iter().map(|f| (*f).to_string()).collect());

            let items = self.items.lock().await;
            ids.iter()
                .map(|id| {
                    items
                        .get(id)
                        .map(|record| Self::project_fields(record, fields))
                        .ok_or_else(|| ApiError::NotFound {
                            resource: format!("work item {id}"),
                        })
                })
                .collect()
        }

        async fn query_by_wiql(
            &self,
            query: &str,
            top: Option<i32>,
            _time_precision: bool,
        ) -> Result<WiqlResult, ApiError> {
            self.take_error().await?;
            self.queries.lock().await.push((query.to_string(), top));

            let mut ids = match self.query_ids.lock().await.clone() {
                Some(ids) => ids,
                None => self.items.lock().await.keys().copied().collect(),
            };
            if let Some(top) = top.and_then(|t| usize::try_from(t).ok()) {
                ids.truncate(top);
            }
            Ok(WiqlResult {
                ids,
                as_of: Some(Utc::now()),
            })
        }

        async fn create_work_item(
            &self,
            project: &str,
            work_item_type: &str,
            operations: Vec<PatchOperation>,
            validate_only: bool,
            _bypass_rules: bool,
        ) -> Result<WorkItemRecord, ApiError> {
            self.take_error().await?;
            self.creates
                .lock()
                .await
                .push((work_item_type.to_string(), operations.clone()));

            let mut items = self.items.lock().await;
            let id = if validate_only {
                0
            } else {
                items.keys().next_back().copied().unwrap_or(0) + 1
            };
            let mut fields = Map::new();
            fields.insert("System.Id".to_string(), json!(id));
            fields.insert("System.WorkItemType".to_string(), json!(work_item_type));
            fields.insert("System.TeamProject".to_string(), json!(project));
            let mut record = WorkItemRecord {
                id,
                rev: Some(0),
                fields,
                relations: Vec::new(),
                url: item_url(id),
            };
            apply(&mut record, &operations)?;
            bump_revision(&mut record);
            if !validate_only {
                items.insert(id, record.clone());
            }
            Ok(record)
        }

        async fn update_work_item(
            &self,
            id: i32,
            operations: Vec<PatchOperation>,
            validate_only: bool,
            bypass_rules: bool,
        ) -> Result<WorkItemRecord, ApiError> {
            self.take_error().await?;
            self.updates.lock().await.push((id, operations.clone()));
            self.update_bypass_rules.lock().await.push(bypass_rules);

            let mut items = self.items.lock().await;
            let stored = items.get(&id).ok_or_else(|| ApiError::NotFound {
                resource: format!("work item {id}"),
            })?;
            let mut record = stored.clone();
            apply(&mut record, &operations)?;
            bump_revision(&mut record);
            if !validate_only {
                items.insert(id, record.clone());
            }
            Ok(record)
        }

        async fn delete_work_item(&self, id: i32) -> Result<(), ApiError> {
            self.take_error().await?;
            self.deleted.lock().await.push(id);
            self.items
                .lock()
                .await
                .remove(&id)
                .map(|_| ())
                .ok_or_else(|| ApiError::NotFound {
                    resource: format!("work item {id}"),
                })
        }

        async fn list_fields(&self) -> Result<Vec<FieldDefinition>, ApiError> {
            self.take_error().await?;
            *self.list_fields_calls.lock().await += 1;
            if let Some(fields) = self.fields.lock().await.clone() {
                return Ok(fields);
            }
            let items = self.items.lock().await;
            let mut names: Vec<String> = items
                .values()
                .flat_map(|record| record.fields.keys().cloned())
                .collect();
            names.sort();
            names.dedup();
            Ok(names
                .into_iter()
                .map(|name| FieldDefinition {
                    reference_name: name.clone(),
                    name,
                })
                .collect())
        }
    }

    /// # Mock Applies Patches With Precondition
    ///
    /// Verifies the in-memory service honours the revision test.
    ///
    /// ## Test Scenario
    /// - Update a stored item with a matching, then a stale revision
    ///
    /// ## Expected Outcome
    /// - The first update bumps the revision, the second is a conflict
    #[tokio::test]
    async fn test_mock_applies_patches_with_precondition() {
        let mock = MockWitOperations::new();
        mock.insert(7, "Bug", json!({"System.Title": "old"})).await;

        let ops = vec![
            PatchOperation::test("/rev", json!(1)),
            PatchOperation::replace("/fields/System.Title", json!("new")),
        ];
        let updated = mock.update_work_item(7, ops.clone(), false, false).await.unwrap();
        assert_eq!(updated.rev, Some(2));
        assert_eq!(updated.field("System.Title"), Some(&json!("new")));

        let err = mock.update_work_item(7, ops, false, false).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
