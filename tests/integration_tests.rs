//! Integration tests for the witkit library
//!
//! These tests drive the public API end to end against an in-memory work item
//! store standing in for the REST service.

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Value, json};

use witkit::api::WitOperations;
use witkit::binding::{FieldMap, FieldSpec};
use witkit::error::ApiError;
use witkit::models::{
    FieldDefinition, PatchOp, PatchOperation, RelationRecord, WiqlResult, WorkItemRecord,
};
use witkit::query::{Queryable, member};
use witkit::work_item::agile::Task;
use witkit::{Relationship, TrackedItem, TypeRegistry, WorkItem, WorkItemClient, WorkItemService};

#[derive(Debug, Clone, Default)]
struct TeamBug {
    base: WorkItem,
    customer: Option<String>,
}

static TEAM_BUG_FIELDS: LazyLock<FieldMap<TeamBug>> = LazyLock::new(|| {
    FieldMap::<TeamBug>::builder("TeamBug")
        .inherit(WorkItem::fields(), |b| &b.base, |b| &mut b.base)
        .bind(
            FieldSpec::new("customer", "Custom.Customer"),
            |b| &b.customer,
            |b| &mut b.customer,
        )
        .build()
        .unwrap()
});

impl TrackedItem for TeamBug {
    const TYPE_NAME: Option<&'static str> = Some("Bug");

    fn fields() -> &'static FieldMap<Self> {
        &TEAM_BUG_FIELDS
    }

    fn core(&self) -> &WorkItem {
        &self.base
    }

    fn core_mut(&mut self) -> &mut WorkItem {
        &mut self.base
    }
}

/// Minimal work item store. Queries return every id; the client filters.
#[derive(Default)]
struct InMemoryStore {
    items: Mutex<BTreeMap<i32, WorkItemRecord>>,
    known_fields: Vec<String>,
    queries: Mutex<Vec<String>>,
}

impl InMemoryStore {
    fn new(registry: &TypeRegistry) -> Self {
        Self {
            known_fields: registry.all_fields().iter().map(|f| f.to_string()).collect(),
            ..Default::default()
        }
    }

    fn url(id: i32) -> String {
        format!("https://dev.azure.com/fabrikam/_apis/wit/workItems/{id}")
    }

    fn apply(record: &mut WorkItemRecord, operations: &[PatchOperation]) -> Result<(), ApiError> {
        for operation in operations {
            let value = operation.value.clone().unwrap_or(Value::Null);
            match (operation.op, operation.path.as_str()) {
                (PatchOp::Test, "/rev") => {
                    if value.as_i64() != record.rev.map(i64::from) {
                        return Err(ApiError::ConcurrencyConflict {
                            id: record.id,
                            revision: value.as_i64().map(|r| r as i32),
                        });
                    }
                }
                (PatchOp::Add, "/relations/-") => {
                    let relation: RelationRecord = serde_json::from_value(value).map_err(|e| {
                        ApiError::ParseError {
                            message: e.to_string(),
                        }
                    })?;
                    record.relations.push(relation);
                }
                (PatchOp::Remove, path) if path.starts_with("/relations/") => {
                    let index: usize = path["/relations/".len()..].parse().unwrap();
                    record.relations.remove(index);
                }
                (PatchOp::Remove, path) => {
                    record.fields.remove(path.trim_start_matches("/fields/"));
                }
                (_, path) => {
                    record
                        .fields
                        .insert(path.trim_start_matches("/fields/").to_string(), value);
                }
            }
        }
        let rev = record.rev.unwrap_or(0) + 1;
        record.rev = Some(rev);
        record.fields.insert("System.Rev".to_string(), json!(rev));
        Ok(())
    }

    fn missing(id: i32) -> ApiError {
        ApiError::NotFound {
            resource: format!("work item {id}"),
        }
    }
}

#[async_trait]
impl WitOperations for InMemoryStore {
    async fn get_work_item(
        &self,
        id: i32,
        _fields: &[&str],
        _as_of: Option<DateTime<Utc>>,
        _expand_relations: bool,
    ) -> Result<WorkItemRecord, ApiError> {
        self.items
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| Self::missing(id))
    }

    async fn get_work_items(
        &self,
        ids: &[i32],
        _fields: &[&str],
        _as_of: Option<DateTime<Utc>>,
    ) -> Result<Vec<WorkItemRecord>, ApiError> {
        let items = self.items.lock().unwrap();
        ids.iter()
            .map(|id| items.get(id).cloned().ok_or_else(|| Self::missing(*id)))
            .collect()
    }

    async fn query_by_wiql(
        &self,
        query: &str,
        top: Option<i32>,
        _time_precision: bool,
    ) -> Result<WiqlResult, ApiError> {
        self.queries.lock().unwrap().push(query.to_string());
        let mut ids: Vec<i32> = self.items.lock().unwrap().keys().copied().collect();
        if let Some(top) = top {
            ids.truncate(top as usize);
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
        _validate_only: bool,
        _bypass_rules: bool,
    ) -> Result<WorkItemRecord, ApiError> {
        let mut items = self.items.lock().unwrap();
        let id = items.keys().max().copied().unwrap_or(0) + 1;
        let mut record = WorkItemRecord {
            id,
            rev: Some(0),
            url: Self::url(id),
            ..Default::default()
        };
        record.fields.insert("System.Id".to_string(), json!(id));
        record
            .fields
            .insert("System.WorkItemType".to_string(), json!(work_item_type));
        record
            .fields
            .insert("System.TeamProject".to_string(), json!(project));
        record.fields.insert("System.State".to_string(), json!("New"));
        Self::apply(&mut record, &operations)?;
        items.insert(id, record.clone());
        Ok(record)
    }

    async fn update_work_item(
        &self,
        id: i32,
        operations: Vec<PatchOperation>,
        _validate_only: bool,
        _bypass_rules: bool,
    ) -> Result<WorkItemRecord, ApiError> {
        let mut items = self.items.lock().unwrap();
        let record = items.get_mut(&id).ok_or_else(|| Self::missing(id))?;
        let mut updated = record.clone();
        Self::apply(&mut updated, &operations)?;
        *record = updated.clone();
        Ok(updated)
    }

    async fn delete_work_item(&self, id: i32) -> Result<(), ApiError> {
        self.items
            .lock()
            .unwrap()
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| Self::missing(id))
    }

    async fn list_fields(&self) -> Result<Vec<FieldDefinition>, ApiError> {
        Ok(self
            .known_fields
            .iter()
            .map(|name| FieldDefinition {
                reference_name: name.clone(),
                name: name.clone(),
            })
            .collect())
    }
}

fn setup() -> (WorkItemService, Arc<InMemoryStore>) {
    let registry = TypeRegistry::builder()
        .with_standard_types()
        .register::<TeamBug>()
        .build()
        .unwrap();
    let store = Arc::new(InMemoryStore::new(&registry));
    let client = WorkItemClient::new(store.clone()).with_project("Fabrikam");
    (WorkItemService::new(client, Arc::new(registry)), store)
}

async fn add_bug(service: &WorkItemService, title: &str, customer: Option<&str>) -> TeamBug {
    let mut bug = TeamBug::new_item();
    bug.base.title = Some(title.to_string());
    bug.customer = customer.map(str::to_string);
    service.add(&mut bug, None, false).await.unwrap();
    bug
}

/// # Custom Type Lifecycle
///
/// Verifies a consumer-declared type can be added, edited and reloaded.
///
/// ## Test Scenario
/// - Add a TeamBug with a custom field
/// - Change the title and update with a comment
/// - Reload it
///
/// ## Expected Outcome
/// - The item is saved as a Bug, the update bumps the revision and the
///   reloaded item has the new title and no pending changes
#[tokio::test]
async fn test_custom_type_lifecycle() {
    let (service, store) = setup();

    let mut bug = add_bug(&service, "Login fails", Some("Contoso")).await;
    let id = bug.base.id().unwrap();
    assert_eq!(bug.base.revision(), Some(1));
    assert_eq!(bug.base.work_item_type, "Bug");
    assert!(!bug.has_changes().unwrap());

    bug.base.title = Some("Login fails on Safari".to_string());
    let sent = service
        .update(&mut bug, Some("Narrowed down"), false)
        .await
        .unwrap();
    assert!(sent);
    assert_eq!(bug.base.revision(), Some(2));

    let stored = store.items.lock().unwrap().get(&id).cloned().unwrap();
    assert_eq!(stored.fields["System.History"], json!("Narrowed down"));

    let reloaded: TeamBug = service.get(id).await.unwrap();
    assert_eq!(reloaded.base.title.as_deref(), Some("Login fails on Safari"));
    assert_eq!(reloaded.customer.as_deref(), Some("Contoso"));
    assert!(!reloaded.has_changes().unwrap());

    let mut unchanged = reloaded.clone();
    assert!(!service.update(&mut unchanged, None, false).await.unwrap());
}

/// # Stale Copies Conflict
///
/// Verifies the revision precondition rejects writes from stale copies.
///
/// ## Test Scenario
/// - Load the same bug twice, update the first copy, then the second
///
/// ## Expected Outcome
/// - The second update fails with a retryable concurrency conflict
#[tokio::test]
async fn test_stale_copies_conflict() {
    let (service, _) = setup();
    let id = add_bug(&service, "Slow search", None).await.base.id().unwrap();

    let mut first: TeamBug = service.get(id).await.unwrap();
    let mut second: TeamBug = service.get(id).await.unwrap();

    first.base.priority = Some(1);
    service.update(&mut first, None, false).await.unwrap();

    second.base.priority = Some(3);
    let error = service.update(&mut second, None, false).await.unwrap_err();
    assert!(error.is_concurrency_conflict());
}

/// # Hierarchy Round Trip
///
/// Verifies child links written through the service are read back.
///
/// ## Test Scenario
/// - Add a parent bug and two tasks, link the tasks as children
///
/// ## Expected Outcome
/// - The parent lists both children and each task finds the parent link id
#[tokio::test]
async fn test_hierarchy_round_trip() {
    let (service, _) = setup();
    let mut parent = add_bug(&service, "Checkout broken", None).await;

    let mut tasks = Vec::new();
    for title in ["Reproduce", "Fix"] {
        let mut task = Task::new_item();
        task.base.title = Some(title.to_string());
        service.add(&mut task, None, false).await.unwrap();
        tasks.push(task);
    }

    service
        .add_children(&mut parent, &[&tasks[0], &tasks[1]])
        .await
        .unwrap();

    let children = service.get_children(parent.base.id().unwrap()).await.unwrap();
    let titles: Vec<_> = children
        .iter()
        .filter_map(|child| child.work_item().title.clone())
        .collect();
    assert_eq!(titles, vec!["Reproduce", "Fix"]);
    assert!(children[0].downcast_ref::<Task>().is_some());

    let links = service
        .get_relationship_links(parent.base.id().unwrap(), Relationship::Child, None)
        .await
        .unwrap();
    assert_eq!(links.len(), 2);
    assert_eq!(links[1].related_id, tasks[1].base.id());
}

/// # Query Filters Client Side
///
/// Verifies remote queries apply the whole operator chain to server results.
///
/// ## Test Scenario
/// - Store bugs for two customers while the server ignores the WHERE clause
/// - Query one customer, ordered by title, first item only
///
/// ## Expected Outcome
/// - Only that customer's bugs are returned, ordered; the WIQL names the field
#[tokio::test]
async fn test_query_filters_client_side() {
    let (service, store) = setup();
    add_bug(&service, "Beta", Some("Contoso")).await;
    add_bug(&service, "Gamma", Some("Northwind")).await;
    add_bug(&service, "Alpha", Some("Contoso")).await;

    let contoso = service
        .queryable::<TeamBug>()
        .filter(member("customer").equals("Contoso"))
        .order_by("title");

    let titles: Vec<_> = contoso
        .to_list()
        .await
        .unwrap()
        .into_iter()
        .filter_map(|bug| bug.base.title)
        .collect();
    assert_eq!(titles, vec!["Alpha", "Beta"]);
    assert_eq!(contoso.count().await.unwrap(), 2);

    let wiql = store.queries.lock().unwrap()[0].clone();
    assert!(wiql.contains("[System.WorkItemType] = 'Bug'"));
    assert!(wiql.contains("[Custom.Customer] = 'Contoso'"));
}

/// # In-Memory Queryable
///
/// Verifies the same operators work over a local list.
///
/// ## Test Scenario
/// - Build tasks locally and page through them
///
/// ## Expected Outcome
/// - Skip and take select the expected slice
#[tokio::test]
async fn test_in_memory_queryable() {
    let tasks: Vec<Task> = (1..=5)
        .map(|n| {
            let mut task = Task::new_item();
            task.base.title = Some(format!("Task {n}"));
            task.base.priority = Some(n % 3);
            task
        })
        .collect();

    let page = Queryable::from_items(tasks)
        .filter(member("priority").gt(0))
        .order_by_descending("title")
        .skip(1)
        .take(2)
        .to_list()
        .await
        .unwrap();
    let titles: Vec<_> = page.into_iter().filter_map(|t| t.base.title).collect();
    assert_eq!(titles, vec!["Task 4", "Task 2"]);
}

/// # Library Version
///
/// Verifies the version constant is exposed.
///
/// ## Test Scenario
/// - Read `witkit::VERSION`
///
/// ## Expected Outcome
/// - A non-empty dotted version
#[test]
fn test_library_version() {
    let version = witkit::VERSION;
    assert!(!version.is_empty());
    assert!(version.contains('.'));
}
