//! Remote access facade over the work item tracking transport.
//!
//! [`WorkItemClient`] works in wire records and patch documents. It adds what
//! the transport leaves out: id chunking with back-off on missing items, the
//! client-wide validate-only switch, relation classification and a cached
//! list of the fields the server defines.

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use super::traits::{RealWitOperations, WitOperations};
use crate::error::{ApiError, UsageError};
use crate::models::{PatchDocument, WiqlResult, WorkItemRecord};
use crate::relations::{RelationLink, Relationship};

/// Largest number of ids the service accepts in one batch request.
pub const MAX_BATCH_SIZE: usize = 200;

/// Work item client over a [`WitOperations`] transport.
///
/// # Example
///
/// ```rust,no_run
/// use witkit::api::WorkItemClient;
/// use secrecy::SecretString;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let client = WorkItemClient::with_pat(
///     "my-org".to_string(),
///     "my-project".to_string(),
///     &SecretString::from("my-pat".to_string()),
/// );
///
/// let result = client
///     .run_text_query("SELECT * FROM WorkItems WHERE [System.State] = 'Active'", Some(50))
///     .await?;
/// let records = client.get_by_ids(&result.ids, &[], result.as_of).await?;
/// println!("Found {} work items", records.len());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct WorkItemClient {
    ops: Arc<dyn WitOperations>,
    project: Option<String>,
    max_batch_size: usize,
    validate_only: bool,
    server_fields: Arc<OnceCell<HashSet<String>>>,
}

impl WorkItemClient {
    /// Creates a client over any transport.
    pub fn new(ops: Arc<dyn WitOperations>) -> Self {
        Self {
            ops,
            project: None,
            max_batch_size: MAX_BATCH_SIZE,
            validate_only: false,
            server_fields: Arc::new(OnceCell::new()),
        }
    }

    /// Creates a client for one organization and project, authenticated with a PAT.
    pub fn with_pat(organization: String, project: String, pat: &SecretString) -> Self {
        let ops = RealWitOperations::with_pat(organization, project.clone(), pat);
        Self::new(Arc::new(ops)).with_project(project)
    }

    /// Project used when creating items and scoping queries.
    #[must_use]
    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    /// Upper bound for ids per batch request.
    ///
    /// # Errors
    ///
    /// Returns [`UsageError::BatchSizeOutOfRange`] outside `1..=200`.
    pub fn with_max_batch_size(mut self, size: usize) -> Result<Self, UsageError> {
        if !(1..=MAX_BATCH_SIZE).contains(&size) {
            return Err(UsageError::BatchSizeOutOfRange { size });
        }
        self.max_batch_size = size;
        Ok(self)
    }

    /// When set, writes are validated by the server but not saved.
    #[must_use]
    pub fn with_validate_only(mut self, validate_only: bool) -> Self {
        self.validate_only = validate_only;
        self
    }

    pub fn project(&self) -> Option<&str> {
        self.project.as_deref()
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    pub fn validate_only(&self) -> bool {
        self.validate_only
    }

    /// Fetches one work item with the given fields.
    pub async fn get_by_id(
        &self,
        id: i32,
        fields: &[&str],
        as_of: Option<DateTime<Utc>>,
    ) -> Result<WorkItemRecord, ApiError> {
        self.ops.get_work_item(id, fields, as_of, false).await
    }

    /// Fetches work items in batches, preserving the order of `ids`.
    ///
    /// A batch that fails because one of its ids does not exist is retried with
    /// half the batch size. Once a single id still fails it is skipped.
    pub async fn get_by_ids(
        &self,
        ids: &[i32],
        fields: &[&str],
        as_of: Option<DateTime<Utc>>,
    ) -> Result<Vec<WorkItemRecord>, ApiError> {
        let mut records = Vec::with_capacity(ids.len());
        let mut batch_size = self.max_batch_size;
        let mut offset = 0;

        while offset < ids.len() {
            let end = (offset + batch_size).min(ids.len());
            let batch = &ids[offset..end];

            match self.ops.get_work_items(batch, fields, as_of).await {
                Ok(batch_records) => {
                    records.extend(batch_records);
                    offset = end;
                }
                Err(e) if e.is_not_found() && batch_size > 1 => {
                    batch_size = (batch_size / 2).max(1);
                    warn!(
                        offset,
                        batch_size, "Work item batch contained a missing id, retrying smaller"
                    );
                }
                Err(e) if e.is_not_found() => {
                    warn!(id = batch[0], "Skipping work item that does not exist");
                    offset = end;
                }
                Err(e) => return Err(e),
            }
        }

        debug!(requested = ids.len(), returned = records.len(), "Fetched work items");
        Ok(records)
    }

    /// Runs a WIQL query and returns the matching ids with the query's as-of time.
    pub async fn run_text_query(
        &self,
        query: &str,
        top: Option<i32>,
    ) -> Result<WiqlResult, ApiError> {
        debug!(query, ?top, "Running WIQL query");
        self.ops.query_by_wiql(query, top, true).await
    }

    /// Creates a work item from a patch document.
    pub async fn create(
        &self,
        project: &str,
        work_item_type: &str,
        patch: &PatchDocument,
        bypass_rules: bool,
    ) -> Result<WorkItemRecord, ApiError> {
        let record = self
            .ops
            .create_work_item(
                project,
                work_item_type,
                patch.to_operations(),
                self.validate_only,
                bypass_rules,
            )
            .await?;
        debug!(id = record.id, work_item_type, "Created work item");
        Ok(record)
    }

    /// Applies a patch document, including its revision precondition.
    pub async fn update(
        &self,
        id: i32,
        patch: &PatchDocument,
        bypass_rules: bool,
    ) -> Result<WorkItemRecord, ApiError> {
        let record = self
            .ops
            .update_work_item(id, patch.to_operations(), self.validate_only, bypass_rules)
            .await?;
        debug!(
            id,
            from = ?patch.precondition,
            to = ?record.rev,
            "Updated work item"
        );
        Ok(record)
    }

    /// Deletes a work item. Returns `false` without calling the server in
    /// validate-only mode.
    pub async fn delete(&self, id: i32) -> Result<bool, ApiError> {
        if self.validate_only {
            debug!(id, "Validate-only mode, not deleting");
            return Ok(false);
        }
        self.ops.delete_work_item(id).await?;
        Ok(true)
    }

    /// Relations of a work item, optionally restricted to one kind.
    ///
    /// [`Relationship::All`] returns every relation in server order.
    pub async fn get_relationship_links(
        &self,
        id: i32,
        filter: Relationship,
        as_of: Option<DateTime<Utc>>,
    ) -> Result<Vec<RelationLink>, ApiError> {
        let record = self.ops.get_work_item(id, &[], as_of, true).await?;
        Ok(record
            .relations
            .iter()
            .map(RelationLink::from)
            .filter(|link| filter == Relationship::All || link.kind == filter)
            .collect())
    }

    /// Reference names of the fields the server defines, fetched once.
    pub async fn server_fields(&self) -> Result<&HashSet<String>, ApiError> {
        self.server_fields
            .get_or_try_init(|| async {
                let fields = self.ops.list_fields().await?;
                debug!(count = fields.len(), "Loaded server field definitions");
                Ok(fields.into_iter().map(|f| f.reference_name).collect())
            })
            .await
    }

    /// Keep only the fields the server knows about.
    pub async fn filter_known_fields(
        &self,
        fields: &[&'static str],
    ) -> Result<Vec<&'static str>, ApiError> {
        let known = self.server_fields().await?;
        let (kept, dropped): (Vec<&'static str>, Vec<&'static str>) =
            fields.iter().copied().partition(|f| known.contains(*f));
        if !dropped.is_empty() {
            debug!(?dropped, "Dropping fields the server does not define");
        }
        Ok(kept)
    }
}

impl std::fmt::Debug for WorkItemClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkItemClient")
            .field("project", &self.project)
            .field("max_batch_size", &self.max_batch_size)
            .field("validate_only", &self.validate_only)
            .finish_non_exhaustive()
    }
}
