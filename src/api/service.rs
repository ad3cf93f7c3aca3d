//! Typed work item operations.
//!
//! [`WorkItemService`] pairs a [`WorkItemClient`] with a [`TypeRegistry`] and works in
//! change-tracked entities: it builds their patches, sends them and re-synchronizes
//! them from the returned snapshot.

use chrono::{DateTime, Utc};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

use super::client::WorkItemClient;
use crate::binding::registry::TypeRegistry;
use crate::error::{UsageError, WitkitError};
use crate::models::{PatchDocument, PatchOperation, WorkItemRecord};
use crate::query::Queryable;
use crate::relations::{RelationLink, Relationship, strip_revision_from_url};
use crate::work_item::{DynWorkItem, TrackedItem};
use crate::Result;

/// Typed work item service.
#[derive(Clone, Debug)]
pub struct WorkItemService {
    client: WorkItemClient,
    registry: Arc<TypeRegistry>,
}

impl WorkItemService {
    pub fn new(client: WorkItemClient, registry: Arc<TypeRegistry>) -> Self {
        Self { client, registry }
    }

    /// A service with the built-in Agile types registered.
    pub fn with_standard_types(client: WorkItemClient) -> Self {
        Self::new(client, Arc::new(TypeRegistry::standard()))
    }

    /// The underlying record-level client.
    pub fn client(&self) -> &WorkItemClient {
        &self.client
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Fields to request for `T`: its bindings, or every registered field for the
    /// untyped base, limited to fields the server defines.
    pub async fn fields_for<T: TrackedItem>(&self) -> Result<Vec<&'static str>> {
        let declared = match T::TYPE_NAME {
            Some(_) => T::fields().field_names(),
            None => self.registry.all_fields().to_vec(),
        };
        Ok(self.client.filter_known_fields(&declared).await?)
    }

    async fn all_known_fields(&self) -> Result<Vec<&'static str>> {
        Ok(self
            .client
            .filter_known_fields(self.registry.all_fields())
            .await?)
    }

    /// Loads one work item as `T`.
    pub async fn get<T: TrackedItem>(&self, id: i32) -> Result<T> {
        let fields = self.fields_for::<T>().await?;
        let record = self.client.get_by_id(id, &fields, None).await?;
        self.registry.materialize_as(record)
    }

    /// Loads one work item as its registered type.
    pub async fn get_dyn(&self, id: i32) -> Result<Box<dyn DynWorkItem>> {
        let fields = self.all_known_fields().await?;
        let record = self.client.get_by_id(id, &fields, None).await?;
        self.registry.materialize(record)
    }

    /// Loads several work items as `T`, in the order of `ids`.
    pub async fn get_many<T: TrackedItem>(&self, ids: &[i32]) -> Result<Vec<T>> {
        let fields = self.fields_for::<T>().await?;
        let records = self.client.get_by_ids(ids, &fields, None).await?;
        records
            .into_iter()
            .map(|record| self.registry.materialize_as(record))
            .collect()
    }

    /// Loads several work items as their registered types, in the order of `ids`.
    pub async fn get_many_dyn(&self, ids: &[i32]) -> Result<Vec<Box<dyn DynWorkItem>>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let fields = self.all_known_fields().await?;
        self.client
            .get_by_ids(ids, &fields, None)
            .await?
            .into_iter()
            .map(|record| self.registry.materialize(record))
            .collect()
    }

    /// Runs a WIQL query and materializes each result as its registered type.
    pub async fn query(&self, wiql: &str, top: Option<i32>) -> Result<Vec<Box<dyn DynWorkItem>>> {
        let fields = self.all_known_fields().await?;
        let records = self.query_records(wiql, top, &fields).await?;
        records
            .into_iter()
            .map(|record| self.registry.materialize(record))
            .collect()
    }

    /// Runs a WIQL query and materializes each result as `T`.
    pub async fn query_as<T: TrackedItem>(&self, wiql: &str, top: Option<i32>) -> Result<Vec<T>> {
        let fields = self.fields_for::<T>().await?;
        let records = self.query_records(wiql, top, &fields).await?;
        records
            .into_iter()
            .map(|record| self.registry.materialize_as(record))
            .collect()
    }

    /// Runs a query and fetches the matching records as of the query time.
    pub(crate) async fn query_records(
        &self,
        wiql: &str,
        top: Option<i32>,
        fields: &[&str],
    ) -> Result<Vec<WorkItemRecord>> {
        let result = self.client.run_text_query(wiql, top).await?;
        if result.ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.client.get_by_ids(&result.ids, fields, result.as_of).await?)
    }

    /// A LINQ-style query over work items of type `T`.
    pub fn queryable<T: TrackedItem>(&self) -> Queryable<T> {
        Queryable::remote(self.clone())
    }

    /// Creates a new work item and re-synchronizes it from the server.
    ///
    /// The project falls back to the client's project and the work item type to
    /// `T`'s declared type name.
    ///
    /// # Errors
    ///
    /// Returns a [`UsageError`] for an already saved item or a missing project or type.
    pub async fn add<T: TrackedItem>(
        &self,
        item: &mut T,
        comment: Option<&str>,
        bypass_rules: bool,
    ) -> Result<()> {
        if let Some(id) = item.core().id() {
            return Err(UsageError::AlreadyExists { id }.into());
        }
        let project = item
            .core()
            .project
            .clone()
            .filter(|p| !p.is_empty())
            .or_else(|| self.client.project().map(str::to_string))
            .ok_or(UsageError::MissingProject)?;
        let work_item_type = Some(item.core().work_item_type.clone())
            .filter(|t| !t.is_empty())
            .or_else(|| T::TYPE_NAME.map(str::to_string))
            .ok_or(UsageError::MissingWorkItemType)?;

        let saved_comment = queue_comment(item, comment)?;
        let sent = match item.create_patch() {
            Ok(patch) => self
                .client
                .create(&project, &work_item_type, &patch.unwrap_or_default(), bypass_rules)
                .await
                .map_err(WitkitError::from),
            Err(e) => Err(e.into()),
        };
        let record = restore_on_error(item, saved_comment, sent)?;
        info!(id = record.id, %work_item_type, %project, "Added work item");
        if !self.client.validate_only() {
            item.initialize(record)?;
        }
        Ok(())
    }

    /// Sends the local edits of a saved work item.
    ///
    /// The comment is queued before the change check, so a comment alone is
    /// enough to send an update. Returns `false` when there was nothing to send.
    ///
    /// # Errors
    ///
    /// Returns [`UsageError::NewWorkItem`] for an unsaved item, and an
    /// [`ApiError::ConcurrencyConflict`](crate::error::ApiError::ConcurrencyConflict)
    /// when the item changed on the server since it was loaded.
    pub async fn update<T: TrackedItem>(
        &self,
        item: &mut T,
        comment: Option<&str>,
        bypass_rules: bool,
    ) -> Result<bool> {
        let id = item
            .core()
            .id()
            .ok_or(UsageError::NewWorkItem { operation: "update" })?;

        let saved_comment = queue_comment(item, comment)?;
        let patch = match item.create_patch() {
            Ok(Some(patch)) => patch,
            Ok(None) => {
                debug!(id, "No changes to send");
                return Ok(false);
            }
            Err(e) => return restore_on_error(item, saved_comment, Err(e.into())),
        };

        let sent = self
            .client
            .update(id, &patch, bypass_rules)
            .await
            .map_err(WitkitError::from);
        let record = restore_on_error(item, saved_comment, sent)?;
        if !self.client.validate_only() {
            item.initialize(record)?;
        }
        Ok(true)
    }

    /// Deletes a saved work item. Returns `false` in validate-only mode.
    pub async fn delete<T: TrackedItem>(&self, item: &T) -> Result<bool> {
        let id = item
            .core()
            .id()
            .ok_or(UsageError::NewWorkItem { operation: "delete" })?;
        Ok(self.client.delete(id).await?)
    }

    /// Links `child` under `parent`.
    pub async fn add_child<T: TrackedItem>(
        &self,
        parent: &mut T,
        child: &dyn DynWorkItem,
    ) -> Result<()> {
        self.add_relationship(parent, Relationship::Child, &[child], true)
            .await
    }

    /// Links every item in `children` under `parent` in one update.
    pub async fn add_children<T: TrackedItem>(
        &self,
        parent: &mut T,
        children: &[&dyn DynWorkItem],
    ) -> Result<()> {
        self.add_relationship(parent, Relationship::Child, children, true)
            .await
    }

    /// Adds a `Related` link from `owner` to `related`.
    pub async fn add_related<T: TrackedItem>(
        &self,
        owner: &mut T,
        related: &dyn DynWorkItem,
    ) -> Result<()> {
        self.add_relationship(owner, Relationship::Related, &[related], true)
            .await
    }

    /// Adds links of one kind from `owner` to each related item.
    ///
    /// Pending field edits of the owner are sent in the same update.
    ///
    /// # Errors
    ///
    /// Returns [`UsageError::UnsupportedRelationship`] for `Other` and `All`, and
    /// [`UsageError::NewWorkItem`] when the owner or a related item is unsaved.
    pub async fn add_relationship<T: TrackedItem>(
        &self,
        owner: &mut T,
        relationship: Relationship,
        related: &[&dyn DynWorkItem],
        bypass_rules: bool,
    ) -> Result<()> {
        let link_text = relationship
            .link_text()
            .ok_or_else(|| UsageError::UnsupportedRelationship {
                relationship: relationship.to_string(),
            })?;
        let owner_id = item_id(owner.core(), "add a relationship to")?;

        let mut patch = owner
            .create_patch()?
            .unwrap_or_else(|| PatchDocument::with_precondition(owner.core().revision()));
        for item in related {
            let id = item_id(item.work_item(), "link")?;
            let url = item
                .work_item()
                .snapshot()
                .map(|s| strip_revision_from_url(&s.url).to_string())
                .unwrap_or_default();
            patch.push(PatchOperation::add(
                "/relations/-",
                json!({
                    "rel": link_text,
                    "url": url,
                    "attributes": { "comment": format!("Added related item {id}") }
                }),
            ));
        }

        let record = self.client.update(owner_id, &patch, bypass_rules).await?;
        info!(
            id = owner_id,
            %relationship,
            count = related.len(),
            rev = ?record.rev,
            "Added relationships"
        );
        if !self.client.validate_only() {
            owner.initialize(record)?;
        }
        Ok(())
    }

    /// Removes every link from `owner` to the related items.
    ///
    /// Returns `false` when the owner has no link to any of them.
    pub async fn remove_relationship<T: TrackedItem>(
        &self,
        owner: &mut T,
        related: &[&dyn DynWorkItem],
    ) -> Result<bool> {
        let owner_id = item_id(owner.core(), "remove a relationship from")?;
        let wanted = related
            .iter()
            .map(|item| item_id(item.work_item(), "unlink"))
            .collect::<std::result::Result<HashSet<i32>, UsageError>>()?;

        let links = self
            .client
            .get_relationship_links(owner_id, Relationship::All, None)
            .await?;
        let mut indices: Vec<usize> = links
            .iter()
            .enumerate()
            .filter(|(_, link)| link.related_id.is_some_and(|id| wanted.contains(&id)))
            .map(|(index, _)| index)
            .collect();
        if indices.is_empty() {
            debug!(id = owner_id, "No matching relations to remove");
            return Ok(false);
        }

        // Highest index first, so earlier removals do not shift later ones.
        indices.sort_unstable_by(|a, b| b.cmp(a));
        let mut patch = PatchDocument::new();
        for index in indices {
            patch.push(PatchOperation::remove(format!("/relations/{index}")));
        }

        let record = self.client.update(owner_id, &patch, false).await?;
        if !self.client.validate_only() {
            owner.initialize(record)?;
        }
        Ok(true)
    }

    /// Relations of a work item, optionally restricted to one kind.
    pub async fn get_relationship_links(
        &self,
        id: i32,
        relationship: Relationship,
        as_of: Option<DateTime<Utc>>,
    ) -> Result<Vec<RelationLink>> {
        Ok(self
            .client
            .get_relationship_links(id, relationship, as_of)
            .await?)
    }

    /// Ids of the items linked to `id` by `relationship`.
    pub async fn get_related_ids(&self, id: i32, relationship: Relationship) -> Result<Vec<i32>> {
        Ok(self
            .get_relationship_links(id, relationship, None)
            .await?
            .into_iter()
            .filter_map(|link| link.related_id)
            .collect())
    }

    /// The parent of a work item, if it has one.
    pub async fn get_parent(&self, id: i32) -> Result<Option<Box<dyn DynWorkItem>>> {
        match self.get_related_ids(id, Relationship::Parent).await?.first() {
            Some(parent_id) => Ok(Some(self.get_dyn(*parent_id).await?)),
            None => Ok(None),
        }
    }

    /// The children of a work item.
    pub async fn get_children(&self, id: i32) -> Result<Vec<Box<dyn DynWorkItem>>> {
        self.get_related(id, Relationship::Child).await
    }

    /// Items linked to `id` by `relationship`, as their registered types.
    pub async fn get_related(
        &self,
        id: i32,
        relationship: Relationship,
    ) -> Result<Vec<Box<dyn DynWorkItem>>> {
        let ids = self.get_related_ids(id, relationship).await?;
        self.get_many_dyn(&ids).await
    }
}

fn item_id(
    item: &crate::work_item::WorkItem,
    operation: &'static str,
) -> std::result::Result<i32, UsageError> {
    item.id().ok_or(UsageError::NewWorkItem { operation })
}

/// Queue `comment` on `item` and return the buffer as it was before.
fn queue_comment<T: TrackedItem>(item: &mut T, comment: Option<&str>) -> Result<Option<String>> {
    let saved = item.core().pending_comment().map(str::to_string);
    if let Some(comment) = comment {
        item.core_mut().add_comment_to_history(comment)?;
    }
    Ok(saved)
}

/// A failed send leaves the comment buffer as the caller had it, so retrying
/// after a conflict does not queue the comment twice.
fn restore_on_error<T: TrackedItem, R>(
    item: &mut T,
    saved_comment: Option<String>,
    sent: Result<R>,
) -> Result<R> {
    if sent.is_err() {
        item.core_mut().restore_pending_comment(saved_comment);
    }
    sent
}
