//! Composable work item queries.
//!
//! A [`Queryable`] is a source plus a chain of operators. Nothing runs until a
//! terminal operation is awaited. A remote source sends the pushable part of the
//! chain to the server and then applies the whole chain in memory, so the result
//! never depends on what the translator could express.

use std::cmp::Ordering;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::api::WorkItemService;
use crate::error::QueryError;
use crate::query::context::{self, QueryPlan};
use crate::query::expr::Expr;
use crate::value::FieldValue;
use crate::work_item::TrackedItem;
use crate::Result;

/// The operator chain of a query, innermost node first when walking `inner`.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryExpr {
    Source,
    Where {
        inner: Box<QueryExpr>,
        predicate: Expr,
    },
    Take {
        inner: Box<QueryExpr>,
        count: usize,
    },
    Skip {
        inner: Box<QueryExpr>,
        count: usize,
    },
    OrderBy {
        inner: Box<QueryExpr>,
        property: String,
        descending: bool,
    },
}

impl QueryExpr {
    /// The node this operator applies to. `None` for the source.
    #[must_use]
    pub fn inner(&self) -> Option<&QueryExpr> {
        match self {
            Self::Source => None,
            Self::Where { inner, .. }
            | Self::Take { inner, .. }
            | Self::Skip { inner, .. }
            | Self::OrderBy { inner, .. } => Some(inner),
        }
    }

    #[must_use]
    pub fn is_source(&self) -> bool {
        matches!(self, Self::Source)
    }

    /// The `Take` closest to the source.
    #[must_use]
    pub fn innermost_take(&self) -> Option<(&QueryExpr, usize)> {
        let inner = self.inner().and_then(QueryExpr::innermost_take);
        match (inner, self) {
            (Some(found), _) => Some(found),
            (None, Self::Take { inner, count }) => Some((inner, *count)),
            (None, _) => None,
        }
    }

    /// The predicate of the `Where` closest to the source, provided no `Take` or
    /// `Skip` sits between it and the source.
    #[must_use]
    pub fn innermost_where(&self) -> Option<&Expr> {
        let mut node = self;
        let mut found = None;
        loop {
            match node {
                Self::Source => return found,
                Self::Where { inner, predicate } => {
                    found = Some(predicate);
                    node = inner;
                }
                Self::OrderBy { inner, .. } => node = inner,
                Self::Take { inner, .. } | Self::Skip { inner, .. } => {
                    found = None;
                    node = inner;
                }
            }
        }
    }
}

impl fmt::Display for QueryExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source => write!(f, "source"),
            Self::Where { inner, predicate } => write!(f, "{inner}.where(item => {predicate})"),
            Self::Take { inner, count } => write!(f, "{inner}.take({count})"),
            Self::Skip { inner, count } => write!(f, "{inner}.skip({count})"),
            Self::OrderBy {
                inner,
                property,
                descending: false,
            } => write!(f, "{inner}.order_by({property})"),
            Self::OrderBy {
                inner,
                property,
                descending: true,
            } => write!(f, "{inner}.order_by_descending({property})"),
        }
    }
}

enum Source<T> {
    Remote(WorkItemService),
    Items(Arc<Vec<T>>),
}

impl<T> Clone for Source<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Remote(service) => Self::Remote(service.clone()),
            Self::Items(items) => Self::Items(Arc::clone(items)),
        }
    }
}

/// A lazily executed query over work items of type `T`.
///
/// # Example
///
/// ```rust,no_run
/// use witkit::api::{WorkItemClient, WorkItemService};
/// use witkit::query::member;
/// use witkit::work_item::agile::Bug;
/// use secrecy::SecretString;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let client = WorkItemClient::with_pat(
///     "my-org".to_string(),
///     "my-project".to_string(),
///     &SecretString::from("my-pat".to_string()),
/// );
/// let service = WorkItemService::with_standard_types(client);
///
/// let bugs = service
///     .queryable::<Bug>()
///     .filter(member("state").equals("Active").and(member("priority").le(2)))
///     .order_by("priority")
///     .take(10)
///     .to_list()
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct Queryable<T> {
    source: Source<T>,
    expr: QueryExpr,
    _item: PhantomData<fn() -> T>,
}

impl<T> Clone for Queryable<T> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            expr: self.expr.clone(),
            _item: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Queryable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = match &self.source {
            Source::Remote(_) => "remote".to_string(),
            Source::Items(items) => format!("{} items", items.len()),
        };
        f.debug_struct("Queryable")
            .field("source", &source)
            .field("expr", &self.expr.to_string())
            .finish()
    }
}

impl<T: TrackedItem> Queryable<T> {
    /// A query against the server.
    pub fn remote(service: WorkItemService) -> Self {
        Self {
            source: Source::Remote(service),
            expr: QueryExpr::Source,
            _item: PhantomData,
        }
    }

    /// A query over items already in memory.
    pub fn from_items(items: Vec<T>) -> Self {
        Self {
            source: Source::Items(Arc::new(items)),
            expr: QueryExpr::Source,
            _item: PhantomData,
        }
    }

    fn then(self, build: impl FnOnce(Box<QueryExpr>) -> QueryExpr) -> Self {
        Self {
            source: self.source,
            expr: build(Box::new(self.expr)),
            _item: PhantomData,
        }
    }

    /// Keep items matching `predicate`.
    #[must_use]
    pub fn filter(self, predicate: Expr) -> Self {
        self.then(|inner| QueryExpr::Where { inner, predicate })
    }

    #[must_use]
    pub fn take(self, count: usize) -> Self {
        self.then(|inner| QueryExpr::Take { inner, count })
    }

    #[must_use]
    pub fn skip(self, count: usize) -> Self {
        self.then(|inner| QueryExpr::Skip { inner, count })
    }

    /// Sort ascending by a bound property. Items without a value sort first.
    #[must_use]
    pub fn order_by(self, property: impl Into<String>) -> Self {
        let property = property.into();
        self.then(|inner| QueryExpr::OrderBy {
            inner,
            property,
            descending: false,
        })
    }

    #[must_use]
    pub fn order_by_descending(self, property: impl Into<String>) -> Self {
        let property = property.into();
        self.then(|inner| QueryExpr::OrderBy {
            inner,
            property,
            descending: true,
        })
    }

    #[must_use]
    pub fn expression(&self) -> &QueryExpr {
        &self.expr
    }

    /// The WIQL a remote query would send. `None` for an in-memory source.
    pub fn plan(&self) -> Result<Option<QueryPlan>> {
        match &self.source {
            Source::Items(_) => Ok(None),
            Source::Remote(service) => Ok(Some(context::plan::<T>(service, &self.expr)?)),
        }
    }

    /// Runs the query.
    pub async fn execute(&self) -> Result<Vec<T>> {
        match &self.source {
            Source::Items(items) => Ok(apply(&self.expr, items.as_ref().clone())?),
            Source::Remote(service) => context::execute(service, &self.expr).await,
        }
    }

    pub async fn to_list(&self) -> Result<Vec<T>> {
        self.execute().await
    }

    /// Runs the query and keeps the results as a new in-memory source.
    pub async fn materialize(&self) -> Result<Queryable<T>> {
        Ok(Self::from_items(self.execute().await?))
    }

    pub async fn count(&self) -> Result<usize> {
        Ok(self.execute().await?.len())
    }

    /// The first result.
    ///
    /// # Errors
    ///
    /// [`QueryError::EmptySequence`] when nothing matches.
    pub async fn first(&self) -> Result<T> {
        self.first_or_none()
            .await?
            .ok_or_else(|| QueryError::EmptySequence.into())
    }

    pub async fn first_or_none(&self) -> Result<Option<T>> {
        Ok(self.clone().take(1).execute().await?.into_iter().next())
    }

    pub async fn any(&self) -> Result<bool> {
        Ok(self.first_or_none().await?.is_some())
    }
}

/// Apply an operator chain to items in memory.
pub(crate) fn apply<T: TrackedItem>(expr: &QueryExpr, items: Vec<T>) -> std::result::Result<Vec<T>, QueryError> {
    Ok(match expr {
        QueryExpr::Source => items,
        QueryExpr::Where { inner, predicate } => {
            let mut kept = Vec::new();
            for item in apply(inner, items)? {
                if predicate.matches(&item)? {
                    kept.push(item);
                }
            }
            kept
        }
        QueryExpr::Take { inner, count } => {
            let mut items = apply(inner, items)?;
            items.truncate(*count);
            items
        }
        QueryExpr::Skip { inner, count } => apply(inner, items)?.into_iter().skip(*count).collect(),
        QueryExpr::OrderBy {
            inner,
            property,
            descending,
        } => {
            let mut keyed = apply(inner, items)?
                .into_iter()
                .map(|item| {
                    item.property_value(property)
                        .map(|key| (key, item))
                        .ok_or_else(|| QueryError::UnknownProperty {
                            property: property.clone(),
                        })
                })
                .collect::<std::result::Result<Vec<_>, _>>()?;
            keyed.sort_by(|(a, _), (b, _)| {
                let ordering = order_keys(a, b);
                if *descending { ordering.reverse() } else { ordering }
            });
            keyed.into_iter().map(|(_, item)| item).collect()
        }
    })
}

fn order_keys(a: &FieldValue, b: &FieldValue) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a
            .compare(b)
            .unwrap_or_else(|| a.to_string().cmp(&b.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WorkItemRecord;
    use crate::query::expr::member;
    use crate::work_item::agile::Task;
    use serde_json::json;

    fn task(id: i32, title: &str, priority: Option<i64>) -> Task {
        let mut fields = json!({
            "System.WorkItemType": "Task",
            "System.Title": title,
            "System.State": "Active"
        });
        if let Some(priority) = priority {
            fields["Microsoft.VSTS.Common.Priority"] = json!(priority);
        }
        Task::from_record(WorkItemRecord {
            id,
            rev: Some(1),
            fields: fields.as_object().cloned().unwrap(),
            ..Default::default()
        })
        .unwrap()
    }

    fn tasks() -> Vec<Task> {
        vec![
            task(1, "alpha", Some(3)),
            task(2, "beta", None),
            task(3, "gamma", Some(1)),
            task(4, "delta", Some(2)),
        ]
    }

    fn ids(items: &[Task]) -> Vec<i32> {
        items.iter().filter_map(|t| t.base.id()).collect()
    }

    /// # Innermost Take Finder
    ///
    /// Verifies the take closest to the source is found.
    ///
    /// ## Test Scenario
    /// - Build `source.take(10).where(..).take(3)`
    ///
    /// ## Expected Outcome
    /// - The finder reports 10 and the source as its inner node
    #[test]
    fn test_innermost_take_finder() {
        let query = Queryable::from_items(tasks())
            .take(10)
            .filter(member("state").equals("Active"))
            .take(3);
        let (inner, count) = query.expression().innermost_take().unwrap();
        assert_eq!(count, 10);
        assert!(inner.is_source());
        assert!(QueryExpr::Source.innermost_take().is_none());
    }

    /// # Innermost Where Finder
    ///
    /// Verifies only a where with a clean path to the source is pushed.
    ///
    /// ## Test Scenario
    /// - Find the where in `where(a).order_by.where(b)`
    /// - Find the where in `take(5).where(a)`
    ///
    /// ## Expected Outcome
    /// - The first yields `a`; the second yields nothing
    #[test]
    fn test_innermost_where_finder() {
        let a = member("state").equals("Active");
        let b = member("title").contains("x");

        let query = Queryable::from_items(tasks())
            .filter(a.clone())
            .order_by("priority")
            .filter(b);
        assert_eq!(query.expression().innermost_where(), Some(&a));

        let after_take = Queryable::from_items(tasks()).take(5).filter(a);
        assert!(after_take.expression().innermost_where().is_none());
    }

    /// # In Memory Operators
    ///
    /// Verifies where, order, skip and take over loaded items.
    ///
    /// ## Test Scenario
    /// - Order by priority with a missing value, skip one, take two
    /// - Order descending and filter on priority
    ///
    /// ## Expected Outcome
    /// - Nulls sort first ascending; operators apply in chain order
    #[tokio::test]
    async fn test_in_memory_operators() {
        let ordered = Queryable::from_items(tasks()).order_by("priority");
        assert_eq!(ids(&ordered.to_list().await.unwrap()), vec![2, 3, 4, 1]);

        let page = ordered.clone().skip(1).take(2);
        assert_eq!(ids(&page.to_list().await.unwrap()), vec![3, 4]);

        let descending = Queryable::from_items(tasks())
            .filter(member("priority").le(2))
            .order_by_descending("priority");
        assert_eq!(ids(&descending.to_list().await.unwrap()), vec![4, 3]);
        assert_eq!(descending.count().await.unwrap(), 2);
    }

    /// # Scalar Terminals
    ///
    /// Verifies first, any and the empty sequence error.
    ///
    /// ## Test Scenario
    /// - Ask for the first match of a satisfiable and an unsatisfiable filter
    ///
    /// ## Expected Outcome
    /// - The first returns the item; the second fails with EmptySequence
    #[tokio::test]
    async fn test_scalar_terminals() {
        let source = Queryable::from_items(tasks());

        let gamma = source
            .clone()
            .filter(member("title").starts_with("g"))
            .first()
            .await
            .unwrap();
        assert_eq!(gamma.base.id(), Some(3));

        let none = source.clone().filter(member("title").equals("omega"));
        assert!(!none.any().await.unwrap());
        let err = none.first().await.unwrap_err();
        assert!(matches!(
            err,
            crate::error::WitkitError::Query(QueryError::EmptySequence)
        ));
        assert!(source.any().await.unwrap());
    }

    /// # Unknown Order Property
    ///
    /// Verifies ordering by an unbound property is an error.
    ///
    /// ## Test Scenario
    /// - Order by a property no binding declares
    ///
    /// ## Expected Outcome
    /// - UnknownProperty names the property
    #[test]
    fn test_unknown_order_property() {
        let err = tokio_test::block_on(async {
            Queryable::from_items(tasks())
                .order_by("velocity")
                .to_list()
                .await
                .unwrap_err()
        });
        assert!(err.to_string().contains("velocity"));
    }

    /// # Query Chain Display
    ///
    /// Verifies the operator chain renders readably.
    ///
    /// ## Test Scenario
    /// - Render a where, order and take chain
    ///
    /// ## Expected Outcome
    /// - Operators appear in call order
    #[test]
    fn test_query_chain_display() {
        let query = Queryable::from_items(Vec::<Task>::new())
            .filter(member("priority").gt(1))
            .order_by_descending("title")
            .take(5);
        assert_eq!(
            query.expression().to_string(),
            "source.where(item => (item.priority > 1)).order_by_descending(title).take(5)"
        );
    }
}
