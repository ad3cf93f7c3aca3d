//! Execution of remote queries.
//!
//! A remote query is composed as WIQL, run for ids, fetched in chunks,
//! materialized and then passed through the full operator chain in memory.

use tracing::info;

use crate::Result;
use crate::api::WorkItemService;
use crate::fields;
use crate::query::evaluator::partial_eval;
use crate::query::queryable::{QueryExpr, apply};
use crate::query::wiql::{Translation, translate};
use crate::work_item::TrackedItem;

/// The server side of a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPlan {
    pub wiql: String,
    /// Row cap sent with the query.
    pub top: Option<i32>,
    /// True when the server alone selects exactly the requested rows.
    pub exact: bool,
}

/// Compose the WIQL for `expr` over items of type `T`.
pub fn plan<T: TrackedItem>(service: &WorkItemService, expr: &QueryExpr) -> Result<QueryPlan> {
    let mut conditions = Vec::new();
    if let Some(project) = service.client().project() {
        conditions.push(format!("[{}] = '{}'", fields::PROJECT, quote(project)));
    }
    if let Some(type_name) = service.registry().name_for::<T>() {
        conditions.push(format!(
            "[{}] = '{}'",
            fields::WORK_ITEM_TYPE,
            quote(type_name)
        ));
    }

    let translation = match expr.innermost_where() {
        Some(predicate) => translate::<T>(&partial_eval(predicate)?)?,
        None => Translation::default(),
    };
    if !translation.is_empty() {
        conditions.push(translation.to_wiql());
    }

    let top = expr
        .innermost_take()
        .filter(|(inner, _)| take_is_pushable(inner, &translation))
        .and_then(|(_, count)| i32::try_from(count).ok());

    let mut wiql = "SELECT * FROM WorkItems".to_string();
    if !conditions.is_empty() {
        wiql.push_str(" WHERE ");
        wiql.push_str(&conditions.join(" AND "));
    }

    let exact = match expr.innermost_where() {
        Some(_) => translation.exact,
        None => true,
    };
    Ok(QueryPlan { wiql, top, exact })
}

/// A row cap can only be sent when the rows before the `Take` are exactly what
/// the server returns.
fn take_is_pushable(inner: &QueryExpr, translation: &Translation) -> bool {
    match inner {
        QueryExpr::Source => true,
        QueryExpr::Where { inner, .. } => inner.is_source() && translation.exact,
        _ => false,
    }
}

fn quote(text: &str) -> String {
    text.replace('\'', "''")
}

/// Run `expr` against the server and return the items it selects.
pub(crate) async fn execute<T: TrackedItem>(
    service: &WorkItemService,
    expr: &QueryExpr,
) -> Result<Vec<T>> {
    let plan = plan::<T>(service, expr)?;
    info!(wiql = %plan.wiql, top = ?plan.top, exact = plan.exact, "Composed WIQL query");

    let fields = service.fields_for::<T>().await?;
    let records = service.query_records(&plan.wiql, plan.top, &fields).await?;
    let items = records
        .into_iter()
        .map(|record| service.registry().materialize_as::<T>(record))
        .collect::<Result<Vec<T>>>()?;

    Ok(apply(expr, items)?)
}
