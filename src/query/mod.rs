//! Queries over work items.
//!
//! Predicates are built as [`Expr`] trees. A [`Queryable`] chains them with
//! paging and ordering operators; a remote queryable pushes what it can to the
//! server as WIQL and applies the whole chain to what comes back.
//!
//! ## Example
//!
//! ```rust,no_run
//! use witkit::api::{WorkItemClient, WorkItemService};
//! use witkit::query::member;
//! use witkit::work_item::agile::Bug;
//! # use secrecy::SecretString;
//!
//! # #[tokio::main]
//! # async fn main() -> witkit::Result<()> {
//! # let client = WorkItemClient::with_pat("org".into(), "project".into(), &SecretString::from("pat".to_string()));
//! let service = WorkItemService::with_standard_types(client);
//! let active: Vec<Bug> = service
//!     .queryable::<Bug>()
//!     .filter(member("state").equals("Active").and(member("priority").le(2)))
//!     .order_by("priority")
//!     .take(10)
//!     .to_list()
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod context;
pub mod evaluator;
pub mod expr;
pub mod queryable;
pub mod wiql;

pub use context::QueryPlan;
pub use evaluator::{partial_eval, partial_eval_with};
pub use expr::{BinaryOp, Expr, Method, captured, constant, custom, member};
pub use queryable::{QueryExpr, Queryable};
pub use wiql::{Translation, translate};
