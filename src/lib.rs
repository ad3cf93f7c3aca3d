//! # witkit
//!
//! Typed, change-tracked access to Azure DevOps work items.
//!
//! - Work item types declare their fields once as a [`binding::FieldMap`]
//! - Loaded items remember their snapshot, so updates send only what changed
//! - Relationships are edited through the owning item
//! - Queries are written as expressions, pushed to the server as WIQL where
//!   possible and always re-applied client side
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use witkit::{TrackedItem, WorkItemClient, WorkItemService};
//! use witkit::query::member;
//! use witkit::work_item::agile::Task;
//! use secrecy::SecretString;
//!
//! # #[tokio::main]
//! # async fn main() -> witkit::Result<()> {
//! let client = WorkItemClient::with_pat(
//!     "my-org".to_string(),
//!     "my-project".to_string(),
//!     &SecretString::from("my-pat".to_string()),
//! );
//! let service = WorkItemService::with_standard_types(client);
//!
//! let mut task = Task::new_item();
//! task.base.title = Some("Write release notes".to_string());
//! service.add(&mut task, None, false).await?;
//!
//! let open = service
//!     .queryable::<Task>()
//!     .filter(member("state").not_equals("Closed"))
//!     .count()
//!     .await?;
//! println!("{open} open tasks");
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod binding;
pub mod config;
pub mod convert;
pub mod error;
pub mod fields;
pub mod logging;
pub mod models;
pub mod parsed_property;
pub mod query;
pub mod relations;
pub mod utils;
pub mod value;
pub mod work_item;

// Re-export commonly used types for convenience
pub use api::{WorkItemClient, WorkItemService};
pub use binding::TypeRegistry;
pub use config::Config;
pub use error::WitkitError;
pub use query::Queryable;
pub use relations::Relationship;
pub use value::FieldValue;
pub use work_item::{DynWorkItem, TrackedItem, WorkItem};

/// Core result type used throughout the library
pub type Result<T> = std::result::Result<T, error::WitkitError>;

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
