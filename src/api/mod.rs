//! Azure DevOps work item tracking access.
//!
//! This module layers the typed work item operations over the REST service:
//!
//! - [`WitOperations`]: the raw transport, one call per REST endpoint
//! - [`WorkItemClient`]: records and patch documents, with id chunking and
//!   validate-only handling
//! - [`WorkItemService`]: change-tracked entities, relationships and queries
//!
//! ## Example
//!
//! ```rust,no_run
//! use witkit::api::{WorkItemClient, WorkItemService};
//! use witkit::work_item::agile::Bug;
//! use secrecy::SecretString;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let client = WorkItemClient::with_pat(
//!     "my-org".to_string(),
//!     "my-project".to_string(),
//!     &SecretString::from("my-pat".to_string()),
//! );
//! let service = WorkItemService::with_standard_types(client);
//!
//! let mut bug: Bug = service.get(42).await?;
//! bug.base.state = "Resolved".to_string();
//! service.update(&mut bug, Some("Fixed in build 1.2.3"), false).await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod mappers;
mod service;
pub mod traits;

pub use client::{MAX_BATCH_SIZE, WorkItemClient};
pub use mappers::{classify_error, wiql_id_query};
pub use service::WorkItemService;
pub use traits::{RealWitOperations, WitOperations};
