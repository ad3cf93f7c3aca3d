//! Unified error handling for the witkit library.
//!
//! This module provides the error hierarchy using `thiserror`, so callers can tell
//! declaration defects, misuse, remote failures and concurrency conflicts apart.
//!
//! ## Error Categories
//!
//! - [`ApiError`]: Errors from Azure DevOps API interactions
//! - [`ConfigError`]: Errors from configuration loading and validation
//! - [`BindingError`]: Defects in a work item type's field declarations
//! - [`ConversionError`]: A converter or coercion could not handle a value
//! - [`UsageError`]: An operation was invoked on the wrong kind of entity or input
//! - [`QueryError`]: A query expression could not be evaluated
//!
//! ## Example
//!
//! ```rust,no_run
//! use witkit::error::{WitkitError, ApiError};
//!
//! fn example() -> Result<(), WitkitError> {
//!     // Errors are automatically converted via From trait
//!     Err(ApiError::Unauthorized)?;
//!     Ok(())
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

use crate::value::ValueKind;

/// The main error type for the witkit library.
#[derive(Error, Debug)]
pub enum WitkitError {
    /// An error occurred while interacting with the Azure DevOps API.
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// An error occurred while loading or validating configuration.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A work item type declares a field binding that cannot be honoured.
    #[error("Field binding error: {0}")]
    Binding(#[from] BindingError),

    /// A value could not be converted.
    #[error("Conversion error: {0}")]
    Conversion(#[from] ConversionError),

    /// An operation was used incorrectly.
    #[error("Usage error: {0}")]
    Usage(#[from] UsageError),

    /// A query expression could not be evaluated.
    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    /// A generic error for cases not covered by specific error types.
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl WitkitError {
    /// True when the remote side rejected a write because the item changed concurrently.
    ///
    /// The caller may reload the item, reapply its edits and try again.
    #[must_use]
    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(self, Self::Api(ApiError::ConcurrencyConflict { .. }))
    }
}

/// Errors that can occur when interacting with the Azure DevOps API.
#[derive(Error, Debug)]
pub enum ApiError {
    /// The API request was unauthorized (401/403).
    #[error("Unauthorized: invalid or expired Personal Access Token")]
    Unauthorized,

    /// The requested resource was not found (404).
    #[error("Resource not found: {resource}")]
    NotFound {
        /// Description of the resource that was not found.
        resource: String,
    },

    /// The revision precondition of an update did not hold (412).
    #[error("Work item {id} was changed by someone else (expected revision {revision:?})")]
    ConcurrencyConflict {
        /// The work item being written.
        id: i32,
        /// The revision the update was based on.
        revision: Option<i32>,
    },

    /// The API returned an error response.
    #[error("API request failed: {message}")]
    RequestFailed {
        /// HTTP status code, when it could be determined.
        status: Option<u16>,
        /// Error message from the API.
        message: String,
    },

    /// Failed to parse the API response.
    #[error("Failed to parse API response: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
    },
}

impl ApiError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Only concurrency conflicts are worth retrying after a reload.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }
}

/// Errors that can occur during configuration loading and validation.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required configuration field is missing.
    #[error("{field} is required (use --{field}, {env_var} env var, or config file)")]
    MissingRequired {
        /// Name of the missing field.
        field: String,
        /// Environment variable name for this field.
        env_var: String,
    },

    /// Failed to read the configuration file.
    #[error("Failed to read config file at {path}: {message}")]
    FileReadError {
        /// Path to the config file.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// Failed to parse the configuration file.
    #[error("Failed to parse config file at {path}: {message}")]
    ParseError {
        /// Path to the config file.
        path: PathBuf,
        /// Parse error message.
        message: String,
    },

    /// An invalid value was provided for a configuration field.
    #[error("Invalid value for {field}: {message}")]
    InvalidValue {
        /// Name of the field with invalid value.
        field: String,
        /// Description of why the value is invalid.
        message: String,
    },

    /// Failed to create config directory.
    #[error("Failed to create config directory at {path}: {message}")]
    DirectoryCreationError {
        /// Path where directory creation failed.
        path: PathBuf,
        /// Error message.
        message: String,
    },
}

/// A value could not be converted between its wire and local forms.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConversionError {
    /// A converter was asked to produce a type it does not support.
    #[error("{converter} cannot convert to {target}")]
    TypeMismatch {
        /// Name of the converter.
        converter: &'static str,
        /// The requested target kind.
        target: ValueKind,
    },

    /// A converter received a value shape it does not understand.
    #[error("{converter} cannot handle value {value}")]
    UnsupportedValue {
        /// Name of the converter.
        converter: &'static str,
        /// Rendering of the offending value.
        value: String,
    },

    /// A value could not be changed into the declared property type.
    #[error("cannot coerce {value} into {target}")]
    Coercion {
        /// Rendering of the offending value.
        value: String,
        /// The declared kind.
        target: ValueKind,
    },
}

/// A defect in a work item type's field declarations.
///
/// These never occur with a correctly declared binding and are not retried.
#[derive(Error, Debug)]
pub enum BindingError {
    /// A snapshot value could not be assigned to its property.
    #[error("Cannot assign field '{field}' to property '{property}' (raw value {raw}{via}): {source}")]
    Assign {
        /// Local property name.
        property: &'static str,
        /// Remote field reference name.
        field: &'static str,
        /// Rendering of the raw snapshot value.
        raw: String,
        /// Converter description, empty when no converter was involved.
        via: String,
        /// The underlying conversion failure.
        #[source]
        source: ConversionError,
    },

    /// A property value could not be turned into its wire form while diffing.
    #[error("Cannot convert property '{property}' for field '{field}': {source}")]
    Diff {
        /// Local property name.
        property: &'static str,
        /// Remote field reference name.
        field: &'static str,
        /// The underlying conversion failure.
        #[source]
        source: ConversionError,
    },

    /// Two bindings were declared for the same property.
    #[error("Property '{property}' on {type_name} is bound more than once")]
    DuplicateProperty {
        /// Rust type declaring the bindings.
        type_name: &'static str,
        /// Duplicated property.
        property: &'static str,
    },

    /// A binding names no remote field.
    #[error("Property '{property}' on {type_name} has an empty field name")]
    EmptyFieldName {
        /// Rust type declaring the bindings.
        type_name: &'static str,
        /// Property with the empty field name.
        property: &'static str,
    },

    /// A type without a remote work item type name was registered.
    #[error("{type_name} does not declare a work item type name and cannot be registered")]
    UnnamedType {
        /// Rust type that was registered.
        type_name: &'static str,
    },
}

/// An operation was invoked incorrectly.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UsageError {
    /// A new, unsaved work item has no identity.
    #[error("Cannot {operation} a new work item that has not been saved")]
    NewWorkItem {
        /// The operation that was attempted.
        operation: &'static str,
    },

    /// A saved work item was passed to an operation that creates items.
    #[error("Cannot add work item {id}: it already exists")]
    AlreadyExists {
        /// Identifier of the existing item.
        id: i32,
    },

    /// A snapshot for another work item was assigned to an entity.
    #[error("Cannot re-initialize work item {current} from a snapshot of work item {incoming}")]
    IdentityMismatch {
        /// Identifier currently held.
        current: i32,
        /// Identifier of the incoming snapshot.
        incoming: i32,
    },

    /// The relationship kind cannot be used for this operation.
    #[error("Relationship '{relationship}' is not valid here")]
    UnsupportedRelationship {
        /// The rejected relationship.
        relationship: String,
    },

    /// A history comment was empty or whitespace.
    #[error("History comment cannot be blank")]
    BlankComment,

    /// The work item has no project set.
    #[error("Work item must have a project before it can be added")]
    MissingProject,

    /// The work item has no work item type set.
    #[error("Work item must have a work item type before it can be added")]
    MissingWorkItemType,

    /// A comparison references bound members on both sides.
    #[error("Comparison between '{left}' and '{right}' needs a literal on one side")]
    MemberOnBothSides {
        /// Left member.
        left: String,
        /// Right member.
        right: String,
    },

    /// The maximum batch size is outside the accepted range.
    #[error("Batch size {size} is out of range (1..=200)")]
    BatchSizeOutOfRange {
        /// The rejected size.
        size: usize,
    },
}

/// A query expression could not be evaluated in memory.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    /// The expression references a property the target type does not expose.
    #[error("Unknown property '{property}'")]
    UnknownProperty {
        /// The property name.
        property: String,
    },

    /// An operand had the wrong shape for its operator.
    #[error("Expected {expected} but found {found}")]
    TypeMismatch {
        /// What the operator needed.
        expected: &'static str,
        /// What was found.
        found: String,
    },

    /// The query parameter was used where a value was required.
    #[error("The query parameter cannot be evaluated without an item")]
    UnboundParameter,

    /// A custom function failed.
    #[error("Function '{name}' failed: {message}")]
    Function {
        /// Function name.
        name: String,
        /// Failure description.
        message: String,
    },

    /// A terminal operator found no element.
    #[error("Sequence contains no elements")]
    EmptySequence,
}
