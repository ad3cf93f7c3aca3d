//! Field converters.
//!
//! A converter sits between a raw JSON field value and the local [`FieldValue`]
//! of a bound property. It converts in both directions and may also supply a
//! [`FieldComparer`] that replaces the default equality when the change tracker
//! decides whether a property was modified.
//!
//! ## Built-in converters
//!
//! - [`SeparatedValueConverter`]: delimited strings such as `System.Tags`
//! - [`EnumLabelConverter`]: enumerations whose members carry display labels
//! - [`IdentityConverter`]: identity references rendered as their unique name
//!
//! Converters are stateless and shared through `Arc<dyn FieldConverter>` inside
//! the field descriptor tables.

use serde_json::Value;
use std::fmt;
use std::sync::{Arc, LazyLock};

use crate::error::ConversionError;
use crate::value::{FieldValue, ValueKind};

mod enum_label;
mod identity;
mod separated;

pub use enum_label::EnumLabelConverter;
pub use identity::IdentityConverter;
pub use separated::SeparatedValueConverter;

/// Bidirectional conversion between a raw field value and a local value.
pub trait FieldConverter: Send + Sync + fmt::Debug {
    /// Short name used in error messages.
    fn name(&self) -> &'static str;

    /// Convert a raw field value (absent when the field is missing) into `target`.
    ///
    /// Runs even when the raw value is absent, so a converter may supply a default.
    fn convert(&self, raw: Option<&Value>, target: ValueKind)
    -> Result<FieldValue, ConversionError>;

    /// Convert a local value back into its wire form. `None` means "no value".
    fn convert_back(&self, local: &FieldValue) -> Result<Option<Value>, ConversionError>;

    /// Custom equality used for change detection, if this converter has one.
    fn comparer(&self) -> Option<&dyn FieldComparer> {
        None
    }
}

/// Equality between a snapshot value and a current local value.
pub trait FieldComparer: Send + Sync {
    /// True when `current` carries the same value as the raw snapshot `initial`.
    fn compare(&self, initial: Option<&Value>, current: &FieldValue) -> bool;
}

static IDENTITY: LazyLock<Arc<dyn FieldConverter>> = LazyLock::new(|| Arc::new(IdentityConverter));
static SEMICOLON_LIST: LazyLock<Arc<dyn FieldConverter>> =
    LazyLock::new(|| Arc::new(SeparatedValueConverter::semicolon()));
static COMMA_LIST: LazyLock<Arc<dyn FieldConverter>> =
    LazyLock::new(|| Arc::new(SeparatedValueConverter::comma()));

/// The shared identity converter.
#[must_use]
pub fn identity() -> Arc<dyn FieldConverter> {
    Arc::clone(&IDENTITY)
}

/// The shared `"; "` list converter.
#[must_use]
pub fn semicolon_list() -> Arc<dyn FieldConverter> {
    Arc::clone(&SEMICOLON_LIST)
}

/// The shared `", "` list converter.
#[must_use]
pub fn comma_list() -> Arc<dyn FieldConverter> {
    Arc::clone(&COMMA_LIST)
}

/// A label converter for `E`.
#[must_use]
pub fn enum_label<E: crate::value::LabeledEnum>() -> Arc<dyn FieldConverter> {
    Arc::new(EnumLabelConverter::<E>::new())
}
