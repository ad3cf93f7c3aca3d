//! Field binding layer.
//!
//! Every work item type declares a [`FieldMap`]: an explicit table that binds its
//! properties to remote field reference names, optionally through a shared
//! [`FieldConverter`]. The change tracker, the in-memory query evaluator and the
//! WIQL translator all work from this table.
//!
//! ## Declaring bindings
//!
//! ```rust
//! use std::sync::{Arc, LazyLock};
//! use witkit::binding::{FieldMap, FieldSpec};
//! use witkit::convert::IdentityConverter;
//!
//! #[derive(Default)]
//! struct Review {
//!     title: Option<String>,
//!     reviewer: Option<String>,
//! }
//!
//! static REVIEW_FIELDS: LazyLock<FieldMap<Review>> = LazyLock::new(|| {
//!     FieldMap::<Review>::builder("Review")
//!         .bind(FieldSpec::new("title", "System.Title"), |r| &r.title, |r| &mut r.title)
//!         .bind(
//!             FieldSpec::new("reviewer", "Custom.Reviewer").with_converter(Arc::new(IdentityConverter)),
//!             |r| &r.reviewer,
//!             |r| &mut r.reviewer,
//!         )
//!         .build()
//!         .expect("valid bindings")
//! });
//!
//! assert_eq!(REVIEW_FIELDS.field_names(), vec!["System.Title", "Custom.Reviewer"]);
//! ```

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::convert::FieldConverter;
use crate::error::{BindingError, ConversionError};
use crate::value::{FieldType, FieldValue, ValueKind};

pub mod registry;

pub use registry::{TypeRegistry, TypeRegistryBuilder};

type Getter<T> = Arc<dyn Fn(&T) -> FieldValue + Send + Sync>;
type Setter<T> = Arc<dyn Fn(&mut T, FieldValue) -> Result<(), ConversionError> + Send + Sync>;

/// Declaration of a single property-to-field binding.
#[derive(Clone)]
pub struct FieldSpec {
    property: &'static str,
    field: &'static str,
    converter: Option<Arc<dyn FieldConverter>>,
    read_only: bool,
}

impl FieldSpec {
    #[must_use]
    pub fn new(property: &'static str, field: &'static str) -> Self {
        Self {
            property,
            field,
            converter: None,
            read_only: false,
        }
    }

    /// Never sent back to the server.
    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    #[must_use]
    pub fn with_converter(mut self, converter: Arc<dyn FieldConverter>) -> Self {
        self.converter = Some(converter);
        self
    }
}

impl fmt::Debug for FieldSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldSpec")
            .field("property", &self.property)
            .field("field", &self.field)
            .field("converter", &self.converter.as_ref().map(|c| c.name()))
            .field("read_only", &self.read_only)
            .finish()
    }
}

/// A bound property of `T`, with typed access through [`FieldValue`].
pub struct FieldBinding<T> {
    spec: FieldSpec,
    kind: ValueKind,
    get: Getter<T>,
    set: Option<Setter<T>>,
}

impl<T: 'static> FieldBinding<T> {
    /// Bind a stored property of type `V`.
    pub fn bind<V: FieldType>(
        spec: FieldSpec,
        get: fn(&T) -> &V,
        get_mut: fn(&mut T) -> &mut V,
    ) -> Self {
        Self {
            spec,
            kind: V::KIND,
            get: Arc::new(move |item: &T| get(item).to_field_value()),
            set: Some(Arc::new(move |item: &mut T, value: FieldValue| {
                *get_mut(item) = V::from_field_value(value)?;
                Ok(())
            })),
        }
    }

    /// Bind a value computed from the item. Computed bindings are read-only and
    /// are never assigned from a snapshot.
    pub fn computed(spec: FieldSpec, kind: ValueKind, get: fn(&T) -> FieldValue) -> Self {
        Self {
            spec: spec.read_only(),
            kind,
            get: Arc::new(get),
            set: None,
        }
    }

    /// Re-target this binding at a type that contains a `T`.
    pub fn lift<U: 'static>(
        &self,
        project: fn(&U) -> &T,
        project_mut: fn(&mut U) -> &mut T,
    ) -> FieldBinding<U> {
        let get = Arc::clone(&self.get);
        let set = self.set.clone();
        FieldBinding {
            spec: self.spec.clone(),
            kind: self.kind,
            get: Arc::new(move |item: &U| get(project(item))),
            set: set.map(|set| -> Setter<U> {
                Arc::new(move |item: &mut U, value: FieldValue| set(project_mut(item), value))
            }),
        }
    }
}

impl<T> FieldBinding<T> {
    #[must_use]
    pub fn property(&self) -> &'static str {
        self.spec.property
    }

    #[must_use]
    pub fn field(&self) -> &'static str {
        self.spec.field
    }

    #[must_use]
    pub fn converter(&self) -> Option<&dyn FieldConverter> {
        self.spec.converter.as_deref()
    }

    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.spec.read_only
    }

    /// True for computed bindings, which have no stored property.
    #[must_use]
    pub fn is_computed(&self) -> bool {
        self.set.is_none()
    }

    /// Declared type of the property.
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    /// Current value of the property.
    pub fn get(&self, item: &T) -> FieldValue {
        (self.get)(item)
    }

    /// Assign a value, coercing it into the declared type. Computed bindings ignore it.
    pub fn set(&self, item: &mut T, value: FieldValue) -> Result<(), ConversionError> {
        match &self.set {
            Some(set) => set(item, value),
            None => Ok(()),
        }
    }
}

impl<T> fmt::Debug for FieldBinding<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldBinding")
            .field("spec", &self.spec)
            .field("kind", &self.kind)
            .finish()
    }
}

/// The descriptor table of a work item type.
pub struct FieldMap<T> {
    type_name: &'static str,
    bindings: Vec<FieldBinding<T>>,
}

impl<T: 'static> FieldMap<T> {
    pub fn builder(type_name: &'static str) -> FieldMapBuilder<T> {
        FieldMapBuilder {
            type_name,
            bindings: Vec::new(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldBinding<T>> {
        self.bindings.iter()
    }

    /// Bindings that take part in the outbound diff.
    pub fn writable(&self) -> impl Iterator<Item = &FieldBinding<T>> {
        self.bindings.iter().filter(|b| !b.is_read_only())
    }

    /// Binding for a property name.
    #[must_use]
    pub fn get(&self, property: &str) -> Option<&FieldBinding<T>> {
        self.bindings.iter().find(|b| b.property() == property)
    }

    /// Binding for a remote field reference name.
    #[must_use]
    pub fn by_field(&self, field: &str) -> Option<&FieldBinding<T>> {
        self.bindings.iter().find(|b| b.field() == field)
    }

    /// Remote field names in declaration order, without duplicates.
    #[must_use]
    pub fn field_names(&self) -> Vec<&'static str> {
        let mut seen = HashSet::new();
        self.bindings
            .iter()
            .map(FieldBinding::field)
            .filter(|field| seen.insert(*field))
            .collect()
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

impl<T> fmt::Debug for FieldMap<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldMap")
            .field("type_name", &self.type_name)
            .field("bindings", &self.bindings)
            .finish()
    }
}

/// Builder for [`FieldMap`]. Validation happens in [`FieldMapBuilder::build`].
pub struct FieldMapBuilder<T> {
    type_name: &'static str,
    bindings: Vec<FieldBinding<T>>,
}

impl<T: 'static> FieldMapBuilder<T> {
    #[must_use]
    pub fn bind<V: FieldType>(
        mut self,
        spec: FieldSpec,
        get: fn(&T) -> &V,
        get_mut: fn(&mut T) -> &mut V,
    ) -> Self {
        self.bindings.push(FieldBinding::bind(spec, get, get_mut));
        self
    }

    #[must_use]
    pub fn computed(mut self, spec: FieldSpec, kind: ValueKind, get: fn(&T) -> FieldValue) -> Self {
        self.bindings.push(FieldBinding::computed(spec, kind, get));
        self
    }

    /// Include every binding of an embedded base type.
    #[must_use]
    pub fn inherit<B: 'static>(
        mut self,
        base: &FieldMap<B>,
        project: fn(&T) -> &B,
        project_mut: fn(&mut T) -> &mut B,
    ) -> Self {
        self.bindings
            .extend(base.iter().map(|b| b.lift(project, project_mut)));
        self
    }

    /// Validate and build the table.
    ///
    /// # Errors
    ///
    /// Returns [`BindingError::DuplicateProperty`] when a property is bound twice and
    /// [`BindingError::EmptyFieldName`] when a binding names no field.
    pub fn build(self) -> Result<FieldMap<T>, BindingError> {
        let mut seen = HashSet::new();
        for binding in &self.bindings {
            if binding.field().trim().is_empty() {
                return Err(BindingError::EmptyFieldName {
                    type_name: self.type_name,
                    property: binding.property(),
                });
            }
            if !seen.insert(binding.property()) {
                return Err(BindingError::DuplicateProperty {
                    type_name: self.type_name,
                    property: binding.property(),
                });
            }
        }

        Ok(FieldMap {
            type_name: self.type_name,
            bindings: self.bindings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::SeparatedValueConverter;

    #[derive(Debug, Default)]
    struct Base {
        title: Option<String>,
    }

    #[derive(Debug, Default)]
    struct Derived {
        base: Base,
        points: Option<f64>,
        labels: Vec<String>,
    }

    fn base_map() -> FieldMap<Base> {
        FieldMap::<Base>::builder("Base")
            .bind(FieldSpec::new("title", "System.Title"), |b| &b.title, |b| &mut b.title)
            .build()
            .unwrap()
    }

    /// # Duplicate Property Is Rejected
    ///
    /// Verifies a property can only be bound once.
    ///
    /// ## Test Scenario
    /// - Bind the same property to two fields
    ///
    /// ## Expected Outcome
    /// - Building fails with DuplicateProperty naming the property
    #[test]
    fn test_duplicate_property_rejected() {
        let result = FieldMap::<Base>::builder("Base")
            .bind(FieldSpec::new("title", "System.Title"), |b| &b.title, |b| &mut b.title)
            .bind(FieldSpec::new("title", "Custom.Title"), |b| &b.title, |b| &mut b.title)
            .build();

        match result {
            Err(BindingError::DuplicateProperty { property, .. }) => assert_eq!(property, "title"),
            other => panic!("expected duplicate property error, got {other:?}"),
        }
    }

    /// # Empty Field Name Is Rejected
    ///
    /// Verifies a binding must name a remote field.
    ///
    /// ## Test Scenario
    /// - Bind a property to an empty field name
    ///
    /// ## Expected Outcome
    /// - Building fails with EmptyFieldName
    #[test]
    fn test_empty_field_name_rejected() {
        let result = FieldMap::<Base>::builder("Base")
            .bind(FieldSpec::new("title", " "), |b| &b.title, |b| &mut b.title)
            .build();
        assert!(matches!(result, Err(BindingError::EmptyFieldName { .. })));
    }

    /// # Inherited Bindings Reach The Base
    ///
    /// Verifies lifted bindings read and write the embedded base value.
    ///
    /// ## Test Scenario
    /// - Build a derived map inheriting the base map
    /// - Write through the inherited binding and read it back
    ///
    /// ## Expected Outcome
    /// - The base property changes and field names keep declaration order
    #[test]
    fn test_inherited_bindings() {
        let map = FieldMap::<Derived>::builder("Derived")
            .inherit(&base_map(), |d| &d.base, |d| &mut d.base)
            .bind(
                FieldSpec::new("points", "Custom.Points"),
                |d| &d.points,
                |d| &mut d.points,
            )
            .bind(
                FieldSpec::new("labels", "System.Tags")
                    .with_converter(Arc::new(SeparatedValueConverter::semicolon())),
                |d| &d.labels,
                |d| &mut d.labels,
            )
            .build()
            .unwrap();

        let mut item = Derived::default();
        let title = map.get("title").unwrap();
        title.set(&mut item, FieldValue::from("Hello")).unwrap();
        assert_eq!(item.base.title.as_deref(), Some("Hello"));
        assert_eq!(title.get(&item), FieldValue::from("Hello"));

        let points = map.by_field("Custom.Points").unwrap();
        points.set(&mut item, FieldValue::Integer(3)).unwrap();
        assert_eq!(item.points, Some(3.0));
        assert_eq!(points.kind(), ValueKind::Double);

        assert!(map.get("labels").unwrap().converter().is_some());
        assert_eq!(
            map.field_names(),
            vec!["System.Title", "Custom.Points", "System.Tags"]
        );
    }

    /// # Computed Bindings Are Read Only
    ///
    /// Verifies computed bindings cannot be assigned and never take part in diffs.
    ///
    /// ## Test Scenario
    /// - Declare a computed binding and try to set it
    ///
    /// ## Expected Outcome
    /// - The binding is read-only and setting is a no-op
    #[test]
    fn test_computed_bindings() {
        let map = FieldMap::<Base>::builder("Base")
            .computed(FieldSpec::new("length", "Custom.Length"), ValueKind::Integer, |b| {
                b.title
                    .as_ref()
                    .map_or(FieldValue::Null, |t| FieldValue::Integer(t.len() as i64))
            })
            .build()
            .unwrap();

        let mut item = Base {
            title: Some("abc".to_string()),
        };
        let binding = map.get("length").unwrap();
        assert!(binding.is_read_only());
        assert!(binding.is_computed());
        binding.set(&mut item, FieldValue::Integer(9)).unwrap();
        assert_eq!(binding.get(&item), FieldValue::Integer(3));
        assert_eq!(map.writable().count(), 0);
    }
}
