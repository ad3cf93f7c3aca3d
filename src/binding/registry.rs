//! Registry of work item types by remote type name.
//!
//! The registry is built once at startup and shared through `Arc`. It turns a
//! remote snapshot into the registered concrete type and knows the union of all
//! bound field names, which untyped queries request.

use std::any::TypeId;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::OnceLock;

use crate::error::{BindingError, WitkitError};
use crate::models::WorkItemRecord;
use crate::work_item::agile::{Bug, Epic, Feature, Task, UserStory};
use crate::work_item::{DynWorkItem, TrackedItem, WorkItem};

type Factory = fn(WorkItemRecord) -> Result<Box<dyn DynWorkItem>, WitkitError>;

#[derive(Clone, Copy)]
struct Registration {
    type_id: TypeId,
    rust_name: &'static str,
    factory: Factory,
    field_names: fn() -> Vec<&'static str>,
}

fn materialize<T: TrackedItem>(record: WorkItemRecord) -> Result<Box<dyn DynWorkItem>, WitkitError> {
    Ok(Box::new(T::from_record(record)?))
}

fn field_names<T: TrackedItem>() -> Vec<&'static str> {
    T::fields().field_names()
}

/// Maps remote work item type names to local types.
pub struct TypeRegistry {
    /// Sorted by name, so lookups by type resolve the same way on every run.
    types: BTreeMap<String, Registration>,
    all_fields: OnceLock<Vec<&'static str>>,
}

impl TypeRegistry {
    pub fn builder() -> TypeRegistryBuilder {
        TypeRegistryBuilder::default()
    }

    /// A registry holding the built-in Agile types.
    #[must_use]
    pub fn standard() -> Self {
        let mut types = BTreeMap::new();
        for (name, registration) in standard_registrations() {
            types.insert(name.to_string(), registration);
        }
        Self {
            types,
            all_fields: OnceLock::new(),
        }
    }

    #[must_use]
    pub fn contains(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }

    /// Registered remote type names, sorted.
    #[must_use]
    pub fn type_names(&self) -> Vec<&str> {
        self.types.keys().map(String::as_str).collect()
    }

    /// The remote type name `T` is registered under, if `T` is the registered type
    /// for that name.
    ///
    /// A type registered under several names resolves to its declared
    /// [`TrackedItem::TYPE_NAME`] when that is one of them, otherwise to the
    /// first name in sorted order.
    #[must_use]
    pub fn name_for<T: TrackedItem>(&self) -> Option<&str> {
        let wanted = TypeId::of::<T>();
        let declared = T::TYPE_NAME
            .and_then(|name| self.types.get_key_value(name))
            .filter(|(_, r)| r.type_id == wanted);
        declared
            .or_else(|| self.types.iter().find(|(_, r)| r.type_id == wanted))
            .map(|(name, _)| name.as_str())
    }

    /// Build the registered type for a snapshot, or an untyped [`WorkItem`].
    pub fn materialize(&self, record: WorkItemRecord) -> Result<Box<dyn DynWorkItem>, WitkitError> {
        match record.work_item_type().and_then(|name| self.types.get(name)) {
            Some(registration) => (registration.factory)(record),
            None => materialize::<WorkItem>(record),
        }
    }

    /// Build a snapshot as `T`.
    ///
    /// The registered type is used when it is `T`; any other snapshot is read
    /// through `T`'s own bindings.
    pub fn materialize_as<T: TrackedItem>(&self, record: WorkItemRecord) -> Result<T, WitkitError> {
        let registered = record
            .work_item_type()
            .and_then(|name| self.types.get(name))
            .is_some_and(|r| r.type_id == TypeId::of::<T>());
        if registered {
            if let Some(item) = self.materialize(record.clone())?.downcast::<T>() {
                return Ok(item);
            }
        }
        T::from_record(record)
    }

    /// Union of the fields bound by every registered type and the base type, sorted.
    pub fn all_fields(&self) -> &[&'static str] {
        self.all_fields.get_or_init(|| {
            let mut all: BTreeSet<&'static str> = WorkItem::fields().field_names().into_iter().collect();
            for registration in self.types.values() {
                all.extend((registration.field_names)());
            }
            all.into_iter().collect()
        })
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let types: Vec<(&str, &str)> = self
            .type_names()
            .into_iter()
            .filter_map(|name| self.types.get(name).map(|r| (name, r.rust_name)))
            .collect();
        f.debug_struct("TypeRegistry").field("types", &types).finish()
    }
}

fn registration<T: TrackedItem>() -> Registration {
    Registration {
        type_id: TypeId::of::<T>(),
        rust_name: std::any::type_name::<T>(),
        factory: materialize::<T>,
        field_names: field_names::<T>,
    }
}

fn standard_registrations() -> Vec<(&'static str, Registration)> {
    vec![
        ("Bug", registration::<Bug>()),
        ("Epic", registration::<Epic>()),
        ("Feature", registration::<Feature>()),
        ("Task", registration::<Task>()),
        ("User Story", registration::<UserStory>()),
    ]
}

/// Builder for [`TypeRegistry`]. Later registrations for a name replace earlier ones.
#[derive(Default)]
pub struct TypeRegistryBuilder {
    types: Vec<(String, Registration)>,
    errors: Vec<BindingError>,
}

impl TypeRegistryBuilder {
    /// Register the built-in Agile types.
    #[must_use]
    pub fn with_standard_types(mut self) -> Self {
        self.types.extend(
            standard_registrations()
                .into_iter()
                .map(|(name, r)| (name.to_string(), r)),
        );
        self
    }

    /// Register `T` under its declared type name.
    #[must_use]
    pub fn register<T: TrackedItem>(mut self) -> Self {
        match T::TYPE_NAME {
            Some(name) => self.types.push((name.to_string(), registration::<T>())),
            None => self.errors.push(BindingError::UnnamedType {
                type_name: std::any::type_name::<T>(),
            }),
        }
        self
    }

    /// Register `T` under an explicit remote type name.
    #[must_use]
    pub fn register_as<T: TrackedItem>(mut self, type_name: impl Into<String>) -> Self {
        self.types.push((type_name.into(), registration::<T>()));
        self
    }

    /// # Errors
    ///
    /// Returns the first [`BindingError`] recorded while registering.
    pub fn build(self) -> Result<TypeRegistry, BindingError> {
        if let Some(error) = self.errors.into_iter().next() {
            return Err(error);
        }

        let mut types = BTreeMap::new();
        for (name, registration) in self.types {
            if let Some(previous) = types.insert(name.clone(), registration) {
                tracing::debug!(
                    type_name = %name,
                    replaced = previous.rust_name,
                    by = registration.rust_name,
                    "Work item type registration overridden"
                );
            }
        }

        Ok(TypeRegistry {
            types,
            all_fields: OnceLock::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{FieldMap, FieldSpec};
    use crate::fields;
    use serde_json::json;
    use std::sync::LazyLock;

    #[derive(Debug, Clone, Default)]
    struct TeamBug {
        base: WorkItem,
        customer: Option<String>,
    }

    static TEAM_BUG_FIELDS: LazyLock<FieldMap<TeamBug>> = LazyLock::new(|| {
        FieldMap::<TeamBug>::builder("TeamBug")
            .inherit(WorkItem::fields(), |b| &b.base, |b| &mut b.base)
            .bind(
                FieldSpec::new("customer", "Custom.Customer"),
                |b| &b.customer,
                |b| &mut b.customer,
            )
            .build()
            .unwrap()
    });

    impl TrackedItem for TeamBug {
        const TYPE_NAME: Option<&'static str> = Some("Bug");

        fn fields() -> &'static FieldMap<Self> {
            &TEAM_BUG_FIELDS
        }

        fn core(&self) -> &WorkItem {
            &self.base
        }

        fn core_mut(&mut self) -> &mut WorkItem {
            &mut self.base
        }
    }

    fn record(type_name: &str) -> WorkItemRecord {
        WorkItemRecord {
            id: 1,
            rev: Some(1),
            fields: json!({
                "System.WorkItemType": type_name,
                "Custom.Customer": "Contoso"
            })
            .as_object()
            .cloned()
            .unwrap(),
            ..Default::default()
        }
    }

    /// # Standard Registry Materializes Typed Items
    ///
    /// Verifies snapshots become their registered type, unknown types the base.
    ///
    /// ## Test Scenario
    /// - Materialize a Bug, a User Story and an Issue snapshot
    ///
    /// ## Expected Outcome
    /// - Bug and UserStory downcast; the Issue is a plain WorkItem
    #[test]
    fn test_standard_registry_materializes() {
        let registry = TypeRegistry::standard();
        assert!(registry.materialize(record("Bug")).unwrap().downcast_ref::<Bug>().is_some());
        assert!(
            registry
                .materialize(record("User Story"))
                .unwrap()
                .downcast_ref::<UserStory>()
                .is_some()
        );
        let issue = registry.materialize(record("Issue")).unwrap();
        assert!(issue.downcast_ref::<WorkItem>().is_some());
        assert_eq!(issue.work_item().work_item_type, "Issue");

        assert_eq!(registry.name_for::<Bug>(), Some("Bug"));
        assert_eq!(registry.name_for::<WorkItem>(), None);
    }

    /// # Later Registration Overrides
    ///
    /// Verifies a consumer type registered under a built-in name replaces it.
    ///
    /// ## Test Scenario
    /// - Register TeamBug after the standard types
    ///
    /// ## Expected Outcome
    /// - Bug snapshots become TeamBug and the built-in Bug has no name
    #[test]
    fn test_later_registration_overrides() {
        let registry = TypeRegistry::builder()
            .with_standard_types()
            .register::<TeamBug>()
            .build()
            .unwrap();

        let item = registry.materialize(record("Bug")).unwrap();
        let team_bug = item.downcast_ref::<TeamBug>().unwrap();
        assert_eq!(team_bug.customer.as_deref(), Some("Contoso"));

        assert_eq!(registry.name_for::<TeamBug>(), Some("Bug"));
        assert_eq!(registry.name_for::<Bug>(), None);
        assert!(registry.all_fields().contains(&"Custom.Customer"));

        let as_team_bug: TeamBug = registry.materialize_as(record("Bug")).unwrap();
        assert_eq!(as_team_bug.customer.as_deref(), Some("Contoso"));
        let as_base: WorkItem = registry.materialize_as(record("Bug")).unwrap();
        assert_eq!(as_base.work_item_type, "Bug");
    }

    /// # Unnamed Types Cannot Be Registered
    ///
    /// Verifies registering a type without a remote name is a configuration error.
    ///
    /// ## Test Scenario
    /// - Register the untyped base
    ///
    /// ## Expected Outcome
    /// - Building fails with UnnamedType
    #[test]
    fn test_unnamed_type_rejected() {
        let result = TypeRegistry::builder().register::<WorkItem>().build();
        assert!(matches!(result, Err(BindingError::UnnamedType { .. })));
    }

    /// # All Fields Is The Union
    ///
    /// Verifies the all-fields list covers base and typed bindings once.
    ///
    /// ## Test Scenario
    /// - Read the all-fields list of the standard registry twice
    ///
    /// ## Expected Outcome
    /// - It contains base and Agile fields without duplicates
    #[test]
    fn test_all_fields_is_union() {
        let registry = TypeRegistry::standard();
        let all = registry.all_fields();
        assert!(all.contains(&fields::TITLE));
        assert!(all.contains(&fields::SEVERITY));
        assert!(all.contains(&fields::ACCEPTANCE_CRITERIA));
        let unique: BTreeSet<_> = all.iter().collect();
        assert_eq!(unique.len(), all.len());
        assert_eq!(registry.all_fields().as_ptr(), all.as_ptr());
    }

    /// # Type Under Several Names
    ///
    /// Verifies the name used for a type registered more than once is stable.
    ///
    /// ## Test Scenario
    /// - Register TeamBug as "Defect" and "Bug", and Task as "Chore" and "Job"
    ///
    /// ## Expected Outcome
    /// - TeamBug resolves to its declared "Bug" regardless of order
    /// - Task, whose declared name is not among them, resolves to "Chore"
    #[test]
    fn test_type_under_several_names() {
        for reversed in [false, true] {
            let mut names = vec!["Defect", "Bug"];
            if reversed {
                names.reverse();
            }
            let registry = names
                .iter()
                .fold(TypeRegistry::builder(), |b, name| b.register_as::<TeamBug>(*name))
                .register_as::<Task>("Job")
                .register_as::<Task>("Chore")
                .build()
                .unwrap();

            assert_eq!(registry.name_for::<TeamBug>(), Some("Bug"));
            assert_eq!(registry.name_for::<Task>(), Some("Chore"));
            assert_eq!(registry.type_names(), vec!["Bug", "Chore", "Defect", "Job"]);
        }
    }
}
