//! Entity describer registry — declared field lists instead of reflection
//!
//! Each audited entity type registers an explicit list of `FieldDescriptor`s
//! at process start. Types without a describer are invisible to the audit
//! subsystem. The registry is populated once and shared immutably behind an
//! `Arc` — no runtime mutation, no locking.

use crate::error::{AuditError, Result};
use crate::types::FieldSnapshot;
use crate::value::UNSERIALIZABLE;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

/// Capability trait for entities that flow through a unit of work
///
/// Implementing this trait is the opt-in marker for audit capture; a type
/// can implement it and still opt out by overriding `audit_enabled`.
pub trait AuditEntity: Any + Send + Sync {
    /// Upcast for describer accessors
    fn as_any(&self) -> &dyn Any;

    /// Mutable upcast for pre-commit hooks
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Whether this entity participates in audit capture
    fn audit_enabled(&self) -> bool {
        true
    }

    /// Soft-delete support: flip the entity's deleted flag and return true
    ///
    /// The default returns false, meaning the entity is hard-deleted. Types
    /// overriding this are reclassified from `Removed` to `Modified` by the
    /// soft-delete hook and audit as an Update on the flag field.
    fn soft_delete(&mut self) -> bool {
        false
    }

    /// Adopt the persisted key for this entity
    ///
    /// The host calls this with the row's key before storing it: for
    /// inserts after the store assigns the identity, for updates with the
    /// host-known key. Types whose id field mirrors the store key override
    /// this so the stored row agrees with the key it lives under. The
    /// default ignores the key.
    fn adopt_key(&mut self, _key: &str) {}

    /// Diagnostic type name, used in errors and logs for unregistered types
    fn type_label(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

type Accessor = Arc<dyn Fn(&dyn Any) -> Option<serde_json::Value> + Send + Sync>;

#[derive(Clone)]
enum FieldKind {
    Scalar,
    PrimaryKey,
    Navigation { related: String },
}

/// A declared, audited field of an entity type
///
/// The accessor reads the field's current raw value from the live entity.
/// A downcast mismatch (describer registered under the wrong type) is the
/// per-field serialization failure path: the value falls back to the
/// `<unserializable>` marker and capture continues.
#[derive(Clone)]
pub struct FieldDescriptor {
    name: String,
    kind: FieldKind,
    accessor: Accessor,
}

impl FieldDescriptor {
    /// Declare a scalar field
    pub fn field<T, F>(name: impl Into<String>, get: F) -> Self
    where
        T: 'static,
        F: Fn(&T) -> serde_json::Value + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            kind: FieldKind::Scalar,
            accessor: Arc::new(move |any| any.downcast_ref::<T>().map(&get)),
        }
    }

    /// Declare the primary-key field
    ///
    /// Excluded from old/new value maps; populates the record's
    /// `primary_key` directly.
    pub fn primary_key<T, F>(name: impl Into<String>, get: F) -> Self
    where
        T: 'static,
        F: Fn(&T) -> serde_json::Value + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            kind: FieldKind::PrimaryKey,
            accessor: Arc::new(move |any| any.downcast_ref::<T>().map(&get)),
        }
    }

    /// Declare a relation/collection navigation
    ///
    /// Navigations are not diffed field-by-field. When a navigation's value
    /// changes in an update, a single marker entry named after the related
    /// type is added to `changed_fields`, with no old/new values.
    pub fn navigation<T, F>(name: impl Into<String>, related: impl Into<String>, get: F) -> Self
    where
        T: 'static,
        F: Fn(&T) -> serde_json::Value + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            kind: FieldKind::Navigation {
                related: related.into(),
            },
            accessor: Arc::new(move |any| any.downcast_ref::<T>().map(&get)),
        }
    }

    /// Field name
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A navigation value captured alongside the scalar snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct NavigationValue {
    /// Name of the related entity type — the marker used in `changed_fields`
    pub related: String,
    /// Raw collection value, compared whole for change detection
    pub value: serde_json::Value,
}

/// The described state of one entity at a point in time
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityDescription {
    /// Stable entity type name
    pub entity_name: String,
    /// Primary key in string form, if readable
    pub primary_key: Option<String>,
    /// Scalar fields in declaration order, primary key excluded
    pub fields: FieldSnapshot,
    /// Navigation values in declaration order
    pub navigations: Vec<NavigationValue>,
}

/// Declared field list for one entity type
pub struct EntityDescriber {
    entity_name: String,
    descriptors: Vec<FieldDescriptor>,
}

impl EntityDescriber {
    /// Describe an entity instance: read every declared field
    ///
    /// Per-field accessor failures are recovered with the
    /// `<unserializable>` marker and a warning; describe itself never fails
    /// for a correctly registered type.
    pub fn describe(&self, entity: &dyn Any) -> EntityDescription {
        let mut description = EntityDescription {
            entity_name: self.entity_name.clone(),
            ..Default::default()
        };

        for descriptor in &self.descriptors {
            let value = (descriptor.accessor)(entity);
            match (&descriptor.kind, value) {
                (FieldKind::PrimaryKey, Some(raw)) => {
                    description.primary_key = key_string(&raw);
                }
                (FieldKind::PrimaryKey, None) => {
                    self.warn_unserializable(descriptor);
                }
                (FieldKind::Scalar, Some(raw)) => {
                    description.fields.insert(descriptor.name.clone(), raw);
                }
                (FieldKind::Scalar, None) => {
                    self.warn_unserializable(descriptor);
                    description
                        .fields
                        .insert(descriptor.name.clone(), serde_json::json!(UNSERIALIZABLE));
                }
                (FieldKind::Navigation { related }, Some(raw)) => {
                    description.navigations.push(NavigationValue {
                        related: related.clone(),
                        value: raw,
                    });
                }
                (FieldKind::Navigation { .. }, None) => {
                    self.warn_unserializable(descriptor);
                }
            }
        }

        description
    }

    /// Entity type name this describer was registered under
    pub fn entity_name(&self) -> &str {
        &self.entity_name
    }

    fn warn_unserializable(&self, descriptor: &FieldDescriptor) {
        let err = AuditError::Serialization {
            entity: self.entity_name.clone(),
            field: descriptor.name.clone(),
            reason: "accessor type mismatch".to_string(),
        };
        tracing::warn!(
            entity = %self.entity_name,
            field = %descriptor.name,
            error = %err,
            "Field value not serializable, recording fallback marker"
        );
    }
}

/// Primary keys are persisted in string form
fn key_string(raw: &serde_json::Value) -> Option<String> {
    match raw {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Registry mapping entity types to their describers
///
/// Built at startup via `register`, then wrapped in an `Arc` and treated as
/// immutable for the life of the process.
#[derive(Default)]
pub struct DescriberRegistry {
    by_type: HashMap<TypeId, EntityDescriber>,
    names: HashMap<String, TypeId>,
}

impl DescriberRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity type with its declared field list
    ///
    /// Fails with a configuration error on an empty name, a duplicate type,
    /// a duplicate name, or more than one primary-key descriptor.
    pub fn register<T: 'static>(
        &mut self,
        entity_name: impl Into<String>,
        descriptors: Vec<FieldDescriptor>,
    ) -> Result<()> {
        let entity_name = entity_name.into();
        if entity_name.is_empty() {
            return Err(AuditError::Config("Entity name cannot be empty".to_string()));
        }

        let type_id = TypeId::of::<T>();
        if self.by_type.contains_key(&type_id) {
            return Err(AuditError::Config(format!(
                "Entity type '{}' is already registered",
                entity_name
            )));
        }
        if self.names.contains_key(&entity_name) {
            return Err(AuditError::Config(format!(
                "Entity name '{}' is already registered",
                entity_name
            )));
        }

        let pk_count = descriptors
            .iter()
            .filter(|d| matches!(d.kind, FieldKind::PrimaryKey))
            .count();
        if pk_count > 1 {
            return Err(AuditError::Config(format!(
                "Entity '{}' declares {} primary-key fields, at most one is allowed",
                entity_name, pk_count
            )));
        }

        self.names.insert(entity_name.clone(), type_id);
        self.by_type.insert(
            type_id,
            EntityDescriber {
                entity_name,
                descriptors,
            },
        );
        Ok(())
    }

    /// Describe an entity, failing with `UnregisteredEntity` for unknown types
    ///
    /// The capture hook treats that error as "not audited", not as a failure.
    pub fn describe(&self, entity: &dyn AuditEntity) -> Result<EntityDescription> {
        let any = entity.as_any();
        match self.by_type.get(&any.type_id()) {
            Some(describer) => Ok(describer.describe(any)),
            None => Err(AuditError::UnregisteredEntity(short_type_name(
                entity.type_label(),
            ))),
        }
    }

    /// Whether a type is registered
    pub fn contains(&self, type_id: TypeId) -> bool {
        self.by_type.contains_key(&type_id)
    }

    /// Registered name for a type, if any
    pub fn name_of<T: 'static>(&self) -> Option<&str> {
        self.by_type
            .get(&TypeId::of::<T>())
            .map(|d| d.entity_name.as_str())
    }

    /// All registered entity names, sorted
    pub fn entity_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.names.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Last path segment of a fully qualified type name
pub(crate) fn short_type_name(full: &str) -> String {
    full.rsplit("::").next().unwrap_or(full).to_string()
}
